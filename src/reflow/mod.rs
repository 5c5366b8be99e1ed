//! Text re-flow: the greedy word wrapper and the row-by-row flow driver.
//!
//! `analyze_and_flow` walks the detected rows of a block in reading order.
//! With wrapping enabled, text rows are split into words and packed into
//! the pending-line `WrapBuffer`; figures and non-wrapped rows are
//! composited atomically with normalized baseline spacing.

use image::{GrayImage, Luma};
use log::debug;

use crate::bitmap::PageBitmap;
use crate::config::{Justify, Settings};
use crate::error::{Error, Result};
use crate::geometry::PixelRect;
use crate::layout::line_stats::{self, MultilineParams};
use crate::region::detect::{self, DetectOptions};
use crate::region::textrow::RowType;
use crate::region::{Region, TrimSides};
use crate::render::canvas::MasterCanvas;
use crate::render::{region_add, AddParams, ScaleMode, WRectMap, WrapPolicy};

/// Minimum pixel width for a row to be wrapped at all.
const MIN_WRAP_WIDTH_PX: u32 = 6;

/// One flushed line, ready for atomic compositing.
#[derive(Debug)]
pub struct WrapLine {
    /// Line pixels at source scale.
    pub img: GrayImage,
    /// Source DPI of the line pixels.
    pub src_dpi: u32,
    /// Source page rotation, degrees.
    pub src_rot_deg: i32,
    /// Zero-based source page index.
    pub src_page: usize,
    /// Baseline row within `img`.
    pub rowbase: u32,
    /// Per-word coordinate maps, destination side in line-local pixels.
    pub maps: Vec<WRectMap>,
    /// Line justification.
    pub just: Justify,
    /// Baseline-to-baseline spacing against the previous line, destination
    /// pixels.
    pub line_spacing_dst: Option<u32>,
    /// The source paragraph is fully justified (or full justification is
    /// forced): lines broken by overflow may be spread to the full width.
    pub fully_justified: bool,
    /// Line width to fill when spreading, source pixels.
    pub target_width: u32,
}

impl WrapLine {
    /// Stretch the inter-word gaps so the line fills `target_width`,
    /// shifting word `k` of `n` right by `extra * k / (n - 1)`.
    pub fn spread_words(&mut self) {
        let n = self.maps.len();
        let width = self.img.width();
        if n < 2 || width >= self.target_width {
            return;
        }
        let extra = self.target_width - width;
        let mut spread =
            GrayImage::from_pixel(self.target_width, self.img.height(), Luma([255u8]));
        for (k, map) in self.maps.iter_mut().enumerate() {
            let shift = (extra as u64 * k as u64 / (n as u64 - 1)) as u32;
            let (x0, y0) = map.dst_origin;
            for row in 0..map.extent.1 {
                for col in 0..map.extent.0 {
                    let (sx, sy) = (x0 + col, y0 + row);
                    if sx >= self.img.width() || sy >= self.img.height() {
                        continue;
                    }
                    let px = *self.img.get_pixel(sx, sy);
                    if px.0[0] < 255 && sx + shift < spread.width() {
                        spread.put_pixel(sx + shift, sy, px);
                    }
                }
            }
            map.dst_origin.0 = x0 + shift;
        }
        self.img = spread;
    }
}

/// The pending wrapped line.
///
/// Words accumulate left to right at source scale, aligned on a shared
/// baseline.  The buffer flushes when the next word would overflow the
/// maximum line width, at paragraph boundaries, and before any atomic
/// block.
#[derive(Debug, Default)]
pub struct WrapBuffer {
    img: Option<GrayImage>,
    /// Used width, pixels.
    width: u32,
    /// Rows above the baseline, baseline row included.
    above: u32,
    /// Rows below the baseline.
    below: u32,
    /// Maximum line width at source scale.
    max_width: u32,
    src_dpi: u32,
    src_rot_deg: i32,
    src_page: usize,
    just: Justify,
    line_spacing_dst: Option<u32>,
    /// The enclosing paragraph allows spreading on overflow flushes.
    fully_justified: bool,
    maps: Vec<WRectMap>,
    /// The last packed word ends in a hyphen; the next inter-word gap
    /// collapses.
    hyphen: bool,
}

impl WrapBuffer {
    /// Whether the buffer holds any pixels.
    pub fn is_empty(&self) -> bool {
        self.img.is_none() || self.width == 0
    }

    /// Take the accumulated line out of the buffer, leaving it empty.
    pub fn take_line(&mut self) -> Option<WrapLine> {
        let img = self.img.take()?;
        if self.width == 0 {
            return None;
        }
        // Cut the unused tail off the allocation.
        let mut line = GrayImage::from_pixel(self.width, img.height(), Luma([255u8]));
        for row in 0..img.height() {
            for col in 0..self.width.min(img.width()) {
                line.put_pixel(col, row, *img.get_pixel(col, row));
            }
        }
        let out = WrapLine {
            img: line,
            src_dpi: self.src_dpi,
            src_rot_deg: self.src_rot_deg,
            src_page: self.src_page,
            rowbase: self.above.saturating_sub(1),
            maps: std::mem::take(&mut self.maps),
            just: self.just,
            line_spacing_dst: self.line_spacing_dst,
            fully_justified: self.fully_justified,
            target_width: self.max_width,
        };
        self.width = 0;
        self.above = 0;
        self.below = 0;
        self.hyphen = false;
        Some(out)
    }

    /// Grow the buffer allocation so a glyph band with `above` rows above
    /// the baseline (inclusive) and `below` rows under it fits.
    fn ensure_metrics(&mut self, above: u32, below: u32) {
        let new_above = self.above.max(above);
        let new_below = self.below.max(below);
        if new_above == self.above && new_below == self.below && self.img.is_some() {
            return;
        }
        let mut grown =
            GrayImage::from_pixel(self.max_width.max(1), new_above + new_below, Luma([255u8]));
        if let Some(old) = self.img.take() {
            let shift = new_above - self.above;
            for (col, row, px) in old.enumerate_pixels() {
                if px.0[0] < 255 {
                    grown.put_pixel(col, row + shift, *px);
                }
            }
            for map in &mut self.maps {
                map.translate_dst(0, shift);
            }
        }
        self.img = Some(grown);
        self.above = new_above;
        self.below = new_below;
    }
}

/// Per-row parameters for the word packer.
#[derive(Debug, Clone, Copy)]
struct WordContext<'a> {
    row_region: &'a Region<'a>,
    /// Absolute baseline row of the source text row.
    rowbase_abs: u32,
    /// Inter-word gap, source pixels.
    gap_px: u32,
    just: Justify,
    line_spacing_dst: Option<u32>,
    fully_justified: bool,
    lcheight: u32,
}

/// Detect rows, classify justification, and flow the region onto the
/// canvas row by row.
pub fn analyze_and_flow(
    region: &Region<'_>,
    settings: &Settings,
    canvas: &mut MasterCanvas,
    allow_wrap: bool,
    params: AddParams,
) -> Result<()> {
    let mut region = region.clone();
    detect::find_text_rows(
        &mut region,
        settings,
        DetectOptions {
            dynamic_aperture: true,
            remove_small_rows: true,
        },
    );
    if region.rows.is_empty() {
        return Ok(());
    }

    let centered = params.region_is_centered || line_stats::region_is_centered(&region);
    let Some(mlp) = MultilineParams::compute(&region, settings, centered) else {
        return Ok(());
    };
    debug!(
        "analyze_and_flow: {} lines, ragged_right={}, wrap={}",
        mlp.nlines, mlp.ragged_right, allow_wrap
    );

    let rows = region.rows.sorted_by_position();
    let dpi_ratio = settings.dst_dpi as f64 / region.dpi.max(1) as f64;
    let fully_justified = settings.dst_fulljustify.unwrap_or(mlp.fully_justified);

    for k in mlp.i1..=mlp.i2 {
        let row = &rows[k];
        let prev = if k > mlp.i1 { Some(&rows[k - 1]) } else { None };
        let idx = k - mlp.i1;
        let spacing_src =
            line_stats::line_spacing_pixels(row, prev, &mlp, settings, allow_wrap);
        let spacing_dst = ((spacing_src as f64 * dpi_ratio).round() as u32).max(1);
        let line_just = settings.dst_justify.unwrap_or(mlp.just[idx]);

        let row_rect = PixelRect::new(row.c1, row.r1, row.c2, row.r2);
        let mut row_region = region.subregion(row_rect);
        row_region.bbox = row.clone();

        let wrappable = allow_wrap && row.row_type != RowType::Figure;
        if !wrappable {
            canvas.flush_wrap(settings)?;
            let atomic = AddParams {
                wrap: WrapPolicy::Never,
                trim: None,
                allow_analysis: false,
                scale: params.scale,
                just: line_just,
                from_vertical_break: false,
                gap_override: Some(spacing_dst),
                region_is_centered: centered,
            };
            region_add(&row_region, settings, canvas, atomic)?;
            continue;
        }

        // Paragraph starts and centered lines never join the pending line.
        if mlp.indented[idx] || mlp.just[idx] == Justify::Center {
            canvas.flush_wrap(settings)?;
        }
        wrap_row(
            &row_region,
            settings,
            canvas,
            line_just,
            Some(spacing_dst),
            mlp.indented[idx],
            fully_justified,
            region.rect.c1,
            region.rect.c2,
        )?;
        if mlp.short_line[idx] || k == mlp.i2 {
            canvas.flush_wrap(settings)?;
        }
    }
    Ok(())
}

/// Split one text row into words and pack them into the wrap buffer.
///
/// `left_margin` and `right_margin` are the block's column bounds; with
/// `preserve_indent` the word on the line's starting side is widened back
/// to its margin, keeping the paragraph indent.  The starting side follows
/// the reading direction: the first word's left edge for left-to-right
/// text, the last word's right edge otherwise.
pub fn wrap_row(
    row_region: &Region<'_>,
    settings: &Settings,
    canvas: &mut MasterCanvas,
    just: Justify,
    line_spacing_dst: Option<u32>,
    preserve_indent: bool,
    fully_justified: bool,
    left_margin: u32,
    right_margin: u32,
) -> Result<()> {
    if !row_region.rows.is_empty() {
        return Err(Error::InternalInvariant(
            "wrap_row expects a bare single-row region".to_string(),
        ));
    }
    let mut region = row_region.clone();
    region.trim_margins(TrimSides::ALL);
    if region.is_blank() || region.rect.width() < MIN_WRAP_WIDTH_PX {
        return Ok(());
    }

    let (mut words, gap_px) = detect::find_words(&region, settings);
    if words.is_empty() {
        return Ok(());
    }
    if preserve_indent {
        if settings.src_left_to_right {
            let first = words[0];
            words[0] =
                PixelRect::new(left_margin.min(first.c1), first.r1, first.c2, first.r2);
        } else {
            let n = words.len() - 1;
            let last = words[n];
            words[n] =
                PixelRect::new(last.c1, last.r1, right_margin.max(last.c2), last.r2);
        }
    }

    let ctx = WordContext {
        row_region: &region,
        rowbase_abs: region.bbox.rowbase.clamp(region.rect.r1, region.rect.r2),
        gap_px,
        just,
        line_spacing_dst,
        fully_justified,
        lcheight: region.bbox.lcheight.max(1),
    };
    for word in &words {
        push_word(canvas, settings, ctx, word)?;
    }
    Ok(())
}

/// Pack one word into the pending line, flushing first when it would
/// overflow.  A word wider than the whole line is emitted on a line of its
/// own.
fn push_word(
    canvas: &mut MasterCanvas,
    settings: &Settings,
    ctx: WordContext<'_>,
    word: &PixelRect,
) -> Result<()> {
    let region = ctx.row_region;
    let width = word.width();

    // A pending line from another page or resolution can never be joined.
    if !canvas.wrap.is_empty()
        && (canvas.wrap.src_dpi != region.dpi || canvas.wrap.src_page != region.page_index)
    {
        canvas.flush_wrap(settings)?;
    }
    // Greedy fit test against the pending line.
    if !canvas.wrap.is_empty() {
        let gap = if canvas.wrap.hyphen { 0 } else { ctx.gap_px };
        if canvas.wrap.width + gap + width > canvas.wrap.max_width {
            canvas.flush_wrap_justified(settings)?;
        }
    }

    // A word too wide for any line goes out on its own, shrunk to fit.
    let line_limit = ((settings.usable_width() as f64 * region.dpi as f64
        / settings.dst_dpi.max(1) as f64)
        .floor() as u32)
        .max(1);
    if canvas.wrap.is_empty() && width > line_limit {
        let mut lone = region.subregion(*word);
        lone.bbox = region.bbox.clone();
        lone.bbox.c1 = word.c1;
        lone.bbox.c2 = word.c2;
        let params = AddParams {
            wrap: WrapPolicy::Never,
            trim: None,
            allow_analysis: false,
            scale: ScaleMode::NativeUnlessOverflow,
            just: ctx.just,
            from_vertical_break: false,
            gap_override: ctx.line_spacing_dst,
            region_is_centered: false,
        };
        return region_add(&lone, settings, canvas, params);
    }

    if canvas.wrap.is_empty() {
        canvas.wrap.src_dpi = region.dpi;
        canvas.wrap.src_rot_deg = region.rotation_deg;
        canvas.wrap.src_page = region.page_index;
        // Maximum line width: what fits the usable destination width at
        // native scale.
        canvas.wrap.max_width = ((settings.usable_width() as f64 * region.dpi as f64
            / settings.dst_dpi.max(1) as f64)
            .floor() as u32)
            .max(1);
    }
    canvas.wrap.just = ctx.just;
    canvas.wrap.line_spacing_dst = ctx.line_spacing_dst;
    canvas.wrap.fully_justified = ctx.fully_justified;

    let above = ctx.rowbase_abs.saturating_sub(word.r1) + 1;
    let below = word.r2.saturating_sub(ctx.rowbase_abs);
    canvas.wrap.ensure_metrics(above, below);

    let gap = if canvas.wrap.width == 0 {
        0
    } else if canvas.wrap.hyphen {
        // Re-joined hyphenated fragment: collapse the gap.
        0
    } else {
        ctx.gap_px
    };
    let x0 = canvas.wrap.width + gap;
    let y0 = canvas.wrap.above - above;
    let img = canvas.wrap.img.as_mut().ok_or_else(|| {
        Error::InternalInvariant("wrap buffer missing its allocation".to_string())
    })?;
    for row in word.r1..=word.r2 {
        for col in word.c1..=word.c2 {
            let (x, y) = (x0 + (col - word.c1), y0 + (row - word.r1));
            if x >= img.width() || y >= img.height() {
                continue;
            }
            let px = *region.bmp.image().get_pixel(col, row);
            if px.0[0] < 255 {
                img.put_pixel(x, y, px);
            }
        }
    }
    canvas.wrap.maps.push(WRectMap {
        src_page: region.page_index,
        src_rot_deg: region.rotation_deg,
        src_dpi_w: region.dpi as f64,
        src_dpi_h: region.dpi as f64,
        src_origin: (word.c1, word.r1),
        dst_origin: (x0, y0),
        extent: (width, word.height()),
    });
    canvas.wrap.width = (x0 + width).min(canvas.wrap.max_width);
    canvas.wrap.hyphen =
        ends_in_hyphen(region.bmp, word, ctx.rowbase_abs, ctx.lcheight, region.bg_threshold);
    if canvas.wrap.hyphen {
        debug!("push_word: trailing hyphen at col {}", word.c2);
    }

    // A single word filling the whole line goes out immediately.
    if canvas.wrap.width >= canvas.wrap.max_width {
        canvas.flush_wrap_justified(settings)?;
    }
    Ok(())
}

/// Whether a word's trailing columns form a hyphen: a thin horizontal bar
/// in the middle of the x-height band, at least a quarter of the letter
/// height long.
pub fn ends_in_hyphen(
    bmp: &PageBitmap,
    word: &PixelRect,
    rowbase: u32,
    lcheight: u32,
    bg_threshold: u8,
) -> bool {
    let bar_max_thickness = (lcheight / 4).max(1);
    let bar_min_length = (lcheight / 4).max(2);
    if word.width() < bar_min_length {
        return false;
    }
    let band_top = rowbase.saturating_sub(lcheight.saturating_sub(1)).max(word.r1);
    let band_bot = rowbase.min(word.r2);
    if band_bot < band_top {
        return false;
    }

    // Walk left from the last column while the profile stays bar-like.
    let mut length = 0u32;
    let mut bar_lo = u32::MAX;
    let mut bar_hi = 0u32;
    let mut col = word.c2;
    loop {
        let mut lo = u32::MAX;
        let mut hi = 0u32;
        for row in word.r1..=word.r2 {
            if bmp.is_fg(col, row, bg_threshold) {
                lo = lo.min(row);
                hi = hi.max(row);
            }
        }
        if lo == u32::MAX || hi - lo + 1 > bar_max_thickness {
            break;
        }
        bar_lo = bar_lo.min(lo);
        bar_hi = bar_hi.max(hi);
        length += 1;
        if col == word.c1 {
            break;
        }
        col -= 1;
    }
    if length < bar_min_length || bar_hi.saturating_sub(bar_lo) + 1 > bar_max_thickness {
        return false;
    }
    // The bar must sit in the middle of the x-height band.
    let center = (bar_lo + bar_hi) / 2;
    let band_mid_lo = band_top + (band_bot - band_top) / 4;
    let band_mid_hi = band_bot - (band_bot - band_top) / 4;
    center >= band_mid_lo && center <= band_mid_hi
}
