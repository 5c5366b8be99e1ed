//! The master output canvas: block placement, inter-region gaps, and
//! pagination.
//!
//! Blocks arrive top to bottom from `region_add`; the canvas positions each
//! one against the previous baseline (or the inter-region gap policy),
//! grows its backing strip geometrically, and emits finished device pages
//! when the content overflows the usable height.

use image::{GrayImage, Luma};
use log::debug;

use crate::bitmap::grow_rows;
use crate::config::Settings;
use crate::error::Result;
use crate::reflow::WrapBuffer;
use crate::render::{add_atomic, AddParams, BlockInfo, CropBox, OutputPage, ScaleMode, WRectMap, WrapPolicy};

/// Smallest inter-region gap, inches.
const MIN_REGION_GAP_IN: f64 = 0.05;
/// Largest inter-region gap as a fraction of the usable page height.
const MAX_REGION_GAP_FRAC: f64 = 0.6;
/// Inter-region gap cap when the gap is not mandatory, inches.
const SOFT_REGION_GAP_CAP_IN: f64 = 0.125;

/// Accumulates composited blocks and publishes finished output pages.
#[derive(Debug)]
pub struct MasterCanvas {
    /// Content strip for the page being built: usable width, grows
    /// vertically.
    strip: GrayImage,
    /// Next free strip row.
    cursor: u32,
    /// Baseline row (in strip coordinates) of the last placed block, if
    /// the last block carried one.
    last_rowbase: Option<u32>,
    /// Pending word-wrap line.
    pub(crate) wrap: WrapBuffer,
    /// The next placed block starts a new source region: the region gap
    /// policy applies instead of baseline-to-baseline spacing.
    pub region_start: bool,
    /// The next placed block must be preceded by the full source region
    /// gap (a page or column boundary was crossed).
    pub mandatory_region_gap: bool,
    /// Source-derived gap to insert before the next block, inches.
    pub page_region_gap_in: f64,
    crop_boxes: Vec<CropBox>,
    blocks: Vec<BlockInfo>,
    maps: Vec<WRectMap>,
    ready: Vec<OutputPage>,
}

impl MasterCanvas {
    /// Create an empty canvas for the given settings.
    pub fn new(settings: &Settings) -> Self {
        Self {
            strip: GrayImage::from_pixel(
                settings.usable_width(),
                settings.usable_height().max(1),
                Luma([255u8]),
            ),
            cursor: 0,
            last_rowbase: None,
            wrap: WrapBuffer::default(),
            region_start: true,
            mandatory_region_gap: true,
            page_region_gap_in: 0.0,
            crop_boxes: Vec::new(),
            blocks: Vec::new(),
            maps: Vec::new(),
            ready: Vec::new(),
        }
    }

    /// Rows of content accumulated on the page being built.
    pub fn pending_rows(&self) -> u32 {
        self.cursor
    }

    /// Flush any pending wrapped line onto the canvas.
    pub fn flush_wrap(&mut self, settings: &Settings) -> Result<()> {
        self.flush_wrap_inner(settings, false)
    }

    /// Flush the pending line after an overflow break.  Unlike paragraph
    /// and figure flushes, an overflow-broken line of a fully-justified
    /// paragraph is spread to fill the full line width.
    pub(crate) fn flush_wrap_justified(&mut self, settings: &Settings) -> Result<()> {
        self.flush_wrap_inner(settings, true)
    }

    fn flush_wrap_inner(&mut self, settings: &Settings, allow_full: bool) -> Result<()> {
        let mut buf = std::mem::take(&mut self.wrap);
        let Some(mut line) = buf.take_line() else {
            return Ok(());
        };
        if allow_full && line.fully_justified {
            line.spread_words();
        }
        let bmp = crate::bitmap::PageBitmap::new(line.img);
        let mut region = crate::region::Region::full_page(
            &bmp,
            line.src_dpi,
            settings.bg_threshold,
            line.src_rot_deg,
            line.src_page,
        );
        region.bbox.rowbase = line.rowbase.min(region.rect.r2);
        region.maps = Some(line.maps);
        let params = AddParams {
            wrap: WrapPolicy::Never,
            trim: None,
            allow_analysis: false,
            scale: ScaleMode::NativeUnlessOverflow,
            just: line.just,
            from_vertical_break: false,
            gap_override: line.line_spacing_dst,
            region_is_centered: false,
        };
        add_atomic(&region, settings, self, params)
    }

    /// Place one rendered block on the strip.
    ///
    /// `x_off` is the horizontal placement (justification already applied);
    /// `rowbase` is the baseline row within `img`.  With `gap_override` the
    /// block is positioned baseline-to-baseline against the previous block;
    /// otherwise the inter-region gap policy applies.
    #[allow(clippy::too_many_arguments)]
    pub fn add_block(
        &mut self,
        settings: &Settings,
        img: GrayImage,
        x_off: u32,
        rowbase: u32,
        gap_override: Option<u32>,
        mut crop: CropBox,
        mut block: BlockInfo,
        mut maps: Vec<WRectMap>,
    ) -> Result<()> {
        let (w, h) = img.dimensions();
        let usable_h = settings.usable_height();

        let mut top = match (gap_override, self.last_rowbase) {
            _ if self.cursor == 0 => 0,
            _ if self.region_start => self.cursor + self.region_gap_px(settings),
            (Some(spacing), Some(last_base)) => {
                // Baseline-to-baseline placement for analyzed text rows.
                (last_base + spacing).saturating_sub(rowbase).max(self.cursor)
            },
            _ => self.cursor + self.region_gap_px(settings),
        };

        // Page break when the block does not fit below the cursor.
        if top + h > usable_h && self.cursor > 0 {
            self.emit_page(settings);
            top = 0;
        }

        self.ensure_rows(top + h);
        for (col, row, px) in img.enumerate_pixels() {
            if px.0[0] < 255 {
                self.strip.put_pixel(x_off + col, top + row, *px);
            }
        }

        crop.dst_rect_px = [x_off, top, x_off + w - 1, top + h - 1];
        block.dst_row = top;
        block.dst_height = h;
        debug!(
            "add_block: page {} src ({},{})-({},{}) at dst row {} ({}x{})",
            block.src_page, block.src_rect.c1, block.src_rect.r1, block.src_rect.c2,
            block.src_rect.r2, top, w, h
        );
        for map in &mut maps {
            map.translate_dst(0, top);
        }
        self.crop_boxes.push(crop);
        self.blocks.push(block);
        self.maps.append(&mut maps);
        self.cursor = top + h;
        self.last_rowbase = Some(top + rowbase.min(h.saturating_sub(1)));
        self.mandatory_region_gap = false;
        self.region_start = false;

        // A block taller than the page spills onto further pages.
        while self.cursor > usable_h {
            self.emit_page(settings);
        }
        Ok(())
    }

    /// Flush the pending wrapped line and finish the current page.  With
    /// `force` an empty page is emitted too.
    pub fn flush_page(&mut self, settings: &Settings, force: bool) -> Result<()> {
        self.flush_wrap(settings)?;
        if self.cursor > 0 || force {
            self.emit_page(settings);
        }
        Ok(())
    }

    /// Take the pages finished so far.
    pub fn take_ready(&mut self) -> Vec<OutputPage> {
        std::mem::take(&mut self.ready)
    }

    /// Inter-region gap in destination pixels, per the gap policy.
    fn region_gap_px(&self, settings: &Settings) -> u32 {
        let usable_h_in = settings.usable_height() as f64 / settings.dst_dpi as f64;
        let gap_in = if self.mandatory_region_gap {
            self.page_region_gap_in
                .clamp(MIN_REGION_GAP_IN, MAX_REGION_GAP_FRAC * usable_h_in)
        } else {
            self.page_region_gap_in.min(SOFT_REGION_GAP_CAP_IN).max(0.0)
        };
        (gap_in * settings.dst_dpi as f64).round() as u32
    }

    /// Grow the strip so that `rows` strip rows exist.
    fn ensure_rows(&mut self, rows: u32) {
        while self.strip.height() < rows {
            grow_rows(&mut self.strip, 1.4, 255);
        }
    }

    /// Cut one device page off the top of the strip.
    fn emit_page(&mut self, settings: &Settings) {
        let usable_h = settings.usable_height();
        let page_rows = self.cursor.min(usable_h);
        let mar_left = (settings.dst_mar_left * settings.dst_dpi as f64) as u32;
        let mar_top = (settings.dst_mar_top * settings.dst_dpi as f64) as u32;

        let mut bitmap =
            GrayImage::from_pixel(settings.dst_width, settings.dst_height, Luma([255u8]));
        for row in 0..page_rows {
            for col in 0..self.strip.width() {
                let px = *self.strip.get_pixel(col, row);
                let (dc, dr) = (col + mar_left, row + mar_top);
                if dc < bitmap.width() && dr < bitmap.height() {
                    bitmap.put_pixel(dc, dr, px);
                }
            }
        }

        // Blocks (and their boxes/maps) that start on this page go with
        // it; anything below slides up to the next page.
        let mut page_blocks = Vec::new();
        let mut rest_blocks = Vec::new();
        for mut block in std::mem::take(&mut self.blocks) {
            if block.dst_row < page_rows {
                block.dst_row += mar_top;
                page_blocks.push(block);
            } else {
                block.dst_row -= page_rows;
                rest_blocks.push(block);
            }
        }
        let mut page_crops = Vec::new();
        let mut rest_crops = Vec::new();
        for mut crop in std::mem::take(&mut self.crop_boxes) {
            if crop.dst_rect_px[1] < page_rows {
                crop.dst_rect_px[0] += mar_left;
                crop.dst_rect_px[2] += mar_left;
                crop.dst_rect_px[1] += mar_top;
                crop.dst_rect_px[3] = (crop.dst_rect_px[3] + mar_top).min(settings.dst_height - 1);
                page_crops.push(crop);
            } else {
                crop.dst_rect_px[1] -= page_rows;
                crop.dst_rect_px[3] -= page_rows;
                rest_crops.push(crop);
            }
        }
        let mut page_maps = Vec::new();
        let mut rest_maps = Vec::new();
        for mut map in std::mem::take(&mut self.maps) {
            if map.dst_origin.1 < page_rows {
                map.dst_origin = (map.dst_origin.0 + mar_left, map.dst_origin.1 + mar_top);
                page_maps.push(map);
            } else {
                map.dst_origin.1 -= page_rows;
                rest_maps.push(map);
            }
        }
        self.blocks = rest_blocks;
        self.crop_boxes = rest_crops;
        self.maps = rest_maps;

        // Slide the remaining strip content up.
        let remaining = self.cursor - page_rows;
        let mut next =
            GrayImage::from_pixel(self.strip.width(), self.strip.height(), Luma([255u8]));
        for row in 0..remaining {
            for col in 0..self.strip.width() {
                next.put_pixel(col, row, *self.strip.get_pixel(col, page_rows + row));
            }
        }
        self.strip = next;
        self.cursor = remaining;
        self.last_rowbase = self.last_rowbase.and_then(|base| base.checked_sub(page_rows));

        debug!("emit_page: {} rows of content, {} carried over", page_rows, remaining);
        self.ready.push(OutputPage {
            bitmap,
            crop_boxes: page_crops,
            blocks: page_blocks,
            maps: page_maps,
        });
    }
}
