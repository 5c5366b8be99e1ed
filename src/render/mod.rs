//! Destination-side rendering: scaling decisions, coordinate maps, and the
//! atomic block compositor.
//!
//! `region_add` is the single funnel through which every analyzed region
//! reaches the output canvas.  Depending on the wrap policy it hands the
//! region to the line-spacing analyzer (which re-enters here per row), or
//! composites it atomically at a chosen scale.

pub mod canvas;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::bitmap::{crop_to_owned, resample};
use crate::config::{Justify, Settings, TextWrap};
use crate::error::Result;
use crate::geometry::PixelRect;
use crate::region::{Region, TrimSides};
use canvas::MasterCanvas;

/// Horizontal scaling policy for an atomic block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScaleMode {
    /// Multiply the DPI-native size by this factor.
    Force(f64),
    /// Scale to exactly the usable destination width.
    FitWidth,
    /// Keep the DPI-native size unless it overflows the usable width, then
    /// shrink to fit.
    NativeUnlessOverflow,
}

/// Map from a rendered destination rectangle back to its source-page pixels.
///
/// One map is recorded per composited word or block; viewers use them to
/// translate destination taps into source coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WRectMap {
    /// Zero-based source page index.
    pub src_page: usize,
    /// Source page rotation, degrees.
    pub src_rot_deg: i32,
    /// Effective horizontal source DPI after scaling.
    pub src_dpi_w: f64,
    /// Effective vertical source DPI after scaling.
    pub src_dpi_h: f64,
    /// Top-left of the mapped rectangle in source pixels (col, row).
    pub src_origin: (u32, u32),
    /// Top-left of the mapped rectangle in destination pixels (col, row).
    pub dst_origin: (u32, u32),
    /// Destination extent (width, height) in pixels.
    pub extent: (u32, u32),
}

impl WRectMap {
    /// Rescale the destination side of the map, keeping the source side and
    /// adjusting the effective DPI to match.
    pub fn scale_dst(&mut self, scale_w: f64, scale_h: f64) {
        self.dst_origin = (
            (self.dst_origin.0 as f64 * scale_w).round() as u32,
            (self.dst_origin.1 as f64 * scale_h).round() as u32,
        );
        self.extent = (
            ((self.extent.0 as f64 * scale_w).round() as u32).max(1),
            ((self.extent.1 as f64 * scale_h).round() as u32).max(1),
        );
        self.src_dpi_w *= scale_w;
        self.src_dpi_h *= scale_h;
    }

    /// Shift the destination origin.
    pub fn translate_dst(&mut self, dc: u32, dr: u32) {
        self.dst_origin = (self.dst_origin.0 + dc, self.dst_origin.1 + dr);
    }
}

/// Source crop rectangle for one composited block, serialized alongside the
/// output for viewers that re-render from the source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CropBox {
    /// Zero-based source page index.
    pub src_page: usize,
    /// Source page rotation, degrees.
    pub src_rot_deg: i32,
    /// Source rectangle, pixels: `[c1, r1, c2, r2]` inclusive.
    pub src_rect_px: [u32; 4],
    /// Destination rectangle, pixels: `[c1, r1, c2, r2]` inclusive.
    pub dst_rect_px: [u32; 4],
}

/// Placement record for one composited block on an output page.
#[derive(Debug, Clone)]
pub struct BlockInfo {
    /// Zero-based source page index.
    pub src_page: usize,
    /// Source rectangle of the block.
    pub src_rect: PixelRect,
    /// Destination top row of the block on its output page.
    pub dst_row: u32,
    /// Block height on the output page, pixels.
    pub dst_height: u32,
}

/// One finished destination page.
#[derive(Debug)]
pub struct OutputPage {
    /// Rendered page pixels at the destination device size.
    pub bitmap: image::GrayImage,
    /// Source crop boxes of the blocks on this page.
    pub crop_boxes: Vec<CropBox>,
    /// Placement records of the blocks on this page.
    pub blocks: Vec<BlockInfo>,
    /// Destination-to-source coordinate maps for this page.
    pub maps: Vec<WRectMap>,
}

/// Wrap policy handed down to `region_add`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapPolicy {
    /// Render atomically, never wrap.
    Never,
    /// Wrap only when the region is wider than the maximum region width.
    IfTooWide,
    /// Wrap every text row, joining short lines.
    Always,
}

impl WrapPolicy {
    /// Derive the policy from the configured wrapping mode.
    pub fn from_settings(settings: &Settings) -> Self {
        match settings.text_wrap {
            TextWrap::Off => WrapPolicy::Never,
            TextWrap::Reflow => WrapPolicy::IfTooWide,
            TextWrap::ReflowShortLines => WrapPolicy::Always,
        }
    }
}

/// Parameters for one `region_add` call.
#[derive(Debug, Clone, Copy)]
pub struct AddParams {
    /// Wrap policy for this region.
    pub wrap: WrapPolicy,
    /// Sides to trim before anything else; `None` skips trimming entirely
    /// (the caller already trimmed).
    pub trim: Option<TrimSides>,
    /// Whether the line-spacing analyzer may composite row by row; when
    /// false the region is atomic.
    pub allow_analysis: bool,
    /// Scaling policy for atomic rendering.
    pub scale: ScaleMode,
    /// Justification for atomic rendering.
    pub just: Justify,
    /// Set when called directly from the vertical-break splitter; restores
    /// symmetric horizontal margins around the trimmed content.
    pub from_vertical_break: bool,
    /// Override for the gap inserted above the block, destination pixels.
    pub gap_override: Option<u32>,
    /// Whether the enclosing block was detected as centered.
    pub region_is_centered: bool,
}

impl AddParams {
    /// Atomic parameters: no wrapping, no row-by-row analysis.
    pub fn atomic(scale: ScaleMode, just: Justify) -> Self {
        Self {
            wrap: WrapPolicy::Never,
            trim: Some(TrimSides::ALL),
            allow_analysis: false,
            scale,
            just,
            from_vertical_break: false,
            gap_override: None,
            region_is_centered: false,
        }
    }
}

/// Minimum pixel width for a region to be worth compositing.
const MIN_ADD_WIDTH_PX: u32 = 6;
/// Oversampling cap for small unscaled regions.
const MAX_OVERSAMPLE: f64 = 10.0;

/// Analyze or composite one region onto the canvas.
///
/// Every rendering path ends here: vertical-break blocks, wrapped-line
/// flushes, figure rows, and whole unwrapped regions.
pub fn region_add(
    region: &Region<'_>,
    settings: &Settings,
    canvas: &mut MasterCanvas,
    params: AddParams,
) -> Result<()> {
    let mut region = region.clone();
    let outer = region.rect;
    if let Some(sides) = params.trim {
        if settings.src_trim {
            region.trim_margins(sides);
        }
    }
    if region.is_blank() || region.rect.width() < MIN_ADD_WIDTH_PX || region.rect.height() < 2 {
        return Ok(());
    }

    // Coming straight from the vertical splitter, restore margins toward
    // the pre-trim bounds so indentation survives the trim, up to the
    // maximum region width.
    if params.from_vertical_break {
        widen_to_max_region_width(&mut region, settings, &outer);
    }

    let too_wide = region.width_in() > settings.max_region_width_in;
    let wrap_now = params.wrap == WrapPolicy::Always
        || (params.wrap == WrapPolicy::IfTooWide && too_wide);
    if wrap_now {
        return crate::reflow::analyze_and_flow(&region, settings, canvas, true, params);
    }
    if params.allow_analysis {
        return crate::reflow::analyze_and_flow(&region, settings, canvas, false, params);
    }

    add_atomic(&region, settings, canvas, params)
}

/// Widen the region's rectangle back toward its pre-trim bounds, favoring
/// the side that was trimmed less, limited to the maximum region width.
/// Never extends past `outer`, so a column block stays inside its column.
fn widen_to_max_region_width(region: &mut Region<'_>, settings: &Settings, outer: &PixelRect) {
    let max_px = (settings.max_region_width_in * region.dpi as f64) as u32;
    let maxpix = max_px.min(outer.width());
    let width = region.rect.width();
    if width >= maxpix {
        return;
    }
    let dpix = (outer.width() - maxpix) / 2;
    let trim_left = region.rect.c1 - outer.c1;
    let trim_right = outer.c2 - region.rect.c2;
    let (c1, c2) = if trim_left < trim_right {
        let c1 = if trim_left > dpix {
            outer.c1 + dpix
        } else {
            region.rect.c1
        };
        (c1, c1 + maxpix - 1)
    } else {
        let c2 = if trim_right > dpix {
            outer.c2 - dpix
        } else {
            region.rect.c2
        };
        ((c2 + 1).saturating_sub(maxpix), c2)
    };
    region.rect = PixelRect::new(
        c1.max(outer.c1),
        region.rect.r1,
        c2.min(outer.c2),
        region.rect.r2,
    );
}

/// Composite one region atomically: crop, scale, place.
pub fn add_atomic(
    region: &Region<'_>,
    settings: &Settings,
    canvas: &mut MasterCanvas,
    params: AddParams,
) -> Result<()> {
    let mut region = region.clone();
    let usable = settings.usable_width();
    let src_w = region.rect.width();
    let src_h = region.rect.height();

    let tall_region = region.height_in() >= settings.min_figure_height_in;
    let mut just = params.just;
    if tall_region {
        // Figures never join a pending wrapped line.
        canvas.flush_wrap(settings)?;
        if let Some(fig_just) = settings.dst_figure_justify {
            just = fig_just;
        }
    }

    // Destination width per the scaling policy.
    let native_w =
        ((src_w as f64) * settings.dst_dpi as f64 / region.dpi.max(1) as f64).round() as u32;
    let mut w = match params.scale {
        ScaleMode::Force(factor) => ((native_w as f64) * factor).round() as u32,
        ScaleMode::FitWidth => usable,
        ScaleMode::NativeUnlessOverflow => native_w,
    };
    if params.scale != ScaleMode::FitWidth {
        // Cap oversampling of small regions.
        let max_w = ((src_w as f64) * MAX_OVERSAMPLE) as u32;
        w = w.min(max_w);
    }

    // Tall regions may expand toward the full device width.
    if tall_region {
        if let Some(pct) = settings.dst_fit_to_page {
            w = if pct < 0 {
                usable
            } else {
                w + ((usable.saturating_sub(w)) as f64 * pct.min(100) as f64 / 100.0) as u32
            };
        }
    }
    w = w.clamp(1, usable);
    let h = ((src_h as f64) * (w as f64) / (src_w as f64)).round().max(1.0) as u32;

    let scale_w = w as f64 / src_w as f64;
    let scale_h = h as f64 / src_h as f64;
    debug!(
        "add_atomic: src ({},{})-({},{}) -> {}x{} (scale {:.3}x{:.3})",
        region.rect.c1, region.rect.r1, region.rect.c2, region.rect.r2, w, h, scale_w, scale_h
    );

    let cropped = crop_to_owned(region.bmp, &region.rect);
    let rendered = if (w, h) == (src_w, src_h) {
        cropped
    } else {
        resample(&cropped, w, h)
    };

    // Carry the coordinate maps through the scale; synthesize a
    // whole-region map when the wrapper left none.
    let mut maps = match region.maps.take() {
        Some(mut maps) => {
            for map in &mut maps {
                map.scale_dst(scale_w, scale_h);
            }
            maps
        },
        None => vec![WRectMap {
            src_page: region.page_index,
            src_rot_deg: region.rotation_deg,
            src_dpi_w: region.dpi as f64 * scale_w,
            src_dpi_h: region.dpi as f64 * scale_h,
            src_origin: (region.rect.c1, region.rect.r1),
            dst_origin: (0, 0),
            extent: (w, h),
        }],
    };

    let rowbase = ((region.bbox.rowbase.saturating_sub(region.rect.r1)) as f64 * scale_h)
        .round() as u32;
    let crop = CropBox {
        src_page: region.page_index,
        src_rot_deg: region.rotation_deg,
        src_rect_px: [region.rect.c1, region.rect.r1, region.rect.c2, region.rect.r2],
        dst_rect_px: [0, 0, 0, 0], // filled in by the canvas at placement
    };

    let x_off = match just {
        Justify::Left => 0,
        Justify::Center => usable.saturating_sub(w) / 2,
        Justify::Right => usable.saturating_sub(w),
    };
    for map in &mut maps {
        map.translate_dst(x_off, 0);
    }

    canvas.add_block(
        settings,
        rendered,
        x_off,
        rowbase,
        params.gap_override,
        crop,
        BlockInfo {
            src_page: region.page_index,
            src_rect: region.rect,
            dst_row: 0,
            dst_height: h,
        },
        maps,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_policy_from_settings() {
        let mut settings = Settings::default();
        settings.text_wrap = TextWrap::Off;
        assert_eq!(WrapPolicy::from_settings(&settings), WrapPolicy::Never);
        settings.text_wrap = TextWrap::Reflow;
        assert_eq!(WrapPolicy::from_settings(&settings), WrapPolicy::IfTooWide);
        settings.text_wrap = TextWrap::ReflowShortLines;
        assert_eq!(WrapPolicy::from_settings(&settings), WrapPolicy::Always);
    }

    #[test]
    fn test_wrectmap_scale_dst() {
        let mut map = WRectMap {
            src_page: 0,
            src_rot_deg: 0,
            src_dpi_w: 300.0,
            src_dpi_h: 300.0,
            src_origin: (10, 20),
            dst_origin: (100, 200),
            extent: (50, 30),
        };
        map.scale_dst(0.5, 2.0);
        assert_eq!(map.dst_origin, (50, 400));
        assert_eq!(map.extent, (25, 60));
        assert!((map.src_dpi_w - 150.0).abs() < 1e-9);
        assert!((map.src_dpi_h - 600.0).abs() < 1e-9);
    }

    #[test]
    fn test_atomic_params() {
        let params = AddParams::atomic(ScaleMode::FitWidth, Justify::Center);
        assert_eq!(params.wrap, WrapPolicy::Never);
        assert!(!params.allow_analysis);
        assert_eq!(params.trim, Some(TrimSides::ALL));
    }

    #[test]
    fn test_vertical_break_widening_stays_inside_column() {
        use crate::bitmap::PageBitmap;
        use image::Luma;

        let mut settings = Settings::default().with_device(800, 1000, 100);
        settings.dst_mar_left = 0.0;
        settings.dst_mar_right = 0.0;
        settings.dst_mar_top = 0.0;
        settings.dst_mar_bot = 0.0;
        // Left column of a two-column page, its content hugging the
        // divider side of the column.
        let mut bmp = PageBitmap::blank(1000, 400);
        for row in 100..=160 {
            for col in 400..=460 {
                bmp.image_mut().put_pixel(col, row, Luma([0u8]));
            }
        }
        let mut region = Region::full_page(&bmp, 100, 128, 0, 0);
        region.rect = PixelRect::new(0, 80, 499, 180);

        let mut canvas = MasterCanvas::new(&settings);
        let mut params = AddParams::atomic(ScaleMode::NativeUnlessOverflow, Justify::Left);
        params.from_vertical_break = true;
        region_add(&region, &settings, &mut canvas, params).unwrap();
        canvas.flush_page(&settings, false).unwrap();
        let pages = canvas.take_ready();
        let block = &pages[0].blocks[0];
        // Margins come back, but never past the column boundary.
        assert!(block.src_rect.c2 <= 499, "block reaches col {}", block.src_rect.c2);
        assert!(block.src_rect.c1 <= 400 && block.src_rect.c2 >= 460);
    }

    #[test]
    fn test_force_scale_doubles_block() {
        use crate::bitmap::PageBitmap;
        use image::Luma;

        let mut settings = Settings::default().with_device(200, 300, 100);
        settings.dst_mar_left = 0.0;
        settings.dst_mar_right = 0.0;
        settings.dst_mar_top = 0.0;
        settings.dst_mar_bot = 0.0;
        let mut bmp = PageBitmap::blank(200, 200);
        for row in 30..50 {
            for col in 20..60 {
                bmp.image_mut().put_pixel(col, row, Luma([0u8]));
            }
        }
        let mut region = Region::full_page(&bmp, 100, 128, 0, 0);
        region.rect = PixelRect::new(20, 30, 59, 49);

        let mut canvas = MasterCanvas::new(&settings);
        let params = AddParams::atomic(ScaleMode::Force(2.0), Justify::Left);
        add_atomic(&region, &settings, &mut canvas, params).unwrap();

        // A 40x20 source at matching dpi doubles to 80x40.
        assert_eq!(canvas.pending_rows(), 40);
        canvas.flush_page(&settings, false).unwrap();
        let pages = canvas.take_ready();
        assert_eq!(pages[0].blocks[0].dst_height, 40);
    }
}
