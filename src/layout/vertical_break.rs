//! Vertical block splitting.
//!
//! A region (usually one column, or the whole page) is cut into blocks at
//! unusually large inter-row gaps, and each block is handed on for
//! analysis and compositing.  Cross-call state decides when a mandatory
//! source-derived gap must precede the next block on the canvas: column
//! count changes and region width jumps force one, while a source page
//! boundary only updates the gap value.

use log::debug;

use crate::config::Settings;
use crate::error::Result;
use crate::geometry::PixelRect;
use crate::region::detect::{find_text_rows, DetectOptions};
use crate::region::textrow::TextRow;
use crate::region::{Region, TrimSides};
use crate::render::canvas::MasterCanvas;
use crate::render::{region_add, AddParams, ScaleMode, WrapPolicy};

/// Narrowest region, in inches, against which the fitted-column shortcut
/// applies.
const MIN_REGION_WIDTH_IN: f64 = 1.0;
/// Fewest detected rows for gap statistics to be meaningful.
const MIN_ROWS_FOR_BREAKING: usize = 6;
/// Fallback inter-page gap, inches, when margins make the computed gap
/// negative.
const FALLBACK_PAGE_GAP_IN: f64 = 0.25;

/// Cross-region state for gap decisions, owned by the session.
#[derive(Debug, Clone, Default)]
pub struct BreakState {
    /// Column multiplicity of the previous region.
    pub last_ncols: u32,
    /// Width of the previous region, inches.
    pub last_width_in: f64,
    /// Source page of the previous region.
    pub last_source_page: Option<usize>,
    /// Bottom source row of the previous region.
    pub last_region_r2: u32,
    /// Pixel height of the previous source page.
    pub last_page_height: u32,
}

impl BreakState {
    /// Forget everything; the next region starts a new document section.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Whether two region widths differ enough to force a region gap.
pub fn different_widths(w1: f64, w2: f64) -> bool {
    if w1 <= 0.0 || w2 <= 0.0 {
        return false;
    }
    let (lo, hi) = if w1 <= w2 { (w1, w2) } else { (w2, w1) };
    if lo < 1.0 {
        hi - lo > 0.5
    } else {
        hi / lo > 1.25
    }
}

/// Split a region into vertical blocks and composite each one.
///
/// `ncols` is the column multiplicity of the region (1 for full-span).
/// Breaking is disabled for a negative threshold or when too few rows are
/// detected; the whole region then flows as a single block.
pub fn vertically_break(
    region: &Region<'_>,
    settings: &Settings,
    canvas: &mut MasterCanvas,
    state: &mut BreakState,
    scale: ScaleMode,
    ncols: u32,
) -> Result<()> {
    let mut region = region.clone();
    if settings.src_trim {
        region.trim_margins(TrimSides::ALL);
    }
    if region.is_blank() {
        return Ok(());
    }
    find_text_rows(
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

    let dpi = region.dpi.max(1) as f64;
    let width_in = region.width_in();
    let height_in = region.height_in();

    // Region gap against the previous composited region.  The gap becomes
    // mandatory only when the layout changes shape; a plain source-page
    // boundary just changes the gap value.
    let mandatory =
        state.last_ncols != ncols || different_widths(state.last_width_in, width_in);
    let gap_in = match state.last_source_page {
        Some(page) if page == region.page_index => {
            let gap = (region.rect.r1 as f64 - state.last_region_r2 as f64 - 1.0) / dpi;
            if gap < 0.0 {
                FALLBACK_PAGE_GAP_IN
            } else {
                gap
            }
        },
        Some(_) => {
            // Across a page boundary: bottom leftover of the old page plus
            // the top offset on the new one, minus the source margins.
            let bottom = (state.last_page_height.saturating_sub(state.last_region_r2) as f64
                / dpi
                - settings.mar_bot)
                .max(0.0);
            let top = (region.rect.r1 as f64 / dpi - settings.mar_top).max(0.0);
            bottom + top
        },
        None => 0.0,
    };
    canvas.mandatory_region_gap = mandatory;
    canvas.page_region_gap_in = gap_in;

    // A region already close to the column width renders at a single
    // fitted scale instead of being wrapped.
    let mut wrap = WrapPolicy::from_settings(settings);
    if settings.fit_columns
        && scale == ScaleMode::FitWidth
        && width_in > MIN_REGION_WIDTH_IN
        && width_in / settings.max_region_width_in < 1.25
        && height_in > 0.5
    {
        debug!("vertically_break: fitted column, wrapping off ({width_in:.2}in wide)");
        wrap = WrapPolicy::Never;
    }

    // Break threshold from the median inter-row gap.
    let rows = region.rows.sorted_by_position();
    let biggap = if settings.vertical_break_threshold < 0.0
        || rows.len() < MIN_ROWS_FOR_BREAKING
    {
        None
    } else {
        let by_gap = region.rows.sorted_by_gap();
        let median_gap = by_gap[by_gap.len() / 2].gap as f64;
        Some((median_gap * settings.vertical_break_threshold).max(1.0))
    };

    let blocks = group_rows_by_gap(&rows, biggap);
    debug!(
        "vertically_break: {} rows -> {} blocks (ncols={ncols})",
        rows.len(),
        blocks.len()
    );

    let mut prev_bottom: Option<u32> = None;
    for &(r1, r2) in &blocks {
        if let Some(prev) = prev_bottom {
            // Intra-region gap between blocks, never mandatory.
            canvas.page_region_gap_in = (r1 as f64 - prev as f64 - 1.0).max(0.0) / dpi;
        }
        canvas.region_start = true;
        let block = region.subregion(PixelRect::new(region.rect.c1, r1, region.rect.c2, r2));
        let params = AddParams {
            wrap,
            trim: Some(TrimSides::ALL),
            allow_analysis: true,
            scale,
            just: settings.dst_justify.unwrap_or_default(),
            from_vertical_break: true,
            gap_override: None,
            region_is_centered: false,
        };
        region_add(&block, settings, canvas, params)?;
        prev_bottom = Some(r2);
    }

    state.last_ncols = ncols;
    state.last_width_in = width_in;
    state.last_source_page = Some(region.page_index);
    state.last_region_r2 = region.rect.r2;
    state.last_page_height = region.bmp.height();
    Ok(())
}

/// Group consecutive rows into `(top, bottom)` blocks, splitting where the
/// gap below a row exceeds `biggap`.  With no oversized gap (or no
/// threshold at all) the rows come back as a single block spanning their
/// full extent.
fn group_rows_by_gap(rows: &[TextRow], biggap: Option<f64>) -> Vec<(u32, u32)> {
    let mut blocks: Vec<(u32, u32)> = Vec::new();
    let mut top = rows[0].r1;
    for (i, row) in rows.iter().enumerate() {
        let last = i + 1 == rows.len();
        let breaks = !last && biggap.map_or(false, |big| row.gap as f64 > big);
        if last || breaks {
            blocks.push((top, row.r2));
            if !last {
                top = rows[i + 1].r1;
            }
        }
    }
    blocks
}
