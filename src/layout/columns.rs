//! Multi-column page decomposition.
//!
//! The divider search looks for a clear vertical whitespace shaft near the
//! horizontal midpoint of a region, walking outward symmetrically.  Found
//! dividers split the region into side-by-side columns; rows above the
//! columned area are emitted as full-span regions.  The final region list
//! comes back in reading order, with same-side columns of vertically
//! adjacent bands chained together when their dividers line up.

use log::debug;

use crate::bitmap::PixelCountCache;
use crate::config::{GridOrder, GridParams, Settings};
use crate::geometry::PixelRect;
use crate::region::detect::{find_text_rows, DetectOptions};
use crate::region::{column_height_and_gap_test, Region};

/// Inter-band vertical gap, in inches, beyond which same-side columns of
/// adjacent bands are no longer chained in reading order.
const COLUMN_ROW_GAP_BREAK_IN: f64 = 0.28;

/// One region of the decomposed page.
#[derive(Debug, Clone)]
pub struct PageRegion<'a> {
    /// The region's pixels and extents.
    pub region: Region<'a>,
    /// Whether the region spans the full page width (never a column).
    pub fullspan: bool,
    /// Column multiplicity at this region's depth: 1 for full-span, 2 for
    /// a column of a two-column split, 4 for a column of a column.
    pub level: u32,
}

/// The decomposed page, in reading order.
#[derive(Debug, Default)]
pub struct PageRegions<'a> {
    /// Regions in reading order.
    pub regions: Vec<PageRegion<'a>>,
}

/// Result of one divider search over a region.
#[derive(Debug)]
pub struct DividerOutcome<'a> {
    /// Full-span rows above the columned area, when any.
    pub fullspan_above: Option<Region<'a>>,
    /// The two column regions (left, right in page coordinates).
    pub left: Region<'a>,
    /// Right column.
    pub right: Region<'a>,
    /// Divider column.
    pub divider_col: u32,
    /// Last source row covered by the columns; analysis continues below.
    pub bottom: u32,
}

/// A shaft test that failed: the row span tested and the extent of the
/// foreground content inside it.
#[derive(Debug, Clone, Copy)]
struct ShaftBlock {
    span: (u32, u32),
    fg: (u32, u32),
}

/// Per-candidate-column memo for one divider search.
///
/// The search shrinks its row span monotonically, so two facts transfer:
/// a span with zero stray pixels stays clear on any sub-span, and a failed
/// span still fails on a sub-span that contains all of its foreground (the
/// per-column counts are unchanged while the tolerance only tightens).
#[derive(Debug)]
struct ShaftMemo {
    c0: u32,
    clear: Vec<Option<(u32, u32)>>,
    blocked: Vec<Option<ShaftBlock>>,
}

impl ShaftMemo {
    fn new(mid: u32, reach: u32) -> Self {
        let c0 = mid.saturating_sub(reach);
        let len = (mid + reach - c0 + 1) as usize;
        Self {
            c0,
            clear: vec![None; len],
            blocked: vec![None; len],
        }
    }

    fn index(&self, col: u32) -> Option<usize> {
        let i = col.checked_sub(self.c0)? as usize;
        (i < self.clear.len()).then_some(i)
    }

    /// A memoized outcome for this column and row span, when one applies.
    fn lookup(&self, col: u32, top: u32, bottom: u32) -> Option<Option<u32>> {
        let i = self.index(col)?;
        if let Some((t, b)) = self.clear[i] {
            if top >= t && bottom <= b {
                return Some(Some(1));
            }
        }
        if let Some(block) = self.blocked[i] {
            if top >= block.span.0
                && bottom <= block.span.1
                && block.fg.0 >= top
                && block.fg.1 <= bottom
            {
                return Some(None);
            }
        }
        None
    }

    fn record(
        &mut self,
        col: u32,
        shaft: &PixelRect,
        region: &Region<'_>,
        outcome: Option<u32>,
    ) {
        let Some(i) = self.index(col) else {
            return;
        };
        match outcome {
            Some(1) => {
                let wider = self.clear[i]
                    .map_or(true, |(t, b)| b - t < shaft.r2 - shaft.r1);
                if wider {
                    self.clear[i] = Some((shaft.r1, shaft.r2));
                }
            },
            None => {
                // Keep the record with the widest span; it applies to the
                // most future queries.
                if let Some(old) = self.blocked[i] {
                    if old.span.0 <= shaft.r1 && old.span.1 >= shaft.r2 {
                        return;
                    }
                }
                if let Some(fg) = shaft_fg_extent(region, shaft) {
                    self.blocked[i] = Some(ShaftBlock {
                        span: (shaft.r1, shaft.r2),
                        fg,
                    });
                }
            },
            _ => {},
        }
    }
}

/// Row extent of the foreground pixels inside a shaft.
fn shaft_fg_extent(region: &Region<'_>, shaft: &PixelRect) -> Option<(u32, u32)> {
    let bg = region.bg_threshold;
    let fmin = (shaft.r1..=shaft.r2)
        .find(|&row| region.bmp.row_fg_count(row, shaft.c1, shaft.c2, bg) > 0)?;
    let fmax = (fmin..=shaft.r2)
        .rev()
        .find(|&row| region.bmp.row_fg_count(row, shaft.c1, shaft.c2, bg) > 0)
        .unwrap_or(fmin);
    Some((fmin, fmax))
}

/// One vertical band of the level-1 scan.
#[derive(Debug)]
enum Band<'a> {
    Full(Region<'a>),
    Columns {
        left: Region<'a>,
        right: Region<'a>,
        divider: u32,
        top: u32,
        bottom: u32,
    },
}

/// Search for a vertical whitespace shaft splitting `region` into two
/// columns.
///
/// Candidate divider columns are tested outward from the midpoint over a
/// range of `column_gap_range` times the region width.  Each candidate is
/// perturbed by half the minimum gap width to each side and the
/// least-obstructed
/// placement wins; a perfectly clear shaft stops the scan.  Returns `None`
/// when no divider passes the height and gap validation.
pub fn find_multicolumn_divider<'a>(
    region: &Region<'a>,
    settings: &Settings,
    cache: Option<&PixelCountCache>,
) -> Option<DividerOutcome<'a>> {
    let mut scratch = region.clone();
    find_text_rows(
        &mut scratch,
        settings,
        DetectOptions {
            dynamic_aperture: true,
            remove_small_rows: true,
        },
    );
    let rows = scratch.rows.sorted_by_position();
    if rows.len() < 2 {
        return None;
    }

    let dpi = region.dpi.max(1) as f64;
    let rect = region.rect;
    let min_h_px = ((settings.min_column_height_in * dpi) as u32).max(2);
    let gap_px = ((settings.min_column_gap_in * dpi) as u32).max(1);
    let half = (gap_px / 2).max(1);
    let dm = 1 + (rect.width() as f64 * settings.column_gap_range / 2.0) as u32;
    let mid = rect.mid_column();
    let mut memo = ShaftMemo::new(mid, dm + half);

    for start_i in 0..rows.len() {
        let top = rows[start_i].r1;
        if rows[rows.len() - 1].r2 - top + 1 < min_h_px {
            break;
        }
        for end_j in (start_i..rows.len()).rev() {
            let bottom = rows[end_j].r2;
            if bottom - top + 1 < min_h_px {
                break;
            }

            let mut best: Option<(u32, u32)> = None; // (badness, column)
            'columns: for offset in 0..=dm {
                let candidates = if offset == 0 {
                    [Some(mid), None]
                } else {
                    [mid.checked_sub(offset), Some(mid + offset)]
                };
                for candidate in candidates.into_iter().flatten() {
                    for perturbed in [
                        Some(candidate),
                        candidate.checked_sub(half),
                        Some(candidate + half),
                    ]
                    .into_iter()
                    .flatten()
                    {
                        if perturbed <= rect.c1 + half || perturbed + half >= rect.c2 {
                            continue;
                        }
                        let shaft =
                            PixelRect::new(perturbed - half, top, perturbed + half, bottom);
                        let clearness = match memo.lookup(perturbed, top, bottom) {
                            Some(hit) => hit,
                            None => {
                                let outcome = region.shaft_clearness(
                                    &shaft,
                                    cache,
                                    settings.shaft_clear_tolerance,
                                );
                                memo.record(perturbed, &shaft, region, outcome);
                                outcome
                            },
                        };
                        if let Some(badness) = clearness {
                            if best.map_or(true, |(b, _)| badness < b) {
                                best = Some((badness, perturbed));
                            }
                            if badness == 1 {
                                break 'columns;
                            }
                        }
                    }
                }
            }

            let Some((badness, divider_col)) = best else {
                continue;
            };
            let (test, left, right) = column_height_and_gap_test(
                region,
                top,
                bottom,
                divider_col,
                min_h_px,
                settings.max_column_gap_in,
            );
            if test.right_too_short {
                // Nothing to the right of any divider here; no deeper or
                // shorter span will change that.
                return None;
            }
            if !test.passed() {
                continue;
            }
            debug!(
                "divider found at col {} rows {}..{} (badness {})",
                divider_col, top, bottom, badness
            );
            let fullspan_above = if top > rect.r1 && start_i > 0 {
                Some(region.subregion(PixelRect::new(rect.c1, rect.r1, rect.c2, top - 1)))
            } else {
                None
            };
            return Some(DividerOutcome {
                fullspan_above,
                left,
                right,
                divider_col,
                bottom,
            });
        }
    }
    None
}

/// Decompose a region into full-width bands and column pairs, recursing
/// into columns down to `maxlevels`, and return the result in reading
/// order.
pub fn find_page_regions<'a>(
    region: &Region<'a>,
    settings: &Settings,
    cache: Option<&PixelCountCache>,
    maxlevels: u32,
) -> PageRegions<'a> {
    let mut out = PageRegions::default();
    if maxlevels <= 1 {
        out.regions.push(PageRegion {
            region: region.clone(),
            fullspan: true,
            level: 1,
        });
        return out;
    }

    // Level-1 scan: walk down the region, splitting off column bands.
    let mut bands: Vec<Band<'a>> = Vec::new();
    let mut remaining = region.clone();
    loop {
        match find_multicolumn_divider(&remaining, settings, cache) {
            Some(outcome) => {
                if let Some(above) = outcome.fullspan_above {
                    bands.push(Band::Full(above));
                }
                let top = outcome.left.rect.r1.min(outcome.right.rect.r1);
                bands.push(Band::Columns {
                    left: outcome.left,
                    right: outcome.right,
                    divider: outcome.divider_col,
                    top,
                    bottom: outcome.bottom,
                });
                if outcome.bottom >= remaining.rect.r2 {
                    break;
                }
                let rect = remaining.rect;
                remaining = remaining
                    .subregion(PixelRect::new(rect.c1, outcome.bottom + 1, rect.c2, rect.r2));
                if remaining.is_blank() {
                    break;
                }
            },
            None => {
                if !remaining.is_blank() {
                    bands.push(Band::Full(remaining));
                }
                break;
            },
        }
    }

    assemble_reading_order(&mut out, bands, settings, cache, maxlevels);
    out
}

/// Emit bands in reading order, chaining same-side columns of vertically
/// adjacent bands while their dividers stay aligned and the bands are not
/// separated by a large vertical gap.
fn assemble_reading_order<'a>(
    out: &mut PageRegions<'a>,
    bands: Vec<Band<'a>>,
    settings: &Settings,
    cache: Option<&PixelCountCache>,
    maxlevels: u32,
) {
    let ltr = settings.src_left_to_right;
    let mut i = 0;
    while i < bands.len() {
        match &bands[i] {
            Band::Full(region) => {
                out.regions.push(PageRegion {
                    region: region.clone(),
                    fullspan: true,
                    level: 1,
                });
                i += 1;
            },
            Band::Columns { .. } => {
                // Extend the chain over adjacent aligned column bands.
                let mut j = i;
                while j + 1 < bands.len() {
                    let (Band::Columns { divider: d0, bottom: b0, .. },
                         Band::Columns { divider: d1, top: t1, .. }) =
                        (&bands[j], &bands[j + 1])
                    else {
                        break;
                    };
                    let (width, dpi) = match &bands[i] {
                        Band::Columns { left, right, .. } => (
                            (right.rect.c2 - left.rect.c1 + 1) as f64,
                            left.dpi.max(1) as f64,
                        ),
                        Band::Full(region) => {
                            (region.rect.width() as f64, region.dpi.max(1) as f64)
                        },
                    };
                    let drift = (*d1 as f64 - *d0 as f64).abs() / width.max(1.0);
                    if settings.column_offset_max >= 0.0 && drift > settings.column_offset_max {
                        break;
                    }
                    let gap_in = (t1.saturating_sub(b0 + 1)) as f64 / dpi;
                    if gap_in > COLUMN_ROW_GAP_BREAK_IN {
                        break;
                    }
                    j += 1;
                }

                // First reading side down the whole chain, then the other.
                for side in 0..2 {
                    for band in &bands[i..=j] {
                        let Band::Columns { left, right, .. } = band else {
                            continue;
                        };
                        let column = match (ltr, side) {
                            (true, 0) | (false, 1) => left,
                            _ => right,
                        };
                        push_column(out, column, settings, cache, maxlevels);
                    }
                }
                i = j + 1;
            },
        }
    }
}

/// Append one column region, subdividing it further when levels remain.
fn push_column<'a>(
    out: &mut PageRegions<'a>,
    column: &Region<'a>,
    settings: &Settings,
    cache: Option<&PixelCountCache>,
    maxlevels: u32,
) {
    if maxlevels > 2 {
        let sub = find_page_regions(column, settings, cache, maxlevels - 1);
        for mut pr in sub.regions {
            pr.fullspan = false;
            pr.level = if pr.level == 1 { 2 } else { pr.level * 2 };
            out.regions.push(pr);
        }
    } else {
        out.regions.push(PageRegion {
            region: column.clone(),
            fullspan: false,
            level: 2,
        });
    }
}

/// Decompose a region into a fixed grid of overlapping cells, bypassing
/// the divider search.
pub fn grid_regions<'a>(
    region: &Region<'a>,
    settings: &Settings,
    grid: &GridParams,
) -> PageRegions<'a> {
    let rect = region.rect;
    let cell_w = (rect.width() / grid.cols.max(1)).max(1);
    let cell_h = (rect.height() / grid.rows.max(1)).max(1);
    let over_w = cell_w * grid.overlap_percent.min(100) / 100;
    let over_h = cell_h * grid.overlap_percent.min(100) / 100;

    let cell = |gc: u32, gr: u32| -> PixelRect {
        let c1 = (rect.c1 + gc * cell_w).saturating_sub(over_w / 2).max(rect.c1);
        let r1 = (rect.r1 + gr * cell_h).saturating_sub(over_h / 2).max(rect.r1);
        let c2 = (rect.c1 + (gc + 1) * cell_w - 1 + over_w / 2).min(rect.c2);
        let r2 = (rect.r1 + (gr + 1) * cell_h - 1 + over_h / 2).min(rect.r2);
        PixelRect::new(c1, r1, c2, r2)
    };

    let mut out = PageRegions::default();
    let mut push = |gc: u32, gr: u32| {
        // Reading direction flips the grid column order.
        let gc = if settings.src_left_to_right {
            gc
        } else {
            grid.cols - 1 - gc
        };
        out.regions.push(PageRegion {
            region: region.subregion(cell(gc, gr)),
            fullspan: false,
            level: 1,
        });
    };
    match grid.order {
        GridOrder::ColumnMajor => {
            for gc in 0..grid.cols {
                for gr in 0..grid.rows {
                    push(gc, gr);
                }
            }
        },
        GridOrder::RowMajor => {
            for gr in 0..grid.rows {
                for gc in 0..grid.cols {
                    push(gc, gr);
                }
            }
        },
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::PageBitmap;
    use image::Luma;

    fn blacken(bmp: &mut PageBitmap, rect: PixelRect) {
        for row in rect.r1..=rect.r2 {
            for col in rect.c1..=rect.c2 {
                bmp.image_mut().put_pixel(col, row, Luma([0u8]));
            }
        }
    }

    /// Two columns of text lines with a clear central shaft.
    fn two_column_page() -> PageBitmap {
        let mut bmp = PageBitmap::blank(1000, 1200);
        for line in 0..20 {
            let r1 = 50 + line * 55;
            blacken(&mut bmp, PixelRect::new(50, r1, 450, r1 + 25));
            blacken(&mut bmp, PixelRect::new(550, r1, 950, r1 + 25));
        }
        bmp
    }

    fn settings_100dpi() -> Settings {
        let mut settings = Settings::default();
        settings.src_dpi = 100;
        settings
    }

    #[test]
    fn test_divider_found_in_two_column_page() {
        let bmp = two_column_page();
        let settings = settings_100dpi();
        let region = Region::full_page(&bmp, 100, 128, 0, 0);
        let outcome =
            find_multicolumn_divider(&region, &settings, None).expect("divider expected");
        assert!(outcome.divider_col > 450 && outcome.divider_col < 550);
        assert!(outcome.left.rect.c2 <= 450);
        assert!(outcome.right.rect.c1 >= 550);
    }

    #[test]
    fn test_divider_found_in_gap_one_shaft_wide() {
        // The clear gap is exactly one shaft wide (11 px at 100 dpi) and
        // off the midpoint, so only a placement within half a gap width
        // of a candidate lands inside it.
        let mut bmp = PageBitmap::blank(1000, 1200);
        for line in 0..20 {
            let r1 = 50 + line * 55;
            blacken(&mut bmp, PixelRect::new(50, r1, 497, r1 + 25));
            blacken(&mut bmp, PixelRect::new(509, r1, 950, r1 + 25));
        }
        let settings = settings_100dpi();
        let region = Region::full_page(&bmp, 100, 128, 0, 0);
        let outcome =
            find_multicolumn_divider(&region, &settings, None).expect("divider expected");
        assert!((498..=508).contains(&outcome.divider_col));
    }

    #[test]
    fn test_shaft_memo_clear_transfers_to_sub_span() {
        let bmp = PageBitmap::blank(200, 300);
        let region = Region::full_page(&bmp, 100, 128, 0, 0);
        let mut memo = ShaftMemo::new(100, 20);
        let shaft = PixelRect::new(98, 10, 102, 290);
        memo.record(100, &shaft, &region, Some(1));
        assert_eq!(memo.lookup(100, 50, 200), Some(Some(1)));
        // Wider than the recorded span, or a different column: no hit.
        assert_eq!(memo.lookup(100, 5, 200), None);
        assert_eq!(memo.lookup(101, 50, 200), None);
    }

    #[test]
    fn test_shaft_memo_blocked_needs_fg_inside_query() {
        let mut bmp = PageBitmap::blank(200, 300);
        blacken(&mut bmp, PixelRect::new(90, 20, 110, 40));
        let region = Region::full_page(&bmp, 100, 128, 0, 0);
        let mut memo = ShaftMemo::new(100, 20);
        let shaft = PixelRect::new(98, 10, 102, 290);
        memo.record(100, &shaft, &region, None);
        // The blocking bar covers rows 20..=40.  A sub-span that still
        // contains it is known to fail; one that excludes it must be
        // retested.
        assert_eq!(memo.lookup(100, 10, 290), Some(None));
        assert_eq!(memo.lookup(100, 15, 200), Some(None));
        assert_eq!(memo.lookup(100, 50, 290), None);
    }

    #[test]
    fn test_divider_deterministic() {
        let bmp = two_column_page();
        let settings = settings_100dpi();
        let region = Region::full_page(&bmp, 100, 128, 0, 0);
        let first = find_multicolumn_divider(&region, &settings, None).unwrap();
        let second = find_multicolumn_divider(&region, &settings, None).unwrap();
        assert_eq!(first.divider_col, second.divider_col);
        assert_eq!(first.bottom, second.bottom);
    }

    #[test]
    fn test_cache_and_direct_agree() {
        let bmp = two_column_page();
        let settings = settings_100dpi();
        let region = Region::full_page(&bmp, 100, 128, 0, 0);
        let cache = PixelCountCache::build(&bmp, 128, bmp.width() - 1, bmp.height() - 1);
        let direct = find_multicolumn_divider(&region, &settings, None).unwrap();
        let cached = find_multicolumn_divider(&region, &settings, Some(&cache)).unwrap();
        assert_eq!(direct.divider_col, cached.divider_col);
    }

    #[test]
    fn test_single_column_page_has_no_divider() {
        let mut bmp = PageBitmap::blank(1000, 1200);
        for line in 0..20 {
            let r1 = 50 + line * 55;
            blacken(&mut bmp, PixelRect::new(50, r1, 950, r1 + 25));
        }
        let settings = settings_100dpi();
        let region = Region::full_page(&bmp, 100, 128, 0, 0);
        assert!(find_multicolumn_divider(&region, &settings, None).is_none());
    }

    #[test]
    fn test_reading_order_ltr() {
        let bmp = two_column_page();
        let settings = settings_100dpi();
        let region = Region::full_page(&bmp, 100, 128, 0, 0);
        let regions = find_page_regions(&region, &settings, None, 2);
        assert_eq!(regions.regions.len(), 2);
        assert!(!regions.regions[0].fullspan);
        assert!(regions.regions[0].region.rect.c2 < regions.regions[1].region.rect.c1);
    }

    #[test]
    fn test_reading_order_rtl_reverses_columns() {
        let bmp = two_column_page();
        let mut settings = settings_100dpi();
        settings.src_left_to_right = false;
        let region = Region::full_page(&bmp, 100, 128, 0, 0);
        let regions = find_page_regions(&region, &settings, None, 2);
        assert_eq!(regions.regions.len(), 2);
        // Right column reads first.
        assert!(regions.regions[0].region.rect.c1 > regions.regions[1].region.rect.c2);
    }

    #[test]
    fn test_header_emitted_as_fullspan_before_columns() {
        let mut bmp = two_column_page();
        // Full-width header above the columns.
        blacken(&mut bmp, PixelRect::new(50, 5, 950, 30));
        let settings = settings_100dpi();
        let region = Region::full_page(&bmp, 100, 128, 0, 0);
        let regions = find_page_regions(&region, &settings, None, 2);
        assert!(regions.regions.len() >= 3);
        assert!(regions.regions[0].fullspan);
        assert!(regions.regions[0].region.rect.r2 < regions.regions[1].region.rect.r1);
    }

    #[test]
    fn test_grid_row_major_order() {
        let bmp = PageBitmap::blank(400, 400);
        let settings = Settings::default();
        let region = Region::full_page(&bmp, 300, 128, 0, 0);
        let grid = GridParams {
            rows: 2,
            cols: 2,
            overlap_percent: 10,
            order: GridOrder::RowMajor,
        };
        let regions = grid_regions(&region, &settings, &grid);
        assert_eq!(regions.regions.len(), 4);
        // Row-major: second cell is to the right of the first.
        assert!(regions.regions[1].region.rect.c1 > regions.regions[0].region.rect.c1);
        assert_eq!(regions.regions[0].region.rect.r1, regions.regions[1].region.rect.r1);
    }

    #[test]
    fn test_grid_cells_overlap() {
        let bmp = PageBitmap::blank(400, 400);
        let settings = Settings::default();
        let region = Region::full_page(&bmp, 300, 128, 0, 0);
        let grid = GridParams {
            rows: 1,
            cols: 2,
            overlap_percent: 20,
            order: GridOrder::RowMajor,
        };
        let regions = grid_regions(&region, &settings, &grid);
        assert_eq!(regions.regions.len(), 2);
        assert!(regions.regions[0].region.rect.c2 >= regions.regions[1].region.rect.c1);
    }
}
