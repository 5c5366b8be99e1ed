//! Per-block line statistics and justification classification.
//!
//! For a multi-line block this computes median letter heights, the median
//! line spacing (or an irregular sentinel when the spacing variance is too
//! high), and per-row justification, indentation, and short-line flags that
//! drive the word wrapper.

use log::debug;

use crate::config::{Justify, Settings};
use crate::region::textrow::{RowType, TextRow};
use crate::region::Region;

/// Coefficient-of-variation cutoff for "regular" line spacing.
const SPACING_CV_CUTOFF: f64 = 0.15;
/// Percent margin within which a row's spacing snaps to the block median.
const SPACING_AGREE_PERCENT: f64 = 10.0;
/// Percent margin within which a row's font-derived single-space height
/// snaps to the block's.
const SINGLE_SPACE_AGREE_PERCENT: f64 = 20.0;

/// Transient statistics for one multi-line block.
#[derive(Debug, Clone)]
pub struct MultilineParams {
    /// First row index of the block within the region's row list.
    pub i1: usize,
    /// Last row index (inclusive).
    pub i2: usize,
    /// Number of lines in the block.
    pub nlines: usize,
    /// Median capital-letter height, pixels.
    pub median_capheight: f64,
    /// Median lowercase letter height, pixels.
    pub median_lcheight: f64,
    /// Median 50%-threshold letter height, pixels.
    pub median_h5050: f64,
    /// Median line spacing over the middle 50% of values, or `None` when
    /// the spacing is too irregular to trust.
    pub median_line_spacing: Option<f64>,
    /// Mean gap between rows, pixels (at least 1).
    pub mean_row_gap: f64,
    /// Largest gap between consecutive rows, pixels.
    pub maxgap: u32,
    /// Whether the block has a ragged trailing edge.
    pub ragged_right: bool,
    /// Whether the block reads as fully justified (both edges flush).
    pub fully_justified: bool,
    /// Per-line detected justification.
    pub just: Vec<Justify>,
    /// Per-line preserved-indent flag (paragraph starts).
    pub indented: Vec<bool>,
    /// Per-line short-line flag (stop wrapping after this line).
    pub short_line: Vec<bool>,
}

impl MultilineParams {
    /// Compute the statistics for the rows of `region` whose band midpoint
    /// falls inside the region rectangle.  Returns `None` when no rows
    /// qualify.
    pub fn compute(
        region: &Region<'_>,
        settings: &Settings,
        region_is_centered: bool,
    ) -> Option<Self> {
        let rows = region.rows.sorted_by_position();
        if rows.is_empty() {
            return None;
        }

        // Row-index range of this block, by band midpoint.
        let i1 = rows
            .iter()
            .position(|row| (row.r1 + row.r2) / 2 >= region.rect.r1)?;
        let i2 = rows
            .iter()
            .rposition(|row| (row.r1 + row.r2) / 2 <= region.rect.r2)?;
        if i2 < i1 {
            return None;
        }
        let nlines = i2 - i1 + 1;
        let block = &rows[i1..=i2];

        let width = region.rect.width() as f64;
        let dpi = region.dpi.max(1) as f64;
        let ltr = settings.src_left_to_right;

        // Letter-height medians over non-figure rows.
        let text_rows: Vec<&TextRow> =
            block.iter().filter(|r| r.row_type != RowType::Figure).collect();
        let (median_capheight, median_lcheight, median_h5050) = if text_rows.is_empty() {
            (
                block[0].capheight as f64,
                block[0].lcheight as f64,
                block[0].h5050 as f64,
            )
        } else {
            (
                median_val(&mut text_rows.iter().map(|r| r.capheight as f64).collect::<Vec<_>>()),
                median_val(&mut text_rows.iter().map(|r| r.lcheight as f64).collect::<Vec<_>>()),
                median_val(&mut text_rows.iter().map(|r| r.h5050 as f64).collect::<Vec<_>>()),
            )
        };

        let maxgap = block[..block.len().saturating_sub(1)]
            .iter()
            .map(|r| r.gap)
            .max()
            .unwrap_or(0)
            .max(2);

        // Representative text height: median baseline-to-top distance.
        let textheight = if text_rows.is_empty() {
            block[0].height() as f64
        } else {
            median_val(
                &mut text_rows
                    .iter()
                    .map(|r| (r.rowbase - r.r1 + 1) as f64)
                    .collect::<Vec<_>>(),
            )
        }
        .max(1.0);

        // Median line spacing over the middle 50% of the spacing values, if
        // the spread is small enough to be trusted.
        // The last row's rowheight is its band height, not a spacing;
        // leave it out.
        let mut spacings: Vec<f64> = block[..block.len() - 1]
            .iter()
            .filter(|r| r.row_type != RowType::Figure)
            .map(|r| r.rowheight as f64)
            .collect();
        let median_line_spacing = regular_median_spacing(&mut spacings);
        debug!(
            "line stats: nlines={nlines} textheight={textheight:.1} median_spacing={median_line_spacing:?}"
        );

        let mean_row_gap = (median_line_spacing.unwrap_or(0.0) - textheight).max(1.0);

        // Reference margins, calibrated by the median indent so that rows
        // flush with the block's own indent still get wrapped.
        let indents: Vec<f64> = block
            .iter()
            .map(|row| {
                if ltr {
                    (row.c1 - region.rect.c1) as f64
                } else {
                    (region.rect.c2 - row.c2) as f64
                }
            })
            .collect();
        let median_indent = if nlines > 3 {
            let mut sorted = indents.clone();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
            sorted[nlines / 2]
        } else {
            0.0
        };
        let cal_c1 = region.rect.c1 as f64 + if ltr { median_indent } else { 0.0 };
        let cal_c2 = region.rect.c2 as f64 - if ltr { 0.0 } else { median_indent };

        // Ragged right edge: fewer than half the lines reach the margin.
        let ragged_right = if nlines < 3 {
            true
        } else {
            let flushcount = block
                .iter()
                .filter(|row| {
                    let trail = if ltr {
                        (region.rect.c2 - row.c2) as f64
                    } else {
                        (row.c1 - region.rect.c1) as f64
                    };
                    trail / textheight < 0.5 && trail / dpi < 0.1
                })
                .count();
            flushcount <= nlines / 2
        };

        let mut just = Vec::with_capacity(nlines);
        let mut indented = Vec::with_capacity(nlines);
        let mut short_line = Vec::with_capacity(nlines);

        for (k, row) in block.iter().enumerate() {
            let i1f = (row.c1 as f64 - cal_c1) / width;
            let i2f = (cal_c2 - row.c2 as f64) / width;
            let ilf = if ltr { i1f } else { i2f };
            let ilfi = ilf * width / dpi; // leading indent in inches
            let ifmin = i1f.min(i2f).max(0.01);
            let dif = (i1f - i2f).abs();
            let indent1 = if ltr {
                (row.c1 as f64 - cal_c1) / textheight
            } else {
                (cal_c2 - row.c2 as f64) / textheight
            };

            let (is_indented, centered) = if !region_is_centered {
                let ind = indent1 > 0.5 && ilfi < 1.2 && ilf < 0.25;
                (ind, !ind && indent1 > 1.0 && dif / ifmin < 0.5)
            } else {
                let cen = dif < 0.1 || dif / ifmin < 0.5;
                (indent1 > 0.5 && ilfi < 1.2 && ilf < 0.25 && !cen, cen)
            };

            let line_just = if centered {
                Justify::Center
            } else if ltr {
                // The 1% margin favors left justification in close cases.
                if is_indented || i1f < i2f + 0.01 {
                    Justify::Left
                } else {
                    Justify::Right
                }
            } else if is_indented || i2f < i1f + 0.01 {
                Justify::Right
            } else {
                Justify::Left
            };

            // Trailing whitespace decides whether wrapping continues past
            // this line.
            let del = if ltr {
                cal_c2 - row.c2 as f64
            } else {
                row.c1 as f64 - cal_c1
            };
            let mut short = if !ragged_right {
                del / textheight > 0.5
            } else {
                del / (width - 1.0).max(1.0) > 0.25
            };
            // A font-size jump against the next row also stops wrapping.
            if !short && i1 + k < i2 {
                let next = &rows[i1 + k + 1];
                let h_jump = row.h5050 as f64 > next.h5050 as f64 * 1.5
                    || (row.h5050 as f64) * 1.5 < next.h5050 as f64;
                let rh_jump = row.rowheight as f64 > next.rowheight as f64 * 1.5
                    || (row.rowheight as f64) * 1.5 < next.rowheight as f64;
                if h_jump && rh_jump {
                    short = true;
                }
            }

            just.push(line_just);
            indented.push(is_indented);
            short_line.push(short);
        }

        Some(Self {
            i1,
            i2,
            nlines,
            median_capheight,
            median_lcheight,
            median_h5050,
            median_line_spacing,
            mean_row_gap,
            maxgap,
            ragged_right,
            fully_justified: !ragged_right,
            just,
            indented,
            short_line,
        })
    }
}

/// Single-spaced line height derived from the font letter sizes.
///
/// For common 12 pt faces, single spacing is ~1.16x the font size and the
/// mean of cap/lowercase/50% letter heights is ~1/1.7 of the font size.
pub fn line_spacing_from_font_size(lcheight: f64, h5050: f64, capheight: f64) -> f64 {
    1.16 * 1.7 * ((lcheight + capheight + h5050) / 3.0)
}

/// Line spacing in pixels for one row of a block.
///
/// Snaps to the block median within a 10% agreement margin; a configured
/// line-spacing override replaces the computed value.
pub fn line_spacing_pixels(
    row: &TextRow,
    prev: Option<&TextRow>,
    mlp: &MultilineParams,
    settings: &Settings,
    allow_text_wrapping: bool,
) -> u32 {
    let median_single = line_spacing_from_font_size(
        mlp.median_lcheight,
        mlp.median_h5050,
        mlp.median_capheight,
    )
    .max(1.0);
    let mut row_single = line_spacing_from_font_size(
        row.lcheight as f64,
        row.h5050 as f64,
        row.capheight as f64,
    );
    if row_single < median_single / 4.0
        || agree_within(median_single, row_single, SINGLE_SPACE_AGREE_PERCENT)
    {
        row_single = median_single;
    }

    let mut spacing_px = if allow_text_wrapping {
        match mlp.median_line_spacing {
            Some(median) => median,
            // Irregular spacing: default to 1.2x single spacing.
            None => 1.2 * median_single,
        }
    } else if row.row_type == RowType::Figure {
        match prev {
            Some(prev) => (row.r2 as f64 - prev.r2 as f64 + 1.0).max(1.0),
            None => row.height() as f64,
        }
    } else {
        row.rowheight as f64
    };
    if let Some(median) = mlp.median_line_spacing {
        if agree_within(spacing_px, median, SPACING_AGREE_PERCENT) {
            spacing_px = median;
        }
    }

    // Normalize, apply any user override, then convert back to pixels.
    let mut normalized = spacing_px / median_single;
    match settings.vertical_line_spacing {
        Some(vls) if vls > 0.0 => normalized = vls,
        Some(vls) if normalized > vls.abs() => normalized = vls.abs(),
        _ => {},
    }
    let mut result = if allow_text_wrapping {
        normalized * median_single
    } else {
        normalized * row_single
    };

    // Never tighter than the font allows.
    if result / row_single < 0.9 {
        result = row_single;
    }
    result.round() as u32
}

/// Whether the rows of a block are centered as a group: most rows have
/// roughly equal left and right margins, and those margins are real.
pub fn region_is_centered(region: &Region<'_>) -> bool {
    let rows = &region.rows.rows;
    if rows.is_empty() {
        return false;
    }
    let mut balanced = 0usize;
    let mut margin_sum = 0f64;
    for row in rows {
        let left = (row.c1 - region.rect.c1) as f64;
        let right = (region.rect.c2 - row.c2) as f64;
        if (left - right).abs() <= 0.15 * (left + right + 1.0) {
            balanced += 1;
        }
        margin_sum += left.min(right);
    }
    let mean_margin = margin_sum / rows.len() as f64;
    balanced * 4 >= rows.len() * 3 && mean_margin > 0.02 * region.rect.width() as f64
}

/// Two values agree within `percent` of the smaller one.
pub fn agree_within(a: f64, b: f64, percent: f64) -> bool {
    if a <= 0.0 || b <= 0.0 {
        return false;
    }
    (a - b).abs() <= a.min(b) * percent / 100.0
}

/// Median spacing of a block, or `None` when the spread is irregular
/// (coefficient of variation >= 0.15).  A single outlying gap is enough to
/// make the block irregular; the caller then falls back to font-derived
/// spacing instead of trusting a median that hides the outlier.
pub fn regular_median_spacing(spacings: &mut [f64]) -> Option<f64> {
    if spacings.len() < 2 {
        return None;
    }
    let n = spacings.len() as f64;
    let mean = spacings.iter().sum::<f64>() / n;
    if mean <= 0.0 {
        return None;
    }
    let var = spacings.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    let cv = var.sqrt() / mean;
    if cv < SPACING_CV_CUTOFF {
        Some(median_val(spacings))
    } else {
        None
    }
}

/// Robust median: mean of the middle third after sorting.  Re-orders the
/// input slice.
pub fn median_val(values: &mut [f64]) -> f64 {
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    if n < 4 {
        return values.iter().sum::<f64>() / n as f64;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let (n1, i1) = match n {
        4 => (2, 1),
        5 => (3, 1),
        _ => {
            let n1 = n / 3;
            (n1, (n - n1) / 2)
        },
    };
    values[i1..i1 + n1].iter().sum::<f64>() / n1 as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_val_middle_third() {
        let mut values = vec![1.0, 100.0, 10.0, 11.0, 12.0, 10.0, 11.0, 12.0, 500.0];
        let median = median_val(&mut values);
        assert!(median > 9.0 && median < 13.0, "median={median}");
    }

    #[test]
    fn test_irregular_spacing_detected() {
        // The documented case: gaps [10,10,10,10,100] must classify as
        // irregular, not 10 or 100.
        let mut spacings = vec![10.0, 10.0, 10.0, 10.0, 100.0];
        assert_eq!(regular_median_spacing(&mut spacings), None);
    }

    #[test]
    fn test_regular_spacing_median() {
        let mut spacings = vec![50.0, 51.0, 49.0, 50.0, 50.0, 52.0];
        let median = regular_median_spacing(&mut spacings).expect("regular");
        assert!((median - 50.0).abs() < 2.0);
    }

    #[test]
    fn test_font_derived_spacing() {
        // 1.16 * 1.7 * mean of the three letter heights.
        let spacing = line_spacing_from_font_size(30.0, 45.0, 45.0);
        assert!((spacing - 1.16 * 1.7 * 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_agree_within() {
        assert!(agree_within(100.0, 109.0, 10.0));
        assert!(!agree_within(100.0, 115.0, 10.0));
        assert!(!agree_within(0.0, 10.0, 10.0));
    }
}
