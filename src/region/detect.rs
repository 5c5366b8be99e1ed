//! Row and word detection.
//!
//! Finds contiguous horizontal bands of foreground pixels in a region and
//! derives per-band geometry: baseline, letter-height metrics, and inter-row
//! gaps.  The letter heights come from quantiles of the band's vertical mass
//! profile; the quantile points are named constants below.

use log::debug;

use crate::config::Settings;
use crate::geometry::PixelRect;
use crate::region::textrow::{RowType, TextRow, TextRows};
use crate::region::Region;

/// Cumulative-mass fraction at the baseline (bottom of the main glyph
/// mass; descenders carry the remaining ~8%).
const BASELINE_MASS: f64 = 0.92;
/// Cumulative-mass fraction at the top of capital letters.
const CAPHEIGHT_MASS: f64 = 0.04;
/// Cumulative-mass fraction at the x-height line.
const LCHEIGHT_MASS: f64 = 0.33;
/// Cumulative-mass fraction for the 50%-threshold height metric.
const H5050_MASS: f64 = 0.50;

/// Options for the row detector.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetectOptions {
    /// Merge bands separated by sub-aperture gaps (joins accents and
    /// broken glyphs to their line).
    pub dynamic_aperture: bool,
    /// Drop speck bands too small to be text.
    pub remove_small_rows: bool,
}

/// Detect text rows in the region and store them in `region.rows`.
///
/// Rows come back in top-to-bottom position order with gap statistics
/// filled in; the region's bounding descriptor is updated to the union of
/// the detected bands.
pub fn find_text_rows(region: &mut Region<'_>, settings: &Settings, opts: DetectOptions) {
    let rect = region.rect;
    let mut counts: Vec<u32> = (rect.r1..=rect.r2).map(|row| region.row_fg_count(row)).collect();

    if opts.dynamic_aperture {
        smooth_counts(&mut counts, aperture_px(region.dpi));
    }

    // Contiguous non-blank runs, as (top, bottom) offsets into `counts`.
    let mut bands: Vec<(usize, usize)> = Vec::new();
    let mut start: Option<usize> = None;
    for (i, &count) in counts.iter().enumerate() {
        match (count > 0, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                bands.push((s, i - 1));
                start = None;
            },
            _ => {},
        }
    }
    if let Some(s) = start {
        bands.push((s, counts.len() - 1));
    }

    if opts.remove_small_rows && bands.len() > 1 {
        let min_height = (region.dpi / 150).max(2) as usize;
        bands.retain(|&(top, bottom)| bottom - top + 1 >= min_height);
    }

    let mut rows = TextRows::new();
    for &(top, bottom) in &bands {
        if let Some(row) = measure_band(region, settings, rect.r1 + top as u32, rect.r1 + bottom as u32)
        {
            rows.push(row);
        }
    }

    // Gap statistics need the neighbor, so fill them in a second pass.
    let n = rows.len();
    for i in 0..n {
        let (next_r1, next_rowbase) = if i + 1 < n {
            (rows.rows[i + 1].r1, rows.rows[i + 1].rowbase)
        } else {
            (rect.r2 + 1, 0)
        };
        let row = &mut rows.rows[i];
        let gap = next_r1.saturating_sub(row.r2 + 1);
        row.gap = gap;
        row.gapblank = gap;
        row.rowheight = if i + 1 < n {
            next_rowbase.saturating_sub(row.rowbase).max(row.height())
        } else {
            row.height()
        };
    }

    debug!(
        "find_text_rows: ({},{}) - ({},{}) -> {} rows",
        rect.c1,
        rect.r1,
        rect.c2,
        rect.r2,
        rows.len()
    );

    if let (Some(first), Some(last)) = (rows.rows.first(), rows.rows.last()) {
        region.bbox.r1 = first.r1;
        region.bbox.r2 = last.r2;
        region.bbox.c1 = rows.rows.iter().map(|r| r.c1).min().unwrap_or(rect.c1);
        region.bbox.c2 = rows.rows.iter().map(|r| r.c2).max().unwrap_or(rect.c2);
        region.bbox.rowbase = last.rowbase;
        region.bbox.row_type = RowType::Multiline;
        region.bbox.lcheight = median_u32(rows.rows.iter().map(|r| r.lcheight)).unwrap_or(0);
        region.bbox.capheight = median_u32(rows.rows.iter().map(|r| r.capheight)).unwrap_or(0);
        region.bbox.h5050 = median_u32(rows.rows.iter().map(|r| r.h5050)).unwrap_or(0);
    }
    region.rows = rows;
}

/// Split a single flattened row into words at horizontal blank runs.
///
/// Returns the word rectangles (left to right) and the inter-word gap in
/// pixels: the median detected gap, defaulting to the letter-height-derived
/// threshold when no gaps exist.
pub fn find_words(region: &Region<'_>, settings: &Settings) -> (Vec<PixelRect>, u32) {
    let rect = region.rect;
    let lcheight = region.bbox.lcheight.max(1);
    let threshold = ((settings.word_spacing * lcheight as f64).round() as u32).max(1);

    let counts: Vec<u32> = (rect.c1..=rect.c2).map(|col| region.col_fg_count(col)).collect();

    // Foreground column runs, then merge runs whose separating blank run
    // is narrower than the threshold (intra-word letter gaps).
    let mut runs: Vec<(usize, usize)> = Vec::new();
    let mut start: Option<usize> = None;
    for (i, &count) in counts.iter().enumerate() {
        match (count > 0, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                runs.push((s, i - 1));
                start = None;
            },
            _ => {},
        }
    }
    if let Some(s) = start {
        runs.push((s, counts.len() - 1));
    }

    let mut words: Vec<PixelRect> = Vec::new();
    let mut gaps: Vec<u32> = Vec::new();
    for (s, e) in runs {
        let rect_word = PixelRect::new(rect.c1 + s as u32, rect.r1, rect.c1 + e as u32, rect.r2);
        match words.last_mut() {
            Some(prev) if rect_word.c1 - prev.c2 - 1 < threshold => prev.c2 = rect_word.c2,
            Some(prev) => {
                gaps.push(rect_word.c1 - prev.c2 - 1);
                words.push(rect_word);
            },
            None => words.push(rect_word),
        }
    }

    let gappix = median_u32(gaps.into_iter()).unwrap_or(threshold).max(threshold);
    (words, gappix)
}

fn aperture_px(dpi: u32) -> usize {
    (dpi as usize / 120).max(1)
}

/// Moving-window sum so that gaps narrower than the aperture disappear.
fn smooth_counts(counts: &mut [u32], aperture: usize) {
    if aperture <= 1 || counts.len() < 3 {
        return;
    }
    let original = counts.to_vec();
    for i in 0..counts.len() {
        let lo = i.saturating_sub(aperture);
        let hi = (i + aperture).min(counts.len() - 1);
        counts[i] = original[lo..=hi].iter().sum();
    }
}

/// Measure one band's geometry from its vertical mass profile.
fn measure_band(
    region: &Region<'_>,
    settings: &Settings,
    r1: u32,
    r2: u32,
) -> Option<TextRow> {
    let rect = region.rect;
    let mut c1 = None;
    let mut c2 = None;
    let mut mass: Vec<u64> = Vec::with_capacity((r2 - r1 + 1) as usize);
    for row in r1..=r2 {
        let mut row_mass = 0u64;
        for col in rect.c1..=rect.c2 {
            if region.bmp.is_fg(col, row, region.bg_threshold) {
                row_mass += 1;
                if c1.is_none() || col < c1.unwrap() {
                    c1 = Some(col);
                }
                if c2.is_none() || col > c2.unwrap() {
                    c2 = Some(col);
                }
            }
        }
        mass.push(row_mass);
    }
    let (c1, c2) = (c1?, c2?);
    let total: u64 = mass.iter().sum();
    if total == 0 {
        return None;
    }

    let row_at = |fraction: f64| -> u32 {
        let target = (total as f64 * fraction).ceil() as u64;
        let mut cumulative = 0u64;
        for (i, &m) in mass.iter().enumerate() {
            cumulative += m;
            if cumulative >= target {
                return r1 + i as u32;
            }
        }
        r2
    };

    let rowbase = row_at(BASELINE_MASS);
    let capheight = rowbase.saturating_sub(row_at(CAPHEIGHT_MASS)) + 1;
    let lcheight = rowbase.saturating_sub(row_at(LCHEIGHT_MASS)) + 1;
    let h5050 = 2 * (rowbase.saturating_sub(row_at(H5050_MASS)) + 1);

    let height_in = (r2 - r1 + 1) as f64 / region.dpi.max(1) as f64;
    let row_type = if height_in >= settings.min_figure_height_in {
        RowType::Figure
    } else {
        RowType::Line
    };

    Some(TextRow {
        r1,
        r2,
        c1,
        c2,
        rowbase,
        row_type,
        capheight,
        lcheight,
        h5050,
        rowheight: r2 - r1 + 1,
        gap: 0,
        gapblank: 0,
        rat: None,
    })
}

fn median_u32<I: Iterator<Item = u32>>(values: I) -> Option<u32> {
    let mut values: Vec<u32> = values.collect();
    if values.is_empty() {
        return None;
    }
    values.sort_unstable();
    Some(values[values.len() / 2])
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

    fn three_line_page() -> PageBitmap {
        let mut bmp = PageBitmap::blank(400, 300);
        blacken(&mut bmp, PixelRect::new(20, 30, 380, 49));
        blacken(&mut bmp, PixelRect::new(20, 80, 380, 99));
        blacken(&mut bmp, PixelRect::new(20, 130, 250, 149));
        bmp
    }

    #[test]
    fn test_three_rows_detected_in_order() {
        let bmp = three_line_page();
        let mut region = Region::full_page(&bmp, 300, 128, 0, 0);
        find_text_rows(&mut region, &Settings::default(), DetectOptions::default());
        assert_eq!(region.rows.len(), 3);
        let rows = &region.rows.rows;
        assert_eq!(rows[0].r1, 30);
        assert_eq!(rows[1].r1, 80);
        assert_eq!(rows[2].r1, 130);
        assert_eq!(rows[2].c2, 250);
        // gap between row 0 and row 1 is rows 50..=79
        assert_eq!(rows[0].gap, 30);
        assert_eq!(rows[0].gapblank, 30);
    }

    #[test]
    fn test_baseline_within_band() {
        let bmp = three_line_page();
        let mut region = Region::full_page(&bmp, 300, 128, 0, 0);
        find_text_rows(&mut region, &Settings::default(), DetectOptions::default());
        for row in &region.rows.rows {
            assert!(row.rowbase >= row.r1 && row.rowbase <= row.r2);
            assert!(row.capheight >= row.lcheight);
        }
    }

    #[test]
    fn test_figure_classification_by_height() {
        let mut bmp = PageBitmap::blank(400, 400);
        blacken(&mut bmp, PixelRect::new(50, 50, 350, 340)); // ~0.97in at 300dpi
        let mut region = Region::full_page(&bmp, 300, 128, 0, 0);
        find_text_rows(&mut region, &Settings::default(), DetectOptions::default());
        assert_eq!(region.rows.len(), 1);
        assert_eq!(region.rows.rows[0].row_type, RowType::Figure);
    }

    #[test]
    fn test_find_words_splits_on_wide_gaps() {
        let mut bmp = PageBitmap::blank(400, 60);
        // Three "words" with 15px gaps, lcheight will be ~band height.
        blacken(&mut bmp, PixelRect::new(10, 20, 79, 39));
        blacken(&mut bmp, PixelRect::new(95, 20, 164, 39));
        blacken(&mut bmp, PixelRect::new(180, 20, 249, 39));
        let mut region = Region::full_page(&bmp, 300, 128, 0, 0);
        find_text_rows(&mut region, &Settings::default(), DetectOptions::default());
        region.rect = PixelRect::new(0, 20, 399, 39);
        region.bbox = region.rows.rows[0].clone();
        region.rows = TextRows::new();
        let (words, gappix) = find_words(&region, &Settings::default());
        assert_eq!(words.len(), 3);
        assert_eq!(words[0].c1, 10);
        assert_eq!(words[0].c2, 79);
        assert_eq!(words[2].c1, 180);
        assert!(gappix >= 1);
    }

    #[test]
    fn test_dynamic_aperture_merges_dotted_line() {
        let mut bmp = PageBitmap::blank(200, 100);
        // Two sub-bands 1px apart: an "i" dot situation.
        blacken(&mut bmp, PixelRect::new(20, 40, 180, 44));
        blacken(&mut bmp, PixelRect::new(20, 46, 180, 60));
        let mut region = Region::full_page(&bmp, 300, 128, 0, 0);
        find_text_rows(
            &mut region,
            &Settings::default(),
            DetectOptions {
                dynamic_aperture: true,
                remove_small_rows: false,
            },
        );
        assert_eq!(region.rows.len(), 1);
    }
}
