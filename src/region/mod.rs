//! Rectangular page regions: the unit of all layout analysis.
//!
//! A `Region` is a rectangular view over a source page bitmap plus the
//! structure detected within it (text rows, bounding descriptor, coordinate
//! maps).  Regions never own pixels; subdivision produces further borrowed
//! views, and only the renderer copies pixels out.

pub mod detect;
pub mod textrow;

use bitflags::bitflags;

use crate::bitmap::{column_count, PageBitmap, PixelCountCache};
use crate::geometry::PixelRect;
use crate::render::WRectMap;
use textrow::{RowType, TextRow, TextRows};

bitflags! {
    /// Which margins `Region::trim_margins` is allowed to move.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TrimSides: u8 {
        /// Trim the left margin
        const LEFT = 0x1;
        /// Trim the right margin
        const RIGHT = 0x2;
        /// Trim the top margin
        const TOP = 0x4;
        /// Trim the bottom margin
        const BOTTOM = 0x8;
        /// All four margins
        const ALL = 0xf;
    }
}

/// A rectangular view over page pixels plus detected structure.
#[derive(Debug, Clone)]
pub struct Region<'a> {
    /// Backing page bitmap (borrowed, never owned)
    pub bmp: &'a PageBitmap,
    /// View rectangle in source pixels
    pub rect: PixelRect,
    /// Source resolution
    pub dpi: u32,
    /// Background-color threshold: pixels darker than this are foreground
    pub bg_threshold: u8,
    /// Source page rotation in degrees
    pub rotation_deg: i32,
    /// Zero-based source page index
    pub page_index: usize,
    /// Bounding-box descriptor for the whole region
    pub bbox: TextRow,
    /// Detected rows, in position order
    pub rows: TextRows,
    /// Coordinate maps accumulated by the word wrapper, consumed by the
    /// renderer
    pub maps: Option<Vec<WRectMap>>,
}

impl<'a> Region<'a> {
    /// Create a region covering the whole page bitmap.
    pub fn full_page(
        bmp: &'a PageBitmap,
        dpi: u32,
        bg_threshold: u8,
        rotation_deg: i32,
        page_index: usize,
    ) -> Self {
        let rect = bmp.full_rect();
        Self {
            bmp,
            rect,
            dpi,
            bg_threshold,
            rotation_deg,
            page_index,
            bbox: TextRow::from_extents(rect.c1, rect.r1, rect.c2, rect.r2, RowType::Multiline),
            rows: TextRows::new(),
            maps: None,
        }
    }

    /// Create a sub-view with fresh (empty) detected structure.
    pub fn subregion(&self, rect: PixelRect) -> Region<'a> {
        Region {
            bmp: self.bmp,
            rect,
            dpi: self.dpi,
            bg_threshold: self.bg_threshold,
            rotation_deg: self.rotation_deg,
            page_index: self.page_index,
            bbox: TextRow::from_extents(rect.c1, rect.r1, rect.c2, rect.r2, RowType::Multiline),
            rows: TextRows::new(),
            maps: None,
        }
    }

    /// Region width in inches.
    pub fn width_in(&self) -> f64 {
        self.rect.width_in(self.dpi)
    }

    /// Region height in inches.
    pub fn height_in(&self) -> f64 {
        self.rect.height_in(self.dpi)
    }

    /// Foreground pixel count in one absolute row, within the region's
    /// column extent.
    pub fn row_fg_count(&self, row: u32) -> u32 {
        self.bmp
            .row_fg_count(row, self.rect.c1, self.rect.c2, self.bg_threshold)
    }

    /// Foreground pixel count in one absolute column, within the region's
    /// row extent.
    pub fn col_fg_count(&self, col: u32) -> u32 {
        self.bmp
            .col_fg_count(col, self.rect.r1, self.rect.r2, self.bg_threshold)
    }

    /// Trim blank margins from the requested sides.  Degenerate outcomes
    /// (a fully blank region) leave the rectangle untouched and are caught
    /// by the callers' emptiness checks.
    pub fn trim_margins(&mut self, sides: TrimSides) {
        let rect = self.rect;
        let mut r1 = rect.r1;
        let mut r2 = rect.r2;
        let mut c1 = rect.c1;
        let mut c2 = rect.c2;

        if sides.contains(TrimSides::TOP) {
            while r1 < r2 && self.bmp.row_fg_count(r1, c1, c2, self.bg_threshold) == 0 {
                r1 += 1;
            }
        }
        if sides.contains(TrimSides::BOTTOM) {
            while r2 > r1 && self.bmp.row_fg_count(r2, c1, c2, self.bg_threshold) == 0 {
                r2 -= 1;
            }
        }
        if sides.contains(TrimSides::LEFT) {
            while c1 < c2 && self.bmp.col_fg_count(c1, r1, r2, self.bg_threshold) == 0 {
                c1 += 1;
            }
        }
        if sides.contains(TrimSides::RIGHT) {
            while c2 > c1 && self.bmp.col_fg_count(c2, r1, r2, self.bg_threshold) == 0 {
                c2 -= 1;
            }
        }
        self.rect = PixelRect::new(c1, r1, c2, r2);
        self.bbox.c1 = c1;
        self.bbox.c2 = c2;
        self.bbox.r1 = r1;
        self.bbox.r2 = r2;
        if self.bbox.rowbase > r2 || self.bbox.rowbase < r1 {
            self.bbox.rowbase = r2;
        }
    }

    /// Whether the region contains no foreground pixels at all.
    pub fn is_blank(&self) -> bool {
        (self.rect.r1..=self.rect.r2).all(|row| self.row_fg_count(row) == 0)
    }

    /// Test a candidate vertical shaft for clearness.
    ///
    /// Returns `Some(badness)` when the shaft is acceptably clear of
    /// foreground pixels (`1` = perfectly clear; larger = more stray
    /// pixels), or `None` when any shaft column exceeds the tolerance.
    /// The tolerance is `clear_tolerance` foreground pixels per column per
    /// pixel of shaft height.
    pub fn shaft_clearness(
        &self,
        shaft: &PixelRect,
        cache: Option<&PixelCountCache>,
        clear_tolerance: f64,
    ) -> Option<u32> {
        let allowed_per_col = (shaft.height() as f64 * clear_tolerance).floor() as u32;
        let mut total = 0u32;
        for col in shaft.c1..=shaft.c2 {
            let count = column_count(
                self.bmp,
                cache,
                self.bg_threshold,
                col,
                shaft.r1,
                shaft.r2,
            );
            if count > allowed_per_col {
                return None;
            }
            total += count;
        }
        Some(1 + total)
    }
}

/// Outcome of validating a candidate column divider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnTest {
    /// Left column failed the minimum height test
    pub left_too_short: bool,
    /// Right column failed the minimum height test (search can stop for
    /// this row range)
    pub right_too_short: bool,
    /// Gap between the trimmed columns is too wide to be a real column gap
    pub gap_excessive: bool,
}

impl ColumnTest {
    /// Whether the divider passed every check.
    pub fn passed(&self) -> bool {
        !self.left_too_short && !self.right_too_short && !self.gap_excessive
    }
}

/// Validate a candidate divider by trimming and measuring both resulting
/// columns over rows `r1..=r2`.  Returns the test outcome along with the two
/// trimmed column regions (left, right).
pub fn column_height_and_gap_test<'a>(
    region: &Region<'a>,
    r1: u32,
    r2: u32,
    divider_col: u32,
    min_height_px: u32,
    max_gap_in: f64,
) -> (ColumnTest, Region<'a>, Region<'a>) {
    let mut left = region.subregion(PixelRect::new(
        region.rect.c1,
        r1,
        divider_col.max(region.rect.c1 + 1) - 1,
        r2,
    ));
    let mut right = region.subregion(PixelRect::new(
        divider_col.min(region.rect.c2 - 1) + 1,
        r1,
        region.rect.c2,
        r2,
    ));
    left.trim_margins(TrimSides::ALL);
    right.trim_margins(TrimSides::ALL);

    let left_too_short = left.is_blank() || left.rect.height() < min_height_px;
    let right_too_short = right.is_blank() || right.rect.height() < min_height_px;
    let gap_px = right.rect.c1.saturating_sub(left.rect.c2 + 1);
    let gap_excessive = (gap_px as f64 / region.dpi.max(1) as f64) > max_gap_in;

    (
        ColumnTest {
            left_too_short,
            right_too_short,
            gap_excessive,
        },
        left,
        right,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn page_with_band(rect: PixelRect) -> PageBitmap {
        let mut bmp = PageBitmap::blank(200, 200);
        for row in rect.r1..=rect.r2 {
            for col in rect.c1..=rect.c2 {
                bmp.image_mut().put_pixel(col, row, Luma([0u8]));
            }
        }
        bmp
    }

    #[test]
    fn test_trim_margins_all() {
        let bmp = page_with_band(PixelRect::new(40, 60, 120, 90));
        let mut region = Region::full_page(&bmp, 300, 128, 0, 0);
        region.trim_margins(TrimSides::ALL);
        assert_eq!(region.rect, PixelRect::new(40, 60, 120, 90));
    }

    #[test]
    fn test_trim_margins_top_bottom_only() {
        let bmp = page_with_band(PixelRect::new(40, 60, 120, 90));
        let mut region = Region::full_page(&bmp, 300, 128, 0, 0);
        region.trim_margins(TrimSides::TOP | TrimSides::BOTTOM);
        assert_eq!(region.rect.r1, 60);
        assert_eq!(region.rect.r2, 90);
        assert_eq!(region.rect.c1, 0);
        assert_eq!(region.rect.c2, 199);
    }

    #[test]
    fn test_shaft_clearness() {
        let bmp = page_with_band(PixelRect::new(40, 60, 120, 90));
        let region = Region::full_page(&bmp, 300, 128, 0, 0);
        // Shaft to the right of the band is perfectly clear.
        let clear = region.shaft_clearness(&PixelRect::new(150, 0, 160, 199), None, 0.005);
        assert_eq!(clear, Some(1));
        // Shaft through the band is not.
        let blocked = region.shaft_clearness(&PixelRect::new(50, 0, 60, 199), None, 0.005);
        assert_eq!(blocked, None);
    }

    #[test]
    fn test_column_test_two_real_columns() {
        let mut bmp = PageBitmap::blank(200, 200);
        for &(c1, c2) in &[(10u32, 80u32), (120, 190)] {
            for row in 10..190 {
                for col in c1..=c2 {
                    bmp.image_mut().put_pixel(col, row, Luma([0u8]));
                }
            }
        }
        let region = Region::full_page(&bmp, 100, 128, 0, 0);
        let (test, left, right) = column_height_and_gap_test(&region, 0, 199, 100, 150, 1.5);
        assert!(test.passed(), "{test:?}");
        assert_eq!(left.rect.c2, 80);
        assert_eq!(right.rect.c1, 120);
    }

    #[test]
    fn test_column_test_short_side_fails() {
        let bmp = page_with_band(PixelRect::new(10, 10, 80, 40));
        let region = Region::full_page(&bmp, 100, 128, 0, 0);
        let (test, _, _) = column_height_and_gap_test(&region, 0, 199, 100, 150, 1.5);
        assert!(!test.passed());
        assert!(test.right_too_short);
    }
}
