//! Page bitmaps and pixel-density statistics.
//!
//! The engine treats a page purely as a grayscale pixel grid with a
//! background-color threshold: any pixel darker than the threshold is
//! foreground.  `PixelCountCache` provides per-column prefix sums so the
//! column divider search can answer rectangular density queries in O(1).

use image::imageops::FilterType;
use image::{GrayImage, Luma};

use crate::geometry::PixelRect;

/// A grayscale source page bitmap.
#[derive(Debug, Clone)]
pub struct PageBitmap {
    img: GrayImage,
}

impl PageBitmap {
    /// Wrap an 8-bit grayscale image.
    pub fn new(img: GrayImage) -> Self {
        Self { img }
    }

    /// Create a blank (background-white) bitmap.
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            img: GrayImage::from_pixel(width.max(1), height.max(1), Luma([255u8])),
        }
    }

    /// Bitmap width in pixels.
    pub fn width(&self) -> u32 {
        self.img.width()
    }

    /// Bitmap height in pixels.
    pub fn height(&self) -> u32 {
        self.img.height()
    }

    /// Borrow the underlying image.
    pub fn image(&self) -> &GrayImage {
        &self.img
    }

    /// Mutably borrow the underlying image.
    pub fn image_mut(&mut self) -> &mut GrayImage {
        &mut self.img
    }

    /// Whole-bitmap rectangle.
    pub fn full_rect(&self) -> PixelRect {
        PixelRect::new(0, 0, self.width() - 1, self.height() - 1)
    }

    /// Foreground test: darker than the background threshold.
    #[inline]
    pub fn is_fg(&self, col: u32, row: u32, bg_threshold: u8) -> bool {
        self.img.get_pixel(col, row).0[0] < bg_threshold
    }

    /// Count foreground pixels in one row of `rect`.
    pub fn row_fg_count(&self, row: u32, c1: u32, c2: u32, bg_threshold: u8) -> u32 {
        let mut count = 0;
        for col in c1..=c2.min(self.width() - 1) {
            if self.is_fg(col, row, bg_threshold) {
                count += 1;
            }
        }
        count
    }

    /// Count foreground pixels in one column of `rect`.
    pub fn col_fg_count(&self, col: u32, r1: u32, r2: u32, bg_threshold: u8) -> u32 {
        let mut count = 0;
        for row in r1..=r2.min(self.height() - 1) {
            if self.is_fg(col, row, bg_threshold) {
                count += 1;
            }
        }
        count
    }
}

/// Per-column prefix sums of foreground pixel counts.
///
/// `counts[col * stride + row]` holds the number of foreground pixels in
/// `col` from row 0 through `row` inclusive, allowing any vertical span to
/// be counted with one subtraction.  Built once per divider search; every
/// query path also works without it (slower, straight from the bitmap).
#[derive(Debug)]
pub struct PixelCountCache {
    stride: usize,
    cols: u32,
    rows: u32,
    counts: Vec<u32>,
}

impl PixelCountCache {
    /// Build the cache for columns `0..=max_col` and rows `0..=max_row`.
    pub fn build(bmp: &PageBitmap, bg_threshold: u8, max_col: u32, max_row: u32) -> Self {
        let cols = max_col.min(bmp.width() - 1) + 1;
        let rows = max_row.min(bmp.height() - 1) + 1;
        let stride = rows as usize;
        let mut counts = vec![0u32; cols as usize * stride];
        for col in 0..cols {
            let base = col as usize * stride;
            let mut running = 0u32;
            for row in 0..rows {
                if bmp.is_fg(col, row, bg_threshold) {
                    running += 1;
                }
                counts[base + row as usize] = running;
            }
        }
        Self {
            stride,
            cols,
            rows,
            counts,
        }
    }

    /// Foreground count in `col` over rows `r1..=r2`.
    pub fn column_count(&self, col: u32, r1: u32, r2: u32) -> u32 {
        if col >= self.cols || r1 >= self.rows {
            return 0;
        }
        let base = col as usize * self.stride;
        let hi = self.counts[base + r2.min(self.rows - 1) as usize];
        let lo = if r1 == 0 {
            0
        } else {
            self.counts[base + (r1 - 1) as usize]
        };
        hi - lo
    }
}

/// Foreground count for a column span, via the cache when present.
pub fn column_count(
    bmp: &PageBitmap,
    cache: Option<&PixelCountCache>,
    bg_threshold: u8,
    col: u32,
    r1: u32,
    r2: u32,
) -> u32 {
    match cache {
        Some(cache) if col < cache.cols && r2 < cache.rows => cache.column_count(col, r1, r2),
        _ => bmp.col_fg_count(col, r1, r2, bg_threshold),
    }
}

/// Grow a canvas bitmap's height by `factor` (at least one extra row),
/// filling new rows with `fill`.  Geometric growth keeps repeated appends
/// amortized-linear.
pub fn grow_rows(img: &mut GrayImage, factor: f64, fill: u8) {
    let old_height = img.height();
    let new_height = ((old_height as f64 * factor) as u32).max(old_height + 1);
    let mut grown = GrayImage::from_pixel(img.width(), new_height, Luma([fill]));
    for (col, row, px) in img.enumerate_pixels() {
        grown.put_pixel(col, row, *px);
    }
    *img = grown;
}

/// Resample a bitmap to the given destination size.
pub fn resample(src: &GrayImage, width: u32, height: u32) -> GrayImage {
    image::imageops::resize(src, width.max(1), height.max(1), FilterType::Triangle)
}

/// Copy a source rectangle into an owned bitmap.
pub fn crop_to_owned(bmp: &PageBitmap, rect: &PixelRect) -> GrayImage {
    let mut out = GrayImage::from_pixel(rect.width(), rect.height(), Luma([255u8]));
    for row in rect.r1..=rect.r2.min(bmp.height() - 1) {
        for col in rect.c1..=rect.c2.min(bmp.width() - 1) {
            out.put_pixel(col - rect.c1, row - rect.r1, *bmp.image().get_pixel(col, row));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bitmap_with_black_rect(w: u32, h: u32, rect: PixelRect) -> PageBitmap {
        let mut bmp = PageBitmap::blank(w, h);
        for row in rect.r1..=rect.r2 {
            for col in rect.c1..=rect.c2 {
                bmp.image_mut().put_pixel(col, row, Luma([0u8]));
            }
        }
        bmp
    }

    #[test]
    fn test_fg_counts() {
        let bmp = bitmap_with_black_rect(100, 100, PixelRect::new(10, 20, 19, 29));
        assert_eq!(bmp.row_fg_count(25, 0, 99, 128), 10);
        assert_eq!(bmp.row_fg_count(5, 0, 99, 128), 0);
        assert_eq!(bmp.col_fg_count(15, 0, 99, 128), 10);
        assert_eq!(bmp.col_fg_count(50, 0, 99, 128), 0);
    }

    #[test]
    fn test_prefix_cache_matches_direct() {
        let bmp = bitmap_with_black_rect(64, 64, PixelRect::new(8, 8, 23, 55));
        let cache = PixelCountCache::build(&bmp, 128, 63, 63);
        for col in [0u32, 8, 15, 23, 40] {
            for (r1, r2) in [(0u32, 63u32), (10, 20), (8, 8), (50, 60)] {
                assert_eq!(
                    cache.column_count(col, r1, r2),
                    bmp.col_fg_count(col, r1, r2, 128),
                    "col={col} rows={r1}..={r2}"
                );
            }
        }
    }

    #[test]
    fn test_column_count_without_cache() {
        let bmp = bitmap_with_black_rect(32, 32, PixelRect::new(4, 4, 7, 27));
        assert_eq!(column_count(&bmp, None, 128, 5, 0, 31), 24);
    }

    #[test]
    fn test_grow_rows_geometric() {
        let mut img = GrayImage::from_pixel(10, 100, Luma([7u8]));
        grow_rows(&mut img, 1.4, 255);
        assert_eq!(img.height(), 140);
        assert_eq!(img.get_pixel(5, 50).0[0], 7);
        assert_eq!(img.get_pixel(5, 120).0[0], 255);
    }

    #[test]
    fn test_crop_to_owned() {
        let bmp = bitmap_with_black_rect(50, 50, PixelRect::new(10, 10, 19, 19));
        let out = crop_to_owned(&bmp, &PixelRect::new(5, 5, 24, 24));
        assert_eq!(out.dimensions(), (20, 20));
        assert_eq!(out.get_pixel(5, 5).0[0], 0);
        assert_eq!(out.get_pixel(0, 0).0[0], 255);
    }
}
