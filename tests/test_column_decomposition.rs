//! Integration tests for multi-column page decomposition: divider search,
//! reading order, full-span headers and footers, and content coverage.

use image::Luma;
use proptest::prelude::*;
use rasterflow::bitmap::{PageBitmap, PixelCountCache};
use rasterflow::geometry::PixelRect;
use rasterflow::layout::columns::{find_multicolumn_divider, find_page_regions};
use rasterflow::region::Region;
use rasterflow::Settings;

/// Route `log` output through the test harness; `RUST_LOG=debug` shows the
/// divider search trace on failures.
fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn blacken(bmp: &mut PageBitmap, rect: PixelRect) {
    for row in rect.r1..=rect.r2 {
        for col in rect.c1..=rect.c2 {
            bmp.image_mut().put_pixel(col, row, Luma([0u8]));
        }
    }
}

/// A 2000x3000 page at 300 dpi: full-width header, two columns of text,
/// full-width footer.
fn header_columns_footer_page() -> PageBitmap {
    let mut bmp = PageBitmap::blank(2000, 3000);
    blacken(&mut bmp, PixelRect::new(100, 20, 1900, 99));
    let mut r1 = 150;
    while r1 + 60 < 2800 {
        blacken(&mut bmp, PixelRect::new(100, r1, 900, r1 + 59));
        blacken(&mut bmp, PixelRect::new(1100, r1, 1900, r1 + 59));
        r1 += 120;
    }
    blacken(&mut bmp, PixelRect::new(100, 2850, 1900, 2950));
    bmp
}

#[test]
fn test_header_columns_footer_reading_order() {
    init_logging();
    let bmp = header_columns_footer_page();
    let settings = Settings::default();
    let region = Region::full_page(&bmp, 300, settings.bg_threshold, 0, 0);
    let out = find_page_regions(&region, &settings, None, 2);
    let regions = &out.regions;

    assert_eq!(regions.len(), 4, "header, left, right, footer");
    assert!(regions[0].fullspan, "header first");
    assert!(!regions[1].fullspan && !regions[2].fullspan);
    assert!(regions[3].fullspan, "footer last");

    // Header above the columns, columns side by side left-to-right,
    // footer below.
    assert!(regions[0].region.rect.r2 < regions[1].region.rect.r1);
    assert!(regions[1].region.rect.c2 < regions[2].region.rect.c1);
    assert!(regions[3].region.rect.r1 > regions[1].region.rect.r2);
}

#[test]
fn test_rtl_reads_right_column_first() {
    let bmp = header_columns_footer_page();
    let mut settings = Settings::default();
    settings.src_left_to_right = false;
    let region = Region::full_page(&bmp, 300, settings.bg_threshold, 0, 0);
    let out = find_page_regions(&region, &settings, None, 2);
    let regions = &out.regions;

    assert_eq!(regions.len(), 4);
    assert!(regions[0].fullspan);
    assert!(
        regions[1].region.rect.c1 > regions[2].region.rect.c2,
        "right column must come before left"
    );
}

#[test]
fn test_columns_cover_all_column_content() {
    let bmp = header_columns_footer_page();
    let settings = Settings::default();
    let region = Region::full_page(&bmp, 300, settings.bg_threshold, 0, 0);
    let out = find_page_regions(&region, &settings, None, 2);

    // Every foreground pixel of the page falls inside some region.
    for row in 0..bmp.height() {
        for col in 0..bmp.width() {
            if !bmp.is_fg(col, row, settings.bg_threshold) {
                continue;
            }
            let px = PixelRect::new(col, row, col, row);
            let covered = out.regions.iter().any(|pr| pr.region.rect.contains(&px));
            assert!(covered, "uncovered foreground pixel at ({col},{row})");
        }
    }

    // Column regions never overlap each other.
    let cols: Vec<_> = out.regions.iter().filter(|pr| !pr.fullspan).collect();
    for i in 0..cols.len() {
        for j in i + 1..cols.len() {
            assert!(
                !cols[i].region.rect.intersects(&cols[j].region.rect),
                "column regions {i} and {j} overlap"
            );
        }
    }
}

#[test]
fn test_divider_lands_in_the_gap() {
    let bmp = header_columns_footer_page();
    let settings = Settings::default();
    // Restrict to the columned area so the divider spans the full region.
    let full = Region::full_page(&bmp, 300, settings.bg_threshold, 0, 0);
    let region = full.subregion(PixelRect::new(0, 120, 1999, 2820));
    let outcome = find_multicolumn_divider(&region, &settings, None).expect("divider");
    assert!(outcome.divider_col > 900 && outcome.divider_col < 1100);
    assert!(outcome.fullspan_above.is_none());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// The divider search is a pure function of its inputs: same page,
    /// same answer, with or without the density cache.
    #[test]
    fn test_divider_deterministic_and_cache_agnostic(
        seed_rects in prop::collection::vec(
            (0u32..280, 0u32..280, 1u32..60, 1u32..60),
            1..12,
        )
    ) {
        let mut bmp = PageBitmap::blank(300, 300);
        for &(c1, r1, w, h) in &seed_rects {
            let c2 = (c1 + w).min(299);
            let r2 = (r1 + h).min(299);
            blacken(&mut bmp, PixelRect::new(c1, r1, c2, r2));
        }
        let mut settings = Settings::default();
        settings.src_dpi = 100;
        settings.min_column_height_in = 0.5;
        let region = Region::full_page(&bmp, 100, settings.bg_threshold, 0, 0);
        let cache = PixelCountCache::build(&bmp, settings.bg_threshold, 299, 299);

        let a = find_multicolumn_divider(&region, &settings, None)
            .map(|o| (o.divider_col, o.bottom));
        let b = find_multicolumn_divider(&region, &settings, None)
            .map(|o| (o.divider_col, o.bottom));
        let c = find_multicolumn_divider(&region, &settings, Some(&cache))
            .map(|o| (o.divider_col, o.bottom));
        prop_assert_eq!(a, b);
        prop_assert_eq!(a, c);
    }
}
