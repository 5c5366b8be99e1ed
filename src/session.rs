//! The document session: feed source pages in, take output pages out.
//!
//! A `Session` owns the settings, the master canvas, and the cross-page
//! break state.  Each source page is decomposed into regions (by divider
//! search or fixed grid), the regions flow through the vertical splitter in
//! reading order, and any output pages completed along the way are
//! returned.

use log::{debug, info};

use crate::bitmap::{PageBitmap, PixelCountCache};
use crate::config::Settings;
use crate::error::Result;
use crate::layout::columns::{find_page_regions, grid_regions, PageRegions};
use crate::layout::vertical_break::{vertically_break, BreakState};
use crate::region::Region;
use crate::render::canvas::MasterCanvas;
use crate::render::{OutputPage, ScaleMode};

/// A running reflow of one document.
#[derive(Debug)]
pub struct Session {
    settings: Settings,
    canvas: MasterCanvas,
    state: BreakState,
    pages_in: usize,
}

impl Session {
    /// Create a session after validating the settings.
    pub fn new(settings: Settings) -> Result<Self> {
        settings.validate()?;
        let canvas = MasterCanvas::new(&settings);
        Ok(Self {
            settings,
            canvas,
            state: BreakState::default(),
            pages_in: 0,
        })
    }

    /// The session's settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Number of source pages consumed so far.
    pub fn pages_in(&self) -> usize {
        self.pages_in
    }

    /// Process one source page and return any output pages completed by
    /// it.
    ///
    /// `dpi` is the page's scan resolution and `rotation_deg` its upstream
    /// rotation (recorded in the coordinate maps, not applied here).
    pub fn add_page(
        &mut self,
        bmp: &PageBitmap,
        dpi: u32,
        rotation_deg: i32,
    ) -> Result<Vec<OutputPage>> {
        let page_index = self.pages_in;
        self.pages_in += 1;
        info!(
            "add_page: page {} ({}x{} @ {}dpi)",
            page_index,
            bmp.width(),
            bmp.height(),
            dpi
        );

        let region = Region::full_page(
            bmp,
            dpi.max(1),
            self.settings.bg_threshold,
            rotation_deg,
            page_index,
        );

        let (page_regions, gridded) = self.decompose(&region);
        debug!("add_page: {} regions", page_regions.regions.len());

        for pr in &page_regions.regions {
            // Full-span regions of a multi-column page keep their native
            // scale; columns are fitted to the device width.
            let fit = if gridded || !pr.fullspan {
                self.settings.fit_columns
            } else {
                self.settings.fit_columns && pr.level > 1
            };
            let scale = if fit {
                ScaleMode::FitWidth
            } else {
                ScaleMode::NativeUnlessOverflow
            };
            let ncols = if gridded { 2 } else { pr.level };
            vertically_break(
                &pr.region,
                &self.settings,
                &mut self.canvas,
                &mut self.state,
                scale,
                ncols,
            )?;
        }

        if self.settings.break_pages {
            self.canvas.flush_page(&self.settings, false)?;
        } else {
            self.canvas.flush_wrap(&self.settings)?;
        }
        Ok(self.canvas.take_ready())
    }

    /// Finish the document: flush everything still pending and return the
    /// final output pages.
    pub fn finish(&mut self) -> Result<Vec<OutputPage>> {
        self.canvas.flush_page(&self.settings, false)?;
        self.state.reset();
        Ok(self.canvas.take_ready())
    }

    /// Decompose one source page into ordered regions.
    fn decompose<'a>(&self, region: &Region<'a>) -> (PageRegions<'a>, bool) {
        if let Some(grid) = &self.settings.grid {
            return (grid_regions(region, &self.settings, grid), true);
        }
        let maxlevels = match self.settings.max_columns {
            0 | 1 => 1,
            2 => 2,
            _ => 3,
        };
        let cache = if maxlevels > 1 {
            Some(PixelCountCache::build(
                region.bmp,
                region.bg_threshold,
                region.rect.c2,
                region.rect.r2,
            ))
        } else {
            None
        };
        (
            find_page_regions(region, &self.settings, cache.as_ref(), maxlevels),
            false,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::PixelRect;
    use image::Luma;

    fn blacken(bmp: &mut PageBitmap, rect: PixelRect) {
        for row in rect.r1..=rect.r2 {
            for col in rect.c1..=rect.c2 {
                bmp.image_mut().put_pixel(col, row, Luma([0u8]));
            }
        }
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let settings = Settings::default().with_max_columns(0);
        assert!(Session::new(settings).is_err());
    }

    #[test]
    fn test_blank_page_produces_no_output() {
        let settings = Settings::default();
        let mut session = Session::new(settings).unwrap();
        let bmp = PageBitmap::blank(1000, 1000);
        let pages = session.add_page(&bmp, 300, 0).unwrap();
        assert!(pages.is_empty());
        assert!(session.finish().unwrap().is_empty());
    }

    #[test]
    fn test_simple_page_flows_to_output() {
        let mut settings = Settings::default().with_device(400, 500, 100);
        settings.src_dpi = 100;
        let mut session = Session::new(settings).unwrap();
        let mut bmp = PageBitmap::blank(800, 600);
        for line in 0..5 {
            let r1 = 50 + line * 60;
            blacken(&mut bmp, PixelRect::new(40, r1, 760, r1 + 25));
        }
        let mut pages = session.add_page(&bmp, 100, 0).unwrap();
        pages.extend(session.finish().unwrap());
        assert!(!pages.is_empty());
        let total_blocks: usize = pages.iter().map(|p| p.blocks.len()).sum();
        assert!(total_blocks > 0);
        // Some dark content must have survived onto the output.
        let dark = pages
            .iter()
            .flat_map(|p| p.bitmap.pixels())
            .filter(|px| px.0[0] < 128)
            .count();
        assert!(dark > 0);
    }

    #[test]
    fn test_break_pages_forces_page_per_source() {
        let mut settings = Settings::default().with_device(400, 2000, 100);
        settings.src_dpi = 100;
        settings.break_pages = true;
        let mut session = Session::new(settings).unwrap();
        let mut bmp = PageBitmap::blank(800, 600);
        blacken(&mut bmp, PixelRect::new(40, 50, 760, 80));
        let first = session.add_page(&bmp, 100, 0).unwrap();
        let second = session.add_page(&bmp, 100, 0).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
    }
}
