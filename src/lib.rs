//! Reflow engine for rasterized document pages.
//!
//! `rasterflow` takes scanned or rendered page bitmaps and re-composes
//! their content for a small destination screen: it finds columns, splits
//! them into blocks at large vertical gaps, measures line geometry, wraps
//! words onto new lines where the text is wider than the device, and
//! paginates the result.  Every output pixel carries a map back to its
//! source-page rectangle.
//!
//! # Quick start
//!
//! ```no_run
//! use rasterflow::{PageBitmap, Session, Settings};
//!
//! # fn main() -> rasterflow::Result<()> {
//! let settings = Settings::new().with_device(560, 735, 167);
//! let mut session = Session::new(settings)?;
//!
//! let page = PageBitmap::blank(2550, 3300); // your scanned page here
//! let mut out = session.add_page(&page, 300, 0)?;
//! out.extend(session.finish()?);
//! for (i, page) in out.iter().enumerate() {
//!     println!("output page {}: {} blocks", i, page.blocks.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Pipeline
//!
//! 1. **Decomposition** ([`layout::columns`]): recursive column divider
//!    search, or a fixed grid, producing regions in reading order.
//! 2. **Vertical breaking** ([`layout::vertical_break`]): each region is
//!    cut into blocks at gaps larger than a multiple of the median row
//!    gap.
//! 3. **Line analysis** ([`layout::line_stats`]): per-block justification,
//!    indentation, and line-spacing statistics.
//! 4. **Re-flow** ([`reflow`]): greedy word wrapping with hyphen joining,
//!    preserved paragraph indents, and figure passthrough.
//! 5. **Compositing** ([`render`]): scaled placement on the master canvas
//!    with source coordinate maps, then pagination.

pub mod bitmap;
pub mod config;
pub mod error;
pub mod geometry;
pub mod layout;
pub mod reflow;
pub mod region;
pub mod render;
pub mod session;

pub use bitmap::PageBitmap;
pub use config::{GridOrder, GridParams, Justify, Settings, TextWrap};
pub use error::{Error, Result};
pub use geometry::PixelRect;
pub use region::{Region, TrimSides};
pub use render::{BlockInfo, CropBox, OutputPage, WRectMap};
pub use session::Session;
