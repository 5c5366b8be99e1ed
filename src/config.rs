//! Configuration for the reflow pipeline.
//!
//! `Settings` is an immutable record owned by the caller and threaded through
//! every component.  The geometric thresholds are empirically tuned values;
//! each one is a named, independently overridable field rather than a magic
//! number buried in the algorithms.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Text wrapping mode for recognized text rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextWrap {
    /// Never wrap; every block is rendered atomically.
    Off,
    /// Re-flow rows that are wider than the maximum region width.
    Reflow,
    /// Re-flow all rows, joining short lines into the running paragraph.
    ReflowShortLines,
}

/// Horizontal justification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Justify {
    /// Flush left
    #[default]
    Left,
    /// Centered
    Center,
    /// Flush right
    Right,
}

/// Grid decomposition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GridOrder {
    /// Fill each column top to bottom before moving right.
    ColumnMajor,
    /// Fill each row left to right before moving down.
    RowMajor,
}

/// Fixed row/column grid decomposition.  When set, the column divider search
/// is bypassed entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridParams {
    /// Number of grid rows (> 0)
    pub rows: u32,
    /// Number of grid columns (> 0)
    pub cols: u32,
    /// Cell overlap as a percentage of the page dimension
    pub overlap_percent: u32,
    /// Traversal order of the grid cells
    pub order: GridOrder,
}

/// Immutable reflow settings.
///
/// Defaults are tuned for 300 dpi scans on a 6-inch e-reader screen; see
/// the field docs for units.  Use the builder-style `with_*` methods for
/// the common overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // ---- Column decomposition ----
    /// Maximum number of columns to search for (1, 2, or 4).
    pub max_columns: u32,
    /// Minimum height of a valid column, in inches.
    pub min_column_height_in: f64,
    /// Minimum width of the whitespace shaft between two columns, in inches.
    pub min_column_gap_in: f64,
    /// Maximum width of the whitespace gap between two trimmed columns, in
    /// inches.  A larger gap means the "columns" are probably unrelated
    /// regions.
    pub max_column_gap_in: f64,
    /// Fraction of the region width over which the divider search ranges,
    /// centered on the midpoint.
    pub column_gap_range: f64,
    /// Maximum horizontal drift of a column divider between stacked row
    /// bands, as a fraction of the region width.  Negative disables the
    /// drift check.
    pub column_offset_max: f64,
    /// Allowed foreground density inside a candidate shaft, as a fraction of
    /// the shaft height per shaft column.
    pub shaft_clear_tolerance: f64,
    /// Optional fixed grid decomposition (bypasses divider search).
    pub grid: Option<GridParams>,

    // ---- Vertical break ----
    /// A row gap larger than `median gap x this factor` breaks the region
    /// into separate blocks.  Negative disables vertical breaking.
    pub vertical_break_threshold: f64,

    // ---- Source geometry ----
    /// Background-color threshold: pixels darker than this are foreground.
    pub bg_threshold: u8,
    /// Source DPI used for margin arithmetic.
    pub src_dpi: u32,
    /// Reading direction: `true` for left-to-right scripts.
    pub src_left_to_right: bool,
    /// Trim whitespace margins from source regions.
    pub src_trim: bool,
    /// Source page top margin, in inches.
    pub mar_top: f64,
    /// Source page bottom margin, in inches.
    pub mar_bot: f64,

    // ---- Destination geometry ----
    /// Destination device width, in pixels.
    pub dst_width: u32,
    /// Destination device height, in pixels.
    pub dst_height: u32,
    /// Destination device DPI.
    pub dst_dpi: u32,
    /// Destination left margin, in inches.
    pub dst_mar_left: f64,
    /// Destination right margin, in inches.
    pub dst_mar_right: f64,
    /// Destination top margin, in inches.
    pub dst_mar_top: f64,
    /// Destination bottom margin, in inches.
    pub dst_mar_bot: f64,
    /// Maximum width of a region that is rendered without wrapping, in
    /// inches.
    pub max_region_width_in: f64,
    /// Tall-region (figure) expansion toward full device width, as a
    /// percentage.  `None` disables figure expansion; `Some(0)` with
    /// `figure_fit_full` expands all the way.
    pub dst_fit_to_page: Option<i32>,
    /// Minimum height for a region to be treated as a figure, in inches.
    pub min_figure_height_in: f64,
    /// Render each detected column at a single fitted scale instead of
    /// wrapping, when the column is already close to the device width.
    pub fit_columns: bool,

    // ---- Justification policy ----
    /// Forced destination justification; `None` follows the detected
    /// per-row justification.
    pub dst_justify: Option<Justify>,
    /// Forced full justification; `None` follows the detected state.
    pub dst_fulljustify: Option<bool>,
    /// Justification override for figure regions; `None` leaves figures at
    /// the block justification.
    pub dst_figure_justify: Option<Justify>,

    // ---- Text wrapping ----
    /// Wrapping mode.
    pub text_wrap: TextWrap,
    /// Inter-word gap threshold as a multiple of the lowercase letter
    /// height.
    pub word_spacing: f64,
    /// Line spacing override, normalized to the single-spaced line height.
    /// Positive forces the value; negative caps the computed spacing at the
    /// absolute value; `None` keeps the computed spacing.
    pub vertical_line_spacing: Option<f64>,

    // ---- Output pagination ----
    /// Break the output page after every source page.
    pub break_pages: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_columns: 2,
            min_column_height_in: 1.5,
            min_column_gap_in: 0.1,
            max_column_gap_in: 1.5,
            column_gap_range: 0.33,
            column_offset_max: 0.3,
            shaft_clear_tolerance: 0.005,
            grid: None,
            vertical_break_threshold: 1.75,
            bg_threshold: 192,
            src_dpi: 300,
            src_left_to_right: true,
            src_trim: true,
            mar_top: 0.25,
            mar_bot: 0.25,
            dst_width: 560,
            dst_height: 735,
            dst_dpi: 167,
            dst_mar_left: 0.02,
            dst_mar_right: 0.02,
            dst_mar_top: 0.02,
            dst_mar_bot: 0.02,
            max_region_width_in: 3.6,
            dst_fit_to_page: None,
            min_figure_height_in: 0.75,
            fit_columns: true,
            dst_justify: None,
            dst_fulljustify: None,
            dst_figure_justify: None,
            text_wrap: TextWrap::Reflow,
            word_spacing: 0.375,
            vertical_line_spacing: None,
            break_pages: false,
        }
    }
}

impl Settings {
    /// Create settings with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the destination device geometry (width px, height px, dpi).
    pub fn with_device(mut self, width: u32, height: u32, dpi: u32) -> Self {
        self.dst_width = width;
        self.dst_height = height;
        self.dst_dpi = dpi;
        self
    }

    /// Set the maximum number of columns to search for.
    pub fn with_max_columns(mut self, max_columns: u32) -> Self {
        self.max_columns = max_columns;
        self
    }

    /// Set the text wrapping mode.
    pub fn with_text_wrap(mut self, mode: TextWrap) -> Self {
        self.text_wrap = mode;
        self
    }

    /// Set the vertical break threshold (negative disables).
    pub fn with_vertical_break_threshold(mut self, threshold: f64) -> Self {
        self.vertical_break_threshold = threshold;
        self
    }

    /// Set the reading direction.
    pub fn with_left_to_right(mut self, ltr: bool) -> Self {
        self.src_left_to_right = ltr;
        self
    }

    /// Set a fixed grid decomposition.
    pub fn with_grid(mut self, grid: GridParams) -> Self {
        self.grid = Some(grid);
        self
    }

    /// Destination width usable by content, in pixels (device width minus
    /// left/right margins).
    pub fn usable_width(&self) -> u32 {
        let margins = ((self.dst_mar_left + self.dst_mar_right) * self.dst_dpi as f64) as u32;
        self.dst_width.saturating_sub(margins).max(1)
    }

    /// Destination height usable by content, in pixels.
    pub fn usable_height(&self) -> u32 {
        let margins = ((self.dst_mar_top + self.dst_mar_bot) * self.dst_dpi as f64) as u32;
        self.dst_height.saturating_sub(margins).max(1)
    }

    /// Validate value ranges.  Called by `Session::new`.
    pub fn validate(&self) -> Result<()> {
        if self.dst_width == 0 || self.dst_height == 0 || self.dst_dpi == 0 {
            return Err(Error::Config(
                "destination geometry must be non-zero".to_string(),
            ));
        }
        if self.max_columns == 0 {
            return Err(Error::Config("max_columns must be at least 1".to_string()));
        }
        if let Some(grid) = &self.grid {
            if grid.rows == 0 || grid.cols == 0 {
                return Err(Error::Config(
                    "grid rows and cols must be non-zero".to_string(),
                ));
            }
        }
        if self.min_column_gap_in <= 0.0 || self.min_column_height_in <= 0.0 {
            return Err(Error::Config(
                "column gap and height minimums must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.column_gap_range) {
            return Err(Error::Config(
                "column_gap_range must be within [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}
