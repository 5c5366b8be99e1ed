//! Detected text rows and their geometry statistics.

/// Classification of a detected row band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowType {
    /// A single line of text.
    Line,
    /// A block spanning several lines (used for region bounding boxes).
    Multiline,
    /// A non-text band (figure, image, rule) that must never be wrapped.
    Figure,
}

/// One contiguous horizontal band of foreground pixels.
///
/// All extents are inclusive source-pixel coordinates.  The letter-height
/// metrics are derived from the band's vertical mass profile: `capheight`
/// from near the top of the glyph mass, `lcheight` from the x-height region,
/// and `h5050` from twice the distance between the 50%-mass row and the
/// baseline.
#[derive(Debug, Clone)]
pub struct TextRow {
    /// Top row
    pub r1: u32,
    /// Bottom row
    pub r2: u32,
    /// Left column of foreground content
    pub c1: u32,
    /// Right column of foreground content
    pub c2: u32,
    /// Baseline row (bottom of the main glyph mass)
    pub rowbase: u32,
    /// Band classification
    pub row_type: RowType,
    /// Capital letter height in pixels
    pub capheight: u32,
    /// Lowercase (x-height) letter height in pixels
    pub lcheight: u32,
    /// 50%-threshold letter height in pixels
    pub h5050: u32,
    /// Baseline-to-baseline height to the next row (band height for the
    /// last row)
    pub rowheight: u32,
    /// Pixel gap to the next row band (to the region bottom for the last
    /// row)
    pub gap: u32,
    /// Count of fully blank rows in that gap
    pub gapblank: u32,
    /// Ragged-edge ratio, when measured
    pub rat: Option<f32>,
}

impl TextRow {
    /// A zeroed row descriptor covering the given rectangle.
    pub fn from_extents(c1: u32, r1: u32, c2: u32, r2: u32, row_type: RowType) -> Self {
        Self {
            r1,
            r2,
            c1,
            c2,
            rowbase: r2,
            row_type,
            capheight: r2 - r1 + 1,
            lcheight: (r2 - r1 + 1).max(1) / 2,
            h5050: r2 - r1 + 1,
            rowheight: r2 - r1 + 1,
            gap: 0,
            gapblank: 0,
            rat: None,
        }
    }

    /// Band height in pixels.
    pub fn height(&self) -> u32 {
        self.r2 - self.r1 + 1
    }

    /// Scale all coordinates, clamping to the given destination extents.
    /// Used when a rendered block is resampled and its row descriptor must
    /// follow.
    pub fn scale(&mut self, scale_w: f64, scale_h: f64, max_col: u32, max_row: u32) {
        let sc = |v: u32, s: f64, max: u32| ((v as f64 * s).round() as u32).min(max);
        self.c1 = sc(self.c1, scale_w, max_col);
        self.c2 = sc(self.c2, scale_w, max_col);
        self.r1 = sc(self.r1, scale_h, max_row);
        self.r2 = sc(self.r2, scale_h, max_row);
        self.rowbase = sc(self.rowbase, scale_h, max_row);
        self.capheight = (self.capheight as f64 * scale_h).round() as u32;
        self.lcheight = (self.lcheight as f64 * scale_h).round() as u32;
        self.h5050 = (self.h5050 as f64 * scale_h).round() as u32;
        self.rowheight = (self.rowheight as f64 * scale_h).round() as u32;
        self.gap = (self.gap as f64 * scale_h).round() as u32;
        self.gapblank = (self.gapblank as f64 * scale_h).round() as u32;
    }
}

/// Ordered sequence of detected rows.
///
/// Analyses that need gap-ordered data use `sorted_by_gap()`, which returns
/// a fresh copy instead of re-sorting in place, so the position order can
/// never go stale.
#[derive(Debug, Clone, Default)]
pub struct TextRows {
    /// Rows in top-to-bottom position order.
    pub rows: Vec<TextRow>,
}

impl TextRows {
    /// Empty sequence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a row.
    pub fn push(&mut self, row: TextRow) {
        self.rows.push(row);
    }

    /// Read-only copy sorted by top row position.
    pub fn sorted_by_position(&self) -> Vec<TextRow> {
        let mut rows = self.rows.clone();
        rows.sort_by_key(|row| (row.r1, row.c1));
        rows
    }

    /// Read-only copy sorted by gap to the next row.
    pub fn sorted_by_gap(&self) -> Vec<TextRow> {
        let mut rows = self.rows.clone();
        rows.sort_by_key(|row| row.gap);
        rows
    }
}
