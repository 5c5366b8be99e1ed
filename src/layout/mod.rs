//! Page-level layout analysis: column decomposition, vertical block
//! splitting, and line statistics.

pub mod columns;
pub mod line_stats;
pub mod vertical_break;
