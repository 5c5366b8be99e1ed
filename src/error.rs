//! Error types for the reflow engine.
//!
//! This module defines all error types that can occur while decomposing and
//! re-rendering a page bitmap.

/// Result type alias for reflow operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur during page reflow.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration value or combination.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A region with impossible geometry was handed to a component that
    /// cannot silently skip it.
    #[error("Bad region geometry: ({c1},{r1}) - ({c2},{r2}): {reason}")]
    BadRegion {
        /// Left column of the offending rectangle
        c1: u32,
        /// Top row of the offending rectangle
        r1: u32,
        /// Right column of the offending rectangle
        c2: u32,
        /// Bottom row of the offending rectangle
        r2: u32,
        /// Why the geometry is unusable
        reason: String,
    },

    /// An internal invariant was violated.  This is a programming-error
    /// signal (e.g. word-wrap invoked on a region still containing multiple
    /// un-flattened rows) and is never triggered by well-formed input.
    #[error("Internal invariant violated: {0}")]
    InternalInvariant(String),

    /// Image encoding/decoding error from the `image` crate.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}
