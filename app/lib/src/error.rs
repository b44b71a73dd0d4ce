//! Error types for the bit-block tier layer.
//!
//! Almost every primitive is total: unsupported field widths or tiers
//! delegate to a more generic implementation instead of failing. The errors
//! here cover fatal configuration mistakes and the configuration surface.

use thiserror::Error;

/// Main error type for the bit-block tier layer.
#[derive(Debug, Error)]
pub enum IdisaError {
    /// The machine word width cannot drive an indexed advance.
    ///
    /// Raised for word widths other than 32 or 64, and for 32-bit words with
    /// a shift amount of 32 or more. Retrying with the same configuration
    /// always fails again.
    #[error("indexed advance unsupported for {width}-bit words with shift amount {shift}")]
    UnsupportedWordWidth {
        /// Machine word width in bits
        width: u32,
        /// Requested shift amount
        shift: u32,
    },

    /// Block width outside 128/256/512.
    #[error("unsupported block width {0} (expected 128, 256 or 512)")]
    UnsupportedBlockWidth(u32),

    /// Field width that is not a power of two dividing the block width.
    #[error("field width {fw} does not evenly partition a {block_width}-bit block")]
    UnsupportedFieldWidth {
        /// Requested field width
        fw: u32,
        /// Block width of the tier
        block_width: u32,
    },

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Configuration could not be parsed.
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Type alias for Results using `IdisaError`.
pub type Result<T> = std::result::Result<T, IdisaError>;
