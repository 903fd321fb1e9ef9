//! Error types for the xlsxstream library

use thiserror::Error;

/// Result type alias for xlsxstream operations
pub type Result<T> = std::result::Result<T, XlsxError>;

/// Main error type for all write operations
///
/// Note that "value does not fit in the remaining buffer" is *not* an error:
/// it is reported as a `false` return on the try-write protocol and drives
/// the flush-and-resume path.
#[derive(Error, Debug)]
pub enum XlsxError {
    /// Operation called in the wrong lifecycle state
    /// (no active worksheet, worksheet already finished, workbook closed)
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// A value is outside the range the XLSX format allows
    #[error("{what} {value} out of range (max {max})")]
    OutOfRange {
        what: &'static str,
        value: u64,
        max: u64,
    },

    /// Row indices must increase by exactly one per row within a worksheet
    #[error("row {got} out of sequence, expected row {expected}")]
    RowOutOfSequence { expected: u32, got: u32 },

    /// Sheet name is empty, too long, contains a reserved character,
    /// or duplicates an existing sheet
    #[error("invalid sheet name: {0}")]
    InvalidSheetName(String),

    /// A float value that cannot be represented in a cell (NaN or infinite)
    #[error("cell value is not a finite number")]
    NotFinite,

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// ZIP container error wrapper
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// The cancellation token fired at a flush boundary; the worksheet and
    /// workbook must be discarded
    #[error("operation cancelled")]
    Cancelled,
}
