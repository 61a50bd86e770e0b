//! Error types for ATR parsing and editing

use thiserror::Error;

/// Result type for ATR operations
pub type Result<T> = std::result::Result<T, AtrError>;

/// Errors raised while parsing an ATR or applying an edit to it
///
/// Structural variants make the whole ATR unreadable. The remaining variants
/// are precondition failures of a direct API call and never end up stored in
/// the model.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AtrError {
    /// Indicated bytes run past the end of the buffer
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Bytes are present but cannot form an ATR
    #[error("Invalid structure: {0}")]
    InvalidStructure(String),

    /// TCK does not match the XOR of the preceding bytes
    #[error("Checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    /// A field value outside the range the standard allows
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// An edit that would leave the ATR inconsistent
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl AtrError {
    /// Create a new InsufficientData error
    pub fn insufficient_data(msg: impl Into<String>) -> Self {
        AtrError::InsufficientData(msg.into())
    }

    /// Create a new InvalidStructure error
    pub fn invalid_structure(msg: impl Into<String>) -> Self {
        AtrError::InvalidStructure(msg.into())
    }

    /// Create a new InvalidParameter error
    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        AtrError::InvalidParameter(msg.into())
    }

    /// Create a new InvalidOperation error
    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        AtrError::InvalidOperation(msg.into())
    }

    /// Whether this error means the bytes themselves could not be parsed
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            AtrError::InsufficientData(_)
                | AtrError::InvalidStructure(_)
                | AtrError::ChecksumMismatch { .. }
        )
    }
}

/// A content error inside the historical characters
///
/// Unlike [`AtrError`], this is data rather than a failure: it is attached to
/// the historical characters it was found in and the rest of the ATR stays
/// usable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[error("{message} (at byte {byte_index})")]
pub struct ParseError {
    /// Human readable description
    pub message: String,
    /// Offset into the historical characters where the problem was found
    pub byte_index: usize,
}

impl ParseError {
    /// Create a new content error at `byte_index`
    pub fn new(message: impl Into<String>, byte_index: usize) -> Self {
        ParseError {
            message: message.into(),
            byte_index,
        }
    }
}
