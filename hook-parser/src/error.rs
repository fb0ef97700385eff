//! Error types for webhook payload parsing

use thiserror::Error;

/// Errors that can occur while turning a webhook body into a notification
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The XML tokenizer rejected the input
    #[error("Malformed XML at byte {position}: {message}")]
    MalformedXml {
        /// Byte offset the reader had reached when the error was raised
        position: usize,
        /// Reader error description
        message: String,
    },

    /// Well-formed tokens that do not form a single-rooted document
    #[error("Invalid XML structure: {0}")]
    InvalidXmlStructure(String),

    /// The document contained no root element at all
    #[error("Missing root element")]
    MissingRootElement,
}

/// Result type alias for parsing operations
pub type ParseResult<T> = Result<T, ParseError>;
