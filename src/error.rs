/// Error types for the ipdb library
use std::fmt;

/// Result type alias for database operations
pub type Result<T> = std::result::Result<T, IpdbError>;

/// Main error type for database generation and reading
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpdbError {
    /// Malformed or family-mismatched address given to an insertion or query
    InvalidAddress(String),

    /// Range end precedes range start
    InvalidRange(String),

    /// Structural inconsistency found while parsing a database buffer
    CorruptDatabase(String),

    /// A trie record value does not fit the configured record width
    RecordOverflow(String),
}

impl fmt::Display for IpdbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpdbError::InvalidAddress(msg) => write!(f, "Invalid address: {}", msg),
            IpdbError::InvalidRange(msg) => write!(f, "Invalid range: {}", msg),
            IpdbError::CorruptDatabase(msg) => write!(f, "Corrupt database: {}", msg),
            IpdbError::RecordOverflow(msg) => write!(f, "Record overflow: {}", msg),
        }
    }
}

impl std::error::Error for IpdbError {}
