use thiserror::Error;

/// Outcome codes for catalog construction, save and load operations.
///
/// Every decode step propagates the first error upward unchanged; the
/// top-level save/open entry points are the only cleanup sites.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("invalid parameter")]
    InvalidParameter,
    #[error("buffer overrun: wanted {wanted} bytes at offset {offset}, buffer size {size}")]
    BufferOverrun { offset: usize, wanted: usize, size: usize },
    #[error("not supported: {0}")]
    NotSupported(String),
    #[error("out of memory")]
    NoMemory,
    #[error("file not found: {0}")]
    FileNotFound(#[from] std::io::Error),
    #[error("invalid format: {0}")]
    InvalidFormat(String),
}

impl CatalogError {
    /// True when the error came from a read past the end of a file buffer.
    pub fn is_overrun(&self) -> bool {
        matches!(self, CatalogError::BufferOverrun { .. })
    }
}
