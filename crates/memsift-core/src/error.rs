use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Read of {size} bytes at {addr:#018x} is not contained in any region")]
    OutOfRange { addr: u64, size: u64 },

    #[error("Invalid object: {0}")]
    InvalidObject(&'static str),

    #[error("Type not present in analysis data: {0}")]
    MissingType(String),

    #[error("Base type object not present in analysis data; run find-base-type first")]
    MissingBaseType,

    #[error("Found {0} base type candidates instead of exactly one; analysis data unchanged")]
    AmbiguousBaseType(usize),

    #[error("Failed to open snapshot {path}: {message}")]
    Snapshot { path: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error is a bounds failure that validators treat as
    /// "object is invalid" rather than a fatal condition.
    pub fn is_out_of_range(&self) -> bool {
        matches!(self, Error::OutOfRange { .. })
    }

    pub fn snapshot(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Snapshot {
            path: path.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_out_of_range() {
        let err = Error::OutOfRange { addr: 0x1000, size: 8 };
        assert!(err.is_out_of_range());
        assert!(!Error::InvalidObject("invalid_entry").is_out_of_range());
    }
}
