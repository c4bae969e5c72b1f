use thiserror::Error;

pub type DavsyncResult<T> = Result<T, DavsyncError>;

#[derive(Debug, Error)]
pub enum DavsyncError {
    #[error("config error: {0}")]
    Config(String),

    #[error("capability negotiation failed: {0}")]
    CapabilityNegotiation(String),

    #[error("remote object not found: {0}")]
    NotFound(String),

    #[error("HTTP {status} for {path}")]
    Http { status: u16, path: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("incomplete download of {path}: received {received} of {expected} bytes")]
    IncompleteDownload {
        path: String,
        expected: u64,
        received: u64,
    },

    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("invalid size: {0}")]
    SizeValidation(String),

    #[error("{0} is not a valid encrypted size: not a multiple of 16")]
    NotBlockAligned(i64),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("invalid vault path: {0}")]
    InvalidPath(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DavsyncError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DavsyncError::NotFound(_))
    }

    /// The server refused the request outright (HTTP 403).
    pub fn is_forbidden(&self) -> bool {
        matches!(self, DavsyncError::Http { status: 403, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_predicates() {
        assert!(DavsyncError::NotFound("/a".into()).is_not_found());
        assert!(!DavsyncError::NotFound("/a".into()).is_forbidden());

        let forbidden = DavsyncError::Http {
            status: 403,
            path: "/base/".into(),
        };
        assert!(forbidden.is_forbidden());
        assert!(!forbidden.is_not_found());
    }

    #[test]
    fn test_incomplete_download_message() {
        let err = DavsyncError::IncompleteDownload {
            path: "/base/file".into(),
            expected: 100,
            received: 64,
        };
        assert_eq!(
            err.to_string(),
            "incomplete download of /base/file: received 64 of 100 bytes"
        );
    }
}
