use thiserror::Error as ThisError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Index closed, directory missing or not writable
    IndexUnavailable,
    /// Lock could not be obtained (write lock timeout, engine lock held)
    LockContention,
    /// Stored data does not match the type definitions
    Mapping,
    Io,
    /// Reported by validation only; callers reindex from source
    Corruption,
    Parse,
    InvalidArgument,
    InvalidState,
    Internal,
}

#[derive(Debug, ThisError)]
#[error("{kind:?}: {context}")]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
}

impl Error {
    pub fn new(kind: ErrorKind, context: String) -> Self {
        Error { kind, context }
    }

    pub fn unavailable(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::IndexUnavailable, context.into())
    }

    pub fn lock_contention(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::LockContention, context.into())
    }

    pub fn mapping(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Mapping, context.into())
    }

    pub fn corruption(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Corruption, context.into())
    }

    pub fn invalid_state(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::InvalidState, context.into())
    }

    pub fn invalid_argument(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::InvalidArgument, context.into())
    }

    pub fn internal(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Internal, context.into())
    }

    pub fn is_corruption(&self) -> bool {
        self.kind == ErrorKind::Corruption
    }

    pub fn is_lock_contention(&self) -> bool {
        self.kind == ErrorKind::LockContention
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error {
            kind: ErrorKind::Io,
            context: err.to_string(),
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error {
            kind: ErrorKind::Parse,
            context: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            kind: ErrorKind::Parse,
            context: format!("JSON error: {}", err),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::corruption("segment 7 checksum mismatch");
        assert_eq!(err.to_string(), "Corruption: segment 7 checksum mismatch");
        assert!(err.is_corruption());
        assert!(!err.is_lock_contention());
    }

    #[test]
    fn test_io_errors_are_not_corruption() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert_eq!(err.kind, ErrorKind::Io);
        assert!(!err.is_corruption());
    }
}
