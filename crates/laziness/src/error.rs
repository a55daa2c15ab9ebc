//! Error type shared by promises and lazy values.

use thiserror::Error;

/// Errors produced while forcing or settling a computation.
///
/// A settled error is handed to every subscriber of the computation, so the
/// type is `Clone` and carries messages rather than boxed sources.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A computation failed, either while it was being started or after it
    /// went asynchronous.
    #[error("{0}")]
    Failed(String),

    /// The value was read before it settled.
    #[error("value is not ready")]
    NotReady,

    /// A resolver or completion callback was dropped without settling.
    #[error("computation was dropped before it settled")]
    Dropped,

    /// A continuation had to be delivered asynchronously but no Tokio
    /// runtime was available.
    #[error("no async runtime available to deliver the continuation")]
    NoRuntime,

    /// A spawned future panicked or was aborted.
    #[error("task failed: {0}")]
    Task(String),
}

impl Error {
    /// Create a computation failure from a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Error::Failed(message.into())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Failed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_displays_bare_message() {
        assert_eq!(Error::msg("boom").to_string(), "boom");
    }

    #[test]
    fn test_io_error_becomes_failure() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        assert_eq!(Error::from(io), Error::msg("no such file"));
    }
}
