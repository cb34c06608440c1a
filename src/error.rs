//! Error types for cdn-tunnel.

use thiserror::Error;

/// Main error type for cdn-tunnel operations.
#[derive(Error, Debug)]
pub enum TunnelError {
    /// Failed to dial the configured backend destination.
    #[error("backend dial failed: {0}")]
    Dial(std::io::Error),

    /// Failed to spawn the configured application command.
    #[error("application spawn failed: {0}")]
    Spawn(std::io::Error),

    /// The subprocess stdio pipes could not be acquired.
    #[error("application stdio unavailable: {0}")]
    Stdio(&'static str),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type for cdn-tunnel operations.
pub type Result<T> = std::result::Result<T, TunnelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dial_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = TunnelError::Dial(io_err);
        assert!(err.to_string().contains("dial failed"));
        assert!(err.to_string().contains("refused"));
    }

    #[test]
    fn test_spawn_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = TunnelError::Spawn(io_err);
        assert!(err.to_string().contains("spawn failed"));
        assert!(err.to_string().contains("no such file"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: TunnelError = io_err.into();
        assert!(matches!(err, TunnelError::Io(_)));
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_stdio_error_display() {
        let err = TunnelError::Stdio("stdin");
        assert!(err.to_string().contains("stdin"));
    }
}
