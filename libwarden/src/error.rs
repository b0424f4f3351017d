//! Error types for Warden
//!
//! Only the backend boundary produces these; the public `Monitor` API
//! reports failures through `bool` / count returns and logs the detail.

use std::fmt;
use std::io;

/// Result type for Warden - convenience wrapper around Result<T, Error>
pub type Result<T> = std::result::Result<T, Error>;

/// Custom error types for Warden
#[derive(Debug)]
pub enum Error {
    /// An IO error
    Io(io::Error),

    /// An error from the notification backend
    Watch(String),

    /// The backend refused a new subscription (e.g. inotify watch limit)
    LimitReached(String),

    /// Path not found
    NotFound(String),

    /// The raw event stream was closed
    Disconnected,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "IO error: {}", err),
            Self::Watch(msg) => write!(f, "Watch error: {}", msg),
            Self::LimitReached(msg) => write!(f, "Watch limit reached: {}", msg),
            Self::NotFound(path) => write!(f, "Not found: {}", path),
            Self::Disconnected => write!(f, "Backend event stream disconnected"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<notify::Error> for Error {
    fn from(err: notify::Error) -> Self {
        match err.kind {
            notify::ErrorKind::MaxFilesWatch => Self::LimitReached(err.to_string()),
            notify::ErrorKind::PathNotFound => Self::NotFound(
                err.paths
                    .first()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
            ),
            _ => Self::Watch(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_prefixed_by_kind() {
        assert_eq!(
            Error::NotFound("/nope".into()).to_string(),
            "Not found: /nope"
        );
        assert_eq!(
            Error::Disconnected.to_string(),
            "Backend event stream disconnected"
        );
    }

    #[test]
    fn notify_limit_maps_to_limit_reached() {
        let err: Error = notify::Error::new(notify::ErrorKind::MaxFilesWatch).into();
        assert!(matches!(err, Error::LimitReached(_)));
    }

    #[test]
    fn io_error_converts() {
        let err: Error = io::Error::new(io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("denied"));
    }
}
