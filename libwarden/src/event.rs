//! Semantic events emitted by the monitor.

use std::fmt;
use std::path::{Path, PathBuf};

/// One normalized change. Consumers must handle every variant; the monitor
/// guarantees per-path causal order but nothing across unrelated paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    Created {
        path: PathBuf,
        is_directory: bool,
    },
    Updated {
        path: PathBuf,
        is_directory: bool,
    },
    Deleted {
        path: PathBuf,
        is_directory: bool,
    },
    Moved {
        from: PathBuf,
        to: PathBuf,
        is_directory: bool,
        /// The origin was inside the watched set when the move happened.
        is_source_monitored: bool,
    },
}

impl MonitorEvent {
    /// The path the event is about (the destination for moves).
    pub fn path(&self) -> &Path {
        match self {
            Self::Created { path, .. } | Self::Updated { path, .. } | Self::Deleted { path, .. } => {
                path
            }
            Self::Moved { to, .. } => to,
        }
    }

    pub fn is_directory(&self) -> bool {
        match self {
            Self::Created { is_directory, .. }
            | Self::Updated { is_directory, .. }
            | Self::Deleted { is_directory, .. }
            | Self::Moved { is_directory, .. } => *is_directory,
        }
    }

    /// `true` if the event mentions `p` as source or destination.
    pub fn touches(&self, p: &Path) -> bool {
        match self {
            Self::Moved { from, to, .. } => from == p || to == p,
            _ => self.path() == p,
        }
    }

    /// Short signal name, e.g. for logs and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Created { .. } => "item-created",
            Self::Updated { .. } => "item-updated",
            Self::Deleted { .. } => "item-deleted",
            Self::Moved { .. } => "item-moved",
        }
    }
}

impl fmt::Display for MonitorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = |d: bool| if d { " (dir)" } else { "" };
        match self {
            Self::Created { path, is_directory }
            | Self::Updated { path, is_directory }
            | Self::Deleted { path, is_directory } => {
                write!(f, "{} {}{}", self.kind(), path.display(), dir(*is_directory))
            }
            Self::Moved {
                from,
                to,
                is_directory,
                is_source_monitored,
            } => write!(
                f,
                "{} {} -> {}{}{}",
                self.kind(),
                from.display(),
                to.display(),
                dir(*is_directory),
                if *is_source_monitored {
                    ""
                } else {
                    " [source unmonitored]"
                }
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moved_touches_both_ends() {
        let ev = MonitorEvent::Moved {
            from: "/w/a".into(),
            to: "/w/b".into(),
            is_directory: false,
            is_source_monitored: true,
        };
        assert!(ev.touches(Path::new("/w/a")));
        assert!(ev.touches(Path::new("/w/b")));
        assert!(!ev.touches(Path::new("/w/c")));
        assert_eq!(ev.path(), Path::new("/w/b"));
        assert_eq!(ev.to_string(), "item-moved /w/a -> /w/b");
    }

    #[test]
    fn display_marks_directories() {
        let ev = MonitorEvent::Deleted {
            path: "/w/d".into(),
            is_directory: true,
        };
        assert_eq!(ev.to_string(), "item-deleted /w/d (dir)");
    }
}
