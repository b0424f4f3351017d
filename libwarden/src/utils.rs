//! Path helpers shared by the watch table and the normalizer.
//!
//! Watch entries are keyed by canonical absolute paths. Subtree tests use
//! `Path::starts_with`, which compares whole components, so `/foo` never
//! claims `/foobar`.

use std::path::{Component, Path, PathBuf};

/// Canonicalize when the path exists, otherwise make it absolute and
/// normalize it lexically. Never fails.
pub fn canonicalize_lossy<P: AsRef<Path>>(path: P) -> PathBuf {
    let path = path.as_ref();
    if let Ok(c) = std::fs::canonicalize(path) {
        return c;
    }
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };
    normalize_lexical(&absolute)
}

/// Resolve `.` and `..` without touching the filesystem.
pub fn normalize_lexical(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                // never climb above the root
                if !matches!(
                    out.components().next_back(),
                    None | Some(Component::RootDir) | Some(Component::Prefix(_))
                ) {
                    out.pop();
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// `true` when `path` is `ancestor` or lies underneath it.
pub fn is_within(path: &Path, ancestor: &Path) -> bool {
    path.starts_with(ancestor)
}

/// Replace the `old_prefix` part of `path` with `new_prefix`.
///
/// Returns `None` when `path` is not inside `old_prefix`.
pub fn rebase(path: &Path, old_prefix: &Path, new_prefix: &Path) -> Option<PathBuf> {
    let rest = path.strip_prefix(old_prefix).ok()?;
    if rest.as_os_str().is_empty() {
        Some(new_prefix.to_path_buf())
    } else {
        Some(new_prefix.join(rest))
    }
}

/// Join a backend-relative name onto the subscription path. An empty name
/// denotes the subscribed object itself.
pub fn resolve_relative(base: &Path, name: &Path) -> PathBuf {
    if name.as_os_str().is_empty() {
        base.to_path_buf()
    } else {
        base.join(name)
    }
}
