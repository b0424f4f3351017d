// libwarden/src/utils_tests.rs

use super::utils::{
    canonicalize_lossy, is_within, normalize_lexical, rebase,
    resolve_relative,
};
use std::path::{Path, PathBuf};

#[test]
fn lexical_normalization_drops_dots() {
    assert_eq!(
        normalize_lexical(Path::new("/a/./b/../c")),
        PathBuf::from("/a/c")
    );
    assert_eq!(normalize_lexical(Path::new("/../..")), PathBuf::from("/"));
}

#[test]
fn canonicalize_missing_path_is_absolute() {
    let p = canonicalize_lossy("/definitely/not/here/../there");
    assert_eq!(p, PathBuf::from("/definitely/not/there"));

    let rel = canonicalize_lossy("no-such-relative-entry");
    assert!(rel.is_absolute());
}

#[test]
fn canonicalize_existing_dir() {
    let tmp = tempfile::tempdir().unwrap();
    let dotted = tmp.path().join(".");
    assert_eq!(
        canonicalize_lossy(&dotted),
        std::fs::canonicalize(tmp.path()).unwrap()
    );
}

#[test]
fn prefix_checks_respect_component_boundaries() {
    let foo = Path::new("/w/foo");
    assert!(is_within(Path::new("/w/foo"), foo));
    assert!(is_within(Path::new("/w/foo/bar"), foo));
    assert!(!is_within(Path::new("/w/foobar"), foo));
}

#[test]
fn rebase_replaces_prefix() {
    let old = Path::new("/w/foo");
    let new = Path::new("/w/renamed");
    assert_eq!(rebase(old, old, new), Some(new.to_path_buf()));
    assert_eq!(
        rebase(Path::new("/w/foo/a/b.txt"), old, new),
        Some(PathBuf::from("/w/renamed/a/b.txt"))
    );
    assert_eq!(rebase(Path::new("/w/foobar"), old, new), None);
}

#[test]
fn relative_names_resolve_against_subscription() {
    let base = Path::new("/w");
    assert_eq!(resolve_relative(base, Path::new("")), PathBuf::from("/w"));
    assert_eq!(
        resolve_relative(base, Path::new("x.txt")),
        PathBuf::from("/w/x.txt")
    );
}
