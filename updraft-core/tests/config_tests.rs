//! Config error-message, atomic-write-safety and layout integration tests.

use assert_fs::prelude::*;
use predicates::prelude::predicate;
use rstest::rstest;
use std::fs;
use std::path::Path;

use updraft_core::{
    config::{self, UpdraftConfig},
    layout::{self, Layout},
    ConfigError, FileDescriptor,
};

// ---------------------------------------------------------------------------
// 1. Load error messages
// ---------------------------------------------------------------------------

#[test]
fn load_missing_config_mentions_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::ConfigNotFound { .. }), "got: {err}");
    assert!(err.to_string().contains("config not found"));
    assert!(err.to_string().contains("config.yaml"));
}

#[test]
fn load_corrupt_yaml_returns_parse_error_with_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".updraft/config.yaml")
        .write_str(": : corrupt : yaml : !!!\n  - broken: [unclosed")
        .expect("write");

    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("config.yaml"), "must contain file path, got: {err}");
}

#[test]
fn load_rejects_invalid_values() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".updraft/config.yaml")
        .write_str("root: /srv\napi_base: ftp://example.com\n")
        .expect("write");

    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)), "got: {err}");
    assert!(err.to_string().contains("ftp://example.com"));
}

#[test]
fn load_parses_files_and_directories() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".updraft/config.yaml")
        .write_str(
            "root: /srv/tools\n\
             layout: branch_scoped\n\
             files:\n\
             \x20 - owner: octo\n\
             \x20   repo: widgets\n\
             \x20   path: bin/tool\n\
             \x20   ref: v2\n\
             directories:\n\
             \x20 - owner: octo\n\
             \x20   repo: assets\n\
             \x20   subpath: icons/dark\n\
             \x20   dest: /srv/icons\n",
        )
        .expect("write");

    let loaded = config::load_at(home.path()).expect("load");
    assert_eq!(loaded.layout, Layout::BranchScoped);
    assert_eq!(
        loaded.files,
        vec![FileDescriptor::new("octo", "widgets", "bin/tool", Some("v2"))]
    );
    assert_eq!(loaded.directories.len(), 1);
    assert_eq!(loaded.directories[0].subpath.as_deref(), Some("icons/dark"));
    assert_eq!(loaded.directories[0].reference, None);
}

// ---------------------------------------------------------------------------
// 2. Init + atomic save
// ---------------------------------------------------------------------------

#[test]
fn init_creates_config_and_is_idempotent() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let first = config::init_at(home.path(), "/srv/one".into()).expect("init");
    home.child(".updraft/config.yaml")
        .assert(predicate::path::exists());

    let second = config::init_at(home.path(), "/srv/two".into()).expect("init again");
    assert_eq!(first, second, "second init must return the existing config");
    assert_eq!(second.root, Path::new("/srv/one"));
}

#[test]
fn save_overwrites_without_leaving_tmp() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    config::save_at(home.path(), &UpdraftConfig::with_root("/a")).expect("save a");
    config::save_at(home.path(), &UpdraftConfig::with_root("/b")).expect("save b");

    home.child(".updraft/config.yaml.tmp")
        .assert(predicate::path::missing());
    let contents = fs::read_to_string(config::config_path_at(home.path())).expect("read");
    assert!(contents.contains("root: /b"));
}

// ---------------------------------------------------------------------------
// 3. Layout
// ---------------------------------------------------------------------------

#[rstest]
#[case(Layout::Flat, "main", "tools/a/b/x.txt")]
#[case(Layout::BranchScoped, "main", "tools/a/b/main/x.txt")]
#[case(Layout::BranchScoped, "feature/y", "tools/a/b/feature_y/x.txt")]
fn layout_places_files(#[case] layout: Layout, #[case] branch: &str, #[case] expected: &str) {
    let path = layout::local_path(Path::new("tools"), layout, "a", "b", branch, "x.txt")
        .expect("path");
    let expected: std::path::PathBuf = expected.split('/').collect();
    assert_eq!(path, expected);
}

#[rstest]
#[case("..")]
#[case("a/../../b")]
#[case("/etc/passwd")]
#[case("a//b")]
fn layout_rejects_unsafe_paths(#[case] remote: &str) {
    assert!(
        layout::local_path(Path::new("root"), Layout::Flat, "a", "b", "main", remote).is_none(),
        "{remote} must be rejected"
    );
}
