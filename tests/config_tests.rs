//! Integration tests for loading configuration files.

use std::path::PathBuf;

use assert_fs::prelude::*;
use predicates::prelude::*;

use mailsexp::config::{cache_dir, load_config_from, log_file_path};

#[test]
fn test_load_full_config() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let file = tmp.child("config.toml");
    file.write_str(
        r#"
[general]
log_level = "debug"
cache_dir = "/var/tmp/mailsexp"

[search]
default_expression = '(match-all (not (system-flag "deleted")))'
use_body_index = false
thread_subject_grouping = false
max_cached_messages = 8

[store]
database = "summaries.db"
in_memory_only = true
"#,
    )
    .unwrap();
    file.assert(predicate::str::contains("[search]"));

    let cfg = load_config_from(file.path());
    assert_eq!(cfg.general.log_level, "debug");
    assert_eq!(cache_dir(&cfg), PathBuf::from("/var/tmp/mailsexp"));
    assert_eq!(
        log_file_path(&cfg),
        PathBuf::from("/var/tmp/mailsexp/mailsexp.log")
    );
    assert_eq!(
        cfg.search.default_expression,
        r#"(match-all (not (system-flag "deleted")))"#
    );
    assert!(!cfg.search.use_body_index);
    assert!(!cfg.search.thread_subject_grouping);
    assert_eq!(cfg.search.max_cached_messages, 8);
    assert_eq!(cfg.store.database, Some(PathBuf::from("summaries.db")));
    assert!(cfg.store.in_memory_only);
}

#[test]
fn test_invalid_config_falls_back_to_defaults() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let file = tmp.child("config.toml");
    file.write_str("[search\nuse_body_index = ").unwrap();

    let cfg = load_config_from(file.path());
    assert_eq!(cfg.general.log_level, "warn");
    assert_eq!(cfg.search.default_expression, "(match-all)");
    assert!(cfg.search.use_body_index);
}

#[test]
fn test_missing_config_falls_back_to_defaults() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let missing = tmp.child("nope.toml");
    missing.assert(predicate::path::missing());

    let cfg = load_config_from(missing.path());
    assert!(cfg.store.database.is_none());
    assert_eq!(cfg.search.max_cached_messages, 50);
}
