//! Integration tests for MBOX folders: parsing, the persisted summary
//! index, and searches run against a real file.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use assert_fs::prelude::*;
use predicates::prelude::*;

use mailsexp::index::builder;
use mailsexp::model::flags::MessageFlags;
use mailsexp::model::mail::Uid;
use mailsexp::parser::header::{decode_encoded_words, parse_date};
use mailsexp::parser::mbox::MboxParser;
use mailsexp::search::body::for_each_text;
use mailsexp::search::{Cancellable, FolderSearch, MemoryIndex};
use mailsexp::store::{Folder, FolderOptions, MboxFolder, SqliteStore};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn uids(list: &[&str]) -> Vec<Uid> {
    list.iter().map(|u| Uid::from(*u)).collect()
}

/// Copy a fixture into a scratch directory so index files land there.
fn scratch(name: &str) -> (assert_fs::TempDir, PathBuf) {
    let tmp = assert_fs::TempDir::new().unwrap();
    tmp.child(name).write_file(&fixture(name)).unwrap();
    let path = tmp.path().join(name);
    (tmp, path)
}

fn options(tmp: &assert_fs::TempDir) -> FolderOptions {
    FolderOptions {
        cache_dir: tmp.path().join("cache"),
        ..FolderOptions::default()
    }
}

fn open(name: &str) -> (assert_fs::TempDir, Rc<MboxFolder>) {
    let (tmp, path) = scratch(name);
    let folder = MboxFolder::open(&path, &options(&tmp), None).unwrap();
    (tmp, Rc::new(folder))
}

fn search_in(folder: &Rc<MboxFolder>) -> FolderSearch {
    let mut search = FolderSearch::new();
    search.set_folder(folder.clone());
    search
}

// ─── Parsing ────────────────────────────────────────────────────────

#[test]
fn test_scan_simple_mbox_count() {
    let parser = MboxParser::new(fixture("simple.mbox")).unwrap();
    let mut count = 0u64;
    let reported = parser
        .scan_headers(
            &mut |_span, _headers| {
                count += 1;
                true
            },
            None,
        )
        .unwrap();
    assert_eq!(count, 5, "simple.mbox should contain exactly 5 messages");
    assert_eq!(reported, 5);
}

#[test]
fn test_scan_empty_mbox() {
    let parser = MboxParser::new(fixture("empty.mbox")).unwrap();
    let mut count = 0u64;
    let result = parser.scan_headers(
        &mut |_span, _headers| {
            count += 1;
            true
        },
        None,
    );
    assert!(result.is_ok());
    assert_eq!(count, 0);
}

#[test]
fn test_summary_fields() {
    let (_tmp, folder) = open("simple.mbox");
    assert_eq!(folder.len(), 5);
    assert_eq!(folder.summary(), uids(&["1", "2", "3", "4", "5"]));

    let first = folder.message_info("1").unwrap();
    assert_eq!(first.subject, "Quarterly invoice");
    assert_eq!(first.from, "Alice Able <alice@example.com>");
    assert_eq!(first.message_id, "<m1@example.com>");
    assert_eq!(first.mlist, "finance.example.com");
    assert!(first.flags.contains(MessageFlags::SEEN));

    let second = folder.message_info("2").unwrap();
    assert_eq!(second.in_reply_to.as_deref(), Some("<m1@example.com>"));
    assert_eq!(second.references, vec!["<m1@example.com>".to_string()]);

    let third = folder.message_info("3").unwrap();
    assert!(third.user_flag("social"));

    let fourth = folder.message_info("4").unwrap();
    assert!(fourth.flags.contains(MessageFlags::ATTACHMENTS));
}

#[test]
fn test_encoded_words_in_summary() {
    let (_tmp, folder) = open("simple.mbox");
    let fifth = folder.message_info("5").unwrap();
    assert!(
        fifth.from.contains("José García"),
        "Expected decoded From, got: '{}'",
        fifth.from
    );
    assert_eq!(fifth.subject, "Café con leña");
}

#[test]
fn test_escaped_from_line_stays_in_body() {
    let (_tmp, folder) = open("simple.mbox");
    let message = folder.get_message("3").unwrap();
    let mut text = String::new();
    for_each_text(&message.body, &mut |t| {
        text.push_str(t);
        true
    });
    assert!(
        text.contains("From the perspective"),
        "Body should keep the escaped From line, got: '{text}'"
    );
}

#[test]
fn test_date_parsing_formats() {
    assert!(parse_date("Thu, 04 Jan 2024 10:00:00 +0000").is_some());
    assert!(parse_date("04 Jan 2024 10:00:00 +0000").is_some());
    assert!(parse_date("Thu, 04 Jan 2024 10:00:00 EST").is_some());
    assert!(parse_date("2024-01-04T10:00:00Z").is_some());
}

#[test]
fn test_decode_encoded_words() {
    assert_eq!(
        decode_encoded_words("=?UTF-8?B?SG9sYSBtdW5kbw==?=", None),
        "Hola mundo"
    );
    assert_eq!(decode_encoded_words("=?ISO-8859-1?Q?caf=E9?=", None), "café");
    assert_eq!(decode_encoded_words("Normal subject", None), "Normal subject");
}

// ─── Summary index ──────────────────────────────────────────────────

#[test]
fn test_index_written_and_reloaded() {
    let (tmp, path) = scratch("simple.mbox");
    let cache = tmp.path().join("cache");

    let built = builder::build_index(&path, &cache, true, None).unwrap();
    assert_eq!(built.len(), 5);
    tmp.child(".simple.mbox.mailsexp.idx")
        .assert(predicate::path::exists());

    let loaded = builder::load_index(&path, &cache)
        .unwrap()
        .expect("index should reload");
    assert_eq!(loaded.len(), 5);
    assert_eq!(loaded[0].info, built[0].info);
    assert_eq!(loaded[4].offset, built[4].offset);
}

#[test]
fn test_index_invalidated_by_append() {
    let (tmp, path) = scratch("simple.mbox");
    let cache = tmp.path().join("cache");
    builder::build_index(&path, &cache, true, None).unwrap();

    std::thread::sleep(std::time::Duration::from_millis(100));
    use std::io::Write;
    let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    writeln!(f).unwrap();
    writeln!(f, "From extra@example.com Mon Jan 08 10:00:00 2024").unwrap();
    writeln!(f, "From: Extra <extra@example.com>").unwrap();
    writeln!(f, "Subject: Extra message").unwrap();
    writeln!(f, "Message-ID: <m6@example.com>").unwrap();
    writeln!(f).unwrap();
    writeln!(f, "Extra body.").unwrap();
    drop(f);

    assert!(builder::load_index(&path, &cache).unwrap().is_none());

    let folder = MboxFolder::open(&path, &options(&tmp), None).unwrap();
    assert_eq!(folder.len(), 6);
}

// ─── Searching ──────────────────────────────────────────────────────

#[test]
fn test_search_summary_predicates() {
    let (_tmp, folder) = open("simple.mbox");
    let mut search = search_in(&folder);
    let cancel = Cancellable::new();
    let mut run = |expr: &str| search.search(expr, None, &cancel).unwrap();

    assert_eq!(
        run(r#"(header-contains "subject" "invoice")"#),
        uids(&["1", "2", "4"])
    );
    assert_eq!(run(r#"(header-contains "subject" "café")"#), uids(&["5"]));
    assert_eq!(run(r#"(system-flag "seen")"#), uids(&["1"]));
    assert_eq!(run(r#"(match-all (system-flag "attachments"))"#), uids(&["4"]));
    assert_eq!(run(r#"(user-flag "social")"#), uids(&["3"]));
    assert_eq!(
        run(r#"(header-contains "x-camel-mlist" "finance")"#),
        uids(&["1"])
    );
    assert_eq!(
        run("(match-all (> (get-sent-date) 1704326400))"),
        uids(&["3", "4", "5"])
    );
}

#[test]
fn test_search_full_message_predicates() {
    let (_tmp, folder) = open("simple.mbox");
    let mut search = search_in(&folder);
    let cancel = Cancellable::new();
    let mut run = |expr: &str| search.search(expr, None, &cancel).unwrap();

    assert_eq!(run(r#"(header-exists "x-priority")"#), uids(&["4"]));
    assert_eq!(run(r#"(header-matches "x-priority" "1")"#), uids(&["4"]));
    assert_eq!(run(r#"(body-contains "alpha")"#), uids(&["1", "2"]));
    assert_eq!(run(r#"(body-contains "perspective")"#), uids(&["3"]));
    assert_eq!(run(r#"(body-regex "^Totals are")"#), uids(&["1"]));
    assert_eq!(
        run(r#"(match-threads "all" (header-contains "from" "bob"))"#),
        uids(&["1", "2", "4"])
    );
}

#[test]
fn test_message_location() {
    let (_tmp, folder) = open("simple.mbox");
    let mut search = search_in(&folder);
    let expr = format!(
        r#"(message-location "mbox://{}")"#,
        folder.path().display()
    );
    let found = search.search(&expr, None, &Cancellable::new()).unwrap();
    assert_eq!(found.len(), 5);
}

#[test]
fn test_body_index_over_mbox() {
    let (_tmp, folder) = open("simple.mbox");
    let cancel = Cancellable::new();
    let index = MemoryIndex::build(&*folder, &cancel);
    assert!(!index.is_empty());

    let mut search = search_in(&folder);
    search.set_body_index(Some(Rc::new(index)));
    assert_eq!(
        search
            .search(r#"(body-contains "alpha beta")"#, None, &cancel)
            .unwrap(),
        uids(&["1"])
    );
}

#[test]
fn test_delegated_search_over_mbox() {
    let (tmp, path) = scratch("simple.mbox");
    let db = SqliteStore::open(tmp.path().join("summary.db")).unwrap();
    let folder = Rc::new(
        MboxFolder::open(&path, &options(&tmp), None)
            .unwrap()
            .with_database(db),
    );
    let mut search = search_in(&folder);
    let cancel = Cancellable::new();

    let expr = r#"(match-all (system-flag "seen"))"#;
    assert_eq!(
        search.sql_for(expr).as_deref(),
        Some(r#"SELECT uid FROM "simple" WHERE (read = 1)"#)
    );
    assert_eq!(search.search(expr, None, &cancel).unwrap(), uids(&["1"]));
    assert_eq!(search.count("(match-all)", &cancel).unwrap(), 5);
    tmp.child("summary.db").assert(predicate::path::is_file());
}

#[test]
fn test_empty_mbox_folder() {
    let (_tmp, folder) = open("empty.mbox");
    assert!(folder.is_empty());
    let mut search = search_in(&folder);
    let cancel = Cancellable::new();
    assert!(search.search("(match-all)", None, &cancel).unwrap().is_empty());
    assert_eq!(search.count("", &cancel).unwrap(), 0);
}
