use std::path::Path;
use std::rc::Rc;

use criterion::{criterion_group, criterion_main, Criterion};

use mailsexp::model::mail::MessageInfo;
use mailsexp::model::message::{MimeMessage, MimePart, RawHeader};
use mailsexp::search::{Cancellable, FolderSearch, MemoryIndex};
use mailsexp::store::{FolderOptions, MboxFolder, MemoryFolder};

const WORDS: [&str; 8] = [
    "alpha", "beta", "gamma", "delta", "invoice", "report", "lunch", "meeting",
];

fn generated_folder(count: usize) -> MemoryFolder {
    let mut folder = MemoryFolder::new("bench");
    for i in 0..count {
        let uid = i.to_string();
        let mut info = MessageInfo::new(&uid);
        info.subject = format!("{} {} #{i}", WORDS[i % 8], WORDS[(i / 8) % 8]);
        info.from = format!("user{}@example.com", i % 50);
        info.message_id = format!("<{i}@bench>");
        if i % 3 != 0 {
            info.in_reply_to = Some(format!("<{}@bench>", i - 1));
        }
        info.size = (i as u64 % 64) * 1024;
        let body = (0..40)
            .map(|j| WORDS[(i + j * 3) % 8])
            .collect::<Vec<_>>()
            .join(" ");
        let message = MimeMessage::new(
            vec![RawHeader::new("Subject", &info.subject)],
            MimePart::text("text/plain", Some("utf-8"), body),
        );
        folder.add(info, Some(message));
    }
    folder
}

fn bench_in_memory(c: &mut Criterion) {
    let folder = Rc::new(generated_folder(2_000));
    let cancel = Cancellable::new();

    let mut search = FolderSearch::new();
    search.set_folder(folder.clone());
    c.bench_function("header_contains_2000", |b| {
        b.iter(|| {
            search
                .search(r#"(header-contains "subject" "invoice")"#, None, &cancel)
                .unwrap()
        })
    });
    c.bench_function("body_scan_2000", |b| {
        b.iter(|| {
            search
                .search(r#"(body-contains "gamma delta")"#, None, &cancel)
                .unwrap()
        })
    });
    c.bench_function("match_threads_2000", |b| {
        b.iter(|| {
            search
                .search(r#"(match-threads "all" (header-contains "subject" "lunch"))"#, None, &cancel)
                .unwrap()
        })
    });

    search.set_body_index(Some(Rc::new(MemoryIndex::build(&*folder, &cancel))));
    c.bench_function("body_index_2000", |b| {
        b.iter(|| {
            search
                .search(r#"(body-contains "gamma delta")"#, None, &cancel)
                .unwrap()
        })
    });
}

fn bench_mbox(c: &mut Criterion) {
    let fixture_path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("simple.mbox");
    let tmp = tempfile::tempdir().unwrap();
    let mbox_path = tmp.path().join("simple.mbox");
    std::fs::copy(&fixture_path, &mbox_path).unwrap();
    let options = FolderOptions {
        cache_dir: tmp.path().to_path_buf(),
        force_rebuild: true,
        ..FolderOptions::default()
    };

    c.bench_function("open_simple_mbox", |b| {
        b.iter(|| MboxFolder::open(&mbox_path, &options, None).unwrap())
    });

    let folder = Rc::new(MboxFolder::open(&mbox_path, &options, None).unwrap());
    let mut search = FolderSearch::new();
    search.set_folder(folder);
    let cancel = Cancellable::new();
    c.bench_function("search_simple_mbox", |b| {
        b.iter(|| {
            search
                .search(r#"(or (body-contains "alpha") (system-flag "seen"))"#, None, &cancel)
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_in_memory, bench_mbox);
criterion_main!(benches);
