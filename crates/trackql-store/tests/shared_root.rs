//! Several handles (standing in for processes) sharing one store root.

use std::collections::BTreeSet;
use std::sync::{Arc, Barrier};
use std::thread;
use tokio_util::sync::CancellationToken;
use trackql_kernel::{Literal, RecordHandle, RecordPatch, StoreSettings};
use trackql_store::{FsStore, RecordStore, StoreError};

fn settings(root: &std::path::Path) -> StoreSettings {
    let mut settings = StoreSettings::with_root(root);
    settings.default_prefix = "DEV".to_string();
    settings.lock_retries = 64;
    settings.lock_backoff_ms = 1;
    settings
}

#[test]
fn concurrent_inserts_get_distinct_keys_and_ids() {
    let dir = tempfile::tempdir().expect("tempdir should create");
    let settings = settings(dir.path());
    let barrier = Arc::new(Barrier::new(4));

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let settings = settings.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let store = FsStore::open(&settings).expect("store should open");
                barrier.wait();
                (0..5)
                    .map(|n| {
                        store
                            .insert(
                                RecordHandle::unkeyed()
                                    .with_field("summary", format!("w{worker}-{n}")),
                                &CancellationToken::new(),
                            )
                            .expect("insert should succeed")
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut keys = BTreeSet::new();
    for handle in handles {
        for key in handle.join().expect("worker should finish") {
            assert!(keys.insert(key), "duplicate key assigned");
        }
    }
    assert_eq!(keys.len(), 20);

    let store = FsStore::open(&settings).expect("store should open");
    let snapshot = store.snapshot(&CancellationToken::new()).expect("snapshot");
    let ids: BTreeSet<u64> = snapshot.records().map(|r| r.id).collect();
    assert_eq!(ids.len(), 20);
}

#[test]
fn readers_never_observe_partial_records() {
    let dir = tempfile::tempdir().expect("tempdir should create");
    let settings = settings(dir.path());
    let writer = FsStore::open(&settings).expect("store should open");
    writer
        .insert(
            RecordHandle::new("DEV-1").with_field("counter", 0_i64),
            &CancellationToken::new(),
        )
        .expect("insert should succeed");

    let reader_settings = settings.clone();
    let reader = thread::spawn(move || {
        let store = FsStore::open(&reader_settings).expect("store should open");
        for _ in 0..200 {
            match store.get("DEV-1") {
                Ok(Some(record)) => {
                    assert!(matches!(record.field("counter"), Some(Literal::Integer(_))));
                }
                Ok(None) => panic!("record vanished during updates"),
                Err(StoreError::Corrupt(message)) => panic!("observed torn blob: {message}"),
                Err(err) => panic!("unexpected read error: {err}"),
            }
        }
    });

    for n in 1..=100_i64 {
        writer
            .update(
                "DEV-1",
                &RecordPatch::new().set("counter", n),
                &CancellationToken::new(),
            )
            .expect("update should succeed");
    }
    reader.join().expect("reader should finish");

    let record = writer.get("DEV-1").expect("get").expect("present");
    assert_eq!(record.field("counter"), Some(&Literal::Integer(100)));
}

#[test]
fn concurrent_updates_to_one_record_all_apply() {
    let dir = tempfile::tempdir().expect("tempdir should create");
    let settings = settings(dir.path());
    FsStore::open(&settings)
        .expect("store should open")
        .insert(RecordHandle::new("DEV-1"), &CancellationToken::new())
        .expect("insert should succeed");

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let settings = settings.clone();
            thread::spawn(move || {
                let store = FsStore::open(&settings).expect("store should open");
                for n in 0..5 {
                    store
                        .update(
                            "DEV-1",
                            &RecordPatch::new().set(format!("w{worker}_{n}"), 1_i64),
                            &CancellationToken::new(),
                        )
                        .expect("update should succeed");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("worker should finish");
    }

    let store = FsStore::open(&settings).expect("store should open");
    let record = store.get("DEV-1").expect("get").expect("present");
    assert_eq!(record.fields.len(), 20);
}
