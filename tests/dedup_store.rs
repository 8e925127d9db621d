// tests/dedup_store.rs
//
// Persistence of the per-feed seen-entry store across restarts.

use chrono::{TimeZone, Utc};
use std::sync::Arc;
use webhook_notifier::dedup::FeedDedupStore;

fn ts() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 6, 12, 0, 0).unwrap()
}

#[tokio::test]
async fn missing_file_loads_empty() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("state").join("seen.json");

    let store = FeedDedupStore::load(&path, 100).await.expect("load");
    assert!(store.is_empty());
    assert!(!store.is_known_feed("blog"));
}

#[tokio::test]
async fn flushed_records_survive_reload() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("state").join("seen.json");

    let store = FeedDedupStore::load(&path, 100).await.expect("load");
    assert!(store.record("blog", "post-1", ts()));
    assert!(!store.record("blog", "post-1", ts()), "second record is a duplicate");
    store.prime("releases", ["v1", "v2"], ts());
    store.flush().await.expect("flush");
    assert!(path.exists(), "flush creates parent dirs and the file");

    let reloaded = FeedDedupStore::load(&path, 100).await.expect("reload");
    assert!(reloaded.has_seen("blog", "post-1"));
    assert!(reloaded.has_seen("releases", "v2"));
    assert!(reloaded.is_known_feed("releases"));
    assert_eq!(reloaded.len("releases"), 2);
    assert!(!reloaded.record("blog", "post-1", ts()));
}

#[tokio::test]
async fn corrupt_file_is_treated_as_empty() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("seen.json");
    std::fs::write(&path, b"{ this is not json").expect("write");

    let store = FeedDedupStore::load(&path, 100).await.expect("corrupt state must not fail startup");
    assert!(store.is_empty());

    // The next flush replaces the corrupt file with a valid one.
    store.record("blog", "post-9", ts());
    store.flush().await.expect("flush");
    let reloaded = FeedDedupStore::load(&path, 100).await.expect("reload");
    assert!(reloaded.has_seen("blog", "post-9"));
}

#[tokio::test]
async fn cap_keeps_most_recent_entries_across_reload() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("seen.json");

    let store = FeedDedupStore::load(&path, 3).await.expect("load");
    for id in ["a", "b", "c", "d", "e"] {
        store.record("blog", id, ts());
    }
    assert_eq!(store.len("blog"), 3);
    store.flush().await.expect("flush");

    let reloaded = FeedDedupStore::load(&path, 3).await.expect("reload");
    assert!(!reloaded.has_seen("blog", "a"));
    assert!(!reloaded.has_seen("blog", "b"));
    for id in ["c", "d", "e"] {
        assert!(reloaded.has_seen("blog", id), "{id} should be retained");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_flushes_keep_every_record_on_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("seen.json");
    let store = Arc::new(FeedDedupStore::load(&path, 0).await.expect("load"));

    let mut tasks = Vec::new();
    for feed in 0..8 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            for n in 0..20 {
                store.record(&format!("feed-{feed}"), &format!("post-{n}"), ts());
                store.flush().await.expect("flush");
            }
        }));
    }
    for t in tasks {
        t.await.expect("writer task");
    }
    // Nothing is dirty by now; every record must already be on disk.
    store.flush().await.expect("final flush");

    let reloaded = FeedDedupStore::load(&path, 0).await.expect("reload");
    for feed in 0..8 {
        assert_eq!(reloaded.len(&format!("feed-{feed}")), 20, "feed-{feed} lost records");
    }
}

#[tokio::test]
async fn reload_keeps_records_beyond_a_smaller_cap() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("seen.json");

    let store = FeedDedupStore::load(&path, 2).await.expect("load");
    store.prime("blog", ["a", "b", "c"], ts());
    store.flush().await.expect("flush");

    let reloaded = FeedDedupStore::load(&path, 2).await.expect("reload");
    for id in ["a", "b", "c"] {
        assert!(reloaded.has_seen("blog", id), "{id} should survive the reload");
    }
}
