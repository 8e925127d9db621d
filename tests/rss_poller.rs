// tests/rss_poller.rs
//
// Poll cycles against fixture documents: first-poll priming, new-entry
// detection, failure backoff and overlap skipping.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

use webhook_notifier::clock::{Clock, ManualClock};
use webhook_notifier::config::FeedConfig;
use webhook_notifier::dedup::FeedDedupStore;
use webhook_notifier::dispatch::SchedulerHandle;
use webhook_notifier::ingest::types::{FeedFetcher, FetchError};
use webhook_notifier::ingest::{FeedPhase, PollOutcome, RssPoller};
use webhook_notifier::normalize::Normalizer;

const RSS_V1: &str = include_str!("fixtures/feed_rss.xml");
const RSS_V2: &str = include_str!("fixtures/feed_rss_updated.xml");
const ATOM: &str = include_str!("fixtures/feed_atom.xml");

const INTERVAL: Duration = Duration::from_secs(60);

/// Serves whatever document is currently configured per feed name.
#[derive(Default)]
struct FixtureFetcher {
    docs: Mutex<HashMap<String, Result<String, FetchError>>>,
    calls: Mutex<usize>,
}

impl FixtureFetcher {
    fn set(&self, feed: &str, doc: Result<&str, FetchError>) {
        self.docs
            .lock()
            .unwrap()
            .insert(feed.to_string(), doc.map(str::to_string));
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl FeedFetcher for FixtureFetcher {
    async fn fetch(&self, feed: &FeedConfig) -> Result<String, FetchError> {
        *self.calls.lock().unwrap() += 1;
        self.docs
            .lock()
            .unwrap()
            .get(&feed.name)
            .cloned()
            .unwrap_or(Err(FetchError::Status(404)))
    }
}

struct Harness {
    poller: Arc<RssPoller>,
    fetcher: Arc<FixtureFetcher>,
    scheduler: SchedulerHandle,
    clock: Arc<ManualClock>,
}

fn feed(name: &str) -> FeedConfig {
    FeedConfig {
        name: name.to_string(),
        url: format!("https://{name}.example/feed"),
        enabled: true,
    }
}

fn harness(feeds: Vec<FeedConfig>, store: Arc<FeedDedupStore>) -> Harness {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 10, 7, 12, 0, 0).unwrap(),
    ));
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    let fetcher = Arc::new(FixtureFetcher::default());
    let scheduler = SchedulerHandle::new(dyn_clock.clone());
    let normalizer = Arc::new(Normalizer::new(Duration::ZERO, dyn_clock.clone()));
    let poller = Arc::new(RssPoller::new(
        feeds,
        fetcher.clone(),
        store,
        normalizer,
        scheduler.clone(),
        dyn_clock,
        INTERVAL,
        Duration::from_secs(240),
    ));
    Harness {
        poller,
        fetcher,
        scheduler,
        clock,
    }
}

#[tokio::test]
async fn first_poll_primes_then_only_new_entries_notify() {
    let h = harness(vec![feed("blog")], Arc::new(FeedDedupStore::in_memory(100)));

    h.fetcher.set("blog", Ok(RSS_V1));
    let report = h.poller.poll_once().await;
    assert_eq!(report.feeds["blog"], PollOutcome::Primed { entries: 3 });
    assert_eq!(h.scheduler.pending(), 0, "priming must not notify");

    h.fetcher.set("blog", Ok(RSS_V2));
    let report = h.poller.poll_once().await;
    assert_eq!(report.feeds["blog"], PollOutcome::Notified(1));
    assert_eq!(report.notified(), 1);

    let due = h.scheduler.take_due();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].title(), "[Engineering Blog] Tracing every webhook");
    assert_eq!(due[0].metadata("feed"), Some("Engineering Blog"));

    // Same document twice more: nothing new.
    for _ in 0..2 {
        let report = h.poller.poll_once().await;
        assert_eq!(report.feeds["blog"], PollOutcome::Unchanged);
    }
    assert_eq!(h.scheduler.pending(), 0);
}

#[tokio::test]
async fn known_feed_repeating_entries_notifies_once_each() {
    let h = harness(vec![feed("blog")], Arc::new(FeedDedupStore::in_memory(100)));
    let empty = r#"<rss version="2.0"><channel><title>Engineering Blog</title></channel></rss>"#;

    h.fetcher.set("blog", Ok(empty));
    let report = h.poller.poll_once().await;
    assert_eq!(report.feeds["blog"], PollOutcome::Primed { entries: 0 });

    let two = r#"<rss version="2.0"><channel><title>Engineering Blog</title>
        <item><title>A</title><link>https://blog.example.com/a</link></item>
        <item><title>B</title><link>https://blog.example.com/b</link></item>
        </channel></rss>"#;
    h.fetcher.set("blog", Ok(two));
    let mut total = 0;
    for _ in 0..2 {
        total += h.poller.poll_once().await.notified();
    }
    assert_eq!(total, 2, "two entries over two polls notify twice, not four times");
    assert_eq!(h.scheduler.take_due().len(), 2);
}

#[tokio::test]
async fn feed_larger_than_cap_is_not_renotified() {
    let h = harness(vec![feed("blog")], Arc::new(FeedDedupStore::in_memory(2)));
    h.fetcher.set("blog", Ok(RSS_V1));

    let report = h.poller.poll_once().await;
    assert_eq!(report.feeds["blog"], PollOutcome::Primed { entries: 3 });
    for _ in 0..3 {
        let report = h.poller.poll_once().await;
        assert_eq!(report.feeds["blog"], PollOutcome::Unchanged);
    }
    assert_eq!(h.scheduler.pending(), 0);

    h.fetcher.set("blog", Ok(RSS_V2));
    let report = h.poller.poll_once().await;
    assert_eq!(report.feeds["blog"], PollOutcome::Notified(1));
    let report = h.poller.poll_once().await;
    assert_eq!(report.feeds["blog"], PollOutcome::Unchanged);
}

#[tokio::test]
async fn atom_feeds_are_tracked_like_rss() {
    let h = harness(vec![feed("releases")], Arc::new(FeedDedupStore::in_memory(100)));
    h.fetcher.set("releases", Ok(ATOM));

    let report = h.poller.poll_once().await;
    assert_eq!(report.feeds["releases"], PollOutcome::Primed { entries: 2 });
    let report = h.poller.poll_once().await;
    assert_eq!(report.feeds["releases"], PollOutcome::Unchanged);
}

#[tokio::test]
async fn restart_with_persisted_state_does_not_renotify() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("seen.json");

    {
        let store = Arc::new(FeedDedupStore::load(&path, 100).await.expect("load"));
        let h = harness(vec![feed("blog")], store);
        h.fetcher.set("blog", Ok(RSS_V1));
        let report = h.poller.poll_once().await;
        assert!(matches!(report.feeds["blog"], PollOutcome::Primed { .. }));
    }

    let store = Arc::new(FeedDedupStore::load(&path, 100).await.expect("reload"));
    let h = harness(vec![feed("blog")], store);
    h.fetcher.set("blog", Ok(RSS_V1));
    let report = h.poller.poll_once().await;
    assert_eq!(report.feeds["blog"], PollOutcome::Unchanged);

    h.fetcher.set("blog", Ok(RSS_V2));
    let report = h.poller.poll_once().await;
    assert_eq!(report.feeds["blog"], PollOutcome::Notified(1));
}

#[tokio::test]
async fn failing_feed_backs_off_without_affecting_others() {
    let h = harness(
        vec![feed("blog"), feed("broken")],
        Arc::new(FeedDedupStore::in_memory(100)),
    );
    h.fetcher.set("blog", Ok(RSS_V1));
    h.fetcher.set("broken", Err(FetchError::Status(503)));

    let report = h.poller.poll_once().await;
    assert!(matches!(report.feeds["blog"], PollOutcome::Primed { .. }));
    assert!(matches!(report.feeds["broken"], PollOutcome::Failed(ref e) if e.contains("503")));
    assert_eq!(report.failed(), 1);
    assert!(matches!(h.poller.phase("broken"), FeedPhase::Backoff { .. }));

    // Inside the backoff window the broken feed is not fetched at all.
    let before = h.fetcher.calls();
    let report = h.poller.poll_once().await;
    assert!(matches!(report.feeds["broken"], PollOutcome::BackingOff { .. }));
    assert_eq!(h.fetcher.calls(), before + 1, "only the healthy feed is fetched");

    // Past the window it is retried; recovery clears the backoff.
    h.clock.advance(ChronoDuration::seconds(61));
    h.fetcher.set("broken", Ok(ATOM));
    let report = h.poller.poll_once().await;
    assert!(matches!(report.feeds["broken"], PollOutcome::Primed { .. }));
    assert_eq!(h.poller.phase("broken"), FeedPhase::Idle);
}

#[tokio::test]
async fn malformed_document_counts_as_failure() {
    let h = harness(vec![feed("blog")], Arc::new(FeedDedupStore::in_memory(100)));
    h.fetcher.set("blog", Ok("<html><body>maintenance</body></html>"));

    let report = h.poller.poll_once().await;
    assert!(matches!(report.feeds["blog"], PollOutcome::Failed(_)));
}

#[test]
fn backoff_doubles_up_to_the_cap() {
    let h = harness(vec![], Arc::new(FeedDedupStore::in_memory(0)));
    assert_eq!(h.poller.backoff_delay(1), Duration::from_secs(60));
    assert_eq!(h.poller.backoff_delay(2), Duration::from_secs(120));
    assert_eq!(h.poller.backoff_delay(3), Duration::from_secs(240));
    assert_eq!(h.poller.backoff_delay(10), Duration::from_secs(240));
}

/// Blocks until the test hands out a permit.
struct GatedFetcher {
    gate: Semaphore,
}

#[async_trait]
impl FeedFetcher for GatedFetcher {
    async fn fetch(&self, _feed: &FeedConfig) -> Result<String, FetchError> {
        let _permit = self.gate.acquire().await.map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(RSS_V1.to_string())
    }
}

#[tokio::test]
async fn overlapping_cycle_skips_feed_still_in_flight() {
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 10, 7, 12, 0, 0).unwrap(),
    ));
    let fetcher = Arc::new(GatedFetcher {
        gate: Semaphore::new(0),
    });
    let poller = Arc::new(RssPoller::new(
        vec![feed("slow")],
        fetcher.clone(),
        Arc::new(FeedDedupStore::in_memory(100)),
        Arc::new(Normalizer::new(Duration::ZERO, clock.clone())),
        SchedulerHandle::new(clock.clone()),
        clock,
        INTERVAL,
        INTERVAL,
    ));

    let first = tokio::spawn({
        let poller = poller.clone();
        async move { poller.poll_once().await }
    });
    while poller.phase("slow") != FeedPhase::Fetching {
        tokio::task::yield_now().await;
    }

    let second = poller.poll_once().await;
    assert_eq!(second.feeds["slow"], PollOutcome::Skipped);

    fetcher.gate.add_permits(1);
    let first = first.await.expect("first cycle");
    assert!(matches!(first.feeds["slow"], PollOutcome::Primed { .. }));
}
