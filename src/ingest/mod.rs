// src/ingest/mod.rs
//! RSS polling. Each configured feed runs a small state machine
//! (`Idle → Fetching → Diffing → Idle | Backoff`); a cycle polls every
//! eligible feed concurrently and reports what happened to each.

pub mod feed;
pub mod fetch;
pub mod scheduler;
pub mod types;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::{counter, histogram};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

use crate::clock::Clock;
use crate::config::FeedConfig;
use crate::dedup::FeedDedupStore;
use crate::dispatch::SchedulerHandle;
use crate::ingest::feed::parse_feed;
use crate::ingest::types::{FeedFetcher, FetchError};
use crate::normalize::{Normalizer, VerifiedPayload};

/// Decode entities, strip tags, collapse whitespace, trim.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let decoded = html_escape::decode_html_entities(s);

    // 2) Strip HTML tags
    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    let stripped = re_tags.replace_all(&decoded, " ");

    // 3) Collapse whitespace
    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    re_ws.replace_all(&stripped, " ").trim().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedPhase {
    Idle,
    Fetching,
    Diffing,
    Backoff { until: DateTime<Utc> },
}

#[derive(Debug, Clone, Copy)]
struct FeedState {
    phase: FeedPhase,
    failures: u32,
}

impl Default for FeedState {
    fn default() -> Self {
        Self {
            phase: FeedPhase::Idle,
            failures: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// First poll of an unknown feed: entries recorded, nothing notified.
    Primed { entries: usize },
    Notified(usize),
    Unchanged,
    Failed(String),
    BackingOff { until: DateTime<Utc> },
    /// Still fetching or diffing from an earlier cycle.
    Skipped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    pub feeds: BTreeMap<String, PollOutcome>,
}

impl PollReport {
    pub fn notified(&self) -> usize {
        self.feeds
            .values()
            .map(|o| match o {
                PollOutcome::Notified(n) => *n,
                _ => 0,
            })
            .sum()
    }

    pub fn failed(&self) -> usize {
        self.feeds
            .values()
            .filter(|o| matches!(o, PollOutcome::Failed(_)))
            .count()
    }
}

pub struct RssPoller {
    feeds: Vec<FeedConfig>,
    fetcher: Arc<dyn FeedFetcher>,
    store: Arc<FeedDedupStore>,
    normalizer: Arc<Normalizer>,
    scheduler: SchedulerHandle,
    clock: Arc<dyn Clock>,
    interval: Duration,
    backoff_max: Duration,
    states: Mutex<HashMap<String, FeedState>>,
}

impl RssPoller {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        feeds: Vec<FeedConfig>,
        fetcher: Arc<dyn FeedFetcher>,
        store: Arc<FeedDedupStore>,
        normalizer: Arc<Normalizer>,
        scheduler: SchedulerHandle,
        clock: Arc<dyn Clock>,
        interval: Duration,
        backoff_max: Duration,
    ) -> Self {
        crate::metrics::ensure_metrics_described();
        Self {
            feeds,
            fetcher,
            store,
            normalizer,
            scheduler,
            clock,
            interval,
            backoff_max: backoff_max.max(interval),
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn phase(&self, feed: &str) -> FeedPhase {
        self.states
            .lock()
            .expect("poller state mutex poisoned")
            .get(feed)
            .map_or(FeedPhase::Idle, |s| s.phase)
    }

    /// `min(interval × 2^(failures-1), backoff_max)`.
    pub fn backoff_delay(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(20);
        self.interval
            .checked_mul(1u32 << exp)
            .unwrap_or(self.backoff_max)
            .min(self.backoff_max)
    }

    /// Claim the feed for this cycle, or report why it sits this one out.
    fn begin(&self, name: &str, now: DateTime<Utc>) -> Result<(), PollOutcome> {
        let mut states = self.states.lock().expect("poller state mutex poisoned");
        let st = states.entry(name.to_string()).or_default();
        match st.phase {
            FeedPhase::Fetching | FeedPhase::Diffing => return Err(PollOutcome::Skipped),
            FeedPhase::Backoff { until } if now < until => {
                return Err(PollOutcome::BackingOff { until });
            }
            _ => {}
        }
        st.phase = FeedPhase::Fetching;
        Ok(())
    }

    fn set_phase(&self, name: &str, phase: FeedPhase) {
        let mut states = self.states.lock().expect("poller state mutex poisoned");
        states.entry(name.to_string()).or_default().phase = phase;
    }

    fn record_failure(&self, name: &str, now: DateTime<Utc>) -> DateTime<Utc> {
        let mut states = self.states.lock().expect("poller state mutex poisoned");
        let st = states.entry(name.to_string()).or_default();
        st.failures = st.failures.saturating_add(1);
        let delay = self.backoff_delay(st.failures);
        let until = now + ChronoDuration::from_std(delay).unwrap_or(ChronoDuration::zero());
        st.phase = FeedPhase::Backoff { until };
        until
    }

    fn record_success(&self, name: &str) {
        let mut states = self.states.lock().expect("poller state mutex poisoned");
        let st = states.entry(name.to_string()).or_default();
        st.failures = 0;
        st.phase = FeedPhase::Idle;
    }

    /// One cycle over every enabled feed.
    pub async fn poll_once(self: &Arc<Self>) -> PollReport {
        let now = self.clock.now();
        let mut report = PollReport::default();
        let mut set = JoinSet::new();
        let mut names = HashMap::new();

        for feed in self.feeds.iter().filter(|f| f.enabled) {
            if let Err(outcome) = self.begin(&feed.name, now) {
                report.feeds.insert(feed.name.clone(), outcome);
                continue;
            }
            let poller = Arc::clone(self);
            let feed = feed.clone();
            let name = feed.name.clone();
            let handle = set.spawn(async move {
                let outcome = poller.poll_feed(&feed).await;
                (feed.name, outcome)
            });
            names.insert(handle.id(), name);
        }

        while let Some(joined) = set.join_next_with_id().await {
            match joined {
                Ok((_, (name, outcome))) => {
                    report.feeds.insert(name, outcome);
                }
                Err(e) => {
                    let name = names.get(&e.id()).cloned().unwrap_or_default();
                    tracing::error!(feed = %name, error = %e, "feed poll task failed");
                    self.set_phase(&name, FeedPhase::Idle);
                    report
                        .feeds
                        .insert(name, PollOutcome::Failed(format!("poll task failed: {e}")));
                }
            }
        }
        report
    }

    async fn poll_feed(&self, feed: &FeedConfig) -> PollOutcome {
        let t0 = Instant::now();
        let parsed = match self.fetcher.fetch(feed).await {
            Ok(body) => parse_feed(&body, &feed.url),
            Err(e) => Err(e),
        };
        histogram!("rss_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        let parsed = match parsed {
            Ok(p) => p,
            Err(e) => return self.fail(feed, e),
        };

        self.set_phase(&feed.name, FeedPhase::Diffing);
        let now = self.clock.now();
        let mut articles = parsed.articles;
        for a in &mut articles {
            if a.feed_title.is_empty() {
                a.feed_title = feed.name.clone();
            }
        }

        let outcome = if !self.store.is_known_feed(&feed.name) {
            let ids: Vec<String> = articles.iter().map(|a| a.entry_id()).collect();
            let entries = self
                .store
                .prime(&feed.name, ids.iter().map(String::as_str), now);
            tracing::info!(feed = %feed.name, entries, "first poll, recorded without notifying");
            self.flush_store(&feed.name).await;
            PollOutcome::Primed { entries }
        } else {
            let ids: Vec<String> = articles.iter().map(|a| a.entry_id()).collect();
            let fresh = self
                .store
                .record_batch(&feed.name, ids.iter().map(String::as_str), now);
            let mut notified = 0usize;
            for (article, new) in articles.into_iter().zip(fresh) {
                if new {
                    let request = self.normalizer.normalize(VerifiedPayload::RssEntry(article));
                    self.scheduler.enqueue(request);
                    notified += 1;
                }
            }
            if notified > 0 {
                counter!("rss_new_entries_total", "feed" => feed.name.clone())
                    .increment(notified as u64);
                tracing::info!(feed = %feed.name, new = notified, "new feed entries");
                self.flush_store(&feed.name).await;
                PollOutcome::Notified(notified)
            } else {
                tracing::debug!(feed = %feed.name, "no new entries");
                PollOutcome::Unchanged
            }
        };

        self.record_success(&feed.name);
        outcome
    }

    fn fail(&self, feed: &FeedConfig, e: FetchError) -> PollOutcome {
        let now = self.clock.now();
        let until = self.record_failure(&feed.name, now);
        counter!("rss_fetch_errors_total", "feed" => feed.name.clone()).increment(1);
        tracing::warn!(
            feed = %feed.name,
            error = %e,
            backoff_until = %until,
            "feed poll failed"
        );
        PollOutcome::Failed(e.to_string())
    }

    async fn flush_store(&self, feed: &str) {
        if let Err(e) = self.store.flush().await {
            tracing::warn!(feed, "dedup flush failed: {e:#}");
        }
    }
}
