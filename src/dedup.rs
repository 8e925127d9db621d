//! dedup.rs: persisted set of seen feed entries, one JSON file keyed by feed.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs;
use tokio::sync::Mutex as AsyncMutex;

const STATE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeenEntry {
    pub entry_id: String,
    pub first_seen_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    version: u32,
    last_update: DateTime<Utc>,
    feeds: BTreeMap<String, Vec<SeenEntry>>,
}

/// Insertion-ordered records of one feed; the set mirrors the deque for lookups.
#[derive(Debug, Default)]
struct FeedRecords {
    order: VecDeque<SeenEntry>,
    ids: HashSet<String>,
}

impl FeedRecords {
    fn insert(&mut self, entry_id: &str, ts: DateTime<Utc>) -> bool {
        if self.ids.contains(entry_id) {
            return false;
        }
        self.ids.insert(entry_id.to_string());
        self.order.push_back(SeenEntry {
            entry_id: entry_id.to_string(),
            first_seen_at: ts,
        });
        true
    }

    /// Evict oldest records beyond `cap`. Ids in `keep` are never evicted, so
    /// the effective cap grows to cover a fetch larger than `cap`.
    fn trim(&mut self, cap: usize, keep: &HashSet<&str>) {
        if cap == 0 {
            return;
        }
        let mut excess = self.order.len().saturating_sub(cap.max(keep.len()));
        if excess == 0 {
            return;
        }
        let ids = &mut self.ids;
        self.order.retain(|e| {
            if excess > 0 && !keep.contains(e.entry_id.as_str()) {
                excess -= 1;
                ids.remove(&e.entry_id);
                false
            } else {
                true
            }
        });
    }
}

#[derive(Debug, Default)]
struct Inner {
    feeds: HashMap<String, FeedRecords>,
    dirty: bool,
}

#[derive(Debug)]
pub struct FeedDedupStore {
    inner: Mutex<Inner>,
    /// Held from snapshot to rename so flushes land on disk in snapshot order.
    write_lock: AsyncMutex<()>,
    path: Option<PathBuf>,
    max_entries_per_feed: usize,
}

impl FeedDedupStore {
    /// Load from `path`. Missing or empty file: nothing seen. Corrupt file: logged, treated as empty.
    /// Persisted records are kept as written; the cap applies again on the next insert.
    pub async fn load(path: impl AsRef<Path>, max_entries_per_feed: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut inner = Inner::default();

        match fs::read_to_string(&path).await {
            Ok(s) if s.trim().is_empty() => {}
            Ok(s) => match serde_json::from_str::<StateFile>(&s) {
                Ok(state) => {
                    for (feed, entries) in state.feeds {
                        let records = inner.feeds.entry(feed).or_default();
                        for e in entries {
                            records.insert(&e.entry_id, e.first_seen_at);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), "dedup state unreadable, starting empty: {e}");
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| format!("reading dedup state {}", path.display()));
            }
        }

        tracing::info!(
            path = %path.display(),
            feeds = inner.feeds.len(),
            "dedup store loaded"
        );
        Ok(Self {
            inner: Mutex::new(inner),
            write_lock: AsyncMutex::new(()),
            path: Some(path),
            max_entries_per_feed,
        })
    }

    /// No backing file; `flush` does nothing.
    pub fn in_memory(max_entries_per_feed: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            write_lock: AsyncMutex::new(()),
            path: None,
            max_entries_per_feed,
        }
    }

    pub fn has_seen(&self, feed_id: &str, entry_id: &str) -> bool {
        let inner = self.inner.lock().expect("dedup mutex poisoned");
        inner
            .feeds
            .get(feed_id)
            .is_some_and(|r| r.ids.contains(entry_id))
    }

    /// True when newly inserted. Recording a known pair is a no-op.
    pub fn record(&self, feed_id: &str, entry_id: &str, ts: DateTime<Utc>) -> bool {
        self.record_batch(feed_id, [entry_id], ts)[0]
    }

    /// Record one fetch worth of ids; the flags line up with `ids`. None of
    /// these ids is evicted by the cap, however many there are.
    pub fn record_batch<'a, I>(&self, feed_id: &str, ids: I, ts: DateTime<Utc>) -> Vec<bool>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let ids: Vec<&str> = ids.into_iter().collect();
        let mut inner = self.inner.lock().expect("dedup mutex poisoned");
        let records = inner.feeds.entry(feed_id.to_string()).or_default();
        let fresh: Vec<bool> = ids.iter().map(|id| records.insert(id, ts)).collect();
        records.trim(self.max_entries_per_feed, &ids.iter().copied().collect());
        inner.dirty |= fresh.iter().any(|new| *new);
        fresh
    }

    /// Record everything without reporting anything as new; marks the feed known even when `ids` is empty.
    pub fn prime<'a, I>(&self, feed_id: &str, ids: I, ts: DateTime<Utc>) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let ids: Vec<&str> = ids.into_iter().collect();
        let mut inner = self.inner.lock().expect("dedup mutex poisoned");
        let records = inner.feeds.entry(feed_id.to_string()).or_default();
        let added = ids.iter().filter(|id| records.insert(id, ts)).count();
        records.trim(self.max_entries_per_feed, &ids.iter().copied().collect());
        inner.dirty = true;
        added
    }

    pub fn is_known_feed(&self, feed_id: &str) -> bool {
        let inner = self.inner.lock().expect("dedup mutex poisoned");
        inner.feeds.contains_key(feed_id)
    }

    pub fn len(&self, feed_id: &str) -> usize {
        let inner = self.inner.lock().expect("dedup mutex poisoned");
        inner.feeds.get(feed_id).map_or(0, |r| r.order.len())
    }

    pub fn is_empty(&self) -> bool {
        let inner = self.inner.lock().expect("dedup mutex poisoned");
        inner.feeds.values().all(|r| r.order.is_empty())
    }

    /// Write to disk if anything changed since the last flush (temp file + rename).
    pub async fn flush(&self) -> Result<()> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };

        let _writer = self.write_lock.lock().await;
        let snapshot = {
            let mut inner = self.inner.lock().expect("dedup mutex poisoned");
            if !inner.dirty {
                return Ok(());
            }
            inner.dirty = false;
            StateFile {
                version: STATE_VERSION,
                last_update: Utc::now(),
                feeds: inner
                    .feeds
                    .iter()
                    .map(|(k, v)| (k.clone(), v.order.iter().cloned().collect()))
                    .collect(),
            }
        };

        if let Err(e) = write_atomic(path, &snapshot).await {
            self.inner.lock().expect("dedup mutex poisoned").dirty = true;
            return Err(e);
        }
        tracing::debug!(path = %path.display(), "dedup store flushed");
        Ok(())
    }
}

async fn write_atomic(path: &Path, state: &StateFile) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("creating {}", dir.display()))?;
    }
    let bytes = serde_json::to_vec_pretty(state).context("serializing dedup state")?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, &bytes)
        .await
        .with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .await
        .with_context(|| format!("renaming {} -> {}", tmp.display(), path.display()))?;
    Ok(())
}
