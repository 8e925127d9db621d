// src/dispatch/mod.rs
//! Delay-then-deliver. Requests wait in a time-ordered queue until their
//! `dispatch_at`, then a single release loop hands each one to the sink as an
//! independent task. A zero delay takes the same path.

pub mod queue;

pub use queue::PendingQueue;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::{JoinHandle, JoinSet};

use crate::clock::Clock;
use crate::event::NotificationRequest;
use crate::notify::DeliveryOutcome;

pub type DispatchReport = BTreeMap<String, DeliveryOutcome>;

/// Receives released requests. Implemented by the channel fan-out.
#[async_trait]
pub trait DispatchSink: Send + Sync {
    async fn dispatch(&self, request: Arc<NotificationRequest>) -> DispatchReport;
}

struct Shared {
    queue: Mutex<PendingQueue>,
    wake: Notify,
    clock: Arc<dyn Clock>,
}

/// Cheap to clone; every clone feeds the same queue.
#[derive(Clone)]
pub struct SchedulerHandle {
    shared: Arc<Shared>,
}

impl SchedulerHandle {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        crate::metrics::ensure_metrics_described();
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(PendingQueue::new()),
                wake: Notify::new(),
                clock,
            }),
        }
    }

    /// Non-blocking; wakes the release loop.
    pub fn enqueue(&self, request: NotificationRequest) {
        let source = request.source();
        let pending = {
            let mut q = self.shared.queue.lock().expect("dispatch queue mutex poisoned");
            q.push(Arc::new(request));
            q.len()
        };
        counter!("notifications_enqueued_total", "source" => source.as_str()).increment(1);
        gauge!("dispatch_pending").set(pending as f64);
        self.shared.wake.notify_one();
    }

    /// Remove everything due now. Items leave the queue before anyone sees them.
    pub fn take_due(&self) -> Vec<Arc<NotificationRequest>> {
        let now = self.shared.clock.now();
        let mut q = self.shared.queue.lock().expect("dispatch queue mutex poisoned");
        let due = q.pop_due(now);
        gauge!("dispatch_pending").set(q.len() as f64);
        due
    }

    pub fn drain_all(&self) -> Vec<Arc<NotificationRequest>> {
        let mut q = self.shared.queue.lock().expect("dispatch queue mutex poisoned");
        let all = q.drain_all();
        gauge!("dispatch_pending").set(0.0);
        all
    }

    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.shared
            .queue
            .lock()
            .expect("dispatch queue mutex poisoned")
            .next_due()
    }

    /// Time until the earliest item is due; zero if already due, `None` if empty.
    pub fn next_wait(&self) -> Option<Duration> {
        let due = self.next_due()?;
        let now = self.shared.clock.now();
        Some((due - now).to_std().unwrap_or(Duration::ZERO))
    }

    pub fn pending(&self) -> usize {
        self.shared
            .queue
            .lock()
            .expect("dispatch queue mutex poisoned")
            .len()
    }

    /// Make the release loop re-check the queue (e.g. after a manual clock moved).
    pub fn wake(&self) {
        self.shared.wake.notify_one();
    }

    async fn woken(&self) {
        self.shared.wake.notified().await;
    }
}

fn release(
    inflight: &mut JoinSet<()>,
    sink: &Arc<dyn DispatchSink>,
    request: Arc<NotificationRequest>,
) {
    counter!("notifications_released_total").increment(1);
    tracing::info!(
        source = %request.source(),
        title = request.title(),
        "releasing notification"
    );
    let sink = Arc::clone(sink);
    inflight.spawn(async move {
        let report = sink.dispatch(request).await;
        let failed = report.values().filter(|o| !o.is_delivered()).count();
        tracing::debug!(channels = report.len(), failed, "fan-out finished");
    });
}

fn reap(inflight: &mut JoinSet<()>) {
    while let Some(res) = inflight.try_join_next() {
        if let Err(e) = res {
            tracing::error!(error = %e, "delivery task failed");
        }
    }
}

/// Spawn the release loop. On shutdown, pending requests are released at once
/// and in-flight deliveries get `grace` to finish.
pub fn spawn_dispatcher(
    handle: SchedulerHandle,
    sink: Arc<dyn DispatchSink>,
    mut shutdown: watch::Receiver<bool>,
    grace: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut inflight = JoinSet::new();

        loop {
            for request in handle.take_due() {
                release(&mut inflight, &sink, request);
            }
            reap(&mut inflight);

            let wait = handle.next_wait();
            let sleep = async move {
                match wait {
                    Some(d) => tokio::time::sleep(d).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = handle.woken() => {}
                _ = sleep => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        let rest = handle.drain_all();
        if !rest.is_empty() {
            tracing::info!(count = rest.len(), "shutdown: releasing pending notifications early");
        }
        for request in rest {
            release(&mut inflight, &sink, request);
        }

        let drained = tokio::time::timeout(grace, async {
            while let Some(res) = inflight.join_next().await {
                if let Err(e) = res {
                    tracing::error!(error = %e, "delivery task failed");
                }
            }
        })
        .await;
        if drained.is_err() {
            tracing::warn!(
                remaining = inflight.len(),
                "shutdown grace elapsed, abandoning in-flight deliveries"
            );
            inflight.abort_all();
        }
        tracing::info!("dispatcher stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::event::Source;
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn request(at: DateTime<Utc>) -> NotificationRequest {
        NotificationRequest::new(
            Source::Generic,
            "t".into(),
            String::new(),
            BTreeMap::new(),
            at,
            at,
        )
    }

    #[test]
    fn nothing_due_before_dispatch_at() {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(t0));
        let handle = SchedulerHandle::new(clock.clone());
        handle.enqueue(request(t0 + ChronoDuration::seconds(30)));

        assert!(handle.take_due().is_empty());
        assert_eq!(handle.next_wait(), Some(Duration::from_secs(30)));

        clock.advance(ChronoDuration::seconds(30));
        assert_eq!(handle.next_wait(), Some(Duration::ZERO));
        assert_eq!(handle.take_due().len(), 1);
        assert_eq!(handle.pending(), 0);
        assert_eq!(handle.next_wait(), None);
    }
}
