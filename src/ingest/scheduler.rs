// src/ingest/scheduler.rs
use metrics::gauge;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::ingest::RssPoller;

/// Run `poll_once` on the poller's interval until `shutdown` flips to true.
/// A cycle runs to completion before the next tick is considered.
pub fn spawn_rss_poller(poller: Arc<RssPoller>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poller.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let report = poller.poll_once().await;
                    gauge!("rss_poll_last_run_ts").set(chrono::Utc::now().timestamp() as f64);
                    tracing::info!(
                        feeds = report.feeds.len(),
                        notified = report.notified(),
                        failed = report.failed(),
                        "rss poll cycle"
                    );
                }
            }
        }
        tracing::info!("rss poller stopped");
    })
}
