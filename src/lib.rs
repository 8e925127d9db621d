// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod clock;
pub mod config;
pub mod dedup;
pub mod dispatch;
pub mod event;
pub mod ingest;
pub mod metrics;
pub mod normalize;
pub mod notify;
pub mod verify;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::config::{load_config_default, AppConfig};
pub use crate::dedup::FeedDedupStore;
pub use crate::dispatch::{spawn_dispatcher, DispatchSink, SchedulerHandle};
pub use crate::event::{NotificationRequest, Source};
pub use crate::ingest::{PollOutcome, PollReport, RssPoller};
pub use crate::normalize::{Normalizer, VerifiedPayload};
pub use crate::notify::{Channel, DeliveryFailure, DeliveryOutcome, FanOut};
