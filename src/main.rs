//! webhook-notifier: binary entrypoint.
//! Loads config, wires verifier → normalizer → scheduler → fan-out, starts the
//! RSS poller and serves the webhook endpoints until Ctrl-C / SIGTERM.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use webhook_notifier::api::{self, AppState};
use webhook_notifier::clock::{Clock, SystemClock};
use webhook_notifier::config::load_config_default;
use webhook_notifier::dedup::FeedDedupStore;
use webhook_notifier::dispatch::{spawn_dispatcher, DispatchSink, SchedulerHandle};
use webhook_notifier::ingest::fetch::HttpFeedFetcher;
use webhook_notifier::ingest::scheduler::spawn_rss_poller;
use webhook_notifier::ingest::RssPoller;
use webhook_notifier::metrics::Metrics;
use webhook_notifier::normalize::Normalizer;
use webhook_notifier::notify::http::build_client;
use webhook_notifier::notify::FanOut;
use webhook_notifier::verify::UnsignedPolicy;

/// `RUST_LOG` filters; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("webhook_notifier=info,tower_http=info,warn"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("ctrl-c handler failed: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                warn!("SIGTERM handler failed: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present; no-op otherwise.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = load_config_default().context("loading configuration")?;
    let metrics = if cfg.server.metrics {
        Some(Metrics::install()?)
    } else {
        None
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let client = build_client(&cfg.global)?;
    let store = Arc::new(
        FeedDedupStore::load(&cfg.rss.state_path, cfg.rss.max_entries_per_feed).await?,
    );
    let normalizer = Arc::new(Normalizer::new(
        cfg.global.notification_delay(),
        clock.clone(),
    ));
    let scheduler = SchedulerHandle::new(clock.clone());
    let fanout: Arc<dyn DispatchSink> = Arc::new(FanOut::from_config(&cfg, client.clone())?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let dispatcher = spawn_dispatcher(
        scheduler.clone(),
        fanout,
        shutdown_rx.clone(),
        cfg.global.shutdown_grace(),
    );

    let poller = if cfg.rss.enabled && cfg.rss.feeds.iter().any(|f| f.enabled) {
        let poller = Arc::new(RssPoller::new(
            cfg.rss.feeds.clone(),
            Arc::new(HttpFeedFetcher::new(client.clone())),
            store.clone(),
            normalizer.clone(),
            scheduler.clone(),
            clock.clone(),
            cfg.rss.check_interval(),
            cfg.rss.backoff_max(),
        ));
        info!(
            feeds = cfg.rss.feeds.len(),
            interval_min = cfg.rss.check_interval_minutes,
            "rss poller enabled"
        );
        Some(spawn_rss_poller(poller, shutdown_rx.clone()))
    } else {
        None
    };

    let unsigned = if cfg.global.require_signatures {
        UnsignedPolicy::Reject
    } else {
        UnsignedPolicy::Accept
    };
    let state = AppState {
        secrets: Arc::new(cfg.secrets.clone()),
        unsigned,
        normalizer,
        scheduler,
        store: store.clone(),
        clock,
    };
    let mut app = api::router(state);
    if let Some(m) = &metrics {
        app = app.merge(m.router());
    }

    let listener = tokio::net::TcpListener::bind(&cfg.server.bind)
        .await
        .with_context(|| format!("binding {}", cfg.server.bind))?;
    info!(
        bind = %cfg.server.bind,
        delay_secs = cfg.global.notification_delay_seconds,
        "webhook-notifier listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    let _ = shutdown_tx.send(true);
    if let Some(task) = poller {
        if let Err(e) = task.await {
            warn!("rss poller task ended abnormally: {e}");
        }
    }
    if let Err(e) = dispatcher.await {
        warn!("dispatcher task ended abnormally: {e}");
    }
    if let Err(e) = store.flush().await {
        warn!("final dedup flush failed: {e:#}");
    }
    info!("shutdown complete");
    Ok(())
}
