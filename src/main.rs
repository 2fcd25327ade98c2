//! wake-feed entry point.
//!
//! Connects to the build server, runs the dispatcher and the build tail
//! service, and optionally serves diagnostics over HTTP.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use wake_feed::api;
use wake_feed::app_state::AppState;
use wake_feed::config::FeedConfig;
use wake_feed::domain::EventBus;
use wake_feed::service::{BuildTailService, TracingSink};
use wake_feed::ws::connection::{FeedCommands, run_feed};
use wake_feed::ws::dispatcher::Dispatcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration first: it decides the log format
    let config = FeedConfig::from_env()?;
    init_tracing(config.json_logs);
    tracing::info!(
        endpoint = %config.endpoint(),
        mode = %config.deploy_mode,
        topics = ?config.feed_topics,
        "starting wake-feed"
    );

    // Build the pipeline
    let event_bus = EventBus::new();
    let (dispatcher, dispatcher_task) =
        Dispatcher::spawn(event_bus.clone(), config.dispatch_queue_capacity);
    let tail = BuildTailService::start(&event_bus, Arc::new(TracingSink), &config.watch_builds);

    // Diagnostics server
    if let Some(addr) = config.diagnostics_addr {
        let app = api::diagnostics_app(AppState {
            event_bus: event_bus.clone(),
            dispatcher: dispatcher.clone(),
        });
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(addr = %addr, "diagnostics listening");
        tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app).await {
                tracing::error!(error = %err, "diagnostics server failed");
            }
        });
    }

    // Run the feed until interrupted
    let (_commands, command_rx) = FeedCommands::channel(16);
    tokio::select! {
        result = run_feed(config, dispatcher, command_rx) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("shutdown requested"),
    }

    tail.stop();
    dispatcher_task.abort();
    tracing::info!("wake-feed stopped");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
