//! Diagnostics HTTP endpoints served over a real socket.

#![allow(clippy::panic)]

use std::time::Duration;

use serde_json::Value;
use tokio::net::TcpListener;

use wake_feed::api::diagnostics_app;
use wake_feed::app_state::AppState;
use wake_feed::domain::{EventBus, Topic};
use wake_feed::ws::dispatcher::{Dispatcher, DispatcherHandle};

async fn serve(state: AppState) -> String {
    let Ok(listener) = TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind failed");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("no local addr");
    };
    tokio::spawn(async move {
        let _ = axum::serve(listener, diagnostics_app(state)).await;
    });
    format!("http://{addr}")
}

async fn get(url: &str) -> (u16, Value) {
    let Ok(response) = reqwest::get(url).await else {
        panic!("request to {url} failed");
    };
    let status = response.status().as_u16();
    let Ok(body) = response.json::<Value>().await else {
        panic!("{url} returned a non-JSON body");
    };
    (status, body)
}

async fn wait_for_chunks(handle: &DispatcherHandle, chunks: u64) {
    for _ in 0..200 {
        if handle.stats().chunks >= chunks {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn health_reports_running_dispatcher() {
    let event_bus = EventBus::new();
    let (dispatcher, _task) = Dispatcher::spawn(event_bus.clone(), 4);
    let base = serve(AppState {
        event_bus,
        dispatcher,
    })
    .await;

    let (status, body) = get(&format!("{base}/health")).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn health_degrades_when_dispatcher_stops() {
    let event_bus = EventBus::new();
    let (dispatcher, task) = Dispatcher::spawn(event_bus.clone(), 4);
    task.abort();
    let _ = task.await;
    let base = serve(AppState {
        event_bus,
        dispatcher,
    })
    .await;

    let (status, body) = get(&format!("{base}/health")).await;
    assert_eq!(status, 503);
    assert_eq!(body["status"], "degraded");
}

#[tokio::test]
async fn stats_reflect_processed_chunks() {
    let event_bus = EventBus::new();
    let _sub = event_bus.subscribe(Topic::UpdateFeed, |_| Ok(()));
    let (dispatcher, _task) = Dispatcher::spawn(event_bus.clone(), 4);

    let chunk = "{\"type\":\"build:update:1\",\"data\":{}}\n{\"type\":\"noise\",\"data\":1}\n{bad";
    tokio_test::assert_ok!(dispatcher.deliver(chunk).await);
    wait_for_chunks(&dispatcher, 1).await;

    let base = serve(AppState {
        event_bus,
        dispatcher,
    })
    .await;

    let (status, body) = get(&format!("{base}/stats")).await;
    assert_eq!(status, 200);
    assert_eq!(body["dispatcher"]["chunks"], 1);
    assert_eq!(body["dispatcher"]["envelopes"], 2);
    assert_eq!(body["dispatcher"]["malformed"], 1);
    assert_eq!(body["dispatcher"]["unrouted"], 1);
    assert_eq!(body["dispatcher"]["publishes"], 2);
    assert_eq!(body["subscriptions"], 1);
    assert_eq!(body["topics"], 1);
}
