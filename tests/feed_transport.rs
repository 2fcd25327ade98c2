//! Transport driver against a local WebSocket server.

#![allow(clippy::panic)]

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};

use wake_feed::config::FeedConfig;
use wake_feed::domain::{BuildId, EventBus, Topic};
use wake_feed::ws::connection::{FeedCommands, run_feed};
use wake_feed::ws::dispatcher::Dispatcher;

const WAIT: Duration = Duration::from_secs(5);

fn config_for(port: u16, topics: &str) -> FeedConfig {
    let page = format!("http://127.0.0.1:{port}/");
    let topics = topics.to_string();
    let loaded = FeedConfig::from_lookup(|key| match key {
        "PAGE_URL" => Some(page.clone()),
        "DEPLOY_MODE" => Some("production".to_string()),
        "FEED_TOPICS" => Some(topics.clone()),
        "RECONNECT_INITIAL_BACKOFF_MS" => Some("10".to_string()),
        "RECONNECT_MAX_BACKOFF_MS" => Some("50".to_string()),
        _ => None,
    });
    let Ok(config) = loaded else {
        panic!("test config should load");
    };
    config
}

async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let Ok(Ok((stream, _))) = tokio::time::timeout(WAIT, listener.accept()).await else {
        panic!("client did not connect");
    };
    let Ok(ws) = accept_async(stream).await else {
        panic!("websocket handshake failed");
    };
    ws
}

async fn next_json(ws: &mut WebSocketStream<TcpStream>) -> Value {
    let Ok(Some(Ok(Message::Text(text)))) = tokio::time::timeout(WAIT, ws.next()).await else {
        panic!("expected a text frame from the client");
    };
    let Ok(value) = serde_json::from_str(text.as_str()) else {
        panic!("client sent invalid JSON: {text}");
    };
    value
}

async fn recv(rx: &mut mpsc::UnboundedReceiver<Value>) -> Value {
    let Ok(Some(value)) = tokio::time::timeout(WAIT, rx.recv()).await else {
        panic!("expected a published payload");
    };
    value
}

fn forward(bus: &EventBus, topic: Topic) -> mpsc::UnboundedReceiver<Value> {
    let (tx, rx) = mpsc::unbounded_channel();
    let _subscription = bus.subscribe(topic, move |v| {
        tx.send(v.clone())?;
        Ok(())
    });
    rx
}

#[tokio::test]
async fn replays_subscriptions_and_publishes_frames() {
    let Ok(listener) = TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind failed");
    };
    let port = listener.local_addr().map(|a| a.port()).unwrap_or_default();

    let bus = EventBus::new();
    let mut updates = forward(&bus, Topic::UpdateFeed);
    let mut logs = forward(&bus, Topic::log(BuildId::from(7)));
    let (dispatcher, _task) = Dispatcher::spawn(bus.clone(), 8);
    let (commands, command_rx) = FeedCommands::channel(4);
    let feed = tokio::spawn(run_feed(config_for(port, "build:update:"), dispatcher, command_rx));

    let mut server = accept(&listener).await;
    let replay = next_json(&mut server).await;
    assert_eq!(replay, json!({"type": "in:subscribe", "data": {"to": ["build:update:"]}}));

    let chunk = concat!(
        r#"{"type":"build:update:7","data":{"id":7,"name":"deploy","status":"running"}}"#,
        "\n",
        r#"{"type":"build:log:7","data":{"task_id":0,"id":1,"data":"make"}}"#,
    );
    let Ok(()) = server.send(Message::text(chunk)).await else {
        panic!("server send failed");
    };
    assert_eq!(recv(&mut updates).await["status"], "running");
    assert_eq!(recv(&mut logs).await["data"], "make");

    tokio_test::assert_ok!(commands.subscribe(vec!["build:log:7".to_string()]).await);
    let added = next_json(&mut server).await;
    assert_eq!(added, json!({"type": "in:subscribe", "data": {"to": ["build:log:7"]}}));

    tokio_test::assert_ok!(commands.unsubscribe(vec!["build:log:7".to_string()]).await);
    let removed = next_json(&mut server).await;
    assert_eq!(removed, json!({"type": "in:unsubscribe", "data": {"to": ["build:log:7"]}}));

    feed.abort();
}

#[tokio::test]
async fn reconnects_and_replays_narrow_prefixes_first() {
    let Ok(listener) = TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind failed");
    };
    let port = listener.local_addr().map(|a| a.port()).unwrap_or_default();

    let bus = EventBus::new();
    let mut logs = forward(&bus, Topic::log(BuildId::from(2)));
    let (dispatcher, _task) = Dispatcher::spawn(bus.clone(), 8);
    let (commands, command_rx) = FeedCommands::channel(4);
    let feed = tokio::spawn(run_feed(config_for(port, "build:log:2"), dispatcher, command_rx));

    let mut first = accept(&listener).await;
    let initial = next_json(&mut first).await;
    assert_eq!(initial, json!({"type": "in:subscribe", "data": {"to": ["build:log:2"]}}));
    tokio_test::assert_ok!(
        commands
            .subscribe(vec!["build:".to_string(), "deploy:".to_string()])
            .await
    );
    let added = next_json(&mut first).await;
    assert_eq!(added, json!({"type": "in:subscribe", "data": {"to": ["build:", "deploy:"]}}));
    drop(first);

    // Narrow prefixes are replayed before the broad one that covers them.
    let mut second = accept(&listener).await;
    let replay = next_json(&mut second).await;
    assert_eq!(
        replay,
        json!({"type": "in:subscribe", "data": {"to": ["build:log:2", "deploy:", "build:"]}})
    );

    tokio_test::assert_ok!(commands.unsubscribe(vec!["build:".to_string()]).await);
    let removed = next_json(&mut second).await;
    assert_eq!(removed, json!({"type": "in:unsubscribe", "data": {"to": ["build:"]}}));

    let Ok(()) = second
        .send(Message::text(r#"{"type":"build:log:2","data":{"task_id":1,"id":4,"data":"ok"}}"#))
        .await
    else {
        panic!("server send failed");
    };
    assert_eq!(recv(&mut logs).await["id"], 4);

    feed.abort();
}

#[tokio::test]
async fn stops_once_the_dispatcher_is_gone() {
    let Ok(listener) = TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind failed");
    };
    let port = listener.local_addr().map(|a| a.port()).unwrap_or_default();

    let (dispatcher, task) = Dispatcher::spawn(EventBus::new(), 1);
    let (_commands, command_rx) = FeedCommands::channel(1);
    let feed = tokio::spawn(run_feed(config_for(port, "build:"), dispatcher, command_rx));

    let mut server = accept(&listener).await;
    let _ = next_json(&mut server).await;
    task.abort();
    let _ = task.await;

    let Ok(()) = server
        .send(Message::text(r#"{"type":"build:log:1","data":{}}"#))
        .await
    else {
        panic!("server send failed");
    };

    let Ok(Ok(result)) = tokio::time::timeout(WAIT, feed).await else {
        panic!("feed did not stop");
    };
    tokio_test::assert_err!(result);
}
