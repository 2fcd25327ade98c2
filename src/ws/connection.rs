//! Feed transport driver.
//!
//! Owns the WebSocket to the build server: connects, replays server-side
//! subscriptions, forwards every text frame to the dispatcher untouched and
//! reconnects with exponential backoff. It never decodes or routes anything
//! itself.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::dispatcher::DispatcherHandle;
use super::messages::{ControlMessage, FeedCommand};
use super::subscription::RemoteSubscriptions;
use crate::config::FeedConfig;
use crate::error::TelemetryError;

type FeedStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Cloneable sender for runtime [`FeedCommand`]s.
#[derive(Debug, Clone)]
pub struct FeedCommands {
    tx: mpsc::Sender<FeedCommand>,
}

impl FeedCommands {
    /// Creates a command sender and the receiver to hand to [`run_feed`].
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<FeedCommand>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Asks the server to forward messages matching `prefixes`.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::Transport`] if the driver has stopped.
    pub async fn subscribe(&self, prefixes: Vec<String>) -> Result<(), TelemetryError> {
        self.send(FeedCommand::Subscribe(prefixes)).await
    }

    /// Asks the server to stop forwarding `prefixes`.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::Transport`] if the driver has stopped.
    pub async fn unsubscribe(&self, prefixes: Vec<String>) -> Result<(), TelemetryError> {
        self.send(FeedCommand::Unsubscribe(prefixes)).await
    }

    async fn send(&self, command: FeedCommand) -> Result<(), TelemetryError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| TelemetryError::Transport("feed driver stopped".to_string()))
    }
}

/// Exponential reconnect delay.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    /// Starts at `initial`, doubling up to `max`.
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Returns the delay to wait now and doubles the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    /// Back to the initial delay, after a successful connect.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

struct FeedState {
    remote: RemoteSubscriptions,
    commands: mpsc::Receiver<FeedCommand>,
    commands_open: bool,
}

/// Runs the feed until the dispatcher goes away.
///
/// The endpoint is recomputed from `config` on every attempt. Connection
/// failures and disconnects are logged and retried after the backoff delay;
/// messages sent while disconnected are lost.
///
/// # Errors
///
/// Returns [`TelemetryError::DispatcherClosed`] once the dispatcher stops
/// accepting chunks. No other error ends the loop.
pub async fn run_feed(
    config: FeedConfig,
    dispatcher: DispatcherHandle,
    commands: mpsc::Receiver<FeedCommand>,
) -> Result<(), TelemetryError> {
    let mut state = FeedState {
        remote: RemoteSubscriptions::new(),
        commands,
        commands_open: true,
    };
    state.remote.subscribe(config.feed_topics.iter().cloned());
    let mut backoff = Backoff::new(config.reconnect_initial_backoff, config.reconnect_max_backoff);

    loop {
        if dispatcher.is_closed() {
            return Err(TelemetryError::DispatcherClosed);
        }

        let url = config.endpoint();
        tracing::info!(url = %url, "connecting to build feed");
        match connect_async(url.as_str()).await {
            Ok((stream, _response)) => {
                tracing::info!(url = %url, "build feed connected");
                backoff.reset();
                match run_session(stream, &dispatcher, &mut state).await {
                    Ok(()) => tracing::warn!(url = %url, "build feed disconnected"),
                    Err(TelemetryError::DispatcherClosed) => {
                        return Err(TelemetryError::DispatcherClosed);
                    }
                    Err(err) => tracing::warn!(url = %url, error = %err, "build feed session failed"),
                }
            }
            Err(err) => tracing::warn!(url = %url, error = %err, "build feed connection failed"),
        }

        let delay = backoff.next_delay();
        tracing::debug!(delay_ms = delay.as_millis(), "waiting before reconnect");
        tokio::time::sleep(delay).await;
    }
}

/// One connected session. `Ok` means the server went away cleanly.
async fn run_session(
    stream: FeedStream,
    dispatcher: &DispatcherHandle,
    state: &mut FeedState,
) -> Result<(), TelemetryError> {
    let (mut ws_tx, mut ws_rx) = stream.split();

    if !state.remote.is_empty() {
        let replay = ControlMessage::subscribe(state.remote.prefixes());
        ws_tx.send(Message::text(control_text(&replay)?)).await?;
        tracing::debug!(prefixes = state.remote.count(), "replayed server subscriptions");
    }

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => dispatcher.deliver(text.as_str()).await?,
                    Some(Ok(Message::Binary(bytes))) => {
                        tracing::debug!(len = bytes.len(), "ignoring binary frame");
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::debug!(?frame, "server closed the feed");
                        return Ok(());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return Err(err.into()),
                    None => return Ok(()),
                }
            }
            cmd = state.commands.recv(), if state.commands_open => {
                match cmd {
                    Some(command) => {
                        if let Some(frame) = apply_command(&mut state.remote, command) {
                            ws_tx.send(Message::text(control_text(&frame)?)).await?;
                        }
                    }
                    None => state.commands_open = false,
                }
            }
        }
    }
}

/// Updates the subscription set and returns the frame to send, if the
/// command changed anything.
fn apply_command(remote: &mut RemoteSubscriptions, command: FeedCommand) -> Option<ControlMessage> {
    match command {
        FeedCommand::Subscribe(prefixes) => {
            let added = remote.subscribe(prefixes);
            (!added.is_empty()).then(|| ControlMessage::subscribe(added))
        }
        FeedCommand::Unsubscribe(prefixes) => {
            let removed = remote.unsubscribe(prefixes);
            (!removed.is_empty()).then(|| ControlMessage::unsubscribe(removed))
        }
    }
}

fn control_text(frame: &ControlMessage) -> Result<String, TelemetryError> {
    frame
        .to_text()
        .map_err(|e| TelemetryError::Transport(format!("encoding control frame: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_max() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(350));
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(), Duration::from_millis(350));
        assert_eq!(backoff.next_delay(), Duration::from_millis(350));
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn subscribe_command_sends_only_new_prefixes() {
        let mut remote = RemoteSubscriptions::new();
        remote.subscribe(["build:update:"]);
        let frame = apply_command(
            &mut remote,
            FeedCommand::Subscribe(vec!["build:update:3".into(), "build:log:3".into()]),
        );
        assert_eq!(frame, Some(ControlMessage::subscribe(vec!["build:log:3".into()])));
    }

    #[test]
    fn redundant_commands_send_nothing() {
        let mut remote = RemoteSubscriptions::new();
        remote.subscribe(["build:"]);
        assert_eq!(
            apply_command(&mut remote, FeedCommand::Subscribe(vec!["build:log:1".into()])),
            None
        );
        assert_eq!(
            apply_command(&mut remote, FeedCommand::Unsubscribe(vec!["build:log:1".into()])),
            None
        );
    }

    #[test]
    fn unsubscribe_command_sends_removed_prefixes() {
        let mut remote = RemoteSubscriptions::new();
        remote.subscribe(["build:log:1"]);
        let frame = apply_command(&mut remote, FeedCommand::Unsubscribe(vec!["build:log:1".into()]));
        assert_eq!(frame, Some(ControlMessage::unsubscribe(vec!["build:log:1".into()])));
        assert!(remote.is_empty());
    }

    #[tokio::test]
    async fn commands_fail_once_driver_is_gone() {
        let (commands, rx) = FeedCommands::channel(1);
        drop(rx);
        assert!(commands.subscribe(vec!["build:".into()]).await.is_err());
    }
}
