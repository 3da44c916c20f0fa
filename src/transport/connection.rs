//! WebSocket connection and event loop.
//!
//! The connection spawns a tokio task that handles:
//!
//! - Incoming frames from the remote end (responses, events)
//! - Outgoing commands from the Rust API
//! - Request/response correlation by command id
//! - Event fan-out to subscribers
//!
//! Events are never dropped on the floor while a subscriber is alive:
//! network capture and readiness polling depend on seeing frames that
//! arrive while no command is pending.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Value, to_string};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, connect_async};
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::protocol::{Command, CommandFrame, CommandId, EventFrame, IncomingFrame};

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for command execution.
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum pending commands before rejecting new ones.
///
/// Callers are expected to await each response before issuing the next
/// command; the bound only guards against runaway misuse.
const MAX_PENDING_COMMANDS: usize = 64;

// ============================================================================
// Types
// ============================================================================

/// Map of command ids to response channels.
type CorrelationMap = FxHashMap<CommandId, oneshot::Sender<Result<Value>>>;

/// Receiver half of an event subscription.
///
/// Every unsolicited frame received while the subscription is alive is
/// delivered here, in arrival order.
pub type EventStream = mpsc::UnboundedReceiver<EventFrame>;

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Send a frame and wait for its correlated response.
    Send {
        frame: CommandFrame,
        response_tx: oneshot::Sender<Result<Value>>,
    },
    /// Remove a timed-out correlation entry.
    RemoveCorrelation(CommandId),
    /// Shutdown the connection.
    Shutdown,
}

// ============================================================================
// Connection
// ============================================================================

/// WebSocket connection to one page target.
///
/// Owns the monotonically increasing command-id counter and the
/// correlation map. One connection addresses exactly one remote surface;
/// it is never shared across surfaces.
pub struct Connection {
    /// Channel for handing work to the event loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    /// Correlation map (shared with event loop).
    correlation: Arc<Mutex<CorrelationMap>>,
    /// Live event subscribers (shared with event loop).
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<EventFrame>>>>,
    /// Command id counter.
    next_id: AtomicU64,
}

impl Connection {
    /// Dials the target's WebSocket debugger URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WebSocket`] if the handshake fails.
    pub async fn connect(ws_url: &str) -> Result<Self> {
        debug!(url = %ws_url, "Connecting to debugger endpoint");
        let (ws_stream, _) = connect_async(ws_url).await?;
        Ok(Self::from_stream(ws_stream))
    }

    /// Creates a connection from an established WebSocket stream.
    ///
    /// Spawns the event loop task internally.
    pub(crate) fn from_stream<S>(ws_stream: WebSocketStream<S>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let correlation = Arc::new(Mutex::new(CorrelationMap::default()));
        let subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<EventFrame>>>> =
            Arc::new(Mutex::new(Vec::new()));

        tokio::spawn(Self::run_event_loop(
            ws_stream,
            command_rx,
            Arc::clone(&correlation),
            Arc::clone(&subscribers),
        ));

        Self {
            command_tx,
            correlation,
            subscribers,
            next_id: AtomicU64::new(1),
        }
    }

    /// Sends a command and waits for its correlated response with the
    /// default timeout.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the connection is gone
    /// - [`Error::CommandTimeout`] if no response arrives in time
    /// - [`Error::Protocol`] if the remote end answered with an error frame
    pub async fn send(&self, command: Command) -> Result<Value> {
        self.send_with_timeout(command, DEFAULT_COMMAND_TIMEOUT)
            .await
    }

    /// Sends a command and waits for its correlated response.
    pub async fn send_with_timeout(
        &self,
        command: Command,
        command_timeout: Duration,
    ) -> Result<Value> {
        let command_id = CommandId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let frame = CommandFrame::new(command_id, command);

        {
            let correlation = self.correlation.lock();
            if correlation.len() >= MAX_PENDING_COMMANDS {
                warn!(
                    pending = correlation.len(),
                    max = MAX_PENDING_COMMANDS,
                    "Too many pending commands"
                );
                return Err(Error::protocol(format!(
                    "Too many pending commands: {}/{}",
                    correlation.len(),
                    MAX_PENDING_COMMANDS
                )));
            }
        }

        let (response_tx, response_rx) = oneshot::channel();

        self.command_tx
            .send(ConnectionCommand::Send { frame, response_tx })
            .map_err(|_| Error::ConnectionClosed)?;

        match timeout(command_timeout, response_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                // Timeout - clean up the correlation entry
                let _ = self
                    .command_tx
                    .send(ConnectionCommand::RemoveCorrelation(command_id));

                Err(Error::command_timeout(
                    command_id,
                    command_timeout.as_millis() as u64,
                ))
            }
        }
    }

    /// Subscribes to unsolicited events.
    ///
    /// Dropping the returned stream ends the subscription.
    #[must_use]
    pub fn subscribe(&self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Returns the number of pending commands.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.correlation.lock().len()
    }

    /// Shuts down the connection gracefully.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(ConnectionCommand::Shutdown);
    }

    /// Event loop that owns WebSocket I/O.
    async fn run_event_loop<S>(
        ws_stream: WebSocketStream<S>,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        correlation: Arc<Mutex<CorrelationMap>>,
        subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<EventFrame>>>>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                // Incoming frames from the remote end
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            Self::handle_incoming_frame(&text, &correlation, &subscribers);
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!("WebSocket closed by remote");
                            break;
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            break;
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            break;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                // Commands from the Rust API
                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Send { frame, response_tx }) => {
                            Self::handle_send_command(
                                frame,
                                response_tx,
                                &mut ws_write,
                                &correlation,
                            ).await;
                        }

                        Some(ConnectionCommand::RemoveCorrelation(command_id)) => {
                            correlation.lock().remove(&command_id);
                            debug!(%command_id, "Removed timed-out correlation");
                        }

                        Some(ConnectionCommand::Shutdown) => {
                            debug!("Shutdown command received");
                            let _ = ws_write.close().await;
                            break;
                        }

                        None => {
                            debug!("Command channel closed");
                            break;
                        }
                    }
                }
            }
        }

        Self::fail_pending_commands(&correlation);
        debug!("Event loop terminated");
    }

    /// Classifies an incoming text frame and routes it.
    ///
    /// Responses resolve their pending command exactly once; events go to
    /// every live subscriber and are never delivered as command results.
    fn handle_incoming_frame(
        text: &str,
        correlation: &Arc<Mutex<CorrelationMap>>,
        subscribers: &Arc<Mutex<Vec<mpsc::UnboundedSender<EventFrame>>>>,
    ) {
        match IncomingFrame::parse(text) {
            Ok(IncomingFrame::Response(response)) => {
                let id = response.id;
                let tx = correlation.lock().remove(&id);

                if let Some(tx) = tx {
                    let _ = tx.send(response.into_result());
                } else {
                    warn!(%id, "Response for unknown command");
                }
            }

            Ok(IncomingFrame::Event(event)) => {
                trace!(method = %event.method, "Event received");
                subscribers
                    .lock()
                    .retain(|tx| tx.send(event.clone()).is_ok());
            }

            Err(e) => {
                warn!(error = %e, "Failed to parse incoming frame");
            }
        }
    }

    /// Writes one command frame and registers its correlation entry.
    async fn handle_send_command<S>(
        frame: CommandFrame,
        response_tx: oneshot::Sender<Result<Value>>,
        ws_write: &mut SplitSink<WebSocketStream<S>, Message>,
        correlation: &Arc<Mutex<CorrelationMap>>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let command_id = frame.id;

        let json = match to_string(&frame) {
            Ok(j) => j,
            Err(e) => {
                let _ = response_tx.send(Err(Error::Json(e)));
                return;
            }
        };

        // Store correlation before writing
        correlation.lock().insert(command_id, response_tx);

        if let Err(e) = ws_write.send(Message::Text(json.into())).await
            && let Some(tx) = correlation.lock().remove(&command_id)
        {
            let _ = tx.send(Err(Error::WebSocket(e)));
        }

        trace!(%command_id, "Command sent");
    }

    /// Fails all pending commands with ConnectionClosed.
    fn fail_pending_commands(correlation: &Arc<Mutex<CorrelationMap>>) {
        let pending: Vec<_> = correlation.lock().drain().collect();
        let count = pending.len();

        for (_, tx) in pending {
            let _ = tx.send(Err(Error::ConnectionClosed));
        }

        if count > 0 {
            debug!(count, "Failed pending commands on shutdown");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{PageCommand, RuntimeCommand};

    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    /// Spawns a loopback remote end that answers every command frame with
    /// `{id, result: {echo: <id>}}`, preceded by `lead_events` unsolicited
    /// event frames. Error replies are produced for `Page.enable`.
    async fn spawn_remote(lead_events: usize) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = accept_async(stream).await.expect("handshake");

            while let Some(Ok(Message::Text(text))) = ws.next().await {
                let frame: Value = serde_json::from_str(&text).expect("frame json");
                let id = frame["id"].as_u64().expect("frame id");
                let method = frame["method"].as_str().unwrap_or_default();

                for n in 0..lead_events {
                    let event = json!({
                        "method": "Network.requestWillBeSent",
                        "params": { "requestId": n.to_string() }
                    });
                    ws.send(Message::Text(event.to_string().into()))
                        .await
                        .expect("send event");
                }

                let reply = if method == "Page.enable" {
                    json!({ "id": id, "error": { "code": -32601, "message": "not enabled" } })
                } else {
                    json!({ "id": id, "result": { "echo": id } })
                };
                ws.send(Message::Text(reply.to_string().into()))
                    .await
                    .expect("send reply");
            }
        });

        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn test_response_carries_matching_id() {
        let url = spawn_remote(0).await;
        let conn = Connection::connect(&url).await.expect("connect");

        for expected in 1..=3u64 {
            let result = conn
                .send(Command::Runtime(RuntimeCommand::evaluate("1")))
                .await
                .expect("send");
            assert_eq!(result["echo"].as_u64(), Some(expected));
        }
        assert_eq!(conn.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_events_go_to_subscribers_not_callers() {
        let url = spawn_remote(2).await;
        let conn = Connection::connect(&url).await.expect("connect");
        let mut events = conn.subscribe();

        // The remote interleaves two events before the response; the
        // caller must still get the correlated result.
        let result = conn
            .send(Command::Runtime(RuntimeCommand::evaluate("1")))
            .await
            .expect("send");
        assert_eq!(result["echo"].as_u64(), Some(1));

        let first = events.recv().await.expect("event");
        assert_eq!(first.method, "Network.requestWillBeSent");
        assert_eq!(first.get_string("requestId"), "0");
        let second = events.recv().await.expect("event");
        assert_eq!(second.get_string("requestId"), "1");
    }

    #[tokio::test]
    async fn test_error_frame_fails_only_that_command() {
        let url = spawn_remote(0).await;
        let conn = Connection::connect(&url).await.expect("connect");

        let err = conn
            .send(Command::Page(PageCommand::Enable))
            .await
            .expect_err("error frame");
        assert!(matches!(err, Error::Protocol { .. }));
        assert!(err.to_string().contains("not enabled"));

        // The connection survives the per-command failure.
        let result = conn
            .send(Command::Runtime(RuntimeCommand::evaluate("1")))
            .await
            .expect("send after error");
        assert_eq!(result["echo"].as_u64(), Some(2));
    }

    #[tokio::test]
    async fn test_command_timeout_cleans_correlation() {
        // A listener that accepts but never replies.
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = accept_async(stream).await.expect("handshake");
            while let Some(Ok(_)) = ws.next().await {}
        });

        let conn = Connection::connect(&format!("ws://{addr}"))
            .await
            .expect("connect");
        let err = conn
            .send_with_timeout(
                Command::Runtime(RuntimeCommand::evaluate("1")),
                Duration::from_millis(50),
            )
            .await
            .expect_err("must time out");
        assert!(matches!(err, Error::CommandTimeout { .. }));

        // Give the loop a beat to process the removal.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(conn.pending_count(), 0);
    }
}
