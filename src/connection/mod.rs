//! Persistent connection to the detection backend.
//!
//! A [`ConnectionManager`] task exclusively owns the WebSocket. Everything
//! else talks to it through a cloneable [`ConnectionHandle`] and observes it
//! through [`ConnectionEvent`]s. The manager keeps the session alive with a
//! heartbeat, answers server pings, and reconnects after abnormal closes using
//! a stepped [`Backoff`] that resets once a session has been stable long
//! enough.

mod backoff;
mod error;


pub use backoff::Backoff;
pub use error::ConnectionError;

use crate::config::BackendConfig;
use crate::protocol::{
    parse_inbound, ControlKind, ControlMessage, DetectionRequest, DetectionResponse,
    InboundMessage,
};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

/// Lifecycle of the backend connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Notifications emitted by the manager.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// A session is open
    Opened,
    /// A detection message arrived
    Message(Box<DetectionResponse>),
    /// Connecting or sending failed
    Error(String),
    /// The session ended (or a connect attempt failed)
    Closed { intentional: bool },
}

#[derive(Debug)]
enum Command {
    Connect,
    /// Reconnect now if idle and not manually disconnected
    Nudge,
    Send(String),
    Disconnect,
}

/// How a session ended.
#[derive(Debug)]
enum SessionEnd {
    /// `disconnect()` was called
    Intentional,
    /// Process shutdown or every handle dropped
    Shutdown,
    /// Closed by the peer or a transport error
    Lost(String),
    /// Heartbeat could not be sent; reconnect without waiting
    HeartbeatFailed(String),
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Client side of the connection manager.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
}

impl ConnectionHandle {
    /// Open a connection. Failures are reported as events, not here.
    pub fn connect(&self) -> Result<(), ConnectionError> {
        self.command(Command::Connect)
    }

    /// Close the connection and suppress reconnection. Idempotent.
    pub fn disconnect(&self) -> Result<(), ConnectionError> {
        self.command(Command::Disconnect)
    }

    /// Send a detection request on the open connection.
    ///
    /// Nothing is queued while disconnected: the call fails with
    /// [`ConnectionError::NotConnected`] and, unless the connection was
    /// closed on purpose, prompts an immediate reconnect.
    pub fn send(&self, request: &DetectionRequest) -> Result<(), ConnectionError> {
        if !self.is_connected() {
            let _ = self.commands.send(Command::Nudge);
            return Err(ConnectionError::NotConnected);
        }
        let text = request
            .to_json()
            .map_err(|e| ConnectionError::Encode(e.to_string()))?;
        self.command(Command::Send(text))
    }

    pub fn is_connected(&self) -> bool {
        *self.state.borrow() == ConnectionState::Connected
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch connection state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    fn command(&self, command: Command) -> Result<(), ConnectionError> {
        self.commands
            .send(command)
            .map_err(|_| ConnectionError::ManagerStopped)
    }
}

/// Stand-in for a running manager: a handle whose state and outbound
/// traffic the test controls.
#[cfg(test)]
pub(crate) struct FakeLink {
    state: watch::Sender<ConnectionState>,
    commands: mpsc::UnboundedReceiver<Command>,
}

#[cfg(test)]
impl FakeLink {
    pub(crate) fn new(state: ConnectionState) -> (ConnectionHandle, FakeLink) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(state);
        let handle = ConnectionHandle {
            commands: command_tx,
            state: state_rx,
        };
        let link = FakeLink {
            state: state_tx,
            commands: command_rx,
        };
        (handle, link)
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    /// Wait for the next detection request sent through the handle.
    pub(crate) async fn next_request(&mut self) -> Option<DetectionRequest> {
        while let Some(command) = self.commands.recv().await {
            if let Command::Send(text) = command {
                return serde_json::from_str(&text).ok();
            }
        }
        None
    }

    /// Number of detection requests sent so far that were not yet read.
    pub(crate) fn pending_requests(&mut self) -> usize {
        let mut count = 0;
        while let Ok(command) = self.commands.try_recv() {
            if matches!(command, Command::Send(_)) {
                count += 1;
            }
        }
        count
    }
}

/// What to do with an inbound text frame.
#[derive(Debug, PartialEq)]
enum Inbound {
    Reply(String),
    Forward(Box<DetectionResponse>),
    Ignore(ControlKind),
    Drop(String),
}

fn classify_inbound(text: &str) -> Inbound {
    match parse_inbound(text) {
        Ok(InboundMessage::Detection(response)) => Inbound::Forward(response),
        Ok(InboundMessage::Control(ControlKind::Ping)) => {
            match ControlMessage::pong_now().to_json() {
                Ok(pong) => Inbound::Reply(pong),
                Err(e) => Inbound::Drop(e.to_string()),
            }
        }
        Ok(InboundMessage::Control(kind)) => Inbound::Ignore(kind),
        Err(e) => Inbound::Drop(e.to_string()),
    }
}

/// Background task owning the backend WebSocket.
pub struct ConnectionManager {
    config: BackendConfig,
    endpoint: String,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    state: watch::Sender<ConnectionState>,
    backoff: Backoff,
    manual_disconnect: bool,
    reconnect_at: Option<Instant>,
}

impl ConnectionManager {
    /// Create the manager, its handle, and the event stream.
    pub fn new(
        config: BackendConfig,
    ) -> Result<
        (
            Self,
            ConnectionHandle,
            mpsc::UnboundedReceiver<ConnectionEvent>,
        ),
        crate::config::ConfigError,
    > {
        let endpoint = config.endpoint()?;
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let backoff = Backoff::new(config.reconnect_delays());

        let manager = Self {
            config,
            endpoint,
            commands: command_rx,
            events: event_tx,
            state: state_tx,
            backoff,
            manual_disconnect: false,
            reconnect_at: None,
        };
        let handle = ConnectionHandle {
            commands: command_tx,
            state: state_rx,
        };
        Ok((manager, handle, event_rx))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Start the manager background task.
    /// Returns a JoinHandle that resolves when the manager stops.
    pub fn start(mut self, cancel_token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(endpoint = %self.endpoint, "Connection manager started");
            self.run(cancel_token).await;
            self.set_state(ConnectionState::Disconnected);
            tracing::info!("Connection manager shutting down");
        })
    }

    async fn run(&mut self, cancel_token: CancellationToken) {
        loop {
            let attempt = tokio::select! {
                _ = cancel_token.cancelled() => return,
                command = self.commands.recv() => match command {
                    None => return,
                    Some(Command::Connect) => {
                        self.manual_disconnect = false;
                        true
                    }
                    Some(Command::Nudge) => {
                        !self.manual_disconnect && self.reconnect_at.is_none()
                    }
                    Some(Command::Send(_)) => {
                        tracing::warn!("Dropping request, not connected");
                        self.emit(ConnectionEvent::Error(
                            ConnectionError::NotConnected.to_string(),
                        ));
                        false
                    }
                    Some(Command::Disconnect) => {
                        self.manual_disconnect = true;
                        self.reconnect_at = None;
                        self.backoff.reset();
                        false
                    }
                },
                _ = sleep_until(self.reconnect_at.unwrap_or_else(Instant::now)),
                    if self.reconnect_at.is_some() => true,
            };

            if !attempt {
                continue;
            }
            self.reconnect_at = None;

            let ws = match self.open().await {
                Ok(ws) => ws,
                Err(e) => {
                    tracing::warn!(endpoint = %self.endpoint, error = %e, "Connection attempt failed");
                    self.set_state(ConnectionState::Disconnected);
                    self.emit(ConnectionEvent::Error(e.to_string()));
                    self.emit(ConnectionEvent::Closed { intentional: false });
                    self.schedule_reconnect(false);
                    continue;
                }
            };

            self.set_state(ConnectionState::Connected);
            self.emit(ConnectionEvent::Opened);
            metrics::gauge!("ppe_connection_up").set(1.0);

            let end = self.run_session(ws, &cancel_token).await;

            metrics::gauge!("ppe_connection_up").set(0.0);
            self.set_state(ConnectionState::Disconnected);

            match end {
                SessionEnd::Shutdown => {
                    self.emit(ConnectionEvent::Closed { intentional: true });
                    return;
                }
                SessionEnd::Intentional => {
                    tracing::info!("Disconnected from detection server");
                    self.emit(ConnectionEvent::Closed { intentional: true });
                }
                SessionEnd::Lost(reason) => {
                    tracing::warn!(reason = %reason, "Connection to detection server lost");
                    self.emit(ConnectionEvent::Closed { intentional: false });
                    self.schedule_reconnect(false);
                }
                SessionEnd::HeartbeatFailed(reason) => {
                    tracing::warn!(reason = %reason, "Heartbeat failed, reconnecting");
                    self.emit(ConnectionEvent::Error(reason));
                    self.emit(ConnectionEvent::Closed { intentional: false });
                    self.schedule_reconnect(true);
                }
            }
        }
    }

    async fn open(&mut self) -> Result<WsStream, ConnectionError> {
        self.set_state(ConnectionState::Connecting);
        tracing::debug!(endpoint = %self.endpoint, "Connecting to detection server");

        let connect = tokio_tungstenite::connect_async(self.endpoint.as_str());
        match tokio::time::timeout(self.config.connect_timeout(), connect).await {
            Ok(Ok((ws, _response))) => {
                tracing::info!(endpoint = %self.endpoint, "Connected to detection server");
                Ok(ws)
            }
            Ok(Err(e)) => Err(ConnectionError::Transport(e.to_string())),
            Err(_) => Err(ConnectionError::Timeout(
                self.config.connect_timeout_seconds,
            )),
        }
    }

    async fn run_session(&mut self, ws: WsStream, cancel_token: &CancellationToken) -> SessionEnd {
        let (mut sink, mut stream) = ws.split();
        let opened_at = Instant::now();

        let period = self.config.heartbeat_interval();
        let mut heartbeat = tokio::time::interval_at(opened_at + period, period);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let stable = sleep_until(opened_at + self.config.stable_window());
        tokio::pin!(stable);
        let mut stable_reached = false;

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return SessionEnd::Shutdown;
                }
                _ = &mut stable, if !stable_reached => {
                    stable_reached = true;
                    if self.backoff.attempts() > 0 {
                        tracing::info!(
                            stable_seconds = self.config.stable_connection_seconds,
                            "Connection stable, resetting reconnect backoff"
                        );
                    }
                    self.backoff.reset();
                }
                _ = heartbeat.tick() => {
                    let ping = match ControlMessage::ping().to_json() {
                        Ok(ping) => ping,
                        Err(e) => return SessionEnd::HeartbeatFailed(e.to_string()),
                    };
                    if let Err(e) = sink.send(Message::Text(ping)).await {
                        return SessionEnd::HeartbeatFailed(e.to_string());
                    }
                    tracing::trace!("Heartbeat sent");
                }
                command = self.commands.recv() => match command {
                    None => {
                        let _ = sink.send(Message::Close(None)).await;
                        return SessionEnd::Shutdown;
                    }
                    Some(Command::Connect) | Some(Command::Nudge) => {}
                    Some(Command::Disconnect) => {
                        self.manual_disconnect = true;
                        self.backoff.reset();
                        let _ = sink.send(Message::Close(None)).await;
                        return SessionEnd::Intentional;
                    }
                    Some(Command::Send(text)) => {
                        let size = text.len();
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            self.emit(ConnectionEvent::Error(e.to_string()));
                            return SessionEnd::Lost(format!("send failed: {}", e));
                        }
                        tracing::debug!(bytes = size, "Detection request sent");
                    }
                },
                message = stream.next() => match message {
                    None => return SessionEnd::Lost("stream ended".to_string()),
                    Some(Err(e)) => {
                        self.emit(ConnectionEvent::Error(e.to_string()));
                        return SessionEnd::Lost(e.to_string());
                    }
                    Some(Ok(Message::Text(text))) => match classify_inbound(&text) {
                        Inbound::Forward(response) => {
                            self.emit(ConnectionEvent::Message(response));
                        }
                        Inbound::Reply(pong) => {
                            if let Err(e) = sink.send(Message::Text(pong)).await {
                                tracing::warn!(error = %e, "Failed to answer server ping");
                            }
                        }
                        Inbound::Ignore(kind) => {
                            tracing::debug!(kind = ?kind, "Control message ignored");
                        }
                        Inbound::Drop(error) => {
                            tracing::warn!(error = %error, "Dropping malformed message");
                        }
                    },
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| format!("closed by server ({})", u16::from(f.code)))
                            .unwrap_or_else(|| "closed by server".to_string());
                        return SessionEnd::Lost(reason);
                    }
                    Some(Ok(_)) => {}
                },
            }
        }
    }

    fn schedule_reconnect(&mut self, immediate: bool) {
        if self.manual_disconnect {
            return;
        }
        let delay = if immediate {
            Duration::ZERO
        } else {
            self.backoff.next_delay()
        };
        metrics::counter!("ppe_reconnects_total").increment(1);
        tracing::info!(
            delay_ms = delay.as_millis() as u64,
            attempt = self.backoff.attempts(),
            "Reconnecting to detection server"
        );
        self.reconnect_at = Some(Instant::now() + delay);
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }

    fn emit(&self, event: ConnectionEvent) {
        // Receiver gone means the pipeline stopped
        let _ = self.events.send(event);
    }
}
