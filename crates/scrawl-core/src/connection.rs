//! Native WebSocket transport.
//!
//! A background thread owns the socket; the rest of the crate talks to it
//! through channels and a non-blocking `poll_events` pump. The thread
//! reconnects on its own with exponential backoff, so a lost link surfaces
//! as `Disconnected` followed eventually by `Connecting`/`Connected`,
//! never as a dead client.
//!
//! Messages submitted while the link is down are dropped, not queued; the
//! session recovers through snapshots, not through replay.

use std::net::TcpStream;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tungstenite::stream::MaybeTlsStream;
use tungstenite::{connect, Message, WebSocket};
use url::Url;

use crate::protocol::{ClientMessage, ConnectionState, ServerMessage, SyncEvent};

/// First reconnect delay.
pub const INITIAL_BACKOFF_MS: u64 = 1000;
/// Reconnect delay ceiling.
pub const MAX_BACKOFF_MS: u64 = 10_000;

const READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Commands sent to the socket thread.
enum WsCommand {
    Send(String),
    Close,
}

fn preview(msg: &str) -> &str {
    match msg.char_indices().nth(100) {
        Some((idx, _)) => &msg[..idx],
        None => msg,
    }
}

/// Owns the transport session for one server.
///
/// Call [`poll_events`](Self::poll_events) once per pump iteration and feed
/// the events to the board session.
pub struct ConnectionManager {
    state: ConnectionState,
    events: Vec<SyncEvent>,
    cmd_tx: Option<Sender<WsCommand>>,
    event_rx: Option<Receiver<SyncEvent>>,
    _thread: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    /// New disconnected manager.
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            events: Vec::new(),
            cmd_tx: None,
            event_rx: None,
            _thread: None,
        }
    }

    /// Start the socket thread against `url` (`ws://` or `wss://`).
    pub fn connect(&mut self, url: &str) -> Result<(), String> {
        if self.cmd_tx.is_some() {
            return Err("Already connected".to_string());
        }

        let parsed = Url::parse(url).map_err(|e| format!("Invalid URL: {}", e))?;
        if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
            return Err(format!("Invalid WebSocket URL scheme: {}", parsed.scheme()));
        }

        self.state = ConnectionState::Connecting;

        let (cmd_tx, cmd_rx) = channel::<WsCommand>();
        let (event_tx, event_rx) = channel::<SyncEvent>();
        let url = url.to_string();

        let handle = thread::spawn(move || socket_thread(&url, &cmd_rx, &event_tx));

        self.cmd_tx = Some(cmd_tx);
        self.event_rx = Some(event_rx);
        self._thread = Some(handle);

        Ok(())
    }

    /// Stop the socket thread. Safe to call repeatedly.
    pub fn disconnect(&mut self) {
        if let Some(tx) = self.cmd_tx.take() {
            let _ = tx.send(WsCommand::Close);
        }
        self.event_rx = None;
        self._thread = None;
        self.state = ConnectionState::Disconnected;
    }

    /// Send a raw text frame. Succeeds as long as the thread is running;
    /// the thread drops frames that race a dead link.
    pub fn send(&self, msg: &str) -> Result<(), String> {
        match self.cmd_tx {
            Some(ref tx) => tx
                .send(WsCommand::Send(msg.to_string()))
                .map_err(|e| format!("Send failed: {}", e)),
            None => Err("Not connected".to_string()),
        }
    }

    /// Serialize and send one client message.
    pub fn send_message(&self, msg: &ClientMessage) -> Result<(), String> {
        let text = serde_json::to_string(msg).map_err(|e| format!("Encode failed: {}", e))?;
        self.send(&text)
    }

    /// Drain pending events (non-blocking) and mirror the state machine.
    pub fn poll_events(&mut self) -> Vec<SyncEvent> {
        if let Some(ref rx) = self.event_rx {
            while let Ok(event) = rx.try_recv() {
                match &event {
                    SyncEvent::Connecting => self.state = ConnectionState::Connecting,
                    SyncEvent::Connected => self.state = ConnectionState::Connected,
                    SyncEvent::Disconnected => self.state = ConnectionState::Disconnected,
                    SyncEvent::Message(_) => {}
                }
                self.events.push(event);
            }
        }

        std::mem::take(&mut self.events)
    }

    /// Get current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.disconnect();
    }
}

enum Exit {
    /// `disconnect()` was called or the manager is gone.
    Shutdown,
    /// The link died; retry.
    Lost,
}

fn socket_thread(url: &str, cmd_rx: &Receiver<WsCommand>, event_tx: &Sender<SyncEvent>) {
    let mut backoff = Duration::from_millis(INITIAL_BACKOFF_MS);
    loop {
        let _ = event_tx.send(SyncEvent::Connecting);
        log::info!("WebSocket connecting to {}", url);
        match connect(url) {
            Ok((mut socket, response)) => {
                log::info!("WebSocket connected, status: {}", response.status());
                backoff = Duration::from_millis(INITIAL_BACKOFF_MS);
                let _ = event_tx.send(SyncEvent::Connected);
                configure_stream(&mut socket);
                let exit = run_session(&mut socket, cmd_rx, event_tx);
                let _ = event_tx.send(SyncEvent::Disconnected);
                if matches!(exit, Exit::Shutdown) {
                    break;
                }
            }
            Err(e) => {
                log::warn!("WebSocket connection failed: {}", e);
            }
        }

        if backoff_wait(cmd_rx, backoff) {
            break;
        }
        backoff = (backoff * 2).min(Duration::from_millis(MAX_BACKOFF_MS));
    }
    log::info!("WebSocket thread exiting");
}

/// Set read/write timeouts so the session loop never blocks for long.
fn configure_stream(socket: &mut WebSocket<MaybeTlsStream<TcpStream>>) {
    match socket.get_mut() {
        MaybeTlsStream::Plain(tcp) => {
            let _ = tcp.set_read_timeout(Some(READ_TIMEOUT));
            let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
        }
        #[allow(unreachable_patterns)]
        _ => {
            log::debug!("TLS or other stream - using default timeout handling");
        }
    }
}

fn run_session(
    socket: &mut WebSocket<MaybeTlsStream<TcpStream>>,
    cmd_rx: &Receiver<WsCommand>,
    event_tx: &Sender<SyncEvent>,
) -> Exit {
    loop {
        // Commands first (non-blocking)
        match cmd_rx.try_recv() {
            Ok(WsCommand::Send(msg)) => {
                log::debug!("WebSocket sending: {}", preview(&msg));
                if let Err(e) = socket.send(Message::Text(msg)) {
                    log::error!("WebSocket send error: {}", e);
                    return Exit::Lost;
                }
            }
            Ok(WsCommand::Close) | Err(TryRecvError::Disconnected) => {
                let _ = socket.close(None);
                return Exit::Shutdown;
            }
            Err(TryRecvError::Empty) => {}
        }

        // Incoming frames (bounded by the read timeout)
        match socket.read() {
            Ok(Message::Text(txt)) => {
                log::debug!("WebSocket received: {}", preview(&txt));
                match serde_json::from_str::<ServerMessage>(&txt) {
                    Ok(message) => {
                        let _ = event_tx.send(SyncEvent::Message(message));
                    }
                    Err(e) => log::warn!("dropping unparseable frame: {}", e),
                }
            }
            Ok(Message::Ping(data)) => {
                let _ = socket.send(Message::Pong(data));
            }
            Ok(Message::Close(_)) => {
                log::info!("WebSocket received close frame");
                return Exit::Lost;
            }
            Ok(_) => {} // Ignore binary, pong
            Err(tungstenite::Error::Io(ref e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => {
                log::error!("WebSocket read error: {}", e);
                return Exit::Lost;
            }
        }
    }
}

/// Sleep out the backoff while keeping the command channel drained, so
/// frames submitted against a dead link are dropped rather than delivered
/// to the next connection. Returns true on shutdown.
fn backoff_wait(cmd_rx: &Receiver<WsCommand>, backoff: Duration) -> bool {
    let deadline = Instant::now() + backoff;
    loop {
        match cmd_rx.recv_timeout(READ_TIMEOUT) {
            Ok(WsCommand::Close) | Err(RecvTimeoutError::Disconnected) => return true,
            Ok(WsCommand::Send(msg)) => {
                log::debug!("dropping frame queued while offline: {}", preview(&msg));
            }
            Err(RecvTimeoutError::Timeout) => {}
        }
        if Instant::now() >= deadline {
            return false;
        }
    }
}
