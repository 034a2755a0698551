//! Event Channel client for native platforms.
//!
//! The socket lives on a background thread so the caller's event loop never
//! blocks on the network. Commands go in over one channel and
//! [`ChannelEvent`]s come back over another, drained by
//! [`ChannelClient::poll_events`].

use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;
use tungstenite::{Message, connect};
use url::Url;

use crate::protocol::{ClientMessage, ProtocolError, ServerMessage};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Events from the channel thread
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    Connected,
    Disconnected,
    Message(ServerMessage),
    Error { message: String },
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Invalid WebSocket URL scheme: {0}")]
    UnsupportedScheme(String),
    #[error("Already connected")]
    AlreadyConnected,
    #[error("Not connected")]
    NotConnected,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Build the channel URL, attaching the bearer token as a query parameter.
pub fn channel_url(base: &str, token: Option<&str>) -> Result<Url, ChannelError> {
    let mut url = Url::parse(base)?;
    if url.scheme() != "ws" && url.scheme() != "wss" {
        return Err(ChannelError::UnsupportedScheme(url.scheme().to_string()));
    }
    if let Some(token) = token {
        url.query_pairs_mut().append_pair("token", token);
    }
    Ok(url)
}

/// Commands sent to the socket thread.
enum Command {
    Send(String),
    Close,
}

/// Background-thread WebSocket client speaking the Event Channel protocol.
pub struct ChannelClient {
    state: ConnectionState,
    cmd_tx: Option<Sender<Command>>,
    event_rx: Option<Receiver<ChannelEvent>>,
    _thread: Option<JoinHandle<()>>,
}

impl ChannelClient {
    /// Create a new disconnected client.
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            cmd_tx: None,
            event_rx: None,
            _thread: None,
        }
    }

    /// Connect to the relay at `url`, authenticating with `token` if given.
    pub fn connect(&mut self, url: &str, token: Option<&str>) -> Result<(), ChannelError> {
        if self.cmd_tx.is_some() {
            return Err(ChannelError::AlreadyConnected);
        }
        let url = channel_url(url, token)?;

        self.state = ConnectionState::Connecting;

        let (cmd_tx, cmd_rx) = channel::<Command>();
        let (event_tx, event_rx) = channel::<ChannelEvent>();

        let handle = thread::spawn(move || run_socket(url, cmd_rx, event_tx));

        self.cmd_tx = Some(cmd_tx);
        self.event_rx = Some(event_rx);
        self._thread = Some(handle);
        Ok(())
    }

    /// Disconnect from the relay.
    pub fn disconnect(&mut self) {
        if let Some(tx) = self.cmd_tx.take() {
            let _ = tx.send(Command::Close);
        }
        self.event_rx = None;
        self._thread = None;
        self.state = ConnectionState::Disconnected;
    }

    /// Queue one message for sending.
    pub fn send(&self, msg: &ClientMessage) -> Result<(), ChannelError> {
        let tx = self.cmd_tx.as_ref().ok_or(ChannelError::NotConnected)?;
        tx.send(Command::Send(msg.to_json()?))
            .map_err(|_| ChannelError::NotConnected)
    }

    /// Queue several messages in order, stopping at the first failure.
    pub fn send_all(&self, msgs: impl IntoIterator<Item = ClientMessage>) -> Result<(), ChannelError> {
        for msg in msgs {
            self.send(&msg)?;
        }
        Ok(())
    }

    /// Poll for pending events (non-blocking).
    pub fn poll_events(&mut self) -> Vec<ChannelEvent> {
        let mut events = Vec::new();
        if let Some(ref rx) = self.event_rx {
            while let Ok(event) = rx.try_recv() {
                match &event {
                    ChannelEvent::Connected => self.state = ConnectionState::Connected,
                    ChannelEvent::Disconnected => self.state = ConnectionState::Disconnected,
                    ChannelEvent::Error { .. } => self.state = ConnectionState::Error,
                    ChannelEvent::Message(_) => {}
                }
                events.push(event);
            }
        }
        events
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

impl Default for ChannelClient {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ChannelClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn run_socket(url: Url, cmd_rx: Receiver<Command>, event_tx: Sender<ChannelEvent>) {
    log::info!("Channel thread: connecting to {}", url.host_str().unwrap_or("?"));

    let (mut socket, response) = match connect(url.as_str()) {
        Ok(pair) => pair,
        Err(e) => {
            log::error!("Channel connection failed: {}", e);
            let _ = event_tx.send(ChannelEvent::Error {
                message: format!("Connection failed: {}", e),
            });
            return;
        }
    };
    log::info!("Channel connected, status: {}", response.status());
    let _ = event_tx.send(ChannelEvent::Connected);

    // Short read timeout so the loop can service outgoing commands.
    match socket.get_mut() {
        tungstenite::stream::MaybeTlsStream::Plain(tcp) => {
            let _ = tcp.set_read_timeout(Some(Duration::from_millis(50)));
            let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
        }
        #[allow(unreachable_patterns)]
        _ => log::debug!("TLS or other stream - using default timeout handling"),
    }

    'session: loop {
        // Drain every queued command before blocking on the next read.
        let mut queued = 0usize;
        loop {
            match cmd_rx.try_recv() {
                Ok(Command::Send(msg)) => {
                    if let Err(e) = socket.write(Message::Text(msg)) {
                        log::error!("Channel send error: {}", e);
                        break 'session;
                    }
                    queued += 1;
                }
                Ok(Command::Close) => {
                    log::info!("Channel close requested");
                    let _ = socket.close(None);
                    break 'session;
                }
                Err(TryRecvError::Disconnected) => {
                    log::info!("Channel command queue dropped");
                    break 'session;
                }
                Err(TryRecvError::Empty) => break,
            }
        }
        if queued > 0 {
            if let Err(e) = socket.flush() {
                log::error!("Channel flush error: {}", e);
                break;
            }
        }

        match socket.read() {
            Ok(Message::Text(txt)) => match ServerMessage::from_json(&txt) {
                Ok(msg) => {
                    let _ = event_tx.send(ChannelEvent::Message(msg));
                }
                // Dropped events are not retried.
                Err(e) => log::warn!("Failed to parse server message: {}", e),
            },
            Ok(Message::Ping(data)) => {
                let _ = socket.send(Message::Pong(data));
            }
            Ok(Message::Close(_)) => {
                log::info!("Channel received close frame");
                break;
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(ref e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(e) => {
                log::error!("Channel read error: {}", e);
                break;
            }
        }
    }

    log::info!("Channel thread exiting");
    let _ = event_tx.send(ChannelEvent::Disconnected);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::time::Instant;

    #[test]
    fn test_channel_url_appends_token() {
        let url = channel_url("ws://localhost:3030/ws", Some("s3cret")).unwrap();
        assert_eq!(url.as_str(), "ws://localhost:3030/ws?token=s3cret");

        let url = channel_url("wss://example.com/ws", None).unwrap();
        assert!(url.query().is_none());
    }

    #[test]
    fn test_channel_url_rejects_non_websocket() {
        assert!(matches!(
            channel_url("http://localhost/ws", None),
            Err(ChannelError::UnsupportedScheme(s)) if s == "http"
        ));
        assert!(matches!(
            channel_url("not a url", None),
            Err(ChannelError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_send_requires_connection() {
        let client = ChannelClient::new();
        assert!(matches!(
            client.send(&ClientMessage::ClearAll),
            Err(ChannelError::NotConnected)
        ));
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_exchange_with_relay() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut ws = tungstenite::accept(stream).unwrap();
            let hello = ServerMessage::Error {
                message: "hello".into(),
            };
            ws.send(Message::Text(hello.to_json().unwrap())).unwrap();
            loop {
                if let Message::Text(txt) = ws.read().unwrap() {
                    return txt;
                }
            }
        });

        let mut client = ChannelClient::new();
        client.connect(&format!("ws://{addr}/ws"), Some("t")).unwrap();
        assert!(matches!(
            client.connect(&format!("ws://{addr}/ws"), None),
            Err(ChannelError::AlreadyConnected)
        ));

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut received = None;
        while received.is_none() && Instant::now() < deadline {
            for event in client.poll_events() {
                if let ChannelEvent::Message(msg) = event {
                    received = Some(msg);
                }
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert!(client.is_connected());
        assert_eq!(
            received,
            Some(ServerMessage::Error {
                message: "hello".into()
            })
        );

        client.send(&ClientMessage::ClearAll).unwrap();
        assert_eq!(server.join().unwrap(), r#"{"type":"clearAll"}"#);
    }

    #[test]
    fn test_queued_sends_flush_without_waiting_on_reads() {
        const QUEUED: usize = 100;
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        // Never writes, so every client read runs into its timeout.
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut ws = tungstenite::accept(stream).unwrap();
            let started = Instant::now();
            let mut count = 0;
            while count < QUEUED {
                if let Message::Text(_) = ws.read().unwrap() {
                    count += 1;
                }
            }
            started.elapsed()
        });

        let mut client = ChannelClient::new();
        client.connect(&format!("ws://{addr}/ws"), None).unwrap();
        for _ in 0..QUEUED {
            client.send(&ClientMessage::ClearAll).unwrap();
        }

        let elapsed = server.join().unwrap();
        assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");
        client.disconnect();
    }
}
