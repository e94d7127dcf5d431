//! WebSocket client for the tracking service

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::connection::Emitter;
use crate::error::ConnectionError;
use crate::protocol::{ClientEvent, Frame, Framing};
use crate::session::SessionEvent;

/// Frames queued for the connection task
#[derive(Debug)]
enum Outbound {
    Event(ClientEvent),
    Close,
}

/// Connection statistics
#[derive(Debug, Clone, Default)]
pub struct ConnectionStats {
    pub frames_received: u64,
    pub frames_sent: u64,
    pub invalid_frames: u64,
}

struct Shared {
    connected: AtomicBool,
    stats: Mutex<ConnectionStats>,
}

/// Persistent connection to the tracking backend
///
/// `connect` returns immediately; the handshake and all traffic happen on a
/// background task that reports back through [`SessionEvent`]s. With
/// Socket.IO framing the link only counts as connected once the default
/// namespace has been joined.
#[derive(Clone)]
pub struct ConnectionManager {
    framing: Framing,
    shared: Arc<Shared>,
    outbound: Arc<Mutex<Option<mpsc::UnboundedSender<Outbound>>>>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl ConnectionManager {
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            shared: Arc::new(Shared {
                connected: AtomicBool::new(false),
                stats: Mutex::new(ConnectionStats::default()),
            }),
            outbound: Arc::new(Mutex::new(None)),
            task: Arc::new(Mutex::new(None)),
        }
    }

    /// Start connecting to `endpoint`. Must be called inside a tokio runtime.
    pub fn connect(
        &self,
        endpoint: &str,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<(), ConnectionError> {
        if !(endpoint.starts_with("ws://") || endpoint.starts_with("wss://")) {
            return Err(ConnectionError::InvalidEndpoint(endpoint.to_string()));
        }

        // Replace any previous connection
        self.close();
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *self.outbound.lock() = Some(tx);

        let shared = self.shared.clone();
        let endpoint = endpoint.to_string();
        let handle = tokio::spawn(run_connection(endpoint, self.framing, rx, events, shared));
        *self.task.lock() = Some(handle);

        Ok(())
    }

    pub fn stats(&self) -> ConnectionStats {
        self.shared.stats.lock().clone()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new(Framing::default())
    }
}

impl Emitter for ConnectionManager {
    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    fn emit(&self, event: ClientEvent) -> Result<(), ConnectionError> {
        if !self.is_connected() {
            return Err(ConnectionError::NotConnected);
        }
        let guard = self.outbound.lock();
        let tx = guard.as_ref().ok_or(ConnectionError::NotConnected)?;
        tx.send(Outbound::Event(event))
            .map_err(|_| ConnectionError::NotConnected)?;
        tracing::debug!("Queued {}", event.name());
        Ok(())
    }

    fn close(&self) {
        if let Some(tx) = self.outbound.lock().take() {
            let _ = tx.send(Outbound::Close);
        }
    }
}

async fn run_connection(
    endpoint: String,
    framing: Framing,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::Sender<SessionEvent>,
    shared: Arc<Shared>,
) {
    tracing::info!("Connecting to tracking server at {}", endpoint);

    let ws_stream = match connect_async(endpoint.as_str()).await {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            tracing::warn!("{}", ConnectionError::ConnectionFailed(format!("{}: {}", endpoint, e)));
            let _ = events.send(SessionEvent::ConnectionClosed).await;
            return;
        }
    };

    let (mut write, mut read) = ws_stream.split();

    // Plain JSON needs no namespace handshake
    if framing.connect_packet().is_none() && !mark_connected(&shared, &events).await {
        return;
    }

    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    shared.stats.lock().frames_received += 1;
                    match framing.decode(&text) {
                        Ok(Frame::Open) => {
                            if let Some(packet) = framing.connect_packet() {
                                if write.send(Message::Text(packet.to_string())).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Ok(Frame::Connected) => {
                            if !mark_connected(&shared, &events).await {
                                break;
                            }
                        }
                        Ok(Frame::Ping(payload)) => {
                            if write.send(Message::Text(framing.pong(&payload))).await.is_err() {
                                break;
                            }
                        }
                        Ok(Frame::Closed) => {
                            tracing::info!("Server requested disconnect");
                            break;
                        }
                        Ok(Frame::Event(event)) => {
                            if let Some(event) = SessionEvent::from_server(event) {
                                if events.send(event).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Ok(Frame::Pong) | Ok(Frame::Ignored) => {}
                        Err(e) => {
                            shared.stats.lock().invalid_frames += 1;
                            tracing::warn!("Dropping frame: {}", e);
                        }
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!("Server closed connection: {:?}", frame);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!("Connection error: {}", e);
                    break;
                }
                None => break,
            },
            command = outbound.recv() => match command {
                Some(Outbound::Event(event)) => {
                    if let Err(e) = write.send(Message::Text(framing.encode(event))).await {
                        tracing::warn!("Failed to send {}: {}", event.name(), e);
                        break;
                    }
                    shared.stats.lock().frames_sent += 1;
                }
                Some(Outbound::Close) | None => {
                    if let Some(packet) = framing.disconnect_packet() {
                        let _ = write.send(Message::Text(packet.to_string())).await;
                    }
                    let _ = write.send(Message::Close(None)).await;
                    tracing::info!("Closed connection to tracking server");
                    break;
                }
            },
        }
    }

    shared.connected.store(false, Ordering::SeqCst);
    let _ = events.send(SessionEvent::ConnectionClosed).await;
}

/// Flag the link usable and tell the session; false if the session is gone
async fn mark_connected(shared: &Shared, events: &mpsc::Sender<SessionEvent>) -> bool {
    if shared.connected.swap(true, Ordering::SeqCst) {
        return true;
    }
    tracing::info!("Connected to tracking server");
    if events.send(SessionEvent::ConnectionOpened).await.is_err() {
        shared.connected.store(false, Ordering::SeqCst);
        return false;
    }
    true
}
