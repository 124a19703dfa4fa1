//! Relay server: accepts WebSocket peers and fans every application
//! message out to all other active peers.
//!
//! Startup is two-phase. [`RelayServer::bind`] acquires the listener and is
//! the only fallible step; [`RelayServer::start`] then spawns the accept
//! loop and hands back a [`RelayHandle`] for observation and shutdown. Each
//! accepted peer runs one task that both reads its socket and drains its
//! broadcast outbox, so no peer's slowness shares a failure domain with
//! another's.

mod event;
mod registry;

pub use event::{PeerState, RelayEvent};
pub use registry::{BroadcastOutcome, Outbound, PeerId, Registry};

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response,
};
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::traffic::{Direction, TransferObserver};

/// Frames a slow peer may have queued before drops start.
const OUTBOX_CAPACITY: usize = 64;

/// A bound but not yet accepting relay server.
pub struct RelayServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    registry: Arc<Registry>,
    observer: Arc<dyn TransferObserver>,
}

/// Handle to a running relay.
pub struct RelayHandle {
    local_addr: SocketAddr,
    registry: Arc<Registry>,
    shutdown: watch::Sender<bool>,
}

impl RelayServer {
    /// Bind the listener described by `config` and register the transfer
    /// observer invoked for every payload moved.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bind`] with the attempted address and the OS reason
    /// when the listener cannot be acquired. The server does not proceed to
    /// accepting in that case.
    pub async fn bind(config: &AppConfig, observer: Arc<dyn TransferObserver>) -> Result<Self> {
        let addr = config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| Error::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            local_addr,
            registry: Arc::new(Registry::new(OUTBOX_CAPACITY)),
            observer,
        })
    }

    /// Address the listener actually bound (resolves port 0).
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Begin accepting connections.
    pub fn start(self) -> RelayHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = RelayHandle {
            local_addr: self.local_addr,
            registry: self.registry.clone(),
            shutdown: shutdown_tx,
        };

        info!("relay listening on {}", self.local_addr);
        tokio::spawn(accept_loop(
            self.listener,
            self.registry,
            self.observer,
            shutdown_rx,
        ));

        handle
    }
}

impl RelayHandle {
    /// Address the relay is serving on.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of peers currently in the active set.
    #[must_use]
    pub fn active_peers(&self) -> usize {
        self.registry.len()
    }

    /// Stop accepting, close all active connections, and release the
    /// listener.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

async fn accept_loop(
    listener: TcpListener,
    registry: Arc<Registry>,
    observer: Arc<dyn TransferObserver>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => match result {
                Ok((stream, addr)) => {
                    let registry = registry.clone();
                    let observer = observer.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, addr, registry, observer).await {
                            debug!("connection from {} ended: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("failed to accept connection: {}", e);
                }
            },
            _ = shutdown_rx.changed() => {
                let drained = registry.drain();
                info!("relay shutting down, closed {} connections", drained);
                break;
            }
        }
    }
    // Listener drops here, releasing the port.
}

/// Classify one inbound transport message into a relay event.
fn classify(message: Message) -> Option<RelayEvent> {
    match message {
        Message::Text(text) => Some(RelayEvent::Message {
            payload: Bytes::from(text.into_bytes()),
            is_binary: false,
        }),
        Message::Binary(data) => Some(RelayEvent::Message {
            payload: Bytes::from(data),
            is_binary: true,
        }),
        Message::Close(_) => Some(RelayEvent::Close),
        // Ping/pong are transport housekeeping, not application events.
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => None,
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    registry: Arc<Registry>,
    observer: Arc<dyn TransferObserver>,
) -> Result<()> {
    // The upgrade callback is the only place the request is visible;
    // capture what the open event needs.
    let request_info: Arc<OnceLock<(String, Vec<(String, String)>)>> = Arc::new(OnceLock::new());
    let info_cell = request_info.clone();
    let ws_stream = tokio_tungstenite::accept_hdr_async(
        stream,
        move |req: &Request, resp: Response| -> std::result::Result<Response, ErrorResponse> {
            let headers = req
                .headers()
                .iter()
                .map(|(name, value)| {
                    (
                        name.to_string(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect();
            let _ = info_cell.set((req.uri().to_string(), headers));
            Ok(resp)
        },
    )
    .await
    .map_err(Error::Handshake)?;

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let (id, mut outbox_rx) = registry.register(addr);

    let (uri, headers) = request_info.get().cloned().unwrap_or_default();
    dispatch_event(
        id,
        addr,
        RelayEvent::Open { uri, headers },
        &registry,
        &observer,
    );

    loop {
        tokio::select! {
            inbound = ws_rx.next() => {
                let proceed = match inbound {
                    Some(Ok(message)) => match classify(message) {
                        Some(event) => dispatch_event(id, addr, event, &registry, &observer),
                        None => true,
                    },
                    Some(Err(e)) => {
                        debug!(peer = id, %addr, "read failed: {}", e);
                        false
                    }
                    None => false,
                };
                if !proceed {
                    break;
                }
            }
            frame = outbox_rx.recv() => match frame {
                Some(frame) => {
                    let bytes = frame.payload.len();
                    let message = if frame.is_binary {
                        Message::Binary(frame.payload.to_vec())
                    } else {
                        match String::from_utf8(frame.payload.to_vec()) {
                            Ok(text) => Message::Text(text),
                            Err(_) => {
                                debug!(peer = id, "dropping non-UTF-8 text frame");
                                continue;
                            }
                        }
                    };
                    match ws_tx.send(message).await {
                        Ok(()) => observer.on_transfer(bytes, Direction::Outgoing),
                        Err(e) => {
                            // Send failure affects this peer only.
                            warn!(peer = id, %addr, "delivery failed: {}", e);
                            break;
                        }
                    }
                }
                // Registry drained (server shutdown): say goodbye and stop.
                None => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    }

    registry.remove(id);
    Ok(())
}

/// Handle one classified event. Returns `false` when the connection should
/// stop reading.
fn dispatch_event(
    id: PeerId,
    addr: SocketAddr,
    event: RelayEvent,
    registry: &Registry,
    observer: &Arc<dyn TransferObserver>,
) -> bool {
    match event {
        RelayEvent::Open { uri, headers } => {
            info!("New connection");
            info!("Remote ip: {}", addr.ip());
            info!("Uri: {}", uri);
            info!("Headers:");
            for (name, value) in &headers {
                info!("{}: {}", name, value);
            }
            registry.mark_active(id);
            true
        }
        RelayEvent::Message { payload, is_binary } => {
            observer.on_transfer(payload.len(), Direction::Incoming);
            let outcome = registry.broadcast(id, payload, is_binary);
            if outcome.dropped > 0 {
                debug!(
                    peer = id,
                    delivered = outcome.delivered,
                    dropped = outcome.dropped,
                    "broadcast batch incomplete"
                );
            }
            true
        }
        RelayEvent::Close => {
            info!("Closed connection");
            // Leave the registry entry in Closed until the connection task
            // tears down; broadcasts already skip it.
            registry.mark_closed(id);
            false
        }
    }
}
