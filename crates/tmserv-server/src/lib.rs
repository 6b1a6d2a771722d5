//! Production game server runtime.
//!
//! The [`ServerDriver`] is pure logic: events in, actions out. This crate
//! root is the glue that feeds it from real sockets and executes its
//! actions with Tokio:
//!
//! - one task per connection reads the socket into a ring buffer, frames
//!   and deciphers packets, and hands them to the driver — per-session
//!   arrival order falls out of the single reader,
//! - one writer task per session drains a bounded outbound queue — per-
//!   session send order falls out of the single writer,
//! - a scheduler task pulses [`ServerEvent::Tick`],
//! - collaborator calls (auth, character store) run on the blocking pool
//!   and come back as events, which is what `Deferred` handlers wait for.

mod broadcast;
mod config;
mod dispatch;
mod driver;
mod error;
mod handlers;
mod registry;
mod services;
mod system_env;
mod transport;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

pub use broadcast::BroadcastRouter;
pub use config::{DriverConfig, PROTOCOL_VERSION, RuntimeConfig};
pub use dispatch::{DispatchTable, HandlerResult, build_table};
pub use driver::{DriverStats, LogLevel, ServerAction, ServerDriver, ServerEvent};
pub use error::ServerError;
pub use registry::{CharacterRecord, SessionEntry, SessionRegistry, TradeState};
pub use services::{
    AuthOutcome, AuthProvider, CharacterBlob, CharacterStore, CharacterSummary, MemoryAuth,
    MemoryCharacters,
};
pub use system_env::SystemEnv;
pub use transport::TcpTransport;

use tmserv_core::ring::RingBuffer;
use tmserv_proto::{Packet, PacketCipher, PacketHeader};
use tmserv_world::{DefaultResolver, SpawnGroupConfig, TemplateCatalog, World, WorldClock};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, Notify, RwLock, mpsc};

/// Outbound queue capacity per session.
const OUTBOUND_QUEUE_CAPACITY: usize = 4096;

/// Inbound ring capacity: two maximum packets, so one complete packet can
/// always be buffered alongside a partial successor.
const RECV_BUFFER_CAPACITY: usize = 2 * PacketHeader::MAX_PACKET_SIZE as usize;

/// Budget for a single outbound socket write during drain.
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

type SharedDriver = Arc<Mutex<ServerDriver<SystemEnv>>>;
type CipherSlot = Arc<StdMutex<Option<PacketCipher>>>;

enum Outbound {
    Packet(Packet),
    Shutdown,
}

struct SessionHandle {
    outbound: mpsc::Sender<Outbound>,
    tx_cipher: CipherSlot,
    rx_cipher: CipherSlot,
    close: Arc<Notify>,
}

struct Shared {
    sessions: RwLock<HashMap<u32, SessionHandle>>,
    auth: Arc<dyn AuthProvider>,
    characters: Arc<dyn CharacterStore>,
}

/// Production server: driver + TCP runtime.
pub struct Server {
    driver: SharedDriver,
    transport: TcpTransport,
    shared: Arc<Shared>,
    tick_ms: u64,
}

impl Server {
    /// Load catalogs, build the world and bind the listener.
    pub async fn bind(
        config: RuntimeConfig,
        auth: Arc<dyn AuthProvider>,
        characters: Arc<dyn CharacterStore>,
    ) -> Result<Self, ServerError> {
        let catalog = match &config.mob_templates_path {
            Some(path) => TemplateCatalog::load(Path::new(path))?,
            None => TemplateCatalog::default(),
        };
        let groups: Vec<SpawnGroupConfig> = match &config.spawn_config_path {
            Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)
                .map_err(|e| ServerError::Config(format!("bad spawn config: {e}")))?,
            None => Vec::new(),
        };

        let world = World::new(catalog, groups, WorldClock::default());
        let env = SystemEnv::new();
        let driver =
            ServerDriver::new(env, config.driver.clone(), world, Box::new(DefaultResolver));
        let transport = TcpTransport::bind(&config.bind_address).await?;

        Ok(Self {
            driver: Arc::new(Mutex::new(driver)),
            transport,
            shared: Arc::new(Shared {
                sessions: RwLock::new(HashMap::new()),
                auth,
                characters,
            }),
            tick_ms: config.driver.tick_ms,
        })
    }

    /// Local address the server listens on.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.transport.local_addr()
    }

    /// Accept connections and run until the process is stopped.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("server listening on {}", self.local_addr()?);

        // Scheduler task: fixed-cadence tick events. Drift and skipped
        // targets are the driver clock's problem, not the interval's.
        {
            let driver = Arc::clone(&self.driver);
            let shared = Arc::clone(&self.shared);
            let tick_ms = self.tick_ms;
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_millis(tick_ms));
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    interval.tick().await;
                    dispatch_event(&driver, &shared, ServerEvent::Tick).await;
                }
            });
        }

        let next_session_id = AtomicU32::new(1);
        loop {
            match self.transport.accept().await {
                Ok((stream, peer)) => {
                    let session_id = next_session_id.fetch_add(1, Ordering::Relaxed);
                    let driver = Arc::clone(&self.driver);
                    let shared = Arc::clone(&self.shared);

                    tokio::spawn(async move {
                        handle_connection(stream, peer, session_id, driver, shared).await;
                    });
                },
                Err(e) => {
                    tracing::error!("accept error: {e}");
                },
            }
        }
    }
}

/// Own one connection from accept to teardown.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    session_id: u32,
    driver: SharedDriver,
    shared: Arc<Shared>,
) {
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
    let tx_cipher: CipherSlot = Arc::new(StdMutex::new(None));
    let rx_cipher: CipherSlot = Arc::new(StdMutex::new(None));
    let close = Arc::new(Notify::new());

    {
        let mut sessions = shared.sessions.write().await;
        sessions.insert(session_id, SessionHandle {
            outbound: outbound_tx,
            tx_cipher: Arc::clone(&tx_cipher),
            rx_cipher: Arc::clone(&rx_cipher),
            close: Arc::clone(&close),
        });
    }

    dispatch_event(&driver, &shared, ServerEvent::ConnectionAccepted { session_id, peer }).await;

    let (read_half, write_half) = stream.into_split();
    let writer = tokio::spawn(write_loop(write_half, outbound_rx, tx_cipher));

    read_loop(read_half, session_id, &driver, &shared, &rx_cipher, &close).await;

    {
        let mut sessions = shared.sessions.write().await;
        sessions.remove(&session_id);
    }
    dispatch_event(&driver, &shared, ServerEvent::ConnectionClosed { session_id }).await;

    let _ = writer.await;
    tracing::debug!("connection task for session {session_id} finished");
}

/// Read, frame and decipher inbound packets until the socket or session
/// dies.
async fn read_loop(
    mut read_half: OwnedReadHalf,
    session_id: u32,
    driver: &SharedDriver,
    shared: &Arc<Shared>,
    rx_cipher: &CipherSlot,
    close: &Arc<Notify>,
) {
    let mut ring = RingBuffer::new(RECV_BUFFER_CAPACITY);

    loop {
        let spare = ring.spare_mut();
        if spare.is_empty() {
            // Cannot happen while framing keeps up (capacity is twice the
            // packet limit), but never spin on a full buffer.
            tracing::warn!("session {session_id}: receive buffer full");
            break;
        }

        let n = tokio::select! {
            result = read_half.read(spare) => match result {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    tracing::debug!("session {session_id}: read error: {e}");
                    break;
                },
            },
            () = close.notified() => break,
        };
        ring.commit(n);

        loop {
            let mut header_buf = [0u8; PacketHeader::SIZE];
            if ring.peek(&mut header_buf) < PacketHeader::SIZE {
                break;
            }

            let size = match PacketHeader::from_prefix(&header_buf) {
                Ok(header) => header.size() as usize,
                Err(error) => {
                    dispatch_event(driver, shared, ServerEvent::FramingFailed {
                        session_id,
                        error,
                    })
                    .await;
                    return;
                },
            };
            if ring.len() < size {
                break;
            }

            let mut wire = vec![0u8; size];
            ring.read(&mut wire);

            match Packet::decode(&wire) {
                Ok(packet) => {
                    let packet = decipher(packet, rx_cipher);
                    dispatch_event(driver, shared, ServerEvent::PacketReceived {
                        session_id,
                        packet,
                    })
                    .await;
                },
                Err(error) => {
                    dispatch_event(driver, shared, ServerEvent::FramingFailed {
                        session_id,
                        error,
                    })
                    .await;
                    return;
                },
            }
        }
    }
}

/// Drain the outbound queue to the socket, ciphering payloads.
async fn write_loop(
    mut write_half: OwnedWriteHalf,
    mut outbound_rx: mpsc::Receiver<Outbound>,
    tx_cipher: CipherSlot,
) {
    while let Some(outbound) = outbound_rx.recv().await {
        match outbound {
            Outbound::Packet(packet) => {
                let bytes = encipher(packet, &tx_cipher).encode_to_vec();
                match tokio::time::timeout(WRITE_TIMEOUT, write_half.write_all(&bytes)).await {
                    Ok(Ok(())) => {},
                    Ok(Err(e)) => {
                        tracing::debug!("write error: {e}");
                        break;
                    },
                    Err(_) => {
                        tracing::debug!("write timed out during drain");
                        break;
                    },
                }
            },
            Outbound::Shutdown => {
                let _ = write_half.shutdown().await;
                break;
            },
        }
    }
}

/// Apply the receive cipher to a framed packet's payload.
fn decipher(packet: Packet, slot: &CipherSlot) -> Packet {
    let Ok(mut guard) = slot.lock() else { return packet };
    let Some(cipher) = guard.as_mut() else { return packet };

    let mut payload = packet.payload.to_vec();
    cipher.decode(&mut payload);
    Packet::new(packet.opcode(), packet.header.client_id(), payload)
}

/// Apply the send cipher to an outbound packet's payload.
fn encipher(packet: Packet, slot: &CipherSlot) -> Packet {
    let Ok(mut guard) = slot.lock() else { return packet };
    let Some(cipher) = guard.as_mut() else { return packet };

    let mut payload = packet.payload.to_vec();
    cipher.encode(&mut payload);
    Packet::new(packet.opcode(), packet.header.client_id(), payload)
}

/// Feed one event through the driver and execute the resulting actions.
fn dispatch_event<'a>(
    driver: &'a SharedDriver,
    shared: &'a Arc<Shared>,
    event: ServerEvent,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
    Box::pin(async move {
        let actions = {
            let mut driver = driver.lock().await;
            match driver.process_event(event) {
                Ok(actions) => actions,
                Err(e) => {
                    tracing::error!("driver error: {e}");
                    return;
                },
            }
        };
        execute_actions(driver, shared, actions).await;
    })
}

/// Execute driver actions against the runtime state.
async fn execute_actions(driver: &SharedDriver, shared: &Arc<Shared>, actions: Vec<ServerAction>) {
    for action in actions {
        match action {
            ServerAction::Send { session_id, packet } => {
                let sender = {
                    let sessions = shared.sessions.read().await;
                    sessions.get(&session_id).map(|h| h.outbound.clone())
                };
                let Some(sender) = sender else { continue };

                if sender.try_send(Outbound::Packet(packet)).is_err() {
                    tracing::warn!("session {session_id}: outbound queue overflow");
                    let driver = Arc::clone(driver);
                    let shared = Arc::clone(shared);
                    tokio::spawn(async move {
                        dispatch_event(&driver, &shared, ServerEvent::OutboundOverflow {
                            session_id,
                        })
                        .await;
                    });
                }
            },

            ServerAction::EnableCipher { session_id, key, seed } => {
                let sessions = shared.sessions.read().await;
                if let Some(handle) = sessions.get(&session_id) {
                    if let Ok(mut slot) = handle.tx_cipher.lock() {
                        *slot = Some(PacketCipher::new(key, seed));
                    }
                    if let Ok(mut slot) = handle.rx_cipher.lock() {
                        *slot = Some(PacketCipher::new(key, seed));
                    }
                }
            },

            ServerAction::Close { session_id, reason } => {
                tracing::info!("closing session {session_id}: {reason}");
                let sessions = shared.sessions.read().await;
                if let Some(handle) = sessions.get(&session_id) {
                    // Queued packets drain ahead of the shutdown marker;
                    // the reader stops immediately.
                    let _ = handle.outbound.try_send(Outbound::Shutdown);
                    handle.close.notify_waiters();
                }
            },

            ServerAction::Authenticate { session_id, account, password } => {
                let auth = Arc::clone(&shared.auth);
                let characters = Arc::clone(&shared.characters);
                let driver = Arc::clone(driver);
                let shared = Arc::clone(shared);

                tokio::spawn(async move {
                    let account_for_task = account.clone();
                    let result = tokio::task::spawn_blocking(move || {
                        let outcome = auth.verify(&account_for_task, &password);
                        let roster = match &outcome {
                            AuthOutcome::Ok { account_id, .. } => characters.list(*account_id),
                            _ => Vec::new(),
                        };
                        (outcome, roster)
                    })
                    .await;

                    let Ok((outcome, roster)) = result else {
                        tracing::error!("auth task panicked for session {session_id}");
                        return;
                    };
                    dispatch_event(&driver, &shared, ServerEvent::AuthCompleted {
                        session_id,
                        account,
                        outcome,
                        roster,
                    })
                    .await;
                });
            },

            ServerAction::LoadCharacter { session_id, account_id, name } => {
                let characters = Arc::clone(&shared.characters);
                let driver = Arc::clone(driver);
                let shared = Arc::clone(shared);

                tokio::spawn(async move {
                    let result =
                        tokio::task::spawn_blocking(move || characters.load(account_id, &name))
                            .await;

                    let Ok(character) = result else {
                        tracing::error!("character load panicked for session {session_id}");
                        return;
                    };
                    dispatch_event(&driver, &shared, ServerEvent::CharacterLoaded {
                        session_id,
                        character,
                    })
                    .await;
                });
            },

            ServerAction::SaveCharacter { account_id, blob } => {
                let characters = Arc::clone(&shared.characters);
                tokio::spawn(async move {
                    let _ = tokio::task::spawn_blocking(move || {
                        characters.save(account_id, &blob);
                    })
                    .await;
                });
            },

            ServerAction::Log { level, message } => match level {
                LogLevel::Debug => tracing::debug!("{message}"),
                LogLevel::Info => tracing::info!("{message}"),
                LogLevel::Warn => tracing::warn!("{message}"),
                LogLevel::Error => tracing::error!("{message}"),
            },
        }
    }
}
