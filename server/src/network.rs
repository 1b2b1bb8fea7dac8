//! Server network layer: TCP accept loop, per-connection request handling and
//! the optional eviction sweeper.

use crate::client_manager::ClientManager;
use crate::config::ServerConfig;
use crate::registry::PlayerRegistry;
use log::{debug, error, info, warn};
use shared::framing::{
    encode_frame, read_packet_limited, write_frame, write_packet, MAX_REQUEST_SIZE,
};
use shared::{Packet, PlayerId, SyncError, PROTOCOL_VERSION};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, RwLock};

/// Request dispatch shared by every connection task.
///
/// Lock order is always `clients` before the registry's internal mutex.
pub struct SyncService {
    registry: Arc<PlayerRegistry>,
    clients: RwLock<ClientManager>,
    config: ServerConfig,
}

impl SyncService {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            registry: Arc::new(PlayerRegistry::new()),
            clients: RwLock::new(ClientManager::new(config.max_clients)),
            config,
        }
    }

    pub fn registry(&self) -> Arc<PlayerRegistry> {
        Arc::clone(&self.registry)
    }

    /// Registers a new connection. None if the server is full.
    pub async fn open_client(&self, addr: SocketAddr) -> Option<u64> {
        self.clients.write().await.add_client(addr)
    }

    /// Forgets a connection, evicting its player when configured to and no
    /// other connection has claimed the same player since.
    pub async fn close_client(&self, client_id: u64) {
        let mut clients = self.clients.write().await;
        let Some(client) = clients.remove_client(client_id) else {
            return;
        };

        if !self.config.evict_on_disconnect {
            return;
        }
        if let Some(player_id) = client.player_id {
            if clients.find_client_by_player(&player_id).is_none() {
                self.registry.remove(&player_id).await;
            }
        }
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Answers one request. Every outcome, refusals included, is a response
    /// packet; nothing here can fail the connection.
    pub async fn handle_packet(&self, client_id: u64, packet: Packet) -> Packet {
        debug!("Client {} sent {}", client_id, packet.kind());
        self.clients.write().await.touch(client_id);

        match packet {
            Packet::Connect {
                protocol_version,
                player,
            } => {
                if protocol_version != PROTOCOL_VERSION {
                    warn!(
                        "Client {} speaks protocol {}, expected {}",
                        client_id, protocol_version, PROTOCOL_VERSION
                    );
                    return Packet::rejected(format!(
                        "unsupported protocol version {} (server speaks {})",
                        protocol_version, PROTOCOL_VERSION
                    ));
                }

                let mut clients = self.clients.write().await;
                if self.config.strict_sessions {
                    if player.id.is_nil() {
                        return Packet::rejected("nil player id");
                    }
                    if let Some(owner) = clients.find_client_by_player(&player.id) {
                        if owner != client_id {
                            warn!(
                                "Client {} tried to claim player {} owned by client {}",
                                client_id, player.id, owner
                            );
                            return Packet::rejected(format!(
                                "player {} is bound to another connection",
                                player.id
                            ));
                        }
                    }
                }

                let roster = self.registry.connect(player).await;
                clients.bind_player(client_id, player.id);
                Packet::Roster { roster }
            }

            Packet::Sync { player } => {
                if let Err(reason) = self.check_bound(client_id, &player.id).await {
                    return Packet::rejected(reason);
                }
                let roster = self.registry.sync(player).await;
                Packet::Roster { roster }
            }

            Packet::Disconnect { player_id } => {
                if let Err(reason) = self.check_bound(client_id, &player_id).await {
                    return Packet::rejected(reason);
                }
                let mut clients = self.clients.write().await;
                self.registry.remove(&player_id).await;
                clients.unbind_player(client_id, &player_id);
                Packet::Disconnected { player_id }
            }

            other => {
                warn!(
                    "Unexpected {} packet from client {}",
                    other.kind(),
                    client_id
                );
                Packet::rejected(format!("{} is not a request", other.kind()))
            }
        }
    }

    /// With strict sessions, a connection may only act for the player it
    /// connected as.
    async fn check_bound(&self, client_id: u64, claimed: &PlayerId) -> Result<(), String> {
        if !self.config.strict_sessions {
            return Ok(());
        }

        match self.clients.read().await.player_for(client_id) {
            Some(bound) if bound == *claimed => Ok(()),
            Some(bound) => {
                warn!(
                    "Client {} bound to {} sent a request for {}",
                    client_id, bound, claimed
                );
                Err(format!("connection is bound to player {}", bound))
            }
            None => Err("request before connect".to_string()),
        }
    }
}

/// Frames a response. One that cannot be framed is replaced by a `Rejected`
/// so the peer gets an answer instead of a closed connection.
fn response_frame(response: &Packet) -> Result<Vec<u8>, SyncError> {
    encode_frame(response).or_else(|e| {
        error!("Cannot send {} response: {}", response.kind(), e);
        encode_frame(&Packet::rejected(format!(
            "{} response cannot be sent: {}",
            response.kind(),
            e
        )))
    })
}

/// TCP front end for a `SyncService`.
pub struct Server {
    listener: TcpListener,
    service: Arc<SyncService>,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(&config.addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            service: Arc::new(SyncService::new(config)),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn service(&self) -> Arc<SyncService> {
        Arc::clone(&self.service)
    }

    /// Serves until the process is stopped.
    pub async fn run(self) {
        self.run_until(std::future::pending()).await
    }

    /// Serves until `shutdown` completes, then closes the listener and every
    /// open connection.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        if let Some(ttl) = self.service.config.player_ttl {
            self.spawn_eviction_sweeper(ttl, shutdown_rx.clone());
        }

        info!("Server started successfully");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            self.spawn_connection(stream, addr, shutdown_rx.clone());
                        }
                        Err(e) => {
                            error!("Error accepting connection: {}", e);
                            tokio::time::sleep(Duration::from_millis(10)).await;
                        }
                    }
                },
                _ = &mut shutdown => {
                    info!("Server shutting down");
                    break;
                },
            }
        }

        let _ = shutdown_tx.send(true);
    }

    /// Spawns the task serving one connection, strictly one request then one
    /// response at a time.
    fn spawn_connection(
        &self,
        mut stream: TcpStream,
        addr: SocketAddr,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let service = Arc::clone(&self.service);

        tokio::spawn(async move {
            if let Err(e) = stream.set_nodelay(true) {
                debug!("Could not disable Nagle for {}: {}", addr, e);
            }

            let Some(client_id) = service.open_client(addr).await else {
                warn!("Rejecting connection from {}: server full", addr);
                // Answer the first request so the peer sees a refusal rather
                // than a reset.
                tokio::select! {
                    request = read_packet_limited(&mut stream, MAX_REQUEST_SIZE) => {
                        if request.is_ok() {
                            let _ = write_packet(&mut stream, &Packet::rejected("Server full")).await;
                        }
                    },
                    _ = shutdown.changed() => {},
                }
                return;
            };

            loop {
                let request = tokio::select! {
                    result = read_packet_limited(&mut stream, MAX_REQUEST_SIZE) => result,
                    _ = shutdown.changed() => break,
                };

                match request {
                    Ok(packet) => {
                        let response = service.handle_packet(client_id, packet).await;
                        let written = match response_frame(&response) {
                            Ok(frame) => write_frame(&mut stream, &frame).await,
                            Err(e) => Err(e),
                        };
                        if let Err(e) = written {
                            warn!("Failed to answer client {}: {}", client_id, e);
                            break;
                        }
                    }
                    Err(e) if e.is_closed() => break,
                    Err(e) => {
                        warn!("Dropping client {}: {}", client_id, e);
                        break;
                    }
                }
            }

            service.close_client(client_id).await;
        });
    }

    /// Spawns the task that periodically evicts players silent for longer
    /// than `ttl`.
    fn spawn_eviction_sweeper(&self, ttl: Duration, mut shutdown: watch::Receiver<bool>) {
        let registry = self.service.registry();
        let period = self.service.config.sweep_interval;
        info!("Evicting players idle for more than {:?}", ttl);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let evicted = registry.evict_stale(ttl).await;
                        if !evicted.is_empty() {
                            debug!("Sweep evicted {} players", evicted.len());
                        }
                    },
                    _ = shutdown.changed() => break,
                }
            }
        });
    }
}
