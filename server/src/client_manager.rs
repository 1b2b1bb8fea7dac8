//! Connection tracking for the sync server
//!
//! This module handles the server-side bookkeeping of connected clients:
//! - Connection lifecycle (accept, bind to a player, close)
//! - Capacity enforcement for concurrent connections
//! - Activity timestamps and per-connection call counts for monitoring
//!
//! Player state itself lives in the `PlayerRegistry`; a `Client` only records
//! which player, if any, its connection has claimed through `Connect`.

use log::info;
use shared::PlayerId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// One live TCP connection.
///
/// Each client records:
/// - Connection metadata (ID, peer address, last activity)
/// - The player its connection is bound to, once `Connect` succeeds
/// - How many requests it has had answered
#[derive(Debug)]
pub struct Client {
    /// Server-assigned connection id
    pub id: u64,
    /// Peer address, for logging
    pub addr: SocketAddr,
    /// Last time a request arrived on this connection
    pub last_seen: Instant,
    /// Player claimed by a successful `Connect`
    pub player_id: Option<PlayerId>,
    /// Requests served so far
    pub calls: u64,
}

impl Client {
    /// Creates a client for a freshly accepted connection
    ///
    /// The client starts unbound, with no calls served, and counts as
    /// active as of now.
    pub fn new(id: u64, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            player_id: None,
            calls: 0,
        }
    }

    /// Records one served request
    ///
    /// Refreshes the activity timestamp and bumps the call counter.
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
        self.calls += 1;
    }

    /// Time since the last request on this connection, or since it was
    /// accepted if it has not sent one yet.
    pub fn idle_for(&self) -> Duration {
        self.last_seen.elapsed()
    }
}

/// Manages all live connections and their session bindings
///
/// The ClientManager is the server's view of who is connected: it hands out
/// connection ids, enforces the optional connection cap and remembers which
/// player each connection has claimed. Strict sessions and eviction on
/// disconnect both rely on those bindings.
///
/// Connection ids start from 1 and are never reused within a server run.
pub struct ClientManager {
    /// Live connections indexed by id
    clients: HashMap<u64, Client>,
    /// Next id to hand out
    next_client_id: u64,
    /// Maximum concurrent connections; `None` means no cap
    max_clients: Option<usize>,
}

impl ClientManager {
    /// Creates an empty manager with an optional connection cap
    pub fn new(max_clients: Option<usize>) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Attempts to register a new connection
    ///
    /// Returns Some(client_id) if successful, None if the server is at
    /// capacity. A refused connection does not consume an id.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<u64> {
        if let Some(max) = self.max_clients {
            if self.clients.len() >= max {
                return None;
            }
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, Client::new(client_id, addr));

        Some(client_id)
    }

    /// Removes a connection and returns its final state
    ///
    /// The caller uses the returned binding to clean up the player the
    /// connection had claimed. Frees a slot under the connection cap.
    pub fn remove_client(&mut self, client_id: u64) -> Option<Client> {
        let client = self.clients.remove(&client_id)?;
        info!(
            "Client {} disconnected after {} calls ({:?} since last request)",
            client.id,
            client.calls,
            client.idle_for()
        );
        Some(client)
    }

    /// Marks activity on a connection
    ///
    /// Returns false if the id is unknown, e.g. the connection was already
    /// removed.
    pub fn touch(&mut self, client_id: u64) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                client.touch();
                true
            }
            None => false,
        }
    }

    /// Binds a connection to the player it connected as
    ///
    /// A later `Connect` on the same connection rebinds it. Returns false
    /// if the connection is unknown.
    pub fn bind_player(&mut self, client_id: u64, player_id: PlayerId) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                if client.player_id != Some(player_id) {
                    info!("Client {} bound to player {}", client_id, player_id);
                }
                client.player_id = Some(player_id);
                true
            }
            None => false,
        }
    }

    /// Clears the binding if it still points at `player_id`
    ///
    /// Used after an explicit `Disconnect`, so a connection that has since
    /// rebound to another player keeps that binding.
    pub fn unbind_player(&mut self, client_id: u64, player_id: &PlayerId) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            if client.player_id.as_ref() == Some(player_id) {
                client.player_id = None;
            }
        }
    }

    /// Returns the player a connection is bound to, if any
    pub fn player_for(&self, client_id: u64) -> Option<PlayerId> {
        self.clients.get(&client_id).and_then(|c| c.player_id)
    }

    /// Finds the connection currently bound to a player
    ///
    /// At most one connection is expected to hold a given player; under
    /// strict sessions the server refuses a second claim.
    pub fn find_client_by_player(&self, player_id: &PlayerId) -> Option<u64> {
        self.clients
            .iter()
            .find(|(_, client)| client.player_id.as_ref() == Some(player_id))
            .map(|(id, _)| *id)
    }

    /// Returns the number of live connections
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    #[test]
    fn test_client_creation() {
        let client = Client::new(1, test_addr());

        assert_eq!(client.id, 1);
        assert_eq!(client.addr, test_addr());
        assert_eq!(client.calls, 0);
        assert!(client.player_id.is_none());
    }

    #[test]
    fn test_client_touch() {
        let mut client = Client::new(1, test_addr());
        client.last_seen = Instant::now() - Duration::from_secs(2);

        client.touch();

        assert_eq!(client.calls, 1);
        assert!(client.last_seen.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_idle_for_tracks_last_request() {
        let mut client = Client::new(1, test_addr());
        client.last_seen = Instant::now() - Duration::from_secs(5);
        assert!(client.idle_for() >= Duration::from_secs(5));

        client.touch();
        assert!(client.idle_for() < Duration::from_secs(1));
    }

    #[test]
    fn test_removed_client_reports_idle_time() {
        let mut manager = ClientManager::new(None);
        let client_id = manager.add_client(test_addr()).unwrap();
        manager.touch(client_id);

        let removed = manager.remove_client(client_id).unwrap();

        assert_eq!(removed.calls, 1);
        assert!(removed.idle_for() < Duration::from_secs(1));
    }

    #[test]
    fn test_add_multiple_clients() {
        let mut manager = ClientManager::new(None);

        assert_eq!(manager.add_client(test_addr()), Some(1));
        assert_eq!(manager.add_client(test_addr2()), Some(2));
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_add_client_max_capacity() {
        let mut manager = ClientManager::new(Some(1));

        assert!(manager.add_client(test_addr()).is_some());
        assert!(manager.add_client(test_addr2()).is_none());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_capacity_freed_on_remove() {
        let mut manager = ClientManager::new(Some(1));
        let first = manager.add_client(test_addr()).unwrap();

        manager.remove_client(first);

        assert_eq!(manager.add_client(test_addr2()), Some(2));
    }

    #[test]
    fn test_remove_client_returns_binding() {
        let mut manager = ClientManager::new(None);
        let client_id = manager.add_client(test_addr()).unwrap();
        let player_id = PlayerId::from(0xa1);
        manager.bind_player(client_id, player_id);

        let removed = manager.remove_client(client_id).unwrap();

        assert_eq!(removed.player_id, Some(player_id));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_remove_nonexistent_client() {
        let mut manager = ClientManager::new(None);
        assert!(manager.remove_client(999).is_none());
    }

    #[test]
    fn test_bind_and_find_player() {
        let mut manager = ClientManager::new(None);
        let first = manager.add_client(test_addr()).unwrap();
        let second = manager.add_client(test_addr2()).unwrap();
        let player_id = PlayerId::from(0xb1);

        assert!(manager.bind_player(second, player_id));

        assert_eq!(manager.player_for(second), Some(player_id));
        assert_eq!(manager.player_for(first), None);
        assert_eq!(manager.find_client_by_player(&player_id), Some(second));
        assert!(!manager.bind_player(999, player_id));
    }

    #[test]
    fn test_unbind_only_matching_player() {
        let mut manager = ClientManager::new(None);
        let client_id = manager.add_client(test_addr()).unwrap();
        manager.bind_player(client_id, PlayerId::from(1));

        manager.unbind_player(client_id, &PlayerId::from(2));
        assert_eq!(manager.player_for(client_id), Some(PlayerId::from(1)));

        manager.unbind_player(client_id, &PlayerId::from(1));
        assert_eq!(manager.player_for(client_id), None);
    }

    #[test]
    fn test_touch_unknown_client() {
        let mut manager = ClientManager::new(None);
        let client_id = manager.add_client(test_addr()).unwrap();

        assert!(manager.touch(client_id));
        assert!(!manager.touch(client_id + 1));
    }
}
