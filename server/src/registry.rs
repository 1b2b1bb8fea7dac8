//! Authoritative player registry
//!
//! The registry owns the one true roster. Every operation takes the same
//! mutex for its whole duration, so an upsert and the roster copy handed back
//! to the caller form a single atomic step. Callers never see the map itself,
//! only owned `Roster` snapshots.

use log::{debug, info, warn};
use shared::{PlayerId, PlayerState, Roster};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry {
    state: PlayerState,
    last_seen: Instant,
}

/// The server's roster of players
///
/// Each entry pairs a player's last reported state with the time of that
/// report. The whole map sits behind one mutex; there is no separate read
/// path, so a snapshot is never older than the last completed upsert.
#[derive(Debug, Default)]
pub struct PlayerRegistry {
    entries: Mutex<HashMap<PlayerId, Entry>>,
}

impl PlayerRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a player joining the session
    ///
    /// Inserts `incoming`, or overwrites the state previously stored under
    /// its id, and returns the full roster including it. Positions are
    /// taken as reported; there is no bounds checking. Never fails.
    pub async fn connect(&self, incoming: PlayerState) -> Roster {
        let (roster, is_new) = self.upsert(incoming).await;
        if is_new {
            info!(
                "Player {} joined at ({}, {})",
                incoming.id, incoming.pos.x, incoming.pos.y
            );
        }
        roster
    }

    /// Records a player's latest state
    ///
    /// Same upsert as `connect`: last writer wins, and an unknown id is
    /// registered rather than refused. Returns the full roster as of this
    /// call, including the caller's update.
    pub async fn sync(&self, incoming: PlayerState) -> Roster {
        let (roster, is_new) = self.upsert(incoming).await;
        if is_new {
            info!("Player {} joined through sync", incoming.id);
        }
        roster
    }

    async fn upsert(&self, incoming: PlayerState) -> (Roster, bool) {
        if incoming.id.is_nil() {
            warn!("Accepting nil player id");
        }

        let mut entries = self.entries.lock().await;
        let is_new = entries
            .insert(
                incoming.id,
                Entry {
                    state: incoming,
                    last_seen: Instant::now(),
                },
            )
            .is_none();

        (Self::copy_out(&entries), is_new)
    }

    /// Removes a player after an explicit disconnect or a dropped session
    ///
    /// Returns false if it was not registered.
    pub async fn remove(&self, id: &PlayerId) -> bool {
        let removed = self.entries.lock().await.remove(id).is_some();
        if removed {
            info!("Player {} left", id);
        }
        removed
    }

    /// Evicts players that have gone quiet
    ///
    /// Drops every player whose last upsert is older than `ttl` and returns
    /// their ids. A player evicted here reappears on its next `sync`.
    pub async fn evict_stale(&self, ttl: Duration) -> Vec<PlayerId> {
        let mut entries = self.entries.lock().await;
        let stale: Vec<PlayerId> = entries
            .iter()
            .filter(|(_, entry)| entry.last_seen.elapsed() > ttl)
            .map(|(id, _)| *id)
            .collect();

        for id in &stale {
            entries.remove(id);
            info!("Evicted stale player {}", id);
        }
        if !stale.is_empty() {
            debug!("{} players remain after eviction", entries.len());
        }

        stale
    }

    /// Returns a copy of the current roster without touching any entry
    pub async fn snapshot(&self) -> Roster {
        let entries = self.entries.lock().await;
        Self::copy_out(&entries)
    }

    /// Returns the number of registered players
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    fn copy_out(entries: &HashMap<PlayerId, Entry>) -> Roster {
        entries.values().map(|entry| entry.state).collect()
    }
}
