//! Client side of a sync session.
//!
//! A `ClientSession` owns the local player's authoritative state and a cached
//! copy of the server's roster. The cache is an `Arc<Roster>` that is only
//! ever replaced whole, so readers holding a clone never see a half-applied
//! update and never need a lock.

use crate::transport::Transport;
use log::{debug, info, warn};
use shared::{Packet, PlayerId, PlayerState, Position, Roster, SyncError};
use std::sync::Arc;
use tokio::sync::watch;

pub struct ClientSession<T> {
    transport: T,
    /// Created on the first connect attempt and kept across retries.
    local: Option<PlayerState>,
    connected: bool,
    roster: Arc<Roster>,
}

impl<T: Transport> ClientSession<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            local: None,
            connected: false,
            roster: Arc::new(Roster::new()),
        }
    }

    /// Joins the session.
    ///
    /// The first attempt spawns the local player (fresh id, spawn point);
    /// retries reuse it. On success the roster cache is replaced by the
    /// server's roster. On failure the session stays unconnected and the
    /// caller decides whether to retry.
    pub async fn connect(&mut self) -> Result<Arc<Roster>, SyncError> {
        let player = *self.local.get_or_insert_with(PlayerState::spawn);

        let roster = self
            .transport
            .call(&Packet::connect(player))
            .await?
            .into_roster()?;

        self.roster = Arc::new(roster);
        self.connected = true;
        info!(
            "Connected with ID: {} ({} players)",
            player.id,
            self.roster.len()
        );
        Ok(self.roster())
    }

    /// Pushes the local player's current state and adopts the returned
    /// roster. A failed call leaves the previous roster in place.
    pub async fn sync_position(&mut self) -> Result<Arc<Roster>, SyncError> {
        let player = match (self.connected, self.local) {
            (true, Some(player)) => player,
            _ => return Err(SyncError::NotConnected),
        };

        let roster = self
            .transport
            .call(&Packet::Sync { player })
            .await?
            .into_roster()?;

        self.roster = Arc::new(roster);
        Ok(self.roster())
    }

    /// Leaves the session and removes the local player from the server.
    /// The session can connect again later under the same id.
    ///
    /// The session only counts as disconnected once the server confirms. On
    /// any failure it stays connected and the call can be retried.
    pub async fn disconnect(&mut self) -> Result<(), SyncError> {
        let player_id = match (self.connected, self.local) {
            (true, Some(player)) => player.id,
            _ => return Err(SyncError::NotConnected),
        };

        match self
            .transport
            .call(&Packet::Disconnect { player_id })
            .await?
        {
            Packet::Disconnected { .. } => {
                self.connected = false;
                info!("Disconnected {}", player_id);
                Ok(())
            }
            Packet::Rejected { reason } => Err(SyncError::Protocol(reason)),
            other => Err(SyncError::Protocol(format!(
                "unexpected {} response",
                other.kind()
            ))),
        }
    }

    /// Moves the local player. Takes effect on the server at the next sync.
    pub fn set_position(&mut self, pos: Position) {
        if let Some(local) = &mut self.local {
            local.pos = pos;
        }
    }

    pub fn move_by(&mut self, dx: i32, dy: i32) {
        if let Some(local) = &mut self.local {
            local.pos = local.pos.offset(dx, dy);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn local_id(&self) -> Option<PlayerId> {
        self.local.map(|p| p.id)
    }

    pub fn local_player(&self) -> Option<&PlayerState> {
        self.local.as_ref()
    }

    /// The roster as of the last successful call.
    pub fn roster(&self) -> Arc<Roster> {
        Arc::clone(&self.roster)
    }

    /// What a renderer should draw: the cached roster, with the local entry
    /// replaced by the local state, which may be ahead of the server's copy.
    pub fn render_players(&self) -> Vec<PlayerState> {
        let local_id = self.local_id();
        let mut players: Vec<PlayerState> = self
            .roster
            .players()
            .filter(|p| Some(p.id) != local_id)
            .copied()
            .collect();

        if let (true, Some(local)) = (self.connected, self.local) {
            players.push(local);
        }
        players
    }
}

/// Drives a connected session from position changes.
///
/// Each change on `moves` triggers one `Sync`. Changes arriving while a call
/// is in flight collapse into the latest value, so there is never a backlog.
/// Successful rosters are published on `rosters`. Failed syncs are logged and
/// the previous roster stays published. Returns the session once `moves` is
/// closed.
pub async fn run_sync_loop<T: Transport>(
    mut session: ClientSession<T>,
    mut moves: watch::Receiver<Position>,
    rosters: watch::Sender<Arc<Roster>>,
) -> ClientSession<T> {
    while moves.changed().await.is_ok() {
        let pos = *moves.borrow_and_update();
        session.set_position(pos);

        match session.sync_position().await {
            Ok(roster) => {
                debug!("Synced at ({}, {}): {} players", pos.x, pos.y, roster.len());
                rosters.send_replace(roster);
            }
            Err(e) => warn!("Sync error: {}", e),
        }
    }

    session
}
