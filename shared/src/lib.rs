//! Types shared by the sync server and its clients: the player data model,
//! the request/response packets, and the framing used to carry them.

pub mod error;
pub mod framing;

pub use error::SyncError;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Bumped whenever the packet layout changes. Servers reject `Connect`
/// requests carrying any other value.
pub const PROTOCOL_VERSION: u32 = 1;

pub const SPAWN_X: i32 = 100;
pub const SPAWN_Y: i32 = 100;
pub const PLAYER_RADIUS: i32 = 25;

/// Client-generated player identity. Random 128-bit, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl From<u128> for PlayerId {
    fn from(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x.saturating_add(dx),
            y: self.y.saturating_add(dy),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerState {
    pub id: PlayerId,
    pub pos: Position,
    pub radius: i32,
}

impl PlayerState {
    pub fn new(id: PlayerId, pos: Position, radius: i32) -> Self {
        Self { id, pos, radius }
    }

    /// A freshly spawned player with a new identity at the spawn point.
    pub fn spawn() -> Self {
        Self::new(
            PlayerId::generate(),
            Position::new(SPAWN_X, SPAWN_Y),
            PLAYER_RADIUS,
        )
    }
}

/// Mapping of every known player to its last reported state.
///
/// The server's roster is authoritative; a client's copy is a snapshot as of
/// its last successful call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    players: HashMap<PlayerId, PlayerState>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites the entry keyed by `state.id`.
    pub fn upsert(&mut self, state: PlayerState) -> Option<PlayerState> {
        self.players.insert(state.id, state)
    }

    pub fn remove(&mut self, id: &PlayerId) -> Option<PlayerState> {
        self.players.remove(id)
    }

    pub fn get(&self, id: &PlayerId) -> Option<&PlayerState> {
        self.players.get(id)
    }

    pub fn contains(&self, id: &PlayerId) -> bool {
        self.players.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &PlayerId> {
        self.players.keys()
    }

    pub fn players(&self) -> impl Iterator<Item = &PlayerState> {
        self.players.values()
    }
}

impl FromIterator<PlayerState> for Roster {
    fn from_iter<I: IntoIterator<Item = PlayerState>>(iter: I) -> Self {
        let mut roster = Roster::new();
        for state in iter {
            roster.upsert(state);
        }
        roster
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    // Client -> server
    Connect {
        protocol_version: u32,
        player: PlayerState,
    },
    Sync {
        player: PlayerState,
    },
    Disconnect {
        player_id: PlayerId,
    },

    // Server -> client
    Roster {
        roster: Roster,
    },
    Disconnected {
        player_id: PlayerId,
    },
    Rejected {
        reason: String,
    },
}

impl Packet {
    pub fn connect(player: PlayerState) -> Self {
        Packet::Connect {
            protocol_version: PROTOCOL_VERSION,
            player,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Packet::Rejected {
            reason: reason.into(),
        }
    }

    /// Short name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Packet::Connect { .. } => "Connect",
            Packet::Sync { .. } => "Sync",
            Packet::Disconnect { .. } => "Disconnect",
            Packet::Roster { .. } => "Roster",
            Packet::Disconnected { .. } => "Disconnected",
            Packet::Rejected { .. } => "Rejected",
        }
    }

    /// Unwraps a `Roster` response. `Rejected` becomes a protocol error
    /// carrying the server's reason.
    pub fn into_roster(self) -> Result<Roster, SyncError> {
        match self {
            Packet::Roster { roster } => Ok(roster),
            Packet::Rejected { reason } => Err(SyncError::Protocol(reason)),
            other => Err(SyncError::Protocol(format!(
                "unexpected {} response",
                other.kind()
            ))),
        }
    }
}
