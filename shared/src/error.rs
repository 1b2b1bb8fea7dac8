use std::io;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single remote call. Errors never outlive the call that
/// produced them: the server drops only the offending connection and the
/// client keeps its previous roster.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("frame of {0} bytes exceeds the packet size limit")]
    FrameTooLarge(u32),

    #[error("session is not connected")]
    NotConnected,
}

impl SyncError {
    /// True for failures of the channel itself, as opposed to a well-formed
    /// exchange that the other side refused or garbled.
    pub fn is_transport(&self) -> bool {
        matches!(self, SyncError::Transport(_) | SyncError::Timeout(_))
    }

    /// True when the peer closed the connection cleanly between frames.
    pub fn is_closed(&self) -> bool {
        match self {
            SyncError::Transport(e) => e.kind() == io::ErrorKind::UnexpectedEof,
            _ => false,
        }
    }
}
