//! # Sync Client Library
//!
//! The client side of the player-state synchronization service. A client owns
//! exactly one local player, pushes its state to the server and keeps the
//! most recent roster the server returned.
//!
//! ## Module Organization
//!
//! ### Session Module (`session`)
//! `ClientSession` holds the local player, the connection flag and the cached
//! roster. `run_sync_loop` drives a session from position changes, issuing
//! one `Sync` per change and publishing each fresh roster.
//!
//! ### Transport Module (`transport`)
//! The `Transport` trait every session talks through, and `TcpTransport`,
//! which carries length-prefixed bincode frames over a reused TCP connection.
//!
//! ### Input Module (`input`)
//! A headless `Walker` that stands in for keyboard input by holding A or D
//! for a while and reporting each step.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::session::ClientSession;
//! use client::transport::TcpTransport;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut session = ClientSession::new(TcpTransport::new("127.0.0.1:8080"));
//!     session.connect().await?;
//!
//!     session.move_by(1, 0);
//!     let roster = session.sync_position().await?;
//!     println!("{} players online", roster.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Failure Handling
//!
//! A failed call never clears local state. The local player keeps its
//! position and the cached roster stays as it was until the next successful
//! call replaces it.

pub mod input;
pub mod session;
pub mod transport;
