//! # Sync Server Library
//!
//! The authoritative side of the player-state synchronization service. The
//! server holds the one true roster of players and answers two remote calls,
//! `Connect` and `Sync`, each of which upserts the caller's state and returns
//! the whole roster.
//!
//! ## Module Organization
//!
//! ### Registry Module (`registry`)
//! The `PlayerRegistry`: the roster behind a single mutex. An upsert and the
//! roster copy returned to the caller happen inside one critical section, so
//! concurrent calls are linearizable and no caller ever sees half an update.
//!
//! ### Client Manager Module (`client_manager`)
//! Bookkeeping for live TCP connections: ids, peer addresses, activity, the
//! player each connection has connected as, and an optional connection cap.
//!
//! ### Network Module (`network`)
//! The TCP front end. One task per connection reads length-prefixed frames,
//! hands each request to the `SyncService` and writes back its response. An
//! optional sweeper task evicts players that stopped syncing.
//!
//! ### Config Module (`config`)
//! `ServerConfig`, built from the command line by the `server` binary.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::bind(ServerConfig::new("127.0.0.1:8080")).await?;
//!     server.run().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Trust Model
//!
//! By default the server trusts whatever identity a client claims and never
//! removes players, which is the plain upsert protocol. `ServerConfig` can
//! switch on session binding, eviction on disconnect and idle-player TTLs.

pub mod client_manager;
pub mod config;
pub mod network;
pub mod registry;
