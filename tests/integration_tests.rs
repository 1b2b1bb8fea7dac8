//! Integration tests for the sync service
//!
//! These tests run the real server on a loopback port and talk to it through
//! the real client transport.

use client::session::{run_sync_loop, ClientSession};
use client::transport::{TcpTransport, Transport};
use server::config::ServerConfig;
use server::network::{Server, SyncService};
use shared::{Packet, PlayerId, PlayerState, Position, Roster, SyncError, PROTOCOL_VERSION};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;

const CALL_TIMEOUT: Duration = Duration::from_secs(2);

/// A server running in the background until `stop` is called.
struct TestServer {
    addr: String,
    service: Arc<SyncService>,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl TestServer {
    async fn start(config: ServerConfig) -> Self {
        let server = Server::bind(ServerConfig {
            addr: "127.0.0.1:0".to_string(),
            ..config
        })
        .await
        .expect("Failed to bind test server");

        let addr = server.local_addr().unwrap().to_string();
        let service = server.service();
        let (shutdown, stop) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.run_until(async move {
            let _ = stop.await;
        }));

        TestServer {
            addr,
            service,
            shutdown,
            handle,
        }
    }

    fn transport(&self) -> TcpTransport {
        TcpTransport::new(&self.addr).with_timeout(CALL_TIMEOUT)
    }

    fn session(&self) -> ClientSession<TcpTransport> {
        ClientSession::new(self.transport())
    }

    async fn stop(self) {
        let _ = self.shutdown.send(());
        self.handle.await.unwrap();
        // Let connection tasks observe the shutdown and close their sockets.
        sleep(Duration::from_millis(100)).await;
    }
}

fn player_at(x: i32, y: i32) -> PlayerState {
    PlayerState {
        pos: Position::new(x, y),
        ..PlayerState::spawn()
    }
}

/// CONNECT AND SYNC
mod session_tests {
    use super::*;

    /// Two clients join one after the other, move, and see each other.
    #[tokio::test]
    async fn two_clients_join_and_see_each_other() {
        let server = TestServer::start(ServerConfig::default()).await;

        let mut alice = server.session();
        let roster = alice.connect().await.unwrap();
        let alice_id = alice.local_id().unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster.get(&alice_id).unwrap().pos, Position::new(100, 100));

        let mut bob = server.session();
        let roster = bob.connect().await.unwrap();
        let bob_id = bob.local_id().unwrap();
        assert_eq!(roster.len(), 2);
        assert!(roster.contains(&alice_id));
        assert!(roster.contains(&bob_id));

        alice.move_by(-1, 0);
        let roster = alice.sync_position().await.unwrap();
        assert_eq!(roster.len(), 2);
        assert_eq!(roster.get(&alice_id).unwrap().pos, Position::new(99, 100));

        let roster = bob.sync_position().await.unwrap();
        assert_eq!(roster.get(&alice_id).unwrap().pos, Position::new(99, 100));
        assert_eq!(roster.get(&bob_id).unwrap().pos, Position::new(100, 100));

        assert_eq!(server.service.registry().len().await, 2);
        server.stop().await;
    }

    /// Without strict sessions a Sync from an id never seen before simply
    /// inserts it.
    #[tokio::test]
    async fn sync_from_unknown_player_inserts_it() {
        let server = TestServer::start(ServerConfig::default()).await;
        let mut transport = server.transport();

        let stranger = player_at(300, 40);
        let roster = transport
            .call(&Packet::Sync { player: stranger })
            .await
            .unwrap()
            .into_roster()
            .unwrap();

        assert_eq!(roster.len(), 1);
        assert_eq!(roster.get(&stranger.id), Some(&stranger));
        server.stop().await;
    }

    /// Many syncs on one connection are answered in order, each reflecting
    /// the request that produced it.
    #[tokio::test]
    async fn responses_follow_request_order() {
        let server = TestServer::start(ServerConfig::default()).await;
        let mut session = server.session();
        session.connect().await.unwrap();
        let id = session.local_id().unwrap();

        for step in 1..=20 {
            session.move_by(1, 0);
            let roster = session.sync_position().await.unwrap();
            assert_eq!(roster.get(&id).unwrap().pos.x, 100 + step);
        }

        server.stop().await;
    }

    /// The sync loop publishes fresh rosters as positions change.
    #[tokio::test]
    async fn sync_loop_publishes_rosters() {
        let server = TestServer::start(ServerConfig::default()).await;

        let mut other = server.session();
        other.connect().await.unwrap();
        let other_id = other.local_id().unwrap();

        let mut session = server.session();
        let roster = session.connect().await.unwrap();
        let id = session.local_id().unwrap();

        let (move_tx, move_rx) = watch::channel(Position::new(100, 100));
        let (roster_tx, mut roster_rx) = watch::channel(roster);
        let handle = tokio::spawn(run_sync_loop(session, move_rx, roster_tx));

        move_tx.send(Position::new(150, 100)).unwrap();
        tokio::time::timeout(CALL_TIMEOUT, roster_rx.changed())
            .await
            .expect("No roster published")
            .unwrap();

        let published = roster_rx.borrow_and_update().clone();
        assert_eq!(published.get(&id).unwrap().pos, Position::new(150, 100));
        assert!(published.contains(&other_id));

        drop(move_tx);
        let session = handle.await.unwrap();
        assert_eq!(session.local_player().unwrap().pos, Position::new(150, 100));
        server.stop().await;
    }
}

/// REFUSALS AND FAILURES
mod failure_tests {
    use super::*;

    #[tokio::test]
    async fn mismatched_protocol_version_is_rejected() {
        let server = TestServer::start(ServerConfig::default()).await;
        let mut transport = server.transport();

        let response = transport
            .call(&Packet::Connect {
                protocol_version: PROTOCOL_VERSION + 1,
                player: PlayerState::spawn(),
            })
            .await
            .unwrap();

        assert!(matches!(response, Packet::Rejected { .. }));
        assert!(server.service.registry().is_empty().await);
        server.stop().await;
    }

    #[tokio::test]
    async fn full_server_refuses_extra_connections() {
        let server = TestServer::start(ServerConfig {
            max_clients: Some(1),
            ..ServerConfig::default()
        })
        .await;

        let mut first = server.session();
        first.connect().await.unwrap();

        let mut second = server.session();
        match second.connect().await {
            Err(SyncError::Protocol(reason)) => assert_eq!(reason, "Server full"),
            other => panic!("Expected a Server full refusal, got {:?}", other),
        }
        assert!(!second.is_connected());

        // The admitted client is unaffected.
        first.move_by(0, 3);
        assert_eq!(first.sync_position().await.unwrap().len(), 1);
        assert_eq!(server.service.client_count().await, 1);
        server.stop().await;
    }

    /// A refused peer that never sends anything is closed on shutdown.
    #[tokio::test]
    async fn refused_idle_connection_closes_on_shutdown() {
        let server = TestServer::start(ServerConfig {
            max_clients: Some(1),
            ..ServerConfig::default()
        })
        .await;

        let mut admitted = server.session();
        admitted.connect().await.unwrap();

        let mut idle = TcpStream::connect(server.addr.as_str()).await.unwrap();
        sleep(Duration::from_millis(50)).await;
        server.stop().await;

        let mut buf = [0u8; 16];
        let read = tokio::time::timeout(CALL_TIMEOUT, idle.read(&mut buf))
            .await
            .expect("Refused connection outlived the server");
        assert!(matches!(read, Ok(0) | Err(_)));
    }

    /// A failed call leaves the client's last roster and local state intact.
    #[tokio::test]
    async fn failed_sync_keeps_previous_roster() {
        let server = TestServer::start(ServerConfig::default()).await;

        let mut session = server.session();
        let before = session.connect().await.unwrap();
        server.stop().await;

        session.move_by(10, 0);
        let err = session.sync_position().await.unwrap_err();
        assert!(err.is_transport(), "Unexpected error: {}", err);

        assert_eq!(*session.roster(), *before);
        assert_eq!(session.local_player().unwrap().pos, Position::new(110, 100));
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn connect_failure_leaves_session_unconnected() {
        let server = TestServer::start(ServerConfig::default()).await;
        let addr = server.addr.clone();
        server.stop().await;

        let mut session = ClientSession::new(TcpTransport::new(addr).with_timeout(CALL_TIMEOUT));
        assert!(session.connect().await.is_err());
        assert!(!session.is_connected());
        assert_eq!(*session.roster(), Roster::new());
    }
}

/// OPT-IN SERVER BEHAVIOUR
mod hardening_tests {
    use super::*;

    #[tokio::test]
    async fn strict_sessions_refuse_impersonation() {
        let server = TestServer::start(ServerConfig {
            strict_sessions: true,
            ..ServerConfig::default()
        })
        .await;

        let mut owner = server.session();
        owner.connect().await.unwrap();
        let victim = *owner.local_player().unwrap();

        let mut intruder = server.transport();
        let moved = PlayerState {
            pos: Position::new(0, 0),
            ..victim
        };

        let response = intruder.call(&Packet::Sync { player: moved }).await.unwrap();
        assert!(matches!(response, Packet::Rejected { .. }));

        let response = intruder.call(&Packet::connect(moved)).await.unwrap();
        assert!(matches!(response, Packet::Rejected { .. }));

        let roster = owner.sync_position().await.unwrap();
        assert_eq!(roster.get(&victim.id).unwrap().pos, Position::new(100, 100));
        server.stop().await;
    }

    #[tokio::test]
    async fn strict_sessions_refuse_nil_id() {
        let server = TestServer::start(ServerConfig {
            strict_sessions: true,
            ..ServerConfig::default()
        })
        .await;

        let mut transport = server.transport();
        let nil = PlayerState {
            id: PlayerId::nil(),
            ..PlayerState::spawn()
        };

        let response = transport.call(&Packet::connect(nil)).await.unwrap();
        assert!(matches!(response, Packet::Rejected { .. }));
        server.stop().await;
    }

    #[tokio::test]
    async fn explicit_disconnect_removes_player() {
        let server = TestServer::start(ServerConfig::default()).await;

        let mut leaving = server.session();
        leaving.connect().await.unwrap();
        let leaving_id = leaving.local_id().unwrap();

        let mut staying = server.session();
        assert!(staying.connect().await.unwrap().contains(&leaving_id));

        leaving.disconnect().await.unwrap();
        assert!(!leaving.is_connected());

        let roster = staying.sync_position().await.unwrap();
        assert!(!roster.contains(&leaving_id));
        assert_eq!(roster.len(), 1);
        server.stop().await;
    }

    #[tokio::test]
    async fn dropped_connection_evicts_player_when_enabled() {
        let server = TestServer::start(ServerConfig {
            evict_on_disconnect: true,
            ..ServerConfig::default()
        })
        .await;

        let mut leaving = server.session();
        leaving.connect().await.unwrap();
        let leaving_id = leaving.local_id().unwrap();

        let mut staying = server.session();
        staying.connect().await.unwrap();

        drop(leaving);
        sleep(Duration::from_millis(200)).await;

        let roster = staying.sync_position().await.unwrap();
        assert!(!roster.contains(&leaving_id));
        server.stop().await;
    }

    #[tokio::test]
    async fn dropped_connection_keeps_player_by_default() {
        let server = TestServer::start(ServerConfig::default()).await;

        let mut leaving = server.session();
        leaving.connect().await.unwrap();
        let leaving_id = leaving.local_id().unwrap();

        let mut staying = server.session();
        staying.connect().await.unwrap();

        drop(leaving);
        sleep(Duration::from_millis(200)).await;

        let roster = staying.sync_position().await.unwrap();
        assert!(roster.contains(&leaving_id));
        server.stop().await;
    }

    #[tokio::test]
    async fn idle_players_are_swept_after_ttl() {
        let server = TestServer::start(ServerConfig {
            player_ttl: Some(Duration::from_millis(150)),
            sweep_interval: Duration::from_millis(25),
            ..ServerConfig::default()
        })
        .await;

        let mut idle = server.session();
        idle.connect().await.unwrap();
        let idle_id = idle.local_id().unwrap();

        sleep(Duration::from_millis(500)).await;

        let mut fresh = server.session();
        let roster = fresh.connect().await.unwrap();
        assert!(!roster.contains(&idle_id));
        assert_eq!(roster.len(), 1);

        // The idle client's next sync brings it back.
        let roster = idle.sync_position().await.unwrap();
        assert!(roster.contains(&idle_id));
        server.stop().await;
    }
}
