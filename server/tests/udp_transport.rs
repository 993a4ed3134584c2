//! Drives the server over real UDP sockets on the loopback interface.

use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::timeout;

use arena_server::config::{BlockedCells, ServerConfig};
use arena_server::network::Server;
use arena_server::World;
use arena_shared::{ServerEvent, MAX_PACKET_SIZE};

async fn recv_event(socket: &UdpSocket) -> ServerEvent {
    let mut buf = vec![0u8; MAX_PACKET_SIZE];
    let len = timeout(Duration::from_secs(2), socket.recv(&mut buf))
        .await
        .expect("timed out waiting for the server")
        .unwrap();
    ServerEvent::decode(std::str::from_utf8(&buf[..len]).unwrap()).unwrap()
}

async fn client(server: std::net::SocketAddr) -> UdpSocket {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.connect(server).await.unwrap();
    socket
}

#[tokio::test]
async fn join_snapshot_then_peer_moves() {
    let config = ServerConfig { npc_spawns: Vec::new(), ..ServerConfig::default() };
    let mut world = World::with_seed(config, BlockedCells::new(), 5);
    let mut server = Server::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap();

    let alice = client(addr).await;
    alice.send(br#"{"type":"move","id":"alice","x":16,"y":16}"#).await.unwrap();
    server.poll_once(&mut world).await.unwrap();

    // Snapshot: alice's own position and vitals
    assert!(matches!(recv_event(&alice).await, ServerEvent::Move { ref id, .. } if id == "alice"));
    assert!(matches!(recv_event(&alice).await, ServerEvent::HpSync { ref id, hp, .. } if id == "alice" && hp == 100.0));
    assert!(matches!(recv_event(&alice).await, ServerEvent::EnergySync { ref id, .. } if id == "alice"));

    let bob = client(addr).await;
    bob.send(br#"{"type":"move","id":"bob","x":48,"y":16}"#).await.unwrap();
    server.poll_once(&mut world).await.unwrap();

    match recv_event(&alice).await {
        ServerEvent::Move { id, x, .. } => {
            assert_eq!(id, "bob");
            assert_eq!(x, 48.0);
        }
        other => panic!("expected bob's move, got {:?}", other),
    }
    assert_eq!(world.player_count(), 2);
}

#[tokio::test]
async fn garbage_datagram_is_ignored() {
    let config = ServerConfig { npc_spawns: Vec::new(), ..ServerConfig::default() };
    let mut world = World::with_seed(config, BlockedCells::new(), 5);
    let mut server = Server::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap();

    let mallory = client(addr).await;
    mallory.send(b"{\"type\":\"move\",\"id\":").await.unwrap();
    server.poll_once(&mut world).await.unwrap();

    assert_eq!(server.connection_count(), 0);
    assert_eq!(world.player_count(), 0);
}
