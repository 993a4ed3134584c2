//! UDP game server implementation.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use tokio::net::{ToSocketAddrs, UdpSocket};
use tokio::time::MissedTickBehavior;

use arena_shared::{ClientMessage, ServerEvent, MAX_PACKET_SIZE};

use crate::world::World;
use crate::{ai, dispatch, regen};

use super::{deliver, Broadcaster};

/// How often idle connections are checked
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(1);

/// Client connection state
#[derive(Debug)]
pub struct ClientConnection {
    pub addr: SocketAddr,
    /// Set by the first valid `move`
    pub player_id: Option<String>,
    /// Server clock of the last datagram received
    pub last_seen: f64,
    /// Events waiting for the next flush
    pub outgoing_queue: Vec<ServerEvent>,
}

impl ClientConnection {
    pub fn new(addr: SocketAddr, now: f64) -> Self {
        Self {
            addr,
            player_id: None,
            last_seen: now,
            outgoing_queue: Vec::new(),
        }
    }

    pub fn is_timed_out(&self, now: f64, timeout: f64) -> bool {
        now - self.last_seen > timeout
    }

    pub fn is_bound(&self) -> bool {
        self.player_id.is_some()
    }
}

/// Game server
pub struct Server {
    socket: UdpSocket,
    clients: HashMap<SocketAddr, ClientConnection>,
    started: Instant,
}

impl Server {
    /// Bind the server socket
    pub async fn bind<A: ToSocketAddrs>(addr: A) -> Result<Self, std::io::Error> {
        let socket = UdpSocket::bind(addr).await?;
        info!("Listening on {}", socket.local_addr()?);
        Ok(Self {
            socket,
            clients: HashMap::new(),
            started: Instant::now(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.socket.local_addr()
    }

    /// Seconds since the server started
    pub fn now(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    pub fn connection_count(&self) -> usize {
        self.clients.len()
    }

    /// Run the event loop until Ctrl-C. Inbound messages, AI ticks and
    /// regeneration ticks all take turns on this one task.
    pub async fn run(mut self, mut world: World) -> Result<(), std::io::Error> {
        let config = world.config().clone();
        let mut ai_interval = tokio::time::interval(Duration::from_secs_f64(config.ai_tick_secs));
        let mut regen_interval = tokio::time::interval(Duration::from_secs_f64(config.regen_tick_secs));
        let mut housekeeping = tokio::time::interval(HOUSEKEEPING_INTERVAL);
        ai_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        regen_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        housekeeping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut buf = vec![0u8; MAX_PACKET_SIZE];

        info!(
            "Server started (AI tick {:.2}s, regen tick {:.2}s)",
            config.ai_tick_secs, config.regen_tick_secs
        );

        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, addr)) => {
                        let now = self.now();
                        self.handle_packet(&buf[..len], addr, &mut world, now);
                    }
                    Err(e) => {
                        // UDP reports ICMP errors from earlier sends here; keep serving
                        warn!("Error receiving packet: {}", e);
                    }
                },
                _ = ai_interval.tick() => {
                    let now = self.now();
                    let out = ai::tick(&mut world, now);
                    deliver(&mut self, out);
                }
                _ = regen_interval.tick() => {
                    let now = self.now();
                    let out = regen::tick(&mut world, now);
                    deliver(&mut self, out);
                }
                _ = housekeeping.tick() => {
                    let now = self.now();
                    self.check_timeouts(&mut world, now);
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down");
                    break;
                }
            }

            self.process_outgoing().await;
        }

        Ok(())
    }

    /// Receive and handle one datagram, then flush. Used by tests that
    /// drive the server step by step.
    pub async fn poll_once(&mut self, world: &mut World) -> Result<(), std::io::Error> {
        let mut buf = vec![0u8; MAX_PACKET_SIZE];
        let (len, addr) = self.socket.recv_from(&mut buf).await?;
        let now = self.now();
        self.handle_packet(&buf[..len], addr, world, now);
        self.process_outgoing().await;
        Ok(())
    }

    /// Handle a received datagram
    pub fn handle_packet(&mut self, data: &[u8], addr: SocketAddr, world: &mut World, now: f64) {
        let message = match std::str::from_utf8(data)
            .map_err(|e| e.to_string())
            .and_then(|text| ClientMessage::decode(text).map_err(|e| e.to_string()))
        {
            Ok(msg) => msg,
            Err(e) => {
                debug!("Dropped datagram from {}: {}", addr, e);
                return;
            }
        };

        let client = self.clients.entry(addr).or_insert_with(|| {
            info!("New connection from {}", addr);
            ClientConnection::new(addr, now)
        });
        client.last_seen = now;

        let (sender, newly_bound) = match (&client.player_id, &message) {
            (Some(id), _) => (id.clone(), false),
            (None, ClientMessage::Move { id, .. }) => (id.clone(), true),
            (None, other) => {
                debug!("Dropped {} from unbound connection {}", other.kind(), addr);
                return;
            }
        };

        if newly_bound {
            if self.player_addr(&sender).is_some() {
                warn!("{} tried to bind '{}' which is already connected", addr, sender);
                return;
            }
            if let Some(client) = self.clients.get_mut(&addr) {
                client.player_id = Some(sender.clone());
            }
            info!("Connection {} bound to player '{}'", addr, sender);
        }

        let out = dispatch::handle_message(world, &sender, message, now);

        if newly_bound {
            let snapshot = world.snapshot();
            self.send_snapshot(&sender, snapshot);
        }
        deliver(self, out);
    }

    /// Address of the connection bound to `player_id`
    fn player_addr(&self, player_id: &str) -> Option<SocketAddr> {
        self.clients
            .values()
            .find(|c| c.player_id.as_deref() == Some(player_id))
            .map(|c| c.addr)
    }

    /// Drop connections that have gone quiet and remove their players
    pub fn check_timeouts(&mut self, world: &mut World, now: f64) {
        let timeout = world.config().connection_timeout_secs;
        let timed_out: Vec<SocketAddr> = self
            .clients
            .values()
            .filter(|c| c.is_timed_out(now, timeout))
            .map(|c| c.addr)
            .collect();

        for addr in timed_out {
            let Some(connection) = self.clients.remove(&addr) else {
                continue;
            };
            match connection.player_id {
                Some(player_id) => {
                    warn!("Player '{}' timed out", player_id);
                    let out = world.remove_player(&player_id);
                    deliver(self, out);
                }
                None => debug!("Unbound connection {} timed out", addr),
            }
        }
    }

    /// Send every queued event, one datagram per event
    pub async fn process_outgoing(&mut self) {
        for (addr, client) in &mut self.clients {
            for event in client.outgoing_queue.drain(..) {
                let data = match event.encode() {
                    Ok(data) => data,
                    Err(e) => {
                        error!("Failed to encode {:?}: {}", event, e);
                        continue;
                    }
                };
                if let Err(e) = self.socket.send_to(data.as_bytes(), addr).await {
                    error!("Failed to send to {}: {}", addr, e);
                }
            }
        }
    }
}

impl Broadcaster for Server {
    fn broadcast(&mut self, event: &ServerEvent, exclude: Option<&str>) {
        for client in self.clients.values_mut() {
            let Some(player_id) = client.player_id.as_deref() else {
                continue;
            };
            if exclude == Some(player_id) {
                continue;
            }
            client.outgoing_queue.push(event.clone());
        }
    }

    fn send_snapshot(&mut self, player_id: &str, events: Vec<ServerEvent>) {
        if let Some(client) = self
            .clients
            .values_mut()
            .find(|c| c.player_id.as_deref() == Some(player_id))
        {
            client.outgoing_queue.extend(events);
        }
    }
}
