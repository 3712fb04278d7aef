//! Server network layer handling UDP communications and game loop coordination

use crate::client_manager::ClientManager;
use crate::config::ServerConfig;
use crate::game::{GameServer, ServerEvent};
use log::{debug, error, info, warn};
use shared::{decode, encode, Packet, PlayerId, MAX_PACKET_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::time::{interval, MissedTickBehavior};

/// Longest step the simulation takes after a stalled tick.
const MAX_TICK_DELTA: f32 = 0.25;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client_id: PlayerId },
    Shutdown,
}

/// Messages sent from game loop to network tasks
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    SendToClient {
        packet: Packet,
        client_id: PlayerId,
    },
    BroadcastPacket {
        packet: Packet,
        exclude: Vec<PlayerId>,
    },
}

/// Main server coordinating networking and game simulation
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    game: Arc<Mutex<GameServer>>,
    config: ServerConfig,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: Option<mpsc::UnboundedReceiver<GameMessage>>,
}

impl Server {
    pub async fn new(config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        config.validate()?;

        let socket = Arc::new(UdpSocket::bind(config.bind_address()).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let mut game = GameServer::new(&config);
        game.initialize();

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(
                config.max_players,
                config.client_timeout,
            ))),
            game: Arc::new(Mutex::new(game)),
            config,
            server_tx,
            server_rx,
            game_tx,
            game_rx: Some(game_rx),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Sender that can stop the main loop from outside with
    /// [`ServerMessage::Shutdown`].
    pub fn shutdown_handle(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    pub fn game(&self) -> Arc<Mutex<GameServer>> {
        Arc::clone(&self.game)
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_PACKET_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match decode(&buffer[..len]) {
                        Ok(packet) => {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        }
                        Err(e) => warn!("Dropped malformed packet from {}: {}", addr, e),
                    },
                    Err(e) => {
                        warn!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let Some(mut game_rx) = self.game_rx.take() else {
            return;
        };
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = send_packet_impl(&socket, &packet, addr).await {
                            warn!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::SendToClient { packet, client_id } => {
                        let addr = clients.read().await.client_addr(client_id);
                        let Some(addr) = addr else {
                            debug!("Dropped packet for departed client {}", client_id);
                            continue;
                        };
                        if let Err(e) = send_packet_impl(&socket, &packet, addr).await {
                            warn!("Failed to send to client {}: {}", client_id, e);
                            clients.write().await.record_packet_loss(client_id);
                        }
                    }
                    GameMessage::BroadcastPacket { packet, exclude } => {
                        let client_addrs = clients.read().await.get_client_addrs();

                        for (client_id, addr) in client_addrs {
                            if exclude.contains(&client_id) {
                                continue;
                            }

                            if let Err(e) = send_packet_impl(&socket, &packet, addr).await {
                                warn!("Failed to send to client {}: {}", client_id, e);
                                clients.write().await.record_packet_loss(client_id);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = clients.write().await.check_timeouts();

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    /// Spawns task that keeps idle connections alive
    fn spawn_heartbeat(&self) {
        let game_tx = self.game_tx.clone();
        let period = self.config.heartbeat_interval;

        tokio::spawn(async move {
            let mut interval = interval(period);

            loop {
                interval.tick().await;
                let message = GameMessage::BroadcastPacket {
                    packet: Packet::Heartbeat,
                    exclude: Vec::new(),
                };
                if game_tx.send(message).is_err() {
                    return;
                }
            }
        });
    }

    fn queue(&self, message: GameMessage) {
        if let Err(e) = self.game_tx.send(message) {
            error!("Failed to queue outgoing packet: {}", e);
        }
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        self.queue(GameMessage::SendPacket { packet, addr });
    }

    fn broadcast_packet(&self, packet: Packet, exclude: Vec<PlayerId>) {
        self.queue(GameMessage::BroadcastPacket { packet, exclude });
    }

    /// Processes incoming packets and updates game state
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        let client_id = self.clients.write().await.touch_addr(addr);

        match packet {
            Packet::Join { client_version } => {
                self.handle_join(client_version, addr, client_id).await;
            }

            Packet::PlayerInput(mut input) => {
                let Some(client_id) = client_id else {
                    warn!("Input from unknown address {}", addr);
                    return;
                };
                // The connection decides whose vehicle this is.
                input.player_id = client_id;
                let result = self.game.lock().await.handle_player_input(&input);
                if let Err(e) = result {
                    debug!("Input from {} ignored: {}", addr, e);
                }
            }

            Packet::ClientSimulation(snapshot) => {
                let Some(client_id) = client_id else {
                    warn!("Simulation report from unknown address {}", addr);
                    return;
                };
                let result = self
                    .game
                    .lock()
                    .await
                    .process_client_simulation(client_id, snapshot);
                if let Err(e) = result {
                    debug!("Simulation report from {} ignored: {}", addr, e);
                }
            }

            Packet::Heartbeat => {
                if client_id.is_none() {
                    debug!("Heartbeat from unknown address {}", addr);
                }
            }

            Packet::Disconnect => {
                if let Some(client_id) = client_id {
                    self.remove_player(client_id).await;
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    async fn handle_join(
        &mut self,
        client_version: u32,
        addr: SocketAddr,
        existing: Option<PlayerId>,
    ) {
        info!("Client joining from {} (version: {})", addr, client_version);

        if client_version != PROTOCOL_VERSION {
            warn!(
                "Refused {}: protocol version {} does not match {}",
                addr, client_version, PROTOCOL_VERSION
            );
            self.send_packet(Packet::Disconnect, addr);
            return;
        }

        // A repeated join from the same address replaces the old session
        if let Some(existing_id) = existing {
            info!("Removing existing client {} from {}", existing_id, addr);
            self.remove_player(existing_id).await;
        }

        let client_id = self.clients.write().await.add_client(addr, client_version);
        let Some(client_id) = client_id else {
            info!("Refused {}: server full", addr);
            self.send_packet(Packet::Disconnect, addr);
            return;
        };

        let joined = self.game.lock().await.add_player(client_id);
        match joined {
            Ok(()) => self.send_packet(Packet::PlayerId(client_id), addr),
            Err(e) => {
                warn!("Client {} could not join: {}", client_id, e);
                self.clients.write().await.remove_client(client_id);
                self.send_packet(Packet::Disconnect, addr);
            }
        }
    }

    /// Releases everything held for a player and tells the others.
    async fn remove_player(&mut self, client_id: PlayerId) {
        self.clients.write().await.remove_client(client_id);
        let had_vehicle = self.game.lock().await.remove_player(client_id);
        if had_vehicle {
            self.broadcast_packet(Packet::PlayerLeft(client_id), vec![client_id]);
        }
    }

    /// Advances the simulation and sends out this tick's packets.
    async fn tick(&mut self, dt: f32) {
        let (events, snapshot) = {
            let mut game = self.game.lock().await;
            game.update(dt);
            (game.drain_events(), game.get_game_state())
        };

        let mut corrected = Vec::new();
        for event in events {
            match event {
                ServerEvent::Correction {
                    player_id,
                    snapshot,
                } => {
                    debug!("Sending correction to player {}", player_id);
                    corrected.push(player_id);
                    self.queue(GameMessage::SendToClient {
                        packet: Packet::ServerValidation(snapshot),
                        client_id: player_id,
                    });
                }
                ServerEvent::Acknowledgement {
                    player_id,
                    snapshot,
                } => {
                    self.queue(GameMessage::SendToClient {
                        packet: Packet::ServerValidation(snapshot),
                        client_id: player_id,
                    });
                }
            }
        }

        if !self.clients.read().await.is_empty() {
            self.broadcast_packet(Packet::GameState(snapshot), corrected);
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();
        self.spawn_heartbeat();

        let mut tick_interval = interval(self.config.tick_duration());
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_tick = Instant::now();

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            self.remove_player(client_id).await;
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_tick).as_secs_f32().min(MAX_TICK_DELTA);
                    last_tick = now;

                    self.tick(dt).await;

                    let sequence = self.game.lock().await.sequence();
                    if sequence % 200 == 0 {
                        let client_count = self.clients.read().await.len();
                        debug!(
                            "Tick {}: {} clients, {:.1}Hz",
                            sequence,
                            client_count,
                            1.0 / dt.max(f32::EPSILON)
                        );
                    }
                },
            }
        }

        self.notify_shutdown().await;
        Ok(())
    }

    async fn notify_shutdown(&self) {
        let client_addrs = self.clients.read().await.get_client_addrs();
        for (client_id, addr) in client_addrs {
            if let Err(e) = send_packet_impl(&self.socket, &Packet::Disconnect, addr).await {
                warn!("Failed to notify client {} of shutdown: {}", client_id, e);
            }
        }
    }
}

async fn send_packet_impl(
    socket: &UdpSocket,
    packet: &Packet,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let data = encode(packet)?;
    socket.send_to(&data, addr).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::time::timeout;

    fn test_config() -> ServerConfig {
        ServerConfig {
            port: 0,
            max_players: 2,
            ..Default::default()
        }
    }

    async fn recv_packet(socket: &UdpSocket) -> Packet {
        let mut buffer = [0u8; MAX_PACKET_SIZE];
        let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buffer))
            .await
            .expect("no packet within timeout")
            .unwrap();
        decode(&buffer[..len]).unwrap()
    }

    async fn recv_matching<F: Fn(&Packet) -> bool>(socket: &UdpSocket, wanted: F) -> Packet {
        loop {
            let packet = recv_packet(socket).await;
            if wanted(&packet) {
                return packet;
            }
        }
    }

    async fn start_server(config: ServerConfig) -> (SocketAddr, Arc<Mutex<GameServer>>) {
        let mut server = Server::new(config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let game = server.game();
        tokio::spawn(async move {
            server.run().await.unwrap();
        });
        (addr, game)
    }

    async fn join(server_addr: SocketAddr, version: u32) -> UdpSocket {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let data = encode(&Packet::Join {
            client_version: version,
        })
        .unwrap();
        socket.send_to(&data, server_addr).await.unwrap();
        socket
    }

    #[test]
    fn test_game_message_broadcast() {
        let msg = GameMessage::BroadcastPacket {
            packet: Packet::PlayerLeft(3),
            exclude: vec![3],
        };

        match msg {
            GameMessage::BroadcastPacket { packet, exclude } => {
                assert_eq!(exclude, vec![3]);
                assert_eq!(packet, Packet::PlayerLeft(3));
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn test_server_message_creation() {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 8080);
        let msg = ServerMessage::PacketReceived {
            packet: Packet::Join { client_version: 1 },
            addr,
        };

        match msg {
            ServerMessage::PacketReceived { packet, addr: a } => {
                assert_eq!(a, addr);
                assert_eq!(packet, Packet::Join { client_version: 1 });
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let config = ServerConfig {
            tick_rate: 0,
            ..test_config()
        };
        assert!(Server::new(config).await.is_err());
    }

    #[tokio::test]
    async fn test_join_assigns_player_and_streams_state() {
        let (addr, game) = start_server(test_config()).await;
        let socket = join(addr, PROTOCOL_VERSION).await;

        let assigned = recv_matching(&socket, |p| matches!(p, Packet::PlayerId(_))).await;
        let Packet::PlayerId(player_id) = assigned else {
            unreachable!()
        };
        assert_eq!(player_id, 1);
        assert!(game.lock().await.has_player(player_id));

        let state = recv_matching(&socket, |p| matches!(p, Packet::GameState(_))).await;
        let Packet::GameState(snapshot) = state else {
            unreachable!()
        };
        assert!(snapshot.contains_vehicle(player_id));
        assert_eq!(snapshot.bodies.len(), 10);
    }

    #[tokio::test]
    async fn test_version_mismatch_is_refused() {
        let (addr, game) = start_server(test_config()).await;
        let socket = join(addr, PROTOCOL_VERSION + 1).await;

        assert_eq!(recv_packet(&socket).await, Packet::Disconnect);
        assert_eq!(game.lock().await.player_count(), 0);
    }

    #[tokio::test]
    async fn test_full_server_refuses_join() {
        let config = ServerConfig {
            max_players: 1,
            ..test_config()
        };
        let (addr, _game) = start_server(config).await;

        let first = join(addr, PROTOCOL_VERSION).await;
        recv_matching(&first, |p| matches!(p, Packet::PlayerId(_))).await;

        let second = join(addr, PROTOCOL_VERSION).await;
        assert_eq!(
            recv_matching(&second, |p| matches!(p, Packet::Disconnect)).await,
            Packet::Disconnect
        );
    }

    #[tokio::test]
    async fn test_disconnect_notifies_others() {
        let (addr, game) = start_server(test_config()).await;

        let first = join(addr, PROTOCOL_VERSION).await;
        recv_matching(&first, |p| matches!(p, Packet::PlayerId(_))).await;
        let second = join(addr, PROTOCOL_VERSION).await;
        recv_matching(&second, |p| matches!(p, Packet::PlayerId(_))).await;

        second
            .send_to(&encode(&Packet::Disconnect).unwrap(), addr)
            .await
            .unwrap();

        let left = recv_matching(&first, |p| matches!(p, Packet::PlayerLeft(_))).await;
        assert_eq!(left, Packet::PlayerLeft(2));
        assert!(!game.lock().await.has_player(2));
    }

    #[tokio::test]
    async fn test_malformed_datagram_keeps_connection() {
        let (addr, game) = start_server(test_config()).await;
        let socket = join(addr, PROTOCOL_VERSION).await;
        recv_matching(&socket, |p| matches!(p, Packet::PlayerId(_))).await;

        socket.send_to(&[0xff, 0xff, 0xff, 0xff, 1, 2], addr).await.unwrap();
        socket.send_to(&[1], addr).await.unwrap();

        recv_matching(&socket, |p| matches!(p, Packet::GameState(_))).await;
        assert!(game.lock().await.has_player(1));
    }
}
