use crate::config::{ClientConfig, MAX_FRAME_DELTA};
use crate::game::{ClientGame, ConnectionState};
use crate::input::{InputManager, InputSource};
use log::{debug, error, info, warn};
use shared::{decode, encode, Packet, MAX_PACKET_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time::{interval, sleep, MissedTickBehavior};

/// Connection quality counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientStats {
    /// Round trip of the last simulation upload to its validation reply.
    pub ping_ms: u64,
    pub packets_sent: u64,
    pub packets_received: u64,
    pub send_failures: u64,
    pub malformed_packets: u64,
    /// World broadcasts skipped over in the sequence numbering.
    pub lost_snapshots: u64,
}

impl ClientStats {
    /// Fraction of world broadcasts that never arrived or failed to send.
    pub fn packet_loss(&self) -> f32 {
        let lost = self.lost_snapshots + self.send_failures;
        let total = self.packets_received + lost;
        if total == 0 {
            0.0
        } else {
            lost as f32 / total as f32
        }
    }
}

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    config: ClientConfig,

    game: ClientGame,
    input_manager: InputManager,
    input_source: Box<dyn InputSource>,

    stats: ClientStats,
    last_received: Instant,
    upload_sent_at: Option<Instant>,
    started: Instant,
}

impl Client {
    pub async fn new(
        config: ClientConfig,
        input_source: Box<dyn InputSource>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        config.validate()?;
        let server_addr: SocketAddr = config.server_addr.parse()?;
        let bind_addr = if server_addr.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = UdpSocket::bind(bind_addr).await?;

        Ok(Client {
            socket,
            server_addr,
            game: ClientGame::new(&config),
            config,
            input_manager: InputManager::new(),
            input_source,
            stats: ClientStats::default(),
            last_received: Instant::now(),
            upload_sent_at: None,
            started: Instant::now(),
        })
    }

    pub fn game(&self) -> &ClientGame {
        &self.game
    }

    pub fn stats(&self) -> &ClientStats {
        &self.stats
    }

    async fn connect(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Connecting to server at {}...", self.server_addr);
        self.game.set_connection_state(ConnectionState::Connecting);
        self.last_received = Instant::now();

        let packet = Packet::Join {
            client_version: PROTOCOL_VERSION,
        };
        self.send_packet(&packet).await?;
        self.game
            .set_connection_state(ConnectionState::WaitingForIdentity);

        Ok(())
    }

    async fn send_packet(&mut self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        if self.config.fake_ping_ms > 0 {
            sleep(Duration::from_millis(self.config.fake_ping_ms / 2)).await;
        }

        let data = encode(packet)?;
        match self.socket.send_to(&data, self.server_addr).await {
            Ok(_) => {
                self.stats.packets_sent += 1;
                Ok(())
            }
            Err(e) => {
                self.stats.send_failures += 1;
                Err(e.into())
            }
        }
    }

    /// Returns false once the server has ended the session.
    fn handle_packet(&mut self, packet: Packet) -> bool {
        match packet {
            Packet::PlayerId(player_id) => {
                info!("Joined as player {}", player_id);
                self.game.set_local_player_id(player_id);
            }

            Packet::GameState(snapshot) => {
                let sequence = snapshot.sequence;
                let previous = self.game.last_sequence();
                if self.game.process_game_state(snapshot) {
                    if let Some(previous) = previous {
                        self.stats.lost_snapshots +=
                            u64::from(sequence.saturating_sub(previous).saturating_sub(1));
                    }
                }
            }

            Packet::ServerValidation(snapshot) => {
                if let Some(sent_at) = self.upload_sent_at.take() {
                    self.stats.ping_ms = sent_at.elapsed().as_millis() as u64;
                }
                self.game.process_server_validation(snapshot);
            }

            Packet::PlayerLeft(player_id) => {
                self.game.remove_remote_player(player_id);
            }

            Packet::Heartbeat => {}

            Packet::Disconnect => {
                warn!("Server closed the connection");
                self.game.disconnect();
                return false;
            }

            other => {
                warn!("Unexpected {:?} packet from server", other.message_type());
            }
        }
        true
    }

    /// Samples input, predicts locally and ships whatever is due.
    async fn frame(&mut self, dt: f32) {
        let elapsed = self.started.elapsed().as_secs_f32();
        let controls = self.input_source.sample(elapsed);

        let player_id = self
            .game
            .local_player_id()
            .filter(|_| self.game.is_connected());
        if let Some(player_id) = player_id {
            let server_timestamp = self.game.reference_state().map_or(0.0, |s| s.timestamp);
            let input = self.input_manager.update(
                &controls,
                player_id,
                dt,
                self.game.simulation_time(),
                server_timestamp,
            );
            self.game.apply_local_input(&input);
            if let Err(e) = self.send_packet(&Packet::PlayerInput(input)).await {
                error!("Error sending input: {}", e);
            }
        }

        self.game.update(dt);

        if let Some(upload) = self.game.take_pending_upload() {
            self.upload_sent_at = Some(Instant::now());
            if let Err(e) = self.send_packet(&Packet::ClientSimulation(upload)).await {
                error!("Error sending simulation report: {}", e);
            }
        }
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.run_for(None).await
    }

    /// Runs the session until the server disconnects, goes silent, or
    /// `limit` elapses.
    pub async fn run_for(
        &mut self,
        limit: Option<Duration>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        self.connect().await?;

        let started = Instant::now();
        let mut frame_interval = interval(Duration::from_secs_f32(self.config.frame_time()));
        frame_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut heartbeat_interval = interval(self.config.heartbeat_interval);
        let mut timeout_interval = interval(Duration::from_millis(250));
        let mut last_frame = Instant::now();

        let mut buffer = [0u8; MAX_PACKET_SIZE];

        loop {
            if limit.map_or(false, |limit| started.elapsed() >= limit) {
                break;
            }

            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, addr)) if addr == self.server_addr => {
                            if self.config.fake_ping_ms > 0 {
                                sleep(Duration::from_millis(self.config.fake_ping_ms / 2)).await;
                            }
                            self.last_received = Instant::now();

                            match decode(&buffer[..len]) {
                                Ok(packet) => {
                                    self.stats.packets_received += 1;
                                    if !self.handle_packet(packet) {
                                        break;
                                    }
                                }
                                Err(e) => {
                                    self.stats.malformed_packets += 1;
                                    warn!("Dropping malformed datagram: {}", e);
                                }
                            }
                        },
                        Ok((_, addr)) => debug!("Ignoring datagram from {}", addr),
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                _ = frame_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_frame).as_secs_f32().min(MAX_FRAME_DELTA);
                    last_frame = now;
                    self.frame(dt).await;
                },

                _ = heartbeat_interval.tick() => {
                    if self.game.local_player_id().is_some() {
                        if let Err(e) = self.send_packet(&Packet::Heartbeat).await {
                            debug!("Heartbeat failed: {}", e);
                        }
                    }
                },

                _ = timeout_interval.tick() => {
                    if self.last_received.elapsed() > self.config.connection_timeout {
                        warn!(
                            "No response from server for {:.1}s, giving up",
                            self.config.connection_timeout.as_secs_f32()
                        );
                        self.game.disconnect();
                        break;
                    }
                },
            }
        }

        Ok(())
    }

    /// Tells the server this client is leaving and resets local state.
    pub async fn disconnect(&mut self) {
        if self.game.local_player_id().is_some() {
            if let Err(e) = self.send_packet(&Packet::Disconnect).await {
                warn!("Failed to notify server of disconnect: {}", e);
            }
        }
        self.game.disconnect();
        info!(
            "Session ended: ping {}ms, {} sent, {} received, {:.1}% loss",
            self.stats.ping_ms,
            self.stats.packets_sent,
            self.stats.packets_received,
            self.stats.packet_loss() * 100.0
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::IdleInput;
    use tokio_test::assert_ok;

    #[test]
    fn test_packet_loss_ratio() {
        let stats = ClientStats {
            packets_received: 18,
            lost_snapshots: 2,
            ..Default::default()
        };
        assert!((stats.packet_loss() - 0.1).abs() < 1e-6);
        assert_eq!(ClientStats::default().packet_loss(), 0.0);
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let config = ClientConfig {
            tick_rate: 0,
            ..Default::default()
        };
        assert!(Client::new(config, Box::new(IdleInput)).await.is_err());
    }

    #[tokio::test]
    async fn test_joins_and_receives_state() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let config = ClientConfig {
            server_addr: server.local_addr().unwrap().to_string(),
            ..Default::default()
        };
        let mut client = Client::new(config, Box::new(IdleInput)).await.unwrap();

        let fake_server = tokio::spawn(async move {
            let mut buffer = [0u8; MAX_PACKET_SIZE];
            let (len, addr) = server.recv_from(&mut buffer).await.unwrap();
            assert_eq!(
                decode(&buffer[..len]).unwrap(),
                Packet::Join {
                    client_version: PROTOCOL_VERSION
                }
            );

            server
                .send_to(&encode(&Packet::PlayerId(7)).unwrap(), addr)
                .await
                .unwrap();
            let snapshot = shared::WorldSnapshot {
                sequence: 1,
                timestamp: 2.0,
                ..Default::default()
            };
            server
                .send_to(&encode(&Packet::GameState(snapshot)).unwrap(), addr)
                .await
                .unwrap();
            server.send_to(&[0xff, 0xff], addr).await.unwrap();

            tokio::time::sleep(Duration::from_millis(150)).await;
            server
                .send_to(&encode(&Packet::Disconnect).unwrap(), addr)
                .await
                .unwrap();
        });

        assert_ok!(client.run_for(Some(Duration::from_secs(3))).await);
        fake_server.await.unwrap();

        assert_eq!(client.stats().malformed_packets, 1);
        assert!(client.stats().packets_received >= 3);
        assert_eq!(client.game().connection_state(), ConnectionState::Disconnected);
    }
}
