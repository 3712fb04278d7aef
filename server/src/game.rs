//! Authoritative world state and client simulation validation.

use crate::config::ServerConfig;
use log::{debug, info, warn};
use rand::Rng;
use shared::{
    Color, MassiveBody, PhysicsEngine, PlayerId, PlayerInput, Vec2, Vehicle, VehicleState, World,
    WorldSnapshot, VEHICLE_COLLISION_RADIUS,
};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Initializing,
    Running,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum JoinError {
    #[error("server is not running")]
    NotRunning,

    #[error("player {0} already has a vehicle")]
    AlreadyJoined(PlayerId),

    #[error("all {0} vehicle slots are taken")]
    Full(usize),
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum InputError {
    #[error("server is not running")]
    NotRunning,

    #[error("player {0} has not joined")]
    UnknownPlayer(PlayerId),

    #[error("input from player {0} contains non-finite values")]
    Malformed(PlayerId),
}

/// Outbound work produced by a tick, addressed to one player.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// Authoritative state the player must adopt wholesale.
    Correction {
        player_id: PlayerId,
        snapshot: WorldSnapshot,
    },
    /// The player's last simulation report was accepted.
    Acknowledgement {
        player_id: PlayerId,
        snapshot: WorldSnapshot,
    },
}

impl ServerEvent {
    pub fn player_id(&self) -> PlayerId {
        match self {
            ServerEvent::Correction { player_id, .. }
            | ServerEvent::Acknowledgement { player_id, .. } => *player_id,
        }
    }
}

/// Validation bookkeeping for one joined player.
#[derive(Debug, Clone)]
struct ClientTracking {
    last_report: Option<WorldSnapshot>,
    /// Server time of the last input or report from this player.
    last_update: f32,
    valid: bool,
    awaiting_reply: bool,
}

impl ClientTracking {
    fn new(now: f32) -> Self {
        Self {
            last_report: None,
            last_update: now,
            valid: true,
            awaiting_reply: false,
        }
    }
}

pub struct GameServer {
    state: ServerState,
    world: World,
    engine: PhysicsEngine,
    /// Idle vehicles, one per slot, placed at their spawn point.
    pool: Vec<Vehicle>,
    slots: Vec<Option<PlayerId>>,
    tracking: HashMap<PlayerId, ClientTracking>,
    sequence: u32,
    time: f32,
    position_tolerance: f32,
    staleness_window: f32,
    events: Vec<ServerEvent>,
}

impl GameServer {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            state: ServerState::Initializing,
            world: World::new(),
            engine: PhysicsEngine::new(),
            pool: Vec::new(),
            slots: vec![None; config.max_players],
            tracking: HashMap::new(),
            sequence: 0,
            time: 0.0,
            position_tolerance: config.position_tolerance,
            staleness_window: config.staleness_window,
            events: Vec::new(),
        }
    }

    /// Builds the default solar system and starts running.
    pub fn initialize(&mut self) {
        self.start(World::solar_system());
    }

    /// Starts running with a custom set of bodies. The first body is the
    /// anchor.
    pub fn initialize_with_bodies(&mut self, bodies: Vec<MassiveBody>) {
        let mut world = World::new();
        for body in bodies {
            world.add_body(body);
        }
        self.start(world);
    }

    fn start(&mut self, world: World) {
        self.world = world;
        let slot_count = self.slots.len();
        self.pool = (0..slot_count)
            .map(|slot| {
                let (position, rotation) = spawn_point(&self.world, slot, slot_count);
                let mut vehicle = Vehicle::new(0, position, Color::WHITE);
                vehicle.set_rotation(rotation);
                vehicle.active = false;
                vehicle
            })
            .collect();
        self.state = ServerState::Running;
        info!(
            "World initialized with {} bodies and {} vehicle slots",
            self.world.bodies().len(),
            slot_count
        );
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ServerState::Running
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn vehicle(&self, player_id: PlayerId) -> Option<&Vehicle> {
        self.world.vehicle(player_id)
    }

    pub fn has_player(&self, player_id: PlayerId) -> bool {
        self.slots.contains(&Some(player_id))
    }

    pub fn player_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn free_slots(&self) -> usize {
        self.slots.len() - self.player_count()
    }

    /// Binds a free vehicle slot to `player_id`.
    pub fn add_player(&mut self, player_id: PlayerId) -> Result<(), JoinError> {
        if !self.is_running() {
            return Err(JoinError::NotRunning);
        }
        if self.has_player(player_id) {
            return Err(JoinError::AlreadyJoined(player_id));
        }
        let slot = self
            .slots
            .iter()
            .position(|s| s.is_none())
            .ok_or(JoinError::Full(self.slots.len()))?;

        let mut vehicle = self.pool[slot].clone();
        vehicle.player_id = player_id;
        vehicle.active = true;
        vehicle.last_state_timestamp = self.time;
        vehicle.color = random_color();

        info!(
            "Player {} took vehicle slot {} at ({:.1}, {:.1})",
            player_id,
            slot,
            vehicle.position().x,
            vehicle.position().y
        );
        self.world.add_vehicle(vehicle);
        self.slots[slot] = Some(player_id);
        self.tracking.insert(player_id, ClientTracking::new(self.time));
        Ok(())
    }

    /// Releases the player's slot. Returns false if the player had none.
    pub fn remove_player(&mut self, player_id: PlayerId) -> bool {
        let Some(slot) = self.slots.iter().position(|s| *s == Some(player_id)) else {
            return false;
        };
        self.slots[slot] = None;
        self.world.remove_vehicle(player_id);
        self.tracking.remove(&player_id);
        self.events.retain(|event| event.player_id() != player_id);
        info!("Player {} released vehicle slot {}", player_id, slot);
        true
    }

    pub fn handle_player_input(&mut self, input: &PlayerInput) -> Result<(), InputError> {
        if !self.is_running() {
            return Err(InputError::NotRunning);
        }
        let player_id = input.player_id;
        if !self.has_player(player_id) {
            warn!("Rejected input for unknown player {}", player_id);
            return Err(InputError::UnknownPlayer(player_id));
        }
        if !input.is_well_formed() {
            warn!("Rejected malformed input from player {}", player_id);
            return Err(InputError::Malformed(player_id));
        }

        if let Some(tracking) = self.tracking.get_mut(&player_id) {
            tracking.last_update = self.time;
        }
        if let Some(state) = &input.client_state {
            if !self.vehicle_state_matches(player_id, state) {
                self.mark_invalid(player_id);
            }
        }

        self.world.apply_input(input);
        Ok(())
    }

    /// Stores and validates a client's own simulation. The verdict goes out
    /// with the next tick.
    pub fn process_client_simulation(
        &mut self,
        player_id: PlayerId,
        snapshot: WorldSnapshot,
    ) -> Result<(), InputError> {
        if !self.has_player(player_id) {
            warn!("Rejected simulation report for unknown player {}", player_id);
            return Err(InputError::UnknownPlayer(player_id));
        }

        self.validate_client_simulation(player_id, &snapshot);
        if let Some(tracking) = self.tracking.get_mut(&player_id) {
            tracking.last_report = Some(snapshot);
            tracking.last_update = self.time;
            tracking.awaiting_reply = true;
        }
        Ok(())
    }

    /// Compares a client's report against the server vehicle.
    ///
    /// On divergence the player is marked invalid and the returned snapshot
    /// carries the server vehicle state flagged authoritative; otherwise the
    /// report is returned unchanged.
    pub fn validate_client_simulation(
        &mut self,
        player_id: PlayerId,
        snapshot: &WorldSnapshot,
    ) -> WorldSnapshot {
        let Some(vehicle) = self.world.vehicle(player_id) else {
            self.mark_invalid(player_id);
            return snapshot.clone();
        };
        let Some(reported) = snapshot.vehicle(player_id) else {
            return snapshot.clone();
        };

        if self.vehicle_state_matches(player_id, reported) {
            if let Some(tracking) = self.tracking.get_mut(&player_id) {
                tracking.valid = true;
            }
            return snapshot.clone();
        }

        let mut server_state = vehicle.create_state();
        server_state.timestamp = self.time;
        server_state.is_authoritative = true;
        debug!(
            "Player {} diverged: reported ({:.2}, {:.2}), server ({:.2}, {:.2})",
            player_id,
            reported.position.x,
            reported.position.y,
            server_state.position.x,
            server_state.position.y
        );
        self.mark_invalid(player_id);

        let mut corrected = snapshot.clone();
        corrected.vehicles = vec![server_state];
        corrected.is_authoritative = true;
        corrected
    }

    fn vehicle_state_matches(&self, player_id: PlayerId, reported: &VehicleState) -> bool {
        let Some(vehicle) = self.world.vehicle(player_id) else {
            return false;
        };
        let position_error = reported.position.distance(vehicle.position());
        let velocity_error = reported.velocity.distance(vehicle.velocity());
        position_error <= self.position_tolerance
            && velocity_error <= self.position_tolerance * 10.0
    }

    fn mark_invalid(&mut self, player_id: PlayerId) {
        if let Some(tracking) = self.tracking.get_mut(&player_id) {
            tracking.valid = false;
        }
    }

    /// Advances the authoritative simulation by one tick and queues the
    /// per-player verdicts for the network layer.
    pub fn update(&mut self, dt: f32) {
        if !self.is_running() {
            return;
        }

        self.engine.update(&mut self.world, dt);
        self.sequence = self.sequence.wrapping_add(1);
        self.time += dt;

        let now = self.time;
        let staleness_window = self.staleness_window;
        for (player_id, tracking) in self.tracking.iter_mut() {
            if tracking.valid && now - tracking.last_update > staleness_window {
                debug!(
                    "Player {} went {:.1}s without a report",
                    player_id,
                    now - tracking.last_update
                );
                tracking.valid = false;
            }
        }

        let mut player_ids: Vec<PlayerId> = self.tracking.keys().copied().collect();
        player_ids.sort_unstable();
        for player_id in player_ids {
            let (valid, awaiting_reply) = match self.tracking.get(&player_id) {
                Some(tracking) => (tracking.valid, tracking.awaiting_reply),
                None => continue,
            };

            if !valid {
                let snapshot = self.authoritative_state();
                self.events.push(ServerEvent::Correction {
                    player_id,
                    snapshot,
                });
                if let Some(tracking) = self.tracking.get_mut(&player_id) {
                    tracking.valid = true;
                    tracking.awaiting_reply = false;
                    tracking.last_update = now;
                }
            } else if awaiting_reply {
                let snapshot = self.get_game_state();
                self.events.push(ServerEvent::Acknowledgement {
                    player_id,
                    snapshot,
                });
                if let Some(tracking) = self.tracking.get_mut(&player_id) {
                    tracking.awaiting_reply = false;
                }
            }
        }
    }

    pub fn drain_events(&mut self) -> Vec<ServerEvent> {
        std::mem::take(&mut self.events)
    }

    /// Full snapshot of the current world, for broadcasting.
    pub fn get_game_state(&self) -> WorldSnapshot {
        WorldSnapshot {
            sequence: self.sequence,
            timestamp: self.time,
            is_authoritative: false,
            vehicles: self
                .world
                .vehicles
                .iter()
                .filter(|v| v.active)
                .map(|v| {
                    let mut state = v.create_state();
                    state.timestamp = self.time;
                    state.is_authoritative = true;
                    state
                })
                .collect(),
            bodies: self.world.body_states(self.time),
        }
    }

    pub fn authoritative_state(&self) -> WorldSnapshot {
        WorldSnapshot {
            is_authoritative: true,
            ..self.get_game_state()
        }
    }

    pub fn last_report(&self, player_id: PlayerId) -> Option<&WorldSnapshot> {
        self.tracking.get(&player_id)?.last_report.as_ref()
    }

    pub fn is_client_valid(&self, player_id: PlayerId) -> Option<bool> {
        self.tracking.get(&player_id).map(|t| t.valid)
    }
}

/// Spawn point of vehicle slot `slot`: on the anchor surface, spread evenly
/// around it, nose pointing away from the anchor.
fn spawn_point(world: &World, slot: usize, slot_count: usize) -> (Vec2, f32) {
    let angle = slot as f32 * 360.0 / slot_count.max(1) as f32;
    match world.anchor() {
        Some(anchor) => {
            let distance = anchor.radius() + VEHICLE_COLLISION_RADIUS;
            (anchor.position + Vec2::from_heading(angle) * distance, angle)
        }
        None => (Vec2::ZERO, angle),
    }
}

fn random_color() -> Color {
    let mut rng = rand::thread_rng();
    Color::rgb(
        rng.gen_range(64..=255),
        rng.gen_range(64..=255),
        rng.gen_range(64..=255),
    )
}
