//! Client-side world: prediction of the own vehicle, adoption of server
//! corrections and interpolation of everybody else.

use crate::config::ClientConfig;
use log::{debug, info, warn};
use shared::{
    PhysicsEngine, PlayerId, PlayerInput, Vec2, Vehicle, VehicleState, World, WorldSnapshot,
};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    WaitingForIdentity,
    WaitingForInitialState,
    Connected,
}

/// Blend window of one remote vehicle between two received states.
#[derive(Debug, Clone, PartialEq)]
struct RemoteVehicle {
    from_position: Vec2,
    from_velocity: Vec2,
    to_position: Vec2,
    to_velocity: Vec2,
    /// Local simulation time the target state arrived at.
    received_at: f32,
}

impl RemoteVehicle {
    fn settled(state: &VehicleState, now: f32) -> Self {
        Self {
            from_position: state.position,
            from_velocity: state.velocity,
            to_position: state.position,
            to_velocity: state.velocity,
            received_at: now,
        }
    }
}

pub struct ClientGame {
    state: ConnectionState,
    local_player_id: Option<PlayerId>,
    world: World,
    engine: PhysicsEngine,
    last_sequence: Option<u32>,
    /// Last ordinary snapshot accepted from the server.
    reference_state: Option<WorldSnapshot>,
    remotes: HashMap<PlayerId, RemoteVehicle>,
    latency_compensation: f32,
    local_simulation: WorldSnapshot,
    simulation_time: f32,
    paused: bool,
    sync_interval: f32,
    since_sync: f32,
    validation_timeout: f32,
    /// Simulation time the outstanding upload was made at.
    pending_since: Option<f32>,
    pending_upload: Option<WorldSnapshot>,
}

impl ClientGame {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            local_player_id: None,
            world: World::solar_system(),
            engine: PhysicsEngine::new(),
            last_sequence: None,
            reference_state: None,
            remotes: HashMap::new(),
            latency_compensation: config.latency_compensation,
            local_simulation: WorldSnapshot::default(),
            simulation_time: 0.0,
            paused: false,
            sync_interval: config.sync_interval,
            since_sync: 0.0,
            validation_timeout: config.validation_timeout,
            pending_since: None,
            pending_upload: None,
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state
    }

    pub fn set_connection_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!("Connection state {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn local_player_id(&self) -> Option<PlayerId> {
        self.local_player_id
    }

    /// Adopts the identity assigned by the server and scopes local physics
    /// to it.
    pub fn set_local_player_id(&mut self, player_id: PlayerId) {
        info!("Assigned player id {}", player_id);
        self.local_player_id = Some(player_id);
        self.engine.set_scope(Some(player_id));
        if self.state != ConnectionState::Connected {
            self.set_connection_state(ConnectionState::WaitingForInitialState);
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn local_vehicle(&self) -> Option<&Vehicle> {
        self.world.vehicle(self.local_player_id?)
    }

    pub fn remote_player_ids(&self) -> Vec<PlayerId> {
        let mut ids: Vec<PlayerId> = self
            .world
            .vehicles
            .iter()
            .map(|v| v.player_id)
            .filter(|id| Some(*id) != self.local_player_id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn simulation_time(&self) -> f32 {
        self.simulation_time
    }

    pub fn last_sequence(&self) -> Option<u32> {
        self.last_sequence
    }

    pub fn reference_state(&self) -> Option<&WorldSnapshot> {
        self.reference_state.as_ref()
    }

    pub fn local_simulation(&self) -> &WorldSnapshot {
        &self.local_simulation
    }

    pub fn is_pending_validation(&self) -> bool {
        self.pending_since.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Handles a GAME_STATE broadcast. Returns false if it was discarded.
    pub fn process_game_state(&mut self, snapshot: WorldSnapshot) -> bool {
        let Some(local_id) = self.local_player_id else {
            debug!("Ignoring snapshot {} before identity", snapshot.sequence);
            return false;
        };
        if !snapshot.is_newer_than(self.last_sequence) {
            debug!(
                "Discarding snapshot {} (last accepted {:?})",
                snapshot.sequence, self.last_sequence
            );
            return false;
        }
        self.last_sequence = Some(snapshot.sequence);

        if snapshot.is_authoritative {
            self.apply_correction(&snapshot);
            return true;
        }

        if self.state != ConnectionState::Connected {
            self.adopt_initial_state(&snapshot);
            info!(
                "Received initial state at t={:.2}s with {} bodies",
                snapshot.timestamp,
                snapshot.bodies.len()
            );
            self.set_connection_state(ConnectionState::Connected);
            self.reference_state = Some(snapshot);
            return true;
        }

        self.world.replace_bodies(&snapshot.bodies);
        let now = self.simulation_time;
        for state in &snapshot.vehicles {
            if state.player_id == local_id {
                if self.world.vehicle(local_id).is_none() {
                    self.world.add_vehicle(Vehicle::from_state(state));
                }
                continue;
            }

            match self.world.vehicle_mut(state.player_id) {
                Some(vehicle) => {
                    let remote = RemoteVehicle {
                        from_position: vehicle.position(),
                        from_velocity: vehicle.velocity(),
                        to_position: state.position,
                        to_velocity: state.velocity,
                        received_at: now,
                    };
                    vehicle.overwrite_state(state);
                    vehicle.set_position(remote.from_position);
                    vehicle.set_velocity(remote.from_velocity);
                    self.remotes.insert(state.player_id, remote);
                }
                None => {
                    debug!("Player {} appeared", state.player_id);
                    self.world.add_vehicle(Vehicle::from_state(state));
                    self.remotes
                        .insert(state.player_id, RemoteVehicle::settled(state, now));
                }
            }
        }

        let departed: Vec<PlayerId> = self
            .remote_player_ids()
            .into_iter()
            .filter(|id| !snapshot.contains_vehicle(*id))
            .collect();
        for player_id in departed {
            self.remove_remote_player(player_id);
        }

        self.reference_state = Some(snapshot);
        true
    }

    /// Handles the server's answer to an uploaded simulation.
    pub fn process_server_validation(&mut self, snapshot: WorldSnapshot) {
        if let Some(since) = self.pending_since.take() {
            debug!(
                "Validation answered after {:.3}s",
                self.simulation_time - since
            );
        }

        if !snapshot.is_authoritative {
            return;
        }
        if !snapshot.is_newer_than(self.last_sequence) {
            debug!(
                "Discarding stale correction {} (last accepted {:?})",
                snapshot.sequence, self.last_sequence
            );
            return;
        }
        info!("Server corrected local simulation at t={:.2}s", snapshot.timestamp);
        self.last_sequence = Some(snapshot.sequence);
        self.apply_correction(&snapshot);
    }

    /// Replaces local state wholesale with an authoritative snapshot.
    fn apply_correction(&mut self, snapshot: &WorldSnapshot) {
        self.paused = true;

        let local_vehicle = self
            .local_player_id
            .and_then(|id| self.world.remove_vehicle(id));

        self.world.replace_bodies(&snapshot.bodies);
        self.world.vehicles.clear();
        self.remotes.clear();
        for state in &snapshot.vehicles {
            self.world.add_vehicle(Vehicle::from_state(state));
            if Some(state.player_id) != self.local_player_id {
                self.remotes
                    .insert(state.player_id, RemoteVehicle::settled(state, snapshot.timestamp));
            }
        }
        if let Some(vehicle) = local_vehicle {
            if self.world.vehicle(vehicle.player_id).is_none() {
                self.world.add_vehicle(vehicle);
            }
        }

        self.simulation_time = snapshot.timestamp;
        self.local_simulation = snapshot.clone();
        self.pending_since = None;
        self.pending_upload = None;
        self.since_sync = 0.0;
        if self.local_player_id.is_some() {
            self.set_connection_state(ConnectionState::Connected);
        }

        self.paused = false;
    }

    fn adopt_initial_state(&mut self, snapshot: &WorldSnapshot) {
        self.world = World::new();
        self.world.replace_bodies(&snapshot.bodies);
        self.remotes.clear();
        for state in &snapshot.vehicles {
            self.world.add_vehicle(Vehicle::from_state(state));
            if Some(state.player_id) != self.local_player_id {
                self.remotes
                    .insert(state.player_id, RemoteVehicle::settled(state, snapshot.timestamp));
            }
        }
        self.simulation_time = snapshot.timestamp;
        self.since_sync = 0.0;
        self.refresh_local_simulation();
    }

    /// Removes a remote player and its interpolation entry. The own vehicle
    /// is never removed this way.
    pub fn remove_remote_player(&mut self, player_id: PlayerId) -> bool {
        if Some(player_id) == self.local_player_id {
            return false;
        }
        self.remotes.remove(&player_id);
        let removed = self.world.remove_vehicle(player_id).is_some();
        if removed {
            debug!("Player {} left", player_id);
        }
        removed
    }

    /// Applies an input to the own vehicle right away. Returns false when
    /// there is nothing to apply it to yet.
    pub fn apply_local_input(&mut self, input: &PlayerInput) -> bool {
        if !self.is_connected() || self.paused {
            return false;
        }
        let Some(local_id) = self.local_player_id else {
            return false;
        };
        let input = PlayerInput {
            player_id: local_id,
            ..input.clone()
        };
        self.world.apply_input(&input)
    }

    pub fn update(&mut self, dt: f32) {
        if !(dt > 0.0 && dt.is_finite()) || self.paused {
            return;
        }

        if !self.is_connected() {
            // Only the cosmetic bootstrap bodies move until the first snapshot.
            self.engine.update(&mut self.world, dt);
            return;
        }

        self.simulation_time += dt;
        self.engine.update(&mut self.world, dt);
        self.interpolate_remote_players(self.simulation_time);
        self.refresh_local_simulation();

        if let Some(since) = self.pending_since {
            if self.simulation_time - since > self.validation_timeout {
                warn!(
                    "No validation reply within {:.1}s, resuming uploads",
                    self.validation_timeout
                );
                self.pending_since = None;
            }
        }

        self.since_sync += dt;
        if self.since_sync >= self.sync_interval && self.pending_since.is_none() {
            self.since_sync = 0.0;
            if self.local_vehicle().is_some() {
                self.pending_upload = Some(self.local_simulation.clone());
                self.pending_since = Some(self.simulation_time);
            }
        }
    }

    /// Moves every remote vehicle between its last two received states.
    pub fn interpolate_remote_players(&mut self, now: f32) {
        let latency = self.latency_compensation;
        let world = &mut self.world;
        self.remotes.retain(|player_id, remote| {
            let Some(vehicle) = world.vehicle_mut(*player_id) else {
                return false;
            };
            let factor = ((now - remote.received_at) / latency).clamp(0.0, 1.0);
            vehicle.set_position(remote.from_position.lerp(remote.to_position, factor));
            vehicle.set_velocity(remote.from_velocity.lerp(remote.to_velocity, factor));
            true
        });
    }

    fn refresh_local_simulation(&mut self) {
        let vehicles = self
            .local_vehicle()
            .map(|vehicle| {
                let mut state = vehicle.create_state();
                state.timestamp = self.simulation_time;
                state.is_authoritative = false;
                vec![state]
            })
            .unwrap_or_default();

        self.local_simulation = WorldSnapshot {
            sequence: self.last_sequence.unwrap_or(0),
            timestamp: self.simulation_time,
            is_authoritative: false,
            vehicles,
            bodies: self.world.body_states(self.simulation_time),
        };
    }

    /// Snapshot due for upload, if the sync interval elapsed.
    pub fn take_pending_upload(&mut self) -> Option<WorldSnapshot> {
        self.pending_upload.take()
    }

    /// Forgets the session and goes back to the bootstrap world.
    pub fn disconnect(&mut self) {
        self.set_connection_state(ConnectionState::Disconnected);
        self.local_player_id = None;
        self.engine.set_scope(None);
        self.world = World::solar_system();
        self.last_sequence = None;
        self.reference_state = None;
        self.remotes.clear();
        self.pending_since = None;
        self.pending_upload = None;
        self.paused = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::{BodyId, BodyState, Color, VehicleKind};

    fn vehicle_state(player_id: PlayerId, position: Vec2, timestamp: f32) -> VehicleState {
        VehicleState {
            player_id,
            mode: VehicleKind::Rocket,
            position,
            velocity: Vec2::ZERO,
            rotation: 0.0,
            angular_velocity: 0.0,
            thrust_level: 0.0,
            mass: 1.0,
            color: Color::WHITE,
            timestamp,
            is_authoritative: true,
        }
    }

    fn anchor_state(timestamp: f32) -> BodyState {
        BodyState {
            id: BodyId(0),
            position: Vec2::new(400.0, 300.0),
            velocity: Vec2::ZERO,
            mass: 50000.0,
            radius: 100.0,
            color: Color::YELLOW,
            owner: None,
            timestamp,
        }
    }

    fn snapshot(sequence: u32, timestamp: f32, vehicles: Vec<VehicleState>) -> WorldSnapshot {
        WorldSnapshot {
            sequence,
            timestamp,
            is_authoritative: false,
            vehicles,
            bodies: vec![anchor_state(timestamp)],
        }
    }

    fn connected_game(local_id: PlayerId) -> ClientGame {
        let mut game = ClientGame::new(&ClientConfig::default());
        game.set_local_player_id(local_id);
        let initial = snapshot(
            1,
            1.0,
            vec![vehicle_state(local_id, Vec2::new(400.0, 100.0), 1.0)],
        );
        assert!(game.process_game_state(initial));
        game
    }

    #[test]
    fn test_connection_states() {
        let mut game = ClientGame::new(&ClientConfig::default());
        assert_eq!(game.connection_state(), ConnectionState::Disconnected);

        assert!(!game.process_game_state(snapshot(1, 0.0, Vec::new())));

        game.set_local_player_id(4);
        assert_eq!(game.connection_state(), ConnectionState::WaitingForInitialState);
        assert!(game.process_game_state(snapshot(1, 0.0, Vec::new())));
        assert_eq!(game.connection_state(), ConnectionState::Connected);

        game.disconnect();
        assert_eq!(game.connection_state(), ConnectionState::Disconnected);
        assert_eq!(game.local_player_id(), None);
    }

    #[test]
    fn test_bootstrap_bodies_move_before_connecting() {
        let mut game = ClientGame::new(&ClientConfig::default());
        let before = game.world().bodies()[1].position;
        game.update(0.1);
        assert_ne!(game.world().bodies()[1].position, before);
        assert_eq!(game.simulation_time(), 0.0);
    }

    #[test]
    fn test_sequence_monotonicity() {
        let mut game = connected_game(1);
        assert!(game.process_game_state(snapshot(5, 1.5, Vec::new())));
        assert!(!game.process_game_state(snapshot(3, 1.6, Vec::new())));
        assert!(game.process_game_state(snapshot(7, 1.7, Vec::new())));
        assert_eq!(game.last_sequence(), Some(7));
    }

    #[test]
    fn test_ordinary_snapshot_leaves_own_vehicle() {
        let mut game = connected_game(1);
        let own_position = game.local_vehicle().unwrap().position();

        let update = snapshot(2, 1.05, vec![vehicle_state(1, Vec2::new(0.0, 0.0), 1.05)]);
        assert!(game.process_game_state(update));
        assert_eq!(game.local_vehicle().unwrap().position(), own_position);
    }

    #[test]
    fn test_remote_vehicles_appear_and_vanish() {
        let mut game = connected_game(1);
        let with_remote = snapshot(
            2,
            1.05,
            vec![
                vehicle_state(1, Vec2::new(400.0, 100.0), 1.05),
                vehicle_state(2, Vec2::new(100.0, 100.0), 1.05),
            ],
        );
        game.process_game_state(with_remote);
        assert_eq!(game.remote_player_ids(), vec![2]);

        let without = snapshot(3, 1.1, vec![vehicle_state(1, Vec2::new(400.0, 100.0), 1.1)]);
        game.process_game_state(without);
        assert!(game.remote_player_ids().is_empty());
        assert!(game.local_vehicle().is_some());
    }

    #[test]
    fn test_remote_interpolation() {
        let mut game = connected_game(1);
        let first = snapshot(
            2,
            1.0,
            vec![
                vehicle_state(1, Vec2::new(400.0, 100.0), 1.0),
                vehicle_state(2, Vec2::new(0.0, 0.0), 1.0),
            ],
        );
        game.process_game_state(first);

        let second = snapshot(
            3,
            1.05,
            vec![
                vehicle_state(1, Vec2::new(400.0, 100.0), 1.05),
                vehicle_state(2, Vec2::new(10.0, 0.0), 1.05),
            ],
        );
        game.process_game_state(second);
        let received_at = game.simulation_time();

        game.interpolate_remote_players(received_at);
        assert_approx_eq!(game.world().vehicle(2).unwrap().position().x, 0.0);

        game.interpolate_remote_players(received_at + 0.025);
        assert_approx_eq!(game.world().vehicle(2).unwrap().position().x, 5.0, 1e-3);

        game.interpolate_remote_players(received_at + 1.0);
        assert_approx_eq!(game.world().vehicle(2).unwrap().position().x, 10.0);
    }

    #[test]
    fn test_leave_notification_removes_remote() {
        let mut game = connected_game(1);
        game.process_game_state(snapshot(
            2,
            1.05,
            vec![
                vehicle_state(1, Vec2::new(400.0, 100.0), 1.05),
                vehicle_state(2, Vec2::new(0.0, 0.0), 1.05),
            ],
        ));
        assert!(game.remove_remote_player(2));
        assert!(!game.remove_remote_player(2));
        assert!(!game.remove_remote_player(1));
        assert!(game.local_vehicle().is_some());
    }

    #[test]
    fn test_upload_waits_for_validation() {
        let mut game = connected_game(1);
        for _ in 0..7 {
            game.update(1.0 / 60.0);
        }
        let upload = game.take_pending_upload().expect("upload after sync interval");
        assert!(upload.contains_vehicle(1));
        assert!(!upload.is_authoritative);
        assert!(game.is_pending_validation());

        for _ in 0..12 {
            game.update(1.0 / 60.0);
        }
        assert!(game.take_pending_upload().is_none());

        let mut ack = upload.clone();
        ack.sequence = 2;
        game.process_server_validation(ack);
        assert!(!game.is_pending_validation());

        for _ in 0..7 {
            game.update(1.0 / 60.0);
        }
        assert!(game.take_pending_upload().is_some());
    }

    #[test]
    fn test_validation_wait_gives_up() {
        let mut game = connected_game(1);
        for _ in 0..7 {
            game.update(1.0 / 60.0);
        }
        assert!(game.take_pending_upload().is_some());

        for _ in 0..80 {
            game.update(1.0 / 60.0);
        }
        assert!(game.take_pending_upload().is_some());
    }

    #[test]
    fn test_correction_overwrites_prediction() {
        let mut game = connected_game(1);
        let input = PlayerInput {
            thrust_forward: true,
            thrust_level: 1.0,
            delta_time: 1.0 / 60.0,
            ..Default::default()
        };
        for _ in 0..12 {
            assert!(game.apply_local_input(&input));
            game.update(1.0 / 60.0);
        }
        let predicted = game.local_vehicle().unwrap().position();
        assert_ne!(predicted, Vec2::new(400.0, 100.0));

        let corrected = vec![vehicle_state(1, Vec2::new(400.0, 100.0), 1.05)];
        let mut correction = snapshot(2, 1.05, corrected);
        correction.is_authoritative = true;
        assert!(game.process_game_state(correction));

        let vehicle = game.local_vehicle().unwrap();
        assert_eq!(vehicle.position(), Vec2::new(400.0, 100.0));
        assert_eq!(vehicle.velocity(), Vec2::ZERO);
        assert_approx_eq!(game.simulation_time(), 1.05);
        assert!(!game.is_paused());
    }

    #[test]
    fn test_validation_correction_resets_clock() {
        let mut game = connected_game(1);
        for _ in 0..30 {
            game.update(1.0 / 60.0);
        }
        let mut correction = snapshot(9, 1.2, vec![vehicle_state(1, Vec2::new(10.0, 10.0), 1.2)]);
        correction.is_authoritative = true;
        game.process_server_validation(correction);

        assert_approx_eq!(game.simulation_time(), 1.2);
        assert_eq!(game.last_sequence(), Some(9));
        assert_eq!(game.local_vehicle().unwrap().position(), Vec2::new(10.0, 10.0));
        assert!(game.local_simulation().is_authoritative);
    }

    #[test]
    fn test_stale_validation_correction_is_discarded() {
        let mut game = connected_game(1);
        let latest = vec![vehicle_state(1, Vec2::new(420.0, 100.0), 5.0)];
        assert!(game.process_game_state(snapshot(10, 5.0, latest)));
        for _ in 0..12 {
            game.update(1.0 / 60.0);
        }
        let time_before = game.simulation_time();
        let position_before = game.local_vehicle().unwrap().position();

        let mut stale = snapshot(8, 4.9, vec![vehicle_state(1, Vec2::new(-50.0, -50.0), 4.9)]);
        stale.is_authoritative = true;
        game.process_server_validation(stale);

        assert_eq!(game.simulation_time(), time_before);
        assert_eq!(game.last_sequence(), Some(10));
        assert_eq!(game.local_vehicle().unwrap().position(), position_before);
        assert!(!game.is_pending_validation());
    }

    #[test]
    fn test_input_ignored_before_connected() {
        let mut game = ClientGame::new(&ClientConfig::default());
        let input = PlayerInput {
            thrust_forward: true,
            thrust_level: 1.0,
            ..Default::default()
        };
        assert!(!game.apply_local_input(&input));
    }
}
