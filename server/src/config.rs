//! Runtime settings of the authoritative server.

use std::time::Duration;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5000;
/// 20 Hz, one tick every 50 ms.
pub const DEFAULT_TICK_RATE: u32 = 20;
pub const DEFAULT_MAX_PLAYERS: usize = 16;
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);
/// Largest position difference tolerated between a client report and the
/// server state. Velocities get ten times this.
pub const DEFAULT_POSITION_TOLERANCE: f32 = 0.1;
/// Simulation seconds without a client report before it is corrected anyway.
pub const DEFAULT_STALENESS_WINDOW: f32 = 5.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub tick_rate: u32,
    pub max_players: usize,
    pub client_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub position_tolerance: f32,
    pub staleness_window: f32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            tick_rate: DEFAULT_TICK_RATE,
            max_players: DEFAULT_MAX_PLAYERS,
            client_timeout: DEFAULT_CLIENT_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            position_tolerance: DEFAULT_POSITION_TOLERANCE,
            staleness_window: DEFAULT_STALENESS_WINDOW,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 || self.tick_rate > 1000 {
            return Err(ConfigError::InvalidTickRate(self.tick_rate));
        }
        if self.max_players == 0 {
            return Err(ConfigError::NoPlayerSlots);
        }
        if self.client_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("client_timeout"));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("heartbeat_interval"));
        }
        if !(self.position_tolerance > 0.0 && self.position_tolerance.is_finite()) {
            return Err(ConfigError::InvalidTolerance(self.position_tolerance));
        }
        if !(self.staleness_window > 0.0 && self.staleness_window.is_finite()) {
            return Err(ConfigError::InvalidTolerance(self.staleness_window));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("tick rate must be between 1 and 1000 Hz, got {0}")]
    InvalidTickRate(u32),

    #[error("server needs at least one player slot")]
    NoPlayerSlots,

    #[error("{0} must be longer than zero")]
    ZeroDuration(&'static str),

    #[error("tolerance must be a positive number, got {0}")]
    InvalidTolerance(f32),
}
