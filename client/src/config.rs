//! Runtime settings of the predicting client.

use std::time::Duration;

pub const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:5000";
pub const DEFAULT_TICK_RATE: u32 = 60;
/// Seconds between two uploads of the local simulation.
pub const DEFAULT_SYNC_INTERVAL: f32 = 0.1;
/// Seconds a remote vehicle takes to blend into a newly received state.
pub const DEFAULT_LATENCY_COMPENSATION: f32 = 0.05;
/// Seconds to wait for a validation reply before uploading again.
pub const DEFAULT_VALIDATION_TIMEOUT: f32 = 1.0;
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);
/// Largest frame delta fed into the simulation after a stall.
pub const MAX_FRAME_DELTA: f32 = 0.25;

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub server_addr: String,
    pub tick_rate: u32,
    pub sync_interval: f32,
    pub latency_compensation: f32,
    pub validation_timeout: f32,
    pub connection_timeout: Duration,
    pub heartbeat_interval: Duration,
    /// Artificial round trip added to every datagram, split evenly between
    /// sending and receiving.
    pub fake_ping_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: DEFAULT_SERVER_ADDR.to_string(),
            tick_rate: DEFAULT_TICK_RATE,
            sync_interval: DEFAULT_SYNC_INTERVAL,
            latency_compensation: DEFAULT_LATENCY_COMPENSATION,
            validation_timeout: DEFAULT_VALIDATION_TIMEOUT,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            fake_ping_ms: 0,
        }
    }
}

impl ClientConfig {
    pub fn frame_time(&self) -> f32 {
        1.0 / self.tick_rate.max(1) as f32
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::InvalidAddress(self.server_addr.clone()));
        }
        if self.tick_rate == 0 || self.tick_rate > 1000 {
            return Err(ConfigError::InvalidTickRate(self.tick_rate));
        }
        for (name, value) in [
            ("sync_interval", self.sync_interval),
            ("latency_compensation", self.latency_compensation),
            ("validation_timeout", self.validation_timeout),
        ] {
            if !(value > 0.0 && value.is_finite()) {
                return Err(ConfigError::InvalidInterval(name, value));
            }
        }
        if self.connection_timeout.is_zero() || self.heartbeat_interval.is_zero() {
            return Err(ConfigError::InvalidInterval("connection timers", 0.0));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("server address {0:?} is not a valid socket address")]
    InvalidAddress(String),

    #[error("tick rate must be between 1 and 1000 Hz, got {0}")]
    InvalidTickRate(u32),

    #[error("{0} must be a positive number of seconds, got {1}")]
    InvalidInterval(&'static str, f32),
}
