//! # Orbital Sandbox Client Library
//!
//! Predicting client for the multiplayer gravity sandbox. The client runs the
//! same physics as the server for its own vehicle, so input takes effect
//! immediately, and periodically hands its simulation to the server for
//! validation.
//!
//! ## Netcode Model
//!
//! ### Client-Side Prediction
//! Inputs are applied to the local vehicle the moment they are sampled.
//! Local physics is scoped to the bodies and vehicle this client owns;
//! everything else is taken from the server.
//!
//! ### Validation and Correction
//! Every sync interval the client uploads its view of its vehicle and waits
//! for a verdict before uploading again. A correction is never merged: the
//! client pauses, replaces its world with the authoritative snapshot, rewinds
//! its clock to the snapshot time and resumes.
//!
//! ### Interpolation
//! Remote vehicles are blended from their previous state to the newest one
//! over a short latency compensation window, which hides the gap between
//! two server broadcasts.
//!
//! ## Module Organization
//!
//! - `config`: runtime settings and their validation
//! - `game`: connection states, prediction, correction and interpolation
//! - `input`: control sampling and sequencing of outgoing inputs
//! - `network`: UDP transport, the frame loop and connection statistics
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::config::ClientConfig;
//! use client::input::ScriptedInput;
//! use client::network::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig {
//!         server_addr: "127.0.0.1:5000".to_string(),
//!         ..Default::default()
//!     };
//!     let mut client = Client::new(config, Box::new(ScriptedInput::demo())).await?;
//!     client.run().await?;
//!     client.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod game;
pub mod input;
pub mod network;
