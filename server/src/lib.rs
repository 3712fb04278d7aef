//! # Orbital Sandbox Server Library
//!
//! Authoritative server for the multiplayer gravity sandbox. It owns the
//! canonical world, applies player input to it, advances physics on a fixed
//! tick and broadcasts full snapshots to every connected client.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! The server runs the definitive version of the N-body simulation. Clients
//! predict their own vehicle locally, but whenever a client's report drifts
//! too far from the server state the client is sent an authoritative
//! correction it must adopt wholesale.
//!
//! ### Client Management
//! Handles the complete lifecycle of client connections:
//! - Join handshake with protocol version check
//! - Binding each player to one of a fixed number of vehicle slots
//! - Disconnect and timeout cleanup, with a leave notice to everyone else
//!
//! ### Validation
//! Clients upload their simulated vehicle state periodically. Every report is
//! answered on the next tick, either with an acknowledgement or with a
//! correction. A client that stays silent for too long is corrected anyway.
//!
//! ## Architecture
//!
//! The canonical world lives in a [`game::GameServer`] behind a single async
//! mutex. Network tasks never send while holding it: a tick takes the lock,
//! advances the world, drains the queued [`game::ServerEvent`]s, copies out a
//! snapshot and releases the lock before anything is queued for sending.
//!
//! Background tasks handle:
//! - **Network Receiver**: decodes datagrams and forwards them to the main loop
//! - **Network Sender**: drains the outgoing queue, counting failed sends
//! - **Timeout Checker**: removes connections that went silent
//! - **Heartbeat**: keeps idle connections alive
//!
//! ## Module Organization
//!
//! - `config`: runtime settings and their validation
//! - `client_manager`: address to player id registry and liveness tracking
//! - `game`: authoritative world, vehicle slots and client validation
//! - `network`: UDP transport and the main select loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         port: 5000,
//!         max_players: 8,
//!         ..Default::default()
//!     };
//!     let mut server = Server::new(config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod config;
pub mod game;
pub mod network;
