//! # Gomoku Game Server Library
//!
//! Server side of a two-player, five-in-a-row game on a 15x15 board. Clients
//! hold a persistent TCP connection; the server multiplexes their requests
//! into independent rooms, enforces turn order and the opening swap rule,
//! detects wins, and pushes every state change to both players.
//!
//! ## Request Flow
//!
//! bytes -> [`framing`] -> bincode [`shared::Request`] -> [`network::Server`]
//! looks up the addressed room -> the room lock is taken -> a [`room::Room`]
//! handler validates and applies the request -> each resulting
//! [`connection::Outgoing`] is queued on its recipient's connection -> that
//! connection's writer task puts it on the wire.
//!
//! ## Module Organization
//!
//! ### Connection (`connection`)
//! One client: bounded outbound queue, idempotent close, and best-effort
//! delivery that retries a full queue a few times before dropping.
//!
//! ### Connection Manager (`connection_manager`)
//! A single task that owns the live-connection table and reacts to
//! register/unregister events.
//!
//! ### Room (`room`)
//! The per-game state machine: waiting, active, over. Turn 1 is the opening
//! triple, turn 2 the balancing response, then ordinary moves with a win
//! scan after each.
//!
//! ### Registry (`registry`)
//! Room id allocation and the id -> room table, plus listing open rooms and
//! sweeping finished or abandoned ones.
//!
//! ### Network (`network`)
//! Listener, per-connection reader and writer tasks, request dispatch, and
//! orderly shutdown.
//!
//! ## Concurrency
//!
//! Requests addressed to one room are serialized by that room's lock and
//! their responses are queued before the lock is released. Different rooms
//! proceed in parallel. The room table has its own lock, held only for
//! allocation, insertion, lookup and removal.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         bind_addr: "127.0.0.1:5000".parse()?,
//!         ..ServerConfig::default()
//!     };
//!
//!     let handle = Arc::new(Server::new(config)).start().await?;
//!     tokio::signal::ctrl_c().await?;
//!     handle.stop().await;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod connection_manager;
pub mod framing;
pub mod network;
pub mod registry;
pub mod room;
