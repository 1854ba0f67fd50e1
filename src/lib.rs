//! # Gantry
//!
//! Remote process runner: launch, stream, and kill OS processes over a
//! persistent WebSocket connection, with crash-loop supervision for
//! locally configured background commands.
//!
//! ## Modules
//!
//! - `config` - Command templates, the registry resolving short names, config loading
//! - `error` - Crate-level error type
//! - `messages` - JSON control and output frames exchanged over a connection
//! - `runner` - Process lifecycle: prepare/start/stop, timeout, crash-loop breakers
//! - `server` - Control plane: WebSocket sessions and the liveness probe
//! - `streamer` - Byte-to-line reassembly with multi-sink fanout

pub mod config;
pub mod error;
pub mod messages;
pub mod runner;
pub mod server;
pub mod streamer;

pub use error::{Error, Result};
