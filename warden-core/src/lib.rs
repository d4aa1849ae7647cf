//! # warden-core
//!
//! Control plane for dedicated game-server processes.
//!
//! This crate contains:
//! - **Packet / Codec**: RCON wire format and `RconCodec` for framed TCP I/O via `tokio_util`
//! - **Channels**: `RconChannel`, `LocalSocketChannel` and `HttpChannel` behind the `ControlChannel` trait
//! - **Executor**: strict and best-effort command execution
//! - **Service**: `ServiceInstance` lifecycle state machine and process control
//! - **Drain**: `DrainScheduler` for player-aware stop, restart and update
//! - **App / Config**: the host application and its TOML configuration
//! - **Error**: `WardenError`, a `thiserror`-based error enum

pub mod app;
pub mod channel;
pub mod codec;
pub mod config;
pub mod drain;
pub mod error;
pub mod executor;
pub mod packet;
pub mod service;
pub mod state;

#[cfg(test)]
mod testing;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use app::{Application, CommandUpdater, NoUpdate, Options, Updater};
pub use channel::{
    Connector, ControlChannel, HttpChannel, HttpTarget, LocalSocketChannel, RconChannel,
    RconTarget, Reply, Transport,
};
pub use codec::RconCodec;
pub use config::ManagerConfig;
pub use drain::{DrainAction, DrainPlan, DrainReport, DrainScheduler};
pub use error::WardenError;
pub use executor::{CommandExecutor, FailurePolicy};
pub use packet::{Packet, PacketType, RequestIdCounter};
pub use service::{GameProfile, ProcessControl, ServiceInstance};
pub use state::{ChannelPhase, ServiceState};
