//! Control channels: the transports commands travel over.
//!
//! A [`ControlChannel`] is one live connection (or handle) owned by a
//! single service instance. A [`Connector`] knows how to build fresh
//! channels for that instance; the transport is chosen once, when the
//! instance is constructed, and dispatched through trait objects.

pub mod http;
pub mod local_socket;
pub mod rcon;

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::WardenError;

pub use http::{HttpChannel, HttpTarget};
pub use local_socket::LocalSocketChannel;
pub use rcon::{RconChannel, RconTarget};

// ── Reply ────────────────────────────────────────────────────────

/// Outcome of a command that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The server answered with this text.
    Response(String),
    /// The command was written; the transport never answers.
    Delivered,
    /// The transport is not available right now; nothing was sent.
    Unavailable,
}

impl Reply {
    pub fn text(&self) -> Option<&str> {
        match self {
            Reply::Response(text) => Some(text),
            _ => None,
        }
    }

    pub fn into_text(self) -> Option<String> {
        match self {
            Reply::Response(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Reply::Unavailable)
    }
}

// ── ControlChannel ───────────────────────────────────────────────

/// A live control connection to one game-server process.
#[async_trait]
pub trait ControlChannel: Send {
    /// Establish the connection and authenticate where the transport
    /// requires it. Calling `open` on an open channel is a no-op.
    async fn open(&mut self) -> Result<(), WardenError>;

    /// Issue one command and return the server's answer.
    async fn send_command(&mut self, command: &str) -> Result<Reply, WardenError>;

    /// Release the underlying socket. Idempotent.
    fn close(&mut self);

    /// Returns `true` once `open` has succeeded and until `close`.
    fn is_open(&self) -> bool;

    /// Returns `true` if the transport is configured and reachable in
    /// principle (known port and password, or an existing socket path).
    fn is_enabled(&self) -> bool;
}

// ── Connector ────────────────────────────────────────────────────

/// Factory for fresh channels of one service instance.
pub trait Connector: Send + Sync + fmt::Debug {
    /// Build a new, unopened channel.
    fn channel(&self) -> Box<dyn ControlChannel>;

    /// Returns `true` if channels built by this connector could work.
    fn is_enabled(&self) -> bool;

    /// Network port of the control endpoint, if it has one.
    fn port(&self) -> Option<u16> {
        None
    }
}

/// The transports shipped with warden.
#[derive(Debug, Clone)]
pub enum Transport {
    Rcon(RconTarget),
    LocalSocket(PathBuf),
    Http(HttpTarget),
}

impl Transport {
    /// Default local socket path for a service.
    pub fn default_socket_path(service: &str) -> PathBuf {
        PathBuf::from(format!("/var/run/{service}.socket"))
    }
}

impl Connector for Transport {
    fn channel(&self) -> Box<dyn ControlChannel> {
        match self {
            Transport::Rcon(target) => Box::new(RconChannel::new(target.clone())),
            Transport::LocalSocket(path) => Box::new(LocalSocketChannel::new(path.clone())),
            Transport::Http(target) => Box::new(HttpChannel::new(target.clone())),
        }
    }

    fn is_enabled(&self) -> bool {
        match self {
            Transport::Rcon(target) => target.is_configured(),
            Transport::LocalSocket(path) => path.exists(),
            Transport::Http(target) => target.is_configured(),
        }
    }

    fn port(&self) -> Option<u16> {
        match self {
            Transport::Rcon(target) if target.port != 0 => Some(target.port),
            Transport::Http(target) => target.port(),
            _ => None,
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Rcon(target) => write!(f, "rcon://{target}"),
            Transport::LocalSocket(path) => write!(f, "socket://{}", path.display()),
            Transport::Http(target) => write!(f, "{target}"),
        }
    }
}
