//! TCP RCON client.
//!
//! One `RconChannel` owns one stream. The request/response exchange is
//! strictly sequential: every command waits for exactly one reply frame
//! before the next one is sent. Replies spanning several frames are not
//! reassembled.

use std::fmt;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::debug;

use crate::channel::{ControlChannel, Reply};
use crate::codec::RconCodec;
use crate::error::WardenError;
use crate::packet::{Packet, RequestIdCounter};
use crate::state::ChannelPhase;

/// Default per-operation timeout for connects and reads.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

// ── RconTarget ───────────────────────────────────────────────────

/// Where and how to reach an RCON listener.
#[derive(Clone, PartialEq, Eq)]
pub struct RconTarget {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub timeout: Duration,
}

impl RconTarget {
    pub fn new(host: impl Into<String>, port: u16, password: impl Into<String>, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            password: password.into(),
            timeout,
        }
    }

    /// Known port and non-empty password.
    pub fn is_configured(&self) -> bool {
        self.port != 0 && !self.password.is_empty()
    }
}

impl fmt::Display for RconTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for RconTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RconTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

// ── RconChannel ──────────────────────────────────────────────────

/// An RCON connection over any byte stream; `TcpStream` in production.
pub struct RconChannel<S = TcpStream> {
    target: RconTarget,
    framed: Option<Framed<S, RconCodec>>,
    phase: ChannelPhase,
    ids: RequestIdCounter,
}

impl RconChannel<TcpStream> {
    /// A disconnected channel for `target`.
    pub fn new(target: RconTarget) -> Self {
        Self {
            target,
            framed: None,
            phase: ChannelPhase::default(),
            ids: RequestIdCounter::new(),
        }
    }

    /// Open the TCP stream. Refusal and timeout both surface as
    /// [`WardenError::Connection`].
    pub async fn connect(&mut self) -> Result<(), WardenError> {
        let addr = (self.target.host.as_str(), self.target.port);
        let stream = tokio::time::timeout(self.target.timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| timed_out("connect", self.target.timeout))??;
        self.phase.connected()?;
        self.framed = Some(Framed::new(stream, RconCodec));
        debug!("rcon stream open to {}", self.target);
        Ok(())
    }
}

impl<S> RconChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an already-connected stream.
    pub fn attach(target: RconTarget, stream: S) -> Self {
        Self {
            target,
            framed: Some(Framed::new(stream, RconCodec)),
            phase: ChannelPhase::Connected,
            ids: RequestIdCounter::new(),
        }
    }

    /// Continue numbering requests from an existing counter.
    pub fn with_ids(mut self, ids: RequestIdCounter) -> Self {
        self.ids = ids;
        self
    }

    pub fn target(&self) -> &RconTarget {
        &self.target
    }

    pub fn phase(&self) -> &ChannelPhase {
        &self.phase
    }

    /// The id used by the most recent request.
    pub fn last_request_id(&self) -> i32 {
        self.ids.last()
    }

    /// Log in with the target's password.
    ///
    /// The server answers an auth request with an empty response frame
    /// followed by the auth response; the first is discarded. Only an
    /// auth response id of `-1` is treated as a rejection.
    pub async fn authenticate(&mut self) -> Result<(), WardenError> {
        let request_id = self.ids.next_id();
        let password = self.target.password.clone();
        self.send(Packet::auth(request_id, &password)).await?;

        let _ = self.recv().await?;
        let verdict = self.recv().await?;
        if verdict.is_auth_failure() {
            return Err(WardenError::Authentication);
        }

        self.phase.authenticated()?;
        debug!("rcon authenticated to {}", self.target);
        Ok(())
    }

    /// Send one command and return the body of its reply.
    ///
    /// A reply carrying a different request id fails with
    /// [`WardenError::ResponseMismatch`]; the stream stays open.
    pub async fn exec(&mut self, command: &str) -> Result<String, WardenError> {
        let request_id = self.ids.next_id();
        self.send(Packet::exec(request_id, command)).await?;

        let reply = self.recv().await?;
        if reply.request_id() != request_id {
            return Err(WardenError::ResponseMismatch {
                expected: request_id,
                actual: reply.request_id(),
            });
        }
        Ok(reply.into_body())
    }

    /// Drop the stream. Safe on a closed or never-opened channel.
    pub fn disconnect(&mut self) {
        if self.framed.take().is_some() {
            debug!("rcon stream to {} closed", self.target);
        }
        self.phase.disconnect();
    }

    pub fn is_connected(&self) -> bool {
        self.framed.is_some()
    }

    // A failed read or write leaves the stream unusable or out of step,
    // so both drop it and the next `open` reconnects.
    async fn send(&mut self, packet: Packet) -> Result<(), WardenError> {
        let timeout = self.target.timeout;
        let framed = self.framed.as_mut().ok_or(WardenError::ConnectionClosed)?;
        let result = match tokio::time::timeout(timeout, framed.send(packet)).await {
            Err(_) => Err(timed_out("write", timeout)),
            Ok(sent) => sent,
        };
        if result.is_err() {
            self.disconnect();
        }
        result
    }

    async fn recv(&mut self) -> Result<Packet, WardenError> {
        let timeout = self.target.timeout;
        let framed = self.framed.as_mut().ok_or(WardenError::ConnectionClosed)?;
        let result = match tokio::time::timeout(timeout, framed.next()).await {
            Err(_) => Err(timed_out("read", timeout)),
            Ok(None) => Err(WardenError::ConnectionClosed),
            Ok(Some(packet)) => packet,
        };
        if result.is_err() {
            self.disconnect();
        }
        result
    }
}

fn timed_out(operation: &str, after: Duration) -> WardenError {
    WardenError::Connection(io::Error::new(
        io::ErrorKind::TimedOut,
        format!("rcon {operation} timed out after {after:?}"),
    ))
}

#[async_trait]
impl ControlChannel for RconChannel<TcpStream> {
    async fn open(&mut self) -> Result<(), WardenError> {
        if self.phase.is_authenticated() {
            return Ok(());
        }
        if self.framed.is_none() {
            self.connect().await?;
        }
        if let Err(e) = self.authenticate().await {
            self.disconnect();
            return Err(e);
        }
        Ok(())
    }

    async fn send_command(&mut self, command: &str) -> Result<Reply, WardenError> {
        if !self.phase.is_authenticated() {
            return Err(WardenError::NotConnected(self.target.to_string()));
        }
        self.exec(command).await.map(Reply::Response)
    }

    fn close(&mut self) {
        self.disconnect();
    }

    fn is_open(&self) -> bool {
        self.phase.is_authenticated()
    }

    fn is_enabled(&self) -> bool {
        self.target.is_configured()
    }
}

impl<S> fmt::Debug for RconChannel<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RconChannel")
            .field("target", &self.target)
            .field("phase", &self.phase)
            .field("last_request_id", &self.ids.last())
            .finish()
    }
}
