//! Domain-specific error types for the service control plane.
//!
//! All fallible operations return `Result<T, WardenError>`. The strict
//! command path surfaces these unchanged; the best-effort path logs them
//! and degrades to "no data".

use thiserror::Error;

/// The canonical error type for warden.
#[derive(Debug, Error)]
pub enum WardenError {
    // ── Protocol Errors ──────────────────────────────────────────
    /// A frame was malformed or violated the RCON framing rules.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server answered a command with a different request id.
    #[error("response id mismatch: expected {expected}, got {actual}")]
    ResponseMismatch { expected: i32, actual: i32 },

    // ── Connection Errors ────────────────────────────────────────
    /// The TCP/IO layer reported an error (refused, timed out, reset).
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// The remote end closed the stream before a full frame arrived.
    #[error("connection closed by server")]
    ConnectionClosed,

    /// An HTTP control request failed below the status line.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// An HTTP control endpoint answered with a non-success status.
    #[error("unexpected status: {status} body={body}")]
    UnexpectedStatus {
        status: reqwest::StatusCode,
        body: String,
    },

    /// The server rejected the RCON password.
    #[error("authentication failed: bad password")]
    Authentication,

    // ── Lifecycle Errors ─────────────────────────────────────────
    /// A strict command was issued while the service is not running.
    #[error("service {0} is not connected; call start() first")]
    NotConnected(String),

    /// A lifecycle transition was requested from the wrong state.
    #[error("invalid state transition: {0}")]
    InvalidTransition(&'static str),

    /// Launching or terminating the managed process failed.
    #[error("process control failed for {service}: {reason}")]
    Process { service: String, reason: String },

    // ── Application Errors ───────────────────────────────────────
    /// The drain scheduler was handed an action it does not know.
    #[error("invalid action for delayed action: {0}")]
    InvalidAction(String),

    /// The operation needs elevated privileges.
    #[error("unable to {0} game services unless run as root")]
    PermissionDenied(String),

    /// The configuration could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl WardenError {
    /// Returns `true` for failures of the transport itself, which the
    /// best-effort executor treats as retryable.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::ConnectionClosed | Self::Http(_)
        )
    }

    /// Returns `true` for framing and response-matching failures.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Self::Protocol(_) | Self::ResponseMismatch { .. } | Self::UnexpectedStatus { .. }
        )
    }
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for WardenError {
    fn from(s: String) -> Self {
        WardenError::Other(s)
    }
}

impl From<&str> for WardenError {
    fn from(s: &str) -> Self {
        WardenError::Other(s.to_string())
    }
}

impl From<toml::de::Error> for WardenError {
    fn from(e: toml::de::Error) -> Self {
        WardenError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = WardenError::ResponseMismatch {
            expected: 7,
            actual: 9,
        };
        assert!(e.to_string().contains('7'));
        assert!(e.to_string().contains('9'));

        let e = WardenError::InvalidAction("explode".into());
        assert!(e.to_string().contains("explode"));
    }

    #[test]
    fn from_string() {
        let e: WardenError = "something broke".into();
        assert!(matches!(e, WardenError::Other(_)));
    }

    #[test]
    fn from_io_is_transport() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let e: WardenError = io_err.into();
        assert!(matches!(e, WardenError::Connection(_)));
        assert!(e.is_transport());
        assert!(WardenError::ConnectionClosed.is_transport());
        assert!(!WardenError::Authentication.is_transport());
    }

    #[test]
    fn unexpected_status_is_protocol() {
        let e = WardenError::UnexpectedStatus {
            status: reqwest::StatusCode::NOT_FOUND,
            body: "no such route".into(),
        };
        assert!(e.is_protocol());
        assert!(!e.is_transport());
        assert!(e.to_string().contains("404"));
    }

    #[test]
    fn protocol_grouping() {
        assert!(WardenError::Protocol("short frame".into()).is_protocol());
        assert!(
            WardenError::ResponseMismatch {
                expected: 1,
                actual: 2
            }
            .is_protocol()
        );
        assert!(!WardenError::ConnectionClosed.is_protocol());
    }
}
