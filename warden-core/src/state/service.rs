//! Per-instance lifecycle state machine.
//!
//! Provides a `ServiceState` enum with validated transitions that return
//! `Result` instead of panicking. Only the owning `ServiceInstance`
//! drives these transitions.

use std::fmt;

use crate::error::WardenError;

/// Lifecycle of one managed game-server instance.
///
/// ```text
///  Stopped ──► Starting ──► Running ──► Stopping ──► Stopped
///     ▲           │                        ▲
///     │           ▼                        │
///     └────────  Error ────────────────────┘
///        start()        stop()
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ServiceState {
    /// Not running. Initial state.
    #[default]
    Stopped,

    /// Process launched; waiting for the control channel to come up.
    Starting,

    /// Control channel authenticated; commands may be issued.
    Running,

    /// Channel is being closed and the process terminated.
    Stopping,

    /// The last start or stop failed. Left until a caller retries.
    Error,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl ServiceState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn is_starting(&self) -> bool {
        matches!(self, Self::Starting)
    }

    pub fn is_stopping(&self) -> bool {
        matches!(self, Self::Stopping)
    }

    /// `Starting`, `Running` or `Stopping`: the process is believed to be
    /// up, so best-effort polling is worth attempting.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Starting | Self::Running | Self::Stopping)
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Starting`.
    ///
    /// Valid from: `Stopped`, `Error`.
    pub fn begin_start(&mut self) -> Result<(), WardenError> {
        match self {
            Self::Stopped | Self::Error => {
                *self = Self::Starting;
                Ok(())
            }
            _ => Err(WardenError::InvalidTransition(
                "cannot start: not in Stopped or Error state",
            )),
        }
    }

    /// Transition to `Running`.
    ///
    /// Valid from: `Starting`.
    pub fn complete_start(&mut self) -> Result<(), WardenError> {
        match self {
            Self::Starting => {
                *self = Self::Running;
                Ok(())
            }
            _ => Err(WardenError::InvalidTransition(
                "cannot complete start: not in Starting state",
            )),
        }
    }

    /// Transition to `Stopping`.
    ///
    /// Valid from: `Starting`, `Running`, `Error`.
    pub fn begin_stop(&mut self) -> Result<(), WardenError> {
        match self {
            Self::Starting | Self::Running | Self::Error => {
                *self = Self::Stopping;
                Ok(())
            }
            _ => Err(WardenError::InvalidTransition(
                "cannot stop: not in Starting, Running or Error state",
            )),
        }
    }

    /// Transition to `Stopped`.
    ///
    /// Valid from: `Stopping`.
    pub fn finish_stop(&mut self) -> Result<(), WardenError> {
        match self {
            Self::Stopping => {
                *self = Self::Stopped;
                Ok(())
            }
            _ => Err(WardenError::InvalidTransition(
                "cannot finish stop: not in Stopping state",
            )),
        }
    }

    /// Force the `Error` state regardless of the current one.
    pub fn fail(&mut self) {
        *self = Self::Error;
    }
}
