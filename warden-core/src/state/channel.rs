//! RCON channel phase: `Disconnected -> Connected -> Authenticated ->
//! Disconnected`.

use crate::error::WardenError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelPhase {
    /// No socket. Initial / terminal state.
    #[default]
    Disconnected,

    /// TCP stream is open; password not yet accepted.
    Connected,

    /// Password accepted; commands may be sent.
    Authenticated,
}

impl std::fmt::Display for ChannelPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connected => write!(f, "Connected"),
            Self::Authenticated => write!(f, "Authenticated"),
        }
    }
}

impl ChannelPhase {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated)
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// Valid from: `Disconnected`.
    pub fn connected(&mut self) -> Result<(), WardenError> {
        match self {
            Self::Disconnected => {
                *self = Self::Connected;
                Ok(())
            }
            _ => Err(WardenError::InvalidTransition(
                "cannot connect: channel is not disconnected",
            )),
        }
    }

    /// Valid from: `Connected`.
    pub fn authenticated(&mut self) -> Result<(), WardenError> {
        match self {
            Self::Connected => {
                *self = Self::Authenticated;
                Ok(())
            }
            _ => Err(WardenError::InvalidTransition(
                "cannot authenticate: channel is not connected",
            )),
        }
    }

    /// Valid from any phase; closing is idempotent.
    pub fn disconnect(&mut self) {
        *self = Self::Disconnected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path() {
        let mut phase = ChannelPhase::default();
        assert!(phase.is_disconnected());
        phase.connected().unwrap();
        phase.authenticated().unwrap();
        assert!(phase.is_authenticated());
        assert_eq!(phase.to_string(), "Authenticated");
        phase.disconnect();
        assert!(phase.is_disconnected());
    }

    #[test]
    fn authenticate_requires_connection() {
        let mut phase = ChannelPhase::Disconnected;
        assert!(phase.authenticated().is_err());
    }

    #[test]
    fn double_connect_is_rejected() {
        let mut phase = ChannelPhase::Connected;
        assert!(phase.connected().is_err());
    }

    #[test]
    fn disconnect_is_idempotent() {
        let mut phase = ChannelPhase::Disconnected;
        phase.disconnect();
        phase.disconnect();
        assert!(phase.is_disconnected());
    }
}
