//! Command execution with two failure policies.
//!
//! - **Strict**: the instance must be `Running`; the command goes over
//!   the instance's open channel once and any error is returned as is.
//! - **Best effort**: for status polling and flaky endpoints. Every
//!   attempt builds a fresh channel, runs connect → authenticate → send,
//!   and logs failures. After `max_attempts` failures the result is
//!   `None`; this policy never returns an error.
//!
//! Both policies share [`attempt`], so the protocol steps exist once.

use tracing::{debug, warn};

use crate::channel::{Connector, ControlChannel, Reply};
use crate::error::WardenError;
use crate::state::ServiceState;

/// Attempts made by the best-effort policy before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    Strict,
    BestEffort { max_attempts: u32 },
}

impl FailurePolicy {
    pub fn best_effort() -> Self {
        FailurePolicy::BestEffort {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self::best_effort()
    }
}

/// Borrowed view of one service instance for the duration of a command.
pub struct CommandExecutor<'a> {
    service: &'a str,
    state: ServiceState,
    connector: &'a dyn Connector,
    session: Option<&'a mut Box<dyn ControlChannel>>,
}

impl<'a> CommandExecutor<'a> {
    pub fn new(
        service: &'a str,
        state: ServiceState,
        connector: &'a dyn Connector,
        session: Option<&'a mut Box<dyn ControlChannel>>,
    ) -> Self {
        Self {
            service,
            state,
            connector,
            session,
        }
    }

    /// Run `command` under `policy`.
    ///
    /// Strict runs yield `Ok(Some(_))` or an error; best-effort runs
    /// always yield `Ok`, with `None` when no attempt succeeded.
    pub async fn run(
        self,
        policy: FailurePolicy,
        command: &str,
    ) -> Result<Option<Reply>, WardenError> {
        match policy {
            FailurePolicy::Strict => self.strict(command).await.map(Some),
            FailurePolicy::BestEffort { max_attempts } => {
                Ok(self.best_effort(max_attempts, command).await)
            }
        }
    }

    async fn strict(self, command: &str) -> Result<Reply, WardenError> {
        if !self.state.is_running() {
            return Err(WardenError::NotConnected(self.service.to_string()));
        }
        let channel = self
            .session
            .ok_or_else(|| WardenError::NotConnected(self.service.to_string()))?;
        attempt(&mut **channel, command).await
    }

    async fn best_effort(self, max_attempts: u32, command: &str) -> Option<Reply> {
        if !self.state.is_active() {
            debug!("{} is {}; skipping {command:?}", self.service, self.state);
            return None;
        }
        if !self.connector.is_enabled() {
            debug!("{} has no usable control channel; skipping {command:?}", self.service);
            return None;
        }

        for n in 1..=max_attempts {
            let mut channel = self.connector.channel();
            let result = attempt(&mut *channel, command).await;
            channel.close();

            match result {
                Ok(reply) => return Some(reply),
                Err(e) => warn!(
                    "{}: attempt {n}/{max_attempts} of {command:?} failed: {e}",
                    self.service
                ),
            }
        }
        None
    }
}

/// Open `channel` if needed, then send one command.
async fn attempt<C>(channel: &mut C, command: &str) -> Result<Reply, WardenError>
where
    C: ControlChannel + ?Sized,
{
    if !channel.is_open() {
        channel.open().await?;
    }
    channel.send_command(command).await
}
