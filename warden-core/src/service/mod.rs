//! One managed game-server instance.
//!
//! A `ServiceInstance` owns its lifecycle state, its control channel and
//! the collaborators used to launch the process and talk to the game.
//! It only changes state inside `start`, `stop` and `restart`.

mod game;
mod process;

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::channel::{Connector, ControlChannel, Reply};
use crate::error::WardenError;
use crate::executor::{CommandExecutor, FailurePolicy};
use crate::state::ServiceState;

pub use game::{GameProfile, PlayerCountFormat};
pub use process::{Detached, ProcessControl, Systemd};

pub struct ServiceInstance {
    identity: String,
    enabled: bool,
    state: ServiceState,
    connector: Arc<dyn Connector>,
    channel: Option<Box<dyn ControlChannel>>,
    process: Arc<dyn ProcessControl>,
    game: GameProfile,
    polling: FailurePolicy,
}

impl ServiceInstance {
    /// A stopped instance reached through `connector`, with a detached
    /// process and the default game profile.
    pub fn new(identity: impl Into<String>, connector: impl Connector + 'static) -> Self {
        Self {
            identity: identity.into(),
            enabled: true,
            state: ServiceState::default(),
            connector: Arc::new(connector),
            channel: None,
            process: Arc::new(Detached),
            game: GameProfile::default(),
            polling: FailurePolicy::best_effort(),
        }
    }

    pub fn with_process(mut self, process: impl ProcessControl + 'static) -> Self {
        self.process = Arc::new(process);
        self
    }

    pub fn with_game(mut self, game: GameProfile) -> Self {
        self.game = game;
        self
    }

    /// Policy used by polling calls (`player_count`, `send_message`).
    pub fn with_polling(mut self, polling: FailurePolicy) -> Self {
        self.polling = polling;
        self
    }

    /// Whether `start_all` should start this instance.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    // ── Accessors ─────────────────────────────────────────────────

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    pub fn is_starting(&self) -> bool {
        self.state.is_starting()
    }

    pub fn is_stopping(&self) -> bool {
        self.state.is_stopping()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn port(&self) -> Option<u16> {
        self.connector.port()
    }

    /// Whether a control channel is configured and usable.
    pub fn has_control_api(&self) -> bool {
        self.connector.is_enabled()
    }

    pub fn game(&self) -> &GameProfile {
        &self.game
    }

    /// Ask the process supervisor whether the backing process is up,
    /// regardless of the lifecycle state tracked here.
    pub async fn process_is_up(&self) -> bool {
        self.process.is_active(&self.identity).await
    }

    // ── Lifecycle ─────────────────────────────────────────────────

    /// Launch the process and open its control channel.
    ///
    /// On success the instance is `Running` and keeps the opened channel
    /// open for strict commands. A launch, connect or authentication
    /// failure leaves it in `Error`; nothing retries automatically.
    pub async fn start(&mut self) -> Result<(), WardenError> {
        if self.state.is_running() {
            debug!("{} is already running", self.identity);
            return Ok(());
        }
        self.state.begin_start()?;
        info!("starting {}", self.identity);

        if let Err(e) = self.process.launch(&self.identity).await {
            error!("failed to launch {}: {e}", self.identity);
            self.state.fail();
            return Err(e);
        }

        if self.connector.is_enabled() {
            let mut channel = self.connector.channel();
            if let Err(e) = channel.open().await {
                channel.close();
                error!("{} did not answer on its control channel: {e}", self.identity);
                self.state.fail();
                return Err(e);
            }
            self.channel = Some(channel);
        } else {
            warn!("{} has no control channel; commands will be unavailable", self.identity);
        }

        self.state.complete_start()?;
        info!("{} is running", self.identity);
        Ok(())
    }

    /// Close the control channel and terminate the process.
    ///
    /// Stopping a stopped instance succeeds without doing anything.
    pub async fn stop(&mut self) -> Result<(), WardenError> {
        if self.state == ServiceState::Stopped {
            debug!("{} is already stopped", self.identity);
            return Ok(());
        }
        self.state.begin_stop()?;
        info!("stopping {}", self.identity);

        if let Some(mut channel) = self.channel.take() {
            if let Some(command) = &self.game.stop_command {
                if let Err(e) = channel.send_command(command).await {
                    warn!("{}: {command:?} before stop failed: {e}", self.identity);
                }
            }
            channel.close();
        }

        if let Err(e) = self.process.terminate(&self.identity).await {
            error!("failed to terminate {}: {e}", self.identity);
            self.state.fail();
            return Err(e);
        }

        self.state.finish_stop()?;
        info!("{} stopped", self.identity);
        Ok(())
    }

    /// `stop` followed by `start`, sequentially.
    pub async fn restart(&mut self) -> Result<(), WardenError> {
        self.stop().await?;
        self.start().await
    }

    // ── Commands ──────────────────────────────────────────────────

    /// Strict execution over the open channel. Fails with
    /// [`WardenError::NotConnected`] unless the instance is `Running`.
    pub async fn execute(&mut self, command: &str) -> Result<Reply, WardenError> {
        let reply = CommandExecutor::new(
            &self.identity,
            self.state,
            self.connector.as_ref(),
            self.channel.as_mut(),
        )
        .run(FailurePolicy::Strict, command)
        .await?;
        reply.ok_or_else(|| WardenError::NotConnected(self.identity.clone()))
    }

    /// Best-effort execution on a fresh connection. Never fails; `None`
    /// means no attempt got through.
    pub async fn execute_with_retry(&self, command: &str) -> Option<Reply> {
        CommandExecutor::new(&self.identity, self.state, self.connector.as_ref(), None)
            .run(self.polling, command)
            .await
            .ok()
            .flatten()
    }

    /// Connected players, or `None` when the server cannot be asked or
    /// its answer carries no count.
    pub async fn player_count(&self) -> Option<u32> {
        let reply = self.execute_with_retry(&self.game.players_command).await?;
        self.game.parse_player_count(reply.text()?)
    }

    /// Broadcast `message` in game. Returns `true` if it was delivered.
    pub async fn send_message(&self, message: &str) -> bool {
        let command = self.game.broadcast(message);
        match self.execute_with_retry(&command).await {
            Some(reply) => !reply.is_unavailable(),
            None => false,
        }
    }
}

impl fmt::Debug for ServiceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceInstance")
            .field("identity", &self.identity)
            .field("state", &self.state)
            .field("enabled", &self.enabled)
            .field("connector", &self.connector)
            .field("channel_open", &self.channel.as_ref().is_some_and(|c| c.is_open()))
            .finish()
    }
}
