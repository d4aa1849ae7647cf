//! In-memory doubles for channels, processes and updaters, shared by the
//! unit tests of the executor, service and drain modules.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::time::Instant;

use crate::app::Updater;
use crate::channel::{Connector, ControlChannel, Reply};
use crate::error::WardenError;
use crate::service::ProcessControl;

// ── Fake game server ─────────────────────────────────────────────

#[derive(Debug)]
pub struct ServerState {
    pub enabled: bool,
    /// Number of upcoming `open` calls that fail with a refused connect.
    pub refuse_opens: u32,
    pub reject_auth: bool,
    /// `None` makes the player query answer without a number.
    pub players: Option<u32>,
    pub opens: u32,
    pub commands: Vec<String>,
}

impl Default for ServerState {
    fn default() -> Self {
        Self {
            enabled: true,
            refuse_opens: 0,
            reject_auth: false,
            players: Some(0),
            opens: 0,
            commands: Vec::new(),
        }
    }
}

/// Connector handing out channels that talk to one shared fake server.
#[derive(Debug, Clone, Default)]
pub struct FakeServer {
    pub state: Arc<Mutex<ServerState>>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_players(players: u32) -> Self {
        let server = Self::new();
        server.state.lock().unwrap().players = Some(players);
        server
    }

    pub fn set_players(&self, players: Option<u32>) {
        self.state.lock().unwrap().players = players;
    }

    pub fn refuse_next(&self, opens: u32) {
        self.state.lock().unwrap().refuse_opens = opens;
    }

    pub fn opens(&self) -> u32 {
        self.state.lock().unwrap().opens
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }
}

impl Connector for FakeServer {
    fn channel(&self) -> Box<dyn ControlChannel> {
        Box::new(FakeChannel {
            state: Arc::clone(&self.state),
            open: false,
        })
    }

    fn is_enabled(&self) -> bool {
        self.state.lock().unwrap().enabled
    }

    fn port(&self) -> Option<u16> {
        Some(27015)
    }
}

pub struct FakeChannel {
    state: Arc<Mutex<ServerState>>,
    open: bool,
}

#[async_trait]
impl ControlChannel for FakeChannel {
    async fn open(&mut self) -> Result<(), WardenError> {
        let mut state = self.state.lock().unwrap();
        state.opens += 1;
        if state.refuse_opens > 0 {
            state.refuse_opens -= 1;
            return Err(WardenError::Connection(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }
        if state.reject_auth {
            return Err(WardenError::Authentication);
        }
        self.open = true;
        Ok(())
    }

    async fn send_command(&mut self, command: &str) -> Result<Reply, WardenError> {
        if !self.open {
            return Err(WardenError::ConnectionClosed);
        }
        let mut state = self.state.lock().unwrap();
        state.commands.push(command.to_string());
        let text = match (command, state.players) {
            ("list", Some(n)) => format!("There are {n} of a max of 20 players online"),
            ("list", None) => "Unknown command".to_string(),
            _ => String::new(),
        };
        Ok(Reply::Response(text))
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn is_enabled(&self) -> bool {
        self.state.lock().unwrap().enabled
    }
}

// ── Fake process supervisor ──────────────────────────────────────

#[derive(Debug, Default)]
pub struct ProcessLog {
    pub launched: Vec<(String, Instant)>,
    pub terminated: Vec<(String, Instant)>,
    pub fail_launch: bool,
    pub fail_terminate: bool,
    /// Services whose process reports as not running.
    pub down: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeProcess {
    pub log: Arc<Mutex<ProcessLog>>,
}

impl FakeProcess {
    pub fn launches_of(&self, service: &str) -> usize {
        let log = self.log.lock().unwrap();
        log.launched.iter().filter(|(s, _)| s == service).count()
    }

    pub fn terminated_at(&self, service: &str) -> Option<Instant> {
        let log = self.log.lock().unwrap();
        log.terminated
            .iter()
            .find(|(s, _)| s == service)
            .map(|(_, at)| *at)
    }
}

#[async_trait]
impl ProcessControl for FakeProcess {
    async fn launch(&self, service: &str) -> Result<(), WardenError> {
        let mut log = self.log.lock().unwrap();
        if log.fail_launch {
            return Err(WardenError::Process {
                service: service.to_string(),
                reason: "unit not found".into(),
            });
        }
        log.launched.push((service.to_string(), Instant::now()));
        Ok(())
    }

    async fn terminate(&self, service: &str) -> Result<(), WardenError> {
        let mut log = self.log.lock().unwrap();
        if log.fail_terminate {
            return Err(WardenError::Process {
                service: service.to_string(),
                reason: "timed out".into(),
            });
        }
        log.terminated.push((service.to_string(), Instant::now()));
        Ok(())
    }

    async fn is_active(&self, service: &str) -> bool {
        !self.log.lock().unwrap().down.iter().any(|s| s == service)
    }
}

// ── Fake updater ─────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct FakeUpdater {
    pub calls: Arc<Mutex<u32>>,
}

impl FakeUpdater {
    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Updater for FakeUpdater {
    async fn update(&self) -> bool {
        *self.calls.lock().unwrap() += 1;
        true
    }
}
