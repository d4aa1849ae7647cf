//! Configuration for the warden manager.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::{Application, CommandUpdater, Options};
use crate::channel::{HttpTarget, RconTarget, Transport};
use crate::error::WardenError;
use crate::service::{Detached, GameProfile, ServiceInstance, Systemd};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub app: AppConfig,
    pub logging: LoggingConfig,
    /// One entry per managed game-server instance.
    pub services: Vec<ServiceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Name of the game this host serves.
    pub name: String,
    /// Free-form options, e.g. `restart_delayed` warning templates.
    pub options: BTreeMap<String, String>,
    /// Command that installs a new game build.
    pub update: Option<UpdateConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Service (and systemd unit) name.
    pub name: String,
    /// Start this service with `start` and no service argument.
    pub enabled: bool,
    pub process: ProcessKind,
    pub channel: ChannelConfig,
    pub game: GameProfile,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessKind {
    #[default]
    Systemd,
    Detached,
}

/// Control channel settings, tagged by `transport`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum ChannelConfig {
    Rcon {
        #[serde(default = "default_host")]
        host: String,
        #[serde(default)]
        port: u16,
        #[serde(default)]
        password: String,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
    LocalSocket {
        /// Defaults to `/var/run/<service>.socket`.
        #[serde(default)]
        path: Option<PathBuf>,
    },
    Http {
        base_url: String,
        /// Extra request headers, e.g. an API key.
        #[serde(default)]
        headers: BTreeMap<String, String>,
        #[serde(default = "default_http_timeout_secs")]
        timeout_secs: u64,
    },
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_http_timeout_secs() -> u64 {
    10
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "game".into(),
            options: BTreeMap::new(),
            update: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            enabled: true,
            process: ProcessKind::default(),
            channel: ChannelConfig::default(),
            game: GameProfile::default(),
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig::LocalSocket { path: None }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ManagerConfig {
    /// Load configuration from a TOML file. Unlike most tools there is no
    /// fallback to defaults: a missing or malformed file is an error.
    pub fn load(path: &Path) -> Result<Self, WardenError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| WardenError::Config(format!("cannot read {}: {e}", path.display())))?;
        let cfg: Self = toml::from_str(&contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Serialize to `path`, replacing its contents.
    pub fn save(&self, path: &Path) -> Result<(), WardenError> {
        let text = toml::to_string_pretty(self)
            .map_err(|e| WardenError::Config(e.to_string()))?;
        std::fs::write(path, text)
            .map_err(|e| WardenError::Config(format!("cannot write {}: {e}", path.display())))
    }

    /// Write the example configuration to a new file. An existing file is
    /// left alone and reported as an error.
    pub fn write_default(path: &Path) -> Result<(), WardenError> {
        if path.exists() {
            return Err(WardenError::Config(format!(
                "{} already exists",
                path.display()
            )));
        }
        Self::example().save(path)
    }

    /// A small example with one RCON-controlled service.
    pub fn example() -> Self {
        Self {
            services: vec![ServiceConfig {
                name: "game-main".into(),
                channel: ChannelConfig::Rcon {
                    host: default_host(),
                    port: 25575,
                    password: String::new(),
                    timeout_secs: default_timeout_secs(),
                },
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn validate(&self) -> Result<(), WardenError> {
        let mut seen = std::collections::BTreeSet::new();
        for svc in &self.services {
            if svc.name.is_empty() {
                return Err(WardenError::Config("service without a name".into()));
            }
            if !seen.insert(svc.name.as_str()) {
                return Err(WardenError::Config(format!("duplicate service {}", svc.name)));
            }
        }
        Ok(())
    }

    /// Build the application with one instance per configured service.
    pub fn build_application(&self) -> Application {
        let services = self.services.iter().map(ServiceConfig::build).collect();
        let mut app = Application::new(self.app.name.clone(), services)
            .with_options(Options::new(self.app.options.clone()));
        if let Some(update) = &self.app.update {
            app = app.with_updater(CommandUpdater {
                program: update.program.clone(),
                args: update.args.clone(),
            });
        }
        app
    }
}

impl ServiceConfig {
    pub fn transport(&self) -> Transport {
        match &self.channel {
            ChannelConfig::Rcon {
                host,
                port,
                password,
                timeout_secs,
            } => Transport::Rcon(RconTarget::new(
                host.clone(),
                *port,
                password.clone(),
                Duration::from_secs((*timeout_secs).max(1)),
            )),
            ChannelConfig::LocalSocket { path } => Transport::LocalSocket(
                path.clone()
                    .unwrap_or_else(|| Transport::default_socket_path(&self.name)),
            ),
            ChannelConfig::Http {
                base_url,
                headers,
                timeout_secs,
            } => {
                let mut target =
                    HttpTarget::new(base_url.clone(), Duration::from_secs((*timeout_secs).max(1)));
                target.headers = headers.clone();
                Transport::Http(target)
            }
        }
    }

    pub fn build(&self) -> ServiceInstance {
        let instance = ServiceInstance::new(self.name.clone(), self.transport())
            .with_game(self.game.clone())
            .enabled(self.enabled);
        match self.process {
            ProcessKind::Systemd => instance.with_process(Systemd),
            ProcessKind::Detached => instance.with_process(Detached),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
