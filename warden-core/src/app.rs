//! The host application: every service instance of one game, its option
//! store and its update collaborator.

use std::collections::BTreeMap;
use std::fmt::Debug;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{error, info, warn};

use crate::drain::{DrainAction, DrainReport, DrainScheduler};
use crate::error::WardenError;
use crate::service::ServiceInstance;

// ── Updater ──────────────────────────────────────────────────────

/// Installs a new build of the game while every instance is stopped.
#[async_trait]
pub trait Updater: Send + Sync + Debug {
    /// Returns `true` when the update succeeded.
    async fn update(&self) -> bool;
}

/// Runs an external program (for example SteamCMD) to update the game.
#[derive(Debug, Clone)]
pub struct CommandUpdater {
    pub program: String,
    pub args: Vec<String>,
}

#[async_trait]
impl Updater for CommandUpdater {
    async fn update(&self) -> bool {
        info!("running {} {}", self.program, self.args.join(" "));
        match Command::new(&self.program).args(&self.args).status().await {
            Ok(status) if status.success() => true,
            Ok(status) => {
                error!("{} exited with {status}", self.program);
                false
            }
            Err(e) => {
                error!("could not run {}: {e}", self.program);
                false
            }
        }
    }
}

/// Used when no update command is configured.
#[derive(Debug, Clone, Default)]
pub struct NoUpdate;

#[async_trait]
impl Updater for NoUpdate {
    async fn update(&self) -> bool {
        warn!("no update command configured; skipping update");
        false
    }
}

// ── Options ──────────────────────────────────────────────────────

/// Flat key/value option store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    values: BTreeMap<String, String>,
}

impl Options {
    pub fn new(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Set `name`; returns `false` when the value was already current.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> bool {
        let value = value.into();
        let name = name.into();
        if self.values.get(&name) == Some(&value) {
            return false;
        }
        self.values.insert(name, value);
        true
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.values
    }
}

// ── Application ──────────────────────────────────────────────────

#[derive(Debug)]
pub struct Application {
    name: String,
    services: Vec<ServiceInstance>,
    options: Options,
    updater: Box<dyn Updater>,
    privileged: bool,
    scheduler: Option<DrainScheduler>,
}

impl Application {
    pub fn new(name: impl Into<String>, services: Vec<ServiceInstance>) -> Self {
        Self {
            name: name.into(),
            services,
            options: Options::default(),
            updater: Box::new(NoUpdate),
            privileged: false,
            scheduler: None,
        }
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn with_updater(mut self, updater: impl Updater + 'static) -> Self {
        self.updater = Box::new(updater);
        self
    }

    /// Whether the caller holds the privileges delayed actions need.
    pub fn with_privileges(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    /// Override the drain timing; the warning text still comes from the
    /// options.
    pub fn with_scheduler(mut self, scheduler: DrainScheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // ── Services ──────────────────────────────────────────────────

    pub fn services(&self) -> &[ServiceInstance] {
        &self.services
    }

    pub fn services_mut(&mut self) -> &mut [ServiceInstance] {
        &mut self.services
    }

    pub fn service(&self, name: &str) -> Option<&ServiceInstance> {
        self.services.iter().find(|s| s.identity() == name)
    }

    pub fn service_mut(&mut self, name: &str) -> Option<&mut ServiceInstance> {
        self.services.iter_mut().find(|s| s.identity() == name)
    }

    /// Any instance running, starting or stopping.
    pub fn is_active(&self) -> bool {
        self.services
            .iter()
            .any(|s| s.is_running() || s.is_starting() || s.is_stopping())
    }

    // ── Options ───────────────────────────────────────────────────

    pub fn get_option_value(&self, name: &str) -> Option<&str> {
        self.options.get(name)
    }

    pub fn set_option(&mut self, name: &str, value: &str) -> bool {
        self.options.set(name, value)
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    // ── Bulk operations ───────────────────────────────────────────

    /// Start every instance marked for auto-start. Returns the number of
    /// instances that failed.
    pub async fn start_all(&mut self) -> usize {
        let mut failed = 0;
        for svc in self.services.iter_mut() {
            if !svc.is_enabled() {
                info!("skipping {} as it is not enabled for auto-start", svc.identity());
                continue;
            }
            if let Err(e) = svc.start().await {
                error!("could not start {}: {e}", svc.identity());
                failed += 1;
            }
        }
        failed
    }

    /// Stop every running instance immediately.
    pub async fn stop_all(&mut self) -> usize {
        let mut failed = 0;
        for svc in self.services.iter_mut().filter(|s| s.is_running()) {
            if let Err(e) = svc.stop().await {
                error!("could not stop {}: {e}", svc.identity());
                failed += 1;
            }
        }
        failed
    }

    /// Restart every running instance immediately.
    pub async fn restart_all(&mut self) -> usize {
        let mut failed = 0;
        for svc in self.services.iter_mut().filter(|s| s.is_running()) {
            if let Err(e) = svc.restart().await {
                error!("could not restart {}: {e}", svc.identity());
                failed += 1;
            }
        }
        failed
    }

    /// Take over instances whose processes are already up by calling
    /// `start` on them, so a fresh manager sees the host as it is.
    pub async fn attach_all(&mut self) {
        for svc in self.services.iter_mut() {
            if !svc.process_is_up().await {
                continue;
            }
            if let Err(e) = svc.start().await {
                warn!("could not attach to {}: {e}", svc.identity());
            }
        }
    }

    // ── Delayed actions ───────────────────────────────────────────

    /// Drain and then stop, restart or update every instance.
    ///
    /// `action` must be `stop`, `restart` or `update`; the caller must
    /// hold elevated privileges. Either failure returns before anything
    /// is touched.
    pub async fn delayed_action(&mut self, action: &str) -> Result<DrainReport, WardenError> {
        let action: DrainAction = action.parse()?;
        if !self.privileged {
            return Err(WardenError::PermissionDenied(action.to_string()));
        }

        let message = match self.get_option_value(&action.message_option()) {
            Some(msg) if !msg.is_empty() => msg.to_string(),
            _ => action.default_message(),
        };
        let scheduler = match &self.scheduler {
            Some(base) => base.clone().with_message(message),
            None => DrainScheduler::new(message),
        };

        Ok(scheduler
            .run(action, &mut self.services, self.updater.as_ref())
            .await)
    }

    pub async fn delayed_stop_all(&mut self) -> Result<DrainReport, WardenError> {
        self.delayed_action("stop").await
    }

    pub async fn delayed_restart_all(&mut self) -> Result<DrainReport, WardenError> {
        self.delayed_action("restart").await
    }

    pub async fn delayed_update(&mut self) -> Result<DrainReport, WardenError> {
        self.delayed_action("update").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeProcess, FakeServer, FakeUpdater};

    fn app(servers: &[(&str, &FakeServer)], process: &FakeProcess) -> Application {
        let services = servers
            .iter()
            .map(|(name, server)| {
                ServiceInstance::new(*name, (*server).clone()).with_process(process.clone())
            })
            .collect();
        Application::new("testgame", services)
    }

    #[test]
    fn options_get_and_set() {
        let mut options = Options::default();
        assert_eq!(options.get("restart_delayed"), None);
        assert!(options.set("restart_delayed", "bye in {time}"));
        assert!(!options.set("restart_delayed", "bye in {time}"));
        assert_eq!(options.get("restart_delayed"), Some("bye in {time}"));
        assert_eq!(options.names().collect::<Vec<_>>(), vec!["restart_delayed"]);
    }

    #[tokio::test]
    async fn start_all_skips_disabled() {
        let (a, b) = (FakeServer::new(), FakeServer::new());
        let process = FakeProcess::default();
        let services = vec![
            ServiceInstance::new("a", a.clone()).with_process(process.clone()),
            ServiceInstance::new("b", b.clone())
                .with_process(process.clone())
                .enabled(false),
        ];
        let mut app = Application::new("testgame", services);

        assert_eq!(app.start_all().await, 0);

        assert!(app.service("a").unwrap().is_running());
        assert!(!app.service("b").unwrap().is_running());
        assert!(app.is_active());
    }

    #[tokio::test]
    async fn stop_all_and_restart_all_touch_running_only() {
        let (a, b) = (FakeServer::new(), FakeServer::new());
        let process = FakeProcess::default();
        let mut app = app(&[("a", &a), ("b", &b)], &process);
        app.service_mut("a").unwrap().start().await.unwrap();

        assert_eq!(app.restart_all().await, 0);
        assert_eq!(process.launches_of("a"), 2);
        assert_eq!(process.launches_of("b"), 0);

        assert_eq!(app.stop_all().await, 0);
        assert!(!app.is_active());
        assert!(process.terminated_at("b").is_none());
    }

    #[tokio::test]
    async fn attach_all_starts_live_processes() {
        let (a, b) = (FakeServer::new(), FakeServer::new());
        let process = FakeProcess::default();
        let mut app = app(&[("a", &a), ("b", &b)], &process);
        process.log.lock().unwrap().down.push("a".into());

        app.attach_all().await;

        assert!(!app.service("a").unwrap().is_running());
        assert!(app.service("b").unwrap().is_running());
    }

    #[tokio::test]
    async fn delayed_action_rejects_unknown_action() {
        let a = FakeServer::new();
        let process = FakeProcess::default();
        let mut app = app(&[("a", &a)], &process).with_privileges(true);
        app.service_mut("a").unwrap().start().await.unwrap();

        let err = app.delayed_action("explode").await.unwrap_err();
        assert!(matches!(err, WardenError::InvalidAction(_)));
        assert!(app.service("a").unwrap().is_running());
    }

    #[tokio::test]
    async fn delayed_action_requires_privileges() {
        let a = FakeServer::new();
        let process = FakeProcess::default();
        let mut app = app(&[("a", &a)], &process);
        app.service_mut("a").unwrap().start().await.unwrap();

        let err = app.delayed_stop_all().await.unwrap_err();
        assert!(matches!(err, WardenError::PermissionDenied(_)));
        assert!(app.service("a").unwrap().is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_restart_uses_configured_message() {
        let busy = FakeServer::with_players(2);
        let process = FakeProcess::default();
        let mut options = Options::default();
        options.set("restart_delayed", "Restarting in {time}m");
        let mut app = app(&[("busy", &busy)], &process)
            .with_options(options)
            .with_privileges(true)
            .with_updater(FakeUpdater::default());
        app.service_mut("busy").unwrap().start().await.unwrap();

        let report = app.delayed_restart_all().await.unwrap();

        assert_eq!(report.restarted, vec!["busy".to_string()]);
        assert_eq!(busy.commands()[1], "say Restarting in 55m");
        assert!(app.service("busy").unwrap().is_running());
    }
}
