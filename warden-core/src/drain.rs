//! Player-aware maintenance across all instances of one application.
//!
//! A drain gives connected players up to `deadline_minutes` to leave
//! before a stop, restart or update. Once per tick every running
//! instance is polled for players:
//!
//! - empty instances are stopped at once;
//! - occupied instances are warned every 5 minutes;
//! - at 5 minutes left the remaining instances are stopped anyway.
//!
//! After the loop an update is run (for `Update`) and the instances that
//! were running are started again (for `Restart` and `Update`).
//!
//! Instances are examined one after another within a tick.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{error, info};

use crate::app::Updater;
use crate::error::WardenError;
use crate::service::ServiceInstance;

/// Minutes players get before the hard stop.
pub const DEFAULT_DEADLINE_MINUTES: i64 = 55;

/// Occupied instances are stopped once this many minutes are left.
pub const HARD_STOP_MINUTES: i64 = 5;

/// Warnings go out whenever the minutes left are a multiple of this.
pub const WARNING_INTERVAL_MINUTES: i64 = 5;

/// One scheduler tick; also the length of a "minute" in the countdown.
pub const DEFAULT_TICK: Duration = Duration::from_secs(60);

// ── DrainAction ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrainAction {
    Stop,
    Restart,
    Update,
}

impl DrainAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DrainAction::Stop => "stop",
            DrainAction::Restart => "restart",
            DrainAction::Update => "update",
        }
    }

    /// Option key holding the warning template for this action.
    pub fn message_option(&self) -> String {
        format!("{}_delayed", self.as_str())
    }

    /// Warning used when no template is configured.
    pub fn default_message(&self) -> String {
        format!(
            "Server will {} in {{time}} minutes. Please prepare to log off safely.",
            self.as_str()
        )
    }

    /// Whether instances come back up after the drain.
    pub fn restarts(&self) -> bool {
        matches!(self, DrainAction::Restart | DrainAction::Update)
    }
}

impl FromStr for DrainAction {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stop" => Ok(DrainAction::Stop),
            "restart" => Ok(DrainAction::Restart),
            "update" => Ok(DrainAction::Update),
            other => Err(WardenError::InvalidAction(other.to_string())),
        }
    }
}

impl fmt::Display for DrainAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── DrainPlan ────────────────────────────────────────────────────

/// State of one drain; lives only as long as the scheduling run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainPlan {
    pub action: DrainAction,
    pub deadline_minutes: i64,
    pub services_running_at_start: BTreeSet<String>,
}

/// What a finished drain did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainReport {
    pub plan: DrainPlan,
    /// Number of ticks the loop ran.
    pub ticks: u32,
    /// Result of the update collaborator, for `Update`.
    pub updated: Option<bool>,
    /// Instances started again afterwards.
    pub restarted: Vec<String>,
    /// Instances whose stop or start failed.
    pub failed: Vec<String>,
}

// ── DrainScheduler ───────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DrainScheduler {
    message: String,
    tick: Duration,
    deadline_minutes: i64,
}

impl DrainScheduler {
    /// `message` is the player warning; `{time}` is replaced by the
    /// minutes left.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            tick: DEFAULT_TICK,
            deadline_minutes: DEFAULT_DEADLINE_MINUTES,
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick.max(Duration::from_millis(1));
        self
    }

    pub fn with_deadline(mut self, minutes: i64) -> Self {
        self.deadline_minutes = minutes;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn tick(&self) -> Duration {
        self.tick
    }

    pub fn deadline_minutes(&self) -> i64 {
        self.deadline_minutes
    }

    /// `deadline - floor(elapsed / tick)`.
    pub fn minutes_left(&self, elapsed: Duration) -> i64 {
        let passed = elapsed.as_nanos() / self.tick.as_nanos();
        self.deadline_minutes - passed as i64
    }

    pub fn warning(&self, minutes_left: i64) -> String {
        self.message.replace("{time}", &minutes_left.to_string())
    }

    /// Drain `services`, then update and restart as `action` requires.
    pub async fn run(
        &self,
        action: DrainAction,
        services: &mut [ServiceInstance],
        updater: &dyn Updater,
    ) -> DrainReport {
        let mut report = self.drain(action, services).await;

        if action == DrainAction::Update {
            info!("all services stopped; updating");
            let ok = updater.update().await;
            if !ok {
                error!("update failed; restarting previous build");
            }
            report.updated = Some(ok);
        }

        if action.restarts() {
            for service in services.iter_mut() {
                if !report
                    .plan
                    .services_running_at_start
                    .contains(service.identity())
                {
                    continue;
                }
                info!("starting {}", service.identity());
                match service.start().await {
                    Ok(()) => report.restarted.push(service.identity().to_string()),
                    Err(e) => {
                        error!("could not start {} after {action}: {e}", service.identity());
                        report.failed.push(service.identity().to_string());
                    }
                }
            }
        }

        report
    }

    /// The countdown loop alone: returns once every instance is stopped
    /// or the deadline has passed.
    pub async fn drain(&self, action: DrainAction, services: &mut [ServiceInstance]) -> DrainReport {
        let start = Instant::now();
        let mut report = DrainReport {
            plan: DrainPlan {
                action,
                deadline_minutes: self.deadline_minutes,
                services_running_at_start: BTreeSet::new(),
            },
            ticks: 0,
            updated: None,
            restarted: Vec::new(),
            failed: Vec::new(),
        };

        info!(
            "issuing {action} for all services; players get up to {} minutes to log off",
            self.deadline_minutes
        );

        loop {
            report.ticks += 1;
            let minutes_left = self.minutes_left(start.elapsed());
            let warning_due = minutes_left > HARD_STOP_MINUTES
                && minutes_left % WARNING_INTERVAL_MINUTES == 0;

            for service in services.iter_mut() {
                if !service.is_running() {
                    continue;
                }
                report
                    .plan
                    .services_running_at_start
                    .insert(service.identity().to_string());

                let players = service.player_count().await.unwrap_or(0);
                if players == 0 {
                    info!("no players on {}; stopping now", service.identity());
                    stop_logged(service, &mut report.failed).await;
                } else if minutes_left <= HARD_STOP_MINUTES {
                    info!(
                        "{players} player(s) still on {}; grace period over",
                        service.identity()
                    );
                    stop_logged(service, &mut report.failed).await;
                } else if warning_due {
                    service.send_message(&self.warning(minutes_left)).await;
                }
            }

            if warning_due {
                info!("{minutes_left} minutes remaining before {action}");
            }

            let still_running = services.iter().any(|s| s.is_running());
            if !still_running || minutes_left <= 0 {
                break;
            }

            tokio::time::sleep(self.tick).await;
        }

        report
    }
}

async fn stop_logged(service: &mut ServiceInstance, failed: &mut Vec<String>) {
    if let Err(e) = service.stop().await {
        error!("could not stop {}: {e}", service.identity());
        failed.push(service.identity().to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeProcess, FakeServer, FakeUpdater};

    async fn running(name: &str, server: &FakeServer, process: &FakeProcess) -> ServiceInstance {
        let mut svc = ServiceInstance::new(name, server.clone()).with_process(process.clone());
        svc.start().await.unwrap();
        svc
    }

    fn scheduler() -> DrainScheduler {
        DrainScheduler::new(DrainAction::Restart.default_message())
    }

    #[test]
    fn parse_actions() {
        assert_eq!("stop".parse::<DrainAction>().unwrap(), DrainAction::Stop);
        assert_eq!("restart".parse::<DrainAction>().unwrap(), DrainAction::Restart);
        assert_eq!("update".parse::<DrainAction>().unwrap(), DrainAction::Update);
        assert!(matches!(
            "reboot".parse::<DrainAction>(),
            Err(WardenError::InvalidAction(a)) if a == "reboot"
        ));
    }

    #[test]
    fn countdown_math() {
        let s = scheduler();
        assert_eq!(s.minutes_left(Duration::ZERO), 55);
        assert_eq!(s.minutes_left(Duration::from_secs(59)), 55);
        assert_eq!(s.minutes_left(Duration::from_secs(60)), 54);
        assert_eq!(s.minutes_left(Duration::from_secs(50 * 60)), 5);
    }

    #[test]
    fn warning_substitutes_time() {
        assert_eq!(
            scheduler().warning(35),
            "Server will restart in 35 minutes. Please prepare to log off safely."
        );
        assert_eq!(DrainAction::Update.message_option(), "update_delayed");
    }

    #[tokio::test(start_paused = true)]
    async fn empty_instance_stops_on_first_tick() {
        let process = FakeProcess::default();
        let empty = FakeServer::with_players(0);
        let busy = FakeServer::with_players(3);
        let mut services = vec![
            running("empty", &empty, &process).await,
            running("busy", &busy, &process).await,
        ];
        let started = Instant::now();

        scheduler().drain(DrainAction::Stop, &mut services).await;

        let empty_stop = process.terminated_at("empty").unwrap();
        assert_eq!(empty_stop.duration_since(started), Duration::ZERO);
        assert!(!services[0].is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn occupied_instance_stops_at_five_minutes_left() {
        let process = FakeProcess::default();
        let busy = FakeServer::with_players(3);
        let mut services = vec![running("busy", &busy, &process).await];
        let started = Instant::now();

        let report = scheduler().drain(DrainAction::Stop, &mut services).await;

        let stopped_at = process.terminated_at("busy").unwrap();
        assert_eq!(stopped_at.duration_since(started), Duration::from_secs(50 * 60));
        assert_eq!(report.ticks, 51);
        assert!(!services[0].is_running());

        let warnings: Vec<String> = busy
            .commands()
            .into_iter()
            .filter(|c| c.starts_with("say "))
            .collect();
        assert_eq!(warnings.len(), 10);
        assert!(warnings[0].contains("in 55 minutes"));
        assert!(warnings[9].contains("in 10 minutes"));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_player_count_counts_as_empty() {
        let process = FakeProcess::default();
        let server = FakeServer::new();
        server.set_players(None);
        let mut services = vec![running("quiet", &server, &process).await];

        let report = scheduler().drain(DrainAction::Stop, &mut services).await;

        assert_eq!(report.ticks, 1);
        assert!(!services[0].is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_restores_only_running_instances() {
        let process = FakeProcess::default();
        let a = FakeServer::with_players(0);
        let b = FakeServer::with_players(0);
        let mut services = vec![
            running("a", &a, &process).await,
            ServiceInstance::new("b", b.clone()).with_process(process.clone()),
        ];
        let updater = FakeUpdater::default();

        let report = scheduler()
            .run(DrainAction::Restart, &mut services, &updater)
            .await;

        assert_eq!(report.restarted, vec!["a".to_string()]);
        assert!(services[0].is_running());
        assert!(!services[1].is_running());
        assert_eq!(process.launches_of("a"), 2);
        assert_eq!(process.launches_of("b"), 0);
        assert_eq!(updater.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn update_runs_between_stop_and_start() {
        let process = FakeProcess::default();
        let server = FakeServer::with_players(0);
        let mut services = vec![running("a", &server, &process).await];
        let updater = FakeUpdater::default();

        let report = scheduler()
            .run(DrainAction::Update, &mut services, &updater)
            .await;

        assert_eq!(updater.calls(), 1);
        assert_eq!(report.updated, Some(true));
        assert!(services[0].is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_action_leaves_instances_down() {
        let process = FakeProcess::default();
        let server = FakeServer::with_players(0);
        let mut services = vec![running("a", &server, &process).await];
        let updater = FakeUpdater::default();

        let report = scheduler()
            .run(DrainAction::Stop, &mut services, &updater)
            .await;

        assert!(report.restarted.is_empty());
        assert!(!services[0].is_running());
        assert_eq!(process.launches_of("a"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_running_ends_immediately() {
        let process = FakeProcess::default();
        let server = FakeServer::with_players(4);
        let mut services = vec![ServiceInstance::new("idle", server.clone()).with_process(process)];

        let report = scheduler().drain(DrainAction::Restart, &mut services).await;

        assert_eq!(report.ticks, 1);
        assert!(report.plan.services_running_at_start.is_empty());
        assert_eq!(server.opens(), 0);
    }
}
