//! warden: game-server service manager.
//!
//! ```text
//! warden status                     Show the state of every service
//! warden start [service]            Start one service, or all enabled ones
//! warden stop [service]             Stop immediately
//! warden restart [service]          Restart immediately
//! warden delayed-stop               Drain players, then stop (root)
//! warden delayed-restart            Drain players, then restart (root)
//! warden delayed-update             Drain players, update, then restart (root)
//! warden exec <service> <cmd...>    Run a console command
//! warden players [service]          Exit 0 if anyone is online
//! warden get-option <name>          Print an option value
//! warden set-option <name> <value>  Set an option and save the config
//! warden --config <path>            Load a custom config TOML
//! warden --gen-config               Write the example config to --config
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use warden_core::{Application, DrainReport, ManagerConfig, WardenError};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "warden", about = "Manage dedicated game-server services")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "warden.toml")]
    config: PathBuf,

    /// Write the example configuration to the --config path and exit.
    /// An existing file is never overwritten.
    #[arg(long)]
    gen_config: bool,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Show the state of every service.
    Status,
    /// Start a service, or every enabled service.
    Start { service: Option<String> },
    /// Stop a service, or every running service.
    Stop { service: Option<String> },
    /// Restart a service, or every running service.
    Restart { service: Option<String> },
    /// Wait for players to leave, then stop everything.
    DelayedStop,
    /// Wait for players to leave, then restart what was running.
    DelayedRestart,
    /// Wait for players to leave, update the game, then restart.
    DelayedUpdate,
    /// Send a console command to a running service.
    Exec {
        service: String,
        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
    },
    /// Print player counts; exits 0 if any player is online.
    Players { service: Option<String> },
    /// Print an option value.
    GetOption { name: String },
    /// Set an option value and save it to the config file.
    SetOption { name: String, value: String },
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: write the example and exit.
    if cli.gen_config {
        ManagerConfig::write_default(&cli.config)?;
        println!("wrote {}", cli.config.display());
        return Ok(ExitCode::SUCCESS);
    }

    let mut config = ManagerConfig::load(&cli.config)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let command = cli.command.unwrap_or(Cmd::Status);

    // Option commands never touch the servers.
    match &command {
        Cmd::GetOption { name } => {
            return Ok(match config.app.options.get(name) {
                Some(value) => {
                    println!("{value}");
                    ExitCode::SUCCESS
                }
                None => ExitCode::FAILURE,
            });
        }
        Cmd::SetOption { name, value } => {
            let mut app = config.build_application();
            if app.set_option(name, value) {
                config.app.options = app.options().clone().into_inner();
                config.save(&cli.config)?;
                info!("{name} updated");
            }
            return Ok(ExitCode::SUCCESS);
        }
        _ => {}
    }

    let mut app = config.build_application().with_privileges(is_root());
    app.attach_all().await;

    let code = match command {
        Cmd::Status => {
            print_status(&app);
            ExitCode::SUCCESS
        }
        Cmd::Start { service } => lifecycle(&mut app, service, Lifecycle::Start).await?,
        Cmd::Stop { service } => lifecycle(&mut app, service, Lifecycle::Stop).await?,
        Cmd::Restart { service } => lifecycle(&mut app, service, Lifecycle::Restart).await?,
        Cmd::DelayedStop => drained(app.delayed_stop_all().await?),
        Cmd::DelayedRestart => drained(app.delayed_restart_all().await?),
        Cmd::DelayedUpdate => drained(app.delayed_update().await?),
        Cmd::Exec { service, command } => {
            let svc = app
                .service_mut(&service)
                .ok_or_else(|| unknown_service(&service))?;
            let reply = svc.execute(&command.join(" ")).await?;
            if let Some(text) = reply.text() {
                println!("{text}");
            }
            ExitCode::SUCCESS
        }
        Cmd::Players { service } => {
            let mut online = 0;
            for svc in app.services() {
                if service.as_deref().is_some_and(|s| s != svc.identity()) {
                    continue;
                }
                let count = svc.player_count().await.unwrap_or(0);
                println!("{}: {count}", svc.identity());
                online += count;
            }
            if online > 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Cmd::GetOption { .. } | Cmd::SetOption { .. } => ExitCode::SUCCESS,
    };

    Ok(code)
}

// ── Commands ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Lifecycle {
    Start,
    Stop,
    Restart,
}

async fn lifecycle(
    app: &mut Application,
    service: Option<String>,
    op: Lifecycle,
) -> Result<ExitCode, WardenError> {
    let Some(name) = service else {
        let failed = match op {
            Lifecycle::Start => app.start_all().await,
            Lifecycle::Stop => app.stop_all().await,
            Lifecycle::Restart => app.restart_all().await,
        };
        return Ok(if failed == 0 {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    };

    let svc = app.service_mut(&name).ok_or_else(|| unknown_service(&name))?;
    match op {
        Lifecycle::Start => svc.start().await?,
        Lifecycle::Stop => svc.stop().await?,
        Lifecycle::Restart => svc.restart().await?,
    }
    Ok(ExitCode::SUCCESS)
}

fn drained(report: DrainReport) -> ExitCode {
    info!(
        "{} finished after {} tick(s)",
        report.plan.action, report.ticks
    );
    if report.updated == Some(false) {
        error!("update failed");
    }
    if report.failed.is_empty() && report.updated != Some(false) {
        ExitCode::SUCCESS
    } else {
        for name in &report.failed {
            error!("{name} did not complete {}", report.plan.action);
        }
        ExitCode::FAILURE
    }
}

fn print_status(app: &Application) {
    for svc in app.services() {
        let port = svc
            .port()
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "{:<24} {:<9} port {:<6} {}",
            svc.identity(),
            svc.state().to_string(),
            port,
            if svc.is_enabled() { "enabled" } else { "disabled" }
        );
    }
}

fn unknown_service(name: &str) -> WardenError {
    WardenError::Config(format!("no service named {name}"))
}

#[cfg(unix)]
fn is_root() -> bool {
    // SAFETY: geteuid() is a POSIX syscall that cannot fail and touches no
    // memory owned by Rust.
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
fn is_root() -> bool {
    false
}
