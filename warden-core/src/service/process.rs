//! Process supervision collaborators.
//!
//! warden does not supervise processes itself; it asks the host's
//! service manager to start and stop them.

use std::fmt::Debug;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::WardenError;

#[async_trait]
pub trait ProcessControl: Send + Sync + Debug {
    /// Launch the process backing `service`. Launching an already
    /// running process must succeed.
    async fn launch(&self, service: &str) -> Result<(), WardenError>;

    /// Terminate the process backing `service`.
    async fn terminate(&self, service: &str) -> Result<(), WardenError>;

    /// Whether the process appears to be up right now.
    async fn is_active(&self, service: &str) -> bool;
}

/// Drives systemd units named after the service.
#[derive(Debug, Clone, Default)]
pub struct Systemd;

impl Systemd {
    async fn systemctl(&self, verb: &str, unit: &str) -> Result<(), WardenError> {
        debug!("systemctl {verb} {unit}");
        let status = Command::new("systemctl")
            .arg(verb)
            .arg(unit)
            .status()
            .await
            .map_err(|e| WardenError::Process {
                service: unit.to_string(),
                reason: format!("could not run systemctl: {e}"),
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(WardenError::Process {
                service: unit.to_string(),
                reason: format!("systemctl {verb} exited with {status}"),
            })
        }
    }
}

#[async_trait]
impl ProcessControl for Systemd {
    async fn launch(&self, service: &str) -> Result<(), WardenError> {
        self.systemctl("start", service).await
    }

    async fn terminate(&self, service: &str) -> Result<(), WardenError> {
        self.systemctl("stop", service).await
    }

    async fn is_active(&self, service: &str) -> bool {
        Command::new("systemctl")
            .args(["is-active", "--quiet", service])
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

/// For servers managed elsewhere: launch and terminate do nothing and the
/// control channel alone decides whether the server is up.
#[derive(Debug, Clone, Default)]
pub struct Detached;

#[async_trait]
impl ProcessControl for Detached {
    async fn launch(&self, _service: &str) -> Result<(), WardenError> {
        Ok(())
    }

    async fn terminate(&self, _service: &str) -> Result<(), WardenError> {
        Ok(())
    }

    async fn is_active(&self, _service: &str) -> bool {
        true
    }
}
