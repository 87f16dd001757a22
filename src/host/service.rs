//! Service manager control

use super::command;
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

/// systemd unit of the containerd daemon
pub const CONTAINERD_SERVICE: &str = "containerd.service";

/// Restart and reload operations the reconciler needs
#[async_trait]
pub trait ServiceControl: Send + Sync {
    /// Restart a unit
    async fn restart(&self, unit: &str) -> Result<()>;

    /// Reload unit files after a drop-in change
    async fn daemon_reload(&self) -> Result<()>;
}

/// [`ServiceControl`] backed by `systemctl`
#[derive(Debug, Clone)]
pub struct Systemctl {
    timeout: Duration,
}

impl Systemctl {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for Systemctl {
    fn default() -> Self {
        Self::new(command::DEFAULT_TIMEOUT)
    }
}

#[async_trait]
impl ServiceControl for Systemctl {
    async fn restart(&self, unit: &str) -> Result<()> {
        command::output("systemctl", &["restart", unit], self.timeout).await?;
        info!("Restarted {}", unit);
        Ok(())
    }

    async fn daemon_reload(&self) -> Result<()> {
        command::output("systemctl", &["daemon-reload"], self.timeout).await?;
        Ok(())
    }
}
