//! Service controller port (restarting the proxy after a config change).

use std::{process::Stdio, time::Duration};

use tokio::process::Command;

use crate::{errors::Error, Result};

/// Fire-and-forget reload of the proxy service.
///
/// `Ok` only means the request was issued; the restart result is never observed
/// by callers.
pub trait ServiceController: Send + Sync {
    fn signal_reload(&self) -> Result<()>;
}

/// `systemctl restart <unit>` on the current tokio runtime.
#[derive(Clone, Debug)]
pub struct SystemdController {
    unit: String,
    timeout: Duration,
}

impl SystemdController {
    pub fn new(unit: impl Into<String>, timeout: Duration) -> Self {
        Self {
            unit: unit.into(),
            timeout,
        }
    }
}

impl ServiceController for SystemdController {
    fn signal_reload(&self) -> Result<()> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::External(format!("no runtime to restart {}: {e}", self.unit)))?;

        let mut cmd = Command::new("systemctl");
        cmd.arg("restart")
            .arg(&self.unit)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let unit = self.unit.clone();
        let timeout = self.timeout;
        let child = cmd
            .spawn()
            .map_err(|e| Error::External(format!("failed to spawn systemctl: {e}")))?;

        handle.spawn(async move {
            match tokio::time::timeout(timeout, child.wait_with_output()).await {
                Ok(Ok(out)) if out.status.success() => {
                    tracing::info!(%unit, "service restarted");
                }
                Ok(Ok(out)) => {
                    let stderr = String::from_utf8_lossy(&out.stderr);
                    tracing::warn!(%unit, status = %out.status, stderr = %stderr.trim(), "service restart failed");
                }
                Ok(Err(e)) => tracing::warn!(%unit, error = %e, "service restart failed"),
                Err(_) => tracing::warn!(%unit, ?timeout, "service restart timed out"),
            }
        });

        Ok(())
    }
}
