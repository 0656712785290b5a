use crate::error::LaunchError;
use log::{debug, info, warn};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Brings every window owned by a named process to the front.
pub trait WindowRaiser: Send + Sync {
    fn name(&self) -> &str;
    fn raise(&self, process_name: &str) -> Result<(), LaunchError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OsaScriptRaiser;

impl OsaScriptRaiser {
    fn script(process_name: &str) -> String {
        let escaped = process_name.replace('\\', "\\\\").replace('"', "\\\"");
        format!(
            "tell application \"System Events\" to set frontmost of every process whose name is \"{}\" to true",
            escaped
        )
    }
}

impl WindowRaiser for OsaScriptRaiser {
    fn name(&self) -> &str {
        "osascript"
    }

    fn raise(&self, process_name: &str) -> Result<(), LaunchError> {
        let output = Command::new("osascript")
            .arg("-e")
            .arg(Self::script(process_name))
            .output()
            .map_err(|e| LaunchError::ForegroundRaise(format!("failed to run osascript: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LaunchError::ForegroundRaise(format!(
                "osascript exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRaiser;

impl WindowRaiser for NoopRaiser {
    fn name(&self) -> &str {
        "none"
    }

    fn raise(&self, process_name: &str) -> Result<(), LaunchError> {
        debug!("Skipping raise of {} windows", process_name);
        Ok(())
    }
}

#[cfg(target_os = "macos")]
pub fn host_raiser() -> Arc<dyn WindowRaiser> {
    Arc::new(OsaScriptRaiser)
}

#[cfg(not(target_os = "macos"))]
pub fn host_raiser() -> Arc<dyn WindowRaiser> {
    Arc::new(NoopRaiser)
}

/// Wait `settle`, then ask `raiser` to bring client windows forward.
///
/// Returns `true` if the raise succeeded. Failures are logged and never
/// propagated; cancellation during the settle delay skips the raise.
pub async fn raise_after(
    raiser: Arc<dyn WindowRaiser>,
    process_name: &str,
    settle: Duration,
    cancel: &CancellationToken,
) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(settle) => {}
        _ = cancel.cancelled() => {
            debug!("Raise cancelled during settle delay");
            return false;
        }
    }

    let name = process_name.to_string();
    let backend = raiser.name().to_string();
    let result = tokio::task::spawn_blocking(move || raiser.raise(&name)).await;

    match result {
        Ok(Ok(())) => {
            info!("Raised {} windows via {}", process_name, backend);
            true
        }
        Ok(Err(e)) => {
            warn!("{}", e);
            false
        }
        Err(e) => {
            warn!("Raise task failed: {}", e);
            false
        }
    }
}
