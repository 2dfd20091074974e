//! Media duration probing.
//!
//! The catalog's displayed duration and the downloaded file's real duration
//! can differ by rounding, so duplicate detection probes the file itself.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::errors::AutomationError;

#[async_trait]
pub trait DurationProbe: Send + Sync {
    /// Real duration of a media file, in seconds.
    async fn duration(&self, path: &Path) -> Result<f64, AutomationError>;
}

/// Probe backed by an `ffprobe` subprocess.
pub struct FfprobeProbe;

#[async_trait]
impl DurationProbe for FfprobeProbe {
    async fn duration(&self, path: &Path) -> Result<f64, AutomationError> {
        let output = Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .output()
            .await
            .map_err(|e| {
                AutomationError::PlatformError(format!("failed to launch ffprobe: {e}"))
            })?;

        if !output.status.success() {
            return Err(AutomationError::PlatformError(format!(
                "ffprobe exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout);
        let secs = text.trim().parse::<f64>().map_err(|_| {
            AutomationError::PlatformError(format!("unexpected ffprobe output: {text:?}"))
        })?;
        debug!(file = %path.display(), secs, "probed media duration");
        Ok(secs)
    }
}
