//! Platform engines for screen capture and synthetic input.

use std::sync::Arc;

use crate::errors::AutomationError;
use crate::types::{MonitorInfo, ScreenshotResult};

/// The common trait every platform engine must implement.
///
/// Input coordinates are absolute desktop pixels; translating from
/// screenshot-relative coordinates is the [`crate::Desktop`] wrapper's job.
#[async_trait::async_trait]
pub trait DesktopEngine: Send + Sync {
    /// All monitors of the virtual desktop, in platform enumeration order.
    fn list_monitors(&self) -> Result<Vec<MonitorInfo>, AutomationError>;

    /// Capture a full bitmap of one monitor.
    async fn capture_monitor(&self, index: usize) -> Result<ScreenshotResult, AutomationError>;

    /// Left-click at the given position.
    fn click(&self, x: i32, y: i32) -> Result<(), AutomationError>;

    /// Move the pointer without clicking.
    fn move_mouse(&self, x: i32, y: i32) -> Result<(), AutomationError>;

    /// Wheel-scroll at the given position; positive `delta` scrolls up.
    fn scroll_wheel(&self, delta: i32, x: i32, y: i32) -> Result<(), AutomationError>;

    /// Send a key sequence in SendKeys-style syntax, e.g. `{esc}` or
    /// `^{home}`.
    fn press_key(&self, keys: &str) -> Result<(), AutomationError>;
}

#[cfg(target_os = "windows")]
pub mod windows;

/// Create the appropriate engine for the current platform
pub fn create_engine() -> Result<Arc<dyn DesktopEngine>, AutomationError> {
    #[cfg(target_os = "windows")]
    {
        Ok(Arc::new(windows::WindowsEngine::new()?))
    }
    #[cfg(not(target_os = "windows"))]
    {
        Err(AutomationError::UnsupportedPlatform(
            "synthetic input is currently only implemented for Windows".to_string(),
        ))
    }
}
