//! Visual desktop automation for bulk song and certificate downloads.
//!
//! The crate locates UI controls on live screenshots by template matching
//! and drives synthetic mouse/keyboard input through them: a scan loop finds
//! every visible action icon, a step engine clicks through the per-row modal
//! sequence, and a project tracker maps finished downloads onto pre-created
//! destination folders for duplicate detection.

use std::sync::Arc;

use tracing::debug;

pub mod catalog;
pub mod cert;
pub mod config;
pub mod engine;
pub mod errors;
pub mod events;
pub mod locate;
pub mod orchestrator;
pub mod platforms;
pub mod probe;
pub mod project;
pub mod staging;
pub mod template;
#[cfg(test)]
mod tests;
pub mod types;

pub use catalog::{CatalogItem, CatalogSource, CdpCatalog};
pub use cert::CertOrchestrator;
pub use config::OrchestratorConfig;
pub use errors::AutomationError;
pub use events::{EventSink, NullSink, RowOutcome, RunSummary, StopToken, TracingSink};
pub use orchestrator::Orchestrator;
pub use template::{Match, TemplateId, TemplateLibrary};
pub use types::{MonitorInfo, ScreenshotResult};

use platforms::DesktopEngine;

/// Screen capture and synthetic input bound to one monitor.
///
/// Everything above this type works in screenshot-relative coordinates; the
/// `Desktop` is solely responsible for translating them to absolute desktop
/// coordinates by adding the monitor offset.
#[derive(Clone)]
pub struct Desktop {
    engine: Arc<dyn DesktopEngine>,
    monitor: MonitorInfo,
}

impl Desktop {
    /// Bind the platform engine to the monitor with the given enumeration
    /// index.
    pub fn new(monitor_index: usize) -> Result<Self, AutomationError> {
        let engine = platforms::create_engine()?;
        Self::with_engine(engine, monitor_index)
    }

    /// Bind a caller-supplied engine; used by the tests' scripted engine.
    pub fn with_engine(
        engine: Arc<dyn DesktopEngine>,
        monitor_index: usize,
    ) -> Result<Self, AutomationError> {
        let monitor = engine
            .list_monitors()?
            .into_iter()
            .find(|m| m.index == monitor_index)
            .ok_or_else(|| {
                AutomationError::InvalidArgument(format!("no monitor with index {monitor_index}"))
            })?;
        debug!(?monitor, "desktop bound to monitor");
        Ok(Self { engine, monitor })
    }

    pub fn monitor(&self) -> &MonitorInfo {
        &self.monitor
    }

    pub fn monitor_offset(&self) -> (i32, i32) {
        (self.monitor.x, self.monitor.y)
    }

    pub fn monitor_size(&self) -> (u32, u32) {
        (self.monitor.width, self.monitor.height)
    }

    pub async fn capture(&self) -> Result<ScreenshotResult, AutomationError> {
        self.engine.capture_monitor(self.monitor.index).await
    }

    pub fn click(&self, x: u32, y: u32) -> Result<(), AutomationError> {
        self.engine
            .click(self.monitor.x + x as i32, self.monitor.y + y as i32)
    }

    pub fn move_mouse(&self, x: u32, y: u32) -> Result<(), AutomationError> {
        self.engine
            .move_mouse(self.monitor.x + x as i32, self.monitor.y + y as i32)
    }

    /// Wheel-scroll at a position; positive `rows` scrolls up.
    pub fn scroll(&self, rows: i32, x: u32, y: u32) -> Result<(), AutomationError> {
        self.engine
            .scroll_wheel(rows, self.monitor.x + x as i32, self.monitor.y + y as i32)
    }

    /// SendKeys-style sequence, e.g. `{esc}` or `^{home}`.
    pub fn press_key(&self, keys: &str) -> Result<(), AutomationError> {
        self.engine.press_key(keys)
    }

    /// Park the pointer at the monitor center. Done before multi-key
    /// sequences so the presses don't land on a hover state or trip a
    /// platform fail-safe corner.
    pub fn move_to_neutral(&self) -> Result<(), AutomationError> {
        let (w, h) = self.monitor_size();
        self.move_mouse(w / 2, h / 2)
    }
}
