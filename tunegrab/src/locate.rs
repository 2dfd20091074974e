//! Retrying template search against fresh screenshots.
//!
//! Controls appear and disappear as modals animate in, so a single capture
//! is rarely conclusive. The locator re-captures between attempts, bounded
//! by the configured retry budget; exhaustion yields `None` for the caller
//! to turn into a row-level outcome.

use tokio::time::sleep;
use tracing::trace;

use crate::config::{secs, OrchestratorConfig};
use crate::errors::AutomationError;
use crate::events::StopToken;
use crate::template::{Match, TemplateId, TemplateLibrary};
use crate::Desktop;

pub struct ScreenLocator<'a> {
    desktop: &'a Desktop,
    templates: &'a TemplateLibrary,
    config: &'a OrchestratorConfig,
    stop: &'a StopToken,
}

impl<'a> ScreenLocator<'a> {
    pub fn new(
        desktop: &'a Desktop,
        templates: &'a TemplateLibrary,
        config: &'a OrchestratorConfig,
        stop: &'a StopToken,
    ) -> Self {
        Self {
            desktop,
            templates,
            config,
            stop,
        }
    }

    /// Single capture, best match.
    pub async fn find_once(&self, id: TemplateId) -> Result<Option<Match>, AutomationError> {
        let gray = self.desktop.capture().await?.to_gray()?;
        self.templates
            .find(&gray, id, self.config.threshold_for(id))
    }

    /// Single capture, all matches (best confidence first).
    pub async fn find_all_once(&self, id: TemplateId) -> Result<Vec<Match>, AutomationError> {
        let gray = self.desktop.capture().await?.to_gray()?;
        self.templates
            .find_all(&gray, id, self.config.threshold_for(id))
    }

    /// Retry `find_once` up to the configured attempt budget.
    pub async fn find(&self, id: TemplateId) -> Result<Option<Match>, AutomationError> {
        for attempt in 0..self.config.template_retries.max(1) {
            if self.stop.is_stopped() {
                return Ok(None);
            }
            if attempt > 0 {
                sleep(secs(self.config.template_retry_delay_secs)).await;
            }
            if let Some(m) = self.find_once(id).await? {
                return Ok(Some(m));
            }
            trace!(template = %id, attempt, "template not on screen yet");
        }
        Ok(None)
    }

    /// Retrying variant of [`TemplateLibrary::find_button_in_row`].
    pub async fn find_row_button(
        &self,
        id: TemplateId,
    ) -> Result<Option<(u32, u32)>, AutomationError> {
        Ok(self.find(id).await?.map(|m| {
            let x = (m.x as i32 + self.config.row_button_offset_x).max(0) as u32;
            (x, m.y)
        }))
    }
}
