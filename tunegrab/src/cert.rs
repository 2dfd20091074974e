//! Certificate downloads.
//!
//! Reuses the song loop's scan/pagination shape, but the per-row sequence is
//! different: open the track's player, open its overflow menu, pick the
//! certificate entry and wait for a PDF instead of an audio file. A PDF's
//! filename carries no duration, so it is matched back to its project folder
//! by sanitized-name substring, an independent identity check that also
//! catches a stale click landing on the wrong track.

use std::fs;
use std::sync::Arc;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::catalog::CatalogSource;
use crate::config::{secs, OrchestratorConfig};
use crate::engine::close_modals;
use crate::errors::AutomationError;
use crate::events::{EventSink, NullSink, RowOutcome, RunSummary, StopToken};
use crate::locate::ScreenLocator;
use crate::orchestrator::{scroll_page_down, scroll_page_to_top, visited_band_cutoff};
use crate::project::ProjectTracker;
use crate::staging::{StagingDir, PDF_EXTENSIONS};
use crate::template::{Match, TemplateId, TemplateLibrary};
use crate::Desktop;

pub struct CertOrchestrator {
    desktop: Desktop,
    catalog_source: Arc<dyn CatalogSource>,
    config: OrchestratorConfig,
    templates: TemplateLibrary,
    tracker: ProjectTracker,
    staging: StagingDir,
    events: Arc<dyn EventSink>,
}

impl CertOrchestrator {
    pub fn new(
        desktop: Desktop,
        catalog_source: Arc<dyn CatalogSource>,
        config: OrchestratorConfig,
    ) -> Self {
        let templates = TemplateLibrary::open(&config.templates_dir);
        let tracker = ProjectTracker::new(&config.library_root);
        let staging = StagingDir::new(&config.staging_dir);
        Self {
            desktop,
            catalog_source,
            config,
            templates,
            tracker,
            staging,
            events: Arc::new(NullSink),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Download a certificate for every project folder that has media but no
    /// PDF yet. Folder number `N` maps to catalog position `N-1`, which maps
    /// to on-screen icon order once the page is scrolled to the top.
    pub async fn run(&self, stop: &StopToken) -> Result<RunSummary, AutomationError> {
        self.templates.verify(TemplateId::CERT_SET)?;

        let catalog = self.catalog_source.catalog().await?;
        self.events
            .on_log(&format!("{} songs in catalog", catalog.len()));

        let need = self.tracker.folders_needing_certificates();
        if need.is_empty() {
            self.events.on_log("all folders already have certificates");
            return Ok(RunSummary::default());
        }
        let needed_rows: Vec<usize> = need
            .keys()
            .filter(|n| **n >= 1 && **n <= catalog.len())
            .map(|n| n - 1)
            .collect();
        let total = needed_rows.len();
        self.events.on_log(&format!(
            "{total} folders need certificates: {:?}",
            need.keys().collect::<Vec<_>>()
        ));
        self.events.on_progress(0, total);

        let locator = ScreenLocator::new(&self.desktop, &self.templates, &self.config, stop);

        let mut summary = RunSummary::default();
        let mut row_index = 0usize;

        scroll_page_to_top(&self.desktop).await?;
        self.events.on_log("page scrolled to top");

        'rounds: for round in 0..=self.config.max_scroll_rounds {
            if stop.is_stopped() {
                self.events.on_log("stopped by user");
                break;
            }

            let mut icons = locator.find_all_once(TemplateId::DownloadIcon).await?;
            icons.sort_by_key(|m| m.y);
            self.events.on_icons_found(icons.len(), round);

            if icons.is_empty() {
                if round == 0 {
                    return Err(AutomationError::TemplateNotFound(
                        "no action icons visible on the first scan round".to_string(),
                    ));
                }
                warn!(round, "no icons on screen, stopping");
                break;
            }

            let cutoff = visited_band_cutoff(
                round,
                self.desktop.monitor_size().1,
                self.config.top_band_fraction,
            );
            let eligible: Vec<Match> = icons.into_iter().filter(|m| m.y > cutoff).collect();

            if eligible.is_empty() {
                if round < self.config.max_scroll_rounds && !stop.is_stopped() {
                    scroll_page_down(&self.desktop, &self.config).await?;
                }
                continue;
            }

            for icon in eligible {
                if stop.is_stopped() {
                    break 'rounds;
                }
                if summary.completed >= self.config.max_items {
                    break 'rounds;
                }
                let idx = row_index;
                row_index += 1;
                if !needed_rows.contains(&idx) {
                    continue;
                }
                let row_no = idx + 1;

                self.events.on_row_start(row_no, icon.x, icon.y);
                let outcome = self.run_certificate(&locator, icon, stop).await;
                match &outcome {
                    RowOutcome::Ok(folder) => {
                        self.events.on_row_complete(row_no, folder);
                    }
                    RowOutcome::Duplicate(folder) => {
                        self.events.on_row_duplicate(row_no, folder, "");
                    }
                    RowOutcome::Failed => self.events.on_row_failed(row_no),
                }
                summary.record(&outcome);
                self.events.on_progress(summary.completed, total);

                if summary.completed < total && !stop.is_stopped() {
                    sleep(secs(self.config.between_rows_secs)).await;
                }
            }

            if summary.completed >= total || row_index >= catalog.len() {
                break;
            }
            if round < self.config.max_scroll_rounds && !stop.is_stopped() {
                self.events.on_scroll(round);
                scroll_page_down(&self.desktop, &self.config).await?;
            }
        }

        info!(
            completed = summary.completed,
            failures = summary.failures,
            "certificate run finished"
        );
        self.events.on_log(&format!(
            "done: {} certificates downloaded, {} duplicates, {} failed",
            summary.completed, summary.duplicates, summary.failures
        ));
        self.events.on_progress(summary.completed, total);
        Ok(summary)
    }

    async fn run_certificate(
        &self,
        locator: &ScreenLocator<'_>,
        icon: Match,
        stop: &StopToken,
    ) -> RowOutcome {
        match self.try_certificate(locator, icon, stop).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(%err, "certificate row aborted");
                self.events.on_log(&format!("certificate failed: {err}"));
                if let Err(err) = close_modals(&self.desktop, stop).await {
                    warn!(%err, "failed to close modals after certificate failure");
                }
                RowOutcome::Failed
            }
        }
    }

    async fn try_certificate(
        &self,
        locator: &ScreenLocator<'_>,
        icon: Match,
        stop: &StopToken,
    ) -> Result<RowOutcome, AutomationError> {
        // Hovering the row's left side surfaces its play overlay.
        self.desktop.move_mouse(self.config.hover_x, icon.y)?;
        sleep(secs(self.config.menu_wait_secs)).await;

        let play = locator.find(TemplateId::PlayButton).await?.ok_or_else(|| {
            AutomationError::TemplateNotFound("play button not visible".to_string())
        })?;
        self.desktop.click(play.x, play.y)?;
        // The player needs a moment to fully load the new track.
        sleep(secs(self.config.player_load_secs)).await;

        let menu = locator.find(TemplateId::OverflowMenu).await?.ok_or_else(|| {
            AutomationError::TemplateNotFound("overflow menu not visible".to_string())
        })?;
        self.desktop.click(menu.x, menu.y)?;
        sleep(secs(self.config.menu_wait_secs)).await;

        let entry = locator.find(TemplateId::CertMenuItem).await?.ok_or_else(|| {
            AutomationError::TemplateNotFound("certificate menu entry not visible".to_string())
        })?;
        self.desktop.click(entry.x, entry.y)?;
        sleep(secs(self.config.cert_modal_wait_secs)).await;

        let before = self.staging.snapshot(PDF_EXTENSIONS);
        let button = locator.find(TemplateId::CertDownload).await?.ok_or_else(|| {
            AutomationError::TemplateNotFound("certificate download button not visible".to_string())
        })?;
        self.desktop.click(button.x, button.y)?;

        let pdf = self
            .staging
            .wait_for_new(
                &before,
                PDF_EXTENSIONS,
                secs(self.config.pdf_timeout_secs),
                secs(self.config.staging_poll_secs),
                stop,
            )
            .await
            .ok_or_else(|| {
                AutomationError::Timeout(format!(
                    "certificate PDF never appeared within {}s",
                    self.config.pdf_timeout_secs
                ))
            })?;

        close_modals(&self.desktop, stop).await?;

        let pdf_name = pdf
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let Some(folder) = self.tracker.folder_for_certificate(&pdf_name) else {
            // A stale click can download the wrong track's certificate;
            // discard it rather than misfile it.
            warn!(pdf = %pdf_name, "no folder matches this certificate, discarding");
            self.events
                .on_log(&format!("no folder matches '{pdf_name}', discarded"));
            fs::remove_file(&pdf)?;
            return Ok(RowOutcome::Failed);
        };

        if self.tracker.has_certificate(&folder.path) {
            self.events.on_log(&format!(
                "'{}' already has a certificate",
                folder.folder_name()
            ));
            fs::remove_file(&pdf)?;
            return Ok(RowOutcome::Duplicate(folder.folder_name()));
        }

        self.staging.move_file_into(&pdf, &folder.path)?;
        self.events
            .on_log(&format!("certificate: {pdf_name} -> {}/", folder.folder_name()));
        Ok(RowOutcome::Ok(folder.folder_name()))
    }
}
