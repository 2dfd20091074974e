//! The scan/pagination loop for song downloads.
//!
//! Each round captures the screen, finds every visible action icon and
//! dispatches them top-to-bottom to the step engine, then scrolls for more.
//! Row identity is positional: the catalog is ordered top-to-bottom, the
//! page is scrolled to the very top before the first round, and a running
//! global row index advances once per dispatched icon.

use std::sync::Arc;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::catalog::CatalogSource;
use crate::config::{secs, OrchestratorConfig};
use crate::engine::DownloadStepEngine;
use crate::errors::AutomationError;
use crate::events::{EventSink, NullSink, RowOutcome, RunSummary, StopToken};
use crate::locate::ScreenLocator;
use crate::probe::{DurationProbe, FfprobeProbe};
use crate::project::ProjectTracker;
use crate::staging::StagingDir;
use crate::template::{Match, TemplateId, TemplateLibrary};
use crate::Desktop;

/// Rounds in a row that may come up empty before the loop gives up.
const MAX_EMPTY_ROUNDS: usize = 3;

/// Click the page center, then jump to the very top so the first icon on
/// screen is the first catalog row.
pub(crate) async fn scroll_page_to_top(desktop: &Desktop) -> Result<(), AutomationError> {
    let (w, h) = desktop.monitor_size();
    desktop.click(w / 2, h / 2)?;
    sleep(secs(0.3)).await;
    desktop.press_key("^{home}")?;
    sleep(secs(1.5)).await;
    Ok(())
}

/// Wheel-scroll the track list down one step and let the page settle.
pub(crate) async fn scroll_page_down(
    desktop: &Desktop,
    config: &OrchestratorConfig,
) -> Result<(), AutomationError> {
    let (w, h) = desktop.monitor_size();
    // The list lives in the left column; scroll over it, not the detail pane.
    desktop.scroll(-config.scroll_rows, (w as f32 * 0.15) as u32, h / 2)?;
    sleep(secs(config.scroll_settle_secs)).await;
    Ok(())
}

/// Icons above this Y were on screen before the scroll and were already
/// visited; the first round processes everything.
pub(crate) fn visited_band_cutoff(round: usize, monitor_height: u32, fraction: f32) -> u32 {
    if round == 0 {
        0
    } else {
        (monitor_height as f32 * fraction) as u32
    }
}

pub struct Orchestrator {
    desktop: Desktop,
    catalog_source: Arc<dyn CatalogSource>,
    config: OrchestratorConfig,
    templates: TemplateLibrary,
    tracker: ProjectTracker,
    staging: StagingDir,
    probe: Box<dyn DurationProbe>,
    events: Arc<dyn EventSink>,
}

impl Orchestrator {
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
            probe: Box::new(FfprobeProbe),
            events: Arc::new(NullSink),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_probe(mut self, probe: Box<dyn DurationProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Run until the catalog, the item cap, the scroll budget or the stop
    /// token ends the scan. Per-row failures never end the run; only
    /// systemic preconditions (missing templates, an empty first round) do.
    pub async fn run(&self, stop: &StopToken) -> Result<RunSummary, AutomationError> {
        self.templates.verify(TemplateId::SONG_SET)?;

        let catalog = self.catalog_source.catalog().await?;
        if catalog.is_empty() {
            return Err(AutomationError::ScrapeError(
                "catalog is empty, nothing to download".to_string(),
            ));
        }
        self.events
            .on_log(&format!("{} songs in catalog", catalog.len()));

        let mut folders = self.tracker.prepare(&catalog)?;

        let locator = ScreenLocator::new(&self.desktop, &self.templates, &self.config, stop);
        let engine = DownloadStepEngine::new(
            &self.desktop,
            ScreenLocator::new(&self.desktop, &self.templates, &self.config, stop),
            &self.tracker,
            &self.staging,
            self.probe.as_ref(),
            &self.config,
            self.events.as_ref(),
            stop,
        );

        let mut summary = RunSummary::default();
        let mut row_index = 0usize;
        let mut empty_rounds = 0usize;

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

            if icons.is_empty() && round == 0 {
                return Err(AutomationError::TemplateNotFound(
                    "no action icons visible on the first scan round".to_string(),
                ));
            }

            let cutoff = visited_band_cutoff(
                round,
                self.desktop.monitor_size().1,
                self.config.top_band_fraction,
            );
            let eligible: Vec<Match> = icons.into_iter().filter(|m| m.y > cutoff).collect();

            if eligible.is_empty() {
                empty_rounds += 1;
                if empty_rounds >= MAX_EMPTY_ROUNDS {
                    info!("no new icons for {MAX_EMPTY_ROUNDS} rounds, stopping");
                    break;
                }
            } else {
                empty_rounds = 0;
            }

            for icon in eligible {
                if stop.is_stopped() {
                    break 'rounds;
                }
                if row_index >= self.config.max_items {
                    info!(max_items = self.config.max_items, "item cap reached");
                    break 'rounds;
                }
                let Some(item) = catalog.get(row_index) else {
                    break 'rounds;
                };
                let row_no = row_index + 1;
                row_index += 1;

                // A folder that already has files is done for good; never
                // re-click its row.
                if let Some(folder) = folders.get_mut(row_no - 1) {
                    folder.refresh();
                    if folder.has_files {
                        summary.record(&RowOutcome::Duplicate(folder.folder_name()));
                        self.events
                            .on_row_duplicate(row_no, &item.name, &item.duration);
                        continue;
                    }
                }

                self.events.on_row_start(row_no, icon.x, icon.y);
                let outcome = engine.run_row(item, icon).await;
                match &outcome {
                    RowOutcome::Ok(folder) => self.events.on_row_complete(row_no, folder),
                    RowOutcome::Duplicate(_) => {
                        self.events
                            .on_row_duplicate(row_no, &item.name, &item.duration)
                    }
                    RowOutcome::Failed => self.events.on_row_failed(row_no),
                }
                summary.record(&outcome);
                self.events.on_progress(summary.completed, catalog.len());

                if !stop.is_stopped() {
                    sleep(secs(self.config.between_rows_secs)).await;
                }
            }

            if row_index >= catalog.len() {
                info!("all catalog rows visited");
                break;
            }
            if round < self.config.max_scroll_rounds && !stop.is_stopped() {
                self.events.on_scroll(round);
                scroll_page_down(&self.desktop, &self.config).await?;
            }
        }

        if summary.failures > 0 {
            warn!(failures = summary.failures, "run finished with failures");
        }
        self.events.on_log(&format!(
            "done: {} downloaded, {} duplicates, {} failed ({} rows visited)",
            summary.completed, summary.duplicates, summary.failures, summary.processed
        ));
        Ok(summary)
    }
}
