//! The per-row download state machine.
//!
//! For one catalog row the engine walks a strict forward sequence: open the
//! row's download modal, click the MP3 row and wait for the audio file,
//! decide duplicate-or-not from the file's probed duration, then best-effort
//! RAW and LRC, then VIDEO last: clicking VIDEO closes both modals on its
//! own, so any format sequenced after it would operate on a closed UI.
//! Every wait is bounded; a row always terminates in exactly one of
//! Ok/Duplicate/Failed.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::catalog::CatalogItem;
use crate::config::{secs, OrchestratorConfig};
use crate::errors::AutomationError;
use crate::events::{EventSink, RowOutcome, StopToken};
use crate::locate::ScreenLocator;
use crate::probe::DurationProbe;
use crate::project::{self, ProjectTracker};
use crate::staging::{StagingDir, AUDIO_EXTENSIONS, DOWNLOAD_EXTENSIONS, VIDEO_EXTENSIONS};
use crate::template::{Match, TemplateId};
use crate::Desktop;

/// Matches this close to the scan-time icon position count as the same icon.
const ICON_DRIFT_PX: u32 = 20;

const INSTRUMENTAL_MARKER: &str = "[00:00.00] This is an instrumental\n";

/// Escape out of whatever modals are open. The pointer is parked at a
/// neutral position first so the key presses don't land on a hover state or
/// trip a platform fail-safe corner.
pub(crate) async fn close_modals(desktop: &Desktop, stop: &StopToken) -> Result<(), AutomationError> {
    desktop.move_to_neutral()?;
    for _ in 0..3 {
        desktop.press_key("{esc}")?;
        if !stop.is_stopped() {
            sleep(secs(0.5)).await;
        }
    }
    Ok(())
}

pub struct DownloadStepEngine<'a> {
    desktop: &'a Desktop,
    locator: ScreenLocator<'a>,
    tracker: &'a ProjectTracker,
    staging: &'a StagingDir,
    probe: &'a dyn DurationProbe,
    config: &'a OrchestratorConfig,
    events: &'a dyn EventSink,
    stop: &'a StopToken,
}

impl<'a> DownloadStepEngine<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        desktop: &'a Desktop,
        locator: ScreenLocator<'a>,
        tracker: &'a ProjectTracker,
        staging: &'a StagingDir,
        probe: &'a dyn DurationProbe,
        config: &'a OrchestratorConfig,
        events: &'a dyn EventSink,
        stop: &'a StopToken,
    ) -> Self {
        Self {
            desktop,
            locator,
            tracker,
            staging,
            probe,
            config,
            events,
            stop,
        }
    }

    /// Run the whole sequence for `item`, whose action icon the scan loop
    /// saw at `icon`. Never propagates an error: per-row failures become
    /// [`RowOutcome::Failed`] and the scan loop moves on.
    pub async fn run_row(&self, item: &CatalogItem, icon: Match) -> RowOutcome {
        match self.try_row(item, icon).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(song = %item.name, %err, "row aborted");
                self.events.on_log(&format!("row '{}' failed: {err}", item.name));
                if let Err(err) = self.close_modals().await {
                    warn!(%err, "failed to close modals after row failure");
                }
                RowOutcome::Failed
            }
        }
    }

    async fn try_row(
        &self,
        item: &CatalogItem,
        icon: Match,
    ) -> Result<RowOutcome, AutomationError> {
        let before = self.staging.snapshot(DOWNLOAD_EXTENSIONS);

        // The icon was located one settle-delay ago; make sure the row has
        // not scrolled away before committing the click.
        let still_there = self
            .locator
            .find_all_once(TemplateId::DownloadIcon)
            .await?
            .iter()
            .any(|m| m.x.abs_diff(icon.x) <= ICON_DRIFT_PX && m.y.abs_diff(icon.y) <= ICON_DRIFT_PX);
        if !still_there {
            return Err(AutomationError::TemplateNotFound(
                "action icon vanished before it could be clicked".to_string(),
            ));
        }

        self.desktop.click(icon.x, icon.y)?;
        self.sleep_checked(self.config.modal_wait_secs).await;

        let (mp3_x, mp3_y) = self
            .locator
            .find_row_button(TemplateId::ModalMp3)
            .await?
            .ok_or_else(|| {
                AutomationError::TemplateNotFound(
                    "MP3 row not visible after opening the download modal".to_string(),
                )
            })?;
        self.desktop.click(mp3_x, mp3_y)?;

        let audio = self
            .staging
            .wait_for_new(
                &before,
                AUDIO_EXTENSIONS,
                secs(self.config.audio_timeout_secs),
                secs(self.config.staging_poll_secs),
                self.stop,
            )
            .await
            .ok_or_else(|| {
                AutomationError::Timeout(format!(
                    "no audio file appeared within {}s",
                    self.config.audio_timeout_secs
                ))
            })?;

        // Only the downloaded file knows the true duration, so the duplicate
        // decision can only happen here, after the cheapest format landed.
        let probed = match self.probe.duration(&audio).await {
            Ok(s) => Some(s),
            Err(err) => {
                warn!(file = %audio.display(), %err, "duration probe failed");
                None
            }
        };
        if let Some(probed_secs) = probed {
            if self.tracker.is_already_downloaded(
                &item.name,
                probed_secs,
                self.config.duration_tolerance_secs,
            ) {
                let folder = self
                    .tracker
                    .find_matching_folder(
                        &item.name,
                        probed_secs,
                        self.config.duration_tolerance_secs,
                    )
                    .map(|f| f.folder_name())
                    .unwrap_or_else(|| project::sanitize(&item.name));
                debug!(song = %item.name, probed_secs, "duplicate detected after MP3");
                fs::remove_file(&audio)?;
                self.close_modals().await?;
                return Ok(RowOutcome::Duplicate(folder));
            }
        }

        let duration_secs = probed
            .or_else(|| project::display_seconds(&item.duration))
            .unwrap_or(0.0);
        let dest = self
            .tracker
            .find_matching_folder(&item.name, duration_secs, self.config.duration_tolerance_secs)
            .ok_or_else(|| {
                AutomationError::InvalidArgument(format!(
                    "no project folder prepared for '{}'",
                    item.name
                ))
            })?;

        self.download_raw().await?;
        self.download_lrc(&dest.path, item).await?;
        self.download_video(&before).await?;

        self.staging
            .wait_until_settled(
                secs(self.config.settle_timeout_secs),
                secs(self.config.staging_poll_secs),
                self.stop,
            )
            .await;
        let moved = self
            .staging
            .move_new_into(&before, DOWNLOAD_EXTENSIONS, &dest.path)?;
        debug!(song = %item.name, files = moved.len(), folder = %dest.path.display(), "row finalized");
        Ok(RowOutcome::Ok(dest.folder_name()))
    }

    /// RAW is best-effort: a missing row is logged and skipped, not fatal.
    async fn download_raw(&self) -> Result<(), AutomationError> {
        match self.locator.find_row_button(TemplateId::ModalRaw).await? {
            Some((x, y)) => {
                self.desktop.click(x, y)?;
                self.sleep_checked(self.config.download_wait_secs).await;
            }
            None => self.events.on_log("RAW row not visible, skipped"),
        }
        Ok(())
    }

    /// LRC is best-effort too, with one twist: a greyed-out row means the
    /// track is instrumental, and gets a placeholder marker file instead of
    /// a retry storm.
    async fn download_lrc(&self, dest: &Path, item: &CatalogItem) -> Result<(), AutomationError> {
        if let Some((x, y)) = self.locator.find_row_button(TemplateId::ModalLrc).await? {
            self.desktop.click(x, y)?;
            self.sleep_checked(self.config.download_wait_secs).await;
        } else if self
            .locator
            .find_once(TemplateId::ModalLrcDisabled)
            .await?
            .is_some()
        {
            let path = dest.join(format!("{}.lrc", project::sanitize(&item.name)));
            fs::write(&path, INSTRUMENTAL_MARKER)?;
            self.events
                .on_log(&format!("'{}' is instrumental, placeholder LRC written", item.name));
        } else {
            self.events.on_log("LRC row not visible, skipped");
        }
        Ok(())
    }

    /// VIDEO opens a secondary lyric-video modal with its own download
    /// button. A missing row or a never-stabilizing file downgrades to a
    /// warning; the formats already secured still count.
    async fn download_video(&self, before: &HashSet<PathBuf>) -> Result<(), AutomationError> {
        let Some((x, y)) = self.locator.find_row_button(TemplateId::ModalVideo).await? else {
            self.events.on_log("VIDEO row not visible, skipped");
            self.close_modals().await?;
            return Ok(());
        };
        self.desktop.click(x, y)?;
        self.sleep_checked(self.config.lyric_modal_wait_secs).await;

        let Some(button) = self.locator.find(TemplateId::LyricVideoDownload).await? else {
            warn!("lyric video modal did not open");
            self.close_modals().await?;
            return Ok(());
        };
        self.desktop.click(button.x, button.y)?;

        let appeared = self
            .staging
            .wait_for_new(
                before,
                VIDEO_EXTENSIONS,
                secs(self.config.video_timeout_secs),
                secs(self.config.video_poll_secs),
                self.stop,
            )
            .await;
        match appeared {
            Some(video) => {
                let stable = self
                    .staging
                    .wait_for_stable(
                        &video,
                        secs(self.config.video_timeout_secs),
                        secs(self.config.video_poll_secs),
                        2,
                        self.stop,
                    )
                    .await;
                if !stable {
                    warn!(file = %video.display(), "video never stabilized, keeping partial result");
                }
            }
            None => warn!("video file never appeared, keeping partial result"),
        }
        Ok(())
    }

    async fn close_modals(&self) -> Result<(), AutomationError> {
        close_modals(self.desktop, self.stop).await
    }

    async fn sleep_checked(&self, seconds: f64) {
        if self.stop.is_stopped() {
            return;
        }
        sleep(secs(seconds)).await;
    }
}
