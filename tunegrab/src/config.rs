//! Run configuration.
//!
//! The scroll cutoff, duration tolerance and timing values are tuned against
//! the target application's scroll/render behavior; they live here as named,
//! overridable defaults rather than literals in the control flow.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::template::TemplateId;

/// Shorthand for the fractional-second fields below.
pub fn secs(s: f64) -> Duration {
    Duration::from_secs_f64(s.max(0.0))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Monitor to capture and drive (platform enumeration order).
    pub monitor: usize,
    /// Cap on catalog rows visited in one run.
    pub max_items: usize,
    pub max_scroll_rounds: usize,
    /// After the first round, icons in this top fraction of the monitor are
    /// treated as rows already visited before the scroll.
    pub top_band_fraction: f32,
    /// A probed duration within this many seconds of a folder's duration
    /// token counts as the same item.
    pub duration_tolerance_secs: f64,

    /// Match threshold used when `thresholds` has no entry for a template.
    pub default_threshold: f32,
    /// Per-template threshold overrides; icons vary in distinctiveness.
    pub thresholds: HashMap<TemplateId, f32>,
    /// The modal's action buttons sit this many pixels right of the row icon.
    pub row_button_offset_x: i32,
    /// X position used to hover a row (certificate flow), inside the track
    /// list's left column.
    pub hover_x: u32,
    /// Wheel rows per scroll step.
    pub scroll_rows: i32,

    pub template_retries: u32,
    pub template_retry_delay_secs: f64,
    pub modal_wait_secs: f64,
    pub download_wait_secs: f64,
    pub between_rows_secs: f64,
    pub lyric_modal_wait_secs: f64,
    pub player_load_secs: f64,
    pub menu_wait_secs: f64,
    pub cert_modal_wait_secs: f64,
    pub scroll_settle_secs: f64,

    pub staging_poll_secs: f64,
    pub audio_timeout_secs: f64,
    pub video_timeout_secs: f64,
    pub video_poll_secs: f64,
    pub pdf_timeout_secs: f64,
    pub settle_timeout_secs: f64,

    /// Destination root for finished project folders.
    pub library_root: PathBuf,
    /// Directory the browser drops downloads into.
    pub staging_dir: PathBuf,
    pub templates_dir: PathBuf,

    /// Chrome remote-debugging endpoint for the catalog scraper.
    pub cdp_url: String,
    /// Substring that identifies the target app's tab.
    pub page_host: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        let downloads = dirs::download_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            monitor: 0,
            max_items: 50,
            max_scroll_rounds: 15,
            top_band_fraction: 0.15,
            duration_tolerance_secs: 2.0,
            default_threshold: 0.7,
            thresholds: HashMap::new(),
            row_button_offset_x: 555,
            hover_x: 200,
            scroll_rows: 5,
            template_retries: 5,
            template_retry_delay_secs: 0.5,
            modal_wait_secs: 2.0,
            download_wait_secs: 2.0,
            between_rows_secs: 2.0,
            lyric_modal_wait_secs: 3.0,
            player_load_secs: 3.0,
            menu_wait_secs: 1.0,
            cert_modal_wait_secs: 1.5,
            scroll_settle_secs: 2.0,
            staging_poll_secs: 1.0,
            audio_timeout_secs: 30.0,
            video_timeout_secs: 90.0,
            video_poll_secs: 3.0,
            pdf_timeout_secs: 30.0,
            settle_timeout_secs: 60.0,
            library_root: downloads.join("tunee"),
            staging_dir: downloads,
            templates_dir: PathBuf::from("templates"),
            cdp_url: "http://127.0.0.1:9222".to_string(),
            page_host: "tunee".to_string(),
        }
    }
}

impl OrchestratorConfig {
    pub fn threshold_for(&self, id: TemplateId) -> f32 {
        self.thresholds
            .get(&id)
            .copied()
            .unwrap_or(self.default_threshold)
    }
}
