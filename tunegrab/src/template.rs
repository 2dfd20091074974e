//! Locating UI controls inside screenshots by template matching.
//!
//! Each known control has a small grayscale reference bitmap on disk. A
//! control is located by sliding the reference over the screenshot and
//! scoring each position with zero-mean normalized cross-correlation; only
//! scores at or above the caller's threshold count as a match. A score below
//! threshold is an absence, not an error; callers retry with a fresh
//! screenshot.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use image::GrayImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::errors::AutomationError;

/// Two matches closer than this (on both axes) are considered the same
/// control; only the higher-confidence one survives.
const SUPPRESS_RADIUS_PX: u32 = 20;

/// Every reference bitmap the workflows can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateId {
    /// Per-row action icon that opens the download modal.
    DownloadIcon,
    ModalMp3,
    ModalRaw,
    ModalLrc,
    /// Greyed-out LRC row shown for instrumental tracks.
    ModalLrcDisabled,
    ModalVideo,
    /// Download button inside the secondary lyric-video modal.
    LyricVideoDownload,
    PlayButton,
    OverflowMenu,
    CertMenuItem,
    CertDownload,
}

impl TemplateId {
    /// Templates a song-download run needs on disk before it starts.
    pub const SONG_SET: &'static [TemplateId] = &[
        TemplateId::DownloadIcon,
        TemplateId::ModalMp3,
        TemplateId::ModalRaw,
        TemplateId::ModalLrc,
        TemplateId::ModalLrcDisabled,
        TemplateId::ModalVideo,
        TemplateId::LyricVideoDownload,
    ];

    /// Templates a certificate run needs on disk before it starts.
    pub const CERT_SET: &'static [TemplateId] = &[
        TemplateId::DownloadIcon,
        TemplateId::PlayButton,
        TemplateId::OverflowMenu,
        TemplateId::CertMenuItem,
        TemplateId::CertDownload,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            TemplateId::DownloadIcon => "download_icon.png",
            TemplateId::ModalMp3 => "modal_mp3.png",
            TemplateId::ModalRaw => "modal_raw.png",
            TemplateId::ModalLrc => "modal_lrc.png",
            TemplateId::ModalLrcDisabled => "modal_lrc_disabled.png",
            TemplateId::ModalVideo => "modal_video.png",
            TemplateId::LyricVideoDownload => "lyric_video_download.png",
            TemplateId::PlayButton => "play_button.png",
            TemplateId::OverflowMenu => "overflow_menu.png",
            TemplateId::CertMenuItem => "cert_menu_item.png",
            TemplateId::CertDownload => "cert_download.png",
        }
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// One located control, in screenshot-pixel space. `x`/`y` are the match
/// center. Ephemeral; recomputed on every poll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    pub x: u32,
    pub y: u32,
    pub confidence: f32,
}

/// Loads and caches reference bitmaps and runs the matcher over screenshots.
///
/// The cache is per-instance; each run constructs its own library so runs
/// never share mutable state.
pub struct TemplateLibrary {
    dir: PathBuf,
    cache: Mutex<HashMap<TemplateId, Arc<GrayImage>>>,
}

impl TemplateLibrary {
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Preflight: check that every required template exists on disk. Fails
    /// with the full list of missing file names.
    pub fn verify(&self, required: &[TemplateId]) -> Result<(), AutomationError> {
        let missing: Vec<&str> = required
            .iter()
            .filter(|id| !self.dir.join(id.file_name()).is_file())
            .map(|id| id.file_name())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(AutomationError::MissingAssets(format!(
                "{} (looked in {})",
                missing.join(", "),
                self.dir.display()
            )))
        }
    }

    fn load(&self, id: TemplateId) -> Result<Arc<GrayImage>, AutomationError> {
        let mut cache = self.cache.lock().unwrap();
        if let Some(tmpl) = cache.get(&id) {
            return Ok(tmpl.clone());
        }
        let path = self.dir.join(id.file_name());
        if !path.is_file() {
            return Err(AutomationError::MissingAssets(path.display().to_string()));
        }
        let tmpl = Arc::new(image::open(&path)?.to_luma8());
        debug!(template = %id, width = tmpl.width(), height = tmpl.height(), "template loaded");
        cache.insert(id, tmpl.clone());
        Ok(tmpl)
    }

    /// Best match for `id`, or `None` if nothing scores at `threshold`.
    pub fn find(
        &self,
        screenshot: &GrayImage,
        id: TemplateId,
        threshold: f32,
    ) -> Result<Option<Match>, AutomationError> {
        let tmpl = self.load(id)?;
        let grid = ScoreGrid::compute(screenshot, &tmpl);
        let best = grid.best();
        trace!(template = %id, best = best.map(|m| m.confidence), "template search");
        Ok(best.filter(|m| m.confidence >= threshold))
    }

    /// All matches for `id` scoring at `threshold`, best confidence first,
    /// with near-duplicates suppressed.
    pub fn find_all(
        &self,
        screenshot: &GrayImage,
        id: TemplateId,
        threshold: f32,
    ) -> Result<Vec<Match>, AutomationError> {
        let tmpl = self.load(id)?;
        let grid = ScoreGrid::compute(screenshot, &tmpl);
        let mut matches = grid.above(threshold);
        matches.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let mut filtered: Vec<Match> = Vec::new();
        for m in matches {
            let dup = filtered.iter().any(|f| {
                m.x.abs_diff(f.x) <= SUPPRESS_RADIUS_PX && m.y.abs_diff(f.y) <= SUPPRESS_RADIUS_PX
            });
            if !dup {
                filtered.push(m);
            }
        }
        Ok(filtered)
    }

    /// Locate a row by its format icon, then return the position of the
    /// row's action button, which always sits `button_offset_x` pixels to
    /// the right of the icon center. One row template covers both controls.
    pub fn find_button_in_row(
        &self,
        screenshot: &GrayImage,
        row: TemplateId,
        threshold: f32,
        button_offset_x: i32,
    ) -> Result<Option<(u32, u32)>, AutomationError> {
        Ok(self.find(screenshot, row, threshold)?.map(|m| {
            let x = (m.x as i32 + button_offset_x).max(0) as u32;
            (x, m.y)
        }))
    }
}

/// Normalized cross-correlation scores for every template placement.
struct ScoreGrid {
    cols: u32,
    scores: Vec<f32>,
    tmpl_w: u32,
    tmpl_h: u32,
}

impl ScoreGrid {
    fn compute(image: &GrayImage, tmpl: &GrayImage) -> Self {
        let (w, h) = image.dimensions();
        let (tw, th) = tmpl.dimensions();
        if tw == 0 || th == 0 || tw > w || th > h {
            return Self {
                cols: 0,
                scores: Vec::new(),
                tmpl_w: tw,
                tmpl_h: th,
            };
        }

        let n = (tw * th) as f64;
        let tmpl_px: Vec<f64> = tmpl.as_raw().iter().map(|&p| p as f64).collect();
        let tmpl_mean = tmpl_px.iter().sum::<f64>() / n;
        let tmpl_delta: Vec<f64> = tmpl_px.iter().map(|p| p - tmpl_mean).collect();
        let tmpl_norm = tmpl_delta.iter().map(|d| d * d).sum::<f64>().sqrt();

        let cols = w - tw + 1;
        let rows = h - th + 1;
        let mut scores = vec![0.0f32; (cols * rows) as usize];

        // A perfectly flat template has no structure to correlate against.
        if tmpl_norm <= f64::EPSILON {
            return Self {
                cols,
                scores,
                tmpl_w: tw,
                tmpl_h: th,
            };
        }

        // Integral images give each window's sum and sum-of-squares in O(1).
        let integral = Integral::of(image);

        let img = image.as_raw();
        let stride = w as usize;
        for v in 0..rows {
            for u in 0..cols {
                let sum = integral.window_sum(u, v, tw, th);
                let sq = integral.window_sq(u, v, tw, th);
                let denom = sq - sum * sum / n;
                if denom <= f64::EPSILON {
                    continue;
                }

                let mut num = 0.0f64;
                for y in 0..th {
                    let img_row = (v + y) as usize * stride + u as usize;
                    let tmpl_row = (y * tw) as usize;
                    for x in 0..tw as usize {
                        num += img[img_row + x] as f64 * tmpl_delta[tmpl_row + x];
                    }
                }

                let score = num / (denom.sqrt() * tmpl_norm);
                scores[(v * cols + u) as usize] = score.clamp(-1.0, 1.0) as f32;
            }
        }

        Self {
            cols,
            scores,
            tmpl_w: tw,
            tmpl_h: th,
        }
    }

    fn to_match(&self, idx: usize, confidence: f32) -> Match {
        let u = idx as u32 % self.cols;
        let v = idx as u32 / self.cols;
        Match {
            x: u + self.tmpl_w / 2,
            y: v + self.tmpl_h / 2,
            confidence,
        }
    }

    fn best(&self) -> Option<Match> {
        self.scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(idx, &score)| self.to_match(idx, score))
    }

    fn above(&self, threshold: f32) -> Vec<Match> {
        self.scores
            .iter()
            .enumerate()
            .filter(|(_, &s)| s >= threshold)
            .map(|(idx, &s)| self.to_match(idx, s))
            .collect()
    }
}

/// Summed-area tables over pixel values and squared pixel values.
struct Integral {
    w: usize,
    sum: Vec<f64>,
    sq: Vec<f64>,
}

impl Integral {
    fn of(image: &GrayImage) -> Self {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let stride = w + 1;
        let mut sum = vec![0.0f64; stride * (h + 1)];
        let mut sq = vec![0.0f64; stride * (h + 1)];
        let raw = image.as_raw();

        for y in 0..h {
            let mut row_sum = 0.0f64;
            let mut row_sq = 0.0f64;
            for x in 0..w {
                let p = raw[y * w + x] as f64;
                row_sum += p;
                row_sq += p * p;
                sum[(y + 1) * stride + x + 1] = sum[y * stride + x + 1] + row_sum;
                sq[(y + 1) * stride + x + 1] = sq[y * stride + x + 1] + row_sq;
            }
        }

        Self { w: stride, sum, sq }
    }

    fn rect(&self, table: &[f64], x: u32, y: u32, w: u32, h: u32) -> f64 {
        let (x0, y0) = (x as usize, y as usize);
        let (x1, y1) = (x0 + w as usize, y0 + h as usize);
        table[y1 * self.w + x1] + table[y0 * self.w + x0]
            - table[y0 * self.w + x1]
            - table[y1 * self.w + x0]
    }

    fn window_sum(&self, x: u32, y: u32, w: u32, h: u32) -> f64 {
        self.rect(&self.sum, x, y, w, h)
    }

    fn window_sq(&self, x: u32, y: u32, w: u32, h: u32) -> f64 {
        self.rect(&self.sq, x, y, w, h)
    }
}
