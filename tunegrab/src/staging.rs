//! The watched staging directory.
//!
//! The browser's download mechanism is opaque to this crate, so completion
//! is inferred by polling: directory listings are snapshotted and diffed,
//! a file counts as done once its size stops changing across consecutive
//! polls, and browser partial-download sentinels block finalization until
//! they disappear. Every wait checks the stop token before sleeping and
//! degrades to `None`/`false` on expiry.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::errors::AutomationError;
use crate::events::StopToken;

pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4"];
pub const PDF_EXTENSIONS: &[&str] = &["pdf"];
/// Everything a song row can drop into staging.
pub const DOWNLOAD_EXTENSIONS: &[&str] = &["mp3", "flac", "mp4", "lrc"];
/// In-progress download sentinels written by browsers.
const PARTIAL_EXTENSIONS: &[&str] = &["crdownload", "part", "download"];

fn has_extension(path: &Path, exts: &[&str]) -> bool {
    path.extension()
        .and_then(|x| x.to_str())
        .map(|x| exts.contains(&x.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[derive(Clone)]
pub struct StagingDir {
    dir: PathBuf,
}

impl StagingDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn list(&self, exts: &[&str]) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_file() && has_extension(p, exts))
            .collect()
    }

    /// Files currently present with one of the given extensions.
    pub fn snapshot(&self, exts: &[&str]) -> HashSet<PathBuf> {
        self.list(exts).into_iter().collect()
    }

    /// Files that appeared since `before` was taken.
    pub fn new_files(&self, before: &HashSet<PathBuf>, exts: &[&str]) -> Vec<PathBuf> {
        let mut new: Vec<PathBuf> = self
            .list(exts)
            .into_iter()
            .filter(|p| !before.contains(p))
            .collect();
        new.sort();
        new
    }

    /// True while any browser partial-download sentinel is present.
    pub fn has_partials(&self) -> bool {
        !self.list(PARTIAL_EXTENSIONS).is_empty()
    }

    /// Wait for a new file with one of `exts` to appear and hold a non-zero
    /// size across two consecutive polls. Returns `None` on timeout or stop.
    pub async fn wait_for_new(
        &self,
        before: &HashSet<PathBuf>,
        exts: &[&str],
        timeout: Duration,
        poll: Duration,
        stop: &StopToken,
    ) -> Option<PathBuf> {
        let deadline = Instant::now() + timeout;
        let mut last_seen: Option<(PathBuf, u64)> = None;
        while Instant::now() < deadline {
            if stop.is_stopped() {
                return None;
            }
            sleep(poll).await;
            let Some(path) = self.new_files(before, exts).into_iter().next() else {
                continue;
            };
            let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            match &last_seen {
                Some((seen, prev)) if *seen == path && *prev == size && size > 0 => {
                    debug!(file = %path.display(), size, "new download settled");
                    return Some(path);
                }
                _ => last_seen = Some((path, size)),
            }
        }
        None
    }

    /// Wait until `path` stops growing: same non-zero size across
    /// `stable_polls` consecutive polls. Returns `false` on timeout or stop.
    pub async fn wait_for_stable(
        &self,
        path: &Path,
        timeout: Duration,
        poll: Duration,
        stable_polls: u32,
        stop: &StopToken,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        let mut last_size = u64::MAX;
        let mut stable = 0u32;
        while Instant::now() < deadline {
            if stop.is_stopped() {
                return false;
            }
            sleep(poll).await;
            let size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
            if size > 0 && size == last_size {
                stable += 1;
                if stable >= stable_polls {
                    debug!(file = %path.display(), size, "file size stable");
                    return true;
                }
            } else {
                stable = 0;
                last_size = size;
            }
        }
        false
    }

    /// Wait for all in-flight downloads to finish (no partial sentinels).
    pub async fn wait_until_settled(&self, timeout: Duration, poll: Duration, stop: &StopToken) -> bool {
        let deadline = Instant::now() + timeout;
        while self.has_partials() {
            if stop.is_stopped() || Instant::now() >= deadline {
                return false;
            }
            sleep(poll).await;
        }
        true
    }

    /// Move (never copy) one file into `folder`, returning its new path.
    pub fn move_file_into(&self, src: &Path, folder: &Path) -> Result<PathBuf, AutomationError> {
        let file_name = src.file_name().ok_or_else(|| {
            AutomationError::InvalidArgument(format!("not a file: {}", src.display()))
        })?;
        let dst = folder.join(file_name);
        if dst.exists() {
            warn!(file = %dst.display(), "overwriting existing file");
            fs::remove_file(&dst)?;
        }
        // rename can cross a mount boundary when the library root lives on
        // another volume; fall back to copy+remove there.
        if fs::rename(src, &dst).is_err() {
            fs::copy(src, &dst)?;
            fs::remove_file(src)?;
        }
        debug!(file = %dst.display(), "moved into project folder");
        Ok(dst)
    }

    /// Move every file that appeared since `before` into `folder`. Returns
    /// the destination paths.
    pub fn move_new_into(
        &self,
        before: &HashSet<PathBuf>,
        exts: &[&str],
        folder: &Path,
    ) -> Result<Vec<PathBuf>, AutomationError> {
        let mut moved = Vec::new();
        for src in self.new_files(before, exts) {
            moved.push(self.move_file_into(&src, folder)?);
        }
        Ok(moved)
    }
}
