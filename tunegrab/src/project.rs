//! Project folders and duplicate bookkeeping.
//!
//! Every catalog item gets its folder created up front, so "is this item
//! already downloaded" is a local directory check instead of a live
//! re-scrape, and completion is detected purely by folder contents.
//!
//! Folder naming: `<NN> - <sanitized name> - <MMmSSs>`, where `NN` is the
//! 1-based catalog position.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::catalog::CatalogItem;
use crate::errors::AutomationError;

/// Extensions that count as downloaded song media.
pub const MEDIA_EXTENSIONS: &[&str] = &["mp3", "flac", "mp4", "lrc"];

/// Strip characters that are illegal in file paths, then trim.
pub fn sanitize(name: &str) -> String {
    const ILLEGAL: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
    name.chars()
        .map(|c| if ILLEGAL.contains(&c) { '_' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

/// `"03:45"` → `"03m45s"`; anything unparseable → `"00m00s"`.
pub fn duration_token(display: &str) -> String {
    match display.split_once(':') {
        Some((m, s)) if m.parse::<u32>().is_ok() && s.parse::<u32>().is_ok() => {
            format!("{m}m{s}s")
        }
        _ => "00m00s".to_string(),
    }
}

/// Seconds represented by a `"MM:SS"` display duration.
pub fn display_seconds(display: &str) -> Option<f64> {
    let (m, s) = display.split_once(':')?;
    let minutes: u32 = m.parse().ok()?;
    let seconds: u32 = s.parse().ok()?;
    Some((minutes * 60 + seconds) as f64)
}

/// Seconds represented by a `"MMmSSs"` folder token.
pub fn token_seconds(token: &str) -> Option<f64> {
    let rest = token.strip_suffix('s')?;
    let (m, s) = rest.split_once('m')?;
    let minutes: u32 = m.parse().ok()?;
    let seconds: u32 = s.parse().ok()?;
    Some((minutes * 60 + seconds) as f64)
}

/// True if the folder contains at least one media file.
pub fn has_media_files(path: &Path) -> bool {
    dir_has_extension(path, MEDIA_EXTENSIONS)
}

fn dir_has_extension(path: &Path, exts: &[&str]) -> bool {
    let Ok(entries) = fs::read_dir(path) else {
        return false;
    };
    entries.flatten().any(|e| {
        e.path()
            .extension()
            .and_then(|x| x.to_str())
            .map(|x| exts.contains(&x.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    })
}

/// One pre-created destination folder for a catalog item.
#[derive(Debug, Clone)]
pub struct ProjectFolder {
    /// 1-based catalog position.
    pub index: usize,
    pub name: String,
    pub duration_token: String,
    pub path: PathBuf,
    pub has_files: bool,
}

impl ProjectFolder {
    pub fn folder_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Re-evaluate `has_files` against the disk.
    pub fn refresh(&mut self) {
        self.has_files = has_media_files(&self.path);
    }
}

/// Parse `"NN - name - MMmSSs"`. The name itself may contain `" - "`, so the
/// index is split off the front and the token off the back.
fn parse_folder_name(entry: &str) -> Option<(usize, &str, &str)> {
    let (num, rest) = entry.split_once(" - ")?;
    let index: usize = num.trim().parse().ok()?;
    let (name, token) = rest.rsplit_once(" - ")?;
    token_seconds(token)?;
    Some((index, name, token))
}

/// Maps catalog items to destination folders under one library root.
pub struct ProjectTracker {
    root: PathBuf,
}

impl ProjectTracker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a folder for every catalog item, in order. Idempotent:
    /// existing folders and their contents are left alone.
    pub fn prepare(&self, catalog: &[CatalogItem]) -> Result<Vec<ProjectFolder>, AutomationError> {
        let mut folders = Vec::with_capacity(catalog.len());
        for (pos, item) in catalog.iter().enumerate() {
            let index = pos + 1;
            let name = sanitize(&item.name);
            let token = duration_token(&item.duration);
            let path = self.root.join(format!("{index:02} - {name} - {token}"));
            fs::create_dir_all(&path)?;
            let has_files = has_media_files(&path);
            folders.push(ProjectFolder {
                index,
                name,
                duration_token: token,
                path,
                has_files,
            });
        }
        debug!(count = folders.len(), root = %self.root.display(), "project folders prepared");
        Ok(folders)
    }

    /// All parseable folders under the root, in directory order.
    fn scan(&self) -> Vec<ProjectFolder> {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return Vec::new();
        };
        let mut folders: Vec<ProjectFolder> = entries
            .flatten()
            .filter(|e| e.path().is_dir())
            .filter_map(|e| {
                let file_name = e.file_name();
                let entry = file_name.to_str()?;
                let (index, name, token) = parse_folder_name(entry)?;
                Some(ProjectFolder {
                    index,
                    name: name.to_string(),
                    duration_token: token.to_string(),
                    path: e.path(),
                    has_files: has_media_files(&e.path()),
                })
            })
            .collect();
        folders.sort_by_key(|f| f.index);
        folders
    }

    fn matching(&self, name: &str, duration_secs: f64, tolerance: f64) -> Vec<ProjectFolder> {
        let wanted = sanitize(name);
        self.scan()
            .into_iter()
            .filter(|f| f.name == wanted)
            .filter(|f| {
                token_seconds(&f.duration_token)
                    .map(|t| (t - duration_secs).abs() <= tolerance)
                    .unwrap_or(false)
            })
            .collect()
    }

    /// True iff a matching folder exists and every matching folder already
    /// has files. A still-empty matching folder means this item is a
    /// not-yet-filled slot, not a duplicate.
    pub fn is_already_downloaded(&self, name: &str, duration_secs: f64, tolerance: f64) -> bool {
        let matching = self.matching(name, duration_secs, tolerance);
        !matching.is_empty() && matching.iter().all(|f| f.has_files)
    }

    /// Folder this item's files belong in: closest duration within
    /// tolerance; among ties, an empty folder beats a full one so repeated
    /// versions fill distinct slots.
    pub fn find_matching_folder(
        &self,
        name: &str,
        duration_secs: f64,
        tolerance: f64,
    ) -> Option<ProjectFolder> {
        let mut matching = self.matching(name, duration_secs, tolerance);
        matching.sort_by(|a, b| {
            let da = token_seconds(&a.duration_token)
                .map(|t| (t - duration_secs).abs())
                .unwrap_or(f64::MAX);
            let db = token_seconds(&b.duration_token)
                .map(|t| (t - duration_secs).abs())
                .unwrap_or(f64::MAX);
            da.total_cmp(&db).then(a.has_files.cmp(&b.has_files))
        });
        matching.into_iter().next()
    }

    /// Folders that have media but no certificate PDF yet, keyed by their
    /// 1-based catalog position.
    pub fn folders_needing_certificates(&self) -> BTreeMap<usize, PathBuf> {
        self.scan()
            .into_iter()
            .filter(|f| f.has_files && !dir_has_extension(&f.path, &["pdf"]))
            .map(|f| (f.index, f.path))
            .collect()
    }

    /// Match a downloaded certificate back to its folder by checking whether
    /// the folder's song name appears in the PDF's filename. PDF names carry
    /// no duration, so this is the only identity signal available. Prefers
    /// the longest name match, then folders without an existing PDF.
    pub fn folder_for_certificate(&self, pdf_file_name: &str) -> Option<ProjectFolder> {
        let pdf_lower = pdf_file_name.to_lowercase();
        let mut candidates: Vec<ProjectFolder> = self
            .scan()
            .into_iter()
            .filter(|f| !f.name.is_empty() && pdf_lower.contains(&f.name.to_lowercase()))
            .collect();
        candidates.sort_by(|a, b| {
            b.name
                .len()
                .cmp(&a.name.len())
                .then_with(|| dir_has_extension(&a.path, &["pdf"]).cmp(&dir_has_extension(&b.path, &["pdf"])))
        });
        candidates.into_iter().next()
    }

    /// True if the folder already holds a certificate.
    pub fn has_certificate(&self, folder: &Path) -> bool {
        dir_has_extension(folder, &["pdf"])
    }
}
