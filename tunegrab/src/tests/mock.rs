//! Scripted test doubles.
//!
//! The mock engine serves an in-memory screen composed from the same tiles
//! that are written to disk as template bitmaps, so the real matcher runs
//! against it end-to-end. Click hooks let a test swap scenes and drop files
//! into the staging directory the way the real app would.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use image::{DynamicImage, GrayImage, Luma};

use crate::catalog::{CatalogItem, CatalogSource};
use crate::config::OrchestratorConfig;
use crate::errors::AutomationError;
use crate::platforms::DesktopEngine;
use crate::probe::DurationProbe;
use crate::template::TemplateId;
use crate::types::{MonitorInfo, ScreenshotResult};

/// Deterministic high-contrast noise tile. The full avalanche mix matters:
/// seeds must produce tiles that correlate with nothing, including shifted
/// or offset copies of each other, or the matcher would cross-match them.
pub fn tile(seed: u8, w: u32, h: u32) -> GrayImage {
    GrayImage::from_fn(w, h, |x, y| {
        let mut v = x
            .wrapping_mul(0x9E37_79B1)
            .wrapping_add(y.wrapping_mul(0x85EB_CA77))
            .wrapping_add((seed as u32).wrapping_mul(0xC2B2_AE3D));
        v = (v ^ (v >> 15)).wrapping_mul(0x2C1B_3C6D);
        v = (v ^ (v >> 13)).wrapping_mul(0x297A_2D39);
        v ^= v >> 16;
        Luma([v as u8])
    })
}

/// Uniform background; flat windows score zero in the matcher.
pub fn blank(w: u32, h: u32) -> GrayImage {
    GrayImage::from_pixel(w, h, Luma([240]))
}

/// Stamp `tile` onto `screen` with its top-left corner at `(x, y)`.
pub fn paint(screen: &mut GrayImage, tile: &GrayImage, x: u32, y: u32) {
    for ty in 0..tile.height() {
        for tx in 0..tile.width() {
            screen.put_pixel(x + tx, y + ty, *tile.get_pixel(tx, ty));
        }
    }
}

pub fn write_template(dir: &Path, id: TemplateId, img: &GrayImage) {
    img.save(dir.join(id.file_name())).unwrap();
}

pub fn item(name: &str, duration: &str, page_order: usize) -> CatalogItem {
    CatalogItem {
        name: name.to_string(),
        duration: duration.to_string(),
        page_order,
    }
}

/// Config with near-zero delays so scenario tests finish quickly.
pub fn fast_config(templates: &Path, library: &Path, staging: &Path) -> OrchestratorConfig {
    OrchestratorConfig {
        templates_dir: templates.to_path_buf(),
        library_root: library.to_path_buf(),
        staging_dir: staging.to_path_buf(),
        row_button_offset_x: 60,
        template_retries: 2,
        template_retry_delay_secs: 0.01,
        modal_wait_secs: 0.01,
        download_wait_secs: 0.01,
        between_rows_secs: 0.01,
        lyric_modal_wait_secs: 0.01,
        player_load_secs: 0.01,
        menu_wait_secs: 0.01,
        cert_modal_wait_secs: 0.01,
        scroll_settle_secs: 0.01,
        staging_poll_secs: 0.02,
        audio_timeout_secs: 3.0,
        video_timeout_secs: 2.0,
        video_poll_secs: 0.02,
        pdf_timeout_secs: 2.0,
        settle_timeout_secs: 1.0,
        ..OrchestratorConfig::default()
    }
}

pub const SCREEN_W: u32 = 400;
pub const SCREEN_H: u32 = 300;

// Tile centers the scripted app reacts to. Tiles are 24x16; the modal's row
// action buttons sit 60px right of their icons (see `fast_config`).
pub const ICON: (i32, i32) = (112, 88);
pub const MP3_BTN: (i32, i32) = (122, 128);
pub const RAW_BTN: (i32, i32) = (122, 168);
pub const VIDEO_BTN: (i32, i32) = (122, 208);
pub const LRC_BTN: (i32, i32) = (122, 248);
pub const LYRIC_BTN: (i32, i32) = (162, 108);
pub const PLAY_BTN: (i32, i32) = (212, 88);
pub const MENU_BTN: (i32, i32) = (262, 68);
pub const CERT_ITEM: (i32, i32) = (262, 128);
pub const CERT_BTN: (i32, i32) = (192, 208);

/// One distinct tile per template, shared by the bitmaps on disk and the
/// scenes they are matched against.
pub fn template_tile(id: TemplateId) -> GrayImage {
    let seed = match id {
        TemplateId::DownloadIcon => 1,
        TemplateId::ModalMp3 => 2,
        TemplateId::ModalRaw => 3,
        TemplateId::ModalLrc => 4,
        TemplateId::ModalLrcDisabled => 5,
        TemplateId::ModalVideo => 6,
        TemplateId::LyricVideoDownload => 7,
        TemplateId::PlayButton => 8,
        TemplateId::OverflowMenu => 9,
        TemplateId::CertMenuItem => 10,
        TemplateId::CertDownload => 11,
    };
    tile(seed, 24, 16)
}

pub fn write_templates(dir: &Path, ids: &[TemplateId]) {
    for id in ids {
        write_template(dir, *id, &template_tile(*id));
    }
}

/// Track list with one action icon per given top-left Y, all at x=100.
pub fn scene_with_icons(ys: &[u32]) -> GrayImage {
    let mut screen = blank(SCREEN_W, SCREEN_H);
    for y in ys {
        paint(&mut screen, &template_tile(TemplateId::DownloadIcon), 100, *y);
    }
    screen
}

/// The download modal: format rows at fixed positions, optionally without
/// the MP3 row, optionally with the greyed-out LRC variant.
pub fn modal_scene(with_mp3: bool, lrc_disabled: bool) -> GrayImage {
    let mut screen = blank(SCREEN_W, SCREEN_H);
    if with_mp3 {
        paint(&mut screen, &template_tile(TemplateId::ModalMp3), 50, 120);
    }
    paint(&mut screen, &template_tile(TemplateId::ModalRaw), 50, 160);
    paint(&mut screen, &template_tile(TemplateId::ModalVideo), 50, 200);
    let lrc = if lrc_disabled {
        TemplateId::ModalLrcDisabled
    } else {
        TemplateId::ModalLrc
    };
    paint(&mut screen, &template_tile(lrc), 50, 240);
    screen
}

pub fn lyric_scene() -> GrayImage {
    let mut screen = blank(SCREEN_W, SCREEN_H);
    paint(&mut screen, &template_tile(TemplateId::LyricVideoDownload), 150, 100);
    screen
}

type ClickHook = Box<dyn FnMut(&MockEngine, i32, i32) + Send>;

pub struct MockEngine {
    monitor: MonitorInfo,
    screen: Mutex<GrayImage>,
    pub clicks: Mutex<Vec<(i32, i32)>>,
    pub moves: Mutex<Vec<(i32, i32)>>,
    pub scrolls: Mutex<Vec<(i32, i32, i32)>>,
    pub keys: Mutex<Vec<String>>,
    on_click: Mutex<Option<ClickHook>>,
}

impl MockEngine {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            monitor: MonitorInfo {
                index: 0,
                name: "mock".to_string(),
                x: 0,
                y: 0,
                width,
                height,
                is_primary: true,
            },
            screen: Mutex::new(blank(width, height)),
            clicks: Mutex::new(Vec::new()),
            moves: Mutex::new(Vec::new()),
            scrolls: Mutex::new(Vec::new()),
            keys: Mutex::new(Vec::new()),
            on_click: Mutex::new(None),
        }
    }

    pub fn set_screen(&self, img: GrayImage) {
        *self.screen.lock().unwrap() = img;
    }

    pub fn set_on_click<F>(&self, hook: F)
    where
        F: FnMut(&MockEngine, i32, i32) + Send + 'static,
    {
        *self.on_click.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn clicks(&self) -> Vec<(i32, i32)> {
        self.clicks.lock().unwrap().clone()
    }

    pub fn moves(&self) -> Vec<(i32, i32)> {
        self.moves.lock().unwrap().clone()
    }

    pub fn scrolls(&self) -> Vec<(i32, i32, i32)> {
        self.scrolls.lock().unwrap().clone()
    }

    pub fn key_presses(&self) -> Vec<String> {
        self.keys.lock().unwrap().clone()
    }
}

/// True when a recorded position is within a few pixels of a target.
pub fn near(pos: (i32, i32), x: i32, y: i32) -> bool {
    (pos.0 - x).abs() <= 3 && (pos.1 - y).abs() <= 3
}

#[async_trait]
impl DesktopEngine for MockEngine {
    fn list_monitors(&self) -> Result<Vec<MonitorInfo>, AutomationError> {
        Ok(vec![self.monitor.clone()])
    }

    async fn capture_monitor(&self, _index: usize) -> Result<ScreenshotResult, AutomationError> {
        let gray = self.screen.lock().unwrap().clone();
        let rgba = DynamicImage::ImageLuma8(gray).to_rgba8();
        Ok(ScreenshotResult {
            width: rgba.width(),
            height: rgba.height(),
            image_data: rgba.into_raw(),
        })
    }

    fn click(&self, x: i32, y: i32) -> Result<(), AutomationError> {
        self.clicks.lock().unwrap().push((x, y));
        let mut hook = self.on_click.lock().unwrap();
        if let Some(hook) = hook.as_mut() {
            hook(self, x, y);
        }
        Ok(())
    }

    fn move_mouse(&self, x: i32, y: i32) -> Result<(), AutomationError> {
        self.moves.lock().unwrap().push((x, y));
        Ok(())
    }

    fn scroll_wheel(&self, delta: i32, x: i32, y: i32) -> Result<(), AutomationError> {
        self.scrolls.lock().unwrap().push((delta, x, y));
        Ok(())
    }

    fn press_key(&self, keys: &str) -> Result<(), AutomationError> {
        self.keys.lock().unwrap().push(keys.to_string());
        Ok(())
    }
}

/// Script the whole song flow: the icon click opens the modal, format
/// buttons drop files into staging, VIDEO opens the lyric modal whose
/// button drops the mp4 and closes everything.
pub fn wire_happy_flow(engine: &MockEngine, staging: PathBuf, song: &str, lrc_disabled: bool) {
    let name = song.to_string();
    engine.set_on_click(move |eng, x, y| {
        if near((x, y), ICON.0, ICON.1) {
            eng.set_screen(modal_scene(true, lrc_disabled));
        } else if near((x, y), MP3_BTN.0, MP3_BTN.1) {
            fs::write(staging.join(format!("{name}.mp3")), "audio").unwrap();
        } else if near((x, y), RAW_BTN.0, RAW_BTN.1) {
            fs::write(staging.join(format!("{name}.flac")), "audio").unwrap();
        } else if near((x, y), LRC_BTN.0, LRC_BTN.1) {
            fs::write(staging.join(format!("{name}.lrc")), "lyrics").unwrap();
        } else if near((x, y), VIDEO_BTN.0, VIDEO_BTN.1) {
            eng.set_screen(lyric_scene());
        } else if near((x, y), LYRIC_BTN.0, LYRIC_BTN.1) {
            fs::write(staging.join(format!("{name}.mp4")), "video").unwrap();
            eng.set_screen(blank(SCREEN_W, SCREEN_H));
        }
    });
}

/// Script the certificate flow: play opens the player, the overflow menu
/// leads to the certificate modal, and its download button drops the PDF.
pub fn wire_cert_flow(engine: &MockEngine, staging: PathBuf, pdf_name: &str) {
    let pdf_name = pdf_name.to_string();
    engine.set_on_click(move |eng, x, y| {
        let stamp = |id: TemplateId, tx: u32, ty: u32| {
            let mut screen = blank(SCREEN_W, SCREEN_H);
            paint(&mut screen, &template_tile(id), tx, ty);
            screen
        };
        if near((x, y), PLAY_BTN.0, PLAY_BTN.1) {
            eng.set_screen(stamp(TemplateId::OverflowMenu, 250, 60));
        } else if near((x, y), MENU_BTN.0, MENU_BTN.1) {
            eng.set_screen(stamp(TemplateId::CertMenuItem, 250, 120));
        } else if near((x, y), CERT_ITEM.0, CERT_ITEM.1) {
            eng.set_screen(stamp(TemplateId::CertDownload, 180, 200));
        } else if near((x, y), CERT_BTN.0, CERT_BTN.1) {
            fs::write(staging.join(&pdf_name), "pdf").unwrap();
            eng.set_screen(blank(SCREEN_W, SCREEN_H));
        }
    });
}

pub struct MockCatalog(pub Vec<CatalogItem>);

#[async_trait]
impl CatalogSource for MockCatalog {
    async fn catalog(&self) -> Result<Vec<CatalogItem>, AutomationError> {
        Ok(self.0.clone())
    }
}

/// Probe that always reports the same duration.
pub struct FixedProbe(pub f64);

#[async_trait]
impl DurationProbe for FixedProbe {
    async fn duration(&self, _path: &Path) -> Result<f64, AutomationError> {
        Ok(self.0)
    }
}

/// Probe that always errors, like a missing ffprobe binary.
pub struct FailingProbe;

#[async_trait]
impl DurationProbe for FailingProbe {
    async fn duration(&self, _path: &Path) -> Result<f64, AutomationError> {
        Err(AutomationError::PlatformError(
            "probe unavailable".to_string(),
        ))
    }
}
