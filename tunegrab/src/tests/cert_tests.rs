use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use image::GrayImage;
use tempfile::TempDir;

use super::mock::{
    blank, fast_config, item, near, paint, template_tile, wire_cert_flow, write_templates,
    MockCatalog, MockEngine, SCREEN_H, SCREEN_W,
};
use crate::catalog::CatalogItem;
use crate::cert::CertOrchestrator;
use crate::config::OrchestratorConfig;
use crate::events::{RunSummary, StopToken};
use crate::project::ProjectTracker;
use crate::template::TemplateId;
use crate::Desktop;

struct Fixture {
    _tmp: TempDir,
    engine: Arc<MockEngine>,
    desktop: Desktop,
    config: OrchestratorConfig,
    tracker: ProjectTracker,
    staging_path: PathBuf,
}

fn fixture() -> Fixture {
    super::init_tracing();
    let tmp = TempDir::new().unwrap();
    let templates_dir = tmp.path().join("templates");
    let library = tmp.path().join("library");
    let staging_path = tmp.path().join("staging");
    fs::create_dir_all(&templates_dir).unwrap();
    fs::create_dir_all(&staging_path).unwrap();
    write_templates(&templates_dir, TemplateId::CERT_SET);

    let engine = Arc::new(MockEngine::new(SCREEN_W, SCREEN_H));
    let desktop = Desktop::with_engine(engine.clone(), 0).unwrap();
    let config = fast_config(&templates_dir, &library, &staging_path);
    let tracker = ProjectTracker::new(&library);
    Fixture {
        _tmp: tmp,
        engine,
        desktop,
        config,
        tracker,
        staging_path,
    }
}

/// Track list with the row's action icon and its play overlay visible.
fn list_scene() -> GrayImage {
    let mut screen = blank(SCREEN_W, SCREEN_H);
    paint(&mut screen, &template_tile(TemplateId::DownloadIcon), 100, 80);
    paint(&mut screen, &template_tile(TemplateId::PlayButton), 200, 80);
    screen
}

fn orchestrator(fx: &Fixture, catalog: Vec<CatalogItem>) -> CertOrchestrator {
    CertOrchestrator::new(
        fx.desktop.clone(),
        Arc::new(MockCatalog(catalog)),
        fx.config.clone(),
    )
}

#[tokio::test]
async fn certificate_lands_in_the_matching_folder() {
    let fx = fixture();
    let catalog = vec![item("Test Song", "03:45", 0)];
    let folders = fx.tracker.prepare(&catalog).unwrap();
    fs::write(folders[0].path.join("Test Song.mp3"), "x").unwrap();
    wire_cert_flow(
        &fx.engine,
        fx.staging_path.clone(),
        "Certificate - Test Song.pdf",
    );
    fx.engine.set_screen(list_scene());

    let summary = orchestrator(&fx, catalog).run(&StopToken::new()).await.unwrap();

    assert_eq!(summary.completed, 1);
    assert!(folders[0].path.join("Certificate - Test Song.pdf").exists());
    assert!(fx.staging_path.read_dir().unwrap().next().is_none());
    // The row was hovered to surface the play overlay.
    assert!(fx.engine.moves().iter().any(|m| near(*m, 200, 88)));
    // The modals were escaped shut after the download.
    assert!(fx.engine.key_presses().contains(&"{esc}".to_string()));
}

#[tokio::test]
async fn fully_certified_library_short_circuits() {
    let fx = fixture();
    let catalog = vec![item("Test Song", "03:45", 0)];
    let folders = fx.tracker.prepare(&catalog).unwrap();
    fs::write(folders[0].path.join("Test Song.mp3"), "x").unwrap();
    fs::write(folders[0].path.join("cert.pdf"), "x").unwrap();

    let summary = orchestrator(&fx, catalog).run(&StopToken::new()).await.unwrap();

    assert_eq!(summary, RunSummary::default());
    assert!(fx.engine.clicks().is_empty(), "nothing to do, nothing clicked");
}

#[tokio::test]
async fn mismatched_pdf_is_discarded_not_misfiled() {
    let fx = fixture();
    let catalog = vec![item("Test Song", "03:45", 0)];
    let folders = fx.tracker.prepare(&catalog).unwrap();
    fs::write(folders[0].path.join("Test Song.mp3"), "x").unwrap();
    // A stale click downloaded some other track's certificate.
    wire_cert_flow(
        &fx.engine,
        fx.staging_path.clone(),
        "Certificate - Somebody Else.pdf",
    );
    fx.engine.set_screen(list_scene());

    let summary = orchestrator(&fx, catalog).run(&StopToken::new()).await.unwrap();

    assert_eq!(summary.failures, 1);
    assert_eq!(summary.completed, 0);
    assert!(fx.staging_path.read_dir().unwrap().next().is_none());
    assert!(!folders[0]
        .path
        .join("Certificate - Somebody Else.pdf")
        .exists());
}

#[tokio::test]
async fn certificate_for_an_already_certified_version_is_a_duplicate() {
    let fx = fixture();
    let catalog = vec![item("Test Song", "03:45", 0), item("Other Song", "04:00", 1)];
    let folders = fx.tracker.prepare(&catalog).unwrap();
    fs::write(folders[0].path.join("Test Song.mp3"), "x").unwrap();
    fs::write(folders[1].path.join("Other Song.mp3"), "x").unwrap();
    fs::write(folders[1].path.join("cert.pdf"), "x").unwrap();
    // Folder 1 needs a certificate, but the stale click lands on the other
    // track, whose folder is already certified.
    wire_cert_flow(&fx.engine, fx.staging_path.clone(), "Other Song.pdf");
    fx.engine.set_screen(list_scene());

    let summary = orchestrator(&fx, catalog).run(&StopToken::new()).await.unwrap();

    assert_eq!(summary.duplicates, 1);
    assert!(fx.staging_path.read_dir().unwrap().next().is_none());
    // With the needed folder still uncertified, the loop scrolled on for
    // more rows before running out of icons.
    assert!(!fx.engine.scrolls().is_empty());
    // The existing certificate was not overwritten.
    assert_eq!(
        fs::read_to_string(folders[1].path.join("cert.pdf")).unwrap(),
        "x"
    );
}
