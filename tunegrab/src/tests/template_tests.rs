use tempfile::TempDir;

use super::mock::{blank, paint, tile, write_template};
use crate::errors::AutomationError;
use crate::template::{TemplateId, TemplateLibrary};

fn library_with(ids: &[(TemplateId, u8)]) -> (TempDir, TemplateLibrary) {
    let dir = TempDir::new().unwrap();
    for (id, seed) in ids {
        write_template(dir.path(), *id, &tile(*seed, 24, 16));
    }
    let lib = TemplateLibrary::open(dir.path());
    (dir, lib)
}

#[test]
fn find_locates_the_tile_center() {
    super::init_tracing();
    let (_dir, lib) = library_with(&[(TemplateId::DownloadIcon, 1)]);
    let mut screen = blank(300, 200);
    paint(&mut screen, &tile(1, 24, 16), 100, 60);

    let m = lib
        .find(&screen, TemplateId::DownloadIcon, 0.8)
        .unwrap()
        .expect("tile should be found");
    assert_eq!((m.x, m.y), (112, 68));
    assert!(m.confidence > 0.99, "confidence was {}", m.confidence);
}

#[test]
fn absent_template_is_none_not_error() {
    let (_dir, lib) = library_with(&[(TemplateId::DownloadIcon, 1), (TemplateId::ModalMp3, 2)]);
    let mut screen = blank(300, 200);
    paint(&mut screen, &tile(1, 24, 16), 100, 60);

    assert!(lib
        .find(&screen, TemplateId::ModalMp3, 0.7)
        .unwrap()
        .is_none());
}

#[test]
fn find_all_returns_every_instance_best_first() {
    let (_dir, lib) = library_with(&[(TemplateId::DownloadIcon, 1)]);
    let mut screen = blank(400, 300);
    let t = tile(1, 24, 16);
    paint(&mut screen, &t, 40, 30);
    paint(&mut screen, &t, 40, 120);
    paint(&mut screen, &t, 200, 210);

    let matches = lib.find_all(&screen, TemplateId::DownloadIcon, 0.8).unwrap();
    assert_eq!(matches.len(), 3);
    let mut ys: Vec<u32> = matches.iter().map(|m| m.y).collect();
    ys.sort_unstable();
    assert_eq!(ys, vec![38, 128, 218]);
}

#[test]
fn near_duplicate_matches_are_suppressed() {
    let (_dir, lib) = library_with(&[(TemplateId::DownloadIcon, 1)]);
    let mut screen = blank(300, 200);
    let t = tile(1, 24, 16);
    // The second stamp partially overwrites the first, leaving an intact
    // copy next to a degraded one a few pixels away.
    paint(&mut screen, &t, 100, 60);
    paint(&mut screen, &t, 110, 60);

    let matches = lib.find_all(&screen, TemplateId::DownloadIcon, 0.3).unwrap();
    let close = matches
        .iter()
        .filter(|m| m.x.abs_diff(117) <= 20 && m.y.abs_diff(68) <= 20)
        .count();
    assert_eq!(close, 1, "overlapping placements must collapse to one");
    assert!(matches[0].confidence > 0.99);
}

#[test]
fn row_button_is_offset_right_of_the_icon() {
    let (_dir, lib) = library_with(&[(TemplateId::ModalMp3, 3)]);
    let mut screen = blank(800, 200);
    paint(&mut screen, &tile(3, 24, 16), 50, 90);

    let (x, y) = lib
        .find_button_in_row(&screen, TemplateId::ModalMp3, 0.8, 555)
        .unwrap()
        .expect("row should be found");
    assert_eq!((x, y), (62 + 555, 98));
}

#[test]
fn verify_lists_every_missing_template() {
    let (_dir, lib) = library_with(&[(TemplateId::DownloadIcon, 1)]);
    let err = lib
        .verify(&[
            TemplateId::DownloadIcon,
            TemplateId::ModalMp3,
            TemplateId::ModalRaw,
        ])
        .unwrap_err();
    match err {
        AutomationError::MissingAssets(msg) => {
            assert!(msg.contains("modal_mp3.png"));
            assert!(msg.contains("modal_raw.png"));
            assert!(!msg.contains("download_icon.png"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn oversized_template_never_matches() {
    let (_dir, lib) = library_with(&[(TemplateId::DownloadIcon, 1)]);
    let screen = blank(10, 10);
    assert!(lib
        .find(&screen, TemplateId::DownloadIcon, 0.1)
        .unwrap()
        .is_none());
}
