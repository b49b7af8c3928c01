use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::Value;
use std::io::Cursor;
use std::path::{Path, PathBuf};

fn write_pdf(dir: &Path, name: &str, sizes: &[(f32, f32)]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, labelsnap_raster::fixtures::pdf_with_pages(sizes))
        .expect("fixture PDF should be written");
    path
}

#[test]
fn info_emits_stable_json_contract() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write_pdf(temp.path(), "small.pdf", &[(612.0, 792.0), (300.0, 500.0)]);

    let output = cargo_bin_cmd!("labelsnap")
        .arg("info")
        .arg(&pdf)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value: Value = serde_json::from_slice(&output).expect("stdout should contain valid json");
    assert_eq!(value["page_count"], 2);
    assert_eq!(value["first_page_size_pt"]["width"], 612.0);
    assert_eq!(value["first_page_size_pt"]["height"], 792.0);
    assert!(value["path"].as_str().expect("path should be a string").ends_with("small.pdf"));
}

#[test]
fn export_writes_one_archive_entry_per_page() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write_pdf(
        temp.path(),
        "mixed scans.pdf",
        &[(100.0, 200.0), (200.0, 100.0), (50.0, 50.0)],
    );
    let output_path = temp.path().join("labels.zip");

    cargo_bin_cmd!("labelsnap")
        .arg("export")
        .arg(&pdf)
        .arg("--output")
        .arg(&output_path)
        .assert()
        .success()
        .stderr(predicate::str::contains("page 3/3"));

    let bytes = std::fs::read(&output_path).expect("archive should exist");
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).expect("archive should open");
    assert_eq!(archive.len(), 3);
    for (index, expected) in
        ["label_page_1.png", "label_page_2.png", "label_page_3.png"].iter().enumerate()
    {
        assert_eq!(archive.by_index(index).expect("entry should exist").name(), *expected);
    }
}

#[test]
fn export_default_output_is_named_after_the_document() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write_pdf(temp.path(), "mixed scans.pdf", &[(100.0, 100.0)]);

    cargo_bin_cmd!("labelsnap").arg("export").arg(&pdf).assert().success();

    assert!(temp.path().join("cropped_labels_mixed scans.zip").exists());
}

#[test]
fn crop_writes_a_png_for_the_requested_page() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write_pdf(temp.path(), "doc.pdf", &[(612.0, 792.0), (100.0, 200.0)]);
    let output_path = temp.path().join("crop.png");

    cargo_bin_cmd!("labelsnap")
        .arg("crop")
        .arg(&pdf)
        .arg("--page")
        .arg("2")
        .arg("--output")
        .arg(&output_path)
        .assert()
        .success();

    // Page 2 rasters at 200x400; the default region is 80% x 40% of that.
    let image = image::open(&output_path).expect("crop should be a readable image");
    assert_eq!((image.width(), image.height()), (160, 160));
}

#[test]
fn crop_rejects_an_out_of_range_page() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write_pdf(temp.path(), "doc.pdf", &[(612.0, 792.0)]);

    cargo_bin_cmd!("labelsnap")
        .arg("crop")
        .arg(&pdf)
        .arg("--page")
        .arg("5")
        .assert()
        .failure()
        .stderr(predicate::str::contains("out of range"));
}

#[test]
fn info_fails_for_missing_file() {
    cargo_bin_cmd!("labelsnap")
        .arg("info")
        .arg("/nonexistent/missing.pdf")
        .assert()
        .failure()
        .stderr(predicate::str::contains("file does not exist"));
}

#[test]
fn info_fails_for_invalid_pdf() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let path = temp.path().join("invalid.pdf");
    std::fs::write(&path, b"not a pdf").expect("fixture should be written");

    cargo_bin_cmd!("labelsnap")
        .arg("info")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to open PDF"));
}

#[test]
fn info_fails_for_encrypted_marker_pdf() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let path = temp.path().join("encrypted-marker.pdf");
    std::fs::write(&path, labelsnap_raster::fixtures::encrypted_marker_pdf())
        .expect("fixture should be written");

    cargo_bin_cmd!("labelsnap")
        .arg("info")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("encrypted PDFs are not supported"));
}

#[test]
fn preset_add_then_list_round_trips() {
    let temp = tempfile::tempdir().expect("temp dir should be created");

    cargo_bin_cmd!("labelsnap")
        .arg("preset")
        .arg("--store-root")
        .arg(temp.path())
        .arg("add")
        .arg("--region")
        .arg("5,5,60,30")
        .assert()
        .success()
        .stdout(predicate::str::contains("saved preset 0"));

    let output = cargo_bin_cmd!("labelsnap")
        .arg("preset")
        .arg("--store-root")
        .arg(temp.path())
        .arg("list")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let presets: Value = serde_json::from_slice(&output).expect("list should emit json");
    assert_eq!(presets.as_array().map(Vec::len), Some(1));
    assert_eq!(presets[0]["width"], 60.0);
}

#[test]
fn crop_resolves_a_saved_preset() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write_pdf(temp.path(), "doc.pdf", &[(100.0, 100.0)]);
    let output_path = temp.path().join("crop.png");

    cargo_bin_cmd!("labelsnap")
        .arg("preset")
        .arg("--store-root")
        .arg(temp.path())
        .arg("add")
        .arg("--region")
        .arg("0,0,50,50")
        .assert()
        .success();

    cargo_bin_cmd!("labelsnap")
        .arg("crop")
        .arg(&pdf)
        .arg("--preset")
        .arg("0")
        .arg("--store-root")
        .arg(temp.path())
        .arg("--output")
        .arg(&output_path)
        .assert()
        .success();

    // 50% x 50% of the 200x200 raster.
    let image = image::open(&output_path).expect("crop should be a readable image");
    assert_eq!((image.width(), image.height()), (100, 100));
}

#[test]
fn detect_prints_the_stubbed_suggestion() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write_pdf(temp.path(), "doc.pdf", &[(100.0, 100.0)]);

    let output = cargo_bin_cmd!("labelsnap")
        .arg("detect")
        .arg(&pdf)
        .env(
            "LABELSNAP_DETECT_STUB",
            r#"{"label_found": true, "crop_area": {"x": 10, "y": 10, "width": 80, "height": 40}}"#,
        )
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let region: Value = serde_json::from_slice(&output).expect("stdout should contain json");
    assert_eq!(region["x"], 10.0);
    assert_eq!(region["height"], 40.0);
}

#[test]
fn detect_reports_when_no_label_is_found() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write_pdf(temp.path(), "doc.pdf", &[(100.0, 100.0)]);

    cargo_bin_cmd!("labelsnap")
        .arg("detect")
        .arg(&pdf)
        .env("LABELSNAP_DETECT_STUB", r#"{"label_found": false}"#)
        .assert()
        .success()
        .stdout(predicate::str::contains("no label found"));
}

#[test]
fn detect_can_apply_the_suggested_crop() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write_pdf(temp.path(), "doc.pdf", &[(100.0, 100.0)]);
    let output_path = temp.path().join("label.png");

    cargo_bin_cmd!("labelsnap")
        .arg("detect")
        .arg(&pdf)
        .arg("--apply-crop")
        .arg("--output")
        .arg(&output_path)
        .env(
            "LABELSNAP_DETECT_STUB",
            r#"{"label_found": true, "crop_area": {"x": 0, "y": 0, "width": 50, "height": 50}}"#,
        )
        .assert()
        .success();

    let image = image::open(&output_path).expect("crop should be a readable image");
    assert_eq!((image.width(), image.height()), (100, 100));
}

#[test]
fn detect_requires_an_api_key_without_the_stub() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write_pdf(temp.path(), "doc.pdf", &[(100.0, 100.0)]);

    cargo_bin_cmd!("labelsnap")
        .arg("detect")
        .arg(&pdf)
        .env_remove("LABELSNAP_DETECT_STUB")
        .env_remove("LABELSNAP_API_KEY")
        .assert()
        .failure()
        .stderr(predicate::str::contains("LABELSNAP_API_KEY"));
}
