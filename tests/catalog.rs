mod common;

use assert_matches::assert_matches;
use chrono::{TimeZone, Utc};

use lighthouse_ops::catalog::ReportCatalog;
use lighthouse_ops::error::LighthouseError;

const FIRST: &str = "200101_0900_positives_with_locations.xlsx";
const SECOND: &str = "200716_1345_positives_with_locations.xlsx";

fn catalog_with_files(temp: &tempfile::TempDir) -> ReportCatalog {
    let dir = common::utf8(temp, "reports");
    std::fs::create_dir_all(dir.as_std_path()).unwrap();
    std::fs::write(dir.join(SECOND).as_std_path(), vec![0u8; 1536]).unwrap();
    std::fs::write(dir.join(FIRST).as_std_path(), vec![0u8; 1024]).unwrap();
    std::fs::write(dir.join("notes.txt").as_std_path(), b"ignore me").unwrap();
    std::fs::create_dir(dir.join("200101_0901_positives_with_locations.xlsx").as_std_path())
        .unwrap();
    ReportCatalog::new(&dir, "https://lighthouse.example/reports")
}

#[test]
fn listing_filters_and_sorts_reports() {
    let temp = tempfile::tempdir().unwrap();
    let catalog = catalog_with_files(&temp);

    let details = catalog.report_details(None).unwrap();
    let names = details
        .iter()
        .map(|detail| detail.filename.as_str())
        .collect::<Vec<_>>();
    assert_eq!(names, vec![FIRST, SECOND]);
    assert_eq!(details[0].size, "1.0 KB");
    assert_eq!(details[1].size, "1.5 KB");
    assert_eq!(
        details[1].download_url,
        format!("https://lighthouse.example/reports/{SECOND}")
    );
    assert!(!details[0].created.is_empty());
}

#[test]
fn missing_directory_lists_nothing() {
    let temp = tempfile::tempdir().unwrap();
    let catalog = ReportCatalog::new(&common::utf8(&temp, "nowhere"), "reports");
    assert!(catalog.report_details(None).unwrap().is_empty());
}

#[test]
fn named_report_must_exist() {
    let temp = tempfile::tempdir().unwrap();
    let catalog = catalog_with_files(&temp);

    let details = catalog.report_details(Some(SECOND)).unwrap();
    assert_eq!(details.len(), 1);
    assert_eq!(details[0].filename, SECOND);

    let err = catalog
        .report_details(Some("200102_0900_positives_with_locations.xlsx"))
        .unwrap_err();
    assert_matches!(err, LighthouseError::ReportNotFound(_));
}

#[test]
fn delete_skips_missing_and_escaping_names() {
    let temp = tempfile::tempdir().unwrap();
    let catalog = catalog_with_files(&temp);
    std::fs::write(temp.path().join("outside.xlsx"), b"keep").unwrap();

    let deleted = catalog
        .delete_reports(&[
            FIRST.to_string(),
            "200102_0900_positives_with_locations.xlsx".to_string(),
            "../outside.xlsx".to_string(),
        ])
        .unwrap();
    assert_eq!(deleted, 1);
    assert!(temp.path().join("outside.xlsx").exists());

    let remaining = catalog.report_details(None).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].filename, SECOND);
}

#[test]
fn new_report_path_lives_in_reports_dir() {
    let temp = tempfile::tempdir().unwrap();
    let catalog = catalog_with_files(&temp);
    let now = Utc.with_ymd_and_hms(2020, 7, 16, 13, 45, 0).unwrap();
    let (name, path) = catalog.new_report_name_and_path(now);
    assert_eq!(name.as_str(), SECOND);
    assert_eq!(path, catalog.reports_dir().join(SECOND));
}

#[test]
fn delete_skips_directories_and_keeps_going() {
    let temp = tempfile::tempdir().unwrap();
    let catalog = catalog_with_files(&temp);
    let directory = "200101_0901_positives_with_locations.xlsx";

    let deleted = catalog
        .delete_reports(&[directory.to_string(), SECOND.to_string()])
        .unwrap();
    assert_eq!(deleted, 1);
    assert!(catalog.reports_dir().join(directory).as_std_path().is_dir());

    let remaining = catalog.report_details(None).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].filename, FIRST);
}
