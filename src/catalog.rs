use std::fs;
use std::io::ErrorKind;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::ReportName;
use crate::error::LighthouseError;

const SIZE_UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportDetails {
    pub filename: String,
    pub size: String,
    pub created: String,
    pub download_url: String,
}

/// The directory of generated reports and the URL prefix they are served
/// under.
#[derive(Debug, Clone)]
pub struct ReportCatalog {
    reports_dir: Utf8PathBuf,
    download_url: String,
}

impl ReportCatalog {
    pub fn new(reports_dir: &Utf8Path, download_url: &str) -> Self {
        Self {
            reports_dir: reports_dir.to_path_buf(),
            download_url: download_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn reports_dir(&self) -> &Utf8Path {
        &self.reports_dir
    }

    pub fn new_report_name_and_path(&self, now: DateTime<Utc>) -> (ReportName, Utf8PathBuf) {
        let name = ReportName::for_timestamp(now);
        let path = self.reports_dir.join(name.as_str());
        (name, path)
    }

    /// Details of `filename`, or of every report in the directory when no
    /// name is given.
    pub fn report_details(
        &self,
        filename: Option<&str>,
    ) -> Result<Vec<ReportDetails>, LighthouseError> {
        match filename {
            Some(filename) => {
                if is_unsafe_name(filename) {
                    return Err(LighthouseError::ReportNotFound(filename.to_string()));
                }
                let path = self.reports_dir.join(filename);
                match fs::metadata(path.as_std_path()) {
                    Ok(metadata) if metadata.is_file() => {
                        Ok(vec![self.details_for(filename, &metadata)])
                    }
                    Ok(_) => Err(LighthouseError::ReportNotFound(filename.to_string())),
                    Err(err) if err.kind() == ErrorKind::NotFound => {
                        Err(LighthouseError::ReportNotFound(filename.to_string()))
                    }
                    Err(err) => Err(LighthouseError::Filesystem(format!("{path}: {err}"))),
                }
            }
            None => self.all_report_details(),
        }
    }

    fn all_report_details(&self) -> Result<Vec<ReportDetails>, LighthouseError> {
        let entries = match fs::read_dir(self.reports_dir.as_std_path()) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(dir = %self.reports_dir, "reports directory does not exist yet");
                return Ok(Vec::new());
            }
            Err(err) => {
                return Err(LighthouseError::Filesystem(format!(
                    "{}: {err}",
                    self.reports_dir
                )));
            }
        };

        let mut details = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| LighthouseError::Filesystem(err.to_string()))?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if !ReportName::matches(&name) {
                continue;
            }
            let metadata = entry
                .metadata()
                .map_err(|err| LighthouseError::Filesystem(format!("{name}: {err}")))?;
            if metadata.is_file() {
                details.push(self.details_for(&name, &metadata));
            }
        }
        details.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(details)
    }

    fn details_for(&self, filename: &str, metadata: &fs::Metadata) -> ReportDetails {
        let created = metadata
            .modified()
            .map(|modified| DateTime::<Local>::from(modified).format("%c").to_string())
            .unwrap_or_default();
        ReportDetails {
            filename: filename.to_string(),
            size: convert_size(metadata.len()),
            created,
            download_url: format!("{}/{filename}", self.download_url),
        }
    }

    /// Removes the named reports. Names that do not exist, are not regular
    /// files, or would resolve outside the reports directory are skipped.
    pub fn delete_reports(&self, filenames: &[String]) -> Result<usize, LighthouseError> {
        let mut deleted = 0;
        for filename in filenames {
            if is_unsafe_name(filename) {
                warn!(filename, "refusing to delete report outside reports directory");
                continue;
            }
            let path = self.reports_dir.join(filename);
            match fs::symlink_metadata(path.as_std_path()) {
                Ok(metadata) if metadata.is_file() => {}
                Ok(_) => {
                    warn!(%path, "skipping deletion of something that is not a report file");
                    continue;
                }
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    debug!(%path, "report already absent");
                    continue;
                }
                Err(err) => {
                    warn!(%path, error = %err, "skipping report that cannot be inspected");
                    continue;
                }
            }
            match fs::remove_file(path.as_std_path()) {
                Ok(()) => {
                    info!(%path, "deleted report");
                    deleted += 1;
                }
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    debug!(%path, "report already absent");
                }
                Err(err) => return Err(LighthouseError::Filesystem(format!("{path}: {err}"))),
            }
        }
        Ok(deleted)
    }
}

fn is_unsafe_name(filename: &str) -> bool {
    filename.is_empty()
        || filename == "."
        || filename == ".."
        || filename.contains('/')
        || filename.contains('\\')
}

/// Human readable size: `0B`, `1.0 KB`, `1.5 KB`, `1000.0 B`.
pub fn convert_size(size_bytes: u64) -> String {
    if size_bytes == 0 {
        return "0B".to_string();
    }
    let mut index = 0;
    let mut divisor = 1u64;
    while index + 1 < SIZE_UNITS.len() && size_bytes / divisor >= 1024 {
        divisor *= 1024;
        index += 1;
    }
    let scaled = ((size_bytes as f64 / divisor as f64) * 100.0).round() / 100.0;
    if scaled.fract() == 0.0 {
        format!("{scaled:.1} {}", SIZE_UNITS[index])
    } else {
        format!("{scaled} {}", SIZE_UNITS[index])
    }
}
