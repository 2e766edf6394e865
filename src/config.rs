use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::error::LighthouseError;

pub const CONFIG_FILE_NAME: &str = "lighthouse.json";
pub const MAX_REPORT_WINDOW_DAYS: i64 = 3650;

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    pub baracoda_url: String,
    pub ss_url: String,
    #[serde(default)]
    pub ss_api_key: Option<String>,
    pub ss_uuid_plate_purpose: String,
    pub ss_uuid_study: String,
    pub labwhere_url: String,
    pub document_db: String,
    pub warehouses: WarehousesEntry,
    #[serde(default)]
    pub reports_dir: Option<String>,
    #[serde(default)]
    pub download_reports_url: Option<String>,
    #[serde(default)]
    pub report_window_size: Option<i64>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct WarehousesEntry {
    pub ml_wh_db: String,
    pub events_wh_db: String,
    #[serde(default)]
    pub ml_wh_schema: Option<String>,
    #[serde(default)]
    pub events_wh_schema: Option<String>,
    #[serde(default)]
    pub chunk_size: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct SequencescapeSettings {
    pub url: String,
    pub api_key: String,
    pub plate_purpose_uuid: String,
    pub study_uuid: String,
}

#[derive(Debug, Clone)]
pub struct WarehouseSettings {
    pub ml_wh_db: Utf8PathBuf,
    pub ml_wh_schema: String,
    pub events_wh_db: Utf8PathBuf,
    pub events_wh_schema: String,
    pub chunk_size: usize,
}

#[derive(Debug, Clone)]
pub struct ReportSettings {
    pub reports_dir: Utf8PathBuf,
    pub download_reports_url: String,
    pub window_size_days: i64,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub baracoda_url: String,
    pub sequencescape: SequencescapeSettings,
    pub labwhere_url: String,
    pub document_db: Utf8PathBuf,
    pub warehouses: WarehouseSettings,
    pub reports: ReportSettings,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `lighthouse.json` from the working directory, or the
    /// user config directory, in that order.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, LighthouseError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => default_config_path().ok_or(LighthouseError::MissingConfig)?,
        };

        let content = fs::read_to_string(&config_path)
            .map_err(|_| LighthouseError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| LighthouseError::ConfigParse(err.to_string()))?;

        let env_api_key = std::env::var("SS_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());
        Self::resolve_config(config, env_api_key)
    }

    pub fn resolve_config(
        config: Config,
        env_api_key: Option<String>,
    ) -> Result<ResolvedConfig, LighthouseError> {
        let api_key = env_api_key
            .or(config.ss_api_key)
            .map(|key| key.trim().to_string())
            .ok_or_else(|| LighthouseError::InvalidConfig {
                key: "ss_api_key",
                message: "missing (set it in the config or SS_API_KEY)".to_string(),
            })?;

        let ml_wh_schema = config
            .warehouses
            .ml_wh_schema
            .unwrap_or_else(|| "mlwarehouse".to_string());
        let events_wh_schema = config
            .warehouses
            .events_wh_schema
            .unwrap_or_else(|| "mlwh_events".to_string());
        validate_schema_name("warehouses.ml_wh_schema", &ml_wh_schema)?;
        validate_schema_name("warehouses.events_wh_schema", &events_wh_schema)?;
        if ml_wh_schema == events_wh_schema {
            return Err(LighthouseError::InvalidConfig {
                key: "warehouses.events_wh_schema",
                message: "must differ from ml_wh_schema".to_string(),
            });
        }

        let chunk_size = config.warehouses.chunk_size.unwrap_or(50_000);
        if chunk_size == 0 {
            return Err(LighthouseError::InvalidConfig {
                key: "warehouses.chunk_size",
                message: "must be positive".to_string(),
            });
        }

        let window_size_days = config.report_window_size.unwrap_or(14);
        if !(1..=MAX_REPORT_WINDOW_DAYS).contains(&window_size_days) {
            return Err(LighthouseError::InvalidConfig {
                key: "report_window_size",
                message: format!("must be between 1 and {MAX_REPORT_WINDOW_DAYS} days"),
            });
        }

        Ok(ResolvedConfig {
            baracoda_url: trim_url(&config.baracoda_url),
            sequencescape: SequencescapeSettings {
                url: trim_url(&config.ss_url),
                api_key,
                plate_purpose_uuid: config.ss_uuid_plate_purpose,
                study_uuid: config.ss_uuid_study,
            },
            labwhere_url: trim_url(&config.labwhere_url),
            document_db: Utf8PathBuf::from(config.document_db),
            warehouses: WarehouseSettings {
                ml_wh_db: Utf8PathBuf::from(config.warehouses.ml_wh_db),
                ml_wh_schema,
                events_wh_db: Utf8PathBuf::from(config.warehouses.events_wh_db),
                events_wh_schema,
                chunk_size,
            },
            reports: ReportSettings {
                reports_dir: Utf8PathBuf::from(
                    config.reports_dir.unwrap_or_else(|| "data/reports".to_string()),
                ),
                download_reports_url: trim_url(
                    config
                        .download_reports_url
                        .as_deref()
                        .unwrap_or("reports"),
                ),
                window_size_days,
            },
        })
    }
}

fn default_config_path() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return Some(local);
    }
    BaseDirs::new()
        .map(|dirs| dirs.config_dir().join("lighthouse").join(CONFIG_FILE_NAME))
        .filter(|path| path.exists())
}

// Schema names are interpolated into warehouse SQL, so only plain
// identifiers are accepted.
fn validate_schema_name(key: &'static str, value: &str) -> Result<(), LighthouseError> {
    let mut chars = value.chars();
    let valid = chars
        .next()
        .map(|first| first.is_ascii_alphabetic() || first == '_')
        .unwrap_or(false)
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
    if !valid {
        return Err(LighthouseError::InvalidConfig {
            key,
            message: format!("{value:?} is not a valid schema name"),
        });
    }
    Ok(())
}

fn trim_url(value: &str) -> String {
    value.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn sample_config() -> Config {
        serde_json::from_value(serde_json::json!({
            "baracoda_url": "http://baracoda.example/",
            "ss_url": "http://ss.example",
            "ss_api_key": "config-key",
            "ss_uuid_plate_purpose": "purpose-uuid",
            "ss_uuid_study": "study-uuid",
            "labwhere_url": "http://labwhere.example",
            "document_db": "data/lighthouse.sqlite",
            "warehouses": {
                "ml_wh_db": "data/mlwh.sqlite",
                "events_wh_db": "data/events.sqlite"
            }
        }))
        .unwrap()
    }

    #[test]
    fn resolve_applies_defaults() {
        let resolved = ConfigLoader::resolve_config(sample_config(), None).unwrap();
        assert_eq!(resolved.baracoda_url, "http://baracoda.example");
        assert_eq!(resolved.sequencescape.api_key, "config-key");
        assert_eq!(resolved.warehouses.ml_wh_schema, "mlwarehouse");
        assert_eq!(resolved.warehouses.events_wh_schema, "mlwh_events");
        assert_eq!(resolved.warehouses.chunk_size, 50_000);
        assert_eq!(resolved.reports.window_size_days, 14);
        assert_eq!(resolved.reports.reports_dir.as_str(), "data/reports");
    }

    #[test]
    fn env_api_key_wins() {
        let resolved =
            ConfigLoader::resolve_config(sample_config(), Some("env-key".to_string())).unwrap();
        assert_eq!(resolved.sequencescape.api_key, "env-key");
    }

    #[test]
    fn schema_names_must_be_identifiers() {
        let mut config = sample_config();
        config.warehouses.ml_wh_schema = Some("mlwh; drop table sample".to_string());
        let err = ConfigLoader::resolve_config(config, None).unwrap_err();
        assert_matches!(
            err,
            LighthouseError::InvalidConfig {
                key: "warehouses.ml_wh_schema",
                ..
            }
        );
    }

    #[test]
    fn window_size_must_be_positive() {
        let mut config = sample_config();
        config.report_window_size = Some(0);
        let err = ConfigLoader::resolve_config(config, None).unwrap_err();
        assert_matches!(err, LighthouseError::InvalidConfig { key: "report_window_size", .. });
    }

    #[test]
    fn window_size_is_bounded() {
        let mut config = sample_config();
        config.report_window_size = Some(1_000_000_000);
        let err = ConfigLoader::resolve_config(config, None).unwrap_err();
        assert_matches!(err, LighthouseError::InvalidConfig { key: "report_window_size", .. });

        let mut config = sample_config();
        config.report_window_size = Some(MAX_REPORT_WINDOW_DAYS);
        let resolved = ConfigLoader::resolve_config(config, None).unwrap();
        assert_eq!(resolved.reports.window_size_days, MAX_REPORT_WINDOW_DAYS);
    }
}
