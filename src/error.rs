use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum LighthouseError {
    #[error("data consistency error: {0}")]
    DataConsistency(String),

    #[error("MissingSourceError: {0}")]
    MissingSource(String),

    #[error("MissingCentreError: {0}")]
    MissingCentre(String),

    #[error("MultipleCentresError: {0}")]
    MultipleCentres(String),

    #[error("sample {root_sample_id} is missing required field `{field}`")]
    MissingField {
        root_sample_id: String,
        field: &'static str,
    },

    #[error("no samples for this barcode: {0}")]
    NoSamples(String),

    #[error("Baracoda request failed: {0}")]
    BaracodaHttp(String),

    #[error("Baracoda returned status {status}: {message}")]
    BaracodaStatus { status: u16, message: String },

    #[error("Sequencescape request failed: {0}")]
    SequencescapeHttp(String),

    #[error("LabWhere request failed: {0}")]
    LabwhereHttp(String),

    #[error("LabWhere returned status {status}: {message}")]
    LabwhereStatus { status: u16, message: String },

    #[error("report creation failed: {0}")]
    #[diagnostic(help("no report was written; fix the failing service and retry"))]
    ReportCreation(String),

    #[error("warehouse query failed: {0}")]
    Warehouse(String),

    #[error("document store error: {0}")]
    DocumentStore(String),

    #[error("failed to write spreadsheet: {0}")]
    Spreadsheet(String),

    #[error("report not found: {0}")]
    ReportNotFound(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("missing config file lighthouse.json")]
    #[diagnostic(help("pass --config <path> or create lighthouse.json in the current directory"))]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config value for {key}: {message}")]
    InvalidConfig { key: &'static str, message: String },

    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

impl LighthouseError {
    /// Failures of the barcode, tracking or location services.
    pub fn is_external_service(&self) -> bool {
        matches!(
            self,
            LighthouseError::BaracodaHttp(_)
                | LighthouseError::BaracodaStatus { .. }
                | LighthouseError::SequencescapeHttp(_)
                | LighthouseError::LabwhereHttp(_)
                | LighthouseError::LabwhereStatus { .. }
        )
    }
}
