use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::baracoda::BaracodaClient;
use crate::catalog::{ReportCatalog, ReportDetails};
use crate::config::ResolvedConfig;
use crate::declarations::{self, BatchOutcome};
use crate::error::LighthouseError;
use crate::labwhere::LabwhereClient;
use crate::plates;
use crate::reports::ReportJob;
use crate::sequencescape::SequencescapeClient;
use crate::store::SampleStore;
use crate::warehouse::Warehouse;

/// Outcome of a plate submission: the status the tracking service answered
/// with, and either a summary (on success) or its body unchanged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlateSubmission {
    pub status: u16,
    pub body: Value,
}

impl PlateSubmission {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportsResult {
    pub reports: Vec<ReportDetails>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteResult {
    pub deleted: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub labware_barcodes: Vec<String>,
    pub location_barcode: String,
}

#[derive(Debug, Clone)]
pub struct AppSettings {
    pub plate_purpose_uuid: String,
    pub study_uuid: String,
    pub window_size_days: i64,
    pub chunk_size: usize,
    pub catalog: ReportCatalog,
}

impl AppSettings {
    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self {
            plate_purpose_uuid: config.sequencescape.plate_purpose_uuid.clone(),
            study_uuid: config.sequencescape.study_uuid.clone(),
            window_size_days: config.reports.window_size_days,
            chunk_size: config.warehouses.chunk_size,
            catalog: ReportCatalog::new(
                &config.reports.reports_dir,
                &config.reports.download_reports_url,
            ),
        }
    }
}

pub struct App<S, W, B, T, L>
where
    S: SampleStore,
    W: Warehouse,
    B: BaracodaClient,
    T: SequencescapeClient,
    L: LabwhereClient,
{
    store: S,
    warehouse: W,
    baracoda: B,
    sequencescape: T,
    labwhere: L,
    settings: AppSettings,
}

impl<S, W, B, T, L> App<S, W, B, T, L>
where
    S: SampleStore,
    W: Warehouse,
    B: BaracodaClient,
    T: SequencescapeClient,
    L: LabwhereClient,
{
    pub fn new(
        store: S,
        warehouse: W,
        baracoda: B,
        sequencescape: T,
        labwhere: L,
        settings: AppSettings,
    ) -> Self {
        Self {
            store,
            warehouse,
            baracoda,
            sequencescape,
            labwhere,
            settings,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn catalog(&self) -> &ReportCatalog {
        &self.settings.catalog
    }

    /// Assigns COG-UK barcodes to every sample on the plate and submits it to
    /// Sequencescape.
    pub fn send_plate(&self, plate_barcode: &str) -> Result<PlateSubmission, LighthouseError> {
        let plate_barcode = plate_barcode.trim();
        let mut samples = plates::samples_for_plate(&self.store, plate_barcode)?;
        if samples.is_empty() {
            return Err(LighthouseError::NoSamples(plate_barcode.to_string()));
        }

        let centre_prefix = plates::add_cog_barcodes(&self.store, &self.baracoda, &mut samples)?;
        let payload = plates::create_post_body(
            plate_barcode,
            &samples,
            &self.settings.plate_purpose_uuid,
            &self.settings.study_uuid,
        )?;
        let response = plates::send_to_tracking(&self.sequencescape, &payload)?;

        if !response.is_success() {
            warn!(plate_barcode, status = response.status, "plate rejected by Sequencescape");
            return Ok(PlateSubmission {
                status: response.status,
                body: response.body,
            });
        }

        info!(plate_barcode, count = samples.len(), "plate sent to Sequencescape");
        Ok(PlateSubmission {
            status: response.status,
            body: json!({
                "data": {
                    "plate_barcode": plate_barcode,
                    "centre": centre_prefix,
                    "number_of_positives": samples.len(),
                }
            }),
        })
    }

    /// Builds a new positives report and returns its catalog entry.
    pub fn create_report(&self, now: DateTime<Utc>) -> Result<ReportsResult, LighthouseError> {
        let job = ReportJob {
            store: &self.store,
            labwhere: &self.labwhere,
            warehouse: &self.warehouse,
            catalog: &self.settings.catalog,
            window_days: self.settings.window_size_days,
            chunk_size: self.settings.chunk_size,
        };
        let name = job.create_report(now)?;
        let reports = self.settings.catalog.report_details(Some(name.as_str()))?;
        Ok(ReportsResult { reports })
    }

    pub fn list_reports(&self, filename: Option<&str>) -> Result<ReportsResult, LighthouseError> {
        let reports = self.settings.catalog.report_details(filename)?;
        Ok(ReportsResult { reports })
    }

    pub fn delete_reports(&self, filenames: &[String]) -> Result<DeleteResult, LighthouseError> {
        let deleted = self.settings.catalog.delete_reports(filenames)?;
        Ok(DeleteResult { deleted })
    }

    pub fn declare_samples(&self, items: &[Value]) -> Result<BatchOutcome, LighthouseError> {
        declarations::declare_samples(&self.store, items)
    }

    pub fn record_scan(
        &self,
        labware_barcodes: &[String],
        location_barcode: &str,
        user_barcode: &str,
    ) -> Result<ScanResult, LighthouseError> {
        if labware_barcodes.is_empty() {
            return Err(LighthouseError::InvalidPayload(
                "at least one labware barcode is required".to_string(),
            ));
        }
        self.labwhere
            .record_scan(labware_barcodes, location_barcode, user_barcode)?;
        Ok(ScanResult {
            labware_barcodes: labware_barcodes.to_vec(),
            location_barcode: location_barcode.to_string(),
        })
    }
}
