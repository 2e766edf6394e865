use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::error::LighthouseError;

/// One entry of `/api/labwares_by_barcode`, e.g.
/// `{"barcode": "GLA001024R", "location_barcode": "lw-uk-biocentre-box-gsw--98-14813"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabwareLocation {
    pub barcode: String,
    #[serde(default)]
    pub location_barcode: Option<String>,
}

pub trait LabwhereClient: Send + Sync {
    fn locations_for(
        &self,
        labware_barcodes: &[String],
    ) -> Result<Vec<LabwareLocation>, LighthouseError>;

    /// Records that the labware was moved to `location_barcode`. The user is
    /// identified by swipecard barcode; robots are registered as users.
    fn record_scan(
        &self,
        labware_barcodes: &[String],
        location_barcode: &str,
        user_barcode: &str,
    ) -> Result<(), LighthouseError>;
}

#[derive(Clone)]
pub struct LabwhereHttpClient {
    client: Client,
    base_url: String,
}

impl LabwhereHttpClient {
    pub fn new(base_url: &str) -> Result<Self, LighthouseError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("lighthouse/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| LighthouseError::LabwhereHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|err| LighthouseError::LabwhereHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn handle_status(
        response: reqwest::blocking::Response,
        expected: &[StatusCode],
    ) -> Result<reqwest::blocking::Response, LighthouseError> {
        if expected.contains(&response.status()) {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "LabWhere request failed".to_string());
        Err(LighthouseError::LabwhereStatus { status, message })
    }
}

impl LabwhereClient for LabwhereHttpClient {
    fn locations_for(
        &self,
        labware_barcodes: &[String],
    ) -> Result<Vec<LabwareLocation>, LighthouseError> {
        let url = format!("{}/api/labwares_by_barcode", self.base_url);
        debug!(count = labware_barcodes.len(), "getting locations from LabWhere");
        let response = self
            .client
            .post(&url)
            .json(&json!({ "barcodes": labware_barcodes }))
            .send()
            .map_err(|err| LighthouseError::LabwhereHttp(err.to_string()))?;
        let response = Self::handle_status(response, &[StatusCode::OK])?;
        response
            .json()
            .map_err(|err| LighthouseError::LabwhereHttp(err.to_string()))
    }

    fn record_scan(
        &self,
        labware_barcodes: &[String],
        location_barcode: &str,
        user_barcode: &str,
    ) -> Result<(), LighthouseError> {
        let url = format!("{}/api/scans", self.base_url);
        info!(
            count = labware_barcodes.len(),
            location_barcode, "recording scan in LabWhere"
        );
        let body = json!({
            "scan": {
                "user_code": user_barcode,
                "labware_barcodes": labware_barcodes.join("\n"),
                "location_barcode": location_barcode,
            }
        });
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|err| LighthouseError::LabwhereHttp(err.to_string()))?;
        Self::handle_status(response, &[StatusCode::OK, StatusCode::CREATED])?;
        Ok(())
    }
}
