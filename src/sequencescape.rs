use std::collections::BTreeMap;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::LighthouseError;

pub const CLIENT_ID_HEADER: &str = "X-Sequencescape-Client-Id";

/// JSON:API body of `POST /api/v2/heron/plates`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlatePayload {
    pub data: PlateData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlateData {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub attributes: PlateAttributes,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlateAttributes {
    pub barcode: String,
    pub purpose_uuid: String,
    pub study_uuid: String,
    /// Keyed by well coordinate.
    pub wells: BTreeMap<String, Well>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Well {
    pub content: WellContent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WellContent {
    pub phenotype: String,
    pub supplier_name: String,
    pub sample_description: String,
}

/// Status and body exactly as the tracking service returned them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackingResponse {
    pub status: u16,
    pub body: Value,
}

impl TrackingResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub trait SequencescapeClient: Send + Sync {
    fn create_plate(&self, payload: &PlatePayload) -> Result<TrackingResponse, LighthouseError>;
}

#[derive(Clone)]
pub struct SequencescapeHttpClient {
    client: Client,
    base_url: String,
}

impl SequencescapeHttpClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, LighthouseError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("lighthouse/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| LighthouseError::SequencescapeHttp(err.to_string()))?,
        );
        let mut key = HeaderValue::from_str(api_key.trim())
            .map_err(|err| LighthouseError::SequencescapeHttp(err.to_string()))?;
        key.set_sensitive(true);
        headers.insert(CLIENT_ID_HEADER, key);

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|err| LighthouseError::SequencescapeHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn plates_url(&self) -> String {
        format!("{}/api/v2/heron/plates", self.base_url)
    }
}

impl SequencescapeClient for SequencescapeHttpClient {
    fn create_plate(&self, payload: &PlatePayload) -> Result<TrackingResponse, LighthouseError> {
        let url = self.plates_url();
        info!(%url, "sending plate to Sequencescape");
        debug!(?payload, "plate payload");
        let response = self.client.post(&url).json(payload).send().map_err(|err| {
            LighthouseError::SequencescapeHttp(format!("unable to access SS: {err}"))
        })?;

        let status = response.status().as_u16();
        debug!(status, "Sequencescape response");
        let text = response
            .text()
            .map_err(|err| LighthouseError::SequencescapeHttp(err.to_string()))?;
        // Non-JSON bodies (e.g. proxy error pages) are passed on as strings.
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        Ok(TrackingResponse { status, body })
    }
}
