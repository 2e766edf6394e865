use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::LighthouseError;

/// Issues sequential COG-UK barcodes for a centre prefix.
pub trait BaracodaClient: Send + Sync {
    fn new_barcodes(&self, prefix: &str, count: usize) -> Result<Vec<String>, LighthouseError>;
}

#[derive(Debug, Deserialize)]
struct BarcodesGroupResponse {
    barcodes_group: BarcodesGroup,
}

#[derive(Debug, Deserialize)]
struct BarcodesGroup {
    barcodes: Vec<String>,
}

#[derive(Clone)]
pub struct BaracodaHttpClient {
    client: Client,
    base_url: String,
}

impl BaracodaHttpClient {
    pub fn new(base_url: &str) -> Result<Self, LighthouseError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("lighthouse/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| LighthouseError::BaracodaHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|err| LighthouseError::BaracodaHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn group_url(&self, prefix: &str) -> String {
        format!("{}/barcodes_group/{prefix}/new", self.base_url)
    }
}

impl BaracodaClient for BaracodaHttpClient {
    fn new_barcodes(&self, prefix: &str, count: usize) -> Result<Vec<String>, LighthouseError> {
        info!(prefix, count, "requesting COG-UK barcodes");
        let url = self.group_url(prefix);
        let response = self
            .client
            .post(&url)
            .query(&[("count", count)])
            .send()
            .map_err(|err| {
                LighthouseError::BaracodaHttp(format!("unable to access baracoda: {err}"))
            })?;

        if response.status() != StatusCode::CREATED {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "unable to create COG barcodes".to_string());
            return Err(LighthouseError::BaracodaStatus { status, message });
        }

        let body: BarcodesGroupResponse = response
            .json()
            .map_err(|err| LighthouseError::BaracodaHttp(err.to_string()))?;
        debug!(received = body.barcodes_group.barcodes.len(), "baracoda response");
        Ok(body.barcodes_group.barcodes)
    }
}
