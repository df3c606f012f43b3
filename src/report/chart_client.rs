//! A client for the chart rendering service.

use super::charts::ChartRequest;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

#[derive(Error, Debug)]
pub enum ChartError {
    #[error("chart request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("chart service answered {status}")]
    Status { status: StatusCode },
    #[error("chart service did not return an image URL")]
    Rejected,
}

/// Something that turns a chart request into an image URL.
#[async_trait]
pub trait ChartClient: Send + Sync {
    async fn render(&self, request: &ChartRequest) -> Result<String, ChartError>;
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    success: bool,
    url: Option<String>,
}

/// Posts chart requests to a QuickChart-compatible `/chart/create` endpoint.
pub struct QuickChartClient {
    url: String,
    client: reqwest::Client,
}

impl QuickChartClient {
    pub fn new(url: String, timeout: Duration) -> Result<Self, ChartError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { url, client })
    }
}

#[async_trait]
impl ChartClient for QuickChartClient {
    #[instrument(skip(self, request), fields(url = %self.url))]
    async fn render(&self, request: &ChartRequest) -> Result<String, ChartError> {
        let response = self.client.post(&self.url).json(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, %body, "Chart service rejected request");
            return Err(ChartError::Status { status });
        }

        let body: ChartResponse = response.json().await?;
        match body {
            ChartResponse {
                success: true,
                url: Some(url),
            } => {
                debug!(%url, "Chart rendered");
                Ok(url)
            }
            _ => Err(ChartError::Rejected),
        }
    }
}
