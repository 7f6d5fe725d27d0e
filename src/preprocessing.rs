use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use crate::config::AppConfig;
use crate::error::PreprocessError;
use crate::models::{ImageOperation, ProcessPayload, QualityReport, RegionOfInterest};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Seam to the OpenCV image-processing service. Each operation is one
/// independent remote call with no retries; the orchestrators own the
/// skip-and-continue policy.
#[async_trait]
pub trait ImageOps: Send + Sync {
    async fn check_quality(&self, image_base64: &str) -> Result<QualityReport, PreprocessError>;

    /// Crop the image to the given region. Returns the new base64 payload.
    async fn extract_region(
        &self,
        image_base64: &str,
        roi: &RegionOfInterest,
    ) -> Result<String, PreprocessError>;

    /// Resize / CLAHE / denoise pass. Returns the new base64 payload.
    async fn preprocess(&self, image_base64: &str) -> Result<String, PreprocessError>;

    /// Generic passthrough for the maintenance endpoint; returns the
    /// service's payload verbatim.
    async fn run_operation(
        &self,
        operation: ImageOperation,
        image_base64: &str,
        roi: Option<&RegionOfInterest>,
    ) -> Result<ProcessPayload, PreprocessError>;

    /// Liveness probe against the service's `/health` endpoint.
    async fn is_reachable(&self) -> bool;
}

/// HTTP client for the Python OpenCV service (`POST /process`).
pub struct PythonImageService {
    http: reqwest::Client,
    base_url: String,
}

impl PythonImageService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url: config.python_service_url.trim_end_matches('/').to_string(),
        }
    }

    async fn process(
        &self,
        operation: &str,
        image_base64: &str,
        roi: Option<&RegionOfInterest>,
    ) -> Result<ProcessPayload, PreprocessError> {
        let mut payload = json!({
            "imageBase64": image_base64,
            "operation": operation,
        });
        if let Some(roi) = roi {
            // the service expects integer pixel coordinates
            payload["roi"] = json!({
                "x": roi.x as i64,
                "y": roi.y as i64,
                "w": roi.w as i64,
                "h": roi.h as i64,
            });
        }

        debug!(operation, "calling image processing service");

        let response = self
            .http
            .post(format!("{}/process", self.base_url))
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PreprocessError::Unavailable(format!(
                "operation '{}' failed with status {}",
                operation,
                response.status()
            )));
        }

        let body: Value = response.json().await?;
        serde_json::from_value(body).map_err(|e| PreprocessError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl ImageOps for PythonImageService {
    async fn check_quality(&self, image_base64: &str) -> Result<QualityReport, PreprocessError> {
        let payload = self.process("quality", image_base64, None).await?;
        payload.quality.ok_or_else(|| {
            PreprocessError::Unavailable("quality payload missing metrics".to_string())
        })
    }

    async fn extract_region(
        &self,
        image_base64: &str,
        roi: &RegionOfInterest,
    ) -> Result<String, PreprocessError> {
        let payload = self.process("roi", image_base64, Some(roi)).await?;
        payload.processed_image.ok_or_else(|| {
            PreprocessError::Unavailable("roi payload missing processed image".to_string())
        })
    }

    async fn preprocess(&self, image_base64: &str) -> Result<String, PreprocessError> {
        let payload = self.process("preprocess", image_base64, None).await?;
        payload.processed_image.ok_or_else(|| {
            PreprocessError::Unavailable("preprocess payload missing processed image".to_string())
        })
    }

    async fn run_operation(
        &self,
        operation: ImageOperation,
        image_base64: &str,
        roi: Option<&RegionOfInterest>,
    ) -> Result<ProcessPayload, PreprocessError> {
        self.process(operation.as_str(), image_base64, roi).await
    }

    async fn is_reachable(&self) -> bool {
        match self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}
