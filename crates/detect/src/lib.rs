//! Bridge between the external AI label-detection service and the crop
//! geometry. The service is untrusted input: its response is schema-validated
//! and the suggested region is clamped before adoption, and every failure
//! mode collapses to "no label found" at this layer.

mod gemini;

pub use gemini::GeminiDetector;

use async_trait::async_trait;
use labelsnap_model::CropRegion;
use serde::Deserialize;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error("detection request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("detection request timed out")]
    Timeout,
    #[error("detection service returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("detection response did not match the expected schema: {0}")]
    Schema(String),
}

/// Raw service response. `crop_area` is optional despite the declared service
/// schema; a response that omits it is treated as a miss, not trusted.
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionResponse {
    pub label_found: bool,
    #[serde(default)]
    pub crop_area: Option<CropArea>,
    #[serde(default)]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CropArea {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Image in, suggested crop out.
#[async_trait]
pub trait LabelDetector: Send + Sync {
    async fn detect(&self, image_png: &[u8]) -> Result<DetectionResponse, DetectError>;
}

/// Ask the detector for a crop suggestion on one rendered page.
///
/// Service failures and true negatives are deliberately indistinguishable to
/// the caller: both come back as `None`, and only the logs carry the cause.
/// A successful suggestion is clamped before it is handed out.
pub async fn suggest(detector: &dyn LabelDetector, image_png: &[u8]) -> Option<CropRegion> {
    let response = match detector.detect(image_png).await {
        Ok(response) => response,
        Err(err) => {
            warn!(error = %err, "label detection unavailable, reporting no label found");
            return None;
        }
    };

    if !response.label_found {
        debug!(explanation = response.explanation.as_deref(), "detector reported no label");
        return None;
    }

    let Some(area) = response.crop_area else {
        warn!("detector claimed a label but sent no crop area");
        return None;
    };

    Some(CropRegion::clamped(area.x, area.y, area.width, area.height))
}
