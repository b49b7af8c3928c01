//! Gemini `generateContent` detector. Sends the rendered page PNG inline
//! (base64) together with a fixed instruction, and constrains the reply to a
//! JSON schema so the response body parses straight into
//! [`DetectionResponse`](crate::DetectionResponse).

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::{DetectError, DetectionResponse, LabelDetector};

pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const INSTRUCTION: &str = "Identify the bounding box of the shipping label on this document. \
Return the coordinates as percentages (0-100) of the image width and height. \
For example {x: 10, y: 10, width: 80, height: 40}. \
Ensure the crop includes all barcodes and text necessary for delivery. \
If no shipping label is visible, set label_found to false.";

pub struct GeminiDetector {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiDetector {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_model(api_key, DEFAULT_MODEL)
    }

    pub fn with_model(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.into(),
            api_key: api_key.into(),
        }
    }

    /// Point the detector at a different endpoint, e.g. a local stub server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn request_body(&self, image_png: &[u8]) -> serde_json::Value {
        let image_base64 = base64::engine::general_purpose::STANDARD.encode(image_png);

        serde_json::json!({
            "contents": [{
                "parts": [
                    { "inline_data": { "mime_type": "image/png", "data": image_base64 } },
                    { "text": INSTRUCTION },
                ],
            }],
            "generationConfig": {
                "response_mime_type": "application/json",
                "response_schema": {
                    "type": "OBJECT",
                    "properties": {
                        "label_found": { "type": "BOOLEAN" },
                        "crop_area": {
                            "type": "OBJECT",
                            "properties": {
                                "x": { "type": "NUMBER" },
                                "y": { "type": "NUMBER" },
                                "width": { "type": "NUMBER" },
                                "height": { "type": "NUMBER" },
                            },
                            "required": ["x", "y", "width", "height"],
                        },
                        "explanation": { "type": "STRING" },
                    },
                    "required": ["label_found", "crop_area"],
                },
            },
        })
    }
}

/// The slice of the `generateContent` envelope we care about: the text of the
/// first part of the first candidate, which holds the schema-constrained JSON.
#[derive(Deserialize)]
struct GenerateContentReply {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

fn parse_reply(body: &str) -> Result<DetectionResponse, DetectError> {
    let reply: GenerateContentReply =
        serde_json::from_str(body).map_err(|err| DetectError::Schema(err.to_string()))?;

    let text = reply
        .candidates
        .first()
        .and_then(|candidate| candidate.content.parts.first())
        .map(|part| part.text.as_str())
        .ok_or_else(|| DetectError::Schema("reply carries no candidates".to_string()))?;

    serde_json::from_str(text).map_err(|err| DetectError::Schema(err.to_string()))
}

#[async_trait]
impl LabelDetector for GeminiDetector {
    async fn detect(&self, image_png: &[u8]) -> Result<DetectionResponse, DetectError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        debug!(model = %self.model, image_bytes = image_png.len(), "requesting label detection");

        let response = self
            .client
            .post(&url)
            .timeout(REQUEST_TIMEOUT)
            .json(&self.request_body(image_png))
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    DetectError::Timeout
                } else {
                    DetectError::Http(err)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DetectError::Api { status: status.as_u16(), body });
        }

        let body = response.text().await?;
        parse_reply(&body)
    }
}
