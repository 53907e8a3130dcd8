use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::EffectConfig;
use crate::effects::traits::{CapabilityResponse, EffectCapability, EffectRequest};
use crate::error::{EffectFault, PipelineError, Result};

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    Text {
        text: &'a str,
    },
    Image {
        #[serde(rename = "inlineData")]
        inline_data: Blob,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Blob {
    #[serde(alias = "mime_type")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    text: Option<String>,
    #[serde(alias = "inline_data")]
    inline_data: Option<Blob>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

fn build_request<'a>(instruction: &'a str, png: &[u8]) -> GenerateRequest<'a> {
    GenerateRequest {
        contents: vec![RequestContent {
            parts: vec![
                RequestPart::Text { text: instruction },
                RequestPart::Image {
                    inline_data: Blob {
                        mime_type: "image/png".to_string(),
                        data: STANDARD.encode(png),
                    },
                },
            ],
        }],
    }
}

/// Decide once whether the response carries an image
///
/// The first inline image wins; otherwise any text parts are kept for logs.
fn classify(response: GenerateResponse) -> std::result::Result<CapabilityResponse, EffectFault> {
    let parts = response
        .candidates
        .into_iter()
        .filter_map(|candidate| candidate.content)
        .flat_map(|content| content.parts);

    let mut texts = Vec::new();
    for part in parts {
        if let Some(blob) = part.inline_data {
            let bytes = STANDARD
                .decode(blob.data.as_bytes())
                .map_err(|e| EffectFault::MalformedResponse {
                    reason: format!("inline image is not valid base64: {}", e),
                })?;
            if bytes.is_empty() {
                continue;
            }
            debug!("Response contains {} bytes of {}", bytes.len(), blob.mime_type);
            return Ok(CapabilityResponse::Image(bytes));
        }
        if let Some(text) = part.text {
            texts.push(text);
        }
    }

    let text = (!texts.is_empty()).then(|| texts.join("\n"));
    Ok(CapabilityResponse::NoImage { text })
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

/// Effect capability backed by the Gemini `generateContent` REST endpoint
pub struct GeminiCapability {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    api_key_env: String,
}

impl GeminiCapability {
    /// Build a client for `model`, reading the key from the configured env var
    ///
    /// A missing key is only a warning here; calls will then fault and
    /// frames pass through.
    pub fn new(config: &EffectConfig, model: String) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());
        Self::with_api_key(config, model, api_key)
    }

    pub fn with_api_key(config: &EffectConfig, model: String, api_key: Option<String>) -> Result<Self> {
        if api_key.is_none() {
            warn!("{} not found in environment, frames will pass through unchanged", config.api_key_env);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| PipelineError::generic(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model,
            api_key,
            api_key_env: config.api_key_env.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

impl EffectCapability for GeminiCapability {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        request: EffectRequest<'_>,
    ) -> std::result::Result<CapabilityResponse, EffectFault> {
        let api_key = self.api_key.as_deref().ok_or_else(|| EffectFault::MissingApiKey {
            env_var: self.api_key_env.clone(),
        })?;

        let png = request.frame_png()?;
        let body = build_request(request.instruction, &png);

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EffectFault::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| EffectFault::MalformedResponse { reason: e.to_string() })?;
        classify(parsed)
    }
}
