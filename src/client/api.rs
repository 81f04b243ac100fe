//! REST client for the remote upscaling service.
//!
//! Wraps the four HTTP operations a job needs (upload slot, upload, submit,
//! status) plus the final download, using [`reqwest`]. Each call maps its
//! failure into a [`JobError`] tagged with the stage it happened in.

use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::ACCEPT;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::JobError;

/// Default service base URL.
pub const DEFAULT_BASE_URL: &str = "https://cloud.leonardo.ai/api/rest/v1";

/// Default timeout for control calls (slot, submit, poll, download).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for the tile upload.
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Default upscaler style.
pub const DEFAULT_STYLE: &str = "General";

/// Default creativity strength (1-10).
pub const DEFAULT_CREATIVITY: u8 = 6;

/// Default scale multiplier applied by the service.
pub const DEFAULT_MULTIPLIER: f32 = 1.5;

const STAGE_SLOT: &str = "upload slot request";
const STAGE_UPLOAD: &str = "upload";
const STAGE_SUBMIT: &str = "job submission";
const STAGE_POLL: &str = "status poll";

// =============================================================================
// Configuration
// =============================================================================

/// Connection settings for the upscaling service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Base URL, e.g. `https://cloud.leonardo.ai/api/rest/v1`
    pub base_url: String,

    /// Bearer token sent in the `authorization` header
    pub api_key: String,

    /// Timeout for control calls
    pub request_timeout: Duration,

    /// Timeout for the multipart upload
    pub upload_timeout: Duration,
}

impl ServiceConfig {
    /// Settings for `base_url` with the default timeouts.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            upload_timeout: DEFAULT_UPLOAD_TIMEOUT,
        }
    }
}

/// Fixed parameters sent with every upscale job.
#[derive(Debug, Clone, PartialEq)]
pub struct UpscaleParams {
    pub style: String,
    pub creativity_strength: u8,
    pub multiplier: f32,
}

impl Default for UpscaleParams {
    fn default() -> Self {
        Self {
            style: DEFAULT_STYLE.to_string(),
            creativity_strength: DEFAULT_CREATIVITY,
            multiplier: DEFAULT_MULTIPLIER,
        }
    }
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitImageResponse {
    upload_init_image: InitImage,
}

#[derive(Debug, Deserialize)]
struct InitImage {
    id: String,
    url: String,
    /// Form fields, JSON-encoded a second time as a string
    fields: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    universal_upscaler: JobHandle,
}

#[derive(Debug, Deserialize)]
struct JobHandle {
    id: String,
}

/// Status response for a submitted variation.
#[derive(Debug, Deserialize)]
pub struct VariationResponse {
    #[serde(default)]
    pub generated_image_variation_generic: Option<Vec<VariationItem>>,
}

/// One generated image of a variation.
#[derive(Debug, Deserialize)]
pub struct VariationItem {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Where a job stands according to the latest poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariationStatus {
    /// Not finished; carries whatever status the service reported
    Pending { status: Option<String> },

    /// Finished; the result can be downloaded from `url`
    Complete { url: String },
}

impl VariationResponse {
    /// Interpret the response.
    ///
    /// Only the first item is consulted. Any status other than `COMPLETE`
    /// (compared case-insensitively), or no item at all, counts as pending.
    pub fn status(&self) -> Result<VariationStatus, JobError> {
        let Some(item) = self
            .generated_image_variation_generic
            .as_ref()
            .and_then(|items| items.first())
        else {
            return Ok(VariationStatus::Pending { status: None });
        };

        let complete = item
            .status
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("complete"));

        if !complete {
            return Ok(VariationStatus::Pending {
                status: item.status.clone(),
            });
        }

        match &item.url {
            Some(url) => Ok(VariationStatus::Complete { url: url.clone() }),
            None => Err(JobError::MalformedResponse {
                stage: STAGE_POLL,
                message: "completed variation has no url".to_string(),
            }),
        }
    }
}

/// A one-time upload target handed out by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSlot {
    /// Identifier the job submission refers to
    pub image_id: String,

    /// Presigned upload URL
    pub url: String,

    /// Form fields that must accompany the file
    pub fields: BTreeMap<String, String>,
}

impl UploadSlot {
    /// Decode an upload-slot response body, including the nested `fields`
    /// string.
    pub fn from_json(body: &[u8]) -> Result<Self, JobError> {
        let response: InitImageResponse = decode(STAGE_SLOT, body)?;
        let init = response.upload_init_image;

        let raw: serde_json::Map<String, serde_json::Value> =
            decode(STAGE_SLOT, init.fields.as_bytes())?;

        let fields = raw
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (key, value)
            })
            .collect();

        Ok(Self {
            image_id: init.id,
            url: init.url,
            fields,
        })
    }
}

// =============================================================================
// Client
// =============================================================================

/// HTTP client for the upscaling service.
pub struct UpscaleApi {
    client: reqwest::Client,
    config: ServiceConfig,
}

impl UpscaleApi {
    /// Create a client with its own connection pool.
    pub fn new(config: ServiceConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, mut config: ServiceConfig) -> Self {
        let trimmed = config.base_url.trim_end_matches('/').len();
        config.base_url.truncate(trimmed);
        Self { client, config }
    }

    /// Service settings in use.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Ask the service for a one-time upload target.
    ///
    /// Sends `POST /init-image` with `{"extension": "jpg"}`.
    pub async fn request_upload_slot(&self) -> Result<UploadSlot, JobError> {
        let response = self
            .client
            .post(self.endpoint("init-image"))
            .header(ACCEPT, "application/json")
            .bearer_auth(&self.config.api_key)
            .json(&serde_json::json!({ "extension": "jpg" }))
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(|source| JobError::Request {
                stage: STAGE_SLOT,
                source,
            })?;

        let body = Self::success_body(STAGE_SLOT, response).await?;
        UploadSlot::from_json(&body)
    }

    /// Upload the image bytes to a slot as multipart form data.
    ///
    /// Every slot field is sent as a text part, followed by a `file` part.
    /// The presigned target carries its own credentials, so no bearer token
    /// is attached.
    pub async fn upload(&self, slot: &UploadSlot, image: Vec<u8>) -> Result<(), JobError> {
        let file = Part::bytes(image)
            .file_name("image.jpg")
            .mime_str("image/jpeg")
            .map_err(|source| JobError::Request {
                stage: STAGE_UPLOAD,
                source,
            })?;

        let form = slot
            .fields
            .iter()
            .fold(Form::new(), |form, (key, value)| {
                form.text(key.clone(), value.clone())
            })
            .part("file", file);

        let response = self
            .client
            .post(&slot.url)
            .multipart(form)
            .timeout(self.config.upload_timeout)
            .send()
            .await
            .map_err(|source| JobError::Request {
                stage: STAGE_UPLOAD,
                source,
            })?;

        Self::success_body(STAGE_UPLOAD, response).await?;
        Ok(())
    }

    /// Submit an upscale job for an uploaded image.
    ///
    /// Returns the variation id to poll.
    pub async fn submit_upscale(
        &self,
        image_id: &str,
        params: &UpscaleParams,
    ) -> Result<String, JobError> {
        let payload = serde_json::json!({
            "upscalerStyle": params.style,
            "creativityStrength": params.creativity_strength,
            "upscaleMultiplier": params.multiplier,
            "initImageId": image_id,
        });

        let response = self
            .client
            .post(self.endpoint("variations/universal-upscaler"))
            .header(ACCEPT, "application/json")
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(|source| JobError::Request {
                stage: STAGE_SUBMIT,
                source,
            })?;

        let body = Self::success_body(STAGE_SUBMIT, response).await?;
        let submitted: SubmitResponse = decode(STAGE_SUBMIT, &body)?;
        Ok(submitted.universal_upscaler.id)
    }

    /// Fetch the current status of a variation.
    pub async fn variation_status(&self, variation_id: &str) -> Result<VariationStatus, JobError> {
        let response = self
            .client
            .get(self.endpoint(&format!("variations/{}", variation_id)))
            .header(ACCEPT, "application/json")
            .bearer_auth(&self.config.api_key)
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(|source| JobError::Request {
                stage: STAGE_POLL,
                source,
            })?;

        let body = Self::success_body(STAGE_POLL, response).await?;
        let variation: VariationResponse = decode(STAGE_POLL, &body)?;
        variation.status()
    }

    /// Download a finished image.
    ///
    /// A non-2xx answer becomes [`JobError::Download`].
    pub async fn download(&self, url: &str) -> Result<Bytes, JobError> {
        let response = self
            .client
            .get(url)
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(|source| JobError::Request {
                stage: "download",
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(JobError::Download {
                status: status.as_u16(),
            });
        }

        response.bytes().await.map_err(|source| JobError::Request {
            stage: "download",
            source,
        })
    }

    // ---- private helpers ----

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url, path)
    }

    /// Read the body of a successful response, or turn a non-2xx status
    /// into [`JobError::Api`] carrying the body text.
    async fn success_body(
        stage: &'static str,
        response: reqwest::Response,
    ) -> Result<Bytes, JobError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(JobError::Api {
                stage,
                status: status.as_u16(),
                body,
            });
        }

        response
            .bytes()
            .await
            .map_err(|source| JobError::Request { stage, source })
    }
}

fn decode<T: DeserializeOwned>(stage: &'static str, body: &[u8]) -> Result<T, JobError> {
    serde_json::from_slice(body).map_err(|e| JobError::MalformedResponse {
        stage,
        message: e.to_string(),
    })
}

// =============================================================================
// Tests
// =============================================================================
