//! Test utilities for integration tests.
//!
//! This module provides an in-process stub of the upscaling service (served
//! by axum on an ephemeral port), an in-memory `UpscaleService` for pipeline
//! tests, and helpers for creating test images.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{Multipart, Path as UrlPath, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use image::imageops::{self, FilterType};
use image::{ImageFormat, Rgb, RgbImage};
use tokio_util::sync::CancellationToken;

use tiled_upscale::client::{
    JobClient, PollConfig, ServiceConfig, UpscaleApi, UpscaleParams, UpscaleService,
};
use tiled_upscale::error::JobError;
use tiled_upscale::tile::load_rgb;

pub const TEST_API_KEY: &str = "test-key";

/// Poll interval used against the stub; short enough to keep tests fast.
pub const FAST_POLL: Duration = Duration::from_millis(10);

// =============================================================================
// Stub Service
// =============================================================================

/// How the stub service should behave.
#[derive(Debug, Clone)]
pub struct StubBehavior {
    /// Poll number (per variation, 1-based) on which the job reports
    /// COMPLETE; `None` means never
    pub complete_on_poll: Option<u32>,

    /// The first N polls of each variation answer HTTP 500
    pub failing_polls: u32,

    /// Upload number (1-based, across the whole run) that answers HTTP 500
    pub fail_upload_on: Option<u32>,

    /// Every upload slot request answers HTTP 500
    pub fail_slot: bool,

    /// Status code for downloads; anything but 200 fails them
    pub download_status: StatusCode,

    /// Integer factor applied to uploaded images
    pub scale: u32,

    /// Delay before the upload endpoint answers
    pub upload_delay: Duration,
}

impl Default for StubBehavior {
    fn default() -> Self {
        Self {
            complete_on_poll: Some(1),
            failing_polls: 0,
            fail_upload_on: None,
            fail_slot: false,
            download_status: StatusCode::OK,
            scale: 2,
            upload_delay: Duration::ZERO,
        }
    }
}

/// Request counters for the stub.
#[derive(Debug, Default)]
pub struct StubCounters {
    pub slot_requests: AtomicU32,
    pub uploads: AtomicU32,
    pub submits: AtomicU32,
    pub polls: AtomicU32,
    pub downloads: AtomicU32,
}

impl StubCounters {
    pub fn get(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }
}

struct StubState {
    behavior: StubBehavior,
    counters: StubCounters,
    origin: String,
    next_id: AtomicU32,
    /// image id -> uploaded file bytes
    images: Mutex<HashMap<String, Vec<u8>>>,
    /// image id -> form field names seen on upload
    upload_fields: Mutex<HashMap<String, Vec<String>>>,
    /// variation id -> (image id, polls so far)
    variations: Mutex<HashMap<String, (String, u32)>>,
    submissions: Mutex<Vec<serde_json::Value>>,
}

/// A running stub service.
pub struct StubService {
    state: Arc<StubState>,
}

impl StubService {
    /// Start a stub on an ephemeral localhost port.
    pub async fn spawn(behavior: StubBehavior) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let origin = format!("http://{}", listener.local_addr().unwrap());

        let state = Arc::new(StubState {
            behavior,
            counters: StubCounters::default(),
            origin,
            next_id: AtomicU32::new(1),
            images: Mutex::new(HashMap::new()),
            upload_fields: Mutex::new(HashMap::new()),
            variations: Mutex::new(HashMap::new()),
            submissions: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/api/init-image", post(init_image))
            .route("/api/variations/universal-upscaler", post(submit))
            .route("/api/variations/{id}", get(variation))
            .route("/upload/{id}", post(upload))
            .route("/download/{id}", get(download))
            .with_state(Arc::clone(&state));

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { state }
    }

    pub fn base_url(&self) -> String {
        format!("{}/api", self.state.origin)
    }

    pub fn counters(&self) -> &StubCounters {
        &self.state.counters
    }

    pub fn polls(&self) -> u32 {
        StubCounters::get(&self.state.counters.polls)
    }

    pub fn uploads(&self) -> u32 {
        StubCounters::get(&self.state.counters.uploads)
    }

    pub fn downloads(&self) -> u32 {
        StubCounters::get(&self.state.counters.downloads)
    }

    pub fn submissions(&self) -> Vec<serde_json::Value> {
        self.state.submissions.lock().unwrap().clone()
    }

    pub fn upload_fields(&self, image_id: &str) -> Vec<String> {
        self.state
            .upload_fields
            .lock()
            .unwrap()
            .get(image_id)
            .cloned()
            .unwrap_or_default()
    }

    /// A job client pointed at this stub, writing results into `dir`.
    pub fn job_client(&self, attempts: u32, dir: &Path) -> JobClient {
        self.job_client_with(TEST_API_KEY, attempts, FAST_POLL, dir)
    }

    pub fn job_client_with(
        &self,
        api_key: &str,
        attempts: u32,
        interval: Duration,
        dir: &Path,
    ) -> JobClient {
        let api = UpscaleApi::new(ServiceConfig::new(self.base_url(), api_key));
        JobClient::new(
            api,
            UpscaleParams::default(),
            PollConfig { attempts, interval },
            dir,
        )
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {}", TEST_API_KEY))
        .unwrap_or(false)
}

async fn init_image(State(state): State<Arc<StubState>>, headers: HeaderMap) -> Response {
    state.counters.slot_requests.fetch_add(1, Ordering::SeqCst);

    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if state.behavior.fail_slot {
        return (StatusCode::INTERNAL_SERVER_ERROR, "slot unavailable").into_response();
    }

    let id = format!("img-{}", state.next_id.fetch_add(1, Ordering::SeqCst));
    let fields = serde_json::json!({
        "key": format!("uploads/{}.jpg", id),
        "policy": "stub-policy",
    });

    Json(serde_json::json!({
        "uploadInitImage": {
            "id": id,
            "url": format!("{}/upload/{}", state.origin, id),
            "fields": fields.to_string(),
        }
    }))
    .into_response()
}

async fn upload(
    State(state): State<Arc<StubState>>,
    UrlPath(id): UrlPath<String>,
    mut multipart: Multipart,
) -> Response {
    let n = state.counters.uploads.fetch_add(1, Ordering::SeqCst) + 1;
    tokio::time::sleep(state.behavior.upload_delay).await;
    if state.behavior.fail_upload_on == Some(n) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "upload rejected").into_response();
    }

    let mut names = Vec::new();
    let mut file = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        let data = field.bytes().await.unwrap();
        if name == "file" {
            file = Some(data.to_vec());
        }
        names.push(name);
    }

    let Some(file) = file else {
        return (StatusCode::BAD_REQUEST, "missing file").into_response();
    };

    state.images.lock().unwrap().insert(id.clone(), file);
    state.upload_fields.lock().unwrap().insert(id, names);
    StatusCode::NO_CONTENT.into_response()
}

async fn submit(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Json(payload): Json<serde_json::Value>,
) -> Response {
    state.counters.submits.fetch_add(1, Ordering::SeqCst);

    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let Some(image_id) = payload["initImageId"].as_str().map(str::to_string) else {
        return (StatusCode::BAD_REQUEST, "missing initImageId").into_response();
    };
    if !state.images.lock().unwrap().contains_key(&image_id) {
        return (StatusCode::BAD_REQUEST, "unknown image").into_response();
    }

    let id = format!("var-{}", state.next_id.fetch_add(1, Ordering::SeqCst));
    state
        .variations
        .lock()
        .unwrap()
        .insert(id.clone(), (image_id, 0));
    state.submissions.lock().unwrap().push(payload);

    Json(serde_json::json!({ "universalUpscaler": { "id": id } })).into_response()
}

async fn variation(
    State(state): State<Arc<StubState>>,
    UrlPath(id): UrlPath<String>,
    headers: HeaderMap,
) -> Response {
    state.counters.polls.fetch_add(1, Ordering::SeqCst);

    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let polls = {
        let mut variations = state.variations.lock().unwrap();
        let Some(entry) = variations.get_mut(&id) else {
            return StatusCode::NOT_FOUND.into_response();
        };
        entry.1 += 1;
        entry.1
    };

    if polls <= state.behavior.failing_polls {
        return (StatusCode::INTERNAL_SERVER_ERROR, "try again").into_response();
    }

    let complete = state
        .behavior
        .complete_on_poll
        .is_some_and(|on| polls >= on);

    let item = if complete {
        serde_json::json!({
            "id": format!("gen-{}", id),
            "status": "COMPLETE",
            "url": format!("{}/download/{}", state.origin, id),
        })
    } else {
        serde_json::json!({ "id": format!("gen-{}", id), "status": "PENDING" })
    };

    Json(serde_json::json!({ "generated_image_variation_generic": [item] })).into_response()
}

async fn download(State(state): State<Arc<StubState>>, UrlPath(id): UrlPath<String>) -> Response {
    state.counters.downloads.fetch_add(1, Ordering::SeqCst);

    if state.behavior.download_status != StatusCode::OK {
        return state.behavior.download_status.into_response();
    }

    let image_id = match state.variations.lock().unwrap().get(&id) {
        Some((image_id, _)) => image_id.clone(),
        None => return StatusCode::NOT_FOUND.into_response(),
    };
    let uploaded = match state.images.lock().unwrap().get(&image_id) {
        Some(bytes) => bytes.clone(),
        None => return StatusCode::NOT_FOUND.into_response(),
    };

    let img = image::load_from_memory(&uploaded).unwrap().to_rgb8();
    let scaled = scale_nearest(&img, state.behavior.scale);

    Bytes::from(encode_png(&scaled)).into_response()
}

// =============================================================================
// In-Memory Service
// =============================================================================

/// An `UpscaleService` that scales images locally and records every call.
///
/// Calls listed in `fail_on` (1-based) fail with an upload error. Calls
/// listed in `hang_on` wait until cancelled.
pub struct RecordingService {
    out_dir: PathBuf,
    scale: u32,
    fail_on: Vec<u32>,
    hang_on: Vec<u32>,
    calls: Mutex<Vec<PathBuf>>,
}

impl RecordingService {
    pub fn new(out_dir: &Path) -> Self {
        Self {
            out_dir: out_dir.to_path_buf(),
            scale: 2,
            fail_on: Vec::new(),
            hang_on: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_on(mut self, call: u32) -> Self {
        self.fail_on.push(call);
        self
    }

    pub fn hanging_on(mut self, call: u32) -> Self {
        self.hang_on.push(call);
        self
    }

    pub fn calls(&self) -> Vec<PathBuf> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl UpscaleService for RecordingService {
    async fn upscale(&self, image: &Path, cancel: &CancellationToken) -> Result<PathBuf, JobError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(image.to_path_buf());
            calls.len() as u32
        };

        if self.fail_on.contains(&call) {
            return Err(JobError::Api {
                stage: "upload",
                status: 500,
                body: "stub failure".to_string(),
            });
        }

        if self.hang_on.contains(&call) {
            cancel.cancelled().await;
            return Err(JobError::Cancelled);
        }

        let img = load_rgb(image).map_err(|e| std::io::Error::other(e.to_string()))?;
        let path = self.out_dir.join(format!("upscaled_{}.png", call));
        scale_nearest(&img, self.scale).save(&path).unwrap();
        Ok(path)
    }
}

/// An `UpscaleService` that returns a copy of its input without decoding it.
pub struct CopyService {
    out_dir: PathBuf,
    calls: AtomicU32,
}

impl CopyService {
    pub fn new(out_dir: &Path) -> Self {
        Self {
            out_dir: out_dir.to_path_buf(),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpscaleService for CopyService {
    async fn upscale(&self, image: &Path, _cancel: &CancellationToken) -> Result<PathBuf, JobError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let path = self.out_dir.join(format!("copy_{}.png", n));
        tokio::fs::copy(image, &path).await?;
        Ok(path)
    }
}

// =============================================================================
// Images
// =============================================================================

/// A smooth gradient, which survives JPEG round trips without surprises.
pub fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            128,
        ])
    })
}

pub fn write_png(dir: &Path, name: &str, img: &RgbImage) -> PathBuf {
    let path = dir.join(name);
    img.save(&path).unwrap();
    path
}

pub fn encode_png(img: &RgbImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

pub fn scale_nearest(img: &RgbImage, factor: u32) -> RgbImage {
    imageops::resize(
        img,
        img.width() * factor,
        img.height() * factor,
        FilterType::Nearest,
    )
}

/// Names of all entries in a directory.
pub fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
