//! HTTP surface
//!
//! Routes: upload ingestion, job status and cancellation, byte streaming
//! with range support, the HLS placeholder playlist, health, and metrics.
//! The requesting user arrives in `x-user-id` (upstream auth terminates
//! before this service).

use std::sync::Arc;
use std::time::Instant;

use account_pool::AccountPool;
use axum::Router;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use bytes::Bytes;
use metrics_exporter_prometheus::PrometheusHandle;
use provider::Catalog;
use serde::Deserialize;
use tracing::info;

use crate::error::Error;
use crate::hls;
use crate::ingest::{FileMeta, IngestOptions, Ingestor};
use crate::jobs::JobRegistry;
use crate::sessions::SessionRegistry;
use crate::stream::{OpenedStream, Streamer};

/// Shared application state accessible from all handlers
#[derive(Clone)]
pub struct AppState {
    pub ingestor: Arc<Ingestor>,
    pub streamer: Arc<Streamer>,
    pub jobs: Arc<JobRegistry>,
    pub sessions: Arc<SessionRegistry>,
    pub pool: Arc<AccountPool>,
    pub catalog: Arc<dyn Catalog>,
    pub segment_size: u64,
    pub started_at: Instant,
    pub prometheus: PrometheusHandle,
}

/// Build the axum router with all routes and shared state.
///
/// A concurrency limit layer enforces `max_connections` across the whole
/// surface.
pub fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/files", axum::routing::post(upload_handler))
        .route(
            "/uploads/{id}",
            get(job_status_handler).delete(job_cancel_handler),
        )
        .route("/stream/{file_id}", get(stream_handler))
        .route("/stream/{file_id}/playlist.m3u8", get(playlist_handler))
        .route("/stream/{file_id}/segment/{n}", get(segment_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

fn user_id(headers: &HeaderMap) -> Option<&str> {
    headers.get("x-user-id").and_then(|v| v.to_str().ok())
}

#[derive(Debug, Deserialize)]
struct UploadQuery {
    name: String,
    #[serde(default)]
    is_public: bool,
    folder_id: Option<String>,
    description: Option<String>,
    #[serde(default)]
    generate_thumbnail: bool,
    #[serde(default)]
    process_video: bool,
    target_resolution: Option<String>,
    target_bitrate: Option<String>,
    target_frame_rate: Option<u32>,
}

/// POST /files — run one upload through the ingestion pipeline.
///
/// The response carries both the job id and the created file record; on
/// failure the job id travels in `x-job-id` so the caller can still query
/// the failed job.
async fn upload_handler(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(owner_id) = user_id(&headers) else {
        return Error::InvalidRequest("x-user-id header required".into()).into_response();
    };
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    let meta = FileMeta {
        name: query.name.clone(),
        content_type,
        owner_id: owner_id.to_string(),
        is_public: query.is_public,
        folder_id: query.folder_id,
        description: query.description,
    };
    let options = IngestOptions {
        generate_thumbnail: query.generate_thumbnail,
        process_video: query.process_video,
        target_resolution: query.target_resolution,
        target_bitrate: query.target_bitrate,
        target_frame_rate: query.target_frame_rate,
    };

    let job_id = state.jobs.create(&query.name, body.len() as u64).await;
    info!(job_id = %job_id, name = %query.name, size = body.len(), "upload accepted");

    match state
        .ingestor
        .ingest(&job_id, body, meta, options, None)
        .await
    {
        Ok(record) => (
            StatusCode::CREATED,
            [(header::CONTENT_TYPE, "application/json")],
            serde_json::json!({
                "job_id": job_id,
                "file": {
                    "file_id": record.file_id,
                    "name": record.name,
                    "size": record.size,
                    "content_type": record.content_type,
                    "is_public": record.is_public,
                    "content_link": record.content_link,
                    "duration_secs": record.media.duration_secs,
                    "width": record.media.width,
                    "height": record.media.height,
                    "bitrate": record.media.bitrate,
                    "frame_rate": record.media.frame_rate,
                    "thumbnail_link": record.thumbnail_link,
                },
            })
            .to_string(),
        )
            .into_response(),
        Err(e) => {
            let mut response = e.into_response();
            if let Ok(value) = job_id.parse() {
                response.headers_mut().insert("x-job-id", value);
            }
            response
        }
    }
}

/// GET /uploads/{id}
async fn job_status_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, Error> {
    let job = state
        .jobs
        .status(&id)
        .await
        .ok_or_else(|| Error::NotFound(format!("job {id}")))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        serde_json::json!({
            "job_id": job.id,
            "stage": job.stage.label(),
            "progress": job.progress,
            "original_name": job.original_name,
            "declared_size": job.declared_size,
            "account": job.account_name,
            "file_id": job.file_id,
            "error": job.error,
        })
        .to_string(),
    )
        .into_response())
}

/// DELETE /uploads/{id} — cancel a non-terminal job.
async fn job_cancel_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, Error> {
    if state.jobs.cancel(&id).await {
        return Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            serde_json::json!({ "job_id": id, "status": "cancelled" }).to_string(),
        )
            .into_response());
    }
    // A terminal job refuses cancellation; anything else is unknown
    if state.jobs.status(&id).await.is_some() {
        return Ok((
            StatusCode::CONFLICT,
            [(header::CONTENT_TYPE, "application/json")],
            serde_json::json!({
                "error": { "type": "job_finished", "message": "job already finished" }
            })
            .to_string(),
        )
            .into_response());
    }
    Err(Error::NotFound(format!("job {id}")))
}

/// Body response for an opened stream: 200 for a full read, 206 with
/// `Content-Range` for a partial one.
fn stream_response(opened: OpenedStream) -> Response {
    let mut builder = Response::builder()
        .header(header::CONTENT_TYPE, opened.content_type.as_str())
        .header(header::ACCEPT_RANGES, "bytes");

    builder = match opened.range {
        Some(spec) => builder
            .status(StatusCode::PARTIAL_CONTENT)
            .header(header::CONTENT_RANGE, spec.content_range(opened.total))
            .header(header::CONTENT_LENGTH, spec.content_length),
        None => builder
            .status(StatusCode::OK)
            .header(header::CONTENT_LENGTH, opened.total),
    };

    builder
        .body(Body::from_stream(opened.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// GET /stream/{file_id}
async fn stream_handler(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, Error> {
    let range = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
    let opened = state
        .streamer
        .open_stream(&file_id, range, user_id(&headers))
        .await?;
    Ok(stream_response(opened))
}

/// GET /stream/{file_id}/playlist.m3u8
async fn playlist_handler(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, Error> {
    let record = state
        .catalog
        .lookup(&file_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("file {file_id}")))?;
    if !record.is_public {
        let user = user_id(&headers).ok_or(Error::PermissionDenied)?;
        if !state.catalog.has_permission(&file_id, user).await? {
            return Err(Error::PermissionDenied);
        }
    }

    let manifest = hls::build_placeholder_manifest(&file_id, "");
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/vnd.apple.mpegurl")],
        manifest,
    )
        .into_response())
}

/// GET /stream/{file_id}/segment/{n} — serve one pseudo-segment as a range
/// read over the stored object.
async fn segment_handler(
    State(state): State<AppState>,
    Path((file_id, n)): Path<(String, u64)>,
    headers: HeaderMap,
) -> Result<Response, Error> {
    let record = state
        .catalog
        .lookup(&file_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("file {file_id}")))?;

    let spec = hls::segment_range(n, state.segment_size, record.size)
        .ok_or_else(|| Error::NotFound(format!("segment {n} of file {file_id}")))?;
    let range_header = hls::segment_range_header(&spec);

    let opened = state
        .streamer
        .open_stream(&file_id, Some(&range_header), user_id(&headers))
        .await?;
    Ok(stream_response(opened))
}

/// GET /health — pool snapshot plus service counters. 503 only when the
/// pool reports unhealthy.
async fn health_handler(State(state): State<AppState>) -> Response {
    let pool = state.pool.snapshot().await;
    let status = pool
        .get("status")
        .and_then(|s| s.as_str())
        .unwrap_or("unhealthy")
        .to_string();

    let status_code = if status == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    let body = serde_json::json!({
        "status": status,
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "active_jobs": state.jobs.active_count().await,
        "active_streams": state.sessions.active_count().await,
        "pool": pool,
    });

    (
        status_code,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// GET /metrics — Prometheus text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::ingest::IngestSettings;
    use crate::media::{MediaInfo, MediaProcessor, MediaResult, TranscodeParams};
    use account_pool::{AccountDefaults, AccountRecord, CredentialFile, PoolConfig};
    use axum::http::Request;
    use provider::{BoxFuture, MemoryCatalog, MemoryStore};
    use std::time::Duration;
    use tower::ServiceExt;

    /// Media processor that succeeds without touching ffmpeg.
    struct NullMedia;

    impl MediaProcessor for NullMedia {
        fn probe<'a>(
            &'a self,
            _input: &'a std::path::Path,
        ) -> BoxFuture<'a, MediaResult<MediaInfo>> {
            Box::pin(async {
                Ok(MediaInfo {
                    duration_secs: Some(30.0),
                    width: Some(1280),
                    height: Some(720),
                    bitrate: Some(2_000_000),
                    frame_rate: Some(24.0),
                })
            })
        }

        fn thumbnail<'a>(
            &'a self,
            _input: &'a std::path::Path,
            output: &'a std::path::Path,
            _offset_secs: f64,
        ) -> BoxFuture<'a, MediaResult<()>> {
            Box::pin(async move {
                tokio::fs::write(output, b"jpeg").await?;
                Ok(())
            })
        }

        fn transcode<'a>(
            &'a self,
            input: &'a std::path::Path,
            output: &'a std::path::Path,
            _params: &'a TranscodeParams,
        ) -> BoxFuture<'a, MediaResult<()>> {
            Box::pin(async move {
                tokio::fs::copy(input, output).await?;
                Ok(())
            })
        }
    }

    fn account(name: &str, quota: u64) -> AccountRecord {
        AccountRecord::from_credential(
            name.to_string(),
            CredentialFile {
                client_email: format!("{name}@accounts.example"),
                private_key: "pk".into(),
                name: None,
                scopes: vec![],
                quota_limit: Some(quota),
                priority: None,
                weight: None,
                requests_per_minute: None,
            },
            &AccountDefaults::default(),
        )
    }

    fn test_prometheus_handle() -> PrometheusHandle {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        recorder.handle()
    }

    struct TestApp {
        state: AppState,
        _arena_root: tempfile::TempDir,
    }

    impl TestApp {
        fn new(quota: u64) -> Self {
            let pool = Arc::new(AccountPool::new(
                vec![account("acct-1", quota)],
                PoolConfig::default(),
            ));
            let store = Arc::new(MemoryStore::new());
            let catalog = Arc::new(MemoryCatalog::new());
            let jobs = Arc::new(JobRegistry::new());
            let sessions = Arc::new(SessionRegistry::new());
            let arena_root = tempfile::tempdir().unwrap();

            let ingestor = Arc::new(Ingestor::new(
                pool.clone(),
                store.clone(),
                catalog.clone(),
                jobs.clone(),
                Arc::new(NullMedia),
                Arena::new(arena_root.path().to_path_buf()),
                IngestSettings {
                    chunk_threshold: 1024 * 1024,
                    chunk_size: 64 * 1024,
                    progress_cadence: Duration::from_millis(0),
                    thumbnail_offset_secs: 5.0,
                    transfer_retry_attempts: 0,
                },
            ));
            let streamer = Arc::new(Streamer::new(
                pool.clone(),
                store,
                catalog.clone(),
                sessions.clone(),
                64 * 1024,
                false,
            ));

            let state = AppState {
                ingestor,
                streamer,
                jobs,
                sessions,
                pool,
                catalog,
                segment_size: 100,
                started_at: Instant::now(),
                prometheus: test_prometheus_handle(),
            };
            Self {
                state,
                _arena_root: arena_root,
            }
        }

        fn router(&self) -> Router {
            build_router(self.state.clone(), 1000)
        }
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), 16 * 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    async fn raw_body(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), 16 * 1024 * 1024)
            .await
            .unwrap()
            .to_vec()
    }

    fn upload_request(name: &str, payload: &[u8]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(format!("/files?name={name}&is_public=true"))
            .header("x-user-id", "alice")
            .header("content-type", "application/octet-stream")
            .body(Body::from(payload.to_vec()))
            .unwrap()
    }

    #[tokio::test]
    async fn upload_status_stream_roundtrip() {
        let app = TestApp::new(1_000_000);
        let router = app.router();
        let payload: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();

        let response = router
            .clone()
            .oneshot(upload_request("blob.bin", &payload))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let json = json_body(response).await;
        let job_id = json["job_id"].as_str().unwrap().to_string();
        let file_id = json["file"]["file_id"].as_str().unwrap().to_string();
        assert_eq!(json["file"]["size"], 5000);

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/uploads/{job_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["stage"], "completed");
        assert_eq!(json["progress"], 100.0);
        assert_eq!(json["account"], "acct-1");

        let response = router
            .oneshot(
                Request::builder()
                    .uri(format!("/stream/{file_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::ACCEPT_RANGES], "bytes");
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "5000");
        assert_eq!(raw_body(response).await, payload);
    }

    #[tokio::test]
    async fn video_upload_response_carries_media_metadata() {
        let app = TestApp::new(1_000_000);
        let response = app
            .router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/files?name=clip.mp4&is_public=true&generate_thumbnail=true")
                    .header("x-user-id", "alice")
                    .header("content-type", "video/mp4")
                    .body(Body::from(vec![9u8; 400]))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let json = json_body(response).await;
        assert_eq!(json["file"]["duration_secs"], 30.0);
        assert_eq!(json["file"]["width"], 1280);
        assert_eq!(json["file"]["height"], 720);
        assert_eq!(json["file"]["bitrate"], 2_000_000);
        assert_eq!(json["file"]["frame_rate"], 24.0);
        let content_link = json["file"]["content_link"].as_str().unwrap();
        let thumbnail_link = json["file"]["thumbnail_link"].as_str().unwrap();
        assert!(content_link.starts_with("memory://"));
        assert!(thumbnail_link.starts_with("memory://"));
        assert_ne!(content_link, thumbnail_link);
    }

    #[tokio::test]
    async fn upload_requires_user_header() {
        let app = TestApp::new(1_000_000);
        let response = app
            .router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/files?name=a.bin")
                    .body(Body::from("data"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(json["error"]["type"], "invalid_request");
    }

    #[tokio::test]
    async fn upload_beyond_capacity_returns_507_with_job_id() {
        let app = TestApp::new(100);
        let response = app
            .router()
            .oneshot(upload_request("big.bin", &[0u8; 500]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INSUFFICIENT_STORAGE);
        assert!(response.headers().contains_key("x-job-id"));
        let json = json_body(response).await;
        assert_eq!(json["error"]["type"], "capacity_exhausted");
    }

    #[tokio::test]
    async fn unknown_job_status_is_404() {
        let app = TestApp::new(1_000_000);
        let response = app
            .router()
            .oneshot(
                Request::builder()
                    .uri("/uploads/job_missing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cancel_finished_job_conflicts() {
        let app = TestApp::new(1_000_000);
        let router = app.router();

        let response = router
            .clone()
            .oneshot(upload_request("a.bin", b"hello"))
            .await
            .unwrap();
        let json = json_body(response).await;
        let job_id = json["job_id"].as_str().unwrap().to_string();

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/uploads/{job_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = router
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/uploads/job_missing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn range_request_returns_206_with_content_range() {
        let app = TestApp::new(1_000_000);
        let router = app.router();
        let payload: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();

        let response = router
            .clone()
            .oneshot(upload_request("blob.bin", &payload))
            .await
            .unwrap();
        let file_id = json_body(response).await["file"]["file_id"]
            .as_str()
            .unwrap()
            .to_string();

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/stream/{file_id}"))
                    .header(header::RANGE, "bytes=100-199")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            response.headers()[header::CONTENT_RANGE],
            "bytes 100-199/1000"
        );
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "100");
        assert_eq!(raw_body(response).await, &payload[100..200]);

        // Unsatisfiable start → 416 advertising the full size
        let response = router
            .oneshot(
                Request::builder()
                    .uri(format!("/stream/{file_id}"))
                    .header(header::RANGE, "bytes=5000-6000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */1000");
    }

    #[tokio::test]
    async fn streaming_unknown_file_is_404() {
        let app = TestApp::new(1_000_000);
        let response = app
            .router()
            .oneshot(
                Request::builder()
                    .uri("/stream/file-missing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn playlist_and_segments() {
        let app = TestApp::new(1_000_000);
        let router = app.router();
        // 250 bytes with segment_size 100: segments 0-2 exist, 3 does not
        let payload: Vec<u8> = (0..250u32).map(|i| (i % 251) as u8).collect();

        let response = router
            .clone()
            .oneshot(upload_request("clip.mp4", &payload))
            .await
            .unwrap();
        let file_id = json_body(response).await["file"]["file_id"]
            .as_str()
            .unwrap()
            .to_string();

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/stream/{file_id}/playlist.m3u8"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/vnd.apple.mpegurl"
        );
        let manifest = String::from_utf8(raw_body(response).await).unwrap();
        assert!(manifest.starts_with("#EXTM3U"));
        assert_eq!(manifest.matches("#EXTINF").count(), 3);

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/stream/{file_id}/segment/1"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            response.headers()[header::CONTENT_RANGE],
            "bytes 100-199/250"
        );
        assert_eq!(raw_body(response).await, &payload[100..200]);

        let response = router
            .oneshot(
                Request::builder()
                    .uri(format!("/stream/{file_id}/segment/3"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn private_file_playlist_requires_permission() {
        let app = TestApp::new(1_000_000);
        let router = app.router();

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/files?name=secret.mp4")
                    .header("x-user-id", "alice")
                    .body(Body::from(vec![1u8; 100]))
                    .unwrap(),
            )
            .await
            .unwrap();
        let file_id = json_body(response).await["file"]["file_id"]
            .as_str()
            .unwrap()
            .to_string();

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/stream/{file_id}/playlist.m3u8"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = router
            .oneshot(
                Request::builder()
                    .uri(format!("/stream/{file_id}/playlist.m3u8"))
                    .header("x-user-id", "alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn health_reports_pool_and_counters() {
        let app = TestApp::new(1_000_000);
        let response = app
            .router()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["active_jobs"], 0);
        assert_eq!(json["active_streams"], 0);
        assert!(json["uptime_seconds"].is_u64());
        assert_eq!(json["pool"]["accounts"][0]["name"], "acct-1");
    }

    #[tokio::test]
    async fn health_degrades_when_pool_is_unusable() {
        let app = TestApp::new(1_000_000);

        // Quarantine the only account
        for _ in 0..5 {
            let lease = app.state.pool.lease_account("acct-1").await.unwrap();
            app.state.pool.record_error(lease, "boom").await;
        }

        let response = app
            .router()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = json_body(response).await;
        assert_eq!(json["status"], "unhealthy");
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_prometheus_format() {
        let app = TestApp::new(1_000_000);
        let response = app
            .router()
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.contains("text/plain"));
    }
}
