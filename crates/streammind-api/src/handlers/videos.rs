//! Video upload and job submission handlers.

use std::path::{Path as FsPath, PathBuf};

use axum::extract::multipart::Field;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use streammind_models::{AnalysisJob, JobId, SessionId};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

const VIDEO_FIELD: &str = "video";
const DEFAULT_EXTENSION: &str = ".webm";

/// Extension of the uploaded file name, dot included, falling back to
/// `.webm`. Only short alphanumeric extensions are kept.
fn video_extension(file_name: Option<&str>) -> String {
    file_name
        .and_then(|name| FsPath::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

async fn require_session(state: &AppState, raw: &str) -> ApiResult<SessionId> {
    let session_id = SessionId::parse(raw)?;
    if !state.sessions.exists(&session_id).await {
        return Err(ApiError::not_found(format!("session {}", session_id)));
    }
    Ok(session_id)
}

fn enqueue(state: &AppState, job: AnalysisJob, source: &'static str) -> ApiResult<(JobId, usize)> {
    let job_id = job.job_id.clone();
    let session_id = job.session_id;
    state.queue.enqueue(job)?;

    let depth = state.queue.len();
    metrics::record_job_enqueued(source);
    info!(job_id = %job_id, session_id = %session_id, queue_size = depth, "Enqueued analysis job");
    Ok((job_id, depth))
}

/// Stream a multipart field to `path`, returning the number of bytes written.
async fn write_field(field: &mut Field<'_>, path: &FsPath) -> ApiResult<u64> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut size = 0u64;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?
    {
        file.write_all(&chunk).await?;
        size += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(size)
}

/// Remove a segment that will not be analysed.
async fn discard(path: &FsPath) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), error = %e, "Failed to remove rejected upload");
    }
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub status: &'static str,
    pub session_id: SessionId,
    pub job_id: JobId,
    pub filename: String,
    pub size: u64,
    pub message: String,
}

/// `POST /api/videos/:session_id/upload` (multipart field `video`)
///
/// Streams the segment to `{storage}/{session}/video_{millis}{ext}` and
/// queues it for analysis.
pub async fn upload_video(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<UploadResponse>)> {
    let session_id = require_session(&state, &session_id).await?;

    let mut field = loop {
        match multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?
        {
            Some(field) if field.name() == Some(VIDEO_FIELD) => break field,
            Some(_) => continue,
            None => return Err(ApiError::bad_request("missing multipart field 'video'")),
        }
    };

    let dir = state.config.video_storage_dir.join(session_id.to_string());
    tokio::fs::create_dir_all(&dir).await?;
    let dir = tokio::fs::canonicalize(&dir).await?;

    let filename = format!(
        "video_{}{}",
        Utc::now().timestamp_millis(),
        video_extension(field.file_name())
    );
    let path: PathBuf = dir.join(&filename);

    let size = match write_field(&mut field, &path).await {
        Ok(0) => {
            discard(&path).await;
            return Err(ApiError::bad_request("Video file is empty"));
        }
        Ok(size) => size,
        Err(e) => {
            discard(&path).await;
            return Err(e);
        }
    };
    metrics::record_upload_bytes(size);

    let queued = path
        .to_str()
        .ok_or_else(|| ApiError::internal("storage path is not valid UTF-8"))
        .and_then(|video_path| Ok(AnalysisJob::new(session_id, video_path)?))
        .and_then(|job| enqueue(&state, job, "upload"));
    let job_id = match queued {
        Ok((job_id, _)) => job_id,
        Err(e) => {
            discard(&path).await;
            return Err(e);
        }
    };
    info!(session_id = %session_id, path = %path.display(), size, "Stored video segment");

    Ok((
        StatusCode::ACCEPTED,
        Json(UploadResponse {
            status: "received",
            session_id,
            job_id,
            filename,
            size,
            message: "Video received and queued for analysis".to_string(),
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    pub session_id: String,
    pub video_path: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitJobResponse {
    pub status: &'static str,
    pub job_id: JobId,
    pub queue_size: usize,
}

/// `POST /internal/jobs` - enqueue an already stored segment by path.
pub async fn submit_job(
    State(state): State<AppState>,
    Json(request): Json<SubmitJobRequest>,
) -> ApiResult<(StatusCode, Json<SubmitJobResponse>)> {
    let session_id = require_session(&state, &request.session_id).await?;
    let job = AnalysisJob::new(session_id, request.video_path)?;
    let (job_id, queue_size) = enqueue(&state, job, "internal")?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitJobResponse {
            status: "queued",
            job_id,
            queue_size,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_extension() {
        assert_eq!(video_extension(Some("clip.MP4")), ".mp4");
        assert_eq!(video_extension(Some("segment.webm")), ".webm");
        assert_eq!(video_extension(Some("noext")), ".webm");
        assert_eq!(video_extension(None), ".webm");
        assert_eq!(video_extension(Some("evil.we/../b")), ".webm");
    }
}
