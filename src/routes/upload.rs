use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::{AppError, AppResult};
use crate::images::{ImageUpload, DEFAULT_FOLDER};
use crate::response::ApiResponse;
use crate::state::AppState;
use crate::storage::MAX_IMAGE_BYTES;

/// Request bodies may exceed the image limit so oversize files reach validation.
pub const UPLOAD_BODY_LIMIT: usize = 10 * 1024 * 1024;

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub url: String,
}

pub async fn upload_image(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<ApiResponse<UploadResponse>> {
    let mut multipart =
        multipart.map_err(|err| AppError::bad_request(format!("invalid multipart data: {err}")))?;

    let mut upload: Option<ImageUpload> = None;
    while let Some(field) = multipart.next_field().await.map_err(|err| {
        error!(error = %err, "invalid multipart data");
        AppError::bad_request(format!("invalid multipart data: {err}"))
    })? {
        if field.name() != Some("file") {
            continue;
        }
        // A `file` field without a filename is a plain form value, not a file.
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field.bytes().await.map_err(|err| {
            error!(error = %err, "failed to read file bytes");
            AppError::bad_request(format!("failed to read file bytes: {err}"))
        })?;
        upload = Some(ImageUpload {
            file_name,
            content_type,
            bytes,
        });
    }

    let upload = upload.ok_or_else(|| AppError::bad_request("No file provided"))?;
    validate_image(&upload)?;

    let file_name = upload.file_name.clone();
    let size = upload.bytes.len();
    let url = state
        .images
        .upload_image(upload, DEFAULT_FOLDER)
        .await
        .map_err(|err| {
            error!(error = %err, file_name = %file_name, "image upload failed");
            AppError::from(err)
        })?;

    info!(file_name = %file_name, size, url = %url, "image upload succeeded");
    Ok(ApiResponse::ok(UploadResponse { url }))
}

/// Checks run before any storage call, in order: image MIME type, then size.
pub fn validate_image(upload: &ImageUpload) -> AppResult<()> {
    if !upload
        .content_type
        .to_ascii_lowercase()
        .starts_with("image/")
    {
        return Err(AppError::bad_request("File must be an image"));
    }
    if upload.bytes.len() as u64 > MAX_IMAGE_BYTES {
        return Err(AppError::bad_request("File size must be less than 5MB"));
    }
    Ok(())
}
