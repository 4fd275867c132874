use std::str::FromStr;
use std::sync::Arc;

use axum::extract::multipart::{Field, MultipartError};
use axum::extract::{FromRequest, Multipart, Path, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::Response;
use axum::Json;

use crate::api::response::{upload_result, ApiError, AppForm, JSend};
use crate::upload::{CombineRequest, FilePart, UploadRequest};
use crate::AppState;

// ============================================================================
// Handlers
// ============================================================================

/// Receive a whole file or one fragment of a chunked upload.
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Response, ApiError> {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    // Non-multipart bodies are left unread; the coordinator rejects them.
    let upload = match content_type.as_deref() {
        Some(ct) if ct.trim().to_lowercase().starts_with("multipart/") => {
            let multipart = Multipart::from_request(request, &state)
                .await
                .map_err(|e| ApiError::bad_request(format!("Invalid multipart data: {}", e.body_text())))?;
            read_upload_request(multipart, &state.config.upload.input_field_name).await?
        }
        _ => UploadRequest::default(),
    };

    let uuid = upload.uuid.clone();
    let result = state
        .uploads
        .handle_upload(content_type.as_deref(), upload)
        .await;

    Ok(upload_result(uuid, result))
}

/// Finalize a chunked upload once every fragment has been sent.
pub async fn combine_upload(
    State(state): State<Arc<AppState>>,
    AppForm(request): AppForm<CombineRequest>,
) -> Response {
    let uuid = request.uuid.clone();
    let result = state.uploads.combine(request).await;
    upload_result(uuid, result)
}

pub async fn delete_upload(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
) -> Result<Json<JSend<()>>, ApiError> {
    state.uploads.delete(&uuid).await?;
    Ok(JSend::success(()))
}

// ============================================================================
// Helpers
// ============================================================================

async fn read_upload_request(
    mut multipart: Multipart,
    input_field_name: &str,
) -> Result<UploadRequest, ApiError> {
    let mut upload = UploadRequest::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            name if name == input_field_name => {
                let file_name = field.file_name().map(|s| s.to_string());
                let content_type = field.content_type().map(|s| s.to_string());
                let data = field.bytes().await.map_err(multipart_error)?;
                upload.file = Some(FilePart {
                    file_name,
                    content_type,
                    data,
                });
            }
            "qqfilename" => {
                upload.filename = Some(text_field(field, "qqfilename").await?);
            }
            "qquuid" => {
                upload.uuid = text_field(field, "qquuid").await?;
            }
            "qqtotalparts" => {
                upload.total_parts = number_field(field, "qqtotalparts").await?;
            }
            "qqpartindex" => {
                upload.part_index = number_field(field, "qqpartindex").await?;
            }
            "qqtotalfilesize" => {
                upload.total_file_size = Some(number_field(field, "qqtotalfilesize").await?);
            }
            _ => {
                // Ignore unknown fields (qqpartbyteoffset, qqchunksize, ...)
            }
        }
    }

    Ok(upload)
}

async fn text_field(field: Field<'_>, name: &str) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid {name}: {e}")))
}

async fn number_field<T: FromStr>(field: Field<'_>, name: &str) -> Result<T, ApiError> {
    let text = text_field(field, name).await?;
    text.trim()
        .parse()
        .map_err(|_| ApiError::bad_request(format!("{name} must be a non-negative integer")))
}

fn multipart_error(e: MultipartError) -> ApiError {
    let status = e.status();
    ApiError::Fail(status, format!("Invalid multipart data: {}", e.body_text()))
}
