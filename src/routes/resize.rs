//! Resize endpoint
//!
//! `POST /resize` takes a multipart form with a `file` field and an optional
//! `max_side` field. `max_side` may also be passed in the query string; the
//! form value wins when both are present and non-empty.

use axum::{
    body::Bytes,
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde::Deserialize;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::ResizeError;
use crate::resize::{self, MaxSide};
use crate::state::AppState;

/// Query parameters for `POST /resize`
#[derive(Debug, Default, Deserialize)]
pub struct ResizeQuery {
    pub max_side: Option<String>,
}

/// Fields pulled out of the multipart body
#[derive(Debug, Default)]
struct UploadForm {
    file: Option<Bytes>,
    max_side: Option<String>,
}

/// Create the resize router
pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/resize", post(resize_upload))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}

/// POST /resize
async fn resize_upload(
    State(state): State<AppState>,
    Query(query): Query<ResizeQuery>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ResizeError> {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("resize", %request_id);

    async move {
        let multipart = multipart.map_err(|rejection| {
            tracing::debug!(%rejection, "Request is not a multipart upload");
            ResizeError::MissingFile
        })?;

        let form = read_form(multipart).await?;

        let data = form.file.ok_or(ResizeError::MissingFile)?;
        if data.is_empty() {
            return Err(ResizeError::EmptyUpload);
        }

        let max_side = MaxSide::resolve(
            [form.max_side.as_deref(), query.max_side.as_deref()],
            state.config().resize.default_max_side,
        )?;

        let input_bytes = data.len();
        let backend = state.pdf_backend();
        let span = tracing::Span::current();

        let result = tokio::task::spawn_blocking(move || {
            span.in_scope(|| resize::resize(&data, max_side, backend.as_ref()))
        })
        .await
        .map_err(|e| ResizeError::Internal(format!("Task join error: {}", e)))??;

        tracing::info!(
            max_side = max_side.get(),
            input_bytes,
            output_bytes = result.data.len(),
            mime_type = result.mime_type,
            "Upload resized"
        );

        let disposition = format!("inline; filename=\"{}\"", result.file_name());
        Ok((
            [
                (header::CONTENT_TYPE, result.mime_type.to_string()),
                (header::CONTENT_DISPOSITION, disposition),
            ],
            result.data,
        )
            .into_response())
    }
    .instrument(span)
    .await
}

/// Drain the multipart body, keeping the first `file` and `max_side` fields
async fn read_form(mut multipart: Multipart) -> Result<UploadForm, ResizeError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" if form.file.is_none() => {
                tracing::debug!(
                    filename = ?field.file_name(),
                    content_type = ?field.content_type(),
                    "Reading upload"
                );
                form.file = Some(field.bytes().await?);
            }
            "max_side" if form.max_side.is_none() => {
                form.max_side = Some(field.text().await?);
            }
            _ => {
                tracing::debug!(name = %name, "Ignoring multipart field");
            }
        }
    }

    Ok(form)
}
