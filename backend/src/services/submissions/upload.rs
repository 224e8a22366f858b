//! `POST /api/projects/{project_id}/submissions`
//!
//! Reads the multipart form into an [`Upload`], enforcing the upload size
//! limit while the file part streams in, then hands it to the ledger.

use crate::error::{Error, Result};
use crate::ledger::{self, Upload};
use crate::services::multipart::{field_name, malformed, read_field, read_text, skip};
use crate::state::AppState;
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use common::model::report::FieldError;
use common::model::submission::SubmissionStatus;
use futures_util::StreamExt;

pub async fn process(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    payload: Multipart,
) -> Result<HttpResponse> {
    let project_id = path.into_inner();
    let upload = read_form(payload, state.config.max_upload_bytes).await?;

    let outcome = ledger::submit(state.into_inner(), project_id, upload).await?;
    if outcome.status == SubmissionStatus::Failed {
        return Err(Error::ValidationFailed(Box::new(outcome)));
    }
    Ok(HttpResponse::Ok().json(outcome))
}

async fn read_form(mut payload: Multipart, max_upload_bytes: usize) -> Result<Upload> {
    let mut upload = Upload::default();
    let mut has_file = false;

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(malformed)?;

        match field_name(&field).as_deref() {
            Some("file") => {
                upload.filename = field
                    .content_disposition()
                    .and_then(|cd| cd.get_filename().map(|f| f.to_string()))
                    .unwrap_or_default();
                upload.bytes = read_field(&mut field, max_upload_bytes, "file").await?;
                has_file = true;
            }
            Some("center_name") => {
                upload.center_name = read_text(&mut field, "center_name").await?;
            }
            Some("uploader_name") => {
                upload.uploader_name = Some(read_text(&mut field, "uploader_name").await?);
            }
            // Unknown parts are drained and ignored.
            _ => skip(&mut field).await?,
        }
    }

    if !has_file {
        return Err(Error::invalid_fields(
            "submission form is incomplete or invalid",
            vec![FieldError::new("file", "is required")],
        ));
    }
    Ok(upload)
}
