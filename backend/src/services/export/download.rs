use crate::error::{Error, Result};
use crate::export;
use crate::services::multipart::{field_name, read_text, skip};
use crate::state::AppState;
use actix_multipart::Multipart;
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{web, Either, HttpResponse};
use common::model::report::FieldError;
use common::requests::DownloadRequest;
use futures_util::StreamExt;

type PasswordBody =
    Either<Either<web::Json<DownloadRequest>, web::Form<DownloadRequest>>, Multipart>;

/// Answers `403` for a wrong password (or an unknown project), `400` when
/// nothing validated is available yet, otherwise the CSV stream as an
/// attachment named `project_{id}_{slug}_merged.csv`.
pub async fn process(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    body: PasswordBody,
) -> Result<HttpResponse> {
    let project_id = path.into_inner();
    let password = match body {
        Either::Left(Either::Left(json)) => json.into_inner().password,
        Either::Left(Either::Right(form)) => form.into_inner().password,
        Either::Right(multipart) => read_password(multipart).await?,
    };

    let started = export::export(state.into_inner(), project_id, password).await?;
    Ok(HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(started.filename)],
        })
        .streaming(started.body))
}

fn password_missing() -> Error {
    Error::invalid_fields(
        "a password is required",
        vec![FieldError::new(
            "password",
            "send it as JSON, an urlencoded form or a multipart form field",
        )],
    )
}

/// Picks the `password` part out of a `multipart/form-data` body.
///
/// Anything that is neither JSON nor a form ends up here, so a body that is
/// not multipart either is reported as a missing password.
async fn read_password(mut payload: Multipart) -> Result<String> {
    let mut password = None;
    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|_| password_missing())?;
        if field_name(&field).as_deref() == Some("password") {
            password = Some(read_text(&mut field, "password").await?);
        } else {
            skip(&mut field).await?;
        }
    }
    password.ok_or_else(password_missing)
}
