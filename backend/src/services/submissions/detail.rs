use crate::db::submissions;
use crate::error::Result;
use crate::state::AppState;
use actix_web::{web, HttpResponse};

pub async fn process(
    state: web::Data<AppState>,
    path: web::Path<(i64, i64)>,
) -> Result<HttpResponse> {
    let (project_id, submission_id) = path.into_inner();
    let detail = state
        .db
        .run(move |conn| submissions::get(conn, project_id, submission_id))
        .await?;
    Ok(HttpResponse::Ok().json(detail))
}
