use crate::db::schemas;
use crate::error::Result;
use crate::state::AppState;
use actix_web::{web, HttpResponse};

/// `GET /api/projects/{project_id}/schemas/{version}`; used to audit a past
/// submission against the rules it was checked with.
pub async fn process(
    state: web::Data<AppState>,
    path: web::Path<(i64, i64)>,
) -> Result<HttpResponse> {
    let (project_id, version) = path.into_inner();
    let schema = state
        .db
        .run(move |conn| schemas::get_version(conn, project_id, version))
        .await?;
    Ok(HttpResponse::Ok().json(schema))
}
