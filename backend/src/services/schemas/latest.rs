use crate::db::schemas;
use crate::error::Result;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use common::requests::LatestSchemaResponse;

/// `GET /api/projects/{project_id}/schemas/latest`
pub async fn process(state: web::Data<AppState>, path: web::Path<i64>) -> Result<HttpResponse> {
    let project_id = path.into_inner();
    let latest = state
        .db
        .run(move |conn| schemas::get_latest(conn, project_id))
        .await?;
    Ok(HttpResponse::Ok().json(LatestSchemaResponse {
        version: latest.version,
        structure: latest.structure,
    }))
}
