use crate::db::submissions;
use crate::error::Result;
use crate::state::AppState;
use actix_web::{web, HttpResponse};

/// `GET /api/projects/{project_id}/submissions`: the current status of every
/// center as shown to the PI.
pub async fn process(state: web::Data<AppState>, path: web::Path<i64>) -> Result<HttpResponse> {
    let project_id = path.into_inner();
    let active = state
        .db
        .run(move |conn| submissions::list_active(conn, project_id))
        .await?;
    Ok(HttpResponse::Ok().json(active))
}
