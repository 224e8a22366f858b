use crate::db::projects;
use crate::error::Result;
use crate::state::AppState;
use actix_web::{web, HttpResponse};

/// `DELETE /api/projects/{project_id}`; schema versions and submissions go
/// with the project. Stored raw uploads are left in the upload directory.
pub async fn process(state: web::Data<AppState>, path: web::Path<i64>) -> Result<HttpResponse> {
    let project_id = path.into_inner();
    state
        .db
        .run(move |conn| projects::delete(conn, project_id))
        .await?;
    Ok(HttpResponse::NoContent().finish())
}
