use crate::db::projects;
use crate::error::Result;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use common::requests::CreateProjectRequest;

/// `POST /api/projects`
///
/// New projects start with the configured default download password; the PI
/// is expected to replace it through the update endpoint.
pub async fn process(
    state: web::Data<AppState>,
    req: web::Json<CreateProjectRequest>,
) -> Result<HttpResponse> {
    let name = req.into_inner().name;
    let default_password = state.config.default_download_password.clone();
    let project = state
        .db
        .run(move |conn| projects::create(conn, &name, &default_password))
        .await?;
    Ok(HttpResponse::Ok().json(project))
}
