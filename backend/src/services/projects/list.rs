use crate::db::projects;
use crate::error::Result;
use crate::state::AppState;
use actix_web::{web, HttpResponse};

/// `GET /api/projects`
pub async fn process(state: web::Data<AppState>) -> Result<HttpResponse> {
    let projects = state.db.run(|conn| projects::list(conn)).await?;
    Ok(HttpResponse::Ok().json(projects))
}
