//! `PUT|PATCH /api/projects/{project_id}`
//!
//! Applies `{name?, download_password?}` in one transaction. The response is
//! the updated project record; the password is never echoed back.

use crate::db::projects;
use crate::error::Result;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use common::requests::UpdateProjectRequest;

pub async fn process(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    req: web::Json<UpdateProjectRequest>,
) -> Result<HttpResponse> {
    let project_id = path.into_inner();
    let req = req.into_inner();
    let project = state
        .db
        .run(move |conn| projects::update(conn, project_id, &req))
        .await?;
    Ok(HttpResponse::Ok().json(project))
}
