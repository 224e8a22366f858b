use crate::db::projects;
use crate::error::Result;
use crate::state::AppState;
use actix_web::{web, HttpResponse};

pub async fn process(state: web::Data<AppState>, path: web::Path<i64>) -> Result<HttpResponse> {
    let project_id = path.into_inner();
    let project = state
        .db
        .run(move |conn| projects::get(conn, project_id))
        .await?;
    Ok(HttpResponse::Ok().json(project))
}
