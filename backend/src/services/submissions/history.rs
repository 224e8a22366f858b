use crate::db::submissions;
use crate::error::Result;
use crate::state::AppState;
use actix_web::{web, HttpResponse};

pub async fn process(state: web::Data<AppState>, path: web::Path<i64>) -> Result<HttpResponse> {
    let project_id = path.into_inner();
    let history = state
        .db
        .run(move |conn| submissions::list_history(conn, project_id))
        .await?;
    Ok(HttpResponse::Ok().json(history))
}
