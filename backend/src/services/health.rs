use crate::error::{Error, Result};
use crate::state::AppState;
use actix_web::web::{get, scope};
use actix_web::{web, HttpResponse, Scope};
use log::error;
use serde_json::json;

pub fn configure_routes() -> Scope {
    scope("/health").route("", get().to(process))
}

/// Database connectivity probe.
async fn process(state: web::Data<AppState>) -> HttpResponse {
    let db = state.db.clone();
    let probe: Result<()> = web::block(move || db.ping())
        .await
        .map_err(Error::from)
        .and_then(|ping| ping);
    match probe {
        Ok(()) => HttpResponse::Ok().json(json!({ "status": "ok" })),
        Err(e) => {
            error!("health check failed: {}", e);
            HttpResponse::ServiceUnavailable().json(json!({ "status": "unavailable" }))
        }
    }
}
