//! HTTP surface. One sub-module per resource, each exposing
//! `configure_routes()`; one file per operation.

pub mod export;
pub mod health;
pub mod jobs;
mod multipart;
pub mod projects;
pub mod schemas;
pub mod submissions;

use crate::error::Error;
use actix_web::web::{self, ServiceConfig};

/// Bytes accepted in a JSON request body.
const JSON_LIMIT: usize = 10 * 1024 * 1024;

/// Registers every scope. Nested project scopes come before `/api/projects`.
pub fn routes(cfg: &mut ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().limit(JSON_LIMIT).error_handler(
        |err, _req| Error::invalid(format!("invalid JSON body: {}", err)).into(),
    ))
    .service(schemas::configure_routes())
    .service(submissions::configure_routes())
    .service(export::configure_routes())
    .service(projects::configure_routes())
    .service(jobs::configure_routes())
    .service(health::configure_routes());
}
