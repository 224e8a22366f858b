//! # Schema Store Service
//!
//! Routes under `/api/projects/{project_id}/schemas`:
//!
//! - `POST ""`: saves a structure as the project's next version (`save`).
//! - `GET "/latest"`: the current version and its structure (`latest`).
//! - `GET "/{version}"`: a historical version (`get_version`).
//!
//! A project without any saved schema answers `404` with reason `schema`,
//! an unknown project with reason `project`.

mod get_version;
mod latest;
mod save;

use actix_web::web::{get, post, scope};
use actix_web::Scope;

const API_PATH: &str = "/api/projects/{project_id}/schemas";

pub fn configure_routes() -> Scope {
    scope(API_PATH)
        .route("", post().to(save::process))
        .route("/", post().to(save::process))
        .route("/latest", get().to(latest::process))
        .route("/{version}", get().to(get_version::process))
}
