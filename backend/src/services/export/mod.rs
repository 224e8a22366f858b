//! # Merged Export Service
//!
//! `POST /api/projects/{project_id}/download` streams the merged CSV of all
//! active, validated submissions. The password may be sent as a JSON body
//! `{"password": "..."}`, as an urlencoded form field, or as a
//! `multipart/form-data` part named `password`.

mod download;

use actix_web::web::{post, scope};
use actix_web::Scope;

const API_PATH: &str = "/api/projects/{project_id}/download";

pub fn configure_routes() -> Scope {
    scope(API_PATH).route("", post().to(download::process))
}
