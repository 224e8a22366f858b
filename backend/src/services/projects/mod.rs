//! # Project Registry Service
//!
//! Routes under `/api/projects` for creating, listing, updating and deleting
//! projects. No response ever carries the download password or its hash.
//!
//! ## Sub-modules:
//! - `list`: all projects, oldest first.
//! - `create`: registers a project under a unique, trimmed name.
//! - `get`: one project with its current schema version.
//! - `update`: renames a project and/or replaces its download password.
//! - `delete`: removes a project with its schemas and submissions.

mod create;
mod delete;
mod get;
mod list;
mod update;

use actix_web::web::{delete, get, patch, post, put, scope};
use actix_web::Scope;

const API_PATH: &str = "/api/projects";

/// Configures and returns the Actix `Scope` for project routes.
///
/// Must be registered after the nested project scopes (schemas, submissions,
/// download), since its prefix matches their paths as well.
pub fn configure_routes() -> Scope {
    scope(API_PATH)
        .route("", get().to(list::process))
        .route("", post().to(create::process))
        .route("/{project_id}", get().to(get::process))
        .route("/{project_id}", put().to(update::process))
        .route("/{project_id}", patch().to(update::process))
        .route("/{project_id}", delete().to(delete::process))
}
