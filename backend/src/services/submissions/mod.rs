//! # Submission Ledger Service
//!
//! Routes under `/api/projects/{project_id}/submissions`.
//!
//! - `POST ""`: multipart upload with `center_name`, optional `uploader_name`
//!   and a `file` part holding the CSV. The file is validated against the
//!   project's current schema and replaces the center's active submission.
//!   A failed validation answers `422` with the full outcome, so the center
//!   can see what to fix; the attempt is still recorded.
//! - `GET ""`: active submissions, newest first.
//! - `GET "/history"`: every attempt including superseded ones.
//! - `GET "/{submission_id}"`: one submission with its stored report.
//! - `POST "/{submission_id}/revalidate"`: starts a background job that
//!   re-checks the stored rows against the schema version recorded on the
//!   submission; poll `GET /api/jobs/{job_id}`.

mod detail;
mod history;
mod list;
mod revalidate;
mod upload;

use actix_web::web::{get, post, scope};
use actix_web::Scope;

const API_PATH: &str = "/api/projects/{project_id}/submissions";

pub fn configure_routes() -> Scope {
    scope(API_PATH)
        .route("", post().to(upload::process))
        .route("", get().to(list::process))
        // Before `/{submission_id}` so the literal segment wins.
        .route("/history", get().to(history::process))
        .route("/{submission_id}", get().to(detail::process))
        .route("/{submission_id}/revalidate", post().to(revalidate::process))
}
