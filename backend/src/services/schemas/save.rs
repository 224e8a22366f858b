//! `POST /api/projects/{project_id}/schemas`
//!
//! The posted structure is parsed into typed column descriptors and checked
//! before anything is stored; a malformed structure never consumes a version
//! number. Saves for one project are serialized through the schema lock and
//! a version collision is retried against the newly observed maximum.

use crate::db::schemas;
use crate::error::{Error, Result};
use crate::state::AppState;
use crate::validation::structure::parse_structure;
use actix_web::{web, HttpResponse};
use common::requests::{SaveSchemaRequest, SaveSchemaResponse};
use log::warn;

const MAX_ATTEMPTS: usize = 3;

pub async fn process(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    req: web::Json<SaveSchemaRequest>,
) -> Result<HttpResponse> {
    let project_id = path.into_inner();
    let structure = parse_structure(req.into_inner().structure)?;

    let _guard = state.schema_locks.lock(project_id).await;
    let mut attempt = 1;
    let version = loop {
        let structure = structure.clone();
        let saved = state
            .db
            .run(move |conn| schemas::create_version(conn, project_id, &structure))
            .await;
        match saved {
            Err(Error::Conflict(detail)) if attempt < MAX_ATTEMPTS => {
                warn!("project {}: {}, retrying", project_id, detail);
                attempt += 1;
            }
            other => break other?,
        }
    };
    Ok(HttpResponse::Ok().json(SaveSchemaResponse { version }))
}
