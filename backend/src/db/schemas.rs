//! Schema Store: append-only, numbered schema versions per project.

use crate::db::{is_constraint_violation, projects};
use crate::error::{Error, NotFoundReason, Result};
use crate::validation::structure::check_structure;
use chrono::Utc;
use common::model::schema::{SchemaStructure, SchemaVersion};
use log::info;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

fn row_to_version(row: &Row<'_>) -> rusqlite::Result<(i64, i64, String, chrono::DateTime<Utc>)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn decode(
    (project_id, version, structure, created_at): (i64, i64, String, chrono::DateTime<Utc>),
) -> Result<SchemaVersion> {
    Ok(SchemaVersion {
        project_id,
        version,
        structure: serde_json::from_str(&structure)?,
        created_at,
    })
}

/// Stores `structure` as the project's next version and makes it current.
///
/// Version numbers are allocated inside an immediate transaction, so two
/// concurrent saves can never observe the same maximum. If the primary key
/// still collides the caller gets [`Error::Conflict`] and may retry.
pub fn create_version(
    conn: &mut Connection,
    project_id: i64,
    structure: &SchemaStructure,
) -> Result<i64> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    projects::ensure_exists(&tx, project_id)?;
    check_structure(structure)?;

    let next: i64 = tx.query_row(
        "SELECT COALESCE(MAX(version), 0) + 1 FROM schema_versions WHERE project_id = ?1",
        params![project_id],
        |row| row.get(0),
    )?;
    tx.execute(
        "INSERT INTO schema_versions (project_id, version, structure, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            project_id,
            next,
            serde_json::to_string(structure)?,
            Utc::now()
        ],
    )
    .map_err(|e| {
        if is_constraint_violation(&e) {
            Error::Conflict(format!(
                "schema version {} for project {} was created concurrently",
                next, project_id
            ))
        } else {
            e.into()
        }
    })?;
    tx.execute(
        "UPDATE projects SET current_schema_version = ?1 WHERE id = ?2",
        params![next, project_id],
    )?;
    tx.commit()?;

    info!("project {} schema saved as version {}", project_id, next);
    Ok(next)
}

pub fn get_latest(conn: &Connection, project_id: i64) -> Result<SchemaVersion> {
    projects::ensure_exists(conn, project_id)?;
    let row = conn
        .query_row(
            "SELECT project_id, version, structure, created_at FROM schema_versions
             WHERE project_id = ?1 ORDER BY version DESC LIMIT 1",
            params![project_id],
            row_to_version,
        )
        .optional()?;
    match row {
        Some(row) => decode(row),
        None => Err(Error::not_found(
            NotFoundReason::Schema,
            format!("project {} has no schema yet", project_id),
        )),
    }
}

pub fn get_version(conn: &Connection, project_id: i64, version: i64) -> Result<SchemaVersion> {
    projects::ensure_exists(conn, project_id)?;
    let row = conn
        .query_row(
            "SELECT project_id, version, structure, created_at FROM schema_versions
             WHERE project_id = ?1 AND version = ?2",
            params![project_id, version],
            row_to_version,
        )
        .optional()?;
    match row {
        Some(row) => decode(row),
        None => Err(Error::not_found(
            NotFoundReason::SchemaVersion,
            format!(
                "schema version {} does not exist for project {}",
                version, project_id
            ),
        )),
    }
}
