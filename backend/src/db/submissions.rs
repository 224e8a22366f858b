//! Submission Ledger: one active submission per (project, center), with
//! every superseded attempt kept for audit.

use crate::db::{is_constraint_violation, projects};
use crate::error::{Error, NotFoundReason, Result};
use chrono::{DateTime, Utc};
use common::model::report::ValidationReport;
use common::model::submission::{SubmissionDetail, SubmissionStatus, SubmissionSummary};
use log::{info, warn};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

const SUMMARY_COLUMNS: &str = "id, project_id, center_name, uploader_name, filename, upload_date, \
     status, schema_version, row_count, active";

/// Everything the ledger records for one upload attempt.
pub struct NewSubmission<'a> {
    pub project_id: i64,
    pub center_name: &'a str,
    pub uploader_name: Option<&'a str>,
    pub filename: &'a str,
    pub schema_version: Option<i64>,
    pub status: SubmissionStatus,
    pub report: &'a ValidationReport,
    pub header: &'a [String],
    pub rows: &'a [Vec<String>],
    pub ragged_rows: usize,
    pub file_size: u64,
    pub file_locator: Option<&'a str>,
}

/// The stored rows of one submission, as needed by export and revalidation.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSubmission {
    pub id: i64,
    pub center_name: String,
    pub schema_version: Option<i64>,
    pub header: Vec<String>,
    pub row_count: usize,
    pub ragged_rows: usize,
    pub file_size: u64,
}

fn parse_status(index: usize, raw: String) -> rusqlite::Result<SubmissionStatus> {
    raw.parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, e.into()))
}

fn row_to_summary(row: &Row<'_>) -> rusqlite::Result<SubmissionSummary> {
    let row_count: i64 = row.get(8)?;
    Ok(SubmissionSummary {
        id: row.get(0)?,
        project_id: row.get(1)?,
        center_name: row.get(2)?,
        uploader_name: row.get(3)?,
        filename: row.get(4)?,
        upload_date: row.get(5)?,
        status: parse_status(6, row.get(6)?)?,
        schema_version: row.get(7)?,
        row_count: row_count as usize,
        active: row.get(9)?,
    })
}

fn submission_not_found(submission_id: i64) -> Error {
    Error::not_found(
        NotFoundReason::Submission,
        format!("submission {} not found", submission_id),
    )
}

/// Rows written per transaction while a submission is staged. Committing in
/// batches releases the database write lock between them, so uploads for
/// other centers and schema saves are not starved by one large file.
const ROW_BATCH: usize = 1_000;

/// Records a new attempt and supersedes the center's previous active one.
///
/// The attempt is first staged as a pending row, invisible to every read
/// path, and its data rows are written in batches. Only then does a short
/// immediate transaction deactivate the old submission and activate the new
/// one, so the partial unique index on `(project_id, center_name) WHERE
/// active = 1` holds at every statement and readers never see both. A staged
/// attempt that fails part way is removed again.
pub fn insert_replacing(
    conn: &mut Connection,
    new: &NewSubmission<'_>,
) -> Result<SubmissionSummary> {
    let id = stage(conn, new)?;
    let activated = append_rows(conn, new.project_id, id, 0, new.rows)
        .and_then(|()| activate(conn, new, id));
    if activated.is_err() {
        discard(conn, id);
    }
    activated
}

fn stage(conn: &Connection, new: &NewSubmission<'_>) -> Result<i64> {
    projects::ensure_exists(conn, new.project_id)?;
    conn.execute(
        "INSERT INTO submissions (project_id, center_name, uploader_name, filename, upload_date,
             schema_version, status, report, columns, row_count, ragged_rows, file_size,
             file_locator, pending, active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, 1, 0)",
        params![
            new.project_id,
            new.center_name,
            new.uploader_name,
            new.filename,
            Utc::now(),
            new.schema_version,
            new.status.as_str(),
            serde_json::to_string(new.report)?,
            serde_json::to_string(new.header)?,
            new.rows.len() as i64,
            new.ragged_rows as i64,
            new.file_size as i64,
            new.file_locator,
        ],
    )
    .map_err(|e| project_gone(e, new.project_id))?;
    Ok(conn.last_insert_rowid())
}

/// A foreign-key failure while staging means the project was deleted
/// underneath the upload.
fn project_gone(err: rusqlite::Error, project_id: i64) -> Error {
    if is_constraint_violation(&err) {
        Error::project_not_found(project_id)
    } else {
        err.into()
    }
}

/// Writes `rows` of a staged submission, numbering them from `first_index`.
fn append_rows(
    conn: &mut Connection,
    project_id: i64,
    submission_id: i64,
    first_index: usize,
    rows: &[Vec<String>],
) -> Result<()> {
    for (batch_no, batch) in rows.chunks(ROW_BATCH).enumerate() {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO submission_rows (submission_id, row_index, cells) VALUES (?1, ?2, ?3)",
            )?;
            let base = first_index + batch_no * ROW_BATCH;
            for (offset, cells) in batch.iter().enumerate() {
                stmt.execute(params![
                    submission_id,
                    (base + offset) as i64,
                    serde_json::to_string(cells)?
                ])
                .map_err(|e| project_gone(e, project_id))?;
            }
        }
        tx.commit()?;
    }
    Ok(())
}

/// Swaps the staged submission in as the center's active one.
fn activate(
    conn: &mut Connection,
    new: &NewSubmission<'_>,
    id: i64,
) -> Result<SubmissionSummary> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    projects::ensure_exists(&tx, new.project_id)?;

    let previous: Option<i64> = tx
        .query_row(
            "SELECT id FROM submissions WHERE project_id = ?1 AND center_name = ?2 AND active = 1",
            params![new.project_id, new.center_name],
            |row| row.get(0),
        )
        .optional()?;
    let now = Utc::now();
    if let Some(previous) = previous {
        tx.execute(
            "UPDATE submissions SET active = 0, superseded_by = ?1, superseded_at = ?2
             WHERE id = ?3",
            params![id, now, previous],
        )?;
    }

    let activated = tx
        .execute(
            "UPDATE submissions SET pending = 0, active = 1, upload_date = ?1
             WHERE id = ?2 AND pending = 1",
            params![now, id],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                Error::Conflict(format!(
                    "center '{}' already has an active submission",
                    new.center_name
                ))
            } else {
                e.into()
            }
        })?;
    if activated == 0 {
        return Err(submission_not_found(id));
    }

    let summary = tx.query_row(
        &format!("SELECT {} FROM submissions WHERE id = ?1", SUMMARY_COLUMNS),
        params![id],
        row_to_summary,
    )?;
    tx.commit()?;

    match previous {
        Some(previous) => info!(
            "project {} center '{}': submission {} ({}) supersedes {}",
            new.project_id, new.center_name, id, new.status, previous
        ),
        None => info!(
            "project {} center '{}': submission {} ({})",
            new.project_id, new.center_name, id, new.status
        ),
    }
    Ok(summary)
}

/// Drops a staged submission and its rows. Failures are only logged; the
/// leftover is removed at the next start.
fn discard(conn: &Connection, id: i64) {
    if let Err(e) = conn.execute(
        "DELETE FROM submissions WHERE id = ?1 AND pending = 1",
        params![id],
    ) {
        warn!("could not discard staged submission {}: {}", id, e);
    }
}

/// Whether any recorded submission still points at `locator`.
pub fn locator_in_use(conn: &Connection, locator: &str) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM submissions WHERE file_locator = ?1)",
        params![locator],
        |row| row.get(0),
    )?)
}

fn query_summaries(
    conn: &Connection,
    sql: &str,
    project_id: i64,
) -> Result<Vec<SubmissionSummary>> {
    projects::ensure_exists(conn, project_id)?;
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params![project_id], row_to_summary)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Active submissions, most recent first.
pub fn list_active(conn: &Connection, project_id: i64) -> Result<Vec<SubmissionSummary>> {
    query_summaries(
        conn,
        &format!(
            "SELECT {} FROM submissions WHERE project_id = ?1 AND active = 1 ORDER BY id DESC",
            SUMMARY_COLUMNS
        ),
        project_id,
    )
}

/// Every attempt, superseded ones included, most recent first.
pub fn list_history(conn: &Connection, project_id: i64) -> Result<Vec<SubmissionSummary>> {
    query_summaries(
        conn,
        &format!(
            "SELECT {} FROM submissions WHERE project_id = ?1 AND pending = 0 ORDER BY id DESC",
            SUMMARY_COLUMNS
        ),
        project_id,
    )
}

pub fn get(conn: &Connection, project_id: i64, submission_id: i64) -> Result<SubmissionDetail> {
    projects::ensure_exists(conn, project_id)?;
    let detail = conn
        .query_row(
            &format!(
                "SELECT {}, file_locator, superseded_by, superseded_at, report
                 FROM submissions WHERE project_id = ?1 AND id = ?2 AND pending = 0",
                SUMMARY_COLUMNS
            ),
            params![project_id, submission_id],
            |row| {
                let superseded_at: Option<DateTime<Utc>> = row.get(12)?;
                let report: Option<String> = row.get(13)?;
                Ok((
                    row_to_summary(row)?,
                    row.get::<_, Option<String>>(10)?,
                    row.get::<_, Option<i64>>(11)?,
                    superseded_at,
                    report,
                ))
            },
        )
        .optional()?
        .ok_or_else(|| submission_not_found(submission_id))?;

    let (summary, file_locator, superseded_by, superseded_at, report) = detail;
    let validation_report = report.map(|r| serde_json::from_str(&r)).transpose()?;
    Ok(SubmissionDetail {
        summary,
        file_locator,
        superseded_by,
        superseded_at,
        validation_report,
    })
}

const STORED_COLUMNS: &str =
    "id, center_name, schema_version, columns, row_count, ragged_rows, file_size";

/// A stored row with the header still JSON-encoded; decoded outside the
/// rusqlite row callback so serde errors keep their own variant.
struct RawStored {
    id: i64,
    center_name: String,
    schema_version: Option<i64>,
    columns: String,
    row_count: i64,
    ragged_rows: i64,
    file_size: i64,
}

fn row_to_stored(row: &Row<'_>) -> rusqlite::Result<RawStored> {
    Ok(RawStored {
        id: row.get(0)?,
        center_name: row.get(1)?,
        schema_version: row.get(2)?,
        columns: row.get(3)?,
        row_count: row.get(4)?,
        ragged_rows: row.get(5)?,
        file_size: row.get(6)?,
    })
}

fn decode_stored(raw: RawStored) -> Result<StoredSubmission> {
    Ok(StoredSubmission {
        id: raw.id,
        center_name: raw.center_name,
        schema_version: raw.schema_version,
        header: serde_json::from_str(&raw.columns)?,
        row_count: raw.row_count as usize,
        ragged_rows: raw.ragged_rows as usize,
        file_size: raw.file_size as u64,
    })
}

/// Header and bookkeeping of one submission, any status.
pub fn stored(conn: &Connection, project_id: i64, submission_id: i64) -> Result<StoredSubmission> {
    projects::ensure_exists(conn, project_id)?;
    let raw = conn
        .query_row(
            &format!(
                "SELECT {} FROM submissions WHERE project_id = ?1 AND id = ?2 AND pending = 0",
                STORED_COLUMNS
            ),
            params![project_id, submission_id],
            row_to_stored,
        )
        .optional()?
        .ok_or_else(|| submission_not_found(submission_id))?;
    decode_stored(raw)
}

/// Active, validated submissions eligible for merge, in ascending id order.
///
/// Legacy rows without a schema version are never exported.
pub fn export_sources(conn: &Connection, project_id: i64) -> Result<Vec<StoredSubmission>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM submissions
         WHERE project_id = ?1 AND active = 1 AND status = 'validated'
           AND schema_version IS NOT NULL
         ORDER BY id ASC",
        STORED_COLUMNS
    ))?;
    let raw = stmt
        .query_map(params![project_id], row_to_stored)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    raw.into_iter().map(decode_stored).collect()
}

/// Feeds the stored rows of a submission to `f` in original file order.
pub fn for_each_row<F>(conn: &Connection, submission_id: i64, mut f: F) -> Result<()>
where
    F: FnMut(Vec<String>) -> Result<()>,
{
    let mut stmt = conn.prepare(
        "SELECT cells FROM submission_rows WHERE submission_id = ?1 ORDER BY row_index",
    )?;
    let mut rows = stmt.query(params![submission_id])?;
    while let Some(row) = rows.next()? {
        let cells: String = row.get(0)?;
        f(serde_json::from_str(&cells)?)?;
    }
    Ok(())
}

pub fn load_rows(conn: &Connection, submission_id: i64) -> Result<Vec<Vec<String>>> {
    let mut rows = Vec::new();
    for_each_row(conn, submission_id, |cells| {
        rows.push(cells);
        Ok(())
    })?;
    Ok(rows)
}
