//! Submit orchestration: form checks, schema resolution, validation and the
//! atomic replace of a center's active submission.

use crate::config::Config;
use crate::db::schemas;
use crate::db::submissions::{self, NewSubmission, StoredSubmission};
use crate::error::{Error, NotFoundReason, Result};
use crate::state::AppState;
use crate::storage::StoredUpload;
use crate::validation::decode::{parse_csv, Dataset};
use common::model::report::FieldError;
use common::model::submission::{FileStats, RevalidationResult, SubmissionOutcome, SubmissionStatus};
use log::{info, warn};
use rusqlite::Connection;
use std::sync::Arc;
use tokio::task;

/// One upload as received from a center.
#[derive(Debug, Clone, Default)]
pub struct Upload {
    pub center_name: String,
    pub uploader_name: Option<String>,
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Path of the detail endpoint for a submission.
pub fn report_url(project_id: i64, submission_id: i64) -> String {
    format!("/api/projects/{}/submissions/{}", project_id, submission_id)
}

/// Checks the form fields and returns the normalized center name.
fn check_upload(config: &Config, upload: &Upload) -> Result<String> {
    let mut fields = Vec::new();

    let center = upload.center_name.trim();
    if center.is_empty() {
        fields.push(FieldError::new("center_name", "is required"));
    } else if !config.centers.is_empty() && !config.centers.iter().any(|c| c == center) {
        fields.push(FieldError::new(
            "center_name",
            format!("must be one of: {}", config.centers.join(", ")),
        ));
    }

    if upload.filename.trim().is_empty() {
        fields.push(FieldError::new("file", "is required"));
    } else if !upload.filename.to_ascii_lowercase().ends_with(".csv") {
        fields.push(FieldError::new("file", "only .csv files are accepted"));
    }
    if upload.bytes.len() > config.max_upload_bytes {
        fields.push(FieldError::new(
            "file",
            format!("exceeds the {} byte upload limit", config.max_upload_bytes),
        ));
    }

    if fields.is_empty() {
        Ok(center.to_string())
    } else {
        Err(Error::invalid_fields("submission form is incomplete or invalid", fields))
    }
}

fn file_stats(dataset: &Dataset) -> FileStats {
    FileStats {
        file_size_bytes: dataset.file_size,
        file_size_kb: (dataset.file_size as f64 / 1024.0 * 100.0).round() / 100.0,
        row_count: dataset.row_count(),
        column_count: dataset.column_count(),
        column_names: dataset.header.clone(),
    }
}

/// Validates `upload` against the project's current schema and records it
/// as the center's active submission.
///
/// The outcome is returned for failed submissions as well; they are stored
/// and supersede the previous attempt, but are never exported.
pub async fn submit(
    state: Arc<AppState>,
    project_id: i64,
    upload: Upload,
) -> Result<SubmissionOutcome> {
    let center = check_upload(&state.config, &upload)?;

    let _guard = state.center_locks.lock((project_id, center.clone())).await;
    task::spawn_blocking(move || record(&state, project_id, &center, upload)).await?
}

fn record(
    state: &AppState,
    project_id: i64,
    center: &str,
    upload: Upload,
) -> Result<SubmissionOutcome> {
    let mut conn = state.db.open()?;
    let schema = schemas::get_latest(&conn, project_id)?;

    let dataset = parse_csv(&upload.bytes)?;
    if dataset.row_count() == 0 {
        return Err(Error::invalid_fields(
            "the file has no data rows",
            vec![FieldError::new("file", "contains a header but no data rows")],
        ));
    }

    let (report, status) = state
        .validator
        .validate(&dataset, &schema.structure, Some(schema.version))?;
    let stored = state.uploads.put(&upload.bytes)?;

    let uploader = upload
        .uploader_name
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty());
    let inserted = submissions::insert_replacing(
        &mut conn,
        &NewSubmission {
            project_id,
            center_name: center,
            uploader_name: uploader,
            filename: upload.filename.trim(),
            schema_version: Some(schema.version),
            status,
            report: &report,
            header: &dataset.header,
            rows: &dataset.rows,
            ragged_rows: dataset.ragged_rows,
            file_size: dataset.file_size,
            file_locator: Some(&stored.locator),
        },
    );
    let summary = match inserted {
        Ok(summary) => summary,
        Err(e) => {
            release_upload(state, &conn, &stored);
            return Err(e);
        }
    };

    if status == SubmissionStatus::Failed {
        warn!(
            "project {} center '{}': submission {} failed validation ({} errors)",
            project_id,
            center,
            summary.id,
            report.errors.len()
        );
    } else {
        info!(
            "project {} center '{}': {} rows validated against schema v{}",
            project_id,
            center,
            dataset.row_count(),
            schema.version
        );
    }

    Ok(SubmissionOutcome {
        report_url: Some(report_url(project_id, summary.id)),
        submission: summary,
        status,
        file_stats: file_stats(&dataset),
        validation_report: report,
    })
}

/// Removes a raw file this attempt created, unless another submission with
/// identical content has recorded it meanwhile.
fn release_upload(state: &AppState, conn: &Connection, stored: &StoredUpload) {
    if !stored.created {
        return;
    }
    let released = submissions::locator_in_use(conn, &stored.locator).and_then(|in_use| {
        if in_use {
            Ok(())
        } else {
            state.uploads.remove(&stored.locator)
        }
    });
    if let Err(e) = released {
        warn!("could not remove unrecorded upload {}: {}", stored.locator, e);
    }
}

/// Loads a submission that can be revalidated, i.e. one recorded against a
/// schema version.
pub fn revalidation_target(
    conn: &Connection,
    project_id: i64,
    submission_id: i64,
) -> Result<(StoredSubmission, i64)> {
    let stored = submissions::stored(conn, project_id, submission_id)?;
    match stored.schema_version {
        Some(version) => Ok((stored, version)),
        None => Err(Error::not_found(
            NotFoundReason::LegacySubmission,
            format!(
                "submission {} predates schema versioning and cannot be revalidated",
                submission_id
            ),
        )),
    }
}

/// Re-runs validation of a stored submission against the schema version it
/// was recorded with. The ledger entry itself is left untouched.
///
/// `progress` receives a percentage as the work advances.
pub fn revalidate<F>(
    state: &AppState,
    project_id: i64,
    submission_id: i64,
    progress: F,
) -> Result<RevalidationResult>
where
    F: Fn(u32),
{
    let conn = state.db.open()?;
    let (stored, version) = revalidation_target(&conn, project_id, submission_id)?;
    let recorded_status = submissions::get(&conn, project_id, submission_id)?
        .summary
        .status;
    let schema = schemas::get_version(&conn, project_id, version)?;
    progress(10);

    let rows = submissions::load_rows(&conn, submission_id)?;
    progress(50);

    let dataset = Dataset {
        header: stored.header,
        rows,
        file_size: stored.file_size,
        ragged_rows: stored.ragged_rows,
    };
    let (report, status) = state
        .validator
        .validate(&dataset, &schema.structure, Some(version))?;
    progress(100);

    info!(
        "project {} submission {} revalidated against schema v{}: {}",
        project_id, submission_id, version, status
    );
    Ok(RevalidationResult {
        submission_id,
        schema_version: version,
        status,
        recorded_status,
        validation_report: report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::projects;
    use crate::state::testing::{test_state, test_state_with};
    use common::model::schema::{ColumnDescriptor, ColumnType, SchemaStructure};

    fn trial(state: &AppState) -> i64 {
        let mut conn = state.db.open().unwrap();
        let p = projects::create(&conn, "Trial A", "secret").unwrap();
        schemas::create_version(
            &mut conn,
            p.id,
            &SchemaStructure {
                columns: vec![
                    ColumnDescriptor::new("case_id", ColumnType::String, true),
                    ColumnDescriptor::new("age", ColumnType::Integer, true),
                ],
            },
        )
        .unwrap();
        p.id
    }

    fn upload(center: &str, body: &str) -> Upload {
        Upload {
            center_name: center.to_string(),
            uploader_name: Some("Dr. Lin".to_string()),
            filename: "site.csv".to_string(),
            bytes: body.as_bytes().to_vec(),
        }
    }

    #[tokio::test]
    async fn resubmission_replaces_the_active_entry() {
        let (_dir, state) = test_state();
        let pid = trial(&state);

        let first = submit(state.clone(), pid, upload("X", "case_id,age\nC1,45\n"))
            .await
            .unwrap();
        assert_eq!(first.status, SubmissionStatus::Validated);
        assert_eq!(first.file_stats.row_count, 1);

        let second = submit(state.clone(), pid, upload("X", "case_id,age\nC1,46\nC2,50\n"))
            .await
            .unwrap();
        assert_eq!(second.status, SubmissionStatus::Validated);
        assert_eq!(second.file_stats.row_count, 2);
        assert_eq!(
            second.report_url.as_deref(),
            Some(report_url(pid, second.submission.id).as_str())
        );

        let conn = state.db.open().unwrap();
        let active = submissions::list_active(&conn, pid).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, second.submission.id);
        assert_eq!(active[0].uploader_name.as_deref(), Some("Dr. Lin"));
    }

    #[tokio::test]
    async fn type_errors_fail_but_are_recorded() {
        let (_dir, state) = test_state();
        let pid = trial(&state);
        let outcome = submit(state.clone(), pid, upload("X", "case_id,age\nC1,forty\n"))
            .await
            .unwrap();
        assert_eq!(outcome.status, SubmissionStatus::Failed);
        assert_eq!(
            outcome.validation_report.problem_for("age").unwrap().type_mismatches,
            1
        );
        let conn = state.db.open().unwrap();
        let detail = submissions::get(&conn, pid, outcome.submission.id).unwrap();
        assert!(detail.file_locator.is_some());
        assert_eq!(detail.validation_report, Some(outcome.validation_report));
    }

    #[tokio::test]
    async fn missing_schema_and_project_are_distinct() {
        let (_dir, state) = test_state();
        let err = submit(state.clone(), 99, upload("X", "case_id,age\nC1,1\n"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::NotFound {
                reason: NotFoundReason::Project,
                ..
            }
        ));

        let pid = {
            let conn = state.db.open().unwrap();
            projects::create(&conn, "No schema", "pw").unwrap().id
        };
        let err = submit(state.clone(), pid, upload("X", "case_id,age\nC1,1\n"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::NotFound {
                reason: NotFoundReason::Schema,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn header_only_file_is_rejected() {
        let (_dir, state) = test_state();
        let pid = trial(&state);
        let err = submit(state.clone(), pid, upload("X", "case_id,age\n"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput { .. }));
        let conn = state.db.open().unwrap();
        assert!(submissions::list_history(&conn, pid).unwrap().is_empty());
    }

    #[tokio::test]
    async fn form_fields_are_checked_together() {
        let (_dir, state) = test_state_with(|c| c.centers = vec!["X".into(), "Y".into()]);
        let pid = trial(&state);
        let mut bad = upload("Z", "case_id,age\nC1,1\n");
        bad.filename = "data.xlsx".to_string();
        match submit(state.clone(), pid, bad).await.unwrap_err() {
            Error::InvalidInput { fields, .. } => {
                let names: Vec<&str> = fields.iter().map(|f| f.field.as_str()).collect();
                assert_eq!(names, vec!["center_name", "file"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn concurrent_uploads_for_one_center_leave_one_active() {
        let (_dir, state) = test_state();
        let pid = trial(&state);
        let handles: Vec<_> = (0..6)
            .map(|i| {
                let state = state.clone();
                let center = if i % 2 == 0 { "X" } else { "Y" };
                tokio::spawn(async move {
                    submit(state, pid, upload(center, &format!("case_id,age\nC{},{}\n", i, i)))
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        let conn = state.db.open().unwrap();
        let active = submissions::list_active(&conn, pid).unwrap();
        let mut centers: Vec<&str> = active.iter().map(|s| s.center_name.as_str()).collect();
        centers.sort();
        assert_eq!(centers, vec!["X", "Y"]);
        assert_eq!(submissions::list_history(&conn, pid).unwrap().len(), 6);
    }

    #[tokio::test]
    async fn revalidation_uses_the_recorded_schema_version() {
        let (_dir, state) = test_state();
        let pid = trial(&state);
        let outcome = submit(state.clone(), pid, upload("X", "case_id,age\nC1,45\n"))
            .await
            .unwrap();

        // Version 2 makes the stored file fail; revalidation must still use v1.
        {
            let mut conn = state.db.open().unwrap();
            schemas::create_version(
                &mut conn,
                pid,
                &SchemaStructure {
                    columns: vec![ColumnDescriptor::new("weight", ColumnType::Decimal, true)],
                },
            )
            .unwrap();
        }

        let seen = std::sync::Mutex::new(Vec::new());
        let result = revalidate(&state, pid, outcome.submission.id, |p| {
            seen.lock().unwrap().push(p)
        })
        .unwrap();
        assert_eq!(result.schema_version, 1);
        assert_eq!(result.status, SubmissionStatus::Validated);
        assert_eq!(result.recorded_status, SubmissionStatus::Validated);
        assert_eq!(result.validation_report.row_count, 1);
        assert_eq!(seen.into_inner().unwrap().last(), Some(&100));
    }

    #[tokio::test]
    async fn revalidation_keeps_the_ragged_row_warning() {
        let (_dir, state) = test_state();
        let pid = trial(&state);
        let body = "case_id,age\nC1,45\nC2,50,extra\n";
        let outcome = submit(state.clone(), pid, upload("X", body)).await.unwrap();
        let warned = |report: &common::model::report::ValidationReport| {
            report
                .warnings
                .iter()
                .any(|w| w.field == "file" && w.message.starts_with("1 rows"))
        };
        assert!(warned(&outcome.validation_report));

        let result = revalidate(&state, pid, outcome.submission.id, |_| {}).unwrap();
        assert!(warned(&result.validation_report));
        assert_eq!(result.validation_report.warnings, outcome.validation_report.warnings);
    }

    #[tokio::test]
    async fn unrecorded_uploads_are_removed_unless_shared() {
        let (_dir, state) = test_state();
        let pid = trial(&state);
        let conn = state.db.open().unwrap();

        let orphan = state.uploads.put(b"case_id,age\nC9,9\n").unwrap();
        release_upload(&state, &conn, &orphan);
        assert!(!state.config.upload_dir.join(&orphan.locator).exists());

        let body = "case_id,age\nC1,45\n";
        let recorded = submit(state.clone(), pid, upload("X", body)).await.unwrap();
        let locator = submissions::get(&conn, pid, recorded.submission.id)
            .unwrap()
            .file_locator
            .unwrap();
        let again = StoredUpload {
            locator,
            created: true,
        };
        release_upload(&state, &conn, &again);
        assert!(state.config.upload_dir.join(&again.locator).exists());
    }

    #[test]
    fn legacy_submissions_cannot_be_revalidated() {
        let (_dir, state) = test_state();
        let conn = state.db.open().unwrap();
        let p = projects::create(&conn, "Legacy", "pw").unwrap();
        conn.execute(
            "INSERT INTO submissions (project_id, center_name, filename, upload_date, status,
                 columns, row_count, file_size)
             VALUES (?1, 'X', 'old.csv', '2024-01-01T00:00:00Z', 'validated', '[]', 0, 0)",
            [p.id],
        )
        .unwrap();
        let sid = conn.last_insert_rowid();
        assert!(matches!(
            revalidation_target(&conn, p.id, sid),
            Err(Error::NotFound {
                reason: NotFoundReason::LegacySubmission,
                ..
            })
        ));
    }
}
