//! Merge & Export Engine.
//!
//! An export is decided up front (credential, eligible submissions, column
//! union, row cap) and only then streamed: a blocking worker walks the stored
//! rows of every source in ascending submission id and pushes CSV chunks
//! through a bounded channel to the response body.

use crate::db::projects;
use crate::db::submissions::{self, StoredSubmission};
use crate::error::{Error, Result};
use crate::security::{verify_against_nothing, verify_secret};
use crate::state::AppState;
use actix_web::web::Bytes;
use futures_util::stream::{self, Stream};
use log::{error, info, warn};
use rusqlite::Connection;
use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task;

pub const CENTER_COLUMN: &str = "_center_source";
pub const SUBMISSION_COLUMN: &str = "_submission_id";

const CHUNK_BYTES: usize = 64 * 1024;
const CHANNEL_CHUNKS: usize = 8;

/// Everything needed to write one merged dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportPlan {
    pub filename: String,
    /// Output header, tag columns included.
    pub columns: Vec<String>,
    pub sources: Vec<StoredSubmission>,
    pub total_rows: usize,
}

/// Checks the supplied password. An unknown project is indistinguishable
/// from a wrong password.
pub fn authorize(conn: &Connection, project_id: i64, password: &str) -> Result<()> {
    let stored = projects::password_hash(conn, project_id)?;
    let verified = match stored {
        Some(hash) => verify_secret(&hash, password),
        None => {
            verify_against_nothing(password);
            false
        }
    };
    if !verified {
        warn!("rejected export credential for project {}", project_id);
        return Err(Error::Forbidden);
    }
    Ok(())
}

/// Lower-case ASCII slug of a project name, `export` if nothing survives.
pub fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }
    let trimmed = out.trim_end_matches('_');
    if trimmed.is_empty() {
        "export".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Union of the source headers in first-appearance order, then the tags.
fn union_columns(sources: &[StoredSubmission]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for source in sources {
        for name in &source.header {
            if name == CENTER_COLUMN || name == SUBMISSION_COLUMN || columns.contains(name) {
                continue;
            }
            columns.push(name.clone());
        }
    }
    columns.push(CENTER_COLUMN.to_string());
    columns.push(SUBMISSION_COLUMN.to_string());
    columns
}

pub fn plan(conn: &Connection, project_id: i64, max_rows: usize) -> Result<ExportPlan> {
    let project = projects::get(conn, project_id)?;
    let sources = submissions::export_sources(conn, project_id)?;
    if sources.is_empty() {
        return Err(Error::NoData);
    }
    let total_rows: usize = sources.iter().map(|s| s.row_count).sum();
    if total_rows > max_rows {
        return Err(Error::invalid(format!(
            "merged dataset would have {} rows, the export limit is {}",
            total_rows, max_rows
        )));
    }
    Ok(ExportPlan {
        filename: format!("project_{}_{}_merged.csv", project_id, slug(&project.name)),
        columns: union_columns(&sources),
        sources,
        total_rows,
    })
}

/// Writes the merged dataset described by `plan` to `out`.
pub fn write_csv<W: Write>(conn: &Connection, plan: &ExportPlan, out: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(&plan.columns).map_err(csv_error)?;

    let position: HashMap<&str, usize> = plan
        .columns
        .iter()
        .enumerate()
        .map(|(i, c)| (c.as_str(), i))
        .collect();
    let width = plan.columns.len();

    for source in &plan.sources {
        let targets: Vec<Option<usize>> = source
            .header
            .iter()
            .map(|name| match name.as_str() {
                CENTER_COLUMN | SUBMISSION_COLUMN => None,
                other => position.get(other).copied(),
            })
            .collect();
        let submission_id = source.id.to_string();

        submissions::for_each_row(conn, source.id, |cells| {
            let mut record = vec![String::new(); width];
            for (cell, target) in cells.into_iter().zip(&targets) {
                if let Some(index) = target {
                    record[*index] = cell;
                }
            }
            record[width - 2] = source.center_name.clone();
            record[width - 1] = submission_id.clone();
            writer.write_record(&record).map_err(csv_error)
        })?;
    }
    writer.flush()?;
    Ok(())
}

fn csv_error(err: csv::Error) -> Error {
    match err.into_kind() {
        csv::ErrorKind::Io(e) => Error::Io(e),
        other => Error::Io(io::Error::other(format!("{:?}", other))),
    }
}

/// `Write` adapter that hands fixed-size chunks to an async receiver.
struct ChannelWriter {
    tx: mpsc::Sender<Result<Bytes>>,
    buf: Vec<u8>,
}

impl ChannelWriter {
    fn send(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = Bytes::from(std::mem::take(&mut self.buf));
        self.tx
            .blocking_send(Ok(chunk))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "export receiver dropped"))
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        if self.buf.len() >= CHUNK_BYTES {
            self.send()?;
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send()
    }
}

/// A started export: the download filename and the body stream.
pub struct ExportStream<S> {
    pub filename: String,
    pub body: S,
}

/// Authorizes, plans and starts streaming the merged dataset.
///
/// Every failure that can be decided before the first byte (wrong password,
/// no data, too many rows) is returned as an error; later failures end the
/// stream with an error item.
pub async fn export(
    state: Arc<AppState>,
    project_id: i64,
    password: String,
) -> Result<ExportStream<impl Stream<Item = Result<Bytes>>>> {
    let planning = state.clone();
    let plan = task::spawn_blocking(move || -> Result<ExportPlan> {
        let conn = planning.db.open()?;
        authorize(&conn, project_id, &password)?;
        plan(&conn, project_id, planning.config.max_export_rows)
    })
    .await??;

    info!(
        "exporting project {}: {} rows from {} submissions",
        project_id,
        plan.total_rows,
        plan.sources.len()
    );

    let (tx, rx) = mpsc::channel::<Result<Bytes>>(CHANNEL_CHUNKS);
    let filename = plan.filename.clone();
    task::spawn_blocking(move || {
        let result = state.db.open().and_then(|conn| {
            let mut sink = ChannelWriter {
                tx: tx.clone(),
                buf: Vec::with_capacity(CHUNK_BYTES),
            };
            write_csv(&conn, &plan, &mut sink)
        });
        if let Err(err) = result {
            match err {
                Error::Io(ref e) if e.kind() == io::ErrorKind::BrokenPipe => {
                    warn!("export of project {} aborted by client", project_id);
                }
                err => {
                    error!("export of project {} failed: {}", project_id, err);
                    let _ = tx.blocking_send(Err(err));
                }
            }
        }
    });

    let body = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });
    Ok(ExportStream { filename, body })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::submissions::testing::record;
    use crate::db::testing::temp_db;
    use crate::state::testing::test_state;
    use common::model::report::ValidationReport;
    use common::model::submission::SubmissionStatus;
    use futures_util::StreamExt;

    fn parse(bytes: &[u8]) -> (Vec<String>, Vec<Vec<String>>) {
        let mut reader = csv::Reader::from_reader(bytes);
        let header = reader
            .headers()
            .unwrap()
            .iter()
            .map(str::to_string)
            .collect();
        let rows = reader
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect();
        (header, rows)
    }

    #[test]
    fn slug_keeps_ascii_words() {
        assert_eq!(slug("Trial A"), "trial_a");
        assert_eq!(slug("  Heart--Failure 2024! "), "heart_failure_2024");
        assert_eq!(slug("心臟研究"), "export");
    }

    #[test]
    fn merges_union_of_columns_in_source_order() {
        let (_dir, db) = temp_db();
        let mut conn = db.open().unwrap();
        let p = projects::create(&conn, "Trial A", "pw").unwrap();
        let x = record(
            &mut conn,
            p.id,
            "X",
            SubmissionStatus::Validated,
            &["case_id", "age"],
            &[&["C1", "46"], &["C2", "50"]],
        );
        let y = record(
            &mut conn,
            p.id,
            "Y",
            SubmissionStatus::Validated,
            &["age", "case_id", "bmi"],
            &[&["33", "D1", "22.5"]],
        );
        record(&mut conn, p.id, "Z", SubmissionStatus::Failed, &["case_id"], &[&["bad"]]);

        let plan = plan(&conn, p.id, 100).unwrap();
        assert_eq!(plan.filename, format!("project_{}_trial_a_merged.csv", p.id));
        assert_eq!(plan.total_rows, 3);

        let mut out = Vec::new();
        write_csv(&conn, &plan, &mut out).unwrap();
        let (header, rows) = parse(&out);
        assert_eq!(
            header,
            vec!["case_id", "age", "bmi", CENTER_COLUMN, SUBMISSION_COLUMN]
        );
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], vec!["C1", "46", "", "X", x.id.to_string().as_str()]);
        assert_eq!(rows[1][0], "C2");
        assert_eq!(rows[2], vec!["D1", "33", "22.5", "Y", y.id.to_string().as_str()]);
    }

    #[test]
    fn no_validated_data_and_row_cap() {
        let (_dir, db) = temp_db();
        let mut conn = db.open().unwrap();
        let p = projects::create(&conn, "Trial A", "pw").unwrap();
        assert!(matches!(plan(&conn, p.id, 100), Err(Error::NoData)));

        record(
            &mut conn,
            p.id,
            "X",
            SubmissionStatus::Validated,
            &["a"],
            &[&["1"], &["2"]],
        );
        assert!(matches!(plan(&conn, p.id, 1), Err(Error::InvalidInput { .. })));
    }

    #[test]
    fn wrong_password_or_unknown_project_is_forbidden() {
        let (_dir, db) = temp_db();
        let conn = db.open().unwrap();
        let p = projects::create(&conn, "Trial A", "right").unwrap();
        authorize(&conn, p.id, "right").unwrap();
        assert!(matches!(authorize(&conn, p.id, "wrong"), Err(Error::Forbidden)));
        assert!(matches!(authorize(&conn, 999, "right"), Err(Error::Forbidden)));
    }

    #[tokio::test]
    async fn streams_every_validated_row() {
        let (_dir, state) = test_state();
        let pid = {
            let mut conn = state.db.open().unwrap();
            let p = projects::create(&conn, "Trial A", "right").unwrap();
            let rows: Vec<Vec<String>> = (0..5000).map(|i| vec![format!("C{}", i)]).collect();
            let header = vec!["case_id".to_string()];
            let report = ValidationReport::default();
            submissions::insert_replacing(
                &mut conn,
                &submissions::NewSubmission {
                    project_id: p.id,
                    center_name: "X",
                    uploader_name: None,
                    filename: "x.csv",
                    schema_version: Some(1),
                    status: SubmissionStatus::Validated,
                    report: &report,
                    header: &header,
                    rows: &rows,
                    ragged_rows: 0,
                    file_size: 1,
                    file_locator: None,
                },
            )
            .unwrap();
            p.id
        };

        assert!(matches!(
            export(state.clone(), pid, "wrong".to_string()).await,
            Err(Error::Forbidden)
        ));

        let started = export(state.clone(), pid, "right".to_string()).await.unwrap();
        assert_eq!(started.filename, format!("project_{}_trial_a_merged.csv", pid));
        let chunks: Vec<Result<Bytes>> = started.body.collect().await;
        let mut body = Vec::new();
        for chunk in chunks {
            body.extend_from_slice(&chunk.unwrap());
        }
        let (_, rows) = parse(&body);
        assert_eq!(rows.len(), 5000);
        assert_eq!(rows[4999][0], "C4999");
    }
}
