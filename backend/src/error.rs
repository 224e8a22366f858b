//! Error taxonomy for the engine and its HTTP surface.
//!
//! Every engine function returns [`Result`]; handlers hand the error straight
//! to actix, which renders it through the [`ResponseError`] impl below. Domain
//! failures carry a human-readable `detail` and, where several fields are
//! involved, a flattened field-by-field list. Infrastructure failures are
//! logged and surfaced as an opaque 500.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use common::model::report::FieldError;
use common::model::submission::SubmissionOutcome;
use log::error;
use rusqlite::ErrorCode;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Distinguishes the several things a 404 can be about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotFoundReason {
    Project,
    /// The project exists but no schema has been saved for it yet.
    Schema,
    SchemaVersion,
    Submission,
    /// A stored submission that predates schema versioning.
    LegacySubmission,
    Job,
}

impl fmt::Display for NotFoundReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NotFoundReason::Project => "project",
            NotFoundReason::Schema => "schema",
            NotFoundReason::SchemaVersion => "schema_version",
            NotFoundReason::Submission => "submission",
            NotFoundReason::LegacySubmission => "legacy_submission",
            NotFoundReason::Job => "job",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{detail}")]
    NotFound {
        reason: NotFoundReason,
        detail: String,
    },

    #[error("{detail}")]
    InvalidInput {
        detail: String,
        fields: Vec<FieldError>,
    },

    #[error("submission failed validation")]
    ValidationFailed(Box<SubmissionOutcome>),

    #[error("download password is incorrect")]
    Forbidden,

    #[error("{0}")]
    Conflict(String),

    #[error("no validated submissions are available for export")]
    NoData,

    #[error("database error: {0}")]
    Database(rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("background task failed: {0}")]
    Task(String),

    #[error("credential hashing failed: {0}")]
    Credential(String),
}

impl Error {
    pub fn not_found(reason: NotFoundReason, detail: impl Into<String>) -> Self {
        Error::NotFound {
            reason,
            detail: detail.into(),
        }
    }

    pub fn project_not_found(project_id: i64) -> Self {
        Self::not_found(
            NotFoundReason::Project,
            format!("project {} not found", project_id),
        )
    }

    pub fn invalid(detail: impl Into<String>) -> Self {
        Error::InvalidInput {
            detail: detail.into(),
            fields: Vec::new(),
        }
    }

    pub fn invalid_fields(detail: impl Into<String>, fields: Vec<FieldError>) -> Self {
        Error::InvalidInput {
            detail: detail.into(),
            fields,
        }
    }

    /// Stable machine-readable code used in response bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "NOT_FOUND",
            Error::InvalidInput { .. } => "INVALID_INPUT",
            Error::ValidationFailed(_) => "VALIDATION_FAILED",
            Error::Forbidden => "FORBIDDEN",
            Error::Conflict(_) => "CONFLICT",
            Error::NoData => "NO_DATA",
            Error::Database(_)
            | Error::Io(_)
            | Error::Serialization(_)
            | Error::Task(_)
            | Error::Credential(_) => "INTERNAL_ERROR",
        }
    }

    fn is_internal(&self) -> bool {
        self.status_code() == StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl From<actix_web::error::BlockingError> for Error {
    fn from(err: actix_web::error::BlockingError) -> Self {
        Error::Task(err.to_string())
    }
}

/// A write lock held past the busy timeout is a contention problem the
/// caller can retry, not a server fault.
impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => Error::Conflict(
                "the database is busy with another write, retry the request".to_string(),
            ),
            _ => Error::Database(err),
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Task(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'static str,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<NotFoundReason>,
    #[serde(skip_serializing_if = "no_fields")]
    fields: &'a [FieldError],
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<&'a SubmissionOutcome>,
}

fn no_fields(fields: &&[FieldError]) -> bool {
    fields.is_empty()
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::InvalidInput { .. } | Error::NoData => StatusCode::BAD_REQUEST,
            Error::ValidationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Forbidden => StatusCode::FORBIDDEN,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Database(_)
            | Error::Io(_)
            | Error::Serialization(_)
            | Error::Task(_)
            | Error::Credential(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let detail = if self.is_internal() {
            error!("request failed: {}", self);
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        let (reason, fields, outcome) = match self {
            Error::NotFound { reason, .. } => (Some(*reason), &[][..], None),
            Error::InvalidInput { fields, .. } => (None, fields.as_slice(), None),
            Error::ValidationFailed(outcome) => (
                None,
                outcome.validation_report.errors.as_slice(),
                Some(outcome.as_ref()),
            ),
            _ => (None, &[][..], None),
        };

        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.code(),
            detail,
            reason,
            fields,
            outcome,
        })
    }
}
