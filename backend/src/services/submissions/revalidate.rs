//! `POST /api/projects/{project_id}/submissions/{submission_id}/revalidate`
//!
//! ## Workflow:
//!
//! 1.  The target is resolved synchronously, so unknown ids and legacy
//!     submissions (no recorded schema version) answer `404` right away.
//! 2.  A job id is registered as `Pending` and returned with `202 Accepted`.
//! 3.  A Tokio task runs [`ledger::revalidate`] on the blocking pool. Progress
//!     is pushed through the job channel as `InProgress(pct)`.
//! 4.  The owning task stores the final status: `Completed` with the
//!     [`RevalidationResult`](common::model::submission::RevalidationResult)
//!     as JSON, or `Failed` with the error message.

use crate::error::Result;
use crate::job_controller::state::{JobUpdate, JobsState};
use crate::ledger;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use common::jobs::JobStatus;
use common::requests::JobAccepted;
use log::error;
use std::sync::Arc;

pub async fn process(
    state: web::Data<AppState>,
    jobs: web::Data<JobsState>,
    path: web::Path<(i64, i64)>,
) -> Result<HttpResponse> {
    let (project_id, submission_id) = path.into_inner();
    state
        .db
        .run(move |conn| ledger::revalidation_target(conn, project_id, submission_id))
        .await?;

    let job_id =
        schedule_revalidation_job(state.into_inner(), jobs, project_id, submission_id).await;
    Ok(HttpResponse::Accepted().json(JobAccepted { job_id }))
}

async fn schedule_revalidation_job(
    state: Arc<AppState>,
    jobs: web::Data<JobsState>,
    project_id: i64,
    submission_id: i64,
) -> String {
    let job_id = jobs.register().await;
    let value = job_id.clone();

    tokio::spawn(async move {
        let tx = jobs.tx.clone();
        let job_for_blocking = value.clone();
        let handle = tokio::task::spawn_blocking(move || {
            ledger::revalidate(&state, project_id, submission_id, |pct| {
                let _ = tx.blocking_send(JobUpdate {
                    job_id: job_for_blocking.clone(),
                    status: JobStatus::InProgress(pct),
                });
            })
        });

        let status = match handle.await {
            Ok(Ok(result)) => match serde_json::to_string(&result) {
                Ok(json) => JobStatus::Completed(json),
                Err(e) => JobStatus::Failed(e.to_string()),
            },
            Ok(Err(e)) => JobStatus::Failed(e.to_string()),
            Err(join_err) => {
                error!("revalidation job {} panicked: {}", value, join_err);
                JobStatus::Failed(format!("join error: {}", join_err))
            }
        };
        jobs.finish(value, status).await;
    });

    job_id
}
