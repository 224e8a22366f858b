use crate::error::{Error, NotFoundReason, Result};
use crate::job_controller::state::JobsState;
use actix_web::{web, HttpResponse};

/// `GET /api/jobs/{job_id}`: the current `JobStatus` of a job.
pub async fn process(
    job_id: web::Path<String>,
    state: web::Data<JobsState>,
) -> Result<HttpResponse> {
    let job_id = job_id.into_inner();
    match state.status(&job_id).await {
        Some(status) => Ok(HttpResponse::Ok().json(status)),
        None => Err(Error::not_found(
            NotFoundReason::Job,
            format!("job {} not found", job_id),
        )),
    }
}
