//! Tracks long-running background jobs.
//!
//! Revalidating a stored submission runs outside the request/response cycle
//! (see `services/submissions/revalidate.rs`). Workers never touch the job map
//! directly: they push [`JobUpdate`] messages into a channel and a single
//! updater task, started in `main.rs`, applies them. Clients poll
//! `GET /api/jobs/{job_id}`; a finished job answers for an hour and is then
//! forgotten.

use common::jobs::JobStatus;
use std::time::{Duration, Instant};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Buffered updates before workers start waiting on the updater.
const UPDATE_CHANNEL_CAPACITY: usize = 100;

/// How long a finished job's result stays available to pollers.
const FINISHED_JOB_TTL: Duration = Duration::from_secs(60 * 60);

/// A job's latest status, plus when it reached a final one.
#[derive(Debug, Clone)]
pub struct TrackedJob {
    pub status: JobStatus,
    finished_at: Option<Instant>,
}

impl TrackedJob {
    fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }
}

pub type JobMap = Arc<RwLock<HashMap<String, TrackedJob>>>;

/// Shared, clonable handle to the state of all jobs.
#[derive(Clone)]
pub struct JobsState {
    /// Job id to its latest status. Read by the status endpoint, written by
    /// the updater task and by the task that owns a job when it finishes.
    pub jobs: JobMap,

    /// Where workers send their progress.
    pub tx: mpsc::Sender<JobUpdate>,

    /// Finished jobs older than this are dropped on the next write.
    ttl: Duration,
}

#[derive(Debug)]
pub struct JobUpdate {
    pub(crate) job_id: String,
    pub(crate) status: JobStatus,
}

impl JobsState {
    /// Creates an empty state and the receiver to hand to [`start_job_updater`].
    pub fn new() -> (Self, mpsc::Receiver<JobUpdate>) {
        Self::with_ttl(FINISHED_JOB_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> (Self, mpsc::Receiver<JobUpdate>) {
        let (tx, rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
        let state = JobsState {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            tx,
            ttl,
        };
        (state, rx)
    }

    /// Registers a new job as `Pending` and returns its id.
    pub async fn register(&self) -> String {
        let job_id = Uuid::new_v4().to_string();
        let mut jobs = self.jobs.write().await;
        self.evict_expired(&mut jobs);
        jobs.insert(
            job_id.clone(),
            TrackedJob {
                status: JobStatus::Pending,
                finished_at: None,
            },
        );
        job_id
    }

    pub async fn finish(&self, job_id: String, status: JobStatus) {
        let mut jobs = self.jobs.write().await;
        self.evict_expired(&mut jobs);
        jobs.insert(
            job_id,
            TrackedJob {
                status,
                finished_at: Some(Instant::now()),
            },
        );
    }

    pub async fn status(&self, job_id: &str) -> Option<JobStatus> {
        self.jobs.read().await.get(job_id).map(|job| job.status.clone())
    }

    fn evict_expired(&self, jobs: &mut HashMap<String, TrackedJob>) {
        let ttl = self.ttl;
        jobs.retain(|_, job| !matches!(job.finished_at, Some(at) if at.elapsed() >= ttl));
    }
}

/// Applies every [`JobUpdate`] received on `rx` until all senders are gone.
///
/// A late progress update never overwrites a final status, and never brings
/// back a job that was already evicted.
pub async fn start_job_updater(jobs: JobMap, mut rx: mpsc::Receiver<JobUpdate>) {
    while let Some(update) = rx.recv().await {
        let mut jobs = jobs.write().await;
        if let Some(job) = jobs.get_mut(&update.job_id) {
            if !job.is_finished() {
                job.status = update.status;
            }
        }
    }
}
