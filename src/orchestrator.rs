//! Job lifecycle: submission, phase advancement, status and result reads.
//!
//! # Phases
//!
//! ```text
//! submit ──▶ extracting ──▶ processing ──▶ analyzing ──▶ complete
//!                 │              │              │
//!                 └──────────────┴──────────────┴──────▶ error
//! ```
//!
//! Every transition is written to the store before the next step starts.
//! Parsing and analysis each run under [`race`]: the stage is spawned and
//! raced against a timer. Losing the race fails the job with
//! `"<stage> timed out"`; the spawned work is detached, not aborted, and
//! its late result is discarded (a late cache write stores the same value
//! under the same key).
//!
//! Failures inside a run are recorded as an `error` status rather than
//! returned; only an unknown job id is an error to the caller.
//!
//! At most one run per job is in flight across all clones of an
//! [`Orchestrator`]. A trigger that finds the job claimed, or already past
//! `extracting`, reports the stored status and does nothing else.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqtrace_core::cache::AnalysisCache;
use reqtrace_core::error::{PipelineError, Result};
use reqtrace_core::models::{AnalysisResult, FileNames, JobFiles, Phase, Status};
use reqtrace_core::repo::JobRepository;

use crate::extract::DocumentParser;
use crate::searchable::derive_searchable;

/// Stage label used in parse timeout messages.
pub const PARSE_STAGE: &str = "File parsing";
/// Stage label used in analysis timeout messages.
pub const ANALYSIS_STAGE: &str = "Analysis";

/// Run `fut` on its own task and wait at most `timeout` for it.
pub async fn race<T, F>(stage: &str, timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::spawn(fut);
    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(join)) => Err(PipelineError::Internal(join.into())),
        Err(_) => {
            tracing::warn!(stage, timeout_secs = timeout.as_secs_f64(), "stage timed out");
            Err(PipelineError::Timeout(stage.to_string()))
        }
    }
}

/// Job ids with a run in progress.
#[derive(Clone, Default)]
struct InFlight(Arc<Mutex<HashSet<String>>>);

impl InFlight {
    fn claim(&self, job_id: &str) -> Option<Claim> {
        let mut ids = self.0.lock().unwrap_or_else(|p| p.into_inner());
        ids.insert(job_id.to_string()).then(|| Claim {
            ids: self.0.clone(),
            job_id: job_id.to_string(),
        })
    }
}

/// Releases the job id when dropped.
struct Claim {
    ids: Arc<Mutex<HashSet<String>>>,
    job_id: String,
}

impl Drop for Claim {
    fn drop(&mut self) {
        let mut ids = self.ids.lock().unwrap_or_else(|p| p.into_inner());
        ids.remove(&self.job_id);
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    repo: JobRepository,
    parser: Arc<dyn DocumentParser>,
    cache: AnalysisCache,
    stage_timeout: Duration,
    in_flight: InFlight,
}

impl Orchestrator {
    pub fn new(
        repo: JobRepository,
        parser: Arc<dyn DocumentParser>,
        cache: AnalysisCache,
        stage_timeout: Duration,
    ) -> Self {
        Self {
            repo,
            parser,
            cache,
            stage_timeout,
            in_flight: InFlight::default(),
        }
    }

    /// Store the files and names of a new job and mark it `extracting`.
    pub async fn submit(&self, files: JobFiles, names: FileNames) -> Result<String> {
        if files.base.trim().is_empty() {
            return Err(PipelineError::Validation("baseDoc is required".to_string()));
        }
        if files.tests.trim().is_empty() {
            return Err(PipelineError::Validation(
                "testsTable is required".to_string(),
            ));
        }

        let job_id = uuid::Uuid::new_v4().to_string();
        self.repo.put_files(&job_id, &files).await?;
        self.repo.put_file_names(&job_id, &names).await?;
        self.repo
            .put_status(
                &job_id,
                &Status::new(Phase::Extracting, "Files uploaded, waiting for processing", 0),
            )
            .await?;

        tracing::info!(
            job_id = %job_id,
            base = %names.base_name,
            updated = names.updated_name.as_deref().unwrap_or(""),
            tests = %names.tests_name,
            "job submitted"
        );
        Ok(job_id)
    }

    /// Drive a job from `extracting` to a terminal phase.
    ///
    /// A job that is already running, or past `extracting`, is left alone
    /// and its current status is returned.
    pub async fn advance(&self, job_id: &str) -> Result<Status> {
        let Some(_claim) = self.in_flight.claim(job_id) else {
            tracing::info!(job_id, "advance skipped; run already in flight");
            return self.status(job_id).await;
        };

        let current = self.status(job_id).await?;
        if current.phase != Phase::Extracting {
            tracing::info!(job_id, phase = current.phase.as_str(), "advance skipped");
            return Ok(current);
        }

        match self.run(job_id).await {
            Ok(status) => Ok(status),
            Err(e) => {
                tracing::error!(job_id, error = %e, code = e.code(), "job failed");
                let failed = Status::failed(e.to_string());
                self.repo.put_status(job_id, &failed).await?;
                Ok(failed)
            }
        }
    }

    async fn transition(&self, job_id: &str, status: Status) -> Result<Status> {
        tracing::info!(job_id, phase = status.phase.as_str(), "phase transition");
        self.repo.put_status(job_id, &status).await?;
        Ok(status)
    }

    async fn run(&self, job_id: &str) -> Result<Status> {
        let files = self
            .repo
            .files(job_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("files for job {}", job_id)))?;

        self.transition(job_id, Status::new(Phase::Processing, "Processing files...", 0))
            .await?;

        let parser = self.parser.clone();
        let parsed = race(PARSE_STAGE, self.stage_timeout, async move {
            parser.parse(&files).await
        })
        .await?;

        self.transition(
            job_id,
            Status::new(Phase::Analyzing, "Analyzing requirements...", 50),
        )
        .await?;

        let rows = parsed.tests.clone();
        let cache = self.cache.clone();
        let result = race(ANALYSIS_STAGE, self.stage_timeout, async move {
            cache
                .get_or_compute(&parsed.base, &parsed.updated, &parsed.tests)
                .await
        })
        .await?;

        self.repo.put_result(job_id, &result).await?;
        tracing::info!(
            job_id,
            outcome = ?result.status,
            requirements = result.requirements.len(),
            links = result.links.len(),
            coverage = result.coverage_metrics.coverage_percentage,
            "analysis stored"
        );

        self.index_tests(job_id, &rows).await?;

        self.transition(job_id, Status::new(Phase::Complete, "Analysis complete", 100))
            .await
    }

    async fn index_tests(&self, job_id: &str, rows: &[Vec<String>]) -> Result<()> {
        let Some(names) = self.repo.file_names(job_id).await? else {
            tracing::warn!(job_id, "no file names stored; skipping search indexing");
            return Ok(());
        };
        let items = derive_searchable(job_id, &names.tests_name, rows);
        if !items.is_empty() {
            self.repo.put_searchable(job_id, &items).await?;
            tracing::info!(job_id, items = items.len(), "searchable items stored");
        }
        Ok(())
    }

    pub async fn status(&self, job_id: &str) -> Result<Status> {
        self.repo
            .status(job_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("job {}", job_id)))
    }

    /// Return the job's result and drop its files, status and result.
    pub async fn take_result(&self, job_id: &str) -> Result<AnalysisResult> {
        let result = self
            .repo
            .result(job_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("result for job {}", job_id)))?;
        self.repo.cleanup(job_id).await?;
        tracing::info!(job_id, "result taken; job state cleaned up");
        Ok(result)
    }
}
