use crate::config::Config;
use crate::detect::{self, Completion};
use crate::driver::{Driver, Session};
use crate::error::JobError;
use crate::extract;
use crate::navigate;
use crate::report::{BatchOutput, JobOutcome, JobRecord, TrailEntry};
use crate::upload;
use crate::util::{ensure_dir, now_rfc3339};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::TempDir;
use tokio::time::{Duration, sleep};
use tracing::{info, warn};

/// One validated input image, in submission order.
#[derive(Debug, Clone)]
pub struct JobInput {
    pub index: usize,
    pub filename: String,
    pub path: PathBuf,
    pub input_sha256: String,
}

#[derive(Debug)]
struct StagedJob {
    index: usize,
    filename: String,
    input_sha256: String,
    path: PathBuf,
}

enum WorkDir {
    Configured(PathBuf),
    Temp(TempDir),
}

impl WorkDir {
    fn prepare(cfg: &Config) -> Result<Self> {
        if cfg.paths.work_dir.is_empty() {
            Ok(WorkDir::Temp(
                TempDir::new().with_context(|| "creating work dir")?,
            ))
        } else {
            let path = PathBuf::from(&cfg.paths.work_dir);
            ensure_dir(&path)?;
            Ok(WorkDir::Configured(path))
        }
    }

    fn path(&self) -> &Path {
        match self {
            WorkDir::Configured(p) => p,
            WorkDir::Temp(t) => t.path(),
        }
    }
}

/// Runs jobs strictly one at a time, in submission order. A failed job is
/// recorded and the batch moves on; only batch-level problems (staging,
/// timeout) abort the whole run.
pub struct Batch<D: Driver> {
    cfg: Config,
    driver: D,
}

impl<D: Driver> Batch<D> {
    pub fn new(cfg: &Config, driver: D) -> Self {
        Self {
            cfg: cfg.clone(),
            driver,
        }
    }

    pub async fn run(
        &self,
        inputs: &[JobInput],
        source: &str,
        target: &str,
    ) -> Result<BatchOutput> {
        let started_at = Instant::now();
        let started = now_rfc3339();

        let work = WorkDir::prepare(&self.cfg)?;
        let staged = stage_inputs(inputs, work.path())?;
        let total = staged.len();
        let mut jobs: Vec<JobOutcome> = Vec::with_capacity(total);

        for (i, job) in staged.iter().enumerate() {
            if i > 0 {
                sleep(Duration::from_secs(self.cfg.batch.inter_job_delay_seconds)).await;
            }
            if self.cfg.limits.batch_timeout_seconds > 0
                && started_at.elapsed().as_secs() > self.cfg.limits.batch_timeout_seconds
            {
                anyhow::bail!(
                    "batch timeout exceeded: {}s",
                    self.cfg.limits.batch_timeout_seconds
                );
            }

            info!("job {}/{total} start: {}", i + 1, job.filename);
            let outcome = self.run_job(job, source, target).await;
            if outcome.record.ok {
                info!("job {}/{total} ok: {}", i + 1, job.filename);
            } else {
                warn!("job {}/{total} failed: {}", i + 1, job.filename);
            }
            jobs.push(outcome);
            info!(completed = jobs.len(), total, "batch progress");
        }

        Ok(BatchOutput {
            source_lang: source.to_string(),
            target_lang: target.to_string(),
            started,
            finished: now_rfc3339(),
            jobs,
        })
    }

    /// One job, one browser session. The session is released exactly once on
    /// every path out of here; release problems are logged, never raised.
    async fn run_job(&self, job: &StagedJob, source: &str, target: &str) -> JobOutcome {
        let started = now_rfc3339();
        let mut trail = Vec::new();
        let mut completion = None;

        let mut session = match self.driver.acquire().await {
            Ok(session) => {
                trail.push(TrailEntry::note("session.acquire", "browser session started"));
                session
            }
            Err(err) => {
                let err = JobError::SessionStart(format!("{err:#}"));
                warn!("{err}");
                trail.push(TrailEntry::note("session.acquire", err.to_string()));
                return JobOutcome::failure(base_record(job, started, trail, None), &err);
            }
        };

        let result = self
            .drive(
                session.as_ref(),
                job,
                source,
                target,
                &mut completion,
                &mut trail,
            )
            .await;
        session.close().await;
        trail.push(TrailEntry::note("session.release", "browser session closed"));

        let record = base_record(job, started, trail, completion);
        match result {
            Ok(image) => JobOutcome::success(record, image),
            Err(err) => {
                warn!("job {} failed: {err}", job.filename);
                JobOutcome::failure(record, &err)
            }
        }
    }

    async fn drive(
        &self,
        session: &dyn Session,
        job: &StagedJob,
        source: &str,
        target: &str,
        completion_out: &mut Option<Completion>,
        trail: &mut Vec<TrailEntry>,
    ) -> Result<Vec<u8>, JobError> {
        navigate::open_translate_page(&self.cfg, session, source, target, trail).await?;
        let snapshot_dir = job.path.parent().unwrap_or_else(|| Path::new("."));
        upload::submit_image(&self.cfg, session, &job.path, snapshot_dir, trail).await?;

        let completion = detect::await_completion(&self.cfg, session, trail).await;
        *completion_out = Some(completion.clone());
        if let Completion::Failed { reason } = completion {
            return Err(JobError::TranslationRejected(reason));
        }

        session
            .settle(self.cfg.detection.post_detect_delay_seconds)
            .await;
        extract::extract_translated(&self.cfg, session, trail).await
    }
}

/// Inputs are copied into the work dir so the browser always sees a stable
/// absolute path, whatever happens to the originals mid-batch.
fn stage_inputs(inputs: &[JobInput], work_dir: &Path) -> Result<Vec<StagedJob>> {
    let mut staged = Vec::with_capacity(inputs.len());
    for job in inputs {
        let staged_name = format!("input_{:03}_{}", job.index + 1, job.filename);
        let staged_path = work_dir.join(&staged_name);
        std::fs::copy(&job.path, &staged_path).with_context(|| {
            format!(
                "staging {} -> {}",
                job.path.display(),
                staged_path.display()
            )
        })?;
        staged.push(StagedJob {
            index: job.index,
            filename: job.filename.clone(),
            input_sha256: job.input_sha256.clone(),
            path: staged_path,
        });
    }
    Ok(staged)
}

fn base_record(
    job: &StagedJob,
    started: String,
    trail: Vec<TrailEntry>,
    completion: Option<Completion>,
) -> JobRecord {
    JobRecord {
        index: job.index,
        filename: job.filename.clone(),
        input_sha256: job.input_sha256.clone(),
        ok: false,
        error_kind: None,
        error: None,
        output_file: None,
        completion,
        trail,
        started,
        finished: now_rfc3339(),
    }
}
