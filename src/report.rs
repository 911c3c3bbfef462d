use crate::detect::Completion;
use crate::error::JobError;
use crate::util::now_rfc3339;
use serde::{Deserialize, Serialize};

/// One timestamped diagnostic step. Trails survive into the manifest so a
/// failed job can be reconstructed without rerunning it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrailEntry {
    pub step: String,
    pub detail: String,
    pub at: String,
}

impl TrailEntry {
    pub fn note(step: &str, detail: impl Into<String>) -> Self {
        Self {
            step: step.to_string(),
            detail: detail.into(),
            at: now_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub index: usize,
    pub filename: String,
    pub input_sha256: String,
    pub ok: bool,
    #[serde(default)]
    pub error_kind: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub output_file: Option<String>,
    #[serde(default)]
    pub completion: Option<Completion>,
    pub trail: Vec<TrailEntry>,
    pub started: String,
    pub finished: String,
}

/// A finished job. Constructed only through `success` and `failure` so image
/// bytes never exist without a matching terminal record.
#[derive(Debug)]
pub struct JobOutcome {
    pub record: JobRecord,
    pub image: Option<Vec<u8>>,
}

impl JobOutcome {
    pub fn success(mut record: JobRecord, image: Vec<u8>) -> Self {
        record.ok = true;
        record.trail.push(TrailEntry::note("job", "success"));
        Self {
            record,
            image: Some(image),
        }
    }

    pub fn failure(mut record: JobRecord, err: &JobError) -> Self {
        record.ok = false;
        record.error_kind = Some(err.kind().to_string());
        record.error = Some(err.to_string());
        record.trail.push(TrailEntry::note("job", format!("failed: {err}")));
        Self {
            record,
            image: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchStatus {
    AllSucceeded,
    Partial,
    AllFailed,
}

#[derive(Debug)]
pub struct BatchOutput {
    pub source_lang: String,
    pub target_lang: String,
    pub started: String,
    pub finished: String,
    pub jobs: Vec<JobOutcome>,
}

impl BatchOutput {
    pub fn succeeded(&self) -> usize {
        self.jobs.iter().filter(|j| j.record.ok).count()
    }

    pub fn failed(&self) -> usize {
        self.jobs.len() - self.succeeded()
    }

    pub fn status(&self) -> BatchStatus {
        let succeeded = self.succeeded();
        if !self.jobs.is_empty() && succeeded == self.jobs.len() {
            BatchStatus::AllSucceeded
        } else if succeeded > 0 {
            BatchStatus::Partial
        } else {
            BatchStatus::AllFailed
        }
    }

    pub fn manifest(&self, batch_id: &str) -> BatchManifest {
        BatchManifest {
            batch_id: batch_id.to_string(),
            source_lang: self.source_lang.clone(),
            target_lang: self.target_lang.clone(),
            started: self.started.clone(),
            finished: self.finished.clone(),
            total: self.jobs.len(),
            succeeded: self.succeeded(),
            failed: self.failed(),
            status: self.status(),
            jobs: self.jobs.iter().map(|j| j.record.clone()).collect(),
        }
    }
}

/// Persisted per-batch summary; job records appear in submission order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchManifest {
    pub batch_id: String,
    pub source_lang: String,
    pub target_lang: String,
    pub started: String,
    pub finished: String,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub status: BatchStatus,
    pub jobs: Vec<JobRecord>,
}
