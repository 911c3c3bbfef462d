use crate::config::Config;
use crate::driver::{Probe, Session};
use crate::error::JobError;
use crate::report::TrailEntry;
use crate::util::file_stem_lossy;
use std::path::Path;
use tracing::{debug, info, warn};

enum SelectorOutcome {
    Usable,
    Disabled,
    Absent,
}

/// Hands `image_path` to the page's file input. Selector candidates are
/// tried strictly in configured order, most specific first; the first one
/// that is present and enabled wins. The input itself is typically hidden,
/// so visibility is deliberately not required.
pub async fn submit_image(
    cfg: &Config,
    session: &dyn Session,
    image_path: &Path,
    work_dir: &Path,
    trail: &mut Vec<TrailEntry>,
) -> Result<String, JobError> {
    dismiss_browse_affordance(cfg, session, trail).await;

    let mut tried = 0usize;
    for selector in &cfg.upload.selectors {
        tried += 1;
        match probe_selector(cfg, session, selector).await {
            SelectorOutcome::Usable => {
                info!("upload control found: {selector}");
                trail.push(TrailEntry::note("upload.probe", format!("hit: {selector}")));
                if let Err(err) = session.set_file_input(selector, image_path).await {
                    trail.push(TrailEntry::note(
                        "upload.submit",
                        format!("dispatch failed: {err:#}"),
                    ));
                    return Err(JobError::UploadNotFound { tried });
                }
                trail.push(TrailEntry::note(
                    "upload.submit",
                    format!("sent {}", image_path.display()),
                ));
                session.settle(cfg.upload.post_upload_delay_seconds).await;
                return Ok(selector.clone());
            }
            SelectorOutcome::Disabled => {
                trail.push(TrailEntry::note(
                    "upload.probe",
                    format!("miss (disabled): {selector}"),
                ));
            }
            SelectorOutcome::Absent => {
                trail.push(TrailEntry::note("upload.probe", format!("miss: {selector}")));
            }
        }
    }

    warn!("no upload control matched after {tried} selectors");
    if cfg.debug.snapshot_on_upload_miss {
        snapshot_page(session, image_path, work_dir, trail).await;
    }
    Err(JobError::UploadNotFound { tried })
}

/// Polls one selector for up to the configured budget.
async fn probe_selector(cfg: &Config, session: &dyn Session, selector: &str) -> SelectorOutcome {
    let target = Probe::css(selector);
    let budget = cfg.upload.probe_timeout_seconds;
    let mut last_found = false;
    for tick in 0..=budget {
        match session.probe(&target).await {
            Ok(probe) if probe.found && probe.enabled => return SelectorOutcome::Usable,
            Ok(probe) => last_found = probe.found,
            Err(err) => debug!("probe {selector}: {err:#}"),
        }
        if tick < budget {
            session.settle(1).await;
        }
    }
    if last_found {
        SelectorOutcome::Disabled
    } else {
        SelectorOutcome::Absent
    }
}

/// Some variants of the page hide the input behind a browse button. Clicking
/// it is best effort; the job continues either way.
async fn dismiss_browse_affordance(
    cfg: &Config,
    session: &dyn Session,
    trail: &mut Vec<TrailEntry>,
) {
    for phrase in &cfg.upload.browse_phrases {
        match session.click(&Probe::text(Some("button"), phrase)).await {
            Ok(true) => {
                trail.push(TrailEntry::note(
                    "upload.dismiss",
                    format!("clicked '{phrase}'"),
                ));
                session.settle(cfg.upload.browse_settle_seconds).await;
                return;
            }
            Ok(false) => {}
            Err(err) => debug!("browse dismissal: {err:#}"),
        }
    }
    trail.push(TrailEntry::note(
        "upload.dismiss",
        "no browse affordance present",
    ));
}

async fn snapshot_page(
    session: &dyn Session,
    image_path: &Path,
    work_dir: &Path,
    trail: &mut Vec<TrailEntry>,
) {
    match session.capture_page().await {
        Ok(bytes) => {
            let snap = work_dir.join(format!("{}_upload_miss.png", file_stem_lossy(image_path)));
            match std::fs::write(&snap, &bytes) {
                Ok(()) => trail.push(TrailEntry::note(
                    "upload.snapshot",
                    snap.display().to_string(),
                )),
                Err(err) => trail.push(TrailEntry::note(
                    "upload.snapshot",
                    format!("write failed: {err}"),
                )),
            }
        }
        Err(err) => trail.push(TrailEntry::note(
            "upload.snapshot",
            format!("capture failed: {err:#}"),
        )),
    }
}
