use crate::config::Config;
use crate::driver::{Probe, Session};
use crate::report::TrailEntry;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Terminal state of the completion wait. `TimedOut` is not fatal: the page
/// may have finished without showing any indicator we know, so extraction
/// still runs. `Failed` aborts the job before extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Completion {
    Detected { indicator: String, tick: u32 },
    TimedOut { ticks: u32 },
    Failed { reason: String },
}

pub struct Indicator {
    pub name: &'static str,
    pub probe: Probe,
}

/// Ordered completion signals; the first visible match wins.
pub fn completion_indicators() -> Vec<Indicator> {
    vec![
        Indicator {
            name: "download-translation-button",
            probe: Probe::text(Some("button"), "Download translation"),
        },
        Indicator {
            name: "copy-text-button",
            probe: Probe::text(Some("button"), "Copy text"),
        },
        Indicator {
            name: "detected-language-label",
            probe: Probe::text(None, "Detected language"),
        },
        Indicator {
            name: "download-aria",
            probe: Probe::css("[aria-label*='Download']"),
        },
        Indicator {
            name: "copy-aria",
            probe: Probe::css("[aria-label*='Copy']"),
        },
    ]
}

/// Polls once per tick until an indicator is visible or the budget runs out.
/// Probe errors are tolerated; a flaky tick must not kill the wait. Explicit
/// failure phrases are only checked after the whole budget is exhausted, so
/// a slow success is never misread as a rejection.
pub async fn await_completion(
    cfg: &Config,
    session: &dyn Session,
    trail: &mut Vec<TrailEntry>,
) -> Completion {
    let det = &cfg.detection;
    let indicators = completion_indicators();

    for tick in 0..det.max_wait_seconds {
        for indicator in &indicators {
            match session.probe(&indicator.probe).await {
                Ok(probe) if probe.visible => {
                    info!(
                        "completion indicator '{}' visible at tick {tick}",
                        indicator.name
                    );
                    trail.push(TrailEntry::note(
                        "detect.hit",
                        format!("{} at tick {tick}", indicator.name),
                    ));
                    return Completion::Detected {
                        indicator: indicator.name.to_string(),
                        tick,
                    };
                }
                Ok(_) => {}
                Err(err) => debug!("indicator probe {}: {err:#}", indicator.name),
            }
        }
        session.settle(det.poll_interval_seconds).await;
    }

    let text = match session.visible_text().await {
        Ok(text) => text.to_lowercase(),
        Err(err) => {
            debug!("visible text scan: {err:#}");
            String::new()
        }
    };
    for phrase in &det.failure_phrases {
        if text.contains(&phrase.to_lowercase()) {
            warn!("site reports failure: {phrase}");
            trail.push(TrailEntry::note("detect.failed", phrase.clone()));
            return Completion::Failed {
                reason: phrase.clone(),
            };
        }
    }

    trail.push(TrailEntry::note(
        "detect.timeout",
        format!("no indicator after {} ticks", det.max_wait_seconds),
    ));
    Completion::TimedOut {
        ticks: det.max_wait_seconds,
    }
}
