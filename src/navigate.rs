use crate::config::{Config, Navigation};
use crate::driver::{PageInfo, Probe, Session};
use crate::error::JobError;
use crate::report::TrailEntry;
use anyhow::Result;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Clone)]
pub struct NavigationState {
    pub url: String,
    pub title: String,
}

/// Builds the images-mode translate URL for a language pair.
pub fn translate_url(base: &str, source: &str, target: &str) -> Result<String> {
    let mut url = Url::parse(base)?;
    url.query_pairs_mut()
        .append_pair("sl", source)
        .append_pair("tl", target)
        .append_pair("op", "images");
    Ok(url.to_string())
}

/// True when the loaded page is recognizably the translate UI. A page that
/// loaded fine but is something else (consent wall, error page) is a
/// navigation failure even though transport succeeded.
pub fn matches_identity(nav: &Navigation, info: &PageInfo) -> bool {
    if nav.url_marker.is_empty() && nav.title_marker.is_empty() {
        return true;
    }
    let url = info.url.to_lowercase();
    let title = info.title.to_lowercase();
    (!nav.url_marker.is_empty() && url.contains(&nav.url_marker.to_lowercase()))
        || (!nav.title_marker.is_empty() && title.contains(&nav.title_marker.to_lowercase()))
}

pub async fn open_translate_page(
    cfg: &Config,
    session: &dyn Session,
    source: &str,
    target: &str,
    trail: &mut Vec<TrailEntry>,
) -> Result<NavigationState, JobError> {
    let nav = &cfg.navigation;
    let url = translate_url(&nav.base_url, source, target)
        .map_err(|err| JobError::Navigation(format!("building target URL: {err}")))?;

    info!("navigating to {url}");
    session
        .navigate(&url)
        .await
        .map_err(|err| JobError::Navigation(format!("{err:#}")))?;
    trail.push(TrailEntry::note("navigate.goto", &url));

    wait_document_ready(cfg, session).await?;
    trail.push(TrailEntry::note("navigate.ready", "document ready"));
    session.settle(nav.settle_seconds).await;

    let info = session
        .page_info()
        .await
        .map_err(|err| JobError::Navigation(format!("reading page identity: {err:#}")))?;
    if !matches_identity(nav, &info) {
        trail.push(TrailEntry::note(
            "navigate.identity",
            format!("unexpected page: url={} title={}", info.url, info.title),
        ));
        return Err(JobError::Navigation(format!(
            "landed on unexpected page: url={} title={}",
            info.url, info.title
        )));
    }
    trail.push(TrailEntry::note(
        "navigate.identity",
        format!("url={} title={}", info.url, info.title),
    ));

    // The images tab is usually preselected by op=images; clicking it is
    // best effort and never fails the job.
    if !nav.tab_text.is_empty() {
        match session.click(&Probe::text(Some("div"), &nav.tab_text)).await {
            Ok(true) => {
                debug!("clicked {} tab", nav.tab_text);
                session.settle(nav.tab_settle_seconds).await;
            }
            Ok(false) => debug!("{} tab not present", nav.tab_text),
            Err(err) => debug!("tab click failed: {err:#}"),
        }
    }

    Ok(NavigationState {
        url: info.url,
        title: info.title,
    })
}

async fn wait_document_ready(cfg: &Config, session: &dyn Session) -> Result<(), JobError> {
    let budget = cfg.navigation.page_ready_timeout_seconds;
    for tick in 0..=budget {
        if let Ok(state) = session.ready_state().await {
            if state == "complete" {
                return Ok(());
            }
        }
        if tick < budget {
            session.settle(1).await;
        }
    }
    Err(JobError::Navigation(format!(
        "document not ready after {budget}s"
    )))
}
