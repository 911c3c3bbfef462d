use crate::config::{Config, Extraction};
use crate::driver::{PageImage, PageView, Session};
use crate::error::JobError;
use crate::report::TrailEntry;
use crate::util::decode_data_url;
use tracing::{info, warn};

/// Indices into `PageView::images` after classification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub original: Option<usize>,
    pub translated: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
enum Strategy {
    Canvas,
    ElementCapture,
    PageCapture,
}

impl Strategy {
    fn name(self) -> &'static str {
        match self {
            Strategy::Canvas => "canvas",
            Strategy::ElementCapture => "element-capture",
            Strategy::PageCapture => "page-capture",
        }
    }
}

const CASCADE: [Strategy; 3] = [
    Strategy::Canvas,
    Strategy::ElementCapture,
    Strategy::PageCapture,
];

/// Sources that only exist inside the page session (uploaded previews).
fn is_transient_src(src: &str) -> bool {
    src.starts_with("blob:") || src.starts_with("data:image")
}

fn qualifies(img: &PageImage, min_px: f64) -> bool {
    img.width >= min_px && img.height >= min_px
}

/// The uploaded preview: last qualifying transient-src image sitting on the
/// left half of the viewport.
pub fn find_original(view: &PageView, min_px: f64) -> Option<usize> {
    let half = view.viewport_width / 2.0;
    let mut found = None;
    for img in &view.images {
        if !qualifies(img, min_px) {
            continue;
        }
        let Some(src) = img.src.as_deref() else {
            continue;
        };
        if is_transient_src(src) && img.x < half {
            found = Some(img.index);
        }
    }
    found
}

/// Classifies the page's images into original and translated. Translated
/// candidates are the qualifying images that are not the original and do not
/// share its source; of those, preference order is right half of the
/// viewport, then a translation-hosting source, then the last remaining in
/// document order.
pub fn select_images(view: &PageView, cfg: &Extraction) -> Selection {
    let min_px = cfg.min_dimension_px;
    let original = find_original(view, min_px);
    let original_src = original
        .and_then(|i| view.images.iter().find(|img| img.index == i))
        .and_then(|img| img.src.clone());

    let remaining: Vec<&PageImage> = view
        .images
        .iter()
        .filter(|img| qualifies(img, min_px))
        .filter(|img| Some(img.index) != original)
        .filter(|img| original_src.is_none() || img.src != original_src)
        .collect();

    let half = view.viewport_width / 2.0;
    let translated = remaining
        .iter()
        .find(|img| img.x > half)
        .map(|img| img.index)
        .or_else(|| {
            remaining
                .iter()
                .find(|img| {
                    img.src.as_deref().is_some_and(|src| {
                        cfg.translation_markers.iter().any(|m| src.contains(m.as_str()))
                    })
                })
                .map(|img| img.index)
        })
        .or_else(|| remaining.last().map(|img| img.index));

    Selection {
        original,
        translated,
    }
}

/// Pulls the translated image out of the page. Strategies run in a fixed
/// cascade and every attempt lands in the trail; only exhausting the whole
/// cascade fails the job.
pub async fn extract_translated(
    cfg: &Config,
    session: &dyn Session,
    trail: &mut Vec<TrailEntry>,
) -> Result<Vec<u8>, JobError> {
    let view = session
        .page_images()
        .await
        .map_err(|err| JobError::ExtractionExhausted(format!("enumerating page images: {err:#}")))?;

    let selection = select_images(&view, &cfg.extraction);
    match selection.original {
        Some(index) => trail.push(TrailEntry::note(
            "extract.classify",
            format!("original image at index {index}"),
        )),
        None => trail.push(TrailEntry::note(
            "extract.classify",
            "no original image identified",
        )),
    }

    let Some(index) = selection.translated else {
        trail.push(TrailEntry::note(
            "extract.classify",
            "no translated image candidate",
        ));
        return Err(JobError::ExtractionExhausted(
            "no translated image candidate on the page".to_string(),
        ));
    };
    trail.push(TrailEntry::note(
        "extract.classify",
        format!("translated image at index {index}"),
    ));

    let mut last_error = String::new();
    for strategy in CASCADE {
        match attempt(session, strategy, index).await {
            Ok(bytes) => {
                info!(
                    "extracted translated image via {} ({} bytes)",
                    strategy.name(),
                    bytes.len()
                );
                trail.push(TrailEntry::note(
                    "extract.attempt",
                    format!("{}: ok ({} bytes)", strategy.name(), bytes.len()),
                ));
                return Ok(bytes);
            }
            Err(err) => {
                warn!("extraction strategy {} failed: {err:#}", strategy.name());
                last_error = format!("{err:#}");
                trail.push(TrailEntry::note(
                    "extract.attempt",
                    format!("{}: failed: {last_error}", strategy.name()),
                ));
            }
        }
    }

    Err(JobError::ExtractionExhausted(last_error))
}

async fn attempt(
    session: &dyn Session,
    strategy: Strategy,
    index: usize,
) -> anyhow::Result<Vec<u8>> {
    match strategy {
        Strategy::Canvas => {
            let data_url = session.render_image(index).await?;
            decode_data_url(&data_url)
        }
        Strategy::ElementCapture => session.capture_image(index).await,
        Strategy::PageCapture => session.capture_page().await,
    }
}
