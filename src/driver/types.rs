use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverDiag {
    pub executable: String,
    pub browser_version: Option<String>,
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageInfo {
    pub url: String,
    pub title: String,
}

/// How to look for an element. `Css` goes through the selector engine;
/// `Text` matches against an element's direct text nodes only, so a hit on
/// `<div>` never bubbles up from a nested child.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Probe {
    Css(String),
    Text {
        tag: Option<String>,
        contains: String,
    },
}

impl Probe {
    pub fn css(selector: &str) -> Self {
        Probe::Css(selector.to_string())
    }

    pub fn text(tag: Option<&str>, contains: &str) -> Self {
        Probe::Text {
            tag: tag.map(|t| t.to_string()),
            contains: contains.to_string(),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Probe::Css(selector) => format!("css {selector}"),
            Probe::Text {
                tag: Some(tag),
                contains,
            } => format!("<{tag}> text '{contains}'"),
            Probe::Text {
                tag: None,
                contains,
            } => format!("text '{contains}'"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ElementProbe {
    pub found: bool,
    pub enabled: bool,
    pub visible: bool,
}

/// Geometry and source of one `<img>`, in document order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageImage {
    pub index: usize,
    #[serde(default)]
    pub src: Option<String>,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageView {
    pub viewport_width: f64,
    pub images: Vec<PageImage>,
}
