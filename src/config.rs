use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub batch: Batch,
    #[serde(default)]
    pub browser: Browser,
    #[serde(default)]
    pub navigation: Navigation,
    #[serde(default)]
    pub upload: Upload,
    #[serde(default)]
    pub detection: Detection,
    #[serde(default)]
    pub extraction: Extraction,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub debug: Debug,
    #[serde(default)]
    pub security: Security,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }

    /// A stable, normalization-friendly string for hashing.
    pub fn normalized_for_hash(&self) -> String {
        toml::to_string(self).unwrap_or_default()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            global: Default::default(),
            paths: Default::default(),
            batch: Default::default(),
            browser: Default::default(),
            navigation: Default::default(),
            upload: Default::default(),
            detection: Default::default(),
            extraction: Default::default(),
            limits: Default::default(),
            output: Default::default(),
            logging: Default::default(),
            debug: Default::default(),
            security: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Global {
    pub resume: bool,
    pub print_summary: bool,
}
impl Default for Global {
    fn default() -> Self {
        Self {
            resume: true,
            print_summary: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paths {
    pub out_dir: String,
    pub work_dir: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            out_dir: "out".into(),
            work_dir: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub source_lang: String,
    pub target_lang: String,
    pub inter_job_delay_seconds: u64,
}
impl Default for Batch {
    fn default() -> Self {
        Self {
            source_lang: "auto".into(),
            target_lang: "en".into(),
            inter_job_delay_seconds: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Browser {
    pub executable: String,
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub launch_timeout_seconds: u64,
    pub request_timeout_seconds: u64,
    pub page_load_timeout_seconds: u64,
    pub implicit_wait_seconds: u64,
    pub extra_args: Vec<String>,
}
impl Default for Browser {
    fn default() -> Self {
        Self {
            executable: "auto".into(),
            headless: true,
            window_width: 1920,
            window_height: 1080,
            launch_timeout_seconds: 20,
            request_timeout_seconds: 30,
            page_load_timeout_seconds: 30,
            implicit_wait_seconds: 10,
            extra_args: vec![],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Navigation {
    pub base_url: String,
    pub page_ready_timeout_seconds: u64,
    pub settle_seconds: u64,
    pub url_marker: String,
    pub title_marker: String,
    pub tab_text: String,
    pub tab_settle_seconds: u64,
}
impl Default for Navigation {
    fn default() -> Self {
        Self {
            base_url: "https://translate.google.com".into(),
            page_ready_timeout_seconds: 15,
            settle_seconds: 4,
            url_marker: "translate".into(),
            title_marker: "Translate".into(),
            tab_text: "Images".into(),
            tab_settle_seconds: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Upload {
    pub selectors: Vec<String>,
    pub browse_phrases: Vec<String>,
    pub browse_settle_seconds: u64,
    pub probe_timeout_seconds: u64,
    pub post_upload_delay_seconds: u64,
}
impl Default for Upload {
    fn default() -> Self {
        Self {
            selectors: vec![
                "input[type='file'][accept*='image']".into(),
                "input[type='file']".into(),
                "[data-test-id='file-upload'] input".into(),
                ".VfPpkd-Bz112c input[type='file']".into(),
            ],
            browse_phrases: vec!["Browse your files".into(), "browse".into()],
            browse_settle_seconds: 1,
            probe_timeout_seconds: 5,
            post_upload_delay_seconds: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub max_wait_seconds: u32,
    pub poll_interval_seconds: u64,
    pub post_detect_delay_seconds: u64,
    pub failure_phrases: Vec<String>,
}
impl Default for Detection {
    fn default() -> Self {
        Self {
            max_wait_seconds: 25,
            poll_interval_seconds: 1,
            post_detect_delay_seconds: 3,
            failure_phrases: vec!["no text found".into(), "not supported".into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Extraction {
    pub min_dimension_px: f64,
    pub translation_markers: Vec<String>,
}
impl Default for Extraction {
    fn default() -> Self {
        Self {
            min_dimension_px: 100.0,
            translation_markers: vec!["googleusercontent.com".into(), "translate".into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Limits {
    pub max_input_bytes: u64,
    pub allowed_extensions: Vec<String>,
    pub batch_timeout_seconds: u64,
}
impl Default for Limits {
    fn default() -> Self {
        Self {
            max_input_bytes: 25 * 1024 * 1024,
            allowed_extensions: vec![
                "png".into(),
                "jpg".into(),
                "jpeg".into(),
                "jfif".into(),
                "gif".into(),
                "bmp".into(),
                "webp".into(),
            ],
            batch_timeout_seconds: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Output {
    pub image_prefix: String,
    pub write_manifest_json: bool,
    pub manifest_filename: String,
    pub write_index_json: bool,
}
impl Default for Output {
    fn default() -> Self {
        Self {
            image_prefix: "translated".into(),
            write_manifest_json: true,
            manifest_filename: "manifest.json".into(),
            write_index_json: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: true,
            file_path: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Debug {
    pub dump_effective_config: bool,
    pub snapshot_on_upload_miss: bool,
}
impl Default for Debug {
    fn default() -> Self {
        Self {
            dump_effective_config: true,
            snapshot_on_upload_miss: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Security {
    pub reject_url_inputs: bool,
}
impl Default for Security {
    fn default() -> Self {
        Self {
            reject_url_inputs: true,
        }
    }
}
