use super::types::{DriverDiag, ElementProbe, PageInfo, PageView, Probe};
use super::{Driver, Session};
use crate::config::Config;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chromiumoxide::Element;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tracing::debug;

/// Launches one throwaway Chrome per job. Each session gets a fresh
/// temporary profile so nothing leaks between jobs.
pub struct ChromeDriver {
    cfg: Config,
    executable: Option<PathBuf>,
}

impl ChromeDriver {
    pub fn new(cfg: &Config) -> Result<Self> {
        let executable = resolve_executable(&cfg.browser.executable)?;
        Ok(Self {
            cfg: cfg.clone(),
            executable,
        })
    }

    fn browser_config(&self, profile_dir: &Path) -> Result<BrowserConfig> {
        let b = &self.cfg.browser;
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(b.window_width, b.window_height)
            .launch_timeout(Duration::from_secs(b.launch_timeout_seconds))
            .request_timeout(Duration::from_secs(b.request_timeout_seconds))
            .user_data_dir(profile_dir)
            .args(session_args());
        builder = if b.headless {
            builder.new_headless_mode()
        } else {
            builder.with_head()
        };
        if let Some(exe) = &self.executable {
            builder = builder.chrome_executable(exe);
        }
        for arg in &b.extra_args {
            builder = builder.arg(arg.clone());
        }
        builder.build().map_err(|e| anyhow!("browser config: {e}"))
    }

    async fn launch(&self) -> Result<ChromeSession> {
        let profile = TempDir::new().with_context(|| "creating profile dir")?;
        let config = self.browser_config(profile.path())?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .with_context(|| "launching browser")?;
        let events: JoinHandle<()> = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(err) => {
                let _ = browser.close().await;
                let _ = browser.wait().await;
                events.abort();
                return Err(anyhow!("opening page: {err}"));
            }
        };

        Ok(ChromeSession {
            cfg: self.cfg.clone(),
            browser,
            page,
            events,
            _profile: profile,
        })
    }
}

#[async_trait]
impl Driver for ChromeDriver {
    async fn doctor(&self) -> Result<DriverDiag> {
        let executable = self
            .executable
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "auto".to_string());
        match self.launch().await {
            Ok(mut session) => {
                let browser_version = session.browser.version().await.ok().map(|v| v.product);
                session.close().await;
                Ok(DriverDiag {
                    executable,
                    browser_version,
                    ok: true,
                    error: None,
                })
            }
            Err(err) => Ok(DriverDiag {
                executable,
                browser_version: None,
                ok: false,
                error: Some(format!("{err:#}")),
            }),
        }
    }

    async fn acquire(&self) -> Result<Box<dyn Session>> {
        Ok(Box::new(self.launch().await?))
    }
}

pub struct ChromeSession {
    cfg: Config,
    browser: Browser,
    page: Page,
    events: JoinHandle<()>,
    _profile: TempDir,
}

impl ChromeSession {
    /// Bounded retry until the element exists in the DOM.
    async fn find_with_wait(&self, selector: &str) -> Result<Element> {
        let deadline = Duration::from_secs(self.cfg.browser.implicit_wait_seconds.max(1));
        let started = std::time::Instant::now();
        loop {
            match self.page.find_element(selector).await {
                Ok(element) => return Ok(element),
                Err(err) if started.elapsed() >= deadline => {
                    return Err(anyhow!("element not found: {selector}: {err}"));
                }
                Err(_) => tokio::time::sleep(Duration::from_millis(250)).await,
            }
        }
    }
}

#[async_trait]
impl Session for ChromeSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        let budget = Duration::from_secs(self.cfg.browser.page_load_timeout_seconds);
        match tokio::time::timeout(budget, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => Err(anyhow!("goto {url}: {err}")),
            Err(_) => Err(anyhow!("goto {url}: page load timed out after {budget:?}")),
        }
    }

    async fn ready_state(&self) -> Result<String> {
        let state = self
            .page
            .evaluate("document.readyState")
            .await?
            .into_value::<String>()?;
        Ok(state)
    }

    async fn page_info(&self) -> Result<PageInfo> {
        let url = self.page.url().await?.unwrap_or_default();
        let title = self.page.get_title().await?.unwrap_or_default();
        Ok(PageInfo { url, title })
    }

    async fn probe(&self, target: &Probe) -> Result<ElementProbe> {
        let probe = self
            .page
            .evaluate(probe_js(target))
            .await?
            .into_value::<ElementProbe>()?;
        Ok(probe)
    }

    async fn click(&self, target: &Probe) -> Result<bool> {
        let clicked = self
            .page
            .evaluate(click_js(target))
            .await?
            .into_value::<bool>()?;
        Ok(clicked)
    }

    async fn set_file_input(&self, selector: &str, file: &Path) -> Result<()> {
        let file = file
            .canonicalize()
            .with_context(|| format!("canonicalize {}", file.display()))?;
        let element = self.find_with_wait(selector).await?;
        let params = SetFileInputFilesParams::builder()
            .file(file.display().to_string())
            .backend_node_id(element.backend_node_id.clone())
            .build()
            .map_err(|e| anyhow!("set_file_input params: {e}"))?;
        self.page
            .execute(params)
            .await
            .with_context(|| format!("sending file to {selector}"))?;
        // The CDP call fills the input without firing the events the page's
        // own upload handler listens for.
        element
            .call_js_fn(
                "function() { \
                   this.dispatchEvent(new Event('input', { bubbles: true })); \
                   this.dispatchEvent(new Event('change', { bubbles: true })); \
                 }",
                false,
            )
            .await
            .with_context(|| "dispatching input events")?;
        Ok(())
    }

    async fn visible_text(&self) -> Result<String> {
        let text = self
            .page
            .evaluate("document.body ? document.body.innerText : ''")
            .await?
            .into_value::<String>()?;
        Ok(text)
    }

    async fn page_images(&self) -> Result<PageView> {
        let view = self
            .page
            .evaluate(PAGE_IMAGES_JS)
            .await?
            .into_value::<PageView>()?;
        Ok(view)
    }

    async fn render_image(&self, index: usize) -> Result<String> {
        let js = format!(
            r#"(() => {{
                const img = document.images[{index}];
                if (!img) {{ throw new Error('no image at index {index}'); }}
                const canvas = document.createElement('canvas');
                canvas.width = img.naturalWidth || img.width;
                canvas.height = img.naturalHeight || img.height;
                const ctx = canvas.getContext('2d');
                ctx.drawImage(img, 0, 0);
                return canvas.toDataURL('image/png');
            }})()"#
        );
        let data_url = self.page.evaluate(js).await?.into_value::<String>()?;
        Ok(data_url)
    }

    async fn capture_image(&self, index: usize) -> Result<Vec<u8>> {
        let images = self.page.find_elements("img").await?;
        let element = images
            .into_iter()
            .nth(index)
            .ok_or_else(|| anyhow!("no image element at index {index}"))?;
        let bytes = element.screenshot(CaptureScreenshotFormat::Png).await?;
        Ok(bytes)
    }

    async fn capture_page(&self) -> Result<Vec<u8>> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(false)
            .build();
        let bytes = self.page.screenshot(params).await?;
        Ok(bytes)
    }

    async fn settle(&self, seconds: u64) {
        tokio::time::sleep(Duration::from_secs(seconds)).await;
    }

    async fn close(&mut self) {
        if let Err(err) = self.browser.close().await {
            debug!("browser close: {err}");
        }
        if let Err(err) = self.browser.wait().await {
            debug!("browser wait: {err}");
        }
        self.events.abort();
    }
}

/// Flags the translate page needs on top of the library defaults. Web
/// security stays off so canvas readback of cross-origin result images is
/// not blocked by tainting.
fn session_args() -> Vec<String> {
    [
        "--disable-dev-shm-usage",
        "--disable-gpu",
        "--disable-extensions",
        "--disable-logging",
        "--disable-web-security",
        "--allow-running-insecure-content",
        "--disable-background-timer-throttling",
        "--disable-backgrounding-occluded-windows",
        "--disable-renderer-backgrounding",
        "--disable-background-networking",
        "--disable-default-apps",
        "--disable-hang-monitor",
        "--disable-prompt-on-repost",
        "--disable-sync",
        "--disable-ipc-flooding-protection",
        "--metrics-recording-only",
        "--force-color-profile=srgb",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn resolve_executable(raw: &str) -> Result<Option<PathBuf>> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("auto") {
        return Ok(detect_executable());
    }
    let path = PathBuf::from(raw);
    if !path.exists() {
        return Err(anyhow!(
            "browser.executable does not exist: {}",
            path.display()
        ));
    }
    Ok(Some(path))
}

/// None lets the library run its own detection.
fn detect_executable() -> Option<PathBuf> {
    [
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium-browser",
        "/usr/bin/chromium",
        "/snap/bin/chromium",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
    ]
    .iter()
    .map(PathBuf::from)
    .find(|p| p.exists())
}

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// Direct text nodes only; a needle inside a nested child does not count as
/// a hit on the parent.
const DIRECT_TEXT_JS: &str = "const direct = Array.from(el.childNodes)
                        .filter((n) => n.nodeType === Node.TEXT_NODE)
                        .map((n) => n.textContent)
                        .join('');";

fn probe_js(target: &Probe) -> String {
    match target {
        Probe::Css(selector) => format!(
            r#"(() => {{
                let found = false, enabled = false, visible = false;
                for (const el of document.querySelectorAll({selector})) {{
                    found = true;
                    if (!el.disabled) enabled = true;
                    const r = el.getBoundingClientRect();
                    if (r.width > 0 && r.height > 0) {{ visible = true; break; }}
                }}
                return {{ found, enabled, visible }};
            }})()"#,
            selector = js_string(selector),
        ),
        Probe::Text { tag, contains } => format!(
            r#"(() => {{
                const scope = {tag} || '*';
                const needle = {needle};
                let found = false, enabled = false, visible = false;
                for (const el of document.querySelectorAll(scope)) {{
                    {direct_text}
                    if (!direct.includes(needle)) continue;
                    found = true;
                    if (!el.disabled) enabled = true;
                    const r = el.getBoundingClientRect();
                    if (r.width > 0 && r.height > 0) {{ visible = true; break; }}
                }}
                return {{ found, enabled, visible }};
            }})()"#,
            tag = tag
                .as_deref()
                .map(js_string)
                .unwrap_or_else(|| "null".to_string()),
            needle = js_string(contains),
            direct_text = DIRECT_TEXT_JS,
        ),
    }
}

fn click_js(target: &Probe) -> String {
    match target {
        Probe::Css(selector) => format!(
            r#"(() => {{
                for (const el of document.querySelectorAll({selector})) {{
                    const r = el.getBoundingClientRect();
                    if (r.width > 0 && r.height > 0) {{ el.click(); return true; }}
                }}
                return false;
            }})()"#,
            selector = js_string(selector),
        ),
        Probe::Text { tag, contains } => format!(
            r#"(() => {{
                const scope = {tag} || '*';
                const needle = {needle};
                for (const el of document.querySelectorAll(scope)) {{
                    {direct_text}
                    if (!direct.includes(needle)) continue;
                    const r = el.getBoundingClientRect();
                    if (r.width > 0 && r.height > 0) {{ el.click(); return true; }}
                }}
                return false;
            }})()"#,
            tag = tag
                .as_deref()
                .map(js_string)
                .unwrap_or_else(|| "null".to_string()),
            needle = js_string(contains),
            direct_text = DIRECT_TEXT_JS,
        ),
    }
}

const PAGE_IMAGES_JS: &str = r#"(() => {
    const images = Array.from(document.images).map((img, index) => {
        const r = img.getBoundingClientRect();
        return {
            index,
            src: img.src ? img.src : null,
            x: r.x,
            y: r.y,
            width: r.width,
            height: r.height,
        };
    });
    return { viewport_width: window.innerWidth, images };
})()"#;
