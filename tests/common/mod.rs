#![allow(dead_code)]

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use photoglot::driver::{
    Driver, DriverDiag, ElementProbe, PageImage, PageInfo, PageView, Probe, Session,
};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct ElementScript {
    pub enabled: bool,
    /// Tick at which the element becomes visible; None means never.
    pub visible_at: Option<u64>,
}

/// Scripted behavior for one job's page.
#[derive(Clone)]
pub struct PageScript {
    pub fail_acquire: Option<String>,
    pub fail_goto: Option<String>,
    pub ready_at: u64,
    pub url: String,
    pub title: String,
    pub elements: Vec<(Probe, ElementScript)>,
    pub fail_set_files: bool,
    pub visible_text: String,
    pub view: PageView,
    pub canvas: Option<String>,
    pub element_png: Option<Vec<u8>>,
    pub page_png: Option<Vec<u8>>,
}

impl PageScript {
    pub fn translate_page() -> Self {
        Self {
            fail_acquire: None,
            fail_goto: None,
            ready_at: 0,
            url: "https://translate.google.com/?sl=auto&tl=en&op=images".into(),
            title: "Google Translate".into(),
            elements: Vec::new(),
            fail_set_files: false,
            visible_text: String::new(),
            view: PageView {
                viewport_width: 1920.0,
                images: Vec::new(),
            },
            canvas: None,
            element_png: None,
            page_png: None,
        }
    }

    pub fn failing_acquire(reason: &str) -> Self {
        let mut page = Self::translate_page();
        page.fail_acquire = Some(reason.to_string());
        page
    }

    pub fn with_upload(self, selector: &str) -> Self {
        self.with_element(Probe::css(selector), true, None)
    }

    pub fn with_element(mut self, probe: Probe, enabled: bool, visible_at: Option<u64>) -> Self {
        self.elements.push((probe, ElementScript { enabled, visible_at }));
        self
    }

    pub fn with_images(mut self, images: Vec<PageImage>) -> Self {
        self.view.images = images;
        self
    }

    pub fn with_canvas(mut self, data_url: &str) -> Self {
        self.canvas = Some(data_url.to_string());
        self
    }
}

pub fn mk_img(index: usize, src: Option<&str>, x: f64, width: f64, height: f64) -> PageImage {
    PageImage {
        index,
        src: src.map(|s| s.to_string()),
        x,
        y: 0.0,
        width,
        height,
    }
}

pub fn mk_view(images: Vec<PageImage>) -> PageView {
    PageView {
        viewport_width: 1920.0,
        images,
    }
}

#[derive(Default)]
struct DriverState {
    scripts: VecDeque<PageScript>,
    acquired: usize,
    closed: usize,
    probe_log: Vec<(String, u64)>,
    ops: Vec<String>,
}

/// Hands out one scripted session per acquire, in order, and keeps counters
/// shared with the sessions it produced.
#[derive(Clone, Default)]
pub struct FakeDriver {
    state: Arc<Mutex<DriverState>>,
}

impl FakeDriver {
    pub fn with_jobs(scripts: Vec<PageScript>) -> Self {
        let driver = FakeDriver::default();
        driver.state.lock().unwrap().scripts = scripts.into();
        driver
    }

    pub fn single(script: PageScript) -> Self {
        Self::with_jobs(vec![script])
    }

    pub fn acquired(&self) -> usize {
        self.state.lock().unwrap().acquired
    }

    pub fn closed(&self) -> usize {
        self.state.lock().unwrap().closed
    }

    /// Every probe issued, with the session tick it happened at.
    pub fn probe_log(&self) -> Vec<(String, u64)> {
        self.state.lock().unwrap().probe_log.clone()
    }

    pub fn ops(&self) -> Vec<String> {
        self.state.lock().unwrap().ops.clone()
    }
}

#[async_trait]
impl Driver for FakeDriver {
    async fn doctor(&self) -> Result<DriverDiag> {
        Ok(DriverDiag {
            executable: "fake".into(),
            browser_version: Some("FakeBrowser/1.0".into()),
            ok: true,
            error: None,
        })
    }

    async fn acquire(&self) -> Result<Box<dyn Session>> {
        let script = {
            let mut state = self.state.lock().unwrap();
            let script = state
                .scripts
                .pop_front()
                .ok_or_else(|| anyhow!("no scripted page left"))?;
            if let Some(reason) = &script.fail_acquire {
                return Err(anyhow!("{reason}"));
            }
            state.acquired += 1;
            script
        };
        Ok(Box::new(FakeSession {
            state: Arc::clone(&self.state),
            page: script,
            clock: AtomicU64::new(0),
        }))
    }
}

/// Virtual clock: `settle` advances ticks instead of sleeping, so polling
/// loops run deterministically and instantly.
pub struct FakeSession {
    state: Arc<Mutex<DriverState>>,
    page: PageScript,
    clock: AtomicU64,
}

impl FakeSession {
    fn now(&self) -> u64 {
        self.clock.load(Ordering::SeqCst)
    }

    fn visible(&self, el: &ElementScript) -> bool {
        el.visible_at.map(|t| self.now() >= t).unwrap_or(false)
    }

    fn lookup(&self, target: &Probe) -> Option<&ElementScript> {
        self.page
            .elements
            .iter()
            .find(|(p, _)| p == target)
            .map(|(_, el)| el)
    }

    fn note(&self, op: String) {
        self.state.lock().unwrap().ops.push(op);
    }
}

#[async_trait]
impl Session for FakeSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        if let Some(reason) = &self.page.fail_goto {
            return Err(anyhow!("{reason}"));
        }
        self.note(format!("goto {url}"));
        Ok(())
    }

    async fn ready_state(&self) -> Result<String> {
        Ok(if self.now() >= self.page.ready_at {
            "complete".to_string()
        } else {
            "loading".to_string()
        })
    }

    async fn page_info(&self) -> Result<PageInfo> {
        Ok(PageInfo {
            url: self.page.url.clone(),
            title: self.page.title.clone(),
        })
    }

    async fn probe(&self, target: &Probe) -> Result<ElementProbe> {
        let now = self.now();
        self.state
            .lock()
            .unwrap()
            .probe_log
            .push((target.describe(), now));
        Ok(self
            .lookup(target)
            .map(|el| ElementProbe {
                found: true,
                enabled: el.enabled,
                visible: self.visible(el),
            })
            .unwrap_or_default())
    }

    async fn click(&self, target: &Probe) -> Result<bool> {
        Ok(self
            .lookup(target)
            .map(|el| self.visible(el))
            .unwrap_or(false))
    }

    async fn set_file_input(&self, _selector: &str, file: &Path) -> Result<()> {
        if self.page.fail_set_files {
            return Err(anyhow!("input went stale"));
        }
        self.note(format!("upload {}", file.display()));
        Ok(())
    }

    async fn visible_text(&self) -> Result<String> {
        Ok(self.page.visible_text.clone())
    }

    async fn page_images(&self) -> Result<PageView> {
        Ok(self.page.view.clone())
    }

    async fn render_image(&self, index: usize) -> Result<String> {
        self.page
            .canvas
            .clone()
            .ok_or_else(|| anyhow!("canvas render failed for image {index}"))
    }

    async fn capture_image(&self, index: usize) -> Result<Vec<u8>> {
        self.page
            .element_png
            .clone()
            .ok_or_else(|| anyhow!("element capture failed for image {index}"))
    }

    async fn capture_page(&self) -> Result<Vec<u8>> {
        self.page
            .page_png
            .clone()
            .ok_or_else(|| anyhow!("page capture failed"))
    }

    async fn settle(&self, seconds: u64) {
        self.clock.fetch_add(seconds, Ordering::SeqCst);
    }

    async fn close(&mut self) {
        self.state.lock().unwrap().closed += 1;
    }
}
