pub mod chrome;
pub mod types;

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

pub use types::{DriverDiag, ElementProbe, PageImage, PageInfo, PageView, Probe};

/// Factory for browser sessions. One session serves exactly one job.
#[async_trait]
pub trait Driver: Send + Sync {
    async fn doctor(&self) -> Result<DriverDiag>;
    async fn acquire(&self) -> Result<Box<dyn Session>>;
}

/// One live page. These are primitives only: candidate ordering, polling
/// budgets and result classification all live in the calling modules.
#[async_trait]
pub trait Session: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;

    async fn ready_state(&self) -> Result<String>;

    async fn page_info(&self) -> Result<PageInfo>;

    async fn probe(&self, target: &Probe) -> Result<ElementProbe>;

    /// Clicks the first visible match. Returns false when nothing matched.
    async fn click(&self, target: &Probe) -> Result<bool>;

    async fn set_file_input(&self, selector: &str, file: &Path) -> Result<()>;

    async fn visible_text(&self) -> Result<String>;

    async fn page_images(&self) -> Result<PageView>;

    /// Draws the image at `index` onto an off-screen canvas and returns it
    /// as a PNG data URL at natural resolution.
    async fn render_image(&self, index: usize) -> Result<String>;

    /// Screenshot of just the image element at `index`.
    async fn capture_image(&self, index: usize) -> Result<Vec<u8>>;

    /// Screenshot of the visible viewport.
    async fn capture_page(&self) -> Result<Vec<u8>>;

    /// Gives the page time to advance on its own.
    async fn settle(&self, seconds: u64);

    /// Tears the session down. Never fails; callers invoke it exactly once
    /// on every exit path.
    async fn close(&mut self);
}
