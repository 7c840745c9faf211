//! Abstract page interaction surface
//!
//! The pipeline never talks to a browser directly; it drives pages through
//! this trait so the live WebDriver backend and the simulated test backend
//! are interchangeable.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum PageError {
    #[error("element not found: {0}")]
    ElementNotFound(String),
    #[error("driver error: {0}")]
    Driver(String),
}

/// Actions the pipeline performs against a loaded page.
///
/// Selector arguments may be comma-separated CSS groups; `exists` and the
/// mutating calls act on the first match in document order.
#[async_trait]
pub trait PageActions: Send + Sync {
    async fn current_url(&self) -> Result<String, PageError>;
    async fn html(&self) -> Result<String, PageError>;
    async fn exists(&self, selector: &str) -> Result<bool, PageError>;
    async fn fill(&self, selector: &str, value: &str) -> Result<(), PageError>;
    async fn click(&self, selector: &str) -> Result<(), PageError>;
    /// Clicks the first matching element whose visible text contains one of
    /// the needles (case-insensitive). Returns false when nothing matched.
    async fn click_by_text(&self, selector: &str, needles: &[&str]) -> Result<bool, PageError>;
    /// Submits the form containing the matched element.
    async fn submit(&self, selector: &str) -> Result<(), PageError>;
}

/// Polls for a selector until it appears or the deadline passes.
///
/// Replaces fixed sleeps: resolves as soon as the element shows up, and
/// never blocks longer than `timeout`.
pub async fn wait_for(
    page: &Arc<dyn PageActions>,
    selector: &str,
    timeout: Duration,
    poll: Duration,
) -> Result<bool, PageError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if page.exists(selector).await? {
            return Ok(true);
        }
        if tokio::time::Instant::now() >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(poll).await;
    }
}
