//! Work item state for the scrape-to-list pipeline
//!
//! A `WorkItem` tracks one product's journey from the source marketplace to a
//! freshly created target-marketplace listing. The record is persisted in the
//! work-item store after every step so any participating tab context (or a
//! restarted orchestrator) can pick up where the pipeline left off.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::product::ExtractedProduct;

/// Pipeline position of a work item. Transitions only move forward; the one
/// sanctioned backward move is an explicit [`WorkItem::retry`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemStatus {
    Pending,
    Scraping,
    Scraped,
    Searching,
    Identifying,
    FormFilling,
    Listed,
    Failed,
}

impl WorkItemStatus {
    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Scraping => 1,
            Self::Scraped => 2,
            Self::Searching => 3,
            Self::Identifying => 4,
            Self::FormFilling => 5,
            Self::Listed => 6,
            Self::Failed => 7,
        }
    }

    /// Terminal states never advance again; a whole batch is complete when
    /// every one of its items is terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Listed | Self::Failed)
    }

    /// True once the item has reached `stage` in the forward sequence.
    pub fn has_reached(self, stage: WorkItemStatus) -> bool {
        self.rank() >= stage.rank()
    }

    /// Forward-only transition check. `Failed` is reachable from any
    /// non-terminal state; everything else must strictly increase.
    pub fn can_advance_to(self, next: WorkItemStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == Self::Failed {
            return true;
        }
        next.rank() > self.rank() && next != Self::Failed
    }
}

impl std::fmt::Display for WorkItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Scraping => "scraping",
            Self::Scraped => "scraped",
            Self::Searching => "searching",
            Self::Identifying => "identifying",
            Self::FormFilling => "form_filling",
            Self::Listed => "listed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Attempted transition violated the forward-only status sequence.
#[derive(Debug, thiserror::Error)]
#[error("invalid status transition {from} -> {to}")]
pub struct TransitionError {
    pub from: WorkItemStatus,
    pub to: WorkItemStatus,
}

/// One product being migrated from the source to the target marketplace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    /// Stable identifier extracted from the source URL. Unique within a batch.
    pub product_id: String,
    pub source_url: String,
    /// Query used against the target site's search box, derived from the
    /// scraped title/brand once extraction succeeds.
    pub target_search_query: String,
    /// Structured product record, present from `scraped` onwards.
    pub extracted: Option<ExtractedProduct>,
    /// Position within the original batch, for progress display only.
    pub list_index: usize,
    pub list_total: usize,
    pub status: WorkItemStatus,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkItem {
    pub fn new(product_id: impl Into<String>, source_url: impl Into<String>, list_index: usize, list_total: usize) -> Self {
        let now = Utc::now();
        Self {
            product_id: product_id.into(),
            source_url: source_url.into(),
            target_search_query: String::new(),
            extracted: None,
            list_index,
            list_total,
            status: WorkItemStatus::Pending,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Advance to the next status, enforcing the forward-only sequence.
    pub fn advance(&mut self, next: WorkItemStatus) -> Result<(), TransitionError> {
        if !self.status.can_advance_to(next) {
            return Err(TransitionError { from: self.status, to: next });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Mark the item failed with a reason. Valid from any non-terminal state.
    pub fn fail(&mut self, reason: impl Into<String>) {
        if !self.status.is_terminal() {
            self.status = WorkItemStatus::Failed;
        }
        self.last_error = Some(reason.into());
        self.updated_at = Utc::now();
    }

    /// Explicit retry: reset to `pending`, clearing the failure reason. The
    /// only sanctioned backward transition.
    pub fn retry(&mut self) {
        self.status = WorkItemStatus::Pending;
        self.last_error = None;
        self.updated_at = Utc::now();
    }
}

/// Extract the stable product identifier from a source-marketplace URL.
///
/// Recognizes the `/dp/<ID>`, `/gp/product/<ID>` and `/ASIN/<ID>` URL shapes
/// with a ten-character alphanumeric id. Pure and deterministic: the same URL
/// always yields the same id.
pub fn extract_product_id(url: &str) -> Option<String> {
    let re = regex::Regex::new(r"(?i)/(?:dp|gp/product|ASIN)/([A-Z0-9]{10})(?:[/?#]|$)")
        .expect("product id pattern is valid");
    re.captures(url)
        .map(|caps| caps[1].to_ascii_uppercase())
}

/// Derive the target-site search query from scraped title and brand.
///
/// Parenthesised segments and commas are stripped and whitespace collapsed;
/// with a brand the first twelve title words are kept, without one the first
/// fifteen.
pub fn derive_search_query(title: &str, brand: Option<&str>) -> String {
    let brand = brand.map(str::trim).filter(|b| !b.is_empty());
    let max_words = if brand.is_some() { 12 } else { 15 };
    let short = shorten_title(title, max_words);
    match brand {
        Some(b) => format!("{b} {short}").trim().to_string(),
        None => short,
    }
}

fn shorten_title(title: &str, max_words: usize) -> String {
    let re = regex::Regex::new(r"\([^)]*\)").expect("paren pattern is valid");
    let stripped = re.replace_all(title, "");
    stripped
        .replace(',', " ")
        .split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_id_from_dp_url() {
        assert_eq!(
            extract_product_id("https://source.example/dp/ABCDEFGHIJ"),
            Some("ABCDEFGHIJ".to_string())
        );
        assert_eq!(
            extract_product_id("https://source.example/gp/product/B01ABCDE2F?th=1"),
            Some("B01ABCDE2F".to_string())
        );
        assert_eq!(
            extract_product_id("https://source.example/ASIN/B01ABCDE2F/ref=foo"),
            Some("B01ABCDE2F".to_string())
        );
    }

    #[test]
    fn product_id_is_deterministic() {
        let url = "https://source.example/dp/ABCDEFGHIJ?tag=x";
        assert_eq!(extract_product_id(url), extract_product_id(url));
    }

    #[test]
    fn product_id_absent_for_unrecognized_urls() {
        assert_eq!(extract_product_id("https://source.example/s?k=widget"), None);
        assert_eq!(extract_product_id("https://source.example/dp/SHORT"), None);
    }

    #[test]
    fn search_query_with_brand_keeps_twelve_words() {
        let title = "One Two Three Four Five Six Seven Eight Nine Ten Eleven Twelve Thirteen Fourteen";
        let q = derive_search_query(title, Some("Acme"));
        assert!(q.starts_with("Acme One Two"));
        assert_eq!(q.split_whitespace().count(), 13); // brand + 12
    }

    #[test]
    fn search_query_strips_parentheses_and_commas() {
        let q = derive_search_query("Widget (Pack of 2), Blue", None);
        assert_eq!(q, "Widget Blue");
    }

    #[test]
    fn status_moves_forward_only() {
        let mut item = WorkItem::new("ABCDEFGHIJ", "https://source.example/dp/ABCDEFGHIJ", 0, 1);
        item.advance(WorkItemStatus::Scraping).unwrap();
        item.advance(WorkItemStatus::Scraped).unwrap();
        assert!(item.advance(WorkItemStatus::Pending).is_err());
        assert!(item.advance(WorkItemStatus::Scraping).is_err());
        item.advance(WorkItemStatus::Listed).unwrap();
        // Terminal: nothing moves anymore, not even failed.
        assert!(item.advance(WorkItemStatus::Failed).is_err());
    }

    #[test]
    fn fail_and_retry_round_trip() {
        let mut item = WorkItem::new("ABCDEFGHIJ", "https://source.example/dp/ABCDEFGHIJ", 0, 1);
        item.advance(WorkItemStatus::Scraping).unwrap();
        item.fail("tab load timeout");
        assert_eq!(item.status, WorkItemStatus::Failed);
        assert_eq!(item.last_error.as_deref(), Some("tab load timeout"));
        item.retry();
        assert_eq!(item.status, WorkItemStatus::Pending);
        assert!(item.last_error.is_none());
    }
}
