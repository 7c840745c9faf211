//! Seller sold-items research
//!
//! Walks a seller's sold-listings search results page by page, parses each
//! page, deduplicates repeat sales of the same product and reports progress
//! through the event bus.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use crate::application::event_bus::EventBus;
use crate::domain::events::PipelineEvent;
use crate::domain::sold_item::{SoldItemRecord, dedup_sold_items};
use crate::infrastructure::config::ResearchConfig;
use crate::infrastructure::extractor::{ResearchSelectors, parse_sold_listings};
use crate::infrastructure::tab::{TabCoordinator, TabRole};

/// Accepts a bare username or a seller page URL and yields the username.
pub fn resolve_seller_name(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    if !trimmed.contains('/') && !trimmed.contains('?') {
        return Some(trimmed.to_string());
    }

    let url = Url::parse(trimmed).ok()?;
    if let Some(ssn) = url.query_pairs().find(|(k, _)| k == "_ssn").map(|(_, v)| v.into_owned()) {
        return Some(ssn);
    }
    let mut segments = url.path_segments()?;
    while let Some(segment) = segments.next() {
        if segment == "usr" || segment == "str" {
            return segments.next().filter(|s| !s.is_empty()).map(|s| s.to_string());
        }
    }
    None
}

/// Sold-and-completed search URL for a seller, newest first, 200 per page.
pub fn sold_items_url(search_base: &str, seller: &str, page: u32) -> String {
    let mut url = format!(
        "{search_base}?_ssn={seller}&LH_Complete=1&LH_Sold=1&_sop=13&rt=nc&_ipg=200"
    );
    if page > 1 {
        url.push_str(&format!("&_pgn={page}"));
    }
    url
}

pub struct SoldItemsScanner {
    tabs: Arc<TabCoordinator>,
    bus: EventBus,
    selectors: ResearchSelectors,
    config: ResearchConfig,
    search_base: String,
    tab_load_timeout: Duration,
}

impl SoldItemsScanner {
    pub fn new(
        tabs: Arc<TabCoordinator>,
        bus: EventBus,
        config: ResearchConfig,
        search_base: String,
        tab_load_timeout: Duration,
    ) -> Self {
        Self {
            tabs,
            bus,
            selectors: ResearchSelectors::default(),
            config,
            search_base,
            tab_load_timeout,
        }
    }

    /// Scans up to `max_pages` of the seller's sold listings.
    ///
    /// Stops early on an empty page or cancellation; what was collected so
    /// far is still returned.
    pub async fn scan(
        &self,
        seller_input: &str,
        cancel: CancellationToken,
    ) -> anyhow::Result<Vec<SoldItemRecord>> {
        let Some(seller) = resolve_seller_name(seller_input) else {
            anyhow::bail!("could not resolve a seller name from {seller_input:?}");
        };
        info!(%seller, max_pages = self.config.max_pages, "starting sold-items scan");
        self.bus.publish(PipelineEvent::ScanProgress { progress: 10, found: 0 });

        let mut collected: Vec<SoldItemRecord> = Vec::new();
        let max_pages = self.config.max_pages.max(1);

        for page_number in 1..=max_pages {
            if cancel.is_cancelled() {
                info!("scan cancelled");
                break;
            }

            let url = sold_items_url(&self.search_base, &seller, page_number);
            let tab_id = self.tabs.open(&url, TabRole::Source).await?;
            let html = async {
                self.tabs.await_tab_loaded(tab_id, &url, self.tab_load_timeout).await?;
                self.tabs
                    .page(tab_id)
                    .html()
                    .await
                    .map_err(|e| anyhow::anyhow!("results page read failed: {e}"))
            }
            .await;
            self.tabs.close(tab_id).await;

            let page_items = match html {
                Ok(html) => parse_sold_listings(&html, &seller, Utc::now(), &self.selectors)?,
                Err(e) => {
                    warn!(page_number, "skipping unreadable results page: {e}");
                    continue;
                }
            };

            if page_items.is_empty() {
                info!(page_number, "no more sold listings");
                break;
            }
            collected.extend(page_items);

            // 10..90 spread across the page walk, 100 reserved for the end.
            let progress = 10 + (80 * page_number / max_pages) as u8;
            self.bus.publish(PipelineEvent::ScanProgress {
                progress: progress.min(90),
                found: collected.len(),
            });
        }

        let mut deduped = dedup_sold_items(collected);
        if self.config.min_sales > 0 {
            deduped.retain(|item| item.total_sold >= self.config.min_sales);
        }

        self.bus.publish(PipelineEvent::ScanProgress { progress: 100, found: deduped.len() });
        info!(products = deduped.len(), "sold-items scan finished");
        Ok(deduped)
    }
}
