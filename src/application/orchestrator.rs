//! Batch pipeline orchestration
//!
//! Drives each work item from source URL to a filled listing form: open the
//! source tab, extract, persist, open the wizard tab, walk the wizard state
//! machine and record the terminal outcome. Items run sequentially with a
//! stagger delay; cancellation is checked at the top of every loop.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::application::action_engine::{ActionEngine, ActionError};
use crate::application::event_bus::EventBus;
use crate::domain::events::PipelineEvent;
use crate::domain::product::{find_restricted_brand, find_restricted_words};
use crate::domain::work_item::{
    WorkItem, WorkItemStatus, derive_search_query, extract_product_id,
};
use crate::infrastructure::classifier::TargetPage;
use crate::infrastructure::companion::CompanionClient;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::enrichment::EnrichmentClient;
use crate::infrastructure::extractor::{SourceSelectors, extract_product};
use crate::infrastructure::store::WorkItemStore;
use crate::infrastructure::tab::{TabCoordinator, TabRole};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub listed: usize,
    pub failed: usize,
    pub skipped: usize,
}

pub struct PipelineOrchestrator {
    tabs: Arc<TabCoordinator>,
    store: WorkItemStore,
    bus: EventBus,
    engine: ActionEngine,
    config: AppConfig,
    source_selectors: SourceSelectors,
    enrichment: Option<EnrichmentClient>,
    companion: Option<CompanionClient>,
}

impl PipelineOrchestrator {
    pub fn new(
        tabs: Arc<TabCoordinator>,
        store: WorkItemStore,
        bus: EventBus,
        engine: ActionEngine,
        config: AppConfig,
    ) -> Self {
        let enrichment = config.user.enrichment_enabled.then(|| {
            EnrichmentClient::new(
                config.advanced.enrichment_url.clone(),
                config.advanced.enrichment_model.clone(),
            )
        });
        let companion = Some(CompanionClient::new(config.advanced.companion_url.clone()));
        Self {
            tabs,
            store,
            bus,
            engine,
            config,
            source_selectors: SourceSelectors::default(),
            enrichment,
            companion,
        }
    }

    /// Disables the enrichment and companion clients regardless of config.
    pub fn without_external_clients(mut self) -> Self {
        self.enrichment = None;
        self.companion = None;
        self
    }

    /// Runs a batch of source product URLs to completion.
    ///
    /// URLs whose product id repeats within the batch are processed once;
    /// URLs with no extractable product id fail immediately. Every queued
    /// item is persisted as pending before any runs. Items already terminal
    /// in the store are not re-run; a persisted item that already holds its
    /// scraped record resumes at the wizard, anything earlier restarts.
    pub async fn run_batch(
        &self,
        urls: &[String],
        cancel: CancellationToken,
    ) -> anyhow::Result<BatchSummary> {
        let mut queue: Vec<(String, String)> = Vec::new();
        let mut skipped = 0usize;
        let mut failed_inputs = 0usize;
        for url in urls {
            match extract_product_id(url) {
                Some(id) if queue.iter().any(|(qid, _)| qid == &id) => {
                    info!(product_id = %id, "duplicate url in batch, skipping");
                    skipped += 1;
                }
                Some(id) => queue.push((id, url.clone())),
                None => {
                    warn!(%url, "url carries no product id, failing item");
                    failed_inputs += 1;
                    self.bus
                        .publish(PipelineEvent::item_failed(url.as_str(), "no product id in url"));
                }
            }
        }

        let batch_ids: Vec<String> = queue.iter().map(|(id, _)| id.clone()).collect();
        let total = queue.len();
        let batch_id = uuid::Uuid::new_v4();
        info!(%batch_id, total, skipped, failed_inputs, "starting listing batch");

        // Persist the whole queue up front so an interrupted batch still
        // knows which items never started.
        for (index, (product_id, url)) in queue.iter().enumerate() {
            if self.store.get_item(product_id).await?.is_none() {
                let item = WorkItem::new(product_id.clone(), url.clone(), index, total);
                self.store.put_item(&item).await?;
            }
        }

        for (index, (product_id, _)) in queue.iter().enumerate() {
            if cancel.is_cancelled() {
                info!("batch cancelled, stopping before next item");
                break;
            }

            let Some(mut item) = self.store.get_item(product_id).await? else {
                continue;
            };
            if item.status.is_terminal() {
                info!(%product_id, status = %item.status, "already terminal, not re-running");
                continue;
            }
            if item.status.has_reached(WorkItemStatus::Scraped) && item.extracted.is_some() {
                info!(%product_id, status = %item.status, "resuming at the wizard");
            } else if item.status != WorkItemStatus::Pending {
                info!(%product_id, status = %item.status, "restarting item from pending");
                item.retry();
            }

            if let Err(reason) = self.process_item(&mut item, &cancel).await {
                warn!(%product_id, %reason, "item failed");
                item.fail(reason.to_string());
                self.store.put_item(&item).await?;
                self.bus.publish(PipelineEvent::item_failed(product_id, reason.to_string()));
            }

            if index + 1 < total && !cancel.is_cancelled() {
                tokio::time::sleep(Duration::from_millis(self.config.user.item_stagger_ms)).await;
            }
        }

        // The store is the source of truth for completion, not in-process
        // state: a resumed batch tallies items listed in earlier runs too.
        let (listed, stored_failed) = self.store.batch_outcome(&batch_ids).await?;
        let failed = stored_failed + failed_inputs;
        if self.store.is_batch_complete(&batch_ids).await? {
            self.store.purge(&batch_ids).await?;
            self.bus.publish(PipelineEvent::BatchCompleted { listed, failed });
            info!(%batch_id, listed, failed, "batch complete, store purged");
        }

        Ok(BatchSummary { listed, failed, skipped })
    }

    async fn process_item(
        &self,
        item: &mut WorkItem,
        cancel: &CancellationToken,
    ) -> anyhow::Result<()> {
        // A reloaded item that already carries its scraped record goes
        // straight back to the wizard.
        if !item.status.has_reached(WorkItemStatus::Scraped) || item.extracted.is_none() {
            self.scrape_source(item).await?;
        }

        if let Some(product) = &item.extracted {
            if let Some(brand) = find_restricted_brand(&product.brand)
                .or_else(|| find_restricted_brand(&product.title))
            {
                anyhow::bail!("restricted brand: {brand}");
            }
            let words = find_restricted_words(&product.title);
            if !words.is_empty() {
                anyhow::bail!("restricted words in title: {}", words.join(", "));
            }
        }

        if let (Some(enrichment), Some(product)) = (&self.enrichment, item.extracted.as_mut()) {
            enrichment.enrich(&item.product_id, product).await;
        }

        self.drive_wizard(item, cancel).await?;

        item.advance(WorkItemStatus::Listed)?;
        self.store.put_item(item).await?;
        self.bus.publish(PipelineEvent::item_listed(&item.product_id));

        // Image upload runs after the terminal state is recorded and never
        // demotes a listed item.
        if let (Some(companion), Some(product)) = (&self.companion, &item.extracted) {
            companion.upload_images(&item.product_id, &product.images).await;
        }

        Ok(())
    }

    async fn scrape_source(&self, item: &mut WorkItem) -> anyhow::Result<()> {
        item.advance(WorkItemStatus::Scraping)?;
        self.store.put_item(item).await?;

        let tab_id = self.tabs.open(&item.source_url, TabRole::Source).await?;
        let result = async {
            self.tabs
                .await_tab_loaded(tab_id, &item.source_url, self.tab_load_timeout())
                .await?;
            let html = self
                .tabs
                .page(tab_id)
                .html()
                .await
                .map_err(|e| anyhow::anyhow!("source page read failed: {e}"))?;

            let mut product = extract_product(&html, &item.product_id, &self.source_selectors)?;
            product.build_description(&item.product_id, &item.source_url);
            item.target_search_query =
                derive_search_query(&product.title, Some(product.brand.as_str()));
            item.extracted = Some(product);
            Ok::<(), anyhow::Error>(())
        }
        .await;
        self.tabs.close(tab_id).await;
        result?;

        item.advance(WorkItemStatus::Scraped)?;
        self.store.put_item(item).await?;
        let title = item.extracted.as_ref().map(|p| p.title.clone()).unwrap_or_default();
        self.bus.publish(PipelineEvent::item_scraped(&item.product_id, title));
        Ok(())
    }

    /// Walks the listing wizard: classify the current page, act on it, wait
    /// for the wizard to move, repeat. A hard step cap bounds the loop when
    /// the wizard stops making progress.
    async fn drive_wizard(
        &self,
        item: &mut WorkItem,
        cancel: &CancellationToken,
    ) -> anyhow::Result<()> {
        if item.status.can_advance_to(WorkItemStatus::Searching) {
            item.advance(WorkItemStatus::Searching)?;
            self.store.put_item(item).await?;
        }

        let wizard_url = self.config.advanced.target_wizard_url.clone();
        let tab_id = self.tabs.open(&wizard_url, TabRole::Target).await?;
        let result = self.wizard_loop(tab_id, item, &wizard_url, cancel).await;
        self.tabs.close(tab_id).await;
        result
    }

    async fn wizard_loop(
        &self,
        tab_id: crate::infrastructure::tab::TabId,
        item: &mut WorkItem,
        wizard_url: &str,
        cancel: &CancellationToken,
    ) -> anyhow::Result<()> {
        self.tabs.await_tab_loaded(tab_id, wizard_url, self.tab_load_timeout()).await?;
        let page = self.tabs.page(tab_id);
        let settle = Duration::from_millis(self.config.user.settle_delay_ms);

        let mut form_filled = false;
        let mut retries_left = self.config.user.step_retry_count;

        for _step in 0..self.config.advanced.max_wizard_steps {
            if cancel.is_cancelled() {
                anyhow::bail!("cancelled mid-wizard");
            }
            if form_filled {
                return Ok(());
            }

            let detected = self
                .engine
                .detect(&page)
                .await
                .map_err(|e| anyhow::anyhow!("wizard page detection failed: {e}"))?;

            let acted: Result<(), ActionError> = match detected {
                TargetPage::Search => self.engine.perform_search(&page, item).await,
                TargetPage::Disambiguation => {
                    if item.status == WorkItemStatus::Searching {
                        item.advance(WorkItemStatus::Identifying)?;
                        self.store.put_item(item).await?;
                    }
                    self.engine.handle_disambiguation(&page).await
                }
                TargetPage::Condition => self.engine.handle_condition(&page).await,
                TargetPage::Form => {
                    if item.status != WorkItemStatus::FormFilling {
                        item.advance(WorkItemStatus::FormFilling)?;
                        self.store.put_item(item).await?;
                    }
                    self.engine.fill_form(&page, item).await.map(|_| form_filled = true)
                }
                TargetPage::Unknown => {
                    tokio::time::sleep(settle).await;
                    continue;
                }
            };

            match acted {
                Ok(()) => {
                    retries_left = self.config.user.step_retry_count;
                    tokio::time::sleep(settle).await;
                }
                // Missing elements and a bare catalog match page are usually
                // a page still rendering.
                Err(e @ (ActionError::ElementNotFound(_) | ActionError::DisambiguationStuck))
                    if retries_left > 0 =>
                {
                    retries_left -= 1;
                    warn!(%e, retries_left, "wizard step not ready, retrying");
                    tokio::time::sleep(Duration::from_millis(
                        self.config.user.step_retry_delay_ms,
                    ))
                    .await;
                }
                Err(e) => anyhow::bail!("wizard step failed: {e}"),
            }
        }

        if form_filled {
            Ok(())
        } else {
            anyhow::bail!("wizard did not reach the listing form within the allowed steps")
        }
    }

    fn tab_load_timeout(&self) -> Duration {
        Duration::from_secs(self.config.user.tab_load_timeout_seconds)
    }
}
