//! Tab lifecycle coordination
//!
//! Tracks every tab the pipeline owns and turns the driver's navigation
//! events into awaitable load completions. A load resolves only when the
//! completed URL actually belongs to the expected destination, so a tab
//! that was redirected elsewhere mid-flight never satisfies the wait.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, warn};
use url::Url;

use crate::infrastructure::page::PageActions;

pub type TabId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabRole {
    /// Source-marketplace product page.
    Source,
    /// Target-marketplace listing wizard.
    Target,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabStatus {
    Loading,
    Complete,
    Error,
}

#[derive(Debug, Clone)]
pub struct TabRecord {
    pub id: TabId,
    pub role: TabRole,
    pub url: String,
    pub status: TabStatus,
}

/// Navigation events emitted by the driver backend.
#[derive(Debug, Clone)]
pub enum TabEvent {
    Navigated { tab_id: TabId, url: String, status: TabStatus },
    Closed { tab_id: TabId },
}

#[derive(Debug, thiserror::Error)]
pub enum TabError {
    #[error("tab {0} closed before finishing its load")]
    TabVanished(TabId),
    #[error("tab {tab_id} did not finish loading {url} within {timeout:?}")]
    LoadTimeout { tab_id: TabId, url: String, timeout: Duration },
    #[error("tab {tab_id} load failed: {reason}")]
    LoadFailed { tab_id: TabId, reason: String },
    #[error("driver error: {0}")]
    Driver(String),
    #[error("event channel lagged, tab state unreliable")]
    ChannelLagged,
}

/// Browser backend contract: open and close tabs, surface navigation
/// events, hand out per-tab page handles.
#[async_trait]
pub trait TabDriver: Send + Sync {
    async fn open_tab(&self, url: &str) -> Result<TabId, TabError>;
    async fn close_tab(&self, tab_id: TabId) -> Result<(), TabError>;
    fn events(&self) -> broadcast::Receiver<TabEvent>;
    fn page(&self, tab_id: TabId) -> Arc<dyn PageActions>;
}

/// Owns the tab registry and the load-await machinery.
pub struct TabCoordinator {
    driver: Arc<dyn TabDriver>,
    tabs: Arc<RwLock<HashMap<TabId, TabRecord>>>,
}

impl TabCoordinator {
    pub fn new(driver: Arc<dyn TabDriver>) -> Self {
        let tabs: Arc<RwLock<HashMap<TabId, TabRecord>>> = Arc::new(RwLock::new(HashMap::new()));

        // Background task keeps the registry in sync with driver events.
        let registry = Arc::clone(&tabs);
        let mut events = driver.events();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(TabEvent::Navigated { tab_id, url, status }) => {
                        // Upsert: navigation can race the open() bookkeeping,
                        // and a dropped completion would strand the waiter.
                        let mut map = registry.write().await;
                        let record = map.entry(tab_id).or_insert_with(|| TabRecord {
                            id: tab_id,
                            role: TabRole::Source,
                            url: url.clone(),
                            status,
                        });
                        record.url = url;
                        record.status = status;
                    }
                    Ok(TabEvent::Closed { tab_id }) => {
                        registry.write().await.remove(&tab_id);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("tab event stream lagged, skipped {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Self { driver, tabs }
    }

    pub fn page(&self, tab_id: TabId) -> Arc<dyn PageActions> {
        self.driver.page(tab_id)
    }

    pub async fn open(&self, url: &str, role: TabRole) -> Result<TabId, TabError> {
        let id = self.driver.open_tab(url).await?;
        let mut map = self.tabs.write().await;
        let record = map.entry(id).or_insert_with(|| TabRecord {
            id,
            role,
            url: url.to_owned(),
            status: TabStatus::Loading,
        });
        record.role = role;
        debug!(tab_id = id, %url, ?role, "opened tab");
        Ok(id)
    }

    /// Close is best-effort: a tab the user already closed is not an error.
    pub async fn close(&self, tab_id: TabId) {
        if let Err(e) = self.driver.close_tab(tab_id).await {
            debug!(tab_id, "close_tab failed (tab likely already gone): {e}");
        }
        self.tabs.write().await.remove(&tab_id);
    }

    /// Waits until `tab_id` reports a completed load whose URL matches the
    /// expected destination host. Subscribes before checking current state
    /// so a completion between the two is never missed.
    pub async fn await_tab_loaded(
        &self,
        tab_id: TabId,
        expected_url: &str,
        timeout: Duration,
    ) -> Result<String, TabError> {
        let mut events = self.driver.events();

        if let Some(record) = self.tabs.read().await.get(&tab_id) {
            if record.status == TabStatus::Complete && urls_match(&record.url, expected_url) {
                return Ok(record.url.clone());
            }
        }

        // The registry poll backstops the event stream: a completion that
        // raced the subscription still lands in the registry.
        let mut poll = tokio::time::interval(Duration::from_millis(200));
        let wait = async {
            loop {
                tokio::select! {
                    received = events.recv() => match received {
                        Ok(TabEvent::Navigated { tab_id: id, url, status }) if id == tab_id => {
                            match status {
                                TabStatus::Complete if urls_match(&url, expected_url) => {
                                    return Ok(url);
                                }
                                TabStatus::Complete => {
                                    debug!(tab_id, %url, expected_url, "load completed off-target, waiting");
                                }
                                TabStatus::Error => {
                                    return Err(TabError::LoadFailed {
                                        tab_id,
                                        reason: format!("navigation error at {url}"),
                                    });
                                }
                                TabStatus::Loading => {}
                            }
                        }
                        Ok(TabEvent::Closed { tab_id: id }) if id == tab_id => {
                            return Err(TabError::TabVanished(tab_id));
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(_)) => {
                            return Err(TabError::ChannelLagged);
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err(TabError::TabVanished(tab_id));
                        }
                    },
                    _ = poll.tick() => {
                        if let Some(record) = self.tabs.read().await.get(&tab_id) {
                            match record.status {
                                TabStatus::Complete if urls_match(&record.url, expected_url) => {
                                    return Ok(record.url.clone());
                                }
                                TabStatus::Error => {
                                    return Err(TabError::LoadFailed {
                                        tab_id,
                                        reason: format!("navigation error at {}", record.url),
                                    });
                                }
                                _ => {}
                            }
                        }
                    }
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(TabError::LoadTimeout { tab_id, url: expected_url.to_owned(), timeout }),
        }
    }
}

/// Host-level match: the completed URL must live on the same host as the
/// expected one. Wizard flows bounce between paths on one host, so path
/// equality would be too strict; host equality catches redirects away.
fn urls_match(actual: &str, expected: &str) -> bool {
    match (Url::parse(actual), Url::parse(expected)) {
        (Ok(a), Ok(e)) => a.host_str() == e.host_str() && a.host_str().is_some(),
        _ => false,
    }
}
