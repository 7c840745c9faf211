//! Test utilities: a scripted in-process browser backend
//!
//! `SimulatedDriver` plays back scripted page sequences so pipeline tests
//! run without a browser. Each script is a list of [`SimPage`] stages; a
//! click or submit on a designated selector advances the tab to the next
//! stage and emits the matching navigation event.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, broadcast};

use crate::infrastructure::page::{PageActions, PageError};
use crate::infrastructure::tab::{TabDriver, TabError, TabEvent, TabId, TabStatus};

/// One scripted page state.
#[derive(Debug, Clone, Default)]
pub struct SimPage {
    pub url: String,
    pub html: String,
    /// Selector parts that exist on this page.
    pub present: Vec<String>,
    /// Selector parts that render late: absent for the first N lookups.
    pub late: Vec<(String, u32)>,
    /// Clicking or filling-and-submitting one of these advances the stage.
    pub advance_on: Vec<String>,
    /// (selector part, visible text, advances) triples for click_by_text.
    pub buttons: Vec<(String, String, bool)>,
}

impl SimPage {
    pub fn new(url: &str) -> Self {
        Self { url: url.to_string(), ..Default::default() }
    }

    pub fn with_html(mut self, html: &str) -> Self {
        self.html = html.to_string();
        self
    }

    pub fn with_present(mut self, selectors: &[&str]) -> Self {
        self.present = selectors.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn advance_on(mut self, selectors: &[&str]) -> Self {
        self.advance_on = selectors.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_button(mut self, selector: &str, text: &str, advances: bool) -> Self {
        self.buttons.push((selector.to_string(), text.to_string(), advances));
        self
    }

    /// The selector stays absent for the first `misses` lookups, then exists.
    pub fn appears_after(mut self, selector: &str, misses: u32) -> Self {
        self.late.push((selector.to_string(), misses));
        self
    }
}

struct SimTab {
    stages: Vec<SimPage>,
    index: usize,
}

struct SimState {
    tabs: HashMap<TabId, SimTab>,
    next_id: TabId,
    scripts: Vec<(String, Vec<SimPage>)>,
    stalled_prefixes: Vec<String>,
}

/// Scripted [`TabDriver`] for tests.
pub struct SimulatedDriver {
    state: Arc<Mutex<SimState>>,
    events: broadcast::Sender<TabEvent>,
}

impl SimulatedDriver {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(1000);
        Self {
            state: Arc::new(Mutex::new(SimState {
                tabs: HashMap::new(),
                next_id: 1,
                scripts: Vec::new(),
                stalled_prefixes: Vec::new(),
            })),
            events,
        }
    }

    /// Registers the stage sequence served for URLs starting with `prefix`.
    pub async fn script(&self, prefix: &str, stages: Vec<SimPage>) {
        assert!(!stages.is_empty(), "a script needs at least one stage");
        self.state.lock().await.scripts.push((prefix.to_string(), stages));
    }

    /// URLs starting with `prefix` open but never finish loading.
    pub async fn stall_on(&self, prefix: &str) {
        self.state.lock().await.stalled_prefixes.push(prefix.to_string());
    }
}

impl Default for SimulatedDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TabDriver for SimulatedDriver {
    async fn open_tab(&self, url: &str) -> Result<TabId, TabError> {
        let mut state = self.state.lock().await;
        let tab_id = state.next_id;
        state.next_id += 1;

        let stalled = state.stalled_prefixes.iter().any(|p| url.starts_with(p.as_str()));
        let stages = state
            .scripts
            .iter()
            .find(|(prefix, _)| url.starts_with(prefix.as_str()))
            .map(|(_, stages)| stages.clone())
            .unwrap_or_else(|| vec![SimPage::new(url)]);
        let first_url = stages[0].url.clone();
        state.tabs.insert(tab_id, SimTab { stages, index: 0 });
        drop(state);

        let events = self.events.clone();
        tokio::spawn(async move {
            let _ = events.send(TabEvent::Navigated {
                tab_id,
                url: first_url.clone(),
                status: TabStatus::Loading,
            });
            if !stalled {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                let _ = events.send(TabEvent::Navigated {
                    tab_id,
                    url: first_url,
                    status: TabStatus::Complete,
                });
            }
        });

        Ok(tab_id)
    }

    async fn close_tab(&self, tab_id: TabId) -> Result<(), TabError> {
        self.state.lock().await.tabs.remove(&tab_id);
        let _ = self.events.send(TabEvent::Closed { tab_id });
        Ok(())
    }

    fn events(&self) -> broadcast::Receiver<TabEvent> {
        self.events.subscribe()
    }

    fn page(&self, tab_id: TabId) -> Arc<dyn PageActions> {
        Arc::new(SimulatedPage {
            state: Arc::clone(&self.state),
            events: self.events.clone(),
            tab_id,
        })
    }
}

pub struct SimulatedPage {
    state: Arc<Mutex<SimState>>,
    events: broadcast::Sender<TabEvent>,
    tab_id: TabId,
}

fn selector_parts(selector: &str) -> Vec<&str> {
    selector.split(',').map(str::trim).collect()
}

impl SimulatedPage {
    async fn with_stage<T>(
        &self,
        f: impl FnOnce(&SimPage) -> T,
    ) -> Result<T, PageError> {
        let state = self.state.lock().await;
        let tab = state
            .tabs
            .get(&self.tab_id)
            .ok_or_else(|| PageError::Driver(format!("tab {} is closed", self.tab_id)))?;
        Ok(f(&tab.stages[tab.index]))
    }

    /// Advances the tab to its next stage and emits the navigation event.
    async fn advance(&self) {
        let next_url = {
            let mut state = self.state.lock().await;
            let Some(tab) = state.tabs.get_mut(&self.tab_id) else { return };
            if tab.index + 1 >= tab.stages.len() {
                return;
            }
            tab.index += 1;
            tab.stages[tab.index].url.clone()
        };
        let _ = self.events.send(TabEvent::Navigated {
            tab_id: self.tab_id,
            url: next_url,
            status: TabStatus::Complete,
        });
    }

    async fn matches_present(&self, selector: &str) -> Result<Option<String>, PageError> {
        let mut state = self.state.lock().await;
        let tab = state
            .tabs
            .get_mut(&self.tab_id)
            .ok_or_else(|| PageError::Driver(format!("tab {} is closed", self.tab_id)))?;
        let stage = &mut tab.stages[tab.index];
        for part in selector_parts(selector) {
            if stage.present.iter().any(|p| p == part) {
                return Ok(Some(part.to_string()));
            }
            if let Some((_, misses)) = stage.late.iter_mut().find(|(s, _)| s == part) {
                if *misses == 0 {
                    return Ok(Some(part.to_string()));
                }
                *misses -= 1;
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl PageActions for SimulatedPage {
    async fn current_url(&self) -> Result<String, PageError> {
        self.with_stage(|stage| stage.url.clone()).await
    }

    async fn html(&self) -> Result<String, PageError> {
        self.with_stage(|stage| stage.html.clone()).await
    }

    async fn exists(&self, selector: &str) -> Result<bool, PageError> {
        Ok(self.matches_present(selector).await?.is_some())
    }

    async fn fill(&self, selector: &str, _value: &str) -> Result<(), PageError> {
        match self.matches_present(selector).await? {
            Some(_) => Ok(()),
            None => Err(PageError::ElementNotFound(selector.to_string())),
        }
    }

    async fn click(&self, selector: &str) -> Result<(), PageError> {
        let Some(part) = self.matches_present(selector).await? else {
            return Err(PageError::ElementNotFound(selector.to_string()));
        };
        let advances =
            self.with_stage(|stage| stage.advance_on.iter().any(|a| a == &part)).await?;
        if advances {
            self.advance().await;
        }
        Ok(())
    }

    async fn click_by_text(&self, selector: &str, needles: &[&str]) -> Result<bool, PageError> {
        let parts: Vec<String> =
            selector_parts(selector).into_iter().map(|s| s.to_string()).collect();
        let hit = self
            .with_stage(|stage| {
                stage
                    .buttons
                    .iter()
                    .find(|(sel, text, _)| {
                        parts.iter().any(|p| p == sel)
                            && needles
                                .iter()
                                .any(|n| text.to_lowercase().contains(&n.to_lowercase()))
                    })
                    .map(|(_, _, advances)| *advances)
            })
            .await?;
        match hit {
            Some(true) => {
                self.advance().await;
                Ok(true)
            }
            Some(false) => Ok(true),
            None => Ok(false),
        }
    }

    async fn submit(&self, selector: &str) -> Result<(), PageError> {
        let Some(part) = self.matches_present(selector).await? else {
            return Err(PageError::ElementNotFound(selector.to_string()));
        };
        let advances =
            self.with_stage(|stage| stage.advance_on.iter().any(|a| a == &part)).await?;
        if advances {
            self.advance().await;
        }
        Ok(())
    }
}
