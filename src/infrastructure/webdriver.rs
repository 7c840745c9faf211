//! WebDriver-backed tab driver
//!
//! Maps the pipeline's tab model onto a single WebDriver session: every tab
//! is a browser window handle, and a session-wide lock serializes window
//! switching so page actions never race each other onto the wrong window.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use fantoccini::wd::WindowHandle;
use fantoccini::{Client, ClientBuilder, Locator, error::CmdError, key::Key};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};

use crate::infrastructure::page::{PageActions, PageError};
use crate::infrastructure::tab::{TabDriver, TabError, TabEvent, TabId, TabStatus};

fn cmd_to_page_error(selector: &str, err: CmdError) -> PageError {
    if err.is_no_such_element() {
        PageError::ElementNotFound(selector.to_string())
    } else {
        PageError::Driver(err.to_string())
    }
}

struct SessionState {
    client: Client,
    windows: HashMap<TabId, WindowHandle>,
    next_id: TabId,
}

impl SessionState {
    async fn focus(&self, tab_id: TabId) -> Result<(), PageError> {
        let handle = self
            .windows
            .get(&tab_id)
            .ok_or_else(|| PageError::Driver(format!("unknown tab {tab_id}")))?;
        self.client
            .switch_to_window(handle.clone())
            .await
            .map_err(|e| PageError::Driver(e.to_string()))
    }
}

/// One WebDriver session shared by all tabs the pipeline opens.
pub struct WebDriverBackend {
    session: Arc<Mutex<SessionState>>,
    events: broadcast::Sender<TabEvent>,
}

impl WebDriverBackend {
    /// Connects to a running WebDriver endpoint (chromedriver or geckodriver).
    pub async fn connect(webdriver_url: &str) -> anyhow::Result<Self> {
        info!("connecting to webdriver at {}", webdriver_url);
        let client = ClientBuilder::native().connect(webdriver_url).await?;
        let (events, _) = broadcast::channel(1000);
        Ok(Self {
            session: Arc::new(Mutex::new(SessionState {
                client,
                windows: HashMap::new(),
                next_id: 1,
            })),
            events,
        })
    }

    /// Ends the browser session. Call once the batch is done.
    pub async fn shutdown(&self) {
        let session = self.session.lock().await;
        if let Err(e) = session.client.clone().close().await {
            warn!("webdriver session close failed: {e}");
        }
    }
}

#[async_trait]
impl TabDriver for WebDriverBackend {
    async fn open_tab(&self, url: &str) -> Result<TabId, TabError> {
        let mut session = self.session.lock().await;
        let tab_id = session.next_id;
        session.next_id += 1;

        let new_window = session
            .client
            .new_window(true)
            .await
            .map_err(|e| TabError::Driver(e.to_string()))?;
        session.windows.insert(tab_id, new_window.handle.clone());
        session
            .client
            .switch_to_window(new_window.handle)
            .await
            .map_err(|e| TabError::Driver(e.to_string()))?;

        drop(session);

        // Navigation runs detached so callers can subscribe for the
        // completion event before it fires. goto resolves once the document
        // finishes loading, so the Complete event carries the post-redirect
        // URL.
        let session = Arc::clone(&self.session);
        let events = self.events.clone();
        let url = url.to_string();
        tokio::spawn(async move {
            let _ = events.send(TabEvent::Navigated {
                tab_id,
                url: url.clone(),
                status: TabStatus::Loading,
            });
            let session = session.lock().await;
            if session.focus(tab_id).await.is_err() {
                let _ = events.send(TabEvent::Closed { tab_id });
                return;
            }
            match session.client.goto(&url).await {
                Ok(()) => {
                    let final_url = session
                        .client
                        .current_url()
                        .await
                        .map(|u| u.to_string())
                        .unwrap_or_else(|_| url.clone());
                    debug!(tab_id, %final_url, "tab load complete");
                    let _ = events.send(TabEvent::Navigated {
                        tab_id,
                        url: final_url,
                        status: TabStatus::Complete,
                    });
                }
                Err(e) => {
                    warn!(tab_id, "navigation failed: {e}");
                    let _ = events.send(TabEvent::Navigated {
                        tab_id,
                        url,
                        status: TabStatus::Error,
                    });
                }
            }
        });

        Ok(tab_id)
    }

    async fn close_tab(&self, tab_id: TabId) -> Result<(), TabError> {
        let mut session = self.session.lock().await;
        let Some(handle) = session.windows.remove(&tab_id) else {
            return Ok(());
        };
        session
            .client
            .switch_to_window(handle)
            .await
            .map_err(|e| TabError::Driver(e.to_string()))?;
        session
            .client
            .close_window()
            .await
            .map_err(|e| TabError::Driver(e.to_string()))?;
        // The session needs a focused window to stay usable.
        if let Some(remaining) = session.windows.values().next().cloned() {
            session
                .client
                .switch_to_window(remaining)
                .await
                .map_err(|e| TabError::Driver(e.to_string()))?;
        }
        let _ = self.events.send(TabEvent::Closed { tab_id });
        Ok(())
    }

    fn events(&self) -> broadcast::Receiver<TabEvent> {
        self.events.subscribe()
    }

    fn page(&self, tab_id: TabId) -> Arc<dyn PageActions> {
        Arc::new(WebDriverPage { session: Arc::clone(&self.session), tab_id })
    }
}

/// Page handle bound to one window of the shared session.
pub struct WebDriverPage {
    session: Arc<Mutex<SessionState>>,
    tab_id: TabId,
}

#[async_trait]
impl PageActions for WebDriverPage {
    async fn current_url(&self) -> Result<String, PageError> {
        let session = self.session.lock().await;
        session.focus(self.tab_id).await?;
        session
            .client
            .current_url()
            .await
            .map(|u| u.to_string())
            .map_err(|e| PageError::Driver(e.to_string()))
    }

    async fn html(&self) -> Result<String, PageError> {
        let session = self.session.lock().await;
        session.focus(self.tab_id).await?;
        session.client.source().await.map_err(|e| PageError::Driver(e.to_string()))
    }

    async fn exists(&self, selector: &str) -> Result<bool, PageError> {
        let session = self.session.lock().await;
        session.focus(self.tab_id).await?;
        match session.client.find(Locator::Css(selector)).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_no_such_element() => Ok(false),
            Err(e) => Err(PageError::Driver(e.to_string())),
        }
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<(), PageError> {
        let session = self.session.lock().await;
        session.focus(self.tab_id).await?;
        let element = session
            .client
            .find(Locator::Css(selector))
            .await
            .map_err(|e| cmd_to_page_error(selector, e))?;
        element.clear().await.map_err(|e| PageError::Driver(e.to_string()))?;
        element.send_keys(value).await.map_err(|e| PageError::Driver(e.to_string()))
    }

    async fn click(&self, selector: &str) -> Result<(), PageError> {
        let session = self.session.lock().await;
        session.focus(self.tab_id).await?;
        session
            .client
            .find(Locator::Css(selector))
            .await
            .map_err(|e| cmd_to_page_error(selector, e))?
            .click()
            .await
            .map_err(|e| PageError::Driver(e.to_string()))
    }

    async fn click_by_text(&self, selector: &str, needles: &[&str]) -> Result<bool, PageError> {
        let session = self.session.lock().await;
        session.focus(self.tab_id).await?;
        let elements = session
            .client
            .find_all(Locator::Css(selector))
            .await
            .map_err(|e| cmd_to_page_error(selector, e))?;
        for element in elements {
            let text = element.text().await.unwrap_or_default().to_lowercase();
            if needles.iter().any(|needle| text.contains(&needle.to_lowercase())) {
                element.click().await.map_err(|e| PageError::Driver(e.to_string()))?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn submit(&self, selector: &str) -> Result<(), PageError> {
        let session = self.session.lock().await;
        session.focus(self.tab_id).await?;
        let element = session
            .client
            .find(Locator::Css(selector))
            .await
            .map_err(|e| cmd_to_page_error(selector, e))?;
        let enter: char = Key::Enter.into();
        element
            .send_keys(&enter.to_string())
            .await
            .map_err(|e| PageError::Driver(e.to_string()))
    }
}
