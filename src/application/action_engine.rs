//! Target-site wizard actions
//!
//! One method per wizard page. Every method takes the page handle, performs
//! its actions and returns; advancing to the next page is the orchestrator's
//! business, observed through tab navigation rather than assumed by sleeps.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::domain::work_item::WorkItem;
use crate::infrastructure::classifier::{TargetPage, classify};
use crate::infrastructure::page::{PageActions, PageError, wait_for};

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("required element missing: {0}")]
    ElementNotFound(String),
    #[error("no path forward on the catalog match page")]
    DisambiguationStuck,
    #[error(transparent)]
    Page(PageError),
}

impl From<PageError> for ActionError {
    fn from(err: PageError) -> Self {
        // A missing element is the same condition whichever layer reports it.
        match err {
            PageError::ElementNotFound(what) => Self::ElementNotFound(what),
            other => Self::Page(other),
        }
    }
}

/// CSS selectors for the listing wizard, comma groups as fallbacks.
#[derive(Debug, Clone)]
pub struct TargetSelectors {
    pub search_input: String,
    pub product_card: String,
    pub continue_without_match: String,
    pub any_continue_button: String,
    pub condition_picker: String,
    pub condition_new: String,
    pub condition_label: String,
    pub condition_any_radio: String,
    pub form_title: String,
    pub form_description: String,
    pub form_price: String,
    pub form_quantity: String,
    pub form_condition: String,
}

impl Default for TargetSelectors {
    fn default() -> Self {
        Self {
            search_input: "input.se-search-box__input, .se-search-box input[type=\"text\"], input[name=\"query\"], input[type=\"search\"], input[placeholder*=\"search\" i]"
                .to_string(),
            product_card: ".product-button, button.product-button, .card-container__item button"
                .to_string(),
            continue_without_match: "button.prelist-radix__next-action, .prelist-radix__next-action"
                .to_string(),
            any_continue_button: "button, a.btn, a.fake-btn".to_string(),
            condition_picker: ".condition-picker, .radix-condition, [class*=\"condition-dialog\"], input[name*=\"condition\"]"
                .to_string(),
            condition_new: "input[type=\"radio\"][value=\"1000\"], input[name*=\"condition\"][value*=\"new\" i], button[data-value=\"1000\"]"
                .to_string(),
            condition_label: "label".to_string(),
            condition_any_radio: "input[type=\"radio\"]".to_string(),
            form_title: "input[name*=\"title\"], input[id*=\"title\"], input[placeholder*=\"title\" i]"
                .to_string(),
            form_description: "textarea[name*=\"description\"], div[contenteditable=\"true\"], iframe[id*=\"description\"]"
                .to_string(),
            form_price: "input[name*=\"price\"], input[id*=\"price\"], input[placeholder*=\"price\" i]"
                .to_string(),
            form_quantity: "input[name*=\"quantity\"], input[id*=\"quantity\"]".to_string(),
            form_condition: "select[name*=\"condition\"], input[name*=\"condition\"][value=\"1000\"]"
                .to_string(),
        }
    }
}

pub struct ActionEngine {
    selectors: TargetSelectors,
    settle: Duration,
}

impl ActionEngine {
    pub fn new(selectors: TargetSelectors, settle: Duration) -> Self {
        Self { selectors, settle }
    }

    /// Classifies the page the tab currently shows.
    pub async fn detect(&self, page: &Arc<dyn PageActions>) -> Result<TargetPage, ActionError> {
        let url = page.current_url().await?;
        let has_condition = page.exists(&self.selectors.condition_picker).await?;
        let detected = classify(&url, has_condition);
        debug!(%url, ?detected, "classified wizard page");
        Ok(detected)
    }

    /// Types the search query and submits it. The wizard navigates to the
    /// catalog match page on its own.
    pub async fn perform_search(
        &self,
        page: &Arc<dyn PageActions>,
        item: &WorkItem,
    ) -> Result<(), ActionError> {
        let input = &self.selectors.search_input;
        if !wait_for(page, input, self.settle * 4, Duration::from_millis(250)).await? {
            return Err(ActionError::ElementNotFound(input.clone()));
        }
        page.fill(input, &item.target_search_query).await?;
        page.submit(input).await?;
        info!(product_id = %item.product_id, query = %item.target_search_query, "submitted wizard search");
        Ok(())
    }

    /// Three escalating strategies for the catalog match page: pick the
    /// first suggested product, decline to match, or press anything that
    /// reads like a continue button. All three failing means the page layout
    /// changed and the item cannot proceed.
    pub async fn handle_disambiguation(
        &self,
        page: &Arc<dyn PageActions>,
    ) -> Result<(), ActionError> {
        if page.exists(&self.selectors.product_card).await? {
            page.click(&self.selectors.product_card).await?;
            info!("selected first catalog match");
            return Ok(());
        }

        if page
            .click_by_text(&self.selectors.continue_without_match, &["continue", "without"])
            .await?
        {
            info!("continued without a catalog match");
            return Ok(());
        }

        if page
            .click_by_text(&self.selectors.any_continue_button, &["continue", "next", "proceed"])
            .await?
        {
            info!("advanced via generic continue button");
            return Ok(());
        }

        warn!("no product card, no skip button, no continue button");
        Err(ActionError::DisambiguationStuck)
    }

    /// Picks the "New" condition. Falls back from the known input value to
    /// a label search to the first radio on the page, then continues.
    pub async fn handle_condition(&self, page: &Arc<dyn PageActions>) -> Result<(), ActionError> {
        if page.exists(&self.selectors.condition_new).await? {
            page.click(&self.selectors.condition_new).await?;
        } else if page.click_by_text(&self.selectors.condition_label, &["new"]).await? {
            debug!("picked condition via label text");
        } else if page.exists(&self.selectors.condition_any_radio).await? {
            warn!("condition \"New\" not found, taking the first radio");
            page.click(&self.selectors.condition_any_radio).await?;
        }

        tokio::time::sleep(self.settle).await;

        if !page
            .click_by_text(&self.selectors.any_continue_button, &["continue", "next", "proceed"])
            .await?
        {
            return Err(ActionError::ElementNotFound("condition continue button".into()));
        }
        Ok(())
    }

    /// Fills the listing form. Any subset of fields filling counts as
    /// success; returns how many fields were filled.
    pub async fn fill_form(
        &self,
        page: &Arc<dyn PageActions>,
        item: &WorkItem,
    ) -> Result<u32, ActionError> {
        let Some(product) = &item.extracted else {
            return Err(ActionError::ElementNotFound("no extracted product to fill".into()));
        };

        wait_for(page, &self.selectors.form_title, self.settle * 4, Duration::from_millis(250))
            .await?;

        let mut filled = 0u32;
        let fields: [(&str, &str); 5] = [
            (&self.selectors.form_title, &product.title),
            (&self.selectors.form_description, &product.description),
            (&self.selectors.form_price, &product.price),
            (&self.selectors.form_quantity, "1"),
            (&self.selectors.form_condition, "1000"),
        ];

        for (selector, value) in fields {
            if value.is_empty() {
                continue;
            }
            match page.fill(selector, value).await {
                Ok(()) => filled += 1,
                Err(PageError::ElementNotFound(_)) => {
                    debug!(selector, "form field absent, skipping");
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!(product_id = %item.product_id, filled, "listing form filled");
        Ok(filled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::product::ExtractedProduct;
    use crate::domain::work_item::WorkItem;
    use crate::infrastructure::tab::TabDriver;
    use crate::test_utils::{SimPage, SimulatedDriver};

    fn engine() -> ActionEngine {
        ActionEngine::new(TargetSelectors::default(), Duration::from_millis(10))
    }

    fn item_with_product() -> WorkItem {
        let mut item = WorkItem::new("B0TESTASIN", "https://www.amazon.com/dp/B0TESTASIN", 0, 1);
        item.extracted = Some(ExtractedProduct {
            title: "Cordless Drill".into(),
            price: "49.99".into(),
            brand: "Acme".into(),
            features: vec![],
            images: vec![],
            description: "Cordless Drill".into(),
        });
        item
    }

    async fn form_page(present: &[&str]) -> Arc<dyn PageActions> {
        let driver = SimulatedDriver::new();
        driver
            .script(
                "https://www.ebay.com/sl/list",
                vec![SimPage::new("https://www.ebay.com/sl/list").with_present(present)],
            )
            .await;
        let tab_id = driver.open_tab("https://www.ebay.com/sl/list").await.unwrap();
        driver.page(tab_id)
    }

    #[tokio::test]
    async fn form_fill_succeeds_with_only_a_title_field() {
        let page = form_page(&["input[name*=\"title\"]"]).await;
        let filled = engine().fill_form(&page, &item_with_product()).await.unwrap();
        assert_eq!(filled, 1);
    }

    #[tokio::test]
    async fn form_fill_counts_every_present_field() {
        let page = form_page(&[
            "input[name*=\"title\"]",
            "textarea[name*=\"description\"]",
            "input[name*=\"price\"]",
            "input[name*=\"quantity\"]",
            "select[name*=\"condition\"]",
        ])
        .await;
        let filled = engine().fill_form(&page, &item_with_product()).await.unwrap();
        assert_eq!(filled, 5);
    }

    #[test]
    fn page_missing_element_folds_into_element_not_found() {
        let err: ActionError = PageError::ElementNotFound("input".into()).into();
        assert!(matches!(err, ActionError::ElementNotFound(_)));
        let err: ActionError = PageError::Driver("session gone".into()).into();
        assert!(matches!(err, ActionError::Page(_)));
    }

    #[tokio::test]
    async fn form_fill_without_extracted_data_is_an_error() {
        let page = form_page(&["input[name*=\"title\"]"]).await;
        let item = WorkItem::new("B0TESTASIN", "https://www.amazon.com/dp/B0TESTASIN", 0, 1);
        let err = engine().fill_form(&page, &item).await.unwrap_err();
        assert!(matches!(err, ActionError::ElementNotFound(_)));
    }
}
