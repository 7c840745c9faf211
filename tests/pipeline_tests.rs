//! End-to-end pipeline tests on the simulated browser backend

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crosslist::application::action_engine::{ActionEngine, TargetSelectors};
use crosslist::application::event_bus::EventBus;
use crosslist::application::orchestrator::PipelineOrchestrator;
use crosslist::domain::events::PipelineEvent;
use crosslist::domain::product::ExtractedProduct;
use crosslist::domain::work_item::{WorkItem, WorkItemStatus};
use crosslist::infrastructure::config::AppConfig;
use crosslist::infrastructure::store::{MemoryStore, WorkItemStore};
use crosslist::infrastructure::tab::TabCoordinator;
use crosslist::test_utils::{SimPage, SimulatedDriver};

const SOURCE_URL: &str = "https://www.amazon.com/dp/B0TESTASIN";
const WIZARD_URL: &str = "https://www.ebay.com/sl/sell";

const PRODUCT_HTML: &str = r#"
    <html><body>
        <span id="productTitle">Acme Widget Deluxe</span>
        <span id="bylineInfo">Visit the Acme Store</span>
        <div class="a-price"><span class="a-price-whole">24.</span><span class="a-price-fraction">99</span></div>
        <div id="altImages"><img src="https://m.media.example.com/I/71abc._AC_US40_.jpg"></div>
    </body></html>
"#;

const RESTRICTED_HTML: &str = r#"
    <html><body>
        <span id="productTitle">Nike Air Sneakers</span>
        <span id="bylineInfo">Visit the Nike Store</span>
    </body></html>
"#;

fn fast_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.user.item_stagger_ms = 10;
    config.user.settle_delay_ms = 10;
    config.user.step_retry_delay_ms = 10;
    config.user.step_retry_count = 2;
    config.user.tab_load_timeout_seconds = 1;
    config
}

fn wizard_script() -> Vec<SimPage> {
    vec![
        SimPage::new("https://www.ebay.com/sl/sell")
            .with_present(&[r#"input[name="query"]"#])
            .advance_on(&[r#"input[name="query"]"#]),
        SimPage::new("https://www.ebay.com/sl/prelist/identify")
            .with_present(&[".product-button"])
            .advance_on(&[".product-button"]),
        SimPage::new("https://www.ebay.com/sl/prelist/condition")
            .with_present(&[".condition-picker", r#"input[type="radio"][value="1000"]"#])
            .with_button("button", "Continue to listing", true),
        SimPage::new("https://www.ebay.com/sl/list?mode=AddItem").with_present(&[
            r#"input[name*="title"]"#,
            r#"textarea[name*="description"]"#,
            r#"input[name*="price"]"#,
            r#"input[name*="quantity"]"#,
            r#"select[name*="condition"]"#,
        ]),
    ]
}

struct Harness {
    store: WorkItemStore,
    bus: EventBus,
    orchestrator: PipelineOrchestrator,
}

fn harness(driver: SimulatedDriver) -> Harness {
    let driver = Arc::new(driver);
    let tabs = Arc::new(TabCoordinator::new(driver.clone()));
    let store = WorkItemStore::new(Arc::new(MemoryStore::new()));
    let bus = EventBus::new();
    let config = fast_config();
    let engine = ActionEngine::new(
        TargetSelectors::default(),
        Duration::from_millis(config.user.settle_delay_ms),
    );
    let orchestrator = PipelineOrchestrator::new(
        tabs,
        store.clone(),
        bus.clone(),
        engine,
        config,
    )
    .without_external_clients();
    Harness { store, bus, orchestrator }
}

#[tokio::test]
async fn happy_path_lists_exactly_once() {
    let driver = SimulatedDriver::new();
    driver.script(SOURCE_URL, vec![SimPage::new(SOURCE_URL).with_html(PRODUCT_HTML)]).await;
    driver.script(WIZARD_URL, wizard_script()).await;
    let h = harness(driver);
    let mut events = h.bus.subscribe();

    let summary = h
        .orchestrator
        .run_batch(&[SOURCE_URL.to_string()], CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.listed, 1);
    assert_eq!(summary.failed, 0);

    let mut scraped = 0;
    let mut listed = 0;
    let mut completed = None;
    while let Ok(event) = events.try_recv() {
        match event {
            PipelineEvent::ItemScraped { product_id, title, .. } => {
                assert_eq!(product_id, "B0TESTASIN");
                assert_eq!(title, "Acme Widget Deluxe");
                scraped += 1;
            }
            PipelineEvent::ItemListed { .. } => listed += 1,
            PipelineEvent::BatchCompleted { listed, failed } => {
                completed = Some((listed, failed));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert_eq!(scraped, 1);
    assert_eq!(listed, 1);
    assert_eq!(completed, Some((1, 0)));

    // Completed batches are purged from the store.
    assert!(h.store.all_items().await.unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_urls_process_once() {
    let driver = SimulatedDriver::new();
    driver.script(SOURCE_URL, vec![SimPage::new(SOURCE_URL).with_html(PRODUCT_HTML)]).await;
    driver.script(WIZARD_URL, wizard_script()).await;
    let h = harness(driver);

    let urls =
        vec![SOURCE_URL.to_string(), format!("{SOURCE_URL}?ref=duplicate"), SOURCE_URL.into()];
    let summary = h.orchestrator.run_batch(&urls, CancellationToken::new()).await.unwrap();

    assert_eq!(summary.listed, 1);
    assert_eq!(summary.skipped, 2);
}

#[tokio::test]
async fn url_without_product_id_fails_the_item() {
    let h = harness(SimulatedDriver::new());
    let mut events = h.bus.subscribe();

    let summary = h
        .orchestrator
        .run_batch(&["https://www.amazon.com/deals".to_string()], CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.listed, 0);
    assert_eq!(summary.skipped, 0);

    let mut saw_failed = false;
    let mut completed = None;
    while let Ok(event) = events.try_recv() {
        match event {
            PipelineEvent::ItemFailed { reason, .. } => {
                assert!(reason.contains("no product id"));
                saw_failed = true;
            }
            PipelineEvent::BatchCompleted { listed, failed } => completed = Some((listed, failed)),
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert!(saw_failed);
    assert_eq!(completed, Some((0, 1)));
}

#[tokio::test]
async fn restricted_brand_fails_before_the_wizard() {
    let driver = SimulatedDriver::new();
    driver.script(SOURCE_URL, vec![SimPage::new(SOURCE_URL).with_html(RESTRICTED_HTML)]).await;
    let h = harness(driver);
    let mut events = h.bus.subscribe();

    let summary = h
        .orchestrator
        .run_batch(&[SOURCE_URL.to_string()], CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.listed, 0);

    let mut saw_failed = false;
    while let Ok(event) = events.try_recv() {
        if let PipelineEvent::ItemFailed { reason, .. } = event {
            assert!(reason.contains("restricted brand"));
            saw_failed = true;
        }
    }
    assert!(saw_failed);
}

#[tokio::test]
async fn wizard_load_timeout_fails_the_item() {
    let driver = SimulatedDriver::new();
    driver.script(SOURCE_URL, vec![SimPage::new(SOURCE_URL).with_html(PRODUCT_HTML)]).await;
    driver.stall_on(WIZARD_URL).await;
    let h = harness(driver);

    let summary = h
        .orchestrator
        .run_batch(&[SOURCE_URL.to_string()], CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.listed, 0);
}

#[tokio::test]
async fn stuck_disambiguation_fails_the_item() {
    let driver = SimulatedDriver::new();
    driver.script(SOURCE_URL, vec![SimPage::new(SOURCE_URL).with_html(PRODUCT_HTML)]).await;
    // Match page with no cards and no buttons at all.
    driver
        .script(
            WIZARD_URL,
            vec![
                SimPage::new("https://www.ebay.com/sl/sell")
                    .with_present(&[r#"input[name="query"]"#])
                    .advance_on(&[r#"input[name="query"]"#]),
                SimPage::new("https://www.ebay.com/sl/prelist/identify"),
            ],
        )
        .await;
    let h = harness(driver);

    let summary = h
        .orchestrator
        .run_batch(&[SOURCE_URL.to_string()], CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.failed, 1);
}

#[tokio::test]
async fn late_rendering_match_card_is_retried() {
    let driver = SimulatedDriver::new();
    driver.script(SOURCE_URL, vec![SimPage::new(SOURCE_URL).with_html(PRODUCT_HTML)]).await;
    // The match card only renders on the second look at the page.
    driver
        .script(
            WIZARD_URL,
            vec![
                SimPage::new("https://www.ebay.com/sl/sell")
                    .with_present(&[r#"input[name="query"]"#])
                    .advance_on(&[r#"input[name="query"]"#]),
                SimPage::new("https://www.ebay.com/sl/prelist/identify")
                    .appears_after(".product-button", 1)
                    .advance_on(&[".product-button"]),
                SimPage::new("https://www.ebay.com/sl/prelist/condition")
                    .with_present(&[".condition-picker", r#"input[type="radio"][value="1000"]"#])
                    .with_button("button", "Continue to listing", true),
                SimPage::new("https://www.ebay.com/sl/list?mode=AddItem")
                    .with_present(&[r#"input[name*="title"]"#]),
            ],
        )
        .await;
    let h = harness(driver);

    let summary = h
        .orchestrator
        .run_batch(&[SOURCE_URL.to_string()], CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.listed, 1);
    assert_eq!(summary.failed, 0);
}

#[tokio::test]
async fn scraped_item_resumes_at_the_wizard() {
    let driver = SimulatedDriver::new();
    // No source script: re-scraping would come back without a title.
    driver.script(WIZARD_URL, wizard_script()).await;
    let h = harness(driver);

    let mut scraped = WorkItem::new("B0TESTASIN", SOURCE_URL, 0, 1);
    scraped.status = WorkItemStatus::Scraped;
    scraped.target_search_query = "Acme Acme Widget Deluxe".into();
    scraped.extracted = Some(ExtractedProduct {
        title: "Acme Widget Deluxe".into(),
        price: "24.99".into(),
        brand: "Acme".into(),
        description: "Acme Widget Deluxe".into(),
        ..Default::default()
    });
    h.store.put_item(&scraped).await.unwrap();

    let mut events = h.bus.subscribe();
    let summary = h
        .orchestrator
        .run_batch(&[SOURCE_URL.to_string()], CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.listed, 1);
    assert_eq!(summary.failed, 0);

    // Resumption goes straight to the wizard: no second scrape happens.
    let mut listed = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            PipelineEvent::ItemScraped { .. } => panic!("item was scraped again"),
            PipelineEvent::ItemListed { .. } => listed += 1,
            _ => {}
        }
    }
    assert_eq!(listed, 1);
}

#[tokio::test]
async fn terminal_items_are_not_rerun() {
    let driver = SimulatedDriver::new();
    let h = harness(driver);

    let mut already_listed = WorkItem::new("B0TESTASIN", SOURCE_URL, 0, 1);
    already_listed.status = WorkItemStatus::Listed;
    h.store.put_item(&already_listed).await.unwrap();

    // No scripts registered: any actual processing would fail loudly.
    let summary = h
        .orchestrator
        .run_batch(&[SOURCE_URL.to_string()], CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.listed, 1);
    assert_eq!(summary.failed, 0);
}

#[tokio::test]
async fn cancellation_stops_before_the_next_item() {
    let driver = SimulatedDriver::new();
    driver.script(SOURCE_URL, vec![SimPage::new(SOURCE_URL).with_html(PRODUCT_HTML)]).await;
    let h = harness(driver);
    let mut events = h.bus.subscribe();

    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary =
        h.orchestrator.run_batch(&[SOURCE_URL.to_string()], cancel).await.unwrap();
    assert_eq!(summary.listed + summary.failed, 0);

    // The unprocessed item stays pending and blocks batch completion.
    while let Ok(event) = events.try_recv() {
        assert!(!matches!(event, PipelineEvent::BatchCompleted { .. }));
    }
    let pending = h.store.get_item("B0TESTASIN").await.unwrap().unwrap();
    assert_eq!(pending.status, WorkItemStatus::Pending);
}
