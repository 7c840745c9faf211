//! Sold-items research scan on the simulated browser backend

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crosslist::application::event_bus::EventBus;
use crosslist::application::scanner::{SoldItemsScanner, sold_items_url};
use crosslist::domain::events::PipelineEvent;
use crosslist::infrastructure::config::ResearchConfig;
use crosslist::infrastructure::tab::TabCoordinator;
use crosslist::test_utils::{SimPage, SimulatedDriver};

const SOLD_PAGE_HTML: &str = r#"
    <ul>
      <li class="s-item">
        <a class="s-item__link" href="https://www.ebay.com/itm/111111111111"></a>
        <div class="s-item__title">Acme Widget Deluxe</div>
        <span class="s-item__price">$19.99</span>
        <span class="s-item__hotness">9 sold</span>
      </li>
      <li class="s-item">
        <a class="s-item__link" href="https://www.ebay.com/itm/222222222222"></a>
        <div class="s-item__title">ACME WIDGET DELUXE</div>
        <span class="s-item__price">$18.50</span>
        <span class="s-item__hotness">3 sold</span>
      </li>
      <li class="s-item">
        <a class="s-item__link" href="https://www.ebay.com/itm/333333333333"></a>
        <div class="s-item__title">Lone Gadget</div>
        <span class="s-item__price">$5.00</span>
      </li>
    </ul>
"#;

const SEARCH_BASE: &str = "https://www.ebay.com/sch/i.html";

fn scanner_with(
    driver: SimulatedDriver,
    config: ResearchConfig,
) -> (SoldItemsScanner, EventBus) {
    let tabs = Arc::new(TabCoordinator::new(Arc::new(driver)));
    let bus = EventBus::new();
    let scanner = SoldItemsScanner::new(
        tabs,
        bus.clone(),
        config,
        SEARCH_BASE.to_string(),
        Duration::from_secs(1),
    );
    (scanner, bus)
}

#[tokio::test]
async fn scan_dedups_repeat_sales_and_stops_on_empty_page() {
    let driver = SimulatedDriver::new();
    let page1 = sold_items_url(SEARCH_BASE, "acme", 1);
    let page2 = sold_items_url(SEARCH_BASE, "acme", 2);
    // Page 2's url extends page 1's, so it must be registered first.
    driver.script(&page2, vec![SimPage::new(&page2).with_html("<html></html>")]).await;
    driver.script(&page1, vec![SimPage::new(&page1).with_html(SOLD_PAGE_HTML)]).await;

    let (scanner, bus) = scanner_with(driver, ResearchConfig { max_pages: 3, min_sales: 0 });
    let mut events = bus.subscribe();

    let items = scanner.scan("acme", CancellationToken::new()).await.unwrap();

    // The two widget listings merge under one normalized title.
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].title, "Acme Widget Deluxe");
    assert_eq!(items[0].total_sold, 12);
    // Merged records keep the lower price.
    assert_eq!(items[0].price, "$18.50");
    assert_eq!(items[1].title, "Lone Gadget");
    assert_eq!(items[1].total_sold, 1);

    let mut final_progress = 0;
    while let Ok(event) = events.try_recv() {
        if let PipelineEvent::ScanProgress { progress, .. } = event {
            final_progress = progress;
        }
    }
    assert_eq!(final_progress, 100);
}

#[tokio::test]
async fn min_sales_filters_slow_movers() {
    let driver = SimulatedDriver::new();
    let page1 = sold_items_url(SEARCH_BASE, "acme", 1);
    let page2 = sold_items_url(SEARCH_BASE, "acme", 2);
    driver.script(&page2, vec![SimPage::new(&page2).with_html("<html></html>")]).await;
    driver.script(&page1, vec![SimPage::new(&page1).with_html(SOLD_PAGE_HTML)]).await;

    let (scanner, _bus) = scanner_with(driver, ResearchConfig { max_pages: 3, min_sales: 5 });
    let items = scanner.scan("acme", CancellationToken::new()).await.unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].total_sold, 12);
}

#[tokio::test]
async fn seller_url_input_is_accepted() {
    let driver = SimulatedDriver::new();
    let page1 = sold_items_url(SEARCH_BASE, "acme", 1);
    driver.script(&page1, vec![SimPage::new(&page1).with_html("<html></html>")]).await;

    let (scanner, _bus) = scanner_with(driver, ResearchConfig::default());
    let items = scanner
        .scan("https://www.ebay.com/usr/acme", CancellationToken::new())
        .await
        .unwrap();
    assert!(items.is_empty());

    let err = scanner.scan("   ", CancellationToken::new()).await.unwrap_err();
    assert!(err.to_string().contains("seller name"));
}
