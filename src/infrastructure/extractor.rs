//! HTML extraction for source product pages and sold-listing search results
//!
//! All parsing here is synchronous over a captured HTML string. Parsed
//! documents are never held across an await point.

use chrono::{DateTime, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::domain::product::ExtractedProduct;
use crate::domain::sold_item::{
    SoldItemRecord, daily_sales_rate, parse_sold_count, parse_sold_date, parse_watcher_count,
};

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("page has neither a product title nor a product id")]
    MissingIdentity,
    #[error("invalid selector in extractor config: {0}")]
    BadSelector(String),
}

/// CSS selectors for the source marketplace's product detail page.
///
/// Comma groups give fallbacks within a single selector; the page layout
/// shifts between templates and every field degrades to empty.
#[derive(Debug, Clone)]
pub struct SourceSelectors {
    pub title: String,
    pub price_whole: String,
    pub price_fraction: String,
    pub price_fallback: String,
    pub brand: String,
    pub features: String,
    pub images: String,
}

impl Default for SourceSelectors {
    fn default() -> Self {
        Self {
            title: "#productTitle, #title span".to_string(),
            price_whole: ".a-price .a-price-whole".to_string(),
            price_fraction: ".a-price .a-price-fraction".to_string(),
            price_fallback: "#priceblock_ourprice, #priceblock_dealprice, .a-price .a-offscreen"
                .to_string(),
            brand: "#bylineInfo, a#bylineInfo, #brand".to_string(),
            features: "#feature-bullets ul li span.a-list-item".to_string(),
            images: "#altImages img, #imgTagWrapperId img, #landingImage, #main-image".to_string(),
        }
    }
}

/// CSS selectors for the target marketplace's sold-listings results page.
#[derive(Debug, Clone)]
pub struct ResearchSelectors {
    pub listing_card: String,
    pub title: String,
    pub price: String,
    pub sold_tag: String,
    pub sold_count: String,
    pub watcher_count: String,
    pub condition: String,
    pub shipping: String,
    pub location: String,
    pub link: String,
    pub image: String,
    pub seller: String,
}

impl Default for ResearchSelectors {
    fn default() -> Self {
        Self {
            listing_card: ".su-card-container__content, .su-card-container, .s-item, li.s-item"
                .to_string(),
            title: ".su-styled-text.primary.default, .s-item__title, h3.s-item__title".to_string(),
            price: ".s-card__price, .s-item__price, span.s-item__price".to_string(),
            sold_tag: ".su-styled-text.positive.default, .su-styled-text.positive, .s-item__title--tag, .s-item__title--tagBlock, .POSITIVE"
                .to_string(),
            sold_count: ".s-item__hotness, .s-item__quantity-sold, .s-item__quantitySold"
                .to_string(),
            watcher_count: ".s-item__watchcount".to_string(),
            condition: ".s-item__subtitle, .SECONDARY_INFO".to_string(),
            shipping: ".s-item__shipping, .s-item__freeXDays".to_string(),
            location: ".s-item__location, .s-item__itemLocation".to_string(),
            link: "a.su-link, a.s-item__link".to_string(),
            image: ".s-card__image, .s-item__image-img".to_string(),
            seller: ".s-item__seller-info-text".to_string(),
        }
    }
}

fn parse_selector(css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|e| ExtractError::BadSelector(format!("{css}: {e}")))
}

fn first_text(root: &Html, selector: &Selector) -> String {
    root.select(selector)
        .next()
        .map(|el| collect_text(&el))
        .unwrap_or_default()
}

fn collect_text(el: &ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Extract a structured product from a source product page.
///
/// Only a page missing both a title and a product id is an error; every
/// other field falls back to empty.
pub fn extract_product(
    html: &str,
    product_id: &str,
    selectors: &SourceSelectors,
) -> Result<ExtractedProduct, ExtractError> {
    let doc = Html::parse_document(html);

    let title = first_text(&doc, &parse_selector(&selectors.title)?);
    if title.is_empty() && product_id.is_empty() {
        return Err(ExtractError::MissingIdentity);
    }

    let price = extract_price(&doc, selectors)?;
    let brand = extract_brand(&doc, selectors)?;

    let feature_sel = parse_selector(&selectors.features)?;
    let features: Vec<String> = doc
        .select(&feature_sel)
        .map(|el| collect_text(&el))
        .filter(|t| !t.is_empty())
        .take(10)
        .collect();

    let images = extract_images(&doc, selectors)?;

    debug!(
        %product_id,
        features = features.len(),
        images = images.len(),
        "extracted product page"
    );

    Ok(ExtractedProduct { title, price, brand, features, images, description: String::new() })
}

fn extract_price(doc: &Html, selectors: &SourceSelectors) -> Result<String, ExtractError> {
    let whole = first_text(doc, &parse_selector(&selectors.price_whole)?);
    let fraction = first_text(doc, &parse_selector(&selectors.price_fraction)?);
    if !whole.is_empty() {
        let whole = whole.trim_end_matches(['.', ',']).replace(',', "");
        let fraction = if fraction.is_empty() { "00".to_string() } else { fraction };
        return Ok(format!("{whole}.{fraction}"));
    }

    let fallback = first_text(doc, &parse_selector(&selectors.price_fallback)?);
    Ok(fallback.trim_start_matches('$').to_string())
}

fn extract_brand(doc: &Html, selectors: &SourceSelectors) -> Result<String, ExtractError> {
    let raw = first_text(doc, &parse_selector(&selectors.brand)?);
    let cleaned = raw
        .trim_start_matches("Visit the ")
        .trim_end_matches(" Store")
        .trim_start_matches("Brand: ")
        .trim();
    Ok(cleaned.to_string())
}

fn extract_images(doc: &Html, selectors: &SourceSelectors) -> Result<Vec<String>, ExtractError> {
    let sel = parse_selector(&selectors.images)?;
    let mut seen = Vec::new();
    for el in doc.select(&sel) {
        let src = el
            .value()
            .attr("src")
            .or_else(|| el.value().attr("data-src"))
            .or_else(|| el.value().attr("data-old-hires"))
            .unwrap_or_default();
        if src.is_empty() || src.starts_with("data:") {
            continue;
        }
        let canonical = canonical_image_url(src);
        if !seen.contains(&canonical) {
            seen.push(canonical);
        }
    }
    Ok(seen)
}

/// Rewrites a thumbnail URL to its high-resolution variant by replacing the
/// size token between the `._` and `_.` markers.
pub fn canonical_image_url(url: &str) -> String {
    let re = Regex::new(r"\._[^.]*_\.").expect("image size token pattern is valid");
    re.replace(url, "._AC_SL1500_.").into_owned()
}

/// Parse every sold-listing card out of a search results page.
///
/// Cards without a title and link are skipped; a card that is sold but
/// carries no explicit count is counted as one sale.
pub fn parse_sold_listings(
    html: &str,
    seller: &str,
    now: DateTime<Utc>,
    selectors: &ResearchSelectors,
) -> Result<Vec<SoldItemRecord>, ExtractError> {
    let doc = Html::parse_document(html);
    let card_sel = parse_selector(&selectors.listing_card)?;
    let title_sel = parse_selector(&selectors.title)?;
    let price_sel = parse_selector(&selectors.price)?;
    let sold_tag_sel = parse_selector(&selectors.sold_tag)?;
    let sold_count_sel = parse_selector(&selectors.sold_count)?;
    let watcher_sel = parse_selector(&selectors.watcher_count)?;
    let condition_sel = parse_selector(&selectors.condition)?;
    let shipping_sel = parse_selector(&selectors.shipping)?;
    let location_sel = parse_selector(&selectors.location)?;
    let link_sel = parse_selector(&selectors.link)?;
    let image_sel = parse_selector(&selectors.image)?;
    let seller_sel = parse_selector(&selectors.seller)?;

    let mut records = Vec::new();
    for card in doc.select(&card_sel) {
        let title = card.select(&title_sel).next().map(|el| collect_text(&el)).unwrap_or_default();
        let item_url = card
            .select(&link_sel)
            .next()
            .and_then(|el| el.value().attr("href"))
            .unwrap_or_default()
            .to_string();
        // Placeholder cards at the top of results have no title or link.
        if title.is_empty() || item_url.is_empty() || title.eq_ignore_ascii_case("Shop on eBay") {
            continue;
        }

        let price = card.select(&price_sel).next().map(|el| collect_text(&el)).unwrap_or_default();

        let sold_count_text =
            card.select(&sold_count_sel).next().map(|el| collect_text(&el)).unwrap_or_default();
        // The count lives in a dedicated element on classic cards but only in
        // the card body text on the modern layout.
        let total_sold = if sold_count_text.is_empty() {
            let body: String = card.text().collect();
            parse_sold_count(&body).max(1)
        } else {
            parse_sold_count(&sold_count_text).max(1)
        };

        let sold_text =
            card.select(&sold_tag_sel).next().map(|el| collect_text(&el)).unwrap_or_default();
        let sold = parse_sold_date(&sold_text, now).or_else(|| {
            let body: String = card.text().collect();
            parse_sold_date(&body, now)
        });

        let watcher_text =
            card.select(&watcher_sel).next().map(|el| collect_text(&el)).unwrap_or_default();

        let card_seller =
            card.select(&seller_sel).next().map(|el| collect_text(&el)).unwrap_or_default();

        let location_raw =
            card.select(&location_sel).next().map(|el| collect_text(&el)).unwrap_or_default();

        let image_url = card
            .select(&image_sel)
            .next()
            .and_then(|el| el.value().attr("src").or_else(|| el.value().attr("data-src")))
            .unwrap_or_default()
            .to_string();

        records.push(SoldItemRecord {
            title,
            price,
            total_sold,
            sold_date: sold.as_ref().map(|d| d.label.clone()),
            sold_timestamp: sold.as_ref().map(|d| d.timestamp),
            days_ago: sold.as_ref().map(|d| d.days_ago),
            daily_sales_rate: daily_sales_rate(total_sold),
            watcher_count: parse_watcher_count(&watcher_text),
            condition: card
                .select(&condition_sel)
                .next()
                .map(|el| collect_text(&el))
                .unwrap_or_default(),
            location: location_raw.trim_start_matches("From").trim().to_string(),
            shipping: card
                .select(&shipping_sel)
                .next()
                .map(|el| collect_text(&el))
                .unwrap_or_default(),
            seller: if card_seller.is_empty() { seller.to_string() } else { card_seller },
            item_url,
            image_url,
        });
    }

    debug!(count = records.len(), "parsed sold listing cards");
    Ok(records)
}
