//! Sold-item records for seller research
//!
//! Leaf-level text extraction for the sold-items scan: sold counts, watcher
//! counts and sold dates parsed out of listing-card text, plus the
//! normalized-title deduplication that merges repeat sales of one product.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// One sold listing scraped from a seller's sold-items search results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SoldItemRecord {
    pub title: String,
    pub price: String,
    pub total_sold: u32,
    pub sold_date: Option<String>,
    pub sold_timestamp: Option<i64>,
    pub days_ago: Option<i64>,
    pub daily_sales_rate: f64,
    pub watcher_count: u32,
    pub condition: String,
    pub location: String,
    pub shipping: String,
    pub seller: String,
    pub item_url: String,
    pub image_url: String,
}

/// Parsed sold date, absolute or relative.
#[derive(Debug, Clone, PartialEq)]
pub struct SoldDate {
    pub label: String,
    pub timestamp: i64,
    pub days_ago: i64,
}

/// Parse a sold count out of card text: "123 sold", "1,234 sold",
/// "123+ sold", "Sold: 123", "123 items sold".
pub fn parse_sold_count(text: &str) -> u32 {
    let patterns = [
        r"(?i)(\d+(?:,\d+)*)\+?\s*sold",
        r"(?i)sold:\s*(\d+(?:,\d+)*)",
        r"(?i)(\d+(?:,\d+)*)\s*items?\s*sold",
    ];
    for pattern in patterns {
        let re = regex::Regex::new(pattern).expect("sold count pattern is valid");
        if let Some(caps) = re.captures(text) {
            if let Ok(n) = caps[1].replace(',', "").parse() {
                return n;
            }
        }
    }
    0
}

/// Parse a watcher count out of card text: "12 watchers", "12 watching".
pub fn parse_watcher_count(text: &str) -> u32 {
    let re = regex::Regex::new(r"(?i)(\d+(?:,\d+)*)\s*(?:watchers?|watching)")
        .expect("watcher pattern is valid");
    re.captures(text)
        .and_then(|caps| caps[1].replace(',', "").parse().ok())
        .unwrap_or(0)
}

/// Parse a sold date out of card text, relative to `now`.
///
/// Handles "Sold Oct 6, 2025", "Sold Oct 6" (current year assumed) and the
/// relative forms "3d ago", "2h ago", "1w ago".
pub fn parse_sold_date(text: &str, now: DateTime<Utc>) -> Option<SoldDate> {
    let absolute = regex::Regex::new(r"(?i)Sold\s+([A-Za-z]{3,9})\s+(\d{1,2})(?:,\s*(\d{4}))?")
        .expect("absolute date pattern is valid");
    if let Some(caps) = absolute.captures(text) {
        let month = month_number(&caps[1])?;
        let day: u32 = caps[2].parse().ok()?;
        let year: i32 = caps
            .get(3)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or_else(|| now.year());
        let sold = Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).single()?;
        let days_ago = (now - sold).num_days().max(0);
        return Some(SoldDate {
            label: format!("{} {day}, {year}", &caps[1]),
            timestamp: sold.timestamp(),
            days_ago,
        });
    }

    let relative = regex::Regex::new(r"(?i)(\d+)([dhw])\s*ago").expect("relative date pattern is valid");
    if let Some(caps) = relative.captures(text) {
        let value: i64 = caps[1].parse().ok()?;
        let unit = caps[2].to_lowercase();
        let days_ago = match unit.as_str() {
            "d" => value,
            "h" => 0,
            "w" => value * 7,
            _ => return None,
        };
        let sold = now - Duration::days(days_ago);
        return Some(SoldDate {
            label: format!("{value}{unit} ago"),
            timestamp: sold.timestamp(),
            days_ago,
        });
    }

    None
}

fn month_number(name: &str) -> Option<u32> {
    match name.to_lowercase().get(..3)? {
        "jan" => Some(1),
        "feb" => Some(2),
        "mar" => Some(3),
        "apr" => Some(4),
        "may" => Some(5),
        "jun" => Some(6),
        "jul" => Some(7),
        "aug" => Some(8),
        "sep" => Some(9),
        "oct" => Some(10),
        "nov" => Some(11),
        "dec" => Some(12),
        _ => None,
    }
}

/// Estimated daily sales rate, assuming a 30-day listing age.
pub fn daily_sales_rate(total_sold: u32) -> f64 {
    if total_sold == 0 {
        return 0.0;
    }
    (f64::from(total_sold) / 30.0 * 100.0).round() / 100.0
}

/// Normalization key for duplicate detection: lowercase with every
/// non-alphanumeric stripped and whitespace collapsed.
///
/// Known precision tradeoff: genuinely distinct products with near-identical
/// names (color variants and the like) will merge under this key.
pub fn normalized_title_key(title: &str) -> String {
    let lower = title.to_lowercase();
    let stripped: String = lower
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Numeric value of a price string like "$1,299.99". None when no digits.
pub fn price_value(price: &str) -> Option<f64> {
    let cleaned: String =
        price.chars().filter(|c| c.is_ascii_digit() || *c == '.').collect();
    cleaned.parse().ok()
}

/// Merge duplicate sold items by normalized title: quantities sum, the most
/// recent sold date wins, the lower price wins. Result is sorted by total
/// quantity, highest first.
pub fn dedup_sold_items(items: Vec<SoldItemRecord>) -> Vec<SoldItemRecord> {
    let mut merged: Vec<(String, SoldItemRecord)> = Vec::new();

    for item in items {
        let key = normalized_title_key(&item.title);
        match merged.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => {
                existing.total_sold += item.total_sold;
                existing.watcher_count += item.watcher_count;
                let newer = match (item.sold_timestamp, existing.sold_timestamp) {
                    (Some(a), Some(b)) => a > b,
                    (Some(_), None) => true,
                    _ => false,
                };
                if newer {
                    existing.sold_date = item.sold_date;
                    existing.sold_timestamp = item.sold_timestamp;
                    existing.days_ago = item.days_ago;
                }
                let lower = match (price_value(&item.price), price_value(&existing.price)) {
                    (Some(a), Some(b)) => a < b,
                    (Some(_), None) => true,
                    _ => false,
                };
                if lower {
                    existing.price = item.price;
                }
                existing.daily_sales_rate = daily_sales_rate(existing.total_sold);
            }
            None => merged.push((key, item)),
        }
    }

    let mut result: Vec<SoldItemRecord> = merged.into_iter().map(|(_, item)| item).collect();
    result.sort_by(|a, b| b.total_sold.cmp(&a.total_sold));
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn sold_count_variants() {
        assert_eq!(parse_sold_count("123 sold"), 123);
        assert_eq!(parse_sold_count("1,234+ sold"), 1234);
        assert_eq!(parse_sold_count("Sold: 42"), 42);
        assert_eq!(parse_sold_count("7 items sold"), 7);
        assert_eq!(parse_sold_count("Almost gone"), 0);
    }

    #[test]
    fn watcher_count_variants() {
        assert_eq!(parse_watcher_count("15 watchers"), 15);
        assert_eq!(parse_watcher_count("1,002 watching"), 1002);
        assert_eq!(parse_watcher_count("no interest"), 0);
    }

    #[test]
    fn absolute_sold_date() {
        let parsed = parse_sold_date("Sold Oct 6, 2025", fixed_now()).unwrap();
        assert_eq!(parsed.label, "Oct 6, 2025");
        assert_eq!(parsed.days_ago, 4);
    }

    #[test]
    fn absolute_sold_date_without_year_assumes_current() {
        let parsed = parse_sold_date("Sold Oct 6", fixed_now()).unwrap();
        assert_eq!(parsed.days_ago, 4);
    }

    #[test]
    fn relative_sold_dates() {
        let now = fixed_now();
        assert_eq!(parse_sold_date("3d ago", now).unwrap().days_ago, 3);
        assert_eq!(parse_sold_date("2h ago", now).unwrap().days_ago, 0);
        assert_eq!(parse_sold_date("1w ago", now).unwrap().days_ago, 7);
        assert!(parse_sold_date("yesterday", now).is_none());
    }

    #[test]
    fn dedup_merges_casing_variants_and_sums_quantities() {
        let older = parse_sold_date("Sold Oct 1, 2025", fixed_now()).unwrap();
        let newer = parse_sold_date("Sold Oct 6, 2025", fixed_now()).unwrap();
        let items = vec![
            SoldItemRecord {
                title: "Widget A".into(),
                total_sold: 3,
                sold_date: Some(older.label.clone()),
                sold_timestamp: Some(older.timestamp),
                days_ago: Some(older.days_ago),
                ..Default::default()
            },
            SoldItemRecord {
                title: "widget  a".into(),
                total_sold: 2,
                sold_date: Some(newer.label.clone()),
                sold_timestamp: Some(newer.timestamp),
                days_ago: Some(newer.days_ago),
                ..Default::default()
            },
        ];
        let merged = dedup_sold_items(items);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].total_sold, 5);
        assert_eq!(merged[0].sold_date.as_deref(), Some("Oct 6, 2025"));
    }

    #[test]
    fn dedup_sorts_by_quantity() {
        let items = vec![
            SoldItemRecord { title: "Low seller".into(), total_sold: 1, ..Default::default() },
            SoldItemRecord { title: "High seller".into(), total_sold: 9, ..Default::default() },
        ];
        let merged = dedup_sold_items(items);
        assert_eq!(merged[0].title, "High seller");
    }

    #[test]
    fn normalization_strips_punctuation() {
        assert_eq!(normalized_title_key("Widget-A (Blue)!"), "widget a blue");
    }
}
