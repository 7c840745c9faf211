//! CSV export of sold-items research results

use std::path::Path;

use crate::domain::product::estimate_profit;
use crate::domain::sold_item::{SoldItemRecord, price_value};

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("csv write error: {0}")]
    Csv(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

const HEADER: &[&str] = &[
    "title",
    "price",
    "total_sold",
    "sold_date",
    "days_ago",
    "daily_sales_rate",
    "watchers",
    "condition",
    "location",
    "shipping",
    "seller",
    "item_url",
    "image_url",
    "est_fees",
    "est_payout",
];

pub fn write_sold_items(path: &Path, items: &[SoldItemRecord]) -> Result<(), ExportError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(HEADER)?;
    for item in items {
        // Payout estimate from the sold price alone: source cost and
        // shipping are unknown at research time.
        let estimate = price_value(&item.price).map(|p| estimate_profit(0.0, p, 0.0));
        let (est_fees, est_payout) = match &estimate {
            Some(est) => (format!("{:.2}", est.fees), format!("{:.2}", est.profit)),
            None => (String::new(), String::new()),
        };
        writer.write_record([
            item.title.as_str(),
            item.price.as_str(),
            &item.total_sold.to_string(),
            item.sold_date.as_deref().unwrap_or(""),
            &item.days_ago.map(|d| d.to_string()).unwrap_or_default(),
            &format!("{:.2}", item.daily_sales_rate),
            &item.watcher_count.to_string(),
            item.condition.as_str(),
            item.location.as_str(),
            item.shipping.as_str(),
            item.seller.as_str(),
            item.item_url.as_str(),
            item.image_url.as_str(),
            &est_fees,
            &est_payout,
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sold.csv");

        let item = SoldItemRecord {
            title: "Acme Widget, Deluxe".to_string(),
            price: "$19.99".to_string(),
            total_sold: 12,
            daily_sales_rate: 0.4,
            seller: "some_seller".to_string(),
            ..Default::default()
        };
        write_sold_items(&path, &[item]).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("title,price,total_sold,sold_date,days_ago,daily_sales_rate"));
        assert!(header.ends_with("est_fees,est_payout"));
        let row = lines.next().unwrap();
        assert!(row.contains("\"Acme Widget, Deluxe\""));
        assert!(row.contains("0.40"));
        // $19.99 at 13% + 2.9% + $0.30 in fees.
        assert!(row.ends_with("3.48,16.51"));
    }
}
