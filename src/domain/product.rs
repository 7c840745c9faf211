//! Structured product records and listing-policy checks
//!
//! The extraction engine produces an [`ExtractedProduct`]; everything the
//! target-site action engine fills into the listing form comes from here.

use serde::{Deserialize, Serialize};

/// Structured record scraped from a source-marketplace product page.
///
/// Every field except the title degrades gracefully to empty: a product with
/// no price or brand still lists. Feature bullets preserve source order,
/// image URLs are deduplicated and canonicalized to their high-resolution
/// form before they get here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedProduct {
    pub title: String,
    pub price: String,
    pub brand: String,
    pub features: Vec<String>,
    pub images: Vec<String>,
    pub description: String,
}

impl ExtractedProduct {
    /// Build the listing description: title, brand, bulleted features and the
    /// provenance footer naming the source id and URL.
    pub fn build_description(&mut self, product_id: &str, source_url: &str) {
        let mut out = String::new();
        if !self.title.is_empty() {
            out.push_str(&self.title);
            out.push_str("\n\n");
        }
        if !self.brand.is_empty() {
            out.push_str(&format!("Brand: {}\n\n", self.brand));
        }
        if !self.features.is_empty() {
            out.push_str("Features:\n");
            for feature in &self.features {
                out.push_str(&format!("\u{2022} {feature}\n"));
            }
            out.push('\n');
        }
        out.push_str(&format!("Source ID: {product_id}\n"));
        out.push_str(&format!("Source: {source_url}"));
        self.description = out;
    }
}

/// Brands on the target marketplace's rights-owner program. Listing these
/// invites a takedown, so the orchestrator fails the item before the form
/// fill instead of after.
const RESTRICTED_BRANDS: &[&str] = &[
    "Hamilton Beach",
    "Ninja",
    "Remington",
    "Apple",
    "Pampers",
    "Tide",
    "Gillette",
    "Nike",
    "Adidas",
    "PlayStation",
    "Sony",
    "Microsoft",
    "Disney",
    "Marvel",
    "Coach",
    "Louis Vuitton",
    "Gucci",
    "Prada",
];

const RESTRICTED_WORDS: &[&str] = &[
    "replica",
    "fake",
    "knock-off",
    "counterfeit",
    "bootleg",
    "unauthorized",
    "parallel import",
];

/// Returns the restricted brand found in the text, if any.
pub fn find_restricted_brand(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    RESTRICTED_BRANDS
        .iter()
        .copied()
        .find(|brand| lower.contains(&brand.to_lowercase()))
}

/// Returns every restricted word found in the text.
pub fn find_restricted_words(text: &str) -> Vec<&'static str> {
    let lower = text.to_lowercase();
    RESTRICTED_WORDS
        .iter()
        .copied()
        .filter(|word| lower.contains(*word))
        .collect()
}

/// Rough profit estimate for a source-price/target-price pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfitEstimate {
    pub revenue: f64,
    pub cost: f64,
    pub fees: f64,
    pub profit: f64,
    pub margin_percent: f64,
    pub profitable: bool,
}

/// Marketplace fee ~13%, payment processing ~2.9% plus a fixed $0.30.
pub fn estimate_profit(source_price: f64, target_price: f64, shipping_cost: f64) -> ProfitEstimate {
    let revenue = target_price;
    let cost = source_price + shipping_cost;
    let fees = revenue * 0.13 + revenue * 0.029 + 0.30;
    let profit = revenue - cost - fees;
    let margin_percent = if revenue > 0.0 { profit / revenue * 100.0 } else { 0.0 };
    ProfitEstimate {
        revenue,
        cost,
        fees,
        profit,
        margin_percent,
        profitable: profit > 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn description_carries_provenance_footer() {
        let mut product = ExtractedProduct {
            title: "Widget".into(),
            brand: "Acme".into(),
            features: vec!["Durable".into(), "Blue".into()],
            ..Default::default()
        };
        product.build_description("ABCDEFGHIJ", "https://source.example/dp/ABCDEFGHIJ");
        let desc = &product.description;
        assert!(desc.starts_with("Widget\n\n"));
        assert!(desc.contains("Brand: Acme"));
        assert!(desc.contains("\u{2022} Durable\n\u{2022} Blue"));
        assert!(desc.contains("Source ID: ABCDEFGHIJ"));
        assert!(desc.ends_with("Source: https://source.example/dp/ABCDEFGHIJ"));
    }

    #[test]
    fn restricted_brand_matching_is_case_insensitive() {
        assert_eq!(find_restricted_brand("NIKE running shoes"), Some("Nike"));
        assert_eq!(find_restricted_brand("Generic running shoes"), None);
    }

    #[test]
    fn restricted_words_found_in_description() {
        let found = find_restricted_words("Great replica, not a fake at all");
        assert_eq!(found, vec!["replica", "fake"]);
    }

    #[test]
    fn profit_estimate_accounts_for_fees() {
        let est = estimate_profit(10.0, 20.0, 2.0);
        assert!(est.profit < 8.0);
        assert!(est.profitable);
        let bad = estimate_profit(20.0, 20.0, 2.0);
        assert!(!bad.profitable);
    }
}
