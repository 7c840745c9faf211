//! Listing-wizard page classification
//!
//! The target marketplace's listing wizard moves through states that are
//! distinguishable partly by URL path and partly by DOM content. The
//! classifier is the single source of truth for "which page is this", so
//! the action engine never pattern-matches URLs inline.

use url::Url;

/// The wizard pages the pipeline knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetPage {
    /// Search box for finding the product in the catalog.
    Search,
    /// Catalog match picker ("is it one of these?").
    Disambiguation,
    /// Condition picker interstitial.
    Condition,
    /// The listing form itself.
    Form,
    /// Anything else, including pages outside the wizard.
    Unknown,
}

/// Classify a wizard page from its URL and whether the condition picker is
/// present in the DOM.
///
/// The condition picker has no dedicated path: it appears under generic
/// wizard paths, so the DOM signal overrides URL classification for any
/// `/sl/` page except the form itself.
pub fn classify(url: &str, has_condition_picker: bool) -> TargetPage {
    let Ok(parsed) = Url::parse(url) else {
        return TargetPage::Unknown;
    };
    let path = parsed.path().to_ascii_lowercase();

    if path.contains("/sl/list") || path.contains("/sl/create") || path.contains("/sell/create") {
        return TargetPage::Form;
    }

    if has_condition_picker && path.contains("/sl/") {
        return TargetPage::Condition;
    }

    if path.contains("/sl/prelist") || path.contains("/identify") {
        return TargetPage::Disambiguation;
    }

    if path.contains("/sl/sell") || path.ends_with("/sl") {
        return TargetPage::Search;
    }

    TargetPage::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("https://www.ebay.com/sl/sell", TargetPage::Search)]
    #[case("https://www.ebay.com/sl/prelist/identify?q=widget", TargetPage::Disambiguation)]
    #[case("https://www.ebay.com/sl/list?mode=AddItem", TargetPage::Form)]
    #[case("https://www.ebay.com/sell/create", TargetPage::Form)]
    #[case("https://www.ebay.com/", TargetPage::Unknown)]
    #[case("not a url", TargetPage::Unknown)]
    fn classifies_wizard_urls(#[case] url: &str, #[case] expected: TargetPage) {
        assert_eq!(classify(url, false), expected);
    }

    #[test]
    fn condition_picker_overrides_url_on_wizard_pages() {
        assert_eq!(
            classify("https://www.ebay.com/sl/prelist/suggest", true),
            TargetPage::Condition
        );
        // The form keeps its classification even with a condition widget in it.
        assert_eq!(classify("https://www.ebay.com/sl/list", true), TargetPage::Form);
        // Condition DOM outside the wizard means nothing.
        assert_eq!(classify("https://www.ebay.com/deals", true), TargetPage::Unknown);
    }
}
