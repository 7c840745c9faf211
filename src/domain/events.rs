//! Pipeline event types broadcast to observer surfaces
//!
//! A closed tagged union rather than free-form payloads matched on a string
//! field: observers switch on the variant, and there is no "unknown message
//! type" dead branch anywhere.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Events published through the [`EventBus`](crate::application::event_bus::EventBus).
///
/// Delivery is best-effort: publishing with no subscriber is a silent no-op.
/// Within a single subscriber, events arrive in publish order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PipelineEvent {
    /// Source-page extraction succeeded and the record was persisted.
    ItemScraped {
        product_id: String,
        title: String,
        timestamp: DateTime<Utc>,
    },
    /// The target-site wizard reached the listing form and filled it.
    ItemListed {
        product_id: String,
        timestamp: DateTime<Utc>,
    },
    /// The item reached a terminal failure.
    ItemFailed {
        product_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    /// Sold-items scan progress for the popup/dashboard surfaces.
    ScanProgress { progress: u8, found: usize },
    /// Every item of the batch reached a terminal state.
    BatchCompleted { listed: usize, failed: usize },
}

impl PipelineEvent {
    pub fn item_scraped(product_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self::ItemScraped {
            product_id: product_id.into(),
            title: title.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn item_listed(product_id: impl Into<String>) -> Self {
        Self::ItemListed { product_id: product_id.into(), timestamp: Utc::now() }
    }

    pub fn item_failed(product_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ItemFailed {
            product_id: product_id.into(),
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let event = PipelineEvent::ScanProgress { progress: 42, found: 7 };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "scanProgress");
        assert_eq!(json["progress"], 42);
        assert_eq!(json["found"], 7);
    }
}
