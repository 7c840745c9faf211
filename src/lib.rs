//! crosslist - cross-marketplace listing pipeline
//!
//! Scrapes product pages on a source marketplace, walks the target
//! marketplace's listing wizard to a filled form, and researches sellers'
//! sold items. Layered the usual way:
//!
//! - `domain`: work items, products, sold-item records and pipeline events
//! - `application`: batch orchestration, wizard actions, research scans
//! - `infrastructure`: browser backends, persistence, extraction, clients

pub mod application;
pub mod domain;
pub mod infrastructure;

pub mod test_utils;

pub use application::orchestrator::{BatchSummary, PipelineOrchestrator};
pub use application::scanner::SoldItemsScanner;
pub use domain::events::PipelineEvent;
pub use domain::work_item::{WorkItem, WorkItemStatus};
