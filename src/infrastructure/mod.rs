//! Infrastructure layer: browser backends, persistence, HTML extraction,
//! external clients and app configuration

pub mod classifier;
pub mod companion;
pub mod config;
pub mod csv_export;
pub mod enrichment;
pub mod extractor;
pub mod logging;
pub mod page;
pub mod store;
pub mod tab;
pub mod webdriver;
