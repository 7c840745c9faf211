//! Core domain types for the listing pipeline and sold-items research

pub mod events;
pub mod product;
pub mod sold_item;
pub mod work_item;

pub use events::PipelineEvent;
pub use product::{ExtractedProduct, ProfitEstimate};
pub use sold_item::SoldItemRecord;
pub use work_item::{WorkItem, WorkItemStatus};
