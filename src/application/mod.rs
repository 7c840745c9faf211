//! Application layer: batch orchestration, wizard actions, research scans
//! and the pipeline event bus

pub mod action_engine;
pub mod event_bus;
pub mod orchestrator;
pub mod scanner;
