//! Scenario-based tests for stepline

mod cancellation;
mod input_seeding;
mod item_isolation;
mod orchestration;
mod progress;
mod run_api;
mod storage;
mod visualizations;
