pub mod analytics;
pub mod config;
pub mod error;
pub mod export;
pub mod indexer;
pub mod ledger;
pub mod pipeline;
pub mod progress;
