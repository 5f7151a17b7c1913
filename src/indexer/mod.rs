pub mod decoder;
pub mod fetcher;
pub mod node;
pub mod reorder;
pub mod retry;
pub mod types;
