// Library root: re-exports all modules so integration tests and external
// consumers can access the crate's public API.

pub mod config;
pub mod export;
pub mod features;
pub mod identity;
pub mod ingest;
pub mod joiner;
pub mod pipeline;
pub mod record;
pub mod store;
