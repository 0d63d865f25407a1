pub mod analysis;
pub mod artifacts;
pub mod cohort;
pub mod config;
pub mod distribution;
pub mod error;
pub mod ingestion;
pub mod llm;
pub mod pipeline;
pub mod record;
pub mod report;
pub mod resolver;
pub mod store;
pub mod summary;

pub use error::{LlmError, QcrError, Result};
