//! Normalize, deduplicate, load and verify a healthcare admissions CSV.
//!
//! The stages live in [`pipeline`]; the destination store is behind
//! [`storage::DocumentStore`].

pub mod config;
pub mod constants;
pub mod decimal;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod record;
pub mod storage;

pub use config::Config;
pub use error::{PipelineError, RecordError, Result};
pub use pipeline::Pipeline;
