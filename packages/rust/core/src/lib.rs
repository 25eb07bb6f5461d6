//! Pipeline orchestration for chatlist.
//!
//! Ties the harvester and the publisher together into the `run` workflow.

pub mod pipeline;

pub use pipeline::{PipelineReport, run_pipeline};
