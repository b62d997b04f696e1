//! Configuration types for the notification pipeline.
//!
//! These are the validated runtime values shared by the processors. Reading
//! and parsing the config file is handled by the server crate.

mod pipeline;

pub use pipeline::PipelineConfig;
