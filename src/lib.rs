/// JobWatch - resource telemetry for CI jobs
///
/// This library samples host metrics and the process table on a
/// drift-corrected schedule in a detached background process, hands the
/// collected state to the finalize phase through JSON documents, and renders
/// it as a markdown job summary.
pub mod accumulator;
pub mod cli;
pub mod config;
pub mod control;
pub mod core;
pub mod lifecycle;
pub mod provider;
pub mod report;
pub mod repository;
pub mod sampler;
pub mod scheduler;
pub mod task_manager;
pub mod tracker;

// Re-export core types for convenience
pub use core::*;
