//! Concurrency management for multi-item registry operations
//!
//! Every bulk workflow (resolving tags, pushing manifests, deleting digests)
//! goes through [`run_batch`], which bounds how many registry calls are in
//! flight according to the registry's capability entry and reports progress
//! as a lazily-driven stream.

pub mod batch;

pub use batch::{run_batch, BatchEvent, BatchProgress, BatchReport, ItemOutcome};
