//! Registry module for Docker Registry HTTP API v2 interactions
//!
//! Listing (catalog and tags, walked through the cursor paginator), manifest
//! resolution across schema v1 and v2, and bulk and two-phase manifest writes
//! governed by the per-vendor capability policy.

pub mod capability;
pub mod client;
pub mod manifest;
pub mod operations;
pub mod pagination;
pub mod transport;

pub use capability::{CapabilityPolicy, RegistryCapabilities, RegistryRef, RegistryType};
pub use client::{RegistryClient, RegistryClientBuilder};
pub use manifest::{ManifestSchema, Tag, TagDetail, TagPush};
pub use operations::{
    plan_retag, plan_tag_deletion, MutationEvent, MutationPlan, MutationSummary,
    RepositorySummary, TagEdit,
};
pub use pagination::{paginate, Cursor, Page};
pub use transport::{HttpRegistryTransport, RegistryTransport};
