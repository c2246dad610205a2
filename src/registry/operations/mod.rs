//! Registry operations module
//!
//! Each operations struct wraps the shared transport and logger and covers one
//! area of the registry API; `RegistryClient` composes them.

pub mod manifest_operations;
pub mod mutation_operations;
pub mod repository_operations;

pub use manifest_operations::ManifestOperations;
pub use mutation_operations::{
    plan_retag, plan_tag_deletion, MutationEvent, MutationOperations, MutationPlan,
    MutationSummary, TagEdit,
};
pub use repository_operations::{RepositoryOperations, RepositorySummary};
