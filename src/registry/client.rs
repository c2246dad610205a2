//! Registry client facade
//!
//! [`RegistryClient`] bundles the operations structs around one transport and
//! one [`RegistryRef`], and is the surface callers (including the CLI) use.

use crate::concurrency::BatchEvent;
use crate::config::{RegistryConfig, DEFAULT_LISTING_CONCURRENCY};
use crate::error::{RegistryError, Result};
use crate::logging::Logger;
use crate::registry::capability::{CapabilityPolicy, RegistryRef};
use crate::registry::manifest::{Tag, TagDetail, TagPush};
use crate::registry::operations::{
    ManifestOperations, MutationEvent, MutationOperations, RepositoryOperations,
    RepositorySummary, TagEdit,
};
use crate::registry::transport::{HttpRegistryTransport, RegistryTransport};
use futures::stream::BoxStream;
use std::sync::Arc;

pub struct RegistryClientBuilder {
    registry: RegistryRef,
    config: Option<RegistryConfig>,
    transport: Option<Arc<dyn RegistryTransport>>,
    policy: CapabilityPolicy,
    page_size: Option<u32>,
    listing_concurrency: usize,
    output: Logger,
}

impl RegistryClientBuilder {
    pub fn new(registry: RegistryRef) -> Self {
        Self {
            registry,
            config: None,
            transport: None,
            policy: CapabilityPolicy::default(),
            page_size: None,
            listing_concurrency: DEFAULT_LISTING_CONCURRENCY,
            output: Logger::default(),
        }
    }

    /// Talk HTTP to the registry described by `config`
    pub fn with_config(mut self, config: RegistryConfig) -> Self {
        self.registry = config.registry_ref();
        self.page_size = config.page_size;
        self.listing_concurrency = config.listing_concurrency;
        self.config = Some(config);
        self
    }

    /// Use a custom transport; takes precedence over [`Self::with_config`]
    pub fn with_transport(mut self, transport: Arc<dyn RegistryTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_policy(mut self, policy: CapabilityPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_page_size(mut self, page_size: Option<u32>) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_listing_concurrency(mut self, listing_concurrency: usize) -> Self {
        self.listing_concurrency = listing_concurrency;
        self
    }

    pub fn with_logger(mut self, output: Logger) -> Self {
        self.output = output;
        self
    }

    pub fn build(self) -> Result<RegistryClient> {
        let transport: Arc<dyn RegistryTransport> = match (self.transport, &self.config) {
            (Some(transport), _) => transport,
            (None, Some(config)) => {
                config.validate()?;
                Arc::new(HttpRegistryTransport::new(config, self.output.clone())?)
            }
            (None, None) => {
                return Err(RegistryError::Configuration(
                    "Registry client needs either a configuration or a transport".to_string(),
                ));
            }
        };

        let repositories = RepositoryOperations::new(Arc::clone(&transport), self.output.clone())
            .with_page_size(self.page_size)
            .with_listing_concurrency(self.listing_concurrency);
        let manifests = ManifestOperations::new(
            transport,
            self.registry.clone(),
            self.policy.clone(),
            self.output.clone(),
        );
        let mutations = MutationOperations::new(manifests.clone(), self.output.clone());

        Ok(RegistryClient {
            registry: self.registry,
            policy: self.policy,
            repositories,
            manifests,
            mutations,
        })
    }
}

pub struct RegistryClient {
    registry: RegistryRef,
    policy: CapabilityPolicy,
    repositories: RepositoryOperations,
    manifests: ManifestOperations,
    mutations: MutationOperations,
}

impl RegistryClient {
    pub fn builder(registry: RegistryRef) -> RegistryClientBuilder {
        RegistryClientBuilder::new(registry)
    }

    pub fn registry(&self) -> &RegistryRef {
        &self.registry
    }

    /// Concurrency step used for write batches against this registry
    pub fn write_concurrency(&self) -> Option<usize> {
        self.policy.concurrency_step_for(self.registry.registry_type)
    }

    pub async fn list_repositories(&self) -> Result<Vec<String>> {
        self.repositories.list_repositories().await
    }

    pub async fn list_repositories_with_tags(&self) -> Result<Vec<RepositorySummary>> {
        self.repositories.list_repositories_with_tags().await
    }

    pub async fn list_tags(&self, repository: &str) -> Result<Vec<String>> {
        self.repositories.list_tags(repository).await
    }

    pub async fn resolve_tag(&self, repository: &str, tag: &str) -> Result<TagDetail> {
        self.manifests.resolve_tag(repository, tag).await
    }

    pub async fn resolve_short_tag(&self, repository: &str, tag: &str) -> Result<Tag> {
        self.manifests.resolve_short_tag(repository, tag).await
    }

    pub fn resolve_short_tags_with_progress(
        &self,
        repository: &str,
        names: Vec<String>,
    ) -> BoxStream<'static, BatchEvent<String, Tag>> {
        self.manifests.resolve_short_tags_with_progress(repository, names)
    }

    pub fn add_tags(&self, repository: &str, tags: Vec<TagPush>) -> BoxStream<'static, BatchEvent<TagPush, ()>> {
        self.manifests.add_tags(repository, tags)
    }

    pub fn delete_manifests(&self, repository: &str, digests: Vec<String>) -> BoxStream<'static, BatchEvent<String, ()>> {
        self.manifests.delete_manifests(repository, digests)
    }

    pub fn retag_with_progress(
        &self,
        repository: &str,
        modified_tags: Vec<TagEdit>,
        modified_digests: Vec<String>,
        impacted_tags: Vec<Tag>,
    ) -> BoxStream<'static, MutationEvent> {
        self.mutations
            .retag_with_progress(repository, modified_tags, modified_digests, impacted_tags)
    }

    pub fn delete_tags_with_progress(
        &self,
        repository: &str,
        modified_digests: Vec<String>,
        impacted_tags: Vec<Tag>,
    ) -> BoxStream<'static, MutationEvent> {
        self.mutations
            .delete_tags_with_progress(repository, modified_digests, impacted_tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::capability::RegistryType;

    #[test]
    fn test_build_requires_config_or_transport() {
        let result = RegistryClient::builder(RegistryRef::new(1, RegistryType::Custom)).build();
        assert!(matches!(result, Err(RegistryError::Configuration(_))));
    }

    #[test]
    fn test_build_from_config_uses_its_registry_ref() {
        let config = RegistryConfig::new("https://ghcr.io".to_string())
            .with_registry_type(RegistryType::Github)
            .with_registry_id(7);
        let client = RegistryClient::builder(RegistryRef::new(1, RegistryType::Custom))
            .with_config(config)
            .with_logger(Logger::new_quiet())
            .build()
            .unwrap();

        assert_eq!(client.registry(), &RegistryRef::new(7, RegistryType::Github));
        assert_eq!(client.write_concurrency(), Some(1));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let config = RegistryConfig::new("ghcr.io".to_string());
        let result = RegistryClient::builder(RegistryRef::new(1, RegistryType::Custom))
            .with_config(config)
            .build();
        assert!(matches!(result, Err(RegistryError::Validation(_))));
    }
}
