//! Repository operations for registry client
//!
//! Implements catalog and tag listing on top of the cursor paginator:
//! - Repository catalog (GET /v2/_catalog)
//! - Tag listing (GET /v2/{name}/tags/list), where a 404 on the first page
//!   means the repository has no tags
//! - Repository summaries with tag counts

use crate::concurrency::{run_batch, BatchReport};
use crate::config::DEFAULT_LISTING_CONCURRENCY;
use crate::error::Result;
use crate::logging::Logger;
use crate::registry::pagination::{paginate, Page};
use crate::registry::transport::{ListRequest, RegistryTransport};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositorySummary {
    pub name: String,
    pub tag_count: usize,
}

#[derive(Clone)]
pub struct RepositoryOperations {
    transport: Arc<dyn RegistryTransport>,
    output: Logger,
    page_size: Option<u32>,
    /// Tag listings fetched at once by [`Self::list_repositories_with_tags`]
    listing_concurrency: usize,
}

impl RepositoryOperations {
    pub fn new(transport: Arc<dyn RegistryTransport>, output: Logger) -> Self {
        Self {
            transport,
            output,
            page_size: None,
            listing_concurrency: DEFAULT_LISTING_CONCURRENCY,
        }
    }

    pub fn with_page_size(mut self, page_size: Option<u32>) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_listing_concurrency(mut self, listing_concurrency: usize) -> Self {
        self.listing_concurrency = listing_concurrency;
        self
    }

    /// Walk the whole catalog
    pub async fn list_repositories(&self) -> Result<Vec<String>> {
        let repositories = paginate("catalog", &self.output, |cursor| {
            let transport = Arc::clone(&self.transport);
            let request = ListRequest::new(cursor, self.page_size);
            async move { transport.list_catalog(&request).await }
        })
        .await?;

        self.output
            .verbose(&format!("Catalog lists {} repositories", repositories.len()));
        Ok(repositories)
    }

    /// Walk every tag of `repository`
    pub async fn list_tags(&self, repository: &str) -> Result<Vec<String>> {
        let resource = format!("tags of {}", repository);
        let tags = paginate(&resource, &self.output, |cursor| {
            let transport = Arc::clone(&self.transport);
            let repository = repository.to_string();
            let first_page = cursor.is_none();
            let request = ListRequest::new(cursor, self.page_size);
            let output = self.output.clone();
            async move {
                match transport.list_tags(&repository, &request).await {
                    Err(e) if first_page && e.is_not_found() => {
                        output.debug(&format!("{} has no tag listing: {}", repository, e));
                        Ok(Page::empty())
                    }
                    other => other,
                }
            }
        })
        .await?;

        self.output
            .verbose(&format!("{} has {} tag(s)", repository, tags.len()));
        Ok(tags)
    }

    /// Walk the catalog and count each repository's tags.
    ///
    /// Summaries come back in catalog order. The first tag listing that fails
    /// fails the whole call.
    pub async fn list_repositories_with_tags(&self) -> Result<Vec<RepositorySummary>> {
        let repositories = self.list_repositories().await?;

        let ops = self.clone();
        let events = run_batch(
            repositories,
            move |repository: String| {
                let ops = ops.clone();
                async move { ops.list_tags(&repository).await.map(|tags| tags.len()) }
            },
            Some(self.listing_concurrency),
        );

        let report = BatchReport::collect(events).await;
        if let Some((_, _, err)) = report.failed.into_iter().next() {
            return Err(err);
        }

        Ok(report
            .succeeded
            .into_iter()
            .map(|(_, name, tag_count)| RepositorySummary { name, tag_count })
            .collect())
    }
}
