//! Manifest operations for registry client
//!
//! Implements tag resolution and bulk manifest writes:
//! - Full tag resolution, fetching schema v1 and v2 side by side
//! - Short tag resolution (schema v2 only), singly or as a progress stream
//! - Bulk tag creation (PUT /v2/{name}/manifests/{tag})
//! - Bulk manifest deletion (DELETE /v2/{name}/manifests/{digest})
//!
//! Write batches run with the concurrency step the capability policy assigns
//! to the target registry.

use crate::concurrency::{run_batch, BatchEvent};
use crate::error::{RegistryError, Result};
use crate::logging::Logger;
use crate::registry::capability::{CapabilityPolicy, RegistryRef};
use crate::registry::manifest::{
    ManifestResponse, ManifestSchema, ResolvedV1, ResolvedV2, Tag, TagDetail, TagPush,
};
use crate::registry::transport::{
    DeleteRequest, ManifestPutRequest, ManifestRequest, RegistryTransport,
};
use futures::stream::BoxStream;
use std::sync::Arc;

#[derive(Clone)]
pub struct ManifestOperations {
    transport: Arc<dyn RegistryTransport>,
    registry: RegistryRef,
    policy: CapabilityPolicy,
    output: Logger,
}

impl ManifestOperations {
    pub fn new(
        transport: Arc<dyn RegistryTransport>,
        registry: RegistryRef,
        policy: CapabilityPolicy,
        output: Logger,
    ) -> Self {
        Self {
            transport,
            registry,
            policy,
            output,
        }
    }

    fn concurrency_step(&self) -> Option<usize> {
        self.policy.concurrency_step_for(self.registry.registry_type)
    }

    fn read_concurrency_step(&self) -> Option<usize> {
        self.policy.read_concurrency_step_for(self.registry.registry_type)
    }

    async fn fetch(&self, repository: &str, reference: &str, schema: ManifestSchema) -> Result<ManifestResponse> {
        let request = ManifestRequest {
            repository: repository.to_string(),
            reference: reference.to_string(),
            schema,
        };
        self.transport.get_manifest(&request).await
    }

    /// Resolve one tag into its merged schema-v1/schema-v2 view.
    ///
    /// Both schemas are requested concurrently. The tag only fails to resolve
    /// when neither request produced a usable manifest, in which case the
    /// schema-v2 failure is reported as the cause.
    pub async fn resolve_tag(&self, repository: &str, tag: &str) -> Result<TagDetail> {
        let (v1, v2) = futures::join!(
            self.fetch(repository, tag, ManifestSchema::V1),
            self.fetch(repository, tag, ManifestSchema::V2)
        );
        let v1 = v1.and_then(|r| ResolvedV1::from_response(&r));
        let v2 = v2.and_then(|r| ResolvedV2::from_response(&r));

        match (v1, v2) {
            (Err(v1_err), Err(v2_err)) => {
                self.output
                    .debug(&format!("{}:{} schema v1 failed: {}", repository, tag, v1_err));
                Err(RegistryError::manifest_resolution(tag, v2_err))
            }
            (v1, v2) => {
                if let Err(e) = &v1 {
                    self.output
                        .verbose(&format!("{}:{} has no schema v1 manifest: {}", repository, tag, e));
                }
                if let Err(e) = &v2 {
                    self.output
                        .verbose(&format!("{}:{} has no schema v2 manifest: {}", repository, tag, e));
                }
                TagDetail::merge(tag, v1.ok().as_ref(), v2.ok().as_ref()).ok_or_else(|| {
                    RegistryError::manifest_resolution(
                        tag,
                        RegistryError::Parse("no manifest schema resolved".to_string()),
                    )
                })
            }
        }
    }

    /// Resolve the short form of a tag from its schema-v2 manifest
    pub async fn resolve_short_tag(&self, repository: &str, tag: &str) -> Result<Tag> {
        let response = self
            .fetch(repository, tag, ManifestSchema::V2)
            .await
            .map_err(|e| RegistryError::manifest_resolution(tag, e))?;
        let resolved =
            ResolvedV2::from_response(&response).map_err(|e| RegistryError::manifest_resolution(tag, e))?;
        Ok(Tag::from_v2(tag, resolved))
    }

    /// Resolve many tags as a batch; a tag that cannot be resolved only fails
    /// its own outcome. GETs run under the read limit of the capability table,
    /// not the write limit.
    pub fn resolve_short_tags_with_progress(
        &self,
        repository: &str,
        names: Vec<String>,
    ) -> BoxStream<'static, BatchEvent<String, Tag>> {
        let ops = self.clone();
        let repository = repository.to_string();
        run_batch(
            names,
            move |name: String| {
                let ops = ops.clone();
                let repository = repository.clone();
                async move { ops.resolve_short_tag(&repository, &name).await }
            },
            self.read_concurrency_step(),
        )
    }

    /// PUT each manifest under its tag name.
    ///
    /// Any top-level `digest` field is stripped from the body first so a
    /// manifest resolved under one name can be recreated under another.
    pub fn add_tags(&self, repository: &str, tags: Vec<TagPush>) -> BoxStream<'static, BatchEvent<TagPush, ()>> {
        let step = self.concurrency_step();
        self.output.detail(&format!(
            "Pushing {} tag(s) to {} (concurrency: {})",
            tags.len(),
            repository,
            describe_step(step)
        ));

        let transport = Arc::clone(&self.transport);
        let repository = repository.to_string();
        run_batch(
            tags,
            move |tag: TagPush| {
                let transport = Arc::clone(&transport);
                let repository = repository.clone();
                async move {
                    let request = serde_json::to_vec(&tag.body()).map(|data| ManifestPutRequest {
                        repository,
                        reference: tag.name.clone(),
                        data,
                        content_type: tag.content_type().to_string(),
                    });
                    let result = match request {
                        Ok(request) => transport.put_manifest(&request).await,
                        Err(e) => Err(e.into()),
                    };
                    result.map_err(|e| RegistryError::item_operation("add tag", &tag.name, e))
                }
            },
            step,
        )
    }

    /// DELETE each manifest digest
    pub fn delete_manifests(&self, repository: &str, digests: Vec<String>) -> BoxStream<'static, BatchEvent<String, ()>> {
        let step = self.concurrency_step();
        self.output.detail(&format!(
            "Deleting {} manifest(s) from {} (concurrency: {})",
            digests.len(),
            repository,
            describe_step(step)
        ));

        let transport = Arc::clone(&self.transport);
        let repository = repository.to_string();
        run_batch(
            digests,
            move |digest: String| {
                let transport = Arc::clone(&transport);
                let request = DeleteRequest {
                    repository: repository.clone(),
                    digest: digest.clone(),
                };
                async move {
                    transport
                        .delete_manifest(&request)
                        .await
                        .map_err(|e| RegistryError::item_operation("delete manifest", &digest, e))
                }
            },
            step,
        )
    }
}

fn describe_step(step: Option<usize>) -> String {
    match step {
        Some(step) => step.to_string(),
        None => "uncapped".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::BatchReport;
    use crate::registry::capability::RegistryType;
    use crate::registry::manifest::MEDIA_TYPE_MANIFEST_V2;
    use crate::registry::pagination::Page;
    use crate::registry::transport::ListRequest;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Answers manifest requests from a fixed table and records writes
    #[derive(Default)]
    struct ManifestTable {
        v1: Option<Value>,
        v2: Option<Value>,
        puts: Mutex<Vec<(String, Value, String)>>,
        deletes: Mutex<Vec<String>>,
        reads_in_flight: AtomicUsize,
        peak_reads: AtomicUsize,
    }

    #[async_trait]
    impl RegistryTransport for ManifestTable {
        async fn list_catalog(&self, _request: &ListRequest) -> Result<Page<String>> {
            Ok(Page::empty())
        }

        async fn list_tags(&self, _repository: &str, _request: &ListRequest) -> Result<Page<String>> {
            Ok(Page::empty())
        }

        async fn get_manifest(&self, request: &ManifestRequest) -> Result<ManifestResponse> {
            let now = self.reads_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_reads.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.reads_in_flight.fetch_sub(1, Ordering::SeqCst);

            let body = match request.schema {
                ManifestSchema::V1 => self.v1.clone(),
                ManifestSchema::V2 => self.v2.clone(),
            };
            match body {
                Some(body) if request.reference != "missing" => Ok(ManifestResponse::new(
                    serde_json::to_vec(&body)?,
                    Some(format!("sha256:{:?}", request.schema).to_lowercase()),
                )),
                _ => Err(RegistryError::NotFound(format!(
                    "manifest unknown ({:?})",
                    request.schema
                ))),
            }
        }

        async fn put_manifest(&self, request: &ManifestPutRequest) -> Result<()> {
            if request.reference == "bad" {
                return Err(RegistryError::Registry("HTTP 400: manifest invalid".to_string()));
            }
            let body: Value = serde_json::from_slice(&request.data)?;
            self.puts.lock().unwrap().push((
                request.reference.clone(),
                body,
                request.content_type.clone(),
            ));
            Ok(())
        }

        async fn delete_manifest(&self, request: &DeleteRequest) -> Result<()> {
            self.deletes.lock().unwrap().push(request.digest.clone());
            Ok(())
        }
    }

    fn v1_body() -> Value {
        json!({
            "schemaVersion": 1,
            "tag": "1.0",
            "architecture": "arm64",
            "fsLayers": [{ "blobSum": "sha256:l1" }],
            "history": [{ "v1Compatibility": json!({ "id": "img", "os": "linux", "Size": 7 }).to_string() }]
        })
    }

    fn v2_body() -> Value {
        json!({
            "schemaVersion": 2,
            "mediaType": MEDIA_TYPE_MANIFEST_V2,
            "config": { "mediaType": "application/vnd.docker.container.image.v1+json", "size": 10, "digest": "sha256:cfg" },
            "layers": [{ "mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip", "size": 42, "digest": "sha256:l1" }]
        })
    }

    fn operations(table: ManifestTable) -> (Arc<ManifestTable>, ManifestOperations) {
        operations_for(RegistryType::Custom, table)
    }

    fn operations_for(registry_type: RegistryType, table: ManifestTable) -> (Arc<ManifestTable>, ManifestOperations) {
        let table = Arc::new(table);
        let ops = ManifestOperations::new(
            table.clone(),
            RegistryRef::new(1, registry_type),
            CapabilityPolicy::default(),
            Logger::new_quiet(),
        );
        (table, ops)
    }

    #[tokio::test]
    async fn test_resolve_tag_merges_both_schemas() {
        let (_, ops) = operations(ManifestTable {
            v1: Some(v1_body()),
            v2: Some(v2_body()),
            ..Default::default()
        });

        let detail = ops.resolve_tag("team/api", "1.0").await.unwrap();
        assert_eq!(detail.manifest_digest, "sha256:v2");
        assert_eq!(detail.size, 42);
        assert_eq!(detail.architecture.as_deref(), Some("arm64"));
        assert_eq!(detail.os.as_deref(), Some("linux"));
    }

    #[tokio::test]
    async fn test_resolve_tag_with_only_v1() {
        let (_, ops) = operations(ManifestTable {
            v1: Some(v1_body()),
            ..Default::default()
        });

        let detail = ops.resolve_tag("team/api", "1.0").await.unwrap();
        assert_eq!(detail.manifest_digest, "sha256:v1");
        assert!(!detail.sources.v2);
    }

    #[tokio::test]
    async fn test_legacy_only_tag_is_not_taken_for_v2() {
        // Registry answers the v2 Accept header with the schema-1 body
        let (_, ops) = operations(ManifestTable {
            v1: Some(v1_body()),
            v2: Some(v1_body()),
            ..Default::default()
        });

        let detail = ops.resolve_tag("team/api", "1.0").await.unwrap();
        assert!(!detail.sources.v2);
        assert_eq!(detail.size, 7);
        assert_eq!(detail.layers.len(), 1);

        let err = ops.resolve_short_tag("team/api", "1.0").await.unwrap_err();
        match err {
            RegistryError::ManifestResolution { source, .. } => {
                assert!(matches!(*source, RegistryError::Parse(_)));
            }
            other => panic!("expected ManifestResolution, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_github_reads_are_not_serialized() {
        let (table, ops) = operations_for(
            RegistryType::Github,
            ManifestTable {
                v2: Some(v2_body()),
                ..Default::default()
            },
        );

        let names = (0..6).map(|i| format!("v{}", i)).collect();
        let report = BatchReport::collect(ops.resolve_short_tags_with_progress("team/api", names)).await;
        assert!(report.is_success());
        assert!(table.peak_reads.load(Ordering::SeqCst) > 1);
        assert_eq!(ops.concurrency_step(), Some(1));
    }

    #[tokio::test]
    async fn test_resolve_tag_fails_when_both_schemas_fail() {
        let (_, ops) = operations(ManifestTable {
            v1: Some(v1_body()),
            v2: Some(v2_body()),
            ..Default::default()
        });

        let err = ops.resolve_tag("team/api", "missing").await.unwrap_err();
        assert!(err.to_string().starts_with("unable to retrieve tag `missing`"));
        match err {
            RegistryError::ManifestResolution { source, .. } => {
                assert!(source.to_string().contains("V2"));
            }
            other => panic!("expected ManifestResolution, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_resolve_short_tags_fail_per_item() {
        let (_, ops) = operations(ManifestTable {
            v2: Some(v2_body()),
            ..Default::default()
        });

        let events = ops.resolve_short_tags_with_progress(
            "team/api",
            vec!["1.0".to_string(), "missing".to_string(), "latest".to_string()],
        );
        let report = BatchReport::collect(events).await;
        assert_eq!(report.succeeded.len(), 2);
        assert_eq!(report.succeeded[0].2.config_digest.as_deref(), Some("sha256:cfg"));
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].1, "missing");
    }

    #[tokio::test]
    async fn test_add_tags_strips_digest_and_reports_failures() {
        let (table, ops) = operations(ManifestTable::default());
        let mut manifest = v2_body();
        manifest["digest"] = json!("sha256:stale");

        let events = ops.add_tags(
            "team/api",
            vec![
                TagPush::new("1.1", manifest.clone()),
                TagPush::new("bad", manifest.clone()),
            ],
        );
        let report = BatchReport::collect(events).await;

        assert_eq!(report.succeeded.len(), 1);
        let (_, item, err) = &report.failed[0];
        assert_eq!(item.name, "bad");
        assert!(matches!(err, RegistryError::ItemOperation { .. }));

        let puts = table.puts.lock().unwrap();
        assert_eq!(puts.len(), 1);
        assert_eq!(puts[0].0, "1.1");
        assert!(puts[0].1.get("digest").is_none());
        assert_eq!(puts[0].2, MEDIA_TYPE_MANIFEST_V2);
    }

    #[tokio::test]
    async fn test_delete_manifests() {
        let (table, ops) = operations(ManifestTable::default());
        let events = ops.delete_manifests("team/api", vec!["sha256:a".into(), "sha256:b".into()]);
        let report = BatchReport::collect(events).await;
        assert!(report.is_success());
        assert_eq!(report.progress.completed, 2);

        let mut deletes = table.deletes.lock().unwrap().clone();
        deletes.sort();
        assert_eq!(deletes, vec!["sha256:a", "sha256:b"]);
    }
}
