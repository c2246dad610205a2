//! Runner that turns parsed arguments into registry calls

use crate::cli::args::{Args, Command};
use crate::concurrency::{BatchEvent, BatchProgress, BatchReport};
use crate::config::{AppConfig, RegistryConfig};
use crate::digest::DigestUtils;
use crate::error::handlers::ValidationErrorHandler;
use crate::error::{RegistryError, Result};
use crate::logging::Logger;
use crate::registry::operations::{plan_retag, plan_tag_deletion, MutationEvent, MutationPlan, TagEdit};
use crate::registry::{RegistryClient, Tag, TagPush};
use futures::stream::{BoxStream, StreamExt};
use std::path::Path;

pub struct Runner {
    args: Args,
    config: AppConfig,
    output: Logger,
}

impl Runner {
    pub fn new(args: Args) -> Result<Self> {
        args.validate().map_err(RegistryError::Validation)?;

        let config = Self::build_config(&args)?;
        config.validate()?;

        let output = if config.quiet {
            Logger::new_quiet()
        } else {
            Logger::new(config.verbose)
        };

        Ok(Self {
            args,
            config,
            output,
        })
    }

    /// Config file first, then command-line flags, then the environment
    fn build_config(args: &Args) -> Result<AppConfig> {
        let mut config = match &args.config {
            Some(path) => AppConfig::from_file(Path::new(path))?,
            None => AppConfig::new(RegistryConfig::new(String::new())),
        };

        let registry = &mut config.registry;
        if let Some(address) = &args.registry {
            registry.address = address.clone();
        }
        if let Some(registry_type) = args.registry_type {
            registry.registry_type = registry_type;
        }
        if let Some(id) = args.registry_id {
            registry.registry_id = id;
        }
        if let Some(timeout) = args.timeout {
            registry.timeout = timeout;
        }
        if args.page_size.is_some() {
            registry.page_size = args.page_size;
        }
        if args.token.is_some() {
            registry.token = args.token.clone();
        }
        registry.skip_tls |= args.skip_tls;
        config.verbose |= args.verbose;
        config.quiet |= args.quiet;

        Ok(config.apply_env())
    }

    fn create_client(&self) -> Result<RegistryClient> {
        let registry = &self.config.registry;
        self.output.detail(&format!(
            "Registry: {} ({}, id {})",
            registry.address, registry.registry_type, registry.registry_id
        ));

        RegistryClient::builder(registry.registry_ref())
            .with_config(registry.clone())
            .with_policy(self.config.policy())
            .with_logger(self.output.clone())
            .build()
    }

    pub async fn run(&self) -> Result<()> {
        let client = self.create_client()?;

        match &self.args.command {
            Command::Repos { with_tags } => self.list_repositories(&client, *with_tags).await,
            Command::Tags { repository, digests } => {
                self.list_tags(&client, repository, *digests).await
            }
            Command::Inspect {
                repository,
                tag,
                json,
            } => self.inspect(&client, repository, tag, *json).await,
            Command::AddTag {
                repository,
                source,
                targets,
            } => self.add_tags(&client, repository, source, targets).await,
            Command::DeleteManifest {
                repository,
                digests,
            } => self.delete_manifests(&client, repository, digests).await,
            Command::Retag {
                repository,
                renames,
                dry_run,
            } => self.retag(&client, repository, renames, *dry_run).await,
            Command::DeleteTags {
                repository,
                tags,
                dry_run,
            } => self.delete_tags(&client, repository, tags, *dry_run).await,
        }
    }

    async fn list_repositories(&self, client: &RegistryClient, with_tags: bool) -> Result<()> {
        if with_tags {
            for summary in client.list_repositories_with_tags().await? {
                println!("{}\t{}", summary.name, summary.tag_count);
            }
        } else {
            for repository in client.list_repositories().await? {
                println!("{}", repository);
            }
        }
        Ok(())
    }

    async fn list_tags(&self, client: &RegistryClient, repository: &str, digests: bool) -> Result<()> {
        ValidationErrorHandler::validate_repository(repository)?;
        if !digests {
            for tag in client.list_tags(repository).await? {
                println!("{}", tag);
            }
            return Ok(());
        }

        let tags = self.resolve_all(client, repository).await?;
        for tag in tags {
            println!("{}\t{}", tag.name, tag.manifest_digest);
        }
        Ok(())
    }

    async fn inspect(&self, client: &RegistryClient, repository: &str, tag: &str, json: bool) -> Result<()> {
        ValidationErrorHandler::validate_repository(repository)?;
        let detail = client.resolve_tag(repository, tag).await?;

        if json {
            println!("{}", serde_json::to_string_pretty(&detail)?);
            return Ok(());
        }

        println!("{}:{}", repository, detail.name);
        println!("  digest:       {}", detail.manifest_digest);
        if let Some(image_id) = &detail.image_id {
            println!("  image id:     {}", DigestUtils::format_digest_short(image_id));
        }
        println!(
            "  platform:     {}/{}",
            detail.os.as_deref().unwrap_or("unknown"),
            detail.architecture.as_deref().unwrap_or("unknown")
        );
        println!("  size:         {} bytes in {} layer(s)", detail.size, detail.layers.len());
        for entry in &detail.history {
            println!(
                "  {}  {}",
                entry.created.as_deref().unwrap_or("-"),
                entry.created_by.as_deref().unwrap_or("")
            );
        }
        Ok(())
    }

    async fn add_tags(&self, client: &RegistryClient, repository: &str, source: &str, targets: &[String]) -> Result<()> {
        ValidationErrorHandler::validate_repository(repository)?;
        for target in targets {
            ValidationErrorHandler::validate_tag(target)?;
        }

        let tag = client.resolve_short_tag(repository, source).await?;
        let pushes: Vec<TagPush> = targets.iter().map(|name| tag.push_as(name)).collect();

        self.output.step(&format!(
            "Tagging {}:{} as {}",
            repository,
            source,
            targets.join(", ")
        ));
        let report = self
            .drain_batch("Adding tags", client.add_tags(repository, pushes))
            .await;
        self.check_report("tag(s) could not be created", &report.failed, |push| push.name.clone())
    }

    async fn delete_manifests(&self, client: &RegistryClient, repository: &str, digests: &[String]) -> Result<()> {
        ValidationErrorHandler::validate_repository(repository)?;
        let digests = digests
            .iter()
            .map(|digest| DigestUtils::normalize_digest(digest))
            .collect::<Result<Vec<_>>>()?;

        let report = self
            .drain_batch("Deleting manifests", client.delete_manifests(repository, digests))
            .await;
        self.check_report("manifest(s) could not be deleted", &report.failed, |digest| digest.clone())
    }

    async fn retag(&self, client: &RegistryClient, repository: &str, renames: &[TagEdit], dry_run: bool) -> Result<()> {
        ValidationErrorHandler::validate_repository(repository)?;
        let current = self.resolve_all(client, repository).await?;
        let plan = plan_retag(&current, renames)?;
        self.show_plan(&plan);
        if dry_run || plan.is_empty() {
            return Ok(());
        }

        let events = client.retag_with_progress(
            repository,
            plan.modified_tags,
            plan.modified_digests,
            plan.impacted_tags,
        );
        self.drain_mutation("Retagging", events).await
    }

    async fn delete_tags(&self, client: &RegistryClient, repository: &str, tags: &[String], dry_run: bool) -> Result<()> {
        ValidationErrorHandler::validate_repository(repository)?;
        let current = self.resolve_all(client, repository).await?;
        let plan = plan_tag_deletion(&current, tags)?;
        self.show_plan(&plan);
        if dry_run || plan.is_empty() {
            return Ok(());
        }

        let events =
            client.delete_tags_with_progress(repository, plan.modified_digests, plan.impacted_tags);
        self.drain_mutation("Deleting tags", events).await
    }

    /// Resolve every tag of the repository; planning needs all of them
    async fn resolve_all(&self, client: &RegistryClient, repository: &str) -> Result<Vec<Tag>> {
        let names = client.list_tags(repository).await?;
        let report = self
            .drain_batch(
                "Resolving tags",
                client.resolve_short_tags_with_progress(repository, names),
            )
            .await;

        if let Some((_, _, err)) = report.failed.into_iter().next() {
            return Err(err);
        }
        Ok(report.succeeded.into_iter().map(|(_, _, tag)| tag).collect())
    }

    async fn drain_batch<T, R>(&self, operation: &str, mut events: BoxStream<'static, BatchEvent<T, R>>) -> BatchReport<T, R> {
        let mut report = BatchReport::default();
        while let Some(event) = events.next().await {
            match event {
                BatchEvent::Settled(outcome) => report.record(outcome),
                BatchEvent::Progress(progress) => {
                    self.output.display_batch_progress(operation, &progress);
                    report.progress = progress;
                }
            }
        }
        if report.progress.total > 0 {
            self.output.finish_batch_progress();
        }
        report.sort();
        report
    }

    async fn drain_mutation(&self, operation: &str, mut events: BoxStream<'static, MutationEvent>) -> Result<()> {
        let mut last = BatchProgress::default();
        while let Some(event) = events.next().await {
            match event {
                MutationEvent::Progress(progress) => {
                    self.output.display_batch_progress(operation, &progress);
                    last = progress;
                }
                MutationEvent::Deleted(outcome) => {
                    self.output.trace(&format!("deleted {}: {}", outcome.item, outcome.is_success()));
                }
                MutationEvent::Recreated(outcome) => {
                    self.output
                        .trace(&format!("recreated {}: {}", outcome.item.name, outcome.is_success()));
                }
                MutationEvent::Finished(summary) => {
                    if last.total > 0 {
                        self.output.finish_batch_progress();
                    }
                    self.output.summary_kv(
                        "Summary",
                        &[
                            ("operation", summary.operation_id.clone()),
                            ("completed", format!("{}/{}", last.completed, last.total)),
                            ("failed", last.failed.to_string()),
                            ("elapsed", self.output.format_duration(self.output.elapsed())),
                        ],
                    );
                    if !summary.is_clean() {
                        return Err(RegistryError::Registry(format!(
                            "operation {} left {} manifest(s) undeleted and {} tag(s) missing",
                            summary.operation_id,
                            summary.failed_deletions.len(),
                            summary.missing_tags.len()
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn show_plan(&self, plan: &MutationPlan) {
        self.output.section("Plan");
        if plan.is_empty() {
            self.output.info("Nothing to change");
            return;
        }
        let digests: Vec<String> = plan
            .modified_digests
            .iter()
            .map(|d| DigestUtils::format_digest_short(d))
            .collect();
        let recreated: Vec<String> = plan
            .impacted_tags
            .iter()
            .map(|tag| {
                match plan.modified_tags.iter().find(|edit| edit.name == tag.name) {
                    Some(edit) => format!("{} -> {}", edit.name, edit.new_name),
                    None => tag.name.clone(),
                }
            })
            .collect();
        self.output.list("Manifests to delete", &digests);
        self.output.list("Tags to recreate", &recreated);
    }

    fn check_report<T, E>(&self, what: &str, failed: &[(usize, T, E)], label: impl Fn(&T) -> String) -> Result<()>
    where
        E: std::fmt::Display,
    {
        if failed.is_empty() {
            self.output.success("Done");
            return Ok(());
        }
        for (_, item, err) in failed {
            self.output.error(&format!("{}: {}", label(item), err));
        }
        Err(RegistryError::Registry(format!("{} {}", failed.len(), what)))
    }
}
