//! Two-phase tag mutations
//!
//! Registries have no rename. Retagging and deleting individual tags are both
//! expressed as: delete every affected manifest digest (which drops every tag
//! pointing at it), then recreate the tags that should survive. The phases run
//! strictly in order and nothing is rolled back; the final
//! [`MutationEvent::Finished`] lists whatever did not make it.

use crate::concurrency::{BatchEvent, BatchProgress, ItemOutcome};
use crate::error::handlers::ValidationErrorHandler;
use crate::error::{RegistryError, Result};
use crate::logging::Logger;
use crate::registry::manifest::{Tag, TagPush};
use crate::registry::operations::ManifestOperations;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Requested rename of one tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagEdit {
    pub name: String,
    pub new_name: String,
}

impl TagEdit {
    pub fn new(name: impl Into<String>, new_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            new_name: new_name.into(),
        }
    }

    pub fn is_rename(&self) -> bool {
        self.name != self.new_name
    }
}

/// Inputs of a two-phase mutation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationPlan {
    pub modified_tags: Vec<TagEdit>,
    /// Digests deleted in phase 1
    pub modified_digests: Vec<String>,
    /// Tags recreated in phase 2
    pub impacted_tags: Vec<Tag>,
}

impl MutationPlan {
    pub fn is_empty(&self) -> bool {
        self.modified_digests.is_empty() && self.impacted_tags.is_empty()
    }

    pub fn total(&self) -> usize {
        self.modified_digests.len() + self.impacted_tags.len()
    }
}

/// Work left undone by a finished mutation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MutationSummary {
    pub operation_id: String,
    pub failed_deletions: Vec<String>,
    /// Tags that existed before the mutation and were not recreated
    pub missing_tags: Vec<String>,
}

impl MutationSummary {
    pub fn is_clean(&self) -> bool {
        self.failed_deletions.is_empty() && self.missing_tags.is_empty()
    }
}

#[derive(Debug)]
pub enum MutationEvent {
    Deleted(ItemOutcome<String, ()>),
    Recreated(ItemOutcome<TagPush, ()>),
    /// Cumulative over both phases
    Progress(BatchProgress),
    Finished(MutationSummary),
}

/// Plan a retag against the repository's current tags.
///
/// Every digest behind a renamed tag gets deleted, and since that drops all
/// tags sharing the digest, all of them are recreated (renamed where an edit
/// asks for it). Edits that keep the name are ignored.
pub fn plan_retag(current_tags: &[Tag], edits: &[TagEdit]) -> Result<MutationPlan> {
    let existing: HashSet<&str> = current_tags.iter().map(|t| t.name.as_str()).collect();
    let mut targets = HashSet::new();
    let mut modified_tags = Vec::new();

    for edit in edits.iter().filter(|e| e.is_rename()) {
        if !existing.contains(edit.name.as_str()) {
            return Err(RegistryError::Validation(format!("unknown tag '{}'", edit.name)));
        }
        ValidationErrorHandler::validate_tag(&edit.new_name)?;
        if existing.contains(edit.new_name.as_str()) || !targets.insert(edit.new_name.as_str()) {
            return Err(RegistryError::Validation(format!(
                "cannot rename '{}' to '{}': tag already exists",
                edit.name, edit.new_name
            )));
        }
        if modified_tags.iter().any(|e: &TagEdit| e.name == edit.name) {
            return Err(RegistryError::Validation(format!(
                "tag '{}' is renamed more than once",
                edit.name
            )));
        }
        modified_tags.push(edit.clone());
    }

    let renamed: HashSet<&str> = modified_tags.iter().map(|e| e.name.as_str()).collect();
    let modified_digests = digests_of(current_tags, |t| renamed.contains(t.name.as_str()));
    let impacted_tags = tags_sharing(current_tags, &modified_digests, |_| true);

    Ok(MutationPlan {
        modified_tags,
        modified_digests,
        impacted_tags,
    })
}

/// Plan the deletion of `names`.
///
/// Their digests are deleted and every other tag that shared one of those
/// digests is recreated.
pub fn plan_tag_deletion(current_tags: &[Tag], names: &[String]) -> Result<MutationPlan> {
    let existing: HashSet<&str> = current_tags.iter().map(|t| t.name.as_str()).collect();
    if let Some(unknown) = names.iter().find(|n| !existing.contains(n.as_str())) {
        return Err(RegistryError::Validation(format!("unknown tag '{}'", unknown)));
    }

    let deleted: HashSet<&str> = names.iter().map(String::as_str).collect();
    let modified_digests = digests_of(current_tags, |t| deleted.contains(t.name.as_str()));
    let impacted_tags = tags_sharing(current_tags, &modified_digests, |t| {
        !deleted.contains(t.name.as_str())
    });

    Ok(MutationPlan {
        modified_tags: Vec::new(),
        modified_digests,
        impacted_tags,
    })
}

/// Distinct digests of the selected tags, in tag order
fn digests_of(tags: &[Tag], selected: impl Fn(&Tag) -> bool) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.iter()
        .filter(|t| selected(t))
        .filter(|t| seen.insert(t.manifest_digest.as_str()))
        .map(|t| t.manifest_digest.clone())
        .collect()
}

fn tags_sharing(tags: &[Tag], digests: &[String], keep: impl Fn(&Tag) -> bool) -> Vec<Tag> {
    tags.iter()
        .filter(|t| digests.contains(&t.manifest_digest) && keep(t))
        .cloned()
        .collect()
}

enum Phase {
    Deleting(BoxStream<'static, BatchEvent<String, ()>>),
    Recreating(BoxStream<'static, BatchEvent<TagPush, ()>>),
    Done,
}

enum Step {
    Deletion(Option<BatchEvent<String, ()>>),
    Recreation(Option<BatchEvent<TagPush, ()>>),
}

struct MutationState {
    ops: ManifestOperations,
    output: Logger,
    repository: String,
    phase: Phase,
    /// Taken when phase 2 starts
    pushes: Option<Vec<TagPush>>,
    deletion_progress: BatchProgress,
    total: usize,
    summary: MutationSummary,
}

impl MutationState {
    fn finish(&self) -> MutationSummary {
        let id = &self.summary.operation_id;
        if !self.summary.failed_deletions.is_empty() {
            self.output.warning(&format!(
                "[{}] {} manifest(s) could not be deleted from {}",
                id,
                self.summary.failed_deletions.len(),
                self.repository
            ));
            self.output.list("Manifests still present", &self.summary.failed_deletions);
        }
        if self.summary.missing_tags.is_empty() {
            self.output.success(&format!("[{}] {} updated", id, self.repository));
        } else {
            self.output.warning(&format!(
                "[{}] {} tag(s) were removed from {} and not recreated",
                id,
                self.summary.missing_tags.len(),
                self.repository
            ));
            self.output.list("Tags to recreate manually", &self.summary.missing_tags);
        }
        self.summary.clone()
    }
}

#[derive(Clone)]
pub struct MutationOperations {
    manifests: ManifestOperations,
    output: Logger,
}

impl MutationOperations {
    pub fn new(manifests: ManifestOperations, output: Logger) -> Self {
        Self { manifests, output }
    }

    /// Delete `modified_digests`, then recreate `impacted_tags`, renaming
    /// those that `modified_tags` renames.
    pub fn retag_with_progress(
        &self,
        repository: &str,
        modified_tags: Vec<TagEdit>,
        modified_digests: Vec<String>,
        impacted_tags: Vec<Tag>,
    ) -> BoxStream<'static, MutationEvent> {
        let pushes = impacted_tags
            .iter()
            .map(|tag| {
                let name = modified_tags
                    .iter()
                    .find(|edit| edit.name == tag.name && edit.is_rename())
                    .map(|edit| edit.new_name.as_str())
                    .unwrap_or(tag.name.as_str());
                tag.push_as(name)
            })
            .collect();
        self.two_phase("retag", repository, modified_digests, pushes)
    }

    /// Delete `modified_digests`, then recreate `impacted_tags` under their
    /// own names. Tags to get rid of are simply left out of `impacted_tags`.
    pub fn delete_tags_with_progress(
        &self,
        repository: &str,
        modified_digests: Vec<String>,
        impacted_tags: Vec<Tag>,
    ) -> BoxStream<'static, MutationEvent> {
        let pushes = impacted_tags.iter().map(|tag| tag.push_as(&tag.name)).collect();
        self.two_phase("delete tags", repository, modified_digests, pushes)
    }

    fn two_phase(
        &self,
        operation: &str,
        repository: &str,
        digests: Vec<String>,
        pushes: Vec<TagPush>,
    ) -> BoxStream<'static, MutationEvent> {
        let operation_id = Uuid::new_v4().to_string();
        let total = digests.len() + pushes.len();
        self.output.info(&format!(
            "[{}] {} on {}: deleting {} manifest(s), recreating {} tag(s)",
            operation_id,
            operation,
            repository,
            digests.len(),
            pushes.len()
        ));

        let state = MutationState {
            ops: self.manifests.clone(),
            output: self.output.clone(),
            repository: repository.to_string(),
            phase: Phase::Deleting(self.manifests.delete_manifests(repository, digests)),
            pushes: Some(pushes),
            deletion_progress: BatchProgress::default(),
            total,
            summary: MutationSummary {
                operation_id,
                ..Default::default()
            },
        };

        stream::unfold(state, |mut state| async move {
            loop {
                let step = match &mut state.phase {
                    Phase::Deleting(events) => Step::Deletion(events.next().await),
                    Phase::Recreating(events) => Step::Recreation(events.next().await),
                    Phase::Done => return None,
                };

                match step {
                    Step::Deletion(Some(BatchEvent::Settled(outcome))) => {
                        if let Err(e) = &outcome.result {
                            state.output.error(&e.to_string());
                            state.summary.failed_deletions.push(outcome.item.clone());
                        }
                        return Some((MutationEvent::Deleted(outcome), state));
                    }
                    Step::Deletion(Some(BatchEvent::Progress(progress))) => {
                        state.deletion_progress = progress;
                        let overall = BatchProgress {
                            total: state.total,
                            ..progress
                        };
                        return Some((MutationEvent::Progress(overall), state));
                    }
                    Step::Deletion(None) => {
                        let pushes = state.pushes.take().unwrap_or_default();
                        state.phase =
                            Phase::Recreating(state.ops.add_tags(&state.repository, pushes));
                    }
                    Step::Recreation(Some(BatchEvent::Settled(outcome))) => {
                        if let Err(e) = &outcome.result {
                            state.output.error(&e.to_string());
                            state.summary.missing_tags.push(outcome.item.name.clone());
                        }
                        return Some((MutationEvent::Recreated(outcome), state));
                    }
                    Step::Recreation(Some(BatchEvent::Progress(progress))) => {
                        let overall = progress.after(state.deletion_progress, state.total);
                        return Some((MutationEvent::Progress(overall), state));
                    }
                    Step::Recreation(None) => {
                        state.phase = Phase::Done;
                        let summary = state.finish();
                        return Some((MutationEvent::Finished(summary), state));
                    }
                }
            }
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tag(name: &str, digest: &str) -> Tag {
        Tag {
            name: name.to_string(),
            config_digest: Some(format!("{}-config", digest)),
            manifest_digest: digest.to_string(),
            raw_manifest: json!({ "schemaVersion": 2, "digest": digest }),
        }
    }

    fn current() -> Vec<Tag> {
        vec![
            tag("a", "sha256:d1"),
            tag("latest", "sha256:d1"),
            tag("b", "sha256:d2"),
            tag("c", "sha256:d3"),
        ]
    }

    fn names(tags: &[Tag]) -> Vec<&str> {
        tags.iter().map(|t| t.name.as_str()).collect()
    }

    #[test]
    fn test_plan_retag_recreates_every_tag_on_the_digest() {
        let plan = plan_retag(&current(), &[TagEdit::new("a", "a2")]).unwrap();
        assert_eq!(plan.modified_digests, vec!["sha256:d1"]);
        assert_eq!(names(&plan.impacted_tags), vec!["a", "latest"]);
        assert_eq!(plan.modified_tags, vec![TagEdit::new("a", "a2")]);
        assert_eq!(plan.total(), 3);
    }

    #[test]
    fn test_plan_retag_ignores_unchanged_names() {
        let plan = plan_retag(&current(), &[TagEdit::new("b", "b")]).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_plan_retag_rejects_bad_edits() {
        assert!(matches!(
            plan_retag(&current(), &[TagEdit::new("zzz", "z")]),
            Err(RegistryError::Validation(_))
        ));
        assert!(matches!(
            plan_retag(&current(), &[TagEdit::new("a", "b")]),
            Err(RegistryError::Validation(_))
        ));
        assert!(matches!(
            plan_retag(&current(), &[TagEdit::new("a", "x"), TagEdit::new("b", "x")]),
            Err(RegistryError::Validation(_))
        ));
        assert!(matches!(
            plan_retag(&current(), &[TagEdit::new("a", "bad tag")]),
            Err(RegistryError::Validation(_))
        ));
    }

    #[test]
    fn test_plan_tag_deletion_keeps_siblings() {
        let plan = plan_tag_deletion(&current(), &["a".to_string(), "c".to_string()]).unwrap();
        assert_eq!(plan.modified_digests, vec!["sha256:d1", "sha256:d3"]);
        assert_eq!(names(&plan.impacted_tags), vec!["latest"]);
        assert!(plan.modified_tags.is_empty());

        assert!(matches!(
            plan_tag_deletion(&current(), &["nope".to_string()]),
            Err(RegistryError::Validation(_))
        ));
    }

    #[test]
    fn test_summary_is_clean() {
        assert!(MutationSummary::default().is_clean());
        let summary = MutationSummary {
            missing_tags: vec!["a".to_string()],
            ..Default::default()
        };
        assert!(!summary.is_clean());
    }
}
