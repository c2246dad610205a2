//! Command-line argument parsing

use crate::registry::capability::RegistryType;
use crate::registry::operations::TagEdit;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "regsync")]
#[command(about = "Browse and edit repositories and tags on a Docker Registry V2")]
#[command(version, author)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Registry base address
    #[arg(
        long = "registry",
        short = 'r',
        global = true,
        help = "Registry base URL, e.g. https://ghcr.io (falls back to REGSYNC_ADDRESS)"
    )]
    pub registry: Option<String>,

    /// Registry vendor
    #[arg(
        long = "registry-type",
        global = true,
        help = "Registry type: quay, azure, custom, gitlab, proget, dockerhub, ecr, github"
    )]
    pub registry_type: Option<RegistryType>,

    /// Caller-side registry identifier
    #[arg(long = "registry-id", global = true, help = "Identifier of the registry entry")]
    pub registry_id: Option<u32>,

    /// Bearer token
    #[arg(
        long = "token",
        global = true,
        help = "Pre-issued bearer token (falls back to REGSYNC_TOKEN)"
    )]
    pub token: Option<String>,

    /// Configuration file path
    #[arg(long = "config", short = 'c', global = true, help = "Path to a JSON configuration file")]
    pub config: Option<String>,

    /// Skip TLS verification
    #[arg(
        long = "skip-tls",
        short = 'k',
        global = true,
        help = "Skip TLS certificate verification"
    )]
    pub skip_tls: bool,

    /// Timeout in seconds for network operations
    #[arg(
        long = "timeout",
        short = 't',
        global = true,
        help = "Timeout for registry requests in seconds"
    )]
    pub timeout: Option<u64>,

    /// Page size for listings
    #[arg(long = "page-size", global = true, help = "Items requested per listing page")]
    pub page_size: Option<u32>,

    /// Verbose output
    #[arg(long = "verbose", short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Quiet mode
    #[arg(long = "quiet", short = 'q', global = true, help = "Only print results and errors")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// List repositories in the catalog
    Repos {
        /// Also count each repository's tags
        #[arg(long = "with-tags")]
        with_tags: bool,
    },
    /// List the tags of a repository
    Tags {
        repository: String,
        /// Resolve each tag's digest
        #[arg(long = "digests")]
        digests: bool,
    },
    /// Show the merged manifest details of a tag
    Inspect {
        repository: String,
        tag: String,
        /// Print the detail as JSON
        #[arg(long = "json")]
        json: bool,
    },
    /// Create new tags pointing at an existing tag's manifest
    AddTag {
        repository: String,
        /// Existing tag to copy
        source: String,
        /// Names to create
        #[arg(required = true)]
        targets: Vec<String>,
    },
    /// Delete manifests by digest
    DeleteManifest {
        repository: String,
        #[arg(required = true)]
        digests: Vec<String>,
    },
    /// Rename tags (OLD=NEW)
    Retag {
        repository: String,
        #[arg(required = true, value_parser = parse_tag_edit)]
        renames: Vec<TagEdit>,
        /// Show the plan without changing anything
        #[arg(long = "dry-run", short = 'n')]
        dry_run: bool,
    },
    /// Delete tags, keeping other tags that share their manifests
    DeleteTags {
        repository: String,
        #[arg(required = true)]
        tags: Vec<String>,
        /// Show the plan without changing anything
        #[arg(long = "dry-run", short = 'n')]
        dry_run: bool,
    },
}

impl Command {
    pub fn repository(&self) -> Option<&str> {
        match self {
            Command::Repos { .. } => None,
            Command::Tags { repository, .. }
            | Command::Inspect { repository, .. }
            | Command::AddTag { repository, .. }
            | Command::DeleteManifest { repository, .. }
            | Command::Retag { repository, .. }
            | Command::DeleteTags { repository, .. } => Some(repository),
        }
    }
}

/// Parse `OLD=NEW`
pub fn parse_tag_edit(value: &str) -> Result<TagEdit, String> {
    match value.split_once('=') {
        Some((name, new_name)) if !name.is_empty() && !new_name.is_empty() => {
            Ok(TagEdit::new(name, new_name))
        }
        _ => Err(format!("expected OLD=NEW, got '{}'", value)),
    }
}

impl Args {
    pub fn parse_args() -> Self {
        Args::parse()
    }

    /// Validate arguments
    pub fn validate(&self) -> Result<(), String> {
        if self.verbose && self.quiet {
            return Err("--verbose and --quiet cannot be used together".to_string());
        }

        if let Some(registry) = &self.registry {
            if !registry.starts_with("http://") && !registry.starts_with("https://") {
                return Err("Registry address must start with http:// or https://".to_string());
            }
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be greater than 0".to_string());
        }

        if self.page_size == Some(0) {
            return Err("Page size must be greater than 0".to_string());
        }

        if let Some(repository) = self.command.repository() {
            if repository.is_empty() {
                return Err("Repository name cannot be empty".to_string());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_retag() {
        let args = Args::try_parse_from([
            "regsync", "retag", "team/api", "a=a2", "b=b2", "--registry", "https://ghcr.io",
            "--registry-type", "github",
        ])
        .unwrap();

        assert_eq!(args.registry_type, Some(RegistryType::Github));
        assert_eq!(
            args.command,
            Command::Retag {
                repository: "team/api".to_string(),
                renames: vec![TagEdit::new("a", "a2"), TagEdit::new("b", "b2")],
                dry_run: false,
            }
        );
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_parse_tag_edit_rejects_malformed() {
        assert!(parse_tag_edit("a").is_err());
        assert!(parse_tag_edit("=b").is_err());
        assert!(parse_tag_edit("a=").is_err());
        assert!(Args::try_parse_from(["regsync", "retag", "team/api", "oops"]).is_err());
    }

    #[test]
    fn test_validate_rejects_conflicts() {
        let args = Args::try_parse_from(["regsync", "repos", "-v", "-q"]).unwrap();
        assert!(args.validate().is_err());

        let args = Args::try_parse_from(["regsync", "tags", "team/api", "-r", "ghcr.io"]).unwrap();
        assert!(args.validate().is_err());
    }
}
