//! Per-vendor registry behavior
//!
//! Registries that speak the V2 API do not all tolerate the same traffic.
//! GitHub Container Registry rejects concurrent manifest writes to one
//! repository, so writes against it are serialized. Reads carry their own
//! limit and stay uncapped unless configured. The policy is a table so new
//! vendor quirks are data, not branches.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryType {
    Quay,
    Azure,
    Custom,
    Gitlab,
    Proget,
    Dockerhub,
    Ecr,
    Github,
}

impl RegistryType {
    pub const ALL: [RegistryType; 8] = [
        RegistryType::Quay,
        RegistryType::Azure,
        RegistryType::Custom,
        RegistryType::Gitlab,
        RegistryType::Proget,
        RegistryType::Dockerhub,
        RegistryType::Ecr,
        RegistryType::Github,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RegistryType::Quay => "quay",
            RegistryType::Azure => "azure",
            RegistryType::Custom => "custom",
            RegistryType::Gitlab => "gitlab",
            RegistryType::Proget => "proget",
            RegistryType::Dockerhub => "dockerhub",
            RegistryType::Ecr => "ecr",
            RegistryType::Github => "github",
        }
    }
}

impl fmt::Display for RegistryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegistryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        match lowered.as_str() {
            "ghcr" | "ghcr.io" => return Ok(RegistryType::Github),
            "docker" | "docker.io" => return Ok(RegistryType::Dockerhub),
            _ => {}
        }
        RegistryType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == lowered)
            .ok_or_else(|| {
                let known: Vec<&str> = RegistryType::ALL.iter().map(|t| t.as_str()).collect();
                format!("unknown registry type '{}' (expected one of: {})", s, known.join(", "))
            })
    }
}

/// Identifies the registry a call targets. Supplied by the caller and never
/// mutated by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryRef {
    pub id: u32,
    pub registry_type: RegistryType,
}

impl RegistryRef {
    pub fn new(id: u32, registry_type: RegistryType) -> Self {
        Self { id, registry_type }
    }
}

/// Behavioral deviations for one registry type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegistryCapabilities {
    /// Upper bound on concurrent manifest PUT/DELETE calls; `None` means uncapped
    #[serde(default)]
    pub max_write_concurrency: Option<usize>,
    /// Upper bound on concurrent manifest GET calls in batch resolution
    #[serde(default)]
    pub max_read_concurrency: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityPolicy {
    entries: HashMap<RegistryType, RegistryCapabilities>,
}

impl Default for CapabilityPolicy {
    fn default() -> Self {
        Self::empty().with_entry(
            RegistryType::Github,
            RegistryCapabilities {
                max_write_concurrency: Some(1),
                max_read_concurrency: None,
            },
        )
    }
}

impl CapabilityPolicy {
    /// A policy without any vendor deviations
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn with_entry(mut self, registry_type: RegistryType, caps: RegistryCapabilities) -> Self {
        self.entries.insert(registry_type, caps);
        self
    }

    /// Overlay `other` on top of this policy; entries in `other` win.
    pub fn merge(mut self, other: CapabilityPolicy) -> Self {
        self.entries.extend(other.entries);
        self
    }

    pub fn capabilities_for(&self, registry_type: RegistryType) -> RegistryCapabilities {
        self.entries
            .get(&registry_type)
            .copied()
            .unwrap_or_default()
    }

    /// Concurrency step for write batches against `registry_type`
    pub fn concurrency_step_for(&self, registry_type: RegistryType) -> Option<usize> {
        self.capabilities_for(registry_type).max_write_concurrency
    }

    /// Concurrency step for read batches against `registry_type`
    pub fn read_concurrency_step_for(&self, registry_type: RegistryType) -> Option<usize> {
        self.capabilities_for(registry_type).max_read_concurrency
    }
}
