//! Error types and handlers for registry operations

pub mod handlers;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RegistryError>;

#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// Network related errors
    #[error("Network error: {0}")]
    Network(String),
    /// Registry answered with a non-success status
    #[error("Registry error: {0}")]
    Registry(String),
    /// Registry answered 404
    #[error("Not found: {0}")]
    NotFound(String),
    /// Parse errors
    #[error("Parse error: {0}")]
    Parse(String),
    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// File IO errors
    #[error("IO error: {0}")]
    Io(String),
    /// A paginated listing could not be walked to completion
    #[error("failed to list {resource} (page {page}): {source}")]
    PageFetch {
        resource: String,
        page: usize,
        #[source]
        source: Box<RegistryError>,
    },
    /// Neither manifest schema could be fetched for a tag
    #[error("unable to retrieve tag `{tag}`: {source}")]
    ManifestResolution {
        tag: String,
        #[source]
        source: Box<RegistryError>,
    },
    /// A single batch item failed
    #[error("{operation} failed for `{item}`: {source}")]
    ItemOperation {
        operation: String,
        item: String,
        #[source]
        source: Box<RegistryError>,
    },
}

impl RegistryError {
    pub fn page_fetch(resource: &str, page: usize, source: RegistryError) -> Self {
        RegistryError::PageFetch {
            resource: resource.to_string(),
            page,
            source: Box::new(source),
        }
    }

    pub fn manifest_resolution(tag: &str, source: RegistryError) -> Self {
        RegistryError::ManifestResolution {
            tag: tag.to_string(),
            source: Box::new(source),
        }
    }

    pub fn item_operation(operation: &str, item: &str, source: RegistryError) -> Self {
        RegistryError::ItemOperation {
            operation: operation.to_string(),
            item: item.to_string(),
            source: Box::new(source),
        }
    }

    /// True when the registry reported the resource as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::NotFound(_))
    }
}

impl From<std::io::Error> for RegistryError {
    fn from(err: std::io::Error) -> Self {
        RegistryError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        RegistryError::Parse(err.to_string())
    }
}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        RegistryError::Network(err.to_string())
    }
}

impl From<url::ParseError> for RegistryError {
    fn from(err: url::ParseError) -> Self {
        RegistryError::Validation(err.to_string())
    }
}
