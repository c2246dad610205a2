//! Standardized error handling for registry HTTP responses

use crate::error::{RegistryError, Result};
use reqwest::StatusCode;

/// Standard error handler for HTTP responses
pub struct HttpErrorHandler;

impl HttpErrorHandler {
    /// Handle registry-related HTTP errors.
    ///
    /// 404 becomes [`RegistryError::NotFound`] so callers can special-case
    /// missing repositories and manifests; everything else is a
    /// [`RegistryError::Registry`].
    pub fn handle_registry_error(
        status: StatusCode,
        error_text: &str,
        operation: &str,
    ) -> RegistryError {
        let error_text = error_text.trim();
        match status.as_u16() {
            404 => RegistryError::NotFound(format!("{}: {}", operation, error_text)),
            code => {
                let error_msg = match code {
                    400 => format!("Bad request during {}: {}", operation, error_text),
                    401 => format!(
                        "Unauthorized to perform {} operation: {}",
                        operation, error_text
                    ),
                    403 => format!(
                        "Forbidden: insufficient permissions for {}: {}",
                        operation, error_text
                    ),
                    405 => format!(
                        "Operation not supported by registry during {}: {}",
                        operation, error_text
                    ),
                    409 => format!("Conflict during {}: {}", operation, error_text),
                    429 => format!("Rate limited during {}: {}", operation, error_text),
                    500 => format!("Registry server error during {}: {}", operation, error_text),
                    502 | 503 => format!("Registry unavailable for {}: {}", operation, error_text),
                    _ => format!("{} failed (status {}): {}", operation, status, error_text),
                };
                RegistryError::Registry(error_msg)
            }
        }
    }
}

/// Network error categorization and handling
pub struct NetworkErrorHandler;

impl NetworkErrorHandler {
    /// Categorize and format network errors with helpful context
    pub fn handle_network_error(error: &reqwest::Error, context: &str) -> RegistryError {
        if error.is_timeout() {
            RegistryError::Network(format!("{} timed out: {}", context, error))
        } else if error.is_connect() {
            RegistryError::Network(format!("Connection error during {}: {}", context, error))
        } else if error.to_string().contains("certificate") {
            RegistryError::Network(format!(
                "TLS certificate error during {}: {}",
                context, error
            ))
        } else {
            RegistryError::Network(format!("{} network error: {}", context, error))
        }
    }
}

/// Validation error utilities
pub struct ValidationErrorHandler;

impl ValidationErrorHandler {
    /// Registry base address must carry a scheme
    pub fn validate_address(address: &str) -> Result<()> {
        if address.is_empty() {
            return Err(RegistryError::Validation(
                "Registry address cannot be empty".to_string(),
            ));
        }

        if !address.starts_with("http://") && !address.starts_with("https://") {
            return Err(RegistryError::Validation(format!(
                "Invalid registry address: {}. Must start with http:// or https://",
                address
            )));
        }

        Ok(())
    }

    pub fn validate_repository(repository: &str) -> Result<()> {
        if repository.is_empty() {
            return Err(RegistryError::Validation(
                "Repository name cannot be empty".to_string(),
            ));
        }

        if repository.starts_with('/') || repository.ends_with('/') || repository.contains("//") {
            return Err(RegistryError::Validation(format!(
                "Invalid repository name: {}",
                repository
            )));
        }

        Ok(())
    }

    /// Tag grammar of the registry API: `[\w][\w.-]{0,127}`
    pub fn validate_tag(tag: &str) -> Result<()> {
        let mut chars = tag.chars();
        let valid_first = chars
            .next()
            .map(|c| c.is_ascii_alphanumeric() || c == '_')
            .unwrap_or(false);
        let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));

        if !valid_first || !valid_rest || tag.len() > 128 {
            return Err(RegistryError::Validation(format!("Invalid tag name: {:?}", tag)));
        }

        Ok(())
    }

    pub fn validate_timeout(timeout: u64) -> Result<()> {
        if timeout == 0 {
            return Err(RegistryError::Validation(
                "Timeout must be greater than 0".to_string(),
            ));
        }

        if timeout > 86400 {
            return Err(RegistryError::Validation(
                "Timeout cannot exceed 24 hours (86400 seconds)".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_mapping() {
        let err = HttpErrorHandler::handle_registry_error(
            StatusCode::NOT_FOUND,
            "{\"errors\":[{\"code\":\"NAME_UNKNOWN\"}]}",
            "tag listing",
        );
        assert!(err.is_not_found());

        let err = HttpErrorHandler::handle_registry_error(
            StatusCode::UNAUTHORIZED,
            "",
            "tag listing",
        );
        assert!(matches!(err, RegistryError::Registry(msg) if msg.starts_with("Unauthorized")));
    }

    #[test]
    fn test_validate_tag() {
        assert!(ValidationErrorHandler::validate_tag("latest").is_ok());
        assert!(ValidationErrorHandler::validate_tag("v1.2.3-rc_1").is_ok());
        assert!(ValidationErrorHandler::validate_tag("").is_err());
        assert!(ValidationErrorHandler::validate_tag(".hidden").is_err());
        assert!(ValidationErrorHandler::validate_tag("a/b").is_err());
        assert!(ValidationErrorHandler::validate_tag(&"a".repeat(129)).is_err());
    }

    #[test]
    fn test_validate_repository() {
        assert!(ValidationErrorHandler::validate_repository("library/nginx").is_ok());
        assert!(ValidationErrorHandler::validate_repository("").is_err());
        assert!(ValidationErrorHandler::validate_repository("/nginx").is_err());
        assert!(ValidationErrorHandler::validate_repository("a//b").is_err());
    }

    #[test]
    fn test_validate_address() {
        assert!(ValidationErrorHandler::validate_address("https://ghcr.io").is_ok());
        assert!(ValidationErrorHandler::validate_address("ghcr.io").is_err());
    }
}
