//! Transport API for the Docker Registry HTTP API v2
//!
//! [`RegistryTransport`] is the only place the engine touches the network. The
//! standard implementation talks to a V2 endpoint over `reqwest`; tests plug in
//! in-memory registries.

use crate::config::RegistryConfig;
use crate::error::handlers::{HttpErrorHandler, NetworkErrorHandler};
use crate::error::{RegistryError, Result};
use crate::logging::Logger;
use crate::registry::manifest::{ManifestResponse, ManifestSchema};
use crate::registry::pagination::{Cursor, Page};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, LINK};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// Registry operations the engine relies on
#[async_trait]
pub trait RegistryTransport: Send + Sync {
    /// One page of `GET /v2/_catalog`
    async fn list_catalog(&self, request: &ListRequest) -> Result<Page<String>>;

    /// One page of `GET /v2/<repository>/tags/list`
    async fn list_tags(&self, repository: &str, request: &ListRequest) -> Result<Page<String>>;

    /// `GET /v2/<repository>/manifests/<reference>` for one schema
    async fn get_manifest(&self, request: &ManifestRequest) -> Result<ManifestResponse>;

    /// `PUT /v2/<repository>/manifests/<reference>`
    async fn put_manifest(&self, request: &ManifestPutRequest) -> Result<()>;

    /// `DELETE /v2/<repository>/manifests/<digest>`
    async fn delete_manifest(&self, request: &DeleteRequest) -> Result<()>;
}

/// Paging parameters for a listing call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListRequest {
    pub cursor: Option<Cursor>,
    /// Page size for the first request; later requests reuse the cursor's `n`
    pub page_size: Option<u32>,
}

impl ListRequest {
    pub fn new(cursor: Option<Cursor>, page_size: Option<u32>) -> Self {
        Self { cursor, page_size }
    }

    fn query(&self) -> Vec<(&'static str, String)> {
        match &self.cursor {
            Some(cursor) => vec![("n", cursor.n.to_string()), ("last", cursor.last.clone())],
            None => self
                .page_size
                .map(|n| vec![("n", n.to_string())])
                .unwrap_or_default(),
        }
    }
}

/// Manifest request parameters
#[derive(Debug, Clone)]
pub struct ManifestRequest {
    pub repository: String,
    /// tag or digest
    pub reference: String,
    pub schema: ManifestSchema,
}

/// Manifest upload request
#[derive(Debug, Clone)]
pub struct ManifestPutRequest {
    pub repository: String,
    pub reference: String,
    pub data: Vec<u8>,
    pub content_type: String,
}

/// Manifest delete request
#[derive(Debug, Clone)]
pub struct DeleteRequest {
    pub repository: String,
    pub digest: String,
}

#[derive(Debug, Deserialize)]
struct CatalogResponse {
    #[serde(default)]
    repositories: Option<Vec<String>>,
    #[serde(default)]
    last: Option<String>,
    #[serde(default)]
    n: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TagListResponse {
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    last: Option<String>,
    #[serde(default)]
    n: Option<u32>,
}

/// Standard registry transport implementation
#[derive(Clone)]
pub struct HttpRegistryTransport {
    client: Client,
    address: String,
    token: Option<String>,
    logger: Logger,
}

impl HttpRegistryTransport {
    pub fn new(config: &RegistryConfig, logger: Logger) -> Result<Self> {
        let mut builder = Client::builder().timeout(Duration::from_secs(config.timeout));
        if config.skip_tls {
            builder = builder
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true);
        }
        let client = builder
            .build()
            .map_err(|e| RegistryError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            address: config.address.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            logger,
        })
    }

    fn url(&self, path: &str, query: &[(&'static str, String)]) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/v2/{}", self.address, path))?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url)
    }

    /// Attach auth, send, and turn non-success statuses into errors
    async fn send(&self, request: RequestBuilder, operation: &str) -> Result<Response> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request
            .send()
            .await
            .map_err(|e| NetworkErrorHandler::handle_network_error(&e, operation))?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error response".to_string());
        Err(HttpErrorHandler::handle_registry_error(status, &error_text, operation))
    }

    fn link_cursor(response: &Response) -> Option<Cursor> {
        response
            .headers()
            .get(LINK)
            .and_then(|h| h.to_str().ok())
            .and_then(Cursor::from_link_header)
    }
}

#[async_trait]
impl RegistryTransport for HttpRegistryTransport {
    async fn list_catalog(&self, request: &ListRequest) -> Result<Page<String>> {
        let url = self.url("_catalog", &request.query())?;
        self.logger.trace(&format!("GET {}", url));

        let response = self.send(self.client.get(url), "catalog listing").await?;
        let link = Self::link_cursor(&response);
        let body: CatalogResponse = response
            .json()
            .await
            .map_err(|e| RegistryError::Parse(format!("Failed to parse catalog response: {}", e)))?;

        let next = Cursor::from_parts(body.last, body.n).or(link);
        Ok(Page::new(body.repositories.unwrap_or_default(), next))
    }

    async fn list_tags(&self, repository: &str, request: &ListRequest) -> Result<Page<String>> {
        let url = self.url(&format!("{}/tags/list", repository), &request.query())?;
        self.logger.trace(&format!("GET {}", url));

        let response = self.send(self.client.get(url), "tag listing").await?;
        let link = Self::link_cursor(&response);
        let body: TagListResponse = response
            .json()
            .await
            .map_err(|e| RegistryError::Parse(format!("Failed to parse tags response: {}", e)))?;

        let next = Cursor::from_parts(body.last, body.n).or(link);
        Ok(Page::new(body.tags.unwrap_or_default(), next))
    }

    async fn get_manifest(&self, request: &ManifestRequest) -> Result<ManifestResponse> {
        let url = self.url(
            &format!("{}/manifests/{}", request.repository, request.reference),
            &[],
        )?;
        self.logger.trace(&format!("GET {} ({:?})", url, request.schema));

        let response = self
            .send(
                self.client
                    .get(url)
                    .header(ACCEPT, request.schema.accept_header()),
                "manifest pull",
            )
            .await?;

        let digest = response
            .headers()
            .get("docker-content-digest")
            .and_then(|h| h.to_str().ok())
            .map(|s| s.to_string());
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|h| h.to_str().ok())
            .map(|s| s.to_string());

        let body = response
            .bytes()
            .await
            .map_err(|e| RegistryError::Network(format!("Failed to read manifest data: {}", e)))?
            .to_vec();

        Ok(ManifestResponse {
            body,
            digest,
            content_type,
        })
    }

    async fn put_manifest(&self, request: &ManifestPutRequest) -> Result<()> {
        let url = self.url(
            &format!("{}/manifests/{}", request.repository, request.reference),
            &[],
        )?;
        self.logger.trace(&format!("PUT {}", url));

        self.send(
            self.client
                .put(url)
                .header(CONTENT_TYPE, request.content_type.as_str())
                .body(request.data.clone()),
            "manifest upload",
        )
        .await?;

        self.logger.verbose(&format!(
            "Manifest uploaded for {}:{}",
            request.repository, request.reference
        ));
        Ok(())
    }

    async fn delete_manifest(&self, request: &DeleteRequest) -> Result<()> {
        let url = self.url(
            &format!("{}/manifests/{}", request.repository, request.digest),
            &[],
        )?;
        self.logger.trace(&format!("DELETE {}", url));

        self.send(self.client.delete(url), "manifest deletion").await?;

        self.logger.verbose(&format!(
            "Manifest {} deleted from {}",
            request.digest, request.repository
        ));
        Ok(())
    }
}
