//! Capability interface to the remote document store, plus the concrete
//! Confluence REST implementation.
//!
//! The engine only ever talks to [`DocumentGateway`]; credentials and
//! transport live entirely in [`ConfluenceGateway`]. The trait is annotated
//! for `mockall` so the engine can be driven by a deterministic fake in
//! tests.

use async_trait::async_trait;
use mockall::automock;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::SyncError;

/// A remote document as fetched in one gateway call: metadata, body,
/// ordered child ids and attachment descriptors.
#[derive(Debug, Clone)]
pub struct RemoteDocument {
    pub id: String,
    pub title: String,
    pub version: i64,
    /// Body in Confluence storage format (an HTML dialect).
    pub content: String,
    pub child_ids: Vec<String>,
    pub attachments: Vec<AttachmentRef>,
}

/// Descriptor for one attachment of a remote document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRef {
    pub id: String,
    pub filename: String,
    /// Download link as returned by the API, usually relative to the base URL.
    pub download_path: String,
}

/// Consumed capability: fetch documents and attachments, update content.
///
/// Implemented by [`ConfluenceGateway`] for production and by the generated
/// `MockDocumentGateway` in tests.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait DocumentGateway: Send + Sync {
    /// Fetch a document with its body, version, child ids and attachment
    /// list. Fails with `NotFound` or `Transport`.
    async fn get_document(&self, id: &str) -> Result<RemoteDocument, SyncError>;

    /// Replace a document's storage body on top of `base_version`, returning
    /// the server-assigned new version. Fails with `AccessDenied`,
    /// `VersionConflict` or `Transport`.
    async fn update_document(
        &self,
        id: &str,
        title: &str,
        storage_body: &str,
        base_version: i64,
    ) -> Result<i64, SyncError>;

    /// Download one attachment's raw bytes.
    async fn get_attachment(
        &self,
        document_id: &str,
        attachment: &AttachmentRef,
    ) -> Result<Vec<u8>, SyncError>;
}

const PAGE_LIMIT: usize = 50;

/// Confluence REST client: basic auth, JSON over `reqwest`, paginated
/// child and attachment listings.
#[derive(Debug)]
pub struct ConfluenceGateway {
    http: reqwest::Client,
    base_url: String,
    email: String,
    api_token: String,
}

impl ConfluenceGateway {
    pub fn new(base_url: &str, email: &str, api_token: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            email: email.to_string(),
            api_token: api_token.to_string(),
        }
    }

    /// Builds a gateway from `CONFLUENCE_BASE_URL`, `CONFLUENCE_API_EMAIL`
    /// and `CONFLUENCE_API_TOKEN`, loading `.env` first if present.
    pub fn new_from_env() -> Result<Self, SyncError> {
        dotenvy::dotenv().ok();
        let mut missing = Vec::new();
        let mut var = |name: &'static str| match std::env::var(name) {
            Ok(v) if !v.is_empty() => Some(v),
            _ => {
                missing.push(name);
                None
            }
        };
        let base_url = var("CONFLUENCE_BASE_URL");
        let email = var("CONFLUENCE_API_EMAIL");
        let api_token = var("CONFLUENCE_API_TOKEN");
        match (base_url, email, api_token) {
            (Some(b), Some(e), Some(t)) => Ok(Self::new(&b, &e, &t)),
            _ => Err(SyncError::Configuration(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            ))),
        }
    }

    async fn get_checked(&self, url: &str) -> Result<reqwest::Response, SyncError> {
        let resp = self
            .http
            .get(url)
            .basic_auth(&self.email, Some(&self.api_token))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| SyncError::Transport(format!("GET {url}: {e}")))?;
        check_status(resp, url).await
    }

    async fn fetch_page(&self, id: &str) -> Result<PageResponse, SyncError> {
        let url = format!(
            "{}/rest/api/content/{}?expand=body.storage,version",
            self.base_url, id
        );
        debug!(url = %url, "Fetching page");
        self.get_checked(&url)
            .await?
            .json()
            .await
            .map_err(|e| SyncError::Transport(format!("decoding page {id}: {e}")))
    }

    async fn list_child_ids(&self, id: &str) -> Result<Vec<String>, SyncError> {
        let mut ids = Vec::new();
        let mut start = 0;
        loop {
            let url = format!(
                "{}/rest/api/content/{}/child/page?start={}&limit={}",
                self.base_url, id, start, PAGE_LIMIT
            );
            let page: Paged<ChildPage> = self
                .get_checked(&url)
                .await?
                .json()
                .await
                .map_err(|e| SyncError::Transport(format!("decoding children of {id}: {e}")))?;
            let batch = page.results.len();
            ids.extend(page.results.into_iter().map(|c| c.id));
            if batch < PAGE_LIMIT {
                return Ok(ids);
            }
            start += PAGE_LIMIT;
        }
    }

    async fn list_attachments(&self, id: &str) -> Result<Vec<AttachmentRef>, SyncError> {
        let mut attachments = Vec::new();
        let mut start = 0;
        loop {
            let url = format!(
                "{}/rest/api/content/{}/child/attachment?start={}&limit={}",
                self.base_url, id, start, PAGE_LIMIT
            );
            let page: Paged<AttachmentResponse> =
                self.get_checked(&url).await?.json().await.map_err(|e| {
                    SyncError::Transport(format!("decoding attachments of {id}: {e}"))
                })?;
            let batch = page.results.len();
            attachments.extend(page.results.into_iter().filter_map(AttachmentResponse::into_ref));
            if batch < PAGE_LIMIT {
                return Ok(attachments);
            }
            start += PAGE_LIMIT;
        }
    }
}

#[async_trait]
impl DocumentGateway for ConfluenceGateway {
    async fn get_document(&self, id: &str) -> Result<RemoteDocument, SyncError> {
        let page = self.fetch_page(id).await?;
        let child_ids = self.list_child_ids(id).await?;
        let attachments = self.list_attachments(id).await?;
        debug!(
            id = %id,
            version = page.version.number,
            children = child_ids.len(),
            attachments = attachments.len(),
            "Fetched document"
        );
        Ok(RemoteDocument {
            id: page.id,
            title: page.title,
            version: page.version.number,
            content: page
                .body
                .and_then(|b| b.storage)
                .map(|s| s.value)
                .unwrap_or_default(),
            child_ids,
            attachments,
        })
    }

    async fn update_document(
        &self,
        id: &str,
        title: &str,
        storage_body: &str,
        base_version: i64,
    ) -> Result<i64, SyncError> {
        let url = format!("{}/rest/api/content/{}", self.base_url, id);
        let payload = serde_json::json!({
            "id": id,
            "type": "page",
            "title": title,
            "version": { "number": base_version + 1 },
            "body": {
                "storage": {
                    "value": storage_body,
                    "representation": "storage",
                }
            }
        });
        let resp = self
            .http
            .put(&url)
            .basic_auth(&self.email, Some(&self.api_token))
            .json(&payload)
            .send()
            .await
            .map_err(|e| SyncError::Transport(format!("PUT {url}: {e}")))?;
        let updated: PageResponse = check_status(resp, &url)
            .await?
            .json()
            .await
            .map_err(|e| SyncError::Transport(format!("decoding update response for {id}: {e}")))?;
        info!(id = %id, new_version = updated.version.number, "Updated remote document");
        Ok(updated.version.number)
    }

    async fn get_attachment(
        &self,
        document_id: &str,
        attachment: &AttachmentRef,
    ) -> Result<Vec<u8>, SyncError> {
        let url = if attachment.download_path.starts_with('/') {
            format!("{}{}", self.base_url, attachment.download_path)
        } else {
            attachment.download_path.clone()
        };
        debug!(document = %document_id, attachment = %attachment.filename, "Downloading attachment");
        let resp = self
            .http
            .get(&url)
            .basic_auth(&self.email, Some(&self.api_token))
            .send()
            .await
            .map_err(|e| SyncError::Transport(format!("GET {url}: {e}")))?;
        let resp = check_status(resp, &url).await?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| SyncError::Transport(format!("reading attachment body: {e}")))?;
        Ok(bytes.to_vec())
    }
}

async fn check_status(resp: reqwest::Response, url: &str) -> Result<reqwest::Response, SyncError> {
    use reqwest::StatusCode;
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(500).collect();
    Err(match status {
        StatusCode::NOT_FOUND => SyncError::NotFound(format!("{url}: {snippet}")),
        StatusCode::FORBIDDEN => SyncError::AccessDenied(format!("{url}: {snippet}")),
        StatusCode::CONFLICT => SyncError::VersionConflict(format!("{url}: {snippet}")),
        StatusCode::UNAUTHORIZED => SyncError::Transport(format!(
            "{url}: authentication failed, check CONFLUENCE_API_EMAIL and CONFLUENCE_API_TOKEN"
        )),
        other => SyncError::Transport(format!("{url}: HTTP {other}: {snippet}")),
    })
}

#[derive(Debug, Deserialize)]
struct PageResponse {
    id: String,
    title: String,
    version: VersionField,
    #[serde(default)]
    body: Option<BodyField>,
}

#[derive(Debug, Deserialize)]
struct VersionField {
    number: i64,
}

#[derive(Debug, Deserialize)]
struct BodyField {
    #[serde(default)]
    storage: Option<StorageField>,
}

#[derive(Debug, Deserialize)]
struct StorageField {
    value: String,
}

#[derive(Debug, Deserialize)]
struct Paged<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ChildPage {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AttachmentResponse {
    id: String,
    title: String,
    #[serde(rename = "_links", default)]
    links: Option<AttachmentLinks>,
}

#[derive(Debug, Deserialize, Default)]
struct AttachmentLinks {
    #[serde(default)]
    download: Option<String>,
}

impl AttachmentResponse {
    /// Attachments without a download link are skipped, as in the original
    /// mirror this replaces.
    fn into_ref(self) -> Option<AttachmentRef> {
        let download_path = self.links.and_then(|l| l.download)?;
        Some(AttachmentRef {
            id: self.id,
            filename: self.title,
            download_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_response_parses_body_and_version() {
        let raw = r#"{
            "id": "12345",
            "title": "Team Handbook",
            "version": { "number": 7, "when": "2024-05-01T12:00:00.000Z" },
            "body": { "storage": { "value": "<p>hello</p>", "representation": "storage" } }
        }"#;
        let page: PageResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(page.id, "12345");
        assert_eq!(page.version.number, 7);
        assert_eq!(page.body.unwrap().storage.unwrap().value, "<p>hello</p>");
    }

    #[test]
    fn page_response_tolerates_missing_body() {
        let raw = r#"{ "id": "1", "title": "T", "version": { "number": 1 } }"#;
        let page: PageResponse = serde_json::from_str(raw).unwrap();
        assert!(page.body.is_none());
    }

    #[test]
    fn paged_children_parse() {
        let raw = r#"{ "results": [ { "id": "10", "title": "A" }, { "id": "11" } ], "size": 2 }"#;
        let page: Paged<ChildPage> = serde_json::from_str(raw).unwrap();
        let ids: Vec<_> = page.results.into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["10", "11"]);
    }

    #[test]
    fn attachment_without_download_link_is_skipped() {
        let raw = r#"{ "results": [
            { "id": "att1", "title": "diagram.png", "_links": { "download": "/download/att1" } },
            { "id": "att2", "title": "broken.bin" }
        ] }"#;
        let page: Paged<AttachmentResponse> = serde_json::from_str(raw).unwrap();
        let refs: Vec<_> = page
            .results
            .into_iter()
            .filter_map(AttachmentResponse::into_ref)
            .collect();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].filename, "diagram.png");
        assert_eq!(refs[0].download_path, "/download/att1");
    }

    #[test]
    fn missing_env_lists_variable_names() {
        // Only meaningful when the variables are absent, which is the
        // normal state for unit test runs.
        std::env::remove_var("CONFLUENCE_BASE_URL");
        std::env::remove_var("CONFLUENCE_API_EMAIL");
        std::env::remove_var("CONFLUENCE_API_TOKEN");
        let err = ConfluenceGateway::new_from_env().unwrap_err();
        assert!(err.to_string().contains("CONFLUENCE_BASE_URL"));
    }
}
