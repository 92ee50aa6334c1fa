use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::SyncError;
use crate::mapper;
use crate::metadata::METADATA_FILE;

/// One project's configuration: a root directory for the local mirror and
/// an ordered list of tracked root documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub root_dir: PathBuf,
    #[serde(default)]
    pub pages: Vec<TrackedDocument>,
}

impl ProjectConfig {
    pub fn trace_loaded(&self) {
        info!(
            root_dir = %self.root_dir.display(),
            pages = self.pages.len(),
            "Loaded project config"
        );
    }

    /// Path of the persisted metadata store for this project.
    pub fn metadata_path(&self) -> PathBuf {
        self.root_dir.join(METADATA_FILE)
    }

    pub fn find_page(&self, name: &str) -> Option<&TrackedDocument> {
        self.pages.iter().find(|p| p.name == name)
    }
}

/// Per-document policy gating whether local edits may be pushed upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessMode {
    #[default]
    ReadOnly,
    ReadWrite,
}

/// A configured root document. The remote id comes either from `page_id`
/// directly or is extracted from a pasted Confluence `url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedDocument {
    pub name: String,
    #[serde(default)]
    pub page_id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub local_path: Option<PathBuf>,
    #[serde(default)]
    pub access: AccessMode,
    #[serde(default = "default_true")]
    pub sync_children: bool,
    #[serde(default = "default_true")]
    pub sync_attachments: bool,
}

fn default_true() -> bool {
    true
}

impl TrackedDocument {
    /// Resolves the remote id from `page_id` or `url`.
    pub fn remote_id(&self) -> Result<String, SyncError> {
        if let Some(id) = &self.page_id {
            return Ok(id.clone());
        }
        if let Some(url) = &self.url {
            return extract_page_id(url).ok_or_else(|| {
                SyncError::Configuration(format!(
                    "could not extract a page id from url '{url}' for '{}'",
                    self.name
                ))
            });
        }
        Err(SyncError::Configuration(format!(
            "tracked document '{}' has neither page_id nor url",
            self.name
        )))
    }

    /// Path of the materialized root file, relative to the project root.
    pub fn relative_path(&self) -> PathBuf {
        self.local_path.clone().unwrap_or_else(|| {
            PathBuf::from(format!("confluence/{}.md", mapper::slugify(&self.name)))
        })
    }
}

/// Extracts a page id from the two URL shapes Confluence produces:
/// `.../pages/<id>[/Title]` and `...?pageId=<id>`.
fn extract_page_id(url: &str) -> Option<String> {
    static PAGES: OnceLock<Regex> = OnceLock::new();
    static QUERY: OnceLock<Regex> = OnceLock::new();
    let pages = PAGES.get_or_init(|| Regex::new(r"/pages/(\d+)").expect("valid regex"));
    let query = QUERY.get_or_init(|| Regex::new(r"[?&]pageId=(\d+)").expect("valid regex"));

    pages
        .captures(url)
        .or_else(|| query.captures(url))
        .map(|caps| caps[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracked(page_id: Option<&str>, url: Option<&str>) -> TrackedDocument {
        TrackedDocument {
            name: "handbook".to_string(),
            page_id: page_id.map(str::to_string),
            url: url.map(str::to_string),
            local_path: None,
            access: AccessMode::default(),
            sync_children: true,
            sync_attachments: true,
        }
    }

    #[test]
    fn remote_id_prefers_explicit_page_id() {
        let doc = tracked(Some("42"), Some("https://x.example/pages/99"));
        assert_eq!(doc.remote_id().unwrap(), "42");
    }

    #[test]
    fn remote_id_from_pages_url() {
        let doc = tracked(
            None,
            Some("https://acme.atlassian.net/wiki/spaces/AC/pages/12345678/Team+Handbook"),
        );
        assert_eq!(doc.remote_id().unwrap(), "12345678");
    }

    #[test]
    fn remote_id_from_page_id_query() {
        let doc = tracked(None, Some("https://acme.example/viewpage.action?pageId=777"));
        assert_eq!(doc.remote_id().unwrap(), "777");
    }

    #[test]
    fn missing_id_and_url_is_a_configuration_error() {
        let err = tracked(None, None).remote_id().unwrap_err();
        assert!(matches!(err, SyncError::Configuration(_)));
    }

    #[test]
    fn unparseable_url_is_a_configuration_error() {
        let err = tracked(None, Some("https://acme.example/wiki/home"))
            .remote_id()
            .unwrap_err();
        assert!(matches!(err, SyncError::Configuration(_)));
    }

    #[test]
    fn default_local_path_derives_from_name() {
        let doc = tracked(Some("1"), None);
        assert_eq!(
            doc.relative_path(),
            PathBuf::from("confluence/handbook.md")
        );
    }
}
