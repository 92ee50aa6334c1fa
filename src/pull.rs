//! Pull planner/executor: walks configured root documents, decides per
//! document whether a fetch is needed, materializes content and attachments,
//! and updates the metadata store.
//!
//! One pass makes exactly one `get_document` call per node it visits. A
//! node is re-materialized when the pass is forced, when no sync record
//! exists for it, or when the remote version differs from the recorded one;
//! otherwise it is reported as skipped. Failures are recorded per node and
//! never abort sibling or unrelated-root processing.

use std::path::{Path, PathBuf};

use chrono::Utc;
use futures::future::{join_all, BoxFuture, FutureExt};
use tracing::{debug, error, info, warn};

use crate::config::{ProjectConfig, TrackedDocument};
use crate::convert;
use crate::error::SyncError;
use crate::gateway::{DocumentGateway, RemoteDocument};
use crate::mapper;
use crate::metadata::{write_atomic, MetadataStore, SyncRecord};

/// Outcome of one document within a pull pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    Created,
    Updated,
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct DocumentOutcome {
    pub remote_id: String,
    /// Unknown when the document could not be fetched at all.
    pub title: Option<String>,
    pub local_path: Option<PathBuf>,
    pub status: SyncStatus,
}

/// Per-document outcomes of one pull pass, in visit order.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub outcomes: Vec<DocumentOutcome>,
}

impl SyncReport {
    pub fn created(&self) -> usize {
        self.count(|s| matches!(s, SyncStatus::Created))
    }

    pub fn updated(&self) -> usize {
        self.count(|s| matches!(s, SyncStatus::Updated))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, SyncStatus::Skipped))
    }

    pub fn failed(&self) -> Vec<&DocumentOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, SyncStatus::Failed(_)))
            .collect()
    }

    /// True when no document in the pass failed.
    pub fn is_clean(&self) -> bool {
        self.failed().is_empty()
    }

    fn count(&self, pred: impl Fn(&SyncStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }
}

/// Runs a pull pass over the project's configured roots.
///
/// `selector` restricts the pass to one named root; `None` visits all of
/// them. An unknown name is a configuration error. Node-level failures end
/// up in the report, not in the returned `Result`.
pub async fn sync<G: DocumentGateway>(
    project: &ProjectConfig,
    selector: Option<&str>,
    force: bool,
    gateway: &G,
    store: &mut MetadataStore,
) -> Result<SyncReport, SyncError> {
    let roots: Vec<&TrackedDocument> = match selector {
        Some(name) => vec![project.find_page(name).ok_or_else(|| {
            SyncError::Configuration(format!("no tracked document named '{name}'"))
        })?],
        None => project.pages.iter().collect(),
    };

    let mut report = SyncReport::default();
    for page in roots {
        let remote_id = match page.remote_id() {
            Ok(id) => id,
            Err(e) => {
                error!(name = %page.name, error = %e, "Tracked document is misconfigured");
                report.outcomes.push(DocumentOutcome {
                    remote_id: page.name.clone(),
                    title: None,
                    local_path: None,
                    status: SyncStatus::Failed(e.to_string()),
                });
                continue;
            }
        };
        let dest = project.root_dir.join(page.relative_path());
        info!(name = %page.name, remote_id = %remote_id, force, "Syncing tracked document");

        match gateway.get_document(&remote_id).await {
            Ok(doc) => {
                descend(
                    gateway,
                    store,
                    doc,
                    dest,
                    page.sync_children,
                    page.sync_attachments,
                    force,
                    &mut report,
                )
                .await;
            }
            Err(e) => {
                error!(remote_id = %remote_id, error = %e, "Failed to fetch root document");
                report.outcomes.push(DocumentOutcome {
                    remote_id,
                    title: None,
                    local_path: Some(dest),
                    status: SyncStatus::Failed(e.to_string()),
                });
            }
        }
    }

    info!(
        created = report.created(),
        updated = report.updated(),
        skipped = report.skipped(),
        failed = report.failed().len(),
        "Pull pass finished"
    );
    Ok(report)
}

/// Materializes `doc` at `path`, then walks its children. Children inherit
/// the root's `sync_children`/`sync_attachments` settings for the whole
/// subtree. The child paths depend on this node's path, so children are
/// only visited once it is known; each child is fetched exactly once here
/// and the fetched node is handed down the recursion.
#[allow(clippy::too_many_arguments)]
fn descend<'a, G: DocumentGateway>(
    gateway: &'a G,
    store: &'a mut MetadataStore,
    doc: RemoteDocument,
    path: PathBuf,
    sync_children: bool,
    sync_attachments: bool,
    force: bool,
    report: &'a mut SyncReport,
) -> BoxFuture<'a, ()> {
    async move {
        let status = materialize(gateway, store, &doc, &path, sync_attachments, force).await;
        let failed = matches!(status, SyncStatus::Failed(_));
        report.outcomes.push(DocumentOutcome {
            remote_id: doc.id.clone(),
            title: Some(doc.title.clone()),
            local_path: Some(path.clone()),
            status,
        });
        // A materialization failure does not stop the subtree walk; the
        // child paths only depend on this node's computed path.
        if failed {
            warn!(remote_id = %doc.id, "Continuing subtree despite node failure");
        }

        if !sync_children || doc.child_ids.is_empty() {
            return;
        }

        let children_dir = mapper::children_dir(&path);
        let mut fetched: Vec<RemoteDocument> = Vec::new();
        for child_id in &doc.child_ids {
            match gateway.get_document(child_id).await {
                Ok(child) => fetched.push(child),
                Err(e) => {
                    warn!(remote_id = %child_id, error = %e, "Failed to fetch child document");
                    report.outcomes.push(DocumentOutcome {
                        remote_id: child_id.clone(),
                        title: None,
                        local_path: None,
                        status: SyncStatus::Failed(e.to_string()),
                    });
                }
            }
        }

        let keys: Vec<(String, String)> = fetched
            .iter()
            .map(|d| (d.id.clone(), d.title.clone()))
            .collect();
        let paths = mapper::sibling_paths(&children_dir, &keys);
        for (child, child_path) in fetched.into_iter().zip(paths) {
            descend(
                gateway,
                store,
                child,
                child_path,
                sync_children,
                sync_attachments,
                force,
                report,
            )
            .await;
        }
    }
    .boxed()
}

/// Writes one document (and optionally its attachments) to disk and
/// upserts its sync record. Returns the outcome status; a local write
/// failure leaves the sync record untouched so the next pass retries.
async fn materialize<G: DocumentGateway>(
    gateway: &G,
    store: &mut MetadataStore,
    doc: &RemoteDocument,
    path: &Path,
    sync_attachments: bool,
    force: bool,
) -> SyncStatus {
    let previous = store.get(&doc.id).cloned();
    if let Some(prev) = &previous {
        if !force && prev.version == doc.version {
            debug!(remote_id = %doc.id, version = doc.version, "Version unchanged, skipping");
            return SyncStatus::Skipped;
        }
    }

    let markdown = render_markdown(doc);
    if let Err(e) = write_atomic(path, markdown.as_bytes()) {
        error!(remote_id = %doc.id, path = %path.display(), error = %e, "Failed to write document");
        return SyncStatus::Failed(e.to_string());
    }
    info!(
        remote_id = %doc.id,
        version = doc.version,
        path = %path.display(),
        "Materialized document"
    );

    if sync_attachments && !doc.attachments.is_empty() {
        download_attachments(gateway, doc, path).await;
    }

    let record = SyncRecord {
        title: doc.title.clone(),
        version: doc.version,
        synced_at: Utc::now().to_rfc3339(),
        local_path: path.to_path_buf(),
    };
    if let Err(e) = store.upsert(&doc.id, record) {
        error!(remote_id = %doc.id, error = %e, "Failed to persist sync record");
        return SyncStatus::Failed(e.to_string());
    }

    match previous {
        Some(_) => SyncStatus::Updated,
        None => SyncStatus::Created,
    }
}

/// Downloads all attachments concurrently into `assets/` next to the
/// document file, each named `<page-id>-<filename>`. Attachment failures
/// are logged and do not fail the owning document.
async fn download_attachments<G: DocumentGateway>(
    gateway: &G,
    doc: &RemoteDocument,
    doc_path: &Path,
) {
    let assets_dir = doc_path.parent().unwrap_or(Path::new(".")).join("assets");
    let fetches = doc.attachments.iter().map(|att| async move {
        (att, gateway.get_attachment(&doc.id, att).await)
    });
    for (att, result) in join_all(fetches).await {
        match result {
            Ok(bytes) => {
                let dest = assets_dir.join(format!("{}-{}", doc.id, att.filename));
                match write_atomic(&dest, &bytes) {
                    Ok(()) => debug!(path = %dest.display(), "Materialized attachment"),
                    Err(e) => {
                        warn!(attachment = %att.filename, error = %e, "Failed to write attachment")
                    }
                }
            }
            Err(e) => {
                warn!(attachment = %att.filename, error = %e, "Failed to download attachment")
            }
        }
    }
}

fn render_markdown(doc: &RemoteDocument) -> String {
    let body = convert::storage_to_markdown(&doc.content);
    let body = convert::rewrite_image_refs(&body, &doc.id);
    format!("# {}\n\n{}\n", doc.title, body)
}
