//! Push reconciler: applies a local markdown edit to the remote document,
//! then re-pulls that subtree so the local mirror reflects what the server
//! actually stored, never the locally-pushed bytes.

use tracing::info;

use crate::config::{AccessMode, ProjectConfig};
use crate::convert;
use crate::error::SyncError;
use crate::gateway::DocumentGateway;
use crate::metadata::MetadataStore;
use crate::pull::{self, SyncReport};

/// Result of a successful push: the server-assigned version and the report
/// of the forced refresh pull that followed.
#[derive(Debug)]
pub struct PushOutcome {
    pub remote_id: String,
    pub new_version: i64,
    pub refresh: SyncReport,
}

/// Pushes `markdown` as the new content of the tracked document `name`.
///
/// Rejected with `AccessDenied` before any gateway call unless the document
/// is configured read-write. The current remote version is fetched
/// immediately before the update to narrow the window for a lost concurrent
/// edit; a `VersionConflict` from the gateway is surfaced unchanged and no
/// local state is mutated.
pub async fn push<G: DocumentGateway>(
    project: &ProjectConfig,
    name: &str,
    markdown: &str,
    gateway: &G,
    store: &mut MetadataStore,
) -> Result<PushOutcome, SyncError> {
    let page = project.find_page(name).ok_or_else(|| {
        SyncError::Configuration(format!("no tracked document named '{name}'"))
    })?;
    if page.access != AccessMode::ReadWrite {
        return Err(SyncError::AccessDenied(format!(
            "document '{name}' is configured read-only; set access to read-write to enable pushes"
        )));
    }
    let remote_id = page.remote_id()?;

    let current = gateway.get_document(&remote_id).await?;
    let storage = convert::markdown_to_storage(markdown);
    let new_version = gateway
        .update_document(&remote_id, &current.title, &storage, current.version)
        .await?;
    info!(
        name = %name,
        remote_id = %remote_id,
        base_version = current.version,
        new_version,
        "Pushed local content upstream"
    );

    // Push, then pull: re-fetch the subtree instead of trusting the pushed
    // bytes, since the server may rewrite content on save.
    let refresh = pull::sync(project, Some(name), true, gateway, store).await?;

    Ok(PushOutcome {
        remote_id,
        new_version,
        refresh,
    })
}
