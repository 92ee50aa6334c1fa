use thiserror::Error;

/// Error taxonomy shared by the sync engine and the document gateway.
///
/// `Configuration` and `AccessDenied` are fatal to the operation they apply
/// to and are never retried. `Transport` and `NotFound` are caught at node
/// granularity during a pull pass and recorded in the report instead of
/// propagating. `VersionConflict` is surfaced to the caller unchanged.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("remote document not found: {0}")]
    NotFound(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("version conflict: {0}")]
    VersionConflict(String),

    #[error("local io error: {0}")]
    LocalIo(#[from] std::io::Error),
}
