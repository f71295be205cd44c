use thiserror::Error;

/// Errors that can occur during CLI command execution.
#[derive(Debug, Error)]
pub(crate) enum CliError {
    /// Catalog parse or write error
    #[error("Catalog error: {0}")]
    Catalog(#[from] romforge_dat::DatError),

    /// Rebuild or verification error
    #[error("Rebuild error: {0}")]
    Rebuild(#[from] romforge_rebuild::RebuildError),

    /// Report serialization error
    #[error("Report error: {0}")]
    Report(#[from] serde_json::Error),
}
