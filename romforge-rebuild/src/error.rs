/// Errors that can occur while scanning candidates or writing output
/// containers.
///
/// Per-unit failures inside a rebuild batch are logged and counted rather
/// than propagated; this type surfaces only at operation boundaries
/// (opening an archive, writing a container).
#[derive(Debug, thiserror::Error)]
pub enum RebuildError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}
