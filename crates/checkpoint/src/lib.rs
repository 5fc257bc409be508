//! Checkpoint persistence (spec.md §4.8): durable record of crawled pages,
//! the pending frontier, and run metadata, enabling resumption across runs.

pub mod backend;
pub mod json_backend;
pub mod sqlite_backend;

pub use backend::{BackendKind, StateBackend};
pub use json_backend::JsonBackend;
pub use sqlite_backend::SqliteBackend;

use std::path::Path;

use sus_core::CrawlError;

/// Creates the appropriate backend for `path`, auto-detecting JSON vs.
/// SQLite from its extension unless `kind` is given explicitly. Grounded on
/// `original_source/src/sus/backends/__init__.py::create_backend`.
pub async fn create_backend(
    path: &Path,
    kind: Option<BackendKind>,
) -> Result<Box<dyn StateBackend>, CrawlError> {
    let kind = kind.unwrap_or_else(|| BackendKind::detect(path));
    let backend: Box<dyn StateBackend> = match kind {
        BackendKind::Json => Box::new(JsonBackend::new(path)),
        BackendKind::Sqlite => Box::new(SqliteBackend::open(path).await?),
    };
    backend.initialize().await?;
    Ok(backend)
}
