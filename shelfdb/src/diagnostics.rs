use crate::error::ShelfDbError;
use std::sync::Arc;

/// Receives every error a collection operation is about to return.
///
/// Reporting happens before the error propagates to the caller; the sink
/// cannot swallow or alter it.
pub trait Diagnostics: Send + Sync {
    fn report(&self, collection: &str, operation: &str, error: &ShelfDbError);
}

/// Forwards errors to the `log` facade at error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDiagnostics;

impl Diagnostics for LogDiagnostics {
    fn report(&self, collection: &str, operation: &str, error: &ShelfDbError) {
        log::error!("{collection}: {operation} failed: {error}");
    }
}

/// Discards every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDiagnostics;

impl Diagnostics for NullDiagnostics {
    fn report(&self, _collection: &str, _operation: &str, _error: &ShelfDbError) {}
}

pub(crate) fn default_sink() -> Arc<dyn Diagnostics> {
    Arc::new(LogDiagnostics)
}
