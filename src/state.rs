//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::resize::{default_backend, PdfBackend};

/// Shared application state
///
/// Immutable after startup; requests share nothing mutable.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    pdf_backend: Arc<dyn PdfBackend>,
}

impl AppState {
    /// Create application state, resolving PDF support for this build
    pub fn new(config: Config) -> Self {
        Self::with_pdf_backend(config, default_backend())
    }

    /// Create application state with an explicit PDF backend
    pub fn with_pdf_backend(config: Config, pdf_backend: Arc<dyn PdfBackend>) -> Self {
        tracing::info!(
            backend = pdf_backend.name(),
            available = pdf_backend.is_available(),
            "PDF support resolved"
        );

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pdf_backend,
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the PDF backend
    pub fn pdf_backend(&self) -> Arc<dyn PdfBackend> {
        Arc::clone(&self.inner.pdf_backend)
    }
}
