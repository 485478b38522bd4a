//! Shared access to the pdfium library.

use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::EnginesConfig;

use super::error::ConvertError;

/// Held while a bound library exists. Binding initialises pdfium's global
/// state and dropping the binding destroys it, so bindings never overlap.
static LIBRARY_LOCK: Mutex<()> = Mutex::new(());

fn library_lock() -> MutexGuard<'static, ()> {
    LIBRARY_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Binds pdfium on demand and runs document work off the async runtime.
///
/// pdfium is CPU-bound and its documents are not `Send`, so every task
/// binds, opens and saves inside a single `spawn_blocking` closure.
#[derive(Debug, Clone)]
pub struct PdfEngine {
    library_dir: Option<PathBuf>,
}

impl PdfEngine {
    pub fn new(engines: &EnginesConfig) -> Self {
        Self {
            library_dir: engines.pdfium_library_dir.clone(),
        }
    }

    fn bind(&self) -> Result<Pdfium, ConvertError> {
        let bindings = match &self.library_dir {
            Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)),
            None => Pdfium::bind_to_system_library(),
        };
        bindings.map(Pdfium::new).map_err(|e| {
            tracing::debug!(error = ?e, "pdfium binding failed");
            ConvertError::engine_missing(
                "pdfium",
                self.library_dir
                    .clone()
                    .unwrap_or_else(|| PathBuf::from("system library path")),
            )
        })
    }

    /// Whether the library can be loaded on this host.
    pub fn is_available(&self) -> bool {
        let _library = library_lock();
        self.bind().is_ok()
    }

    /// Runs `task` with a bound library on the blocking pool.
    pub async fn run<T, F>(&self, task: F) -> Result<T, ConvertError>
    where
        T: Send + 'static,
        F: FnOnce(&Pdfium) -> Result<T, ConvertError> + Send + 'static,
    {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || {
            let _library = library_lock();
            let pdfium = engine.bind()?;
            task(&pdfium)
        })
        .await
        .map_err(|e| ConvertError::engine("pdfium", format!("PDF task failed: {}", e)))?
    }
}

/// Wraps a pdfium error as an engine failure.
pub(crate) fn pdfium_error(context: &str, error: PdfiumError) -> ConvertError {
    ConvertError::engine("pdfium", format!("{}: {:?}", context, error))
}

/// Opens a document, reporting unreadable content as an engine failure.
pub(crate) fn open_document<'a>(
    pdfium: &'a Pdfium,
    path: &Path,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, ConvertError> {
    pdfium
        .load_pdf_from_file(path, password)
        .map_err(|e| pdfium_error("Failed to open PDF", e))
}

/// Saves a document into `path`.
pub(crate) fn save_document(document: &PdfDocument<'_>, path: &Path) -> Result<(), ConvertError> {
    document
        .save_to_file(path)
        .map_err(|e| pdfium_error("Failed to save PDF", e))
}
