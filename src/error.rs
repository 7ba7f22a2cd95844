use std::path::PathBuf;

use thiserror::Error;

use crate::state::DocumentState;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Missing credential or unusable settings. Aborts before any document is touched.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Input directory not found: {}", .0.display())]
    InputMissing(PathBuf),

    #[error("{document}: {tokens} tokens exceeds budget of {limit}")]
    BudgetExceeded {
        document: String,
        tokens: usize,
        limit: usize,
    },

    #[error("Extraction service error: {0}")]
    Service(String),

    #[error("Invalid JSON for {document}: {message}")]
    Validation { document: String, message: String },

    #[error("Error reading {}: {message}", .path.display())]
    ExportRead { path: PathBuf, message: String },

    #[error("Cannot move a document from {from} to {to}")]
    InvalidTransition {
        from: DocumentState,
        to: DocumentState,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Fatal errors abort the whole run; everything else stays at the document boundary.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::Configuration(_) | PipelineError::InputMissing(_)
        )
    }
}
