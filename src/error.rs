//! Error handling for Neurochain
//!
//! Pipeline operations report [`PipelineError`]; everything around them
//! (configuration, logging setup, file IO) reports [`NeurochainError`],
//! which wraps it.

use crate::pipeline::PipelineError;
use thiserror::Error;

/// Main error type for Neurochain operations
#[derive(Error, Debug)]
pub enum NeurochainError {
    /// Errors raised by the pipeline engine
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to logging setup
    #[error("Logging error: {0}")]
    Logging(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<NeurochainError>,
    },
}

impl NeurochainError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        NeurochainError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

impl From<serde_json::Error> for NeurochainError {
    fn from(e: serde_json::Error) -> Self {
        NeurochainError::Serialization(e.to_string())
    }
}

/// Result type alias for Neurochain operations
pub type Result<T> = std::result::Result<T, NeurochainError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, PipelineError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| NeurochainError::from(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| NeurochainError::from(e).with_context(f()))
    }
}
