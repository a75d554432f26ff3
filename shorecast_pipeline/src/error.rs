use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias used throughout the pipeline crate.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors produced by pipeline stages.
///
/// Each variant keeps enough context to say which source or file was
/// involved, so a failed scheduled run can be diagnosed from logs alone.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// An outbound HTTP request failed or returned a non-success status.
    #[error("http request failed for {context}")]
    Http {
        context: String,
        #[source]
        source: reqwest::Error,
    },

    /// A fetched document did not contain what we expected to scrape.
    #[error("parse failed: {context}")]
    Parse { context: String },

    /// The page template is missing a structural marker.
    #[error("template error: {context}")]
    Template { context: String },

    /// Filesystem access failed.
    #[error("io error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON (de)serialization failed.
    #[error("json error for {context}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// A git subprocess exited non-zero.
    #[error("git {command} failed: {detail}")]
    Git { command: String, detail: String },

    /// The site definition is unusable.
    #[error("invalid site config: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn parse(context: impl Into<String>) -> Self {
        Self::Parse {
            context: context.into(),
        }
    }
}
