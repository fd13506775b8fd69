use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::record::CodecError;
use crate::store::StoreError;

/// Boxed error type accepted from caller-supplied loaders.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Authoritative "known not to exist" result.
    ///
    /// Returned when a negative entry is found on the single-key read path,
    /// and when a loader reports that the requested resource does not exist.
    #[error("resource not found")]
    NotFound,

    #[error("cache layer {layer} failed: {source}")]
    Backend {
        layer: String,
        #[source]
        source: StoreError,
    },

    #[error("cache layer {layer} timed out after {after:?}")]
    Timeout { layer: String, after: Duration },

    #[error("invalid cache configuration: {0}")]
    Config(String),

    #[error("failed to encode cache record: {0}")]
    Codec(#[from] CodecError),

    /// Failure reported by a caller-supplied loader, passed through verbatim.
    #[error("loader failed: {0}")]
    Loader(#[source] BoxError),
}

impl CacheError {
    /// Wrap an arbitrary loader failure.
    pub fn loader(err: impl Into<BoxError>) -> Self {
        Self::Loader(err.into())
    }

    /// Create a new Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether this error belongs to the "not found" class.
    ///
    /// Matches the [`CacheError::NotFound`] sentinel by identity, and loader
    /// errors whose message mentions "not found" (case-insensitive) so that
    /// data-source errors from other crates are recognised without a shared type.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound => true,
            Self::Loader(inner) => mentions_not_found(&inner.to_string()),
            _ => false,
        }
    }

    /// Check if this error came from a cache tier rather than the caller.
    pub fn is_backend_error(&self) -> bool {
        matches!(self, Self::Backend { .. } | Self::Timeout { .. })
    }
}

/// A failure produced by one load and handed to every caller that joined it.
#[derive(Debug, Clone)]
pub struct SharedError(Arc<CacheError>);

impl SharedError {
    /// The error as the loading caller produced it.
    pub fn inner(&self) -> &CacheError {
        &self.0
    }
}

impl std::fmt::Display for SharedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.as_ref() {
            CacheError::Loader(inner) => inner.fmt(f),
            other => other.fmt(f),
        }
    }
}

impl std::error::Error for SharedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self.0.as_ref() {
            CacheError::Loader(inner) => inner.source(),
            other => std::error::Error::source(other),
        }
    }
}

impl CacheError {
    /// Rebuild an error held behind an `Arc` so it can be returned to one of
    /// several callers. Variants without owned sources are copied as is;
    /// the rest are wrapped in a [`SharedError`].
    pub(crate) fn from_shared(err: &Arc<CacheError>) -> Self {
        match err.as_ref() {
            Self::NotFound => Self::NotFound,
            Self::Timeout { layer, after } => Self::Timeout {
                layer: layer.clone(),
                after: *after,
            },
            Self::Config(message) => Self::Config(message.clone()),
            Self::Backend { layer, source } => Self::Backend {
                layer: layer.clone(),
                source: StoreError::new(source.to_string()),
            },
            Self::Codec(_) | Self::Loader(_) => {
                Self::Loader(Box::new(SharedError(Arc::clone(err))))
            }
        }
    }
}

fn mentions_not_found(message: &str) -> bool {
    message.to_ascii_lowercase().contains("not found")
}
