//! Error types for `tenderwatch-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("payload error: {0}")]
  Payload(#[from] serde_json::Error),

  #[error("tender identity mismatch: expected {expected}, document declares {found}")]
  IdentityMismatch { expected: String, found: String },

  #[error("invalid change record: {0}")]
  ChangeRecord(String),

  #[error("{0} staged write(s) were never flushed")]
  UnflushedWrites(usize),

  #[error("annotation service unavailable: {0}")]
  AnnotationUnavailable(String),

  #[error("keyword table error: {0}")]
  KeywordTable(#[from] std::io::Error),

  #[error("tender not found: {0}")]
  TenderNotFound(String),

  #[error("complaint not found: {0}")]
  ComplaintNotFound(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Wrap a backend error without tying the core crate to a backend type.
  pub fn store<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(err))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
