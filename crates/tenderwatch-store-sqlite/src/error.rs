//! Error type for `tenderwatch-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] tenderwatch_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("decimal parse error: {0}")]
  Decimal(#[from] rust_decimal::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("tender not found: {0}")]
  TenderNotFound(String),

  /// The complaint does not exist or belongs to another tender.
  #[error("complaint {complaint_id} not found on tender {tender_id}")]
  ComplaintNotFound {
    tender_id:    String,
    complaint_id: String,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
