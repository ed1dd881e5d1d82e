//! Upstream fetching, as seen by the crawler.

use std::future::Future;

use serde_json::Value;

use crate::{Result, payload::BridgeInfo};

/// Where bridge summaries, detail documents and search listings come from.
///
/// Implementations own retries and backoff. `Ok(None)` means the data could
/// not be obtained after those were exhausted.
pub trait TenderSource: Send + Sync {
  fn fetch_bridge_info(
    &self,
    ocid: &str,
  ) -> impl Future<Output = Result<Option<BridgeInfo>>> + Send;

  fn fetch_tender_details(
    &self,
    tender_id: &str,
  ) -> impl Future<Output = Result<Option<Value>>> + Send;

  /// OCIDs listed on one page of recent tenders, newest first.
  fn fetch_search_page(
    &self,
    page: usize,
  ) -> impl Future<Output = Result<Option<Vec<String>>>> + Send;
}
