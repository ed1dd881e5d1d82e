//! A [`TenderSource`] backed by a directory of JSON snapshots.
//!
//! Layout under the root:
//!
//! ```text
//! bridge/<ocid>.json        bridge summary
//! tenders/<tender_id>.json  full tender document
//! search/<page>.json        array of OCIDs, page 0 is the newest
//! ```

use std::{
  io::ErrorKind,
  path::{Path, PathBuf},
};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tenderwatch_core::{Result, payload::BridgeInfo, source::TenderSource};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct DirectorySource {
  root: PathBuf,
}

impl DirectorySource {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Read and parse `<root>/<dir>/<name>.json`.
  ///
  /// A missing or unreadable file is `Ok(None)`; malformed JSON is an error.
  async fn read_json<T: DeserializeOwned>(&self, dir: &str, name: &str) -> Result<Option<T>> {
    if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
      warn!(dir, name, "refusing suspicious snapshot name");
      return Ok(None);
    }

    let path = self.root.join(dir).join(format!("{name}.json"));
    let bytes = match tokio::fs::read(&path).await {
      Ok(b) => b,
      Err(e) if e.kind() == ErrorKind::NotFound => {
        debug!(path = %path.display(), "snapshot not found");
        return Ok(None);
      }
      Err(e) => {
        warn!(path = %path.display(), error = %e, "failed to read snapshot");
        return Ok(None);
      }
    };

    Ok(Some(serde_json::from_slice(&bytes)?))
  }
}

impl TenderSource for DirectorySource {
  async fn fetch_bridge_info(&self, ocid: &str) -> Result<Option<BridgeInfo>> {
    self.read_json("bridge", ocid).await
  }

  async fn fetch_tender_details(&self, tender_id: &str) -> Result<Option<Value>> {
    self.read_json("tenders", tender_id).await
  }

  async fn fetch_search_page(&self, page: usize) -> Result<Option<Vec<String>>> {
    self.read_json("search", &page.to_string()).await
  }
}
