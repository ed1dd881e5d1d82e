//! Bridge-driven synchronization of tenders by OCID.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
  Error, Result,
  payload::ClassifierPayload,
  reconcile::{ReconcileRequest, TenderReconciler},
  source::TenderSource,
  store::TenderStore,
  task::{Priority, TaskScheduler},
};

pub struct TenderCrawler<S, Q: ?Sized, F> {
  reconciler: TenderReconciler<S, Q>,
  source:     Arc<F>,
}

impl<S, Q, F> TenderCrawler<S, Q, F>
where
  S: TenderStore,
  Q: TaskScheduler + ?Sized,
  F: TenderSource,
{
  pub fn new(reconciler: TenderReconciler<S, Q>, source: Arc<F>) -> Self {
    Self { reconciler, source }
  }

  pub fn reconciler(&self) -> &TenderReconciler<S, Q> {
    &self.reconciler
  }

  /// Sync one tender.
  ///
  /// The bridge summary is checked against the stored `date_modified` first,
  /// so an unchanged tender costs no detail fetch. Returns `true` when the
  /// tender is up to date afterwards.
  pub async fn sync_single_tender(&self, ocid: &str, priority: Priority) -> bool {
    info!(ocid, "syncing tender");
    match self.try_sync(ocid, priority).await {
      Ok(ok) => ok,
      Err(e) => {
        warn!(ocid, error = %e, "tender sync failed");
        false
      }
    }
  }

  async fn try_sync(&self, ocid: &str, priority: Priority) -> Result<bool> {
    let Some(bridge) = self.source.fetch_bridge_info(ocid).await? else {
      warn!(ocid, "no bridge info");
      return Ok(false);
    };
    if bridge.id.is_empty() {
      warn!(ocid, "bridge info has no tender id");
      return Ok(false);
    }

    let store = self.reconciler.store();
    let stored = store.get_tender(&bridge.id).await.map_err(Error::store)?;
    if let Some(stored) = stored {
      if stored.date_modified >= bridge.date_modified {
        debug!(ocid, tender_id = %bridge.id, "unchanged, skipping detail fetch");
        return Ok(true);
      }
    }

    let classifier_id = self.resolve_classifier(bridge.general_classifier.as_ref()).await?;

    let Some(document) = self.source.fetch_tender_details(&bridge.id).await? else {
      warn!(ocid, tender_id = %bridge.id, "no detail document");
      return Ok(false);
    };

    let request = ReconcileRequest {
      tender_id: bridge.id,
      ocid: ocid.to_owned(),
      date_modified: bridge.date_modified,
      classifier_id,
      priority,
    };
    Ok(self.reconciler.reconcile_tender(&request, &document).await)
  }

  async fn resolve_classifier(&self, classifier: Option<&ClassifierPayload>) -> Result<Option<i64>> {
    let Some(c) = classifier else {
      return Ok(None);
    };
    if c.scheme.is_empty() || c.description.is_empty() {
      warn!(scheme = %c.scheme, "incomplete classifier, ignoring");
      return Ok(None);
    }
    let classifier = self
      .reconciler
      .store()
      .get_or_create_classifier(&c.scheme, &c.description)
      .await
      .map_err(Error::store)?;
    Ok(Some(classifier.id))
  }

  /// Sync each OCID in turn. Returns how many succeeded.
  pub async fn sync_many<I, T>(&self, ocids: I, priority: Priority) -> usize
  where
    I: IntoIterator<Item = T>,
    T: AsRef<str>,
  {
    let mut total = 0usize;
    let mut synced = 0usize;
    for ocid in ocids {
      total += 1;
      if self.sync_single_tender(ocid.as_ref(), priority).await {
        synced += 1;
      }
    }
    info!(synced, total, "sync finished");
    synced
  }

  /// Sync every tender somebody is subscribed to.
  pub async fn sync_subscribed_tenders(&self) -> usize {
    let ocids = match self.reconciler.store().subscribed_tender_ocids().await {
      Ok(ocids) => ocids,
      Err(e) => {
        warn!(error = %e, "could not list subscribed tenders");
        return 0;
      }
    };
    info!(count = ocids.len(), "syncing subscribed tenders");
    self.sync_many(ocids, Priority::Background).await
  }

  /// Walk search pages `0..pages`, syncing every OCID listed. Stops early at
  /// the first missing or empty page.
  pub async fn crawl_tenders(&self, pages: usize) -> usize {
    let mut synced = 0;
    for page in 0..pages {
      let ocids = match self.source.fetch_search_page(page).await {
        Ok(Some(ocids)) if !ocids.is_empty() => ocids,
        Ok(_) => {
          info!(page, "no more search results");
          break;
        }
        Err(e) => {
          warn!(page, error = %e, "search page fetch failed");
          break;
        }
      };
      debug!(page, count = ocids.len(), "crawling search page");
      synced += self.sync_many(ocids, Priority::Background).await;
    }
    synced
  }
}
