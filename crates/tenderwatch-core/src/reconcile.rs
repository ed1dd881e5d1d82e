//! The tender reconciler.
//!
//! One call takes a freshly fetched tender document and the authoritative
//! bridge metadata for it, and turns them into a single atomic store commit:
//! the tender row, every changed sub-entity, every new sub-entity and their
//! change rows. Newly discovered complaints are handed to the task scheduler
//! only after that commit succeeds.
//!
//! ```text
//! Fetched ─► Validated ─┬─► Unchanged
//!                       ├─► New ────┐
//!                       └─► Update ─┴─► Synced ─► Committed
//! ```
//!
//! Any failure lands in `Failed` and leaves the store untouched.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::{
  Error, Result,
  collection::sync_related,
  entity::{
    Award, Bid, Complaint, SubEntity as _, TENDER_FIELDS_TO_CHECK, TenderAggregate,
    TenderDocument, TrackedEntity as _,
  },
  payload::{TenderPayload, timestamp},
  store::TenderStore,
  task::{Priority, Task, TaskScheduler},
  transaction::PendingTransaction,
  update::update_entity,
};

/// Everything the reconciler is told about a tender besides its document.
#[derive(Debug, Clone)]
pub struct ReconcileRequest {
  /// 32-character upstream UUID; the document must declare the same id.
  pub tender_id:     String,
  pub ocid:          String,
  /// Authoritative modification time from the bridge summary.
  pub date_modified: DateTime<Utc>,
  pub classifier_id: Option<i64>,
  pub priority:      Priority,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
  /// Stored copy is at least as new; nothing was done.
  Unchanged,
  Created { new_complaints: Vec<String> },
  Updated { new_complaints: Vec<String> },
  Failed,
}

impl ReconcileOutcome {
  pub fn is_success(&self) -> bool {
    !matches!(self, Self::Failed)
  }

  pub fn new_complaints(&self) -> &[String] {
    match self {
      Self::Created { new_complaints } | Self::Updated { new_complaints } => new_complaints,
      Self::Unchanged | Self::Failed => &[],
    }
  }
}

pub struct TenderReconciler<S, Q: ?Sized> {
  store:     Arc<S>,
  scheduler: Arc<Q>,
}

impl<S, Q> TenderReconciler<S, Q>
where
  S: TenderStore,
  Q: TaskScheduler + ?Sized,
{
  pub fn new(store: Arc<S>, scheduler: Arc<Q>) -> Self {
    Self { store, scheduler }
  }

  pub fn store(&self) -> &Arc<S> {
    &self.store
  }

  /// [`reconcile`](Self::reconcile), reduced to a success flag.
  pub async fn reconcile_tender(&self, request: &ReconcileRequest, document: &Value) -> bool {
    self.reconcile(request, document).await.is_success()
  }

  pub async fn reconcile(&self, request: &ReconcileRequest, document: &Value) -> ReconcileOutcome {
    // Compared and written at the precision the store keeps.
    let request = &ReconcileRequest {
      date_modified: timestamp::normalize(request.date_modified),
      ..request.clone()
    };
    let tender_id = request.tender_id.as_str();

    // Validation happens before any store access.
    let payload = match TenderPayload::parse(document) {
      Ok(p) => p,
      Err(e) => {
        warn!(tender_id, error = %e, "tender document failed to parse");
        return ReconcileOutcome::Failed;
      }
    };
    if payload.id != request.tender_id {
      let e = Error::IdentityMismatch {
        expected: request.tender_id.clone(),
        found:    payload.id.clone(),
      };
      warn!(tender_id, error = %e, "rejecting tender document");
      return ReconcileOutcome::Failed;
    }

    let stored = match self.store.get_tender(tender_id).await {
      Ok(t) => t,
      Err(e) => {
        error!(tender_id, error = %e, "tender lookup failed");
        return ReconcileOutcome::Failed;
      }
    };

    if let Some(stored) = &stored {
      if stored.date_modified >= request.date_modified {
        debug!(
          tender_id,
          stored = %stored.date_modified,
          incoming = %request.date_modified,
          "tender is up to date"
        );
        return ReconcileOutcome::Unchanged;
      }
    }

    match self.apply(request, &payload, stored.is_some()).await {
      Ok(outcome) => outcome,
      Err(e) => {
        error!(tender_id, error = %e, "reconciliation rolled back");
        ReconcileOutcome::Failed
      }
    }
  }

  /// Build, commit and schedule one pass. Dropping the pending transaction on
  /// an early return discards it.
  async fn apply(
    &self,
    request: &ReconcileRequest,
    payload: &TenderPayload,
    exists: bool,
  ) -> Result<ReconcileOutcome> {
    let tender_id = request.tender_id.as_str();
    let change_date = request.date_modified;
    let mut tx = PendingTransaction::new();

    let mut aggregate = if exists {
      let mut aggregate = self
        .store
        .get_tender_with_relations(tender_id)
        .await
        .map_err(Error::store)?
        .ok_or_else(|| Error::TenderNotFound(tender_id.to_owned()))?;
      self.update_tender(&mut tx, &mut aggregate, request, payload);
      aggregate
    } else {
      let tender = payload.to_tender(&request.ocid, change_date, request.classifier_id);
      tx.add(tender.clone().into_record());
      tx.flush();
      TenderAggregate::new(tender)
    };

    let mut new_complaints = Vec::new();
    new_complaints.extend(sync_related(
      &mut tx,
      tender_id,
      &mut aggregate.documents,
      &payload.documents,
      TenderDocument::FIELDS_TO_CHECK,
      change_date,
    ));
    new_complaints.extend(sync_related(
      &mut tx,
      tender_id,
      &mut aggregate.bids,
      &payload.bids,
      Bid::FIELDS_TO_CHECK,
      change_date,
    ));
    new_complaints.extend(sync_related(
      &mut tx,
      tender_id,
      &mut aggregate.awards,
      &payload.awards,
      Award::FIELDS_TO_CHECK,
      change_date,
    ));
    new_complaints.extend(sync_related(
      &mut tx,
      tender_id,
      &mut aggregate.complaints,
      &payload.complaints,
      Complaint::FIELDS_TO_CHECK,
      change_date,
    ));

    let (writes, changes) = (tx.writes().len(), tx.changes().len());
    self.store.commit(tx).await.map_err(Error::store)?;

    for complaint_id in &new_complaints {
      self.scheduler.schedule(
        Task::AnalyzeComplaint {
          tender_id:    tender_id.to_owned(),
          complaint_id: complaint_id.clone(),
        },
        request.priority,
      );
    }

    info!(
      tender_id,
      created = !exists,
      writes,
      changes,
      new_complaints = new_complaints.len(),
      "tender reconciled"
    );

    Ok(if exists {
      ReconcileOutcome::Updated { new_complaints }
    } else {
      ReconcileOutcome::Created { new_complaints }
    })
  }

  /// Diff the top-level tender fields and stage the tender row.
  ///
  /// `date_modified` is moved forward silently. The classifier reference is
  /// diffed like any other field.
  fn update_tender(
    &self,
    tx: &mut PendingTransaction,
    aggregate: &mut TenderAggregate,
    request: &ReconcileRequest,
    payload: &TenderPayload,
  ) {
    let tender_id = request.tender_id.as_str();
    let change_date = request.date_modified;
    let tender = &mut aggregate.tender;

    let candidate = payload.to_tender(&tender.ocid, change_date, request.classifier_id);
    update_entity(tender, tender_id, &candidate, TENDER_FIELDS_TO_CHECK, tx, change_date);

    tender.date_modified = change_date;

    tx.stage_update(tender.clone().into_record());
    tx.flush();
  }
}
