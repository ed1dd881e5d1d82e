//! The `TenderStore` trait.
//!
//! Implemented by storage backends (e.g. `tenderwatch-store-sqlite`). The
//! reconciler, aggregator, crawler and reports depend on this abstraction,
//! not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::{
  change::ChangeRecord,
  entity::{Classifier, Complaint, EntityKind, EntityRecord, Tender, TenderAggregate},
  score::{Highlight, ScoreContribution, ViolationScore},
  transaction::PendingTransaction,
};

/// A tender modified since some instant, with everyone subscribed to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribedTender {
  pub tender_id:     String,
  pub ocid:          String,
  pub date_modified: DateTime<Utc>,
  pub subscribers:   Vec<String>,
}

/// Abstraction over a tender store backend.
///
/// Change rows are append-only. Entities are inserted or updated only through
/// [`commit`](Self::commit), so one reconciliation pass lands atomically.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait TenderStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Tenders ───────────────────────────────────────────────────────────

  /// Look up a tender without its sub-entities.
  fn get_tender(
    &self,
    id: &str,
  ) -> impl Future<Output = Result<Option<Tender>, Self::Error>> + Send;

  /// Look up a tender by its OCID.
  fn get_tender_by_ocid(
    &self,
    ocid: &str,
  ) -> impl Future<Output = Result<Option<Tender>, Self::Error>> + Send;

  /// Load a tender with all four sub-entity collections.
  fn get_tender_with_relations(
    &self,
    id: &str,
  ) -> impl Future<Output = Result<Option<TenderAggregate>, Self::Error>> + Send;

  /// Apply a reconciliation pass: every flushed write and change row, in
  /// order, inside one database transaction.
  fn commit(
    &self,
    tx: PendingTransaction,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send;

  /// Remove a tender and everything that hangs off it.
  ///
  /// Returns `false` if there was no such tender.
  fn delete_tender(
    &self,
    id: &str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send;

  // ── Classifiers ───────────────────────────────────────────────────────

  /// Return the classifier for `(scheme, description)`, creating it first if
  /// needed. Safe to race.
  fn get_or_create_classifier(
    &self,
    scheme: &str,
    description: &str,
  ) -> impl Future<Output = Result<Classifier, Self::Error>> + Send;

  // ── Complaints & scores ───────────────────────────────────────────────

  fn get_complaint(
    &self,
    complaint_id: &str,
  ) -> impl Future<Output = Result<Option<Complaint>, Self::Error>> + Send;

  /// Store `highlights` on the complaint and merge `contribution` into the
  /// tender's score, creating the score if there is none.
  ///
  /// The read-merge-write is serialized per tender; concurrent calls for the
  /// same tender never lose an update. A complaint that already carries
  /// highlights has been counted: the call writes nothing and returns the
  /// current score.
  fn apply_complaint_analysis(
    &self,
    tender_id: &str,
    complaint_id: &str,
    highlights: Vec<Highlight>,
    contribution: ScoreContribution,
  ) -> impl Future<Output = Result<ViolationScore, Self::Error>> + Send;

  fn get_violation_score(
    &self,
    tender_id: &str,
  ) -> impl Future<Output = Result<Option<ViolationScore>, Self::Error>> + Send;

  // ── History ───────────────────────────────────────────────────────────

  /// Change rows of one kind for a tender with `change_date >= since`,
  /// oldest first.
  fn changes_since(
    &self,
    kind: EntityKind,
    tender_id: &str,
    since: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<ChangeRecord>, Self::Error>> + Send;

  /// Sub-entities of a tender first seen at or after `since`.
  fn new_entities_since(
    &self,
    tender_id: &str,
    since: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<EntityRecord>, Self::Error>> + Send;

  // ── Subscriptions ─────────────────────────────────────────────────────

  /// Subscribe `subscriber` to a tender. Subscribing twice is a no-op.
  fn add_subscription(
    &self,
    subscriber: &str,
    tender_id: &str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send;

  /// OCIDs of every tender with at least one subscriber.
  fn subscribed_tender_ocids(
    &self,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send;

  /// Subscribed tenders whose `date_modified >= since`.
  fn modified_tenders_with_subscribers(
    &self,
    since: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<SubscribedTender>, Self::Error>> + Send;
}
