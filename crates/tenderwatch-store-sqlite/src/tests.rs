//! Integration tests for `SqliteStore` driven through the reconciler, the
//! aggregator, the crawler and reports, against an in-memory database.

use std::{
  collections::HashMap,
  sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
  },
};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tenderwatch_core::{
  aggregate::ViolationScoreAggregator,
  annotate::{KeywordTable, Lemmatizer, LexiconAnnotator},
  crawl::TenderCrawler,
  entity::{EntityKind, EntityRecord},
  payload::BridgeInfo,
  reconcile::{ReconcileOutcome, ReconcileRequest, TenderReconciler},
  report::{TenderReport, subscriber_digests},
  source::TenderSource,
  store::TenderStore,
  task::{Priority, Task, TaskScheduler},
  transaction::PendingTransaction,
};

use crate::SqliteStore;

const T1: &str = "0123456789abcdef0123456789abcdef";
const OCID: &str = "UA-2025-01-01-000001-a";

fn ts(s: &str) -> DateTime<Utc> {
  s.parse().expect("valid timestamp")
}

// ─── Fixtures ────────────────────────────────────────────────────────────────

#[derive(Default)]
struct RecordingScheduler {
  tasks: Mutex<Vec<(Task, Priority)>>,
}

impl RecordingScheduler {
  fn take(&self) -> Vec<(Task, Priority)> {
    std::mem::take(&mut *self.tasks.lock().unwrap())
  }
}

impl TaskScheduler for RecordingScheduler {
  fn schedule(&self, task: Task, priority: Priority) {
    self.tasks.lock().unwrap().push((task, priority));
  }
}

struct Harness {
  store:      Arc<SqliteStore>,
  scheduler:  Arc<RecordingScheduler>,
  reconciler: TenderReconciler<SqliteStore, RecordingScheduler>,
}

async fn harness() -> Harness {
  let store = Arc::new(SqliteStore::open_in_memory().await.expect("in-memory store"));
  let scheduler = Arc::new(RecordingScheduler::default());
  let reconciler = TenderReconciler::new(store.clone(), scheduler.clone());
  Harness { store, scheduler, reconciler }
}

fn request(at: &str) -> ReconcileRequest {
  ReconcileRequest {
    tender_id:     T1.into(),
    ocid:          OCID.into(),
    date_modified: ts(at),
    classifier_id: None,
    priority:      Priority::Background,
  }
}

fn tender_doc(title: &str, bids: Value, complaints: Value) -> Value {
  json!({
    "id": T1,
    "tenderID": OCID,
    "date": "2024-12-20T09:00:00+02:00",
    "dateModified": "2000-01-01T00:00:00Z",
    "title": title,
    "value": {"amount": 1000.0, "currency": "UAH"},
    "status": "active.tendering",
    "tenderPeriod": {
      "startDate": "2025-01-01T00:00:00+02:00",
      "endDate": "2025-01-15T00:00:00+02:00"
    },
    "documents": [
      {"id": "D1", "title": "Тендерна документація", "format": "application/pdf",
       "url": "https://example.org/d1", "datePublished": "2024-12-20T09:00:00+02:00"}
    ],
    "bids": bids,
    "awards": [],
    "complaints": complaints,
  })
}

fn bid(id: &str, status: &str, amount: f64) -> Value {
  json!({
    "id": id,
    "status": status,
    "date": "2025-01-02T12:00:00+02:00",
    "value": {"amount": amount},
    "tenderers": [{"identifier": {"id": "12345678", "legalName": "ТОВ Будмайстер"}}],
  })
}

fn complaint(id: &str, description: Option<&str>) -> Value {
  json!({
    "id": id,
    "status": "pending",
    "title": format!("Скарга {id}"),
    "description": description,
    "dateSubmitted": "2025-01-03T10:00:00+02:00",
  })
}

async fn total_changes(store: &SqliteStore) -> usize {
  let mut n = 0;
  for kind in [
    EntityKind::Tender,
    EntityKind::Document,
    EntityKind::Bid,
    EntityKind::Award,
    EntityKind::Complaint,
  ] {
    n += store.change_count(kind, T1).await.unwrap();
  }
  n
}

fn annotator() -> Arc<LexiconAnnotator> {
  let keywords = KeywordTable::from_json(r#"{"0": ["дискримінаційний"], "1": ["завищений"]}"#).unwrap();
  Arc::new(LexiconAnnotator::new(keywords, Lemmatizer::default()))
}

// ─── Reconciliation scenarios ────────────────────────────────────────────────

#[tokio::test]
async fn new_tender_is_created_without_change_rows() {
  let h = harness().await;
  let doc = tender_doc("Ремонт дороги", json!([bid("B1", "active", 950.00)]), json!([]));

  let outcome = h.reconciler.reconcile(&request("2025-01-01T10:00:00Z"), &doc).await;
  assert_eq!(outcome, ReconcileOutcome::Created { new_complaints: vec![] });

  let agg = h.store.get_tender_with_relations(T1).await.unwrap().unwrap();
  assert_eq!(agg.tender.id, T1);
  assert_eq!(agg.tender.ocid, OCID);
  assert_eq!(agg.tender.date_modified, ts("2025-01-01T10:00:00Z"));
  assert_eq!(agg.tender.date_created, ts("2024-12-20T07:00:00Z"));
  assert_eq!(agg.bids.len(), 1);
  assert_eq!(agg.bids[0].id, "B1");
  assert_eq!(agg.bids[0].value_amount, Some(Decimal::new(95000, 2)));
  assert_eq!(agg.bids[0].tenderer_legal_name.as_deref(), Some("ТОВ Будмайстер"));
  assert_eq!(agg.documents.len(), 1);
  assert_eq!(total_changes(&h.store).await, 0);
}

#[tokio::test]
async fn title_change_records_one_tender_change() {
  let h = harness().await;
  let bids = json!([bid("B1", "active", 950.00)]);
  h.reconciler
    .reconcile(&request("2025-01-01T10:00:00Z"), &tender_doc("Old", bids.clone(), json!([])))
    .await;

  let outcome = h
    .reconciler
    .reconcile(&request("2025-01-10T15:00:00Z"), &tender_doc("New", bids, json!([])))
    .await;
  assert_eq!(outcome, ReconcileOutcome::Updated { new_complaints: vec![] });

  let changes = h
    .store
    .changes_since(EntityKind::Tender, T1, ts("2000-01-01T00:00:00Z"))
    .await
    .unwrap();
  assert_eq!(changes.len(), 1);
  assert_eq!(changes[0].field_name, "title");
  assert_eq!(changes[0].old_value.as_deref(), Some("Old"));
  assert_eq!(changes[0].new_value.as_deref(), Some("New"));
  assert_eq!(changes[0].change_date, ts("2025-01-10T15:00:00Z"));
  assert_eq!(total_changes(&h.store).await, 1);

  let tender = h.store.get_tender(T1).await.unwrap().unwrap();
  assert_eq!(tender.title.as_deref(), Some("New"));
  assert_eq!(tender.date_modified, ts("2025-01-10T15:00:00Z"));
}

#[tokio::test]
async fn deleted_bid_records_one_status_change() {
  let h = harness().await;
  h.reconciler
    .reconcile(
      &request("2025-01-01T10:00:00Z"),
      &tender_doc("T", json!([bid("B1", "active", 950.00)]), json!([])),
    )
    .await;
  h.reconciler
    .reconcile(
      &request("2025-01-02T10:00:00Z"),
      &tender_doc("T", json!([bid("B1", "deleted", 10.00)]), json!([])),
    )
    .await;

  let changes = h
    .store
    .changes_since(EntityKind::Bid, T1, ts("2000-01-01T00:00:00Z"))
    .await
    .unwrap();
  assert_eq!(changes.len(), 1);
  assert_eq!(changes[0].entity_id, "B1");
  assert_eq!(changes[0].field_name, "status");
  assert_eq!(changes[0].old_value.as_deref(), Some("active"));
  assert_eq!(changes[0].new_value.as_deref(), Some("deleted"));

  let agg = h.store.get_tender_with_relations(T1).await.unwrap().unwrap();
  assert_eq!(agg.bids[0].status.as_deref(), Some("deleted"));
  assert_eq!(agg.bids[0].value_amount, Some(Decimal::new(95000, 2)));
}

#[tokio::test]
async fn soft_deleted_bid_stays_frozen() {
  let h = harness().await;
  for (at, status, amount) in [
    ("2025-01-01T10:00:00Z", "active", 950.00),
    ("2025-01-02T10:00:00Z", "deleted", 950.00),
    ("2025-01-03T10:00:00Z", "deleted", 700.00),
  ] {
    h.reconciler
      .reconcile(&request(at), &tender_doc("T", json!([bid("B1", status, amount)]), json!([])))
      .await;
  }

  assert_eq!(h.store.change_count(EntityKind::Bid, T1).await.unwrap(), 1);
  let agg = h.store.get_tender_with_relations(T1).await.unwrap().unwrap();
  assert_eq!(agg.bids[0].value_amount, Some(Decimal::new(95000, 2)));
}

#[tokio::test]
async fn equal_timestamp_short_circuits() {
  let h = harness().await;
  let at = "2025-01-01T10:00:00Z";
  h.reconciler
    .reconcile(&request(at), &tender_doc("Old", json!([]), json!([])))
    .await;

  let outcome = h
    .reconciler
    .reconcile(&request(at), &tender_doc("Changed", json!([bid("B9", "active", 1.0)]), json!([])))
    .await;
  assert_eq!(outcome, ReconcileOutcome::Unchanged);

  let agg = h.store.get_tender_with_relations(T1).await.unwrap().unwrap();
  assert_eq!(agg.tender.title.as_deref(), Some("Old"));
  assert!(agg.bids.is_empty());
  assert_eq!(total_changes(&h.store).await, 0);
}

#[tokio::test]
async fn same_instant_in_another_offset_short_circuits() {
  let h = harness().await;
  h.reconciler
    .reconcile(&request("2025-01-01T10:00:00Z"), &tender_doc("Old", json!([]), json!([])))
    .await;

  let outcome = h
    .reconciler
    .reconcile(&request("2025-01-01T12:00:00+02:00"), &tender_doc("New", json!([]), json!([])))
    .await;
  assert_eq!(outcome, ReconcileOutcome::Unchanged);
}

#[tokio::test]
async fn reconciling_twice_is_idempotent() {
  let h = harness().await;
  let doc = tender_doc(
    "T",
    json!([bid("B1", "active", 950.00)]),
    json!([complaint("C1", Some("текст"))]),
  );
  let req = request("2025-01-01T10:00:00Z");

  h.reconciler.reconcile(&req, &doc).await;
  let before = h.store.get_tender_with_relations(T1).await.unwrap();
  h.scheduler.take();

  assert_eq!(h.reconciler.reconcile(&req, &doc).await, ReconcileOutcome::Unchanged);
  assert_eq!(h.store.get_tender_with_relations(T1).await.unwrap(), before);
  assert_eq!(total_changes(&h.store).await, 0);
  assert!(h.scheduler.take().is_empty());
}

#[tokio::test]
async fn nanosecond_timestamps_round_trip_without_spurious_changes() {
  let h = harness().await;
  let mut doc = tender_doc("T", json!([bid("B1", "active", 950.00)]), json!([]));
  doc["date"] = json!("2024-12-20T09:00:00.123456789Z");
  doc["bids"][0]["date"] = json!("2025-01-02T12:00:00.987654321+02:00");
  let req = request("2025-01-01T10:00:00.123456789Z");

  assert!(matches!(
    h.reconciler.reconcile(&req, &doc).await,
    ReconcileOutcome::Created { .. }
  ));
  assert_eq!(h.reconciler.reconcile(&req, &doc).await, ReconcileOutcome::Unchanged);
  assert_eq!(total_changes(&h.store).await, 0);

  // A newer bridge time with the same content rewrites nothing but the tender.
  let later = request("2025-01-01T10:00:01.5Z");
  assert!(matches!(
    h.reconciler.reconcile(&later, &doc).await,
    ReconcileOutcome::Updated { .. }
  ));
  assert_eq!(total_changes(&h.store).await, 0);
  assert_eq!(
    h.store.get_tender(T1).await.unwrap().unwrap().date_modified,
    ts("2025-01-01T10:00:01.5Z")
  );
}

#[tokio::test]
async fn older_timestamps_leave_the_tender_untouched() {
  let h = harness().await;
  h.reconciler
    .reconcile(&request("2025-01-10T15:00:00Z"), &tender_doc("Current", json!([]), json!([])))
    .await;

  let outcome = h
    .reconciler
    .reconcile(&request("2025-01-05T00:00:00Z"), &tender_doc("Stale", json!([]), json!([])))
    .await;
  assert_eq!(outcome, ReconcileOutcome::Unchanged);

  let tender = h.store.get_tender(T1).await.unwrap().unwrap();
  assert_eq!(tender.title.as_deref(), Some("Current"));
  assert_eq!(tender.date_modified, ts("2025-01-10T15:00:00Z"));
}

#[tokio::test]
async fn sub_cent_amount_drift_is_not_a_change() {
  let h = harness().await;
  h.reconciler
    .reconcile(
      &request("2025-01-01T10:00:00Z"),
      &tender_doc("T", json!([bid("B1", "active", 100.00)]), json!([])),
    )
    .await;
  h.reconciler
    .reconcile(
      &request("2025-01-02T10:00:00Z"),
      &tender_doc("T", json!([bid("B1", "active", 100.004)]), json!([])),
    )
    .await;
  assert_eq!(h.store.change_count(EntityKind::Bid, T1).await.unwrap(), 0);

  h.reconciler
    .reconcile(
      &request("2025-01-03T10:00:00Z"),
      &tender_doc("T", json!([bid("B1", "active", 100.01)]), json!([])),
    )
    .await;
  let changes = h
    .store
    .changes_since(EntityKind::Bid, T1, ts("2000-01-01T00:00:00Z"))
    .await
    .unwrap();
  assert_eq!(changes.len(), 1);
  assert_eq!(changes[0].old_value.as_deref(), Some("100.00"));
  assert_eq!(changes[0].new_value.as_deref(), Some("100.01"));
}

#[tokio::test]
async fn mismatched_identity_writes_nothing() {
  let h = harness().await;
  let mut doc = tender_doc("T", json!([]), json!([]));
  doc["id"] = json!("ffffffffffffffffffffffffffffffff");

  let outcome = h.reconciler.reconcile(&request("2025-01-01T10:00:00Z"), &doc).await;
  assert_eq!(outcome, ReconcileOutcome::Failed);
  assert!(h.store.get_tender(T1).await.unwrap().is_none());
}

#[tokio::test]
async fn unparseable_document_fails() {
  let h = harness().await;
  let doc = json!({"id": T1, "title": "missing creation date"});
  assert!(!h.reconciler.reconcile_tender(&request("2025-01-01T10:00:00Z"), &doc).await);
  assert!(h.store.get_tender(T1).await.unwrap().is_none());
}

#[tokio::test]
async fn malformed_sub_items_are_skipped() {
  let h = harness().await;
  let doc = tender_doc(
    "T",
    json!([{"id": "B0", "date": "garbage"}, bid("B1", "active", 950.0), {"status": "active"}]),
    json!([]),
  );
  assert!(h.reconciler.reconcile_tender(&request("2025-01-01T10:00:00Z"), &doc).await);

  let agg = h.store.get_tender_with_relations(T1).await.unwrap().unwrap();
  assert_eq!(agg.bids.len(), 1);
  assert_eq!(agg.bids[0].id, "B1");
}

#[tokio::test]
async fn failed_commit_rolls_back_everything() {
  let h = harness().await;
  let mut req = request("2025-01-01T10:00:00Z");
  // Unknown classifier id violates the foreign key on commit.
  req.classifier_id = Some(4242);

  let outcome = h
    .reconciler
    .reconcile(&req, &tender_doc("T", json!([bid("B1", "active", 1.0)]), json!([complaint("C1", None)])))
    .await;
  assert_eq!(outcome, ReconcileOutcome::Failed);
  assert!(h.store.get_tender(T1).await.unwrap().is_none());
  assert!(h.store.get_complaint("C1").await.unwrap().is_none());
  assert!(h.scheduler.take().is_empty());
}

#[tokio::test]
async fn unflushed_transaction_is_refused() {
  let h = harness().await;
  let doc = tender_doc("T", json!([]), json!([]));
  h.reconciler.reconcile(&request("2025-01-01T10:00:00Z"), &doc).await;

  let tender = h.store.get_tender(T1).await.unwrap().unwrap();
  let mut tx = PendingTransaction::new();
  tx.stage_update(EntityRecord::Tender(tender));
  assert!(h.store.commit(tx).await.is_err());
}

// ─── Classifiers ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn classifiers_are_unique_per_scheme_and_description() {
  let h = harness().await;
  let a = h.store.get_or_create_classifier("ДК021", "Будівельні роботи").await.unwrap();
  let b = h.store.get_or_create_classifier("ДК021", "Будівельні роботи").await.unwrap();
  let c = h.store.get_or_create_classifier("ДК021", "Послуги").await.unwrap();
  assert_eq!(a, b);
  assert_ne!(a.id, c.id);
}

#[tokio::test]
async fn classifier_change_is_logged() {
  let h = harness().await;
  let first = h.store.get_or_create_classifier("ДК021", "A").await.unwrap();
  let second = h.store.get_or_create_classifier("ДК021", "B").await.unwrap();

  let mut req = request("2025-01-01T10:00:00Z");
  req.classifier_id = Some(first.id);
  h.reconciler.reconcile(&req, &tender_doc("T", json!([]), json!([]))).await;

  let mut req = request("2025-01-02T10:00:00Z");
  req.classifier_id = Some(second.id);
  h.reconciler.reconcile(&req, &tender_doc("T", json!([]), json!([]))).await;

  let changes = h
    .store
    .changes_since(EntityKind::Tender, T1, ts("2000-01-01T00:00:00Z"))
    .await
    .unwrap();
  assert_eq!(changes.len(), 1);
  assert_eq!(changes[0].field_name, "classifier_id");
  assert_eq!(changes[0].old_value, Some(format!("{}.00", first.id)));
  assert_eq!(changes[0].new_value, Some(format!("{}.00", second.id)));
  assert_eq!(h.store.get_tender(T1).await.unwrap().unwrap().classifier_id, Some(second.id));

  h.reconciler
    .reconcile(&request("2025-01-03T10:00:00Z"), &tender_doc("T", json!([]), json!([])))
    .await;
  let changes = h
    .store
    .changes_since(EntityKind::Tender, T1, ts("2025-01-03T10:00:00Z"))
    .await
    .unwrap();
  assert_eq!(changes.len(), 1);
  assert_eq!(changes[0].old_value, Some(format!("{}.00", second.id)));
  assert_eq!(changes[0].new_value, None);
  assert_eq!(h.store.get_tender(T1).await.unwrap().unwrap().classifier_id, None);
}

// ─── Complaints & scoring ────────────────────────────────────────────────────

#[tokio::test]
async fn only_new_complaints_are_scheduled_after_commit() {
  let h = harness().await;
  let mut req = request("2025-01-01T10:00:00Z");
  req.priority = Priority::Interactive;
  h.reconciler
    .reconcile(&req, &tender_doc("T", json!([]), json!([complaint("C1", None)])))
    .await;

  assert_eq!(
    h.scheduler.take(),
    vec![(
      Task::AnalyzeComplaint { tender_id: T1.into(), complaint_id: "C1".into() },
      Priority::Interactive,
    )]
  );

  let outcome = h
    .reconciler
    .reconcile(
      &request("2025-01-02T10:00:00Z"),
      &tender_doc("T", json!([]), json!([complaint("C1", Some("змінено")), complaint("C2", None)])),
    )
    .await;
  assert_eq!(outcome.new_complaints(), ["C2".to_string()]);
  assert_eq!(
    h.scheduler.take(),
    vec![(
      Task::AnalyzeComplaint { tender_id: T1.into(), complaint_id: "C2".into() },
      Priority::Background,
    )]
  );
  assert_eq!(h.store.change_count(EntityKind::Complaint, T1).await.unwrap(), 1);
}

#[tokio::test]
async fn scores_accumulate_across_complaints() {
  let h = harness().await;
  let aggregator = ViolationScoreAggregator::new(h.store.clone(), annotator()).unwrap();

  h.reconciler
    .reconcile(
      &request("2025-01-01T10:00:00Z"),
      &tender_doc("T", json!([]), json!([complaint("C1", Some("Вимога має дискримінаційний характер"))])),
    )
    .await;
  let score = aggregator.analyze_complaint(T1, "C1").await.unwrap();
  assert!((score.scores["0"].score - 2f64.ln()).abs() < 1e-9);
  assert_eq!(score.scores["0"].keywords["дискримінаційний"], 1);

  let c1 = h.store.get_complaint("C1").await.unwrap().unwrap();
  let highlights = c1.highlighted_keywords.unwrap();
  assert_eq!(highlights.len(), 1);
  assert_eq!(highlights[0].domains, vec!["0".to_string()]);
  assert_eq!((highlights[0].offset, highlights[0].length), (11, 16));

  h.reconciler
    .reconcile(
      &request("2025-01-02T10:00:00Z"),
      &tender_doc(
        "T",
        json!([]),
        json!([
          complaint("C1", Some("Вимога має дискримінаційний характер")),
          complaint("C2", Some("Знову дискримінаційний підхід"))
        ]),
      ),
    )
    .await;
  let complaint = h.store.get_complaint("C2").await.unwrap().unwrap();
  let score = aggregator.update_violation_scores(T1, &complaint).await.unwrap();
  assert!((score.scores["0"].score - 2.0 * 2f64.ln()).abs() < 1e-9);
  assert_eq!(score.scores["0"].keywords["дискримінаційний"], 2);

  let stored = h.store.get_violation_score(T1).await.unwrap().unwrap();
  assert_eq!(stored.scores, score.scores);
}

#[tokio::test]
async fn untouched_domains_survive_a_merge() {
  let h = harness().await;
  let aggregator = ViolationScoreAggregator::new(h.store.clone(), annotator()).unwrap();
  h.reconciler
    .reconcile(
      &request("2025-01-01T10:00:00Z"),
      &tender_doc(
        "T",
        json!([]),
        json!([complaint("C1", Some("завищений")), complaint("C2", Some("дискримінаційний"))]),
      ),
    )
    .await;

  aggregator.analyze_complaint(T1, "C1").await.unwrap();
  let score = aggregator.analyze_complaint(T1, "C2").await.unwrap();
  assert_eq!(score.scores.len(), 2);
  assert_eq!(score.scores["1"].keywords["завищений"], 1);
  assert_eq!(score.scores["0"].keywords["дискримінаційний"], 1);
}

#[tokio::test]
async fn redelivered_analysis_is_not_double_counted() {
  let h = harness().await;
  let aggregator = ViolationScoreAggregator::new(h.store.clone(), annotator()).unwrap();
  h.reconciler
    .reconcile(
      &request("2025-01-01T10:00:00Z"),
      &tender_doc("T", json!([]), json!([complaint("C1", Some("дискримінаційний"))])),
    )
    .await;

  aggregator.analyze_complaint(T1, "C1").await.unwrap();
  let again = aggregator.analyze_complaint(T1, "C1").await.unwrap();
  assert_eq!(again.scores["0"].keywords["дискримінаційний"], 1);
}

#[tokio::test]
async fn concurrent_analyses_do_not_lose_updates() {
  let h = harness().await;
  let aggregator = ViolationScoreAggregator::new(h.store.clone(), annotator()).unwrap();
  h.reconciler
    .reconcile(
      &request("2025-01-01T10:00:00Z"),
      &tender_doc(
        "T",
        json!([]),
        json!([complaint("C1", Some("дискримінаційний")), complaint("C2", Some("дискримінаційний"))]),
      ),
    )
    .await;

  let (a, b) = tokio::join!(
    aggregator.analyze_complaint(T1, "C1"),
    aggregator.analyze_complaint(T1, "C2"),
  );
  a.unwrap();
  b.unwrap();

  let stored = h.store.get_violation_score(T1).await.unwrap().unwrap();
  assert_eq!(stored.scores["0"].keywords["дискримінаційний"], 2);
  assert!((stored.scores["0"].score - 2.0 * 2f64.ln()).abs() < 1e-9);
}

#[tokio::test]
async fn empty_description_still_stores_highlights() {
  let h = harness().await;
  let aggregator = ViolationScoreAggregator::new(h.store.clone(), annotator()).unwrap();
  h.reconciler
    .reconcile(&request("2025-01-01T10:00:00Z"), &tender_doc("T", json!([]), json!([complaint("C1", None)])))
    .await;

  let score = aggregator.analyze_complaint(T1, "C1").await.unwrap();
  assert!(score.scores.is_empty());
  let c1 = h.store.get_complaint("C1").await.unwrap().unwrap();
  assert_eq!(c1.highlighted_keywords, Some(vec![]));
}

#[tokio::test]
async fn unknown_complaint_is_an_error() {
  let h = harness().await;
  let aggregator = ViolationScoreAggregator::new(h.store.clone(), annotator()).unwrap();
  assert!(aggregator.analyze_complaint(T1, "nope").await.is_err());
}

#[tokio::test]
async fn aggregator_refuses_an_empty_keyword_table() {
  let h = harness().await;
  let empty = Arc::new(LexiconAnnotator::new(KeywordTable::default(), Lemmatizer::default()));
  assert!(matches!(
    ViolationScoreAggregator::new(h.store.clone(), empty),
    Err(tenderwatch_core::Error::AnnotationUnavailable(_))
  ));
}

// ─── Purge ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn delete_tender_removes_everything() {
  let h = harness().await;
  let aggregator = ViolationScoreAggregator::new(h.store.clone(), annotator()).unwrap();
  h.reconciler
    .reconcile(
      &request("2025-01-01T10:00:00Z"),
      &tender_doc("Old", json!([bid("B1", "active", 1.0)]), json!([complaint("C1", Some("дискримінаційний"))])),
    )
    .await;
  h.reconciler
    .reconcile(
      &request("2025-01-02T10:00:00Z"),
      &tender_doc("New", json!([bid("B1", "deleted", 1.0)]), json!([complaint("C1", Some("дискримінаційний"))])),
    )
    .await;
  aggregator.analyze_complaint(T1, "C1").await.unwrap();
  h.store.add_subscription("user@example.org", T1).await.unwrap();

  assert!(h.store.delete_tender(T1).await.unwrap());
  assert!(h.store.get_tender(T1).await.unwrap().is_none());
  assert!(h.store.get_complaint("C1").await.unwrap().is_none());
  assert!(h.store.get_violation_score(T1).await.unwrap().is_none());
  assert!(h.store.subscribed_tender_ocids().await.unwrap().is_empty());
  assert_eq!(total_changes(&h.store).await, 0);

  assert!(!h.store.delete_tender(T1).await.unwrap());
}

// ─── Subscriptions & reports ─────────────────────────────────────────────────

#[tokio::test]
async fn subscriptions_are_unique_and_require_a_tender() {
  let h = harness().await;
  assert!(h.store.add_subscription("a@example.org", T1).await.is_err());

  h.reconciler
    .reconcile(&request("2025-01-01T10:00:00Z"), &tender_doc("T", json!([]), json!([])))
    .await;
  h.store.add_subscription("a@example.org", T1).await.unwrap();
  h.store.add_subscription("a@example.org", T1).await.unwrap();
  h.store.add_subscription("b@example.org", T1).await.unwrap();

  assert_eq!(h.store.subscribed_tender_ocids().await.unwrap(), vec![OCID.to_string()]);

  let modified = h
    .store
    .modified_tenders_with_subscribers(ts("2025-01-01T00:00:00Z"))
    .await
    .unwrap();
  assert_eq!(modified.len(), 1);
  assert_eq!(modified[0].subscribers, vec!["a@example.org", "b@example.org"]);

  let later = h
    .store
    .modified_tenders_with_subscribers(ts("2025-02-01T00:00:00Z"))
    .await
    .unwrap();
  assert!(later.is_empty());
}

#[tokio::test]
async fn report_lists_changes_and_new_entities_since() {
  let h = harness().await;
  h.reconciler
    .reconcile(
      &request("2025-01-01T10:00:00Z"),
      &tender_doc("Old", json!([bid("B1", "active", 950.0)]), json!([])),
    )
    .await;
  h.reconciler
    .reconcile(
      &request("2025-01-10T15:00:00Z"),
      &tender_doc("New", json!([bid("B1", "active", 950.0), bid("B2", "active", 900.0)]), json!([])),
    )
    .await;

  let report = TenderReport::generate(h.store.as_ref(), T1, ts("2025-01-05T00:00:00Z"))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(report.change_count(), 1);
  assert_eq!(report.changes[&EntityKind::Tender][0].field_name, "title");
  assert_eq!(report.new_entities.len(), 1);
  assert_eq!(report.new_entities[0].entity_id(), "B2");

  let text = report.render_text();
  assert!(text.contains("title: Old -> New"), "{text}");
  assert!(text.contains("Bid B2"), "{text}");

  let quiet = TenderReport::generate(h.store.as_ref(), T1, ts("2025-02-01T00:00:00Z"))
    .await
    .unwrap()
    .unwrap();
  assert!(quiet.is_quiet());

  assert!(TenderReport::generate(h.store.as_ref(), "missing", ts("2025-01-01T00:00:00Z"))
    .await
    .unwrap()
    .is_none());
}

#[tokio::test]
async fn digests_group_reports_by_subscriber() {
  let h = harness().await;
  h.reconciler
    .reconcile(&request("2025-01-10T15:00:00Z"), &tender_doc("T", json!([]), json!([])))
    .await;
  h.store.add_subscription("a@example.org", T1).await.unwrap();
  h.store.add_subscription("b@example.org", T1).await.unwrap();

  let digests = subscriber_digests(h.store.as_ref(), ts("2025-01-10T00:00:00Z")).await.unwrap();
  assert_eq!(digests.len(), 2);
  assert_eq!(digests[0].subscriber, "a@example.org");
  assert_eq!(digests[0].reports.len(), 1);
  assert_eq!(digests[0].reports[0].tender.id, T1);
}

// ─── Crawler ─────────────────────────────────────────────────────────────────

#[derive(Default)]
struct FakeSource {
  bridges:        Mutex<HashMap<String, BridgeInfo>>,
  details:        Mutex<HashMap<String, Value>>,
  detail_fetches: AtomicUsize,
}

impl FakeSource {
  fn publish(&self, modified: &str, doc: Option<Value>) {
    let info: BridgeInfo = serde_json::from_value(json!({
      "id": T1,
      "tenderID": OCID,
      "dateModified": modified,
      "generalClassifier": {"scheme": "ДК021", "description": "Будівельні роботи"},
    }))
    .unwrap();
    self.bridges.lock().unwrap().insert(OCID.into(), info);
    let mut details = self.details.lock().unwrap();
    match doc {
      Some(doc) => {
        details.insert(T1.into(), doc);
      }
      None => {
        details.remove(T1);
      }
    }
  }
}

impl TenderSource for FakeSource {
  async fn fetch_bridge_info(&self, ocid: &str) -> tenderwatch_core::Result<Option<BridgeInfo>> {
    Ok(self.bridges.lock().unwrap().get(ocid).cloned())
  }

  async fn fetch_tender_details(&self, tender_id: &str) -> tenderwatch_core::Result<Option<Value>> {
    self.detail_fetches.fetch_add(1, Ordering::SeqCst);
    Ok(self.details.lock().unwrap().get(tender_id).cloned())
  }

  async fn fetch_search_page(&self, page: usize) -> tenderwatch_core::Result<Option<Vec<String>>> {
    Ok((page == 0).then(|| vec![OCID.to_string()]))
  }
}

#[tokio::test]
async fn crawler_skips_detail_fetch_when_unchanged() {
  let h = harness().await;
  let source = Arc::new(FakeSource::default());
  let crawler = TenderCrawler::new(h.reconciler, source.clone());

  source.publish("2025-01-01T10:00:00Z", Some(tender_doc("T", json!([]), json!([]))));
  assert!(crawler.sync_single_tender(OCID, Priority::Interactive).await);
  assert_eq!(source.detail_fetches.load(Ordering::SeqCst), 1);

  assert!(crawler.sync_single_tender(OCID, Priority::Interactive).await);
  assert_eq!(source.detail_fetches.load(Ordering::SeqCst), 1);

  let tender = h.store.get_tender_by_ocid(OCID).await.unwrap().unwrap();
  assert!(tender.classifier_id.is_some());
}

#[tokio::test]
async fn crawler_fails_without_details_or_bridge() {
  let h = harness().await;
  let source = Arc::new(FakeSource::default());
  let crawler = TenderCrawler::new(h.reconciler, source.clone());

  assert!(!crawler.sync_single_tender(OCID, Priority::Background).await);

  source.publish("2025-01-01T10:00:00Z", None);
  assert!(!crawler.sync_single_tender(OCID, Priority::Background).await);
  assert!(h.store.get_tender(T1).await.unwrap().is_none());
}

#[tokio::test]
async fn crawler_syncs_subscribed_and_search_pages() {
  let h = harness().await;
  let source = Arc::new(FakeSource::default());
  let crawler = TenderCrawler::new(h.reconciler, source.clone());

  source.publish("2025-01-01T10:00:00Z", Some(tender_doc("Old", json!([]), json!([]))));
  assert_eq!(crawler.crawl_tenders(3).await, 1);
  h.store.add_subscription("a@example.org", T1).await.unwrap();

  source.publish("2025-01-02T10:00:00Z", Some(tender_doc("New", json!([]), json!([]))));
  assert_eq!(crawler.sync_subscribed_tenders().await, 1);
  let tender = h.store.get_tender(T1).await.unwrap().unwrap();
  assert_eq!(tender.title.as_deref(), Some("New"));
}
