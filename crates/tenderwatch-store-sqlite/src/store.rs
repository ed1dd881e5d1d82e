//! [`SqliteStore`]: the SQLite implementation of [`TenderStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, TransactionBehavior, types::Value};
use tenderwatch_core::{
  change::ChangeRecord,
  entity::{Classifier, Complaint, EntityKind, EntityRecord, Tender, TenderAggregate},
  score::{Highlight, ScoreContribution, ViolationScore},
  store::{SubscribedTender, TenderStore},
  transaction::{PendingTransaction, RowWrite},
};
use tracing::{debug, info};

use crate::{
  Error, Result,
  encode::{
    AWARD_COLUMNS, BID_COLUMNS, COMPLAINT_COLUMNS, DOCUMENT_COLUMNS, RawAward, RawBid, RawChange,
    RawClassifier, RawComplaint, RawDocument, RawScore, RawTender, TENDER_COLUMNS, decode_dt,
    encode_change, encode_dt, encode_highlights, encode_record, encode_scores,
  },
  schema::SCHEMA,
};

/// Box a non-SQLite error so it can leave a `call` closure.
fn other<E: std::error::Error + Send + Sync + 'static>(e: E) -> tokio_rusqlite::Error {
  tokio_rusqlite::Error::Other(Box::new(e))
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A tender store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection handle is shared.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn find_tender(&self, column: &'static str, value: &str) -> Result<Option<Tender>> {
    let value = value.to_owned();
    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {TENDER_COLUMNS} FROM tenders WHERE {column} = ?1"),
              [&value],
              RawTender::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawTender::into_tender).transpose()
  }

  /// Number of change rows of one kind for a tender, regardless of date.
  pub async fn change_count(&self, kind: EntityKind, tender_id: &str) -> Result<usize> {
    let tender_id = tender_id.to_owned();
    let n: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          &format!("SELECT COUNT(*) FROM {} WHERE tender_id = ?1", kind.change_table()),
          [&tender_id],
          |r| r.get(0),
        )?)
      })
      .await?;
    Ok(usize::try_from(n).unwrap_or_default())
  }
}

fn query_all<T>(
  conn: &rusqlite::Connection,
  sql: &str,
  params: impl rusqlite::Params,
  f: fn(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
) -> rusqlite::Result<Vec<T>> {
  let mut stmt = conn.prepare(sql)?;
  stmt.query_map(params, f)?.collect()
}

// ─── TenderStore impl ────────────────────────────────────────────────────────

impl TenderStore for SqliteStore {
  type Error = Error;

  // ── Tenders ───────────────────────────────────────────────────────────────

  async fn get_tender(&self, id: &str) -> Result<Option<Tender>> {
    self.find_tender("tender_id", id).await
  }

  async fn get_tender_by_ocid(&self, ocid: &str) -> Result<Option<Tender>> {
    self.find_tender("ocid", ocid).await
  }

  async fn get_tender_with_relations(&self, id: &str) -> Result<Option<TenderAggregate>> {
    let id = id.to_owned();
    let raw = self
      .conn
      .call(move |conn| {
        let Some(tender) = conn
          .query_row(
            &format!("SELECT {TENDER_COLUMNS} FROM tenders WHERE tender_id = ?1"),
            [&id],
            RawTender::from_row,
          )
          .optional()?
        else {
          return Ok(None);
        };

        let documents = query_all(
          conn,
          &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE tender_id = ?1 ORDER BY rowid"),
          [&id],
          RawDocument::from_row,
        )?;
        let bids = query_all(
          conn,
          &format!("SELECT {BID_COLUMNS} FROM bids WHERE tender_id = ?1 ORDER BY rowid"),
          [&id],
          RawBid::from_row,
        )?;
        let awards = query_all(
          conn,
          &format!("SELECT {AWARD_COLUMNS} FROM awards WHERE tender_id = ?1 ORDER BY rowid"),
          [&id],
          RawAward::from_row,
        )?;
        let complaints = query_all(
          conn,
          &format!("SELECT {COMPLAINT_COLUMNS} FROM complaints WHERE tender_id = ?1 ORDER BY rowid"),
          [&id],
          RawComplaint::from_row,
        )?;

        Ok(Some((tender, documents, bids, awards, complaints)))
      })
      .await?;

    let Some((tender, documents, bids, awards, complaints)) = raw else {
      return Ok(None);
    };

    Ok(Some(TenderAggregate {
      tender:     tender.into_tender()?,
      documents:  documents.into_iter().map(RawDocument::into_document).collect::<Result<_>>()?,
      bids:       bids.into_iter().map(RawBid::into_bid).collect::<Result<_>>()?,
      awards:     awards.into_iter().map(RawAward::into_award).collect::<Result<_>>()?,
      complaints: complaints
        .into_iter()
        .map(RawComplaint::into_complaint)
        .collect::<Result<_>>()?,
    }))
  }

  async fn commit(&self, tx: PendingTransaction) -> Result<()> {
    let (writes, changes) = tx.into_parts()?;
    if writes.is_empty() && changes.is_empty() {
      return Ok(());
    }

    let mut statements: Vec<(String, Vec<Value>)> =
      Vec::with_capacity(writes.len() + changes.len());
    for write in &writes {
      let row = encode_record(write.record());
      statements.push(match write {
        RowWrite::Insert(_) => row.insert_sql(),
        RowWrite::Update(_) => row.update_sql(),
      });
    }
    statements.extend(changes.iter().map(encode_change));

    let (n_writes, n_changes) = (writes.len(), changes.len());
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        for (sql, params) in &statements {
          tx.execute(sql, rusqlite::params_from_iter(params.iter()))?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    debug!(writes = n_writes, changes = n_changes, "committed");
    Ok(())
  }

  async fn delete_tender(&self, tender_id: &str) -> Result<bool> {
    let id = tender_id.to_owned();
    let removed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        for kind in [
          EntityKind::Complaint,
          EntityKind::Award,
          EntityKind::Bid,
          EntityKind::Document,
          EntityKind::Tender,
        ] {
          tx.execute(
            &format!("DELETE FROM {} WHERE tender_id = ?1", kind.change_table()),
            [&id],
          )?;
        }
        for table in [
          "violation_scores",
          "subscriptions",
          "complaints",
          "awards",
          "bids",
          "documents",
        ] {
          tx.execute(&format!("DELETE FROM {table} WHERE tender_id = ?1"), [&id])?;
        }
        let n = tx.execute("DELETE FROM tenders WHERE tender_id = ?1", [&id])?;
        tx.commit()?;
        Ok(n > 0)
      })
      .await?;

    if removed {
      info!(tender_id, "tender purged");
    }
    Ok(removed)
  }

  // ── Classifiers ───────────────────────────────────────────────────────────

  async fn get_or_create_classifier(&self, scheme: &str, description: &str) -> Result<Classifier> {
    let scheme = scheme.to_owned();
    let description = description.to_owned();
    let raw = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO classifiers (scheme, description) VALUES (?1, ?2)
           ON CONFLICT (scheme, description) DO NOTHING",
          rusqlite::params![scheme, description],
        )?;
        Ok(conn.query_row(
          "SELECT classifier_id, scheme, description FROM classifiers
           WHERE scheme = ?1 AND description = ?2",
          rusqlite::params![scheme, description],
          |r| {
            Ok(RawClassifier {
              classifier_id: r.get(0)?,
              scheme:        r.get(1)?,
              description:   r.get(2)?,
            })
          },
        )?)
      })
      .await?;
    Ok(raw.into_classifier())
  }

  // ── Complaints & scores ───────────────────────────────────────────────────

  async fn get_complaint(&self, complaint_id: &str) -> Result<Option<Complaint>> {
    let complaint_id = complaint_id.to_owned();
    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {COMPLAINT_COLUMNS} FROM complaints WHERE complaint_id = ?1"),
              [&complaint_id],
              RawComplaint::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawComplaint::into_complaint).transpose()
  }

  async fn apply_complaint_analysis(
    &self,
    tender_id: &str,
    complaint_id: &str,
    highlights: Vec<Highlight>,
    contribution: ScoreContribution,
  ) -> Result<ViolationScore> {
    let highlights_json = encode_highlights(&highlights)?;
    let tid = tender_id.to_owned();
    let cid = complaint_id.to_owned();

    let outcome = self
      .conn
      .call(move |conn| {
        // IMMEDIATE takes the write lock up front, so two analyses of the same
        // tender cannot both read the old score.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current: Option<Option<String>> = tx
          .query_row(
            "SELECT highlighted_keywords FROM complaints
             WHERE complaint_id = ?1 AND tender_id = ?2",
            [&cid, &tid],
            |r| r.get(0),
          )
          .optional()?;
        let Some(current) = current else {
          return Ok(None);
        };

        let existing = tx
          .query_row(
            "SELECT tender_id, scores, date_calculated FROM violation_scores WHERE tender_id = ?1",
            [&tid],
            |r| {
              Ok(RawScore {
                tender_id:       r.get(0)?,
                scores:          r.get(1)?,
                date_calculated: r.get(2)?,
              })
            },
          )
          .optional()?
          .map(RawScore::into_score)
          .transpose()
          .map_err(other)?;

        if current.is_some() {
          let score = existing
            .unwrap_or_else(|| ViolationScore::new(tid.clone(), ScoreContribution::default()));
          return Ok(Some((score, false)));
        }

        let score = ViolationScore::merged(existing, &tid, contribution);
        let scores_json = encode_scores(&score).map_err(other)?;

        tx.execute(
          "UPDATE complaints SET highlighted_keywords = ?1 WHERE complaint_id = ?2",
          [&highlights_json, &cid],
        )?;
        tx.execute(
          "INSERT INTO violation_scores (tender_id, scores, date_calculated)
           VALUES (?1, ?2, ?3)
           ON CONFLICT (tender_id) DO UPDATE
             SET scores = excluded.scores, date_calculated = excluded.date_calculated",
          rusqlite::params![tid, scores_json, encode_dt(score.date_calculated)],
        )?;
        tx.commit()?;
        Ok(Some((score, true)))
      })
      .await?;

    match outcome {
      Some((score, true)) => Ok(score),
      Some((score, false)) => {
        debug!(tender_id, complaint_id, "complaint already analyzed");
        Ok(score)
      }
      None => Err(Error::ComplaintNotFound {
        tender_id:    tender_id.to_owned(),
        complaint_id: complaint_id.to_owned(),
      }),
    }
  }

  async fn get_violation_score(&self, tender_id: &str) -> Result<Option<ViolationScore>> {
    let tender_id = tender_id.to_owned();
    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT tender_id, scores, date_calculated FROM violation_scores WHERE tender_id = ?1",
              [&tender_id],
              |r| {
                Ok(RawScore {
                  tender_id:       r.get(0)?,
                  scores:          r.get(1)?,
                  date_calculated: r.get(2)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawScore::into_score).transpose()
  }

  // ── History ───────────────────────────────────────────────────────────────

  async fn changes_since(
    &self,
    kind: EntityKind,
    tender_id: &str,
    since: DateTime<Utc>,
  ) -> Result<Vec<ChangeRecord>> {
    let tender_id = tender_id.to_owned();
    let since = encode_dt(since);
    let raw = self
      .conn
      .call(move |conn| {
        Ok(query_all(
          conn,
          &format!(
            "SELECT {fk} AS entity_id, tender_id, change_date, field_name, old_value, new_value
             FROM {table}
             WHERE tender_id = ?1 AND change_date >= ?2
             ORDER BY change_date, change_id",
            fk = kind.change_fk_column(),
            table = kind.change_table(),
          ),
          [&tender_id, &since],
          RawChange::from_row,
        )?)
      })
      .await?;
    raw.into_iter().map(|r| r.into_change(kind)).collect()
  }

  async fn new_entities_since(
    &self,
    tender_id: &str,
    since: DateTime<Utc>,
  ) -> Result<Vec<EntityRecord>> {
    let tender_id = tender_id.to_owned();
    let since = encode_dt(since);
    let (documents, bids, awards, complaints) = self
      .conn
      .call(move |conn| {
        let filter = "WHERE tender_id = ?1 AND first_seen >= ?2 ORDER BY rowid";
        let documents = query_all(
          conn,
          &format!("SELECT {DOCUMENT_COLUMNS} FROM documents {filter}"),
          [&tender_id, &since],
          RawDocument::from_row,
        )?;
        let bids = query_all(
          conn,
          &format!("SELECT {BID_COLUMNS} FROM bids {filter}"),
          [&tender_id, &since],
          RawBid::from_row,
        )?;
        let awards = query_all(
          conn,
          &format!("SELECT {AWARD_COLUMNS} FROM awards {filter}"),
          [&tender_id, &since],
          RawAward::from_row,
        )?;
        let complaints = query_all(
          conn,
          &format!("SELECT {COMPLAINT_COLUMNS} FROM complaints {filter}"),
          [&tender_id, &since],
          RawComplaint::from_row,
        )?;
        Ok((documents, bids, awards, complaints))
      })
      .await?;

    let mut out = Vec::with_capacity(documents.len() + bids.len() + awards.len() + complaints.len());
    for d in documents {
      out.push(EntityRecord::Document(d.into_document()?));
    }
    for b in bids {
      out.push(EntityRecord::Bid(b.into_bid()?));
    }
    for a in awards {
      out.push(EntityRecord::Award(a.into_award()?));
    }
    for c in complaints {
      out.push(EntityRecord::Complaint(c.into_complaint()?));
    }
    Ok(out)
  }

  // ── Subscriptions ─────────────────────────────────────────────────────────

  async fn add_subscription(&self, subscriber: &str, tender_id: &str) -> Result<()> {
    if self.get_tender(tender_id).await?.is_none() {
      return Err(Error::TenderNotFound(tender_id.to_owned()));
    }
    let subscriber = subscriber.to_owned();
    let tender_id = tender_id.to_owned();
    let now = encode_dt(Utc::now());
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO subscriptions (subscriber, tender_id, created_at) VALUES (?1, ?2, ?3)
           ON CONFLICT (subscriber, tender_id) DO NOTHING",
          rusqlite::params![subscriber, tender_id, now],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn subscribed_tender_ocids(&self) -> Result<Vec<String>> {
    let ocids = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT DISTINCT t.ocid FROM subscriptions s
           JOIN tenders t ON t.tender_id = s.tender_id
           ORDER BY t.ocid",
        )?;
        let rows = stmt
          .query_map([], |r| r.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(ocids)
  }

  async fn modified_tenders_with_subscribers(
    &self,
    since: DateTime<Utc>,
  ) -> Result<Vec<SubscribedTender>> {
    let since = encode_dt(since);
    let rows: Vec<(String, String, String, String)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT t.tender_id, t.ocid, t.date_modified, s.subscriber
           FROM tenders t
           JOIN subscriptions s ON s.tender_id = t.tender_id
           WHERE t.date_modified >= ?1
           ORDER BY t.tender_id, s.subscriber",
        )?;
        let rows = stmt
          .query_map([&since], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let mut out: Vec<SubscribedTender> = Vec::new();
    for (tender_id, ocid, date_modified, subscriber) in rows {
      match out.last_mut() {
        Some(last) if last.tender_id == tender_id => last.subscribers.push(subscriber),
        _ => out.push(SubscribedTender {
          tender_id,
          ocid,
          date_modified: decode_dt(&date_modified)?,
          subscribers: vec![subscriber],
        }),
      }
    }
    Ok(out)
  }
}
