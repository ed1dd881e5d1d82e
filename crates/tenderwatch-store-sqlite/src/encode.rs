//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings in UTC with
//! microsecond precision. Amounts are decimal strings rounded to cents.
//! Highlights and score maps are compact JSON.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Row, types::Value};
use rust_decimal::Decimal;
use tenderwatch_core::{
  change::ChangeRecord,
  entity::{
    Award, Bid, Classifier, Complaint, EntityKind, EntityRecord, Tender, TenderDocument,
  },
  field::quantize,
  score::{DomainScore, Highlight, ViolationScore},
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

fn opt_dt(dt: Option<DateTime<Utc>>) -> Value {
  Value::from(dt.map(encode_dt))
}

fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

// ─── Decimal ─────────────────────────────────────────────────────────────────

fn encode_amount(d: Option<Decimal>) -> Value {
  Value::from(d.map(|d| {
    let mut q = quantize(d);
    q.rescale(2);
    q.to_string()
  }))
}

fn decode_amount(s: Option<String>) -> Result<Option<Decimal>> {
  Ok(s.as_deref().map(str::parse::<Decimal>).transpose()?)
}

// ─── JSON blobs ──────────────────────────────────────────────────────────────

pub fn encode_highlights(h: &[Highlight]) -> Result<String> {
  Ok(serde_json::to_string(h)?)
}

fn decode_highlights(s: Option<String>) -> Result<Option<Vec<Highlight>>> {
  Ok(s.as_deref().map(serde_json::from_str).transpose()?)
}

pub fn encode_scores(score: &ViolationScore) -> Result<String> {
  Ok(serde_json::to_string(&score.scores)?)
}

// ─── Entity writes ───────────────────────────────────────────────────────────

/// One entity row, split into the columns every write sets and the ones only
/// an insert sets.
pub struct EncodedRow {
  table:  &'static str,
  key:    &'static str,
  id:     String,
  /// Owner and first-seen stamp; fixed once inserted.
  fixed:  Vec<(&'static str, Value)>,
  fields: Vec<(&'static str, Value)>,
}

impl EncodedRow {
  pub fn insert_sql(self) -> (String, Vec<Value>) {
    let mut names = vec![self.key];
    let mut values = vec![Value::Text(self.id)];
    for (name, value) in self.fixed.into_iter().chain(self.fields) {
      names.push(name);
      values.push(value);
    }
    let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
      "INSERT INTO {} ({}) VALUES ({})",
      self.table,
      names.join(", "),
      placeholders.join(", "),
    );
    (sql, values)
  }

  pub fn update_sql(self) -> (String, Vec<Value>) {
    let mut sets = Vec::with_capacity(self.fields.len());
    let mut values = vec![Value::Text(self.id)];
    for (i, (name, value)) in self.fields.into_iter().enumerate() {
      sets.push(format!("{name} = ?{}", i + 2));
      values.push(value);
    }
    let sql = format!("UPDATE {} SET {} WHERE {} = ?1", self.table, sets.join(", "), self.key);
    (sql, values)
  }
}

fn text(s: &Option<String>) -> Value {
  Value::from(s.clone())
}

pub fn encode_record(record: &EntityRecord) -> EncodedRow {
  match record {
    EntityRecord::Tender(t) => EncodedRow {
      table:  "tenders",
      key:    "tender_id",
      id:     t.id.clone(),
      fixed:  vec![("ocid", Value::Text(t.ocid.clone()))],
      fields: vec![
        ("date_created", Value::Text(encode_dt(t.date_created))),
        ("date_modified", Value::Text(encode_dt(t.date_modified))),
        ("title", text(&t.title)),
        ("value_amount", encode_amount(t.value_amount)),
        ("status", text(&t.status)),
        ("enquiry_period_start_date", opt_dt(t.enquiry_period_start_date)),
        ("enquiry_period_end_date", opt_dt(t.enquiry_period_end_date)),
        ("tender_period_start_date", opt_dt(t.tender_period_start_date)),
        ("tender_period_end_date", opt_dt(t.tender_period_end_date)),
        ("auction_period_start_date", opt_dt(t.auction_period_start_date)),
        ("auction_period_end_date", opt_dt(t.auction_period_end_date)),
        ("award_period_start_date", opt_dt(t.award_period_start_date)),
        ("award_period_end_date", opt_dt(t.award_period_end_date)),
        ("notice_publication_date", opt_dt(t.notice_publication_date)),
        ("classifier_id", Value::from(t.classifier_id)),
      ],
    },
    EntityRecord::Document(d) => EncodedRow {
      table:  "documents",
      key:    "document_id",
      id:     d.id.clone(),
      fixed:  vec![
        ("tender_id", Value::Text(d.tender_id.clone())),
        ("first_seen", opt_dt(d.first_seen)),
      ],
      fields: vec![
        ("status", text(&d.status)),
        ("document_of", text(&d.document_of)),
        ("title", text(&d.title)),
        ("format", text(&d.format)),
        ("url", text(&d.url)),
        ("hash", text(&d.hash)),
        ("date_published", opt_dt(d.date_published)),
        ("date_modified", opt_dt(d.date_modified)),
      ],
    },
    EntityRecord::Bid(b) => EncodedRow {
      table:  "bids",
      key:    "bid_id",
      id:     b.id.clone(),
      fixed:  vec![
        ("tender_id", Value::Text(b.tender_id.clone())),
        ("first_seen", opt_dt(b.first_seen)),
      ],
      fields: vec![
        ("status", text(&b.status)),
        ("date", opt_dt(b.date)),
        ("value_amount", encode_amount(b.value_amount)),
        ("tenderer_id", text(&b.tenderer_id)),
        ("tenderer_legal_name", text(&b.tenderer_legal_name)),
      ],
    },
    EntityRecord::Award(a) => EncodedRow {
      table:  "awards",
      key:    "award_id",
      id:     a.id.clone(),
      fixed:  vec![
        ("tender_id", Value::Text(a.tender_id.clone())),
        ("first_seen", opt_dt(a.first_seen)),
      ],
      fields: vec![
        ("bid_id", text(&a.bid_id)),
        ("status", text(&a.status)),
        ("title", text(&a.title)),
        ("value_amount", encode_amount(a.value_amount)),
        ("award_date", opt_dt(a.award_date)),
        ("complaint_period_start_date", opt_dt(a.complaint_period_start_date)),
        ("complaint_period_end_date", opt_dt(a.complaint_period_end_date)),
      ],
    },
    // `highlighted_keywords` belongs to the scoring pipeline and is never
    // written from here.
    EntityRecord::Complaint(c) => EncodedRow {
      table:  "complaints",
      key:    "complaint_id",
      id:     c.id.clone(),
      fixed:  vec![
        ("tender_id", Value::Text(c.tender_id.clone())),
        ("first_seen", opt_dt(c.first_seen)),
      ],
      fields: vec![
        ("status", text(&c.status)),
        ("title", text(&c.title)),
        ("description", text(&c.description)),
        ("complaint_type", text(&c.complaint_type)),
        ("date", opt_dt(c.date)),
        ("date_submitted", opt_dt(c.date_submitted)),
        ("date_answered", opt_dt(c.date_answered)),
      ],
    },
  }
}

pub fn encode_change(c: &ChangeRecord) -> (String, Vec<Value>) {
  let table = c.kind.change_table();
  let mut values = vec![
    Value::Text(c.tender_id.clone()),
    Value::Text(encode_dt(c.change_date)),
    Value::Text(c.field_name.clone()),
    Value::from(c.old_value.clone()),
    Value::from(c.new_value.clone()),
  ];

  let sql = if c.kind == EntityKind::Tender {
    format!(
      "INSERT INTO {table} (tender_id, change_date, field_name, old_value, new_value)
       VALUES (?1, ?2, ?3, ?4, ?5)"
    )
  } else {
    values.push(Value::Text(c.entity_id.clone()));
    format!(
      "INSERT INTO {table} (tender_id, change_date, field_name, old_value, new_value, {})
       VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
      c.kind.change_fk_column(),
    )
  };
  (sql, values)
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const TENDER_COLUMNS: &str = "tender_id, ocid, date_created, date_modified, title, \
  value_amount, status, enquiry_period_start_date, enquiry_period_end_date, \
  tender_period_start_date, tender_period_end_date, auction_period_start_date, \
  auction_period_end_date, award_period_start_date, award_period_end_date, \
  notice_publication_date, classifier_id";

/// Raw strings read directly from a `tenders` row.
pub struct RawTender {
  pub tender_id:                 String,
  pub ocid:                      String,
  pub date_created:              String,
  pub date_modified:             String,
  pub title:                     Option<String>,
  pub value_amount:              Option<String>,
  pub status:                    Option<String>,
  pub enquiry_period_start_date: Option<String>,
  pub enquiry_period_end_date:   Option<String>,
  pub tender_period_start_date:  Option<String>,
  pub tender_period_end_date:    Option<String>,
  pub auction_period_start_date: Option<String>,
  pub auction_period_end_date:   Option<String>,
  pub award_period_start_date:   Option<String>,
  pub award_period_end_date:     Option<String>,
  pub notice_publication_date:   Option<String>,
  pub classifier_id:             Option<i64>,
}

impl RawTender {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      tender_id:                 row.get("tender_id")?,
      ocid:                      row.get("ocid")?,
      date_created:              row.get("date_created")?,
      date_modified:             row.get("date_modified")?,
      title:                     row.get("title")?,
      value_amount:              row.get("value_amount")?,
      status:                    row.get("status")?,
      enquiry_period_start_date: row.get("enquiry_period_start_date")?,
      enquiry_period_end_date:   row.get("enquiry_period_end_date")?,
      tender_period_start_date:  row.get("tender_period_start_date")?,
      tender_period_end_date:    row.get("tender_period_end_date")?,
      auction_period_start_date: row.get("auction_period_start_date")?,
      auction_period_end_date:   row.get("auction_period_end_date")?,
      award_period_start_date:   row.get("award_period_start_date")?,
      award_period_end_date:     row.get("award_period_end_date")?,
      notice_publication_date:   row.get("notice_publication_date")?,
      classifier_id:             row.get("classifier_id")?,
    })
  }

  pub fn into_tender(self) -> Result<Tender> {
    Ok(Tender {
      id:                        self.tender_id,
      ocid:                      self.ocid,
      date_created:              decode_dt(&self.date_created)?,
      date_modified:             decode_dt(&self.date_modified)?,
      title:                     self.title,
      value_amount:              decode_amount(self.value_amount)?,
      status:                    self.status,
      enquiry_period_start_date: decode_opt_dt(self.enquiry_period_start_date)?,
      enquiry_period_end_date:   decode_opt_dt(self.enquiry_period_end_date)?,
      tender_period_start_date:  decode_opt_dt(self.tender_period_start_date)?,
      tender_period_end_date:    decode_opt_dt(self.tender_period_end_date)?,
      auction_period_start_date: decode_opt_dt(self.auction_period_start_date)?,
      auction_period_end_date:   decode_opt_dt(self.auction_period_end_date)?,
      award_period_start_date:   decode_opt_dt(self.award_period_start_date)?,
      award_period_end_date:     decode_opt_dt(self.award_period_end_date)?,
      notice_publication_date:   decode_opt_dt(self.notice_publication_date)?,
      classifier_id:             self.classifier_id,
    })
  }
}

pub const DOCUMENT_COLUMNS: &str = "document_id, tender_id, status, document_of, title, \
  format, url, hash, date_published, date_modified, first_seen";

pub struct RawDocument {
  pub document_id:    String,
  pub tender_id:      String,
  pub status:         Option<String>,
  pub document_of:    Option<String>,
  pub title:          Option<String>,
  pub format:         Option<String>,
  pub url:            Option<String>,
  pub hash:           Option<String>,
  pub date_published: Option<String>,
  pub date_modified:  Option<String>,
  pub first_seen:     Option<String>,
}

impl RawDocument {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      document_id:    row.get("document_id")?,
      tender_id:      row.get("tender_id")?,
      status:         row.get("status")?,
      document_of:    row.get("document_of")?,
      title:          row.get("title")?,
      format:         row.get("format")?,
      url:            row.get("url")?,
      hash:           row.get("hash")?,
      date_published: row.get("date_published")?,
      date_modified:  row.get("date_modified")?,
      first_seen:     row.get("first_seen")?,
    })
  }

  pub fn into_document(self) -> Result<TenderDocument> {
    Ok(TenderDocument {
      id:             self.document_id,
      tender_id:      self.tender_id,
      status:         self.status,
      document_of:    self.document_of,
      title:          self.title,
      format:         self.format,
      url:            self.url,
      hash:           self.hash,
      date_published: decode_opt_dt(self.date_published)?,
      date_modified:  decode_opt_dt(self.date_modified)?,
      first_seen:     decode_opt_dt(self.first_seen)?,
    })
  }
}

pub const BID_COLUMNS: &str =
  "bid_id, tender_id, status, date, value_amount, tenderer_id, tenderer_legal_name, first_seen";

pub struct RawBid {
  pub bid_id:              String,
  pub tender_id:           String,
  pub status:              Option<String>,
  pub date:                Option<String>,
  pub value_amount:        Option<String>,
  pub tenderer_id:         Option<String>,
  pub tenderer_legal_name: Option<String>,
  pub first_seen:          Option<String>,
}

impl RawBid {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      bid_id:              row.get("bid_id")?,
      tender_id:           row.get("tender_id")?,
      status:              row.get("status")?,
      date:                row.get("date")?,
      value_amount:        row.get("value_amount")?,
      tenderer_id:         row.get("tenderer_id")?,
      tenderer_legal_name: row.get("tenderer_legal_name")?,
      first_seen:          row.get("first_seen")?,
    })
  }

  pub fn into_bid(self) -> Result<Bid> {
    Ok(Bid {
      id:                  self.bid_id,
      tender_id:           self.tender_id,
      status:              self.status,
      date:                decode_opt_dt(self.date)?,
      value_amount:        decode_amount(self.value_amount)?,
      tenderer_id:         self.tenderer_id,
      tenderer_legal_name: self.tenderer_legal_name,
      first_seen:          decode_opt_dt(self.first_seen)?,
    })
  }
}

pub const AWARD_COLUMNS: &str = "award_id, tender_id, bid_id, status, title, value_amount, \
  award_date, complaint_period_start_date, complaint_period_end_date, first_seen";

pub struct RawAward {
  pub award_id:                    String,
  pub tender_id:                   String,
  pub bid_id:                      Option<String>,
  pub status:                      Option<String>,
  pub title:                       Option<String>,
  pub value_amount:                Option<String>,
  pub award_date:                  Option<String>,
  pub complaint_period_start_date: Option<String>,
  pub complaint_period_end_date:   Option<String>,
  pub first_seen:                  Option<String>,
}

impl RawAward {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      award_id:                    row.get("award_id")?,
      tender_id:                   row.get("tender_id")?,
      bid_id:                      row.get("bid_id")?,
      status:                      row.get("status")?,
      title:                       row.get("title")?,
      value_amount:                row.get("value_amount")?,
      award_date:                  row.get("award_date")?,
      complaint_period_start_date: row.get("complaint_period_start_date")?,
      complaint_period_end_date:   row.get("complaint_period_end_date")?,
      first_seen:                  row.get("first_seen")?,
    })
  }

  pub fn into_award(self) -> Result<Award> {
    Ok(Award {
      id:                          self.award_id,
      tender_id:                   self.tender_id,
      bid_id:                      self.bid_id,
      status:                      self.status,
      title:                       self.title,
      value_amount:                decode_amount(self.value_amount)?,
      award_date:                  decode_opt_dt(self.award_date)?,
      complaint_period_start_date: decode_opt_dt(self.complaint_period_start_date)?,
      complaint_period_end_date:   decode_opt_dt(self.complaint_period_end_date)?,
      first_seen:                  decode_opt_dt(self.first_seen)?,
    })
  }
}

pub const COMPLAINT_COLUMNS: &str = "complaint_id, tender_id, status, title, description, \
  complaint_type, date, date_submitted, date_answered, highlighted_keywords, first_seen";

pub struct RawComplaint {
  pub complaint_id:         String,
  pub tender_id:            String,
  pub status:               Option<String>,
  pub title:                Option<String>,
  pub description:          Option<String>,
  pub complaint_type:       Option<String>,
  pub date:                 Option<String>,
  pub date_submitted:       Option<String>,
  pub date_answered:        Option<String>,
  pub highlighted_keywords: Option<String>,
  pub first_seen:           Option<String>,
}

impl RawComplaint {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      complaint_id:         row.get("complaint_id")?,
      tender_id:            row.get("tender_id")?,
      status:               row.get("status")?,
      title:                row.get("title")?,
      description:          row.get("description")?,
      complaint_type:       row.get("complaint_type")?,
      date:                 row.get("date")?,
      date_submitted:       row.get("date_submitted")?,
      date_answered:        row.get("date_answered")?,
      highlighted_keywords: row.get("highlighted_keywords")?,
      first_seen:           row.get("first_seen")?,
    })
  }

  pub fn into_complaint(self) -> Result<Complaint> {
    Ok(Complaint {
      id:                   self.complaint_id,
      tender_id:            self.tender_id,
      status:               self.status,
      title:                self.title,
      description:          self.description,
      complaint_type:       self.complaint_type,
      date:                 decode_opt_dt(self.date)?,
      date_submitted:       decode_opt_dt(self.date_submitted)?,
      date_answered:        decode_opt_dt(self.date_answered)?,
      highlighted_keywords: decode_highlights(self.highlighted_keywords)?,
      first_seen:           decode_opt_dt(self.first_seen)?,
    })
  }
}

/// Raw strings read from a change table, with the owning-entity column
/// aliased to `entity_id`.
pub struct RawChange {
  pub entity_id:   String,
  pub tender_id:   String,
  pub change_date: String,
  pub field_name:  String,
  pub old_value:   Option<String>,
  pub new_value:   Option<String>,
}

impl RawChange {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      entity_id:   row.get("entity_id")?,
      tender_id:   row.get("tender_id")?,
      change_date: row.get("change_date")?,
      field_name:  row.get("field_name")?,
      old_value:   row.get("old_value")?,
      new_value:   row.get("new_value")?,
    })
  }

  pub fn into_change(self, kind: EntityKind) -> Result<ChangeRecord> {
    Ok(ChangeRecord {
      kind,
      entity_id: self.entity_id,
      tender_id: self.tender_id,
      change_date: decode_dt(&self.change_date)?,
      field_name: self.field_name,
      old_value: self.old_value,
      new_value: self.new_value,
    })
  }
}

pub struct RawClassifier {
  pub classifier_id: i64,
  pub scheme:        String,
  pub description:   String,
}

impl RawClassifier {
  pub fn into_classifier(self) -> Classifier {
    Classifier {
      id:          self.classifier_id,
      scheme:      self.scheme,
      description: self.description,
    }
  }
}

pub struct RawScore {
  pub tender_id:       String,
  pub scores:          String,
  pub date_calculated: String,
}

impl RawScore {
  pub fn into_score(self) -> Result<ViolationScore> {
    Ok(ViolationScore {
      tender_id:       self.tender_id,
      scores:          serde_json::from_str::<std::collections::BTreeMap<String, DomainScore>>(
        &self.scores,
      )?,
      date_calculated: decode_dt(&self.date_calculated)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn timestamps_sort_as_text() {
    let a = encode_dt(Utc.with_ymd_and_hms(2025, 1, 9, 23, 59, 59).unwrap());
    let b = encode_dt(Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap());
    assert!(a < b);
    assert_eq!(b, "2025-01-10T00:00:00.000000Z");
    assert_eq!(decode_dt(&b).unwrap(), Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap());
  }

  #[test]
  fn amounts_are_stored_to_the_cent() {
    assert_eq!(encode_amount(Some("950".parse().unwrap())), Value::Text("950.00".into()));
    assert_eq!(encode_amount(Some("0.125".parse().unwrap())), Value::Text("0.13".into()));
    assert_eq!(encode_amount(None), Value::Null);
  }

  #[test]
  fn update_leaves_fixed_columns_alone() {
    let row = encode_record(&EntityRecord::Bid(Bid {
      id:                  "B1".into(),
      tender_id:           "T1".into(),
      status:              Some("active".into()),
      date:                None,
      value_amount:        None,
      tenderer_id:         None,
      tenderer_legal_name: None,
      first_seen:          None,
    }));
    let (sql, values) = row.update_sql();
    assert!(sql.starts_with("UPDATE bids SET status = ?2"));
    assert!(sql.ends_with("WHERE bid_id = ?1"));
    assert!(!sql.contains("tender_id"));
    assert!(!sql.contains("first_seen"));
    assert_eq!(values[0], Value::Text("B1".into()));
  }
}
