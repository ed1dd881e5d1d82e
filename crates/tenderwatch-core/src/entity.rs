//! Persisted entities: the tender and its four kinds of sub-entity.
//!
//! Each entity implements [`TrackedEntity`], which exposes its static field
//! table to the updater. Sub-entities additionally implement [`SubEntity`],
//! which ties them to the wire payload they are parsed from.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
  field::{
    FieldKind, FieldSpec, FieldValue, amount_field, integer_field, text_field,
    timestamp_field,
  },
  payload::{AwardPayload, BidPayload, ComplaintPayload, DocumentPayload},
  score::Highlight,
};

/// The status value that marks a soft-deleted entity.
pub const STATUS_DELETED: &str = "deleted";

// ─── Kinds ───────────────────────────────────────────────────────────────────

/// The five kinds of entity that carry change history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
  Tender,
  Bid,
  Award,
  Document,
  Complaint,
}

impl EntityKind {
  pub const ALL: [Self; 5] =
    [Self::Tender, Self::Bid, Self::Award, Self::Document, Self::Complaint];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Tender => "tender",
      Self::Bid => "bid",
      Self::Award => "award",
      Self::Document => "document",
      Self::Complaint => "complaint",
    }
  }

  /// The append-only table holding this kind's change rows.
  pub fn change_table(self) -> &'static str {
    match self {
      Self::Tender => "tender_changes",
      Self::Bid => "bid_changes",
      Self::Award => "award_changes",
      Self::Document => "document_changes",
      Self::Complaint => "complaint_changes",
    }
  }

  /// Column in [`Self::change_table`] that references the owning entity.
  pub fn change_fk_column(self) -> &'static str {
    match self {
      Self::Tender => "tender_id",
      Self::Bid => "bid_id",
      Self::Award => "award_id",
      Self::Document => "document_id",
      Self::Complaint => "complaint_id",
    }
  }
}

impl fmt::Display for EntityKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

// ─── Traits ──────────────────────────────────────────────────────────────────

/// An entity whose fields are diffed and change-logged.
pub trait TrackedEntity: Clone + Send + Sync + 'static {
  const KIND: EntityKind;

  fn entity_id(&self) -> &str;
  fn status(&self) -> Option<&str>;
  fn set_status(&mut self, status: Option<String>);
  fn field_table() -> &'static [FieldSpec<Self>];
  fn into_record(self) -> EntityRecord;

  fn is_deleted(&self) -> bool {
    self.status() == Some(STATUS_DELETED)
  }
}

/// A tracked entity owned by a tender and parsed from a sub-array of the
/// tender document.
pub trait SubEntity: TrackedEntity {
  type Payload: DeserializeOwned;

  /// Fields compared when an incoming item matches a stored one.
  const FIELDS_TO_CHECK: &'static [&'static str];

  fn from_payload(payload: Self::Payload) -> Self;

  /// Bind a freshly parsed item to its owning tender before insertion.
  fn attach(&mut self, tender_id: &str, first_seen: DateTime<Utc>);
}

// ─── Classifier ──────────────────────────────────────────────────────────────

/// Shared lookup row, unique on `(scheme, description)`. Never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classifier {
  pub id:          i64,
  pub scheme:      String,
  pub description: String,
}

// ─── Tender ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tender {
  /// 32-character upstream UUID.
  pub id:                        String,
  /// Open-contracting code, fixed at creation.
  pub ocid:                      String,
  pub date_created:              DateTime<Utc>,
  /// Authoritative timestamp from the bridge summary.
  pub date_modified:             DateTime<Utc>,
  pub title:                     Option<String>,
  pub value_amount:              Option<Decimal>,
  pub status:                    Option<String>,
  pub enquiry_period_start_date: Option<DateTime<Utc>>,
  pub enquiry_period_end_date:   Option<DateTime<Utc>>,
  pub tender_period_start_date:  Option<DateTime<Utc>>,
  pub tender_period_end_date:    Option<DateTime<Utc>>,
  pub auction_period_start_date: Option<DateTime<Utc>>,
  pub auction_period_end_date:   Option<DateTime<Utc>>,
  pub award_period_start_date:   Option<DateTime<Utc>>,
  pub award_period_end_date:     Option<DateTime<Utc>>,
  pub notice_publication_date:   Option<DateTime<Utc>>,
  pub classifier_id:             Option<i64>,
}

/// Fixed set of top-level fields compared on every update pass.
pub const TENDER_FIELDS_TO_CHECK: &[&str] = &[
  "title",
  "value_amount",
  "status",
  "enquiry_period_start_date",
  "enquiry_period_end_date",
  "tender_period_start_date",
  "tender_period_end_date",
  "auction_period_start_date",
  "auction_period_end_date",
  "award_period_start_date",
  "award_period_end_date",
  "notice_publication_date",
  "date_created",
  "classifier_id",
];

static TENDER_FIELDS: &[FieldSpec<Tender>] = &[
  text_field!(Tender, "title", title),
  amount_field!(Tender, "value_amount", value_amount),
  text_field!(Tender, "status", status),
  timestamp_field!(Tender, "enquiry_period_start_date", enquiry_period_start_date),
  timestamp_field!(Tender, "enquiry_period_end_date", enquiry_period_end_date),
  timestamp_field!(Tender, "tender_period_start_date", tender_period_start_date),
  timestamp_field!(Tender, "tender_period_end_date", tender_period_end_date),
  timestamp_field!(Tender, "auction_period_start_date", auction_period_start_date),
  timestamp_field!(Tender, "auction_period_end_date", auction_period_end_date),
  timestamp_field!(Tender, "award_period_start_date", award_period_start_date),
  timestamp_field!(Tender, "award_period_end_date", award_period_end_date),
  timestamp_field!(Tender, "notice_publication_date", notice_publication_date),
  FieldSpec {
    name: "date_created",
    kind: FieldKind::Timestamp,
    get:  |t| Some(FieldValue::Timestamp(t.date_created)),
    set:  |t, v| {
      if let Some(ts) = v.and_then(FieldValue::into_timestamp) {
        t.date_created = ts;
      }
    },
  },
  integer_field!(Tender, "classifier_id", classifier_id),
];

impl TrackedEntity for Tender {
  const KIND: EntityKind = EntityKind::Tender;

  fn entity_id(&self) -> &str { &self.id }

  fn status(&self) -> Option<&str> { self.status.as_deref() }

  fn set_status(&mut self, status: Option<String>) { self.status = status; }

  fn field_table() -> &'static [FieldSpec<Self>] { TENDER_FIELDS }

  fn into_record(self) -> EntityRecord { EntityRecord::Tender(self) }
}

// ─── Bid ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bid {
  pub id:                  String,
  pub tender_id:           String,
  pub status:              Option<String>,
  pub date:                Option<DateTime<Utc>>,
  pub value_amount:        Option<Decimal>,
  pub tenderer_id:         Option<String>,
  pub tenderer_legal_name: Option<String>,
  pub first_seen:          Option<DateTime<Utc>>,
}

static BID_FIELDS: &[FieldSpec<Bid>] = &[
  text_field!(Bid, "status", status),
  timestamp_field!(Bid, "date", date),
  amount_field!(Bid, "value_amount", value_amount),
  text_field!(Bid, "tenderer_id", tenderer_id),
  text_field!(Bid, "tenderer_legal_name", tenderer_legal_name),
];

impl TrackedEntity for Bid {
  const KIND: EntityKind = EntityKind::Bid;

  fn entity_id(&self) -> &str { &self.id }

  fn status(&self) -> Option<&str> { self.status.as_deref() }

  fn set_status(&mut self, status: Option<String>) { self.status = status; }

  fn field_table() -> &'static [FieldSpec<Self>] { BID_FIELDS }

  fn into_record(self) -> EntityRecord { EntityRecord::Bid(self) }
}

impl SubEntity for Bid {
  type Payload = BidPayload;

  const FIELDS_TO_CHECK: &'static [&'static str] =
    &["status", "date", "value_amount", "tenderer_id", "tenderer_legal_name"];

  fn from_payload(p: BidPayload) -> Self {
    let identifier = p
      .tenderers
      .unwrap_or_default()
      .into_iter()
      .next()
      .and_then(|t| t.identifier);

    Self {
      id:                  p.id,
      tender_id:           String::new(),
      status:              p.status,
      date:                p.date,
      value_amount:        p.value.and_then(|v| v.decimal_amount()),
      tenderer_id:         identifier.as_ref().and_then(|i| i.id.clone()),
      tenderer_legal_name: identifier.and_then(|i| i.legal_name),
      first_seen:          None,
    }
  }

  fn attach(&mut self, tender_id: &str, first_seen: DateTime<Utc>) {
    self.tender_id = tender_id.to_owned();
    self.first_seen = Some(first_seen);
  }
}

// ─── Award ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Award {
  pub id:                          String,
  pub tender_id:                   String,
  pub bid_id:                      Option<String>,
  pub status:                      Option<String>,
  pub title:                       Option<String>,
  pub value_amount:                Option<Decimal>,
  pub award_date:                  Option<DateTime<Utc>>,
  pub complaint_period_start_date: Option<DateTime<Utc>>,
  pub complaint_period_end_date:   Option<DateTime<Utc>>,
  pub first_seen:                  Option<DateTime<Utc>>,
}

static AWARD_FIELDS: &[FieldSpec<Award>] = &[
  text_field!(Award, "bid_id", bid_id),
  text_field!(Award, "status", status),
  text_field!(Award, "title", title),
  amount_field!(Award, "value_amount", value_amount),
  timestamp_field!(Award, "award_date", award_date),
  timestamp_field!(Award, "complaint_period_start_date", complaint_period_start_date),
  timestamp_field!(Award, "complaint_period_end_date", complaint_period_end_date),
];

impl TrackedEntity for Award {
  const KIND: EntityKind = EntityKind::Award;

  fn entity_id(&self) -> &str { &self.id }

  fn status(&self) -> Option<&str> { self.status.as_deref() }

  fn set_status(&mut self, status: Option<String>) { self.status = status; }

  fn field_table() -> &'static [FieldSpec<Self>] { AWARD_FIELDS }

  fn into_record(self) -> EntityRecord { EntityRecord::Award(self) }
}

impl SubEntity for Award {
  type Payload = AwardPayload;

  const FIELDS_TO_CHECK: &'static [&'static str] = &[
    "bid_id",
    "status",
    "title",
    "value_amount",
    "award_date",
    "complaint_period_start_date",
    "complaint_period_end_date",
  ];

  fn from_payload(p: AwardPayload) -> Self {
    let period = p.complaint_period.unwrap_or_default();
    Self {
      id:                          p.id,
      tender_id:                   String::new(),
      bid_id:                      p.bid_id,
      status:                      p.status,
      title:                       p.title,
      value_amount:                p.value.and_then(|v| v.decimal_amount()),
      award_date:                  p.date,
      complaint_period_start_date: period.start_date,
      complaint_period_end_date:   period.end_date,
      first_seen:                  None,
    }
  }

  fn attach(&mut self, tender_id: &str, first_seen: DateTime<Utc>) {
    self.tender_id = tender_id.to_owned();
    self.first_seen = Some(first_seen);
  }
}

// ─── TenderDocument ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenderDocument {
  pub id:             String,
  pub tender_id:      String,
  pub status:         Option<String>,
  pub document_of:    Option<String>,
  pub title:          Option<String>,
  pub format:         Option<String>,
  pub url:            Option<String>,
  pub hash:           Option<String>,
  pub date_published: Option<DateTime<Utc>>,
  pub date_modified:  Option<DateTime<Utc>>,
  pub first_seen:     Option<DateTime<Utc>>,
}

static DOCUMENT_FIELDS: &[FieldSpec<TenderDocument>] = &[
  text_field!(TenderDocument, "status", status),
  text_field!(TenderDocument, "document_of", document_of),
  text_field!(TenderDocument, "title", title),
  text_field!(TenderDocument, "format", format),
  text_field!(TenderDocument, "url", url),
  text_field!(TenderDocument, "hash", hash),
  timestamp_field!(TenderDocument, "date_published", date_published),
  timestamp_field!(TenderDocument, "date_modified", date_modified),
];

impl TrackedEntity for TenderDocument {
  const KIND: EntityKind = EntityKind::Document;

  fn entity_id(&self) -> &str { &self.id }

  fn status(&self) -> Option<&str> { self.status.as_deref() }

  fn set_status(&mut self, status: Option<String>) { self.status = status; }

  fn field_table() -> &'static [FieldSpec<Self>] { DOCUMENT_FIELDS }

  fn into_record(self) -> EntityRecord { EntityRecord::Document(self) }
}

impl SubEntity for TenderDocument {
  type Payload = DocumentPayload;

  const FIELDS_TO_CHECK: &'static [&'static str] = &[
    "status",
    "document_of",
    "title",
    "format",
    "url",
    "hash",
    "date_published",
    "date_modified",
  ];

  fn from_payload(p: DocumentPayload) -> Self {
    Self {
      id:             p.id,
      tender_id:      String::new(),
      status:         p.status,
      document_of:    p.document_of,
      title:          p.title,
      format:         p.format,
      url:            p.url,
      hash:           p.hash,
      date_published: p.date_published,
      date_modified:  p.date_modified,
      first_seen:     None,
    }
  }

  fn attach(&mut self, tender_id: &str, first_seen: DateTime<Utc>) {
    self.tender_id = tender_id.to_owned();
    self.first_seen = Some(first_seen);
  }
}

// ─── Complaint ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Complaint {
  pub id:                   String,
  pub tender_id:            String,
  pub status:               Option<String>,
  pub title:                Option<String>,
  pub description:          Option<String>,
  pub complaint_type:       Option<String>,
  pub date:                 Option<DateTime<Utc>>,
  pub date_submitted:       Option<DateTime<Utc>>,
  pub date_answered:        Option<DateTime<Utc>>,
  /// Written by the scoring pipeline, never diffed.
  pub highlighted_keywords: Option<Vec<Highlight>>,
  pub first_seen:           Option<DateTime<Utc>>,
}

static COMPLAINT_FIELDS: &[FieldSpec<Complaint>] = &[
  text_field!(Complaint, "status", status),
  text_field!(Complaint, "title", title),
  text_field!(Complaint, "description", description),
  text_field!(Complaint, "type", complaint_type),
  timestamp_field!(Complaint, "date", date),
  timestamp_field!(Complaint, "date_submitted", date_submitted),
  timestamp_field!(Complaint, "date_answered", date_answered),
];

impl TrackedEntity for Complaint {
  const KIND: EntityKind = EntityKind::Complaint;

  fn entity_id(&self) -> &str { &self.id }

  fn status(&self) -> Option<&str> { self.status.as_deref() }

  fn set_status(&mut self, status: Option<String>) { self.status = status; }

  fn field_table() -> &'static [FieldSpec<Self>] { COMPLAINT_FIELDS }

  fn into_record(self) -> EntityRecord { EntityRecord::Complaint(self) }
}

impl SubEntity for Complaint {
  type Payload = ComplaintPayload;

  const FIELDS_TO_CHECK: &'static [&'static str] = &[
    "status",
    "title",
    "description",
    "type",
    "date",
    "date_submitted",
    "date_answered",
  ];

  fn from_payload(p: ComplaintPayload) -> Self {
    Self {
      id:                   p.id,
      tender_id:            String::new(),
      status:               p.status,
      title:                p.title,
      description:          p.description,
      complaint_type:       Some(p.complaint_type.unwrap_or_else(|| "complaint".to_owned())),
      date:                 p.date,
      date_submitted:       p.date_submitted,
      date_answered:        p.date_answered,
      highlighted_keywords: None,
      first_seen:           None,
    }
  }

  fn attach(&mut self, tender_id: &str, first_seen: DateTime<Utc>) {
    self.tender_id = tender_id.to_owned();
    self.first_seen = Some(first_seen);
  }
}

// ─── EntityRecord ────────────────────────────────────────────────────────────

/// Any one of the five tracked entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "entity", rename_all = "snake_case")]
pub enum EntityRecord {
  Tender(Tender),
  Bid(Bid),
  Award(Award),
  Document(TenderDocument),
  Complaint(Complaint),
}

impl EntityRecord {
  pub fn kind(&self) -> EntityKind {
    match self {
      Self::Tender(_) => EntityKind::Tender,
      Self::Bid(_) => EntityKind::Bid,
      Self::Award(_) => EntityKind::Award,
      Self::Document(_) => EntityKind::Document,
      Self::Complaint(_) => EntityKind::Complaint,
    }
  }

  pub fn entity_id(&self) -> &str {
    match self {
      Self::Tender(e) => e.entity_id(),
      Self::Bid(e) => e.entity_id(),
      Self::Award(e) => e.entity_id(),
      Self::Document(e) => e.entity_id(),
      Self::Complaint(e) => e.entity_id(),
    }
  }

  /// One-line human summary used in reports.
  pub fn short_info(&self) -> String {
    match self {
      Self::Tender(t) => format!(
        "Tender {}: {} ({})",
        t.ocid,
        t.title.as_deref().unwrap_or("untitled"),
        t.status.as_deref().unwrap_or("unknown"),
      ),
      Self::Bid(b) => format!(
        "Bid {} by {}: {} ({})",
        b.id,
        b.tenderer_legal_name.as_deref().unwrap_or("unknown bidder"),
        fmt_amount(b.value_amount),
        b.status.as_deref().unwrap_or("unknown"),
      ),
      Self::Award(a) => format!(
        "Award {}: {} {} ({})",
        a.id,
        a.title.as_deref().unwrap_or("untitled"),
        fmt_amount(a.value_amount),
        a.status.as_deref().unwrap_or("unknown"),
      ),
      Self::Document(d) => format!(
        "Document {} [{}] {}",
        d.title.as_deref().unwrap_or("untitled"),
        d.format.as_deref().unwrap_or("?"),
        d.url.as_deref().unwrap_or(""),
      ),
      Self::Complaint(c) => format!(
        "Complaint {}: {} ({})",
        c.id,
        c.title.as_deref().unwrap_or("untitled"),
        c.status.as_deref().unwrap_or("unknown"),
      ),
    }
  }
}

fn fmt_amount(amount: Option<Decimal>) -> String {
  amount
    .map(|a| FieldValue::Amount(a).to_change_string())
    .unwrap_or_else(|| "n/a".to_owned())
}

// ─── Aggregate ───────────────────────────────────────────────────────────────

/// A tender loaded together with all of its sub-entity collections.
#[derive(Debug, Clone, PartialEq)]
pub struct TenderAggregate {
  pub tender:     Tender,
  pub documents:  Vec<TenderDocument>,
  pub bids:       Vec<Bid>,
  pub awards:     Vec<Award>,
  pub complaints: Vec<Complaint>,
}

impl TenderAggregate {
  /// A freshly created tender with empty sub-collections.
  pub fn new(tender: Tender) -> Self {
    Self {
      tender,
      documents: Vec::new(),
      bids: Vec::new(),
      awards: Vec::new(),
      complaints: Vec::new(),
    }
  }
}
