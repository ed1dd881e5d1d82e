//! Wire payloads for the upstream procurement APIs.
//!
//! Only the fields reconciliation depends on are modelled; unknown keys are
//! ignored. Sub-arrays of the tender document are kept as raw JSON so each
//! item can be parsed (and rejected) on its own.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, prelude::FromPrimitive as _};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::entity::Tender;

// ─── Timestamps ──────────────────────────────────────────────────────────────

/// Timestamp parsing shared by every payload.
///
/// Upstream mixes offset-bearing RFC 3339 strings with naive timestamps; a
/// naive timestamp is taken to be UTC. Every parsed value is truncated to
/// whole microseconds, the precision the store keeps.
pub mod timestamp {
  use chrono::{DateTime, NaiveDateTime, SubsecRound as _, Utc};
  use serde::{Deserialize, Deserializer, de::Error as _};

  const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

  pub fn normalize(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.trunc_subsecs(6)
  }

  pub fn parse(s: &str) -> Option<DateTime<Utc>> {
    let dt = match DateTime::parse_from_rfc3339(s) {
      Ok(dt) => dt.with_timezone(&Utc),
      Err(_) => NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())?
        .and_utc(),
    };
    Some(normalize(dt))
  }

  pub fn required<'de, D>(d: D) -> Result<DateTime<Utc>, D::Error>
  where
    D: Deserializer<'de>,
  {
    let raw = String::deserialize(d)?;
    parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp: {raw:?}")))
  }

  pub fn optional<'de, D>(d: D) -> Result<Option<DateTime<Utc>>, D::Error>
  where
    D: Deserializer<'de>,
  {
    match Option::<String>::deserialize(d)? {
      None => Ok(None),
      Some(raw) if raw.is_empty() => Ok(None),
      Some(raw) => parse(&raw)
        .map(Some)
        .ok_or_else(|| D::Error::custom(format!("invalid timestamp: {raw:?}"))),
    }
  }
}

fn null_as_empty<'de, D>(d: D) -> Result<Vec<Value>, D::Error>
where
  D: Deserializer<'de>,
{
  Ok(Option::<Vec<Value>>::deserialize(d)?.unwrap_or_default())
}

// ─── Shared fragments ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ValuePayload {
  #[serde(default)]
  pub amount: Option<f64>,
}

impl ValuePayload {
  pub fn decimal_amount(&self) -> Option<Decimal> {
    self.amount.and_then(Decimal::from_f64)
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodPayload {
  #[serde(default, deserialize_with = "timestamp::optional")]
  pub start_date: Option<DateTime<Utc>>,
  #[serde(default, deserialize_with = "timestamp::optional")]
  pub end_date:   Option<DateTime<Utc>>,
}

// ─── Bridge summary ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClassifierPayload {
  pub scheme:      String,
  pub description: String,
}

/// Lightweight summary fetched before the detail document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeInfo {
  pub id:                 String,
  #[serde(rename = "tenderID")]
  pub tender_id:          String,
  #[serde(deserialize_with = "timestamp::required")]
  pub date_modified:      DateTime<Utc>,
  #[serde(default)]
  pub general_classifier: Option<ClassifierPayload>,
}

// ─── Tender document ─────────────────────────────────────────────────────────

/// The full detail document for one tender.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenderPayload {
  pub id:                      String,
  #[serde(rename = "tenderID", default)]
  pub tender_id:               Option<String>,
  #[serde(deserialize_with = "timestamp::required")]
  pub date:                    DateTime<Utc>,
  /// Present upstream but never trusted; the bridge timestamp wins.
  #[serde(default, deserialize_with = "timestamp::optional")]
  pub date_modified:           Option<DateTime<Utc>>,
  #[serde(default)]
  pub title:                   Option<String>,
  #[serde(default)]
  pub value:                   Option<ValuePayload>,
  #[serde(default)]
  pub status:                  Option<String>,
  #[serde(default)]
  pub enquiry_period:          Option<PeriodPayload>,
  #[serde(default)]
  pub tender_period:           Option<PeriodPayload>,
  #[serde(default)]
  pub auction_period:          Option<PeriodPayload>,
  #[serde(default)]
  pub award_period:            Option<PeriodPayload>,
  #[serde(default, deserialize_with = "timestamp::optional")]
  pub notice_publication_date: Option<DateTime<Utc>>,
  #[serde(default, deserialize_with = "null_as_empty")]
  pub documents:               Vec<Value>,
  #[serde(default, deserialize_with = "null_as_empty")]
  pub bids:                    Vec<Value>,
  #[serde(default, deserialize_with = "null_as_empty")]
  pub awards:                  Vec<Value>,
  #[serde(default, deserialize_with = "null_as_empty")]
  pub complaints:              Vec<Value>,
}

impl TenderPayload {
  pub fn parse(document: &Value) -> crate::Result<Self> {
    Ok(Self::deserialize(document)?)
  }

  /// Build a tender from the parsed top-level fields.
  ///
  /// `date_modified` and `classifier_id` come from the caller, never from the
  /// document body.
  pub fn to_tender(
    &self,
    ocid: &str,
    date_modified: DateTime<Utc>,
    classifier_id: Option<i64>,
  ) -> Tender {
    let enquiry = self.enquiry_period.clone().unwrap_or_default();
    let tendering = self.tender_period.clone().unwrap_or_default();
    let auction = self.auction_period.clone().unwrap_or_default();
    let award = self.award_period.clone().unwrap_or_default();

    Tender {
      id: self.id.clone(),
      ocid: ocid.to_owned(),
      date_created: self.date,
      date_modified,
      title: self.title.clone(),
      value_amount: self.value.as_ref().and_then(ValuePayload::decimal_amount),
      status: self.status.clone(),
      enquiry_period_start_date: enquiry.start_date,
      enquiry_period_end_date: enquiry.end_date,
      tender_period_start_date: tendering.start_date,
      tender_period_end_date: tendering.end_date,
      auction_period_start_date: auction.start_date,
      auction_period_end_date: auction.end_date,
      award_period_start_date: award.start_date,
      award_period_end_date: award.end_date,
      notice_publication_date: self.notice_publication_date,
      classifier_id,
    }
  }
}

// ─── Sub-items ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifierPayload {
  #[serde(default)]
  pub id:         Option<String>,
  #[serde(default)]
  pub legal_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TendererPayload {
  #[serde(default)]
  pub identifier: Option<IdentifierPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BidPayload {
  #[serde(default)]
  pub id:        String,
  #[serde(default)]
  pub status:    Option<String>,
  #[serde(default, deserialize_with = "timestamp::optional")]
  pub date:      Option<DateTime<Utc>>,
  #[serde(default)]
  pub value:     Option<ValuePayload>,
  #[serde(default)]
  pub tenderers: Option<Vec<TendererPayload>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardPayload {
  #[serde(default)]
  pub id:               String,
  #[serde(rename = "bid_id", alias = "bidID", default)]
  pub bid_id:           Option<String>,
  #[serde(default)]
  pub status:           Option<String>,
  #[serde(default)]
  pub title:            Option<String>,
  #[serde(default)]
  pub value:            Option<ValuePayload>,
  #[serde(default, deserialize_with = "timestamp::optional")]
  pub date:             Option<DateTime<Utc>>,
  #[serde(default)]
  pub complaint_period: Option<PeriodPayload>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPayload {
  #[serde(default)]
  pub id:             String,
  #[serde(default)]
  pub status:         Option<String>,
  #[serde(default)]
  pub document_of:    Option<String>,
  #[serde(default)]
  pub title:          Option<String>,
  #[serde(default)]
  pub format:         Option<String>,
  #[serde(default)]
  pub url:            Option<String>,
  #[serde(default)]
  pub hash:           Option<String>,
  #[serde(default, deserialize_with = "timestamp::optional")]
  pub date_published: Option<DateTime<Utc>>,
  #[serde(default, deserialize_with = "timestamp::optional")]
  pub date_modified:  Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplaintPayload {
  #[serde(default)]
  pub id:             String,
  #[serde(default)]
  pub status:         Option<String>,
  #[serde(default)]
  pub title:          Option<String>,
  #[serde(default)]
  pub description:    Option<String>,
  #[serde(rename = "type", default)]
  pub complaint_type: Option<String>,
  #[serde(default, deserialize_with = "timestamp::optional")]
  pub date:           Option<DateTime<Utc>>,
  #[serde(default, deserialize_with = "timestamp::optional")]
  pub date_submitted: Option<DateTime<Utc>>,
  #[serde(default, deserialize_with = "timestamp::optional")]
  pub date_answered:  Option<DateTime<Utc>>,
}
