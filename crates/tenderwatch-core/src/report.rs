//! "What changed since X" reports and per-subscriber digests.
//!
//! Both are driven by the authoritative pass timestamp: changes come from the
//! change tables (`change_date >= since`) and new sub-entities from their
//! `first_seen` stamp.

use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, warn};

use crate::{
  Error, Result,
  change::ChangeRecord,
  entity::{EntityKind, EntityRecord, Tender},
  score::ViolationScore,
  store::TenderStore,
};

#[derive(Debug, Clone, PartialEq)]
pub struct TenderReport {
  pub tender:       Tender,
  pub since:        DateTime<Utc>,
  /// Only kinds with at least one change are present.
  pub changes:      BTreeMap<EntityKind, Vec<ChangeRecord>>,
  pub new_entities: Vec<EntityRecord>,
  pub score:        Option<ViolationScore>,
}

impl TenderReport {
  /// Build the report for `tender_id`, or `None` if there is no such tender.
  pub async fn generate<S: TenderStore>(
    store: &S,
    tender_id: &str,
    since: DateTime<Utc>,
  ) -> Result<Option<Self>> {
    let Some(tender) = store.get_tender(tender_id).await.map_err(Error::store)? else {
      return Ok(None);
    };

    let mut changes = BTreeMap::new();
    for kind in EntityKind::ALL {
      let rows = store
        .changes_since(kind, tender_id, since)
        .await
        .map_err(Error::store)?;
      if !rows.is_empty() {
        changes.insert(kind, rows);
      }
    }

    let new_entities = store
      .new_entities_since(tender_id, since)
      .await
      .map_err(Error::store)?;
    let score = store.get_violation_score(tender_id).await.map_err(Error::store)?;

    Ok(Some(Self {
      tender,
      since,
      changes,
      new_entities,
      score,
    }))
  }

  /// `true` if nothing happened since the cut-off.
  pub fn is_quiet(&self) -> bool {
    self.changes.is_empty() && self.new_entities.is_empty()
  }

  pub fn change_count(&self) -> usize {
    self.changes.values().map(Vec::len).sum()
  }

  pub fn render_text(&self) -> String {
    self.to_string()
  }
}

fn fmt_ts(ts: DateTime<Utc>) -> String {
  ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl fmt::Display for TenderReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "{}", EntityRecord::Tender(self.tender.clone()).short_info())?;
    writeln!(f, "Last modified: {}", fmt_ts(self.tender.date_modified))?;
    writeln!(f, "Since: {}", fmt_ts(self.since))?;

    if self.is_quiet() {
      writeln!(f, "No changes.")?;
    }

    if !self.new_entities.is_empty() {
      writeln!(f, "\nNew:")?;
      for entity in &self.new_entities {
        writeln!(f, "  + {}", entity.short_info())?;
      }
    }

    for (kind, rows) in &self.changes {
      writeln!(f, "\nChanged {kind}s:")?;
      for row in rows {
        writeln!(
          f,
          "  {} {} {}: {} -> {}",
          fmt_ts(row.change_date),
          row.entity_id,
          row.field_name,
          row.old_value.as_deref().unwrap_or("(none)"),
          row.new_value.as_deref().unwrap_or("(none)"),
        )?;
      }
    }

    if let Some(score) = &self.score {
      writeln!(f, "\nViolation score:")?;
      for (domain, s) in &score.scores {
        let keywords: Vec<String> =
          s.keywords.iter().map(|(lemma, n)| format!("{lemma}×{n}")).collect();
        writeln!(f, "  {domain}: {:.3} ({})", s.score, keywords.join(", "))?;
      }
    }

    Ok(())
  }
}

// ─── Digests ─────────────────────────────────────────────────────────────────

/// Everything one subscriber should hear about.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriberDigest {
  pub subscriber: String,
  pub reports:    Vec<TenderReport>,
}

/// Group reports for subscribed tenders modified since `since` by subscriber.
///
/// A tender whose report cannot be built is logged and left out.
pub async fn subscriber_digests<S: TenderStore>(
  store: &S,
  since: DateTime<Utc>,
) -> Result<Vec<SubscriberDigest>> {
  let tenders = store
    .modified_tenders_with_subscribers(since)
    .await
    .map_err(Error::store)?;
  debug!(count = tenders.len(), %since, "building subscriber digests");

  let mut digests: BTreeMap<String, Vec<TenderReport>> = BTreeMap::new();
  for entry in tenders {
    let report = match TenderReport::generate(store, &entry.tender_id, since).await {
      Ok(Some(r)) => r,
      Ok(None) => continue,
      Err(e) => {
        warn!(tender_id = %entry.tender_id, error = %e, "skipping report");
        continue;
      }
    };
    for subscriber in entry.subscribers {
      digests.entry(subscriber).or_default().push(report.clone());
    }
  }

  Ok(
    digests
      .into_iter()
      .map(|(subscriber, reports)| SubscriberDigest { subscriber, reports })
      .collect(),
  )
}
