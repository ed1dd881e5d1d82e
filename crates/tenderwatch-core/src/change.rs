//! Append-only change rows and the best-effort recorder that builds them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{Error, Result, entity::EntityKind, field::FieldValue};

/// Longest field name a change table accepts.
pub const MAX_FIELD_NAME_LEN: usize = 50;

/// One row in a per-kind change table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
  pub kind:        EntityKind,
  pub entity_id:   String,
  pub tender_id:   String,
  pub change_date: DateTime<Utc>,
  pub field_name:  String,
  /// `None` is stored as SQL NULL, never as a string.
  pub old_value:   Option<String>,
  pub new_value:   Option<String>,
}

impl ChangeRecord {
  pub fn new(
    kind: EntityKind,
    tender_id: &str,
    entity_id: &str,
    change_date: DateTime<Utc>,
    field_name: &str,
    old: Option<&FieldValue>,
    new: Option<&FieldValue>,
  ) -> Result<Self> {
    if entity_id.is_empty() {
      return Err(Error::ChangeRecord(format!(
        "{kind} change for field {field_name:?} has no entity id"
      )));
    }
    if field_name.is_empty() || field_name.chars().count() > MAX_FIELD_NAME_LEN {
      return Err(Error::ChangeRecord(format!(
        "field name {field_name:?} must be 1..={MAX_FIELD_NAME_LEN} characters"
      )));
    }

    Ok(Self {
      kind,
      entity_id: entity_id.to_owned(),
      tender_id: tender_id.to_owned(),
      change_date,
      field_name: field_name.to_owned(),
      old_value: old.map(FieldValue::to_change_string),
      new_value: new.map(FieldValue::to_change_string),
    })
  }
}

/// Anything that can stage change rows.
pub trait ChangeSink {
  fn record(&mut self, change: ChangeRecord);
}

impl ChangeSink for Vec<ChangeRecord> {
  fn record(&mut self, change: ChangeRecord) {
    self.push(change);
  }
}

/// Build a change row and stage it in `sink`.
///
/// A row that cannot be built is logged and dropped; it never fails the
/// entity update it describes.
#[allow(clippy::too_many_arguments)]
pub fn record_change<S: ChangeSink + ?Sized>(
  sink: &mut S,
  kind: EntityKind,
  tender_id: &str,
  entity_id: &str,
  change_date: DateTime<Utc>,
  field_name: &str,
  old: Option<&FieldValue>,
  new: Option<&FieldValue>,
) {
  match ChangeRecord::new(kind, tender_id, entity_id, change_date, field_name, old, new) {
    Ok(change) => sink.record(change),
    Err(e) => warn!(
      %kind,
      tender_id,
      entity_id,
      field_name,
      error = %e,
      "dropping change record"
    ),
  }
}
