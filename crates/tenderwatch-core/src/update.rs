//! Field-by-field update of one stored entity from a freshly parsed one.

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::{
  change::{ChangeSink, record_change},
  entity::{STATUS_DELETED, TrackedEntity},
  field::{FieldValue, lookup},
};

/// Apply `candidate` onto `existing`, logging every changed field to `sink`.
///
/// `deleted` is terminal. A candidate marked deleted moves `existing` to
/// `deleted` with a single `status` change and nothing else; once `existing`
/// is deleted its fields are frozen and no comparison runs at all.
///
/// Returns `true` if anything on `existing` changed.
pub fn update_entity<E, S>(
  existing: &mut E,
  tender_id: &str,
  candidate: &E,
  fields_to_check: &[&str],
  sink: &mut S,
  change_date: DateTime<Utc>,
) -> bool
where
  E: TrackedEntity,
  S: ChangeSink + ?Sized,
{
  // Upstream un-deletes are ignored: a deleted entity never comes back.
  if existing.is_deleted() {
    return false;
  }

  if candidate.is_deleted() {
    let old = existing.status().map(|s| FieldValue::Text(s.to_owned()));
    existing.set_status(Some(STATUS_DELETED.to_owned()));
    record_change(
      sink,
      E::KIND,
      tender_id,
      existing.entity_id(),
      change_date,
      "status",
      old.as_ref(),
      Some(&FieldValue::Text(STATUS_DELETED.to_owned())),
    );
    return true;
  }

  let mut changed = false;
  for &name in fields_to_check {
    let Some(spec) = lookup(E::field_table(), name) else {
      warn!(kind = %E::KIND, entity_id = existing.entity_id(), field = name, "unknown field, skipping");
      continue;
    };

    let old = (spec.get)(existing);
    let new = (spec.get)(candidate);
    if !spec.kind.differs(old.as_ref(), new.as_ref()) {
      continue;
    }

    (spec.set)(existing, new.clone());
    record_change(
      sink,
      E::KIND,
      tender_id,
      existing.entity_id(),
      change_date,
      name,
      old.as_ref(),
      new.as_ref(),
    );
    changed = true;
  }

  changed
}
