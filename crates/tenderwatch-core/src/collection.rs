//! Identity-keyed synchronization of one sub-entity collection.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize as _;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
  entity::{EntityKind, SubEntity},
  transaction::PendingTransaction,
  update::update_entity,
};

/// Reconcile `existing` against the raw `incoming` items of one sub-array.
///
/// Matched items are updated in place and staged as updates when they change.
/// Unmatched items are attached to `tender_id`, staged as inserts and appended
/// to `existing`. Stored items missing from `incoming` are left alone.
///
/// Returns the ids of newly inserted complaints; empty for every other kind.
pub fn sync_related<E: SubEntity>(
  tx: &mut PendingTransaction,
  tender_id: &str,
  existing: &mut Vec<E>,
  incoming: &[Value],
  fields_to_check: &[&str],
  change_date: DateTime<Utc>,
) -> Vec<String> {
  let parsed = parse_items::<E>(tender_id, incoming);

  let positions: HashMap<String, usize> = existing
    .iter()
    .enumerate()
    .map(|(i, e)| (e.entity_id().to_owned(), i))
    .collect();

  let mut new_complaints = Vec::new();
  let (mut inserted, mut updated) = (0usize, 0usize);

  for mut item in parsed {
    match positions.get(item.entity_id()) {
      Some(&i) => {
        let current = &mut existing[i];
        if update_entity(current, tender_id, &item, fields_to_check, tx, change_date) {
          tx.stage_update(current.clone().into_record());
          updated += 1;
        }
      }
      None => {
        item.attach(tender_id, change_date);
        if E::KIND == EntityKind::Complaint {
          new_complaints.push(item.entity_id().to_owned());
        }
        tx.add(item.clone().into_record());
        existing.push(item);
        inserted += 1;
      }
    }
  }

  tx.flush();
  debug!(tender_id, kind = %E::KIND, inserted, updated, "synchronized collection");
  new_complaints
}

/// Parse each raw item, dropping the ones that are malformed or have no id.
/// A repeated id keeps its first position but takes the last value.
fn parse_items<E: SubEntity>(tender_id: &str, incoming: &[Value]) -> Vec<E> {
  let mut items: Vec<E> = Vec::with_capacity(incoming.len());
  let mut seen: HashMap<String, usize> = HashMap::new();

  for (pos, raw) in incoming.iter().enumerate() {
    let payload = match E::Payload::deserialize(raw) {
      Ok(p) => p,
      Err(e) => {
        warn!(tender_id, kind = %E::KIND, pos, error = %e, "skipping malformed item");
        continue;
      }
    };

    let item = E::from_payload(payload);
    if item.entity_id().is_empty() {
      warn!(tender_id, kind = %E::KIND, pos, "skipping item without id");
      continue;
    }

    match seen.get(item.entity_id()) {
      Some(&i) => {
        debug!(tender_id, kind = %E::KIND, id = item.entity_id(), "duplicate id, last one wins");
        items[i] = item;
      }
      None => {
        seen.insert(item.entity_id().to_owned(), items.len());
        items.push(item);
      }
    }
  }

  items
}
