//! The unit of work a reconciliation pass builds up before commit.
//!
//! Nothing here touches storage. A [`PendingTransaction`] is handed to
//! [`TenderStore::commit`](crate::store::TenderStore::commit), which applies
//! its flushed writes and change rows atomically. Dropping it, or calling
//! [`PendingTransaction::rollback`], discards everything.

use tracing::debug;

use crate::{
  Error, Result,
  change::{ChangeRecord, ChangeSink},
  entity::{EntityKind, EntityRecord},
};

/// A single row-level write.
#[derive(Debug, Clone, PartialEq)]
pub enum RowWrite {
  Insert(EntityRecord),
  Update(EntityRecord),
}

impl RowWrite {
  pub fn record(&self) -> &EntityRecord {
    match self {
      Self::Insert(r) | Self::Update(r) => r,
    }
  }
}

#[derive(Debug, Default)]
pub struct PendingTransaction {
  staged:  Vec<RowWrite>,
  flushed: Vec<RowWrite>,
  changes: Vec<ChangeRecord>,
}

impl PendingTransaction {
  pub fn new() -> Self {
    Self::default()
  }

  /// Stage a new entity for insertion.
  pub fn add(&mut self, record: EntityRecord) {
    self.staged.push(RowWrite::Insert(record));
  }

  /// Stage a full-row update of an existing entity.
  pub fn stage_update(&mut self, record: EntityRecord) {
    self.staged.push(RowWrite::Update(record));
  }

  /// Move staged writes into the commit order.
  ///
  /// Returns the identities of the inserts that were flushed.
  pub fn flush(&mut self) -> Vec<(EntityKind, String)> {
    let inserted = self
      .staged
      .iter()
      .filter_map(|w| match w {
        RowWrite::Insert(r) => Some((r.kind(), r.entity_id().to_owned())),
        RowWrite::Update(_) => None,
      })
      .collect();
    self.flushed.append(&mut self.staged);
    inserted
  }

  pub fn rollback(self) {
    debug!(
      writes = self.flushed.len() + self.staged.len(),
      changes = self.changes.len(),
      "rolling back pending transaction"
    );
  }

  pub fn writes(&self) -> &[RowWrite] {
    &self.flushed
  }

  pub fn changes(&self) -> &[ChangeRecord] {
    &self.changes
  }

  /// `true` if committing would write nothing.
  pub fn is_empty(&self) -> bool {
    self.staged.is_empty() && self.flushed.is_empty() && self.changes.is_empty()
  }

  /// Split into writes and change rows, ready to apply.
  ///
  /// Fails if anything is still staged; callers flush before committing.
  pub fn into_parts(self) -> Result<(Vec<RowWrite>, Vec<ChangeRecord>)> {
    if !self.staged.is_empty() {
      return Err(Error::UnflushedWrites(self.staged.len()));
    }
    Ok((self.flushed, self.changes))
  }
}

impl ChangeSink for PendingTransaction {
  fn record(&mut self, change: ChangeRecord) {
    self.changes.push(change);
  }
}
