//! Typed field tables used by the entity updater.
//!
//! Every tracked entity exposes a static table of [`FieldSpec`]s. Each entry
//! names a field, declares how it is compared, and provides plain function
//! pointers to read and write it. The comparison kind is therefore known
//! statically rather than inferred from runtime values.

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::{Decimal, RoundingStrategy};

// ─── Values ──────────────────────────────────────────────────────────────────

/// A single field value lifted out of an entity for comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
  Text(String),
  Amount(Decimal),
  Integer(i64),
  Timestamp(DateTime<Utc>),
}

impl FieldValue {
  pub fn into_text(self) -> Option<String> {
    match self {
      Self::Text(s) => Some(s),
      _ => None,
    }
  }

  pub fn into_amount(self) -> Option<Decimal> {
    self.as_decimal()
  }

  pub fn into_integer(self) -> Option<i64> {
    match self {
      Self::Integer(i) => Some(i),
      _ => None,
    }
  }

  pub fn into_timestamp(self) -> Option<DateTime<Utc>> {
    match self {
      Self::Timestamp(ts) => Some(ts),
      _ => None,
    }
  }

  /// Numeric view used for mixed integer / fixed-point comparison.
  fn as_decimal(&self) -> Option<Decimal> {
    match self {
      Self::Amount(d) => Some(*d),
      Self::Integer(i) => Some(Decimal::from(*i)),
      _ => None,
    }
  }

  /// The string stored in a change row.
  ///
  /// Numbers always carry exactly two decimal places; timestamps are written
  /// as RFC 3339 in UTC.
  pub fn to_change_string(&self) -> String {
    match self {
      Self::Text(s) => s.clone(),
      Self::Amount(d) => two_places(*d),
      Self::Integer(i) => two_places(Decimal::from(*i)),
      Self::Timestamp(ts) => ts.to_rfc3339_opts(SecondsFormat::AutoSi, true),
    }
  }
}

/// Round to cents, half away from zero.
pub fn quantize(d: Decimal) -> Decimal {
  d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn two_places(d: Decimal) -> String {
  let mut q = quantize(d);
  q.rescale(2);
  q.to_string()
}

// ─── Comparison ──────────────────────────────────────────────────────────────

/// How two values of a field are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
  /// Quantized to two decimal places before comparison.
  Numeric,
  /// Compared as UTC instants.
  Timestamp,
  Exact,
}

impl FieldKind {
  /// `true` if moving from `old` to `new` counts as a change.
  pub fn differs(self, old: Option<&FieldValue>, new: Option<&FieldValue>) -> bool {
    let (old, new) = match (old, new) {
      (None, None) => return false,
      (Some(old), Some(new)) => (old, new),
      _ => return true,
    };

    match self {
      Self::Numeric => match (old.as_decimal(), new.as_decimal()) {
        (Some(a), Some(b)) => quantize(a) != quantize(b),
        _ => old != new,
      },
      // `DateTime<Utc>` equality is instant equality; offsets were dropped on
      // parse.
      Self::Timestamp | Self::Exact => old != new,
    }
  }
}

// ─── Field table ─────────────────────────────────────────────────────────────

/// One row of an entity's field table.
pub struct FieldSpec<E: 'static> {
  pub name: &'static str,
  pub kind: FieldKind,
  pub get:  fn(&E) -> Option<FieldValue>,
  pub set:  fn(&mut E, Option<FieldValue>),
}

/// Look up a field by name.
pub fn lookup<E: 'static>(table: &'static [FieldSpec<E>], name: &str) -> Option<&'static FieldSpec<E>> {
  table.iter().find(|spec| spec.name == name)
}

macro_rules! text_field {
  ($ty:ty, $name:literal, $field:ident) => {
    $crate::field::FieldSpec::<$ty> {
      name: $name,
      kind: $crate::field::FieldKind::Exact,
      get:  |e| e.$field.clone().map($crate::field::FieldValue::Text),
      set:  |e, v| e.$field = v.and_then($crate::field::FieldValue::into_text),
    }
  };
}

macro_rules! amount_field {
  ($ty:ty, $name:literal, $field:ident) => {
    $crate::field::FieldSpec::<$ty> {
      name: $name,
      kind: $crate::field::FieldKind::Numeric,
      get:  |e| e.$field.map($crate::field::FieldValue::Amount),
      set:  |e, v| e.$field = v.and_then($crate::field::FieldValue::into_amount),
    }
  };
}

macro_rules! integer_field {
  ($ty:ty, $name:literal, $field:ident) => {
    $crate::field::FieldSpec::<$ty> {
      name: $name,
      kind: $crate::field::FieldKind::Numeric,
      get:  |e| e.$field.map($crate::field::FieldValue::Integer),
      set:  |e, v| e.$field = v.and_then($crate::field::FieldValue::into_integer),
    }
  };
}

macro_rules! timestamp_field {
  ($ty:ty, $name:literal, $field:ident) => {
    $crate::field::FieldSpec::<$ty> {
      name: $name,
      kind: $crate::field::FieldKind::Timestamp,
      get:  |e| e.$field.map($crate::field::FieldValue::Timestamp),
      set:  |e, v| e.$field = v.and_then($crate::field::FieldValue::into_timestamp),
    }
  };
}

pub(crate) use amount_field;
pub(crate) use integer_field;
pub(crate) use text_field;
pub(crate) use timestamp_field;

#[cfg(test)]
mod tests {
  use chrono::{FixedOffset, TimeZone};

  use super::*;

  fn amount(s: &str) -> FieldValue {
    FieldValue::Amount(s.parse().unwrap())
  }

  #[test]
  fn sub_cent_difference_is_not_a_change() {
    let kind = FieldKind::Numeric;
    assert!(!kind.differs(Some(&amount("100.00")), Some(&amount("100.004"))));
    assert!(!kind.differs(Some(&amount("950")), Some(&amount("950.001"))));
  }

  #[test]
  fn one_cent_difference_is_a_change() {
    let kind = FieldKind::Numeric;
    assert!(kind.differs(Some(&amount("100.00")), Some(&amount("100.01"))));
    assert!(kind.differs(Some(&amount("980.00")), Some(&amount("950.00"))));
  }

  #[test]
  fn integer_and_decimal_compare_numerically() {
    let kind = FieldKind::Numeric;
    assert!(!kind.differs(Some(&FieldValue::Integer(5)), Some(&amount("5.00"))));
    assert!(kind.differs(Some(&FieldValue::Integer(5)), Some(&FieldValue::Integer(6))));
  }

  #[test]
  fn same_instant_in_another_offset_is_not_a_change() {
    let kyiv = FixedOffset::east_opt(2 * 3600).unwrap();
    let local = kyiv.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
    let utc = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();

    let kind = FieldKind::Timestamp;
    assert!(!kind.differs(
      Some(&FieldValue::Timestamp(local.with_timezone(&Utc))),
      Some(&FieldValue::Timestamp(utc)),
    ));
  }

  #[test]
  fn none_versus_some_is_always_a_change() {
    for kind in [FieldKind::Numeric, FieldKind::Timestamp, FieldKind::Exact] {
      assert!(kind.differs(None, Some(&FieldValue::Text("x".into()))));
      assert!(kind.differs(Some(&FieldValue::Text("x".into())), None));
      assert!(!kind.differs(None, None));
    }
  }

  #[test]
  fn change_strings() {
    assert_eq!(amount("950").to_change_string(), "950.00");
    assert_eq!(amount("12.345").to_change_string(), "12.35");
    assert_eq!(FieldValue::Integer(7).to_change_string(), "7.00");
    assert_eq!(
      FieldValue::Timestamp(Utc.with_ymd_and_hms(2025, 1, 10, 15, 0, 0).unwrap())
        .to_change_string(),
      "2025-01-10T15:00:00Z"
    );
    assert_eq!(FieldValue::Text("Old".into()).to_change_string(), "Old");
  }
}
