//! Violation scores and their additive merge.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::annotate::Annotation;

// ─── Highlights ──────────────────────────────────────────────────────────────

/// One highlighted token span in a complaint description.
///
/// `offset` and `length` count characters, not bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Highlight {
  pub lemma:   String,
  pub domains: Vec<String>,
  pub offset:  usize,
  pub length:  usize,
}

/// Collapse annotations that share a `(offset, length)` span.
///
/// The span keeps the lemma of its first annotation and the sorted union of
/// all domains seen for it. Output is ordered by offset.
pub fn highlights_from(annotations: &[Annotation]) -> Vec<Highlight> {
  let mut spans: BTreeMap<(usize, usize), (String, BTreeSet<String>)> = BTreeMap::new();

  for ann in annotations {
    let entry = spans
      .entry((ann.offset, ann.length))
      .or_insert_with(|| (ann.lemma.clone(), BTreeSet::new()));
    entry.1.insert(ann.domain.clone());
  }

  spans
    .into_iter()
    .map(|((offset, length), (lemma, domains))| Highlight {
      lemma,
      domains: domains.into_iter().collect(),
      offset,
      length,
    })
    .collect()
}

// ─── Scores ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainScore {
  pub score:    f64,
  pub keywords: BTreeMap<String, u32>,
}

/// What one complaint adds to its tender's score.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreContribution {
  pub domains: BTreeMap<String, DomainScore>,
}

impl ScoreContribution {
  /// Count lemma occurrences per domain and score each domain as
  /// `Σ ln(1 + count)` over its distinct lemmas.
  pub fn from_highlights(highlights: &[Highlight]) -> Self {
    let mut counts: BTreeMap<String, BTreeMap<String, u32>> = BTreeMap::new();
    for h in highlights {
      for domain in &h.domains {
        *counts
          .entry(domain.clone())
          .or_default()
          .entry(h.lemma.clone())
          .or_default() += 1;
      }
    }

    let domains = counts
      .into_iter()
      .map(|(domain, keywords)| {
        let score = keywords.values().map(|&c| (1.0 + f64::from(c)).ln()).sum();
        (domain, DomainScore { score, keywords })
      })
      .collect();

    Self { domains }
  }

  pub fn is_empty(&self) -> bool {
    self.domains.is_empty()
  }
}

/// Accumulated per-domain scores for one tender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationScore {
  pub tender_id:       String,
  pub scores:          BTreeMap<String, DomainScore>,
  pub date_calculated: DateTime<Utc>,
}

impl ViolationScore {
  /// A fresh record holding exactly the contribution's domains.
  pub fn new(tender_id: impl Into<String>, contribution: ScoreContribution) -> Self {
    Self {
      tender_id:       tender_id.into(),
      scores:          contribution.domains,
      date_calculated: Utc::now(),
    }
  }

  /// Add a contribution in place. Scores and keyword counts are summed;
  /// domains the contribution does not touch are kept as they are.
  pub fn merge(&mut self, contribution: &ScoreContribution) {
    for (domain, add) in &contribution.domains {
      let slot = self.scores.entry(domain.clone()).or_default();
      slot.score += add.score;
      for (lemma, count) in &add.keywords {
        *slot.keywords.entry(lemma.clone()).or_default() += count;
      }
    }
    self.date_calculated = Utc::now();
  }

  /// Merge into `existing` if there is one, otherwise start a new record.
  pub fn merged(
    existing: Option<Self>,
    tender_id: &str,
    contribution: ScoreContribution,
  ) -> Self {
    match existing {
      Some(mut score) => {
        score.merge(&contribution);
        score
      }
      None => Self::new(tender_id, contribution),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ann(lemma: &str, domain: &str, offset: usize, length: usize) -> Annotation {
    Annotation {
      lemma: lemma.into(),
      domain: domain.into(),
      offset,
      length,
    }
  }

  fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
  }

  #[test]
  fn same_span_is_counted_once_per_domain() {
    let anns = [
      ann("дискримінаційний", "0", 10, 16),
      ann("дискримінаційний", "0", 10, 16),
      ann("дискримінаційний", "3", 10, 16),
    ];
    let hl = highlights_from(&anns);
    assert_eq!(hl.len(), 1);
    assert_eq!(hl[0].domains, vec!["0".to_string(), "3".to_string()]);

    let c = ScoreContribution::from_highlights(&hl);
    assert_eq!(c.domains["0"].keywords["дискримінаційний"], 1);
    assert_eq!(c.domains["3"].keywords["дискримінаційний"], 1);
  }

  #[test]
  fn repeated_keyword_has_diminishing_returns() {
    let repeated: Vec<_> = (0..5).map(|i| ann("a", "d", i * 10, 1)).collect();
    let distinct: Vec<_> = ["a", "b", "c", "e", "f"]
      .iter()
      .enumerate()
      .map(|(i, l)| ann(l, "d", i * 10, 1))
      .collect();

    let r = ScoreContribution::from_highlights(&highlights_from(&repeated));
    let d = ScoreContribution::from_highlights(&highlights_from(&distinct));
    assert!(approx(r.domains["d"].score, 6f64.ln()));
    assert!(approx(d.domains["d"].score, 5.0 * 2f64.ln()));
    assert!(r.domains["d"].score < d.domains["d"].score);
  }

  #[test]
  fn merge_is_additive_and_keeps_untouched_domains() {
    let first = ScoreContribution::from_highlights(&highlights_from(&[
      ann("x", "0", 0, 1),
      ann("y", "1", 5, 1),
    ]));
    let second = ScoreContribution::from_highlights(&highlights_from(&[ann("x", "0", 0, 1)]));

    let mut score = ViolationScore::new("T1", first);
    score.merge(&second);

    assert!(approx(score.scores["0"].score, 2.0 * 2f64.ln()));
    assert_eq!(score.scores["0"].keywords["x"], 2);
    assert!(approx(score.scores["1"].score, 2f64.ln()));
    assert_eq!(score.scores["1"].keywords["y"], 1);
  }

  #[test]
  fn merge_order_does_not_matter() {
    let a = ScoreContribution::from_highlights(&highlights_from(&[ann("x", "0", 0, 1)]));
    let b = ScoreContribution::from_highlights(&highlights_from(&[
      ann("y", "0", 0, 1),
      ann("y", "0", 4, 1),
    ]));

    let ab = ViolationScore::merged(Some(ViolationScore::new("T", a.clone())), "T", b.clone());
    let ba = ViolationScore::merged(Some(ViolationScore::new("T", b)), "T", a);
    assert!(approx(ab.scores["0"].score, ba.scores["0"].score));
    assert_eq!(ab.scores["0"].keywords, ba.scores["0"].keywords);
  }
}
