//! Incremental violation scoring of complaints.

use std::sync::Arc;

use tracing::{debug, info};

use crate::{
  Error, Result,
  annotate::TextAnnotator,
  entity::Complaint,
  score::{Highlight, ScoreContribution, ViolationScore, highlights_from},
  store::TenderStore,
};

/// Folds each analyzed complaint into its tender's [`ViolationScore`].
pub struct ViolationScoreAggregator<S, A: ?Sized> {
  store:     Arc<S>,
  annotator: Arc<A>,
}

impl<S, A> ViolationScoreAggregator<S, A>
where
  S: TenderStore,
  A: TextAnnotator + ?Sized,
{
  /// Fails with [`Error::AnnotationUnavailable`] when the annotator has no
  /// keywords to match.
  pub fn new(store: Arc<S>, annotator: Arc<A>) -> Result<Self> {
    if annotator.keyword_table().is_empty() {
      return Err(Error::AnnotationUnavailable("keyword table is empty".into()));
    }
    Ok(Self { store, annotator })
  }

  /// Highlights and score contribution of one complaint. Pure.
  pub fn analyze(&self, complaint: &Complaint) -> (Vec<Highlight>, ScoreContribution) {
    let highlights = match complaint.description.as_deref() {
      Some(text) if !text.trim().is_empty() => highlights_from(&self.annotator.annotate(text)),
      _ => Vec::new(),
    };
    let contribution = ScoreContribution::from_highlights(&highlights);
    (highlights, contribution)
  }

  /// Analyze `complaint` and merge the result into the tender's score.
  ///
  /// The highlights are written to the complaint even when they are empty.
  pub async fn update_violation_scores(
    &self,
    tender_id: &str,
    complaint: &Complaint,
  ) -> Result<ViolationScore> {
    let (highlights, contribution) = self.analyze(complaint);
    debug!(
      tender_id,
      complaint_id = %complaint.id,
      highlights = highlights.len(),
      domains = contribution.domains.len(),
      "complaint analyzed"
    );

    let score = self
      .store
      .apply_complaint_analysis(tender_id, &complaint.id, highlights, contribution)
      .await
      .map_err(Error::store)?;

    info!(tender_id, complaint_id = %complaint.id, domains = score.scores.len(), "violation score updated");
    Ok(score)
  }

  /// Entry point for the `analyze_complaint` task.
  pub async fn analyze_complaint(&self, tender_id: &str, complaint_id: &str) -> Result<ViolationScore> {
    let complaint = self
      .store
      .get_complaint(complaint_id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::ComplaintNotFound(complaint_id.to_owned()))?;
    self.update_violation_scores(tender_id, &complaint).await
  }
}
