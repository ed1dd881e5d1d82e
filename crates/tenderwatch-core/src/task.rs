//! Deferred work handed off by the reconciler.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum Task {
  /// Score one newly discovered complaint.
  AnalyzeComplaint {
    tender_id:    String,
    complaint_id: String,
  },
}

impl Task {
  pub fn name(&self) -> &'static str {
    match self {
      Self::AnalyzeComplaint { .. } => "analyze_complaint",
    }
  }
}

/// Interactive syncs jump ahead of background crawls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
  Interactive,
  #[default]
  Background,
}

/// A fire-and-forget, at-least-once task facility.
pub trait TaskScheduler: Send + Sync {
  fn schedule(&self, task: Task, priority: Priority);
}

impl<T: TaskScheduler + ?Sized> TaskScheduler for std::sync::Arc<T> {
  fn schedule(&self, task: Task, priority: Priority) {
    (**self).schedule(task, priority);
  }
}
