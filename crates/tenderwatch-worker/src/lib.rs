//! Background worker for tenderwatch.
//!
//! Wires the reconciler, the violation score aggregator and the SQLite store
//! to a file-backed upstream and an in-process task queue.

pub mod queue;
pub mod source;

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tenderwatch_core::{
  aggregate::ViolationScoreAggregator, annotate::TextAnnotator, store::TenderStore, task::Task,
};

use queue::{BoxError, TaskHandler};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime worker configuration, deserialised from `tenderwatch.toml` and
/// `TENDERWATCH_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WorkerConfig {
  pub store_path:    PathBuf,
  /// Root of the `bridge/`, `tenders/` and `search/` snapshot tree.
  pub source_dir:    PathBuf,
  pub keywords_path: PathBuf,
  pub lemmas_path:   Option<PathBuf>,
  pub concurrency:   usize,
  pub max_retries:   u32,
  pub retry_base_ms: u64,
  pub crawl_pages:   usize,
}

impl Default for WorkerConfig {
  fn default() -> Self {
    Self {
      store_path:    PathBuf::from("~/.local/share/tenderwatch/tenderwatch.db"),
      source_dir:    PathBuf::from("data"),
      keywords_path: PathBuf::from("keywords.json"),
      lemmas_path:   None,
      concurrency:   4,
      max_retries:   3,
      retry_base_ms: 500,
      crawl_pages:   10,
    }
  }
}

impl WorkerConfig {
  /// Layer the optional config file under the environment.
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    let mut cfg: Self = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("TENDERWATCH"))
      .build()?
      .try_deserialize()?;

    cfg.store_path = expand_tilde(&cfg.store_path);
    cfg.source_dir = expand_tilde(&cfg.source_dir);
    cfg.keywords_path = expand_tilde(&cfg.keywords_path);
    cfg.lemmas_path = cfg.lemmas_path.as_deref().map(expand_tilde);
    Ok(cfg)
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

// ─── Task handling ────────────────────────────────────────────────────────────

impl<S, A> TaskHandler for ViolationScoreAggregator<S, A>
where
  S: TenderStore + 'static,
  A: TextAnnotator + ?Sized + 'static,
{
  async fn handle(&self, task: Task) -> Result<(), BoxError> {
    match task {
      Task::AnalyzeComplaint { tender_id, complaint_id } => {
        self.analyze_complaint(&tender_id, &complaint_id).await?;
        Ok(())
      }
    }
  }
}
