//! tenderwatch worker binary.
//!
//! Reads `tenderwatch.toml` (or the path given with `--config`), opens the
//! SQLite store and runs one command. Commands that sync tenders wait for the
//! complaint analyses they schedule before exiting.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tenderwatch_core::{
  aggregate::ViolationScoreAggregator,
  annotate::LexiconAnnotator,
  crawl::TenderCrawler,
  reconcile::TenderReconciler,
  report::{TenderReport, subscriber_digests},
  store::TenderStore as _,
  task::Priority,
};
use tenderwatch_store_sqlite::SqliteStore;
use tenderwatch_worker::{
  WorkerConfig,
  queue::{QueueConfig, TaskQueue},
  source::DirectorySource,
};
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Procurement tender change tracker")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "tenderwatch.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Sync the given tenders by OCID.
  Sync {
    #[arg(required = true)]
    ocids:       Vec<String>,
    /// Run ahead of queued background work.
    #[arg(long)]
    interactive: bool,
  },
  /// Re-sync every tender that has at least one subscriber.
  SyncSubscribed,
  /// Walk the newest search pages and sync every tender listed.
  Crawl {
    /// Number of pages; defaults to `crawl_pages` from the config.
    #[arg(long)]
    pages: Option<usize>,
  },
  /// Analyze one complaint and fold it into the tender's violation score.
  Analyze {
    tender_id:    String,
    complaint_id: String,
  },
  /// Print what changed on a tender since a point in time.
  Report {
    tender_id: String,
    #[arg(long)]
    since:     DateTime<Utc>,
  },
  /// Subscribe someone to a stored tender.
  Subscribe {
    subscriber: String,
    tender_id:  String,
  },
  /// Print one digest per subscriber for tenders modified since a point in time.
  Notify {
    #[arg(long)]
    since: DateTime<Utc>,
  },
  /// Remove a tender and everything attached to it.
  Purge { tender_id: String },
}

type Crawler = TenderCrawler<SqliteStore, TaskQueue, DirectorySource>;
type Aggregator = ViolationScoreAggregator<SqliteStore, LexiconAnnotator>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let cfg = WorkerConfig::load(&cli.config).context("failed to read config file")?;

  let store = SqliteStore::open(&cfg.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", cfg.store_path))?;
  let store = Arc::new(store);

  match cli.command {
    Command::Sync { ocids, interactive } => {
      let priority = if interactive { Priority::Interactive } else { Priority::Background };
      let (crawler, queue) = pipeline(&cfg, store)?;
      let synced = crawler.sync_many(&ocids, priority).await;
      queue.drain().await;
      info!(synced, requested = ocids.len(), "sync finished");
      if synced < ocids.len() {
        anyhow::bail!("{} of {} tenders failed to sync", ocids.len() - synced, ocids.len());
      }
    }
    Command::SyncSubscribed => {
      let (crawler, queue) = pipeline(&cfg, store)?;
      let synced = crawler.sync_subscribed_tenders().await;
      queue.drain().await;
      info!(synced, "subscribed tenders synced");
    }
    Command::Crawl { pages } => {
      let (crawler, queue) = pipeline(&cfg, store)?;
      let synced = crawler.crawl_tenders(pages.unwrap_or(cfg.crawl_pages)).await;
      queue.drain().await;
      info!(synced, "crawl finished");
    }
    Command::Analyze { tender_id, complaint_id } => {
      let score = aggregator(&cfg, store)?
        .analyze_complaint(&tender_id, &complaint_id)
        .await
        .context("complaint analysis failed")?;
      println!("{}", serde_json::to_string_pretty(&score)?);
    }
    Command::Report { tender_id, since } => {
      let report = TenderReport::generate(store.as_ref(), &tender_id, since)
        .await?
        .with_context(|| format!("no tender {tender_id}"))?;
      print!("{report}");
    }
    Command::Subscribe { subscriber, tender_id } => {
      store
        .add_subscription(&subscriber, &tender_id)
        .await
        .with_context(|| format!("failed to subscribe {subscriber} to {tender_id}"))?;
      info!(%subscriber, %tender_id, "subscribed");
    }
    Command::Notify { since } => {
      for digest in subscriber_digests(store.as_ref(), since).await? {
        println!("To: {}", digest.subscriber);
        for report in digest.reports {
          println!();
          print!("{report}");
        }
        println!();
      }
    }
    Command::Purge { tender_id } => {
      if !store.delete_tender(&tender_id).await? {
        anyhow::bail!("no tender {tender_id}");
      }
    }
  }

  Ok(())
}

fn aggregator(cfg: &WorkerConfig, store: Arc<SqliteStore>) -> anyhow::Result<Aggregator> {
  let annotator = LexiconAnnotator::load(&cfg.keywords_path, cfg.lemmas_path.as_deref())
    .with_context(|| format!("failed to load keywords from {:?}", cfg.keywords_path))?;
  ViolationScoreAggregator::new(store, Arc::new(annotator)).context("annotation is unavailable")
}

/// Build the crawler with its task queue running the complaint analyses.
fn pipeline(cfg: &WorkerConfig, store: Arc<SqliteStore>) -> anyhow::Result<(Crawler, Arc<TaskQueue>)> {
  let queue = Arc::new(TaskQueue::start(
    Arc::new(aggregator(cfg, store.clone())?),
    QueueConfig {
      concurrency: cfg.concurrency,
      max_retries: cfg.max_retries,
      retry_base:  Duration::from_millis(cfg.retry_base_ms),
    },
  ));
  let reconciler = TenderReconciler::new(store, queue.clone());
  let crawler = TenderCrawler::new(reconciler, Arc::new(DirectorySource::new(&cfg.source_dir)));
  Ok((crawler, queue))
}
