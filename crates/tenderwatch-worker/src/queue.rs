//! In-process task queue with two priority lanes.
//!
//! Tasks are delivered at least once: a failing task is retried with
//! exponential backoff up to `max_retries` times before it is dropped with an
//! error log. Interactive tasks always go ahead of queued background ones.

use std::{
  future::Future,
  sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  },
  time::Duration,
};

use tenderwatch_core::task::{Priority, Task, TaskScheduler};
use tokio::sync::{Notify, Semaphore, mpsc};
use tracing::{debug, error, warn};
use uuid::Uuid;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Executes one task. Returning an error schedules a retry.
pub trait TaskHandler: Send + Sync + 'static {
  fn handle(&self, task: Task) -> impl Future<Output = Result<(), BoxError>> + Send;
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
  pub concurrency: usize,
  pub max_retries: u32,
  /// Delay before the first retry; doubled on each further attempt.
  pub retry_base:  Duration,
}

impl Default for QueueConfig {
  fn default() -> Self {
    Self {
      concurrency: 4,
      max_retries: 3,
      retry_base:  Duration::from_millis(500),
    }
  }
}

impl QueueConfig {
  fn backoff(&self, attempt: u32) -> Duration {
    self.retry_base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
  }
}

#[derive(Debug)]
struct Job {
  id:       Uuid,
  task:     Task,
  priority: Priority,
}

/// Count of scheduled-but-unfinished jobs.
#[derive(Default)]
struct InFlight {
  count: AtomicUsize,
  idle:  Notify,
}

impl InFlight {
  fn enter(&self) {
    self.count.fetch_add(1, Ordering::SeqCst);
  }

  fn leave(&self) {
    if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
      self.idle.notify_waiters();
    }
  }

  async fn wait_idle(&self) {
    loop {
      let notified = self.idle.notified();
      if self.count.load(Ordering::SeqCst) == 0 {
        return;
      }
      notified.await;
    }
  }
}

// ─── Queue ────────────────────────────────────────────────────────────────────

pub struct TaskQueue {
  interactive: mpsc::UnboundedSender<Job>,
  background:  mpsc::UnboundedSender<Job>,
  in_flight:   Arc<InFlight>,
}

impl TaskQueue {
  /// Spawn the dispatcher on the current runtime.
  pub fn start<H: TaskHandler>(handler: Arc<H>, config: QueueConfig) -> Self {
    let (interactive, interactive_rx) = mpsc::unbounded_channel();
    let (background, background_rx) = mpsc::unbounded_channel();
    let in_flight = Arc::new(InFlight::default());

    tokio::spawn(dispatch(
      interactive_rx,
      background_rx,
      handler,
      in_flight.clone(),
      config,
    ));

    Self { interactive, background, in_flight }
  }

  /// Number of tasks scheduled but not yet finished (including retries).
  pub fn pending(&self) -> usize {
    self.in_flight.count.load(Ordering::SeqCst)
  }

  /// Wait until every scheduled task has succeeded or been given up on.
  pub async fn drain(&self) {
    self.in_flight.wait_idle().await;
  }
}

impl TaskScheduler for TaskQueue {
  fn schedule(&self, task: Task, priority: Priority) {
    let job = Job { id: Uuid::new_v4(), task, priority };
    debug!(job_id = %job.id, task = job.task.name(), ?priority, "task scheduled");

    self.in_flight.enter();
    let lane = match priority {
      Priority::Interactive => &self.interactive,
      Priority::Background => &self.background,
    };
    if let Err(mpsc::error::SendError(job)) = lane.send(job) {
      error!(job_id = %job.id, task = job.task.name(), "task queue is closed, dropping task");
      self.in_flight.leave();
    }
  }
}

async fn dispatch<H: TaskHandler>(
  mut interactive: mpsc::UnboundedReceiver<Job>,
  mut background: mpsc::UnboundedReceiver<Job>,
  handler: Arc<H>,
  in_flight: Arc<InFlight>,
  config: QueueConfig,
) {
  let permits = Arc::new(Semaphore::new(config.concurrency.max(1)));
  let config = Arc::new(config);

  loop {
    // Take a slot first so the lane choice is made when work can start.
    let Ok(permit) = permits.clone().acquire_owned().await else {
      break;
    };
    let job = tokio::select! {
      biased;
      Some(job) = interactive.recv() => job,
      Some(job) = background.recv() => job,
      else => break,
    };

    let handler = handler.clone();
    let in_flight = in_flight.clone();
    let config = config.clone();
    tokio::spawn(async move {
      run_job(handler.as_ref(), job, &config).await;
      drop(permit);
      in_flight.leave();
    });
  }

  debug!("task dispatcher stopped");
}

async fn run_job<H: TaskHandler>(handler: &H, job: Job, config: &QueueConfig) {
  let mut attempt = 0;
  loop {
    attempt += 1;
    match handler.handle(job.task.clone()).await {
      Ok(()) => {
        debug!(job_id = %job.id, task = job.task.name(), attempt, "task done");
        return;
      }
      Err(e) if attempt <= config.max_retries => {
        let delay = config.backoff(attempt);
        warn!(
          job_id = %job.id,
          task = job.task.name(),
          priority = ?job.priority,
          attempt,
          ?delay,
          error = %e,
          "task failed, retrying"
        );
        tokio::time::sleep(delay).await;
      }
      Err(e) => {
        error!(
          job_id = %job.id,
          task = job.task.name(),
          attempts = attempt,
          error = %e,
          "task failed, giving up"
        );
        return;
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{Mutex, atomic::AtomicU32};

  use super::*;

  #[derive(Default)]
  struct Recorder {
    seen:      Mutex<Vec<String>>,
    fail_left: AtomicU32,
  }

  impl TaskHandler for Recorder {
    async fn handle(&self, task: Task) -> Result<(), BoxError> {
      let Task::AnalyzeComplaint { complaint_id, .. } = task;
      self.seen.lock().unwrap().push(complaint_id);
      if self
        .fail_left
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
      {
        return Err("transient".into());
      }
      Ok(())
    }
  }

  fn task(id: &str) -> Task {
    Task::AnalyzeComplaint { tender_id: "T1".into(), complaint_id: id.into() }
  }

  fn config(concurrency: usize, max_retries: u32) -> QueueConfig {
    QueueConfig { concurrency, max_retries, retry_base: Duration::from_millis(1) }
  }

  #[test]
  fn backoff_doubles() {
    let cfg = QueueConfig { retry_base: Duration::from_millis(100), ..QueueConfig::default() };
    assert_eq!(cfg.backoff(1), Duration::from_millis(100));
    assert_eq!(cfg.backoff(2), Duration::from_millis(200));
    assert_eq!(cfg.backoff(4), Duration::from_millis(800));
  }

  #[tokio::test]
  async fn interactive_tasks_jump_the_queue() {
    let recorder = Arc::new(Recorder::default());
    let queue = TaskQueue::start(recorder.clone(), config(1, 0));

    queue.schedule(task("b1"), Priority::Background);
    queue.schedule(task("b2"), Priority::Background);
    queue.schedule(task("i1"), Priority::Interactive);
    queue.drain().await;

    assert_eq!(*recorder.seen.lock().unwrap(), ["i1", "b1", "b2"]);
    assert_eq!(queue.pending(), 0);
  }

  #[tokio::test]
  async fn failing_task_is_retried_until_it_succeeds() {
    let recorder = Arc::new(Recorder { fail_left: AtomicU32::new(2), ..Recorder::default() });
    let queue = TaskQueue::start(recorder.clone(), config(2, 3));

    queue.schedule(task("c1"), Priority::Background);
    queue.drain().await;

    assert_eq!(recorder.seen.lock().unwrap().len(), 3);
  }

  #[tokio::test]
  async fn task_is_dropped_after_max_retries() {
    let recorder = Arc::new(Recorder { fail_left: AtomicU32::new(100), ..Recorder::default() });
    let queue = TaskQueue::start(recorder.clone(), config(1, 2));

    queue.schedule(task("c1"), Priority::Interactive);
    queue.drain().await;

    assert_eq!(recorder.seen.lock().unwrap().len(), 3);
  }

  #[tokio::test]
  async fn drain_on_an_idle_queue_returns() {
    let queue = TaskQueue::start(Arc::new(Recorder::default()), QueueConfig::default());
    queue.drain().await;
  }
}
