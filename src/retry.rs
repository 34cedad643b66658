//! Background retry runner for side-effect jobs.
//!
//! Jobs go through an unbounded channel to a single worker task. A failed job
//! is re-enqueued after the backoff until the attempt limit is reached, then
//! recorded as a dead letter.

use std::collections::VecDeque;
use std::fmt::Display;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, backoff: Duration::from_secs(60) }
    }
}

impl RetryPolicy {
    /// Whether a job that just failed its `attempt`-th try gets another one.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[async_trait]
pub trait JobHandler<J>: Send + Sync + 'static {
    type Error: Display + Send;

    async fn handle(&self, job: &J) -> Result<(), Self::Error>;
}

#[derive(Debug, Clone)]
pub struct DeadLetter<J> {
    pub job: J,
    pub attempts: u32,
    pub last_error: String,
    pub failed_at: DateTime<Utc>,
}

/// Oldest entries are dropped once this many are held.
pub const MAX_DEAD_LETTERS: usize = 256;

/// Shared record of jobs that gave up. Holding one does not keep the worker alive.
pub struct DeadLetterLog<J> {
    inner: Arc<Mutex<VecDeque<DeadLetter<J>>>>,
}

impl<J> Clone for DeadLetterLog<J> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<J> DeadLetterLog<J> {
    fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(VecDeque::new())) }
    }

    fn record(&self, job: J, attempts: u32, last_error: String) {
        if let Ok(mut d) = self.inner.lock() {
            if d.len() == MAX_DEAD_LETTERS {
                d.pop_front();
            }
            d.push_back(DeadLetter { job, attempts, last_error, failed_at: Utc::now() });
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|d| d.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<J: Clone> DeadLetterLog<J> {
    pub fn snapshot(&self) -> Vec<DeadLetter<J>> {
        self.inner.lock().map(|d| d.iter().cloned().collect()).unwrap_or_default()
    }
}

struct Envelope<J> {
    job: J,
    attempt: u32,
}

/// Producer side of the runner. Cloning shares the same worker.
pub struct RetryQueue<J> {
    tx: mpsc::UnboundedSender<Envelope<J>>,
    dead: DeadLetterLog<J>,
}

impl<J> Clone for RetryQueue<J> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone(), dead: self.dead.clone() }
    }
}

impl<J: Send + 'static> RetryQueue<J> {
    /// Hands the job back when the worker has stopped.
    pub fn enqueue(&self, job: J) -> Result<(), J> {
        self.tx.send(Envelope { job, attempt: 1 }).map_err(|e| e.0.job)
    }

    pub fn dead_letter_count(&self) -> usize {
        self.dead.len()
    }

    pub fn dead_letter_log(&self) -> DeadLetterLog<J> {
        self.dead.clone()
    }
}

impl<J: Clone> RetryQueue<J> {
    pub fn dead_letters(&self) -> Vec<DeadLetter<J>> {
        self.dead.snapshot()
    }
}

/// Starts the worker. It runs until every `RetryQueue` clone is dropped and
/// no retry is pending. Jobs already queued at that point are still handled
/// once; a failure among them is dead-lettered since nothing can re-enqueue it.
pub fn spawn<J, H>(handler: Arc<H>, policy: RetryPolicy) -> (RetryQueue<J>, JoinHandle<()>)
where
    J: Send + Sync + 'static,
    H: JobHandler<J>,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<Envelope<J>>();
    let dead = DeadLetterLog::new();
    let queue = RetryQueue { tx: tx.clone(), dead: dead.clone() };
    let weak = tx.downgrade();
    drop(tx);

    let worker = tokio::spawn(async move {
        while let Some(env) = rx.recv().await {
            let Envelope { job, attempt } = env;
            let e = match handler.handle(&job).await {
                Ok(()) => {
                    debug!(attempt, "job completed");
                    continue;
                }
                Err(e) => e,
            };
            if policy.should_retry(attempt) {
                if let Some(tx) = weak.upgrade() {
                    warn!(attempt, max = policy.max_attempts, error = %e, "job failed; retrying after backoff");
                    let backoff = policy.backoff;
                    tokio::spawn(async move {
                        tokio::time::sleep(backoff).await;
                        let _ = tx.send(Envelope { job, attempt: attempt + 1 });
                    });
                    continue;
                }
                error!(attempts = attempt, error = %e, "job failed while the runner shuts down; not retried");
            } else {
                error!(attempts = attempt, error = %e, "job exhausted its retries");
            }
            dead.record(job, attempt, e.to_string());
        }
        debug!("retry worker stopped");
    });
    (queue, worker)
}
