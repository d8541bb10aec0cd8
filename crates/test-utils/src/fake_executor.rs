// crates/test-utils/src/fake_executor.rs

//! In-memory executor backend with scripted outcomes.
//!
//! Jobs "complete" immediately: every dispatched job has its key appended to
//! a shared log and a `JobCompleted` event pushed onto the runtime channel.
//! Outcomes are scripted per key and consumed attempt by attempt; once a
//! key's script runs out (or was never set) further attempts succeed.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::debug;

use dagrun::dag::DispatchedJob;
use dagrun::engine::{JobOutcome, RuntimeEvent};
use dagrun::errors::Result;
use dagrun::exec::ExecutorBackend;

/// Shared record of dispatches, readable after the runtime consumed the
/// executor.
#[derive(Debug, Clone, Default)]
pub struct DispatchLog {
    inner: Arc<Mutex<Vec<String>>>,
}

impl DispatchLog {
    /// Job keys in the order they were dispatched (attempts included).
    pub fn keys(&self) -> Vec<String> {
        self.inner.lock().unwrap().clone()
    }

    /// Number of dispatches of one key, i.e. the attempt count seen.
    pub fn attempts_of(&self, key: &str) -> usize {
        self.inner.lock().unwrap().iter().filter(|k| *k == key).count()
    }

    fn push(&self, key: &str) {
        self.inner.lock().unwrap().push(key.to_string());
    }
}

pub struct FakeExecutor {
    tx: mpsc::Sender<RuntimeEvent>,
    scripts: HashMap<String, Vec<JobOutcome>>,
    log: DispatchLog,
    cancelled: Arc<Mutex<bool>>,
}

impl FakeExecutor {
    pub fn new(tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self {
            tx,
            scripts: HashMap::new(),
            log: DispatchLog::default(),
            cancelled: Arc::new(Mutex::new(false)),
        }
    }

    /// Script the outcomes of successive attempts for one job key. Attempts
    /// beyond the script succeed.
    pub fn script(mut self, key: &str, outcomes: Vec<JobOutcome>) -> Self {
        self.scripts.insert(key.to_string(), outcomes);
        self
    }

    /// Shorthand: the first `n` attempts fail with exit code 1, then succeed.
    pub fn fail_times(self, key: &str, n: usize) -> Self {
        self.script(key, vec![JobOutcome::Failed(1); n])
    }

    pub fn dispatch_log(&self) -> DispatchLog {
        self.log.clone()
    }

    /// Shared flag flipped by `cancel_all`.
    pub fn cancelled_flag(&self) -> Arc<Mutex<bool>> {
        Arc::clone(&self.cancelled)
    }

    fn next_outcome(&mut self, key: &str) -> JobOutcome {
        match self.scripts.get_mut(key) {
            Some(queue) if !queue.is_empty() => queue.remove(0),
            _ => JobOutcome::Success,
        }
    }
}

impl ExecutorBackend for FakeExecutor {
    fn spawn_ready_jobs(
        &mut self,
        jobs: Vec<DispatchedJob>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            for job in jobs {
                self.log.push(&job.key);
                let outcome = self.next_outcome(&job.key);
                debug!(job = %job.id, key = %job.key, ?outcome, "fake dispatch");
                // Runtime hung up; nothing left to report to.
                let _ = self
                    .tx
                    .send(RuntimeEvent::JobCompleted {
                        job: job.id,
                        outcome,
                    })
                    .await;
            }
            Ok(())
        })
    }

    fn cancel_all(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            debug!("fake cancel_all");
            *self.cancelled.lock().unwrap() = true;
        })
    }
}
