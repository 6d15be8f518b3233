// Background writer pushing committed snapshots and audit entries to the
// shared store without blocking the admin loop.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use gavel_core::audit::{AuditEntry, AuditSink};
use gavel_core::model::AuctionState;
use gavel_core::store::{StateStore, StoreError};

/// Jobs that may wait for the writer at once.
const QUEUE_DEPTH: usize = 256;

enum Job {
    Publish(Box<AuctionState>),
    ClearSnapshot,
    Audit(AuditEntry),
    ClearAudit,
    ReadAudit(oneshot::Sender<Result<Vec<AuditEntry>, StoreError>>),
    Flush(oneshot::Sender<()>),
}

impl Job {
    /// Snapshot writes: any later one leaves the store as if the earlier
    /// one never ran.
    fn is_store_write(&self) -> bool {
        matches!(self, Job::Publish(_) | Job::ClearSnapshot)
    }
}

/// Bounded FIFO shared by the handles and the writer task.
struct Queue {
    jobs: Mutex<VecDeque<Job>>,
    capacity: usize,
    ready: Notify,
    closed: AtomicBool,
    stopped: AtomicBool,
}

impl Queue {
    fn new(capacity: usize) -> Self {
        Queue {
            jobs: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            ready: Notify::new(),
            closed: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    fn jobs(&self) -> MutexGuard<'_, VecDeque<Job>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a job. When the queue is full the oldest snapshot write that a
    /// newer one supersedes is dropped; if there is none, `job` itself is
    /// dropped and `false` returned.
    fn push(&self, job: Job) -> bool {
        let mut jobs = self.jobs();
        if self.stopped.load(Ordering::Acquire) {
            warn!("Replication task is not running; dropping job");
            return false;
        }

        if jobs.len() >= self.capacity {
            let mut writes = jobs
                .iter()
                .enumerate()
                .filter(|(_, queued)| queued.is_store_write())
                .map(|(idx, _)| idx);
            let oldest = writes.next();
            let superseded = if job.is_store_write() || writes.next().is_some() {
                oldest
            } else {
                None
            };
            match superseded {
                Some(idx) => {
                    jobs.remove(idx);
                    warn!("Replication queue full; dropped a superseded snapshot write");
                }
                None => {
                    warn!("Replication queue full; dropping job");
                    return false;
                }
            }
        }
        jobs.push_back(job);
        drop(jobs);

        self.ready.notify_one();
        true
    }

    fn pop(&self) -> Option<Job> {
        self.jobs().pop_front()
    }
}

/// Closes the queue once the last `Replicator` clone is gone.
struct Submitter {
    queue: Arc<Queue>,
}

impl Drop for Submitter {
    fn drop(&mut self) {
        self.queue.closed.store(true, Ordering::Release);
        self.queue.ready.notify_one();
    }
}

/// Marks the queue stopped if the writer ends, so pending and later jobs are
/// dropped instead of waiting forever.
struct WriterGuard {
    queue: Arc<Queue>,
}

impl Drop for WriterGuard {
    fn drop(&mut self) {
        let mut jobs = self.queue.jobs();
        self.queue.stopped.store(true, Ordering::Release);
        jobs.clear();
    }
}

/// Handle to the writer task. Jobs run one at a time in submission order,
/// so the store never sees an older snapshot after a newer one. The queue is
/// bounded; under backlog older snapshot writes give way to newer ones.
#[derive(Clone)]
pub struct Replicator {
    submitter: Arc<Submitter>,
}

impl Replicator {
    /// Start the writer task. It exits once every `Replicator` clone is
    /// dropped and the queue is drained.
    pub fn spawn(store: Arc<dyn StateStore>, audit: Arc<dyn AuditSink>) -> (Self, JoinHandle<()>) {
        Self::spawn_with_depth(store, audit, QUEUE_DEPTH)
    }

    fn spawn_with_depth(
        store: Arc<dyn StateStore>,
        audit: Arc<dyn AuditSink>,
        depth: usize,
    ) -> (Self, JoinHandle<()>) {
        let queue = Arc::new(Queue::new(depth.max(1)));
        let handle = tokio::spawn(write_loop(queue.clone(), store, audit));
        (
            Replicator {
                submitter: Arc::new(Submitter { queue }),
            },
            handle,
        )
    }

    /// Queue a snapshot for the store. Failures are logged by the writer.
    pub fn publish(&self, snapshot: &AuctionState) {
        self.submit(Job::Publish(Box::new(snapshot.clone())));
    }

    /// Queue removal of the stored snapshot; dashboards go back to waiting.
    pub fn clear_snapshot(&self) {
        self.submit(Job::ClearSnapshot);
    }

    pub fn audit(&self, entry: AuditEntry) {
        self.submit(Job::Audit(entry));
    }

    pub fn clear_audit(&self) {
        self.submit(Job::ClearAudit);
    }

    /// Read the audit log after every queued write has been applied.
    pub async fn audit_entries(&self) -> Result<Vec<AuditEntry>, StoreError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.submit(Job::ReadAudit(reply_tx));
        reply_rx
            .await
            .map_err(|_| StoreError::Backend(anyhow::anyhow!("replication task stopped")))?
    }

    /// Wait until every job queued so far has finished.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        self.submit(Job::Flush(done_tx));
        let _ = done_rx.await;
    }

    fn submit(&self, job: Job) {
        self.submitter.queue.push(job);
    }
}

async fn write_loop(queue: Arc<Queue>, store: Arc<dyn StateStore>, audit: Arc<dyn AuditSink>) {
    let _guard = WriterGuard {
        queue: queue.clone(),
    };

    loop {
        let job = match queue.pop() {
            Some(job) => job,
            None if queue.closed.load(Ordering::Acquire) => break,
            None => {
                queue.ready.notified().await;
                continue;
            }
        };

        match job {
            Job::Publish(snapshot) => match store.put(&snapshot).await {
                Ok(()) => debug!("Snapshot replicated"),
                Err(e) => warn!("Failed to replicate snapshot: {}", e),
            },
            Job::ClearSnapshot => {
                if let Err(e) = store.clear().await {
                    warn!("Failed to clear stored snapshot: {}", e);
                }
            }
            Job::Audit(entry) => {
                if let Err(e) = audit.record(entry).await {
                    warn!("Failed to write audit entry: {}", e);
                }
            }
            Job::ClearAudit => {
                if let Err(e) = audit.clear().await {
                    warn!("Failed to clear audit log: {}", e);
                }
            }
            Job::ReadAudit(reply) => {
                let _ = reply.send(audit.entries().await);
            }
            Job::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Replication task exiting");
}
