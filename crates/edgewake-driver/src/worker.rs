//! Bottom half: the worker that runs deferred edge processing.
//!
//! One worker task exists per attached device. It sleeps until the
//! [`DeferredTask`] is scheduled, takes the slot, and hands an
//! [`EdgeEvent`] to the device's [`EventHandler`]. Runs are strictly
//! sequential, so a handler never overlaps itself.
//!
//! Handler failures never stop the worker: errors and panics are logged
//! and counted, and the worker goes back to waiting.

use std::{
    fmt,
    future::Future,
    panic::AssertUnwindSafe,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use chrono::{DateTime, Utc};
use edgewake_core::{Error, Result};
use edgewake_hardware::Spawner;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info, warn};

use crate::irq::DeferredTask;

/// Name the worker task is spawned under.
pub const WORKER_NAME: &str = "edgewake-bottom-half";

/// Error a handler may return.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// One run of deferred processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeEvent {
    /// 1-based run counter for this device.
    pub sequence: u64,

    /// Edges folded into this run. Always at least one.
    pub edges: u64,

    /// When the worker picked up the run.
    pub processed_at: DateTime<Utc>,
}

impl fmt::Display for EdgeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} ({} edge{}) at {}",
            self.sequence,
            self.edges,
            if self.edges == 1 { "" } else { "s" },
            self.processed_at.format("%H:%M:%S%.3f")
        )
    }
}

/// Deferred work performed for each run of the bottom half.
///
/// The returned future must be `Send` because it runs on the worker task.
///
/// # Examples
///
/// ```
/// use edgewake_driver::{EdgeEvent, EventHandler, HandlerError};
///
/// struct Beeper;
///
/// impl EventHandler for Beeper {
///     async fn handle(&self, event: EdgeEvent) -> Result<(), HandlerError> {
///         println!("beep x{}", event.edges);
///         Ok(())
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync + 'static {
    fn handle(
        &self,
        event: EdgeEvent,
    ) -> impl Future<Output = std::result::Result<(), HandlerError>> + Send;
}

/// Handler that only logs each run.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogHandler;

impl EventHandler for LogHandler {
    async fn handle(&self, event: EdgeEvent) -> std::result::Result<(), HandlerError> {
        info!("Button event {}", event);
        Ok(())
    }
}

/// Forwards each run to a channel receiver.
///
/// Fails once the receiver is gone.
impl EventHandler for mpsc::UnboundedSender<EdgeEvent> {
    async fn handle(&self, event: EdgeEvent) -> std::result::Result<(), HandlerError> {
        self.send(event)
            .map_err(|_| HandlerError::from("event receiver dropped"))
    }
}

/// Counters kept by the worker. Readable at any time.
#[derive(Debug, Default)]
pub struct ProcessorStats {
    runs: AtomicU64,
    edges: AtomicU64,
    failures: AtomicU64,
    panics: AtomicU64,
    last_event: Mutex<Option<EdgeEvent>>,
}

/// Point-in-time copy of [`ProcessorStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorSnapshot {
    pub runs: u64,
    pub edges: u64,
    pub failures: u64,
    pub panics: u64,
    pub last_event: Option<EdgeEvent>,
}

impl ProcessorStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ProcessorSnapshot {
        ProcessorSnapshot {
            runs: self.runs.load(Ordering::Acquire),
            edges: self.edges.load(Ordering::Acquire),
            failures: self.failures.load(Ordering::Acquire),
            panics: self.panics.load(Ordering::Acquire),
            last_event: self.last_event().clone(),
        }
    }

    fn begin_run(&self, edges: u64) -> EdgeEvent {
        let sequence = self.runs.fetch_add(1, Ordering::AcqRel) + 1;
        self.edges.fetch_add(edges, Ordering::AcqRel);

        let event = EdgeEvent {
            sequence,
            edges,
            processed_at: Utc::now(),
        };
        *self.last_event() = Some(event.clone());
        event
    }

    fn last_event(&self) -> std::sync::MutexGuard<'_, Option<EdgeEvent>> {
        self.last_event
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// How the worker task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskTermination {
    /// Drained and returned.
    Finished,
    /// Aborted by the runtime (runtime shutdown).
    Cancelled,
    /// Panicked outside a handler run.
    Panic,
}

impl TaskTermination {
    fn classify(result: std::result::Result<(), tokio::task::JoinError>) -> Self {
        match result {
            Ok(()) => Self::Finished,
            Err(e) if e.is_cancelled() => Self::Cancelled,
            Err(_) => Self::Panic,
        }
    }
}

/// The running bottom half of one device.
#[derive(Debug)]
pub struct Worker {
    task: Arc<DeferredTask>,
    join: JoinHandle<()>,
}

impl Worker {
    /// Spawn the worker for `task` on `spawner`.
    ///
    /// Work scheduled before the worker first runs is not lost: the worker
    /// checks the slot before its first wait.
    ///
    /// # Errors
    ///
    /// Returns `Error::RegistrationFailed` if the task cannot be spawned.
    pub fn spawn<S, H>(
        spawner: &S,
        task: Arc<DeferredTask>,
        handler: Arc<H>,
        stats: Arc<ProcessorStats>,
    ) -> Result<Self>
    where
        S: Spawner + ?Sized,
        H: EventHandler,
    {
        let processor = EventProcessor {
            task: task.clone(),
            handler,
            stats,
        };
        let join = spawner
            .spawn(WORKER_NAME, processor.run().boxed())
            .map_err(|e| Error::RegistrationFailed(format!("{WORKER_NAME}: {e}")))?;

        Ok(Self { task, join })
    }

    /// Close the task and wait for the worker to finish.
    ///
    /// Work accepted before the close runs to completion; edges arriving
    /// afterwards are refused by the top half.
    pub async fn drain(self) {
        self.task.close();

        match TaskTermination::classify(self.join.await) {
            TaskTermination::Finished => debug!("Event worker drained"),
            TaskTermination::Cancelled => warn!("Event worker was cancelled before draining"),
            TaskTermination::Panic => error!("Event worker panicked"),
        }
    }

    /// Stop accepting edges without waiting for the worker.
    pub fn close(&self) {
        self.task.close();
    }
}

struct EventProcessor<H> {
    task: Arc<DeferredTask>,
    handler: Arc<H>,
    stats: Arc<ProcessorStats>,
}

impl<H: EventHandler> EventProcessor<H> {
    async fn run(self) {
        debug!("Event worker started");

        loop {
            self.process_pending().await;

            if self.task.is_closed() {
                // Pick up anything scheduled while the last run was in flight.
                self.process_pending().await;
                break;
            }

            self.task.notified().await;
        }

        debug!("Event worker stopped");
    }

    async fn process_pending(&self) {
        let Some(edges) = self.task.take() else {
            return;
        };

        let event = self.stats.begin_run(edges);
        let sequence = event.sequence;
        debug!("Processing event #{} ({} edges)", sequence, edges);

        match AssertUnwindSafe(self.handler.handle(event))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.stats.failures.fetch_add(1, Ordering::AcqRel);
                error!("Handler failed for event #{}: {}", sequence, e);
            }
            Err(panic) => {
                self.stats.panics.fetch_add(1, Ordering::AcqRel);
                error!(
                    "Handler panicked for event #{}: {}",
                    sequence,
                    panic_message(panic.as_ref())
                );
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgewake_hardware::TokioSpawner;
    use std::sync::atomic::AtomicBool;

    /// Fails or panics on demand, forwarding every event first.
    struct FlakyHandler {
        tx: mpsc::UnboundedSender<EdgeEvent>,
        fail: AtomicBool,
        panic: AtomicBool,
    }

    impl EventHandler for FlakyHandler {
        async fn handle(&self, event: EdgeEvent) -> std::result::Result<(), HandlerError> {
            let _ = self.tx.send(event);
            if self.panic.swap(false, Ordering::SeqCst) {
                panic!("handler blew up");
            }
            if self.fail.swap(false, Ordering::SeqCst) {
                return Err("handler failed".into());
            }
            Ok(())
        }
    }

    fn spawn_with<H: EventHandler>(handler: H) -> (Arc<DeferredTask>, Arc<ProcessorStats>, Worker) {
        let task = Arc::new(DeferredTask::new());
        let stats = Arc::new(ProcessorStats::new());
        let worker = Worker::spawn(
            &TokioSpawner::current().unwrap(),
            task.clone(),
            Arc::new(handler),
            stats.clone(),
        )
        .unwrap();
        (task, stats, worker)
    }

    #[tokio::test]
    async fn test_burst_collapses_into_one_run() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (task, stats, worker) = spawn_with(tx);

        // Current-thread runtime: the worker cannot run until we await.
        task.schedule();
        task.schedule();
        task.schedule();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.sequence, 1);
        assert_eq!(event.edges, 3);

        worker.drain().await;
        assert!(rx.try_recv().is_err());

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.runs, 1);
        assert_eq!(snapshot.edges, 3);
        assert_eq!(snapshot.last_event, Some(event));
    }

    #[tokio::test]
    async fn test_separate_bursts_run_separately() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (task, stats, worker) = spawn_with(tx);

        task.schedule();
        assert_eq!(rx.recv().await.unwrap().edges, 1);

        task.schedule();
        task.schedule();
        let second = rx.recv().await.unwrap();
        assert_eq!(second.sequence, 2);
        assert_eq!(second.edges, 2);

        worker.drain().await;
        assert_eq!(stats.snapshot().edges, 3);
    }

    #[tokio::test]
    async fn test_drain_runs_accepted_work() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (task, stats, worker) = spawn_with(tx);

        task.schedule();
        worker.drain().await;

        assert_eq!(rx.recv().await.unwrap().edges, 1);
        assert_eq!(stats.snapshot().runs, 1);
        assert!(task.is_closed());
        assert!(!task.is_pending());
    }

    #[tokio::test]
    async fn test_drain_idle_worker() {
        let (task, stats, worker) = spawn_with(LogHandler);
        tokio::task::yield_now().await;

        worker.drain().await;

        assert!(task.is_closed());
        assert_eq!(stats.snapshot(), ProcessorSnapshot::default());
    }

    #[tokio::test]
    async fn test_handler_error_does_not_stop_worker() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handler = FlakyHandler {
            tx,
            fail: AtomicBool::new(true),
            panic: AtomicBool::new(false),
        };
        let (task, stats, worker) = spawn_with(handler);

        task.schedule();
        rx.recv().await.unwrap();
        task.schedule();
        rx.recv().await.unwrap();
        worker.drain().await;

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.runs, 2);
        assert_eq!(snapshot.failures, 1);
        assert_eq!(snapshot.panics, 0);
    }

    #[tokio::test]
    async fn test_handler_panic_is_contained() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handler = FlakyHandler {
            tx,
            fail: AtomicBool::new(false),
            panic: AtomicBool::new(true),
        };
        let (task, stats, worker) = spawn_with(handler);

        task.schedule();
        rx.recv().await.unwrap();
        task.schedule();
        assert_eq!(rx.recv().await.unwrap().sequence, 2);

        worker.drain().await;
        assert_eq!(stats.snapshot().panics, 1);
    }

    #[tokio::test]
    async fn test_dropped_receiver_counts_as_failure() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let (task, stats, worker) = spawn_with(tx);

        task.schedule();
        worker.drain().await;

        assert_eq!(stats.snapshot().failures, 1);
    }

    #[test]
    fn test_edge_event_display() {
        let event = EdgeEvent {
            sequence: 4,
            edges: 1,
            processed_at: DateTime::from_timestamp(0, 0).unwrap(),
        };
        assert_eq!(event.to_string(), "#4 (1 edge) at 00:00:00.000");
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");

        let payload: Box<dyn std::any::Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "<non-string panic>");
    }
}
