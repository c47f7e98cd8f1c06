//! Interrupt top half and the coalescing deferred task.
//!
//! The top half runs in interrupt context: it must not block, allocate or
//! take a lock that the worker holds across an await. All it does is mark
//! the [`DeferredTask`] pending. Marking an already pending task only bumps
//! the edge count, so a burst of edges before the worker runs collapses
//! into a single run.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use edgewake_core::{Error, IrqNumber, Result, Trigger, constants::IRQ_NAME};
use edgewake_hardware::{IrqController, IrqHandler, IrqReturn};
use tokio::sync::Notify;
use tracing::debug;

/// Outcome of [`DeferredTask::schedule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// The slot went from idle to pending; the worker was woken.
    Queued,

    /// The slot was already pending; the edge was folded into it.
    Coalesced,

    /// The task is draining or drained; the edge was dropped.
    Closed,
}

/// Set once the task stops accepting edges.
const CLOSED: u64 = 1 << 63;

/// Edges coalesced into the slot since the worker last took it.
const EDGES: u64 = CLOSED - 1;

/// Single-slot, coalescing unit of deferred work.
///
/// One atomic word holds both the coalesced edge count and the closed bit.
/// The slot is pending while the count is non-zero. Accepting an edge and
/// checking for close happen in one update, so an edge is either counted
/// before the close or refused after it.
#[derive(Debug, Default)]
pub struct DeferredTask {
    word: AtomicU64,
    wake: Notify,
}

impl DeferredTask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the task pending. Safe to call from interrupt context.
    pub fn schedule(&self) -> Schedule {
        let accepted = self
            .word
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                (word & CLOSED == 0).then(|| word + 1)
            });

        match accepted {
            Err(_) => Schedule::Closed,
            Ok(previous) if previous & EDGES == 0 => {
                self.wake.notify_one();
                Schedule::Queued
            }
            Ok(_) => Schedule::Coalesced,
        }
    }

    /// Take the pending slot, returning the number of edges it coalesced.
    pub fn take(&self) -> Option<u64> {
        self.word
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                (word & EDGES != 0).then_some(word & CLOSED)
            })
            .ok()
            .map(|previous| previous & EDGES)
    }

    pub fn is_pending(&self) -> bool {
        self.word.load(Ordering::Acquire) & EDGES != 0
    }

    /// Stop accepting edges and wake the worker so it can drain.
    pub fn close(&self) {
        self.word.fetch_or(CLOSED, Ordering::AcqRel);
        self.wake.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.word.load(Ordering::Acquire) & CLOSED != 0
    }

    /// Wait until the task is scheduled or closed.
    pub(crate) async fn notified(&self) {
        self.wake.notified().await;
    }
}

/// Interrupt handler that defers all work to a [`DeferredTask`].
#[derive(Debug, Clone)]
pub struct TopHalf {
    task: Arc<DeferredTask>,
}

impl TopHalf {
    pub fn new(task: Arc<DeferredTask>) -> Self {
        Self { task }
    }
}

impl IrqHandler for TopHalf {
    fn handle_irq(&self, _irq: IrqNumber) -> IrqReturn {
        match self.task.schedule() {
            Schedule::Queued | Schedule::Coalesced => IrqReturn::Handled,
            Schedule::Closed => IrqReturn::None,
        }
    }
}

/// A registered falling-edge handler on one interrupt.
#[derive(Debug)]
pub struct InterruptBinding {
    irq: IrqNumber,
    name: &'static str,
    registered: bool,
}

impl InterruptBinding {
    /// Register `handler` for falling edges on `irq`.
    ///
    /// # Errors
    ///
    /// Returns `Error::RegistrationFailed` if the controller refuses the
    /// registration (interrupt already held, controller error).
    pub async fn bind<I: IrqController>(
        irqs: &I,
        irq: IrqNumber,
        handler: Arc<dyn IrqHandler>,
    ) -> Result<Self> {
        let trigger = Trigger::FallingEdge;
        irqs.request_irq(irq, trigger, IRQ_NAME, handler)
            .await
            .map_err(|e| Error::RegistrationFailed(format!("{irq}: {e}")))?;

        debug!("Registered {} handler '{}' on {}", trigger, IRQ_NAME, irq);
        Ok(Self {
            irq,
            name: IRQ_NAME,
            registered: true,
        })
    }

    /// Unregister the handler. Calling this on an unregistered binding is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `Error::RegistrationFailed` if the controller refuses; the
    /// binding stays registered.
    pub async fn unbind<I: IrqController>(&mut self, irqs: &I) -> Result<()> {
        if !self.registered {
            return Ok(());
        }

        irqs.free_irq(self.irq)
            .await
            .map_err(|e| Error::RegistrationFailed(format!("{}: free: {e}", self.irq)))?;
        self.registered = false;
        debug!("Released handler on {}", self.irq);
        Ok(())
    }

    pub fn irq(&self) -> IrqNumber {
        self.irq
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }
}
