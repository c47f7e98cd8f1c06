//! Interrupt-driven GPIO button driver.
//!
//! A button's falling edges raise an interrupt. The [`TopHalf`] handler only
//! marks a single-slot [`DeferredTask`] pending; a [`Worker`] picks the slot
//! up and runs the device's [`EventHandler`]. Bursts of edges that arrive
//! before the worker runs are coalesced into one [`EdgeEvent`].
//!
//! [`ButtonDevice`] owns the whole lifecycle (attach, suspend, resume,
//! detach) and unwinds partial setup on failure. The [`PowerCoordinator`]
//! arms the interrupt as a system wake source across suspend when the
//! device description allows it.

pub mod device;
pub mod irq;
pub mod line;
pub mod power;
pub mod worker;

pub use device::{ButtonDevice, DeviceSnapshot, LineInfo, StateTransition};
pub use irq::{DeferredTask, InterruptBinding, Schedule, TopHalf};
pub use line::InputLine;
pub use power::PowerCoordinator;
pub use worker::{
    EdgeEvent, EventHandler, HandlerError, LogHandler, ProcessorSnapshot, ProcessorStats, Worker,
};
