//! Hardware collaborator trait definitions.
//!
//! These traits are the contract between the button driver and the
//! platform it runs on: the GPIO controller that owns the pin, the
//! interrupt controller that delivers edges and arms wake sources, and the
//! spawner that runs the deferred worker.
//!
//! Controller methods use native `async fn` (Edition 2024 RPITIT) because
//! they run in sleepable context. [`IrqHandler::handle_irq`] is the one
//! synchronous entry point: it is called from interrupt context.

#![allow(async_fn_in_trait)]

use std::sync::Arc;

use edgewake_core::{Direction, IrqNumber, PinSpec, Trigger};
use futures::future::BoxFuture;
use tokio::task::JoinHandle;

use crate::error::Result;

/// Outcome reported by an interrupt handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqReturn {
    /// The interrupt was not ours, or we are no longer accepting events.
    None,

    /// The interrupt was consumed.
    Handled,
}

/// Top-half interrupt handler.
///
/// Called synchronously by the interrupt controller once per qualifying
/// edge. Implementations must not block, allocate, or await.
pub trait IrqHandler: Send + Sync {
    fn handle_irq(&self, irq: IrqNumber) -> IrqReturn;
}

/// GPIO controller owning the physical pins.
///
/// # Examples
///
/// ```no_run
/// use edgewake_core::{Direction, PinSpec};
/// use edgewake_hardware::traits::GpioController;
/// use edgewake_hardware::Result;
///
/// async fn claim_input<G: GpioController>(gpio: &G) -> Result<()> {
///     let pin = PinSpec::new(0, 17);
///     gpio.claim(pin, "power-btn").await?;
///     gpio.set_direction(pin, Direction::Input).await?;
///     gpio.set_debounce(pin, 50_000).await?;
///     Ok(())
/// }
/// ```
pub trait GpioController: Send + Sync {
    /// Claim a pin for exclusive use under `label`.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::Busy` if the pin is already claimed.
    async fn claim(&self, pin: PinSpec, label: &str) -> Result<()>;

    /// Configure the pin direction.
    async fn set_direction(&self, pin: PinSpec, direction: Direction) -> Result<()>;

    /// Apply a hardware debounce interval, in microseconds.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::Unsupported` if the controller has no
    /// debounce filter.
    async fn set_debounce(&self, pin: PinSpec, debounce_us: u32) -> Result<()>;

    /// Map the pin to the interrupt raised on its transitions.
    async fn to_irq(&self, pin: PinSpec) -> Result<IrqNumber>;

    /// Return the pin to the unclaimed state.
    async fn release(&self, pin: PinSpec) -> Result<()>;
}

/// Interrupt controller: handler registration and wake configuration.
pub trait IrqController: Send + Sync {
    /// Register `handler` for `irq`, raised on `trigger`.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::Busy` if a handler is already registered.
    async fn request_irq(
        &self,
        irq: IrqNumber,
        trigger: Trigger,
        name: &str,
        handler: Arc<dyn IrqHandler>,
    ) -> Result<()>;

    /// Unregister the handler for `irq`.
    async fn free_irq(&self, irq: IrqNumber) -> Result<()>;

    /// Allow `irq` to wake the system from suspend.
    async fn enable_irq_wake(&self, irq: IrqNumber) -> Result<()>;

    /// Stop `irq` from waking the system.
    async fn disable_irq_wake(&self, irq: IrqNumber) -> Result<()>;
}

/// Deferred-execution primitive.
///
/// The driver never schedules work itself; it hands its worker future to
/// a spawner supplied by the caller.
pub trait Spawner: Send + Sync {
    /// Start `task` in the background.
    ///
    /// # Errors
    ///
    /// Returns an error if the spawner cannot accept the task.
    fn spawn(&self, name: &str, task: BoxFuture<'static, ()>) -> Result<JoinHandle<()>>;
}

/// Everything the button driver needs from the platform it runs on.
pub trait Platform: GpioController + IrqController + Spawner {}

impl<T: GpioController + IrqController + Spawner> Platform for T {}
