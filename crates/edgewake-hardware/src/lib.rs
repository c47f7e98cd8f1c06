//! Hardware abstraction layer for the edgewake button driver.
//!
//! This crate defines the collaborators the driver depends on but does not
//! implement: the GPIO controller owning the pin, the interrupt controller
//! delivering edges and arming wake sources, and the spawner running the
//! deferred worker. A fault-injecting mock of all three lives in [`mock`].
//!
//! # Execution Contexts
//!
//! - Controller methods are `async fn` (Edition 2024 RPITIT): they run in
//!   sleepable context during attach, detach, suspend and resume.
//! - [`IrqHandler::handle_irq`] is synchronous: the interrupt controller
//!   calls it on every qualifying edge, and it must not block.
//!
//! ```no_run
//! use edgewake_core::{PinSpec, Trigger};
//! use edgewake_hardware::traits::{GpioController, IrqController, IrqHandler};
//! use edgewake_hardware::Result;
//! use std::sync::Arc;
//!
//! async fn bind<P: GpioController + IrqController>(
//!     platform: &P,
//!     handler: Arc<dyn IrqHandler>,
//! ) -> Result<()> {
//!     let pin = PinSpec::new(0, 17);
//!     let irq = platform.to_irq(pin).await?;
//!     platform.request_irq(irq, Trigger::FallingEdge, "btn", handler).await
//! }
//! ```
//!
//! # Thread Safety
//!
//! All traits require `Send + Sync`; one platform instance is shared by the
//! driver, the interrupt path and the worker.

pub mod error;
pub mod mock;
pub mod spawner;
pub mod traits;

// Re-export commonly used types for convenience
pub use error::{HardwareError, Result};
pub use spawner::TokioSpawner;
pub use traits::{GpioController, IrqController, IrqHandler, IrqReturn, Platform, Spawner};
