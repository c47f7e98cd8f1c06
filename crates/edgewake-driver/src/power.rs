//! Suspend and resume coordination for the wake path.
//!
//! [`PowerCoordinator`] owns the device's [`WakeSourceState`] and keeps
//! `wake_enabled == wake_allowed && suspended` true after every completed
//! transition. Transitions are serialized; reads never wait on them.

use std::sync::{Mutex, MutexGuard, PoisonError};

use edgewake_core::{DeviceState, Error, IrqNumber, Result, WakeSourceState};
use edgewake_hardware::IrqController;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
pub struct PowerCoordinator {
    state: Mutex<WakeSourceState>,
    transition: tokio::sync::Mutex<()>,
}

impl PowerCoordinator {
    pub fn new(wake_allowed: bool) -> Self {
        Self {
            state: Mutex::new(WakeSourceState::new(wake_allowed)),
            transition: tokio::sync::Mutex::new(()),
        }
    }

    /// Start over for a freshly attached device.
    pub fn reset(&self, wake_allowed: bool) {
        *self.lock() = WakeSourceState::new(wake_allowed);
    }

    /// Current wake state.
    pub fn snapshot(&self) -> WakeSourceState {
        *self.lock()
    }

    /// System is entering suspend.
    ///
    /// Arms `irq` as a wake source when waking is allowed. On failure the
    /// state is left exactly as it was so the system can abort the suspend.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidStateTransition` if already suspended
    /// - `Error::WakeConfigurationFailed` if the controller refuses to arm the interrupt
    pub async fn on_suspend<I: IrqController>(&self, irqs: &I, irq: IrqNumber) -> Result<()> {
        let _transition = self.transition.lock().await;
        let current = self.snapshot();

        if current.suspended {
            return Err(Error::invalid_transition(
                DeviceState::Suspended,
                DeviceState::Suspended,
            ));
        }

        if current.wake_allowed {
            irqs.enable_irq_wake(irq)
                .await
                .map_err(|e| Error::WakeConfigurationFailed(format!("{irq}: {e}")))?;
            debug!("{} armed as wake source", irq);
        }

        let mut state = self.lock();
        state.suspended = true;
        state.wake_enabled = state.wake_allowed;
        // A successful arm supersedes any earlier failed disarm.
        if state.wake_enabled {
            state.lingering_wake = false;
        }
        info!(wake_enabled = state.wake_enabled, "Suspended");
        Ok(())
    }

    /// System is resuming.
    ///
    /// Never fails once suspended: if disarming the wake source fails the
    /// error is logged, `lingering_wake` is set, and the state still
    /// returns to running.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidStateTransition` if not suspended.
    pub async fn on_resume<I: IrqController>(&self, irqs: &I, irq: IrqNumber) -> Result<()> {
        let _transition = self.transition.lock().await;
        let current = self.snapshot();

        if !current.suspended {
            return Err(Error::invalid_transition(
                DeviceState::Active,
                DeviceState::Active,
            ));
        }

        let mut lingering = current.lingering_wake;
        if current.wake_enabled {
            match irqs.disable_irq_wake(irq).await {
                Ok(()) => debug!("{} disarmed as wake source", irq),
                Err(e) => {
                    warn!("Failed to disarm wake on {}: {}", irq, e);
                    lingering = true;
                }
            }
        }

        let mut state = self.lock();
        state.suspended = false;
        state.wake_enabled = false;
        state.lingering_wake = lingering;
        info!(lingering_wake = lingering, "Resumed");
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, WakeSourceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
