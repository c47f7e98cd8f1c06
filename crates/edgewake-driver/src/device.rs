//! Button device lifecycle.
//!
//! [`ButtonDevice`] ties the pieces together: it reads a [`ButtonConfig`]
//! from a device node, acquires the [`InputLine`], binds the [`TopHalf`]
//! to its interrupt, and spawns the [`Worker`]. Suspend and resume are
//! delegated to the [`PowerCoordinator`].
//!
//! # States
//!
//! - `Uninitialized`: nothing held
//! - `Active`: line claimed, handler bound, worker running
//! - `Suspended`: as `Active`, with the wake path armed if allowed
//! - `Detached`: everything released, terminal
//!
//! # Failure handling
//!
//! Attach acquires line, interrupt and worker in that order. If a step
//! fails, the steps that succeeded are undone in reverse order and the
//! device stays `Uninitialized`, so a later attach can try again.
//!
//! Detach drains the worker, unregisters the interrupt and releases the
//! line in that order. Teardown errors are logged and never stop the
//! remaining steps.
//!
//! # Examples
//!
//! ```
//! use edgewake_core::{DeviceNode, DeviceState};
//! use edgewake_driver::{ButtonDevice, LogHandler};
//! use edgewake_hardware::mock::MockPlatform;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> edgewake_core::Result<()> {
//! let (platform, pins) = MockPlatform::new();
//! let node = DeviceNode::new("power-button")
//!     .with_string("label", "power")
//!     .with_u32_array("gpios", vec![0, 17, 0])
//!     .with_u32("debounce-interval", 50);
//!
//! let device = ButtonDevice::new(platform, LogHandler);
//! device.attach(&node).await?;
//! assert_eq!(device.state(), DeviceState::Active);
//!
//! device.detach().await?;
//! assert!(pins.claimed_pins().is_empty());
//! # Ok(())
//! # }
//! ```

use std::{
    collections::VecDeque,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, Utc};
use edgewake_core::{
    ButtonConfig, DeviceState, Error, IrqNumber, PinSpec, PropertySource, Result, WakeSourceState,
};
use edgewake_hardware::{IrqHandler, Platform};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::{
    irq::{DeferredTask, InterruptBinding, TopHalf},
    line::InputLine,
    power::PowerCoordinator,
    worker::{EventHandler, ProcessorSnapshot, ProcessorStats, Worker},
};

/// Transitions kept per device.
const MAX_HISTORY_SIZE: usize = 32;

/// A single lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: DeviceState,
    pub to: DeviceState,
    pub at: DateTime<Utc>,
}

#[derive(Debug)]
struct Lifecycle {
    state: DeviceState,
    history: VecDeque<StateTransition>,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            state: DeviceState::Uninitialized,
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        }
    }

    fn record(&mut self, to: DeviceState) {
        let from = self.state;
        debug_assert!(from.can_transition_to(&to), "{from} -> {to}");

        if self.history.len() == MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
        self.history.push_back(StateTransition {
            from,
            to,
            at: Utc::now(),
        });
        self.state = to;
        debug!("Device state {} -> {}", from, to);
    }
}

/// Everything an attached device holds.
#[derive(Debug)]
struct Resources {
    config: ButtonConfig,
    line: InputLine,
    binding: InterruptBinding,
    worker: Worker,
}

impl Resources {
    fn irq(&self) -> IrqNumber {
        self.line.irq()
    }
}

/// Identity of the attached line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineInfo {
    pub label: String,
    pub pin: PinSpec,
    pub irq: IrqNumber,
    pub debounce_ms: u32,
}

/// Point-in-time view of a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub state: DeviceState,
    pub line: Option<LineInfo>,
    pub wake: WakeSourceState,
    pub events: ProcessorSnapshot,
}

impl fmt::Display for DeviceSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let yes_no = |b: bool| if b { "yes" } else { "no" };

        writeln!(f, "state:   {}", self.state)?;
        match &self.line {
            Some(line) => writeln!(
                f,
                "line:    '{}' on {} ({}, debounce {}ms)",
                line.label, line.pin, line.irq, line.debounce_ms
            )?,
            None => writeln!(f, "line:    -")?,
        }
        writeln!(
            f,
            "wake:    allowed={} suspended={} enabled={}{}",
            yes_no(self.wake.wake_allowed),
            yes_no(self.wake.suspended),
            yes_no(self.wake.wake_enabled),
            if self.wake.lingering_wake {
                " (lingering)"
            } else {
                ""
            }
        )?;
        write!(
            f,
            "events:  runs={} edges={} failures={} panics={}",
            self.events.runs, self.events.edges, self.events.failures, self.events.panics
        )?;
        if let Some(last) = &self.events.last_event {
            write!(f, "\nlast:    {last}")?;
        }
        Ok(())
    }
}

/// One interrupt-driven button.
///
/// All lifecycle methods take `&self` and are serialized internally, so a
/// device can be shared between the tasks that drive attach, suspend and
/// detach. [`state`](Self::state) and [`snapshot`](Self::snapshot) never
/// wait for an in-flight transition.
pub struct ButtonDevice<P, H> {
    platform: P,
    handler: Arc<H>,
    stats: Arc<ProcessorStats>,
    power: PowerCoordinator,
    lifecycle: Mutex<Lifecycle>,
    resources: tokio::sync::Mutex<Option<Resources>>,
    line: Mutex<Option<LineInfo>>,
}

impl<P: Platform, H: EventHandler> ButtonDevice<P, H> {
    pub fn new(platform: P, handler: H) -> Self {
        Self {
            platform,
            handler: Arc::new(handler),
            stats: Arc::new(ProcessorStats::new()),
            power: PowerCoordinator::default(),
            lifecycle: Mutex::new(Lifecycle::new()),
            resources: tokio::sync::Mutex::new(None),
            line: Mutex::new(None),
        }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn state(&self) -> DeviceState {
        self.lifecycle().state
    }

    /// Recent lifecycle transitions, oldest first.
    pub fn history(&self) -> Vec<StateTransition> {
        self.lifecycle().history.iter().cloned().collect()
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            state: self.state(),
            line: lock(&self.line).clone(),
            wake: self.power.snapshot(),
            events: self.stats.snapshot(),
        }
    }

    /// Bring the button up from its device node.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidStateTransition` unless `Uninitialized`
    /// - `Error::MissingAttribute` / `Error::InvalidConfiguration` for a bad node
    /// - `Error::ResourceUnavailable` if the line cannot be claimed or configured
    /// - `Error::RegistrationFailed` if the interrupt or worker cannot be set up
    ///
    /// Every acquired resource is released again on failure. If the
    /// interrupt cannot be freed while unwinding, the returned error names
    /// both failures and the interrupt stays registered with the controller.
    pub async fn attach<S: PropertySource>(&self, node: &S) -> Result<()> {
        let mut resources = self.resources.lock().await;
        self.expect_state(DeviceState::Uninitialized, DeviceState::Active)?;

        let config = ButtonConfig::from_properties(node)?;
        info!(
            label = %config.label,
            pin = %config.pin,
            debounce_ms = config.debounce_ms,
            wake_allowed = config.wake_allowed,
            "Attaching button"
        );

        let acquired = self.acquire(config).await?;

        self.power.reset(acquired.config.wake_allowed);
        *lock(&self.line) = Some(LineInfo {
            label: acquired.config.label.clone(),
            pin: acquired.line.pin(),
            irq: acquired.irq(),
            debounce_ms: acquired.line.debounce_ms(),
        });
        *resources = Some(acquired);
        self.lifecycle().record(DeviceState::Active);

        info!("Button attached");
        Ok(())
    }

    async fn acquire(&self, config: ButtonConfig) -> Result<Resources> {
        let line =
            InputLine::acquire(&self.platform, config.pin, &config.label, config.debounce_ms)
                .await?;

        let task = Arc::new(DeferredTask::new());
        let top_half: Arc<dyn IrqHandler> = Arc::new(TopHalf::new(task.clone()));

        let mut binding = match InterruptBinding::bind(&self.platform, line.irq(), top_half).await
        {
            Ok(binding) => binding,
            Err(e) => {
                warn!("Attach failed at interrupt registration: {}", e);
                self.release_line(line).await;
                return Err(e);
            }
        };

        let spawned = Worker::spawn(
            &self.platform,
            task,
            self.handler.clone(),
            self.stats.clone(),
        );
        let worker = match spawned {
            Ok(worker) => worker,
            Err(e) => {
                warn!("Attach failed at worker setup: {}", e);
                let unbound = binding.unbind(&self.platform).await;
                self.release_line(line).await;

                // A leaked registration makes every retry fail; report it
                // alongside the cause.
                return Err(match unbound {
                    Ok(()) => e,
                    Err(leak) => {
                        error!("{} left registered after failed attach", binding.irq());
                        Error::RegistrationFailed(format!("{e}; unwinding also failed: {leak}"))
                    }
                });
            }
        };

        Ok(Resources {
            config,
            line,
            binding,
            worker,
        })
    }

    /// Tear the button down. Allowed from `Active` and `Suspended`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidStateTransition` from any other state.
    /// Hardware errors during teardown are logged, not returned.
    pub async fn detach(&self) -> Result<()> {
        let mut resources = self.resources.lock().await;
        let current = self.state();
        current.check_transition(DeviceState::Detached)?;

        let Some(Resources {
            line,
            mut binding,
            worker,
            ..
        }) = resources.take()
        else {
            return Err(Error::invalid_transition(current, DeviceState::Detached));
        };

        if current == DeviceState::Suspended {
            // Unwind the wake path before the interrupt goes away.
            if let Err(e) = self.power.on_resume(&self.platform, line.irq()).await {
                warn!("Failed to leave suspend during detach: {}", e);
            }
        }

        worker.drain().await;
        self.unbind(&mut binding).await;
        self.release_line(line).await;

        *lock(&self.line) = None;
        self.lifecycle().record(DeviceState::Detached);

        info!("Button detached");
        Ok(())
    }

    /// System is suspending. Allowed from `Active` only.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidStateTransition` if not `Active`
    /// - `Error::WakeConfigurationFailed` if the wake source cannot be armed;
    ///   the device stays `Active`
    pub async fn suspend(&self) -> Result<()> {
        let resources = self.resources.lock().await;
        let current = self.state();
        current.check_transition(DeviceState::Suspended)?;

        let irq = resources
            .as_ref()
            .map(Resources::irq)
            .ok_or_else(|| Error::invalid_transition(current, DeviceState::Suspended))?;

        self.power.on_suspend(&self.platform, irq).await?;
        self.lifecycle().record(DeviceState::Suspended);
        Ok(())
    }

    /// System is resuming. Allowed from `Suspended` only.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidStateTransition` if not `Suspended`. A failure
    /// to disarm the wake source is logged and reported through
    /// [`WakeSourceState::lingering_wake`] instead.
    pub async fn resume(&self) -> Result<()> {
        let resources = self.resources.lock().await;
        let current = self.expect_state(DeviceState::Suspended, DeviceState::Active)?;

        let irq = resources
            .as_ref()
            .map(Resources::irq)
            .ok_or_else(|| Error::invalid_transition(current, DeviceState::Active))?;

        self.power.on_resume(&self.platform, irq).await?;
        self.lifecycle().record(DeviceState::Active);
        Ok(())
    }

    fn expect_state(&self, expected: DeviceState, target: DeviceState) -> Result<DeviceState> {
        let current = self.state();
        if current == expected {
            Ok(current)
        } else {
            Err(Error::invalid_transition(current, target))
        }
    }

    async fn unbind(&self, binding: &mut InterruptBinding) {
        if let Err(e) = binding.unbind(&self.platform).await {
            warn!("Teardown: {}", e);
        }
    }

    async fn release_line(&self, line: InputLine) {
        if let Err(e) = line.release(&self.platform).await {
            warn!("Teardown: {}", e);
        }
    }
}

impl<P, H> ButtonDevice<P, H> {
    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        lock(&self.lifecycle)
    }
}

impl<P, H> fmt::Debug for ButtonDevice<P, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ButtonDevice")
            .field("state", &self.lifecycle().state)
            .field("wake", &self.power.snapshot())
            .finish_non_exhaustive()
    }
}

impl<P, H> Drop for ButtonDevice<P, H> {
    fn drop(&mut self) {
        if let Some(resources) = self.resources.get_mut().as_ref() {
            warn!(
                "Button '{}' dropped while attached; call detach() to release {}",
                resources.config.label,
                resources.line.pin()
            );
            resources.worker.close();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
