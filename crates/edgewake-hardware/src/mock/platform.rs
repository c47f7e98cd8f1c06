//! Mock GPIO + interrupt controller.
//!
//! [`MockPlatform`] is handed to the driver; the paired
//! [`MockPlatformHandle`] stays with the test (or simulator) to raise edges,
//! inject faults and inspect what the driver did. Both share one state.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use edgewake_core::{Direction, IrqNumber, PinSpec, Trigger};
use futures::future::BoxFuture;
use tokio::task::JoinHandle;

use crate::error::{HardwareError, Result};
use crate::spawner::TokioSpawner;
use crate::traits::{GpioController, IrqController, IrqHandler, IrqReturn, Spawner};

/// First interrupt number handed out by the mock.
pub const MOCK_IRQ_BASE: u32 = 100;

/// Lines per mock controller; line `n` of controller `c` maps to
/// `MOCK_IRQ_BASE + c * MOCK_LINES_PER_CONTROLLER + n`.
pub const MOCK_LINES_PER_CONTROLLER: u32 = 32;

/// Operation that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Fault {
    Claim,
    SetDirection,
    SetDebounce,
    /// `set_debounce` reports `Unsupported` instead of a hard failure.
    DebounceUnsupported,
    ToIrq,
    Release,
    RequestIrq,
    FreeIrq,
    EnableWake,
    DisableWake,
    Spawn,
}

/// Operation recorded by the mock, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Claim(PinSpec),
    SetDirection(PinSpec, Direction),
    SetDebounce(PinSpec, u32),
    ToIrq(PinSpec),
    Release(PinSpec),
    RequestIrq(IrqNumber, Trigger),
    FreeIrq(IrqNumber),
    EnableWake(IrqNumber),
    DisableWake(IrqNumber),
    Spawn(String),
}

/// Physical line a specifier refers to. Flag cells do not take part.
type LineKey = (u32, u32);

fn line_key(pin: PinSpec) -> LineKey {
    (pin.controller, pin.pin)
}

#[derive(Debug)]
struct PinSlot {
    pin: PinSpec,
    label: String,
    direction: Option<Direction>,
    debounce_us: Option<u32>,
}

struct IrqSlot {
    trigger: Trigger,
    name: String,
    handler: Arc<dyn IrqHandler>,
}

#[derive(Default)]
struct MockState {
    pins: BTreeMap<LineKey, PinSlot>,
    irqs: BTreeMap<IrqNumber, IrqSlot>,
    wake_armed: BTreeSet<IrqNumber>,
    faults: BTreeSet<Fault>,
    calls: Vec<Call>,
    delivered: u64,
}

impl MockState {
    fn check(&self, fault: Fault) -> Result<()> {
        if self.faults.contains(&fault) {
            return Err(match fault {
                Fault::Claim | Fault::RequestIrq => HardwareError::busy(format!("{fault:?}")),
                Fault::DebounceUnsupported => HardwareError::unsupported("set_debounce"),
                Fault::Spawn => HardwareError::other("spawn refused"),
                _ => HardwareError::communication(format!("injected {fault:?} failure")),
            });
        }
        Ok(())
    }

    fn claimed(&self, pin: PinSpec) -> Result<&PinSlot> {
        self.pins
            .get(&line_key(pin))
            .ok_or_else(|| HardwareError::not_found(pin.to_string()))
    }
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn irq_for(pin: PinSpec) -> IrqNumber {
    IrqNumber::new(MOCK_IRQ_BASE + pin.controller * MOCK_LINES_PER_CONTROLLER + pin.pin)
}

impl PinSlot {
    fn new(pin: PinSpec, label: &str) -> Self {
        Self {
            pin,
            label: label.to_string(),
            direction: None,
            debounce_us: None,
        }
    }
}

/// Mock platform for testing and development.
///
/// # Examples
///
/// ```
/// use edgewake_core::PinSpec;
/// use edgewake_hardware::mock::MockPlatform;
/// use edgewake_hardware::traits::GpioController;
///
/// #[tokio::main]
/// async fn main() -> edgewake_hardware::Result<()> {
///     let (platform, handle) = MockPlatform::new();
///     let pin = PinSpec::new(0, 17);
///
///     platform.claim(pin, "power-btn").await?;
///     assert!(handle.is_claimed(pin));
///
///     // Claiming twice fails.
///     assert!(platform.claim(pin, "other").await.is_err());
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct MockPlatform {
    state: Arc<Mutex<MockState>>,
}

impl MockPlatform {
    /// Create a new mock platform and its control handle.
    pub fn new() -> (Self, MockPlatformHandle) {
        let state = Arc::new(Mutex::new(MockState::default()));
        let platform = Self {
            state: state.clone(),
        };
        (platform, MockPlatformHandle { state })
    }

    fn record(&self, call: Call) -> MutexGuard<'_, MockState> {
        let mut state = lock(&self.state);
        state.calls.push(call);
        state
    }
}

impl GpioController for MockPlatform {
    async fn claim(&self, pin: PinSpec, label: &str) -> Result<()> {
        let mut state = self.record(Call::Claim(pin));
        state.check(Fault::Claim)?;

        if let Some(slot) = state.pins.get(&line_key(pin)) {
            return Err(HardwareError::busy(format!(
                "{pin} claimed by '{}'",
                slot.label
            )));
        }

        state.pins.insert(line_key(pin), PinSlot::new(pin, label));
        Ok(())
    }

    async fn set_direction(&self, pin: PinSpec, direction: Direction) -> Result<()> {
        let mut state = self.record(Call::SetDirection(pin, direction));
        state.check(Fault::SetDirection)?;
        state.claimed(pin)?;

        if let Some(slot) = state.pins.get_mut(&line_key(pin)) {
            slot.direction = Some(direction);
        }
        Ok(())
    }

    async fn set_debounce(&self, pin: PinSpec, debounce_us: u32) -> Result<()> {
        let mut state = self.record(Call::SetDebounce(pin, debounce_us));
        state.check(Fault::SetDebounce)?;
        state.check(Fault::DebounceUnsupported)?;
        state.claimed(pin)?;

        if let Some(slot) = state.pins.get_mut(&line_key(pin)) {
            slot.debounce_us = Some(debounce_us);
        }
        Ok(())
    }

    async fn to_irq(&self, pin: PinSpec) -> Result<IrqNumber> {
        let state = self.record(Call::ToIrq(pin));
        state.check(Fault::ToIrq)?;
        state.claimed(pin)?;

        if pin.pin >= MOCK_LINES_PER_CONTROLLER {
            return Err(HardwareError::invalid_argument(format!(
                "{pin} has no interrupt (controller has {MOCK_LINES_PER_CONTROLLER} lines)"
            )));
        }
        Ok(irq_for(pin))
    }

    async fn release(&self, pin: PinSpec) -> Result<()> {
        let mut state = self.record(Call::Release(pin));
        state.check(Fault::Release)?;

        state
            .pins
            .remove(&line_key(pin))
            .map(|_| ())
            .ok_or_else(|| HardwareError::not_found(pin.to_string()))
    }
}

impl IrqController for MockPlatform {
    async fn request_irq(
        &self,
        irq: IrqNumber,
        trigger: Trigger,
        name: &str,
        handler: Arc<dyn IrqHandler>,
    ) -> Result<()> {
        let mut state = self.record(Call::RequestIrq(irq, trigger));
        state.check(Fault::RequestIrq)?;

        if let Some(slot) = state.irqs.get(&irq) {
            return Err(HardwareError::busy(format!(
                "{irq} held by '{}'",
                slot.name
            )));
        }

        state.irqs.insert(
            irq,
            IrqSlot {
                trigger,
                name: name.to_string(),
                handler,
            },
        );
        Ok(())
    }

    async fn free_irq(&self, irq: IrqNumber) -> Result<()> {
        let mut state = self.record(Call::FreeIrq(irq));
        state.check(Fault::FreeIrq)?;

        state
            .irqs
            .remove(&irq)
            .ok_or_else(|| HardwareError::not_found(irq.to_string()))?;
        state.wake_armed.remove(&irq);
        Ok(())
    }

    async fn enable_irq_wake(&self, irq: IrqNumber) -> Result<()> {
        let mut state = self.record(Call::EnableWake(irq));
        state.check(Fault::EnableWake)?;

        if !state.irqs.contains_key(&irq) {
            return Err(HardwareError::not_found(irq.to_string()));
        }
        state.wake_armed.insert(irq);
        Ok(())
    }

    async fn disable_irq_wake(&self, irq: IrqNumber) -> Result<()> {
        let mut state = self.record(Call::DisableWake(irq));
        state.check(Fault::DisableWake)?;

        state.wake_armed.remove(&irq);
        Ok(())
    }
}

impl Spawner for MockPlatform {
    fn spawn(&self, name: &str, task: BoxFuture<'static, ()>) -> Result<JoinHandle<()>> {
        self.record(Call::Spawn(name.to_string()))
            .check(Fault::Spawn)?;
        TokioSpawner::current()?.spawn(name, task)
    }
}

/// Handle for controlling a mock platform.
///
/// Cloneable; every clone drives the same platform.
#[derive(Clone)]
pub struct MockPlatformHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockPlatformHandle {
    /// Make every subsequent call of the given kind fail until cleared.
    pub fn inject(&self, fault: Fault) {
        lock(&self.state).faults.insert(fault);
    }

    /// Stop failing calls of the given kind.
    pub fn clear(&self, fault: Fault) {
        lock(&self.state).faults.remove(&fault);
    }

    /// Clear every injected fault.
    pub fn clear_all(&self) {
        lock(&self.state).faults.clear();
    }

    /// Claim a pin on behalf of some other consumer.
    pub fn claim_externally(&self, pin: PinSpec, label: &str) {
        lock(&self.state)
            .pins
            .insert(line_key(pin), PinSlot::new(pin, label));
    }

    /// Interrupt number the mock maps `pin` to.
    pub fn irq_for(&self, pin: PinSpec) -> IrqNumber {
        irq_for(pin)
    }

    /// Drive a falling edge on `pin`.
    ///
    /// Runs the registered handler synchronously, the way an interrupt
    /// controller would. Returns `IrqReturn::None` if no handler is bound.
    pub fn edge(&self, pin: PinSpec) -> IrqReturn {
        self.fire(irq_for(pin))
    }

    /// Raise `irq` directly.
    pub fn fire(&self, irq: IrqNumber) -> IrqReturn {
        let handler = {
            let mut state = lock(&self.state);
            match state.irqs.get(&irq) {
                Some(slot) => {
                    let handler = slot.handler.clone();
                    state.delivered += 1;
                    handler
                }
                None => return IrqReturn::None,
            }
        };
        // The lock is released before the handler runs.
        handler.handle_irq(irq)
    }

    /// Number of interrupts delivered to a registered handler.
    pub fn delivered(&self) -> u64 {
        lock(&self.state).delivered
    }

    pub fn is_claimed(&self, pin: PinSpec) -> bool {
        lock(&self.state).pins.contains_key(&line_key(pin))
    }

    /// Specifiers of every claimed line, as they were claimed.
    pub fn claimed_pins(&self) -> Vec<PinSpec> {
        lock(&self.state).pins.values().map(|slot| slot.pin).collect()
    }

    pub fn direction(&self, pin: PinSpec) -> Option<Direction> {
        lock(&self.state)
            .pins
            .get(&line_key(pin))
            .and_then(|slot| slot.direction)
    }

    pub fn debounce_us(&self, pin: PinSpec) -> Option<u32> {
        lock(&self.state)
            .pins
            .get(&line_key(pin))
            .and_then(|slot| slot.debounce_us)
    }

    pub fn is_registered(&self, irq: IrqNumber) -> bool {
        lock(&self.state).irqs.contains_key(&irq)
    }

    pub fn registered_irqs(&self) -> Vec<IrqNumber> {
        lock(&self.state).irqs.keys().copied().collect()
    }

    pub fn trigger(&self, irq: IrqNumber) -> Option<Trigger> {
        lock(&self.state).irqs.get(&irq).map(|slot| slot.trigger)
    }

    /// Whether `irq` is currently armed as a wake source.
    pub fn is_wake_armed(&self, irq: IrqNumber) -> bool {
        lock(&self.state).wake_armed.contains(&irq)
    }

    /// Every call the platform received, in order.
    pub fn calls(&self) -> Vec<Call> {
        lock(&self.state).calls.clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(AtomicUsize);

    impl IrqHandler for Counter {
        fn handle_irq(&self, _irq: IrqNumber) -> IrqReturn {
            self.0.fetch_add(1, Ordering::SeqCst);
            IrqReturn::Handled
        }
    }

    const PIN: PinSpec = PinSpec {
        controller: 0,
        pin: 17,
        flags: 0,
    };

    #[tokio::test]
    async fn test_claim_and_release() {
        let (platform, handle) = MockPlatform::new();

        platform.claim(PIN, "btn").await.unwrap();
        assert!(handle.is_claimed(PIN));

        let err = platform.claim(PIN, "other").await.unwrap_err();
        assert!(matches!(err, HardwareError::Busy { .. }));

        platform.release(PIN).await.unwrap();
        assert!(!handle.is_claimed(PIN));
        assert!(platform.release(PIN).await.is_err());
    }

    #[tokio::test]
    async fn test_claim_ignores_flag_cell() {
        let (platform, handle) = MockPlatform::new();
        let active_low = PIN.with_flags(1);

        platform.claim(PIN, "btn").await.unwrap();

        let err = platform.claim(active_low, "other").await.unwrap_err();
        assert!(matches!(err, HardwareError::Busy { .. }));
        assert!(handle.is_claimed(active_low));
        assert_eq!(handle.claimed_pins(), vec![PIN]);
    }

    #[tokio::test]
    async fn test_lines_on_other_controllers_are_distinct() {
        let (platform, handle) = MockPlatform::new();
        let other = PinSpec::new(1, 17);

        platform.claim(PIN, "btn").await.unwrap();
        platform.claim(other, "btn").await.unwrap();

        let irq = platform.to_irq(PIN).await.unwrap();
        let other_irq = platform.to_irq(other).await.unwrap();
        assert_ne!(irq, other_irq);
        assert_eq!(other_irq, handle.irq_for(other));
        assert_eq!(other_irq, IrqNumber::new(149));
    }

    #[tokio::test]
    async fn test_to_irq_rejects_offset_past_controller() {
        let (platform, _handle) = MockPlatform::new();
        let pin = PinSpec::new(0, MOCK_LINES_PER_CONTROLLER);

        platform.claim(pin, "btn").await.unwrap();
        let err = platform.to_irq(pin).await.unwrap_err();
        assert!(matches!(err, HardwareError::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn test_configure_requires_claim() {
        let (platform, handle) = MockPlatform::new();

        assert!(platform.set_direction(PIN, Direction::Input).await.is_err());

        platform.claim(PIN, "btn").await.unwrap();
        platform.set_direction(PIN, Direction::Input).await.unwrap();
        platform.set_debounce(PIN, 50_000).await.unwrap();

        assert_eq!(handle.direction(PIN), Some(Direction::Input));
        assert_eq!(handle.debounce_us(PIN), Some(50_000));
        assert_eq!(platform.to_irq(PIN).await.unwrap(), IrqNumber::new(117));
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let (platform, handle) = MockPlatform::new();

        handle.inject(Fault::Claim);
        assert!(platform.claim(PIN, "btn").await.is_err());
        assert!(!handle.is_claimed(PIN));

        handle.clear(Fault::Claim);
        platform.claim(PIN, "btn").await.unwrap();

        handle.inject(Fault::DebounceUnsupported);
        let err = platform.set_debounce(PIN, 1_000).await.unwrap_err();
        assert!(err.is_unsupported());
    }

    #[tokio::test]
    async fn test_edge_delivery() {
        let (platform, handle) = MockPlatform::new();
        let irq = handle.irq_for(PIN);
        let counter = Arc::new(Counter(AtomicUsize::new(0)));

        // No handler bound yet.
        assert_eq!(handle.edge(PIN), IrqReturn::None);

        platform
            .request_irq(irq, Trigger::FallingEdge, "btn", counter.clone())
            .await
            .unwrap();
        assert_eq!(handle.trigger(irq), Some(Trigger::FallingEdge));

        assert_eq!(handle.edge(PIN), IrqReturn::Handled);
        assert_eq!(handle.edge(PIN), IrqReturn::Handled);
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
        assert_eq!(handle.delivered(), 2);

        platform.free_irq(irq).await.unwrap();
        assert_eq!(handle.edge(PIN), IrqReturn::None);
    }

    #[tokio::test]
    async fn test_wake_arming() {
        let (platform, handle) = MockPlatform::new();
        let irq = handle.irq_for(PIN);

        // Wake can only be armed on a registered interrupt.
        assert!(platform.enable_irq_wake(irq).await.is_err());

        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        platform
            .request_irq(irq, Trigger::FallingEdge, "btn", counter)
            .await
            .unwrap();

        platform.enable_irq_wake(irq).await.unwrap();
        assert!(handle.is_wake_armed(irq));

        platform.disable_irq_wake(irq).await.unwrap();
        assert!(!handle.is_wake_armed(irq));
    }

    #[tokio::test]
    async fn test_calls_are_recorded_in_order() {
        let (platform, handle) = MockPlatform::new();

        platform.claim(PIN, "btn").await.unwrap();
        platform.to_irq(PIN).await.unwrap();
        platform.release(PIN).await.unwrap();

        assert_eq!(
            handle.calls(),
            vec![Call::Claim(PIN), Call::ToIrq(PIN), Call::Release(PIN)]
        );
    }

    #[tokio::test]
    async fn test_spawn_fault() {
        let (platform, handle) = MockPlatform::new();

        handle.inject(Fault::Spawn);
        assert!(
            platform
                .spawn("worker", Box::pin(async {}))
                .is_err()
        );

        handle.clear_all();
        let task = platform.spawn("worker", Box::pin(async {})).unwrap();
        task.await.unwrap();
    }
}
