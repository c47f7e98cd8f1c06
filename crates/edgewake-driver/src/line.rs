//! Input line abstraction.
//!
//! An [`InputLine`] is one claimed GPIO pin configured as a debounced input
//! and mapped to the interrupt its transitions raise.

use edgewake_core::{
    Direction, Error, IrqNumber, PinSpec, Result,
    constants::{MAX_DEBOUNCE_MS, MICROS_PER_MILLI},
};
use edgewake_hardware::GpioController;
use tracing::{debug, warn};

/// A claimed, input-configured pin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputLine {
    pin: PinSpec,
    label: String,
    debounce_ms: u32,
    direction: Direction,
    irq: IrqNumber,
}

impl InputLine {
    /// Claim `pin`, configure it as an input with the given debounce, and
    /// map it to its interrupt.
    ///
    /// If any step after the claim fails, the pin is released again before
    /// the error is returned. A controller without a hardware debounce
    /// filter is accepted with a warning.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidConfiguration` if `debounce_ms` exceeds [`MAX_DEBOUNCE_MS`]
    /// - `Error::ResourceUnavailable` if the pin is claimed, busy, or cannot be configured
    pub async fn acquire<G: GpioController>(
        gpio: &G,
        pin: PinSpec,
        label: &str,
        debounce_ms: u32,
    ) -> Result<Self> {
        let debounce_us = debounce_to_micros(debounce_ms)?;

        gpio.claim(pin, label)
            .await
            .map_err(|e| Error::ResourceUnavailable(format!("{pin}: {e}")))?;

        match Self::configure(gpio, pin, debounce_us).await {
            Ok(irq) => {
                debug!("{} ({}) configured as input, mapped to {}", pin, label, irq);
                Ok(Self {
                    pin,
                    label: label.to_string(),
                    debounce_ms,
                    direction: Direction::Input,
                    irq,
                })
            }
            Err(e) => {
                if let Err(release_err) = gpio.release(pin).await {
                    warn!("Failed to release {} after setup error: {}", pin, release_err);
                }
                Err(e)
            }
        }
    }

    async fn configure<G: GpioController>(
        gpio: &G,
        pin: PinSpec,
        debounce_us: u32,
    ) -> Result<IrqNumber> {
        gpio.set_direction(pin, Direction::Input)
            .await
            .map_err(|e| Error::ResourceUnavailable(format!("{pin}: set input: {e}")))?;

        match gpio.set_debounce(pin, debounce_us).await {
            Ok(()) => {}
            Err(e) if e.is_unsupported() => {
                warn!("{}: no hardware debounce, edges are not filtered", pin);
            }
            Err(e) => {
                return Err(Error::ResourceUnavailable(format!(
                    "{pin}: set debounce: {e}"
                )));
            }
        }

        gpio.to_irq(pin)
            .await
            .map_err(|e| Error::ResourceUnavailable(format!("{pin}: map to irq: {e}")))
    }

    /// Return the pin to the unclaimed state.
    ///
    /// # Errors
    ///
    /// Returns `Error::ResourceUnavailable` if the controller refuses.
    pub async fn release<G: GpioController>(self, gpio: &G) -> Result<()> {
        gpio.release(self.pin)
            .await
            .map_err(|e| Error::ResourceUnavailable(format!("{}: release: {e}", self.pin)))
    }

    pub fn pin(&self) -> PinSpec {
        self.pin
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn debounce_ms(&self) -> u32 {
        self.debounce_ms
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn irq(&self) -> IrqNumber {
        self.irq
    }
}

fn debounce_to_micros(debounce_ms: u32) -> Result<u32> {
    if debounce_ms > MAX_DEBOUNCE_MS {
        return Err(Error::InvalidConfiguration(format!(
            "debounce interval must be 0-{MAX_DEBOUNCE_MS}ms, got {debounce_ms}"
        )));
    }
    debounce_ms
        .checked_mul(MICROS_PER_MILLI)
        .ok_or_else(|| Error::InvalidConfiguration(format!("debounce {debounce_ms}ms overflows")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgewake_hardware::mock::{Call, Fault, MockPlatform};
    use rstest::rstest;

    const PIN: PinSpec = PinSpec {
        controller: 0,
        pin: 17,
        flags: 0,
    };

    #[tokio::test]
    async fn test_acquire_configures_input() {
        let (platform, handle) = MockPlatform::new();

        let line = InputLine::acquire(&platform, PIN, "power-btn", 50)
            .await
            .unwrap();

        assert_eq!(line.pin(), PIN);
        assert_eq!(line.label(), "power-btn");
        assert_eq!(line.direction(), Direction::Input);
        assert_eq!(line.debounce_ms(), 50);
        assert_eq!(line.irq(), handle.irq_for(PIN));
        assert_eq!(handle.direction(PIN), Some(Direction::Input));
        assert_eq!(handle.debounce_us(PIN), Some(50_000));

        line.release(&platform).await.unwrap();
        assert!(!handle.is_claimed(PIN));
    }

    #[tokio::test]
    async fn test_acquire_rejects_out_of_range_debounce() {
        let (platform, handle) = MockPlatform::new();

        let err = InputLine::acquire(&platform, PIN, "btn", MAX_DEBOUNCE_MS + 1)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidConfiguration(_)));
        // Rejected before touching the controller.
        assert!(handle.calls().is_empty());
    }

    #[tokio::test]
    async fn test_acquire_already_claimed() {
        let (platform, handle) = MockPlatform::new();
        handle.claim_externally(PIN, "someone-else");

        let err = InputLine::acquire(&platform, PIN, "btn", 50)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ResourceUnavailable(ref msg) if msg.contains("someone-else")));
        // The other consumer keeps its claim.
        assert!(handle.is_claimed(PIN));
    }

    #[rstest]
    #[case(Fault::SetDirection)]
    #[case(Fault::SetDebounce)]
    #[case(Fault::ToIrq)]
    #[tokio::test]
    async fn test_acquire_unwinds_claim_on_failure(#[case] fault: Fault) {
        let (platform, handle) = MockPlatform::new();
        handle.inject(fault);

        let err = InputLine::acquire(&platform, PIN, "btn", 50)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ResourceUnavailable(_)));
        assert!(!handle.is_claimed(PIN));
        assert_eq!(handle.calls().last(), Some(&Call::Release(PIN)));
    }

    #[tokio::test]
    async fn test_acquire_tolerates_missing_debounce() {
        let (platform, handle) = MockPlatform::new();
        handle.inject(Fault::DebounceUnsupported);

        let line = InputLine::acquire(&platform, PIN, "btn", 50).await.unwrap();

        assert_eq!(line.debounce_ms(), 50);
        assert_eq!(handle.debounce_us(PIN), None);
        assert!(handle.is_claimed(PIN));
    }

    #[rstest]
    #[case(0, 0)]
    #[case(5, 5_000)]
    #[case(MAX_DEBOUNCE_MS, MAX_DEBOUNCE_MS * 1_000)]
    fn test_debounce_to_micros(#[case] ms: u32, #[case] us: u32) {
        assert_eq!(debounce_to_micros(ms).unwrap(), us);
    }
}
