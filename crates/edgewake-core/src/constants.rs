//! Constants shared by the edgewake crates.
//!
//! Property keys follow the device-tree naming used by GPIO button nodes,
//! so a description written for a `gpio-keys` style node reads the same here.

// Device description
/// Compatible string matched by the button driver.
pub const COMPATIBLE: &str = "edgewake,gpio-button";

/// Name the interrupt binding is registered under.
pub const IRQ_NAME: &str = "edgewake_btn_irq";

// Property keys
/// Human-readable label of the line, also used as the GPIO consumer name.
pub const PROP_LABEL: &str = "label";

/// GPIO specifier: `<controller pin flags>`.
pub const PROP_GPIOS: &str = "gpios";

/// Debounce interval in milliseconds.
pub const PROP_DEBOUNCE_INTERVAL: &str = "debounce-interval";

/// Optional; when present and non-zero the button may wake the system.
pub const PROP_WAKEUP_SOURCE: &str = "wakeup-source";

// GPIO specifier layout
/// Number of cells in a `gpios` specifier.
pub const GPIO_SPECIFIER_CELLS: usize = 3;

/// Flag bit marking an active-low line.
pub const GPIO_ACTIVE_LOW: u32 = 0x1;

// Debounce
/// Largest debounce interval accepted, in milliseconds.
///
/// Hardware debounce filters on common GPIO controllers top out well below
/// one second; anything longer is a configuration mistake.
pub const MAX_DEBOUNCE_MS: u32 = 1_000;

/// Microseconds per millisecond, GPIO controllers take debounce in microseconds.
pub const MICROS_PER_MILLI: u32 = 1_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_debounce_fits_in_microseconds() {
        assert!(MAX_DEBOUNCE_MS.checked_mul(MICROS_PER_MILLI).is_some());
    }
}
