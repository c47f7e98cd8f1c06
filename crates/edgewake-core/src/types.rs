use crate::{
    Result,
    constants::{GPIO_ACTIVE_LOW, GPIO_SPECIFIER_CELLS},
    error::Error,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// GPIO specifier: controller, pin offset and flag cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PinSpec {
    /// Controller handle the pin belongs to.
    pub controller: u32,

    /// Pin offset on the controller.
    pub pin: u32,

    /// Raw flag cell (bit 0 = active low).
    pub flags: u32,
}

impl PinSpec {
    /// Create a specifier with no flags set.
    #[must_use]
    pub fn new(controller: u32, pin: u32) -> Self {
        Self {
            controller,
            pin,
            flags: 0,
        }
    }

    /// Set the raw flag cell.
    #[must_use]
    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    /// Build a specifier from the cells of a `gpios` property.
    ///
    /// # Errors
    /// Returns `Error::InvalidConfiguration` if there are not exactly three cells.
    pub fn from_cells(cells: &[u32]) -> Result<Self> {
        match *cells {
            [controller, pin, flags] => Ok(Self {
                controller,
                pin,
                flags,
            }),
            _ => Err(Error::InvalidConfiguration(format!(
                "gpios must have {GPIO_SPECIFIER_CELLS} cells, got {}",
                cells.len()
            ))),
        }
    }

    /// Whether the line is active low.
    #[must_use]
    pub fn is_active_low(&self) -> bool {
        self.flags & GPIO_ACTIVE_LOW != 0
    }
}

impl fmt::Display for PinSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "gpio{}:{}", self.controller, self.pin)
    }
}

/// Interrupt number a pin is mapped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IrqNumber(u32);

impl IrqNumber {
    #[must_use]
    pub const fn new(irq: u32) -> Self {
        Self(irq)
    }

    #[must_use]
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for IrqNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "irq{}", self.0)
    }
}

/// Edge that raises the interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    RisingEdge,
    FallingEdge,
    BothEdges,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Trigger::RisingEdge => "rising",
            Trigger::FallingEdge => "falling",
            Trigger::BothEdges => "both",
        };
        write!(f, "{s}")
    }
}

/// Configured direction of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Input,
    Output,
}

/// Lifecycle state of a button device.
///
/// # Valid Transitions
///
/// - Uninitialized → Active (attach)
/// - Active → Suspended (suspend)
/// - Suspended → Active (resume)
/// - Active | Suspended → Detached (detach)
///
/// `Detached` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    /// Nothing acquired yet, or a failed attach was unwound.
    Uninitialized,

    /// Line, interrupt and worker are live.
    Active,

    /// System suspended; wake path armed if allowed.
    Suspended,

    /// All resources released. No re-entry.
    Detached,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state_str = match self {
            DeviceState::Uninitialized => "Uninitialized",
            DeviceState::Active => "Active",
            DeviceState::Suspended => "Suspended",
            DeviceState::Detached => "Detached",
        };
        write!(f, "{}", state_str)
    }
}

impl DeviceState {
    /// Check if transition to target state is valid from this state.
    ///
    /// # Examples
    ///
    /// ```
    /// use edgewake_core::DeviceState;
    ///
    /// assert!(DeviceState::Uninitialized.can_transition_to(&DeviceState::Active));
    /// assert!(!DeviceState::Suspended.can_transition_to(&DeviceState::Suspended));
    /// assert!(!DeviceState::Detached.can_transition_to(&DeviceState::Active));
    /// ```
    pub fn can_transition_to(&self, target: &DeviceState) -> bool {
        matches!(
            (self, target),
            (DeviceState::Uninitialized, DeviceState::Active)
                | (DeviceState::Active, DeviceState::Suspended | DeviceState::Detached)
                | (DeviceState::Suspended, DeviceState::Active | DeviceState::Detached)
        )
    }

    /// Validate a transition, returning `Error::InvalidStateTransition` if it is not allowed.
    ///
    /// # Errors
    /// Returns `Error::InvalidStateTransition` when `target` is not reachable from `self`.
    pub fn check_transition(&self, target: DeviceState) -> Result<()> {
        if self.can_transition_to(&target) {
            Ok(())
        } else {
            Err(Error::invalid_transition(self, target))
        }
    }
}

/// Whether the button's interrupt may wake a suspended system.
///
/// Invariant: `wake_enabled == wake_allowed && suspended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WakeSourceState {
    /// Set once at attach from the description.
    pub wake_allowed: bool,

    /// Set by the power coordinator on suspend, cleared on resume.
    pub suspended: bool,

    /// Whether the interrupt is currently armed as a wake source.
    pub wake_enabled: bool,

    /// A wake disable failed on resume; the controller may still have
    /// the interrupt armed even though `wake_enabled` is false.
    pub lingering_wake: bool,
}

impl WakeSourceState {
    /// Fresh state for an attached, running device.
    #[must_use]
    pub fn new(wake_allowed: bool) -> Self {
        Self {
            wake_allowed,
            suspended: false,
            wake_enabled: false,
            lingering_wake: false,
        }
    }

    /// Check the wake invariant.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.wake_enabled == (self.wake_allowed && self.suspended)
    }
}

impl Default for WakeSourceState {
    fn default() -> Self {
        Self::new(false)
    }
}
