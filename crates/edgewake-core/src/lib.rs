//! Core types shared by the edgewake crates.
//!
//! Holds the error type, the domain types (pin specifiers, interrupt
//! numbers, device lifecycle and wake state), constants, and the
//! configuration lookup used to describe a button.

pub mod config;
pub mod constants;
pub mod error;
pub mod types;

pub use config::{ButtonConfig, DeviceDescription, DeviceNode, PropertySource, PropertyValue};
pub use error::{Error, Result};
pub use types::*;
