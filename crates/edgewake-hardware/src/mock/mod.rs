//! Mock platform implementation for testing and development.
//!
//! This module provides a simulated GPIO and interrupt controller that can
//! be driven programmatically (edges, fault injection, inspection) without
//! physical hardware.

pub mod platform;

// Re-export commonly used types
pub use platform::{
    Call, Fault, MOCK_IRQ_BASE, MOCK_LINES_PER_CONTROLLER, MockPlatform, MockPlatformHandle,
};
