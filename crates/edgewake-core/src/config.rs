//! Attribute lookup and button configuration.
//!
//! A button is described by a child node carrying a handful of typed
//! properties. [`PropertySource`] is the lookup contract the driver reads
//! through; [`DeviceNode`] is the static, serde-loadable implementation.
//!
//! ```
//! use edgewake_core::{ButtonConfig, DeviceNode};
//!
//! let node = DeviceNode::new("button@0")
//!     .with_string("label", "power-btn")
//!     .with_u32_array("gpios", vec![0, 17, 0])
//!     .with_u32("debounce-interval", 50);
//!
//! let config = ButtonConfig::from_properties(&node).unwrap();
//! assert_eq!(config.pin.pin, 17);
//! assert_eq!(config.debounce_ms, 50);
//! assert!(config.wake_allowed);
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    Result,
    constants::{
        COMPATIBLE, GPIO_SPECIFIER_CELLS, PROP_DEBOUNCE_INTERVAL, PROP_GPIOS, PROP_LABEL,
        PROP_WAKEUP_SOURCE,
    },
    error::Error,
    types::PinSpec,
};

/// Typed attribute lookup on one child node.
///
/// Every getter fails with `Error::MissingAttribute` when the key is absent
/// and with `Error::InvalidConfiguration` when it holds the wrong type.
pub trait PropertySource {
    fn get_string(&self, key: &str) -> Result<String>;

    fn get_u32_array<const N: usize>(&self, key: &str) -> Result<[u32; N]>;

    fn get_u32(&self, key: &str) -> Result<u32>;

    /// Boolean property; a non-zero number counts as `true`.
    fn get_bool(&self, key: &str) -> Result<bool>;
}

/// Value of a single property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Flag(bool),
    U32(u32),
    U32Array(Vec<u32>),
    String(String),
}

impl PropertyValue {
    fn kind(&self) -> &'static str {
        match self {
            Self::Flag(_) => "flag",
            Self::U32(_) => "u32",
            Self::U32Array(_) => "u32 array",
            Self::String(_) => "string",
        }
    }
}

/// Static description of one child node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceNode {
    /// Node name (e.g. `button@0`), used in log messages.
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
}

impl DeviceNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: PropertyValue) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn with_string(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.with_property(key, PropertyValue::String(value.into()))
    }

    pub fn with_u32(self, key: impl Into<String>, value: u32) -> Self {
        self.with_property(key, PropertyValue::U32(value))
    }

    pub fn with_u32_array(self, key: impl Into<String>, value: Vec<u32>) -> Self {
        self.with_property(key, PropertyValue::U32Array(value))
    }

    pub fn with_flag(self, key: impl Into<String>, value: bool) -> Self {
        self.with_property(key, PropertyValue::Flag(value))
    }

    fn lookup(&self, key: &str) -> Result<&PropertyValue> {
        self.properties
            .get(key)
            .ok_or_else(|| Error::MissingAttribute(format!("{}: '{key}'", self.name)))
    }

    fn wrong_type(&self, key: &str, expected: &str, found: &PropertyValue) -> Error {
        Error::InvalidConfiguration(format!(
            "{}: '{key}' must be a {expected}, found {}",
            self.name,
            found.kind()
        ))
    }
}

impl PropertySource for DeviceNode {
    fn get_string(&self, key: &str) -> Result<String> {
        match self.lookup(key)? {
            PropertyValue::String(s) => Ok(s.clone()),
            other => Err(self.wrong_type(key, "string", other)),
        }
    }

    fn get_u32_array<const N: usize>(&self, key: &str) -> Result<[u32; N]> {
        match self.lookup(key)? {
            PropertyValue::U32Array(values) => {
                <[u32; N]>::try_from(values.as_slice()).map_err(|_| {
                    Error::InvalidConfiguration(format!(
                        "{}: '{key}' must have {N} cells, got {}",
                        self.name,
                        values.len()
                    ))
                })
            }
            other => Err(self.wrong_type(key, "u32 array", other)),
        }
    }

    fn get_u32(&self, key: &str) -> Result<u32> {
        match self.lookup(key)? {
            PropertyValue::U32(value) => Ok(*value),
            other => Err(self.wrong_type(key, "u32", other)),
        }
    }

    fn get_bool(&self, key: &str) -> Result<bool> {
        match self.lookup(key)? {
            PropertyValue::Flag(flag) => Ok(*flag),
            PropertyValue::U32(value) => Ok(*value != 0),
            other => Err(self.wrong_type(key, "flag", other)),
        }
    }
}

/// Top-level description: a compatible string and the button child nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescription {
    pub compatible: String,

    #[serde(default)]
    pub children: Vec<DeviceNode>,
}

impl DeviceDescription {
    /// Whether this description is meant for the button driver.
    #[must_use]
    pub fn is_compatible(&self) -> bool {
        self.compatible == COMPATIBLE
    }
}

/// Everything the driver needs to attach one button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonConfig {
    pub label: String,
    pub pin: PinSpec,
    pub debounce_ms: u32,
    pub wake_allowed: bool,
}

impl ButtonConfig {
    /// Read a button configuration from a property source.
    ///
    /// `label`, `gpios` and `debounce-interval` are required.
    /// `wakeup-source` is optional and defaults to `true`.
    ///
    /// # Errors
    /// - `Error::MissingAttribute` if a required property is absent
    /// - `Error::InvalidConfiguration` if a property has the wrong shape or the label is empty
    pub fn from_properties<P: PropertySource>(source: &P) -> Result<Self> {
        let label = source.get_string(PROP_LABEL)?;
        if label.trim().is_empty() {
            return Err(Error::InvalidConfiguration(
                "label must not be empty".to_string(),
            ));
        }

        let cells: [u32; GPIO_SPECIFIER_CELLS] = source.get_u32_array(PROP_GPIOS)?;
        let pin = PinSpec::from_cells(&cells)?;

        let debounce_ms = source.get_u32(PROP_DEBOUNCE_INTERVAL)?;

        let wake_allowed = match source.get_bool(PROP_WAKEUP_SOURCE) {
            Ok(allowed) => allowed,
            Err(Error::MissingAttribute(_)) => true,
            Err(e) => return Err(e),
        };

        Ok(Self {
            label,
            pin,
            debounce_ms,
            wake_allowed,
        })
    }
}
