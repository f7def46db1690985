//! Configuration flags for registrations.
//!
//! A registration carries a small string map of flags. The behavior pipeline
//! consumes the flags it recognizes; anything left over is rejected so typos
//! fail at registration time instead of silently doing nothing.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ArborError, Result};

/// A recognized `(key, value)` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Characteristic {
    key: &'static str,
    value: &'static str,
}

impl Characteristic {
    pub const CACHE: Characteristic = Characteristic::new("cache", "true");
    pub const NO_CACHE: Characteristic = Characteristic::new("cache", "false");
    pub const SYNCHRONIZE: Characteristic = Characteristic::new("synchronize", "true");
    pub const LOCK: Characteristic = Characteristic::new("lock", "true");
    pub const HIDE_IMPL: Characteristic = Characteristic::new("hide-impl", "true");
    pub const NO_HIDE_IMPL: Characteristic = Characteristic::new("hide-impl", "false");
    pub const PROPERTY_APPLYING: Characteristic = Characteristic::new("property-applying", "true");
    pub const AUTOMATIC: Characteristic = Characteristic::new("automatic", "true");
    pub const USE_NAMES: Characteristic = Characteristic::new("use-names", "true");
    pub const STATIC_INJECTION: Characteristic = Characteristic::new("static-injection", "true");
    pub const NONE: Characteristic = Characteristic::new("none", "true");
    /// Presence-only: the value is the name of the guard component.
    pub const GUARD: Characteristic = Characteristic::new("guard", "");

    pub const fn new(key: &'static str, value: &'static str) -> Self {
        Self { key, value }
    }

    #[inline]
    pub fn key(&self) -> &'static str {
        self.key
    }

    #[inline]
    pub fn value(&self) -> &'static str {
        self.value
    }

    fn presence_only(&self) -> bool {
        self.value.is_empty()
    }
}

/// Ordered flag map for one registration or for container defaults.
///
/// # Examples
/// ```
/// use arbor_container::properties::{Characteristic, Properties};
///
/// let mut props = Properties::from([Characteristic::CACHE, Characteristic::LOCK]);
/// assert!(props.remove_if_present(Characteristic::CACHE));
/// assert!(!props.remove_if_present(Characteristic::NO_CACHE));
/// assert_eq!(props.len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties(BTreeMap<String, String>);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a flag, replacing any value already set for its key.
    pub fn with(mut self, characteristic: Characteristic) -> Self {
        self.set(characteristic.key, characteristic.value);
        self
    }

    /// Guards the registration with the component registered under `name`.
    pub fn guarded_by(mut self, name: impl Into<String>) -> Self {
        self.set(Characteristic::GUARD.key, name);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Whether the flag is set with the matching value.
    pub fn is(&self, characteristic: Characteristic) -> bool {
        match self.0.get(characteristic.key) {
            Some(_) if characteristic.presence_only() => true,
            Some(value) => value == characteristic.value,
            None => false,
        }
    }

    /// Removes the flag when its value matches. Returns whether it did.
    pub fn remove_if_present(&mut self, characteristic: Characteristic) -> bool {
        if self.is(characteristic) {
            self.0.remove(characteristic.key);
            true
        } else {
            false
        }
    }

    /// Removes a presence-only flag and hands back its value.
    pub fn take(&mut self, characteristic: Characteristic) -> Option<String> {
        self.0.remove(characteristic.key)
    }

    /// These flags laid over `defaults`, key by key.
    pub fn over(&self, defaults: &Properties) -> Properties {
        let mut merged = defaults.clone();
        merged
            .0
            .extend(self.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }

    pub fn extend(&mut self, other: &Properties) {
        self.0
            .extend(other.0.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    /// Fails when any flag was left unconsumed.
    pub fn ensure_consumed(&self) -> Result<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(ArborError::UnprocessedConfiguration(self.clone()))
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<const N: usize> From<[Characteristic; N]> for Properties {
    fn from(characteristics: [Characteristic; N]) -> Self {
        characteristics
            .into_iter()
            .fold(Properties::new(), Properties::with)
    }
}

impl From<Characteristic> for Properties {
    fn from(characteristic: Characteristic) -> Self {
        Properties::new().with(characteristic)
    }
}

impl fmt::Display for Properties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}={value}")?;
        }
        f.write_str("}")
    }
}
