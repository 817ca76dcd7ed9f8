//! Change detection between successive property snapshots.

use acbridge_core::{PropertyMap, PropertyValue, EFFECTIVE_MODE};

/// Emits only the properties whose decoded value changed.
///
/// The derived effective mode is appended to every snapshot before diffing,
/// so it is reported exactly like a primary field.
#[derive(Debug, Clone, Default)]
pub struct StateSynchronizer {
    previous: PropertyMap,
}

impl StateSynchronizer {
    /// Create a synchronizer that has observed nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Effective mode for a snapshot: `off` while power is off, otherwise
    /// the mode value.
    #[must_use]
    pub fn effective_mode(properties: &PropertyMap) -> Option<PropertyValue> {
        let power = properties.get("power")?;
        if power.as_label() == Some("off") {
            return Some(PropertyValue::flag(false));
        }
        properties.get("mode").cloned()
    }

    /// Compare `properties` against the previous snapshot and remember it.
    ///
    /// Returns one `(name, value)` pair per changed key, in key order. The
    /// first call reports every key.
    pub fn observe(&mut self, properties: &PropertyMap) -> Vec<(String, PropertyValue)> {
        let mut current = properties.clone();
        if let Some(effective) = Self::effective_mode(properties) {
            current.insert(EFFECTIVE_MODE.to_string(), effective);
        }

        let changes: Vec<(String, PropertyValue)> = current
            .iter()
            .filter(|(name, value)| self.previous.get(*name) != Some(*value))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        if !changes.is_empty() {
            tracing::debug!(changed = changes.len(), "Properties changed");
        }

        self.previous = current;
        changes
    }

    /// The last snapshot observed, including the effective mode.
    #[must_use]
    pub fn previous(&self) -> &PropertyMap {
        &self.previous
    }
}
