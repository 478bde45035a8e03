//! Linking metadata: environment and trace identifying attributes attached to
//! outbound batches and monitoring events.

use std::collections::HashMap;

/// Source of linking metadata, injected into the forwarder at construction.
pub trait LinkingMetadata: Send + Sync {
    /// Attributes describing the current process and trace context.
    fn current_metadata(&self) -> HashMap<String, String>;

    /// Ambient API credential used when none is configured.
    fn license_key(&self) -> Option<String> {
        None
    }
}

/// Provider that returns nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMetadata;

impl LinkingMetadata for NoMetadata {
    fn current_metadata(&self) -> HashMap<String, String> {
        HashMap::new()
    }
}

/// Provider backed by a fixed set of attributes.
#[derive(Debug, Clone, Default)]
pub struct StaticMetadata {
    attributes: HashMap<String, String>,
    license_key: Option<String>,
}

impl StaticMetadata {
    pub fn new(attributes: HashMap<String, String>) -> Self {
        Self {
            attributes,
            license_key: None,
        }
    }

    /// Metadata describing this host, taken from the environment.
    ///
    /// `hostname` comes from `HOSTNAME`, `entity.name` from
    /// `LOG_FORWARDER_ENTITY_NAME`; unset variables are skipped.
    pub fn from_env() -> Self {
        let mut attributes = HashMap::new();
        for (key, var) in [
            ("hostname", "HOSTNAME"),
            ("entity.name", "LOG_FORWARDER_ENTITY_NAME"),
        ] {
            if let Ok(value) = std::env::var(var) {
                if !value.is_empty() {
                    attributes.insert(key.to_string(), value);
                }
            }
        }
        Self::new(attributes)
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_license_key(mut self, license_key: impl Into<String>) -> Self {
        self.license_key = Some(license_key.into());
        self
    }
}

impl LinkingMetadata for StaticMetadata {
    fn current_metadata(&self) -> HashMap<String, String> {
        self.attributes.clone()
    }

    fn license_key(&self) -> Option<String> {
        self.license_key.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_metadata() {
        assert!(NoMetadata.current_metadata().is_empty());
        assert!(NoMetadata.license_key().is_none());
    }

    #[test]
    fn test_static_metadata() {
        let metadata = StaticMetadata::default()
            .with_attribute("entity.name", "checkout")
            .with_attribute("trace.id", "abc123")
            .with_license_key("key");

        let current = metadata.current_metadata();
        assert_eq!(current.len(), 2);
        assert_eq!(current.get("entity.name").map(String::as_str), Some("checkout"));
        assert_eq!(metadata.license_key().as_deref(), Some("key"));
    }
}
