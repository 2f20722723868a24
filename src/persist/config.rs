use serde::Deserialize;

use crate::core::{PersistError, Result};

/// Repository configuration.
///
/// Can be built in code or read from JSON:
///
/// ```
/// # use rowkeep::PersistConfig;
/// let config = PersistConfig::from_json(r#"{ "cache_enabled": false }"#).unwrap();
/// assert!(!config.cache_enabled);
/// assert!(config.date_triggers);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PersistConfig {
    /// Register hydrated entities in the identity cache.
    pub cache_enabled: bool,

    /// Default for new entities: maintain `created_at`/`updated_at` automatically.
    pub date_triggers: bool,
}

impl PersistConfig {
    pub fn new() -> Self {
        Self {
            cache_enabled: true,
            date_triggers: true,
        }
    }

    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn date_triggers(mut self, enabled: bool) -> Self {
        self.date_triggers = enabled;
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|err| PersistError::Configuration(format!("invalid config: {}", err)))
    }
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PersistConfig::default();
        assert!(config.cache_enabled);
        assert!(config.date_triggers);
    }

    #[test]
    fn test_builder_pattern() {
        let config = PersistConfig::new().cache_enabled(false).date_triggers(false);
        assert!(!config.cache_enabled);
        assert!(!config.date_triggers);
    }

    #[test]
    fn test_from_json() {
        let config = PersistConfig::from_json(r#"{"date_triggers": false}"#).unwrap();
        assert!(config.cache_enabled);
        assert!(!config.date_triggers);

        assert_eq!(PersistConfig::from_json("{}").unwrap(), PersistConfig::default());
    }

    #[test]
    fn test_invalid_json_is_configuration_error() {
        let err = PersistConfig::from_json(r#"{"cache_enabled": "yes"}"#).unwrap_err();
        assert!(matches!(err, PersistError::Configuration(_)));
    }
}
