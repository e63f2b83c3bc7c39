//! Runtime settings
//!
//! Loaded from JSON. Missing fields take their defaults, so a settings file
//! only needs the values it changes.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::collision::CollisionProperties;
use crate::error::ConfigError;

/// Queue events per frame before overflow
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 256;
/// Events handled by one drain before the rest wait for the next
pub const DEFAULT_MAX_EVENTS_PER_DRAIN: usize = 4096;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Capacity of the shared event queue
    pub event_queue_capacity: usize,
    /// Upper bound on events handled per drain (stops runaway feedback loops)
    pub max_events_per_drain: usize,
    /// Default collision grid layout
    pub collision: CollisionProperties,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            event_queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
            max_events_per_drain: DEFAULT_MAX_EVENTS_PER_DRAIN,
            collision: CollisionProperties::default(),
        }
    }
}

impl Settings {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn try_load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json(&json)
    }

    /// Load settings, falling back to defaults if the file is missing or invalid
    pub fn load(path: impl AsRef<Path>) -> Self {
        match Self::try_load(path) {
            Ok(settings) => {
                log::info!("Loaded settings");
                settings
            }
            Err(e) => {
                log::info!("Using default settings ({e})");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::WrapType;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let s = Settings::from_json(r#"{"event_queue_capacity": 32, "collision": {"wrap_y": "Toroidal"}}"#)
            .unwrap();
        assert_eq!(s.event_queue_capacity, 32);
        assert_eq!(s.max_events_per_drain, DEFAULT_MAX_EVENTS_PER_DRAIN);
        assert_eq!(s.collision.wrap_y, WrapType::Toroidal);
        assert_eq!(s.collision.grid_x_len, CollisionProperties::default().grid_x_len);
    }

    #[test]
    fn test_json_round_trip() {
        let mut s = Settings::default();
        s.max_events_per_drain = 10;
        let back = Settings::from_json(&s.to_json().unwrap()).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn test_bad_input() {
        assert!(matches!(Settings::from_json("{"), Err(ConfigError::Parse(_))));
        assert!(matches!(
            Settings::try_load("/definitely/not/here.json"),
            Err(ConfigError::Io { .. })
        ));
        assert_eq!(Settings::load("/definitely/not/here.json"), Settings::default());
    }
}
