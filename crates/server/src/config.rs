//! Server configuration.
//!
//! Settings are layered, lowest precedence first: built-in defaults, command-line
//! flags, then the client's `initializationOptions`. The last layer is merged field
//! by field, so a client only needs to send the keys it wants to change.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::ConfigError;

/// Source label attached to published diagnostics unless configured otherwise.
pub const DEFAULT_DIAGNOSTIC_SOURCE: &str = "example-server";

/// Tunables of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
	/// Quiescence window before diagnostics are recomputed after a change.
	pub debounce_ms: u64,
	/// `source` label on every diagnostic.
	pub diagnostic_source: String,
	/// How long to wait for the client to answer a server-initiated request.
	pub request_timeout_ms: u64,
	/// Send `window/showMessage` when a document is opened.
	pub show_open_message: bool,
}

impl Default for ServerConfig {
	fn default() -> Self {
		Self {
			debounce_ms: 150,
			diagnostic_source: DEFAULT_DIAGNOSTIC_SOURCE.to_owned(),
			request_timeout_ms: 30_000,
			show_open_message: true,
		}
	}
}

impl ServerConfig {
	/// The diagnostics debounce window.
	#[must_use]
	pub fn debounce(&self) -> Duration {
		Duration::from_millis(self.debounce_ms)
	}

	/// The timeout for outbound requests.
	#[must_use]
	pub fn request_timeout(&self) -> Duration {
		Duration::from_millis(self.request_timeout_ms)
	}

	/// Overlays the keys of a JSON object onto this configuration.
	///
	/// `null` leaves the configuration untouched and unknown keys are ignored. On
	/// error the configuration is left unchanged.
	///
	/// # Errors
	///
	/// - [`ConfigError::NotAnObject`] when `overrides` is neither an object nor `null`.
	/// - [`ConfigError::Invalid`] when a known key has a value of the wrong type.
	pub fn merge_json(&mut self, overrides: &JsonValue) -> Result<(), ConfigError> {
		let overrides = match overrides {
			JsonValue::Null => return Ok(()),
			JsonValue::Object(map) => map,
			JsonValue::Bool(_) => return Err(ConfigError::NotAnObject("a boolean")),
			JsonValue::Number(_) => return Err(ConfigError::NotAnObject("a number")),
			JsonValue::String(_) => return Err(ConfigError::NotAnObject("a string")),
			JsonValue::Array(_) => return Err(ConfigError::NotAnObject("an array")),
		};

		let mut merged = serde_json::to_value(&*self)?;
		if let JsonValue::Object(fields) = &mut merged {
			for (key, value) in overrides {
				if let Some(slot) = fields.get_mut(key) {
					*slot = value.clone();
				}
			}
		}
		*self = serde_json::from_value(merged)?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use serde_json::json;

	use super::*;

	#[test]
	fn defaults() {
		let config = ServerConfig::default();
		assert_eq!(config.debounce(), Duration::from_millis(150));
		assert_eq!(config.diagnostic_source, "example-server");
		assert_eq!(config.request_timeout(), Duration::from_secs(30));
		assert!(config.show_open_message);
	}

	#[test]
	fn merge_overrides_only_given_keys() {
		let mut config = ServerConfig {
			debounce_ms: 20,
			..ServerConfig::default()
		};
		config
			.merge_json(&json!({ "diagnosticSource": "lumen", "unknownKey": 1 }))
			.unwrap();
		assert_eq!(
			config,
			ServerConfig {
				debounce_ms: 20,
				diagnostic_source: "lumen".into(),
				..ServerConfig::default()
			}
		);
	}

	#[test]
	fn merge_rejects_bad_input_and_keeps_config() {
		let mut config = ServerConfig::default();
		assert!(matches!(config.merge_json(&json!([1, 2])), Err(ConfigError::NotAnObject(_))));
		assert!(matches!(
			config.merge_json(&json!({ "debounceMs": "soon" })),
			Err(ConfigError::Invalid(_))
		));
		config.merge_json(&JsonValue::Null).unwrap();
		assert_eq!(config, ServerConfig::default());
	}

	#[test]
	fn partial_json_fills_defaults() {
		let config: ServerConfig = serde_json::from_value(json!({ "showOpenMessage": false })).unwrap();
		assert!(!config.show_open_message);
		assert_eq!(config.debounce_ms, 150);
	}
}
