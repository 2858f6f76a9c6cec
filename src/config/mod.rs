//! Configuration loading for HTTP capture.
//!
//! Settings are read from a JSON document under the `"http-capture"` key and
//! overlaid on the defaults one field at a time. Malformed or invalid values
//! never fail the caller: each is logged and its field keeps the default,
//! while the remaining settings still apply.

pub mod schema;

pub use schema::{CaptureConfig, ConfigOverlay, MAX_CONTENT_LENGTH_CEILING};

use log::warn;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Settings key holding the capture configuration.
pub const SETTINGS_KEY: &str = "http-capture";

/// Loads configuration from a JSON settings document.
///
/// # Example
///
/// ```no_run
/// use http_capture::config::load_config;
/// use serde_json::json;
///
/// let settings = json!({
///     "http-capture": {
///         "maxContentLength": 64000,
///         "retentionPeriod": "ONE_DAY"
///     }
/// });
///
/// let config = load_config(Some(settings));
/// assert_eq!(config.max_content_length, 64000);
/// ```
pub fn load_config(settings_json: Option<Value>) -> CaptureConfig {
    let defaults = CaptureConfig::default();

    let Some(settings) = settings_json.as_ref().and_then(|s| s.get(SETTINGS_KEY)) else {
        return defaults;
    };
    let Some(settings) = settings.as_object() else {
        warn!(
            "{} settings must be a JSON object. Using defaults.",
            SETTINGS_KEY
        );
        return defaults;
    };

    let overlay = ConfigOverlay {
        max_content_length: setting(settings, "maxContentLength").filter(|limit| {
            valid("maxContentLength", schema::validate_max_content_length(*limit))
        }),
        redacted_header_names: setting(settings, "redactedHeaderNames"),
        retention_period: setting(settings, "retentionPeriod"),
        show_notification: setting(settings, "showNotification"),
        skip_hosts: setting::<Vec<String>>(settings, "skipHosts")
            .filter(|hosts| valid("skipHosts", schema::validate_skip_hosts(hosts))),
    };

    defaults.merge(&overlay)
}

/// Reads one setting, logging and discarding a value of the wrong shape.
fn setting<T: DeserializeOwned>(settings: &Map<String, Value>, key: &str) -> Option<T> {
    let value = settings.get(key)?;
    match serde_json::from_value(value.clone()) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!(
                "Ignoring malformed {}.{}: {}. Using the default.",
                SETTINGS_KEY, key, e
            );
            None
        }
    }
}

fn valid(key: &str, result: Result<(), String>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            warn!("Ignoring invalid {}.{}: {}. Using the default.", SETTINGS_KEY, key, e);
            false
        }
    }
}
