use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const KEY_API_KEY: &str = "apiKey";
pub const KEY_PROFILE_TEXT: &str = "profileText";
pub const KEY_MIN_BUDGET: &str = "minBudget";
pub const KEY_MAX_BIDS: &str = "maxBids";
pub const KEY_AUTO_OPEN: &str = "autoOpenEnabled";
pub const KEY_WATCHING: &str = "watchingEnabled";

/// Older popup and content-script builds stored the same fields under these names.
const LEGACY_KEYS: &[(&str, &str)] = &[
    ("geminiApiKey", KEY_API_KEY),
    ("professionalProfile", KEY_PROFILE_TEXT),
    ("biotechProfile", KEY_PROFILE_TEXT),
    ("autoOpen", KEY_AUTO_OPEN),
    ("enabled", KEY_WATCHING),
];

pub const DEFAULT_MAX_BIDS: u64 = 100;

/// Thresholds, credentials and switches read by the watcher and the proposal injector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WatchConfig {
    pub min_budget: u64,
    pub max_bids: u64,
    pub api_key: String,
    pub profile_text: String,
    pub auto_open_enabled: bool,
    pub watching_enabled: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            min_budget: 0,
            max_bids: DEFAULT_MAX_BIDS,
            api_key: String::new(),
            profile_text: String::new(),
            auto_open_enabled: false,
            watching_enabled: true,
        }
    }
}

impl WatchConfig {
    /// Builds a configuration from stored key/value pairs.
    ///
    /// Absent keys keep their defaults, legacy key names are accepted, and a
    /// value of the wrong type falls back to the default for that field.
    /// Canonical keys win over legacy ones regardless of order.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut canonical: Vec<(String, Value)> = Vec::new();
        let mut legacy: Vec<(String, Value)> = Vec::new();

        for (key, value) in entries {
            if let Some((_, target)) = LEGACY_KEYS.iter().find(|(old, _)| *old == key) {
                legacy.push((target.to_string(), value));
            } else {
                canonical.push((key, value));
            }
        }

        let mut config = Self::default();
        for (key, value) in legacy.into_iter().chain(canonical) {
            config.apply(&key, &value);
        }
        config
    }

    fn apply(&mut self, key: &str, value: &Value) {
        let defaults = Self::default();
        match key {
            KEY_API_KEY => self.api_key = coerce_string(value).unwrap_or(defaults.api_key),
            KEY_PROFILE_TEXT => {
                self.profile_text = coerce_string(value).unwrap_or(defaults.profile_text)
            }
            KEY_MIN_BUDGET => self.min_budget = coerce_u64(value).unwrap_or(defaults.min_budget),
            KEY_MAX_BIDS => self.max_bids = coerce_u64(value).unwrap_or(defaults.max_bids),
            KEY_AUTO_OPEN => {
                self.auto_open_enabled = coerce_bool(value).unwrap_or(defaults.auto_open_enabled)
            }
            KEY_WATCHING => {
                self.watching_enabled = coerce_bool(value).unwrap_or(defaults.watching_enabled)
            }
            other => tracing::debug!("Ignoring unknown setting key: {}", other),
        }
    }

    /// Canonical key/value pairs, one per field.
    pub fn to_entries(&self) -> Vec<(&'static str, Value)> {
        vec![
            (KEY_API_KEY, json!(self.api_key)),
            (KEY_PROFILE_TEXT, json!(self.profile_text)),
            (KEY_MIN_BUDGET, json!(self.min_budget)),
            (KEY_MAX_BIDS, json!(self.max_bids)),
            (KEY_AUTO_OPEN, json!(self.auto_open_enabled)),
            (KEY_WATCHING, json!(self.watching_enabled)),
        ]
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

fn coerce_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn coerce_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "on" | "1" => Some(true),
            "false" | "off" | "0" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
