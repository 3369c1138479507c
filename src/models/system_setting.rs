use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One persisted key of the watch configuration.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct SystemSetting {
    pub key: String,
    pub value_json: String,
}

impl SystemSetting {
    pub fn new(key: impl Into<String>, value: serde_json::Value) -> Result<Self, String> {
        let value_json = serde_json::to_string(&value)
            .map_err(|e| format!("Failed to serialize value: {}", e))?;

        Ok(Self {
            key: key.into(),
            value_json,
        })
    }

    pub fn get_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.value_json)
    }
}
