//! Core data models shared by the store, the prompt assembler, and the
//! HTTP layer.
//!
//! Wire shapes use camelCase field names because the callers are browser
//! scripts and the owner dashboard.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The stored chat setup of one business owner.
///
/// `owner_id` is the primary key. The three knowledge fields are free text
/// and are the only facts handed to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatConfiguration {
    pub owner_id: String,
    pub business_name: Option<String>,
    pub support_email: Option<String>,
    pub knowledge: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A full replacement of an owner's configuration.
///
/// Every optional field overwrites the stored value, including with `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsUpdate {
    pub owner_id: String,
    pub business_name: Option<String>,
    pub support_email: Option<String>,
    pub knowledge: Option<String>,
}

/// Body of `POST /settings`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsRequest {
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub business_name: Option<String>,
    #[serde(default)]
    pub support_email: Option<String>,
    #[serde(default)]
    pub knowledge: Option<String>,
}

impl SettingsRequest {
    /// Converts into an update, or `None` when `ownerId` is missing or blank.
    pub fn into_update(self) -> Option<SettingsUpdate> {
        let owner_id = non_blank(self.owner_id)?;
        Some(SettingsUpdate {
            owner_id,
            business_name: self.business_name,
            support_email: self.support_email,
            knowledge: self.knowledge,
        })
    }
}

/// Body of `POST /settings/get`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsLookup {
    #[serde(default)]
    pub owner_id: Option<String>,
}

impl SettingsLookup {
    pub fn owner_id(self) -> Option<String> {
        non_blank(self.owner_id)
    }
}

/// A validated visitor message addressed to one owner's bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub owner_id: String,
    pub message: String,
}

impl ChatRequest {
    /// Decodes a raw request body.
    ///
    /// Returns `None` when the body is not a JSON object or when either
    /// field is absent, not a string, or blank after trimming. The owner id
    /// is trimmed; the message is kept verbatim.
    pub fn from_json(body: &[u8]) -> Option<Self> {
        let value: Value = serde_json::from_slice(body).ok()?;
        let owner_id = required_str(&value, "ownerId")?;
        let message = required_str(&value, "message")?;
        Some(Self {
            owner_id: owner_id.trim().to_string(),
            message: message.to_string(),
        })
    }
}

/// Successful chat response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub reply: String,
}

fn required_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
