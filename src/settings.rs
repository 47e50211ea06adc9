//! User settings — triage context and per-category prompt overrides.
//!
//! Read-through from the keyed store. Sensitive fields are held as
//! [`SecretString`] so they are redacted from `Debug` output and never
//! reach logs.

use std::collections::HashMap;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, Serializer};
use tracing::debug;

use crate::error::DatabaseError;
use crate::store::Database;

/// Per-user triage settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserSettings {
    pub username: String,
    /// Free-text description of the user's role, fed to the classifier.
    #[serde(default)]
    pub job_role_context: String,
    /// Skills summary, fed to job-listing analysis.
    #[serde(default)]
    pub job_skills: String,
    /// Comma-separated interests; non-empty switches newsletter
    /// summarization to the interest-filtered template.
    #[serde(default)]
    pub newsletter_interests: String,
    /// User-authored classification rules appended to the classifier prompt.
    #[serde(default)]
    pub classification_rules: String,
    /// Per-template body overrides, keyed by template name.
    #[serde(default)]
    pub custom_prompts: HashMap<String, String>,
    /// Azure DevOps area path for task export.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ado_area_path: Option<String>,
    /// Azure DevOps personal access token. Stored opaquely, never logged.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_secret"
    )]
    pub ado_pat: Option<SecretString>,
}

impl UserSettings {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Self::default()
        }
    }

    /// Custom prompt body for a template, if the user configured one.
    pub fn custom_prompt(&self, template_name: &str) -> Option<&str> {
        self.custom_prompts.get(template_name).map(String::as_str)
    }
}

fn serialize_secret<S: Serializer>(
    secret: &Option<SecretString>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(value) => serializer.serialize_str(value.expose_secret()),
        None => serializer.serialize_none(),
    }
}

/// Read-through settings store over the database.
pub struct SettingsStore {
    db: Arc<dyn Database>,
}

impl SettingsStore {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Fetch settings for a user, falling back to empty defaults.
    pub async fn get(&self, username: &str) -> Result<UserSettings, DatabaseError> {
        match self.db.get_user_settings(username).await? {
            Some(settings) => Ok(settings),
            None => {
                debug!(username, "No stored settings, using defaults");
                Ok(UserSettings::new(username))
            }
        }
    }

    /// Persist settings for a user.
    pub async fn put(&self, settings: &UserSettings) -> Result<(), DatabaseError> {
        self.db.put_user_settings(settings).await
    }
}
