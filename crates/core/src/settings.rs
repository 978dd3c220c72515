//! Runtime settings: source credentials, target environments and the
//! optional trigger secret.
//!
//! Settings are read from the environment and validated eagerly; an invalid
//! endpoint or unknown provider is rejected here, before any client or
//! network call exists.

use serde::{Deserialize, Serialize};

use crate::endpoints::validate_endpoint;
use crate::errors::{Error, Result};

const SOURCE_ENDPOINT_VAR: &str = "RUBIC_API_URL";
const SOURCE_API_KEY_VAR: &str = "RUBIC_API_KEY";
const ENVIRONMENTS_VAR: &str = "TRIPLETEX_ENVIRONMENTS";
const TRIGGER_SECRET_VAR: &str = "SYNC_TRIGGER_SECRET";

/// Credentials and endpoint for the authoritative source system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSettings {
    pub endpoint: String,
    pub api_key: String,
}

/// One target-system tenant with its own endpoint and credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetEnvironment {
    pub id: String,
    pub endpoint: String,
    pub consumer_token: String,
    pub employee_token: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Full reconciliation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSettings {
    pub source: SourceSettings,
    pub environments: Vec<TargetEnvironment>,
    /// Shared secret the trigger boundary checks when present.
    pub trigger_secret: Option<String>,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl SyncSettings {
    /// Load and validate settings from the process environment.
    ///
    /// `TRIPLETEX_ENVIRONMENTS` is a JSON array of [`TargetEnvironment`]
    /// objects.
    pub fn from_env() -> Result<Self> {
        let endpoint = env_var(SOURCE_ENDPOINT_VAR)
            .ok_or_else(|| Error::configuration(format!("{} is not set", SOURCE_ENDPOINT_VAR)))?;
        let api_key = env_var(SOURCE_API_KEY_VAR)
            .ok_or_else(|| Error::configuration(format!("{} is not set", SOURCE_API_KEY_VAR)))?;
        let environments_json = env_var(ENVIRONMENTS_VAR)
            .ok_or_else(|| Error::configuration(format!("{} is not set", ENVIRONMENTS_VAR)))?;

        let environments: Vec<TargetEnvironment> = serde_json::from_str(&environments_json)
            .map_err(|e| {
                Error::configuration(format!("{} is not valid JSON: {}", ENVIRONMENTS_VAR, e))
            })?;

        let settings = Self {
            source: SourceSettings { endpoint, api_key },
            environments,
            trigger_secret: env_var(TRIGGER_SECRET_VAR),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Validate endpoints and environment identifiers.
    pub fn validate(&self) -> Result<()> {
        validate_endpoint(&self.source.endpoint, "rubic")?;

        if self.environments.is_empty() {
            return Err(Error::configuration("No target environments configured"));
        }

        let mut seen = std::collections::HashSet::new();
        for environment in &self.environments {
            if environment.id.trim().is_empty() {
                return Err(Error::configuration("Environment id must not be empty"));
            }
            if !seen.insert(environment.id.as_str()) {
                return Err(Error::configuration(format!(
                    "Duplicate environment id '{}'",
                    environment.id
                )));
            }
            validate_endpoint(&environment.endpoint, "tripletex")?;
        }

        if self.enabled_environments().next().is_none() {
            return Err(Error::configuration("No target environments are enabled"));
        }

        Ok(())
    }

    /// Environments the orchestrator should attempt, in configured order.
    pub fn enabled_environments(&self) -> impl Iterator<Item = &TargetEnvironment> {
        self.environments.iter().filter(|e| e.enabled)
    }
}
