//! Configuration schema (nexus-infra.toml)

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::topology::Topology;

/// Default build artifact, relative to the infrastructure directory
pub const DEFAULT_ARTIFACT_PATH: &str = "../nexus/target/lambda/server/bootstrap.zip";

static EMAIL_PATTERN: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$"));

/// Environment variable names; the secret key is also a property path segment
static ENV_NAME_PATTERN: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$"));

fn compiled(pattern: &'static Lazy<Result<Regex, regex::Error>>) -> Result<&'static Regex, ConfigError> {
    Lazy::force(pattern)
        .as_ref()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Delivery notification settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Local part of the transactional sender address
    #[serde(default = "default_sender_local_part")]
    pub sender_local_part: String,

    /// Addresses subscribed to the delivery notification topic
    #[serde(default = "default_subscribers")]
    pub subscribers: Vec<String>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            sender_local_part: default_sender_local_part(),
            subscribers: default_subscribers(),
        }
    }
}

/// Monthly budget notification settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetConfig {
    #[serde(default = "default_subscribers")]
    pub subscribers: Vec<String>,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            subscribers: default_subscribers(),
        }
    }
}

/// Externally managed cross-stack values
///
/// When set, these take precedence over whatever the edge graph produces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrossStackOverrides {
    #[serde(default)]
    pub firewall_policy_arn: Option<String>,

    #[serde(default)]
    pub certificate_arn: Option<String>,
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Topology version to build
    #[serde(default)]
    pub topology: Topology,

    /// Add the user_uuid secondary index to the users table
    #[serde(default)]
    pub include_user_uuid_index: bool,

    /// Apex domain; non-prod stages get `<stage>.` prepended
    #[serde(default = "default_root_domain")]
    pub root_domain: String,

    /// Region of the application graph
    #[serde(default = "default_region")]
    pub region: String,

    /// Region of the firewall/certificate graph (edge services live here)
    #[serde(default = "default_edge_region")]
    pub edge_region: String,

    /// Account id used in generated ARNs; a pseudo-reference when absent
    #[serde(default)]
    pub account: Option<String>,

    /// Prebuilt compute artifact
    #[serde(default = "default_artifact_path")]
    pub artifact_path: String,

    /// Name of the environment variable holding the payment-provider key
    #[serde(default = "default_secret_env")]
    pub secret_env: String,

    /// Redact secret values in written output
    #[serde(default = "default_true")]
    pub redact_sensitive_data: bool,

    #[serde(default)]
    pub notifications: NotificationConfig,

    #[serde(default)]
    pub budget: BudgetConfig,

    #[serde(default)]
    pub cross_stack: CrossStackOverrides,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            topology: Topology::default(),
            include_user_uuid_index: false,
            root_domain: default_root_domain(),
            region: default_region(),
            edge_region: default_edge_region(),
            account: None,
            artifact_path: default_artifact_path(),
            secret_env: default_secret_env(),
            redact_sensitive_data: true,
            notifications: NotificationConfig::default(),
            budget: BudgetConfig::default(),
            cross_stack: CrossStackOverrides::default(),
        }
    }
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Self::from_toml(&contents)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Account segment for generated ARNs
    pub fn account_ref(&self) -> &str {
        self.account.as_deref().unwrap_or("${AWS::AccountId}")
    }

    /// Check values serde cannot check on its own
    pub fn validate(&self) -> Result<(), ConfigError> {
        let email = compiled(&EMAIL_PATTERN)?;

        let addresses = self
            .notifications
            .subscribers
            .iter()
            .chain(self.budget.subscribers.iter());
        for address in addresses {
            if !email.is_match(address) {
                return Err(ConfigError::InvalidValue {
                    field: "subscribers".to_string(),
                    value: address.clone(),
                });
            }
        }

        if self.root_domain.is_empty() || self.root_domain.starts_with('.') {
            return Err(ConfigError::InvalidValue {
                field: "root_domain".to_string(),
                value: self.root_domain.clone(),
            });
        }

        if !compiled(&ENV_NAME_PATTERN)?.is_match(&self.secret_env) {
            return Err(ConfigError::InvalidValue {
                field: "secret_env".to_string(),
                value: self.secret_env.clone(),
            });
        }

        Ok(())
    }
}

fn default_root_domain() -> String {
    "example.com".to_string()
}

fn default_region() -> String {
    "us-west-2".to_string()
}

fn default_edge_region() -> String {
    "us-east-1".to_string()
}

fn default_artifact_path() -> String {
    DEFAULT_ARTIFACT_PATH.to_string()
}

fn default_secret_env() -> String {
    "STRIPE_SECRET_KEY".to_string()
}

fn default_sender_local_part() -> String {
    "notifications".to_string()
}

fn default_subscribers() -> Vec<String> {
    vec!["ops@example.com".to_string(), "billing@example.com".to_string()]
}

fn default_true() -> bool {
    true
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Invalid value for '{field}': {value}")]
    InvalidValue { field: String, value: String },
}
