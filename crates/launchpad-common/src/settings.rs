//! Settings resolution
//!
//! Job constructors never read ambient process state for defaults. Instead a
//! [`SettingsResolver`] is passed in explicitly, so tests and callers control
//! exactly where project/zone/service-account defaults come from.
//!
//! The settings file is YAML with one section per environment id plus an
//! optional `default` section:
//!
//! ```yaml
//! default:
//!   project: my-project
//!   zone: us-central2-b
//!   env_id: prod
//! prod:
//!   k8s_service_account: trainer
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use crate::Error;

/// Name of the section consulted when the environment section has no value
pub const DEFAULT_SECTION: &str = "default";

/// Settings keys recognized by job constructors
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SettingKey {
    /// Cloud project
    Project,
    /// Cloud zone
    Zone,
    /// Environment id selecting a settings section
    EnvId,
    /// Kubernetes service account job pods run as
    K8sServiceAccount,
}

impl SettingKey {
    /// Key as written in the settings file
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Zone => "zone",
            Self::EnvId => "env_id",
            Self::K8sServiceAccount => "k8s_service_account",
        }
    }
}

impl std::fmt::Display for SettingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source of default values for job configuration
pub trait SettingsResolver: Send + Sync {
    /// Look up a setting, returning `None` when it is not configured
    fn get(&self, key: SettingKey) -> Option<String>;
}

/// In-memory settings
#[derive(Debug, Clone, Default)]
pub struct StaticSettings {
    values: BTreeMap<SettingKey, String>,
}

impl StaticSettings {
    /// Create empty settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value
    pub fn with(mut self, key: SettingKey, value: impl Into<String>) -> Self {
        self.values.insert(key, value.into());
        self
    }
}

impl SettingsResolver for StaticSettings {
    fn get(&self, key: SettingKey) -> Option<String> {
        self.values.get(&key).cloned()
    }
}

/// Settings loaded from a YAML file, scoped to one environment id
#[derive(Debug, Clone, Default)]
pub struct FileSettings {
    sections: BTreeMap<String, BTreeMap<String, String>>,
    env_id: Option<String>,
}

impl FileSettings {
    /// Load settings from a YAML file
    pub fn load(path: &Path) -> Result<Self, Error> {
        let display = path.display().to_string();
        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::settings(&display, format!("failed to read: {}", e)))?;
        Self::from_yaml(&data).map_err(|e| match e {
            Error::Settings { message, .. } => Error::settings(display, message),
            other => other,
        })
    }

    /// Parse settings from YAML text
    pub fn from_yaml(data: &str) -> Result<Self, Error> {
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        let sections: BTreeMap<String, BTreeMap<String, String>> = serde_yaml::from_str(data)
            .map_err(|e| Error::settings("<inline>", format!("invalid settings yaml: {}", e)))?;
        Ok(Self {
            sections,
            env_id: None,
        })
    }

    /// Select the environment section used for lookups.
    ///
    /// When unset, the `env_id` of the `default` section is used.
    pub fn for_env(mut self, env_id: Option<String>) -> Self {
        self.env_id = env_id;
        self
    }

    fn section_value(&self, section: &str, key: SettingKey) -> Option<String> {
        self.sections
            .get(section)
            .and_then(|values| values.get(key.as_str()))
            .cloned()
    }

    fn active_env(&self) -> Option<String> {
        self.env_id
            .clone()
            .or_else(|| self.section_value(DEFAULT_SECTION, SettingKey::EnvId))
    }
}

impl SettingsResolver for FileSettings {
    fn get(&self, key: SettingKey) -> Option<String> {
        if key == SettingKey::EnvId {
            return self.active_env();
        }
        self.active_env()
            .and_then(|env| self.section_value(&env, key))
            .or_else(|| self.section_value(DEFAULT_SECTION, key))
    }
}
