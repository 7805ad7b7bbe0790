//! Launchpad settings stored at `~/.launchpad/`.
//!
//! The settings file resolution chain (highest priority first):
//! 1. Explicit `--settings` flag
//! 2. `LAUNCHPAD_SETTINGS` environment variable
//! 3. `~/.launchpad/settings.yaml`
//! 4. No settings: every default must be given on the command line

use std::path::{Path, PathBuf};

use launchpad_common::FileSettings;
use tracing::debug;

use crate::{Error, Result};

const CONFIG_DIR_NAME: &str = ".launchpad";
const SETTINGS_FILE_NAME: &str = "settings.yaml";
const LAUNCHPAD_SETTINGS_ENV: &str = "LAUNCHPAD_SETTINGS";

/// Path to `~/.launchpad/settings.yaml`, if a home directory is known.
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR_NAME).join(SETTINGS_FILE_NAME))
}

/// Where a settings path came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsSource {
    /// `--settings` flag or `LAUNCHPAD_SETTINGS`; must exist
    Explicit(PathBuf),
    /// `~/.launchpad/settings.yaml`; optional
    Default(PathBuf),
    None,
}

/// Resolve the settings path using the priority chain.
pub fn resolve_settings_path(explicit: Option<&Path>) -> SettingsSource {
    if let Some(path) = explicit {
        return SettingsSource::Explicit(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(LAUNCHPAD_SETTINGS_ENV) {
        if !path.is_empty() {
            return SettingsSource::Explicit(PathBuf::from(path));
        }
    }

    match default_settings_path() {
        Some(path) => SettingsSource::Default(path),
        None => SettingsSource::None,
    }
}

/// Load settings for `env_id` from the resolved settings file.
///
/// A missing default file yields empty settings; a missing explicit file is
/// an error.
pub fn load_settings(explicit: Option<&Path>, env_id: Option<String>) -> Result<FileSettings> {
    let settings = match resolve_settings_path(explicit) {
        SettingsSource::Explicit(path) => {
            if !path.exists() {
                return Err(Error::SettingsNotFound { path });
            }
            debug!(path = %path.display(), "loading settings");
            FileSettings::load(&path)?
        }
        SettingsSource::Default(path) if path.exists() => {
            debug!(path = %path.display(), "loading settings");
            FileSettings::load(&path)?
        }
        SettingsSource::Default(_) | SettingsSource::None => FileSettings::default(),
    };
    Ok(settings.for_env(env_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use launchpad_common::{SettingKey, SettingsResolver};

    #[test]
    fn explicit_path_wins() {
        let path = Path::new("/etc/launchpad/settings.yaml");
        assert_eq!(
            resolve_settings_path(Some(path)),
            SettingsSource::Explicit(path.to_path_buf())
        );
    }

    #[test]
    fn default_path_lives_in_launchpad_dir() {
        if let Some(path) = default_settings_path() {
            assert!(path.ends_with(".launchpad/settings.yaml"));
        }
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = load_settings(Some(Path::new("/nonexistent/launchpad.yaml")), None).unwrap_err();
        assert!(matches!(err, Error::SettingsNotFound { .. }));
    }

    #[test]
    fn explicit_file_is_loaded_for_env() {
        let dir = std::env::temp_dir().join(format!("launchpad-settings-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("settings.yaml");
        std::fs::write(
            &path,
            "default:\n  project: base\n  zone: us-central2-b\nstaging:\n  project: staging-project\n",
        )
        .unwrap();

        let settings = load_settings(Some(&path), Some("staging".to_string())).unwrap();
        assert_eq!(
            settings.get(SettingKey::Project).as_deref(),
            Some("staging-project")
        );
        assert_eq!(settings.get(SettingKey::Zone).as_deref(), Some("us-central2-b"));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
