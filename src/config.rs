use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

const CONFIG_DIR_VAR: &str = "FBZ_CONFIG_DIR";
const BASE_URL_VAR: &str = "FBZ_BASE_URL";
const SENDER_EMAIL_VAR: &str = "FBZ_SENDER_EMAIL";
const CONFIG_FILE_NAME: &str = "config.json";
const APP_DIR_NAME: &str = "fbz";

/// Settings resolved for one run: the stored file overlaid by environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub base_url: Option<String>,
    pub sender_email: Option<String>,
    pub stored: StoredConfig,
}

impl AppConfig {
    pub fn load() -> AppResult<Self> {
        let stored = StoredConfig::load()?;
        Ok(Self::resolve(
            stored,
            env::var(BASE_URL_VAR).ok(),
            env::var(SENDER_EMAIL_VAR).ok(),
        ))
    }

    fn resolve(
        stored: StoredConfig,
        base_url: Option<String>,
        sender_email: Option<String>,
    ) -> Self {
        Self {
            base_url: non_empty(base_url).or_else(|| non_empty(stored.base_url.clone())),
            sender_email: non_empty(sender_email)
                .or_else(|| non_empty(stored.sender_email.clone())),
            stored,
        }
    }
}

/// The on-disk settings written by `fbz config init`. The password lives
/// in the OS keyring, never in this file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoredConfig {
    pub base_url: Option<String>,
    pub sender_email: Option<String>,
    pub username: Option<String>,
}

impl StoredConfig {
    pub fn load() -> AppResult<Self> {
        Self::load_from(&config_file_path()?)
    }

    pub fn load_from(path: &Path) -> AppResult<Self> {
        match fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).map_err(|err| {
                AppError::Configuration(format!("invalid config file {}: {err}", path.display()))
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(AppError::Io(err)),
        }
    }

    pub fn save(&self) -> AppResult<()> {
        self.save_to(&config_file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(self)
            .map_err(|err| AppError::Configuration(format!("failed to write config: {err}")))?;
        fs::write(path, data)?;
        Ok(())
    }

    pub fn validate(&self) -> AppResult<()> {
        if let Some(url) = &self.base_url {
            validate_base_url(url)?;
        }
        if let Some(email) = &self.sender_email {
            validate_email(email)?;
        }
        Ok(())
    }
}

pub fn config_directory() -> AppResult<PathBuf> {
    if let Some(dir) = env::var_os(CONFIG_DIR_VAR) {
        return Ok(PathBuf::from(dir));
    }
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .ok_or_else(|| {
            AppError::Configuration(format!(
                "cannot locate a config directory; set {CONFIG_DIR_VAR}"
            ))
        })
}

pub fn config_file_path() -> AppResult<PathBuf> {
    Ok(config_directory()?.join(CONFIG_FILE_NAME))
}

pub fn validate_base_url(value: &str) -> AppResult<()> {
    let url = Url::parse(value.trim())
        .map_err(|err| AppError::Configuration(format!("invalid FogBugz URL {value:?}: {err}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(AppError::Configuration(format!(
            "FogBugz URL must use http or https, not {other}"
        ))),
    }
}

pub fn validate_email(value: &str) -> AppResult<()> {
    let invalid = || AppError::Configuration(format!("invalid email address format: {value:?}"));
    let (local, domain) = value.trim().split_once('@').ok_or_else(invalid)?;
    let domain_ok = domain
        .split_once('.')
        .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty());
    if local.is_empty() || !domain_ok || value.trim().contains(char::is_whitespace) {
        return Err(invalid());
    }
    Ok(())
}

pub fn mask_secret(value: &str) -> String {
    if value.len() > 6 && value.is_char_boundary(3) && value.is_char_boundary(value.len() - 3) {
        let prefix = &value[..3];
        let suffix = &value[value.len() - 3..];
        format!("{prefix}***{suffix}")
    } else if !value.is_empty() {
        "***".to_string()
    } else {
        "<not set>".to_string()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
