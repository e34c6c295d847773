use std::env;

use async_trait::async_trait;
use keyring::Entry;
use tracing::debug;

use crate::config::StoredConfig;
use crate::domain::credential::Credential;
use crate::error::{AppError, AppResult};
use crate::services::CredentialSource;

pub const USERNAME_VAR: &str = "FBZ_USERNAME";
pub const PASSWORD_VAR: &str = "FBZ_PASSWORD";
pub const KEYRING_SERVICE: &str = "fbz";

/// Reads the credential pair from environment variables.
pub struct EnvCredentials {
    username_var: String,
    password_var: String,
}

impl EnvCredentials {
    pub fn new() -> Self {
        Self::with_vars(USERNAME_VAR, PASSWORD_VAR)
    }

    pub fn with_vars(username_var: impl Into<String>, password_var: impl Into<String>) -> Self {
        Self {
            username_var: username_var.into(),
            password_var: password_var.into(),
        }
    }
}

impl Default for EnvCredentials {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialSource for EnvCredentials {
    async fn fetch(&self) -> AppResult<Option<Credential>> {
        let username = env::var(&self.username_var).ok();
        let password = env::var(&self.password_var).ok();
        Ok(username
            .zip(password)
            .map(|(username, password)| Credential::new(username, password)))
    }
}

/// The FogBugz password held in the OS keyring (Keychain, Credential
/// Manager, kernel keyutils), stored under the configured username.
#[derive(Debug, Clone)]
pub struct KeyringCredentials {
    service: String,
    username: Option<String>,
}

impl KeyringCredentials {
    pub fn new(username: Option<String>) -> Self {
        Self::with_service(KEYRING_SERVICE, username)
    }

    pub fn with_service(service: impl Into<String>, username: Option<String>) -> Self {
        Self {
            service: service.into(),
            username: username
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty()),
        }
    }

    pub fn from_config(config: &StoredConfig) -> Self {
        Self::new(config.username.clone())
    }

    pub fn password(&self) -> AppResult<Option<String>> {
        let Some(entry) = self.entry()? else {
            return Ok(None);
        };
        match entry.get_password() {
            Ok(password) => Ok(Some(password)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(store_error("failed to read password", err)),
        }
    }

    pub fn store_password(&self, password: &str) -> AppResult<()> {
        let entry = self.entry()?.ok_or_else(|| {
            AppError::Configuration("set a FogBugz username before storing a password".to_string())
        })?;
        entry
            .set_password(password)
            .map_err(|err| store_error("failed to store password", err))
    }

    pub fn delete_password(&self) -> AppResult<()> {
        let Some(entry) = self.entry()? else {
            return Ok(());
        };
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(store_error("failed to delete password", err)),
        }
    }

    fn entry(&self) -> AppResult<Option<Entry>> {
        let Some(username) = self.username.as_deref() else {
            return Ok(None);
        };
        Entry::new(&self.service, username)
            .map(Some)
            .map_err(|err| store_error("failed to access keyring", err))
    }
}

#[async_trait]
impl CredentialSource for KeyringCredentials {
    async fn fetch(&self) -> AppResult<Option<Credential>> {
        let password = self.password()?;
        Ok(self
            .username
            .clone()
            .zip(password)
            .map(|(username, password)| Credential::new(username, password)))
    }
}

fn store_error(action: &str, err: keyring::Error) -> AppError {
    AppError::CredentialStore(format!("{action}: {err}"))
}

/// A fixed credential pair handed over by the caller.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    credential: Option<Credential>,
}

impl StaticCredentials {
    pub fn new(credential: Credential) -> Self {
        Self {
            credential: Some(credential),
        }
    }
}

#[async_trait]
impl CredentialSource for StaticCredentials {
    async fn fetch(&self) -> AppResult<Option<Credential>> {
        Ok(self.credential.clone())
    }
}

/// Asks each source in turn; the first complete credential wins.
#[derive(Default)]
pub struct CredentialChain {
    sources: Vec<(&'static str, Box<dyn CredentialSource>)>,
}

impl CredentialChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &'static str, source: impl CredentialSource + 'static) -> Self {
        self.sources.push((name, Box::new(source)));
        self
    }
}

#[async_trait]
impl CredentialSource for CredentialChain {
    async fn fetch(&self) -> AppResult<Option<Credential>> {
        for (name, source) in &self.sources {
            if let Some(credential) = source.fetch().await? {
                if credential.is_complete() {
                    debug!(source = name, "using FogBugz credentials");
                    return Ok(Some(credential));
                }
            }
        }
        Ok(None)
    }
}
