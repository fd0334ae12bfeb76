//! Authentication material supplied through the process environment

use crate::ConfigError;
use std::fmt;

/// Environment variable holding the account handle
pub const HANDLE_VAR: &str = "BSKY_HANDLE";

/// Environment variable holding the app password
pub const APP_PASSWORD_VAR: &str = "BSKY_APP_PASSWORD";

/// Service handle and app credential used to open a session
#[derive(Clone)]
pub struct Credentials {
    pub handle: String,
    pub app_password: String,
}

impl Credentials {
    /// Reads credentials from the process environment
    ///
    /// Returns `ConfigError::MissingCredentials` naming every absent variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads credentials through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let handle = read(HANDLE_VAR);
        let app_password = read(APP_PASSWORD_VAR);

        match (handle, app_password) {
            (Some(handle), Some(app_password)) => Ok(Self {
                handle,
                app_password,
            }),
            (handle, app_password) => {
                let missing: Vec<&str> = [
                    handle.is_none().then_some(HANDLE_VAR),
                    app_password.is_none().then_some(APP_PASSWORD_VAR),
                ]
                .into_iter()
                .flatten()
                .collect();
                Err(ConfigError::MissingCredentials(format!(
                    "set {} in the environment",
                    missing.join(" and ")
                )))
            }
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("handle", &self.handle)
            .field("app_password", &"<redacted>")
            .finish()
    }
}
