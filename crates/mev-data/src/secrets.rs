//! Secret material (relay credential, signing key) kept out of config files.

use eyre::{eyre, Result};

/// Environment variable holding the relay `Authorization` credential.
pub const RELAY_AUTH_ENV: &str = "MEV_RELAY_AUTH";

/// Environment variable holding the hex signing key.
pub const SIGNER_KEY_ENV: &str = "MEV_SIGNER_KEY";

/// Supplies credentials to components at construction time.
pub trait SecretProvider {
    /// Credential sent as the relay `Authorization` header.
    fn relay_authorization(&self) -> Result<String>;

    /// Hex-encoded private key of the strategy account.
    fn signer_key(&self) -> Result<String>;
}

/// Reads secrets from the process environment, after loading `.env` if present.
#[derive(Debug, Default)]
pub struct EnvSecrets;

impl EnvSecrets {
    pub fn load() -> Self {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!(error = %e, "failed to read .env"),
        }
        Self
    }

    fn var(name: &str) -> Result<String> {
        let value = std::env::var(name).map_err(|_| eyre!("{name} is not set"))?;
        if value.trim().is_empty() {
            return Err(eyre!("{name} is empty"));
        }
        Ok(value)
    }
}

impl SecretProvider for EnvSecrets {
    fn relay_authorization(&self) -> Result<String> {
        Self::var(RELAY_AUTH_ENV)
    }

    fn signer_key(&self) -> Result<String> {
        Self::var(SIGNER_KEY_ENV)
    }
}

/// Fixed secrets, for tests and tooling that already hold the values.
#[derive(Clone, Debug)]
pub struct StaticSecrets {
    pub relay_authorization: String,
    pub signer_key: String,
}

impl SecretProvider for StaticSecrets {
    fn relay_authorization(&self) -> Result<String> {
        Ok(self.relay_authorization.clone())
    }

    fn signer_key(&self) -> Result<String> {
        Ok(self.signer_key.clone())
    }
}
