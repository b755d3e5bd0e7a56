use anyhow::{Context, Result};
use async_trait::async_trait;
use keyring::Entry;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_TOKEN_REF: &str = "env:LUMINA_ACCESS_TOKEN";
const KEYRING_SERVICE: &str = "lumina_access_token";

/// Connection settings for the assistant backend.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub api_url: String,
    pub request_timeout: Duration,
    // Where the bearer token lives: 'env:VAR_NAME' or 'keyring'
    pub token_ref: String,
    pub user: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            token_ref: DEFAULT_TOKEN_REF.to_string(),
            user: "default".to_string(),
        }
    }
}

impl ClientConfig {
    /// Reads `LUMINA_API_URL`, `LUMINA_REQUEST_TIMEOUT_SECS`, `LUMINA_TOKEN_REF`
    /// and `LUMINA_USER`, falling back to defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("LUMINA_API_URL") {
            config.api_url = url;
        }
        if let Ok(secs) = std::env::var("LUMINA_REQUEST_TIMEOUT_SECS") {
            let secs: u64 = secs
                .trim()
                .parse()
                .context(format!("Invalid LUMINA_REQUEST_TIMEOUT_SECS value '{}'", secs))?;
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Ok(token_ref) = std::env::var("LUMINA_TOKEN_REF") {
            config.token_ref = token_ref;
        }
        if let Ok(user) = std::env::var("LUMINA_USER") {
            config.user = user;
        }
        log::debug!(
            "Loaded client config: api_url={}, timeout={:?}, token_ref={}",
            config.api_url,
            config.request_timeout,
            config.token_ref
        );
        Ok(config)
    }

    /// Builds the token provider named by `token_ref`.
    pub fn token_provider(&self) -> Result<Arc<dyn TokenProvider>> {
        match self.token_ref.as_str() {
            r if r.starts_with("env:") => {
                let var = r.trim_start_matches("env:");
                Ok(Arc::new(EnvTokenProvider::new(var)))
            }
            "keyring" => Ok(Arc::new(KeyringTokenProvider::new(&self.user))),
            other => Err(anyhow::anyhow!("Unsupported token_ref format: {}", other)),
        }
    }
}

// --- Token Providers ---

/// Supplies the bearer token for the signed-in user. `None` means "no session".
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Option<String>;

    /// Saves a token for this and later sessions. Read-only sources refuse.
    async fn store_token(&self, _token: &str) -> Result<()> {
        Err(anyhow::anyhow!("This token source is read-only"))
    }
}

/// Reads the token from an environment variable on every call.
pub struct EnvTokenProvider {
    var: String,
}

impl EnvTokenProvider {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

#[async_trait]
impl TokenProvider for EnvTokenProvider {
    async fn access_token(&self) -> Option<String> {
        match std::env::var(&self.var) {
            Ok(token) if !token.trim().is_empty() => Some(token),
            _ => {
                log::debug!("No access token in environment variable {}", self.var);
                None
            }
        }
    }

    async fn store_token(&self, _token: &str) -> Result<()> {
        Err(anyhow::anyhow!(
            "The access token is read from ${}; set it there or use LUMINA_TOKEN_REF=keyring",
            self.var
        ))
    }
}

/// Reads the token from the OS keyring.
pub struct KeyringTokenProvider {
    user: String,
}

impl KeyringTokenProvider {
    pub fn new(user: impl Into<String>) -> Self {
        Self { user: user.into() }
    }

    fn entry(&self) -> Result<Entry> {
        Entry::new(KEYRING_SERVICE, &self.user).context("Failed to create keyring entry")
    }
}

#[async_trait]
impl TokenProvider for KeyringTokenProvider {
    async fn access_token(&self) -> Option<String> {
        let lookup = self.entry().and_then(|entry| {
            entry
                .get_password()
                .context("Failed to read access token from keyring")
        });
        match lookup {
            Ok(token) => Some(token),
            Err(e) => {
                log::debug!("No keyring token for {}: {:?}", self.user, e);
                None
            }
        }
    }

    async fn store_token(&self, token: &str) -> Result<()> {
        log::info!("Storing access token in keyring for user: {}", self.user);
        self.entry()?
            .set_password(token)
            .context(format!("Failed to store access token for '{}'", self.user))
    }
}

/// In-memory token, or no session at all. Handy for tests and scripts.
pub struct StaticTokenProvider {
    token: Mutex<Option<String>>,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }

    pub fn signed_out() -> Self {
        Self {
            token: Mutex::new(None),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Option<String> {
        self.token.lock().clone()
    }

    async fn store_token(&self, token: &str) -> Result<()> {
        *self.token.lock() = Some(token.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_token_ref_is_rejected() {
        let config = ClientConfig {
            token_ref: "vault:secret".to_string(),
            ..ClientConfig::default()
        };
        assert!(config.token_provider().is_err());
    }

    #[tokio::test]
    async fn env_provider_treats_blank_as_signed_out() {
        std::env::set_var("LUMINA_TEST_TOKEN_BLANK", "   ");
        let provider = EnvTokenProvider::new("LUMINA_TEST_TOKEN_BLANK");
        assert_eq!(provider.access_token().await, None);

        std::env::set_var("LUMINA_TEST_TOKEN_SET", "tok-123");
        let provider = EnvTokenProvider::new("LUMINA_TEST_TOKEN_SET");
        assert_eq!(provider.access_token().await.as_deref(), Some("tok-123"));
    }

    #[tokio::test]
    async fn env_token_ref_builds_env_provider() {
        std::env::set_var("LUMINA_TEST_TOKEN_REF", "abc");
        let config = ClientConfig {
            token_ref: "env:LUMINA_TEST_TOKEN_REF".to_string(),
            ..ClientConfig::default()
        };
        let provider = config.token_provider().unwrap();
        assert_eq!(provider.access_token().await.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn env_provider_refuses_to_store() {
        let provider = EnvTokenProvider::new("LUMINA_TEST_TOKEN_READONLY");
        let err = provider.store_token("tok").await.unwrap_err();
        assert!(err.to_string().contains("LUMINA_TEST_TOKEN_READONLY"));
    }

    #[tokio::test]
    async fn static_provider_signs_in_on_store() {
        let provider = StaticTokenProvider::signed_out();
        provider.store_token("fresh").await.unwrap();
        assert_eq!(provider.access_token().await.as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn static_provider_can_be_signed_out() {
        assert_eq!(StaticTokenProvider::signed_out().access_token().await, None);
        assert_eq!(
            StaticTokenProvider::new("t").access_token().await.as_deref(),
            Some("t")
        );
    }
}
