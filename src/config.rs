//! Application configuration loaded from environment variables.
//!
//! Secrets (signing keys, the token encryption key, per-provider OAuth
//! credentials) are read once at startup and cached in memory.

use std::collections::HashMap;
use std::env;

use crate::models::integration::Provider;

/// OAuth client credentials for one social platform.
#[derive(Debug, Clone)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// SQLite connection string
    pub database_url: String,
    /// Frontend URL for OAuth redirects
    pub frontend_url: String,
    /// Server port
    pub port: u16,

    // --- Secrets ---
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// HMAC key for signing OAuth state parameters
    pub oauth_state_key: Vec<u8>,
    /// 32-byte key for encrypting OAuth tokens at rest
    pub token_encryption_key: Vec<u8>,
    /// Per-provider OAuth app credentials; providers without credentials
    /// configured are simply not linkable on this deployment.
    pub platform_credentials: HashMap<Provider, OAuthCredentials>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let token_encryption_key = hex::decode(
            env::var("TOKEN_ENCRYPTION_KEY")
                .map_err(|_| ConfigError::Missing("TOKEN_ENCRYPTION_KEY"))?
                .trim(),
        )
        .map_err(|_| ConfigError::Invalid("TOKEN_ENCRYPTION_KEY must be hex"))?;

        if token_encryption_key.len() != 32 {
            return Err(ConfigError::Invalid(
                "TOKEN_ENCRYPTION_KEY must decode to 32 bytes",
            ));
        }

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://crosspost.db".to_string()),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),

            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
            oauth_state_key: env::var("OAUTH_STATE_KEY")
                .map_err(|_| ConfigError::Missing("OAUTH_STATE_KEY"))?
                .into_bytes(),
            token_encryption_key,
            platform_credentials: load_platform_credentials(),
        })
    }

    /// Default config for testing only.
    pub fn test_default() -> Self {
        let mut platform_credentials = HashMap::new();
        for provider in Provider::SOCIAL {
            platform_credentials.insert(
                provider,
                OAuthCredentials {
                    client_id: format!("test_{}_id", provider),
                    client_secret: format!("test_{}_secret", provider),
                },
            );
        }

        Self {
            database_url: "sqlite::memory:".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            port: 8080,
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            oauth_state_key: b"test_oauth_state_key".to_vec(),
            token_encryption_key: vec![7u8; 32],
            platform_credentials,
        }
    }
}

/// Read `{PROVIDER}_CLIENT_ID` / `{PROVIDER}_CLIENT_SECRET` pairs for every
/// known social provider. Missing pairs are skipped, not an error.
fn load_platform_credentials() -> HashMap<Provider, OAuthCredentials> {
    let mut credentials = HashMap::new();

    for provider in Provider::SOCIAL {
        let prefix = provider.as_str().to_uppercase().replace('-', "_");
        let id = env::var(format!("{}_CLIENT_ID", prefix));
        let secret = env::var(format!("{}_CLIENT_SECRET", prefix));

        match (id, secret) {
            (Ok(client_id), Ok(client_secret)) => {
                credentials.insert(
                    provider,
                    OAuthCredentials {
                        client_id: client_id.trim().to_string(),
                        client_secret: client_secret.trim().to_string(),
                    },
                );
            }
            _ => {
                tracing::debug!(provider = %provider, "No OAuth credentials configured");
            }
        }
    }

    credentials
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid configuration value: {0}")]
    Invalid(&'static str),
}
