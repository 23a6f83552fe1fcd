// SPDX-License-Identifier: MIT
// Copyright 2026 Crosspost Contributors

//! Linked external accounts (social platforms and cloud storage).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A provider string that is not in the closed registry.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown provider: {0}")]
pub struct UnknownProviderError(pub String);

/// Closed set of providers an integration can point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provider {
    Twitter,
    Facebook,
    Instagram,
    Linkedin,
    Youtube,
    GoogleDrive,
    Dropbox,
}

impl Provider {
    /// Social providers, in registry order.
    pub const SOCIAL: [Provider; 5] = [
        Provider::Twitter,
        Provider::Facebook,
        Provider::Instagram,
        Provider::Linkedin,
        Provider::Youtube,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Twitter => "twitter",
            Provider::Facebook => "facebook",
            Provider::Instagram => "instagram",
            Provider::Linkedin => "linkedin",
            Provider::Youtube => "youtube",
            Provider::GoogleDrive => "google-drive",
            Provider::Dropbox => "dropbox",
        }
    }

    /// Human-readable name for dashboard display.
    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::Twitter => "Twitter/X",
            Provider::Facebook => "Facebook",
            Provider::Instagram => "Instagram",
            Provider::Linkedin => "LinkedIn",
            Provider::Youtube => "YouTube",
            Provider::GoogleDrive => "Google Drive",
            Provider::Dropbox => "Dropbox",
        }
    }

    pub fn kind(&self) -> IntegrationKind {
        match self {
            Provider::GoogleDrive | Provider::Dropbox => IntegrationKind::Storage,
            _ => IntegrationKind::Social,
        }
    }
}

impl FromStr for Provider {
    type Err = UnknownProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "twitter" => Ok(Provider::Twitter),
            "facebook" => Ok(Provider::Facebook),
            "instagram" => Ok(Provider::Instagram),
            "linkedin" => Ok(Provider::Linkedin),
            "youtube" => Ok(Provider::Youtube),
            "google-drive" => Ok(Provider::GoogleDrive),
            "dropbox" => Ok(Provider::Dropbox),
            other => Err(UnknownProviderError(other.to_string())),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an integration is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationKind {
    Social,
    Storage,
}

impl IntegrationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrationKind::Social => "social",
            IntegrationKind::Storage => "storage",
        }
    }
}

impl FromStr for IntegrationKind {
    type Err = UnknownProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "social" => Ok(IntegrationKind::Social),
            "storage" => Ok(IntegrationKind::Storage),
            other => Err(UnknownProviderError(other.to_string())),
        }
    }
}

/// A linked external account.
///
/// Tokens are stored encrypted; plaintext only exists transiently while a
/// platform call is in flight. Integrations are soft-deleted on disconnect,
/// never removed, so historical posts keep their platform attribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Integration {
    pub id: String,
    pub user_id: String,
    pub provider: Provider,
    pub kind: IntegrationKind,
    /// Provider-internal account identifier
    pub account_id: String,
    /// Display name of the linked account
    pub account_name: String,
    /// Avatar/profile picture URL, if the provider exposes one
    pub picture: Option<String>,
    pub access_token_encrypted: String,
    pub refresh_token_encrypted: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    /// Set when a credential failure could not be self-healed; the
    /// integration is not used for analytics again until a refresh succeeds.
    pub refresh_needed: bool,
    pub disabled: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_round_trip() {
        for provider in Provider::SOCIAL {
            assert_eq!(provider.as_str().parse::<Provider>().unwrap(), provider);
        }
        assert_eq!(
            "google-drive".parse::<Provider>().unwrap(),
            Provider::GoogleDrive
        );
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let err = "unknown".parse::<Provider>().unwrap_err();
        assert_eq!(err.0, "unknown");
    }

    #[test]
    fn test_storage_kind() {
        assert_eq!(Provider::Dropbox.kind(), IntegrationKind::Storage);
        assert_eq!(Provider::Twitter.kind(), IntegrationKind::Social);
    }
}
