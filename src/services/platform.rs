// SPDX-License-Identifier: MIT
// Copyright 2026 Crosspost Contributors

//! Social platform API clients.
//!
//! Handles:
//! - Account-level analytics fetching
//! - OAuth code exchange and token refresh
//! - Auth failure detection (401 / "Invalid Credentials" marker)
//! - Rate limit detection

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;

use crate::config::Config;
use crate::error::AppError;
use crate::models::analytics::{MetricPoint, MetricSeries};
use crate::models::integration::Provider;

/// Marker some providers put in the body of an expired-token response.
/// Google APIs in particular return 401 bodies carrying this string.
const AUTH_ERROR_MARKER: &str = "Invalid Credentials";

const RATE_LIMIT_ERROR: &str = "Platform rate limit exceeded";

/// Error from a platform API call.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct PlatformError {
    pub status: Option<u16>,
    pub message: String,
}

impl PlatformError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Expired or revoked credentials, recoverable via token refresh.
    pub fn is_auth_error(&self) -> bool {
        self.status == Some(401) || self.message.contains(AUTH_ERROR_MARKER)
    }
}

impl From<PlatformError> for AppError {
    fn from(err: PlatformError) -> Self {
        AppError::PlatformApi(err.message)
    }
}

/// Tokens returned by an OAuth code exchange or refresh.
///
/// `refresh_token` is `None` for providers that do not rotate refresh
/// tokens on every grant; callers keep the previous one in that case.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Seconds until the access token expires
    pub expires_in: i64,
}

/// Account identity plus tokens from a completed OAuth code exchange.
#[derive(Debug, Clone)]
pub struct LinkedAccount {
    pub account_id: String,
    pub account_name: String,
    pub picture: Option<String>,
    pub grant: TokenGrant,
}

/// Per-provider API client.
///
/// One implementation per linked platform; the analytics aggregator only
/// ever talks to this interface.
#[async_trait]
pub trait PlatformClient: Send + Sync + std::fmt::Debug {
    /// Fetch metric series for an account over a trailing window of days.
    async fn analytics(
        &self,
        account_id: &str,
        access_token: &str,
        window_days: u32,
    ) -> Result<Vec<MetricSeries>, PlatformError>;

    /// Exchange a refresh token for fresh credentials.
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, PlatformError>;

    /// Exchange an OAuth authorization code during account linking.
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<LinkedAccount, PlatformError>;

    /// Provider authorization page URL for starting the OAuth flow.
    fn authorize_url(&self, redirect_uri: &str, state: &str) -> String;
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Static endpoint set for one provider.
#[derive(Debug)]
struct ProviderEndpoints {
    authorize_url: &'static str,
    token_url: &'static str,
    analytics_url: &'static str,
    profile_url: &'static str,
    scopes: &'static str,
}

fn endpoints_for(provider: Provider) -> ProviderEndpoints {
    match provider {
        Provider::Twitter => ProviderEndpoints {
            authorize_url: "https://twitter.com/i/oauth2/authorize",
            token_url: "https://api.twitter.com/2/oauth2/token",
            analytics_url: "https://api.twitter.com/2/accounts/metrics",
            profile_url: "https://api.twitter.com/2/users/me",
            scopes: "tweet.read users.read offline.access",
        },
        Provider::Facebook => ProviderEndpoints {
            authorize_url: "https://www.facebook.com/v19.0/dialog/oauth",
            token_url: "https://graph.facebook.com/v19.0/oauth/access_token",
            analytics_url: "https://graph.facebook.com/v19.0",
            profile_url: "https://graph.facebook.com/v19.0/me",
            scopes: "pages_show_list pages_read_engagement read_insights",
        },
        Provider::Instagram => ProviderEndpoints {
            authorize_url: "https://www.facebook.com/v19.0/dialog/oauth",
            token_url: "https://graph.facebook.com/v19.0/oauth/access_token",
            analytics_url: "https://graph.facebook.com/v19.0",
            profile_url: "https://graph.facebook.com/v19.0/me",
            scopes: "instagram_basic instagram_manage_insights",
        },
        Provider::Linkedin => ProviderEndpoints {
            authorize_url: "https://www.linkedin.com/oauth/v2/authorization",
            token_url: "https://www.linkedin.com/oauth/v2/accessToken",
            analytics_url: "https://api.linkedin.com/v2/organizationalEntityShareStatistics",
            profile_url: "https://api.linkedin.com/v2/me",
            scopes: "r_organization_social rw_organization_admin",
        },
        Provider::Youtube => ProviderEndpoints {
            authorize_url: "https://accounts.google.com/o/oauth2/v2/auth",
            token_url: "https://oauth2.googleapis.com/token",
            analytics_url: "https://youtubeanalytics.googleapis.com/v2/reports",
            profile_url: "https://www.googleapis.com/youtube/v3/channels",
            scopes: "https://www.googleapis.com/auth/yt-analytics.readonly",
        },
        // Storage providers are linked for file import, not analytics; they
        // are never registered as platform clients.
        Provider::GoogleDrive | Provider::Dropbox => ProviderEndpoints {
            authorize_url: "",
            token_url: "",
            analytics_url: "",
            profile_url: "",
            scopes: "",
        },
    }
}

/// reqwest-based platform client.
#[derive(Debug)]
pub struct HttpPlatformClient {
    http: reqwest::Client,
    provider: Provider,
    endpoints: ProviderEndpoints,
    client_id: String,
    client_secret: String,
}

impl HttpPlatformClient {
    pub fn new(provider: Provider, client_id: String, client_secret: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            provider,
            endpoints: endpoints_for(provider),
            client_id,
            client_secret,
        }
    }

    /// Check response status, mapping auth and rate-limit failures.
    async fn check_response_json<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, PlatformError> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();

            if status == 429 {
                tracing::warn!(provider = %self.provider, "Platform rate limit hit (429)");
                return Err(PlatformError::with_status(429, RATE_LIMIT_ERROR));
            }

            if status == 401 {
                return Err(PlatformError::with_status(401, AUTH_ERROR_MARKER));
            }

            return Err(PlatformError::with_status(
                status,
                format!("HTTP {}: {}", status, body),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| PlatformError::new(format!("JSON parse error: {}", e)))
    }

    /// Fetch Graph API insights (Facebook/Instagram shape).
    async fn fetch_graph_insights(
        &self,
        account_id: &str,
        access_token: &str,
        window_days: u32,
    ) -> Result<Vec<MetricSeries>, PlatformError> {
        let until = Utc::now().date_naive();
        let since = until - Duration::days(i64::from(window_days));
        let url = format!("{}/{}/insights", self.endpoints.analytics_url, account_id);

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&[
                ("period", "day".to_string()),
                ("since", since.to_string()),
                ("until", until.to_string()),
            ])
            .send()
            .await
            .map_err(|e| PlatformError::new(e.to_string()))?;

        let insights: GraphInsightsResponse = self.check_response_json(response).await?;

        Ok(insights
            .data
            .into_iter()
            .map(|insight| MetricSeries {
                label: insight.name,
                points: insight
                    .values
                    .into_iter()
                    .map(|v| MetricPoint {
                        // end_time is a full timestamp; the date is its day
                        date: v
                            .end_time
                            .as_deref()
                            .and_then(|t| t.get(..10))
                            .unwrap_or_default()
                            .to_string(),
                        total: v.value,
                    })
                    .collect(),
                average: false,
            })
            .collect())
    }

    /// Fetch the normalized series shape the remaining providers return.
    async fn fetch_series(
        &self,
        account_id: &str,
        access_token: &str,
        window_days: u32,
    ) -> Result<Vec<MetricSeries>, PlatformError> {
        let response = self
            .http
            .get(self.endpoints.analytics_url)
            .bearer_auth(access_token)
            .query(&[
                ("account_id", account_id.to_string()),
                ("days", window_days.to_string()),
            ])
            .send()
            .await
            .map_err(|e| PlatformError::new(e.to_string()))?;

        self.check_response_json(response).await
    }

    async fn fetch_token(
        &self,
        params: &[(&str, &str)],
    ) -> Result<TokenGrant, PlatformError> {
        let response = self
            .http
            .post(self.endpoints.token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| PlatformError::new(format!("Token request failed: {}", e)))?;

        let token: TokenResponse = self.check_response_json(response).await?;
        Ok(TokenGrant {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_in: token.expires_in,
        })
    }
}

#[async_trait]
impl PlatformClient for HttpPlatformClient {
    async fn analytics(
        &self,
        account_id: &str,
        access_token: &str,
        window_days: u32,
    ) -> Result<Vec<MetricSeries>, PlatformError> {
        match self.provider {
            Provider::Facebook | Provider::Instagram => {
                self.fetch_graph_insights(account_id, access_token, window_days)
                    .await
            }
            _ => self.fetch_series(account_id, access_token, window_days).await,
        }
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, PlatformError> {
        self.fetch_token(&[
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])
        .await
    }

    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<LinkedAccount, PlatformError> {
        let grant = self
            .fetch_token(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("grant_type", "authorization_code"),
            ])
            .await?;

        // Resolve the linked account's identity with the fresh token
        let response = self
            .http
            .get(self.endpoints.profile_url)
            .bearer_auth(&grant.access_token)
            .send()
            .await
            .map_err(|e| PlatformError::new(format!("Profile request failed: {}", e)))?;

        let profile: ProfileResponse = self.check_response_json(response).await?;

        Ok(LinkedAccount {
            account_id: profile.id,
            account_name: profile.name,
            picture: profile.picture,
            grant,
        })
    }

    fn authorize_url(&self, redirect_uri: &str, state: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
            self.endpoints.authorize_url,
            self.client_id,
            urlencoding::encode(redirect_uri),
            urlencoding::encode(self.endpoints.scopes),
            state
        )
    }
}

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

/// Normalized profile response.
#[derive(Debug, Clone, Deserialize)]
struct ProfileResponse {
    id: String,
    name: String,
    picture: Option<String>,
}

/// Graph API insights response (Facebook/Instagram).
#[derive(Debug, Clone, Deserialize)]
struct GraphInsightsResponse {
    data: Vec<GraphInsight>,
}

#[derive(Debug, Clone, Deserialize)]
struct GraphInsight {
    name: String,
    values: Vec<GraphInsightValue>,
}

#[derive(Debug, Clone, Deserialize)]
struct GraphInsightValue {
    value: f64,
    end_time: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

/// Closed registry of platform clients keyed by provider.
///
/// Lookup of a provider that was never registered fails with a typed
/// `UnknownProvider` error, synchronously.
#[derive(Default)]
pub struct PlatformRegistry {
    clients: HashMap<Provider, Arc<dyn PlatformClient>>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry from configured OAuth credentials. Providers
    /// without credentials are left unregistered.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();
        for provider in Provider::SOCIAL {
            if let Some(creds) = config.platform_credentials.get(&provider) {
                registry.register(
                    provider,
                    Arc::new(HttpPlatformClient::new(
                        provider,
                        creds.client_id.clone(),
                        creds.client_secret.clone(),
                    )),
                );
            }
        }
        registry
    }

    pub fn register(&mut self, provider: Provider, client: Arc<dyn PlatformClient>) {
        self.clients.insert(provider, client);
    }

    pub fn get(&self, provider: Provider) -> Result<Arc<dyn PlatformClient>, AppError> {
        self.clients
            .get(&provider)
            .cloned()
            .ok_or_else(|| AppError::UnknownProvider(provider.to_string()))
    }
}
