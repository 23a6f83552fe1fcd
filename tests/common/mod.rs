// SPDX-License-Identifier: MIT
// Copyright 2026 Crosspost Contributors

//! Shared test fixtures: mock platform clients, app construction, seeding.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crosspost::config::Config;
use crosspost::db::Database;
use crosspost::middleware::auth::create_jwt;
use crosspost::models::analytics::{MetricPoint, MetricSeries};
use crosspost::models::integration::{Integration, Provider};
use crosspost::models::post::{Post, PostStatus};
use crosspost::services::platform::{LinkedAccount, PlatformClient, PlatformError, TokenGrant};
use crosspost::services::{AnalyticsCache, AnalyticsService, PlatformRegistry, TokenCipher};
use crosspost::AppState;

#[allow(dead_code)]
pub const TEST_USER: &str = "user-test-1";

/// Access token the "expired" mock accepts after a refresh.
#[allow(dead_code)]
pub const FRESH_TOKEN: &str = "fresh-token";

/// Programmable in-memory platform client.
#[derive(Debug)]
pub struct MockPlatformClient {
    series: Vec<MetricSeries>,
    /// Tokens accepted by `analytics`; `None` accepts anything.
    valid_tokens: Option<HashSet<String>>,
    /// Grant handed out by `refresh_token`; `None` makes refresh fail.
    refresh_grant: Option<TokenGrant>,
    /// Unconditional analytics failure, checked first.
    error: Option<PlatformError>,
    pub analytics_calls: AtomicU32,
    pub refresh_calls: AtomicU32,
}

#[allow(dead_code)]
impl MockPlatformClient {
    /// Client that returns the given series for any token.
    pub fn returning(series: Vec<MetricSeries>) -> Arc<Self> {
        Arc::new(Self {
            series,
            valid_tokens: None,
            refresh_grant: None,
            error: None,
            analytics_calls: AtomicU32::new(0),
            refresh_calls: AtomicU32::new(0),
        })
    }

    /// Client whose every analytics call fails with the given error.
    pub fn failing(error: PlatformError) -> Arc<Self> {
        Arc::new(Self {
            series: Vec::new(),
            valid_tokens: None,
            refresh_grant: None,
            error: Some(error),
            analytics_calls: AtomicU32::new(0),
            refresh_calls: AtomicU32::new(0),
        })
    }

    /// Client that rejects every token except [`FRESH_TOKEN`] with a 401.
    /// `refresh_succeeds` controls whether `refresh_token` hands out a
    /// grant for [`FRESH_TOKEN`] or fails.
    pub fn expired(series: Vec<MetricSeries>, refresh_succeeds: bool) -> Arc<Self> {
        let refresh_grant = refresh_succeeds.then(|| TokenGrant {
            access_token: FRESH_TOKEN.to_string(),
            refresh_token: Some("rotated-refresh".to_string()),
            expires_in: 3600,
        });

        Arc::new(Self {
            series,
            valid_tokens: Some(HashSet::from([FRESH_TOKEN.to_string()])),
            refresh_grant,
            error: None,
            analytics_calls: AtomicU32::new(0),
            refresh_calls: AtomicU32::new(0),
        })
    }

    pub fn analytics_call_count(&self) -> u32 {
        self.analytics_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_call_count(&self) -> u32 {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlatformClient for MockPlatformClient {
    async fn analytics(
        &self,
        _account_id: &str,
        access_token: &str,
        _window_days: u32,
    ) -> Result<Vec<MetricSeries>, PlatformError> {
        self.analytics_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        if let Some(valid) = &self.valid_tokens {
            if !valid.contains(access_token) {
                return Err(PlatformError::with_status(401, "Invalid Credentials"));
            }
        }
        Ok(self.series.clone())
    }

    async fn refresh_token(&self, _refresh_token: &str) -> Result<TokenGrant, PlatformError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.refresh_grant
            .clone()
            .ok_or_else(|| PlatformError::with_status(400, "refresh token revoked"))
    }

    async fn exchange_code(
        &self,
        _code: &str,
        _redirect_uri: &str,
    ) -> Result<LinkedAccount, PlatformError> {
        Ok(LinkedAccount {
            account_id: "mock-account".to_string(),
            account_name: "Mock Account".to_string(),
            picture: None,
            grant: TokenGrant {
                access_token: FRESH_TOKEN.to_string(),
                refresh_token: Some("mock-refresh".to_string()),
                expires_in: 3600,
            },
        })
    }

    fn authorize_url(&self, _redirect_uri: &str, state: &str) -> String {
        format!("https://mock.example/authorize?state={}", state)
    }
}

/// Create a test app over an in-memory database and the given registry.
#[allow(dead_code)]
pub async fn create_test_app(registry: PlatformRegistry) -> (axum::Router, Arc<AppState>) {
    let config = Config::test_default();
    let db = Database::connect_in_memory()
        .await
        .expect("in-memory database");
    let cipher = TokenCipher::new(&config.token_encryption_key).expect("test cipher");
    let registry = Arc::new(registry);

    let analytics = AnalyticsService::new(db.clone(), registry.clone(), cipher.clone());

    let state = Arc::new(AppState {
        config,
        db,
        registry,
        cipher,
        analytics,
        analytics_cache: AnalyticsCache::new(),
    });

    (crosspost::routes::create_router(state.clone()), state)
}

/// Bearer token for [`TEST_USER`].
#[allow(dead_code)]
pub fn test_bearer(state: &Arc<AppState>) -> String {
    let jwt = create_jwt(TEST_USER, &state.config.jwt_signing_key).expect("test jwt");
    format!("Bearer {}", jwt)
}

/// Insert an integration with encrypted tokens; returns the stored model.
#[allow(dead_code)]
pub async fn seed_integration(
    state: &Arc<AppState>,
    provider: Provider,
    access_token: &str,
    refresh_token: Option<&str>,
) -> Integration {
    let now = Utc::now();
    let integration = Integration {
        id: Uuid::new_v4().to_string(),
        user_id: TEST_USER.to_string(),
        provider,
        kind: provider.kind(),
        account_id: format!("{}-account", provider),
        account_name: format!("{} Account", provider.display_name()),
        picture: None,
        access_token_encrypted: state.cipher.encrypt(access_token).expect("encrypt"),
        refresh_token_encrypted: refresh_token
            .map(|t| state.cipher.encrypt(t).expect("encrypt")),
        token_expires_at: Some(now + chrono::Duration::hours(2)),
        refresh_needed: false,
        disabled: false,
        deleted_at: None,
        created_at: now,
        updated_at: now,
    };

    state
        .db
        .upsert_integration(&integration)
        .await
        .expect("seed integration");
    integration
}

/// Insert a published post for [`TEST_USER`].
#[allow(dead_code)]
pub async fn seed_published_post(
    state: &Arc<AppState>,
    integration_id: &str,
    content: &str,
    published_at: &str,
) -> Post {
    let publish_date: DateTime<Utc> = DateTime::parse_from_rfc3339(published_at)
        .expect("valid timestamp")
        .with_timezone(&Utc);
    let now = Utc::now();

    let post = Post {
        id: Uuid::new_v4().to_string(),
        user_id: TEST_USER.to_string(),
        integration_id: integration_id.to_string(),
        content: content.to_string(),
        status: PostStatus::Published,
        publish_date: Some(publish_date),
        deleted_at: None,
        created_at: now,
        updated_at: now,
    };

    state.db.insert_post(&post).await.expect("seed post");
    post
}

/// Metric series fixture.
#[allow(dead_code)]
pub fn series(label: &str, points: &[(&str, f64)]) -> MetricSeries {
    MetricSeries {
        label: label.to_string(),
        points: points
            .iter()
            .map(|(date, total)| MetricPoint {
                date: date.to_string(),
                total: *total,
            })
            .collect(),
        average: false,
    }
}
