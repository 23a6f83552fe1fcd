// SPDX-License-Identifier: MIT
// Copyright 2026 Crosspost Contributors

//! OAuth account-linking routes.
//!
//! `GET /auth/{provider}` starts the flow; the state parameter carries the
//! linking user's ID and the frontend return URL, HMAC-signed so the
//! callback can trust both. `GET /auth/{provider}/callback` exchanges the
//! code, stores the encrypted tokens, and issues a session JWT.

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Redirect,
    routing::get,
    Router,
};
use axum_extra::extract::cookie::CookieJar;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::middleware::auth::{create_jwt, decode_user};
use crate::models::integration::{Integration, Provider};
use crate::services::crypto::encrypt_token_pair;
use crate::AppState;

type HmacSha256 = Hmac<Sha256>;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/{provider}", get(auth_start))
        .route("/auth/{provider}/callback", get(auth_callback))
}

/// Query parameters for starting an OAuth flow.
#[derive(Deserialize)]
pub struct AuthStartParams {
    /// Frontend URL to redirect back to after OAuth completes.
    #[serde(default)]
    redirect_uri: Option<String>,
}

/// Start OAuth flow - redirect to the provider's authorization page.
async fn auth_start(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    Query(params): Query<AuthStartParams>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Result<Redirect> {
    let provider: Provider = provider.parse()?;
    let client = state.registry.get(provider)?;

    // An existing session links another account to the same user; a fresh
    // visitor becomes a new user on their first link.
    let user_id = decode_user(&jar, &headers, &state.config.jwt_signing_key)
        .map(|user| user.user_id)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let frontend_url = params
        .redirect_uri
        .unwrap_or_else(|| state.config.frontend_url.clone());

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("System time error: {}", e)))?
        .as_millis();

    let oauth_state = sign_state(
        &user_id,
        &frontend_url,
        timestamp,
        &state.config.oauth_state_key,
    )?;

    let callback_url = callback_url(&headers, provider);
    let auth_url = client.authorize_url(&callback_url, &oauth_state);

    tracing::info!(
        provider = %provider,
        user_id = %user_id,
        "Starting OAuth flow"
    );

    Ok(Redirect::temporary(&auth_url))
}

#[derive(Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    state: String,
    #[serde(default)]
    error: Option<String>,
}

/// OAuth callback - exchange code for tokens, store the integration.
async fn auth_callback(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Result<Redirect> {
    let provider: Provider = provider.parse()?;

    // The state carries the user identity; a tampered one is not usable.
    let Some((user_id, frontend_url)) =
        verify_and_decode_state(&params.state, &state.config.oauth_state_key)
    else {
        tracing::warn!(provider = %provider, "Invalid or tampered OAuth state");
        let redirect = format!("{}?error=invalid_state", state.config.frontend_url);
        return Ok(Redirect::temporary(&redirect));
    };

    if let Some(error) = params.error {
        tracing::warn!(provider = %provider, error = %error, "OAuth error from provider");
        let redirect = format!("{}?error={}", frontend_url, urlencoding::encode(&error));
        return Ok(Redirect::temporary(&redirect));
    }

    let code = params
        .code
        .ok_or_else(|| AppError::BadRequest("Missing authorization code".to_string()))?;

    let client = state.registry.get(provider)?;
    let linked = client
        .exchange_code(&code, &callback_url(&headers, provider))
        .await?;

    let (access_encrypted, refresh_encrypted) = encrypt_token_pair(
        &state.cipher,
        &linked.grant.access_token,
        linked.grant.refresh_token.as_deref(),
    )?;

    let now = Utc::now();
    let integration = Integration {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.clone(),
        provider,
        kind: provider.kind(),
        account_id: linked.account_id,
        account_name: linked.account_name,
        picture: linked.picture,
        access_token_encrypted: access_encrypted,
        refresh_token_encrypted: refresh_encrypted,
        token_expires_at: Some(now + chrono::Duration::seconds(linked.grant.expires_in)),
        refresh_needed: false,
        disabled: false,
        deleted_at: None,
        created_at: now,
        updated_at: now,
    };

    state.db.upsert_integration(&integration).await?;

    tracing::info!(
        provider = %provider,
        user_id = %user_id,
        account = %integration.account_name,
        "Account linked, tokens stored"
    );

    let jwt = create_jwt(&user_id, &state.config.jwt_signing_key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("JWT creation failed: {}", e)))?;

    let redirect_url = format!("{}/callback?token={}", frontend_url, jwt);
    Ok(Redirect::temporary(&redirect_url))
}

/// Callback URL for this deployment, derived from the request host.
fn callback_url(headers: &HeaderMap, provider: Provider) -> String {
    let host = headers
        .get(axum::http::header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| {
            std::env::var("API_HOST").unwrap_or_else(|_| "localhost:8080".to_string())
        });

    let scheme = if host.contains("localhost") || host.contains("127.0.0.1") {
        "http"
    } else {
        "https"
    };

    format!("{}://{}/auth/{}/callback", scheme, host, provider)
}

/// Build the signed state parameter:
/// base64url("user_id|frontend_url|timestamp_hex|signature_hex").
fn sign_state(
    user_id: &str,
    frontend_url: &str,
    timestamp: u128,
    secret: &[u8],
) -> Result<String> {
    let payload = format!("{}|{}|{:x}", user_id, frontend_url, timestamp);

    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(payload.as_bytes());
    let signature = mac.finalize().into_bytes();

    let signed = format!("{}|{}", payload, hex::encode(signature));
    Ok(URL_SAFE_NO_PAD.encode(signed.as_bytes()))
}

/// Verify the HMAC signature and decode (user_id, frontend_url).
fn verify_and_decode_state(state: &str, secret: &[u8]) -> Option<(String, String)> {
    let bytes = URL_SAFE_NO_PAD.decode(state).ok()?;
    let state_str = String::from_utf8(bytes).ok()?;

    // Format is "user_id|frontend_url|timestamp_hex|signature_hex"
    let parts: Vec<&str> = state_str.splitn(4, '|').collect();
    if parts.len() != 4 {
        return None;
    }

    let payload = format!("{}|{}|{}", parts[0], parts[1], parts[2]);

    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(payload.as_bytes());
    let expected_signature = hex::encode(mac.finalize().into_bytes());

    if parts[3] != expected_signature {
        tracing::error!("OAuth state signature mismatch");
        return None;
    }

    Some((parts[0].to_string(), parts[1].to_string()))
}
