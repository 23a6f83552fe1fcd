// SPDX-License-Identifier: MIT
// Copyright 2026 Crosspost Contributors

//! Integration management routes.

use axum::{
    extract::{Path, State},
    routing::{delete, get},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::integration::{Integration, IntegrationKind, Provider};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/integrations", get(list_integrations))
        .route("/api/integrations/{id}", delete(disconnect_integration))
}

/// Linked account as exposed to the dashboard. Token material never
/// leaves the server.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationResponse {
    pub id: String,
    pub provider: Provider,
    pub kind: IntegrationKind,
    pub name: String,
    pub picture: Option<String>,
    pub refresh_needed: bool,
    pub disabled: bool,
    pub connected_at: String,
}

impl From<Integration> for IntegrationResponse {
    fn from(integration: Integration) -> Self {
        Self {
            id: integration.id,
            provider: integration.provider,
            kind: integration.kind,
            name: integration.account_name,
            picture: integration.picture,
            refresh_needed: integration.refresh_needed,
            disabled: integration.disabled,
            connected_at: crate::time_utils::format_utc_rfc3339(integration.created_at),
        }
    }
}

/// List the user's linked accounts.
async fn list_integrations(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<IntegrationResponse>>> {
    let integrations = state.db.list_integrations(&user.user_id).await?;
    Ok(Json(
        integrations
            .into_iter()
            .map(IntegrationResponse::from)
            .collect(),
    ))
}

#[derive(Serialize, Deserialize)]
pub struct DisconnectResponse {
    pub success: bool,
    pub message: String,
}

/// Disconnect a linked account (soft delete).
async fn disconnect_integration(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<DisconnectResponse>> {
    let removed = state
        .db
        .soft_delete_integration(&user.user_id, &id)
        .await?;

    if !removed {
        return Err(AppError::NotFound(format!("Integration {}", id)));
    }

    tracing::info!(integration_id = %id, user_id = %user.user_id, "Integration disconnected");

    Ok(Json(DisconnectResponse {
        success: true,
        message: "Integration disconnected".to_string(),
    }))
}
