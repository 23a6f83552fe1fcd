// SPDX-License-Identifier: MIT
// Copyright 2026 Crosspost Contributors

//! HTTP-level tests for integration management.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::*;
use crosspost::models::integration::Provider;
use crosspost::services::platform::PlatformRegistry;
use tower::ServiceExt; // for oneshot

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn list_shows_linked_accounts_without_token_material() {
    let (app, state) = create_test_app(PlatformRegistry::new()).await;
    seed_integration(&state, Provider::Twitter, "secret-token", Some("secret-refresh")).await;
    let bearer = test_bearer(&state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/integrations")
                .header(header::AUTHORIZATION, &bearer)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let raw = String::from_utf8(bytes.to_vec()).unwrap();

    // No token material, encrypted or otherwise, in the response.
    assert!(!raw.contains("secret-token"));
    assert!(!raw.contains("token"));

    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let list = json.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["provider"], "twitter");
    assert_eq!(list[0]["kind"], "social");
    assert_eq!(list[0]["refreshNeeded"], false);
}

#[tokio::test]
async fn disconnect_is_soft_and_idempotence_returns_not_found() {
    let (app, state) = create_test_app(PlatformRegistry::new()).await;
    let integration = seed_integration(&state, Provider::Linkedin, "t", None).await;
    let bearer = test_bearer(&state);

    let delete_req = || {
        Request::builder()
            .method("DELETE")
            .uri(format!("/api/integrations/{}", integration.id))
            .header(header::AUTHORIZATION, &bearer)
            .body(Body::empty())
            .unwrap()
    };

    let first = app.clone().oneshot(delete_req()).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let json = body_json(first).await;
    assert_eq!(json["success"], true);

    // Row survives with a deletion marker.
    let stored = state
        .db
        .get_integration(TEST_USER, &integration.id)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.deleted_at.is_some());

    // A second disconnect finds no live row.
    let second = app.clone().oneshot(delete_req()).await.unwrap();
    assert_eq!(second.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn relinking_revives_a_disconnected_account() {
    let (_, state) = create_test_app(PlatformRegistry::new()).await;
    let integration = seed_integration(&state, Provider::Facebook, "old-token", None).await;

    state
        .db
        .soft_delete_integration(TEST_USER, &integration.id)
        .await
        .unwrap();

    // Same (user, provider, account) arriving from a fresh OAuth callback:
    // the upsert revives the existing link with fresh credentials.
    seed_integration(&state, Provider::Facebook, "new-token", None).await;

    let live = state.db.list_social_integrations(TEST_USER).await.unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].id, integration.id);
    assert!(live[0].deleted_at.is_none());
    assert_eq!(
        state
            .cipher
            .decrypt(&live[0].access_token_encrypted)
            .unwrap(),
        "new-token"
    );
}

#[tokio::test]
async fn users_cannot_disconnect_each_others_integrations() {
    let (app, state) = create_test_app(PlatformRegistry::new()).await;
    let integration = seed_integration(&state, Provider::Twitter, "t", None).await;

    let other_jwt = crosspost::middleware::auth::create_jwt(
        "someone-else",
        &state.config.jwt_signing_key,
    )
    .unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/integrations/{}", integration.id))
                .header(header::AUTHORIZATION, format!("Bearer {}", other_jwt))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let stored = state
        .db
        .get_integration(TEST_USER, &integration.id)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.deleted_at.is_none());
}
