// SPDX-License-Identifier: MIT
// Copyright 2026 Crosspost Contributors

//! Aggregation scenarios: failure isolation, the refresh-and-retry
//! protocol, and determinism.

mod common;

use chrono::NaiveDate;
use common::*;
use crosspost::models::integration::Provider;
use crosspost::services::platform::{PlatformError, PlatformRegistry};

fn range() -> (NaiveDate, NaiveDate) {
    (
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
        NaiveDate::from_ymd_opt(2025, 6, 30).unwrap(),
    )
}

#[tokio::test]
async fn one_failing_integration_does_not_poison_the_rest() {
    let mut registry = PlatformRegistry::new();
    let twitter = MockPlatformClient::failing(PlatformError::with_status(503, "upstream down"));
    let facebook = MockPlatformClient::returning(vec![
        series("Impressions", &[("2025-06-01", 100.0), ("2025-06-02", 40.0)]),
        series("Likes", &[("2025-06-01", 7.0)]),
    ]);
    registry.register(Provider::Twitter, twitter.clone());
    registry.register(Provider::Facebook, facebook.clone());
    let (_, state) = create_test_app(registry).await;

    seed_integration(&state, Provider::Twitter, "tw-token", None).await;
    seed_integration(&state, Provider::Facebook, "fb-token", None).await;

    let (start, end) = range();
    let response = state
        .analytics
        .integration_analytics(TEST_USER, start, end, &[])
        .await
        .expect("aggregation never fails on one provider");

    assert_eq!(response.data.len(), 2);

    // Storage order, not completion order.
    let twitter_entry = &response.data[0];
    assert_eq!(twitter_entry.integration.provider, Provider::Twitter);
    assert!(twitter_entry.analytics.is_empty());
    assert!(twitter_entry.error.as_deref().unwrap().contains("upstream down"));

    let facebook_entry = &response.data[1];
    assert_eq!(facebook_entry.integration.provider, Provider::Facebook);
    assert!(facebook_entry.error.is_none());
    assert_eq!(facebook_entry.analytics.len(), 2);

    // The failed integration contributes zeros to the aggregate.
    let metrics = state
        .analytics
        .aggregated_analytics(TEST_USER, start, end)
        .await
        .unwrap();
    assert_eq!(metrics.total_impressions, 140.0);
    assert_eq!(metrics.total_engagements, 7.0);
    assert_eq!(metrics.platform_breakdown.len(), 2);
    assert_eq!(metrics.platform_breakdown[0].impressions, 0.0);
}

#[tokio::test]
async fn expired_token_is_refreshed_and_retried_once() {
    let mut registry = PlatformRegistry::new();
    let client = MockPlatformClient::expired(
        vec![series("Impressions", &[("2025-06-01", 55.0)])],
        true,
    );
    registry.register(Provider::Linkedin, client.clone());
    let (_, state) = create_test_app(registry).await;

    let integration =
        seed_integration(&state, Provider::Linkedin, "stale-token", Some("refresh-1")).await;

    let (start, end) = range();
    let response = state
        .analytics
        .integration_analytics(TEST_USER, start, end, &[])
        .await
        .unwrap();

    // Real data came back after the self-heal.
    assert!(response.data[0].error.is_none());
    assert_eq!(response.data[0].analytics.len(), 1);

    // Exactly one failed attempt, one refresh, one retry.
    assert_eq!(client.analytics_call_count(), 2);
    assert_eq!(client.refresh_call_count(), 1);

    // Rotated credentials were persisted and the flag stayed clear.
    let stored = state
        .db
        .get_integration(TEST_USER, &integration.id)
        .await
        .unwrap()
        .unwrap();
    assert!(!stored.refresh_needed);
    assert_eq!(
        state.cipher.decrypt(&stored.access_token_encrypted).unwrap(),
        FRESH_TOKEN
    );
    assert_eq!(
        state
            .cipher
            .decrypt(stored.refresh_token_encrypted.as_deref().unwrap())
            .unwrap(),
        "rotated-refresh"
    );
}

#[tokio::test]
async fn failed_refresh_flags_integration_and_contributes_empty() {
    let mut registry = PlatformRegistry::new();
    let client = MockPlatformClient::expired(
        vec![series("Impressions", &[("2025-06-01", 55.0)])],
        false,
    );
    registry.register(Provider::Youtube, client.clone());
    let (_, state) = create_test_app(registry).await;

    let integration =
        seed_integration(&state, Provider::Youtube, "stale-token", Some("refresh-1")).await;

    let (start, end) = range();
    let response = state
        .analytics
        .integration_analytics(TEST_USER, start, end, &[])
        .await
        .expect("refresh failure must not propagate");

    assert!(response.data[0].analytics.is_empty());
    assert!(response.data[0]
        .error
        .as_deref()
        .unwrap()
        .contains("token refresh failed"));

    let stored = state
        .db
        .get_integration(TEST_USER, &integration.id)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.refresh_needed);

    // No retry happened after the failed refresh.
    assert_eq!(client.analytics_call_count(), 1);
    assert_eq!(client.refresh_call_count(), 1);
}

#[tokio::test]
async fn auth_failure_without_refresh_token_is_not_retried() {
    let mut registry = PlatformRegistry::new();
    let client = MockPlatformClient::expired(vec![], true);
    registry.register(Provider::Twitter, client.clone());
    let (_, state) = create_test_app(registry).await;

    seed_integration(&state, Provider::Twitter, "stale-token", None).await;

    let (start, end) = range();
    let response = state
        .analytics
        .integration_analytics(TEST_USER, start, end, &[])
        .await
        .unwrap();

    assert!(response.data[0].analytics.is_empty());
    assert!(response.data[0]
        .error
        .as_deref()
        .unwrap()
        .contains("no refresh token"));
    assert_eq!(client.analytics_call_count(), 1);
    assert_eq!(client.refresh_call_count(), 0);
}

#[tokio::test]
async fn flagged_integration_refreshes_before_any_analytics_call() {
    let mut registry = PlatformRegistry::new();
    let client = MockPlatformClient::expired(
        vec![series("Impressions", &[("2025-06-01", 12.0)])],
        true,
    );
    registry.register(Provider::Facebook, client.clone());
    let (_, state) = create_test_app(registry).await;

    let mut integration =
        seed_integration(&state, Provider::Facebook, "stale-token", Some("refresh-1")).await;
    integration.refresh_needed = true;
    state
        .db
        .set_refresh_needed(&integration.id, true)
        .await
        .unwrap();

    let (start, end) = range();
    let response = state
        .analytics
        .integration_analytics(TEST_USER, start, end, &[])
        .await
        .unwrap();

    assert!(response.data[0].error.is_none());
    // The stale token was never tried: refresh first, then one fetch.
    assert_eq!(client.analytics_call_count(), 1);
    assert_eq!(client.refresh_call_count(), 1);
}

#[tokio::test]
async fn aggregation_is_deterministic_for_stable_upstreams() {
    let mut registry = PlatformRegistry::new();
    registry.register(
        Provider::Twitter,
        MockPlatformClient::returning(vec![
            series("Impressions", &[("2025-06-01", 10.0), ("2025-06-03", 30.0)]),
            series("Retweets", &[("2025-06-01", 2.0)]),
        ]),
    );
    let (_, state) = create_test_app(registry).await;

    let integration = seed_integration(&state, Provider::Twitter, "token", None).await;
    seed_published_post(&state, &integration.id, "post one", "2025-06-01T10:00:00Z").await;
    seed_published_post(&state, &integration.id, "post two", "2025-06-03T15:00:00Z").await;

    let (start, end) = range();
    let first = state
        .analytics
        .aggregated_analytics(TEST_USER, start, end)
        .await
        .unwrap();
    let second = state
        .analytics
        .aggregated_analytics(TEST_USER, start, end)
        .await
        .unwrap();

    assert_eq!(
        serde_json::to_value(&first).unwrap(),
        serde_json::to_value(&second).unwrap()
    );

    assert_eq!(first.total_posts, 2);
    assert_eq!(first.total_impressions, 40.0);
    assert_eq!(first.total_engagements, 2.0);
    let dates: Vec<&str> = first
        .time_series_data
        .iter()
        .map(|p| p.date.as_str())
        .collect();
    assert_eq!(dates, vec!["2025-06-01", "2025-06-03"]);
}

#[tokio::test]
async fn disconnected_and_disabled_integrations_are_skipped() {
    let mut registry = PlatformRegistry::new();
    let client = MockPlatformClient::returning(vec![series(
        "Impressions",
        &[("2025-06-01", 10.0)],
    )]);
    registry.register(Provider::Twitter, client.clone());
    let (_, state) = create_test_app(registry).await;

    let integration = seed_integration(&state, Provider::Twitter, "token", None).await;
    state
        .db
        .soft_delete_integration(TEST_USER, &integration.id)
        .await
        .unwrap();

    let (start, end) = range();
    let response = state
        .analytics
        .integration_analytics(TEST_USER, start, end, &[])
        .await
        .unwrap();

    assert!(response.data.is_empty());
    assert_eq!(client.analytics_call_count(), 0);
}

#[tokio::test]
async fn platform_filter_restricts_before_fetch() {
    let mut registry = PlatformRegistry::new();
    let twitter = MockPlatformClient::returning(vec![series(
        "Impressions",
        &[("2025-06-01", 10.0)],
    )]);
    let facebook = MockPlatformClient::returning(vec![series(
        "Impressions",
        &[("2025-06-01", 20.0)],
    )]);
    registry.register(Provider::Twitter, twitter.clone());
    registry.register(Provider::Facebook, facebook.clone());
    let (_, state) = create_test_app(registry).await;

    seed_integration(&state, Provider::Twitter, "t", None).await;
    seed_integration(&state, Provider::Facebook, "f", None).await;

    let (start, end) = range();
    let response = state
        .analytics
        .integration_analytics(TEST_USER, start, end, &[Provider::Facebook])
        .await
        .unwrap();

    assert_eq!(response.data.len(), 1);
    assert_eq!(response.data[0].integration.provider, Provider::Facebook);
    // The excluded platform was never fetched.
    assert_eq!(twitter.analytics_call_count(), 0);
    assert_eq!(facebook.analytics_call_count(), 1);
}

#[tokio::test]
async fn audience_growth_isolates_failures_too() {
    let mut registry = PlatformRegistry::new();
    registry.register(
        Provider::Twitter,
        MockPlatformClient::returning(vec![series(
            "Followers",
            &[
                ("2025-06-01", 100.0),
                ("2025-06-02", 103.0),
                ("2025-06-03", 101.0),
            ],
        )]),
    );
    registry.register(
        Provider::Youtube,
        MockPlatformClient::failing(PlatformError::new("connection reset")),
    );
    let (_, state) = create_test_app(registry).await;

    seed_integration(&state, Provider::Twitter, "t", None).await;
    seed_integration(&state, Provider::Youtube, "y", None).await;

    let (start, end) = range();
    let growth = state
        .analytics
        .audience_growth(TEST_USER, start, end)
        .await
        .expect("never throws to caller");

    assert_eq!(growth.len(), 2);
    let twitter = &growth[0];
    assert_eq!(twitter.points.len(), 3);
    assert_eq!(twitter.points[0].growth, 0.0);
    assert_eq!(twitter.points[1].growth, 3.0);
    assert_eq!(twitter.points[2].growth, -2.0);

    let youtube = &growth[1];
    assert!(youtube.points.is_empty());
    assert!(youtube.error.is_some());
}

#[tokio::test]
async fn best_times_need_three_samples_per_slot() {
    // Best-times is post-only; no platform client is ever consulted.
    let (_, state) = create_test_app(PlatformRegistry::new()).await;

    let integration = seed_integration(&state, Provider::Twitter, "t", None).await;

    // Three Mondays 09:xx UTC, two Fridays 17:xx UTC.
    for day in ["02", "09", "16"] {
        seed_published_post(
            &state,
            &integration.id,
            "monday post",
            &format!("2025-06-{}T09:12:00Z", day),
        )
        .await;
    }
    for day in ["06", "13"] {
        seed_published_post(
            &state,
            &integration.id,
            "friday post",
            &format!("2025-06-{}T17:40:00Z", day),
        )
        .await;
    }

    let slots = state.analytics.best_times_to_post(TEST_USER).await.unwrap();

    assert_eq!(slots.len(), 1);
    assert_eq!((slots[0].day_of_week, slots[0].hour), (1, 9));
    assert_eq!(slots[0].sample_count, 3);
    assert!(slots[0].avg_engagement_rate.is_none());
}

#[tokio::test]
async fn csv_export_has_two_sections() {
    let mut registry = PlatformRegistry::new();
    registry.register(
        Provider::Twitter,
        MockPlatformClient::returning(vec![
            series("Impressions", &[("2025-06-01", 200.0)]),
            series("Likes", &[("2025-06-01", 5.0)]),
        ]),
    );
    let (_, state) = create_test_app(registry).await;

    let integration = seed_integration(&state, Provider::Twitter, "t", None).await;
    seed_published_post(&state, &integration.id, "hello", "2025-06-01T12:00:00Z").await;

    let (start, end) = range();
    let csv = state
        .analytics
        .export_csv(TEST_USER, start, end)
        .await
        .unwrap();
    let lines: Vec<&str> = csv.lines().collect();

    assert_eq!(
        lines[0],
        "Date,Platform,Posts,Impressions,Engagements,Engagement Rate"
    );
    assert_eq!(lines[1], "2025-06-01,All Platforms,1,200,5,2.50%");
    assert_eq!(lines[2], "");
    assert_eq!(
        lines[3],
        "Platform,Posts,Impressions,Engagements,Engagement Rate"
    );
    assert_eq!(lines[4], "twitter,1,200,5,2.50%");
}
