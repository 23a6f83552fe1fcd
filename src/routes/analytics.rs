// SPDX-License-Identifier: MIT
// Copyright 2026 Crosspost Contributors

//! Analytics routes: cache layer over the aggregation service.

use axum::{
    extract::{Query, State},
    http::header,
    routing::{delete, get},
    Extension, Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::analytics::AggregatedMetrics;
use crate::models::integration::Provider;
use crate::services::analytics::{
    filter_metrics, AggregatedResponse, AudienceGrowth, PostingSlot,
};
use crate::services::cache::AnalyticsCache;
use crate::AppState;

/// Default trailing window when no explicit range is requested.
const DEFAULT_WINDOW_DAYS: i64 = 30;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/analytics/aggregated", get(get_aggregated))
        .route("/api/analytics/cache", delete(clear_cache))
        .route("/api/analytics/summary", get(get_summary))
        .route("/api/analytics/best-times", get(get_best_times))
        .route("/api/analytics/audience-growth", get(get_audience_growth))
        .route("/api/analytics/export", get(export_csv))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyticsQuery {
    /// ISO date ("YYYY-MM-DD"), inclusive
    start_date: Option<String>,
    /// ISO date ("YYYY-MM-DD"), inclusive
    end_date: Option<String>,
    /// Comma-separated provider identifiers
    platforms: Option<String>,
    /// Comma-separated metric labels
    metrics: Option<String>,
}

impl AnalyticsQuery {
    /// Resolve the requested date range, defaulting to the trailing 30
    /// days ending today.
    fn range(&self) -> Result<(NaiveDate, NaiveDate)> {
        let end = match &self.end_date {
            Some(raw) => parse_date(raw)?,
            None => Utc::now().date_naive(),
        };
        let start = match &self.start_date {
            Some(raw) => parse_date(raw)?,
            None => end - chrono::Duration::days(DEFAULT_WINDOW_DAYS),
        };

        if start > end {
            return Err(AppError::BadRequest(
                "startDate must not be after endDate".to_string(),
            ));
        }
        Ok((start, end))
    }

    fn platform_list(&self) -> Vec<String> {
        split_list(&self.platforms)
    }

    fn metric_list(&self) -> Vec<String> {
        split_list(&self.metrics)
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest(format!("Invalid date: {}", raw)))
}

fn split_list(raw: &Option<String>) -> Vec<String> {
    raw.as_deref()
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(String::from)
        .collect()
}

/// Per-integration analytics, cached for an hour per exact filter set.
async fn get_aggregated(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<AggregatedResponse>> {
    let (start, end) = query.range()?;

    let platform_names = query.platform_list();
    // An unknown platform identifier fails the request up front, before
    // any cache or network traffic.
    let platforms = platform_names
        .iter()
        .map(|name| name.parse::<Provider>())
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let metric_names = query.metric_list();

    let key = AnalyticsCache::key(
        &user.user_id,
        &start.to_string(),
        &end.to_string(),
        &platform_names,
        &metric_names,
    );

    if let Some(cached) = state.analytics_cache.get(&key) {
        tracing::debug!(key = %key, "Analytics cache hit");
        return Ok(Json(cached));
    }

    let mut response = state
        .analytics
        .integration_analytics(&user.user_id, start, end, &platforms)
        .await?;

    // The metric filter trims only what this endpoint echoes back; the
    // aggregate totals elsewhere always see the full fetch.
    filter_metrics(&mut response, &metric_names);

    state.analytics_cache.set(key, response.clone());
    Ok(Json(response))
}

#[derive(Serialize, Deserialize)]
pub struct CacheClearedResponse {
    pub success: bool,
    pub message: String,
}

/// Clear the whole analytics cache. Admin action: deliberately not scoped
/// to the requesting user.
async fn clear_cache(
    State(state): State<Arc<AppState>>,
    Extension(_user): Extension<AuthUser>,
) -> Json<CacheClearedResponse> {
    state.analytics_cache.clear();
    Json(CacheClearedResponse {
        success: true,
        message: "Analytics cache cleared".to_string(),
    })
}

/// Cross-platform aggregate totals, breakdown, and time series.
async fn get_summary(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<AggregatedMetrics>> {
    let (start, end) = query.range()?;
    let metrics = state
        .analytics
        .aggregated_analytics(&user.user_id, start, end)
        .await?;
    Ok(Json(metrics))
}

/// Historically busiest posting slots.
async fn get_best_times(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<PostingSlot>>> {
    let slots = state.analytics.best_times_to_post(&user.user_id).await?;
    Ok(Json(slots))
}

/// Per-platform follower growth.
async fn get_audience_growth(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<Vec<AudienceGrowth>>> {
    let (start, end) = query.range()?;
    let growth = state
        .analytics
        .audience_growth(&user.user_id, start, end)
        .await?;
    Ok(Json(growth))
}

/// Aggregate as downloadable CSV.
async fn export_csv(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<([(header::HeaderName, &'static str); 2], String)> {
    let (start, end) = query.range()?;
    let csv = state
        .analytics
        .export_csv(&user.user_id, start, end)
        .await?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"analytics.csv\"",
            ),
        ],
        csv,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list() {
        assert_eq!(
            split_list(&Some("twitter, facebook ,".to_string())),
            vec!["twitter".to_string(), "facebook".to_string()]
        );
        assert!(split_list(&None).is_empty());
        assert!(split_list(&Some("".to_string())).is_empty());
    }

    #[test]
    fn test_range_validation() {
        let query = AnalyticsQuery {
            start_date: Some("2025-06-30".to_string()),
            end_date: Some("2025-06-01".to_string()),
            platforms: None,
            metrics: None,
        };
        assert!(query.range().is_err());

        let query = AnalyticsQuery {
            start_date: Some("not-a-date".to_string()),
            end_date: None,
            platforms: None,
            metrics: None,
        };
        assert!(query.range().is_err());
    }

    #[test]
    fn test_default_range_is_trailing_30_days() {
        let query = AnalyticsQuery {
            start_date: None,
            end_date: None,
            platforms: None,
            metrics: None,
        };
        let (start, end) = query.range().unwrap();
        assert_eq!((end - start).num_days(), DEFAULT_WINDOW_DAYS);
    }
}
