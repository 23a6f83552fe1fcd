// SPDX-License-Identifier: MIT
// Copyright 2026 Crosspost Contributors

//! Cross-platform analytics aggregation.
//!
//! For a user and a date range, pulls metric series from every linked
//! social account concurrently, self-heals expired credentials via a
//! single refresh-and-retry, and merges the heterogeneous per-platform
//! series into one set of totals, a per-platform breakdown, and a unified
//! daily time series.
//!
//! One integration's failure never fails the whole request: its entry
//! carries an error string and contributes nothing to the totals.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::error::AppError;
use crate::models::analytics::{
    engagement_rate, AggregatedMetrics, MetricBucket, MetricSeries, PlatformBreakdown,
    TimeSeriesPoint, TopPost,
};
use crate::models::integration::{Integration, Provider};
use crate::models::post::PublishedPost;
use crate::services::crypto::TokenCipher;
use crate::services::platform::{PlatformClient, PlatformRegistry};
use crate::time_utils::{utc_day_key, window_days};

/// Bound on a single platform fetch so one hung provider cannot hang the
/// whole aggregation. Timeout takes the same path as any other fetch error.
const FETCH_TIMEOUT: Duration = Duration::from_secs(20);

/// Most-recent published posts surfaced in the aggregate.
const TOP_POSTS_LIMIT: usize = 10;

/// Content preview length, in characters.
const PREVIEW_CHARS: usize = 100;

/// Minimum posts per (weekday, hour) slot before it is ranked.
const MIN_SLOT_SAMPLES: u32 = 3;

const BEST_TIMES_LIMIT: usize = 10;

/// Integration identity surfaced in analytics responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationSummary {
    pub id: String,
    pub name: String,
    pub provider: Provider,
    pub picture: Option<String>,
}

impl From<&Integration> for IntegrationSummary {
    fn from(integration: &Integration) -> Self {
        Self {
            id: integration.id.clone(),
            name: integration.account_name.clone(),
            provider: integration.provider,
            picture: integration.picture.clone(),
        }
    }
}

/// One integration's raw contribution: its fetched series, or an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationAnalytics {
    pub integration: IntegrationSummary,
    pub analytics: Vec<MetricSeries>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Period {
    pub from: String,
    pub to: String,
}

/// Payload of the aggregated-analytics endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedResponse {
    pub data: Vec<IntegrationAnalytics>,
    pub period: Period,
}

/// A (weekday, hour) posting slot ranked by historical use.
///
/// `avg_engagement_rate` is always `None`: the platform APIs aggregated
/// here expose no per-post engagement, so there is no honest rate to
/// average. Slots rank by sample count until such a source exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostingSlot {
    /// 0 = Sunday .. 6 = Saturday
    pub day_of_week: u32,
    pub hour: u32,
    pub sample_count: u32,
    pub avg_engagement_rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrowthPoint {
    pub date: String,
    pub followers: f64,
    pub growth: f64,
}

/// Day-over-day follower growth for one integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudienceGrowth {
    pub integration: IntegrationSummary,
    pub points: Vec<GrowthPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of one analytics attempt against a platform.
enum FetchAttempt {
    Fetched(Vec<MetricSeries>),
    NeedsRefresh,
    Failed(String),
}

/// Analytics aggregation service.
#[derive(Clone)]
pub struct AnalyticsService {
    db: Database,
    registry: Arc<PlatformRegistry>,
    cipher: TokenCipher,
}

impl AnalyticsService {
    pub fn new(db: Database, registry: Arc<PlatformRegistry>, cipher: TokenCipher) -> Self {
        Self {
            db,
            registry,
            cipher,
        }
    }

    // ─── Per-integration fetch with refresh-and-retry ────────────────────

    /// Fetch one integration's series, never failing: errors become an
    /// empty contribution with the error string attached.
    async fn fetch_integration_analytics(
        &self,
        integration: &Integration,
        window: u32,
    ) -> IntegrationAnalytics {
        let summary = IntegrationSummary::from(integration);

        match self.fetch_with_refresh(integration, window).await {
            Ok(series) => IntegrationAnalytics {
                integration: summary,
                analytics: series,
                error: None,
            },
            Err(message) => {
                tracing::warn!(
                    integration_id = %integration.id,
                    provider = %integration.provider,
                    error = %message,
                    "Analytics fetch failed, contributing empty"
                );
                IntegrationAnalytics {
                    integration: summary,
                    analytics: Vec::new(),
                    error: Some(message),
                }
            }
        }
    }

    /// The refresh-and-retry protocol, kept explicit:
    /// attempt -> NeedsRefresh -> refresh -> persist rotated tokens ->
    /// retry exactly once. An integration already flagged refresh_needed
    /// skips the initial attempt and goes straight to the refresh.
    async fn fetch_with_refresh(
        &self,
        integration: &Integration,
        window: u32,
    ) -> Result<Vec<MetricSeries>, String> {
        let client = self
            .registry
            .get(integration.provider)
            .map_err(|e| e.to_string())?;

        if !integration.refresh_needed {
            let token = self
                .cipher
                .decrypt(&integration.access_token_encrypted)
                .map_err(|e| e.to_string())?;

            match attempt_fetch(client.as_ref(), integration, &token, window).await {
                FetchAttempt::Fetched(series) => return Ok(series),
                FetchAttempt::Failed(message) => return Err(message),
                FetchAttempt::NeedsRefresh => {}
            }
        }

        let Some(refresh_encrypted) = &integration.refresh_token_encrypted else {
            return Err("credentials expired and no refresh token on file".to_string());
        };
        let refresh_token = self
            .cipher
            .decrypt(refresh_encrypted)
            .map_err(|e| e.to_string())?;

        tracing::info!(
            integration_id = %integration.id,
            provider = %integration.provider,
            "Access token rejected, refreshing"
        );

        let grant = match client.refresh_token(&refresh_token).await {
            Ok(grant) => grant,
            Err(e) => {
                // Flag the integration so it is not retried until the user
                // (or a later successful refresh) clears it.
                if let Err(db_err) = self.db.set_refresh_needed(&integration.id, true).await {
                    tracing::error!(
                        integration_id = %integration.id,
                        error = %db_err,
                        "Failed to persist refresh_needed flag"
                    );
                }
                return Err(format!("token refresh failed: {}", e));
            }
        };

        // Persist rotated credentials before the retry; a provider that
        // does not rotate refresh tokens keeps the previous one.
        let access_encrypted = self
            .cipher
            .encrypt(&grant.access_token)
            .map_err(|e| e.to_string())?;
        let refresh_rotated = match &grant.refresh_token {
            Some(token) => Some(self.cipher.encrypt(token).map_err(|e| e.to_string())?),
            None => integration.refresh_token_encrypted.clone(),
        };
        let expires_at = Utc::now() + chrono::Duration::seconds(grant.expires_in);

        self.db
            .update_integration_tokens(
                &integration.id,
                &access_encrypted,
                refresh_rotated.as_deref(),
                expires_at,
            )
            .await
            .map_err(|e| e.to_string())?;

        match attempt_fetch(client.as_ref(), integration, &grant.access_token, window).await {
            FetchAttempt::Fetched(series) => Ok(series),
            FetchAttempt::NeedsRefresh => {
                Err("credentials still rejected after refresh".to_string())
            }
            FetchAttempt::Failed(message) => Err(message),
        }
    }

    /// Fetch every eligible integration concurrently. Results come back in
    /// storage order regardless of network completion order.
    async fn fetch_all(
        &self,
        integrations: &[Integration],
        window: u32,
    ) -> Vec<IntegrationAnalytics> {
        join_all(
            integrations
                .iter()
                .map(|integration| self.fetch_integration_analytics(integration, window)),
        )
        .await
    }

    // ─── Operations ──────────────────────────────────────────────────────

    /// Per-integration raw series for the aggregated-analytics endpoint,
    /// optionally restricted to a set of providers (applied before any
    /// network fetch).
    pub async fn integration_analytics(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
        platforms: &[Provider],
    ) -> Result<AggregatedResponse, AppError> {
        let mut integrations = self.db.list_social_integrations(user_id).await?;
        if !platforms.is_empty() {
            integrations.retain(|i| platforms.contains(&i.provider));
        }

        let data = self.fetch_all(&integrations, window_days(start, end)).await;

        Ok(AggregatedResponse {
            data,
            period: Period {
                from: start.to_string(),
                to: end.to_string(),
            },
        })
    }

    /// The cross-platform aggregate for a date range.
    pub async fn aggregated_analytics(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<AggregatedMetrics, AppError> {
        let integrations = self.db.list_social_integrations(user_id).await?;
        let (range_start, range_end) = day_bounds(start, end);
        let posts = self
            .db
            .list_published_posts(user_id, range_start, range_end)
            .await?;

        let results = self.fetch_all(&integrations, window_days(start, end)).await;

        Ok(merge_aggregates(&results, &posts))
    }

    /// Historically-used posting slots, busiest first.
    pub async fn best_times_to_post(&self, user_id: &str) -> Result<Vec<PostingSlot>, AppError> {
        let posts = self.db.list_all_published_posts(user_id).await?;
        Ok(rank_posting_slots(&posts))
    }

    /// Per-integration follower counts with day-over-day deltas.
    pub async fn audience_growth(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AudienceGrowth>, AppError> {
        let integrations = self.db.list_social_integrations(user_id).await?;
        let results = self.fetch_all(&integrations, window_days(start, end)).await;

        Ok(results
            .into_iter()
            .map(|result| AudienceGrowth {
                points: follower_growth(&result.analytics),
                integration: result.integration,
                error: result.error,
            })
            .collect())
    }

    /// The aggregate rendered as a two-section CSV.
    pub async fn export_csv(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<String, AppError> {
        let metrics = self.aggregated_analytics(user_id, start, end).await?;
        Ok(render_csv(&metrics))
    }
}

/// One analytics attempt; classifies the failure mode.
async fn attempt_fetch(
    client: &dyn PlatformClient,
    integration: &Integration,
    access_token: &str,
    window: u32,
) -> FetchAttempt {
    let fetch = client.analytics(&integration.account_id, access_token, window);

    match tokio::time::timeout(FETCH_TIMEOUT, fetch).await {
        Err(_) => FetchAttempt::Failed(format!(
            "analytics fetch timed out after {}s",
            FETCH_TIMEOUT.as_secs()
        )),
        Ok(Ok(series)) => FetchAttempt::Fetched(series),
        Ok(Err(e)) if e.is_auth_error() => FetchAttempt::NeedsRefresh,
        Ok(Err(e)) => FetchAttempt::Failed(e.to_string()),
    }
}

/// Inclusive day bounds of a date range, in UTC.
fn day_bounds(start: NaiveDate, end: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    (
        start.and_hms_opt(0, 0, 0).unwrap().and_utc(),
        end.and_hms_opt(23, 59, 59).unwrap().and_utc(),
    )
}

/// Merge per-integration series and published posts into one aggregate.
///
/// Pure and deterministic: breakdown rows follow the order of `results`
/// (integration storage order), the time series sorts by date ascending.
pub fn merge_aggregates(
    results: &[IntegrationAnalytics],
    posts: &[PublishedPost],
) -> AggregatedMetrics {
    let mut total_impressions = 0.0;
    let mut total_engagements = 0.0;
    // Lexical ISO-date order is date order.
    let mut days: BTreeMap<String, TimeSeriesPoint> = BTreeMap::new();

    let mut posts_per_integration: HashMap<&str, u32> = HashMap::new();
    for post in posts {
        *posts_per_integration
            .entry(post.integration_id.as_str())
            .or_insert(0) += 1;
    }

    let mut platform_breakdown = Vec::with_capacity(results.len());

    for result in results {
        let mut platform_impressions = 0.0;
        let mut platform_engagements = 0.0;

        for series in &result.analytics {
            match series.bucket() {
                MetricBucket::Impressions => {
                    for point in &series.points {
                        platform_impressions += point.total;
                        day_entry(&mut days, &point.date).impressions += point.total;
                    }
                }
                MetricBucket::Engagement => {
                    for point in &series.points {
                        platform_engagements += point.total;
                        day_entry(&mut days, &point.date).engagements += point.total;
                    }
                }
                // Follower counts feed audience growth, not totals;
                // unclassified series stay visible in raw responses only.
                MetricBucket::Followers | MetricBucket::Unclassified => {}
            }
        }

        total_impressions += platform_impressions;
        total_engagements += platform_engagements;

        platform_breakdown.push(PlatformBreakdown {
            integration_id: result.integration.id.clone(),
            provider: result.integration.provider,
            posts: posts_per_integration
                .get(result.integration.id.as_str())
                .copied()
                .unwrap_or(0),
            impressions: platform_impressions,
            engagements: platform_engagements,
            engagement_rate: engagement_rate(platform_engagements, platform_impressions),
        });
    }

    for post in posts {
        day_entry(&mut days, &utc_day_key(post.publish_date)).posts += 1;
    }

    // Posts arrive ordered by publish date descending.
    let top_performing_posts = posts
        .iter()
        .take(TOP_POSTS_LIMIT)
        .map(|post| TopPost {
            id: post.id.clone(),
            provider: post.provider,
            content_preview: content_preview(&post.content),
            publish_date: crate::time_utils::format_utc_rfc3339(post.publish_date),
            // Per-post metrics are not available from account-level APIs.
            impressions: 0.0,
            engagements: 0.0,
        })
        .collect();

    AggregatedMetrics {
        total_posts: posts.len() as u32,
        total_impressions,
        total_engagements,
        average_engagement_rate: engagement_rate(total_engagements, total_impressions),
        platform_breakdown,
        time_series_data: days.into_values().collect(),
        top_performing_posts,
    }
}

fn day_entry<'a>(
    days: &'a mut BTreeMap<String, TimeSeriesPoint>,
    date: &str,
) -> &'a mut TimeSeriesPoint {
    days.entry(date.to_string()).or_insert_with(|| TimeSeriesPoint {
        date: date.to_string(),
        impressions: 0.0,
        engagements: 0.0,
        posts: 0,
    })
}

/// Truncate content to a preview, appending an ellipsis when cut.
fn content_preview(content: &str) -> String {
    let mut preview: String = content.chars().take(PREVIEW_CHARS).collect();
    if content.chars().count() > PREVIEW_CHARS {
        preview.push_str("...");
    }
    preview
}

/// Group posts by (weekday, hour), drop thin slots, busiest first.
pub fn rank_posting_slots(posts: &[PublishedPost]) -> Vec<PostingSlot> {
    let mut counts: HashMap<(u32, u32), u32> = HashMap::new();
    for post in posts {
        let weekday = post.publish_date.weekday().num_days_from_sunday();
        let hour = post.publish_date.hour();
        *counts.entry((weekday, hour)).or_insert(0) += 1;
    }

    let mut slots: Vec<PostingSlot> = counts
        .into_iter()
        .filter(|(_, count)| *count >= MIN_SLOT_SAMPLES)
        .map(|((day_of_week, hour), sample_count)| PostingSlot {
            day_of_week,
            hour,
            sample_count,
            avg_engagement_rate: None,
        })
        .collect();

    slots.sort_by(|a, b| {
        b.sample_count
            .cmp(&a.sample_count)
            .then(a.day_of_week.cmp(&b.day_of_week))
            .then(a.hour.cmp(&b.hour))
    });
    slots.truncate(BEST_TIMES_LIMIT);
    slots
}

/// Day-over-day deltas of the first follower series; growth of the first
/// point is zero by definition.
pub fn follower_growth(series: &[MetricSeries]) -> Vec<GrowthPoint> {
    let Some(followers) = series
        .iter()
        .find(|s| s.bucket() == MetricBucket::Followers)
    else {
        return Vec::new();
    };

    let mut points = Vec::with_capacity(followers.points.len());
    let mut previous: Option<f64> = None;
    for point in &followers.points {
        points.push(GrowthPoint {
            date: point.date.clone(),
            followers: point.total,
            growth: previous.map_or(0.0, |prev| point.total - prev),
        });
        previous = Some(point.total);
    }
    points
}

/// Restrict per-integration series to the requested metric labels
/// (lowercased, whitespace stripped). Totals elsewhere are unaffected:
/// this only trims what the endpoint echoes back.
pub fn filter_metrics(response: &mut AggregatedResponse, metrics: &[String]) {
    if metrics.is_empty() {
        return;
    }

    let wanted: HashSet<String> = metrics
        .iter()
        .map(|m| {
            m.chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
                .to_lowercase()
        })
        .collect();

    for entry in &mut response.data {
        entry
            .analytics
            .retain(|series| wanted.contains(&series.normalized_label()));
    }
}

/// Render the aggregate as CSV: a per-date section for all platforms,
/// a blank line, then the per-platform breakdown.
pub fn render_csv(metrics: &AggregatedMetrics) -> String {
    let mut csv = String::new();

    csv.push_str("Date,Platform,Posts,Impressions,Engagements,Engagement Rate\n");
    for point in &metrics.time_series_data {
        csv.push_str(&format!(
            "{},All Platforms,{},{},{},{:.2}%\n",
            point.date,
            point.posts,
            point.impressions,
            point.engagements,
            engagement_rate(point.engagements, point.impressions),
        ));
    }

    csv.push('\n');
    csv.push_str("Platform,Posts,Impressions,Engagements,Engagement Rate\n");
    for row in &metrics.platform_breakdown {
        csv.push_str(&format!(
            "{},{},{},{},{:.2}%\n",
            row.provider, row.posts, row.impressions, row.engagements, row.engagement_rate,
        ));
    }

    csv
}
