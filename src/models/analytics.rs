//! Analytics value types and metric label classification.
//!
//! Platforms name their metrics inconsistently ("Impressions", "Video views",
//! "Tweet Likes", ...). Classification into a small set of semantic buckets
//! is what lets series from different platforms be summed together.

use serde::{Deserialize, Serialize};

use crate::models::integration::Provider;

/// Semantic bucket a raw metric series folds into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricBucket {
    Impressions,
    Engagement,
    Followers,
    Unclassified,
}

const IMPRESSION_HINTS: [&str; 2] = ["impression", "view"];
const ENGAGEMENT_HINTS: [&str; 5] = ["engagement", "like", "comment", "share", "retweet"];
const FOLLOWER_HINTS: [&str; 3] = ["follower", "fan", "subscriber"];

impl MetricBucket {
    /// Classify a free-text metric label.
    ///
    /// Case-insensitive substring match, first match wins, checked in the
    /// order impressions > engagement > followers. The ordering is
    /// load-bearing: a label like "video view engagement" counts as
    /// impressions, matching how every downstream total has historically
    /// been computed.
    pub fn classify(label: &str) -> Self {
        let label = label.to_lowercase();

        if IMPRESSION_HINTS.iter().any(|hint| label.contains(hint)) {
            return MetricBucket::Impressions;
        }
        if ENGAGEMENT_HINTS.iter().any(|hint| label.contains(hint)) {
            return MetricBucket::Engagement;
        }
        if FOLLOWER_HINTS.iter().any(|hint| label.contains(hint)) {
            return MetricBucket::Followers;
        }
        MetricBucket::Unclassified
    }
}

/// One data point of a platform metric series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricPoint {
    /// ISO date ("YYYY-MM-DD")
    pub date: String,
    pub total: f64,
}

/// A named metric series as returned by a platform API.
///
/// Ephemeral: recomputed per request, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSeries {
    pub label: String,
    pub points: Vec<MetricPoint>,
    /// The series represents an average rather than a per-day sum
    #[serde(default)]
    pub average: bool,
}

impl MetricSeries {
    pub fn bucket(&self) -> MetricBucket {
        MetricBucket::classify(&self.label)
    }

    /// Label lowercased with all whitespace removed, the form used for
    /// metric-filter matching ("Video Views" -> "videoviews").
    pub fn normalized_label(&self) -> String {
        self.label
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase()
    }
}

/// Per-integration slice of the aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformBreakdown {
    pub integration_id: String,
    pub provider: Provider,
    pub posts: u32,
    pub impressions: f64,
    pub engagements: f64,
    pub engagement_rate: f64,
}

/// One day of the unified cross-platform time series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub date: String,
    pub impressions: f64,
    pub engagements: f64,
    pub posts: u32,
}

/// Most-recent published post with a content preview.
///
/// Per-post impressions/engagements are always zero: the platform APIs we
/// aggregate only expose account-level series, not per-post breakdowns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopPost {
    pub id: String,
    pub provider: Provider,
    pub content_preview: String,
    pub publish_date: String,
    pub impressions: f64,
    pub engagements: f64,
}

/// Cross-platform aggregate over one date range.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedMetrics {
    pub total_posts: u32,
    pub total_impressions: f64,
    pub total_engagements: f64,
    pub average_engagement_rate: f64,
    pub platform_breakdown: Vec<PlatformBreakdown>,
    pub time_series_data: Vec<TimeSeriesPoint>,
    pub top_performing_posts: Vec<TopPost>,
}

/// Engagement rate in percent; zero when either side has no data.
pub fn engagement_rate(engagements: f64, impressions: f64) -> f64 {
    if engagements > 0.0 && impressions > 0.0 {
        engagements / impressions * 100.0
    } else {
        0.0
    }
}
