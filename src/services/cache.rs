// SPDX-License-Identifier: MIT
// Copyright 2026 Crosspost Contributors

//! TTL cache for aggregated-analytics responses.
//!
//! Keyed per (user, date range, platform list, metric list). List-valued
//! key components are sorted before key construction so two requests that
//! name the same filters in different order share an entry.
//!
//! Concurrent requests for the same key may both compute and both write;
//! the overwrite is idempotent, so no locking is needed.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;

use crate::services::analytics::AggregatedResponse;

/// Entries older than this are treated as absent.
const CACHE_TTL_SECS: i64 = 60 * 60;

#[derive(Clone)]
struct CacheEntry {
    payload: AggregatedResponse,
    computed_at: DateTime<Utc>,
}

/// Process-wide analytics response cache, shared by reference.
#[derive(Clone, Default)]
pub struct AnalyticsCache {
    entries: Arc<DashMap<String, CacheEntry>>,
}

impl AnalyticsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical cache key for one request.
    pub fn key(
        user_id: &str,
        from: &str,
        to: &str,
        platforms: &[String],
        metrics: &[String],
    ) -> String {
        let mut platforms = platforms.to_vec();
        platforms.sort();
        let mut metrics = metrics.to_vec();
        metrics.sort();

        format!(
            "{}|{}|{}|{}|{}",
            user_id,
            from,
            to,
            platforms.join(","),
            metrics.join(",")
        )
    }

    pub fn get(&self, key: &str) -> Option<AggregatedResponse> {
        self.get_at(key, Utc::now())
    }

    fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<AggregatedResponse> {
        let entry = self.entries.get(key)?;
        if now - entry.computed_at >= Duration::seconds(CACHE_TTL_SECS) {
            drop(entry);
            self.entries.remove(key);
            return None;
        }
        Some(entry.payload.clone())
    }

    pub fn set(&self, key: String, payload: AggregatedResponse) {
        self.set_at(key, payload, Utc::now());
    }

    fn set_at(&self, key: String, payload: AggregatedResponse, computed_at: DateTime<Utc>) {
        self.entries.insert(
            key,
            CacheEntry {
                payload,
                computed_at,
            },
        );
    }

    /// Drop every entry, all users included (admin action).
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
