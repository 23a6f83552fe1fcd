// SPDX-License-Identifier: MIT
// Copyright 2026 Crosspost Contributors

//! Data models for the application.

pub mod analytics;
pub mod integration;
pub mod post;

pub use analytics::{AggregatedMetrics, MetricBucket, MetricPoint, MetricSeries};
pub use integration::{Integration, IntegrationKind, Provider, UnknownProviderError};
pub use post::{Post, PostStatus, PublishedPost};
