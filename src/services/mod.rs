// SPDX-License-Identifier: MIT
// Copyright 2026 Crosspost Contributors

//! Services module - business logic layer.

pub mod analytics;
pub mod cache;
pub mod crypto;
pub mod platform;

pub use analytics::AnalyticsService;
pub use cache::AnalyticsCache;
pub use crypto::TokenCipher;
pub use platform::{HttpPlatformClient, PlatformClient, PlatformError, PlatformRegistry};
