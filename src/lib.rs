// SPDX-License-Identifier: MIT
// Copyright 2026 Crosspost Contributors

//! Crosspost: schedule posts across social platforms and aggregate their
//! analytics into one dashboard.
//!
//! This crate provides the backend API: OAuth account linking, encrypted
//! token storage, and cross-platform analytics aggregation.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use std::sync::Arc;

use config::Config;
use db::Database;
use services::{AnalyticsCache, AnalyticsService, PlatformRegistry, TokenCipher};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub registry: Arc<PlatformRegistry>,
    pub cipher: TokenCipher,
    pub analytics: AnalyticsService,
    pub analytics_cache: AnalyticsCache,
}
