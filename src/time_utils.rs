// SPDX-License-Identifier: MIT
// Copyright 2026 Crosspost Contributors

//! Shared helpers for date/time handling.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Calendar day (UTC) of a timestamp as an ISO date string ("YYYY-MM-DD").
///
/// All time-series bucketing uses UTC days so that the same post lands in
/// the same bucket regardless of which server handled the request.
pub fn utc_day_key(date: DateTime<Utc>) -> String {
    date.date_naive().to_string()
}

/// Analytics window length for an inclusive date range, in days.
///
/// A degenerate or inverted range falls back to the default 30-day window.
pub fn window_days(start: NaiveDate, end: NaiveDate) -> u32 {
    let days = (end - start).num_days();
    if days <= 0 {
        30
    } else {
        days as u32
    }
}
