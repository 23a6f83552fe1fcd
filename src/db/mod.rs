// SPDX-License-Identifier: MIT
// Copyright 2026 Crosspost Contributors

//! Database layer.

pub mod store;

pub use store::Database;
