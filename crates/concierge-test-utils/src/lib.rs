// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Concierge integration tests.
//!
//! Provides mock adapters, in-memory collaborators and a harness over a
//! temporary SQLite store for fast, deterministic tests without external
//! services.
//!
//! # Components
//!
//! - [`MockChannel`] - Channel adapter with scripted results and captured sends
//! - [`StaticGroupBookings`] - Fixed group bookings
//! - [`FailingSanitizer`] / [`RecordingSanitizer`] - Content sanitizer doubles
//! - [`TestHarness`] - All engine components wired on a temp database

pub mod collaborators;
pub mod harness;
pub mod mock_channel;

pub use collaborators::{FailingSanitizer, RecordingSanitizer, StaticGroupBookings};
pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_channel::MockChannel;
