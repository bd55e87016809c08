// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `concierge doctor` command implementation.
//!
//! Runs diagnostic checks against storage, the detected schema
//! capabilities, the configured channel adapters and the message templates.

use std::io::IsTerminal;
use std::time::{Duration, Instant};

use concierge_config::ConciergeConfig;
use concierge_core::types::{HealthStatus, StoreCapabilities};
use concierge_core::{ConciergeError, ConversationStore, PluginAdapter};
use concierge_engine::ChannelRegistry;
use concierge_storage::SqliteStore;

/// Status of a diagnostic check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// Result of a single diagnostic check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub duration: Duration,
}

impl CheckResult {
    fn new(name: &str, status: CheckStatus, message: impl Into<String>, start: Instant) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
            duration: start.elapsed(),
        }
    }
}

/// Run the `concierge doctor` command.
///
/// With `--deep` the SQLite integrity check runs as well; `--plain`
/// disables colored output. Fails when any check fails.
pub async fn run_doctor(
    config: &ConciergeConfig,
    deep: bool,
    plain: bool,
) -> Result<(), ConciergeError> {
    let use_color = !plain && std::io::stdout().is_terminal();
    let mut results = Vec::new();

    let db_path = std::path::Path::new(&config.storage.database_path);
    let existed = db_path.exists();
    let start = Instant::now();
    match SqliteStore::open(config.storage.clone()).await {
        Ok(store) => {
            results.push(check_store_health(&store, existed, start).await);
            results.push(check_capabilities(store.capabilities()));
            if deep {
                results.push(check_db_integrity(&store).await);
            }
            if let Err(e) = store.shutdown().await {
                tracing::debug!(error = %e, "doctor: storage shutdown failed");
            }
        }
        Err(e) => results.push(CheckResult::new(
            "Database",
            CheckStatus::Fail,
            format!("open failed: {e}"),
            start,
        )),
    }
    results.extend(check_channels(config).await);
    results.push(check_templates(config));

    println!();
    println!("  concierge doctor");
    println!("  {}", "-".repeat(50));

    let mut fail_count = 0;
    let mut warn_count = 0;
    for result in &results {
        match result.status {
            CheckStatus::Warn => warn_count += 1,
            CheckStatus::Fail => fail_count += 1,
            CheckStatus::Pass => {}
        }
        println!("{}", format_line(result, use_color));
    }

    println!();
    if fail_count > 0 || warn_count > 0 {
        let issues = fail_count + warn_count;
        let issue_word = if issues == 1 { "issue" } else { "issues" };
        println!("  {issues} {issue_word} found.");
        if !deep {
            println!("  Run with --deep for detailed diagnostics.");
        }
    } else {
        println!("  All checks passed.");
    }
    println!();

    if fail_count > 0 {
        return Err(ConciergeError::Internal(format!(
            "{fail_count} diagnostic check(s) failed"
        )));
    }
    Ok(())
}

fn format_line(result: &CheckResult, use_color: bool) -> String {
    let duration_ms = result.duration.as_millis();
    if use_color {
        use colored::Colorize;
        let (symbol, message) = match result.status {
            CheckStatus::Pass => ("✓".green(), result.message.normal()),
            CheckStatus::Warn => ("!".yellow(), result.message.yellow()),
            CheckStatus::Fail => ("✗".red(), result.message.red()),
        };
        format!("    {symbol} {:<20} {message} ({duration_ms}ms)", result.name)
    } else {
        let tag = match result.status {
            CheckStatus::Pass => "[OK]  ",
            CheckStatus::Warn => "[WARN]",
            CheckStatus::Fail => "[FAIL]",
        };
        format!(
            "    {tag} {:<20} {} ({duration_ms}ms)",
            result.name, result.message
        )
    }
}

async fn check_store_health(store: &SqliteStore, existed: bool, start: Instant) -> CheckResult {
    let created = if existed { "" } else { " (created)" };
    match store.health_check().await {
        Ok(HealthStatus::Healthy) => CheckResult::new(
            "Database",
            CheckStatus::Pass,
            format!("connected{created}"),
            start,
        ),
        Ok(HealthStatus::Degraded(reason)) => {
            CheckResult::new("Database", CheckStatus::Warn, reason, start)
        }
        Ok(HealthStatus::Unhealthy(reason)) => {
            CheckResult::new("Database", CheckStatus::Fail, reason, start)
        }
        Err(e) => CheckResult::new(
            "Database",
            CheckStatus::Fail,
            format!("query failed: {e}"),
            start,
        ),
    }
}

/// Optional schema features. Missing ones only disable the operations
/// that need them.
fn check_capabilities(caps: StoreCapabilities) -> CheckResult {
    let start = Instant::now();
    let missing: Vec<&str> = [
        ("unsend", caps.unsend),
        ("participants", caps.participants),
        ("scheduling", caps.scheduling),
    ]
    .into_iter()
    .filter(|(_, present)| !present)
    .map(|(name, _)| name)
    .collect();

    if missing.is_empty() {
        CheckResult::new(
            "Capabilities",
            CheckStatus::Pass,
            "unsend, participants, scheduling",
            start,
        )
    } else {
        CheckResult::new(
            "Capabilities",
            CheckStatus::Warn,
            format!("missing: {}", missing.join(", ")),
            start,
        )
    }
}

async fn check_channels(config: &ConciergeConfig) -> Vec<CheckResult> {
    let start = Instant::now();
    let adapters = match concierge_channels::channels_from_config(config) {
        Ok(adapters) => adapters,
        Err(e) => {
            return vec![CheckResult::new(
                "Channels",
                CheckStatus::Fail,
                e.to_string(),
                start,
            )];
        }
    };
    let registry = ChannelRegistry::from_adapters(adapters);

    let mut results = Vec::new();
    for (channel, status) in registry.health().await {
        let name = format!("Channel {channel}");
        let result = match status {
            HealthStatus::Healthy => CheckResult::new(&name, CheckStatus::Pass, "reachable", start),
            HealthStatus::Degraded(reason) => {
                CheckResult::new(&name, CheckStatus::Warn, reason, start)
            }
            HealthStatus::Unhealthy(reason) => {
                CheckResult::new(&name, CheckStatus::Fail, reason, start)
            }
        };
        results.push(result);
    }
    results
}

fn check_templates(config: &ConciergeConfig) -> CheckResult {
    let start = Instant::now();
    if config.templates.is_empty() {
        CheckResult::new(
            "Templates",
            CheckStatus::Warn,
            "none configured (scheduled messages will fail)",
            start,
        )
    } else {
        CheckResult::new(
            "Templates",
            CheckStatus::Pass,
            format!("{} configured", config.templates.len()),
            start,
        )
    }
}

/// Deep check: `PRAGMA integrity_check`.
async fn check_db_integrity(store: &SqliteStore) -> CheckResult {
    let start = Instant::now();
    match store.integrity_check().await {
        Ok(rows) if rows.len() == 1 && rows[0] == "ok" => {
            CheckResult::new("DB integrity", CheckStatus::Pass, "ok", start)
        }
        Ok(rows) => CheckResult::new(
            "DB integrity",
            CheckStatus::Fail,
            format!("{} issue(s) found", rows.len()),
            start,
        ),
        Err(e) => CheckResult::new(
            "DB integrity",
            CheckStatus::Fail,
            format!("check failed: {e}"),
            start,
        ),
    }
}
