// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-channel delivery records.
//!
//! Status changes are single conditional `UPDATE`s: the precondition on the
//! current status and the "fill only if unset" rule for timestamps are both
//! evaluated by SQLite inside the statement, so racing writers cannot move a
//! delivery backwards or overwrite a recorded timestamp.

use chrono::{DateTime, Utc};
use concierge_core::ConciergeError;
use concierge_core::types::{Channel, Delivery, DeliveryStatus, DeliveryTransition};
use rusqlite::{OptionalExtension, TransactionBehavior, params, params_from_iter};

use crate::database::Database;
use crate::models::{DELIVERY_COLUMNS, delivery_from_row, opt_ts, placeholders, ts};

/// Insert the delivery unless (message, channel) already has one; returns
/// the stored row either way.
pub async fn upsert_delivery(
    db: &Database,
    delivery: &Delivery,
) -> Result<Delivery, ConciergeError> {
    let d = delivery.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO deliveries (message_id, channel, status, queued_at, sent_at,
                     delivered_at, read_at, provider_message_id, error_message)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT (message_id, channel) DO NOTHING",
                params![
                    d.message_id,
                    d.channel.to_string(),
                    d.status.to_string(),
                    ts(&d.queued_at),
                    opt_ts(d.sent_at.as_ref()),
                    opt_ts(d.delivered_at.as_ref()),
                    opt_ts(d.read_at.as_ref()),
                    d.provider_message_id,
                    d.error_message,
                ],
            )?;
            let sql = format!(
                "SELECT {DELIVERY_COLUMNS} FROM deliveries WHERE message_id = ?1 AND channel = ?2"
            );
            conn.query_row(
                &sql,
                params![d.message_id, d.channel.to_string()],
                delivery_from_row,
            )
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn get_delivery(
    db: &Database,
    message_id: &str,
    channel: Channel,
) -> Result<Option<Delivery>, ConciergeError> {
    let message_id = message_id.to_string();
    db.connection()
        .call(move |conn| {
            let sql = format!(
                "SELECT {DELIVERY_COLUMNS} FROM deliveries WHERE message_id = ?1 AND channel = ?2"
            );
            conn.query_row(
                &sql,
                params![message_id, channel.to_string()],
                delivery_from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn list_deliveries(
    db: &Database,
    message_id: &str,
) -> Result<Vec<Delivery>, ConciergeError> {
    let message_id = message_id.to_string();
    db.connection()
        .call(move |conn| {
            let sql = format!(
                "SELECT {DELIVERY_COLUMNS} FROM deliveries WHERE message_id = ?1
                 ORDER BY queued_at ASC, channel ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![message_id], delivery_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// The timestamp column owned by a status, if any.
fn timestamp_column(status: DeliveryStatus) -> Option<&'static str> {
    match status {
        DeliveryStatus::Sent => Some("sent_at"),
        DeliveryStatus::Delivered => Some("delivered_at"),
        DeliveryStatus::Read => Some("read_at"),
        DeliveryStatus::Queued | DeliveryStatus::Failed => None,
    }
}

/// Apply a conditional status change. Returns whether the precondition held.
pub async fn apply_delivery_transition(
    db: &Database,
    transition: &DeliveryTransition,
) -> Result<bool, ConciergeError> {
    if transition.allowed_from.is_empty() {
        return Ok(false);
    }

    let mut assignments = vec!["status = ?1".to_string()];
    if let Some(column) = timestamp_column(transition.to) {
        assignments.push(format!("{column} = COALESCE({column}, ?2)"));
    }
    if transition.to == DeliveryStatus::Failed {
        assignments.push("error_message = ?3".to_string());
    }
    assignments.push("provider_message_id = COALESCE(provider_message_id, ?4)".to_string());

    let sql = format!(
        "UPDATE deliveries SET {}
         WHERE message_id = ?5 AND channel = ?6 AND status IN ({})",
        assignments.join(", "),
        placeholders(7, transition.allowed_from.len())
    );

    let mut values: Vec<Option<String>> = vec![
        Some(transition.to.to_string()),
        Some(ts(&transition.at)),
        transition.error_message.clone(),
        transition.provider_message_id.clone(),
        Some(transition.message_id.clone()),
        Some(transition.channel.to_string()),
    ];
    values.extend(transition.allowed_from.iter().map(|s| Some(s.to_string())));

    db.connection()
        .call(move |conn| {
            let changed = conn.execute(&sql, params_from_iter(values.iter()))?;
            Ok(changed > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Claim the (message, channel) delivery for an echoed provider id.
///
/// The update only matches while `provider_message_id IS NULL`, so of two
/// concurrent echoes exactly one wins. When the message has no delivery on
/// `channel` at all, a `delivered` row carrying the provider id is inserted
/// in the same transaction.
pub async fn conditional_backfill_provider_id(
    db: &Database,
    message_id: &str,
    channel: Channel,
    provider_message_id: &str,
    at: DateTime<Utc>,
) -> Result<bool, ConciergeError> {
    let message_id = message_id.to_string();
    let provider_message_id = provider_message_id.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let claimed = tx.execute(
                "UPDATE deliveries SET provider_message_id = ?1
                 WHERE message_id = ?2 AND channel = ?3 AND provider_message_id IS NULL",
                params![provider_message_id, message_id, channel.to_string()],
            )?;
            if claimed > 0 {
                tx.commit()?;
                return Ok(true);
            }

            let exists: bool = tx.query_row(
                "SELECT EXISTS (SELECT 1 FROM deliveries WHERE message_id = ?1 AND channel = ?2)",
                params![message_id, channel.to_string()],
                |row| row.get(0),
            )?;
            if exists {
                tx.commit()?;
                return Ok(false);
            }

            let now = ts(&at);
            tx.execute(
                "INSERT INTO deliveries (message_id, channel, status, queued_at, delivered_at,
                     provider_message_id)
                 VALUES (?1, ?2, ?3, ?4, ?4, ?5)",
                params![
                    message_id,
                    channel.to_string(),
                    DeliveryStatus::Delivered.to_string(),
                    now,
                    provider_message_id,
                ],
            )?;
            tx.commit()?;
            Ok(true)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn find_delivery_by_provider_message_id(
    db: &Database,
    channel: Channel,
    provider_message_id: &str,
) -> Result<Option<Delivery>, ConciergeError> {
    let provider_message_id = provider_message_id.to_string();
    db.connection()
        .call(move |conn| {
            let sql = format!(
                "SELECT {DELIVERY_COLUMNS} FROM deliveries
                 WHERE channel = ?1 AND provider_message_id = ?2
                 ORDER BY queued_at ASC LIMIT 1"
            );
            conn.query_row(
                &sql,
                params![channel.to_string(), provider_message_id],
                delivery_from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}
