// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message operations.

use chrono::{DateTime, Utc};
use concierge_core::ConciergeError;
use concierge_core::types::{Delivery, Direction, Message, OriginRole};
use rusqlite::{OptionalExtension, TransactionBehavior, params};

use crate::database::{Database, unsupported};
use crate::models::{message_columns, message_from_row, opt_ts, ts};

fn insert_message_row(conn: &rusqlite::Connection, msg: &Message) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO messages (id, thread_id, parent_message_id, origin_role, direction,
             channel, content, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            msg.id,
            msg.thread_id,
            msg.parent_message_id,
            msg.origin_role.to_string(),
            msg.direction.to_string(),
            msg.channel.to_string(),
            msg.content,
            ts(&msg.created_at),
        ],
    )?;
    Ok(())
}

/// Insert a new message.
pub async fn insert_message(db: &Database, msg: &Message) -> Result<(), ConciergeError> {
    let msg = msg.clone();
    db.connection()
        .call(move |conn| insert_message_row(conn, &msg))
        .await
        .map_err(crate::database::map_tr_err)
}

/// Insert a message and its first delivery in one immediate transaction.
///
/// Writes nothing and returns `false` when the delivery's provider id is
/// already recorded on the same channel.
pub async fn insert_message_with_delivery(
    db: &Database,
    msg: &Message,
    delivery: &Delivery,
) -> Result<bool, ConciergeError> {
    let msg = msg.clone();
    let d = delivery.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            if let Some(provider_id) = &d.provider_message_id {
                let taken: bool = tx.query_row(
                    "SELECT EXISTS (SELECT 1 FROM deliveries
                     WHERE channel = ?1 AND provider_message_id = ?2)",
                    params![d.channel.to_string(), provider_id],
                    |row| row.get(0),
                )?;
                if taken {
                    return Ok(false);
                }
            }
            insert_message_row(&tx, &msg)?;
            tx.execute(
                "INSERT INTO deliveries (message_id, channel, status, queued_at, sent_at,
                     delivered_at, read_at, provider_message_id, error_message)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
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
            tx.commit()?;
            Ok(true)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get a message by ID.
pub async fn get_message(db: &Database, id: &str) -> Result<Option<Message>, ConciergeError> {
    let id = id.to_string();
    let sql = format!(
        "SELECT {} FROM messages WHERE id = ?1",
        message_columns(db.capabilities().unsend)
    );
    db.connection()
        .call(move |conn| conn.query_row(&sql, params![id], message_from_row).optional())
        .await
        .map_err(crate::database::map_tr_err)
}

/// Messages of a thread in chronological order.
pub async fn list_messages(db: &Database, thread_id: &str) -> Result<Vec<Message>, ConciergeError> {
    let thread_id = thread_id.to_string();
    let sql = format!(
        "SELECT {} FROM messages WHERE thread_id = ?1 ORDER BY created_at ASC, rowid ASC",
        message_columns(db.capabilities().unsend)
    );
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![thread_id], message_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Tombstone a message. Returns `false` if it was already unsent.
pub async fn mark_unsent(
    db: &Database,
    id: &str,
    unsent_by: &str,
    at: DateTime<Utc>,
) -> Result<bool, ConciergeError> {
    if !db.capabilities().unsend {
        return Err(unsupported("unsending messages"));
    }
    let id = id.to_string();
    let unsent_by = unsent_by.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE messages SET is_unsent = 1, unsent_at = ?1, unsent_by = ?2
                 WHERE id = ?3 AND is_unsent = 0",
                params![ts(&at), unsent_by, id],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Host-authored outgoing messages in a thread with exactly `content`,
/// created at or after `since`, that still have a delivery without a
/// provider id. Newest first.
pub async fn find_recent_outbound_by_content_and_window(
    db: &Database,
    thread_id: &str,
    content: &str,
    since: DateTime<Utc>,
) -> Result<Vec<Message>, ConciergeError> {
    let unsend = db.capabilities().unsend;
    let columns = message_columns(unsend)
        .split(", ")
        .map(|c| match c.trim() {
            "0" | "NULL" => c.to_string(),
            name => format!("m.{name}"),
        })
        .collect::<Vec<_>>()
        .join(", ");
    let tombstone_filter = if unsend { "AND m.is_unsent = 0" } else { "" };
    let sql = format!(
        "SELECT {columns} FROM messages m
         WHERE m.thread_id = ?1 AND m.content = ?2 AND m.created_at >= ?3
           AND m.direction = ?4 AND m.origin_role = ?5 {tombstone_filter}
           AND EXISTS (
               SELECT 1 FROM deliveries d
               WHERE d.message_id = m.id AND d.provider_message_id IS NULL
           )
         ORDER BY m.created_at DESC, m.rowid DESC"
    );
    let thread_id = thread_id.to_string();
    let content = content.to_string();
    let since = ts(&since);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                params![
                    thread_id,
                    content,
                    since,
                    Direction::Outgoing.to_string(),
                    OriginRole::Host.to_string(),
                ],
                message_from_row,
            )?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(crate::database::map_tr_err)
}
