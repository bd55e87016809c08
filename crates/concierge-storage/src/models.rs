// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row mapping between SQLite and the domain types in `concierge-core`.
//!
//! Timestamps are stored as RFC 3339 UTC strings with fixed microsecond
//! precision, so comparisons in SQL can stay lexical. Enums are stored by
//! their strum names.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use rusqlite::types::Type;

pub use concierge_core::types::{
    Delivery, Message, Participant, ScheduledMessage, Thread, ThreadChannel,
};

/// Column list matching [`thread_from_row`].
pub(crate) const THREAD_COLUMNS: &str = "id, reservation_id, subject, status, priority, \
     last_message_at, last_message_preview, needs_linking, created_at, updated_at";

/// Column list matching [`delivery_from_row`].
pub(crate) const DELIVERY_COLUMNS: &str = "message_id, channel, status, queued_at, sent_at, \
     delivered_at, read_at, provider_message_id, error_message";

pub(crate) const PARTICIPANT_COLUMNS: &str =
    "id, thread_id, participant_type, external_address, display_name, last_read_at";

pub(crate) const SCHEDULED_COLUMNS: &str =
    "id, thread_id, template_id, channel, run_at, payload, status, last_error, created_at";

/// Column list matching [`message_from_row`].
///
/// Schemas without unsend support get constant placeholders so the row
/// layout stays the same.
pub(crate) fn message_columns(unsend: bool) -> &'static str {
    if unsend {
        "id, thread_id, parent_message_id, origin_role, direction, channel, content, \
         is_unsent, unsent_at, unsent_by, created_at"
    } else {
        "id, thread_id, parent_message_id, origin_role, direction, channel, content, \
         0, NULL, NULL, created_at"
    }
}

/// Storage representation of a timestamp.
pub(crate) fn ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn opt_ts(at: Option<&DateTime<Utc>>) -> Option<String> {
    at.map(ts)
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

pub(crate) fn get_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

pub(crate) fn get_opt_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| {
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_error(idx, e))
    })
    .transpose()
}

pub(crate) fn get_enum<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    T::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn thread_from_row(row: &Row<'_>) -> rusqlite::Result<Thread> {
    Ok(Thread {
        id: row.get(0)?,
        reservation_id: row.get(1)?,
        subject: row.get(2)?,
        status: get_enum(row, 3)?,
        priority: get_enum(row, 4)?,
        last_message_at: get_opt_ts(row, 5)?,
        last_message_preview: row.get(6)?,
        needs_linking: row.get(7)?,
        created_at: get_ts(row, 8)?,
        updated_at: get_ts(row, 9)?,
    })
}

pub(crate) fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        thread_id: row.get(1)?,
        parent_message_id: row.get(2)?,
        origin_role: get_enum(row, 3)?,
        direction: get_enum(row, 4)?,
        channel: get_enum(row, 5)?,
        content: row.get(6)?,
        is_unsent: row.get(7)?,
        unsent_at: get_opt_ts(row, 8)?,
        unsent_by: row.get(9)?,
        created_at: get_ts(row, 10)?,
    })
}

pub(crate) fn delivery_from_row(row: &Row<'_>) -> rusqlite::Result<Delivery> {
    Ok(Delivery {
        message_id: row.get(0)?,
        channel: get_enum(row, 1)?,
        status: get_enum(row, 2)?,
        queued_at: get_ts(row, 3)?,
        sent_at: get_opt_ts(row, 4)?,
        delivered_at: get_opt_ts(row, 5)?,
        read_at: get_opt_ts(row, 6)?,
        provider_message_id: row.get(7)?,
        error_message: row.get(8)?,
    })
}

pub(crate) fn thread_channel_from_row(row: &Row<'_>) -> rusqlite::Result<ThreadChannel> {
    Ok(ThreadChannel {
        thread_id: row.get(0)?,
        channel: get_enum(row, 1)?,
        external_thread_id: row.get(2)?,
        created_at: get_ts(row, 3)?,
    })
}

pub(crate) fn participant_from_row(row: &Row<'_>) -> rusqlite::Result<Participant> {
    Ok(Participant {
        id: row.get(0)?,
        thread_id: row.get(1)?,
        participant_type: get_enum(row, 2)?,
        external_address: row.get(3)?,
        display_name: row.get(4)?,
        last_read_at: get_opt_ts(row, 5)?,
    })
}

pub(crate) fn scheduled_from_row(row: &Row<'_>) -> rusqlite::Result<ScheduledMessage> {
    let payload: String = row.get(5)?;
    Ok(ScheduledMessage {
        id: row.get(0)?,
        thread_id: row.get(1)?,
        template_id: row.get(2)?,
        channel: get_enum(row, 3)?,
        run_at: get_ts(row, 4)?,
        payload: serde_json::from_str(&payload).map_err(|e| conversion_error(5, e))?,
        status: get_enum(row, 6)?,
        last_error: row.get(7)?,
        created_at: get_ts(row, 8)?,
    })
}

/// `?1, ?2, ...` placeholders starting at `start`.
pub(crate) fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}
