// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Thread participants and read markers.

use chrono::{DateTime, Utc};
use concierge_core::ConciergeError;
use concierge_core::types::Participant;
use rusqlite::params;

use crate::database::{Database, unsupported};
use crate::models::{PARTICIPANT_COLUMNS, opt_ts, participant_from_row, ts};

pub async fn add_participant(
    db: &Database,
    participant: &Participant,
) -> Result<(), ConciergeError> {
    if !db.capabilities().participants {
        return Err(unsupported("participants"));
    }
    let p = participant.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO participants (id, thread_id, participant_type, external_address,
                     display_name, last_read_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    p.id,
                    p.thread_id,
                    p.participant_type.to_string(),
                    p.external_address,
                    p.display_name,
                    opt_ts(p.last_read_at.as_ref()),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Participants of a thread; empty when the schema has no participants table.
pub async fn list_participants(
    db: &Database,
    thread_id: &str,
) -> Result<Vec<Participant>, ConciergeError> {
    if !db.capabilities().participants {
        return Ok(Vec::new());
    }
    let thread_id = thread_id.to_string();
    db.connection()
        .call(move |conn| {
            let sql = format!(
                "SELECT {PARTICIPANT_COLUMNS} FROM participants
                 WHERE thread_id = ?1 ORDER BY rowid ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![thread_id], participant_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Advance a participant's read marker. Never moves it backwards; returns
/// whether it changed.
pub async fn mark_participant_read(
    db: &Database,
    participant_id: &str,
    at: DateTime<Utc>,
) -> Result<bool, ConciergeError> {
    if !db.capabilities().participants {
        return Err(unsupported("participants"));
    }
    let participant_id = participant_id.to_string();
    let at = ts(&at);
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE participants SET last_read_at = ?1
                 WHERE id = ?2 AND (last_read_at IS NULL OR last_read_at < ?1)",
                params![at, participant_id],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
