// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Thread and thread-channel operations.

use chrono::{DateTime, Utc};
use concierge_core::ConciergeError;
use concierge_core::types::{Channel, Thread, ThreadChannel, ThreadInsert, ThreadStatus};
use rusqlite::{OptionalExtension, TransactionBehavior, params, params_from_iter};

use crate::database::Database;
use crate::models::{
    THREAD_COLUMNS, opt_ts, placeholders, thread_channel_from_row, thread_from_row, ts,
};

/// Insert a thread unless one already exists for any of `guard`.
///
/// The lookup and the insert share one immediate transaction, so two
/// resolvers racing on the same group cannot both create a thread.
pub async fn insert_thread(
    db: &Database,
    thread: &Thread,
    guard: &[String],
) -> Result<ThreadInsert, ConciergeError> {
    let thread = thread.clone();
    let guard = guard.to_vec();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            if !guard.is_empty() {
                let sql = format!(
                    "SELECT {THREAD_COLUMNS} FROM threads
                     WHERE reservation_id IN ({})
                     ORDER BY created_at DESC, rowid DESC LIMIT 1",
                    placeholders(1, guard.len())
                );
                let existing = tx
                    .query_row(&sql, params_from_iter(guard.iter()), thread_from_row)
                    .optional()?;
                if let Some(existing) = existing {
                    tx.commit()?;
                    return Ok(ThreadInsert::Existing(existing));
                }
            }

            tx.execute(
                "INSERT INTO threads (id, reservation_id, subject, status, priority,
                     last_message_at, last_message_preview, needs_linking, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    thread.id,
                    thread.reservation_id,
                    thread.subject,
                    thread.status.to_string(),
                    thread.priority.to_string(),
                    opt_ts(thread.last_message_at.as_ref()),
                    thread.last_message_preview,
                    thread.needs_linking,
                    ts(&thread.created_at),
                    ts(&thread.updated_at),
                ],
            )?;
            tx.commit()?;
            Ok(ThreadInsert::Created(thread))
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get a thread by ID.
pub async fn get_thread(db: &Database, id: &str) -> Result<Option<Thread>, ConciergeError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let sql = format!("SELECT {THREAD_COLUMNS} FROM threads WHERE id = ?1");
            conn.query_row(&sql, params![id], thread_from_row)
                .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Set `to` if the current status is one of `from`. Returns whether a row changed.
pub async fn update_thread_status(
    db: &Database,
    id: &str,
    from: &[ThreadStatus],
    to: ThreadStatus,
) -> Result<bool, ConciergeError> {
    if from.is_empty() {
        return Ok(false);
    }
    let mut values = vec![to.to_string(), ts(&Utc::now()), id.to_string()];
    values.extend(from.iter().map(ToString::to_string));
    let sql = format!(
        "UPDATE threads SET status = ?1, updated_at = ?2
         WHERE id = ?3 AND status IN ({})",
        placeholders(4, from.len())
    );
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(&sql, params_from_iter(values.iter()))?;
            Ok(changed > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record the latest activity on a thread.
///
/// `last_message_at` never moves backwards, so an out-of-order writer cannot
/// replace a newer summary with an older one.
pub async fn update_thread_summary(
    db: &Database,
    id: &str,
    last_message_at: DateTime<Utc>,
    preview: &str,
) -> Result<(), ConciergeError> {
    let id = id.to_string();
    let preview = preview.to_string();
    let at = ts(&last_message_at);
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE threads
                 SET last_message_at = ?1, last_message_preview = ?2, updated_at = ?3
                 WHERE id = ?4 AND (last_message_at IS NULL OR last_message_at <= ?1)",
                params![at, preview, ts(&Utc::now()), id],
            )?;
            if changed == 0 {
                tracing::debug!(
                    thread_id = %id,
                    "thread summary not updated: thread missing or newer activity recorded"
                );
            }
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Point a thread at a reservation. `needs_linking` follows the absence of one.
pub async fn update_thread_reservation(
    db: &Database,
    id: &str,
    reservation_id: Option<&str>,
) -> Result<(), ConciergeError> {
    let id = id.to_string();
    let reservation_id = reservation_id.map(str::to_string);
    db.connection()
        .call(move |conn| {
            let needs_linking = reservation_id.is_none();
            conn.execute(
                "UPDATE threads SET reservation_id = ?1, needs_linking = ?2, updated_at = ?3
                 WHERE id = ?4",
                params![reservation_id, needs_linking, ts(&Utc::now()), id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Threads for any of `reservation_ids`, newest first.
pub async fn find_threads_by_reservation_ids(
    db: &Database,
    reservation_ids: &[String],
) -> Result<Vec<Thread>, ConciergeError> {
    if reservation_ids.is_empty() {
        return Ok(Vec::new());
    }
    let ids = reservation_ids.to_vec();
    let sql = format!(
        "SELECT {THREAD_COLUMNS} FROM threads
         WHERE reservation_id IN ({})
         ORDER BY created_at DESC, rowid DESC",
        placeholders(1, ids.len())
    );
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(ids.iter()), thread_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// The thread mapped to an external conversation on `channel`.
pub async fn find_thread_by_channel_mapping(
    db: &Database,
    channel: Channel,
    external_thread_id: &str,
) -> Result<Option<Thread>, ConciergeError> {
    let external_thread_id = external_thread_id.to_string();
    db.connection()
        .call(move |conn| {
            let sql = format!(
                "SELECT {} FROM threads t
                 JOIN thread_channels tc ON tc.thread_id = t.id
                 WHERE tc.channel = ?1 AND tc.external_thread_id = ?2",
                qualified_thread_columns()
            );
            conn.query_row(
                &sql,
                params![channel.to_string(), external_thread_id],
                thread_from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

fn qualified_thread_columns() -> String {
    THREAD_COLUMNS
        .split(", ")
        .map(|c| format!("t.{c}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Add a channel mapping. Returns `false` if the (channel, external id)
/// pair was already mapped.
pub async fn add_thread_channel(
    db: &Database,
    mapping: &ThreadChannel,
) -> Result<bool, ConciergeError> {
    let mapping = mapping.clone();
    db.connection()
        .call(move |conn| {
            let inserted = conn.execute(
                "INSERT INTO thread_channels (thread_id, channel, external_thread_id, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (channel, external_thread_id) DO NOTHING",
                params![
                    mapping.thread_id,
                    mapping.channel.to_string(),
                    mapping.external_thread_id,
                    ts(&mapping.created_at),
                ],
            )?;
            Ok(inserted > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn list_thread_channels(
    db: &Database,
    thread_id: &str,
) -> Result<Vec<ThreadChannel>, ConciergeError> {
    let thread_id = thread_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT thread_id, channel, external_thread_id, created_at
                 FROM thread_channels WHERE thread_id = ?1
                 ORDER BY created_at ASC, rowid ASC",
            )?;
            let rows = stmt.query_map(params![thread_id], thread_channel_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::fixtures::{at, make_thread, setup_db};

    #[tokio::test]
    async fn insert_and_get_thread_roundtrips() {
        let (db, _dir) = setup_db().await;
        let thread = make_thread("t1", Some("R1"), 0);

        let outcome = insert_thread(&db, &thread, &["R1".to_string()]).await.unwrap();
        assert_eq!(outcome, ThreadInsert::Created(thread.clone()));

        let fetched = get_thread(&db, "t1").await.unwrap().unwrap();
        assert_eq!(fetched, thread);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn get_missing_thread_returns_none() {
        let (db, _dir) = setup_db().await;
        assert!(get_thread(&db, "nope").await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn guarded_insert_returns_existing_group_thread() {
        let (db, _dir) = setup_db().await;
        let guard = vec!["R1".to_string(), "R2".to_string()];
        insert_thread(&db, &make_thread("t1", Some("R1"), 0), &guard)
            .await
            .unwrap();

        let outcome = insert_thread(&db, &make_thread("t2", Some("R2"), 1), &guard)
            .await
            .unwrap();
        match outcome {
            ThreadInsert::Existing(t) => assert_eq!(t.id, "t1"),
            other => panic!("expected existing thread, got {other:?}"),
        }
        assert!(get_thread(&db, "t2").await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn status_update_respects_precondition() {
        let (db, _dir) = setup_db().await;
        insert_thread(&db, &make_thread("t1", Some("R1"), 0), &[])
            .await
            .unwrap();

        let changed = update_thread_status(&db, "t1", &[ThreadStatus::Closed], ThreadStatus::Open)
            .await
            .unwrap();
        assert!(!changed, "open thread is not closed");

        let changed = update_thread_status(&db, "t1", &[ThreadStatus::Open], ThreadStatus::Closed)
            .await
            .unwrap();
        assert!(changed);
        let t = get_thread(&db, "t1").await.unwrap().unwrap();
        assert_eq!(t.status, ThreadStatus::Closed);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn summary_never_moves_backwards() {
        let (db, _dir) = setup_db().await;
        insert_thread(&db, &make_thread("t1", Some("R1"), 0), &[])
            .await
            .unwrap();

        update_thread_summary(&db, "t1", at(10), "newer").await.unwrap();
        update_thread_summary(&db, "t1", at(5), "older").await.unwrap();

        let t = get_thread(&db, "t1").await.unwrap().unwrap();
        assert_eq!(t.last_message_at, Some(at(10)));
        assert_eq!(t.last_message_preview.as_deref(), Some("newer"));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn find_by_reservation_ids_is_newest_first() {
        let (db, _dir) = setup_db().await;
        insert_thread(&db, &make_thread("old", Some("R1"), 0), &[])
            .await
            .unwrap();
        insert_thread(&db, &make_thread("new", Some("R2"), 3), &[])
            .await
            .unwrap();
        insert_thread(&db, &make_thread("other", Some("R9"), 4), &[])
            .await
            .unwrap();

        let found = find_threads_by_reservation_ids(&db, &["R1".into(), "R2".into()])
            .await
            .unwrap();
        let ids: Vec<_> = found.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);

        assert!(find_threads_by_reservation_ids(&db, &[]).await.unwrap().is_empty());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn channel_mapping_is_unique_per_external_id() {
        let (db, _dir) = setup_db().await;
        insert_thread(&db, &make_thread("t1", Some("R1"), 0), &[])
            .await
            .unwrap();
        insert_thread(&db, &make_thread("t2", Some("R2"), 1), &[])
            .await
            .unwrap();

        let mapping = ThreadChannel {
            thread_id: "t1".into(),
            channel: Channel::Airbnb,
            external_thread_id: "conv-1".into(),
            created_at: at(0),
        };
        assert!(add_thread_channel(&db, &mapping).await.unwrap());
        let duplicate = ThreadChannel {
            thread_id: "t2".into(),
            ..mapping.clone()
        };
        assert!(!add_thread_channel(&db, &duplicate).await.unwrap());

        let found = find_thread_by_channel_mapping(&db, Channel::Airbnb, "conv-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, "t1");
        assert!(
            find_thread_by_channel_mapping(&db, Channel::Booking, "conv-1")
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(list_thread_channels(&db, "t1").await.unwrap(), vec![mapping]);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reservation_update_clears_needs_linking() {
        let (db, _dir) = setup_db().await;
        insert_thread(&db, &make_thread("t1", None, 0), &[])
            .await
            .unwrap();
        assert!(get_thread(&db, "t1").await.unwrap().unwrap().needs_linking);

        update_thread_reservation(&db, "t1", Some("R7")).await.unwrap();
        let t = get_thread(&db, "t1").await.unwrap().unwrap();
        assert_eq!(t.reservation_id.as_deref(), Some("R7"));
        assert!(!t.needs_linking);
        db.close().await.unwrap();
    }
}
