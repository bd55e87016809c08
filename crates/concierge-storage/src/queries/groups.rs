// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Group-booking links mirrored from the property-management system.

use concierge_core::ConciergeError;
use concierge_core::types::GroupBooking;
use rusqlite::{OptionalExtension, params};

use crate::database::Database;

/// Record that `reservation_id` belongs to the group led by
/// `master_reservation_id`. Re-linking moves the reservation.
pub async fn link_reservation_to_group(
    db: &Database,
    reservation_id: &str,
    master_reservation_id: &str,
) -> Result<(), ConciergeError> {
    let reservation_id = reservation_id.to_string();
    let master = master_reservation_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO reservation_groups (reservation_id, master_reservation_id)
                 VALUES (?1, ?2)
                 ON CONFLICT (reservation_id)
                 DO UPDATE SET master_reservation_id = excluded.master_reservation_id",
                params![reservation_id, master],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// The group `reservation_id` belongs to, as master or as child.
///
/// The master is listed first, followed by the children in id order.
pub async fn group_of(
    db: &Database,
    reservation_id: &str,
) -> Result<Option<GroupBooking>, ConciergeError> {
    let reservation_id = reservation_id.to_string();
    db.connection()
        .call(move |conn| {
            let master: Option<String> = conn
                .query_row(
                    "SELECT master_reservation_id FROM reservation_groups WHERE reservation_id = ?1
                     UNION
                     SELECT master_reservation_id FROM reservation_groups
                     WHERE master_reservation_id = ?1
                     LIMIT 1",
                    params![reservation_id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(master) = master else {
                return Ok(None);
            };

            let mut stmt = conn.prepare(
                "SELECT reservation_id FROM reservation_groups
                 WHERE master_reservation_id = ?1 AND reservation_id != ?1
                 ORDER BY reservation_id ASC",
            )?;
            let children = stmt
                .query_map(params![master], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;

            let mut reservation_ids = Vec::with_capacity(children.len() + 1);
            reservation_ids.push(master.clone());
            reservation_ids.extend(children);
            Ok(Some(GroupBooking {
                master_reservation_id: master,
                reservation_ids,
            }))
        })
        .await
        .map_err(crate::database::map_tr_err)
}
