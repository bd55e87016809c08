// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules, one per table family. Every function takes `&Database`
//! and runs as a single `call` on the writer thread.

pub mod deliveries;
pub mod groups;
pub mod messages;
pub mod participants;
pub mod scheduled;
pub mod threads;
