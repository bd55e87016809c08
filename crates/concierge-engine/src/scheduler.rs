// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodic claim-and-dispatch of scheduled messages.
//!
//! Rows are claimed through the store with a lease, so any number of
//! dispatchers can poll the same store without sending a row twice.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use concierge_core::types::{OriginRole, ScheduledMessage, ScheduledStatus};
use concierge_core::{Channel, ConciergeError, ConversationStore, TemplateRenderer};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::model::SendRequest;
use crate::orchestrator::MessageOrchestrator;
use crate::settings::SchedulerSettings;

/// A message to send at `run_at`, rendered from `template_id` and `payload`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewScheduledMessage {
    pub thread_id: String,
    pub template_id: String,
    pub channel: Channel,
    pub run_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

/// Counts from one poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub claimed: usize,
    pub sent: usize,
    pub failed: usize,
    /// Claimed rows whose lease was lost before their turn; left unsent
    /// for the worker that holds them now.
    pub skipped: usize,
}

pub struct ScheduledDispatcher {
    store: Arc<dyn ConversationStore>,
    orchestrator: Arc<MessageOrchestrator>,
    renderer: Arc<dyn TemplateRenderer>,
    settings: SchedulerSettings,
}

impl ScheduledDispatcher {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        orchestrator: Arc<MessageOrchestrator>,
        renderer: Arc<dyn TemplateRenderer>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            store,
            orchestrator,
            renderer,
            settings,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.settings.worker_id
    }

    /// Queues a message for later dispatch.
    pub async fn schedule(
        &self,
        request: NewScheduledMessage,
    ) -> Result<ScheduledMessage, ConciergeError> {
        if request.template_id.trim().is_empty() {
            return Err(ConciergeError::Validation(
                "scheduled message needs a template id".into(),
            ));
        }
        self.store
            .get_thread(&request.thread_id)
            .await?
            .ok_or_else(|| ConciergeError::not_found("thread", request.thread_id.as_str()))?;

        let scheduled = ScheduledMessage {
            id: uuid::Uuid::new_v4().to_string(),
            thread_id: request.thread_id,
            template_id: request.template_id,
            channel: request.channel,
            run_at: request.run_at,
            payload: request.payload,
            status: ScheduledStatus::Queued,
            last_error: None,
            created_at: Utc::now(),
        };
        self.store.insert_scheduled_message(&scheduled).await?;
        debug!(
            scheduled_id = scheduled.id.as_str(),
            thread_id = scheduled.thread_id.as_str(),
            run_at = %scheduled.run_at,
            "message scheduled"
        );
        Ok(scheduled)
    }

    /// Claims and dispatches every row due at `now`, up to the batch size.
    ///
    /// Each row ends `sent` or `failed`; a failure of one row does not stop
    /// the others. The lease is renewed right before each send, and a row
    /// whose claim was lost meanwhile is skipped.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<DispatchReport, ConciergeError> {
        let worker_id = self.settings.worker_id.as_str();
        let claimed = self
            .store
            .claim_due_scheduled_messages(
                now,
                self.settings.batch_size,
                worker_id,
                self.settings.lease,
            )
            .await?;

        let mut report = DispatchReport {
            claimed: claimed.len(),
            ..DispatchReport::default()
        };
        for scheduled in claimed {
            let renewed = self
                .store
                .renew_scheduled_lease(
                    &scheduled.id,
                    worker_id,
                    now.max(Utc::now()),
                    self.settings.lease,
                )
                .await?;
            if !renewed {
                warn!(
                    scheduled_id = scheduled.id.as_str(),
                    worker_id, "scheduled message lease lost, skipping"
                );
                report.skipped += 1;
                continue;
            }

            let (status, last_error) = match self.dispatch(&scheduled).await {
                Ok(()) => {
                    report.sent += 1;
                    (ScheduledStatus::Sent, None)
                }
                Err(e) => {
                    warn!(
                        scheduled_id = scheduled.id.as_str(),
                        thread_id = scheduled.thread_id.as_str(),
                        error = %e,
                        "scheduled message failed"
                    );
                    report.failed += 1;
                    (ScheduledStatus::Failed, Some(e.to_string()))
                }
            };
            metrics::counter!(
                "concierge_scheduled_dispatched_total",
                "outcome" => status.to_string()
            )
            .increment(1);
            match self
                .store
                .complete_scheduled_message(
                    &scheduled.id,
                    worker_id,
                    status,
                    last_error.as_deref(),
                )
                .await
            {
                Ok(true) => {}
                Ok(false) => warn!(
                    scheduled_id = scheduled.id.as_str(),
                    worker_id, "scheduled message claimed by another worker before completion"
                ),
                Err(e) => error!(
                    scheduled_id = scheduled.id.as_str(),
                    error = %e,
                    "failed to record scheduled message outcome"
                ),
            }
        }

        if report.claimed > 0 {
            info!(
                worker_id,
                claimed = report.claimed,
                sent = report.sent,
                failed = report.failed,
                skipped = report.skipped,
                "scheduled dispatch finished"
            );
        }
        Ok(report)
    }

    async fn dispatch(&self, scheduled: &ScheduledMessage) -> Result<(), ConciergeError> {
        let content = self
            .renderer
            .render(&scheduled.template_id, &scheduled.payload)
            .await?;
        self.orchestrator
            .send_message(SendRequest {
                thread_id: scheduled.thread_id.clone(),
                channel: scheduled.channel,
                content,
                origin_role: OriginRole::Host,
                parent_message_id: None,
            })
            .await?;
        Ok(())
    }

    /// Polls every `poll_interval` until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            worker_id = self.settings.worker_id.as_str(),
            interval_secs = self.settings.poll_interval.as_secs(),
            "scheduled dispatcher running"
        );
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("shutdown signal received, stopping scheduled dispatcher");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once(Utc::now()).await {
                        error!(error = %e, "scheduled dispatch poll failed");
                    }
                }
            }
        }
    }
}
