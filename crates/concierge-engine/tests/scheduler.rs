// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scheduled message dispatch over the real store.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use concierge_core::types::{OriginRole, ScheduledStatus};
use concierge_core::{Channel, ChannelErrorKind, ConversationStore};
use concierge_engine::{
    DispatchReport, NewScheduledMessage, PlaceholderRenderer, ScheduledDispatcher,
    SchedulerSettings,
};
use concierge_test_utils::{MockChannel, TestHarness};
use serde_json::json;
use tokio_util::sync::CancellationToken;

async fn harness() -> TestHarness {
    TestHarness::builder()
        .with_template("checkin", "Hi {{guest.name}}, your door code is {{code}}.")
        .configure(|c| c.scheduler.poll_interval_secs = 1)
        .build()
        .await
        .unwrap()
}

fn due(thread_id: &str, payload: serde_json::Value) -> NewScheduledMessage {
    NewScheduledMessage {
        thread_id: thread_id.to_string(),
        template_id: "checkin".into(),
        channel: Channel::InApp,
        run_at: Utc::now() - chrono::Duration::seconds(1),
        payload,
    }
}

#[tokio::test]
async fn due_message_is_rendered_and_sent_as_host() {
    let h = harness().await;
    let thread = h.thread_for("R1").await.unwrap();
    let scheduled = h
        .dispatcher()
        .schedule(due(&thread.id, json!({"guest": {"name": "Ada"}, "code": 4711})))
        .await
        .unwrap();
    assert_eq!(scheduled.status, ScheduledStatus::Queued);

    let report = h.dispatcher().run_once(Utc::now()).await.unwrap();
    assert_eq!(
        report,
        DispatchReport {
            claimed: 1,
            sent: 1,
            failed: 0,
            skipped: 0,
        }
    );

    let messages = h.messages(&thread.id).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "Hi Ada, your door code is 4711.");
    assert_eq!(messages[0].origin_role, OriginRole::Host);

    let row = h
        .store
        .get_scheduled_message(&scheduled.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, ScheduledStatus::Sent);
    assert_eq!(row.last_error, None);

    let again = h.dispatcher().run_once(Utc::now()).await.unwrap();
    assert_eq!(again, DispatchReport::default());
}

#[tokio::test]
async fn future_messages_wait_for_their_time() {
    let h = harness().await;
    let thread = h.thread_for("R1").await.unwrap();
    let mut request = due(&thread.id, json!({"guest": {"name": "Ada"}, "code": "1"}));
    request.run_at = Utc::now() + chrono::Duration::hours(1);
    h.dispatcher().schedule(request).await.unwrap();

    let report = h.dispatcher().run_once(Utc::now()).await.unwrap();
    assert_eq!(report.claimed, 0);
    assert!(h.messages(&thread.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn render_failure_marks_row_failed_with_reason() {
    let h = harness().await;
    let thread = h.thread_for("R1").await.unwrap();
    let broken = h
        .dispatcher()
        .schedule(due(&thread.id, json!({"guest": {"name": "Ada"}})))
        .await
        .unwrap();
    let fine = h
        .dispatcher()
        .schedule(due(&thread.id, json!({"guest": {"name": "Bo"}, "code": "9"})))
        .await
        .unwrap();

    let report = h.dispatcher().run_once(Utc::now()).await.unwrap();
    assert_eq!((report.claimed, report.sent, report.failed), (2, 1, 1));

    let broken = h
        .store
        .get_scheduled_message(&broken.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(broken.status, ScheduledStatus::Failed);
    assert!(broken.last_error.unwrap().contains("code"));

    let fine = h
        .store
        .get_scheduled_message(&fine.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fine.status, ScheduledStatus::Sent);
}

#[tokio::test]
async fn channel_failure_marks_row_failed() {
    let h = harness().await;
    let thread = h.thread_for("R1").await.unwrap();
    h.channel(Channel::InApp)
        .fail_next(ChannelErrorKind::RateLimited, "slow down")
        .await;
    let scheduled = h
        .dispatcher()
        .schedule(due(&thread.id, json!({"guest": {"name": "Ada"}, "code": "1"})))
        .await
        .unwrap();

    let report = h.dispatcher().run_once(Utc::now()).await.unwrap();
    assert_eq!(report.failed, 1);
    let row = h
        .store
        .get_scheduled_message(&scheduled.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, ScheduledStatus::Failed);
    assert!(row.last_error.is_some());
}

#[tokio::test]
async fn schedule_validates_template_and_thread() {
    let h = harness().await;
    let thread = h.thread_for("R1").await.unwrap();

    let mut blank = due(&thread.id, json!({}));
    blank.template_id = "  ".into();
    assert_eq!(
        h.dispatcher().schedule(blank).await.unwrap_err().status_code(),
        400
    );

    let orphan = due("missing", json!({}));
    assert_eq!(
        h.dispatcher().schedule(orphan).await.unwrap_err().status_code(),
        404
    );
}

#[tokio::test]
async fn competing_dispatchers_send_each_row_once() {
    let h = harness().await;
    let thread = h.thread_for("R1").await.unwrap();
    for i in 0..6 {
        h.dispatcher()
            .schedule(due(&thread.id, json!({"guest": {"name": "Ada"}, "code": i})))
            .await
            .unwrap();
    }

    let other = ScheduledDispatcher::new(
        h.store.clone(),
        h.engine.orchestrator.clone(),
        Arc::new(PlaceholderRenderer::new(h.config.templates.clone())),
        SchedulerSettings {
            worker_id: "dispatcher-other".into(),
            ..SchedulerSettings::default()
        },
    );
    assert_ne!(other.worker_id(), h.dispatcher().worker_id());

    let now = Utc::now();
    let (a, b) = tokio::join!(h.dispatcher().run_once(now), other.run_once(now));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.claimed + b.claimed, 6);
    assert_eq!(a.sent + b.sent, 6);
    assert_eq!(h.channel(Channel::InApp).sent_count().await, 6);
    assert_eq!(h.messages(&thread.id).await.unwrap().len(), 6);
}

#[tokio::test]
async fn slow_batch_keeps_its_lease_so_no_row_is_sent_twice() {
    let h = TestHarness::builder()
        .with_channel(MockChannel::new(Channel::InApp).with_delay(Duration::from_millis(700)))
        .with_template("checkin", "Hi {{guest.name}}, your door code is {{code}}.")
        .configure(|c| c.scheduler.lease_secs = 1)
        .build()
        .await
        .unwrap();
    let thread = h.thread_for("R1").await.unwrap();
    let mut ids = Vec::new();
    for i in 0..2 {
        let row = h
            .dispatcher()
            .schedule(due(&thread.id, json!({"guest": {"name": "Ada"}, "code": i})))
            .await
            .unwrap();
        ids.push(row.id);
    }

    let first = h.engine.dispatcher.clone();
    let slow = tokio::spawn(async move { first.run_once(Utc::now()).await });

    // The first claim expires after one second, halfway through the second send.
    tokio::time::sleep(Duration::from_millis(1200)).await;
    let other = ScheduledDispatcher::new(
        h.store.clone(),
        h.engine.orchestrator.clone(),
        Arc::new(PlaceholderRenderer::new(h.config.templates.clone())),
        SchedulerSettings {
            worker_id: "dispatcher-late".into(),
            lease: Duration::from_secs(1),
            ..SchedulerSettings::default()
        },
    );
    let late = other.run_once(Utc::now()).await.unwrap();
    let slow = slow.await.unwrap().unwrap();

    assert_eq!(slow.sent + late.sent, 2);
    assert_eq!(h.channel(Channel::InApp).sent_count().await, 2);
    assert_eq!(h.messages(&thread.id).await.unwrap().len(), 2);
    for id in &ids {
        let row = h.store.get_scheduled_message(id).await.unwrap().unwrap();
        assert_eq!(row.status, ScheduledStatus::Sent);
    }
}

#[tokio::test]
async fn run_polls_until_cancelled() {
    let h = harness().await;
    let thread = h.thread_for("R1").await.unwrap();
    h.dispatcher()
        .schedule(due(&thread.id, json!({"guest": {"name": "Ada"}, "code": "1"})))
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let dispatcher = h.engine.dispatcher.clone();
    let task = tokio::spawn({
        let cancel = cancel.clone();
        async move { dispatcher.run(cancel).await }
    });

    let mut sent = 0;
    for _ in 0..50 {
        sent = h.channel(Channel::InApp).sent_count().await;
        if sent > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(sent, 1);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("dispatcher did not stop")
        .unwrap();
}
