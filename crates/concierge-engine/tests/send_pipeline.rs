// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound pipeline: validation, persistence, dispatch and failure recording.

use std::time::Duration;

use concierge_core::types::{
    ChannelCapabilities, ChannelMapping, DeliveryStatus, Direction, OriginRole, ThreadInit,
    ThreadStatus,
};
use concierge_core::{Channel, ChannelErrorKind, ConciergeError, ConversationStore};
use concierge_engine::SendRequest;
use concierge_test_utils::{MockChannel, TestHarness};

fn send(thread_id: &str, channel: Channel, content: &str) -> SendRequest {
    SendRequest {
        thread_id: thread_id.to_string(),
        channel,
        content: content.to_string(),
        origin_role: OriginRole::Host,
        parent_message_id: None,
    }
}

#[tokio::test]
async fn welcome_message_creates_thread_message_and_sent_delivery() {
    let h = TestHarness::builder().build().await.unwrap();

    let thread = h.thread_for("R-100").await.unwrap();
    assert_eq!(thread.reservation_id.as_deref(), Some("R-100"));
    assert_eq!(thread.subject, "Reservation R-100");

    let message = h
        .orchestrator()
        .send_message(send(&thread.id, Channel::InApp, "Welcome!"))
        .await
        .unwrap();
    assert_eq!(message.direction, Direction::Outgoing);

    let messages = h.messages(&thread.id).await.unwrap();
    assert_eq!(messages.len(), 1);

    let deliveries = h.store.list_deliveries(&message.id).await.unwrap();
    assert_eq!(deliveries.len(), 1);
    let d = &deliveries[0];
    assert_eq!(d.status, DeliveryStatus::Sent);
    assert!(d.sent_at.is_some());
    assert!(d.queued_at <= d.sent_at.unwrap());

    let thread = h.thread(&thread.id).await.unwrap();
    assert_eq!(thread.last_message_preview.as_deref(), Some("Welcome!"));
    assert_eq!(thread.last_message_at, Some(message.created_at));
    assert_eq!(h.channel(Channel::InApp).sent_count().await, 1);
}

#[tokio::test]
async fn server_error_marks_delivery_failed_and_is_returned() {
    let h = TestHarness::builder()
        .with_channel(MockChannel::new(Channel::Airbnb))
        .build()
        .await
        .unwrap();
    let thread = h.thread_for("R-200").await.unwrap();
    h.channel(Channel::Airbnb)
        .fail_next(ChannelErrorKind::ServerError, "gateway returned 500 Internal Server Error")
        .await;

    let err = h
        .orchestrator()
        .send_message(send(&thread.id, Channel::Airbnb, "Check-in is at 3pm"))
        .await
        .unwrap_err();
    match &err {
        ConciergeError::Channel(e) => assert_eq!(e.kind, ChannelErrorKind::ServerError),
        other => panic!("expected channel error, got {other}"),
    }
    assert_eq!(err.status_code(), 502);

    let messages = h.messages(&thread.id).await.unwrap();
    assert_eq!(messages.len(), 1, "the message stays recorded");
    let delivery = h
        .store
        .get_delivery(&messages[0].id, Channel::Airbnb)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(delivery.status, DeliveryStatus::Failed);
    assert!(delivery.sent_at.is_none());
    assert!(
        delivery
            .error_message
            .as_deref()
            .unwrap()
            .contains("server error")
    );
}

#[tokio::test]
async fn every_failure_kind_is_recorded_and_raised() {
    let kinds = [
        ChannelErrorKind::System,
        ChannelErrorKind::Auth,
        ChannelErrorKind::NotFound,
        ChannelErrorKind::RateLimited,
        ChannelErrorKind::Unknown,
    ];
    let h = TestHarness::builder()
        .with_channel(MockChannel::new(Channel::Booking))
        .build()
        .await
        .unwrap();
    let thread = h.thread_for("R-201").await.unwrap();

    for (i, kind) in kinds.into_iter().enumerate() {
        h.channel(Channel::Booking).fail_next(kind, "provider said no").await;
        let content = format!("attempt {i}");
        let err = h
            .orchestrator()
            .send_message(send(&thread.id, Channel::Booking, &content))
            .await
            .unwrap_err();
        assert!(matches!(err, ConciergeError::Channel(ref e) if e.kind == kind));
    }

    for message in h.messages(&thread.id).await.unwrap() {
        let d = h
            .store
            .get_delivery(&message.id, Channel::Booking)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(d.status, DeliveryStatus::Failed);
        assert!(d.error_message.unwrap().ends_with("provider said no"));
    }
}

#[tokio::test]
async fn missing_adapter_is_system_failure() {
    let h = TestHarness::builder().build().await.unwrap();
    let thread = h.thread_for("R-202").await.unwrap();

    let err = h
        .orchestrator()
        .send_message(send(&thread.id, Channel::Vrbo, "hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, ConciergeError::Channel(ref e) if e.kind == ChannelErrorKind::System));

    let messages = h.messages(&thread.id).await.unwrap();
    let d = h
        .store
        .get_delivery(&messages[0].id, Channel::Vrbo)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(d.status, DeliveryStatus::Failed);
    assert!(d.error_message.unwrap().starts_with("system error"));
}

#[tokio::test]
async fn slow_adapter_times_out_as_server_error() {
    let h = TestHarness::builder()
        .with_channel(MockChannel::new(Channel::Sms).with_delay(Duration::from_secs(5)))
        .configure(|c| c.messaging.send_timeout_secs = 1)
        .build()
        .await
        .unwrap();
    let thread = h.thread_for("R-203").await.unwrap();

    let err = h
        .orchestrator()
        .send_message(send(&thread.id, Channel::Sms, "are you there?"))
        .await
        .unwrap_err();
    assert!(
        matches!(err, ConciergeError::Channel(ref e) if e.kind == ChannelErrorKind::ServerError)
    );
    let messages = h.messages(&thread.id).await.unwrap();
    let d = h
        .store
        .get_delivery(&messages[0].id, Channel::Sms)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(d.status, DeliveryStatus::Failed);
}

#[tokio::test]
async fn invalid_content_is_rejected_before_any_write() {
    let h = TestHarness::builder().build().await.unwrap();
    let thread = h.thread_for("R-204").await.unwrap();

    let too_long = "a".repeat(1001);
    for content in ["", "   ", too_long.as_str()] {
        let err = h
            .orchestrator()
            .send_message(send(&thread.id, Channel::InApp, content))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }
    let with_image = format!("{}![room](https://img.example/r.jpg)", "a".repeat(2000));
    h.orchestrator()
        .send_message(send(&thread.id, Channel::InApp, &with_image))
        .await
        .unwrap();

    assert_eq!(h.messages(&thread.id).await.unwrap().len(), 1);
    assert_eq!(h.channel(Channel::InApp).sent_count().await, 1);
}

#[tokio::test]
async fn guest_role_and_unknown_thread_are_rejected() {
    let h = TestHarness::builder().build().await.unwrap();
    let thread = h.thread_for("R-205").await.unwrap();

    let mut as_guest = send(&thread.id, Channel::InApp, "hi");
    as_guest.origin_role = OriginRole::Guest;
    let err = h.orchestrator().send_message(as_guest).await.unwrap_err();
    assert_eq!(err.status_code(), 400);

    let err = h
        .orchestrator()
        .send_message(send("no-such-thread", Channel::InApp, "hi"))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn replies_must_stay_in_their_thread() {
    let h = TestHarness::builder().build().await.unwrap();
    let a = h.thread_for("R-206").await.unwrap();
    let b = h.thread_for("R-207").await.unwrap();
    let parent = h
        .orchestrator()
        .send_message(send(&a.id, Channel::InApp, "first"))
        .await
        .unwrap();

    let mut reply = send(&a.id, Channel::InApp, "second");
    reply.parent_message_id = Some(parent.id.clone());
    let reply = h.orchestrator().send_message(reply).await.unwrap();
    assert_eq!(reply.parent_message_id.as_deref(), Some(parent.id.as_str()));

    let mut cross = send(&b.id, Channel::InApp, "third");
    cross.parent_message_id = Some(parent.id);
    let err = h.orchestrator().send_message(cross).await.unwrap_err();
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn outbound_reopens_closed_but_not_archived_threads() {
    let h = TestHarness::builder().build().await.unwrap();
    let orchestrator = h.orchestrator();

    let closed = h.thread_for("R-300").await.unwrap();
    orchestrator
        .set_thread_status(&closed.id, ThreadStatus::Closed)
        .await
        .unwrap();
    orchestrator
        .send_message(send(&closed.id, Channel::InApp, "we are back"))
        .await
        .unwrap();
    assert_eq!(h.thread(&closed.id).await.unwrap().status, ThreadStatus::Open);

    let archived = h.thread_for("R-301").await.unwrap();
    orchestrator
        .set_thread_status(&archived.id, ThreadStatus::Closed)
        .await
        .unwrap();
    orchestrator
        .set_thread_status(&archived.id, ThreadStatus::Archived)
        .await
        .unwrap();
    orchestrator
        .send_message(send(&archived.id, Channel::InApp, "late note"))
        .await
        .unwrap();
    assert_eq!(
        h.thread(&archived.id).await.unwrap().status,
        ThreadStatus::Archived
    );
}

#[tokio::test]
async fn adapter_receives_mapping_recipients_and_provider_id_is_stored() {
    let h = TestHarness::builder()
        .with_channel(MockChannel::new(Channel::Expedia))
        .build()
        .await
        .unwrap();
    let init = ThreadInit {
        channels: vec![ChannelMapping {
            channel: Channel::Expedia,
            external_thread_id: "exp-conv-1".into(),
        }],
        ..ThreadInit::default()
    };
    let thread = h
        .orchestrator()
        .resolver()
        .resolve("R-400", &init)
        .await
        .unwrap();
    h.channel(Channel::Expedia).succeed_next_with("exp-msg-9").await;

    let message = h
        .orchestrator()
        .send_message(send(&thread.id, Channel::Expedia, "Your room is ready"))
        .await
        .unwrap();

    let sent = h.channel(Channel::Expedia).sent_messages().await;
    assert_eq!(sent[0].external_thread_id.as_deref(), Some("exp-conv-1"));
    assert_eq!(sent[0].reservation_id.as_deref(), Some("R-400"));
    assert_eq!(sent[0].message_id, message.id);

    let d = h
        .store
        .get_delivery(&message.id, Channel::Expedia)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(d.provider_message_id.as_deref(), Some("exp-msg-9"));
}

#[tokio::test]
async fn simulated_delivery_follows_a_successful_send() {
    let h = TestHarness::builder()
        .with_channel(MockChannel::new(Channel::InApp).with_capabilities(ChannelCapabilities {
            supports_unsend: true,
            simulated_delivery_after: Some(Duration::from_millis(50)),
            ..ChannelCapabilities::default()
        }))
        .build()
        .await
        .unwrap();
    let thread = h.thread_for("R-500").await.unwrap();
    let message = h
        .orchestrator()
        .send_message(send(&thread.id, Channel::InApp, "See you soon"))
        .await
        .unwrap();

    let mut delivered = None;
    for _ in 0..50 {
        let d = h
            .store
            .get_delivery(&message.id, Channel::InApp)
            .await
            .unwrap()
            .unwrap();
        if d.status == DeliveryStatus::Delivered {
            delivered = Some(d);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let d = delivered.expect("delivery was not marked delivered");
    assert!(d.sent_at.is_some());
    assert!(d.delivered_at.unwrap() >= d.sent_at.unwrap());
}

#[tokio::test]
async fn long_content_is_truncated_in_preview() {
    let h = TestHarness::builder().build().await.unwrap();
    let thread = h.thread_for("R-600").await.unwrap();
    let content = "b".repeat(400);
    h.orchestrator()
        .send_message(send(&thread.id, Channel::InApp, &content))
        .await
        .unwrap();

    let preview = h.thread(&thread.id).await.unwrap().last_message_preview.unwrap();
    assert_eq!(preview.chars().count(), 160);
    assert!(preview.ends_with("..."));
}
