// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests over the production wiring: SQLite store as group
//! resolver, real channel adapters against a mock OTA gateway.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use concierge_config::ConciergeConfig;
use concierge_core::types::{
    ChannelMapping, DeliveryStatus, OriginRole, ThreadInit, ThreadStatus,
};
use concierge_core::{
    Channel, ContentSanitizer, ConversationStore, GroupBookingResolver, TemplateRenderer,
};
use concierge_engine::{
    ChannelRegistry, Engine, IngestOutcome, NewScheduledMessage, PassthroughSanitizer,
    PlaceholderRenderer, SendRequest, ThreadHint, WebhookEvent,
};
use concierge_storage::SqliteStore;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Deployment {
    store: Arc<SqliteStore>,
    engine: Engine,
    _dir: tempfile::TempDir,
}

async fn deploy(gateway: &MockServer) -> Deployment {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ConciergeConfig::default();
    config.storage.database_path = dir.path().join("e2e.db").to_string_lossy().into_owned();
    config.gateway.base_url = Some(gateway.uri());
    config.gateway.api_key = Some("gw-key".into());
    config.messaging.inapp_delivery_delay_ms = 20;
    config
        .templates
        .insert("checkin".into(), "Door code for {{guest}}: {{code}}".into());

    let store = Arc::new(SqliteStore::open(config.storage.clone()).await.unwrap());
    let channels = ChannelRegistry::from_adapters(
        concierge_channels::channels_from_config(&config).unwrap(),
    );
    let engine = Engine::new(
        store.clone() as Arc<dyn ConversationStore>,
        store.clone() as Arc<dyn GroupBookingResolver>,
        channels,
        Arc::new(PassthroughSanitizer) as Arc<dyn ContentSanitizer>,
        Arc::new(PlaceholderRenderer::new(config.templates.clone())) as Arc<dyn TemplateRenderer>,
        &config,
    )
    .unwrap();
    Deployment {
        store,
        engine,
        _dir: dir,
    }
}

fn airbnb_thread(conversation: &str) -> ThreadInit {
    ThreadInit {
        channels: vec![ChannelMapping {
            channel: Channel::Airbnb,
            external_thread_id: conversation.to_string(),
        }],
        ..ThreadInit::default()
    }
}

#[tokio::test]
async fn ota_send_records_provider_id_and_replayed_echo_is_duplicate() {
    let gateway = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/channels/airbnb/conversations/abnb-conv-1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message_id": "abnb-msg-1"})))
        .expect(1)
        .mount(&gateway)
        .await;
    let d = deploy(&gateway).await;
    let orchestrator = &d.engine.orchestrator;

    let thread = orchestrator
        .resolver()
        .resolve("R-500", &airbnb_thread("abnb-conv-1"))
        .await
        .unwrap();
    let message = orchestrator
        .send_message(SendRequest {
            thread_id: thread.id.clone(),
            channel: Channel::Airbnb,
            content: "Your door code is 2468".into(),
            origin_role: OriginRole::Host,
            parent_message_id: None,
        })
        .await
        .unwrap();

    let delivery = d
        .store
        .get_delivery(&message.id, Channel::Airbnb)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(delivery.status, DeliveryStatus::Sent);
    assert_eq!(delivery.provider_message_id.as_deref(), Some("abnb-msg-1"));

    let echo = orchestrator
        .ingest_webhook(WebhookEvent {
            thread_hint: ThreadHint::ExternalThread("abnb-conv-1".into()),
            channel: Channel::Airbnb,
            content: "Your door code is 2468".into(),
            sender_role: OriginRole::Host,
            provider_message_id: Some("abnb-msg-1".into()),
            timestamp: Utc::now(),
            thread_init: ThreadInit::default(),
        })
        .await
        .unwrap();
    assert_eq!(
        echo,
        IngestOutcome::Duplicate {
            thread_id: thread.id.clone(),
            message_id: message.id.clone(),
        }
    );
    assert_eq!(d.store.list_messages(&thread.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn gateway_outage_marks_delivery_failed() {
    let gateway = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&gateway)
        .await;
    let d = deploy(&gateway).await;
    let orchestrator = &d.engine.orchestrator;

    let thread = orchestrator
        .resolver()
        .resolve("R-501", &airbnb_thread("abnb-conv-2"))
        .await
        .unwrap();
    let err = orchestrator
        .send_message(SendRequest {
            thread_id: thread.id.clone(),
            channel: Channel::Airbnb,
            content: "Checking in?".into(),
            origin_role: OriginRole::Host,
            parent_message_id: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 502);

    let messages = d.store.list_messages(&thread.id).await.unwrap();
    assert_eq!(messages.len(), 1);
    let delivery = d
        .store
        .get_delivery(&messages[0].id, Channel::Airbnb)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(delivery.status, DeliveryStatus::Failed);
    assert_eq!(delivery.sent_at, None);
    assert!(delivery.error_message.unwrap().contains("server error"));
}

#[tokio::test]
async fn ota_send_without_conversation_fails_as_system_error() {
    let gateway = MockServer::start().await;
    let d = deploy(&gateway).await;
    let orchestrator = &d.engine.orchestrator;

    let thread = orchestrator
        .resolver()
        .resolve("R-502", &ThreadInit::default())
        .await
        .unwrap();
    orchestrator
        .send_message(SendRequest {
            thread_id: thread.id.clone(),
            channel: Channel::Booking,
            content: "Hello".into(),
            origin_role: OriginRole::Host,
            parent_message_id: None,
        })
        .await
        .unwrap_err();

    assert!(gateway.received_requests().await.unwrap().is_empty());
    let messages = d.store.list_messages(&thread.id).await.unwrap();
    let delivery = d
        .store
        .get_delivery(&messages[0].id, Channel::Booking)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(delivery.status, DeliveryStatus::Failed);
}

#[tokio::test]
async fn in_app_message_is_echo_matched_then_delivered() {
    let gateway = MockServer::start().await;
    let d = deploy(&gateway).await;
    let orchestrator = &d.engine.orchestrator;

    let thread = orchestrator
        .resolver()
        .resolve("R-503", &ThreadInit::default())
        .await
        .unwrap();
    let message = orchestrator
        .send_message(SendRequest {
            thread_id: thread.id.clone(),
            channel: Channel::InApp,
            content: "Thank you".into(),
            origin_role: OriginRole::Host,
            parent_message_id: None,
        })
        .await
        .unwrap();

    let echo = orchestrator
        .ingest_webhook(WebhookEvent {
            thread_hint: ThreadHint::Reservation("R-503".into()),
            channel: Channel::InApp,
            content: "Thank you".into(),
            sender_role: OriginRole::Guest,
            provider_message_id: Some("inapp-echo-1".into()),
            timestamp: Utc::now(),
            thread_init: ThreadInit::default(),
        })
        .await
        .unwrap();
    assert!(matches!(echo, IngestOutcome::EchoBackfilled { .. }));

    let mut delivered = None;
    for _ in 0..50 {
        let current = d
            .store
            .get_delivery(&message.id, Channel::InApp)
            .await
            .unwrap()
            .unwrap();
        if current.status == DeliveryStatus::Delivered {
            delivered = Some(current);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let delivered = delivered.expect("in-app delivery was never marked delivered");
    assert_eq!(delivered.provider_message_id.as_deref(), Some("inapp-echo-1"));
    assert!(delivered.delivered_at.is_some());
    assert_eq!(d.store.list_messages(&thread.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn stored_group_links_route_siblings_to_one_thread() {
    let gateway = MockServer::start().await;
    let d = deploy(&gateway).await;
    d.store.link_reservation_to_group("R-601", "R-600").await.unwrap();
    d.store.link_reservation_to_group("R-602", "R-600").await.unwrap();
    let orchestrator = &d.engine.orchestrator;

    let first = orchestrator
        .ingest_webhook(WebhookEvent {
            thread_hint: ThreadHint::Reservation("R-602".into()),
            channel: Channel::InApp,
            content: "Room 3 has no towels".into(),
            sender_role: OriginRole::Guest,
            provider_message_id: Some("g-1".into()),
            timestamp: Utc::now(),
            thread_init: ThreadInit::default(),
        })
        .await
        .unwrap();
    let master = orchestrator
        .resolver()
        .resolve("R-600", &ThreadInit::default())
        .await
        .unwrap();
    assert_eq!(first.thread_id(), master.id);
    assert_eq!(master.subject, "Reservation R-602");

    let second = orchestrator
        .resolver()
        .resolve("R-601", &ThreadInit::default())
        .await
        .unwrap();
    assert_eq!(second.id, master.id);
}

#[tokio::test]
async fn scheduled_check_in_message_goes_out_and_closed_thread_reopens() {
    let gateway = MockServer::start().await;
    let d = deploy(&gateway).await;
    let orchestrator = &d.engine.orchestrator;

    let thread = orchestrator
        .resolver()
        .resolve("R-700", &ThreadInit::default())
        .await
        .unwrap();
    orchestrator
        .set_thread_status(&thread.id, ThreadStatus::Closed)
        .await
        .unwrap();
    d.engine
        .dispatcher
        .schedule(NewScheduledMessage {
            thread_id: thread.id.clone(),
            template_id: "checkin".into(),
            channel: Channel::InApp,
            run_at: Utc::now(),
            payload: json!({"guest": "Ada", "code": "1357"}),
        })
        .await
        .unwrap();

    let report = d
        .engine
        .dispatcher
        .run_once(Utc::now() + chrono::Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(report.sent, 1);

    let messages = d.store.list_messages(&thread.id).await.unwrap();
    assert_eq!(messages[0].content, "Door code for Ada: 1357");
    let thread = d.store.get_thread(&thread.id).await.unwrap().unwrap();
    assert_eq!(thread.status, ThreadStatus::Open);
    assert_eq!(
        thread.last_message_preview.as_deref(),
        Some("Door code for Ada: 1357")
    );
}
