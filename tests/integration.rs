//! Integration tests for the proxy over the in-memory backend.

use crossbeam_channel::{unbounded, Receiver};
use parse_proxy::{
    Attributes, Backend, Comparison, FilterDescriptor, HandlerSet, MemoryBackend, ParseObject, ParseProxy,
    ProxyConfig, RecordKind,
};
use serde_json::{json, Value};
use std::sync::Arc;

fn attrs(value: Value) -> Attributes {
    value.as_object().cloned().expect("object literal")
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn test_config() -> ProxyConfig {
    ProxyConfig::new("http://localhost:1337/parse", "test-app", "js-key")
}

fn test_proxy() -> ParseProxy<MemoryBackend> {
    init_tracing();
    let config = test_config();
    let backend = MemoryBackend::from_config(&config);
    ParseProxy::init(config, backend).unwrap()
}

/// Handler set that forwards every callback to a channel.
fn recording_handlers() -> (HandlerSet, Receiver<(String, Option<ParseObject>)>) {
    let (tx, rx) = unbounded();
    let (c, u, e, d, x) = (tx.clone(), tx.clone(), tx.clone(), tx.clone(), tx);
    let handlers = HandlerSet::builder()
        .on_create(move |o| c.send(("create".to_string(), Some(o))).unwrap())
        .on_update(move |o| u.send(("update".to_string(), Some(o))).unwrap())
        .on_enter(move |o| e.send(("enter".to_string(), Some(o))).unwrap())
        .on_delete(move |o| d.send(("delete".to_string(), Some(o))).unwrap())
        .on_close(move || x.send(("close".to_string(), None)).unwrap())
        .build()
        .unwrap();
    (handlers, rx)
}

fn event_names(rx: &Receiver<(String, Option<ParseObject>)>) -> Vec<String> {
    rx.try_iter().map(|(name, _)| name).collect()
}

// --- Record Creation ---

#[tokio::test]
async fn test_create_message_inbound() {
    let proxy = test_proxy();

    let message = proxy
        .create_message_inbound(attrs(json!({"fromUserId": "u1", "channel": "c1", "text": "hi"})))
        .unwrap()
        .await
        .unwrap();

    assert_eq!(message.class_name, "MessageInbound");
    assert!(message.object_id.is_some());
    assert!(message.created_at.is_some());
    assert_eq!(message.get("text"), Some(&json!("hi")));

    let fetched = proxy
        .get_message_inbound_by_id(message.object_id.as_deref().unwrap())
        .await
        .unwrap();
    assert_eq!(fetched, message);
}

#[tokio::test]
async fn test_create_missing_key_fails_before_save() {
    let proxy = test_proxy();

    let Err(err) = proxy.create_message_inbound(attrs(json!({"fromUserId": "u1"}))) else {
        panic!("Expected missing key error");
    };

    assert!(err.is_precondition());
    assert_eq!(proxy.backend().save_count(), 0);
    assert_eq!(proxy.backend().object_count("MessageInbound"), 0);
}

#[tokio::test]
async fn test_create_message_outbound_requires_to_user() {
    let proxy = test_proxy();

    assert!(proxy
        .create_message_outbound(attrs(json!({"fromUserId": "u1", "channel": "c1"})))
        .is_err());

    let message = proxy
        .create_message_outbound(attrs(json!({"toUserId": "u2", "channel": "c1"})))
        .unwrap()
        .await
        .unwrap();
    assert_eq!(message.class_name, "MessageOutbound");

    let fetched = proxy
        .get_message_outbound_by_id(message.object_id.as_deref().unwrap())
        .await
        .unwrap();
    assert_eq!(fetched.get("toUserId"), Some(&json!("u2")));
}

#[tokio::test]
async fn test_concurrent_creates() {
    let proxy = test_proxy();

    let mut pending = Vec::new();
    for n in 0..10 {
        pending.push(
            proxy
                .create_message_outbound(attrs(json!({"toUserId": "u1", "channel": "c1", "n": n})))
                .unwrap(),
        );
    }
    let mut ids = Vec::new();
    for save in pending {
        ids.push(save.await.unwrap().object_id.unwrap());
    }

    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 10);
    assert_eq!(proxy.backend().object_count("MessageOutbound"), 10);
}

// --- Subscriptions ---

#[tokio::test]
async fn test_subscribe_outbound_with_channel_filter() {
    let proxy = test_proxy();
    let (handlers, rx) = recording_handlers();
    let filters = FilterDescriptor::list_from_json(
        r#"[{"ref": "equalTo", "key": "channel", "val": "c1"}]"#,
    )
    .unwrap();

    let handle = proxy
        .subscribe_message_outbound(handlers, Some(&filters))
        .unwrap();

    let query = proxy.backend().subscription_query(handle.id()).unwrap();
    assert_eq!(query.conditions().len(), 1);
    assert!(query.has_condition("channel", Comparison::Equal));
    assert_eq!(query.conditions()[0].value, json!("c1"));

    for channel in ["c1", "c2", "c1"] {
        proxy
            .create_message_outbound(attrs(json!({"toUserId": "u1", "channel": channel})))
            .unwrap()
            .await
            .unwrap();
    }

    let stats = handle.close().unwrap();

    let events: Vec<_> = rx.try_iter().collect();
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].0, "create");
    assert_eq!(events[1].0, "create");
    assert_eq!(events[2].0, "close");
    for (_, object) in &events[..2] {
        assert_eq!(object.as_ref().unwrap().get("channel"), Some(&json!("c1")));
    }
    assert_eq!(stats.delivered, 3);
    assert_eq!(proxy.backend().subscription_count(), 0);
}

#[tokio::test]
async fn test_subscription_discards_incomplete_creates() {
    let proxy = test_proxy();
    let backend = Arc::clone(proxy.backend());
    let (handlers, rx) = recording_handlers();

    let handle = proxy.subscribe_message_inbound(handlers, None).unwrap();

    // Written straight to the backend, bypassing the create precondition.
    backend
        .save("MessageInbound", attrs(json!({"fromUserId": "u1"})))
        .await
        .unwrap();
    proxy
        .create_message_inbound(attrs(json!({"fromUserId": "u1", "channel": "c1"})))
        .unwrap()
        .await
        .unwrap();

    let stats = handle.close().unwrap();

    assert_eq!(event_names(&rx), vec!["create", "close"]);
    assert_eq!(stats.discarded, 1);
}

#[tokio::test]
async fn test_subscription_lifecycle_events_in_order() {
    let proxy = test_proxy();
    let backend = Arc::clone(proxy.backend());
    let (handlers, rx) = recording_handlers();
    let filters = [FilterDescriptor::equal_to("channel", "c1")];

    let handle = proxy
        .subscribe_message_inbound(handlers, Some(&filters))
        .unwrap();

    let outside = proxy
        .create_message_inbound(attrs(json!({"fromUserId": "u1", "channel": "c2"})))
        .unwrap()
        .await
        .unwrap();
    let id = outside.object_id.unwrap();

    backend
        .update("MessageInbound", &id, attrs(json!({"channel": "c1"})))
        .unwrap();
    backend
        .update("MessageInbound", &id, attrs(json!({"read": true})))
        .unwrap();
    backend.destroy("MessageInbound", &id).unwrap();

    handle.close().unwrap();

    assert_eq!(event_names(&rx), vec!["enter", "update", "delete", "close"]);
}

#[tokio::test]
async fn test_backend_disconnect_closes_subscription() {
    let proxy = test_proxy();
    let (handlers, rx) = recording_handlers();

    let handle = proxy.subscribe_message_inbound(handlers, None).unwrap();
    proxy.backend().disconnect();

    let stats = handle.wait().unwrap();

    assert_eq!(event_names(&rx), vec!["close"]);
    assert_eq!(stats.delivered, 1);
}

#[tokio::test]
async fn test_legacy_schema_subscription() {
    let config = test_config().with_legacy_schemas();
    let backend = MemoryBackend::from_config(&config);
    let proxy = ParseProxy::init(config, backend).unwrap();
    let (handlers, rx) = recording_handlers();
    let handle = proxy.subscribe(RecordKind::Outbound, handlers, None).unwrap();

    assert!(proxy
        .create_message_outbound(attrs(json!({"toUserId": "u1", "channel": "c1"})))
        .is_err());
    proxy
        .create_message_outbound(attrs(json!({"toUserId": "u1", "type": "text"})))
        .unwrap()
        .await
        .unwrap();

    handle.close().unwrap();
    assert_eq!(event_names(&rx), vec!["create", "close"]);
}

#[tokio::test]
async fn test_configured_buffer_drops_slow_subscriber() {
    init_tracing();
    let config =
        ProxyConfig::from_json(r#"{"appId": "test-app", "subscriptionBufferSize": 2}"#).unwrap();
    let backend = MemoryBackend::from_config(&config);
    let proxy = ParseProxy::init(config, backend).unwrap();

    // on_create blocks until the gate closes, so the buffer backs up.
    let (gate_tx, gate_rx) = unbounded::<()>();
    let handle = proxy
        .subscribe_message_inbound(
            HandlerSet::new(move |_| {
                let _ = gate_rx.recv();
            }),
            None,
        )
        .unwrap();
    assert_eq!(proxy.backend().subscription_count(), 1);

    for n in 0..20 {
        proxy
            .create_message_inbound(attrs(json!({"fromUserId": "u1", "channel": "c1", "n": n})))
            .unwrap()
            .await
            .unwrap();
    }

    assert_eq!(proxy.backend().subscription_count(), 0);
    assert_eq!(proxy.backend().object_count("MessageInbound"), 20);

    drop(gate_tx);
    let stats = handle.wait().unwrap();
    assert!(stats.delivered < 20);
}

// --- Queries ---

#[tokio::test]
async fn test_query_with_filters() {
    let proxy = test_proxy();
    for (n, channel) in [(1, "c1"), (2, "c2"), (3, "c1"), (4, "c1"), (5, "c1")] {
        proxy
            .create_message_inbound(attrs(json!({"fromUserId": "u1", "channel": channel, "n": n})))
            .unwrap()
            .await
            .unwrap();
    }

    let filters = [
        FilterDescriptor::equal_to("channel", "c1"),
        FilterDescriptor::greater_than("n", 1),
        FilterDescriptor::descending("n"),
        FilterDescriptor::limit(2),
    ];
    let query = proxy.query("MessageInbound", Some(&filters));
    let found = proxy.find(&query).await.unwrap();

    let ns: Vec<_> = found.iter().map(|o| o.get("n").cloned().unwrap()).collect();
    assert_eq!(ns, vec![json!(5), json!(4)]);
}

#[tokio::test]
async fn test_get_config() {
    let proxy = test_proxy();
    proxy
        .backend()
        .set_config(attrs(json!({"maxMessageLength": 500})));

    let params = proxy.get_config().await.unwrap();
    assert_eq!(params["maxMessageLength"], json!(500));
}
