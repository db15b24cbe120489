use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt;
use serde_json::json;
use tokio::time::Instant;

use edumyles_events::{
    event_channel, handler_fn, kinds, tenant_channel, BusError, Event, EventBus, EventHandler,
    EventLogFilter, InMemoryEventLog, InMemorySubscriptionRegistry, InMemoryTransport, NewEvent,
    Pagination, RetryPolicy, SubscriptionOptions, SubscriptionRecord, Transport,
};
use edumyles_core::TenantId;

struct Harness {
    transport: InMemoryTransport,
    log: Arc<InMemoryEventLog>,
    registry: Arc<InMemorySubscriptionRegistry>,
    bus: EventBus,
}

async fn connected() -> Harness {
    let transport = InMemoryTransport::new();
    let log = Arc::new(InMemoryEventLog::new());
    let registry = Arc::new(InMemorySubscriptionRegistry::new());
    let bus = EventBus::new(Arc::new(transport.clone()), log.clone(), registry.clone());
    bus.connect().await.unwrap();
    Harness {
        transport,
        log,
        registry,
        bus,
    }
}

fn login(tenant: &str) -> NewEvent {
    NewEvent::new(kinds::USER_LOGIN, "auth", tenant).with_field("userId", "u1")
}

/// Records the instant of every call and fails the first `failures` calls.
fn flaky_handler(failures: u32, calls: Arc<Mutex<Vec<Instant>>>) -> Arc<dyn EventHandler> {
    Arc::new(handler_fn(move |_event: Event| {
        let calls = calls.clone();
        async move {
            let n = {
                let mut calls = calls.lock().unwrap();
                calls.push(Instant::now());
                calls.len() as u32
            };
            if n <= failures {
                anyhow::bail!("call {n} failed");
            }
            Ok(())
        }
    }))
}

fn counting_handler(calls: Arc<AtomicU32>) -> Arc<dyn EventHandler> {
    Arc::new(handler_fn(move |_event: Event| {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }))
}

/// Let dispatch tasks run for roughly `millis` of (possibly paused) time.
async fn settle(millis: u64) {
    for _ in 0..(millis / 10).max(1) {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn publish_stamps_unique_ids_and_fresh_timestamps() {
    let h = connected().await;
    let before = Utc::now();

    let mut ids = HashSet::new();
    for _ in 0..10 {
        let event = h.bus.publish(login("t1")).await.unwrap();
        assert!(event.timestamp() >= before);
        assert!(ids.insert(event.id()));
    }
    assert_eq!(h.log.len(), 10);
}

#[tokio::test]
async fn publish_without_subscribers_is_durably_recorded() {
    let h = connected().await;

    let published = h.bus.publish(login("t1")).await.unwrap();

    let stored = h.log.all();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0], published);
    assert_eq!(stored[0].event_type(), "user.login");
    assert_eq!(stored[0].tenant_id(), &TenantId::new("t1"));
    assert_eq!(stored[0].data().get("userId"), Some(&json!("u1")));
}

#[tokio::test]
async fn publish_broadcasts_once_on_type_and_tenant_channels() {
    let h = connected().await;
    let observer = h.transport.connect().await.unwrap();
    let mut by_type = observer.subscribe(&event_channel(kinds::USER_LOGIN)).await.unwrap();
    let mut by_tenant = observer
        .subscribe(&tenant_channel(&TenantId::new("t1")))
        .await
        .unwrap();

    let published = h.bus.publish(login("t1")).await.unwrap();

    for stream in [&mut by_type, &mut by_tenant] {
        let payload = stream.next().await.unwrap();
        let received: Event = serde_json::from_str(&payload).unwrap();
        assert_eq!(received, published);
        assert!(
            tokio::time::timeout(Duration::from_millis(20), stream.next())
                .await
                .is_err(),
            "exactly one message per channel"
        );
    }
}

#[tokio::test]
async fn rejecting_filter_never_invokes_handler() {
    let h = connected().await;
    let calls = Arc::new(AtomicU32::new(0));
    h.bus
        .subscribe(
            "user.login",
            counting_handler(calls.clone()),
            SubscriptionOptions::new()
                .with_filter(|_| false)
                .with_retry_policy(RetryPolicy::exponential(3, 2.0, Duration::from_secs(10))),
        )
        .await
        .unwrap();

    for _ in 0..3 {
        h.bus.publish(login("t1")).await.unwrap();
    }
    settle(50).await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn tenant_filter_only_passes_matching_tenant() {
    let h = connected().await;
    let calls = Arc::new(AtomicU32::new(0));
    h.bus
        .subscribe(
            "user.login",
            counting_handler(calls.clone()),
            SubscriptionOptions::new().for_tenant(TenantId::new("t1")),
        )
        .await
        .unwrap();

    h.bus.publish(login("t2")).await.unwrap();
    h.bus.publish(login("t1")).await.unwrap();
    settle(50).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn failing_handler_is_retried_with_backoff() {
    let h = connected().await;
    let calls = Arc::new(Mutex::new(Vec::new()));
    h.bus
        .subscribe(
            "user.login",
            flaky_handler(2, calls.clone()),
            SubscriptionOptions::new()
                .with_retry_policy(RetryPolicy::exponential(2, 2.0, Duration::from_millis(10_000))),
        )
        .await
        .unwrap();

    h.bus.publish(login("t1")).await.unwrap();
    settle(5_000).await;

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 3);
    assert!(calls[1] - calls[0] >= Duration::from_millis(1_000));
    assert!(calls[2] - calls[1] >= Duration::from_millis(2_000));
}

/// Formatted log output collected from the test's thread.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_do_not_reach_the_publisher() {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer({
            let logs = logs.clone();
            move || logs.clone()
        })
        .with_ansi(false)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let h = connected().await;
    let calls = Arc::new(Mutex::new(Vec::new()));
    h.bus
        .subscribe(
            "user.login",
            flaky_handler(u32::MAX, calls.clone()),
            SubscriptionOptions::new()
                .with_retry_policy(RetryPolicy::exponential(1, 2.0, Duration::from_millis(10_000))),
        )
        .await
        .unwrap();

    h.bus.publish(login("t1")).await.unwrap();
    settle(5_000).await;

    assert_eq!(calls.lock().unwrap().len(), 2);
    let output = logs.contents();
    assert!(output.contains("ERROR"));
    assert!(output.contains("error handling event"));
    assert!(output.contains("event_type=user.login"));
    // The subscription survives the failure and keeps delivering.
    h.bus.publish(login("t1")).await.unwrap();
    settle(5_000).await;
    assert_eq!(calls.lock().unwrap().len(), 4);
}

#[tokio::test]
async fn zero_retries_means_exactly_one_attempt() {
    let h = connected().await;
    let calls = Arc::new(Mutex::new(Vec::new()));
    h.bus
        .subscribe(
            "user.login",
            flaky_handler(u32::MAX, calls.clone()),
            SubscriptionOptions::new().with_retry_policy(RetryPolicy::no_retry()),
        )
        .await
        .unwrap();

    assert!(h.bus.publish(login("t1")).await.is_ok());
    settle(50).await;

    assert_eq!(calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn subscribers_only_see_their_own_type() {
    let h = connected().await;
    let calls = Arc::new(AtomicU32::new(0));
    h.bus
        .subscribe("a.b", counting_handler(calls.clone()), SubscriptionOptions::new())
        .await
        .unwrap();

    h.bus.publish(NewEvent::new("a.c", "test", "t1")).await.unwrap();
    h.bus.publish(NewEvent::new("a.bc", "test", "t1")).await.unwrap();
    settle(50).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    h.bus.publish(NewEvent::new("a.b", "test", "t1")).await.unwrap();
    settle(50).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unsubscribe_twice_reports_not_found() {
    let h = connected().await;
    let id = h
        .bus
        .subscribe("a.b", counting_handler(Arc::default()), SubscriptionOptions::new())
        .await
        .unwrap();

    h.bus.unsubscribe(id).await.unwrap();
    let second = h.bus.unsubscribe(id).await;

    assert!(matches!(second, Err(BusError::SubscriptionNotFound(missing)) if missing == id));
}

#[tokio::test]
async fn unsubscribe_releases_listener_and_stops_delivery() {
    let h = connected().await;
    let baseline_listeners = h.transport.listener_count();
    let baseline_connections = h.transport.open_connections();

    let calls = Arc::new(AtomicU32::new(0));
    let id = h
        .bus
        .subscribe("a.b", counting_handler(calls.clone()), SubscriptionOptions::new())
        .await
        .unwrap();
    assert_eq!(h.transport.listener_count(), baseline_listeners + 1);
    assert_eq!(h.bus.subscription_count().await, 1);

    h.bus.unsubscribe(id).await.unwrap();

    assert_eq!(h.transport.listener_count(), baseline_listeners);
    assert_eq!(h.transport.open_connections(), baseline_connections);
    assert_eq!(h.bus.subscription_count().await, 0);

    h.bus.publish(NewEvent::new("a.b", "test", "t1")).await.unwrap();
    settle(50).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn operations_before_connect_fail_with_not_connected() {
    let bus = EventBus::new(
        Arc::new(InMemoryTransport::new()),
        Arc::new(InMemoryEventLog::new()),
        Arc::new(InMemorySubscriptionRegistry::new()),
    );

    assert!(matches!(bus.publish(login("t1")).await, Err(BusError::NotConnected)));
    assert!(matches!(
        bus.subscribe("a.b", counting_handler(Arc::default()), SubscriptionOptions::new())
            .await,
        Err(BusError::NotConnected)
    ));
    assert!(!bus.is_healthy().await);
}

#[tokio::test]
async fn durable_write_failure_propagates_after_broadcast() {
    let h = connected().await;
    let calls = Arc::new(AtomicU32::new(0));
    h.bus
        .subscribe("user.login", counting_handler(calls.clone()), SubscriptionOptions::new())
        .await
        .unwrap();
    h.log.set_reject_appends(true);

    let result = h.bus.publish(login("t1")).await;

    assert!(matches!(result, Err(BusError::DurableWrite(_))));
    assert!(h.log.is_empty());
    // Broadcasts are not rolled back.
    settle(50).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn health_is_false_when_broker_is_unreachable() {
    let h = connected().await;
    assert!(h.bus.is_healthy().await);

    h.transport.set_unreachable(true);
    assert!(!h.bus.is_healthy().await);
}

#[tokio::test]
async fn connect_is_idempotent() {
    let h = connected().await;
    let connections = h.transport.open_connections();

    h.bus.connect().await.unwrap();

    assert_eq!(h.transport.open_connections(), connections);
}

#[tokio::test]
async fn get_subscriptions_reads_the_registry_not_live_subscriptions() {
    let h = connected().await;
    h.registry
        .register(SubscriptionRecord::new("user.login", "audit", "recordLogin", 5));
    h.registry
        .register(SubscriptionRecord::new("user.logout", "audit", "recordLogout", 10));
    h.bus
        .subscribe("user.login", counting_handler(Arc::default()), SubscriptionOptions::new())
        .await
        .unwrap();

    let rows = h.bus.get_subscriptions("audit").await.unwrap();
    let handlers: Vec<&str> = rows.iter().map(|r| r.handler.as_str()).collect();
    assert_eq!(handlers, vec!["recordLogout", "recordLogin"]);

    assert!(h.bus.get_subscriptions("nobody").await.unwrap().is_empty());
}

#[tokio::test]
async fn history_is_tenant_scoped_and_paginated() {
    let h = connected().await;
    for tenant in ["t1", "t2", "t1", "t1"] {
        h.bus.publish(login(tenant)).await.unwrap();
    }

    let t1 = TenantId::new("t1");
    let all = h
        .bus
        .history(&t1, &EventLogFilter::default(), Pagination::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 3);
    assert!(all.windows(2).all(|w| w[0].timestamp() >= w[1].timestamp()));

    let page = h
        .bus
        .history(&t1, &EventLogFilter::default(), Pagination::new(Some(2), Some(2)))
        .await
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0], all[2]);
}
