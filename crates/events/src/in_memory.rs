//! In-memory collaborators for tests/dev.
//!
//! - [`InMemoryTransport`]: channel hub over `tokio::sync::broadcast`
//! - [`InMemoryEventLog`]: append-only vector
//! - [`InMemorySubscriptionRegistry`]: registration rows
//!
//! Same delivery contract as the real broker: best-effort fan-out, nothing is
//! kept for listeners that are not subscribed at publish time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use futures_util::{future, FutureExt, StreamExt};
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};
use tracing::warn;

use edumyles_core::TenantId;

use crate::store::{
    EventLog, EventLogError, EventLogFilter, Pagination, RegistryError, SubscriptionRegistry,
};
use crate::subscription::SubscriptionRecord;
use crate::transport::{Connection, MessageStream, Transport, TransportError};
use crate::Event;

const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug)]
struct Hub {
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
    capacity: usize,
    open_connections: AtomicUsize,
    unreachable: AtomicBool,
}

/// In-process pub/sub broker.
///
/// Cloning shares the same hub, so a test can keep a handle for inspection
/// while the bus owns another.
#[derive(Debug, Clone)]
pub struct InMemoryTransport {
    hub: Arc<Hub>,
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-channel buffer size; lagging listeners skip the oldest messages.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            hub: Arc::new(Hub {
                channels: Mutex::new(HashMap::new()),
                capacity: capacity.max(1),
                open_connections: AtomicUsize::new(0),
                unreachable: AtomicBool::new(false),
            }),
        }
    }

    /// Simulate a broker outage: new connections and pings fail.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.hub.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Connections opened and not yet disconnected or dropped.
    pub fn open_connections(&self) -> usize {
        self.hub.open_connections.load(Ordering::SeqCst)
    }

    /// Live channel listeners across all channels.
    pub fn listener_count(&self) -> usize {
        self.hub
            .channels
            .lock()
            .map(|channels| channels.values().map(|tx| tx.receiver_count()).sum())
            .unwrap_or(0)
    }

    fn open(&self) -> Result<Arc<dyn Connection>, TransportError> {
        open_connection(&self.hub)
    }
}

fn open_connection(hub: &Arc<Hub>) -> Result<Arc<dyn Connection>, TransportError> {
    if hub.unreachable.load(Ordering::SeqCst) {
        return Err(TransportError::Connection("in-memory broker unreachable".to_string()));
    }
    hub.open_connections.fetch_add(1, Ordering::SeqCst);
    let (closed, _) = watch::channel(false);
    Ok(Arc::new(InMemoryConnection {
        hub: hub.clone(),
        open: AtomicBool::new(true),
        closed,
    }))
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn connect(&self) -> Result<Arc<dyn Connection>, TransportError> {
        self.open()
    }
}

#[derive(Debug)]
struct InMemoryConnection {
    hub: Arc<Hub>,
    open: AtomicBool,
    /// Flipped to `true` on disconnect; ends this connection's listener streams.
    closed: watch::Sender<bool>,
}

impl InMemoryConnection {
    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::Closed)
        }
    }

    fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.hub.open_connections.fetch_sub(1, Ordering::SeqCst);
            self.closed.send_replace(true);
        }
    }
}

impl Drop for InMemoryConnection {
    fn drop(&mut self) {
        self.close();
    }
}

#[async_trait]
impl Connection for InMemoryConnection {
    async fn ping(&self) -> Result<(), TransportError> {
        self.ensure_open()?;
        if self.hub.unreachable.load(Ordering::SeqCst) {
            return Err(TransportError::Connection("in-memory broker unreachable".to_string()));
        }
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), TransportError> {
        self.ensure_open()?;
        let channels = self
            .hub
            .channels
            .lock()
            .map_err(|_| TransportError::Command("lock poisoned".to_string()))?;

        // No receivers is not an error: pub/sub drops the message.
        if let Some(tx) = channels.get(channel) {
            let _ = tx.send(payload.to_string());
        }
        Ok(())
    }

    async fn duplicate(&self) -> Result<Arc<dyn Connection>, TransportError> {
        self.ensure_open()?;
        open_connection(&self.hub)
    }

    async fn subscribe(&self, channel: &str) -> Result<MessageStream, TransportError> {
        self.ensure_open()?;
        let rx = {
            let mut channels = self
                .hub
                .channels
                .lock()
                .map_err(|_| TransportError::Command("lock poisoned".to_string()))?;
            let capacity = self.hub.capacity;
            channels
                .entry(channel.to_string())
                .or_insert_with(|| broadcast::channel(capacity).0)
                .subscribe()
        };

        let mut closed = self.closed.subscribe();
        let until_closed = async move {
            let _ = closed.wait_for(|closed| *closed).await;
        }
        .boxed();

        let channel = channel.to_string();
        let stream = BroadcastStream::new(rx)
            .filter_map(move |item| {
                future::ready(match item {
                    Ok(payload) => Some(payload),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(channel = %channel, skipped, "listener lagged; messages dropped");
                        None
                    }
                })
            })
            .take_until(until_closed)
            .boxed();

        Ok(stream)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.close();
        Ok(())
    }
}

/// In-memory append-only event log.
#[derive(Debug, Default)]
pub struct InMemoryEventLog {
    events: RwLock<Vec<Event>>,
    reject_appends: AtomicBool,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent appends fail (simulated storage outage).
    pub fn set_reject_appends(&self, reject: bool) {
        self.reject_appends.store(reject, Ordering::SeqCst);
    }

    /// Everything appended so far, in append order.
    pub fn all(&self) -> Vec<Event> {
        self.events.read().map(|events| events.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.read().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    async fn append(&self, event: &Event) -> Result<(), EventLogError> {
        if self.reject_appends.load(Ordering::SeqCst) {
            return Err(EventLogError::Write("in-memory log is rejecting appends".to_string()));
        }

        self.events
            .write()
            .map_err(|_| EventLogError::Write("lock poisoned".to_string()))?
            .push(event.clone());
        Ok(())
    }

    async fn query(
        &self,
        tenant_id: &TenantId,
        filter: &EventLogFilter,
        pagination: Pagination,
    ) -> Result<Vec<Event>, EventLogError> {
        let events = self
            .events
            .read()
            .map_err(|_| EventLogError::Read("lock poisoned".to_string()))?;

        Ok(events
            .iter()
            .rev()
            .filter(|e| e.tenant_id() == tenant_id && filter.matches(e))
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .cloned()
            .collect())
    }
}

/// In-memory subscription registry.
#[derive(Debug, Default)]
pub struct InMemorySubscriptionRegistry {
    records: RwLock<Vec<SubscriptionRecord>>,
}

impl InMemorySubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, record: SubscriptionRecord) {
        if let Ok(mut records) = self.records.write() {
            records.push(record);
        }
    }
}

#[async_trait]
impl SubscriptionRegistry for InMemorySubscriptionRegistry {
    async fn list_subscriptions(&self, module_id: &str) -> Result<Vec<SubscriptionRecord>, RegistryError> {
        let records = self
            .records
            .read()
            .map_err(|_| RegistryError::Read("lock poisoned".to_string()))?;

        let mut matching: Vec<SubscriptionRecord> = records
            .iter()
            .filter(|r| r.module_id == module_id && r.active)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::NewEvent;

    #[tokio::test]
    async fn listeners_receive_messages_published_after_subscribing() {
        let transport = InMemoryTransport::new();
        let conn = transport.connect().await.unwrap();
        let listener = conn.duplicate().await.unwrap();

        let mut stream = listener.subscribe("event:a.b").await.unwrap();
        conn.publish("event:a.b", "hello").await.unwrap();
        conn.publish("event:a.c", "elsewhere").await.unwrap();

        assert_eq!(stream.next().await.as_deref(), Some("hello"));
        assert!(
            tokio::time::timeout(Duration::from_millis(20), stream.next())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn disconnect_ends_streams_and_releases_counts() {
        let transport = InMemoryTransport::new();
        let conn = transport.connect().await.unwrap();
        let listener = conn.duplicate().await.unwrap();
        let mut stream = listener.subscribe("event:a.b").await.unwrap();

        assert_eq!(transport.open_connections(), 2);
        assert_eq!(transport.listener_count(), 1);

        listener.disconnect().await.unwrap();
        assert_eq!(stream.next().await, None);
        drop(stream);

        assert_eq!(transport.open_connections(), 1);
        assert_eq!(transport.listener_count(), 0);
        assert!(matches!(
            listener.publish("x", "y").await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn unreachable_broker_fails_connect_and_ping() {
        let transport = InMemoryTransport::new();
        let conn = transport.connect().await.unwrap();

        transport.set_unreachable(true);
        assert!(conn.ping().await.is_err());
        assert!(transport.connect().await.is_err());

        transport.set_unreachable(false);
        assert!(conn.ping().await.is_ok());
    }

    #[tokio::test]
    async fn log_query_is_tenant_scoped_and_newest_first() {
        let log = InMemoryEventLog::new();
        for (tenant, kind) in [("t1", "a.one"), ("t2", "a.one"), ("t1", "a.two")] {
            log.append(&Event::stamp(NewEvent::new(kind, "test", tenant)))
                .await
                .unwrap();
        }

        let page = log
            .query(&TenantId::new("t1"), &EventLogFilter::default(), Pagination::default())
            .await
            .unwrap();
        let types: Vec<&str> = page.iter().map(|e| e.event_type()).collect();
        assert_eq!(types, vec!["a.two", "a.one"]);

        let filtered = log
            .query(
                &TenantId::new("t1"),
                &EventLogFilter {
                    event_type: Some("a.one".into()),
                    ..Default::default()
                },
                Pagination::default(),
            )
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
    }

    #[tokio::test]
    async fn registry_lists_active_rows_by_priority() {
        let registry = InMemorySubscriptionRegistry::new();
        registry.register(SubscriptionRecord::new("user.login", "audit", "low", 1));
        registry.register(SubscriptionRecord::new("user.login", "audit", "high", 10));
        registry.register(SubscriptionRecord::new("user.login", "audit", "off", 50).deactivated());
        registry.register(SubscriptionRecord::new("user.login", "other", "x", 99));

        let rows = registry.list_subscriptions("audit").await.unwrap();
        let handlers: Vec<&str> = rows.iter().map(|r| r.handler.as_str()).collect();
        assert_eq!(handlers, vec!["high", "low"]);
    }
}
