//! Tenant-scoped publish/subscribe event bus.
//!
//! The bus decouples side effects (audit logging, cross-module notification)
//! from the request handlers that trigger them.
//!
//! ## Publish path
//!
//! ```text
//! NewEvent ─► stamp id + timestamp ─► PUBLISH event:<type>
//!                                  ─► PUBLISH tenant:<tenantId>:events
//!                                  ─► EventLog::append (awaited)
//! ```
//!
//! Broadcasting happens before the durable append. If the append fails the
//! caller gets the error, but the broadcasts are not rolled back: delivery is
//! at-least-attempted, not atomic. Subscribers that must not miss anything
//! read the durable log ([`EventBus::history`]).
//!
//! ## Delivery path
//!
//! Every subscription owns a dedicated listener connection and a dispatch
//! task. Each received message is decoded, passed through the subscription's
//! filter, then handed to the handler wrapped in a [`RetryingHandler`].
//! Handler failures that exhaust the retry budget are logged at the dispatch
//! boundary and never reach the publisher.
//!
//! ## Guarantees
//!
//! - **At-least-once attempts** per received message; no exactly-once.
//! - **No ordering** across or within event types.
//! - **No persistence of subscriptions**: they live until `unsubscribe` or
//!   process shutdown.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::{Mutex, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, instrument, warn};

use edumyles_core::{SubscriptionId, TenantId};

use crate::channel::{event_channel, tenant_channel};
use crate::error::BusError;
use crate::handler::EventHandler;
use crate::retry::{Delay, RetryingHandler, TokioDelay};
use crate::store::{EventLog, EventLogFilter, Pagination, SubscriptionRegistry};
use crate::subscription::{SubscriptionOptions, SubscriptionRecord};
use crate::transport::{Connection, MessageStream, Transport};
use crate::{Event, NewEvent};

/// A live subscription owned by the bus.
struct ActiveSubscription {
    channel: String,
    options: SubscriptionOptions,
    listener: Arc<dyn Connection>,
    /// `None` once the subscription went inert (bus disconnected).
    dispatch: Option<JoinHandle<()>>,
}

/// Tenant-scoped event bus.
///
/// Built once at the composition root and shared as `Arc<EventBus>`.
/// `connect()` must be called before publishing or subscribing.
pub struct EventBus {
    transport: Arc<dyn Transport>,
    log: Arc<dyn EventLog>,
    registry: Arc<dyn SubscriptionRegistry>,
    delay: Arc<dyn Delay>,
    client: RwLock<Option<Arc<dyn Connection>>>,
    subscriptions: Mutex<HashMap<SubscriptionId, ActiveSubscription>>,
}

impl core::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventBus").finish_non_exhaustive()
    }
}

impl EventBus {
    pub fn new(
        transport: Arc<dyn Transport>,
        log: Arc<dyn EventLog>,
        registry: Arc<dyn SubscriptionRegistry>,
    ) -> Self {
        Self {
            transport,
            log,
            registry,
            delay: Arc::new(TokioDelay),
            client: RwLock::new(None),
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the wait used between handler retries.
    pub fn with_delay(mut self, delay: Arc<dyn Delay>) -> Self {
        self.delay = delay;
        self
    }

    /// Open the transport connection. No-op when already connected.
    pub async fn connect(&self) -> Result<(), BusError> {
        if self.client.read().await.is_some() {
            return Ok(());
        }

        let conn = self.transport.connect().await.map_err(|e| {
            error!(error = %e, "failed to connect event bus transport");
            e
        })?;

        let mut client = self.client.write().await;
        if client.is_some() {
            // Lost a race with a concurrent connect; keep the winner.
            drop(client);
            release(conn.as_ref(), "failed to release redundant connection").await;
            return Ok(());
        }
        *client = Some(conn);
        info!("event bus connected");
        Ok(())
    }

    /// Release the transport connection.
    ///
    /// Live subscriptions become inert: their dispatch tasks stop and their
    /// listeners are disconnected, but they stay registered until
    /// `unsubscribe` is called.
    pub async fn disconnect(&self) {
        let Some(client) = self.client.write().await.take() else {
            return;
        };

        let inert: Vec<(JoinHandle<()>, Arc<dyn Connection>)> = {
            let mut subscriptions = self.subscriptions.lock().await;
            subscriptions
                .values_mut()
                .filter_map(|sub| sub.dispatch.take().map(|task| (task, sub.listener.clone())))
                .collect()
        };
        for (task, listener) in inert {
            stop_listener(task, listener.as_ref()).await;
        }

        if let Err(e) = client.disconnect().await {
            warn!(error = %e, "event bus transport disconnect failed");
        }
        info!("event bus disconnected");
    }

    /// `true` when connected and the transport answers a liveness probe.
    pub async fn is_healthy(&self) -> bool {
        let Some(client) = self.client.read().await.clone() else {
            return false;
        };

        match client.ping().await {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "event bus health check failed");
                false
            }
        }
    }

    /// Stamp and publish an event, then append it to the durable log.
    ///
    /// Returns the stamped event once the durable append succeeded.
    #[instrument(
        skip(self, new),
        fields(event_type = %new.event_type, tenant_id = %new.tenant_id, source = %new.source),
        err
    )]
    pub async fn publish(&self, new: NewEvent) -> Result<Event, BusError> {
        let client = self.connection().await?;

        let event = Event::stamp(new);
        let payload = serde_json::to_string(&event)?;

        client
            .publish(&event_channel(event.event_type()), &payload)
            .await?;
        client
            .publish(&tenant_channel(event.tenant_id()), &payload)
            .await?;

        self.log.append(&event).await.map_err(BusError::DurableWrite)?;

        debug!(
            event_id = %event.id(),
            event_type = %event.event_type(),
            source = %event.source(),
            tenant_id = %event.tenant_id(),
            "event published"
        );
        Ok(event)
    }

    /// Subscribe `handler` to every event of type `event_type` (exact match).
    pub async fn subscribe(
        &self,
        event_type: &str,
        handler: Arc<dyn EventHandler>,
        options: SubscriptionOptions,
    ) -> Result<SubscriptionId, BusError> {
        self.subscribe_channel(event_channel(event_type), handler, options)
            .await
    }

    /// Subscribe `handler` to every event of one tenant, whatever its type.
    pub async fn subscribe_tenant(
        &self,
        tenant_id: &TenantId,
        handler: Arc<dyn EventHandler>,
        options: SubscriptionOptions,
    ) -> Result<SubscriptionId, BusError> {
        self.subscribe_channel(tenant_channel(tenant_id), handler, options)
            .await
    }

    async fn subscribe_channel(
        &self,
        channel: String,
        handler: Arc<dyn EventHandler>,
        options: SubscriptionOptions,
    ) -> Result<SubscriptionId, BusError> {
        let client = self.connection().await?;
        let subscription_id = SubscriptionId::new();

        let listener = client.duplicate().await?;
        let stream = match listener.subscribe(&channel).await {
            Ok(stream) => stream,
            Err(e) => {
                release(listener.as_ref(), "failed to disconnect subscription listener").await;
                return Err(e.into());
            }
        };

        // `disconnect` sweeps this map after dropping the client, so the
        // connection must still be the one the listener came from.
        let mut subscriptions = self.subscriptions.lock().await;
        let still_connected = self
            .client
            .read()
            .await
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &client));
        if !still_connected {
            drop(subscriptions);
            drop(stream);
            release(listener.as_ref(), "failed to disconnect subscription listener").await;
            debug!(channel = %channel, "bus disconnected while subscribing");
            return Err(BusError::NotConnected);
        }

        let dispatch = tokio::spawn(dispatch(
            subscription_id,
            stream,
            handler,
            options.clone(),
            self.delay.clone(),
        ));

        debug!(
            subscription_id = %subscription_id,
            channel = %channel,
            priority = options.priority,
            "subscribed"
        );

        subscriptions.insert(
            subscription_id,
            ActiveSubscription {
                channel,
                options,
                listener,
                dispatch: Some(dispatch),
            },
        );
        Ok(subscription_id)
    }

    /// Cancel a subscription and close its dedicated listener.
    ///
    /// In-flight deliveries for this subscription are cancelled. Returns once
    /// the listener has been released.
    pub async fn unsubscribe(&self, subscription_id: SubscriptionId) -> Result<(), BusError> {
        let subscription = self
            .subscriptions
            .lock()
            .await
            .remove(&subscription_id)
            .ok_or(BusError::SubscriptionNotFound(subscription_id))?;

        if let Some(task) = subscription.dispatch {
            stop_listener(task, subscription.listener.as_ref()).await;
        }

        debug!(
            subscription_id = %subscription_id,
            channel = %subscription.channel,
            priority = subscription.options.priority,
            "unsubscribed"
        );
        Ok(())
    }

    /// Persisted registrations of a module, from the subscription registry.
    ///
    /// This does not reflect subscriptions made through [`EventBus::subscribe`].
    pub async fn get_subscriptions(&self, module_id: &str) -> Result<Vec<SubscriptionRecord>, BusError> {
        Ok(self.registry.list_subscriptions(module_id).await?)
    }

    /// Tenant-scoped read of the durable log, newest first.
    pub async fn history(
        &self,
        tenant_id: &TenantId,
        filter: &EventLogFilter,
        pagination: Pagination,
    ) -> Result<Vec<Event>, BusError> {
        self.log
            .query(tenant_id, filter, pagination)
            .await
            .map_err(BusError::History)
    }

    /// Number of live (not yet unsubscribed) subscriptions.
    pub async fn subscription_count(&self) -> usize {
        self.subscriptions.lock().await.len()
    }

    async fn connection(&self) -> Result<Arc<dyn Connection>, BusError> {
        self.client
            .read()
            .await
            .clone()
            .ok_or(BusError::NotConnected)
    }
}

/// Stop a dispatch task and release its listener.
///
/// Awaiting the aborted task guarantees its stream (and every in-flight
/// delivery) has been dropped before the listener is disconnected.
async fn stop_listener(task: JoinHandle<()>, listener: &dyn Connection) {
    task.abort();
    let _ = task.await;
    release(listener, "failed to disconnect subscription listener").await;
}

async fn release(conn: &dyn Connection, failure: &'static str) {
    if let Err(e) = conn.disconnect().await {
        warn!(error = %e, "{failure}");
    }
}

/// Per-subscription dispatch loop.
///
/// Each message is delivered in its own task so a handler waiting out a
/// backoff does not hold up decoding of later messages.
async fn dispatch(
    subscription_id: SubscriptionId,
    mut stream: MessageStream,
    handler: Arc<dyn EventHandler>,
    options: SubscriptionOptions,
    delay: Arc<dyn Delay>,
) {
    let mut deliveries = JoinSet::new();

    loop {
        tokio::select! {
            message = stream.next() => {
                let Some(payload) = message else { break };

                let event: Event = match serde_json::from_str(&payload) {
                    Ok(event) => event,
                    Err(e) => {
                        error!(subscription_id = %subscription_id, error = %e, "failed to decode event message");
                        continue;
                    }
                };

                if !options.accepts(&event) {
                    continue;
                }

                let retrying = RetryingHandler::new(handler.clone(), options.retry_policy.clone())
                    .with_delay(delay.clone());
                deliveries.spawn(async move {
                    if let Err(e) = retrying.handle(&event).await {
                        error!(
                            subscription_id = %subscription_id,
                            event_id = %event.id(),
                            event_type = %event.event_type(),
                            error = %e,
                            "error handling event"
                        );
                    }
                });
            }
            Some(joined) = deliveries.join_next(), if !deliveries.is_empty() => {
                log_join_failure(subscription_id, joined);
            }
        }
    }

    while let Some(joined) = deliveries.join_next().await {
        log_join_failure(subscription_id, joined);
    }
    debug!(subscription_id = %subscription_id, "listener stream ended");
}

fn log_join_failure(subscription_id: SubscriptionId, joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            error!(subscription_id = %subscription_id, "event handler panicked");
        }
    }
}
