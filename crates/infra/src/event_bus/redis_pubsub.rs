//! Redis pub/sub transport (optional).
//!
//! Note: Redis pub/sub is not durable (messages are dropped for listeners that
//! are offline at publish time). The bus compensates by appending every event
//! to the durable log.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{future, FutureExt, StreamExt};
use redis::aio::MultiplexedConnection;
use tokio::sync::{watch, Mutex};
use tracing::{debug, instrument, warn};

use edumyles_events::{Connection, MessageStream, Transport, TransportError};

/// Redis-backed [`Transport`].
#[derive(Debug, Clone)]
pub struct RedisTransport {
    client: redis::Client,
}

impl RedisTransport {
    /// Validate `redis_url`; no connection is opened until `connect`.
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, TransportError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for RedisTransport {
    #[instrument(skip(self), err)]
    async fn connect(&self) -> Result<Arc<dyn Connection>, TransportError> {
        let conn = open_commands(&self.client).await?;
        Ok(Arc::new(RedisConnection::new(self.client.clone(), Some(conn))))
    }
}

async fn open_commands(client: &redis::Client) -> Result<MultiplexedConnection, TransportError> {
    client
        .get_multiplexed_tokio_connection()
        .await
        .map_err(|e| TransportError::Connection(e.to_string()))
}

/// One logical connection to Redis.
///
/// The command socket is opened eagerly by `Transport::connect` and lazily on
/// duplicates, which are normally only used to listen. Each `subscribe` opens
/// its own pub/sub socket, closed once the returned stream is dropped.
struct RedisConnection {
    client: redis::Client,
    /// `None` before first use on a duplicate, and after disconnect.
    commands: Mutex<Option<MultiplexedConnection>>,
    open: AtomicBool,
    /// Flipped on disconnect; ends the pub/sub streams opened through this connection.
    closed: watch::Sender<bool>,
}

impl RedisConnection {
    fn new(client: redis::Client, commands: Option<MultiplexedConnection>) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            client,
            commands: Mutex::new(commands),
            open: AtomicBool::new(true),
            closed,
        }
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::Closed)
        }
    }

    /// Command handle; multiplexed connections are cheap to clone.
    async fn command_conn(&self) -> Result<MultiplexedConnection, TransportError> {
        self.ensure_open()?;
        let mut commands = self.commands.lock().await;
        // Re-checked under the lock so a racing disconnect is not undone.
        self.ensure_open()?;
        match commands.as_ref() {
            Some(conn) => Ok(conn.clone()),
            None => {
                let conn = open_commands(&self.client).await?;
                *commands = Some(conn.clone());
                Ok(conn)
            }
        }
    }
}

#[async_trait]
impl Connection for RedisConnection {
    async fn ping(&self) -> Result<(), TransportError> {
        let mut conn = self.command_conn().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| TransportError::Command(format!("PING failed: {e}")))?;
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), TransportError> {
        let mut conn = self.command_conn().await?;
        let receivers: i64 = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(payload)
            .query_async(&mut conn)
            .await
            .map_err(|e| TransportError::Command(format!("PUBLISH failed: {e}")))?;

        debug!(channel = %channel, receivers, "published to redis channel");
        Ok(())
    }

    async fn duplicate(&self) -> Result<Arc<dyn Connection>, TransportError> {
        self.ensure_open()?;
        Ok(Arc::new(RedisConnection::new(self.client.clone(), None)))
    }

    async fn subscribe(&self, channel: &str) -> Result<MessageStream, TransportError> {
        self.ensure_open()?;

        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| TransportError::Command(format!("SUBSCRIBE failed: {e}")))?;

        let mut closed = self.closed.subscribe();
        let until_closed = async move {
            let _ = closed.wait_for(|closed| *closed).await;
        }
        .boxed();

        let channel = channel.to_string();
        let stream = pubsub
            .into_on_message()
            .filter_map(move |msg| {
                future::ready(match msg.get_payload::<String>() {
                    Ok(payload) => Some(payload),
                    Err(e) => {
                        warn!(channel = %channel, error = %e, "dropping non-text pub/sub payload");
                        None
                    }
                })
            })
            .take_until(until_closed)
            .boxed();

        Ok(stream)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        if self.open.swap(false, Ordering::SeqCst) {
            self.closed.send_replace(true);
        }
        // Dropping the last handle closes the command socket.
        self.commands.lock().await.take();
        Ok(())
    }
}
