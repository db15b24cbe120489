//! Tenant-scoped event bus.
//!
//! Modules publish [`NewEvent`]s through a shared [`EventBus`]; the bus stamps
//! them, fans them out on a pub/sub [`Transport`] and appends them to a durable
//! [`EventLog`]. Subscribers register an [`EventHandler`] per event type (or per
//! tenant) and get retries with capped exponential backoff.

pub mod bus;
pub mod channel;
pub mod error;
pub mod event;
pub mod handler;
pub mod in_memory;
pub mod kinds;
pub mod payloads;
pub mod retry;
pub mod store;
pub mod subscription;
pub mod transport;

pub use bus::EventBus;
pub use channel::{event_channel, tenant_channel};
pub use error::BusError;
pub use event::{Event, EventData, EventMetadata, NewEvent};
pub use handler::{handler_fn, EventHandler, HandlerFn, HandlerResult};
pub use in_memory::{InMemoryEventLog, InMemorySubscriptionRegistry, InMemoryTransport};
pub use payloads::EventPayload;
pub use retry::{backoff_delay, Delay, RetryPolicy, RetryingHandler, TokioDelay};
pub use store::{EventLog, EventLogError, EventLogFilter, Pagination, RegistryError, SubscriptionRegistry};
pub use subscription::{EventFilter, SubscriptionOptions, SubscriptionRecord};
pub use transport::{Connection, MessageStream, Transport, TransportError};
