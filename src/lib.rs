//! DingTalk robot webhook output.
//!
//! Events are serialised into robot API messages and delivered one request
//! per event over a pooled HTTP(S) transport. A batch is acknowledged only
//! when every event was delivered; the first failure hands the whole batch
//! back to the pipeline for retry.

pub mod batch;
pub mod builder;
pub mod config;
pub mod dialer;
pub mod engine;
pub mod error;
pub mod event;
pub mod message;
pub mod observer;
pub mod pool;
pub mod rate_limited_warner;
pub mod resolver;
pub mod transport;
mod url_encoding;
pub mod worker;

pub use batch::Batch;
pub use builder::OutputBuilder;
pub use config::OutputConfig;
pub use dialer::CachedDialer;
pub use engine::{PublishEngine, PublishOutcome, SenderInfo};
pub use error::{
    BuildError, ConfigError, DeliveryError, DialError, EnqueueError, PoolError,
    SerializationError, TransportError,
};
pub use event::{Event, FieldValue, MESSAGE_FIELD};
pub use message::{MentionTargets, MessageSerializer, MessageType};
pub use observer::{CountingObserver, NullObserver, Observer, ObserverSnapshot};
pub use pool::{Checkout, PooledRequest, RequestPool};
pub use resolver::{Resolver, StaticResolver, SystemResolver, system_resolver};
pub use transport::{Delivery, ResponseClass, Transport, TransportConfig};
pub use worker::OutputGroup;
