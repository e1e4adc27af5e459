//! Batch publishing against the robot API.
//!
//! [`PublishEngine::publish`] serialises and sends the events of a batch one
//! at a time, in order. The first failure of any kind aborts the batch and
//! hands every event back to the pipeline for retry, including events that
//! were already delivered. The batch is acknowledged only when all events
//! were sent.

use std::fmt;
use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::batch::Batch;
use crate::config::OutputConfig;
use crate::dialer::CachedDialer;
use crate::error::{BuildError, DeliveryError, TransportError};
use crate::event::Event;
use crate::message::MessageSerializer;
use crate::observer::Observer;
use crate::pool::RequestPool;
use crate::resolver::Resolver;
use crate::transport::Transport;
use crate::url_encoding::query_escape;

const CONTENT_TYPE: &str = "application/json";
const ACCESS_TOKEN_PARAM: &str = "access_token";

/// Identity of the sending process, reported in `User-Agent`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SenderInfo {
    pub product: String,
    pub version: String,
}

impl SenderInfo {
    pub fn new(product: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            product: product.into(),
            version: version.into(),
        }
    }

    pub fn user_agent(&self) -> String {
        format!("{} {}", self.product, self.version)
    }
}

impl Default for SenderInfo {
    fn default() -> Self {
        Self::new("beat", env!("CARGO_PKG_VERSION"))
    }
}

/// Decision taken for a published batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The batch had no events and was acknowledged.
    Empty,
    /// Every event was delivered; the batch was acknowledged.
    Acked(usize),
    /// Delivery stopped at the first failure; every event was retried.
    Retried(usize),
}

pub struct PublishEngine {
    url: String,
    access_token: String,
    masked_token: String,
    user_agent: String,
    max_retries: i32,
    serializer: MessageSerializer,
    pool: RequestPool,
    transport: Transport,
    observer: Arc<dyn Observer>,
}

impl PublishEngine {
    /// Validate `config` and build the engine with its own transport and
    /// request pool.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] when the configuration is invalid or TLS cannot
    /// be initialised.
    pub fn new(
        config: &OutputConfig,
        sender: &SenderInfo,
        resolver: Arc<dyn Resolver>,
        observer: Arc<dyn Observer>,
    ) -> Result<Self, BuildError> {
        config.validate()?;
        let transport_config = config.transport_config();
        let dialer = CachedDialer::new(resolver, transport_config.connect_timeout);
        let transport = Transport::new(transport_config, dialer)?;
        let engine = Self {
            url: config.url.clone(),
            access_token: config.api_access_token.clone(),
            masked_token: config.masked_token(),
            user_agent: sender.user_agent(),
            max_retries: config.max_retries,
            serializer: MessageSerializer::new(config.send_msg_type, config.at.clone()),
            pool: RequestPool::new("POST", config.url.clone()),
            transport,
            observer,
        };
        info!("Initialized dingTalk robot api output: {config}");
        Ok(engine)
    }

    /// Retry hint for the host pipeline.
    pub fn max_retries(&self) -> i32 {
        self.max_retries
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn pool(&self) -> &RequestPool {
        &self.pool
    }

    /// Publish `batch`, then acknowledge or retry it as a whole.
    ///
    /// Failures never escape: they are logged, reported to the observer, and
    /// turned into a retry of the entire batch.
    pub fn publish(&self, batch: &mut dyn Batch) -> PublishOutcome {
        let count = batch.events().len();
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!("publish", events = count).entered();

        self.observer.new_batch(count);
        if count == 0 {
            batch.acknowledge();
            return PublishOutcome::Empty;
        }

        let failed = batch.events().iter().any(|event| match self.deliver(event) {
            Ok(()) => false,
            Err(err) => {
                self.log_failure(event, &err);
                true
            }
        });

        if failed {
            let events = batch.events().to_vec();
            batch.retry_all(events);
            self.observer.failed(count);
            return PublishOutcome::Retried(count);
        }

        batch.acknowledge();
        self.observer.acked(count);
        PublishOutcome::Acked(count)
    }

    fn deliver(&self, event: &Event) -> Result<(), DeliveryError> {
        let payload = self.serializer.serialise(event)?;
        if let Err(err) = self.send(&payload) {
            self.observer.write_error(&err);
            return Err(err);
        }
        self.observer.write_bytes(payload.len());
        Ok(())
    }

    fn send(&self, payload: &[u8]) -> Result<(), DeliveryError> {
        let mut req = self.pool.checkout_guard()?;
        req.reset();
        req.set_body(payload);
        req.set_header("Content-Type", CONTENT_TYPE);
        req.set_header("User-Agent", &self.user_agent);
        req.set_query_param(ACCESS_TOKEN_PARAM, &self.access_token);

        match self.transport.send(req.request()) {
            Ok(delivery) => {
                log_response_body(&delivery.body);
                Ok(())
            }
            Err(err) => {
                if let TransportError::BadStatus { body, .. } = &err {
                    log_response_body(body);
                }
                Err(err.into())
            }
        }
    }

    /// Transport errors render the request URL; hide the token in it.
    fn redact(&self, text: String) -> String {
        let escaped = query_escape(&self.access_token);
        text.replace(&escaped, &self.masked_token)
            .replace(&self.access_token, &self.masked_token)
    }

    fn log_failure(&self, event: &Event, err: &DeliveryError) {
        let context = match err {
            DeliveryError::Serialization(_) => "Failed to serialize the event",
            DeliveryError::Pool(_) | DeliveryError::Transport(_) => {
                "Writing event to dingTalk robot api failed with"
            }
        };
        let message = self.redact(err.to_string());
        if event.is_guaranteed() {
            error!("{context}: {message}");
        } else {
            warn!("{context}: {message}");
        }
        debug!("Failed event: {event:?}");
    }

    /// Drop idle pooled connections.
    pub fn close(&self) {
        self.transport.close_idle();
    }
}

fn log_response_body(body: &str) {
    if !body.is_empty() {
        info!("{body}");
    }
}


impl fmt::Display for PublishEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dingTalkApi({})", self.url)
    }
}

impl fmt::Debug for PublishEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishEngine")
            .field("url", &self.url)
            .field("user_agent", &self.user_agent)
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}
