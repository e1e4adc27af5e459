//! Error types shared across the output.
//!
//! Only [`BuildError`] is ever returned to the host as a failure. Everything
//! raised while publishing is folded into an acknowledge or retry decision by
//! [`PublishEngine`](crate::engine::PublishEngine).

use std::io;

use thiserror::Error;

/// Invalid or unreadable output configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("api_access_token can't be empty")]
    EmptyAccessToken,
    #[error("max_idle_conns can't be <1")]
    MaxIdleConns,
    #[error("idle_conn_timeout can't be <0")]
    IdleConnTimeout,
    #[error("response_header_timeout can't be <1")]
    ResponseHeaderTimeout,
    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),
    #[error("unsupported send_msg_type {0:?}")]
    UnsupportedMessageType(String),
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },
    #[error("section [{0}] not found")]
    MissingSection(String),
    #[error("unknown encoding {0}")]
    UnknownEncoding(String),
    #[error("failed to decode {path} as {encoding}")]
    Decode { path: String, encoding: String },
    #[error("failed to parse ini: {0}")]
    Ini(#[from] ini::ParseError),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Event could not be turned into a wire payload.
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("event has no {0:?} field")]
    MissingField(String),
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Delivery of a serialised payload failed.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] Box<ureq::Transport>),
    #[error("bad response code: {status}")]
    BadStatus { status: u16, body: String },
}

/// Request template construction failed.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("invalid request template for {url:?}: {reason}")]
    InvalidTemplate { url: String, reason: String },
}

/// Connection establishment through the cached dialer failed.
#[derive(Debug, Error)]
pub enum DialError {
    #[error("invalid address {0:?}")]
    InvalidAddress(String),
    #[error("lookup {host} failed: {source}")]
    Lookup {
        host: String,
        #[source]
        source: io::Error,
    },
    #[error("no addresses for {0}")]
    NoAddresses(String),
    #[error("dial failed: {0}")]
    Connect(#[source] io::Error),
}

impl From<DialError> for io::Error {
    fn from(err: DialError) -> Self {
        match err {
            DialError::Connect(source) => source,
            DialError::Lookup { source, .. } => source,
            other => io::Error::new(io::ErrorKind::NotFound, other.to_string()),
        }
    }
}

/// Any failure that aborts the delivery of one event.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Serialization(#[from] SerializationError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors surfaced while constructing an engine or output group.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid output configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to initialise tls: {0}")]
    Tls(#[from] native_tls::Error),
    #[error("failed to spawn output worker: {0}")]
    Spawn(#[source] io::Error),
}

/// A batch could not be handed to an output worker.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("output worker queue is full")]
    QueueFull,
    #[error("output worker has shut down")]
    Closed,
}
