//! Output configuration, defaults, and validation.
//!
//! Numeric fields keep the signed representation they have in configuration
//! files so that out-of-range values can be reported instead of silently
//! clamped. [`OutputConfig::validate`] must pass before any engine is built.

mod ini_file;

use std::fmt;
use std::time::Duration;

use crate::error::ConfigError;
use crate::message::{MentionTargets, MessageType};
use crate::pool::PooledRequest;
use crate::transport::TransportConfig;

/// Robot API endpoint used when no URL is configured.
pub const DEFAULT_URL: &str = "https://oapi.dingtalk.com/robot/send";
/// Retry hint meaning "retry forever" to the host pipeline.
pub const DEFAULT_MAX_RETRIES: i32 = -1;
pub const DEFAULT_MAX_IDLE_CONNS: i64 = 1;
/// Seconds; zero never expires idle connections.
pub const DEFAULT_IDLE_CONN_TIMEOUT: i64 = 0;
/// Milliseconds.
pub const DEFAULT_RESPONSE_HEADER_TIMEOUT: i64 = 3000;
/// Milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT: i64 = 5000;
pub const DEFAULT_WORKERS: usize = 1;
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Configuration of the robot API output.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputConfig {
    pub url: String,
    pub api_access_token: String,
    /// Passed through to the host pipeline; never enforced here.
    pub max_retries: i32,
    pub compression: bool,
    pub keep_alive: bool,
    pub max_idle_conns: i64,
    /// Seconds.
    pub idle_conn_timeout: i64,
    /// Milliseconds.
    pub response_header_timeout: i64,
    /// Milliseconds.
    pub connect_timeout: i64,
    pub send_msg_type: MessageType,
    pub at: MentionTargets,
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_owned(),
            api_access_token: String::new(),
            max_retries: DEFAULT_MAX_RETRIES,
            compression: false,
            keep_alive: true,
            max_idle_conns: DEFAULT_MAX_IDLE_CONNS,
            idle_conn_timeout: DEFAULT_IDLE_CONN_TIMEOUT,
            response_header_timeout: DEFAULT_RESPONSE_HEADER_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            send_msg_type: MessageType::default(),
            at: MentionTargets::default(),
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl OutputConfig {
    /// Check every invariant required to start an engine.
    pub fn validate(&self) -> Result<(), ConfigError> {
        PooledRequest::new("POST", &self.url).map_err(|err| ConfigError::InvalidUrl {
            url: self.url.clone(),
            reason: err.to_string(),
        })?;
        if self.max_idle_conns < 1 {
            return Err(ConfigError::MaxIdleConns);
        }
        if self.idle_conn_timeout < 0 {
            return Err(ConfigError::IdleConnTimeout);
        }
        if self.response_header_timeout < 1 {
            return Err(ConfigError::ResponseHeaderTimeout);
        }
        if self.api_access_token.is_empty() {
            return Err(ConfigError::EmptyAccessToken);
        }
        if self.connect_timeout < 1 {
            return Err(ConfigError::NotPositive("connect_timeout"));
        }
        if self.workers == 0 {
            return Err(ConfigError::NotPositive("workers"));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::NotPositive("queue_capacity"));
        }
        Ok(())
    }

    /// Transport settings derived from this configuration.
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            max_idle_conns: usize::try_from(self.max_idle_conns).unwrap_or(1),
            idle_conn_timeout: Duration::from_secs(self.idle_conn_timeout.max(0).unsigned_abs()),
            response_header_timeout: Duration::from_millis(
                self.response_header_timeout.max(1).unsigned_abs(),
            ),
            connect_timeout: Duration::from_millis(self.connect_timeout.max(1).unsigned_abs()),
            keep_alive: self.keep_alive,
            compression: self.compression,
        }
    }

    /// Access token with everything past the first four characters hidden.
    pub fn masked_token(&self) -> String {
        let visible: String = self.api_access_token.chars().take(4).collect();
        format!("{visible}***")
    }
}

impl fmt::Display for OutputConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "url={} max_retries={} compression={} keep_alive={} max_idle_conns={} \
             idle_conn_timeout={}s response_header_timeout={}ms connect_timeout={}ms \
             api_access_token={} at={:?} send_msg_type={} workers={}",
            self.url,
            self.max_retries,
            self.compression,
            self.keep_alive,
            self.max_idle_conns,
            self.idle_conn_timeout,
            self.response_header_timeout,
            self.connect_timeout,
            self.masked_token(),
            self.at,
            self.send_msg_type,
            self.workers,
        )
    }
}
