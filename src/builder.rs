//! Fluent construction of engines and output groups.
//!
//! [`OutputBuilder`] collects overrides on top of [`OutputConfig`] defaults,
//! validates them, and wires in the resolver, observer, and sender identity.

use std::fmt;
use std::sync::Arc;

use crate::config::OutputConfig;
use crate::engine::{PublishEngine, SenderInfo};
use crate::error::{BuildError, ConfigError};
use crate::message::MessageType;
use crate::observer::{NullObserver, Observer};
use crate::resolver::{Resolver, system_resolver};
use crate::worker::OutputGroup;

macro_rules! option_setter {
    ($(#[$meta:meta])* $fn_name:ident, $field:ident, $ty:ty) => {
        $(#[$meta])*
        pub fn $fn_name(mut self, value: $ty) -> Self {
            self.$field = Some(value);
            self
        }
    };
}

/// Builder for [`PublishEngine`] and [`OutputGroup`].
#[derive(Clone, Default)]
pub struct OutputBuilder {
    url: Option<String>,
    access_token: Option<String>,
    max_retries: Option<i32>,
    compression: Option<bool>,
    keep_alive: Option<bool>,
    max_idle_conns: Option<i64>,
    idle_conn_timeout_secs: Option<i64>,
    response_header_timeout_ms: Option<i64>,
    connect_timeout_ms: Option<i64>,
    message_type: Option<String>,
    mobiles: Vec<String>,
    user_ids: Vec<String>,
    at_all: bool,
    workers: Option<usize>,
    queue_capacity: Option<usize>,
    sender: Option<SenderInfo>,
    resolver: Option<Arc<dyn Resolver>>,
    observer: Option<Arc<dyn Observer>>,
}

impl OutputBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the robot API URL. Defaults to the public DingTalk endpoint.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the access token sent as the `access_token` query parameter.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    option_setter!(
        #[doc = "Set the retry hint passed to the pipeline."]
        with_max_retries,
        max_retries,
        i32
    );
    option_setter!(
        #[doc = "Request compressed responses."]
        with_compression,
        compression,
        bool
    );
    option_setter!(
        #[doc = "Enable or disable connection reuse."]
        with_keep_alive,
        keep_alive,
        bool
    );
    option_setter!(
        #[doc = "Set the idle connection cap."]
        with_max_idle_conns,
        max_idle_conns,
        i64
    );
    option_setter!(
        #[doc = "Set the idle connection timeout in seconds."]
        with_idle_conn_timeout_secs,
        idle_conn_timeout_secs,
        i64
    );
    option_setter!(
        #[doc = "Set the response header timeout in milliseconds."]
        with_response_header_timeout_ms,
        response_header_timeout_ms,
        i64
    );
    option_setter!(
        #[doc = "Set the connect timeout in milliseconds."]
        with_connect_timeout_ms,
        connect_timeout_ms,
        i64
    );
    option_setter!(
        #[doc = "Set the number of output workers."]
        with_workers,
        workers,
        usize
    );
    option_setter!(
        #[doc = "Set the bounded queue capacity of each worker."]
        with_queue_capacity,
        queue_capacity,
        usize
    );
    option_setter!(
        #[doc = "Identify the sender in `User-Agent`."]
        with_sender,
        sender,
        SenderInfo
    );
    option_setter!(
        #[doc = "Resolve hosts through `resolver` instead of the system resolver."]
        with_resolver,
        resolver,
        Arc<dyn Resolver>
    );
    option_setter!(
        #[doc = "Report outcome counters to `observer`."]
        with_observer,
        observer,
        Arc<dyn Observer>
    );

    /// Select the message type by name (`text`).
    pub fn with_message_type(mut self, name: impl Into<String>) -> Self {
        self.message_type = Some(name.into());
        self
    }

    /// Mention the given mobiles in every message.
    pub fn with_mobiles<I, S>(mut self, mobiles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mobiles = mobiles.into_iter().map(Into::into).collect();
        self
    }

    /// Mention the given user ids in every message.
    pub fn with_user_ids<I, S>(mut self, user_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.user_ids = user_ids.into_iter().map(Into::into).collect();
        self
    }

    /// Mention everyone. Only honoured alongside explicit mobiles or user ids.
    pub fn with_at_all(mut self, at_all: bool) -> Self {
        self.at_all = at_all;
        self
    }

    /// Produce a validated [`OutputConfig`].
    pub fn build_config(&self) -> Result<OutputConfig, ConfigError> {
        let defaults = OutputConfig::default();
        let send_msg_type = match &self.message_type {
            Some(name) => name.parse()?,
            None => MessageType::default(),
        };
        let mut config = OutputConfig {
            url: self.url.clone().unwrap_or(defaults.url),
            api_access_token: self.access_token.clone().unwrap_or_default(),
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            compression: self.compression.unwrap_or(defaults.compression),
            keep_alive: self.keep_alive.unwrap_or(defaults.keep_alive),
            max_idle_conns: self.max_idle_conns.unwrap_or(defaults.max_idle_conns),
            idle_conn_timeout: self
                .idle_conn_timeout_secs
                .unwrap_or(defaults.idle_conn_timeout),
            response_header_timeout: self
                .response_header_timeout_ms
                .unwrap_or(defaults.response_header_timeout),
            connect_timeout: self.connect_timeout_ms.unwrap_or(defaults.connect_timeout),
            send_msg_type,
            at: defaults.at,
            workers: self.workers.unwrap_or(defaults.workers),
            queue_capacity: self.queue_capacity.unwrap_or(defaults.queue_capacity),
        };
        config.at.mobiles = self.mobiles.clone();
        config.at.user_ids = self.user_ids.clone();
        config.at.all = self.at_all;
        config.validate()?;
        Ok(config)
    }

    fn parts(&self) -> (SenderInfo, Arc<dyn Resolver>, Arc<dyn Observer>) {
        (
            self.sender.clone().unwrap_or_default(),
            self.resolver.clone().unwrap_or_else(system_resolver),
            self.observer
                .clone()
                .unwrap_or_else(|| Arc::new(NullObserver)),
        )
    }

    /// Build a single engine for synchronous publishing.
    pub fn build_engine(&self) -> Result<PublishEngine, BuildError> {
        let config = self.build_config()?;
        let (sender, resolver, observer) = self.parts();
        PublishEngine::new(&config, &sender, resolver, observer)
    }

    /// Build an output group with the configured number of workers.
    pub fn build_group(&self) -> Result<OutputGroup, BuildError> {
        let config = self.build_config()?;
        let (sender, resolver, observer) = self.parts();
        OutputGroup::new(&config, &sender, resolver, observer)
    }
}

impl fmt::Debug for OutputBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputBuilder")
            .field("url", &self.url)
            .field("workers", &self.workers)
            .field("message_type", &self.message_type)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn builds_config_from_overrides() {
        let config = OutputBuilder::new()
            .with_url("https://robot.example/send")
            .with_access_token("abc")
            .with_max_idle_conns(3)
            .with_keep_alive(false)
            .with_mobiles(["13800000000"])
            .with_at_all(true)
            .build_config()
            .expect("valid");
        assert_eq!(config.url, "https://robot.example/send");
        assert_eq!(config.max_idle_conns, 3);
        assert!(!config.keep_alive);
        assert_eq!(config.at.mobiles, vec!["13800000000"]);
        assert!(config.at.all);
        assert_eq!(config.max_retries, -1);
    }

    #[rstest]
    #[case::no_token(OutputBuilder::new(), "api_access_token")]
    #[case::header_timeout(
        OutputBuilder::new().with_access_token("t").with_response_header_timeout_ms(0),
        "response_header_timeout"
    )]
    #[case::message_type(
        OutputBuilder::new().with_access_token("t").with_message_type("markdown"),
        "markdown"
    )]
    #[case::workers(OutputBuilder::new().with_access_token("t").with_workers(0), "workers")]
    fn rejects_invalid_overrides(#[case] builder: OutputBuilder, #[case] fragment: &str) {
        let err = builder.build_config().expect_err("invalid");
        assert!(err.to_string().contains(fragment), "{err}");
    }
}
