//! HTTP transport driving pooled requests over the cached dialer.
//!
//! The transport keeps one `ureq::Agent` for connection reuse. The agent
//! resolves through [`CachedDialer`] and is replaced wholesale when idle
//! connections must be dropped (idle expiry or [`Transport::close_idle`]).

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, warn};
use native_tls::TlsConnector;
use parking_lot::Mutex;
use ureq::{Agent, AgentBuilder};

use crate::dialer::CachedDialer;
use crate::error::{BuildError, TransportError};
use crate::pool::PooledRequest;

/// Connection management knobs, validated by
/// [`OutputConfig`](crate::config::OutputConfig) before use.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportConfig {
    pub max_idle_conns: usize,
    /// Zero keeps idle connections forever.
    pub idle_conn_timeout: Duration,
    pub response_header_timeout: Duration,
    pub connect_timeout: Duration,
    pub keep_alive: bool,
    pub compression: bool,
}

/// Outcome of a status code for delivery purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// 200 OK: the robot API accepted the message.
    Delivered,
    /// Anything else.
    Rejected,
}

pub(crate) fn classify_status(status: u16) -> ResponseClass {
    match status {
        200 => ResponseClass::Delivered,
        _ => ResponseClass::Rejected,
    }
}

/// Accepted response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    pub status: u16,
    pub body: String,
}

struct AgentSlot {
    agent: Agent,
    last_used: Instant,
}

pub struct Transport {
    config: TransportConfig,
    dialer: CachedDialer,
    tls: Arc<TlsConnector>,
    slot: Mutex<AgentSlot>,
}

impl Transport {
    /// Build the transport and its first agent.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Tls`] if the platform TLS connector cannot be
    /// initialised.
    pub fn new(config: TransportConfig, dialer: CachedDialer) -> Result<Self, BuildError> {
        let tls = Arc::new(TlsConnector::new()?);
        let agent = build_agent(&config, &dialer, &tls);
        Ok(Self {
            config,
            dialer,
            tls,
            slot: Mutex::new(AgentSlot {
                agent,
                last_used: Instant::now(),
            }),
        })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    fn fresh_agent(&self) -> Agent {
        build_agent(&self.config, &self.dialer, &self.tls)
    }

    fn agent(&self) -> Agent {
        let mut slot = self.slot.lock();
        let idle_for = slot.last_used.elapsed();
        let timeout = self.config.idle_conn_timeout;
        if !timeout.is_zero() && idle_for > timeout {
            debug!("Transport idle for {idle_for:?}; dropping pooled connections");
            slot.agent = self.fresh_agent();
        }
        slot.agent.clone()
    }

    fn touch(&self) {
        self.slot.lock().last_used = Instant::now();
    }

    /// Drop every pooled idle connection.
    pub fn close_idle(&self) {
        let agent = self.fresh_agent();
        self.slot.lock().agent = agent;
    }

    /// Send `req` and classify the response.
    ///
    /// The response body is always read to completion so the connection can
    /// return to the agent's pool.
    ///
    /// # Errors
    ///
    /// [`TransportError::Request`] for connection, lookup, and timeout
    /// failures; [`TransportError::BadStatus`] for any status other than 200.
    pub fn send(&self, req: &PooledRequest) -> Result<Delivery, TransportError> {
        let agent = self.agent();
        let mut request = agent.request(req.method(), &req.url());
        for (name, value) in req.headers() {
            request = request.set(name, value);
        }
        if !self.config.compression {
            request = request.set("Accept-Encoding", "identity");
        }
        if !self.config.keep_alive {
            request = request.set("Connection", "close");
        }

        let result = request.send_bytes(req.body());
        self.touch();
        let response = match result {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(ureq::Error::Transport(err)) => return Err(TransportError::Request(Box::new(err))),
        };

        let status = response.status();
        let body = response.into_string().unwrap_or_else(|err| {
            warn!("Read response result error: {err}");
            String::new()
        });
        match classify_status(status) {
            ResponseClass::Delivered => Ok(Delivery { status, body }),
            ResponseClass::Rejected => Err(TransportError::BadStatus { status, body }),
        }
    }
}

fn build_agent(config: &TransportConfig, dialer: &CachedDialer, tls: &Arc<TlsConnector>) -> Agent {
    let idle = if config.keep_alive {
        config.max_idle_conns
    } else {
        0
    };
    AgentBuilder::new()
        .resolver(dialer.clone())
        .tls_connector(tls.clone())
        .timeout_connect(config.connect_timeout)
        .timeout_read(config.response_header_timeout)
        .max_idle_connections(idle)
        .max_idle_connections_per_host(idle)
        .build()
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("config", &self.config)
            .field("dialer", &self.dialer)
            .finish()
    }
}
