//! Hostname lookup consumed by the dialer.
//!
//! The output never caches addresses itself. Callers that want DNS caching
//! plug a caching [`Resolver`] in; the same instance is typically shared by
//! every engine in the process.

use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, ToSocketAddrs};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

/// Resolves a hostname to candidate addresses, in preference order.
pub trait Resolver: Send + Sync {
    fn lookup_host(&self, host: &str) -> io::Result<Vec<IpAddr>>;
}

impl<R: Resolver + ?Sized> Resolver for Arc<R> {
    fn lookup_host(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        (**self).lookup_host(host)
    }
}

/// Resolver backed by the operating system's lookup.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemResolver;

impl Resolver for SystemResolver {
    fn lookup_host(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        let mut ips = Vec::new();
        for addr in (host, 0).to_socket_addrs()? {
            if !ips.contains(&addr.ip()) {
                ips.push(addr.ip());
            }
        }
        Ok(ips)
    }
}

static SHARED_SYSTEM_RESOLVER: Lazy<Arc<SystemResolver>> = Lazy::new(|| Arc::new(SystemResolver));

/// Process-wide [`SystemResolver`] handle.
pub fn system_resolver() -> Arc<dyn Resolver> {
    SHARED_SYSTEM_RESOLVER.clone()
}

/// Fixed hostname table. Unknown hosts fail with [`io::ErrorKind::NotFound`].
#[derive(Debug, Default)]
pub struct StaticResolver {
    hosts: RwLock<HashMap<String, Vec<IpAddr>>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with_host(self, host: impl Into<String>, ips: Vec<IpAddr>) -> Self {
        self.insert(host, ips);
        self
    }

    /// Replace the addresses returned for `host`.
    pub fn insert(&self, host: impl Into<String>, ips: Vec<IpAddr>) {
        self.hosts.write().insert(host.into().to_ascii_lowercase(), ips);
    }
}

impl Resolver for StaticResolver {
    fn lookup_host(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        self.hosts
            .read()
            .get(&host.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no such host {host}")))
    }
}
