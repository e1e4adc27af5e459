//! DNS-cache-aware dialer.
//!
//! [`CachedDialer`] resolves hosts through an injected [`Resolver`] and tries
//! the returned addresses strictly in order, one at a time. The HTTP agent
//! consumes it through [`ureq::Resolver`], which applies the same sequential
//! connect policy to the addresses handed back.

use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use log::debug;

use crate::error::DialError;
use crate::resolver::Resolver;

/// Split `host:port`, accepting bracketed IPv6 hosts.
pub(crate) fn split_host_port(netloc: &str) -> Result<(&str, u16), DialError> {
    let invalid = || DialError::InvalidAddress(netloc.to_owned());
    let (host, port) = if let Some(rest) = netloc.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
        (host, tail.strip_prefix(':').ok_or_else(invalid)?)
    } else {
        let (host, port) = netloc.rsplit_once(':').ok_or_else(invalid)?;
        if host.contains(':') {
            return Err(invalid());
        }
        (host, port)
    };
    let port = port.parse::<u16>().map_err(|_| invalid())?;
    Ok((host, port))
}

/// Dialer resolving through a shared [`Resolver`].
#[derive(Clone)]
pub struct CachedDialer {
    resolver: Arc<dyn Resolver>,
    connect_timeout: Duration,
}

impl CachedDialer {
    pub fn new(resolver: Arc<dyn Resolver>, connect_timeout: Duration) -> Self {
        Self {
            resolver,
            connect_timeout,
        }
    }

    fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, DialError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }
        self.resolver
            .lookup_host(host)
            .map_err(|source| DialError::Lookup {
                host: host.to_owned(),
                source,
            })
    }

    /// Resolve `netloc` into socket addresses, preserving resolver order.
    ///
    /// # Errors
    ///
    /// Fails when the address is malformed, the lookup fails, or the lookup
    /// returns no addresses.
    pub fn socket_addrs(&self, netloc: &str) -> Result<Vec<SocketAddr>, DialError> {
        let (host, port) = split_host_port(netloc)?;
        let addrs: Vec<SocketAddr> = self
            .lookup(host)?
            .into_iter()
            .map(|ip| SocketAddr::new(ip, port))
            .collect();
        if addrs.is_empty() {
            return Err(DialError::NoAddresses(host.to_owned()));
        }
        Ok(addrs)
    }

    /// Connect to the first reachable candidate for `netloc`.
    ///
    /// Per-candidate failures are skipped; only the last one is reported.
    pub fn dial(&self, netloc: &str) -> Result<TcpStream, DialError> {
        let mut last_err = None;
        for addr in self.socket_addrs(netloc)? {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => return Ok(stream),
                Err(err) => {
                    debug!("CachedDialer: connect to {addr} failed: {err}");
                    last_err = Some(err);
                }
            }
        }
        Err(DialError::Connect(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, "no candidate attempted")
        })))
    }
}

impl ureq::Resolver for CachedDialer {
    fn resolve(&self, netloc: &str) -> io::Result<Vec<SocketAddr>> {
        self.socket_addrs(netloc).map_err(io::Error::from)
    }
}

impl fmt::Debug for CachedDialer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedDialer")
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::StaticResolver;
    use rstest::rstest;
    use std::net::{Ipv4Addr, Ipv6Addr, TcpListener};

    fn dialer(resolver: StaticResolver) -> CachedDialer {
        CachedDialer::new(Arc::new(resolver), Duration::from_millis(500))
    }

    #[rstest]
    #[case("robot.example:443", "robot.example", 443)]
    #[case("[::1]:8080", "::1", 8080)]
    #[case("10.0.0.1:80", "10.0.0.1", 80)]
    fn splits_host_and_port(#[case] netloc: &str, #[case] host: &str, #[case] port: u16) {
        assert_eq!(split_host_port(netloc).expect("valid"), (host, port));
    }

    #[rstest]
    #[case("robot.example")]
    #[case("robot.example:http")]
    #[case("::1:80")]
    #[case("[::1]80")]
    fn rejects_malformed_addresses(#[case] netloc: &str) {
        let err = split_host_port(netloc).expect_err("malformed");
        assert!(matches!(err, DialError::InvalidAddress(_)));
        assert_eq!(err.to_string(), format!("invalid address {netloc:?}"));
    }

    #[rstest]
    fn skips_unreachable_candidates() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let resolver = StaticResolver::new().with_host(
            "robot.test",
            vec![
                IpAddr::V6(Ipv6Addr::LOCALHOST),
                IpAddr::V4(Ipv4Addr::LOCALHOST),
            ],
        );

        let stream = dialer(resolver)
            .dial(&format!("robot.test:{port}"))
            .expect("second candidate reachable");
        assert_eq!(
            stream.peer_addr().expect("peer"),
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
        );
    }

    #[rstest]
    fn empty_lookup_fails_without_connecting() {
        let resolver = StaticResolver::new().with_host("robot.test", Vec::new());
        let err = dialer(resolver).dial("robot.test:80").expect_err("no addresses");
        assert!(matches!(err, DialError::NoAddresses(ref h) if h == "robot.test"));
    }

    #[rstest]
    fn lookup_failure_is_fatal() {
        let err = dialer(StaticResolver::new())
            .dial("unknown.test:80")
            .expect_err("lookup fails");
        assert!(matches!(err, DialError::Lookup { .. }));
    }

    #[rstest]
    fn reports_last_connect_error() {
        let port = {
            let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind");
            listener.local_addr().expect("addr").port()
        };
        let resolver = StaticResolver::new()
            .with_host("robot.test", vec![IpAddr::V4(Ipv4Addr::LOCALHOST)]);
        let err = dialer(resolver)
            .dial(&format!("robot.test:{port}"))
            .expect_err("port closed");
        assert!(matches!(err, DialError::Connect(_)));
    }

    #[rstest]
    fn ip_literals_bypass_the_resolver() {
        let addrs = dialer(StaticResolver::new())
            .socket_addrs("127.0.0.1:9")
            .expect("literal");
        assert_eq!(addrs, vec![SocketAddr::from((Ipv4Addr::LOCALHOST, 9))]);
    }
}
