use std::io;
use std::net::{SocketAddr, ToSocketAddrs};

use crate::kind::AddressFamily;

/// Stands in for the `getaddrinfo`/`freeaddrinfo`/`getnameinfo` surface
/// named in the external-interfaces section. The real DNS-SD/mDNS browser
/// is out of scope; `pal-socket::open` only needs *some* resolver to turn
/// `itf_name`/host strings into addresses.
pub trait Resolver: Send + Sync {
    fn resolve(&self, host: &str, port: u16, family: AddressFamily) -> io::Result<Vec<SocketAddr>>;
}

/// Default resolver backed by the standard library's synchronous
/// `getaddrinfo` binding.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdResolver;

impl Resolver for StdResolver {
    fn resolve(&self, host: &str, port: u16, family: AddressFamily) -> io::Result<Vec<SocketAddr>> {
        let addrs: Vec<SocketAddr> = (host, port).to_socket_addrs()?.collect();
        let filtered: Vec<SocketAddr> = match family {
            AddressFamily::Unspecified => addrs,
            AddressFamily::Inet => addrs.into_iter().filter(|a| a.is_ipv4()).collect(),
            AddressFamily::Inet6 => addrs.into_iter().filter(|a| a.is_ipv6()).collect(),
        };
        if filtered.is_empty() {
            return Err(io::Error::new(io::ErrorKind::NotFound, format!("no address for {host}:{port}")));
        }
        Ok(filtered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_loopback_literal() {
        let addrs = StdResolver.resolve("127.0.0.1", 8080, AddressFamily::Unspecified).unwrap();
        assert_eq!(addrs, vec![SocketAddr::from(([127, 0, 0, 1], 8080))]);
    }

    #[test]
    fn filters_by_family() {
        let err = StdResolver.resolve("127.0.0.1", 8080, AddressFamily::Inet6).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
