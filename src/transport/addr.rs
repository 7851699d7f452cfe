// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Textual endpoint address parsing: `scheme://` splitting and the
//! `[iface;]host:port` form shared by the tcp-based transports.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

use io_error::{invalid_input_io_error, no_device_error};

pub fn split_scheme(address: &str) -> io::Result<(&str, &str)> {
    match address.find("://") {
        Some(position) => Ok((&address[..position], &address[position + 3..])),
        None => Err(invalid_input_io_error("missing scheme in address"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TcpHost {
    /// `*`: any local address.
    Any,
    Ip(IpAddr),
    /// A name for the resolver.
    Name(String)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpAddr {
    /// Local interface requested before the `;`.
    pub local: Option<IpAddr>,
    pub host: TcpHost,
    pub port: u16
}

impl TcpAddr {
    /// Address to listen on. Names are not acceptable here.
    pub fn bind_addr(&self, ipv4only: bool) -> io::Result<SocketAddr> {
        let ip = match self.host {
            TcpHost::Any => any_addr(ipv4only),
            TcpHost::Ip(ip) => ip,
            TcpHost::Name(..) => return Err(invalid_input_io_error("cannot bind to a host name"))
        };

        Ok(SocketAddr::new(ip, self.port))
    }

    /// Literal address to connect to, when no resolver round is needed.
    pub fn literal_addr(&self) -> Option<SocketAddr> {
        match self.host {
            TcpHost::Ip(ip) => Some(SocketAddr::new(ip, self.port)),
            _ => None
        }
    }
}

fn any_addr(ipv4only: bool) -> IpAddr {
    if ipv4only {
        IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0))
    } else {
        IpAddr::V6(Ipv6Addr::new(0, 0, 0, 0, 0, 0, 0, 0))
    }
}

/// Parses `[iface;]host[:port]`. The interface part may be `*` or a
/// literal address; device names would need an interface enumeration
/// this library does not do, so they are reported as an unknown device.
pub fn parse_tcp(rest: &str, default_port: Option<u16>) -> io::Result<TcpAddr> {
    let (local, rest) = match rest.find(';') {
        Some(position) => {
            let iface = &rest[..position];
            let local = if iface == "*" {
                None
            } else {
                match IpAddr::from_str(iface) {
                    Ok(ip) => Some(ip),
                    Err(_) => return Err(no_device_error())
                }
            };
            (local, &rest[position + 1..])
        },
        None => (None, rest)
    };

    let (host, port) = match rest.rfind(':') {
        // An ipv6 literal contains colons itself; a lone trailing colon
        // or a colon inside the literal is not a port separator.
        Some(position) if rest[position + 1..].chars().all(|c| c.is_digit(10))
            && !rest[position + 1..].is_empty() => {
            let port = u16::from_str(&rest[position + 1..]).
                map_err(|_| invalid_input_io_error("invalid port number"))?;
            (&rest[..position], port)
        },
        _ => match default_port {
            Some(port) => (rest, port),
            None => return Err(invalid_input_io_error("missing port number"))
        }
    };

    if host.is_empty() {
        return Err(invalid_input_io_error("missing host"));
    }

    let host = if host == "*" {
        TcpHost::Any
    } else {
        match IpAddr::from_str(host.trim_matches(|c| c == '[' || c == ']')) {
            Ok(ip) => TcpHost::Ip(ip),
            Err(_) => TcpHost::Name(host.to_owned())
        }
    };

    Ok(TcpAddr {
        local: local,
        host: host,
        port: port
    })
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use super::*;

    #[test]
    fn scheme_is_split_off() {
        assert_eq!(("tcp", "127.0.0.1:5454"), split_scheme("tcp://127.0.0.1:5454").unwrap());
        assert_eq!(("inproc", "test"), split_scheme("inproc://test").unwrap());
        assert!(split_scheme("no-scheme").is_err());
    }

    #[test]
    fn plain_host_and_port() {
        let addr = parse_tcp("127.0.0.1:5454", None).unwrap();

        assert_eq!(None, addr.local);
        assert_eq!(TcpHost::Ip(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))), addr.host);
        assert_eq!(5454, addr.port);
    }

    #[test]
    fn wildcard_host_binds_any() {
        let addr = parse_tcp("*:5454", None).unwrap();

        assert_eq!(TcpHost::Any, addr.host);
        assert!(addr.bind_addr(true).unwrap().ip().is_unspecified());
    }

    #[test]
    fn interface_part_is_recognized() {
        let addr = parse_tcp("127.0.0.1;192.168.0.1:80", None).unwrap();

        assert_eq!(Some(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))), addr.local);
        assert_eq!(TcpHost::Ip(IpAddr::V4(Ipv4Addr::new(192, 168, 0, 1))), addr.host);
    }

    #[test]
    fn unknown_interface_name_is_reported() {
        assert!(parse_tcp("eth987;1.2.3.4:80", None).is_err());
    }

    #[test]
    fn host_names_are_kept_for_the_resolver() {
        let addr = parse_tcp("example.net:5555", None).unwrap();

        assert_eq!(TcpHost::Name("example.net".to_owned()), addr.host);
        assert_eq!(None, addr.literal_addr());
    }

    #[test]
    fn missing_port_uses_the_default() {
        assert_eq!(80, parse_tcp("example.net", Some(80)).unwrap().port);
        assert!(parse_tcp("example.net", None).is_err());
    }

    #[test]
    fn ipv6_literal_with_port() {
        let addr = parse_tcp("[::1]:5454", None).unwrap();

        assert_eq!(TcpHost::Ip("::1".parse().unwrap()), addr.host);
        assert_eq!(5454, addr.port);
    }
}
