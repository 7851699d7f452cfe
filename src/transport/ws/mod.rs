// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! WebSocket transport: `ws://[iface;]host[:port]/path`, port 80 when
//! omitted. The SP subprotocol travels in the upgrade handshake instead
//! of the binary preamble.

pub mod handshake;
pub mod sws;

use std::io;

use aio::{Addr, EventTarget, Source};
use aio::usock::Usock;
use ep::EpKind;
use transport::{SessionKind, Transport, TransportCtx};
use transport::addr::parse_tcp;
use transport::binding::BindEp;
use transport::connecting::{ConnEp, Remote};

const DEFAULT_PORT: u16 = 80;

pub struct WsTransport;

fn split_path(rest: &str) -> (&str, String) {
    match rest.find('/') {
        Some(position) => (&rest[..position], rest[position..].to_owned()),
        None => (rest, "/".to_owned())
    }
}

impl Transport for WsTransport {
    fn scheme(&self) -> &'static str {
        "ws"
    }

    fn bind(&self, tc: &TransportCtx, rest: &str) -> io::Result<EpKind> {
        let (hostpart, path) = split_path(rest);
        let parsed = parse_tcp(hostpart, Some(DEFAULT_PORT))?;
        let bind_addr = parsed.bind_addr(tc.opts.ipv4only)?;
        let target = EventTarget::new(tc.ctx, Addr::Ep(tc.eid), Source::Fd);
        let listener = Usock::tcp_listen(tc.worker.clone(), target, &bind_addr)?;

        Ok(EpKind::Binding(BindEp::new(
            tc,
            format!("ws://{}", rest),
            listener,
            SessionKind::Ws {
                client: false,
                host: hostpart.to_owned(),
                path: path
            })))
    }

    fn connect(&self, tc: &TransportCtx, rest: &str) -> io::Result<EpKind> {
        let (hostpart, path) = split_path(rest);
        let parsed = parse_tcp(hostpart, Some(DEFAULT_PORT))?;

        Ok(EpKind::Connecting(ConnEp::new(
            tc,
            format!("ws://{}", rest),
            Remote::Tcp(parsed),
            SessionKind::Ws {
                client: true,
                host: hostpart.to_owned(),
                path: path
            })))
    }
}
