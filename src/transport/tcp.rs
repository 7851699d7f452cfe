// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! TCP transport: `tcp://[iface;]host:port`.

use std::io;

use aio::{Addr, EventTarget, Source};
use aio::usock::Usock;
use ep::EpKind;
use transport::{SessionKind, Transport, TransportCtx};
use transport::addr::parse_tcp;
use transport::binding::BindEp;
use transport::connecting::{ConnEp, Remote};

pub struct TcpTransport;

impl Transport for TcpTransport {
    fn scheme(&self) -> &'static str {
        "tcp"
    }

    fn bind(&self, tc: &TransportCtx, rest: &str) -> io::Result<EpKind> {
        let parsed = parse_tcp(rest, None)?;
        let bind_addr = parsed.bind_addr(tc.opts.ipv4only)?;
        let target = EventTarget::new(tc.ctx, Addr::Ep(tc.eid), Source::Fd);
        let listener = Usock::tcp_listen(tc.worker.clone(), target, &bind_addr)?;

        Ok(EpKind::Binding(BindEp::new(
            tc,
            format!("tcp://{}", rest),
            listener,
            SessionKind::Stream { prefix_byte: false })))
    }

    fn connect(&self, tc: &TransportCtx, rest: &str) -> io::Result<EpKind> {
        let parsed = parse_tcp(rest, None)?;

        Ok(EpKind::Connecting(ConnEp::new(
            tc,
            format!("tcp://{}", rest),
            Remote::Tcp(parsed),
            SessionKind::Stream { prefix_byte: false })))
    }
}
