// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! IPC transport: `ipc://path`, an AF_UNIX stream socket. Frames carry
//! the one-byte frame type in front of the length prefix.

use std::io;
use std::path::PathBuf;

use aio::{Addr, EventTarget, Source};
use aio::usock::Usock;
use ep::EpKind;
use transport::{SessionKind, Transport, TransportCtx};
use transport::binding::BindEp;
use transport::connecting::{ConnEp, Remote};

pub struct IpcTransport;

impl Transport for IpcTransport {
    fn scheme(&self) -> &'static str {
        "ipc"
    }

    fn bind(&self, tc: &TransportCtx, rest: &str) -> io::Result<EpKind> {
        let path = PathBuf::from(rest);
        let target = EventTarget::new(tc.ctx, Addr::Ep(tc.eid), Source::Fd);
        let listener = Usock::unix_listen(tc.worker.clone(), target, &path)?;

        Ok(EpKind::Binding(BindEp::new(
            tc,
            format!("ipc://{}", rest),
            listener,
            SessionKind::Stream { prefix_byte: true })))
    }

    fn connect(&self, tc: &TransportCtx, rest: &str) -> io::Result<EpKind> {
        Ok(EpKind::Connecting(ConnEp::new(
            tc,
            format!("ipc://{}", rest),
            Remote::Ipc(PathBuf::from(rest)),
            SessionKind::Stream { prefix_byte: true })))
    }
}
