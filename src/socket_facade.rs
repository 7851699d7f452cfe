// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use aio::ctx::{Ctx, CtxOps};
use endpoint_facade::Endpoint;
use global::{SocketId, SocketType};
use message::Message;
use options::SocketOption;
use runtime::Runtime;
use sock;
use io_error::{is_would_block, timedout_io_error};

/// User-facing socket. Send and receive block according to the
/// configured timeouts; the `try_` variants return immediately.
pub struct Socket {
    runtime: Arc<Runtime>,
    id: SocketId,
    socket_type: SocketType,
    ctx: Arc<Ctx>
}

impl Socket {
    #[doc(hidden)]
    pub fn new(runtime: Arc<Runtime>, id: SocketId, socket_type: SocketType, ctx: Arc<Ctx>) -> Socket {
        Socket {
            runtime: runtime,
            id: id,
            socket_type: socket_type,
            ctx: ctx
        }
    }

    pub fn get_socket_type(&self) -> SocketType {
        self.socket_type
    }

    /// Adds a local endpoint to the socket, for other applications to
    /// connect to. The address is `transport://address`; bind and
    /// connect may be called many times on one socket.
    pub fn bind(&mut self, addr: &str) -> io::Result<Endpoint> {
        let eid = self.ctx.with(|ctx, core| sock::add_endpoint(ctx, core, addr, true))?;

        Ok(Endpoint::new(self.ctx.clone(), eid))
    }

    /// Adds a remote endpoint to the socket. The library keeps trying to
    /// get and keep a connection to it from now on.
    pub fn connect(&mut self, addr: &str) -> io::Result<Endpoint> {
        let eid = self.ctx.with(|ctx, core| sock::add_endpoint(ctx, core, addr, false))?;

        Ok(Endpoint::new(self.ctx.clone(), eid))
    }

    pub fn send(&mut self, buffer: Vec<u8>) -> io::Result<()> {
        self.send_msg(Message::with_body(buffer))
    }

    /// Sends a message according to the socket protocol, blocking while
    /// no peer can take it, up to the send timeout.
    pub fn send_msg(&mut self, msg: Message) -> io::Result<()> {
        let (timeout, efd) = self.ctx.with(|_, core| {
            (core.opts.send_timeout, core.send_efd.clone())
        });
        let deadline = timeout.map(|timeout| Instant::now() + timeout);

        loop {
            match self.ctx.with(|_, core| sock::try_send(core, msg.clone())) {
                Ok(()) => return Ok(()),
                Err(ref err) if is_would_block(err) => {},
                Err(err) => return Err(err)
            }
            efd.wait(remaining(deadline)?)?;
        }
    }

    /// Non-blocking send.
    pub fn try_send(&mut self, buffer: Vec<u8>) -> io::Result<()> {
        self.try_send_msg(Message::with_body(buffer))
    }

    pub fn try_send_msg(&mut self, msg: Message) -> io::Result<()> {
        self.ctx.with(|_, core| sock::try_send(core, msg))
    }

    pub fn recv(&mut self) -> io::Result<Vec<u8>> {
        self.recv_msg().map(|msg| msg.to_buffer())
    }

    /// Receives a message according to the socket protocol, blocking
    /// while there is none, up to the receive timeout.
    pub fn recv_msg(&mut self) -> io::Result<Message> {
        let (timeout, efd) = self.ctx.with(|_, core| {
            (core.opts.recv_timeout, core.recv_efd.clone())
        });
        let deadline = timeout.map(|timeout| Instant::now() + timeout);

        loop {
            match self.ctx.with(|_, core| sock::try_recv(core)) {
                Err(ref err) if is_would_block(err) => {},
                other => return other
            }
            efd.wait(remaining(deadline)?)?;
        }
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> io::Result<Vec<u8>> {
        self.try_recv_msg().map(|msg| msg.to_buffer())
    }

    pub fn try_recv_msg(&mut self) -> io::Result<Message> {
        self.ctx.with(|_, core| sock::try_recv(core))
    }

    /// Sets a socket option.
    /// See [SocketOption](enum.SocketOption.html) for the list.
    pub fn set_option(&mut self, option: SocketOption) -> io::Result<()> {
        self.ctx.with(|_, core| sock::set_option(core, option))
    }

    pub fn set_send_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.set_option(SocketOption::SendTimeout(Some(timeout)))
    }

    pub fn set_recv_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.set_option(SocketOption::RecvTimeout(Some(timeout)))
    }

    pub fn set_send_priority(&mut self, priority: u8) -> io::Result<()> {
        self.set_option(SocketOption::SendPriority(priority))
    }

    pub fn set_recv_priority(&mut self, priority: u8) -> io::Result<()> {
        self.set_option(SocketOption::RecvPriority(priority))
    }

    pub fn subscribe(&mut self, topic: &str) -> io::Result<()> {
        self.set_option(SocketOption::Subscribe(topic.to_owned()))
    }

    pub fn unsubscribe(&mut self, topic: &str) -> io::Result<()> {
        self.set_option(SocketOption::Unsubscribe(topic.to_owned()))
    }

    #[doc(hidden)]
    pub fn matches(&self, other: &Socket) -> bool {
        self.socket_type.matches(other.socket_type)
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        self.runtime.close_socket(self.id, &self.ctx);
    }
}

fn remaining(deadline: Option<Instant>) -> io::Result<Option<Duration>> {
    match deadline {
        None => Ok(None),
        Some(deadline) => {
            let now = Instant::now();
            if now >= deadline {
                Err(timedout_io_error("operation timed out"))
            } else {
                Ok(Some(deadline - now))
            }
        }
    }
}
