// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Name resolution as a worker task. The lookup itself runs on the worker
//! thread when the task event comes back, so the endpoint never blocks a
//! user thread on the resolver.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;

use aio::{Event, EventTarget};
use aio::worker::Worker;

use io_error::invalid_input_io_error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Resolving,
    Stopping
}

pub enum DnsOut {
    Done(io::Result<Vec<SocketAddr>>),
    Stopped
}

pub struct Dns {
    state: State,
    host: String,
    port: u16,
    ipv4only: bool,
    worker: Arc<Worker>,
    target: EventTarget
}

impl Dns {
    pub fn new(worker: Arc<Worker>, target: EventTarget) -> Dns {
        Dns {
            state: State::Idle,
            host: String::new(),
            port: 0,
            ipv4only: true,
            worker: worker,
            target: target
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state == State::Idle
    }

    pub fn start(&mut self, host: &str, port: u16, ipv4only: bool) {
        assert_eq!(State::Idle, self.state, "resolver started while running");

        self.host = host.to_owned();
        self.port = port;
        self.ipv4only = ipv4only;
        self.state = State::Resolving;
        self.worker.execute(self.target.clone(), Event::Execute, 0);
    }

    pub fn stop(&mut self) {
        if self.state == State::Resolving {
            // The pending task event becomes the stop acknowledgement.
            self.state = State::Stopping;
        }
    }

    pub fn feed(&mut self, event: Event) -> Option<DnsOut> {
        match (self.state, event) {
            (State::Resolving, Event::Execute) => {
                self.state = State::Idle;
                Some(DnsOut::Done(self.resolve()))
            },
            (State::Stopping, Event::Execute) => {
                self.state = State::Idle;
                Some(DnsOut::Stopped)
            },
            (state, event) => bad_event!("dns", state, self.target.src, event)
        }
    }

    fn resolve(&self) -> io::Result<Vec<SocketAddr>> {
        let ipv4only = self.ipv4only;
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port).
            to_socket_addrs()?.
            filter(|addr| !ipv4only || addr.is_ipv4()).
            collect();

        if addrs.is_empty() {
            Err(invalid_input_io_error("no address found for host"))
        } else {
            Ok(addrs)
        }
    }
}
