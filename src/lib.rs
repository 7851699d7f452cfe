// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Brokerless scalability-protocols messaging library.
//!
//! Applications create SP sockets through a [Session](struct.Session.html),
//! bind or connect them at textual endpoint URIs
//! (`inproc://`, `ipc://`, `tcp://`, `tcpmux://`, `ws://`) and exchange
//! framed messages whose routing semantics depend on the socket protocol:
//! one-to-one pair, fan-out publish/subscribe with topic filtering,
//! load-balanced request/reply with automatic retry, fair-queued pipeline
//! push/pull, and surveyor/respondent.
//!
//! ```no_run
//! use gridmq::{Session, SocketType};
//!
//! let session = Session::new().unwrap();
//! let mut bound = session.create_socket(SocketType::Pair).unwrap();
//! let mut connected = session.create_socket(SocketType::Pair).unwrap();
//!
//! bound.bind("tcp://127.0.0.1:5454").unwrap();
//! connected.connect("tcp://127.0.0.1:5454").unwrap();
//!
//! connected.send(vec![65, 66, 67]).unwrap();
//! let received = bound.recv().unwrap();
//! ```
//!
//! Sockets are backed by a fixed pool of worker threads, each owning a
//! readiness poller and a timer set. All per-socket bookkeeping runs inside
//! the socket's context, one state-machine step at a time.

#[macro_use]
extern crate log;
extern crate byteorder;
extern crate time;
extern crate mio;
extern crate mio_uds;
extern crate iovec;
extern crate libc;
extern crate rand;
extern crate base64;

#[macro_use]
mod aio;
mod global;
mod io_error;
mod message;
mod efd;
mod options;
mod stats;
mod pipe;
mod ep;
mod sock;
mod runtime;
mod session_facade;
mod socket_facade;
mod endpoint_facade;
mod transport;
mod protocol;

pub use global::{SocketType, SocketId, EndpointId};
pub use message::Message;
pub use options::{SocketOption, WsMsgType};
pub use session_facade::Session;
pub use socket_facade::Socket;
pub use endpoint_facade::Endpoint;
