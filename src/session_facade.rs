// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::io;
use std::sync::Arc;

use global::SocketType;
use runtime::Runtime;
use socket_facade::Socket;

/// The library runtime: worker threads, the socket table and the inproc
/// name directory. Sockets are created through it and may outlive it
/// only as zombies.
pub struct Session {
    runtime: Arc<Runtime>
}

impl Session {
    /// Starts the worker pool, one worker per available core.
    pub fn new() -> io::Result<Session> {
        Ok(Session { runtime: Runtime::new()? })
    }

    /// Creates a socket implementing the given scalability protocol.
    /// Fails when the socket table is full.
    pub fn create_socket(&self, socket_type: SocketType) -> io::Result<Socket> {
        let (id, ctx) = self.runtime.create_socket(socket_type)?;

        Ok(Socket::new(self.runtime.clone(), id, socket_type, ctx))
    }

    /// Wakes every blocked send and receive with a termination error.
    /// Sockets stop accepting work but still need to be closed.
    pub fn terminate(&self) {
        self.runtime.terminate();
    }
}
