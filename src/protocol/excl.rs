// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Container for a single pipe, used by protocols restricted to exactly
//! one peer connection at a time.

use std::io;

use message::Message;
use pipe::PIPE_RELEASE;
use protocol::PipeSet;
use io_error::would_block_error;

pub struct Excl {
    pipe: Option<usize>,
    inpipe: Option<usize>,
    outpipe: Option<usize>
}

impl Excl {
    pub fn new() -> Excl {
        Excl {
            pipe: None,
            inpipe: None,
            outpipe: None
        }
    }

    /// Rejects a second connection while one is in use.
    pub fn add(&mut self, pid: usize) -> bool {
        if self.pipe.is_some() {
            return false;
        }
        self.pipe = Some(pid);
        true
    }

    pub fn remove(&mut self, pid: usize) {
        if self.pipe == Some(pid) {
            self.pipe = None;
            self.inpipe = None;
            self.outpipe = None;
        }
    }

    pub fn is_attached(&self, pid: usize) -> bool {
        self.pipe == Some(pid)
    }

    pub fn on_in(&mut self, pid: usize) {
        assert!(self.inpipe.is_none());
        assert_eq!(self.pipe, Some(pid));
        self.inpipe = Some(pid);
    }

    pub fn on_out(&mut self, pid: usize) {
        assert!(self.outpipe.is_none());
        assert_eq!(self.pipe, Some(pid));
        self.outpipe = Some(pid);
    }

    pub fn send(&mut self, set: &mut PipeSet, msg: Message) -> io::Result<()> {
        match self.outpipe.take() {
            Some(pid) => {
                let flags = set.send(pid, msg);
                if flags & PIPE_RELEASE == 0 {
                    self.outpipe = Some(pid);
                }
                Ok(())
            },
            None => Err(would_block_error())
        }
    }

    pub fn recv(&mut self, set: &mut PipeSet) -> io::Result<(Message, u32)> {
        match self.inpipe.take() {
            Some(pid) => {
                let (msg, flags) = set.recv(pid);
                if flags & PIPE_RELEASE == 0 {
                    self.inpipe = Some(pid);
                }
                Ok((msg, flags))
            },
            None => Err(would_block_error())
        }
    }

    pub fn can_send(&self) -> bool {
        self.outpipe.is_some()
    }

    pub fn can_recv(&self) -> bool {
        self.inpipe.is_some()
    }
}
