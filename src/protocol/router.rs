// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Keyed routing shared by the request-answering protocols: inbound
//! messages are fair-queued and tagged with the key of the pipe they
//! came from; outbound messages are routed back by that key. Keys are
//! seeded randomly so stale replies from a previous process do not hit
//! a fresh pipe.

use std::collections::HashMap;
use std::io;

use byteorder::{BigEndian, ByteOrder};
use rand;

use message::{Chunk, Message};
use pipe::{PIPE_PARSED, PIPE_RELEASE};
use protocol::PipeSet;
use protocol::fq::FairQueue;
use io_error::would_block_error;

struct OutPipe {
    pid: usize,
    can_send: bool
}

pub struct Router {
    fq: FairQueue,
    by_key: HashMap<u32, OutPipe>,
    key_of: HashMap<usize, u32>,
    next_key: u32
}

impl Router {
    pub fn new() -> Router {
        Router {
            fq: FairQueue::new(),
            by_key: HashMap::new(),
            key_of: HashMap::new(),
            next_key: rand::random()
        }
    }

    pub fn add(&mut self, set: &mut PipeSet, pid: usize) {
        let key = self.next_key & 0x7fffffff;

        self.next_key = self.next_key.wrapping_add(1);
        self.by_key.insert(key, OutPipe {
            pid: pid,
            can_send: false
        });
        self.key_of.insert(pid, key);
        self.fq.add(pid, set.opts(pid).recv_priority);
    }

    pub fn remove(&mut self, pid: usize) {
        if let Some(key) = self.key_of.remove(&pid) {
            self.by_key.remove(&key);
        }
        self.fq.remove(pid);
    }

    pub fn on_in(&mut self, pid: usize) {
        self.fq.on_in(pid);
    }

    pub fn on_out(&mut self, pid: usize) {
        if let Some(key) = self.key_of.get(&pid) {
            if let Some(out) = self.by_key.get_mut(key) {
                out.can_send = true;
            }
        }
    }

    pub fn can_recv(&self) -> bool {
        self.fq.can_recv()
    }

    /// Receives one request and moves its backtrace, prefixed with the
    /// key of the originating pipe, into the protocol header. Requests
    /// without a bottom-of-stack marker are dropped.
    pub fn recv(&mut self, set: &mut PipeSet) -> io::Result<Message> {
        loop {
            let (mut msg, flags, pid) = self.fq.recv(set)?;

            if flags & PIPE_PARSED == 0 {
                match backtrace_len(msg.body()) {
                    Some(len) => {
                        let sphdr = Chunk::from_slice(&msg.body.as_slice()[..len]);
                        msg.body.trim_front(len);
                        msg.sphdr = sphdr;
                    },
                    None => {
                        debug!("[router] dropping request without stack bottom");
                        if self.fq.can_recv() {
                            continue;
                        }
                        return Err(would_block_error());
                    }
                }
            }

            let key = self.key_of[&pid];
            let mut tagged = vec![0; 4 + msg.sphdr.len()];
            BigEndian::write_u32(&mut tagged[..4], key);
            tagged[4..].copy_from_slice(msg.sphdr.as_slice());
            msg.sphdr = Chunk::from_vec(tagged);

            return Ok(msg);
        }
    }

    /// Routes a reply to the pipe named by the first header word. An
    /// unroutable or unready destination drops the reply silently; the
    /// requester will retry.
    pub fn send(&mut self, set: &mut PipeSet, mut msg: Message) -> io::Result<()> {
        if msg.sphdr.len() < 4 {
            return Ok(());
        }

        let key = BigEndian::read_u32(&msg.sphdr.as_slice()[..4]);
        msg.sphdr.trim_front(4);

        let pid = match self.by_key.get(&key) {
            Some(out) if out.can_send => out.pid,
            _ => return Ok(())
        };
        let flags = set.send(pid, msg);

        if flags & PIPE_RELEASE != 0 {
            if let Some(out) = self.by_key.get_mut(&key) {
                out.can_send = false;
            }
        }
        Ok(())
    }
}

/// Length of the request-id stack at the front of a raw request:
/// 4-byte words up to and including the first one with the top bit set.
fn backtrace_len(body: &[u8]) -> Option<usize> {
    let mut i = 0;

    loop {
        if (i + 1) * 4 > body.len() {
            return None;
        }
        if BigEndian::read_u32(&body[i * 4..(i + 1) * 4]) & 0x80000000 != 0 {
            return Some((i + 1) * 4);
        }
        i += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::backtrace_len;

    #[test]
    fn stack_bottom_is_found_by_its_top_bit() {
        assert_eq!(Some(4), backtrace_len(&[0x80, 0, 0, 1, 9, 9, 9, 9]));
        assert_eq!(Some(8), backtrace_len(&[0, 0, 0, 7, 0x80, 0, 0, 1]));
    }

    #[test]
    fn missing_stack_bottom_is_malformed() {
        assert_eq!(None, backtrace_len(&[]));
        assert_eq!(None, backtrace_len(&[0, 0, 0, 1]));
        assert_eq!(None, backtrace_len(&[0x80, 0, 0]));
    }
}
