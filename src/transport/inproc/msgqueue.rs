// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Message queue backing one direction of an inproc pipe. Messages are
//! stored whole in a singly linked list of fixed granularity chunks, with
//! one spare chunk cached to amortize allocation.

use std::collections::VecDeque;

use message::Message;

/// Messages per chunk.
const GRANULARITY: usize = 256;

struct Chunk {
    msgs: VecDeque<Message>
}

impl Chunk {
    fn new() -> Chunk {
        Chunk { msgs: VecDeque::with_capacity(GRANULARITY) }
    }
}

pub struct MsgQueue {
    chunks: VecDeque<Chunk>,
    cache: Option<Chunk>,
    count: usize,
    mem: usize,
    maxmem: usize
}

pub enum SendStatus {
    /// Queued, and the queue can take more.
    Ok,
    /// Queued, but the next send would be refused.
    OkFull,
    /// Over the limit, message handed back.
    Full(Message)
}

impl MsgQueue {
    pub fn new(maxmem: usize) -> MsgQueue {
        let mut chunks = VecDeque::new();
        chunks.push_back(Chunk::new());

        MsgQueue {
            chunks: chunks,
            cache: None,
            count: 0,
            mem: 0,
            maxmem: maxmem
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// One message of arbitrary size is always admissible, so the limit
    /// cannot deadlock a legitimate large write. Beyond that the
    /// in-memory limit applies.
    pub fn send(&mut self, msg: Message) -> SendStatus {
        let msgsz = msg.len();

        if self.count > 0 && self.mem + msgsz >= self.maxmem {
            return SendStatus::Full(msg);
        }

        self.count += 1;
        self.mem += msgsz;

        if self.chunks.back().unwrap().msgs.len() == GRANULARITY {
            let chunk = self.cache.take().unwrap_or_else(Chunk::new);
            self.chunks.push_back(chunk);
        }
        self.chunks.back_mut().unwrap().msgs.push_back(msg);

        if self.mem >= self.maxmem {
            SendStatus::OkFull
        } else {
            SendStatus::Ok
        }
    }

    pub fn recv(&mut self) -> Option<Message> {
        if self.count == 0 {
            return None;
        }

        let msg = self.chunks.front_mut().unwrap().msgs.pop_front().unwrap();

        if self.chunks.front().unwrap().msgs.is_empty() && self.chunks.len() > 1 {
            let mut spent = self.chunks.pop_front().unwrap();
            if self.cache.is_none() {
                spent.msgs.clear();
                self.cache = Some(spent);
            }
        }

        self.count -= 1;
        self.mem -= msg.len();

        Some(msg)
    }

    /// Whether a further ordinary send would be admitted.
    pub fn can_send(&self) -> bool {
        self.count == 0 || self.mem < self.maxmem
    }
}

#[cfg(test)]
mod tests {
    use message::Message;

    use super::*;

    #[test]
    fn one_message_is_always_admissible() {
        let mut queue = MsgQueue::new(4);

        match queue.send(Message::with_body(vec![0; 100])) {
            SendStatus::OkFull => {},
            _ => panic!("oversized first message should be admitted and fill the queue")
        }
        match queue.send(Message::with_body(vec![1])) {
            SendStatus::Full(msg) => assert_eq!(1, msg.len()),
            _ => panic!("second message should be refused")
        }
    }

    #[test]
    fn draining_reopens_the_queue() {
        let mut queue = MsgQueue::new(4);

        queue.send(Message::with_body(vec![0; 100]));
        assert!(!queue.can_send());

        assert_eq!(100, queue.recv().unwrap().len());
        assert!(queue.can_send());
        assert!(queue.recv().is_none());
    }

    #[test]
    fn order_is_preserved_across_chunk_boundaries() {
        let mut queue = MsgQueue::new(usize::max_value());

        for i in 0..600 {
            match queue.send(Message::with_body(vec![(i % 256) as u8])) {
                SendStatus::Ok => {},
                _ => panic!("queue unexpectedly full")
            }
        }
        for i in 0..600 {
            let msg = queue.recv().unwrap();
            assert_eq!((i % 256) as u8, msg.body()[0]);
        }
        assert!(queue.is_empty());
    }
}
