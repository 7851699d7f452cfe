// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Messages and the byte chunks they are made of.
//!
//! A chunk stores its bytes inline while they fit into a pointer-sized
//! payload and falls back to a reference-counted heap arena beyond that.
//! Copying a message shares the heap arenas, so fanning a message out to
//! many pipes does not duplicate the body.

use std::sync::Arc;

/// Largest payload stored without a heap allocation.
pub const CHUNK_INLINE_MAX: usize = 31;

enum Repr {
    Inline {
        len: u8,
        data: [u8; CHUNK_INLINE_MAX]
    },
    Heap {
        arena: Arc<Vec<u8>>,
        offset: usize
    }
}

pub struct Chunk {
    repr: Repr
}

impl Chunk {
    /// A zero-filled chunk of the requested size.
    pub fn new(size: usize) -> Chunk {
        if size <= CHUNK_INLINE_MAX {
            Chunk { repr: Repr::Inline { len: size as u8, data: [0; CHUNK_INLINE_MAX] } }
        } else {
            Chunk { repr: Repr::Heap { arena: Arc::new(vec![0; size]), offset: 0 } }
        }
    }

    pub fn empty() -> Chunk {
        Chunk::new(0)
    }

    pub fn from_vec(bytes: Vec<u8>) -> Chunk {
        if bytes.len() <= CHUNK_INLINE_MAX {
            let mut data = [0; CHUNK_INLINE_MAX];
            data[..bytes.len()].copy_from_slice(&bytes);
            Chunk { repr: Repr::Inline { len: bytes.len() as u8, data: data } }
        } else {
            Chunk { repr: Repr::Heap { arena: Arc::new(bytes), offset: 0 } }
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Chunk {
        Chunk::from_vec(bytes.to_vec())
    }

    pub fn len(&self) -> usize {
        match self.repr {
            Repr::Inline { len, .. } => len as usize,
            Repr::Heap { ref arena, offset } => arena.len() - offset
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        match self.repr {
            Repr::Inline { len, ref data } => &data[..len as usize],
            Repr::Heap { ref arena, offset } => &arena[offset..]
        }
    }

    /// Mutable view of the bytes. A shared heap arena is unshared first,
    /// so writes never show through other references.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match self.repr {
            Repr::Inline { len, ref mut data } => &mut data[..len as usize],
            Repr::Heap { ref mut arena, offset } => &mut Arc::make_mut(arena)[offset..]
        }
    }

    /// Drops the first `n` bytes.
    pub fn trim_front(&mut self, n: usize) {
        assert!(n <= self.len());
        match self.repr {
            Repr::Inline { ref mut len, ref mut data } => {
                let remaining = *len as usize - n;
                for i in 0..remaining {
                    data[i] = data[i + n];
                }
                *len = remaining as u8;
            },
            Repr::Heap { ref mut offset, .. } => *offset += n
        }
    }

    /// Takes the content out, leaving a zero-length chunk behind.
    pub fn take(&mut self) -> Chunk {
        ::std::mem::replace(self, Chunk::empty())
    }
}

impl Clone for Chunk {
    fn clone(&self) -> Chunk {
        match self.repr {
            Repr::Inline { len, data } => Chunk { repr: Repr::Inline { len: len, data: data } },
            Repr::Heap { ref arena, offset } => Chunk { repr: Repr::Heap { arena: arena.clone(), offset: offset } }
        }
    }
}

impl ::std::fmt::Debug for Chunk {
    fn fmt(&self, formatter: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
        write!(formatter, "Chunk[{}]", self.len())
    }
}

/// An SP message: protocol header, body and ancillary control headers.
///
/// The protocol header carries the request id stack of req/rep and
/// surveyor/respondent; the control headers carry per-message hints such
/// as the WebSocket opcode.
#[derive(Debug)]
pub struct Message {
    pub sphdr: Chunk,
    pub body: Chunk,
    pub hdrs: Chunk
}

impl Message {
    pub fn new() -> Message {
        Message {
            sphdr: Chunk::empty(),
            body: Chunk::empty(),
            hdrs: Chunk::empty()
        }
    }

    pub fn with_body(body: Vec<u8>) -> Message {
        Message {
            sphdr: Chunk::empty(),
            body: Chunk::from_vec(body),
            hdrs: Chunk::empty()
        }
    }

    pub fn from_body_chunk(body: Chunk) -> Message {
        Message {
            sphdr: Chunk::empty(),
            body: body,
            hdrs: Chunk::empty()
        }
    }

    /// Wire size: protocol header plus body.
    pub fn len(&self) -> usize {
        self.sphdr.len() + self.body.len()
    }

    pub fn body(&self) -> &[u8] {
        self.body.as_slice()
    }

    /// Moves the content out, reinitializing this message to zero length.
    pub fn take(&mut self) -> Message {
        ::std::mem::replace(self, Message::new())
    }

    pub fn to_buffer(self) -> Vec<u8> {
        self.body.as_slice().to_vec()
    }
}

impl Clone for Message {
    fn clone(&self) -> Message {
        Message {
            sphdr: self.sphdr.clone(),
            body: self.body.clone(),
            hdrs: self.hdrs.clone()
        }
    }
}

impl Default for Message {
    fn default() -> Message {
        Message::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn small_payload_stays_inline() {
        let chunk = Chunk::from_vec(vec![1; CHUNK_INLINE_MAX]);

        match chunk.repr {
            super::Repr::Inline { len, .. } => assert_eq!(CHUNK_INLINE_MAX, len as usize),
            super::Repr::Heap { .. } => panic!("expected inline repr")
        }
    }

    #[test]
    fn large_payload_goes_to_the_heap() {
        let chunk = Chunk::from_vec(vec![1; CHUNK_INLINE_MAX + 1]);

        match chunk.repr {
            super::Repr::Inline { .. } => panic!("expected heap repr"),
            super::Repr::Heap { ref arena, .. } => assert_eq!(CHUNK_INLINE_MAX + 1, arena.len())
        }
    }

    #[test]
    fn clone_shares_the_heap_arena() {
        let chunk = Chunk::from_vec(vec![7; 100]);
        let copy = chunk.clone();

        match (&chunk.repr, &copy.repr) {
            (&super::Repr::Heap { ref arena, .. }, &super::Repr::Heap { arena: ref other, .. }) => {
                assert_eq!(2, Arc::strong_count(arena));
                assert!(Arc::ptr_eq(arena, other));
            },
            _ => panic!("expected heap reprs")
        }
    }

    #[test]
    fn trim_front_works_on_both_reprs() {
        let mut small = Chunk::from_vec(vec![1, 2, 3, 4]);
        let mut large = Chunk::from_vec((0..100u8).collect());

        small.trim_front(2);
        large.trim_front(10);

        assert_eq!(&[3, 4], small.as_slice());
        assert_eq!(90, large.len());
        assert_eq!(10, large.as_slice()[0]);
    }

    #[test]
    fn trimming_a_copy_leaves_the_original_alone() {
        let original = Chunk::from_vec(vec![9; 64]);
        let mut copy = original.clone();

        copy.trim_front(60);

        assert_eq!(64, original.len());
        assert_eq!(4, copy.len());
    }

    #[test]
    fn writing_a_shared_chunk_unshares_it_first() {
        let original = Chunk::from_vec(vec![0; 64]);
        let mut copy = original.clone();

        copy.as_mut_slice()[0] = 42;

        assert_eq!(0, original.as_slice()[0]);
        assert_eq!(42, copy.as_slice()[0]);
    }

    #[test]
    fn message_take_reinits_the_source() {
        let mut msg = Message::with_body(vec![1, 2, 3]);
        msg.sphdr = Chunk::from_vec(vec![0, 0, 0, 1]);

        let taken = msg.take();

        assert_eq!(7, taken.len());
        assert_eq!(0, msg.len());
        assert_eq!(0, msg.body.len());
    }
}
