// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Defines the socket types, which in turn determines the exact semantics of the socket.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SocketType {

    /// **One-to-one protocol**
    /// Socket for communication with exactly one peer.
    /// Each party can send messages at any time.
    /// If the peer is not available or the send buffer is full,
    /// subsequent calls to [send](struct.Socket.html#method.send)
    /// will block until it is possible to send the message.
    Pair       = (    16),

    /// **Publish/subscribe protocol**
    /// Broadcasts messages to multiple destinations.
    /// Messages are sent from `Pub` sockets and will only be received
    /// by `Sub` sockets that have subscribed to the matching topic.
    /// Topic is an arbitrary sequence of bytes at the beginning of the
    /// message body. A topic of zero length matches any message.
    /// Since the filtering is performed on the subscriber side,
    /// all the messages from the publisher are sent over the transport layer.
    ///
    /// This socket is used to distribute messages to multiple destinations.
    /// Receive operation is not defined.
    Pub        = (2 * 16),

    /// Receives messages from the publisher.
    /// Only messages that the socket is subscribed to are received.
    /// When the socket is created there are no subscriptions
    /// and thus no messages will be received.
    /// Send operation is not defined on this socket.
    Sub        = (2 * 16) + 1,

    /// **Request/reply protocol**
    /// Used to implement the client application that sends requests
    /// and receives replies. The request is resent automatically
    /// if no reply arrives within the resend interval,
    /// or if the peer the request was sent to disappears.
    Req        = (3 * 16),

    /// Used to implement the stateless worker that receives requests
    /// and sends replies.
    Rep        = (3 * 16) + 1,

    /// **Pipeline protocol**
    /// This socket is used to send messages to a cluster of load-balanced
    /// nodes. Receive operation is not implemented on this socket type.
    Push       = (5 * 16),

    /// This socket is used to receive a message from a cluster of nodes.
    /// Send operation is not implemented on this socket type.
    Pull       = (5 * 16) + 1,

    /// **Survey protocol**
    /// Used to send the survey. The survey is delivered to all the connected
    /// respondents. Once the query is sent, the socket can be used to receive
    /// the responses. When the survey deadline expires, receive will return
    /// a timeout error.
    Surveyor   = (6 * 16) + 2,

    /// Use to respond to the survey.
    /// The survey is received using the receive function,
    /// the response is sent using the send function.
    Respondent = (6 * 16) + 3
}

impl SocketType {
    pub fn id(&self) -> u16 {
        *self as u16
    }

    pub fn peer(&self) -> SocketType {
        match *self {
            SocketType::Pair       => SocketType::Pair,
            SocketType::Pub        => SocketType::Sub,
            SocketType::Sub        => SocketType::Pub,
            SocketType::Req        => SocketType::Rep,
            SocketType::Rep        => SocketType::Req,
            SocketType::Push       => SocketType::Pull,
            SocketType::Pull       => SocketType::Push,
            SocketType::Surveyor   => SocketType::Respondent,
            SocketType::Respondent => SocketType::Surveyor
        }
    }

    pub fn matches(&self, other: SocketType) -> bool {
        self.peer() == other && other.peer() == *self
    }

    pub fn from_id(id: u16) -> Option<SocketType> {
        match id {
            16 => Some(SocketType::Pair),
            32 => Some(SocketType::Pub),
            33 => Some(SocketType::Sub),
            48 => Some(SocketType::Req),
            49 => Some(SocketType::Rep),
            80 => Some(SocketType::Push),
            81 => Some(SocketType::Pull),
            98 => Some(SocketType::Surveyor),
            99 => Some(SocketType::Respondent),
            _  => None
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct SocketId(pub usize);

impl fmt::Debug for SocketId {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(formatter)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct EndpointId(pub usize);

impl fmt::Debug for EndpointId {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(formatter)
    }
}

/// Monotonic id generator, shared across threads.
#[derive(Clone)]
pub struct IdSequence {
    value: Arc<AtomicUsize>
}

impl IdSequence {
    pub fn new() -> IdSequence {
        IdSequence { value: Arc::new(AtomicUsize::new(0)) }
    }

    pub fn next(&self) -> usize {
        self.value.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for IdSequence {
    fn default() -> Self {
        IdSequence::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{IdSequence, SocketType};

    #[test]
    fn id_sequence_can_be_cloned() {
        let seq = IdSequence::new();
        let other = seq.clone();

        assert_eq!(0, other.next());
        assert_eq!(1, seq.next());
        assert_eq!(2, seq.next());
        assert_eq!(3, other.next());
    }

    #[test]
    fn socket_types_are_their_peer_peer() {
        let types = [
            SocketType::Pair, SocketType::Pub, SocketType::Sub,
            SocketType::Req, SocketType::Rep, SocketType::Push,
            SocketType::Pull, SocketType::Surveyor, SocketType::Respondent];

        for t in types.iter() {
            assert!(t.matches(t.peer()));
            assert_eq!(Some(*t), SocketType::from_id(t.id()));
        }
    }
}
