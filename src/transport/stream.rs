// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! SP framing over a byte stream: both peers exchange the protocol
//! preamble, then every message travels as an 8-byte big-endian length
//! followed by the payload. The ipc flavor prepends a one-byte frame
//! type to each frame. Used as the session of the tcp, ipc and tcpmux
//! transports.

use std::io;
use std::time::Duration;

use byteorder::{BigEndian, ByteOrder};

use aio::{Addr, Event, EventTarget, Source};
use aio::streamhdr;
use aio::timer::Timer;
use aio::usock::{Usock, UsockOut};
use ep::EpView;
use global::SocketType;
use message::Message;
use options::EndpointOptions;
use pipe::{self, Carrier, PipeBase};
use transport::{addr_to_conn, SessionOut};
use io_error::invalid_data_io_error;

/// How long the peer gets to answer the protocol preamble.
const HANDSHAKE_TIMEOUT: u64 = 1_000;

/// Frame type of an ordinary message on the ipc flavor. The only other
/// assigned value, 0x02, is reserved for shared memory and rejected.
const FRAME_TYPE_MSG: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ProtoHdr,
    Active,
    Done
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecvPhase {
    Hdr,
    Body
}

pub struct StreamSession {
    state: State,
    prefix_byte: bool,
    socktype: SocketType,
    opts: EndpointOptions,
    self_addr: Addr,
    pid: Option<usize>,
    hdr_sent: bool,
    hdr_received: bool,
    recv_phase: RecvPhase,
    inmsg: Option<Message>,
    timer: Timer
}

impl StreamSession {
    pub fn new(view: &EpView, self_addr: Addr, opts: EndpointOptions, prefix_byte: bool) -> StreamSession {
        let target = EventTarget::new(view.ctx, self_addr, Source::HandshakeTimer);

        StreamSession {
            state: State::ProtoHdr,
            prefix_byte: prefix_byte,
            socktype: view.socktype,
            opts: opts,
            self_addr: self_addr,
            pid: None,
            hdr_sent: false,
            hdr_received: false,
            recv_phase: RecvPhase::Hdr,
            inmsg: None,
            timer: Timer::new(view.worker.clone(), target)
        }
    }

    pub fn pid(&self) -> Option<usize> {
        self.pid
    }

    fn hdr_size(&self) -> usize {
        if self.prefix_byte { 9 } else { 8 }
    }

    /// Kicks off the simultaneous preamble exchange.
    pub fn start(&mut self, usock: &mut Usock, _view: &mut EpView) {
        usock.send(streamhdr::create(self.socktype).to_vec(), None);
        usock.recv_exact(streamhdr::HDR_SIZE, false);
        self.timer.start(Duration::from_millis(HANDSHAKE_TIMEOUT));
    }

    pub fn feed(&mut self, usock: &mut Usock, view: &mut EpView, src: Source, event: Event, arg: usize) -> Option<SessionOut> {
        if src == Source::HandshakeTimer {
            return match self.timer.feed(event, arg) {
                Some(Event::Timeout) => {
                    self.state = State::Done;
                    Some(SessionOut::Error(invalid_data_io_error("protocol header timeout")))
                },
                _ => None
            };
        }

        let out = match usock.feed(src, event) {
            Some(out) => out,
            None => return None
        };

        match (self.state, out) {
            (State::ProtoHdr, UsockOut::Sent) => {
                self.hdr_sent = true;
                self.try_activate(usock, view)
            },
            (State::ProtoHdr, UsockOut::Received) => {
                let hdr = usock.take_recv_buf();
                match streamhdr::check(&hdr, self.socktype) {
                    Ok(()) => {
                        self.hdr_received = true;
                        self.try_activate(usock, view)
                    },
                    Err(err) => {
                        self.state = State::Done;
                        Some(SessionOut::Error(err))
                    }
                }
            },

            (State::Active, UsockOut::Received) => self.on_received(usock, view),
            (State::Active, UsockOut::Sent) => {
                let pid = self.pid.unwrap();
                pipe::sent(view.pipes.get_mut(&pid).unwrap(), view.q);
                None
            },

            (_, UsockOut::Shutdown) => {
                self.state = State::Done;
                Some(SessionOut::Closed)
            },
            (_, UsockOut::Error(err)) => {
                self.state = State::Done;
                Some(SessionOut::Error(err))
            },
            (state, _) => bad_event!("stream session", state, src, event)
        }
    }

    fn try_activate(&mut self, usock: &mut Usock, view: &mut EpView) -> Option<SessionOut> {
        if !self.hdr_sent || !self.hdr_received {
            return None;
        }

        self.timer.stop();
        self.state = State::Active;

        let pid = view.alloc_pipe_id();
        let (eid, cid) = addr_to_conn(self.self_addr);
        let mut pb = PipeBase::new(pid, self.opts.clone(), Carrier::Stream {
            eid: eid,
            cid: cid
        });

        pipe::start(&mut pb, view.q);
        view.pipes.insert(pid, pb);
        self.pid = Some(pid);

        self.recv_phase = RecvPhase::Hdr;
        let hdr_size = self.hdr_size();
        usock.recv_exact(hdr_size, false);

        Some(SessionOut::Activated)
    }

    fn on_received(&mut self, usock: &mut Usock, view: &mut EpView) -> Option<SessionOut> {
        match self.recv_phase {
            RecvPhase::Hdr => {
                let hdr = usock.take_recv_buf();
                let size = if self.prefix_byte {
                    if hdr[0] != FRAME_TYPE_MSG {
                        self.state = State::Done;
                        return Some(SessionOut::Error(invalid_data_io_error("unsupported ipc frame type")));
                    }
                    BigEndian::read_u64(&hdr[1..9])
                } else {
                    BigEndian::read_u64(&hdr[..8])
                };

                if let Some(max) = self.opts.recv_max_size {
                    if size > max as u64 {
                        self.state = State::Done;
                        return Some(SessionOut::Error(invalid_data_io_error("message larger than the receive limit")));
                    }
                }

                if size == 0 {
                    self.finish_msg(view, Message::new());
                    None
                } else {
                    self.recv_phase = RecvPhase::Body;
                    usock.recv_exact(size as usize, false);
                    None
                }
            },
            RecvPhase::Body => {
                let body = usock.take_recv_buf();
                self.finish_msg(view, Message::with_body(body));
                None
            }
        }
    }

    fn finish_msg(&mut self, view: &mut EpView, msg: Message) {
        let pid = self.pid.unwrap();

        self.inmsg = Some(msg);
        pipe::received(view.pipes.get_mut(&pid).unwrap(), view.q);
    }

    /// The protocol collected the announced message; rearm the header
    /// read for the next one.
    pub fn recv_collect(&mut self, usock: &mut Usock) -> Message {
        let msg = self.inmsg.take().expect("collect with no message pending");

        self.recv_phase = RecvPhase::Hdr;
        let hdr_size = self.hdr_size();
        usock.recv_exact(hdr_size, false);
        msg
    }

    /// Frames one message: optional frame type, 8-byte length, payload.
    pub fn send(&mut self, usock: &mut Usock, msg: Message) {
        let mut hdr = Vec::with_capacity(self.hdr_size());

        if self.prefix_byte {
            hdr.push(FRAME_TYPE_MSG);
        }
        let mut length = [0; 8];
        BigEndian::write_u64(&mut length, msg.len() as u64);
        hdr.extend_from_slice(&length);

        usock.send(hdr, Some(msg));
    }

    /// Detaches the pipe from the socket; the caller stops the usock.
    pub fn teardown(&mut self, view: &mut EpView) {
        self.timer.stop();
        if let Some(pid) = self.pid {
            if let Some(pb) = view.pipes.get_mut(&pid) {
                pipe::stop(pb, view.q);
            }
        }
        self.state = State::Done;
    }
}
