// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! RFC 6455 session: HTTP upgrade handshake, then framed messages with
//! masking, fragmentation and incremental UTF-8 validation of text. A
//! protocol violation fails the connection: a close frame with the
//! matching status code goes out, further input is dropped, and the
//! endpoint is told not to reconnect.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use byteorder::{BigEndian, ByteOrder};
use rand;

use aio::{Addr, Event, EventQueues, EventTarget, Source};
use aio::timer::Timer;
use aio::usock::{Usock, UsockOut};
use ep::EpView;
use global::SocketType;
use message::{Chunk, Message};
use options::{EndpointOptions, WsMsgType};
use pipe::{self, Carrier, PipeBase};
use transport::{addr_to_conn, SessionOut};
use transport::ws::handshake;
use io_error::invalid_data_io_error;

const HANDSHAKE_TIMEOUT: u64 = 5_000;
/// Longest tolerated upgrade preamble.
const HANDSHAKE_MAX: usize = 4096;
const READ_CHUNK: usize = 2048;

const OPCODE_CONTINUATION: u8 = 0x0;
const OPCODE_TEXT: u8 = 0x1;
const OPCODE_BINARY: u8 = 0x2;
const OPCODE_CLOSE: u8 = 0x8;
const OPCODE_PING: u8 = 0x9;
const OPCODE_PONG: u8 = 0xA;

const CLOSE_NORMAL: u16 = 1000;
const CLOSE_PROTO: u16 = 1002;
const CLOSE_INVALID_DATA: u16 = 1007;
const CLOSE_TOO_BIG: u16 = 1009;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Handshake,
    Active,
    /// Close frame on its way out; input is discarded.
    ClosingConnection,
    Done
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SendKind {
    Handshake,
    Data,
    Control,
    Close
}

/// What to report once the close frame is on the wire.
enum CloseReport {
    Clean,
    Fail(&'static str)
}

pub struct WsSession {
    state: State,
    client: bool,
    host: String,
    path: String,
    key: String,
    socktype: SocketType,
    opts: EndpointOptions,
    self_addr: Addr,
    pid: Option<usize>,
    timer: Timer,
    // Inbound byte assembly.
    hs: Vec<u8>,
    carry: Vec<u8>,
    reading: bool,
    // Inbound message assembly.
    frag_opcode: Option<u8>,
    msg_buf: Vec<u8>,
    utf8: Utf8Validator,
    inmsg: Option<Message>,
    // Outbound.
    sending: Option<SendKind>,
    ctl_queue: VecDeque<Vec<u8>>,
    pending_data: Option<Vec<u8>>,
    close_frame: Option<Vec<u8>>,
    close_report: Option<CloseReport>
}

impl WsSession {
    pub fn new(view: &EpView, self_addr: Addr, opts: EndpointOptions, client: bool, host: String, path: String) -> WsSession {
        let target = EventTarget::new(view.ctx, self_addr, Source::HandshakeTimer);

        WsSession {
            state: State::Handshake,
            client: client,
            host: host,
            path: path,
            key: handshake::random_key(),
            socktype: view.socktype,
            opts: opts,
            self_addr: self_addr,
            pid: None,
            timer: Timer::new(view.worker.clone(), target),
            hs: Vec::new(),
            carry: Vec::new(),
            reading: false,
            frag_opcode: None,
            msg_buf: Vec::new(),
            utf8: Utf8Validator::new(),
            inmsg: None,
            sending: None,
            ctl_queue: VecDeque::new(),
            pending_data: None,
            close_frame: None,
            close_report: None
        }
    }

    pub fn pid(&self) -> Option<usize> {
        self.pid
    }

    pub fn start(&mut self, usock: &mut Usock, _view: &mut EpView) {
        if self.client {
            let request = handshake::build_request(&self.host, &self.path, &self.key, self.socktype);
            usock.send(request, None);
            self.sending = Some(SendKind::Handshake);
        }
        usock.recv_some(READ_CHUNK);
        self.reading = true;
        self.timer.start(Duration::from_millis(HANDSHAKE_TIMEOUT));
    }

    pub fn feed(&mut self, usock: &mut Usock, view: &mut EpView, src: Source, event: Event, arg: usize) -> Option<SessionOut> {
        if src == Source::HandshakeTimer {
            return match self.timer.feed(event, arg) {
                Some(Event::Timeout) => {
                    self.state = State::Done;
                    Some(SessionOut::Error(invalid_data_io_error("websocket handshake timeout")))
                },
                _ => None
            };
        }

        let out = match usock.feed(src, event) {
            Some(out) => out,
            None => return None
        };

        match out {
            UsockOut::Sent => self.on_sent(usock, view),
            UsockOut::Received => {
                self.reading = false;
                let chunk = usock.take_recv_buf();
                match self.state {
                    State::Handshake => self.on_handshake_bytes(usock, view, chunk),
                    State::Active => {
                        self.carry.extend_from_slice(&chunk);
                        self.pump(usock, view.pipes, view.q);
                        self.rearm_read(usock);
                        None
                    },
                    State::ClosingConnection | State::Done => None
                }
            },
            UsockOut::Shutdown => {
                self.state = State::Done;
                Some(SessionOut::Closed)
            },
            UsockOut::Error(err) => {
                self.state = State::Done;
                Some(SessionOut::Error(err))
            },
            _ => None
        }
    }

    fn on_sent(&mut self, usock: &mut Usock, view: &mut EpView) -> Option<SessionOut> {
        match self.sending.take() {
            Some(SendKind::Handshake) => {
                if !self.client && self.state == State::Handshake && self.hs_complete() {
                    // Server response went out; the session is live.
                    return self.activate(usock, view);
                }
                self.flush(usock);
                None
            },
            Some(SendKind::Data) => {
                if let Some(pid) = self.pid {
                    if let Some(pb) = view.pipes.get_mut(&pid) {
                        pipe::sent(pb, view.q);
                    }
                }
                self.flush(usock);
                None
            },
            Some(SendKind::Control) => {
                self.flush(usock);
                None
            },
            Some(SendKind::Close) => {
                self.state = State::Done;
                match self.close_report.take() {
                    Some(CloseReport::Clean) | None => Some(SessionOut::Closed),
                    Some(CloseReport::Fail(reason)) =>
                        Some(SessionOut::PeerGone(invalid_data_io_error(reason)))
                }
            },
            None => None
        }
    }

    /// Sends whatever is queued, close first, then control, then data.
    fn flush(&mut self, usock: &mut Usock) {
        if self.sending.is_some() {
            return;
        }
        if let Some(frame) = self.close_frame.take() {
            usock.send(frame, None);
            self.sending = Some(SendKind::Close);
            return;
        }
        if self.state != State::Active {
            return;
        }
        if let Some(frame) = self.ctl_queue.pop_front() {
            usock.send(frame, None);
            self.sending = Some(SendKind::Control);
            return;
        }
        if let Some(frame) = self.pending_data.take() {
            usock.send(frame, None);
            self.sending = Some(SendKind::Data);
        }
    }

    fn hs_complete(&self) -> bool {
        self.hs.windows(4).any(|w| w == b"\r\n\r\n")
    }

    fn hs_split(&self) -> Option<usize> {
        self.hs.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
    }

    fn on_handshake_bytes(&mut self, usock: &mut Usock, view: &mut EpView, chunk: Vec<u8>) -> Option<SessionOut> {
        self.hs.extend_from_slice(&chunk);

        let end = match self.hs_split() {
            Some(end) => end,
            None => {
                if self.hs.len() > HANDSHAKE_MAX {
                    self.state = State::Done;
                    return Some(SessionOut::Error(invalid_data_io_error("oversized websocket handshake")));
                }
                usock.recv_some(READ_CHUNK);
                self.reading = true;
                return None;
            }
        };

        let text = match ::std::str::from_utf8(&self.hs[..end]) {
            Ok(text) => text.to_owned(),
            Err(_) => {
                self.state = State::Done;
                return Some(SessionOut::Error(invalid_data_io_error("malformed websocket handshake")));
            }
        };
        let leftover = self.hs[end..].to_vec();

        if self.client {
            match handshake::parse_response(&text, &self.key, self.socktype) {
                Ok(()) => {
                    self.carry = leftover;
                    self.activate(usock, view)
                },
                Err(err) => {
                    self.state = State::Done;
                    Some(SessionOut::Error(err))
                }
            }
        } else {
            match handshake::parse_request(&text, self.socktype) {
                Ok((key, protocol)) => {
                    self.carry = leftover;
                    let response = handshake::build_response(&handshake::accept_key(&key), &protocol);
                    usock.send(response, None);
                    self.sending = Some(SendKind::Handshake);
                    None
                },
                Err(err) => {
                    debug!("[ws] rejecting upgrade: {:?}", err);
                    usock.send(handshake::build_bad_request(), None);
                    self.sending = Some(SendKind::Close);
                    self.close_report = Some(CloseReport::Fail("rejected websocket upgrade"));
                    None
                }
            }
        }
    }

    fn activate(&mut self, usock: &mut Usock, view: &mut EpView) -> Option<SessionOut> {
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

        // Frames may have arrived glued to the handshake already.
        self.pump(usock, view.pipes, view.q);
        self.rearm_read(usock);
        Some(SessionOut::Activated)
    }

    fn rearm_read(&mut self, usock: &mut Usock) {
        if self.state == State::Active && self.inmsg.is_none() && !self.reading {
            usock.recv_some(READ_CHUNK);
            self.reading = true;
        }
    }

    /// Parses as many complete frames as the carry buffer holds,
    /// stopping as soon as one message is handed to the pipe. A
    /// violation starts the close handshake; the endpoint hears about
    /// it when the close frame completes.
    fn pump(&mut self, usock: &mut Usock, pipes: &mut HashMap<usize, PipeBase>, q: &mut EventQueues) {
        while self.state == State::Active && self.inmsg.is_none() {
            let (frame, consumed) = match parse_frame(&self.carry, self.client, self.opts.recv_max_size) {
                ParseStep::Frame(frame, consumed) => (frame, consumed),
                ParseStep::Incomplete => break,
                ParseStep::Violation(code, reason) => {
                    self.fail_connection(usock, code, reason);
                    break;
                }
            };

            self.carry.drain(..consumed);
            self.on_frame(usock, pipes, q, frame);
        }
    }

    fn on_frame(&mut self, usock: &mut Usock, pipes: &mut HashMap<usize, PipeBase>, q: &mut EventQueues, frame: Frame) {
        match frame.opcode {
            OPCODE_TEXT | OPCODE_BINARY => {
                if self.frag_opcode.is_some() {
                    return self.fail_connection(usock, CLOSE_PROTO, "data frame inside a fragmented message");
                }
                self.frag_opcode = Some(frame.opcode);
                self.msg_buf = frame.payload;
                self.utf8 = Utf8Validator::new();
                self.continue_message(usock, pipes, q, frame.fin)
            },
            OPCODE_CONTINUATION => {
                if self.frag_opcode.is_none() {
                    return self.fail_connection(usock, CLOSE_PROTO, "continuation without a message");
                }
                self.msg_buf.extend_from_slice(&frame.payload);
                self.continue_message(usock, pipes, q, frame.fin)
            },
            OPCODE_CLOSE => {
                if frame.payload.len() == 1 {
                    return self.fail_connection(usock, CLOSE_PROTO, "close frame with a truncated code");
                }
                let code = if frame.payload.len() >= 2 {
                    BigEndian::read_u16(&frame.payload[..2])
                } else {
                    CLOSE_NORMAL
                };
                self.begin_close(usock, code, CloseReport::Clean);
            },
            OPCODE_PING => {
                let pong = self.build_control(OPCODE_PONG, &frame.payload);
                self.ctl_queue.push_back(pong);
                self.flush(usock);
            },
            OPCODE_PONG => {},
            _ => self.fail_connection(usock, CLOSE_PROTO, "reserved opcode")
        }
    }

    fn continue_message(&mut self, usock: &mut Usock, pipes: &mut HashMap<usize, PipeBase>, q: &mut EventQueues, fin: bool) {
        let text = self.frag_opcode == Some(OPCODE_TEXT);

        if let Some(max) = self.opts.recv_max_size {
            if self.msg_buf.len() > max {
                return self.fail_connection(usock, CLOSE_TOO_BIG, "message larger than the receive limit");
            }
        }

        if text {
            let validated = self.utf8.validated_up_to;
            for index in validated..self.msg_buf.len() {
                let byte = self.msg_buf[index];
                if !self.utf8.push(byte) {
                    return self.fail_connection(usock, CLOSE_INVALID_DATA, "invalid utf-8 in a text message");
                }
            }
            self.utf8.validated_up_to = self.msg_buf.len();

            if fin && !self.utf8.is_complete() {
                return self.fail_connection(usock, CLOSE_INVALID_DATA, "truncated utf-8 sequence at the end of a text message");
            }
        }

        if fin {
            let opcode = self.frag_opcode.take().unwrap();
            let body = ::std::mem::replace(&mut self.msg_buf, Vec::new());
            let mut msg = Message::with_body(body);

            // Opcode hint for the application, as ancillary data.
            msg.hdrs = Chunk::from_slice(&[opcode]);
            self.inmsg = Some(msg);

            let pid = self.pid.unwrap();
            pipe::received(pipes.get_mut(&pid).unwrap(), q);
        }
    }

    /// Sends a close frame with `code` and stops reading. What to report
    /// to the endpoint when the frame is out is the caller's pick.
    fn begin_close(&mut self, usock: &mut Usock, code: u16, report: CloseReport) {
        let mut payload = [0; 2];
        BigEndian::write_u16(&mut payload, code);
        let frame = self.build_control(OPCODE_CLOSE, &payload);

        self.close_frame = Some(frame);
        self.close_report = Some(report);
        self.state = State::ClosingConnection;
        self.carry.clear();
        self.flush(usock);
    }

    fn fail_connection(&mut self, usock: &mut Usock, code: u16, reason: &'static str) {
        debug!("[ws] failing connection: {} ({})", reason, code);
        self.begin_close(usock, code, CloseReport::Fail(reason));
    }

    fn build_control(&self, opcode: u8, payload: &[u8]) -> Vec<u8> {
        build_frame(opcode, payload, self.client)
    }

    /// Frames one outbound message. Clients mask; the opcode comes from
    /// the per-message header when given, from the socket option
    /// otherwise.
    pub fn send(&mut self, usock: &mut Usock, msg: Message) {
        let opcode = if msg.hdrs.len() == 1 {
            msg.hdrs.as_slice()[0] & 0x0F
        } else {
            match self.opts.ws_msg_type {
                WsMsgType::Text => OPCODE_TEXT,
                WsMsgType::Binary => OPCODE_BINARY
            }
        };

        let mut payload = Vec::with_capacity(msg.len());
        payload.extend_from_slice(msg.sphdr.as_slice());
        payload.extend_from_slice(msg.body.as_slice());

        let frame = build_frame(opcode, &payload, self.client);

        if self.sending.is_none() && self.state == State::Active {
            usock.send(frame, None);
            self.sending = Some(SendKind::Data);
        } else {
            self.pending_data = Some(frame);
        }
    }

    /// Hands the delivered message to the protocol and pumps the next
    /// one out of the carry buffer. A violation found here reports
    /// through the close frame send.
    pub fn recv_collect(&mut self, usock: &mut Usock, pipes: &mut HashMap<usize, PipeBase>, q: &mut EventQueues) -> Message {
        let msg = self.inmsg.take().expect("collect with no message pending");

        self.pump(usock, pipes, q);
        self.rearm_read(usock);
        msg
    }

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

struct Frame {
    fin: bool,
    opcode: u8,
    payload: Vec<u8>
}

enum ParseStep {
    Frame(Frame, usize),
    Incomplete,
    Violation(u16, &'static str)
}

/// Parses one frame off the front of `data`. Servers must receive
/// masked frames and clients unmasked ones, so the reader's role
/// decides which masking bit is a violation. A data frame declaring a
/// payload beyond `max_msg` is refused here, on the header alone, so an
/// over-limit body is never buffered while the frame completes.
fn parse_frame(data: &[u8], client: bool, max_msg: Option<usize>) -> ParseStep {
    if data.len() < 2 {
        return ParseStep::Incomplete;
    }

    let fin = data[0] & 0x80 != 0;
    let rsv = data[0] & 0x70;
    let opcode = data[0] & 0x0F;
    let masked = data[1] & 0x80 != 0;
    let len7 = (data[1] & 0x7F) as u64;

    if rsv != 0 {
        return ParseStep::Violation(CLOSE_PROTO, "reserved bits set");
    }
    if client && masked {
        return ParseStep::Violation(CLOSE_PROTO, "masked frame from the server");
    }
    if !client && !masked {
        return ParseStep::Violation(CLOSE_PROTO, "unmasked frame from the client");
    }
    if opcode >= OPCODE_CLOSE {
        // Control frames cannot be fragmented nor exceed 125 bytes.
        if !fin {
            return ParseStep::Violation(CLOSE_PROTO, "fragmented control frame");
        }
        if len7 > 125 {
            return ParseStep::Violation(CLOSE_PROTO, "oversized control frame");
        }
    }

    let mut offset = 2;
    let payload_len = match len7 {
        126 => {
            if data.len() < offset + 2 {
                return ParseStep::Incomplete;
            }
            let len = BigEndian::read_u16(&data[offset..offset + 2]) as u64;
            offset += 2;
            len
        },
        127 => {
            if data.len() < offset + 8 {
                return ParseStep::Incomplete;
            }
            let len = BigEndian::read_u64(&data[offset..offset + 8]);
            offset += 8;
            len
        },
        len => len
    };

    // Refuse over-limit data frames on the declared length, before any
    // of the body accumulates in the reassembly buffer. The fragment
    // total is checked again as the message is put together.
    if opcode < OPCODE_CLOSE {
        if let Some(max) = max_msg {
            if payload_len > max as u64 {
                return ParseStep::Violation(CLOSE_TOO_BIG, "frame larger than the receive limit");
            }
        }
    }

    let mask = if masked {
        if data.len() < offset + 4 {
            return ParseStep::Incomplete;
        }
        let mut mask = [0; 4];
        mask.copy_from_slice(&data[offset..offset + 4]);
        offset += 4;
        Some(mask)
    } else {
        None
    };

    if (data.len() - offset) < payload_len as usize {
        return ParseStep::Incomplete;
    }

    let mut payload = data[offset..offset + payload_len as usize].to_vec();
    if let Some(mask) = mask {
        for (index, byte) in payload.iter_mut().enumerate() {
            *byte ^= mask[index % 4];
        }
    }

    ParseStep::Frame(
        Frame {
            fin: fin,
            opcode: opcode,
            payload: payload
        },
        offset + payload_len as usize)
}

/// Builds one single-frame message; clients mask with a random key.
fn build_frame(opcode: u8, payload: &[u8], mask: bool) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + 14);

    frame.push(0x80 | (opcode & 0x0F));

    let mask_bit = if mask { 0x80 } else { 0x00 };
    if payload.len() <= 125 {
        frame.push(mask_bit | payload.len() as u8);
    } else if payload.len() <= 65535 {
        frame.push(mask_bit | 126);
        let mut len = [0; 2];
        BigEndian::write_u16(&mut len, payload.len() as u16);
        frame.extend_from_slice(&len);
    } else {
        frame.push(mask_bit | 127);
        let mut len = [0; 8];
        BigEndian::write_u64(&mut len, payload.len() as u64);
        frame.extend_from_slice(&len);
    }

    if mask {
        let key: [u8; 4] = rand::random();
        frame.extend_from_slice(&key);
        for (index, byte) in payload.iter().enumerate() {
            frame.push(byte ^ key[index % 4]);
        }
    } else {
        frame.extend_from_slice(payload);
    }
    frame
}

/// Incremental UTF-8 validation per RFC 3629: overlong forms, UTF-16
/// surrogates and code points above U+10FFFF are rejected as they are
/// seen, even across fragment boundaries.
struct Utf8Validator {
    /// Continuation bytes still expected.
    need: u8,
    /// Acceptable range of the next byte.
    lo: u8,
    hi: u8,
    /// How much of the accumulated text already went through.
    validated_up_to: usize
}

impl Utf8Validator {
    fn new() -> Utf8Validator {
        Utf8Validator {
            need: 0,
            lo: 0x80,
            hi: 0xBF,
            validated_up_to: 0
        }
    }

    fn push(&mut self, byte: u8) -> bool {
        if self.need > 0 {
            if byte < self.lo || byte > self.hi {
                return false;
            }
            self.need -= 1;
            self.lo = 0x80;
            self.hi = 0xBF;
            return true;
        }

        match byte {
            0x00..=0x7F => true,
            0xC2..=0xDF => {
                self.need = 1;
                true
            },
            0xE0 => {
                self.need = 2;
                self.lo = 0xA0;
                true
            },
            0xE1..=0xEC | 0xEE..=0xEF => {
                self.need = 2;
                true
            },
            0xED => {
                self.need = 2;
                self.hi = 0x9F;
                true
            },
            0xF0 => {
                self.need = 3;
                self.lo = 0x90;
                true
            },
            0xF1..=0xF3 => {
                self.need = 3;
                true
            },
            0xF4 => {
                self.need = 3;
                self.hi = 0x8F;
                true
            },
            _ => false
        }
    }

    fn is_complete(&self) -> bool {
        self.need == 0
    }
}

#[cfg(test)]
mod tests {
    use super::{build_frame, parse_frame, Frame, ParseStep, Utf8Validator};

    fn parse_ok(data: &[u8], client: bool) -> (Frame, usize) {
        match parse_frame(data, client, None) {
            ParseStep::Frame(frame, consumed) => (frame, consumed),
            ParseStep::Incomplete => panic!("frame unexpectedly incomplete"),
            ParseStep::Violation(code, reason) => panic!("unexpected violation {}: {}", code, reason)
        }
    }

    #[test]
    fn masked_frame_round_trips() {
        let built = build_frame(0x2, b"hello there", true);
        let (frame, consumed) = parse_ok(&built, false);

        assert_eq!(built.len(), consumed);
        assert!(frame.fin);
        assert_eq!(0x2, frame.opcode);
        assert_eq!(b"hello there".to_vec(), frame.payload);
    }

    #[test]
    fn extended_length_is_used_beyond_125_bytes() {
        let payload = vec![7; 300];
        let built = build_frame(0x2, &payload, false);

        assert_eq!(126, built[1] & 0x7F);
        let (frame, _) = parse_ok(&built, true);
        assert_eq!(300, frame.payload.len());
    }

    #[test]
    fn server_rejects_unmasked_client_frames() {
        let built = build_frame(0x1, b"oops", false);

        match parse_frame(&built, false, None) {
            ParseStep::Violation(1002, _) => {},
            _ => panic!("expected a protocol violation")
        }
    }

    #[test]
    fn client_rejects_masked_server_frames() {
        let built = build_frame(0x1, b"oops", true);

        match parse_frame(&built, true, None) {
            ParseStep::Violation(1002, _) => {},
            _ => panic!("expected a protocol violation")
        }
    }

    #[test]
    fn fragmented_control_frames_are_rejected() {
        let mut built = build_frame(0x9, b"ping", true);
        built[0] &= 0x7F;

        match parse_frame(&built, false, None) {
            ParseStep::Violation(1002, _) => {},
            _ => panic!("expected a protocol violation")
        }
    }

    #[test]
    fn truncated_frames_wait_for_more_bytes() {
        let built = build_frame(0x2, b"hello", true);

        for cut in 0..built.len() {
            match parse_frame(&built[..cut], false, None) {
                ParseStep::Incomplete => {},
                _ => panic!("expected incomplete at {} bytes", cut)
            }
        }
    }

    #[test]
    fn oversized_declared_length_is_rejected_on_the_header_alone() {
        // Binary frame header announcing a 1 GiB payload; no body bytes
        // follow. The limit must trip before any of them would buffer.
        let header = [0x82, 127, 0, 0, 0, 0, 0x40, 0, 0, 0];

        match parse_frame(&header, true, Some(64 * 1024)) {
            ParseStep::Violation(1009, _) => {},
            ParseStep::Incomplete => panic!("oversized frame waited for its body"),
            _ => panic!("expected a too-big violation")
        }

        // The same header is only incomplete when no limit is set.
        match parse_frame(&header, true, None) {
            ParseStep::Incomplete => {},
            _ => panic!("expected incomplete without a limit")
        }
    }

    #[test]
    fn utf8_accepts_multibyte_text() {
        let mut validator = Utf8Validator::new();

        // "café" in five bytes.
        for byte in [0x63, 0x61, 0x66, 0xC3, 0xA9].iter() {
            assert!(validator.push(*byte));
        }
        assert!(validator.is_complete());
    }

    #[test]
    fn utf8_rejects_bad_continuation() {
        let mut validator = Utf8Validator::new();

        assert!(validator.push(0xC3));
        assert!(!validator.push(0x28));
    }

    #[test]
    fn utf8_rejects_surrogates_and_overlongs() {
        // U+D800 encoded as ED A0 80.
        let mut validator = Utf8Validator::new();
        assert!(validator.push(0xED));
        assert!(!validator.push(0xA0));

        // Overlong: C0 AF.
        let mut validator = Utf8Validator::new();
        assert!(!validator.push(0xC0));

        // Above U+10FFFF: F4 90.
        let mut validator = Utf8Validator::new();
        assert!(validator.push(0xF4));
        assert!(!validator.push(0x90));
    }

    #[test]
    fn utf8_tracks_incomplete_sequences_across_pushes() {
        let mut validator = Utf8Validator::new();

        assert!(validator.push(0xE2));
        assert!(!validator.is_complete());
        assert!(validator.push(0x82));
        assert!(validator.push(0xAC));
        assert!(validator.is_complete());
    }
}
