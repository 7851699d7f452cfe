// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Asynchronous stream socket. Send and receive hop to the owning worker
//! through per-operation tasks; readiness comes back as fd events. Receive
//! goes through a coalescing batch buffer so a stream of small reads does
//! not turn into a stream of small syscalls.

use std::io::{self, Read};
use std::mem;
use std::net::SocketAddr;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;
use std::sync::Arc;

use iovec::IoVec;
use libc;
use mio;
use mio_uds;

use aio::{Event, EventTarget, Source};
use aio::poller::PollerHandle;
use aio::worker::Worker;
use message::Message;
use io_error::{is_resource_exhaustion, is_transient, is_would_block, other_io_error};

/// Size of the read coalescing buffer.
const BATCH_SIZE: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Starting,
    BeingAccepted,
    Accepted,
    Connecting,
    Active,
    RemovingFd,
    Done,
    Listening,
    Accepting,
    Cancelling,
    Stopping,
    StoppingAccept,
    AcceptingError
}

pub enum UsockIo {
    TcpStream(mio::net::TcpStream),
    TcpListener(mio::net::TcpListener),
    UnixStream(mio_uds::UnixStream),
    UnixListener(mio_uds::UnixListener)
}

impl mio::Evented for UsockIo {
    fn register(&self, poll: &mio::Poll, token: mio::Token, interest: mio::Ready, opts: mio::PollOpt) -> io::Result<()> {
        match *self {
            UsockIo::TcpStream(ref io) => io.register(poll, token, interest, opts),
            UsockIo::TcpListener(ref io) => io.register(poll, token, interest, opts),
            UsockIo::UnixStream(ref io) => io.register(poll, token, interest, opts),
            UsockIo::UnixListener(ref io) => io.register(poll, token, interest, opts)
        }
    }

    fn reregister(&self, poll: &mio::Poll, token: mio::Token, interest: mio::Ready, opts: mio::PollOpt) -> io::Result<()> {
        match *self {
            UsockIo::TcpStream(ref io) => io.reregister(poll, token, interest, opts),
            UsockIo::TcpListener(ref io) => io.reregister(poll, token, interest, opts),
            UsockIo::UnixStream(ref io) => io.reregister(poll, token, interest, opts),
            UsockIo::UnixListener(ref io) => io.reregister(poll, token, interest, opts)
        }
    }

    fn deregister(&self, poll: &mio::Poll) -> io::Result<()> {
        match *self {
            UsockIo::TcpStream(ref io) => io.deregister(poll),
            UsockIo::TcpListener(ref io) => io.deregister(poll),
            UsockIo::UnixStream(ref io) => io.deregister(poll),
            UsockIo::UnixListener(ref io) => io.deregister(poll)
        }
    }
}

impl UsockIo {
    fn read_some(&self, buf: &mut [u8]) -> io::Result<usize> {
        match *self {
            UsockIo::TcpStream(ref io) => {
                let mut io: &mio::net::TcpStream = io;
                io.read(buf)
            },
            UsockIo::UnixStream(ref io) => {
                let n = unsafe {
                    libc::read(io.as_raw_fd(), buf.as_mut_ptr() as *mut libc::c_void, buf.len())
                };
                if n < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(n as usize)
                }
            },
            _ => Err(other_io_error("not a stream"))
        }
    }

    fn write_vectored(&self, bufs: &[&IoVec]) -> io::Result<usize> {
        match *self {
            UsockIo::TcpStream(ref io) => io.write_bufs(bufs),
            UsockIo::UnixStream(ref io) => {
                let iov: Vec<libc::iovec> = bufs.iter().map(|buf| {
                    libc::iovec {
                        iov_base: buf.as_ptr() as *mut libc::c_void,
                        iov_len: buf.len()
                    }
                }).collect();
                let n = unsafe {
                    libc::writev(io.as_raw_fd(), iov.as_ptr(), iov.len() as libc::c_int)
                };
                if n < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(n as usize)
                }
            },
            _ => Err(other_io_error("not a stream"))
        }
    }

    fn accept_stream(&self) -> io::Result<Option<UsockIo>> {
        match *self {
            UsockIo::TcpListener(ref io) => match io.accept() {
                Ok((stream, _)) => Ok(Some(UsockIo::TcpStream(stream))),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
                Err(e) => Err(e)
            },
            UsockIo::UnixListener(ref io) => match io.accept() {
                Ok(Some((stream, _))) => Ok(Some(UsockIo::UnixStream(stream))),
                Ok(None) => Ok(None),
                Err(e) => Err(e)
            },
            _ => Err(other_io_error("not a listener"))
        }
    }

    fn take_error(&self) -> io::Result<Option<io::Error>> {
        match *self {
            UsockIo::TcpStream(ref io) => io.take_error(),
            UsockIo::UnixStream(ref io) => io.take_error(),
            _ => Ok(None)
        }
    }

    fn raw_fd(&self) -> RawFd {
        match *self {
            UsockIo::TcpStream(ref io) => io.as_raw_fd(),
            UsockIo::TcpListener(ref io) => io.as_raw_fd(),
            UsockIo::UnixStream(ref io) => io.as_raw_fd(),
            UsockIo::UnixListener(ref io) => io.as_raw_fd()
        }
    }

    pub fn set_nodelay(&self, nodelay: bool) {
        if let UsockIo::TcpStream(ref io) = *self {
            let _ = io.set_nodelay(nodelay);
        }
    }
}

/// What a usock reports to its owner.
pub enum UsockOut {
    Established,
    Accepted(UsockIo),
    AcceptError,
    Sent,
    Received,
    Shutdown,
    Error(io::Error),
    Stopped
}

struct SendOp {
    hdr: Vec<u8>,
    msg: Option<Message>,
    pos: usize
}

impl SendOp {
    fn total(&self) -> usize {
        self.hdr.len() + self.msg.as_ref().map_or(0, |m| m.len())
    }
}

struct RecvOp {
    buf: Vec<u8>,
    pos: usize,
    exact: bool,
    want_fd: bool
}

pub struct Usock {
    state: State,
    io: Option<UsockIo>,
    hndl: Option<PollerHandle>,
    worker: Arc<Worker>,
    target: EventTarget,
    sending: Option<SendOp>,
    receiving: Option<RecvOp>,
    batch: Option<Vec<u8>>,
    batch_len: usize,
    batch_pos: usize,
    received_fd: Option<RawFd>,
    last_error: Option<io::Error>
}

impl Usock {
    fn new(worker: Arc<Worker>, target: EventTarget, state: State) -> Usock {
        Usock {
            state: state,
            io: None,
            hndl: None,
            worker: worker,
            target: target,
            sending: None,
            receiving: None,
            batch: None,
            batch_len: 0,
            batch_pos: 0,
            received_fd: None,
            last_error: None
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Starts a non-blocking connect towards the resolved address.
    pub fn tcp_connect(worker: Arc<Worker>, target: EventTarget, addr: &SocketAddr) -> io::Result<Usock> {
        let stream = mio::net::TcpStream::connect(addr)?;
        Usock::connecting(worker, target, UsockIo::TcpStream(stream))
    }

    pub fn unix_connect(worker: Arc<Worker>, target: EventTarget, path: &Path) -> io::Result<Usock> {
        let stream = mio_uds::UnixStream::connect(path)?;
        Usock::connecting(worker, target, UsockIo::UnixStream(stream))
    }

    fn connecting(worker: Arc<Worker>, target: EventTarget, io: UsockIo) -> io::Result<Usock> {
        let mut usock = Usock::new(worker, target, State::Starting);

        usock.register(io)?;
        usock.state = State::Connecting;
        usock.worker.execute(usock.target.with_src(Source::TaskConnect), Event::Execute, 0);

        Ok(usock)
    }

    pub fn tcp_listen(worker: Arc<Worker>, target: EventTarget, addr: &SocketAddr) -> io::Result<Usock> {
        let listener = mio::net::TcpListener::bind(addr)?;
        Usock::listening(worker, target, UsockIo::TcpListener(listener))
    }

    pub fn unix_listen(worker: Arc<Worker>, target: EventTarget, path: &Path) -> io::Result<Usock> {
        let listener = mio_uds::UnixListener::bind(path)?;
        Usock::listening(worker, target, UsockIo::UnixListener(listener))
    }

    fn listening(worker: Arc<Worker>, target: EventTarget, io: UsockIo) -> io::Result<Usock> {
        let mut usock = Usock::new(worker, target, State::Starting);

        usock.register(io)?;
        usock.state = State::Listening;

        Ok(usock)
    }

    /// Wraps a stream handed over by a listener.
    pub fn from_accepted(worker: Arc<Worker>, target: EventTarget, io: UsockIo) -> io::Result<Usock> {
        let mut usock = Usock::new(worker, target, State::BeingAccepted);

        usock.register(io)?;
        usock.state = State::Accepted;

        Ok(usock)
    }

    fn register(&mut self, io: UsockIo) -> io::Result<()> {
        let hndl = self.worker.add_fd(&io, self.target.clone())?;

        self.io = Some(io);
        self.hndl = Some(hndl);

        Ok(())
    }

    pub fn io(&self) -> Option<&UsockIo> {
        self.io.as_ref()
    }

    pub fn activate(&mut self) {
        match self.state {
            State::Accepted | State::Connecting => self.state = State::Active,
            state => bad_state!("usock", state)
        }
    }

    /// Begins accepting one connection; the accepted stream is reported
    /// through `UsockOut::Accepted`.
    pub fn accept(&mut self) {
        match self.state {
            State::Listening | State::AcceptingError => {
                self.state = State::Accepting;
                self.worker.execute(self.target.with_src(Source::TaskAccept), Event::Execute, 0);
            },
            state => bad_state!("usock", state)
        }
    }

    /// Queues the message for sending: an optional transport header
    /// followed by the message protocol header and body, written with
    /// a single gathered write per readiness.
    pub fn send(&mut self, hdr: Vec<u8>, msg: Option<Message>) {
        assert!(self.sending.is_none(), "usock send while another send is in progress");
        assert_eq!(State::Active, self.state, "usock send while not active");

        self.sending = Some(SendOp {
            hdr: hdr,
            msg: msg,
            pos: 0
        });
        self.worker.execute(self.target.with_src(Source::TaskSend), Event::Execute, 0);
    }

    /// Requests exactly `len` bytes.
    pub fn recv_exact(&mut self, len: usize, want_fd: bool) {
        self.start_recv(RecvOp {
            buf: vec![0; len],
            pos: 0,
            exact: true,
            want_fd: want_fd
        });
    }

    /// Requests whatever arrives next, up to `max` bytes.
    pub fn recv_some(&mut self, max: usize) {
        self.start_recv(RecvOp {
            buf: vec![0; max],
            pos: 0,
            exact: false,
            want_fd: false
        });
    }

    fn start_recv(&mut self, op: RecvOp) {
        assert!(self.receiving.is_none(), "usock recv while another recv is in progress");
        assert_eq!(State::Active, self.state, "usock recv while not active");

        self.receiving = Some(op);
        self.worker.execute(self.target.with_src(Source::TaskRecv), Event::Execute, 0);
    }

    /// The bytes of the completed receive.
    pub fn take_recv_buf(&mut self) -> Vec<u8> {
        let op = self.receiving.take().expect("no completed recv to take");
        let mut buf = op.buf;
        buf.truncate(op.pos);
        buf
    }

    pub fn take_received_fd(&mut self) -> Option<RawFd> {
        self.received_fd.take()
    }

    pub fn take_last_error(&mut self) -> Option<io::Error> {
        self.last_error.take()
    }

    /// Asynchronous stop; `UsockOut::Stopped` is reported from the worker.
    /// Stopping twice is fine, the second request is absorbed.
    pub fn stop(&mut self) {
        match self.state {
            State::Stopping | State::Cancelling | State::StoppingAccept => return,
            State::Accepting => self.state = State::Cancelling,
            State::BeingAccepted => self.state = State::StoppingAccept,
            _ => self.state = State::Stopping
        }
        self.worker.execute(self.target.with_src(Source::TaskStop), Event::Execute, 0);
    }

    /// Routes one raw worker event. Runs on the worker thread.
    pub fn feed(&mut self, src: Source, event: Event) -> Option<UsockOut> {
        match (self.state, src, event) {
            (State::Connecting, Source::TaskConnect, Event::Execute) => {
                self.arm_out();
                None
            },
            (State::Connecting, Source::Fd, Event::Out) => {
                self.disarm_out();
                match self.io.as_ref().and_then(|io| io.take_error().unwrap_or(None)) {
                    Some(err) => Some(self.fatal(err)),
                    None => Some(UsockOut::Established)
                }
            },
            (State::Connecting, Source::Fd, Event::Err) => {
                let err = self.io.as_ref().
                    and_then(|io| io.take_error().unwrap_or(None)).
                    unwrap_or_else(|| other_io_error("connection refused"));
                Some(self.fatal(err))
            },

            (State::Accepting, Source::TaskAccept, Event::Execute) |
            (State::Accepting, Source::Fd, Event::In) => self.process_accept(),

            (State::Active, Source::TaskSend, Event::Execute) |
            (State::Active, Source::Fd, Event::Out) => self.process_send(),

            (State::Active, Source::TaskRecv, Event::Execute) |
            (State::Active, Source::Fd, Event::In) => self.process_recv(),

            (State::Active, Source::Fd, Event::Err) => {
                let err = self.io.as_ref().
                    and_then(|io| io.take_error().unwrap_or(None)).
                    unwrap_or_else(|| other_io_error("connection broken"));
                Some(self.fatal(err))
            },

            (State::Stopping, Source::TaskStop, Event::Execute) |
            (State::Cancelling, Source::TaskStop, Event::Execute) |
            (State::StoppingAccept, Source::TaskStop, Event::Execute) => {
                self.state = State::RemovingFd;
                self.remove_fd();
                self.sending = None;
                self.receiving = None;
                self.state = State::Idle;
                Some(UsockOut::Stopped)
            },

            // Readiness that raced an operation completion, a state
            // change or a stop; level triggered polling makes these
            // unavoidable and harmless.
            (_, Source::Fd, _) => None,
            (_, Source::TaskSend, Event::Execute) |
            (_, Source::TaskRecv, Event::Execute) |
            (_, Source::TaskAccept, Event::Execute) |
            (_, Source::TaskConnect, Event::Execute) |
            (_, Source::TaskStop, Event::Execute) => None,

            (state, src, event) => bad_event!("usock", state, src, event)
        }
    }

    fn process_accept(&mut self) -> Option<UsockOut> {
        loop {
            let accepted = match self.io.as_ref() {
                Some(io) => io.accept_stream(),
                None => return None
            };

            match accepted {
                Ok(Some(stream)) => {
                    self.disarm_in();
                    self.state = State::Listening;
                    return Some(UsockOut::Accepted(stream));
                },
                Ok(None) => {
                    self.arm_in();
                    return None;
                },
                Err(ref err) if is_transient(err) => continue,
                Err(err) => {
                    self.disarm_in();
                    if is_resource_exhaustion(&err) {
                        debug!("usock accept hit resource exhaustion: {:?}", err);
                    }
                    self.last_error = Some(err);
                    self.state = State::AcceptingError;
                    return Some(UsockOut::AcceptError);
                }
            }
        }
    }

    fn process_send(&mut self) -> Option<UsockOut> {
        if self.sending.is_none() {
            return None;
        }

        loop {
            let written = {
                let op = self.sending.as_ref().unwrap();
                let io = self.io.as_ref().unwrap();
                let mut segments: Vec<&[u8]> = Vec::with_capacity(3);
                let mut skip = op.pos;

                for part in op.parts() {
                    if skip >= part.len() {
                        skip -= part.len();
                    } else {
                        segments.push(&part[skip..]);
                        skip = 0;
                    }
                }

                let iovecs: Vec<&IoVec> = segments.iter().
                    filter_map(|s| IoVec::from_bytes(*s)).
                    collect();

                if iovecs.is_empty() {
                    Ok(0)
                } else {
                    io.write_vectored(&iovecs)
                }
            };

            match written {
                Ok(n) => {
                    let done = {
                        let op = self.sending.as_mut().unwrap();
                        op.pos += n;
                        op.pos >= op.total()
                    };
                    if done {
                        self.sending = None;
                        self.disarm_out();
                        return Some(UsockOut::Sent);
                    }
                },
                Err(ref err) if is_would_block(err) => {
                    self.arm_out();
                    return None;
                },
                Err(err) => return Some(self.fatal(err))
            }
        }
    }

    fn process_recv(&mut self) -> Option<UsockOut> {
        if self.receiving.is_none() {
            return None;
        }

        loop {
            // Serve as much as possible from the batch buffer.
            if self.batch_pos < self.batch_len {
                let op = self.receiving.as_mut().unwrap();
                let available = self.batch_len - self.batch_pos;
                let wanted = op.buf.len() - op.pos;
                let n = ::std::cmp::min(available, wanted);
                let batch = self.batch.as_ref().unwrap();

                op.buf[op.pos..op.pos + n].copy_from_slice(&batch[self.batch_pos..self.batch_pos + n]);
                op.pos += n;
                self.batch_pos += n;
            }

            if self.recv_complete() {
                self.disarm_in();
                return Some(UsockOut::Received);
            }

            let read = self.read_more();

            match read {
                Ok(0) => {
                    self.disarm_in();
                    return Some(UsockOut::Shutdown);
                },
                Ok(_) => {
                    if self.recv_complete() {
                        self.disarm_in();
                        return Some(UsockOut::Received);
                    }
                },
                Err(ref err) if is_would_block(err) => {
                    self.arm_in();
                    return None;
                },
                Err(err) => return Some(self.fatal(err))
            }
        }
    }

    fn recv_complete(&self) -> bool {
        match self.receiving.as_ref() {
            Some(op) => {
                if op.exact {
                    op.pos == op.buf.len()
                } else {
                    op.pos > 0
                }
            },
            None => false
        }
    }

    /// One read syscall: straight into the request when it is larger than
    /// the batch buffer or wants ancillary data, into the batch otherwise.
    fn read_more(&mut self) -> io::Result<usize> {
        let (direct, want_fd) = {
            let op = self.receiving.as_ref().unwrap();
            (op.want_fd || op.buf.len() - op.pos > BATCH_SIZE, op.want_fd)
        };

        if direct {
            let raw_fd = self.io.as_ref().unwrap().raw_fd();
            let op = self.receiving.as_mut().unwrap();
            let (n, fd) = if want_fd {
                recv_with_rights(raw_fd, &mut op.buf[op.pos..])?
            } else {
                let io = self.io.as_ref().unwrap();
                (io.read_some(&mut op.buf[op.pos..])?, None)
            };

            if let Some(fd) = fd {
                self.received_fd = Some(fd);
            }
            let op = self.receiving.as_mut().unwrap();
            op.pos += n;
            Ok(n)
        } else {
            // Lazily allocated so listener-only and inproc-bound sockets
            // never pay for it.
            if self.batch.is_none() {
                self.batch = Some(vec![0; BATCH_SIZE]);
            }
            let n = {
                let io = self.io.as_ref().unwrap();
                let batch = self.batch.as_mut().unwrap();
                io.read_some(&mut batch[..])?
            };
            self.batch_len = n;
            self.batch_pos = 0;
            Ok(n)
        }
    }

    fn fatal(&mut self, err: io::Error) -> UsockOut {
        debug!("usock failed: {:?}", err);
        self.remove_fd();
        self.sending = None;
        self.receiving = None;
        self.state = State::Done;
        UsockOut::Error(err)
    }

    fn remove_fd(&mut self) {
        if let (Some(io), Some(hndl)) = (self.io.take(), self.hndl.take()) {
            self.worker.rm_fd(&io, &hndl);
        }
    }

    fn arm_in(&mut self) {
        if let (Some(io), Some(hndl)) = (self.io.as_ref(), self.hndl.as_mut()) {
            let _ = self.worker.set_in(io, hndl);
        }
    }

    fn disarm_in(&mut self) {
        if let (Some(io), Some(hndl)) = (self.io.as_ref(), self.hndl.as_mut()) {
            let _ = self.worker.reset_in(io, hndl);
        }
    }

    fn arm_out(&mut self) {
        if let (Some(io), Some(hndl)) = (self.io.as_ref(), self.hndl.as_mut()) {
            let _ = self.worker.set_out(io, hndl);
        }
    }

    fn disarm_out(&mut self) {
        if let (Some(io), Some(hndl)) = (self.io.as_ref(), self.hndl.as_mut()) {
            let _ = self.worker.reset_out(io, hndl);
        }
    }
}

impl Drop for Usock {
    fn drop(&mut self) {
        // A descriptor nobody asked for must not leak.
        if let Some(fd) = self.received_fd.take() {
            unsafe { libc::close(fd); }
        }
    }
}

impl SendOp {
    fn parts(&self) -> Vec<&[u8]> {
        let mut parts = Vec::with_capacity(3);

        parts.push(&self.hdr[..]);
        if let Some(ref msg) = self.msg {
            parts.push(msg.sphdr.as_slice());
            parts.push(msg.body.as_slice());
        }
        parts
    }
}

/// `recvmsg` with room for one `SCM_RIGHTS` descriptor, used by the
/// tcpmux daemon hand-off.
fn recv_with_rights(fd: RawFd, buf: &mut [u8]) -> io::Result<(usize, Option<RawFd>)> {
    unsafe {
        let mut iov = libc::iovec {
            iov_base: buf.as_mut_ptr() as *mut libc::c_void,
            iov_len: buf.len()
        };
        let mut cmsg_space = [0u8; 64];
        let mut msg: libc::msghdr = mem::zeroed();

        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        msg.msg_control = cmsg_space.as_mut_ptr() as *mut libc::c_void;
        msg.msg_controllen = cmsg_space.len() as _;

        let n = libc::recvmsg(fd, &mut msg, 0);
        if n < 0 {
            return Err(io::Error::last_os_error());
        }

        let mut received = None;
        let mut cmsg = libc::CMSG_FIRSTHDR(&msg);
        while !cmsg.is_null() {
            if (*cmsg).cmsg_level == libc::SOL_SOCKET && (*cmsg).cmsg_type == libc::SCM_RIGHTS {
                let passed = *(libc::CMSG_DATA(cmsg) as *const RawFd);
                if received.is_none() {
                    received = Some(passed);
                } else {
                    // Only one descriptor per hand-off; never leak spares.
                    libc::close(passed);
                }
            }
            cmsg = libc::CMSG_NXTHDR(&msg, cmsg);
        }

        Ok((n as usize, received))
    }
}
