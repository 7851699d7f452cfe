// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Readiness notifier over one worker's fd set. Handles are registered
//! with no direction armed; the owning machines arm and disarm reading
//! and writing as their operations progress. Error and hangup are always
//! reported.

use std::io;
use std::time::Duration;
use std::sync::atomic::{AtomicUsize, Ordering};

use mio;
use mio::unix::UnixReady;

/// Token of the worker wakeup registration.
pub const WAKEUP_TOKEN: usize = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollKind {
    In,
    Out,
    Err
}

/// Registration state of one fd: its token and the armed directions.
pub struct PollerHandle {
    token: usize,
    interest: mio::Ready
}

impl PollerHandle {
    pub fn token(&self) -> usize {
        self.token
    }
}

pub struct Poller {
    poll: mio::Poll,
    next_token: AtomicUsize
}

impl Poller {
    pub fn new() -> io::Result<Poller> {
        Ok(Poller {
            poll: mio::Poll::new()?,
            next_token: AtomicUsize::new(WAKEUP_TOKEN + 1)
        })
    }

    fn base_interest() -> mio::Ready {
        mio::Ready::from(UnixReady::error() | UnixReady::hup())
    }

    /// Registers an fd; neither direction is armed yet.
    pub fn add<E: mio::Evented>(&self, io: &E) -> io::Result<PollerHandle> {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let interest = Poller::base_interest();

        self.poll.register(io, mio::Token(token), interest, mio::PollOpt::level())?;

        Ok(PollerHandle {
            token: token,
            interest: interest
        })
    }

    pub fn add_wakeup(&self, registration: &mio::Registration) -> io::Result<()> {
        self.poll.register(
            registration,
            mio::Token(WAKEUP_TOKEN),
            mio::Ready::readable(),
            mio::PollOpt::level())
    }

    pub fn rm<E: mio::Evented>(&self, io: &E) -> io::Result<()> {
        self.poll.deregister(io)
    }

    pub fn set_in<E: mio::Evented>(&self, io: &E, hndl: &mut PollerHandle) -> io::Result<()> {
        self.update(io, hndl, hndl.interest | mio::Ready::readable())
    }

    pub fn reset_in<E: mio::Evented>(&self, io: &E, hndl: &mut PollerHandle) -> io::Result<()> {
        self.update(io, hndl, hndl.interest - mio::Ready::readable())
    }

    pub fn set_out<E: mio::Evented>(&self, io: &E, hndl: &mut PollerHandle) -> io::Result<()> {
        self.update(io, hndl, hndl.interest | mio::Ready::writable())
    }

    pub fn reset_out<E: mio::Evented>(&self, io: &E, hndl: &mut PollerHandle) -> io::Result<()> {
        self.update(io, hndl, hndl.interest - mio::Ready::writable())
    }

    fn update<E: mio::Evented>(&self, io: &E, hndl: &mut PollerHandle, interest: mio::Ready) -> io::Result<()> {
        if interest != hndl.interest {
            self.poll.reregister(io, mio::Token(hndl.token), interest, mio::PollOpt::level())?;
            hndl.interest = interest;
        }
        Ok(())
    }

    /// Blocks until readiness or timeout; `None` waits forever.
    pub fn wait(&self, events: &mut mio::Events, timeout: Option<Duration>) -> io::Result<usize> {
        self.poll.poll(events, timeout)
    }
}

/// Splits one readiness value into the per-direction kinds the owning
/// machines are fed with. Error and hangup preempt data directions.
pub fn kinds(readiness: mio::Ready) -> Vec<PollKind> {
    let unix = UnixReady::from(readiness);

    if unix.is_error() || unix.is_hup() {
        return vec![PollKind::Err];
    }

    let mut kinds = Vec::with_capacity(2);
    if readiness.is_readable() {
        kinds.push(PollKind::In);
    }
    if readiness.is_writable() {
        kinds.push(PollKind::Out);
    }
    kinds
}
