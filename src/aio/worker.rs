// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Dedicated I/O thread owning a poller, a timer set and a command queue.
//!
//! Other threads deposit commands and signal the wakeup; the worker
//! drains them one at a time under its own mutex, waits for readiness and
//! feeds fd, timer and task events into the owning contexts. The poller
//! registrations and the timer set are mutated only on the worker thread.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use mio;

use aio::{Event, EventTarget};
use aio::poller::{self, Poller, PollerHandle, PollKind, WAKEUP_TOKEN};
use aio::timerset::TimerSet;

pub enum WorkerCmd {
    /// Feed `event` to the target under its context, on the worker thread.
    Execute {
        target: EventTarget,
        event: Event,
        arg: usize
    },
    AddTimer {
        token: usize,
        delay: Duration,
        target: EventTarget
    },
    RmTimer {
        token: usize
    },
    Stop
}

pub struct Worker {
    poller: Poller,
    fds: Mutex<HashMap<usize, EventTarget>>,
    cmds: Mutex<VecDeque<WorkerCmd>>,
    wakeup: mio::SetReadiness,
    timer_tokens: AtomicUsize
}

impl Worker {
    /// Creates the worker and starts its thread.
    pub fn start(name: String) -> io::Result<(Arc<Worker>, thread::JoinHandle<()>)> {
        let poller = Poller::new()?;
        let (registration, set_readiness) = mio::Registration::new2();

        poller.add_wakeup(&registration)?;

        let worker = Arc::new(Worker {
            poller: poller,
            fds: Mutex::new(HashMap::new()),
            cmds: Mutex::new(VecDeque::new()),
            wakeup: set_readiness,
            timer_tokens: AtomicUsize::new(1)
        });
        let routine = worker.clone();
        let thread = thread::Builder::new().name(name).spawn(move || {
            routine.run(registration);
        })?;

        Ok((worker, thread))
    }

    /// Deposits a command and wakes the worker up. Any thread.
    pub fn post(&self, cmd: WorkerCmd) {
        self.cmds.lock().unwrap().push_back(cmd);
        let _ = self.wakeup.set_readiness(mio::Ready::readable());
    }

    pub fn execute(&self, target: EventTarget, event: Event, arg: usize) {
        self.post(WorkerCmd::Execute {
            target: target,
            event: event,
            arg: arg
        });
    }

    pub fn next_timer_token(&self) -> usize {
        self.timer_tokens.fetch_add(1, Ordering::Relaxed)
    }

    /// Registers an fd; events will be fed to `target` with
    /// `Event::In`/`Out`/`Err`.
    pub fn add_fd<E: mio::Evented>(&self, io: &E, target: EventTarget) -> io::Result<PollerHandle> {
        let hndl = self.poller.add(io)?;

        self.fds.lock().unwrap().insert(hndl.token(), target);

        Ok(hndl)
    }

    pub fn rm_fd<E: mio::Evented>(&self, io: &E, hndl: &PollerHandle) {
        self.fds.lock().unwrap().remove(&hndl.token());
        let _ = self.poller.rm(io);
    }

    pub fn set_in<E: mio::Evented>(&self, io: &E, hndl: &mut PollerHandle) -> io::Result<()> {
        self.poller.set_in(io, hndl)
    }

    pub fn reset_in<E: mio::Evented>(&self, io: &E, hndl: &mut PollerHandle) -> io::Result<()> {
        self.poller.reset_in(io, hndl)
    }

    pub fn set_out<E: mio::Evented>(&self, io: &E, hndl: &mut PollerHandle) -> io::Result<()> {
        self.poller.set_out(io, hndl)
    }

    pub fn reset_out<E: mio::Evented>(&self, io: &E, hndl: &mut PollerHandle) -> io::Result<()> {
        self.poller.reset_out(io, hndl)
    }

    fn run(self: Arc<Worker>, _wakeup_registration: mio::Registration) {
        let mut events = mio::Events::with_capacity(1024);
        let mut timers: TimerSet<EventTarget> = TimerSet::new();
        let mut stopping = false;

        loop {
            let timeout = timers.next_timeout();
            if let Err(err) = self.poller.wait(&mut events, timeout) {
                error!("[worker] poll failed: {:?}", err);
                break;
            }

            // Clear the wakeup before draining: a command deposited
            // after the drain keeps its wakeup and ends the next poll.
            let _ = self.wakeup.set_readiness(mio::Ready::empty());

            // Commands first: a command may cancel a timer whose deadline
            // is in this very batch.
            loop {
                let cmd = self.cmds.lock().unwrap().pop_front();
                match cmd {
                    Some(WorkerCmd::Execute { target, event, arg }) => target.deliver(event, arg),
                    Some(WorkerCmd::AddTimer { token, delay, target }) => timers.add(token, delay, target),
                    Some(WorkerCmd::RmTimer { token }) => {
                        timers.remove(token);
                    },
                    Some(WorkerCmd::Stop) => stopping = true,
                    None => break
                }
            }

            for event in events.iter() {
                if event.token() == mio::Token(WAKEUP_TOKEN) {
                    continue;
                }

                let target = self.fds.lock().unwrap().get(&event.token().0).cloned();
                let target = match target {
                    Some(target) => target,
                    None => continue
                };

                for kind in poller::kinds(event.readiness()) {
                    match kind {
                        PollKind::In => target.deliver(Event::In, 0),
                        PollKind::Out => target.deliver(Event::Out, 0),
                        PollKind::Err => target.deliver(Event::Err, 0)
                    }
                }
            }

            while let Some((token, target)) = timers.pop_expired() {
                target.deliver(Event::Timeout, token);
            }

            if stopping {
                break;
            }
        }
    }
}
