// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Surveyor. Each survey is stamped with a fresh id and fanned out to
//! every respondent pipe; responses are accepted while the deadline
//! timer runs and matched against the current survey id. Starting a new
//! survey cancels the running one.

use std::collections::HashSet;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use byteorder::{BigEndian, ByteOrder};
use rand;

use aio::{Addr, Event, EventTarget, Source};
use aio::ctx::Ctx;
use aio::timer::Timer;
use aio::worker::Worker;
use global::SocketType;
use message::{Chunk, Message};
use options::SocketOption;
use pipe::{PIPE_PARSED, PIPE_RELEASE};
use protocol::{EVENT_IN, EVENT_OUT, PipeSet, Sockbase};
use protocol::fq::FairQueue;
use io_error::{fsm_error, no_protocol_option_error, timedout_io_error, would_block_error};

const DEFAULT_DEADLINE: u64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    /// No survey running.
    Passive,
    /// Survey out, deadline timer running, gathering responses.
    Active,
    /// New survey submitted while one was running; waiting for the
    /// timer to stop before sending it.
    Cancelling,
    /// Deadline reached; the next receive reports it.
    TimedOut,
    Stopping
}

pub struct Surveyor {
    state: State,
    fq: FairQueue,
    pipes: HashSet<usize>,
    dist: HashSet<usize>,
    survey_id: u32,
    pending: Option<Message>,
    deadline: Duration,
    timer: Option<Timer>
}

impl Surveyor {
    pub fn new() -> Surveyor {
        Surveyor {
            state: State::Idle,
            fq: FairQueue::new(),
            pipes: HashSet::new(),
            dist: HashSet::new(),
            survey_id: rand::random(),
            pending: None,
            deadline: Duration::from_millis(DEFAULT_DEADLINE),
            timer: None
        }
    }

    fn wire_id(&self) -> u32 {
        self.survey_id | 0x80000000
    }

    fn timer(&mut self) -> &mut Timer {
        self.timer.as_mut().expect("surveyor used before the socket started")
    }

    fn broadcast(&mut self, set: &mut PipeSet, msg: Message) {
        let targets: Vec<usize> = self.dist.iter().cloned().collect();

        for pid in targets {
            let flags = set.send(pid, msg.clone());
            if flags & PIPE_RELEASE != 0 {
                self.dist.remove(&pid);
            }
        }
    }

    fn start_survey(&mut self, set: &mut PipeSet) {
        let msg = self.pending.take().expect("no survey to start");

        self.broadcast(set, msg);
        let deadline = self.deadline;
        self.timer().start(deadline);
        self.state = State::Active;
    }

    /// Next response to the current survey, with the id stripped.
    fn pull_response(&mut self, set: &mut PipeSet) -> io::Result<Message> {
        loop {
            let (mut msg, flags, _) = self.fq.recv(set)?;

            if flags & PIPE_PARSED == 0 {
                if msg.body.len() < 4 {
                    continue;
                }
                let sphdr = Chunk::from_slice(&msg.body.as_slice()[..4]);
                msg.body.trim_front(4);
                msg.sphdr = sphdr;
            }

            if msg.sphdr.len() != 4 {
                continue;
            }
            let id = BigEndian::read_u32(msg.sphdr.as_slice());
            if id != self.wire_id() {
                trace!("[surveyor] dropping response to old survey {:08x}", id);
                continue;
            }

            msg.sphdr = Chunk::empty();
            return Ok(msg);
        }
    }
}

impl Sockbase for Surveyor {
    fn socket_type(&self) -> SocketType {
        SocketType::Surveyor
    }

    fn started(&mut self, worker: &Arc<Worker>, ctx: &Arc<Ctx>) {
        let target = EventTarget::new(ctx, Addr::Sock, Source::DeadlineTimer);

        self.timer = Some(Timer::new(worker.clone(), target));
        self.state = State::Passive;
    }

    fn stop(&mut self) {
        if let Some(ref mut timer) = self.timer {
            timer.stop();
        }
        self.state = State::Stopping;
    }

    fn add_pipe(&mut self, set: &mut PipeSet, pid: usize) {
        self.pipes.insert(pid);
        self.fq.add(pid, set.opts(pid).recv_priority);
    }

    fn remove_pipe(&mut self, _: &mut PipeSet, pid: usize) {
        self.dist.remove(&pid);
        self.pipes.remove(&pid);
        self.fq.remove(pid);
    }

    fn on_pipe_in(&mut self, _: &mut PipeSet, pid: usize) {
        self.fq.on_in(pid);
    }

    fn on_pipe_out(&mut self, _: &mut PipeSet, pid: usize) {
        if self.pipes.contains(&pid) {
            self.dist.insert(pid);
        }
    }

    fn events(&self) -> u32 {
        // A new survey can always be started; it cancels the running one.
        let mut events = EVENT_OUT;

        match self.state {
            State::Active if self.fq.can_recv() => events |= EVENT_IN,
            // Wake a blocked receive so it can report the deadline.
            State::TimedOut => events |= EVENT_IN,
            _ => {}
        }
        events
    }

    fn send(&mut self, set: &mut PipeSet, mut msg: Message) -> io::Result<()> {
        self.survey_id = self.survey_id.wrapping_add(1) & 0x7fffffff;

        let mut sphdr = [0; 4];
        BigEndian::write_u32(&mut sphdr, self.wire_id());
        msg.sphdr = Chunk::from_slice(&sphdr);
        self.pending = Some(msg);

        match self.state {
            // The deadline timer can still be winding down from the
            // previous survey; start once its stop is acknowledged.
            State::Passive | State::TimedOut => {
                if self.timer().is_idle() {
                    self.start_survey(set);
                } else {
                    self.state = State::Cancelling;
                }
            },
            State::Active => {
                self.timer().stop();
                self.state = State::Cancelling;
            },
            State::Cancelling => {},
            state => bad_event!("surveyor", state, Source::Action, Event::Sent)
        }
        Ok(())
    }

    fn recv(&mut self, set: &mut PipeSet) -> io::Result<Message> {
        match self.state {
            State::Active => self.pull_response(set),
            State::TimedOut => {
                self.state = State::Passive;
                Err(timedout_io_error("survey deadline reached"))
            },
            State::Cancelling => Err(would_block_error()),
            _ => Err(fsm_error())
        }
    }

    fn on_timer(&mut self, set: &mut PipeSet, src: Source, event: Event, arg: usize) {
        assert_eq!(Source::DeadlineTimer, src);

        let event = match self.timer().feed(event, arg) {
            Some(event) => event,
            None => return
        };

        match (self.state, event) {
            (State::Active, Event::Timeout) => {
                self.timer().stop();
                self.state = State::TimedOut;
            },
            (State::TimedOut, Event::Stopped) => {},
            (State::Cancelling, Event::Stopped) => self.start_survey(set),
            (State::Stopping, Event::Stopped) => {},
            (state, event) => bad_event!("surveyor", state, src, event)
        }
    }

    fn set_option(&mut self, option: &SocketOption) -> io::Result<()> {
        match *option {
            SocketOption::SurveyDeadline(deadline) => {
                self.deadline = deadline;
                Ok(())
            },
            _ => Err(no_protocol_option_error())
        }
    }
}
