// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! One timeout owned by a state machine. Arming and cancelling hop to the
//! worker thread through its command queue; the stop acknowledgement
//! travels back as an event so the owner can wait for it. A timeout that
//! fired while the stop was in flight is swallowed here, owners never see
//! late fires of a cancelled timer.

use std::sync::Arc;
use std::time::Duration;

use aio::{Event, EventTarget};
use aio::worker::{Worker, WorkerCmd};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Active,
    Stopping
}

pub struct Timer {
    state: State,
    generation: usize,
    worker: Arc<Worker>,
    target: EventTarget
}

impl Timer {
    pub fn new(worker: Arc<Worker>, target: EventTarget) -> Timer {
        Timer {
            state: State::Idle,
            generation: 0,
            worker: worker,
            target: target
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state == State::Idle
    }

    pub fn start(&mut self, delay: Duration) {
        assert_eq!(State::Idle, self.state, "timer started while running");

        self.generation = self.worker.next_timer_token();
        self.state = State::Active;
        self.worker.post(WorkerCmd::AddTimer {
            token: self.generation,
            delay: delay,
            target: self.target.clone()
        });
    }

    pub fn stop(&mut self) {
        if self.state != State::Active {
            return;
        }

        self.state = State::Stopping;
        self.worker.post(WorkerCmd::RmTimer { token: self.generation });
        self.worker.execute(self.target.clone(), Event::Stopped, self.generation);
    }

    /// Filters a raw worker event into what the owner acts upon.
    pub fn feed(&mut self, event: Event, arg: usize) -> Option<Event> {
        match (self.state, event) {
            (State::Active, Event::Timeout) if arg == self.generation => Some(Event::Timeout),
            (State::Stopping, Event::Stopped) if arg == self.generation => {
                self.state = State::Idle;
                Some(Event::Stopped)
            },
            // Fires of an overtaken generation and timeouts racing
            // a cancellation.
            (_, Event::Timeout) | (_, Event::Stopped) => None,
            (state, event) => bad_event!("timer", state, self.target.src, event)
        }
    }
}
