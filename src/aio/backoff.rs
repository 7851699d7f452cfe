// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Timer with exponential backoff. The actual waiting time is
//! `(2^n - 1) * minivl`: the first wait is zero, the second is `minivl`,
//! then it doubles until `maxivl` caps it.

use std::sync::Arc;
use std::time::Duration;

use aio::{Event, EventTarget};
use aio::timer::Timer;
use aio::worker::Worker;

pub struct Backoff {
    timer: Timer,
    minivl: Duration,
    maxivl: Duration,
    n: u32
}

impl Backoff {
    pub fn new(worker: Arc<Worker>, target: EventTarget, minivl: Duration, maxivl: Duration) -> Backoff {
        Backoff {
            timer: Timer::new(worker, target),
            minivl: minivl,
            maxivl: maxivl,
            n: 1
        }
    }

    pub fn is_idle(&self) -> bool {
        self.timer.is_idle()
    }

    pub fn start(&mut self) {
        let timeout = next_interval(self.minivl, self.maxivl, &mut self.n);
        self.timer.start(timeout);
    }

    pub fn stop(&mut self) {
        self.timer.stop();
    }

    /// Back to the shortest interval, after a connection succeeded.
    pub fn reset(&mut self) {
        self.n = 1;
    }

    pub fn feed(&mut self, event: Event, arg: usize) -> Option<Event> {
        self.timer.feed(event, arg)
    }
}

fn next_interval(minivl: Duration, maxivl: Duration, n: &mut u32) -> Duration {
    let timeout = minivl * (*n - 1);

    if timeout > maxivl {
        maxivl
    } else {
        *n *= 2;
        timeout
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::next_interval;

    #[test]
    fn intervals_grow_and_saturate() {
        let minivl = Duration::from_millis(100);
        let maxivl = Duration::from_millis(500);
        let mut n = 1;

        // First attempt is immediate, then the wait doubles up to the cap.
        assert_eq!(Duration::from_millis(0), next_interval(minivl, maxivl, &mut n));
        assert_eq!(Duration::from_millis(100), next_interval(minivl, maxivl, &mut n));
        assert_eq!(Duration::from_millis(300), next_interval(minivl, maxivl, &mut n));
        assert_eq!(Duration::from_millis(700).min(maxivl), next_interval(minivl, maxivl, &mut n));
        assert_eq!(maxivl, next_interval(minivl, maxivl, &mut n));
    }
}
