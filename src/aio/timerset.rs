// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Stores pending timeouts sorted by deadline and reports the next one
//! to expire along with the time till it happens. Owned by exactly one
//! worker thread.

use std::time::{Duration, Instant};

struct Entry<T> {
    deadline: Instant,
    token: usize,
    payload: T
}

pub struct TimerSet<T> {
    entries: Vec<Entry<T>>
}

impl<T> TimerSet<T> {
    pub fn new() -> TimerSet<T> {
        TimerSet { entries: Vec::new() }
    }

    /// Registers a timeout under the caller supplied token.
    pub fn add(&mut self, token: usize, delay: Duration, payload: T) {
        let deadline = Instant::now() + delay;
        let position = self.entries.iter().
            position(|e| e.deadline > deadline).
            unwrap_or(self.entries.len());

        self.entries.insert(position, Entry {
            deadline: deadline,
            token: token,
            payload: payload
        });
    }

    /// Cancels a timeout. Returns false when the timeout already fired.
    pub fn remove(&mut self, token: usize) -> bool {
        match self.entries.iter().position(|e| e.token == token) {
            Some(position) => {
                self.entries.remove(position);
                true
            },
            None => false
        }
    }

    /// Time till the earliest deadline, zero if it already passed,
    /// `None` when no timeout is pending.
    pub fn next_timeout(&self) -> Option<Duration> {
        self.entries.first().map(|e| {
            let now = Instant::now();
            if e.deadline > now {
                e.deadline - now
            } else {
                Duration::from_millis(0)
            }
        })
    }

    /// Pops one expired timeout per call.
    pub fn pop_expired(&mut self) -> Option<(usize, T)> {
        let expired = match self.entries.first() {
            Some(e) => e.deadline <= Instant::now(),
            None => false
        };

        if expired {
            let entry = self.entries.remove(0);
            Some((entry.token, entry.payload))
        } else {
            None
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::TimerSet;

    #[test]
    fn earliest_deadline_is_reported_first() {
        let mut timers = TimerSet::new();

        timers.add(1, Duration::from_millis(200), "late");
        timers.add(2, Duration::from_millis(0), "early");

        assert_eq!(Some(Duration::from_millis(0)), timers.next_timeout());
        assert_eq!(Some((2, "early")), timers.pop_expired());
        assert_eq!(None, timers.pop_expired());
    }

    #[test]
    fn removed_timeouts_do_not_fire() {
        let mut timers = TimerSet::new();

        timers.add(1, Duration::from_millis(0), ());
        assert!(timers.remove(1));
        assert!(!timers.remove(1));
        assert_eq!(None, timers.pop_expired());
        assert!(timers.is_empty());
    }

    #[test]
    fn expired_timeouts_pop_one_at_a_time() {
        let mut timers = TimerSet::new();

        timers.add(1, Duration::from_millis(0), ());
        timers.add(2, Duration::from_millis(0), ());

        assert!(timers.pop_expired().is_some());
        assert!(timers.pop_expired().is_some());
        assert!(timers.pop_expired().is_none());
    }
}
