// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Level-triggered signal used to park user threads in blocking send/recv.
//! The level is raised and cleared under the socket context and observed
//! from any thread.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};
use std::io;

use io_error::timedout_io_error;

pub struct Efd {
    level: Mutex<bool>,
    cond: Condvar
}

impl Efd {
    pub fn new() -> Efd {
        Efd {
            level: Mutex::new(false),
            cond: Condvar::new()
        }
    }

    pub fn signal(&self) {
        let mut level = self.level.lock().unwrap();
        *level = true;
        self.cond.notify_all();
    }

    pub fn unsignal(&self) {
        let mut level = self.level.lock().unwrap();
        *level = false;
    }

    pub fn set_level(&self, high: bool) {
        if high {
            self.signal();
        } else {
            self.unsignal();
        }
    }

    pub fn is_signaled(&self) -> bool {
        *self.level.lock().unwrap()
    }

    /// Blocks until the level goes high or the timeout elapses.
    /// `None` waits forever.
    pub fn wait(&self, timeout: Option<Duration>) -> io::Result<()> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut level = self.level.lock().unwrap();

        while !*level {
            match deadline {
                None => level = self.cond.wait(level).unwrap(),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(timedout_io_error("timed out waiting for socket readiness"));
                    }
                    let (guard, _) = self.cond.wait_timeout(level, deadline - now).unwrap();
                    level = guard;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;
    use std::thread;

    use super::Efd;

    #[test]
    fn wait_returns_once_signaled() {
        let efd = Arc::new(Efd::new());
        let other = efd.clone();
        let signaler = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            other.signal();
        });

        assert!(efd.wait(Some(Duration::from_millis(1000))).is_ok());
        signaler.join().unwrap();
    }

    #[test]
    fn wait_times_out_when_level_stays_low() {
        let efd = Efd::new();

        assert!(efd.wait(Some(Duration::from_millis(20))).is_err());
    }

    #[test]
    fn signal_is_a_level_not_a_pulse() {
        let efd = Efd::new();

        efd.signal();
        assert!(efd.wait(Some(Duration::from_millis(10))).is_ok());
        assert!(efd.wait(Some(Duration::from_millis(10))).is_ok());

        efd.unsignal();
        assert!(efd.wait(Some(Duration::from_millis(10))).is_err());
    }
}
