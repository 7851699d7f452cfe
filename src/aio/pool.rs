// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Fixed set of workers shared by all sockets of one session.
//! Each socket is pinned to one worker, chosen round-robin at creation.

use std::io;
use std::sync::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use aio::worker::{Worker, WorkerCmd};

pub struct Pool {
    workers: Vec<Arc<Worker>>,
    threads: Mutex<Vec<thread::JoinHandle<()>>>,
    next: AtomicUsize
}

impl Pool {
    pub fn new(worker_count: usize) -> io::Result<Pool> {
        let count = ::std::cmp::max(worker_count, 1);
        let mut workers = Vec::with_capacity(count);
        let mut threads = Vec::with_capacity(count);

        for i in 0..count {
            let (worker, thread) = Worker::start(format!("gridmq-worker-{}", i))?;
            workers.push(worker);
            threads.push(thread);
        }

        Ok(Pool {
            workers: workers,
            threads: Mutex::new(threads),
            next: AtomicUsize::new(0)
        })
    }

    /// The worker the next socket is pinned to.
    pub fn choose_worker(&self) -> Arc<Worker> {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.workers.len();

        self.workers[index].clone()
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        for worker in self.workers.iter() {
            worker.post(WorkerCmd::Stop);
        }
        for thread in self.threads.lock().unwrap().drain(..) {
            let _ = thread.join();
        }
    }
}
