// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! The runtime behind a session: the socket table, the worker pool, the
//! inproc name directory and the statistics publisher. There is no
//! process-global state; everything is owned by the handle the
//! application constructs.

use std::env;
use std::io;
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread;
use std::time::Duration;

use libc;

use aio::ctx::{Ctx, CtxOps};
use aio::pool::Pool;
use global::{IdSequence, SocketId, SocketType};
use message::Message;
use sock::{self, SockCore};
use stats;
use transport::inproc::InprocRegistry;
use io_error::too_many_sockets_error;

pub const MAX_SOCKETS: usize = 512;

const STATISTICS_INTERVAL: u64 = 10;

pub struct Runtime {
    pool: Pool,
    table: Mutex<Vec<Option<Arc<Ctx>>>>,
    registry: Arc<InprocRegistry>,
    eid_seq: IdSequence,
    print_errors: bool,
    print_statistics: bool,
    statistics_socket: Option<String>,
    application_name: String,
    host_name: String,
    stats_stop: Arc<(Mutex<bool>, Condvar)>,
    stats_thread: Mutex<Option<thread::JoinHandle<()>>>
}

impl Runtime {
    pub fn new() -> io::Result<Arc<Runtime>> {
        let workers = thread::available_parallelism().
            map(|count| count.get()).
            unwrap_or(1);
        let pool = Pool::new(workers)?;

        let print_errors = env_flag("GRID_PRINT_ERRORS");
        let print_statistics = env_flag("GRID_PRINT_STATISTICS");
        let statistics_socket = env::var("GRID_STATISTICS_SOCKET").ok().
            filter(|value| !value.is_empty());
        let application_name = env::var("GRID_APPLICATION_NAME").
            unwrap_or_else(|_| default_application_name());
        let host_name = env::var("GRID_HOSTNAME").
            unwrap_or_else(|_| default_host_name());

        let runtime = Arc::new(Runtime {
            pool: pool,
            table: Mutex::new((0..MAX_SOCKETS).map(|_| None).collect()),
            registry: Arc::new(InprocRegistry::new()),
            eid_seq: IdSequence::new(),
            print_errors: print_errors,
            print_statistics: print_statistics,
            statistics_socket: statistics_socket,
            application_name: application_name,
            host_name: host_name,
            stats_stop: Arc::new((Mutex::new(false), Condvar::new())),
            stats_thread: Mutex::new(None)
        });

        if runtime.print_statistics || runtime.statistics_socket.is_some() {
            let weak = Arc::downgrade(&runtime);
            let stop = runtime.stats_stop.clone();
            let thread = thread::Builder::new().
                name("gridmq-stats".to_owned()).
                spawn(move || statistics_routine(weak, stop))?;
            *runtime.stats_thread.lock().unwrap() = Some(thread);
        }

        Ok(runtime)
    }

    /// Allocates a socket slot; the slot index is the socket id.
    pub fn create_socket(&self, socktype: SocketType) -> io::Result<(SocketId, Arc<Ctx>)> {
        let mut table = self.table.lock().unwrap();

        let slot = match table.iter().position(|entry| entry.is_none()) {
            Some(slot) => slot,
            None => return Err(too_many_sockets_error())
        };

        let id = SocketId(slot);
        let core = SockCore::new(
            id,
            socktype,
            self.pool.choose_worker(),
            self.eid_seq.clone(),
            self.registry.clone(),
            self.print_errors);
        let ctx = Ctx::new(core);

        ctx.with(|ctx, core| {
            let SockCore { ref mut protocol, ref worker, .. } = *core;
            protocol.started(worker, ctx);
        });

        table[slot] = Some(ctx.clone());
        debug!("[{:?}] socket created ({:?})", id, socktype);

        Ok((id, ctx))
    }

    /// The asynchronous close: tear the socket down, wait up to the
    /// linger time for it to reach its terminal state, release the slot.
    pub fn close_socket(&self, id: SocketId, ctx: &Arc<Ctx>) {
        let (term_efd, linger) = ctx.with(|ctx, core| {
            sock::start_close(ctx, core);
            (core.term_efd.clone(), core.opts.linger)
        });

        if term_efd.wait(Some(linger)).is_err() {
            debug!("[{:?}] close timed out after the linger period", id);
        }

        self.table.lock().unwrap()[id.0] = None;
    }

    /// Wakes every blocked call with a termination error; sockets stay
    /// alive until closed.
    pub fn terminate(&self) {
        for ctx in self.sockets() {
            ctx.with(|_, core| sock::zombify(core));
        }
    }

    fn sockets(&self) -> Vec<Arc<Ctx>> {
        self.table.lock().unwrap().iter().
            filter_map(|entry| entry.clone()).
            collect()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        {
            let &(ref stop, ref cond) = &*self.stats_stop;
            *stop.lock().unwrap() = true;
            cond.notify_all();
        }
        if let Some(thread) = self.stats_thread.lock().unwrap().take() {
            let _ = thread.join();
        }
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name).map(|value| !value.is_empty()).unwrap_or(false)
}

fn default_application_name() -> String {
    env::current_exe().ok().
        and_then(|path| path.file_name().map(|name| name.to_string_lossy().into_owned())).
        unwrap_or_else(|| "unknown".to_owned())
}

fn default_host_name() -> String {
    let mut buf = [0 as libc::c_char; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr(), buf.len() - 1) };

    if rc == 0 {
        let name = unsafe { ::std::ffi::CStr::from_ptr(buf.as_ptr()) };
        name.to_string_lossy().into_owned()
    } else {
        "localhost".to_owned()
    }
}

/// Publishes one ESTP line per socket metric every ten seconds, to
/// stderr and to the statistics socket when one is configured.
fn statistics_routine(runtime: Weak<Runtime>, stop: Arc<(Mutex<bool>, Condvar)>) {
    let mut publisher: Option<Arc<Ctx>> = None;

    loop {
        {
            let &(ref stopped, ref cond) = &*stop;
            let guard = stopped.lock().unwrap();
            let (guard, _) = cond.
                wait_timeout(guard, Duration::from_secs(STATISTICS_INTERVAL)).
                unwrap();
            if *guard {
                return;
            }
        }

        let runtime = match runtime.upgrade() {
            Some(runtime) => runtime,
            None => return
        };

        if publisher.is_none() {
            if let Some(address) = runtime.statistics_socket.clone() {
                publisher = connect_publisher(&runtime, &address);
            }
        }

        for ctx in runtime.sockets() {
            if let Some(ref publisher_ctx) = publisher {
                if Arc::ptr_eq(publisher_ctx, &ctx) {
                    continue;
                }
            }

            let (name, metrics) = ctx.with(|_, core| {
                let name = core.opts.socket_name.clone().
                    unwrap_or_else(|| core.id.0.to_string());
                (name, core.stats.metrics(core.pipes.len() as u64))
            });

            for (metric, value, counter) in metrics {
                let line = stats::format_estp(
                    &runtime.host_name,
                    &runtime.application_name,
                    &name,
                    metric,
                    value,
                    counter);

                if runtime.print_statistics {
                    eprintln!("{}", line);
                }
                if let Some(ref publisher_ctx) = publisher {
                    let _ = publisher_ctx.with(|_, core| {
                        sock::try_send(core, Message::with_body(line.clone().into_bytes()))
                    });
                }
            }
        }
    }
}

fn connect_publisher(runtime: &Arc<Runtime>, address: &str) -> Option<Arc<Ctx>> {
    let (_, ctx) = match runtime.create_socket(SocketType::Pub) {
        Ok(created) => created,
        Err(err) => {
            error!("statistics socket creation failed: {:?}", err);
            return None;
        }
    };

    let connected = ctx.with(|ctx, core| sock::add_endpoint(ctx, core, address, false));
    match connected {
        Ok(_) => Some(ctx),
        Err(err) => {
            error!("statistics socket connect failed: {:?}", err);
            None
        }
    }
}
