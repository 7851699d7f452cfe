// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! The context serializes one socket hierarchy: user threads and worker
//! threads alike enter it before touching any machine of the hierarchy.
//! Events raised while inside are drained on leave, still under the lock;
//! events addressed to other contexts are delivered after unlocking, so
//! no thread ever holds two contexts at once.

use std::sync::{Arc, Mutex, MutexGuard};

use aio::QueuedEvent;
use sock::{self, SockCore};

pub struct Ctx {
    core: Mutex<SockCore>
}

impl Ctx {
    pub fn new(core: SockCore) -> Arc<Ctx> {
        Arc::new(Ctx { core: Mutex::new(core) })
    }

    fn enter(&self) -> MutexGuard<SockCore> {
        self.core.lock().unwrap()
    }
}

/// Entry points of a context; the shared handle is the receiver because
/// machines inside keep weak references back to it.
pub trait CtxOps {
    /// Runs one step against the hierarchy and drains the raised events.
    fn with<F, R>(&self, step: F) -> R
        where F: FnOnce(&Arc<Ctx>, &mut SockCore) -> R;

    /// Feeds one event under this context.
    fn deliver(&self, event: QueuedEvent);
}

impl CtxOps for Arc<Ctx> {
    fn with<F, R>(&self, step: F) -> R
        where F: FnOnce(&Arc<Ctx>, &mut SockCore) -> R {
        let mut core = self.enter();
        let result = step(self, &mut core);
        leave(self, core);
        result
    }

    fn deliver(&self, event: QueuedEvent) {
        self.with(|ctx, core| sock::feed(ctx, core, event));
    }
}

fn leave(ctx: &Arc<Ctx>, mut core: MutexGuard<SockCore>) {
    // Process any queued events before leaving the context.
    while let Some(event) = core.q.intra.pop_front() {
        sock::feed(ctx, &mut core, event);
    }

    sock::on_leave(&mut core);

    if core.q.cross.is_empty() {
        return;
    }

    // Move the external events out so the queue cannot be touched once
    // the context is unlocked.
    let cross = ::std::mem::replace(&mut core.q.cross, Vec::new());

    drop(core);

    // Each external event locks the context it belongs to.
    for (target, event) in cross {
        target.deliver(event);
    }
}
