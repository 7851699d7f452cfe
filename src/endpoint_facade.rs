// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::fmt;
use std::io;
use std::sync::Arc;

use aio::ctx::{Ctx, CtxOps};
use sock;

/// Handle to one bound or connected endpoint of a socket, usable to
/// remove that endpoint while the socket keeps running.
pub struct Endpoint {
    ctx: Arc<Ctx>,
    eid: usize
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Endpoint").field("eid", &self.eid).finish()
    }
}

impl Endpoint {
    #[doc(hidden)]
    pub fn new(ctx: Arc<Ctx>, eid: usize) -> Endpoint {
        Endpoint {
            ctx: ctx,
            eid: eid
        }
    }

    /// Starts removing the endpoint from its socket. Established
    /// connections below it are torn down asynchronously.
    pub fn shutdown(self) -> io::Result<()> {
        let eid = self.eid;

        self.ctx.with(|ctx, core| sock::shutdown_endpoint(ctx, core, eid))
    }
}
