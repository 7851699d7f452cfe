// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! State machine discipline shared by every machine of the hierarchy.
//!
//! A machine is a plain struct with a state enum and a `feed` method
//! matching on `(state, source, event)`. Reaching a triple the machine
//! does not know is a programmer error, not runtime input: the
//! `bad_event!` macro aborts with the identifying triple.

/// Aborts on an event no state machine handler claims.
#[macro_export]
macro_rules! bad_event {
    ($name:expr, $state:expr, $src:expr, $event:expr) => {
        panic!("{}: unexpected event (state: {:?}, source: {:?}, event: {:?})",
            $name, $state, $src, $event)
    };
}

/// Aborts on a machine caught in a state it cannot be in.
#[macro_export]
macro_rules! bad_state {
    ($name:expr, $state:expr) => {
        panic!("{}: invalid state {:?}", $name, $state)
    };
}
