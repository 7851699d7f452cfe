// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Named `io::Error` constructors and predicates for the errno domain the
//! core reasons about. Call sites and tests go through these instead of
//! matching on message text.

use std::io::{Error, ErrorKind};

use libc;

pub fn other_io_error(msg: &'static str) -> Error {
    Error::new(ErrorKind::Other, msg)
}

pub fn invalid_data_io_error(msg: &'static str) -> Error {
    Error::new(ErrorKind::InvalidData, msg)
}

pub fn would_block_io_error(msg: &'static str) -> Error {
    Error::new(ErrorKind::WouldBlock, msg)
}

pub fn invalid_input_io_error(msg: &'static str) -> Error {
    Error::new(ErrorKind::InvalidInput, msg)
}

pub fn timedout_io_error(msg: &'static str) -> Error {
    Error::new(ErrorKind::TimedOut, msg)
}

const TERM_MSG: &'static str = "session terminating";
const FSM_MSG: &'static str = "operation cannot be performed in this state";
const NO_PROTO_OPT_MSG: &'static str = "option unknown at this level";
const PROTO_NOT_SUPPORTED_MSG: &'static str = "protocol not supported";
const ADDR_FAMILY_MSG: &'static str = "address family not supported";
const ADDR_IN_USE_MSG: &'static str = "address already in use";
const NAME_TOO_LONG_MSG: &'static str = "name too long";
const NO_DEVICE_MSG: &'static str = "no such interface";
const TOO_MANY_SOCKETS_MSG: &'static str = "socket table is full";

/// The session is shutting down, any blocked operation is woken with this.
pub fn term_error() -> Error {
    other_io_error(TERM_MSG)
}

pub fn is_term_error(err: &Error) -> bool {
    err.kind() == ErrorKind::Other && err.to_string() == TERM_MSG
}

/// The operation conflicts with the protocol state machine,
/// for example receiving on a req socket that has not sent a request.
pub fn fsm_error() -> Error {
    other_io_error(FSM_MSG)
}

pub fn is_fsm_error(err: &Error) -> bool {
    err.kind() == ErrorKind::Other && err.to_string() == FSM_MSG
}

pub fn no_protocol_option_error() -> Error {
    invalid_input_io_error(NO_PROTO_OPT_MSG)
}

pub fn protocol_not_supported_error() -> Error {
    invalid_input_io_error(PROTO_NOT_SUPPORTED_MSG)
}

pub fn address_family_error() -> Error {
    invalid_input_io_error(ADDR_FAMILY_MSG)
}

pub fn addr_in_use_error() -> Error {
    Error::new(ErrorKind::AddrInUse, ADDR_IN_USE_MSG)
}

pub fn name_too_long_error() -> Error {
    invalid_input_io_error(NAME_TOO_LONG_MSG)
}

pub fn no_device_error() -> Error {
    Error::new(ErrorKind::NotFound, NO_DEVICE_MSG)
}

pub fn too_many_sockets_error() -> Error {
    other_io_error(TOO_MANY_SOCKETS_MSG)
}

pub fn is_too_many_sockets_error(err: &Error) -> bool {
    err.kind() == ErrorKind::Other && err.to_string() == TOO_MANY_SOCKETS_MSG
}

pub fn would_block_error() -> Error {
    would_block_io_error("operation would block")
}

pub fn is_would_block(err: &Error) -> bool {
    err.kind() == ErrorKind::WouldBlock
}

/// Errors the accept loop treats as resource exhaustion rather than
/// a dead listener: the endpoint records them and retries later.
pub fn is_resource_exhaustion(err: &Error) -> bool {
    match err.raw_os_error() {
        Some(errno) =>
            errno == libc::EMFILE || errno == libc::ENFILE ||
            errno == libc::ENOBUFS || errno == libc::ENOMEM,
        None => false
    }
}

/// Errors the connect/accept path silently retries.
pub fn is_transient(err: &Error) -> bool {
    match err.kind() {
        ErrorKind::WouldBlock | ErrorKind::Interrupted => true,
        _ => err.raw_os_error() == Some(libc::ECONNABORTED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_errors_are_recognized() {
        assert!(is_term_error(&term_error()));
        assert!(is_fsm_error(&fsm_error()));
        assert!(!is_fsm_error(&term_error()));
        assert!(is_would_block(&would_block_error()));
        assert!(is_too_many_sockets_error(&too_many_sockets_error()));
    }

    #[test]
    fn exhaustion_is_distinguished_from_transient() {
        let emfile = ::std::io::Error::from_raw_os_error(libc::EMFILE);
        let aborted = ::std::io::Error::from_raw_os_error(libc::ECONNABORTED);

        assert!(is_resource_exhaustion(&emfile));
        assert!(!is_resource_exhaustion(&aborted));
        assert!(is_transient(&aborted));
        assert!(!is_transient(&emfile));
    }
}
