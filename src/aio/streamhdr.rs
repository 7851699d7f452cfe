// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! SP protocol-version preamble exchanged on every byte stream transport
//! right after the connection is established. Both peers send their
//! 8 bytes simultaneously and verify what the other side sent.

use std::io;

use byteorder::{BigEndian, ByteOrder};

use global::SocketType;
use io_error::invalid_data_io_error;

pub const HDR_SIZE: usize = 8;

/// The preamble is `0x00 'S' 'P' 0x00 <protocol:u16> 0x00 0x00`,
/// protocol id in network byte order.
pub fn create(socktype: SocketType) -> [u8; HDR_SIZE] {
    let mut hdr = [0, 83, 80, 0, 0, 0, 0, 0];
    BigEndian::write_u16(&mut hdr[4..6], socktype.id());
    hdr
}

/// Verifies the magic bytes and that the announced protocol is the peer
/// of the local one.
pub fn check(hdr: &[u8], socktype: SocketType) -> io::Result<()> {
    if hdr.len() != HDR_SIZE || hdr[0] != 0 || hdr[1] != 83 || hdr[2] != 80 || hdr[3] != 0 {
        return Err(invalid_data_io_error("bad protocol header"));
    }
    if hdr[6] != 0 || hdr[7] != 0 {
        return Err(invalid_data_io_error("bad protocol header padding"));
    }

    let peer_id = BigEndian::read_u16(&hdr[4..6]);
    match SocketType::from_id(peer_id) {
        Some(peer) if socktype.matches(peer) => Ok(()),
        _ => Err(invalid_data_io_error("peer protocol does not match"))
    }
}

#[cfg(test)]
mod tests {
    use global::SocketType;

    use super::*;

    #[test]
    fn preamble_has_the_documented_layout() {
        let hdr = create(SocketType::Req);

        assert_eq!([0x00, 0x53, 0x50, 0x00, 0x00, 0x30, 0x00, 0x00], hdr);
    }

    #[test]
    fn peer_protocol_is_accepted() {
        let hdr = create(SocketType::Rep);

        assert!(check(&hdr, SocketType::Req).is_ok());
        assert!(check(&hdr, SocketType::Rep).is_err());
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut hdr = create(SocketType::Pair);
        hdr[1] = 84;

        assert!(check(&hdr, SocketType::Pair).is_err());
    }
}
