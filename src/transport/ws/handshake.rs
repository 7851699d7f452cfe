// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! RFC 6455 opening handshake: request and response lines, the
//! `Sec-WebSocket-Accept` derivation, and the mapping between socket
//! types and SP subprotocol names.

use std::io;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use byteorder::{BigEndian, ByteOrder};
use rand;

use global::SocketType;
use io_error::invalid_data_io_error;

const GUID: &'static str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

pub fn protocol_name(socktype: SocketType) -> &'static str {
    match socktype {
        SocketType::Pair => "pair.sp.nanomsg.org",
        SocketType::Pub => "pub.sp.nanomsg.org",
        SocketType::Sub => "sub.sp.nanomsg.org",
        SocketType::Req => "req.sp.nanomsg.org",
        SocketType::Rep => "rep.sp.nanomsg.org",
        SocketType::Push => "push.sp.nanomsg.org",
        SocketType::Pull => "pull.sp.nanomsg.org",
        SocketType::Surveyor => "surveyor.sp.nanomsg.org",
        SocketType::Respondent => "respondent.sp.nanomsg.org"
    }
}

pub fn socket_type_of(name: &str) -> Option<SocketType> {
    match name {
        "pair.sp.nanomsg.org" => Some(SocketType::Pair),
        "pub.sp.nanomsg.org" => Some(SocketType::Pub),
        "sub.sp.nanomsg.org" => Some(SocketType::Sub),
        "req.sp.nanomsg.org" => Some(SocketType::Req),
        "rep.sp.nanomsg.org" => Some(SocketType::Rep),
        "push.sp.nanomsg.org" => Some(SocketType::Push),
        "pull.sp.nanomsg.org" => Some(SocketType::Pull),
        "surveyor.sp.nanomsg.org" => Some(SocketType::Surveyor),
        "respondent.sp.nanomsg.org" => Some(SocketType::Respondent),
        _ => None
    }
}

/// 16 random bytes, base64 encoded, for the `Sec-WebSocket-Key` header.
pub fn random_key() -> String {
    let nonce: [u8; 16] = rand::random();
    BASE64.encode(&nonce)
}

/// `base64(sha1(key + guid))`, what the server must echo back.
pub fn accept_key(key: &str) -> String {
    let mut input = key.as_bytes().to_vec();
    input.extend_from_slice(GUID.as_bytes());
    BASE64.encode(&sha1(&input))
}

pub fn build_request(host: &str, path: &str, key: &str, socktype: SocketType) -> Vec<u8> {
    format!(
        "GET {} HTTP/1.1\r\n\
         Host: {}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {}\r\n\
         Sec-WebSocket-Version: 13\r\n\
         Sec-WebSocket-Protocol: {}\r\n\r\n",
        path, host, key, protocol_name(socktype)).into_bytes()
}

pub fn build_response(accept: &str, protocol: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\
         Sec-WebSocket-Protocol: {}\r\n\r\n",
        accept, protocol).into_bytes()
}

pub fn build_bad_request() -> Vec<u8> {
    b"HTTP/1.1 400 Bad Request\r\nSec-WebSocket-Version: 13\r\n\r\n".to_vec()
}

fn header_value<'a>(lines: &'a [&str], name: &str) -> Option<&'a str> {
    for line in lines.iter().skip(1) {
        if let Some(position) = line.find(':') {
            if line[..position].trim().eq_ignore_ascii_case(name) {
                return Some(line[position + 1..].trim());
            }
        }
    }
    None
}

fn token_present(value: &str, token: &str) -> bool {
    value.split(',').any(|part| part.trim().eq_ignore_ascii_case(token))
}

/// Validates a client upgrade request; returns the key to answer and
/// the subprotocol to acknowledge.
pub fn parse_request(text: &str, socktype: SocketType) -> io::Result<(String, String)> {
    let lines: Vec<&str> = text.split("\r\n").collect();
    let bad = |msg| Err(invalid_data_io_error(msg));

    if lines.is_empty() || !lines[0].starts_with("GET ") || !lines[0].ends_with(" HTTP/1.1") {
        return bad("malformed upgrade request line");
    }
    match header_value(&lines, "Upgrade") {
        Some(value) if value.eq_ignore_ascii_case("websocket") => {},
        _ => return bad("missing websocket upgrade header")
    }
    match header_value(&lines, "Connection") {
        Some(value) if token_present(value, "Upgrade") => {},
        _ => return bad("missing connection upgrade header")
    }
    match header_value(&lines, "Sec-WebSocket-Version") {
        Some("13") => {},
        _ => return bad("unsupported websocket version")
    }
    if header_value(&lines, "Host").is_none() {
        return bad("missing host header");
    }

    let key = match header_value(&lines, "Sec-WebSocket-Key") {
        Some(key) if !key.is_empty() => key.to_owned(),
        _ => return bad("missing websocket key")
    };

    let protocol = match header_value(&lines, "Sec-WebSocket-Protocol") {
        Some(name) => name.to_owned(),
        None => return bad("missing sp protocol header")
    };
    match socket_type_of(&protocol) {
        Some(peer) if socktype.matches(peer) => {},
        _ => return bad("peer protocol does not match")
    }

    Ok((key, protocol))
}

/// Validates the server's 101 answer against the key and the announced
/// subprotocol.
pub fn parse_response(text: &str, key: &str, socktype: SocketType) -> io::Result<()> {
    let lines: Vec<&str> = text.split("\r\n").collect();
    let bad = |msg| Err(invalid_data_io_error(msg));

    if lines.is_empty() || !lines[0].starts_with("HTTP/1.1 101") {
        return bad("upgrade refused by the server");
    }
    match header_value(&lines, "Upgrade") {
        Some(value) if value.eq_ignore_ascii_case("websocket") => {},
        _ => return bad("missing websocket upgrade header")
    }
    match header_value(&lines, "Connection") {
        Some(value) if token_present(value, "Upgrade") => {},
        _ => return bad("missing connection upgrade header")
    }
    match header_value(&lines, "Sec-WebSocket-Accept") {
        Some(accept) if accept == accept_key(key) => {},
        _ => return bad("websocket accept key mismatch")
    }
    match header_value(&lines, "Sec-WebSocket-Protocol") {
        Some(name) if name == protocol_name(socktype) => {},
        _ => return bad("sp protocol not acknowledged")
    }
    Ok(())
}

fn sha1(data: &[u8]) -> [u8; 20] {
    let mut h: [u32; 5] = [0x67452301, 0xEFCDAB89, 0x98BADCFE, 0x10325476, 0xC3D2E1F0];
    let bit_len = (data.len() as u64).wrapping_mul(8);

    let mut msg = data.to_vec();
    msg.push(0x80);
    while msg.len() % 64 != 56 {
        msg.push(0);
    }
    let mut length = [0; 8];
    BigEndian::write_u64(&mut length, bit_len);
    msg.extend_from_slice(&length);

    for chunk in msg.chunks(64) {
        let mut w = [0u32; 80];
        for i in 0..16 {
            w[i] = BigEndian::read_u32(&chunk[i * 4..(i + 1) * 4]);
        }
        for i in 16..80 {
            w[i] = (w[i - 3] ^ w[i - 8] ^ w[i - 14] ^ w[i - 16]).rotate_left(1);
        }

        let (mut a, mut b, mut c, mut d, mut e) = (h[0], h[1], h[2], h[3], h[4]);
        for i in 0..80 {
            let (f, k) = match i {
                0..=19 => ((b & c) | (!b & d), 0x5A827999),
                20..=39 => (b ^ c ^ d, 0x6ED9EBA1),
                40..=59 => ((b & c) | (b & d) | (c & d), 0x8F1BBCDC),
                _ => (b ^ c ^ d, 0xCA62C1D6u32)
            };
            let temp = a.rotate_left(5).
                wrapping_add(f).
                wrapping_add(e).
                wrapping_add(k).
                wrapping_add(w[i]);
            e = d;
            d = c;
            c = b.rotate_left(30);
            b = a;
            a = temp;
        }

        h[0] = h[0].wrapping_add(a);
        h[1] = h[1].wrapping_add(b);
        h[2] = h[2].wrapping_add(c);
        h[3] = h[3].wrapping_add(d);
        h[4] = h[4].wrapping_add(e);
    }

    let mut digest = [0; 20];
    for i in 0..5 {
        BigEndian::write_u32(&mut digest[i * 4..(i + 1) * 4], h[i]);
    }
    digest
}

#[cfg(test)]
mod tests {
    use global::SocketType;

    use super::*;

    #[test]
    fn accept_key_matches_the_rfc_example() {
        assert_eq!("s3pPLMBiTxaQ9kYGzzhZRbK+xOo=", accept_key("dGhlIHNhbXBsZSBub25jZQ=="));
    }

    #[test]
    fn request_round_trips_through_the_parser() {
        let request = build_request("127.0.0.1:5462", "/echo", "dGhlIHNhbXBsZSBub25jZQ==", SocketType::Pair);
        let text = String::from_utf8(request).unwrap();
        let (key, protocol) = parse_request(&text, SocketType::Pair).unwrap();

        assert_eq!("dGhlIHNhbXBsZSBub25jZQ==", key);
        assert_eq!("pair.sp.nanomsg.org", protocol);
    }

    #[test]
    fn mismatched_protocol_is_rejected() {
        let request = build_request("h", "/", "a2V5a2V5a2V5a2V5a2V5a2==", SocketType::Pair);
        let text = String::from_utf8(request).unwrap();

        assert!(parse_request(&text, SocketType::Req).is_err());
    }

    #[test]
    fn response_round_trips_through_the_parser() {
        let key = "dGhlIHNhbXBsZSBub25jZQ==";
        let response = build_response(&accept_key(key), protocol_name(SocketType::Req));
        let text = String::from_utf8(response).unwrap();

        assert!(parse_response(&text, key, SocketType::Req).is_ok());
        assert!(parse_response(&text, key, SocketType::Rep).is_err());
        assert!(parse_response(&text, "b3RoZXIgbm9uY2UgaGVyZQ==", SocketType::Req).is_err());
    }

    #[test]
    fn unmapped_subprotocols_are_unknown() {
        assert_eq!(None, socket_type_of("chat"));
        assert_eq!(Some(SocketType::Sub), socket_type_of("sub.sp.nanomsg.org"));
    }
}
