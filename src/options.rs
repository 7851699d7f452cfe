// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::time::Duration;

/// Message framing requested for outgoing WebSocket frames.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum WsMsgType {
    Text   = 0x1,
    Binary = 0x2
}

/// Options settable through [Socket::set_option](struct.Socket.html#method.set_option).
///
/// Socket-level options apply to the socket as a whole; endpoints created
/// afterwards snapshot the values relevant to them. Protocol-level options
/// (`Subscribe`, `ResendInterval`, `SurveyDeadline`) are rejected by
/// sockets of any other protocol.
pub enum SocketOption {
    /// How long `close` keeps trying to deliver pending outbound messages.
    Linger(Duration),
    SendBuffer(usize),
    RecvBuffer(usize),
    /// `None` blocks forever.
    SendTimeout(Option<Duration>),
    RecvTimeout(Option<Duration>),
    /// First reconnection delay after a failed or broken connection.
    ReconnectInterval(Duration),
    /// Cap for the exponential backoff. Zero disables the growth.
    ReconnectIntervalMax(Duration),
    /// Outbound priority of subsequently created endpoints, 1 through 16.
    SendPriority(u8),
    /// Inbound priority of subsequently created endpoints, 1 through 16.
    RecvPriority(u8),
    Ipv4Only(bool),
    /// Name used by the statistics output instead of the numeric id,
    /// at most 63 bytes.
    SocketName(String),
    /// Largest accepted inbound message. `None` is unlimited.
    RecvMaxSize(Option<usize>),
    /// Req sockets: interval before an unanswered request is resent.
    ResendInterval(Duration),
    /// Sub sockets: starts delivering messages whose body starts with the topic.
    Subscribe(String),
    /// Sub sockets: removes a subscription installed by `Subscribe`.
    Unsubscribe(String),
    /// Surveyor sockets: how long responses are accepted after a survey.
    SurveyDeadline(Duration),
    TcpNoDelay(bool),
    WsMsgType(WsMsgType)
}

/// Socket-wide option values with their defaults.
pub struct SocketOptions {
    pub linger: Duration,
    pub send_buffer: usize,
    pub recv_buffer: usize,
    pub send_timeout: Option<Duration>,
    pub recv_timeout: Option<Duration>,
    pub reconnect_ivl: Duration,
    pub reconnect_ivl_max: Duration,
    pub send_priority: u8,
    pub recv_priority: u8,
    pub ipv4only: bool,
    pub socket_name: Option<String>,
    pub recv_max_size: Option<usize>,
    pub tcp_nodelay: bool,
    pub ws_msg_type: WsMsgType
}

impl Default for SocketOptions {
    fn default() -> SocketOptions {
        SocketOptions {
            linger: Duration::from_millis(1000),
            send_buffer: 128 * 1024,
            recv_buffer: 128 * 1024,
            send_timeout: None,
            recv_timeout: None,
            reconnect_ivl: Duration::from_millis(100),
            reconnect_ivl_max: Duration::from_millis(0),
            send_priority: 8,
            recv_priority: 8,
            ipv4only: true,
            socket_name: None,
            recv_max_size: Some(1024 * 1024),
            tcp_nodelay: false,
            ws_msg_type: WsMsgType::Binary
        }
    }
}

impl SocketOptions {
    /// Values a new endpoint snapshots at bind/connect time.
    pub fn endpoint_snapshot(&self) -> EndpointOptions {
        EndpointOptions {
            send_priority: self.send_priority,
            recv_priority: self.recv_priority,
            ipv4only: self.ipv4only,
            recv_max_size: self.recv_max_size,
            recv_buffer: self.recv_buffer,
            reconnect_ivl: self.reconnect_ivl,
            reconnect_ivl_max: self.reconnect_ivl_max,
            tcp_nodelay: self.tcp_nodelay,
            ws_msg_type: self.ws_msg_type
        }
    }
}

/// Per-endpoint snapshot of the socket options taken when the endpoint
/// is created; later socket-level changes do not affect live endpoints.
#[derive(Clone)]
pub struct EndpointOptions {
    pub send_priority: u8,
    pub recv_priority: u8,
    pub ipv4only: bool,
    pub recv_max_size: Option<usize>,
    pub recv_buffer: usize,
    pub reconnect_ivl: Duration,
    pub reconnect_ivl_max: Duration,
    pub tcp_nodelay: bool,
    pub ws_msg_type: WsMsgType
}

impl EndpointOptions {
    /// Longest wait of the reconnection backoff.
    pub fn max_backoff(&self) -> Duration {
        if self.reconnect_ivl_max > self.reconnect_ivl {
            self.reconnect_ivl_max
        } else {
            self.reconnect_ivl
        }
    }
}
