// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Per-socket statistics and their ESTP text form, published every ten
//! seconds when the environment asks for it.

use time;

/// Counters and levels tracked on every socket.
pub struct Stats {
    pub established_connections: u64,
    pub accepted_connections: u64,
    pub dropped_connections: u64,
    pub broken_connections: u64,
    pub connect_errors: u64,
    pub bind_errors: u64,
    pub accept_errors: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub current_ep_errors: u64
}

impl Stats {
    pub fn new() -> Stats {
        Stats {
            established_connections: 0,
            accepted_connections: 0,
            dropped_connections: 0,
            broken_connections: 0,
            connect_errors: 0,
            bind_errors: 0,
            accept_errors: 0,
            messages_sent: 0,
            messages_received: 0,
            bytes_sent: 0,
            bytes_received: 0,
            current_ep_errors: 0
        }
    }

    /// One `(metric, value, is_counter)` triple per published line.
    pub fn metrics(&self, current_connections: u64) -> Vec<(&'static str, u64, bool)> {
        vec![
            ("established_connections", self.established_connections, true),
            ("accepted_connections", self.accepted_connections, true),
            ("dropped_connections", self.dropped_connections, true),
            ("broken_connections", self.broken_connections, true),
            ("connect_errors", self.connect_errors, true),
            ("bind_errors", self.bind_errors, true),
            ("accept_errors", self.accept_errors, true),
            ("messages_sent", self.messages_sent, true),
            ("messages_received", self.messages_received, true),
            ("bytes_sent", self.bytes_sent, true),
            ("bytes_received", self.bytes_received, true),
            ("current_connections", current_connections, false),
            ("current_ep_errors", self.current_ep_errors, false)
        ]
    }
}

/// One ESTP line:
/// `ESTP:<host>:<app>:socket.<name>:<metric>: <timestamp>Z 10 <value>[:c]`.
/// Grown dynamically, a metric name or value never truncates the line.
pub fn format_estp(host: &str, app: &str, socket_name: &str, metric: &str, value: u64, counter: bool) -> String {
    let now = time::now_utc();
    let timestamp = now.strftime("%Y-%m-%dT%H:%M:%S").
        map(|t| t.to_string()).
        unwrap_or_default();
    let suffix = if counter { ":c" } else { "" };

    format!("ESTP:{}:{}:socket.{}:{}: {}Z 10 {}{}",
        host, app, socket_name, metric, timestamp, value, suffix)
}

#[cfg(test)]
mod tests {
    use super::{format_estp, Stats};

    #[test]
    fn counters_carry_the_counter_suffix() {
        let line = format_estp("box", "app", "7", "messages_sent", 42, true);

        assert!(line.starts_with("ESTP:box:app:socket.7:messages_sent: "));
        assert!(line.ends_with(" 10 42:c"));
    }

    #[test]
    fn levels_have_no_suffix() {
        let line = format_estp("box", "app", "stats-name", "current_ep_errors", 3, false);

        assert!(line.ends_with(" 10 3"));
        assert!(!line.ends_with(":c"));
    }

    #[test]
    fn every_metric_is_published() {
        let stats = Stats::new();
        let metrics = stats.metrics(0);

        assert_eq!(13, metrics.len());
    }
}
