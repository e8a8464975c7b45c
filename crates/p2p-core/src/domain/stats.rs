//! Online aggregation of echo results.
//!
//! The client records one outcome per datagram: a reply with its round-trip
//! time, or a loss.  The server only counts what it received and what it
//! managed to echo back.  Nothing is stored per packet, so memory use is
//! constant for arbitrarily long sessions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Counters for one echo session.  All times are microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EchoStats {
    pub packets_sent: u32,
    pub packets_received: u32,
    pub packets_lost: u32,
    pub bytes_sent: u32,
    pub bytes_received: u32,
    pub rtt_min_us: u32,
    pub rtt_max_us: u32,
    pub rtt_avg_us: u32,
    pub rtt_sum_us: u64,
    /// Replies that carried an RTT sample.  Zero on the server side.
    rtt_samples: u32,
}

impl EchoStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears every counter.  Called at the start of each session.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Client: a reply arrived `rtt_us` after the request was sent.
    pub fn record_reply(&mut self, rtt_us: u32, bytes_out: u32, bytes_in: u32) {
        self.packets_sent = self.packets_sent.saturating_add(1);
        self.packets_received = self.packets_received.saturating_add(1);
        self.bytes_sent = self.bytes_sent.saturating_add(bytes_out);
        self.bytes_received = self.bytes_received.saturating_add(bytes_in);

        if self.rtt_samples == 0 || rtt_us < self.rtt_min_us {
            self.rtt_min_us = rtt_us;
        }
        if rtt_us > self.rtt_max_us {
            self.rtt_max_us = rtt_us;
        }
        self.rtt_samples += 1;
        self.rtt_sum_us += u64::from(rtt_us);
        // Integer truncation, as reported.
        self.rtt_avg_us = (self.rtt_sum_us / u64::from(self.rtt_samples)) as u32;
    }

    /// Client: no reply within the receive window, or the send itself failed
    /// (`bytes_out == 0`).
    pub fn record_loss(&mut self, bytes_out: u32) {
        self.packets_sent = self.packets_sent.saturating_add(1);
        self.packets_lost = self.packets_lost.saturating_add(1);
        self.bytes_sent = self.bytes_sent.saturating_add(bytes_out);
    }

    /// Server: a datagram arrived.
    pub fn record_inbound(&mut self, bytes: u32) {
        self.packets_received = self.packets_received.saturating_add(1);
        self.bytes_received = self.bytes_received.saturating_add(bytes);
    }

    /// Server: a datagram was echoed back successfully.
    pub fn record_echoed(&mut self, bytes: u32) {
        self.packets_sent = self.packets_sent.saturating_add(1);
        self.bytes_sent = self.bytes_sent.saturating_add(bytes);
    }

    /// `lost * 100 / sent`, or `None` before anything was sent.
    pub fn loss_percent(&self) -> Option<u32> {
        if self.packets_sent == 0 {
            return None;
        }
        Some((u64::from(self.packets_lost) * 100 / u64::from(self.packets_sent)) as u32)
    }

    pub fn has_rtt(&self) -> bool {
        self.rtt_samples > 0
    }
}

/// Formats microseconds as `ms.µµµ ms`.
fn fmt_ms(us: u32) -> String {
    format!("{}.{:03} ms", us / 1000, us % 1000)
}

impl fmt::Display for EchoStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== UDP Echo Statistics ===")?;
        writeln!(f, "Packets sent:     {}", self.packets_sent)?;
        writeln!(f, "Packets received: {}", self.packets_received)?;
        writeln!(f, "Packets lost:     {}", self.packets_lost)?;
        writeln!(f, "Bytes sent:       {}", self.bytes_sent)?;
        writeln!(f, "Bytes received:   {}", self.bytes_received)?;
        if self.has_rtt() {
            writeln!(f, "RTT min:          {}", fmt_ms(self.rtt_min_us))?;
            writeln!(f, "RTT max:          {}", fmt_ms(self.rtt_max_us))?;
            writeln!(f, "RTT avg:          {}", fmt_ms(self.rtt_avg_us))?;
        }
        if let Some(pct) = self.loss_percent() {
            writeln!(f, "Packet loss:      {pct}%")?;
        }
        write!(f, "===========================")
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
