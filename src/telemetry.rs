// candriver/src/telemetry.rs
//
// Traffic counters for a CAN session.
//
// This file is part of the Rust 'candriver' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Session telemetry.
//!
//! When enabled, a session counts the frames and bytes that pass through
//! it, and keeps the timing of the last transfer in each direction. The
//! counters are read as a [`TelemetrySnapshot`], a plain copy that doesn't
//! change afterwards.

use crate::{timestamp::Stamp, CanMessage};
use std::time::Duration;

/// The telemetry values at one point in time.
///
/// A session that doesn't collect telemetry reports the default, all
/// zero, snapshot.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TelemetrySnapshot {
    /// Frames returned by reads, of any kind
    pub frames_received: u64,
    /// Frames written to the bus
    pub frames_sent: u64,
    /// Error frames among the received ones
    pub error_frames: u64,
    /// Echoes of frames this session sent, among the received ones
    pub own_frames: u64,
    /// Payload bytes of the received data frames
    pub bytes_received: u64,
    /// Payload bytes of the sent frames
    pub bytes_sent: u64,
    /// Capture time of the last received frame, from the session start
    pub last_receive: Option<Duration>,
    /// Time of the last send, from the session start
    pub last_send: Option<Duration>,
    /// Time between the last two received frames
    pub last_interval: Option<Duration>,
}

/// Accumulates telemetry for a session.
#[derive(Debug, Default, Clone)]
pub struct TelemetryCollector {
    current: TelemetrySnapshot,
}

impl TelemetryCollector {
    /// Creates a collector with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accounts for a frame that was read.
    pub fn record_receive(&mut self, msg: &CanMessage, stamp: Stamp, own: bool) {
        let t = &mut self.current;
        t.frames_received += 1;
        if msg.is_error_frame() {
            t.error_frames += 1;
        } else {
            t.bytes_received += msg.len() as u64;
        }
        if own {
            t.own_frames += 1;
        }
        if t.last_receive.is_some() {
            t.last_interval = Some(stamp.relative);
        }
        t.last_receive = Some(stamp.absolute);
    }

    /// Accounts for a frame that was written, `offset` after the session
    /// start.
    pub fn record_send(&mut self, msg: &CanMessage, offset: Duration) {
        let t = &mut self.current;
        t.frames_sent += 1;
        t.bytes_sent += msg.len() as u64;
        t.last_send = Some(offset);
    }

    /// Gets a copy of the current values.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.current
    }
}

/////////////////////////////////////////////////////////////////////////////
