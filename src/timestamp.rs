// candriver/src/timestamp.rs
//
// Normalization of frame receive times.
//
// This file is part of the Rust 'candriver' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Frame timestamps.
//!
//! The kernel stamps each received frame with the wall-clock time of its
//! capture. A session turns that into an offset, either from the moment
//! the session was opened ([`TimestampMode::Absolute`]) or from the capture
//! of the previous frame ([`TimestampMode::Relative`]).
//!
//! In relative mode the first frame has no predecessor, so its timestamp is
//! its absolute offset. A capture time earlier than the reference (the
//! wall clock stepped back) gives a zero offset.

use libc::timespec;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Converts a C `timespec` into a duration, clamping negative values.
#[inline]
pub fn duration_from_timespec(ts: timespec) -> Duration {
    Duration::new(ts.tv_sec.max(0) as u64, ts.tv_nsec.clamp(0, 999_999_999) as u32)
}

/// Converts a C `timespec` from the realtime clock into a system time.
#[inline]
pub fn system_time_from_timespec(ts: timespec) -> SystemTime {
    UNIX_EPOCH + duration_from_timespec(ts)
}

/// How a session reports frame timestamps.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimestampMode {
    /// Time since the session was opened
    #[default]
    Absolute,
    /// Time since the previous received frame
    Relative,
}

/// Both offsets of one capture time.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stamp {
    /// Time since the session start
    pub absolute: Duration,
    /// Time since the previous capture, or since the session start for
    /// the first frame
    pub relative: Duration,
}

impl Stamp {
    /// The offset to report for the given mode.
    pub fn for_mode(&self, mode: TimestampMode) -> Duration {
        match mode {
            TimestampMode::Absolute => self.absolute,
            TimestampMode::Relative => self.relative,
        }
    }
}

/// Keeps the session start and the previous capture time.
#[derive(Debug, Clone)]
pub struct TimestampTracker {
    start: SystemTime,
    previous: Option<SystemTime>,
}

impl TimestampTracker {
    /// Creates a tracker for a session that started at `start`.
    pub fn new(start: SystemTime) -> Self {
        Self {
            start,
            previous: None,
        }
    }

    /// The time since the session start, saturating at zero.
    pub fn offset(&self, t: SystemTime) -> Duration {
        t.duration_since(self.start).unwrap_or(Duration::ZERO)
    }

    /// Records a capture time and returns its offsets.
    ///
    /// The capture is remembered as the reference for the next relative
    /// offset, whatever mode the caller reports.
    pub fn stamp(&mut self, captured: SystemTime) -> Stamp {
        let absolute = self.offset(captured);
        let relative = match self.previous {
            Some(prev) => captured.duration_since(prev).unwrap_or(Duration::ZERO),
            None => absolute,
        };
        self.previous = Some(captured);
        Stamp { absolute, relative }
    }
}

/////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn at(start: SystemTime, ms: u64) -> SystemTime {
        start + Duration::from_millis(ms)
    }

    #[test]
    fn test_timespec() {
        let ts = timespec {
            tv_sec: 12,
            tv_nsec: 500_000_000,
        };
        assert_eq!(Duration::from_millis(12_500), duration_from_timespec(ts));
        assert_eq!(
            UNIX_EPOCH + Duration::from_millis(12_500),
            system_time_from_timespec(ts)
        );
    }

    #[test]
    fn test_absolute_offsets() {
        let start = SystemTime::now();
        let mut tracker = TimestampTracker::new(start);

        let s1 = tracker.stamp(at(start, 12));
        let s2 = tracker.stamp(at(start, 30));
        assert_eq!(Duration::from_millis(12), s1.for_mode(TimestampMode::Absolute));
        assert_eq!(Duration::from_millis(30), s2.for_mode(TimestampMode::Absolute));
    }

    #[test]
    fn test_relative_offsets_are_deltas() {
        let start = SystemTime::now();
        let mut tracker = TimestampTracker::new(start);

        let (t1, t2, t3) = (at(start, 5), at(start, 17), at(start, 40));
        let s1 = tracker.stamp(t1);
        let s2 = tracker.stamp(t2);
        let s3 = tracker.stamp(t3);

        // The first frame reports its absolute offset
        assert_eq!(s1.absolute, s1.relative);
        assert_eq!(t2.duration_since(t1).unwrap(), s2.relative);
        assert_eq!(t3.duration_since(t2).unwrap(), s3.relative);
        assert_eq!(Duration::from_millis(40), s3.absolute);
    }

    #[test]
    fn test_clock_going_backwards() {
        let start = SystemTime::now();
        let mut tracker = TimestampTracker::new(start);

        let early = start - Duration::from_millis(5);
        assert_eq!(Duration::ZERO, tracker.stamp(early).absolute);

        tracker.stamp(at(start, 20));
        let s = tracker.stamp(at(start, 10));
        assert_eq!(Duration::ZERO, s.relative);
        assert_eq!(Duration::from_millis(10), s.absolute);
    }
}
