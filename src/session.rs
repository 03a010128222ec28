// candriver/src/session.rs
//
// The CAN session: one raw socket, its configuration, and the frame I/O.
//
// This file is part of the Rust 'candriver' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! CAN sessions.
//!
//! A [`Session`] owns a raw CAN socket bound to one interface. It is
//! configured (filters, error frames, own-message echo, telemetry,
//! timestamp mode), then polled:
//!
//! ```no_run
//! use candriver::{FilterSet, Session};
//! use std::time::Duration;
//!
//! let mut session = Session::open("vcan0")?;
//! session.set_error_filter()?;
//!
//! let mut filters = FilterSet::new();
//! filters.add(0x489, 0x7FF)?;
//! session.set_can_filters(&filters)?;
//! session.set_return_relative_timestamps();
//!
//! loop {
//!     if !session.wait_for_messages(Duration::from_millis(100))? {
//!         continue;
//!     }
//!     let msg = session.read_message()?;
//!     if msg.is_error_frame() {
//!         eprintln!("Error frame: {}", msg);
//!     } else {
//!         println!("{}", msg);
//!     }
//! }
//! # Ok::<(), candriver::Error>(())
//! ```
//!
//! All the configuration calls should be made before the first read. The
//! socket is non-blocking, so [`Session::read_message`] fails with
//! [`ReceiveError::NoMessagePending`] rather than waiting; use
//! [`Session::wait_for_messages`] to wait.

use crate::{
    id::ERR_MASK_ALL,
    socket::RawCanSocket,
    telemetry::{TelemetryCollector, TelemetrySnapshot},
    timestamp::{TimestampMode, TimestampTracker},
    CanAddr, CanMessage, ConfigError, Error, FilterSet, InitError, ReceiveError, SendError,
};
use embedded_can::{Frame as EmbeddedFrame, Id};
use log::{debug, trace, warn};
use nix::{ifaddrs::getifaddrs, net::if_::InterfaceFlags};
use std::{
    borrow::Borrow,
    os::unix::io::{AsFd, AsRawFd, BorrowedFd, RawFd},
    thread,
    time::{Duration, SystemTime},
};

/// How long a blocking receive waits in one `poll` call.
const BLOCKING_POLL: Duration = Duration::from_secs(1);

/// Checks the `IFF_UP` flag of the named interface.
///
/// Gives `None` when the interface list can't be read, or the interface
/// isn't in it.
fn iface_is_up(iface: &str) -> Option<bool> {
    let addrs = match getifaddrs() {
        Ok(addrs) => addrs,
        Err(err) => {
            warn!("Unable to read the interface list: {}", err);
            return None;
        }
    };
    let mut found = None;
    for addr in addrs.filter(|a| a.interface_name == iface) {
        if addr.flags.contains(InterfaceFlags::IFF_UP) {
            return Some(true);
        }
        found = Some(false);
    }
    found
}

// ===== SessionConfig =====

/// The settings of a session.
///
/// This can be built up front and applied with [`Session::open_with`], or
/// read back from an open session with [`Session::config`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// The id used by [`Session::send_data`]
    pub default_sender_id: Option<Id>,
    /// The receive filters. Empty accepts all frames.
    pub filters: FilterSet,
    /// Whether frames have to match all the filters, rather than any
    pub join_filters: bool,
    /// The error classes delivered as error frames. Zero delivers none.
    pub error_mask: u32,
    /// Whether the session's own sent frames are read back
    pub receive_own_messages: bool,
    /// Whether telemetry is collected
    pub collect_telemetry: bool,
    /// How received frames are timestamped
    pub timestamp_mode: TimestampMode,
}

impl SessionConfig {
    /// Creates the default configuration: no default sender, all data
    /// frames, no error frames, no echo, no telemetry, absolute
    /// timestamps.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default sender id.
    pub fn with_default_sender(mut self, id: impl Into<Id>) -> Self {
        self.default_sender_id = Some(id.into());
        self
    }

    /// Sets the receive filters.
    pub fn with_filters(mut self, filters: FilterSet) -> Self {
        self.filters = filters;
        self
    }

    /// Frames have to match all filters.
    pub fn with_join_filters(mut self) -> Self {
        self.join_filters = true;
        self
    }

    /// Delivers all error classes.
    pub fn with_error_filter(self) -> Self {
        self.with_error_mask(ERR_MASK_ALL)
    }

    /// Delivers the given error classes.
    pub fn with_error_mask(mut self, mask: u32) -> Self {
        self.error_mask = mask;
        self
    }

    /// Reads back the session's own frames.
    pub fn with_receive_own_messages(mut self) -> Self {
        self.receive_own_messages = true;
        self
    }

    /// Collects telemetry.
    pub fn with_telemetry(mut self) -> Self {
        self.collect_telemetry = true;
        self
    }

    /// Timestamps frames relative to the previous one.
    pub fn with_relative_timestamps(mut self) -> Self {
        self.timestamp_mode = TimestampMode::Relative;
        self
    }
}

// ===== Session =====

/// A CAN session on one interface.
///
/// The methods take `&mut self`; to share a session between threads, wrap
/// it in a `Mutex`. The socket is closed when the session is dropped.
#[derive(Debug)]
pub struct Session {
    iface: String,
    sock: RawCanSocket,
    config: SessionConfig,
    timestamps: TimestampTracker,
    telemetry: Option<TelemetryCollector>,
    warned_no_timestamp: bool,
}

impl Session {
    /// Opens a session on the named interface, like "can0" or "vcan0".
    ///
    /// Fails if the interface doesn't exist, is down, or a raw CAN socket
    /// can't be bound to it.
    pub fn open(iface: &str) -> Result<Self, InitError> {
        Self::open_with(iface, &SessionConfig::default())
    }

    /// Opens a session with a default sender id for [`Session::send_data`].
    pub fn open_with_sender(iface: &str, default_sender_id: Option<Id>) -> Result<Self, InitError> {
        let config = SessionConfig {
            default_sender_id,
            ..SessionConfig::default()
        };
        Self::open_with(iface, &config)
    }

    /// Opens a session and applies a whole configuration.
    pub fn open_with(iface: &str, config: &SessionConfig) -> Result<Self, InitError> {
        let addr = CanAddr::from_iface(iface).map_err(|source| InitError::InterfaceNotFound {
            iface: iface.into(),
            source,
        })?;

        if iface_is_up(iface) == Some(false) {
            return Err(InitError::InterfaceDown {
                iface: iface.into(),
            });
        }

        let sock = RawCanSocket::open(&addr).map_err(|source| InitError::Socket {
            iface: iface.into(),
            source,
        })?;

        let mut session = Self {
            iface: iface.into(),
            sock,
            config: SessionConfig::default(),
            timestamps: TimestampTracker::new(SystemTime::now()),
            telemetry: None,
            warned_no_timestamp: false,
        };
        session
            .apply(config)
            .map_err(|source| InitError::Config {
                iface: iface.into(),
                source,
            })?;

        debug!("Opened CAN session on '{}' ({:?})", iface, addr);
        Ok(session)
    }

    fn apply(&mut self, config: &SessionConfig) -> Result<(), ConfigError> {
        self.config.default_sender_id = config.default_sender_id;
        if !config.filters.is_empty() {
            self.set_can_filters(&config.filters)?;
        }
        if config.join_filters {
            self.set_join_filters()?;
        }
        if config.error_mask != 0 {
            self.set_error_mask(config.error_mask)?;
        }
        if config.receive_own_messages {
            self.set_receive_own_messages()?;
        }
        if config.collect_telemetry {
            self.set_collect_telemetry();
        }
        if config.timestamp_mode == TimestampMode::Relative {
            self.set_return_relative_timestamps();
        }
        Ok(())
    }

    /// The name of the interface
    pub fn interface(&self) -> &str {
        &self.iface
    }

    /// A copy of the current configuration.
    pub fn config(&self) -> SessionConfig {
        self.config.clone()
    }

    /// The id used by [`Session::send_data`], if any
    pub fn default_sender_id(&self) -> Option<Id> {
        self.config.default_sender_id
    }

    /// Sets, or clears, the id used by [`Session::send_data`].
    pub fn set_default_sender_id(&mut self, id: Option<Id>) {
        self.config.default_sender_id = id;
    }

    // ----- Configuration -----

    /// Delivers error frames for every error class.
    ///
    /// Calling this more than once has no further effect.
    pub fn set_error_filter(&mut self) -> Result<(), ConfigError> {
        self.set_error_mask(ERR_MASK_ALL)
    }

    /// Delivers error frames for the error classes in the mask only.
    ///
    /// A mask of zero turns error frames off again.
    pub fn set_error_mask(&mut self, mask: u32) -> Result<(), ConfigError> {
        self.sock.set_error_mask(mask)?;
        self.config.error_mask = mask;
        debug!("{}: error mask set to {:#X}", self.iface, mask);
        Ok(())
    }

    /// Installs the receive filters, replacing the previous ones.
    ///
    /// Frames that pass none of the filters are dropped by the kernel; they
    /// are never seen by this session. An empty set accepts all frames.
    pub fn set_can_filters(&mut self, filters: &FilterSet) -> Result<(), ConfigError> {
        self.sock.set_filters(&filters.to_kernel())?;
        self.config.filters = filters.clone();
        debug!("{}: installed {} CAN filter(s)", self.iface, filters.len());
        Ok(())
    }

    /// Installs a single (id, mask) filter, replacing the previous ones.
    pub fn set_can_filter_mask(&mut self, id: u32, mask: u32) -> Result<(), ConfigError> {
        let mut filters = FilterSet::new();
        filters.add(id, mask)?;
        self.set_can_filters(&filters)
    }

    /// Frames have to pass all of the filters, rather than any one.
    pub fn set_join_filters(&mut self) -> Result<(), ConfigError> {
        if !self.config.join_filters {
            self.sock.set_join_filters(true)?;
            self.config.join_filters = true;
            debug!("{}: joined filters", self.iface);
        }
        Ok(())
    }

    /// Starts collecting telemetry. Calling this again has no effect.
    pub fn set_collect_telemetry(&mut self) {
        if self.telemetry.is_none() {
            self.telemetry = Some(TelemetryCollector::new());
            self.config.collect_telemetry = true;
            debug!("{}: collecting telemetry", self.iface);
        }
    }

    /// Reads back the frames sent by this session.
    ///
    /// Kernel loopback is left on, as it is by default.
    pub fn set_receive_own_messages(&mut self) -> Result<(), ConfigError> {
        if !self.config.receive_own_messages {
            self.sock.set_recv_own_msgs(true)?;
            self.config.receive_own_messages = true;
            debug!("{}: receiving own messages", self.iface);
        }
        Ok(())
    }

    /// Timestamps each frame relative to the previous one, rather than to
    /// the session start.
    ///
    /// If frames were already read, the first relative timestamp is taken
    /// from the last of those.
    pub fn set_return_relative_timestamps(&mut self) {
        if self.config.timestamp_mode != TimestampMode::Relative {
            self.config.timestamp_mode = TimestampMode::Relative;
            debug!("{}: relative timestamps", self.iface);
        }
    }

    // ----- Receiving -----

    /// Waits up to `timeout` for a frame to be ready, without reading it.
    ///
    /// A zero timeout checks once and returns at once. An interrupted wait
    /// returns `false`.
    pub fn wait_for_messages(&mut self, timeout: Duration) -> Result<bool, ReceiveError> {
        self.sock.poll_readable(timeout).map_err(|err| {
            debug!("{}: wait failed: {}", self.iface, err);
            err
        })
    }

    /// Reads one pending frame.
    ///
    /// The frame is timestamped according to the timestamp mode. Error
    /// frames are returned like any other; check
    /// [`CanMessage::is_error_frame`].
    pub fn read_message(&mut self) -> Result<CanMessage, ReceiveError> {
        let rx = match self.sock.recv_frame() {
            Ok(rx) => rx,
            Err(ReceiveError::NoMessagePending) => return Err(ReceiveError::NoMessagePending),
            Err(err) => {
                debug!("{}: read failed: {}", self.iface, err);
                return Err(err);
            }
        };

        let captured = match rx.captured {
            Some(t) => t,
            None => {
                if !self.warned_no_timestamp {
                    warn!(
                        "{}: no kernel receive timestamp; using the time of the read",
                        self.iface
                    );
                    self.warned_no_timestamp = true;
                }
                SystemTime::now()
            }
        };

        let stamp = self.timestamps.stamp(captured);
        let msg = CanMessage::from(rx.frame).with_timestamp(stamp.for_mode(self.config.timestamp_mode));

        if let Some(telemetry) = self.telemetry.as_mut() {
            telemetry.record_receive(&msg, stamp, rx.own);
        }
        trace!("{}: read {:X}", self.iface, msg);
        Ok(msg)
    }

    /// Reads every frame that is pending right now.
    pub fn read_queued_messages(&mut self) -> Result<Vec<CanMessage>, ReceiveError> {
        let mut msgs = Vec::new();
        loop {
            match self.read_message() {
                Ok(msg) => msgs.push(msg),
                Err(ReceiveError::NoMessagePending) => break,
                Err(err) => return Err(err),
            }
        }
        Ok(msgs)
    }

    // ----- Sending -----

    /// Writes a frame to the bus.
    pub fn send_message(&mut self, msg: &CanMessage) -> Result<(), SendError> {
        if msg.is_error_frame() {
            return Err(SendError::ErrorFrame);
        }
        if msg.dlc() > crate::id::CAN_MAX_DLEN {
            return Err(SendError::TooMuchData(msg.dlc()));
        }

        if let Err(err) = self.sock.write_frame(&msg.to_can_frame()) {
            debug!("{}: send of {:X} failed: {}", self.iface, msg, err);
            return Err(err);
        }

        if let Some(telemetry) = self.telemetry.as_mut() {
            telemetry.record_send(msg, self.timestamps.offset(SystemTime::now()));
        }
        trace!("{}: sent {:X}", self.iface, msg);
        Ok(())
    }

    /// Sends a data frame with the default sender id.
    pub fn send_data(&mut self, data: &[u8]) -> Result<(), SendError> {
        let id = self.config.default_sender_id.ok_or(SendError::NoDefaultSender)?;
        let msg = CanMessage::data_frame(id, data).map_err(|_| SendError::TooMuchData(data.len()))?;
        self.send_message(&msg)
    }

    /// Sends the frames in order, waiting `delay` between two frames.
    ///
    /// Stops at the first failure. On success, returns the number of frames
    /// sent.
    pub fn send_message_queue<I>(&mut self, msgs: I, delay: Duration) -> Result<usize, SendError>
    where
        I: IntoIterator,
        I::Item: Borrow<CanMessage>,
    {
        let mut sent = 0;
        for msg in msgs {
            if sent > 0 && !delay.is_zero() {
                thread::sleep(delay);
            }
            self.send_message(msg.borrow())
                .map_err(|err| SendError::Queue {
                    sent,
                    source: Box::new(err),
                })?;
            sent += 1;
        }
        Ok(sent)
    }

    // ----- Telemetry -----

    /// The telemetry so far. All zero when telemetry isn't collected.
    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.telemetry
            .as_ref()
            .map(TelemetryCollector::snapshot)
            .unwrap_or_default()
    }
}

impl AsRawFd for Session {
    fn as_raw_fd(&self) -> RawFd {
        self.sock.as_raw_fd()
    }
}

impl AsFd for Session {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.sock.as_fd()
    }
}

impl embedded_can::blocking::Can for Session {
    type Frame = CanMessage;
    type Error = Error;

    /// Blocking call to transmit a frame.
    fn transmit(&mut self, frame: &Self::Frame) -> Result<(), Self::Error> {
        self.send_message(frame).map_err(Error::from)
    }

    /// Blocking call to receive the next frame.
    fn receive(&mut self) -> Result<Self::Frame, Self::Error> {
        loop {
            if !self.wait_for_messages(BLOCKING_POLL)? {
                continue;
            }
            match self.read_message() {
                Ok(msg) => return Ok(msg),
                Err(ReceiveError::NoMessagePending) => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }
}

impl embedded_can::nb::Can for Session {
    type Frame = CanMessage;
    type Error = Error;

    /// Non-blocking call to transmit a frame.
    ///
    /// A full transmit queue gives `WouldBlock`. No frame is ever replaced.
    fn transmit(&mut self, frame: &Self::Frame) -> nb::Result<Option<Self::Frame>, Self::Error> {
        match self.send_message(frame) {
            Ok(()) => Ok(None),
            Err(err) if err.should_retry() => Err(nb::Error::WouldBlock),
            Err(err) => Err(nb::Error::Other(err.into())),
        }
    }

    /// Non-blocking call to receive a frame.
    fn receive(&mut self) -> nb::Result<Self::Frame, Self::Error> {
        match self.read_message() {
            Ok(msg) => Ok(msg),
            Err(ReceiveError::NoMessagePending) => Err(nb::Error::WouldBlock),
            Err(err) => Err(nb::Error::Other(err.into())),
        }
    }
}

/////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_can::StandardId;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::new();
        assert_eq!(None, config.default_sender_id);
        assert!(config.filters.is_empty());
        assert!(!config.join_filters);
        assert_eq!(0, config.error_mask);
        assert!(!config.receive_own_messages);
        assert!(!config.collect_telemetry);
        assert_eq!(TimestampMode::Absolute, config.timestamp_mode);
    }

    #[test]
    fn test_config_builder() {
        let mut filters = FilterSet::new();
        filters.add(0x489, 0x7FF).unwrap();

        let sender = StandardId::new(0x123).unwrap();
        let config = SessionConfig::new()
            .with_default_sender(sender)
            .with_filters(filters.clone())
            .with_error_filter()
            .with_receive_own_messages()
            .with_telemetry()
            .with_relative_timestamps();

        assert_eq!(Some(Id::Standard(sender)), config.default_sender_id);
        assert_eq!(filters, config.filters);
        assert_eq!(ERR_MASK_ALL, config.error_mask);
        assert!(config.receive_own_messages);
        assert!(config.collect_telemetry);
        assert_eq!(TimestampMode::Relative, config.timestamp_mode);

        let config = config.with_error_mask(0x40).with_join_filters();
        assert_eq!(0x40, config.error_mask);
        assert!(config.join_filters);
    }

    #[test]
    fn test_open_missing_interface() {
        let err = Session::open("nocan-iface9").unwrap_err();
        assert!(matches!(err, InitError::InterfaceNotFound { .. }));
    }
}
