// candriver/src/frame.rs
//
// The CAN frame value returned by and given to a session.
//
// This file is part of the Rust 'candriver' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! CAN bus frames.
//!
//! At the lowest level, [libc](https://crates.io/crates/libc) defines the
//! classic CAN frame as
//! [can_frame](https://docs.rs/libc/latest/libc/struct.can_frame.html),
//! which is binary compatible with what the kernel reads and writes on a
//! raw CAN socket.
//!
//! [`CanMessage`] is the owned, immutable value built from one of those.
//! The three kinds of classic frame share a single type, told apart by
//! [`FrameKind`]:
//! - `Data` - A standard CAN frame that can contain up to 8 bytes of data.
//! - `Remote` - A CAN Remote frame which is meant to request a
//!   transmission by another node on the bus. It contains no data.
//! - `Error` - This is an incoming (only) frame that contains information
//!   about a problem on the bus or in the driver. Its ID word holds an
//!   error class bitmask rather than a bus address. It can be decoded into
//!   a [`CanError`].

use crate::{
    errors::ErrorClass,
    id::{
        id_from_raw, id_from_word, id_to_canid_t, IdFlags, CAN_EFF_MASK, CAN_ERR_FLAG,
        CAN_ERR_MASK, CAN_MAX_DLEN, CAN_RTR_FLAG, CAN_SFF_MASK,
    },
    CanError, CanErrorDecodingFailure, ConstructionError,
};
use embedded_can::{Frame as EmbeddedFrame, Id};
use itertools::Itertools;
use libc::{can_frame, canid_t};
use std::{fmt, mem, time::Duration};

/// Creates a default C `can_frame`.
/// This initializes the entire structure to zeros.
#[inline(always)]
pub fn can_frame_default() -> can_frame {
    unsafe { mem::zeroed() }
}

/// The kind of a classic CAN frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// A data frame with up to 8 bytes of payload
    Data,
    /// A remote transmission request; carries a DLC but no payload
    Remote,
    /// An error frame reported by the kernel or the controller
    Error,
}

impl FrameKind {
    /// Determines the kind from the flags in a composite ID word.
    ///
    /// The error flag takes precedence over the remote flag.
    pub fn from_id_word(word: canid_t) -> Self {
        if word & CAN_ERR_FLAG != 0 {
            FrameKind::Error
        } else if word & CAN_RTR_FLAG != 0 {
            FrameKind::Remote
        } else {
            FrameKind::Data
        }
    }
}

// ===== CanMessage =====

/// A classic CAN 2.0 frame.
///
/// Messages read from a [`Session`](crate::Session) always carry a
/// timestamp; messages built by the application don't.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CanMessage {
    kind: FrameKind,
    /// 32 bit CAN_ID + EFF/RTR/ERR flags
    id_word: canid_t,
    /// data length code
    dlc: u8,
    data: [u8; CAN_MAX_DLEN],
    timestamp: Option<Duration>,
}

impl CanMessage {
    fn init(id_word: canid_t, dlc: usize, data: &[u8]) -> Result<Self, ConstructionError> {
        if dlc > CAN_MAX_DLEN || data.len() > CAN_MAX_DLEN {
            return Err(ConstructionError::TooMuchData);
        }
        let mut buf = [0u8; CAN_MAX_DLEN];
        buf[..data.len()].copy_from_slice(data);
        Ok(Self {
            kind: FrameKind::from_id_word(id_word),
            id_word,
            dlc: dlc as u8,
            data: buf,
            timestamp: None,
        })
    }

    /// Creates a data frame.
    pub fn data_frame(id: impl Into<Id>, data: &[u8]) -> Result<Self, ConstructionError> {
        Self::init(id_to_canid_t(id), data.len(), data)
    }

    /// Creates a data frame using a raw, integer CAN ID.
    ///
    /// If the `id` is <= 0x7FF, it's assumed to be a standard ID, otherwise
    /// it is created as an Extended ID. If you require an Extended ID <= 0x7FF,
    /// use `data_frame()`.
    pub fn from_raw_id(id: u32, data: &[u8]) -> Result<Self, ConstructionError> {
        let id = id_from_raw(id).ok_or(ConstructionError::IDTooLarge)?;
        Self::data_frame(id, data)
    }

    /// Creates a remote transmission request frame.
    ///
    /// This will set the RTR flag in the CAN ID word.
    pub fn remote_frame(id: impl Into<Id>, dlc: usize) -> Result<Self, ConstructionError> {
        Self::init(id_to_canid_t(id) | CAN_RTR_FLAG, dlc, &[])
    }

    /// Creates a CAN error frame from an error class and its detail bytes.
    ///
    /// An application would not normally create an error frame. This is
    /// included mainly to aid in implementing mocks and tests.
    ///
    /// - The error flag is forced on
    /// - The other, non-error, flags are forced off
    /// - The frame data is always padded with zero's to 8 bytes
    pub fn new_error(class: u32, data: &[u8]) -> Result<Self, ConstructionError> {
        Self::init((class & CAN_ERR_MASK) | CAN_ERR_FLAG, CAN_MAX_DLEN, data)
    }

    /// Returns a copy of this message carrying the given timestamp.
    pub(crate) fn with_timestamp(mut self, timestamp: Duration) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// The kind of frame: data, remote or error.
    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    /// Get the composite SocketCAN ID word, with EFF/RTR/ERR flags
    pub fn id_word(&self) -> canid_t {
        self.id_word
    }

    /// Returns the EFF/RTR/ERR flags from the ID word
    pub fn id_flags(&self) -> IdFlags {
        IdFlags::from_bits_truncate(self.id_word)
    }

    /// Return the actual raw CAN ID (without EFF/RTR/ERR flags)
    pub fn raw_id(&self) -> u32 {
        let mask = if self.is_extended() {
            CAN_EFF_MASK
        } else {
            CAN_SFF_MASK
        };
        self.id_word & mask
    }

    /// Check if frame is a data frame
    pub fn is_data_frame(&self) -> bool {
        self.kind == FrameKind::Data
    }

    /// Check if frame is an error frame
    pub fn is_error_frame(&self) -> bool {
        self.kind == FrameKind::Error
    }

    /// Get the data length
    pub fn len(&self) -> usize {
        self.data().len()
    }

    /// Whether the frame carries no payload bytes
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The timestamp assigned when the frame was read, if any.
    ///
    /// Depending on the session configuration this is the offset from the
    /// session start, or from the previous frame.
    pub fn timestamp(&self) -> Option<Duration> {
        self.timestamp
    }

    /// Return the error bits from the ID word of an error frame.
    /// This is zero for other kinds of frames.
    pub fn error_class_bits(&self) -> u32 {
        match self.kind {
            FrameKind::Error => self.id_word & CAN_ERR_MASK,
            _ => 0,
        }
    }

    /// The known error classes reported by an error frame.
    pub fn error_class(&self) -> ErrorClass {
        ErrorClass::from_bits_truncate(self.error_class_bits())
    }

    /// Decodes an error frame into a `CanError`.
    pub fn error(&self) -> Result<CanError, CanErrorDecodingFailure> {
        CanError::from_frame(self)
    }

    /// The TX and RX error counters, when an error frame reports them.
    pub fn error_counters(&self) -> Option<(u8, u8)> {
        if self.error_class().contains(ErrorClass::COUNTERS) {
            Some((self.data[6], self.data[7]))
        } else {
            None
        }
    }

    /// Encodes the message into the C `can_frame` that goes on the socket.
    pub fn to_can_frame(&self) -> can_frame {
        let mut frame = can_frame_default();
        frame.can_id = self.id_word;
        frame.can_dlc = self.dlc;
        frame.data = self.data;
        frame
    }
}

impl EmbeddedFrame for CanMessage {
    /// Create a new CAN 2.0 data frame
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        Self::data_frame(id, data).ok()
    }

    /// Create a new remote transmission request frame.
    fn new_remote(id: impl Into<Id>, dlc: usize) -> Option<Self> {
        Self::remote_frame(id, dlc).ok()
    }

    /// Check if frame uses 29-bit extended ID format.
    fn is_extended(&self) -> bool {
        self.id_word & libc::CAN_EFF_FLAG != 0
    }

    /// Check if frame is a remote transmission request.
    fn is_remote_frame(&self) -> bool {
        self.kind == FrameKind::Remote
    }

    /// Return the frame identifier.
    fn id(&self) -> Id {
        id_from_word(self.id_word)
    }

    /// Data length code
    fn dlc(&self) -> usize {
        self.dlc as usize
    }

    /// A slice into the actual data. Empty for remote frames.
    fn data(&self) -> &[u8] {
        match self.kind {
            FrameKind::Remote => &[],
            _ => &self.data[..self.dlc as usize],
        }
    }
}

impl From<can_frame> for CanMessage {
    /// Decodes a C `can_frame` as read from the socket.
    fn from(frame: can_frame) -> Self {
        let dlc = frame.can_dlc.min(CAN_MAX_DLEN as u8);
        Self {
            kind: FrameKind::from_id_word(frame.can_id),
            id_word: frame.can_id,
            dlc,
            data: frame.data,
            timestamp: None,
        }
    }
}

impl From<&CanMessage> for can_frame {
    fn from(msg: &CanMessage) -> Self {
        msg.to_can_frame()
    }
}

impl fmt::Debug for CanMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "CanMessage {{ {:?} ", self.kind)?;
        fmt::UpperHex::fmt(self, f)?;
        if let Some(ts) = self.timestamp {
            write!(f, " @ {:?}", ts)?;
        }
        write!(f, " }}")
    }
}

impl fmt::Display for CanMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let data = self.data().iter().map(|v| format!("{:02X}", v)).join(" ");
        write!(f, "CanMessage(canId: {:X}, data: {}", self.raw_id(), data)?;
        if let Some(ts) = self.timestamp {
            write!(f, ", timestampOffset: {}ms", ts.as_millis())?;
        }
        write!(f, ")")
    }
}

impl fmt::UpperHex for CanMessage {
    /// Formats the frame like candump: `123#DEADBEEF`, `12345678#R`.
    /// The alternate form separates the bytes with spaces.
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        match self.kind {
            FrameKind::Error => write!(f, "{:08X}#", self.id_word & (CAN_ERR_FLAG | CAN_ERR_MASK))?,
            _ if self.is_extended() => write!(f, "{:08X}#", self.raw_id())?,
            _ => write!(f, "{:03X}#", self.raw_id())?,
        }
        if self.kind == FrameKind::Remote {
            return write!(f, "R");
        }
        let sep = if f.alternate() { " " } else { "" };
        let mut parts = self.data().iter().map(|v| format!("{:02X}", v));
        write!(f, "{}", parts.join(sep))
    }
}

/////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::CAN_EFF_FLAG;
    use embedded_can::{ExtendedId, StandardId};

    const STD_ID: Id = Id::Standard(StandardId::MAX);
    const EXT_ID: Id = Id::Extended(ExtendedId::MAX);

    const DATA: &[u8] = &[0xFF, 0xFF, 0xFF, 0xFF];

    #[test]
    fn test_data_frame() {
        let frame = CanMessage::from_raw_id(0x489, DATA).unwrap();
        assert_eq!(FrameKind::Data, frame.kind());
        assert_eq!(0x489, frame.raw_id());
        assert!(frame.is_standard());
        assert!(frame.is_data_frame());
        assert!(!frame.is_remote_frame());
        assert!(!frame.is_error_frame());
        assert_eq!(DATA, frame.data());
        assert_eq!(4, frame.dlc());
        assert!(frame.timestamp().is_none());

        let frame = CanMessage::data_frame(EXT_ID, DATA).unwrap();
        assert_eq!(EXT_ID, frame.id());
        assert!(frame.is_extended());
        assert_eq!(ExtendedId::MAX.as_raw() | CAN_EFF_FLAG, frame.id_word());

        // Extended stays extended, even in the standard range
        let low = Id::Extended(ExtendedId::new(0x7FF).unwrap());
        let frame = CanMessage::data_frame(low, DATA).unwrap();
        assert!(frame.is_extended());
        assert_eq!(low, frame.id());
    }

    #[test]
    fn test_construction_limits() {
        assert_eq!(
            Err(ConstructionError::TooMuchData),
            CanMessage::data_frame(STD_ID, &[0; 9])
        );
        assert_eq!(
            Err(ConstructionError::IDTooLarge),
            CanMessage::from_raw_id(CAN_EFF_MASK + 1, DATA)
        );
        assert!(CanMessage::new(STD_ID, &[0; 9]).is_none());
        assert!(CanMessage::new_remote(STD_ID, CAN_MAX_DLEN + 1).is_none());
    }

    #[test]
    fn test_remote_frame() {
        let frame = CanMessage::remote_frame(STD_ID, 4).unwrap();
        assert_eq!(FrameKind::Remote, frame.kind());
        assert!(frame.is_remote_frame());
        assert!(frame.id_flags().contains(IdFlags::RTR));
        assert_eq!(4, frame.dlc());
        assert!(frame.data().is_empty());
        assert!(frame.is_empty());
    }

    #[test]
    fn test_error_frame() {
        let frame = CanMessage::new_error(0x0040, &[]).unwrap();
        assert!(frame.is_error_frame());
        assert!(!frame.is_data_frame());
        assert_eq!(0x0040, frame.error_class_bits());
        assert_eq!(ErrorClass::BUS_OFF, frame.error_class());
        assert_eq!(Ok(CanError::BusOff), frame.error());
        assert_eq!(CAN_MAX_DLEN, frame.data().len());

        let frame = CanMessage::new_error(0x0200, &[0, 0, 0, 0, 0, 0, 96, 128]).unwrap();
        assert_eq!(Some((96, 128)), frame.error_counters());

        let frame = CanMessage::from_raw_id(0x40, &[]).unwrap();
        assert_eq!(0, frame.error_class_bits());
        assert!(frame.error_counters().is_none());
    }

    #[test]
    fn test_can_frame_codec() {
        let mut raw = can_frame_default();
        raw.can_id = 0x1234_5678 | CAN_EFF_FLAG;
        raw.can_dlc = 3;
        raw.data[..3].copy_from_slice(&[1, 2, 3]);

        let msg = CanMessage::from(raw);
        assert!(msg.is_extended());
        assert_eq!(0x1234_5678, msg.raw_id());
        assert_eq!(&[1, 2, 3], msg.data());

        let back = msg.to_can_frame();
        assert_eq!(raw.can_id, back.can_id);
        assert_eq!(raw.can_dlc, back.can_dlc);
        assert_eq!(raw.data, back.data);

        let mut raw = can_frame_default();
        raw.can_id = CAN_ERR_FLAG | 0x20;
        raw.can_dlc = 8;
        assert_eq!(FrameKind::Error, CanMessage::from(raw).kind());
    }

    #[test]
    fn test_formatting() {
        let frame = CanMessage::from_raw_id(0x489, DATA).unwrap();
        assert_eq!("489#FFFFFFFF", format!("{:X}", frame));
        assert_eq!("489#FF FF FF FF", format!("{:#X}", frame));
        assert_eq!("CanMessage(canId: 489, data: FF FF FF FF)", frame.to_string());

        let frame = frame.with_timestamp(Duration::from_millis(12));
        assert_eq!(
            "CanMessage(canId: 489, data: FF FF FF FF, timestampOffset: 12ms)",
            frame.to_string()
        );

        let frame = CanMessage::remote_frame(Id::Extended(ExtendedId::new(0x123).unwrap()), 2).unwrap();
        assert_eq!("00000123#R", format!("{:X}", frame));
    }
}
