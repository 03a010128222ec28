// candriver/src/errors.rs
//
// Bus errors decoded from error frames, and the session error taxonomy.
//
// This file is part of the Rust 'candriver' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! CAN bus errors and session errors.
//!
//! Two different things are called "errors" on a CAN socket:
//!
//! 1. Bus errors. The kernel reports problems on the bus (lost arbitration,
//!    missing ACK, bus-off, ...) as *error frames*. These arrive through a
//!    normal, successful read once [`Session::set_error_filter`] was called.
//!    The error class is encoded in the bits of the ID word, and some
//!    classes carry details in the data bytes:
//!
//! ```text
//! Lost Arbitration   (0x02) => data[0]
//! Controller Problem (0x04) => data[1]
//! Protocol Violation (0x08) => data[2..3]
//! Transceiver Status (0x10) => data[4]
//!
//! Error Counters (0x200) =>
//!   TX Error Counter => data[6]
//!   RX Error Counter => data[7]
//! ```
//!
//!    See [linux/can/error.h](https://raw.githubusercontent.com/torvalds/linux/master/include/uapi/linux/can/error.h)
//!
//! 2. Session errors. Failures of the socket operations themselves, split
//!    by the operation that can raise them: [`InitError`], [`ConfigError`],
//!    [`ReceiveError`] and [`SendError`].
//!
//! [`Session::set_error_filter`]: crate::Session::set_error_filter

use crate::CanMessage;
use bitflags::bitflags;
use embedded_can::Frame as EmbeddedFrame;
use std::{convert::TryFrom, fmt, io};
use thiserror::Error;

#[inline]
/// Helper function to retrieve a specific byte of frame data or returning an
/// `Err(..)` otherwise.
fn get_data(frame: &CanMessage, idx: u8) -> Result<u8, CanErrorDecodingFailure> {
    frame
        .data()
        .get(idx as usize)
        .copied()
        .ok_or(CanErrorDecodingFailure::NotEnoughData(idx))
}

// ===== ErrorClass =====

bitflags! {
    /// The error class bits from the ID word of an error frame.
    ///
    /// More than one class can be reported by a single frame, for example
    /// a controller problem together with the error counters.
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ErrorClass: u32 {
        /// TX timeout (by netdevice driver)
        const TX_TIMEOUT = 0x0000_0001;
        /// Lost arbitration, see data[0]
        const LOST_ARBITRATION = 0x0000_0002;
        /// Controller problems, see data[1]
        const CONTROLLER = 0x0000_0004;
        /// Protocol violations, see data[2..3]
        const PROTOCOL = 0x0000_0008;
        /// Transceiver status, see data[4]
        const TRANSCEIVER = 0x0000_0010;
        /// Received no ACK on transmission
        const NO_ACK = 0x0000_0020;
        /// Bus off
        const BUS_OFF = 0x0000_0040;
        /// Bus error (may flood!)
        const BUS_ERROR = 0x0000_0080;
        /// Controller restarted
        const RESTARTED = 0x0000_0100;
        /// TX/RX error counters, see data[6..7]
        const COUNTERS = 0x0000_0200;
    }
}

// ===== CanErrorDecodingFailure =====

/// Error decoding a CanError from a CanMessage.
#[derive(Error, Copy, Clone, Debug, PartialEq, Eq)]
pub enum CanErrorDecodingFailure {
    /// The supplied frame did not have the error bit set.
    #[error("CAN frame is not an error")]
    NotAnError,
    /// The error type is not known and cannot be decoded.
    #[error("unknown error type (0x{0:X})")]
    UnknownErrorType(u32),
    /// The error type indicated a need for additional information as `data`,
    /// but the `data` field was not long enough.
    #[error("not enough data (need byte {0})")]
    NotEnoughData(u8),
    /// The error type `ControllerProblem` was indicated and additional
    /// information found, but not recognized.
    #[error("not a valid controller problem")]
    InvalidControllerProblem,
    /// The type of the ProtocolViolation was not valid
    #[error("not a valid violation type")]
    InvalidViolationType,
    /// A location was specified for a ProtocolViolation, but the location
    /// was not valid.
    #[error("not a valid location")]
    InvalidLocation,
    /// The supplied transceiver error was invalid.
    #[error("not a valid transceiver error")]
    InvalidTransceiverError,
}

// ===== CanError ====

/// The CAN bus error derived from an error frame.
#[derive(Error, Copy, Clone, Debug, PartialEq, Eq)]
pub enum CanError {
    /// TX timeout (by netdevice driver)
    #[error("transmission timeout")]
    TransmitTimeout,
    /// Arbitration was lost.
    /// Contains the bit number after which arbitration was lost or 0 if unspecified.
    #[error("arbitration lost after {0} bits")]
    LostArbitration(u8),
    /// Controller problem
    #[error("controller problem: {0}")]
    ControllerProblem(ControllerProblem),
    /// Protocol violation at the specified [`Location`].
    #[error("protocol violation at {location}: {vtype}")]
    ProtocolViolation {
        /// The type of protocol violation
        vtype: ViolationType,
        /// The location (field or bit) of the violation
        location: Location,
    },
    /// Transceiver Error.
    #[error("transceiver error: {0}")]
    TransceiverError(TransceiverError),
    /// No ACK received for current CAN frame.
    #[error("no ack")]
    NoAck,
    /// Bus off (due to too many detected errors)
    #[error("bus off")]
    BusOff,
    /// Bus error (due to too many detected errors)
    #[error("bus error")]
    BusError,
    /// The bus has been restarted
    #[error("restarted")]
    Restarted,
    /// Only the error counters were reported.
    #[error("error counters (tx: {tx}, rx: {rx})")]
    ErrorCounters {
        /// TX error counter
        tx: u8,
        /// RX error counter
        rx: u8,
    },
}

impl CanError {
    /// Constructs a CAN error from an error frame.
    ///
    /// When a frame reports several classes, the most specific one wins,
    /// in the order the kernel defines them (TX timeout first, error
    /// counters last).
    pub fn from_frame(frame: &CanMessage) -> Result<Self, CanErrorDecodingFailure> {
        if !frame.is_error_frame() {
            return Err(CanErrorDecodingFailure::NotAnError);
        }

        let class = frame.error_class();
        if class.contains(ErrorClass::TX_TIMEOUT) {
            Ok(CanError::TransmitTimeout)
        } else if class.contains(ErrorClass::LOST_ARBITRATION) {
            Ok(CanError::LostArbitration(get_data(frame, 0)?))
        } else if class.contains(ErrorClass::CONTROLLER) {
            Ok(CanError::ControllerProblem(ControllerProblem::try_from(
                get_data(frame, 1)?,
            )?))
        } else if class.contains(ErrorClass::PROTOCOL) {
            Ok(CanError::ProtocolViolation {
                vtype: ViolationType::try_from(get_data(frame, 2)?)?,
                location: Location::try_from(get_data(frame, 3)?)?,
            })
        } else if class.contains(ErrorClass::TRANSCEIVER) {
            Ok(CanError::TransceiverError(TransceiverError::try_from(
                get_data(frame, 4)?,
            )?))
        } else if class.contains(ErrorClass::NO_ACK) {
            Ok(CanError::NoAck)
        } else if class.contains(ErrorClass::BUS_OFF) {
            Ok(CanError::BusOff)
        } else if class.contains(ErrorClass::BUS_ERROR) {
            Ok(CanError::BusError)
        } else if class.contains(ErrorClass::RESTARTED) {
            Ok(CanError::Restarted)
        } else if class.contains(ErrorClass::COUNTERS) {
            Ok(CanError::ErrorCounters {
                tx: get_data(frame, 6)?,
                rx: get_data(frame, 7)?,
            })
        } else {
            Err(CanErrorDecodingFailure::UnknownErrorType(
                frame.error_class_bits(),
            ))
        }
    }
}

impl TryFrom<&CanMessage> for CanError {
    type Error = CanErrorDecodingFailure;

    fn try_from(frame: &CanMessage) -> Result<Self, Self::Error> {
        CanError::from_frame(frame)
    }
}

impl embedded_can::Error for CanError {
    fn kind(&self) -> embedded_can::ErrorKind {
        match *self {
            CanError::ControllerProblem(cp) => match cp {
                ControllerProblem::ReceiveBufferOverflow
                | ControllerProblem::TransmitBufferOverflow => embedded_can::ErrorKind::Overrun,
                _ => embedded_can::ErrorKind::Other,
            },
            CanError::ProtocolViolation { vtype, .. } => match vtype {
                ViolationType::SingleBitError
                | ViolationType::UnableToSendDominantBit
                | ViolationType::UnableToSendRecessiveBit => embedded_can::ErrorKind::Bit,
                ViolationType::FrameFormatError => embedded_can::ErrorKind::Form,
                ViolationType::BitStuffingError => embedded_can::ErrorKind::Stuff,
                _ => embedded_can::ErrorKind::Other,
            },
            CanError::NoAck => embedded_can::ErrorKind::Acknowledge,
            _ => embedded_can::ErrorKind::Other,
        }
    }
}

// ===== ControllerProblem =====

/// Error status of the CAN controller.
///
/// This is derived from `data[1]` of an error frame
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ControllerProblem {
    /// unspecified
    Unspecified,
    /// RX buffer overflow
    ReceiveBufferOverflow,
    /// TX buffer overflow
    TransmitBufferOverflow,
    /// reached warning level for RX errors
    ReceiveErrorWarning,
    /// reached warning level for TX errors
    TransmitErrorWarning,
    /// reached error passive status RX
    ReceiveErrorPassive,
    /// reached error passive status TX
    TransmitErrorPassive,
    /// recovered to error active state
    Active,
}

impl fmt::Display for ControllerProblem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ControllerProblem::*;
        let msg = match *self {
            Unspecified => "unspecified controller problem",
            ReceiveBufferOverflow => "receive buffer overflow",
            TransmitBufferOverflow => "transmit buffer overflow",
            ReceiveErrorWarning => "ERROR WARNING (receive)",
            TransmitErrorWarning => "ERROR WARNING (transmit)",
            ReceiveErrorPassive => "ERROR PASSIVE (receive)",
            TransmitErrorPassive => "ERROR PASSIVE (transmit)",
            Active => "ERROR ACTIVE",
        };
        write!(f, "{}", msg)
    }
}

impl TryFrom<u8> for ControllerProblem {
    type Error = CanErrorDecodingFailure;

    fn try_from(val: u8) -> Result<Self, Self::Error> {
        use ControllerProblem::*;
        Ok(match val {
            0x00 => Unspecified,
            0x01 => ReceiveBufferOverflow,
            0x02 => TransmitBufferOverflow,
            0x04 => ReceiveErrorWarning,
            0x08 => TransmitErrorWarning,
            0x10 => ReceiveErrorPassive,
            0x20 => TransmitErrorPassive,
            0x40 => Active,
            _ => return Err(CanErrorDecodingFailure::InvalidControllerProblem),
        })
    }
}

// ===== ViolationType =====

/// The type of protocol violation error.
///
/// This is derived from `data[2]` of an error frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ViolationType {
    /// Unspecified Violation
    Unspecified,
    /// Single Bit Error
    SingleBitError,
    /// Frame formatting error
    FrameFormatError,
    /// Bit stuffing error
    BitStuffingError,
    /// A dominant bit was sent, but not received
    UnableToSendDominantBit,
    /// A recessive bit was sent, but not received
    UnableToSendRecessiveBit,
    /// Bus overloaded
    BusOverload,
    /// Bus is active (again)
    Active,
    /// Transmission Error
    TransmissionError,
}

impl fmt::Display for ViolationType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ViolationType::*;
        let msg = match *self {
            Unspecified => "unspecified",
            SingleBitError => "single bit error",
            FrameFormatError => "frame format error",
            BitStuffingError => "bit stuffing error",
            UnableToSendDominantBit => "unable to send dominant bit",
            UnableToSendRecessiveBit => "unable to send recessive bit",
            BusOverload => "bus overload",
            Active => "active",
            TransmissionError => "transmission error",
        };
        write!(f, "{}", msg)
    }
}

impl TryFrom<u8> for ViolationType {
    type Error = CanErrorDecodingFailure;

    fn try_from(val: u8) -> Result<Self, Self::Error> {
        use ViolationType::*;
        Ok(match val {
            0x00 => Unspecified,
            0x01 => SingleBitError,
            0x02 => FrameFormatError,
            0x04 => BitStuffingError,
            0x08 => UnableToSendDominantBit,
            0x10 => UnableToSendRecessiveBit,
            0x20 => BusOverload,
            0x40 => Active,
            0x80 => TransmissionError,
            _ => return Err(CanErrorDecodingFailure::InvalidViolationType),
        })
    }
}

/// The location of a CANbus protocol violation.
///
/// This describes where inside a received frame (as in the field or bit)
/// at which an error occurred.
///
/// This is derived from `data[3]` of an error frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Location {
    /// Unspecified
    Unspecified,
    /// Start of frame.
    StartOfFrame,
    /// ID bits 28-21 (SFF: 10-3)
    Id2821,
    /// ID bits 20-18 (SFF: 2-0)
    Id2018,
    /// substitute RTR (SFF: RTR)
    SubstituteRtr,
    /// extension of identifier
    IdentifierExtension,
    /// ID bits 17-13
    Id1713,
    /// ID bits 12-5
    Id1205,
    /// ID bits 4-0
    Id0400,
    /// RTR bit
    Rtr,
    /// Reserved bit 1
    Reserved1,
    /// Reserved bit 0
    Reserved0,
    /// Data length
    DataLengthCode,
    /// Data section
    DataSection,
    /// CRC sequence
    CrcSequence,
    /// CRC delimiter
    CrcDelimiter,
    /// ACK slot
    AckSlot,
    /// ACK delimiter
    AckDelimiter,
    /// End-of-frame
    EndOfFrame,
    /// Intermission (between frames)
    Intermission,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Location::*;
        let msg = match *self {
            Unspecified => "unspecified location",
            StartOfFrame => "start of frame",
            Id2821 => "ID, bits 28-21",
            Id2018 => "ID, bits 20-18",
            SubstituteRtr => "substitute RTR bit",
            IdentifierExtension => "ID, extension",
            Id1713 => "ID, bits 17-13",
            Id1205 => "ID, bits 12-05",
            Id0400 => "ID, bits 04-00",
            Rtr => "RTR bit",
            Reserved1 => "reserved bit 1",
            Reserved0 => "reserved bit 0",
            DataLengthCode => "data length code",
            DataSection => "data section",
            CrcSequence => "CRC sequence",
            CrcDelimiter => "CRC delimiter",
            AckSlot => "ACK slot",
            AckDelimiter => "ACK delimiter",
            EndOfFrame => "end of frame",
            Intermission => "intermission",
        };
        write!(f, "{}", msg)
    }
}

impl TryFrom<u8> for Location {
    type Error = CanErrorDecodingFailure;

    fn try_from(val: u8) -> Result<Self, Self::Error> {
        use Location::*;
        Ok(match val {
            0x00 => Unspecified,
            0x03 => StartOfFrame,
            0x02 => Id2821,
            0x06 => Id2018,
            0x04 => SubstituteRtr,
            0x05 => IdentifierExtension,
            0x07 => Id1713,
            0x0F => Id1205,
            0x0E => Id0400,
            0x0C => Rtr,
            0x0D => Reserved1,
            0x09 => Reserved0,
            0x0B => DataLengthCode,
            0x0A => DataSection,
            0x08 => CrcSequence,
            0x18 => CrcDelimiter,
            0x19 => AckSlot,
            0x1B => AckDelimiter,
            0x1A => EndOfFrame,
            0x12 => Intermission,
            _ => return Err(CanErrorDecodingFailure::InvalidLocation),
        })
    }
}

// ===== TransceiverError =====

/// The error status of the CAN transceiver.
///
/// This is derived from `data[4]` of an error frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransceiverError {
    /// Unspecified
    Unspecified,
    /// CAN High, no wire
    CanHighNoWire,
    /// CAN High, short to BAT
    CanHighShortToBat,
    /// CAN High, short to VCC
    CanHighShortToVcc,
    /// CAN High, short to GND
    CanHighShortToGnd,
    /// CAN Low, no wire
    CanLowNoWire,
    /// CAN Low, short to BAT
    CanLowShortToBat,
    /// CAN Low, short to VCC
    CanLowShortToVcc,
    /// CAN Low, short to GND
    CanLowShortToGnd,
    /// CAN Low short to CAN High
    CanLowShortToCanHigh,
}

impl fmt::Display for TransceiverError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use TransceiverError::*;
        let msg = match *self {
            Unspecified => "unspecified",
            CanHighNoWire => "CAN high, no wire",
            CanHighShortToBat => "CAN high, short to BAT",
            CanHighShortToVcc => "CAN high, short to VCC",
            CanHighShortToGnd => "CAN high, short to GND",
            CanLowNoWire => "CAN low, no wire",
            CanLowShortToBat => "CAN low, short to BAT",
            CanLowShortToVcc => "CAN low, short to VCC",
            CanLowShortToGnd => "CAN low, short to GND",
            CanLowShortToCanHigh => "CAN low, short to CAN high",
        };
        write!(f, "{}", msg)
    }
}

impl TryFrom<u8> for TransceiverError {
    type Error = CanErrorDecodingFailure;

    fn try_from(val: u8) -> Result<Self, Self::Error> {
        use TransceiverError::*;
        Ok(match val {
            0x00 => Unspecified,
            0x04 => CanHighNoWire,
            0x05 => CanHighShortToBat,
            0x06 => CanHighShortToVcc,
            0x07 => CanHighShortToGnd,
            0x40 => CanLowNoWire,
            0x50 => CanLowShortToBat,
            0x60 => CanLowShortToVcc,
            0x70 => CanLowShortToGnd,
            0x80 => CanLowShortToCanHigh,
            _ => return Err(CanErrorDecodingFailure::InvalidTransceiverError),
        })
    }
}

// ===== ConstructionError =====

/// Error that occurs when creating CAN frames
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConstructionError {
    /// CAN ID was outside the range of valid IDs
    #[error("CAN ID too large")]
    IDTooLarge,
    /// Larger payload reported than can be held in the frame.
    #[error("Payload is too large")]
    TooMuchData,
}

// ===== InitError =====

/// Failure to open a session on an interface.
///
/// This is not recoverable for the interface name until the problem is
/// fixed outside the process (the interface is created, brought up, or
/// permissions are granted).
#[derive(Error, Debug)]
pub enum InitError {
    /// No network interface has this name.
    #[error("CAN interface '{iface}' not found: {source}")]
    InterfaceNotFound {
        /// The requested interface name
        iface: String,
        /// The lookup failure
        #[source]
        source: io::Error,
    },
    /// The interface exists but is not up.
    #[error("CAN interface '{iface}' is down")]
    InterfaceDown {
        /// The requested interface name
        iface: String,
    },
    /// The socket could not be created, bound or configured.
    #[error("unable to open a CAN socket on '{iface}': {source}")]
    Socket {
        /// The requested interface name
        iface: String,
        /// The OS error
        #[source]
        source: io::Error,
    },
    /// The initial configuration was rejected.
    #[error("unable to configure CAN interface '{iface}': {source}")]
    Config {
        /// The requested interface name
        iface: String,
        /// The rejected setting
        #[source]
        source: ConfigError,
    },
}

// ===== ConfigError =====

/// A filter or socket option was rejected.
///
/// The session is still usable and the call can be retried with a
/// corrected value.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The id of a standard filter is wider than 11 bits.
    #[error("filter id 0x{0:X} is wider than a standard 11-bit id")]
    IdTooLarge(u32),
    /// The filter mask selects id bits outside the width of the filter's
    /// frame format.
    #[error("filter mask 0x{mask:X} is wider than the id format of 0x{id:X}")]
    MaskTooWide {
        /// Filter id word
        id: u32,
        /// Filter mask word
        mask: u32,
    },
    /// The kernel refused the socket option.
    #[error("unable to set socket option {option}: {source}")]
    SocketOption {
        /// Name of the option, like "CAN_RAW_FILTER"
        option: &'static str,
        /// The OS error
        #[source]
        source: io::Error,
    },
}

// ===== ReceiveError =====

/// A failure while waiting for, or reading, frames.
///
/// Apart from [`ReceiveError::NoMessagePending`], these mean the socket is
/// no longer healthy; the session should be dropped and reopened.
#[derive(Error, Debug)]
pub enum ReceiveError {
    /// `read_message` was called with nothing to read.
    #[error("no CAN frame pending")]
    NoMessagePending,
    /// The `poll` call itself failed.
    #[error("unable to wait for CAN frames: {0}")]
    Poll(#[source] io::Error),
    /// The socket reported an error.
    #[error("CAN socket error: {0}")]
    Socket(#[source] io::Error),
    /// The kernel returned a truncated frame.
    #[error("short read from CAN socket ({0} bytes)")]
    ShortRead(usize),
}

impl ReceiveError {
    /// Whether the session should be discarded after this error.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ReceiveError::NoMessagePending)
    }
}

// ===== SendError =====

/// A frame was not written to the bus.
///
/// The session is still usable; the caller can retry or drop the frame.
#[derive(Error, Debug)]
pub enum SendError {
    /// Error frames are generated by the controller and can't be sent.
    #[error("error frames can not be sent")]
    ErrorFrame,
    /// More than 8 bytes of payload.
    #[error("payload of {0} bytes exceeds the CAN maximum of 8")]
    TooMuchData(usize),
    /// `send_data` was called but the session has no default sender id.
    #[error("no default sender id configured")]
    NoDefaultSender,
    /// The OS rejected the write (bus off, no buffer space, ...).
    #[error("CAN socket write failed: {0}")]
    Socket(#[source] io::Error),
    /// The kernel accepted only part of the frame.
    #[error("short write to CAN socket ({0} bytes)")]
    ShortWrite(usize),
    /// A frame in a queue failed; the ones before it were sent.
    #[error("sending queued frame {sent} failed: {source}")]
    Queue {
        /// Number of frames sent before the failure
        sent: usize,
        /// What went wrong with the failing frame
        #[source]
        source: Box<SendError>,
    },
}

impl SendError {
    /// Whether the OS reported a transient condition, like a full
    /// transmit queue, so that the same frame may be sent again later.
    pub fn should_retry(&self) -> bool {
        match self {
            SendError::Socket(err) => {
                err.kind() == io::ErrorKind::WouldBlock
                    || err.raw_os_error() == Some(libc::ENOBUFS)
            }
            SendError::Queue { source, .. } => source.should_retry(),
            _ => false,
        }
    }
}

/////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn error_frame(class: u32, data: &[u8]) -> CanMessage {
        CanMessage::new_error(class, data).unwrap()
    }

    #[test]
    fn test_decode_simple_classes() {
        let err = CanError::from_frame(&error_frame(ErrorClass::NO_ACK.bits(), &[])).unwrap();
        assert_eq!(CanError::NoAck, err);

        let err = CanError::from_frame(&error_frame(ErrorClass::BUS_OFF.bits(), &[])).unwrap();
        assert_eq!(CanError::BusOff, err);

        let err = CanError::from_frame(&error_frame(ErrorClass::LOST_ARBITRATION.bits(), &[5])).unwrap();
        assert_eq!(CanError::LostArbitration(5), err);
    }

    #[test]
    fn test_decode_with_details() {
        let frame = error_frame(ErrorClass::CONTROLLER.bits() | ErrorClass::COUNTERS.bits(), &[0, 0x10, 0, 0, 0, 0, 3, 130]);
        let err = CanError::from_frame(&frame).unwrap();
        assert_eq!(
            CanError::ControllerProblem(ControllerProblem::ReceiveErrorPassive),
            err
        );

        let frame = error_frame(ErrorClass::COUNTERS.bits(), &[0, 0, 0, 0, 0, 0, 3, 130]);
        let err = CanError::from_frame(&frame).unwrap();
        assert_eq!(CanError::ErrorCounters { tx: 3, rx: 130 }, err);

        let frame = error_frame(ErrorClass::PROTOCOL.bits(), &[0, 0, 0x04, 0x0E]);
        let err = CanError::from_frame(&frame).unwrap();
        assert_eq!(
            CanError::ProtocolViolation {
                vtype: ViolationType::BitStuffingError,
                location: Location::Id0400,
            },
            err
        );
        assert_eq!(embedded_can::ErrorKind::Stuff, embedded_can::Error::kind(&err));
    }

    #[test]
    fn test_decode_failures() {
        let frame = CanMessage::from_raw_id(0x100, &[1, 2]).unwrap();
        assert_eq!(
            Err(CanErrorDecodingFailure::NotAnError),
            CanError::from_frame(&frame)
        );

        let frame = error_frame(ErrorClass::CONTROLLER.bits(), &[0, 0x03]);
        assert_eq!(
            Err(CanErrorDecodingFailure::InvalidControllerProblem),
            CanError::from_frame(&frame)
        );

        let frame = error_frame(0x400, &[]);
        assert_eq!(
            Err(CanErrorDecodingFailure::UnknownErrorType(0x400)),
            CanError::from_frame(&frame)
        );
    }

    #[test]
    fn test_config_error_display() {
        assert_eq!(
            "filter id 0x800 is wider than a standard 11-bit id",
            ConfigError::IdTooLarge(0x800).to_string()
        );
    }

    #[test]
    fn test_receive_error_fatality() {
        assert!(!ReceiveError::NoMessagePending.is_fatal());
        assert!(ReceiveError::ShortRead(3).is_fatal());
    }

    #[test]
    fn test_send_error_retry() {
        let err = SendError::Socket(io::Error::from_raw_os_error(libc::ENOBUFS));
        assert!(err.should_retry());

        let err = SendError::Queue {
            sent: 2,
            source: Box::new(err),
        };
        assert!(err.should_retry());

        assert!(!SendError::ErrorFrame.should_retry());
    }
}
