// candriver/src/lib.rs
//
// The main lib file for the Rust 'candriver' library.
//
// This file is part of the Rust 'candriver' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! CAN bus sessions over Linux SocketCAN.
//!
//! A [`Session`] owns a raw `CAN_RAW` socket bound to one network
//! interface. It installs kernel receive filters, turns on the delivery of
//! error frames and the echo of its own frames, collects telemetry, and
//! normalizes the kernel receive timestamps into offsets from the session
//! start or from the previous frame.
//!
//! The frames are [`CanMessage`] values: data, remote or error frames of
//! classic CAN 2.0, with 11-bit or 29-bit identifiers. Error frames come
//! back from a normal read; decode them with [`CanMessage::error`].
//!
//! To test on a virtual interface:
//!
//! ```text
//! $ sudo modprobe vcan
//! $ sudo ip link add dev vcan0 type vcan
//! $ sudo ip link set up vcan0
//! ```
//!
//! The session also implements the [embedded-can](https://crates.io/crates/embedded-can)
//! `nb::Can` and `blocking::Can` traits.

use std::{mem::size_of, slice};
use thiserror::Error;

pub mod id;
pub use id::{IdFlags, ERR_MASK_ALL, ERR_MASK_NONE};

pub mod errors;
pub use errors::{
    CanError, CanErrorDecodingFailure, ConfigError, ConstructionError, ErrorClass, InitError,
    ReceiveError, SendError,
};

pub mod frame;
pub use frame::{CanMessage, FrameKind};

pub mod filter;
pub use filter::{CanFilter, FilterSet};

pub mod addr;
pub use addr::CanAddr;

pub mod socket;

pub mod timestamp;
pub use timestamp::TimestampMode;

pub mod telemetry;
pub use telemetry::TelemetrySnapshot;

pub mod session;
pub use session::{Session, SessionConfig};

pub use embedded_can::{self, ExtendedId, Frame as EmbeddedFrame, Id, StandardId};

/// Any error from this library.
#[derive(Error, Debug)]
pub enum Error {
    /// A session could not be opened
    #[error(transparent)]
    Init(#[from] InitError),
    /// A configuration change was rejected
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Waiting for, or reading, a frame failed
    #[error(transparent)]
    Receive(#[from] ReceiveError),
    /// A frame was not sent
    #[error(transparent)]
    Send(#[from] SendError),
    /// A frame could not be built
    #[error(transparent)]
    Construction(#[from] ConstructionError),
}

impl embedded_can::Error for Error {
    fn kind(&self) -> embedded_can::ErrorKind {
        embedded_can::ErrorKind::Other
    }
}

/// A result that can derive from any of the library errors.
pub type Result<T> = std::result::Result<T, Error>;

// ===== Helper functions =====

/// Gets a byte slice for any sized variable.
///
/// Note that this should normally be unsafe, but since we're only
/// using it internally for types defined in libc, we can get away
/// with it.
pub(crate) fn as_bytes<T: Sized>(val: &T) -> &[u8] {
    let sz = size_of::<T>();
    unsafe { slice::from_raw_parts::<'_, u8>(val as *const _ as *const u8, sz) }
}
