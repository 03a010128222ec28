// candriver/src/id.rs
//
// CANbus identifiers and the SocketCAN ID word.
//
// This file is part of the Rust 'candriver' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Standard and extended identifiers, and the composite SocketCAN ID word.
//!
//! The kernel packs a frame's identifier and its format flags into a single
//! 32-bit word (`canid_t`):
//!
//! ```text
//! bit 31     EFF - 29-bit extended frame format
//! bit 30     RTR - remote transmission request
//! bit 29     ERR - error frame
//! bits 0-28  identifier (11 bits used for standard frames)
//! ```

use bitflags::bitflags;
use embedded_can::{ExtendedId, Id, StandardId};
use libc::canid_t;

pub use libc::{
    CAN_EFF_FLAG, CAN_EFF_MASK, CAN_ERR_FLAG, CAN_ERR_MASK, CAN_INV_FILTER, CAN_MAX_DLEN,
    CAN_RTR_FLAG, CAN_SFF_MASK,
};

/// An error mask that will cause SocketCAN to report all errors
pub const ERR_MASK_ALL: u32 = CAN_ERR_MASK;

/// An error mask that will cause SocketCAN to silently drop all errors
pub const ERR_MASK_NONE: u32 = 0;

bitflags! {
    /// Bit flags in the composite SocketCAN ID word.
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct IdFlags: canid_t {
        /// Indicates frame uses a 29-bit extended ID
        const EFF = CAN_EFF_FLAG;
        /// Indicates a remote request frame.
        const RTR = CAN_RTR_FLAG;
        /// Indicates an error frame.
        const ERR = CAN_ERR_FLAG;
    }
}

/// Gets the canid_t value from an Id
/// If it's an extended ID, the CAN_EFF_FLAG bit is also set.
pub fn id_to_canid_t(id: impl Into<Id>) -> canid_t {
    use Id::*;
    match id.into() {
        Standard(id) => id.as_raw() as canid_t,
        Extended(id) => id.as_raw() | CAN_EFF_FLAG,
    }
}

/// Creates a CAN ID from a raw integer value.
///
/// If the `id` is <= 0x7FF, it's assumed to be a standard ID, otherwise
/// it is created as an Extended ID. If you require an Extended ID <= 0x7FF,
/// create it explicitly.
pub fn id_from_raw(id: u32) -> Option<Id> {
    let id = match id {
        n if n <= CAN_SFF_MASK => StandardId::new(n as u16)?.into(),
        n => ExtendedId::new(n)?.into(),
    };
    Some(id)
}

/// Extracts the identifier from a composite ID word.
///
/// The EFF flag selects the format, and the bits outside the format's
/// width are masked off, so this can not fail.
pub fn id_from_word(word: canid_t) -> Id {
    if word & CAN_EFF_FLAG != 0 {
        Id::Extended(ExtendedId::new(word & CAN_EFF_MASK).unwrap_or(ExtendedId::ZERO))
    } else {
        Id::Standard(StandardId::new((word & CAN_SFF_MASK) as u16).unwrap_or(StandardId::ZERO))
    }
}

/////////////////////////////////////////////////////////////////////////////
