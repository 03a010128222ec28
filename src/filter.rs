// candriver/src/filter.rs
//
// Kernel receive filters for a CAN session.
//
// This file is part of the Rust 'candriver' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Receive filters.
//!
//! A filter is an (id, mask) pair. A received frame passes the filter if
//!
//! ```text
//! received_id & mask == filter_id & mask
//! ```
//!
//! where the ids are the composite SocketCAN ID words, so a mask can also
//! select on the `EFF` and `RTR` flag bits. A filter whose id carries
//! `CAN_INV_FILTER` passes exactly the frames the plain filter would drop.
//!
//! A socket can be given multiple filters; a frame is delivered if it
//! passes any of them (or all of them, after
//! [`Session::set_join_filters`](crate::Session::set_join_filters)).
//! Error frames bypass the filters altogether. They are selected by the
//! separate error mask.
//!
//! See the
//! [kernel docs](https://docs.kernel.org/networking/can.html#raw-protocol-sockets-with-can-filters-sock-raw).

use crate::{
    id::{CAN_EFF_FLAG, CAN_EFF_MASK, CAN_INV_FILTER, CAN_SFF_MASK},
    CanMessage, ConfigError,
};
use libc::canid_t;
use std::{convert::TryFrom, fmt, slice};

// ===== CanFilter =====

/// A single (id, mask) rule.
#[derive(Copy, Clone, Hash, PartialEq, Eq)]
pub struct CanFilter {
    id: canid_t,
    mask: canid_t,
}

impl CanFilter {
    /// Construct a new CAN filter.
    ///
    /// This does no validation. Use [`FilterSet::add`] to check that the
    /// filter makes sense for its id format.
    pub fn new(id: canid_t, mask: canid_t) -> Self {
        Self { id, mask }
    }

    /// Construct a new inverted CAN filter.
    pub fn new_inverted(id: canid_t, mask: canid_t) -> Self {
        Self::new(id | CAN_INV_FILTER, mask)
    }

    /// The filter id word, without the inversion flag
    pub fn id(&self) -> canid_t {
        self.id & !CAN_INV_FILTER
    }

    /// The filter mask word
    pub fn mask(&self) -> canid_t {
        self.mask
    }

    /// Whether the filter passes the frames that don't match.
    pub fn is_inverted(&self) -> bool {
        self.id & CAN_INV_FILTER != 0
    }

    /// Whether the filter id is in the 29-bit extended format
    pub fn is_extended(&self) -> bool {
        self.id & CAN_EFF_FLAG != 0
    }

    /// Checks the id and mask against the width of the filter's id format.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.is_extended() {
            // All 29 bits are usable; the flag bits can't be out of range.
            return Ok(());
        }
        if self.id() & CAN_EFF_MASK > CAN_SFF_MASK {
            return Err(ConfigError::IdTooLarge(self.id()));
        }
        if self.mask & CAN_EFF_MASK > CAN_SFF_MASK {
            return Err(ConfigError::MaskTooWide {
                id: self.id(),
                mask: self.mask,
            });
        }
        Ok(())
    }

    /// Whether the kernel would deliver the frame under this filter.
    ///
    /// Error frames never match; they are selected by the error mask.
    pub fn matches(&self, frame: &CanMessage) -> bool {
        if frame.is_error_frame() {
            return false;
        }
        let hit = frame.id_word() & self.mask == self.id() & self.mask;
        hit != self.is_inverted()
    }
}

impl fmt::Debug for CanFilter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "CanFilter({:#X}, {:#X}", self.id(), self.mask)?;
        if self.is_inverted() {
            write!(f, ", inverted")?;
        }
        write!(f, ")")
    }
}

impl From<(u32, u32)> for CanFilter {
    fn from(filt: (u32, u32)) -> Self {
        CanFilter::new(filt.0, filt.1)
    }
}

impl From<CanFilter> for libc::can_filter {
    fn from(filt: CanFilter) -> Self {
        libc::can_filter {
            can_id: filt.id,
            can_mask: filt.mask,
        }
    }
}

// ===== FilterSet =====

/// An ordered set of receive filters, installed in one go with
/// [`Session::set_can_filters`](crate::Session::set_can_filters).
///
/// An empty set accepts every frame. Duplicates are kept.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FilterSet {
    filters: Vec<CanFilter>,
}

impl FilterSet {
    /// Creates an empty set, which accepts all frames.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an (id, mask) filter, after validating it.
    ///
    /// A filter is in the standard format unless its id carries
    /// `CAN_EFF_FLAG`. For a standard filter the identifier bits of both
    /// the id and the mask have to fit in 11 bits.
    pub fn add(&mut self, id: canid_t, mask: canid_t) -> Result<&mut Self, ConfigError> {
        self.add_filter(CanFilter::new(id, mask))
    }

    /// Adds an inverted (id, mask) filter, after validating it.
    pub fn add_inverted(&mut self, id: canid_t, mask: canid_t) -> Result<&mut Self, ConfigError> {
        self.add_filter(CanFilter::new_inverted(id, mask))
    }

    /// Adds a filter, after validating it.
    pub fn add_filter(&mut self, filter: CanFilter) -> Result<&mut Self, ConfigError> {
        filter.validate()?;
        self.filters.push(filter);
        Ok(self)
    }

    /// Iterates the filters in the order they were added.
    pub fn iter(&self) -> slice::Iter<'_, CanFilter> {
        self.filters.iter()
    }

    /// The number of filters
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Whether no filter was added, meaning all frames are accepted.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Whether the kernel would deliver the frame under these filters,
    /// when any single filter is enough.
    pub fn matches(&self, frame: &CanMessage) -> bool {
        if frame.is_error_frame() {
            return false;
        }
        self.is_empty() || self.filters.iter().any(|f| f.matches(frame))
    }

    /// Whether the kernel would deliver the frame under these filters,
    /// when all of them must pass.
    pub fn matches_all(&self, frame: &CanMessage) -> bool {
        if frame.is_error_frame() {
            return false;
        }
        self.filters.iter().all(|f| f.matches(frame))
    }

    /// The filters as given to `CAN_RAW_FILTER`.
    ///
    /// An empty set is installed as the single accept-all rule `(0, 0)`.
    pub(crate) fn to_kernel(&self) -> Vec<libc::can_filter> {
        if self.is_empty() {
            vec![CanFilter::new(0, 0).into()]
        } else {
            self.filters.iter().map(|&f| f.into()).collect()
        }
    }
}

impl<'a> IntoIterator for &'a FilterSet {
    type Item = &'a CanFilter;
    type IntoIter = slice::Iter<'a, CanFilter>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl TryFrom<&[(u32, u32)]> for FilterSet {
    type Error = ConfigError;

    fn try_from(pairs: &[(u32, u32)]) -> Result<Self, Self::Error> {
        let mut set = FilterSet::new();
        for &(id, mask) in pairs {
            set.add(id, mask)?;
        }
        Ok(set)
    }
}

/////////////////////////////////////////////////////////////////////////////
