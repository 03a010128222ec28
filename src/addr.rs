// candriver/src/addr.rs
//
// The socket address of a CAN interface.
//
// This file is part of the Rust 'candriver' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! The address a session binds its socket to.

use libc::{sa_family_t, sockaddr_can, sockaddr_storage, socklen_t, AF_CAN};
use nix::net::if_::if_nametoindex;
use socket2::SockAddr;
use std::{fmt, io, mem, os::raw::c_int};

/// The `sockaddr_can` of one CAN network interface.
///
/// A `CAN_RAW` socket only needs the family and the interface index; the
/// transport fields of the address stay zeroed.
#[derive(Clone, Copy)]
pub struct CanAddr(sockaddr_can);

impl CanAddr {
    /// The address of the interface with the given index.
    pub fn new(ifindex: u32) -> Self {
        let mut addr: sockaddr_can = unsafe { mem::zeroed() };
        addr.can_family = AF_CAN as sa_family_t;
        addr.can_ifindex = ifindex as c_int;
        Self(addr)
    }

    /// Looks up an interface, like "can0" or "vcan0", by name.
    ///
    /// The error is the one from `if_nametoindex(3)`, usually `ENODEV`.
    pub fn from_iface(iface: &str) -> io::Result<Self> {
        Ok(Self::new(if_nametoindex(iface)?))
    }

    /// The interface index
    pub fn ifindex(&self) -> u32 {
        self.0.can_ifindex as u32
    }

    /// Copies the address into the generic storage `bind(2)` takes.
    pub(crate) fn to_storage(self) -> (sockaddr_storage, socklen_t) {
        let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
        // sockaddr_storage is large and aligned enough for any address
        unsafe {
            (&mut storage as *mut sockaddr_storage)
                .cast::<sockaddr_can>()
                .write(self.0);
        }
        (storage, mem::size_of::<sockaddr_can>() as socklen_t)
    }
}

impl fmt::Debug for CanAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CanAddr")
            .field("ifindex", &self.ifindex())
            .finish()
    }
}

impl From<CanAddr> for SockAddr {
    fn from(addr: CanAddr) -> Self {
        let (storage, len) = addr.to_storage();
        unsafe { SockAddr::new(storage, len) }
    }
}

/////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ifindex() {
        assert_eq!(42, CanAddr::new(42).ifindex());
        assert_eq!("CanAddr { ifindex: 7 }", format!("{:?}", CanAddr::new(7)));
    }

    #[test]
    fn test_sock_addr() {
        let (storage, len) = CanAddr::new(42).to_storage();
        assert_eq!(mem::size_of::<sockaddr_can>() as socklen_t, len);
        assert_eq!(AF_CAN as sa_family_t, storage.ss_family);

        let sock_addr = SockAddr::from(CanAddr::new(42));
        assert_eq!(AF_CAN as sa_family_t, sock_addr.family());
        assert_eq!(len, sock_addr.len());
    }

    #[test]
    fn test_unknown_iface() {
        assert!(CanAddr::from_iface("nocan-iface9").is_err());
    }
}
