// candriver/src/socket.rs
//
// The raw CAN socket underneath a session.
//
// This file is part of the Rust 'candriver' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Raw SocketCAN socket.
//!
//! This is the thin layer over the OS calls: opening and binding the
//! `CAN_RAW` socket, the socket options, `poll(2)`, `recvmsg(2)` with the
//! kernel receive timestamp, and `write(2)`. All the policy (telemetry,
//! timestamp normalization, validation) lives in the session.

use crate::{
    as_bytes,
    frame::can_frame_default,
    timestamp::system_time_from_timespec,
    CanAddr, ConfigError, ReceiveError, SendError,
};
use libc::{can_frame, socklen_t, timespec, AF_CAN};
use nix::{
    errno::Errno,
    poll::{poll, PollFd, PollFlags, PollTimeout},
};
use socket2::SockAddr;
use std::{
    io,
    mem::{self, size_of},
    os::{
        raw::{c_int, c_void},
        unix::io::{AsFd, AsRawFd, BorrowedFd, RawFd},
    },
    ptr,
    time::{Duration, SystemTime},
};

pub use libc::{
    CAN_MTU, CAN_RAW, CAN_RAW_ERR_FILTER, CAN_RAW_FILTER, CAN_RAW_JOIN_FILTERS,
    CAN_RAW_RECV_OWN_MSGS, SOL_CAN_RAW,
};

// ===== Private local helper functions =====

/// Tries to open the CAN socket by the interface number.
fn raw_open_socket(addr: &CanAddr) -> io::Result<socket2::Socket> {
    let af_can = socket2::Domain::from(AF_CAN);
    let can_raw = socket2::Protocol::from(CAN_RAW);

    let sock = socket2::Socket::new_raw(af_can, socket2::Type::RAW, Some(can_raw))?;
    sock.bind(&SockAddr::from(*addr))?;
    Ok(sock)
}

/// Finds the `SCM_TIMESTAMPNS` control message of a received message.
///
/// # Safety
/// The header must come from a successful `recvmsg` call, with its control
/// buffer still alive.
unsafe fn kernel_timestamp(hdr: &libc::msghdr) -> Option<SystemTime> {
    let mut cmsg = libc::CMSG_FIRSTHDR(hdr);
    while !cmsg.is_null() {
        let c = &*cmsg;
        if c.cmsg_level == libc::SOL_SOCKET && c.cmsg_type == libc::SCM_TIMESTAMPNS {
            let ts = ptr::read_unaligned(libc::CMSG_DATA(cmsg) as *const timespec);
            return Some(system_time_from_timespec(ts));
        }
        cmsg = libc::CMSG_NXTHDR(hdr, cmsg);
    }
    None
}

/// Converts a wait time into a `poll` timeout.
///
/// Anything under a millisecond, other than zero, is rounded up so that a
/// short wait doesn't turn into a single non-waiting poll.
fn poll_timeout(timeout: Duration) -> PollTimeout {
    let mut ms = timeout.as_millis();
    if ms == 0 && !timeout.is_zero() {
        ms = 1;
    }
    let ms = ms.min(i32::MAX as u128) as i32;
    PollTimeout::try_from(ms).unwrap_or(PollTimeout::MAX)
}

// ===== RecvFrame =====

/// A frame as it came off the socket.
#[derive(Clone, Copy)]
pub struct RecvFrame {
    /// The raw frame
    pub frame: can_frame,
    /// The kernel receive time, if the kernel supplied one.
    pub captured: Option<SystemTime>,
    /// Whether this is our own frame, echoed back (`MSG_CONFIRM`).
    pub own: bool,
}

// ===== RawCanSocket =====

/// An open, bound `CAN_RAW` socket.
///
/// The socket is closed when this is dropped.
#[derive(Debug)]
pub struct RawCanSocket(socket2::Socket);

impl RawCanSocket {
    /// Opens a raw socket, binds it to the interface address, switches it
    /// to non-blocking mode and turns on nanosecond receive timestamps.
    pub fn open(addr: &CanAddr) -> io::Result<Self> {
        let sock = Self(raw_open_socket(addr)?);
        sock.0.set_nonblocking(true)?;
        sock.set_socket_option(libc::SOL_SOCKET, libc::SO_TIMESTAMPNS, &c_int::from(true))?;
        Ok(sock)
    }

    /// `setsockopt` wrapper
    ///
    /// Note that the `val` parameter must be specified correctly; if an option
    /// expects an integer, it is advisable to pass in a `c_int`, not the default
    /// of `i32`.
    fn set_socket_option<T>(&self, level: c_int, name: c_int, val: &T) -> io::Result<()> {
        let ret = unsafe {
            libc::setsockopt(
                self.as_raw_fd(),
                level,
                name,
                val as *const _ as *const c_void,
                size_of::<T>() as socklen_t,
            )
        };

        match ret {
            0 => Ok(()),
            _ => Err(io::Error::last_os_error()),
        }
    }

    /// Sets a collection of multiple socket options with one call.
    fn set_socket_option_mult<T>(&self, level: c_int, name: c_int, values: &[T]) -> io::Result<()> {
        let ret = if values.is_empty() {
            // can't pass in a ptr to a 0-len slice, pass a null ptr instead
            unsafe { libc::setsockopt(self.as_raw_fd(), level, name, ptr::null(), 0) }
        } else {
            unsafe {
                libc::setsockopt(
                    self.as_raw_fd(),
                    level,
                    name,
                    values.as_ptr().cast(),
                    mem::size_of_val(values) as socklen_t,
                )
            }
        };

        match ret {
            0 => Ok(()),
            _ => Err(io::Error::last_os_error()),
        }
    }

    /// Sets an integer `SOL_CAN_RAW` option, naming it in the error.
    fn set_raw_option(&self, name: c_int, option: &'static str, val: c_int) -> Result<(), ConfigError> {
        self.set_socket_option(SOL_CAN_RAW, name, &val)
            .map_err(|source| ConfigError::SocketOption { option, source })
    }

    /// Replaces the CAN ID filters on the socket, in a single call.
    ///
    /// An empty slice makes the socket drop every data frame.
    pub fn set_filters(&self, filters: &[libc::can_filter]) -> Result<(), ConfigError> {
        self.set_socket_option_mult(SOL_CAN_RAW, CAN_RAW_FILTER, filters)
            .map_err(|source| ConfigError::SocketOption {
                option: "CAN_RAW_FILTER",
                source,
            })
    }

    /// Sets the error mask on the socket.
    ///
    /// By default (`ERR_MASK_NONE`) no error conditions are reported as
    /// special error frames by the socket. Enabling error conditions by
    /// setting `ERR_MASK_ALL` or another non-empty error mask causes the
    /// socket to receive notification about the specified conditions.
    pub fn set_error_mask(&self, mask: u32) -> Result<(), ConfigError> {
        self.set_socket_option(SOL_CAN_RAW, CAN_RAW_ERR_FILTER, &mask)
            .map_err(|source| ConfigError::SocketOption {
                option: "CAN_RAW_ERR_FILTER",
                source,
            })
    }

    /// Enable or disable receiving of own frames.
    ///
    /// When loopback is enabled, this settings controls if CAN frames sent
    /// are received back immediately by sender. Default is off.
    pub fn set_recv_own_msgs(&self, enabled: bool) -> Result<(), ConfigError> {
        self.set_raw_option(CAN_RAW_RECV_OWN_MSGS, "CAN_RAW_RECV_OWN_MSGS", c_int::from(enabled))
    }

    /// Enable or disable join filters.
    ///
    /// By default a frame is accepted if it matches any of the filters set
    /// with `set_filters`. If join filters is enabled, a frame has to match
    /// _all_ filters to be accepted.
    pub fn set_join_filters(&self, enabled: bool) -> Result<(), ConfigError> {
        self.set_raw_option(CAN_RAW_JOIN_FILTERS, "CAN_RAW_JOIN_FILTERS", c_int::from(enabled))
    }

    /// Waits up to `timeout` for the socket to become readable.
    ///
    /// A zero timeout polls once without waiting. An interrupted wait
    /// reports "not readable". If the socket signals an error or hangup
    /// with nothing to read, the pending socket error is returned.
    pub fn poll_readable(&self, timeout: Duration) -> Result<bool, ReceiveError> {
        let mut fds = [PollFd::new(self.as_fd(), PollFlags::POLLIN)];
        match poll(&mut fds, poll_timeout(timeout)) {
            Ok(0) => return Ok(false),
            Ok(_) => (),
            Err(Errno::EINTR) => return Ok(false),
            Err(err) => return Err(ReceiveError::Poll(err.into())),
        }

        let revents = fds[0].revents().unwrap_or(PollFlags::empty());
        if revents.contains(PollFlags::POLLIN) {
            return Ok(true);
        }
        if revents.intersects(PollFlags::POLLERR | PollFlags::POLLHUP | PollFlags::POLLNVAL) {
            let err = match self.0.take_error() {
                Ok(Some(err)) => err,
                Ok(None) => io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    format!("CAN socket signalled {:?}", revents),
                ),
                Err(err) => err,
            };
            return Err(ReceiveError::Socket(err));
        }
        Ok(false)
    }

    /// Reads one pending frame with `recvmsg(2)`.
    ///
    /// This never blocks: with nothing to read it fails with
    /// [`ReceiveError::NoMessagePending`].
    pub fn recv_frame(&self) -> Result<RecvFrame, ReceiveError> {
        let mut frame = can_frame_default();
        let mut iov = libc::iovec {
            iov_base: &mut frame as *mut can_frame as *mut c_void,
            iov_len: size_of::<can_frame>(),
        };

        // Room for a cmsghdr and a timespec, suitably aligned.
        let mut control = [0u64; 8];

        let mut hdr: libc::msghdr = unsafe { mem::zeroed() };
        hdr.msg_iov = &mut iov;
        hdr.msg_iovlen = 1;
        hdr.msg_control = control.as_mut_ptr().cast();
        hdr.msg_controllen = mem::size_of_val(&control) as _;

        let n = unsafe { libc::recvmsg(self.as_raw_fd(), &mut hdr, 0) };
        if n < 0 {
            let err = io::Error::last_os_error();
            return Err(match err.kind() {
                io::ErrorKind::WouldBlock => ReceiveError::NoMessagePending,
                _ => ReceiveError::Socket(err),
            });
        }

        let n = n as usize;
        if n != CAN_MTU {
            return Err(ReceiveError::ShortRead(n));
        }

        let captured = unsafe { kernel_timestamp(&hdr) };
        Ok(RecvFrame {
            frame,
            captured,
            own: hdr.msg_flags & libc::MSG_CONFIRM != 0,
        })
    }

    /// Writes one frame.
    pub fn write_frame(&self, frame: &can_frame) -> Result<(), SendError> {
        match self.0.send(as_bytes(frame)) {
            Ok(CAN_MTU) => Ok(()),
            Ok(n) => Err(SendError::ShortWrite(n)),
            Err(err) => Err(SendError::Socket(err)),
        }
    }
}

impl AsRawFd for RawCanSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.0.as_raw_fd()
    }
}

impl AsFd for RawCanSocket {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.as_fd()
    }
}

/////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_timeout() {
        assert_eq!(PollTimeout::ZERO, poll_timeout(Duration::ZERO));
        assert_eq!(
            PollTimeout::try_from(1i32).unwrap(),
            poll_timeout(Duration::from_micros(10))
        );
        assert_eq!(
            PollTimeout::try_from(250i32).unwrap(),
            poll_timeout(Duration::from_millis(250))
        );
        assert_eq!(PollTimeout::MAX, poll_timeout(Duration::from_secs(u64::MAX)));
    }

    #[test]
    fn test_frame_size() {
        assert_eq!(CAN_MTU, size_of::<can_frame>());
    }
}
