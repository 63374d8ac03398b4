//! Raw syscall wrappers.
//!
//! Every wrapper is non-blocking-aware: when the handle has blocking
//! mode disabled, a would-block outcome surfaces as
//! [`SocketError::Busy`] instead of blocking. All errno values pass
//! through the one `map_errno` table so callers see consistent kinds.

use std::io::{IoSlice, IoSliceMut};
use std::os::fd::{FromRawFd, OwnedFd, RawFd};

use crate::addr::ToSockAddr;
use crate::error::{errno, map_errno, SocketError};

/// Creates a stream socket handle for the given address family.
///
/// The handle is created with `SOCK_CLOEXEC` and is blocking until
/// [`set_blocking_mode`] says otherwise.
pub(crate) fn create_socket(family: libc::c_int) -> Result<OwnedFd, SocketError> {
	let fd = unsafe { libc::socket(family, libc::SOCK_STREAM | libc::SOCK_CLOEXEC, 0) };
	if fd == -1 {
		return Err(map_errno(errno()));
	}
	Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

pub(crate) fn bind_fd<A: ToSockAddr>(fd: RawFd, addr: &A) -> Result<(), SocketError> {
	let result = addr.with_raw(|ptr, len| unsafe { libc::bind(fd, ptr, len) });
	match result {
		Some(-1) => Err(map_errno(errno())),
		Some(_) => Ok(()),
		None => Err(SocketError::AddressError),
	}
}

pub(crate) fn listen_fd(fd: RawFd, backlog: libc::c_int) -> Result<(), SocketError> {
	if unsafe { libc::listen(fd, backlog) } == -1 {
		return Err(map_errno(errno()));
	}
	Ok(())
}

/// Issues the OS connect. A would-block outcome (`EINPROGRESS` on a
/// non-blocking handle) comes back as `Busy`; the caller decides whether
/// that arms an asynchronous wait or a polling state.
pub(crate) fn connect_fd<A: ToSockAddr>(fd: RawFd, addr: &A) -> Result<(), SocketError> {
	let result = addr.with_raw(|ptr, len| unsafe { libc::connect(fd, ptr, len) });
	match result {
		Some(-1) => Err(map_errno(errno())),
		Some(_) => Ok(()),
		None => Err(SocketError::AddressError),
	}
}

/// Accepts one pending connection, returning the new handle and the raw
/// peer address storage for the caller to decode.
pub(crate) fn accept_fd(
	fd: RawFd,
) -> Result<(OwnedFd, libc::sockaddr_storage, libc::socklen_t), SocketError> {
	let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
	let mut len = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;

	let accepted = unsafe {
		libc::accept4(
			fd,
			&mut storage as *mut _ as *mut libc::sockaddr,
			&mut len,
			libc::SOCK_CLOEXEC,
		)
	};
	if accepted == -1 {
		return Err(map_errno(errno()));
	}
	Ok((unsafe { OwnedFd::from_raw_fd(accepted) }, storage, len))
}

/// Scatter/gather stream send. Uses `sendmsg` with `MSG_NOSIGNAL` so a
/// separated peer reports `EPIPE` instead of raising SIGPIPE.
pub(crate) fn send_vectored(fd: RawFd, bufs: &[IoSlice<'_>]) -> Result<usize, SocketError> {
	let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
	msg.msg_iov = bufs.as_ptr() as *mut libc::iovec;
	msg.msg_iovlen = bufs.len() as _;

	let n = unsafe { libc::sendmsg(fd, &msg, libc::MSG_NOSIGNAL) };
	if n == -1 {
		return Err(map_errno(errno()));
	}
	Ok(n as usize)
}

/// Scatter/gather stream receive. `Ok(0)` on a non-empty buffer list
/// means the peer performed an orderly shutdown.
pub(crate) fn receive_vectored(
	fd: RawFd,
	bufs: &mut [IoSliceMut<'_>],
) -> Result<usize, SocketError> {
	let n = unsafe {
		libc::readv(
			fd,
			bufs.as_ptr() as *const libc::iovec,
			bufs.len() as libc::c_int,
		)
	};
	if n == -1 {
		return Err(map_errno(errno()));
	}
	Ok(n as usize)
}

/// Sets or clears `O_NONBLOCK` on the handle.
pub(crate) fn set_blocking_mode(fd: RawFd, blocking: bool) -> Result<(), SocketError> {
	let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
	if flags == -1 {
		return Err(map_errno(errno()));
	}
	let new_flags = if blocking {
		flags & !libc::O_NONBLOCK
	} else {
		flags | libc::O_NONBLOCK
	};
	if unsafe { libc::fcntl(fd, libc::F_SETFL, new_flags) } == -1 {
		return Err(map_errno(errno()));
	}
	Ok(())
}

/// Reads and clears the pending socket error (`SO_ERROR`).
///
/// Returns the raw errno value; 0 means no error. Used to disambiguate
/// "still connecting" from a terminal connect outcome.
pub(crate) fn socket_error(fd: RawFd) -> Result<i32, SocketError> {
	let mut error: libc::c_int = 0;
	let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
	let result = unsafe {
		libc::getsockopt(
			fd,
			libc::SOL_SOCKET,
			libc::SO_ERROR,
			&mut error as *mut _ as *mut libc::c_void,
			&mut len,
		)
	};
	if result == -1 {
		return Err(map_errno(errno()));
	}
	Ok(error)
}

/// Reads the peer address via `getpeername`.
pub(crate) fn peer_name(
	fd: RawFd,
) -> Result<(libc::sockaddr_storage, libc::socklen_t), SocketError> {
	let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
	let mut len = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
	let result = unsafe {
		libc::getpeername(
			fd,
			&mut storage as *mut _ as *mut libc::sockaddr,
			&mut len,
		)
	};
	if result == -1 {
		return Err(map_errno(errno()));
	}
	Ok((storage, len))
}

/// Raw setsockopt with a caller-provided value buffer.
pub(crate) fn set_option_raw(
	fd: RawFd,
	level: libc::c_int,
	name: libc::c_int,
	value: *const libc::c_void,
	len: libc::socklen_t,
) -> Result<(), SocketError> {
	if unsafe { libc::setsockopt(fd, level, name, value, len) } == -1 {
		return Err(map_errno(errno()));
	}
	Ok(())
}

/// Raw getsockopt into a caller-provided value buffer.
pub(crate) fn get_option_raw(
	fd: RawFd,
	level: libc::c_int,
	name: libc::c_int,
	value: *mut libc::c_void,
	len: &mut libc::socklen_t,
) -> Result<(), SocketError> {
	if unsafe { libc::getsockopt(fd, level, name, value, len) } == -1 {
		return Err(map_errno(errno()));
	}
	Ok(())
}

/// Local address of a bound handle; used to recover the ephemeral port
/// after binding port 0.
pub(crate) fn local_name(
	fd: RawFd,
) -> Result<(libc::sockaddr_storage, libc::socklen_t), SocketError> {
	let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
	let mut len = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
	let result = unsafe {
		libc::getsockname(
			fd,
			&mut storage as *mut _ as *mut libc::sockaddr,
			&mut len,
		)
	};
	if result == -1 {
		return Err(map_errno(errno()));
	}
	Ok((storage, len))
}
