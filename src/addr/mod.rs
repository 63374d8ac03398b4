//! Address families and endpoint types.
//!
//! Two families are supported:
//! - `Ipv4` — Internet Protocol version 4
//! - `Ipv6` — Internet Protocol version 6

mod ipv4;
mod ipv6;
pub use self::ipv4::{Ipv4, SocketAddrV4};
pub use self::ipv6::{Ipv6, SocketAddrV6};

/// Marker trait for address families.
///
/// Each implementor stands for one `socket()` address family and names
/// the endpoint type that family uses. The bounds on `Addr` are the ones
/// the runtime state machines need: endpoints are copied into pending
/// operations and travel through completion callbacks.
pub trait Domain: 'static {
	type Addr: ToSockAddr + FromSockAddr + Copy + Send + std::fmt::Debug + 'static;

	/// Returns the libc constant for this address family.
	fn family() -> libc::c_int;
}

/// Endpoint types that can be handed to syscalls as a raw sockaddr.
pub trait ToSockAddr {
	/// Calls `f` with a pointer to the raw sockaddr and its size. The
	/// raw struct lives on this stack frame, so the pointer is only
	/// valid inside the closure. Returns None for unencodable addresses.
	fn with_raw<F, R>(&self, f: F) -> Option<R>
	where
		F: FnOnce(*const libc::sockaddr, libc::socklen_t) -> R;
}

/// Endpoint types that can be decoded from raw sockaddr storage.
pub trait FromSockAddr: Sized {
	/// # Safety
	/// The sockaddr must be of the correct family for this type.
	unsafe fn from_sockaddr(addr: *const libc::sockaddr, len: libc::socklen_t) -> Option<Self>;
}

impl FromSockAddr for SocketAddrV4 {
	unsafe fn from_sockaddr(addr: *const libc::sockaddr, len: libc::socklen_t) -> Option<Self> {
		if len < std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t {
			return None;
		}
		let raw = unsafe { &*(addr as *const libc::sockaddr_in) };
		Some(Self::from_raw(raw))
	}
}

impl FromSockAddr for SocketAddrV6 {
	unsafe fn from_sockaddr(addr: *const libc::sockaddr, len: libc::socklen_t) -> Option<Self> {
		if len < std::mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t {
			return None;
		}
		let raw = unsafe { &*(addr as *const libc::sockaddr_in6) };
		Some(Self::from_raw(raw))
	}
}
