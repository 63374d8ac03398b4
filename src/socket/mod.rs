//! Socket objects.
//!
//! [`base::BaseSocket`] carries the plumbing every socket shares;
//! [`stream::StreamSocket`] and [`acceptor::Acceptor`] are the two
//! public state machines built on top of it.

pub mod acceptor;
pub mod base;
pub mod options;
pub mod stream;

use crate::addr::{Domain, FromSockAddr};
use crate::error::SocketError;

/// Decodes raw sockaddr storage into the domain's endpoint type.
pub(crate) fn decode_addr<D: Domain>(
	storage: &libc::sockaddr_storage,
	len: libc::socklen_t,
) -> Result<D::Addr, SocketError> {
	unsafe { D::Addr::from_sockaddr(storage as *const _ as *const libc::sockaddr, len) }
		.ok_or(SocketError::AddressError)
}
