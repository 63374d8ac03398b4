use std::os::fd::{AsRawFd, IntoRawFd, OwnedFd, RawFd};
use std::sync::Arc;

use crate::error::{fatal_contract_violation, SocketError};
use crate::netstack::NetworkStackId;
use crate::os;
use crate::reactor::{EventCallback, EventMask, Reactor, RegistrationToken};
use crate::socket::options::SockOpt;

/// Handle lifecycle of a socket object.
///
/// Closing is only reached when a reactor is attached: the handle has
/// been relinquished to the reactor, and the transition to Closed waits
/// until no callback is executing for the old registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
	Closed,
	Open,
	Closing,
}

/// Shared plumbing under the stream socket and the acceptor: native
/// handle ownership, open/close lifecycle, blocking-mode cache, network
/// stack binding, and reactor registration bookkeeping.
///
/// Every method is entered with the enclosing socket's `StateLock`
/// already held; the derived state machines own the locking discipline.
pub(crate) struct BaseSocket {
	handle: Option<OwnedFd>,
	state: SocketState,
	blocking: bool,
	family: libc::c_int,
	stack: NetworkStackId,
	reactor: Option<Arc<dyn Reactor>>,
	registration: Option<RegistrationToken>,
}

impl BaseSocket {
	pub(crate) fn new(reactor: Option<Arc<dyn Reactor>>) -> Self {
		Self {
			handle: None,
			state: SocketState::Closed,
			blocking: true,
			family: libc::AF_UNSPEC,
			stack: NetworkStackId::DEFAULT,
			reactor,
			registration: None,
		}
	}

	/// Creates the native handle and registers it with the reactor (all
	/// events disabled) when one was supplied at construction.
	///
	/// On registration failure the fresh handle is closed again and the
	/// state remains Closed.
	pub(crate) fn open(
		&mut self,
		family: libc::c_int,
		stack: NetworkStackId,
		callback: EventCallback,
	) -> Result<(), SocketError> {
		if self.state != SocketState::Closed {
			return Err(SocketError::ApiError("open() on a socket that is not closed"));
		}
		let fd = os::create_socket(family)?;
		self.adopt(fd, family, stack, callback)
	}

	/// Takes over an existing connected handle (an accepted connection)
	/// as if it had been opened here. Same registration contract as
	/// [`BaseSocket::open`].
	pub(crate) fn adopt(
		&mut self,
		fd: OwnedFd,
		family: libc::c_int,
		stack: NetworkStackId,
		callback: EventCallback,
	) -> Result<(), SocketError> {
		if self.state != SocketState::Closed {
			return Err(SocketError::ApiError("open() on a socket that is not closed"));
		}
		if let Some(reactor) = &self.reactor {
			match reactor.register(fd.as_raw_fd(), EventMask::empty(), callback) {
				Ok(token) => self.registration = Some(token),
				Err(e) => {
					// fd dropped here, handle closed, state stays Closed
					return Err(e);
				}
			}
		}
		log::debug!("socket fd {} opened", fd.as_raw_fd());
		self.handle = Some(fd);
		self.family = family;
		self.stack = stack;
		self.blocking = true;
		self.state = SocketState::Open;
		Ok(())
	}

	/// Leaves the Open state. With a reactor the handle's ownership
	/// passes to the reactor (closed once drained) and the socket parks
	/// in Closing until [`BaseSocket::check_is_closed`] observes the
	/// registration idle; without one the handle closes immediately.
	///
	/// The derived state machine has already run its close-event reset
	/// by the time this is called.
	pub(crate) fn close(&mut self) -> Result<(), SocketError> {
		if self.state != SocketState::Open {
			return Err(SocketError::ApiError("close() on a socket that is not open"));
		}
		let fd = self.handle.take();
		match (&self.reactor, self.registration) {
			(Some(reactor), Some(token)) => {
				if let Some(fd) = fd {
					log::debug!("socket fd {} closing via reactor", fd.as_raw_fd());
					// the reactor closes the raw fd once no callback runs
					let _raw = fd.into_raw_fd();
				}
				reactor.unregister(token, true);
				self.state = SocketState::Closing;
				self.check_is_closed();
			}
			_ => {
				drop(fd);
				self.state = SocketState::Closed;
			}
		}
		Ok(())
	}

	pub(crate) fn check_is_open(&self) -> bool {
		self.state == SocketState::Open
	}

	/// True once fully closed. Opportunistically advances Closing to
	/// Closed when the reactor reports no callback in flight for the old
	/// registration.
	pub(crate) fn check_is_closed(&mut self) -> bool {
		match self.state {
			SocketState::Closed => true,
			SocketState::Open => false,
			SocketState::Closing => {
				let idle = match (&self.reactor, self.registration) {
					(Some(reactor), Some(token)) => !reactor.is_in_use(token),
					_ => true,
				};
				if idle {
					self.registration = None;
					self.state = SocketState::Closed;
				}
				idle
			}
		}
	}

	/// Raw handle for syscalls while Open; `ApiError` otherwise.
	pub(crate) fn require_open(&self) -> Result<RawFd, SocketError> {
		match (&self.state, &self.handle) {
			(SocketState::Open, Some(fd)) => Ok(fd.as_raw_fd()),
			_ => Err(SocketError::ApiError("socket is not open")),
		}
	}

	pub(crate) fn set_blocking_mode(&mut self, enable: bool) -> Result<(), SocketError> {
		let fd = self.require_open()?;
		os::set_blocking_mode(fd, enable)?;
		self.blocking = enable;
		Ok(())
	}

	pub(crate) fn stack(&self) -> NetworkStackId {
		self.stack
	}

	/// Asynchronous operations are a programmer contract: a reactor must
	/// have been supplied and blocking mode must be disabled. Violations
	/// abort instead of surfacing through the error taxonomy.
	pub(crate) fn assert_async_capable(&self) {
		if self.reactor.is_none() {
			fatal_contract_violation("asynchronous operation without a reactor");
		}
		if self.blocking {
			fatal_contract_violation("asynchronous operation with blocking mode enabled");
		}
	}

	pub(crate) fn add_events(&self, events: EventMask) {
		if let (Some(reactor), Some(token)) = (&self.reactor, self.registration) {
			reactor.add_monitored_events(token, events);
		}
	}

	pub(crate) fn remove_events(&self, events: EventMask) {
		if let (Some(reactor), Some(token)) = (&self.reactor, self.registration) {
			reactor.remove_monitored_events(token, events);
		}
	}

	pub(crate) fn set_option<O: SockOpt>(&self, option: &O) -> Result<(), SocketError> {
		let fd = self.require_open()?;
		let raw = option.to_raw();
		os::set_option_raw(
			fd,
			O::LEVEL,
			O::NAME,
			&raw as *const _ as *const libc::c_void,
			std::mem::size_of::<O::Raw>() as libc::socklen_t,
		)
	}

	pub(crate) fn get_option<O: SockOpt>(&self) -> Result<O, SocketError> {
		let fd = self.require_open()?;
		let mut raw: O::Raw = unsafe { std::mem::zeroed() };
		let mut len = std::mem::size_of::<O::Raw>() as libc::socklen_t;
		os::get_option_raw(
			fd,
			O::LEVEL,
			O::NAME,
			&mut raw as *mut _ as *mut libc::c_void,
			&mut len,
		)?;
		Ok(O::from_raw(raw))
	}
}
