//! Consumed reactor contract.
//!
//! The event loop itself lives outside this crate. Sockets only require
//! something that can watch a native handle for readiness, switch the
//! watched event kinds at runtime, and invoke a stored callback when the
//! handle becomes ready. Dispatch is serialized per handle; the contract
//! does not synchronize callbacks against user threads — that is what
//! each socket's own [`StateLock`](crate::lock::StateLock) is for.

use std::os::fd::RawFd;

use crate::error::SocketError;

bitflags::bitflags! {
	/// Readiness event kinds a registration can observe.
	#[derive(Debug, Clone, Copy, PartialEq, Eq)]
	pub struct EventMask: u8 {
		const READ = 0b01;
		const WRITE = 0b10;
	}
}

/// Opaque handle for one reactor registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationToken(pub u64);

/// Callback invoked by the reactor when the registered handle is ready.
///
/// Invoked from the reactor's dispatch context, one invocation at a time
/// per registration.
pub type EventCallback = Box<dyn FnMut(EventMask) + Send>;

/// Readiness notification service consumed by the socket state machines.
pub trait Reactor: Send + Sync {
	/// Registers `handle` with an initial set of observed events
	/// (usually empty) and the callback to invoke on readiness.
	fn register(
		&self,
		handle: RawFd,
		initial: EventMask,
		callback: EventCallback,
	) -> Result<RegistrationToken, SocketError>;

	/// Removes the registration. With `close_handle` the reactor takes
	/// over the handle and closes it once no callback is executing for
	/// this token; until then [`Reactor::is_in_use`] keeps answering.
	fn unregister(&self, token: RegistrationToken, close_handle: bool);

	/// Starts observing additional event kinds.
	fn add_monitored_events(&self, token: RegistrationToken, events: EventMask);

	/// Stops observing the given event kinds.
	fn remove_monitored_events(&self, token: RegistrationToken, events: EventMask);

	/// True while a callback for this token is currently executing.
	/// Sockets poll this to delay the Closing to Closed transition.
	fn is_in_use(&self, token: RegistrationToken) -> bool;
}
