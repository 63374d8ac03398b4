use std::marker::PhantomData;
use std::sync::Arc;

use crate::addr::Domain;
use crate::error::{fatal_contract_violation, SocketError};
use crate::lock::StateLock;
use crate::netstack::NetworkStackId;
use crate::os;
use crate::reactor::{EventCallback, EventMask, Reactor};
use crate::socket::base::BaseSocket;
use crate::socket::decode_addr;
use crate::socket::options::SockOpt;
use crate::socket::stream::StreamSocket;

/// Listen queue depth passed to the OS.
const BACKLOG: libc::c_int = 32;

/// Setup progress of an acceptor. The sequence is strictly
/// bind → listen → accept; skipping a step is a usage error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptorState {
	Disconnected,
	EndpointBound,
	Listening,
	Accepting,
}

/// Single-shot completion for an asynchronous accept: the connected
/// stream socket and the peer endpoint.
pub type AcceptCompletion<D> =
	Box<dyn FnOnce(Result<(StreamSocket<D>, <D as Domain>::Addr), SocketError>) + Send>;

struct AcceptorInner<D: Domain> {
	base: BaseSocket,
	state: AcceptorState,
	/// Reactor for the socket the armed asynchronous accept will
	/// produce; independent of the acceptor's own reactor so accepted
	/// connections can be served elsewhere.
	stream_reactor: Option<Arc<dyn Reactor>>,
	callback: Option<AcceptCompletion<D>>,
}

/// A listening socket producing connected [`StreamSocket`]s.
pub struct Acceptor<D: Domain> {
	shared: Arc<StateLock<AcceptorInner<D>>>,
	_marker: PhantomData<D>,
}

impl<D: Domain> Acceptor<D> {
	/// Creates a closed acceptor. `reactor` drives the acceptor's own
	/// asynchronous accepts; the reactor for accepted stream sockets is
	/// chosen per accept call.
	pub fn new(reactor: Option<Arc<dyn Reactor>>) -> Self {
		Self {
			shared: Arc::new(StateLock::new(AcceptorInner {
				base: BaseSocket::new(reactor),
				state: AcceptorState::Disconnected,
				stream_reactor: None,
				callback: None,
			})),
			_marker: PhantomData,
		}
	}

	fn event_callback(shared: &Arc<StateLock<AcceptorInner<D>>>) -> EventCallback {
		let weak = Arc::downgrade(shared);
		Box::new(move |events| {
			if let Some(shared) = weak.upgrade() {
				acceptor_reactor_events(&shared, events);
			}
		})
	}

	pub fn open(&self, stack: NetworkStackId) -> Result<(), SocketError> {
		let callback = Self::event_callback(&self.shared);
		let mut inner = self.shared.lock();
		inner.base.open(D::family(), stack, callback)?;
		inner.state = AcceptorState::Disconnected;
		Ok(())
	}

	/// Abandons a pending asynchronous accept (its callback is destroyed,
	/// never invoked) and leaves the Open state.
	pub fn close(&self) -> Result<(), SocketError> {
		let mut inner = self.shared.lock();
		if !inner.base.check_is_open() {
			return Err(SocketError::ApiError("close() on a socket that is not open"));
		}
		let abandoned = inner.on_close_event();
		let result = inner.base.close();
		drop(inner);
		drop(abandoned);
		result
	}

	pub fn check_is_open(&self) -> bool {
		self.shared.lock().base.check_is_open()
	}

	pub fn check_is_closed(&self) -> bool {
		self.shared.lock().base.check_is_closed()
	}

	pub fn set_blocking_mode(&self, enable: bool) -> Result<(), SocketError> {
		self.shared.lock().base.set_blocking_mode(enable)
	}

	pub fn set_option<O: SockOpt>(&self, option: &O) -> Result<(), SocketError> {
		self.shared.lock().base.set_option(option)
	}

	pub fn get_option<O: SockOpt>(&self) -> Result<O, SocketError> {
		self.shared.lock().base.get_option()
	}

	/// Current setup state, mainly for diagnostics and tests.
	pub fn acceptor_state(&self) -> AcceptorState {
		self.shared.lock().state
	}

	/// Binds the local endpoint. Must precede [`Acceptor::listen`].
	pub fn bind(&self, endpoint: &D::Addr) -> Result<(), SocketError> {
		let mut inner = self.shared.lock();
		let fd = inner.base.require_open()?;
		if inner.state != AcceptorState::Disconnected {
			return Err(SocketError::ApiError("bind() on an already bound acceptor"));
		}
		os::bind_fd(fd, endpoint)?;
		inner.state = AcceptorState::EndpointBound;
		Ok(())
	}

	/// Starts listening on the bound endpoint.
	pub fn listen(&self) -> Result<(), SocketError> {
		let mut inner = self.shared.lock();
		let fd = inner.base.require_open()?;
		if inner.state != AcceptorState::EndpointBound {
			return Err(SocketError::ApiError("listen() called before bind()"));
		}
		os::listen_fd(fd, BACKLOG)?;
		log::debug!("fd {fd} listening, backlog {BACKLOG}");
		inner.state = AcceptorState::Listening;
		Ok(())
	}

	/// Local endpoint of the bound handle. After binding port 0 this
	/// reports the ephemeral port the OS picked.
	pub fn local_endpoint(&self) -> Result<D::Addr, SocketError> {
		let inner = self.shared.lock();
		let fd = inner.base.require_open()?;
		if inner.state == AcceptorState::Disconnected {
			return Err(SocketError::ApiError("local_endpoint() before bind()"));
		}
		let (storage, len) = os::local_name(fd)?;
		decode_addr::<D>(&storage, len)
	}

	/// Synchronous accept: takes one pending connection off the queue,
	/// blocking if the handle is in blocking mode and the queue is
	/// empty. `stream_reactor` is attached to the produced socket.
	pub fn accept(
		&self,
		stream_reactor: Option<Arc<dyn Reactor>>,
	) -> Result<(StreamSocket<D>, D::Addr), SocketError> {
		let fd;
		{
			let mut inner = self.shared.lock();
			fd = inner.base.require_open()?;
			match inner.state {
				AcceptorState::Listening => {}
				AcceptorState::Accepting => {
					return Err(SocketError::ApiError(
						"ongoing asynchronous accept operation",
					))
				}
				_ => {
					return Err(SocketError::ApiError(
						"accept() called before bind() and listen()",
					))
				}
			}
			// reserves the accept direction across the unlocked syscall
			inner.state = AcceptorState::Accepting;
		}

		let result = os::accept_fd(fd);

		let mut inner = self.shared.lock();
		if !inner.base.check_is_open() {
			return Err(SocketError::ApiError("socket was closed during accept()"));
		}
		inner.state = AcceptorState::Listening;
		let (accepted, storage, len) = result?;
		let endpoint = decode_addr::<D>(&storage, len)?;
		let stream = StreamSocket::from_accepted(accepted, stream_reactor, inner.base.stack())?;
		Ok((stream, endpoint))
	}

	/// Asynchronous accept. Requires a reactor and blocking mode disabled
	/// (asserted). The callback fires exactly once with the connected
	/// stream and peer endpoint, unless the acceptor is closed first, in
	/// which case it is discarded without being invoked. One accept at a
	/// time; re-arm from inside the callback for a steady intake.
	/// `stream_reactor` is attached to the produced socket.
	pub fn accept_async(
		&self,
		stream_reactor: Option<Arc<dyn Reactor>>,
		callback: AcceptCompletion<D>,
	) -> Result<(), SocketError> {
		let mut inner = self.shared.lock();
		inner.base.require_open()?;
		inner.base.assert_async_capable();
		match inner.state {
			AcceptorState::Listening => {}
			AcceptorState::Accepting => {
				return Err(SocketError::ApiError(
					"ongoing asynchronous accept operation",
				))
			}
			_ => {
				return Err(SocketError::ApiError(
					"accept() called before bind() and listen()",
				))
			}
		}
		inner.state = AcceptorState::Accepting;
		inner.stream_reactor = stream_reactor;
		inner.callback = Some(callback);
		inner.base.add_events(EventMask::READ);
		Ok(())
	}
}

impl<D: Domain> Drop for Acceptor<D> {
	fn drop(&mut self) {
		let mut inner = self.shared.lock();
		if inner.base.check_is_open() {
			let abandoned = inner.on_close_event();
			let _ = inner.base.close();
			drop(inner);
			drop(abandoned);
		}
	}
}

impl<D: Domain> AcceptorInner<D> {
	/// Read readiness while Accepting. A would-block outcome is a
	/// spurious wake and keeps the operation armed; anything else is
	/// terminal and hands the stored callback out for delivery.
	fn handle_accept(
		&mut self,
	) -> Option<(
		AcceptCompletion<D>,
		Result<(StreamSocket<D>, D::Addr), SocketError>,
	)> {
		let fd = self.base.require_open().ok()?;
		let result = match os::accept_fd(fd) {
			Err(SocketError::Busy) => return None,
			other => other,
		};
		// moved out before the state change, so a callback that re-arms
		// synchronously observes an idle acceptor
		let callback = self.callback.take()?;
		let stream_reactor = self.stream_reactor.take();
		self.state = AcceptorState::Listening;
		let outcome = result.and_then(|(accepted, storage, len)| {
			let endpoint = decode_addr::<D>(&storage, len)?;
			let stream = StreamSocket::from_accepted(accepted, stream_reactor, self.base.stack())?;
			Ok((stream, endpoint))
		});
		Some((callback, outcome))
	}

	fn on_close_event(&mut self) -> Option<AcceptCompletion<D>> {
		self.state = AcceptorState::Disconnected;
		self.stream_reactor = None;
		self.callback.take()
	}
}

/// Reactor dispatch entry for acceptors. Acceptors never arm write
/// observation, so a write event is a contract violation; a read event
/// racing a concurrent close or completion is dropped silently.
fn acceptor_reactor_events<D: Domain>(shared: &Arc<StateLock<AcceptorInner<D>>>, events: EventMask) {
	let done = {
		let mut inner = shared.lock();
		if !inner.base.check_is_open() {
			return;
		}
		if events.contains(EventMask::WRITE) {
			fatal_contract_violation("write event on an acceptor");
		}
		if inner.state != AcceptorState::Accepting {
			return;
		}
		match inner.handle_accept() {
			Some(done) => done,
			None => return,
		}
	};

	let (callback, outcome) = done;
	// lock released: the callback may re-arm accept_async
	callback(outcome);

	// the callback may have closed the acceptor or armed a new accept
	let inner = shared.lock();
	if inner.base.check_is_open() && inner.state != AcceptorState::Accepting {
		inner.base.remove_events(EventMask::READ);
	}
}
