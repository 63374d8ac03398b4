use std::io::{IoSlice, IoSliceMut};
use std::marker::PhantomData;
use std::os::fd::OwnedFd;
use std::sync::Arc;

use crate::addr::Domain;
use crate::error::{fatal_contract_violation, map_errno, SocketError};
use crate::lock::StateLock;
use crate::netstack::NetworkStackId;
use crate::os;
use crate::reactor::{EventCallback, EventMask, Reactor};
use crate::socket::base::BaseSocket;
use crate::socket::decode_addr;
use crate::socket::options::SockOpt;

/// Connection lifecycle of a stream socket.
///
/// Dormant records detected peer separation; it is an observable network
/// condition, not a usage error — the caller closes and may reconnect.
/// ConnectError sockets must be closed and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
	Disconnected,
	ConnectingAsync,
	ConnectingSync,
	Connected,
	Dormant,
	ConnectError,
}

/// Single-shot completion for an asynchronous connect.
pub type ConnectCompletion = Box<dyn FnOnce(Result<(), SocketError>) + Send>;

/// Single-shot completion for an asynchronous send or receive. Ownership
/// of the scatter/gather chain comes back with the result.
pub type TransferCompletion = Box<dyn FnOnce(Result<usize, SocketError>, Vec<Vec<u8>>) + Send>;

/// Outcome of the optimistic [`StreamSocket::send`].
pub enum SendOutcome {
	/// Every requested byte left in the immediate attempt; the
	/// completion callback was never armed. The chain comes back here.
	Completed(Vec<Vec<u8>>),
	/// The remainder was handed to the asynchronous path; the callback
	/// fires once the chain is fully consumed.
	Pending,
}

/// Rejection of an asynchronous transfer at submission time. The chain
/// is returned so the caller keeps ownership; the callback was never
/// armed and is dropped.
pub struct SubmitError {
	pub error: SocketError,
	pub chunks: Vec<Vec<u8>>,
}

impl std::fmt::Debug for SubmitError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SubmitError")
			.field("error", &self.error)
			.finish_non_exhaustive()
	}
}

/// One armed asynchronous transfer: the owned chain, the consumption
/// cursor resuming partial OS-level transfers, and the callback.
struct PendingTransfer {
	chunks: Vec<Vec<u8>>,
	cursor: usize,
	total: usize,
	callback: TransferCompletion,
	/// Receive only: forward data on every arrival instead of waiting
	/// for the chain to fill.
	instant: bool,
}

/// Per-direction operation slot. Reserved marks a synchronous or
/// optimistic attempt whose syscall runs with the lock released, so a
/// concurrent arm in the same direction is rejected meanwhile.
enum TransferSlot {
	Idle,
	Reserved,
	Pending(PendingTransfer),
}

impl TransferSlot {
	fn is_idle(&self) -> bool {
		matches!(self, TransferSlot::Idle)
	}

	fn is_pending(&self) -> bool {
		matches!(self, TransferSlot::Pending(_))
	}

	fn pending_mut(&mut self) -> Option<&mut PendingTransfer> {
		match self {
			TransferSlot::Pending(p) => Some(p),
			_ => None,
		}
	}

	fn take_pending(&mut self) -> Option<PendingTransfer> {
		if self.is_pending() {
			match std::mem::replace(self, TransferSlot::Idle) {
				TransferSlot::Pending(p) => Some(p),
				_ => unreachable!(),
			}
		} else {
			None
		}
	}
}

/// Completed transfer waiting to be delivered with the lock released.
struct TransferDone {
	callback: TransferCompletion,
	outcome: Result<usize, SocketError>,
	chunks: Vec<Vec<u8>>,
}

impl TransferDone {
	fn deliver(self) {
		(self.callback)(self.outcome, self.chunks);
	}
}

/// Callbacks and buffers abandoned by a close, held only to be dropped
/// after the lock is released, since dropping user closures can run
/// foreign code.
struct Abandoned {
	_connect: Option<ConnectCompletion>,
	_send: Option<PendingTransfer>,
	_receive: Option<PendingTransfer>,
}

pub(crate) struct StreamInner {
	base: BaseSocket,
	connection: ConnectionState,
	connect_callback: Option<ConnectCompletion>,
	send: TransferSlot,
	receive: TransferSlot,
}

/// A TCP-style stream socket: connect, send and receive in synchronous,
/// fully asynchronous and optimistic flavors.
///
/// All mutable state sits behind the object's own lock; user threads and
/// the reactor dispatch context are serialized by it. Completion
/// callbacks are always invoked with the lock released, so re-arming a
/// new operation from inside a callback is allowed.
pub struct StreamSocket<D: Domain> {
	shared: Arc<StateLock<StreamInner>>,
	_marker: PhantomData<D>,
}

impl<D: Domain> StreamSocket<D> {
	/// Creates a closed stream socket. Supplying a reactor enables the
	/// asynchronous operations; without one only the synchronous
	/// variants are usable.
	pub fn new(reactor: Option<Arc<dyn Reactor>>) -> Self {
		Self {
			shared: Arc::new(StateLock::new(StreamInner {
				base: BaseSocket::new(reactor),
				connection: ConnectionState::Disconnected,
				connect_callback: None,
				send: TransferSlot::Idle,
				receive: TransferSlot::Idle,
			})),
			_marker: PhantomData,
		}
	}

	/// The reactor callback holds a weak reference: a socket that has
	/// been dropped simply stops responding to readiness events.
	fn event_callback(shared: &Arc<StateLock<StreamInner>>) -> EventCallback {
		let weak = Arc::downgrade(shared);
		Box::new(move |events| {
			if let Some(shared) = weak.upgrade() {
				stream_reactor_events(&shared, events);
			}
		})
	}

	/// Creates the native handle bound to `stack` and registers it with
	/// the reactor, all events disabled.
	pub fn open(&self, stack: NetworkStackId) -> Result<(), SocketError> {
		let callback = Self::event_callback(&self.shared);
		let mut inner = self.shared.lock();
		inner.base.open(D::family(), stack, callback)?;
		inner.connection = ConnectionState::Disconnected;
		Ok(())
	}

	/// Wraps an accepted, already-connected handle.
	pub(crate) fn from_accepted(
		fd: OwnedFd,
		reactor: Option<Arc<dyn Reactor>>,
		stack: NetworkStackId,
	) -> Result<Self, SocketError> {
		let socket = Self::new(reactor);
		let callback = Self::event_callback(&socket.shared);
		{
			let mut inner = socket.shared.lock();
			inner.base.adopt(fd, D::family(), stack, callback)?;
			inner.connection = ConnectionState::Connected;
		}
		Ok(socket)
	}

	/// Abandons any pending operations (their callbacks are destroyed,
	/// never invoked) and leaves the Open state. With a reactor attached
	/// the socket may linger in Closing; poll
	/// [`StreamSocket::check_is_closed`].
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

	/// Current connection state, mainly for diagnostics and tests.
	pub fn connection_state(&self) -> ConnectionState {
		self.shared.lock().connection
	}

	/// Synchronous connect.
	///
	/// With blocking mode enabled this returns once the handshake
	/// finished. On a non-blocking handle a would-block outcome leaves
	/// the socket in ConnectingSync and returns `Busy`; poll completion
	/// via [`StreamSocket::remote_endpoint`]. Any other failure moves to
	/// ConnectError: close the socket, do not reuse it.
	pub fn connect(&self, endpoint: &D::Addr) -> Result<(), SocketError> {
		let fd;
		{
			let mut inner = self.shared.lock();
			fd = inner.base.require_open()?;
			if inner.connection != ConnectionState::Disconnected {
				return Err(SocketError::ApiError(
					"connect() while a connection attempt or connection exists",
				));
			}
			// reserves the connect direction across the unlocked syscall
			inner.connection = ConnectionState::ConnectingSync;
		}

		// the syscall may block; never with the lock held
		let result = os::connect_fd(fd, endpoint);

		let mut inner = self.shared.lock();
		if !inner.base.check_is_open() {
			return Err(SocketError::ApiError("socket was closed during connect()"));
		}
		match result {
			Ok(()) => {
				log::debug!("fd {fd} connected");
				inner.connection = ConnectionState::Connected;
				Ok(())
			}
			Err(SocketError::Busy) => Err(SocketError::Busy),
			Err(e) => {
				log::debug!("fd {fd} connect failed: {e}");
				inner.connection = ConnectionState::ConnectError;
				Err(e)
			}
		}
	}

	/// Asynchronous connect. Requires a reactor and blocking mode
	/// disabled (asserted). The callback fires exactly once with the
	/// terminal outcome, unless the socket is closed first, in which
	/// case it is discarded without being invoked.
	pub fn connect_async(
		&self,
		endpoint: &D::Addr,
		callback: ConnectCompletion,
	) -> Result<(), SocketError> {
		let mut inner = self.shared.lock();
		let fd = inner.base.require_open()?;
		inner.base.assert_async_capable();
		if inner.connection != ConnectionState::Disconnected {
			return Err(SocketError::ApiError(
				"connect_async() while a connection attempt or connection exists",
			));
		}
		match os::connect_fd(fd, endpoint) {
			// immediate completion still reports through the reactor:
			// the write event fires and SO_ERROR reads zero
			Ok(()) | Err(SocketError::Busy) => {
				inner.connection = ConnectionState::ConnectingAsync;
				inner.connect_callback = Some(callback);
				inner.base.add_events(EventMask::WRITE);
				Ok(())
			}
			Err(e) => {
				log::debug!("fd {fd} connect_async failed on submit: {e}");
				inner.connection = ConnectionState::ConnectError;
				Err(e)
			}
		}
	}

	/// Peer address of the connection; doubles as the completion poll
	/// for a ConnectingSync socket.
	///
	/// While connecting, a not-yet-connected handle is ambiguous between
	/// "still in progress" and "failed"; the pending socket error
	/// disambiguates: `Busy` means keep polling, any other error means
	/// the attempt is dead and the socket moved to ConnectError.
	pub fn remote_endpoint(&self) -> Result<D::Addr, SocketError> {
		let mut inner = self.shared.lock();
		let fd = inner.base.require_open()?;
		match inner.connection {
			ConnectionState::Connected => match os::peer_name(fd) {
				Ok((storage, len)) => decode_addr::<D>(&storage, len),
				Err(e) if e.is_disconnect() => {
					let e = inner.handle_operation_error(e);
					Err(e)
				}
				Err(e) => Err(e),
			},
			ConnectionState::ConnectingSync => match os::peer_name(fd) {
				Ok((storage, len)) => {
					inner.connection = ConnectionState::Connected;
					log::debug!("fd {fd} connected");
					decode_addr::<D>(&storage, len)
				}
				Err(_) => match os::socket_error(fd) {
					Ok(0) => Err(SocketError::Busy),
					Ok(e) => match map_errno(e) {
						SocketError::Busy => Err(SocketError::Busy),
						err => {
							inner.connection = ConnectionState::ConnectError;
							Err(err)
						}
					},
					Err(e) => {
						inner.connection = ConnectionState::ConnectError;
						Err(e)
					}
				},
			},
			// dormant is a network condition, not a usage error
			ConnectionState::Dormant => Err(SocketError::Disconnected),
			_ => Err(SocketError::ApiError(
				"remote_endpoint() without a connection or connection attempt",
			)),
		}
	}

	/// Synchronous send: one OS send, no retry loop. Returns the bytes
	/// actually transferred, which may be fewer than requested.
	pub fn send_sync(&self, data: &[u8]) -> Result<usize, SocketError> {
		let fd;
		{
			let mut inner = self.shared.lock();
			fd = inner.base.require_open()?;
			inner.require_transfer_ready(Direction::Send)?;
			inner.send = TransferSlot::Reserved;
		}

		let result = os::send_vectored(fd, &[IoSlice::new(data)]);

		let mut inner = self.shared.lock();
		if !inner.base.check_is_open() {
			return Err(SocketError::ApiError("socket was closed during send()"));
		}
		inner.send = TransferSlot::Idle;
		result.map_err(|e| inner.handle_operation_error(e))
	}

	/// Synchronous receive: one OS receive. Zero bytes on a non-empty
	/// buffer means the peer separated — the socket goes Dormant and
	/// `Disconnected` is returned.
	pub fn receive_sync(&self, buffer: &mut [u8]) -> Result<usize, SocketError> {
		if buffer.is_empty() {
			return Ok(0);
		}
		let fd;
		{
			let mut inner = self.shared.lock();
			fd = inner.base.require_open()?;
			inner.require_transfer_ready(Direction::Receive)?;
			inner.receive = TransferSlot::Reserved;
		}

		let result = os::receive_vectored(fd, &mut [IoSliceMut::new(buffer)]);

		let mut inner = self.shared.lock();
		if !inner.base.check_is_open() {
			return Err(SocketError::ApiError("socket was closed during receive()"));
		}
		inner.receive = TransferSlot::Idle;
		match result {
			Ok(0) => Err(inner.handle_operation_error(SocketError::Disconnected)),
			Ok(n) => Ok(n),
			Err(e) => Err(inner.handle_operation_error(e)),
		}
	}

	/// Arms the asynchronous send path unconditionally: no immediate
	/// attempt is made. The callback fires once the whole chain has been
	/// flushed, or on the first terminal error.
	pub fn send_async(
		&self,
		chunks: Vec<Vec<u8>>,
		callback: TransferCompletion,
	) -> Result<(), SubmitError> {
		let mut inner = self.shared.lock();
		if let Err(error) = inner
			.base
			.require_open()
			.and_then(|_| inner.require_transfer_ready(Direction::Send))
		{
			return Err(SubmitError { error, chunks });
		}
		inner.base.assert_async_capable();
		inner.setup_async_send(chunks, 0, callback);
		Ok(())
	}

	/// Optimistic send: one immediate OS send first. A full transfer
	/// completes synchronously and never touches the callback; any
	/// unsent remainder is covered by the asynchronous path.
	pub fn send(
		&self,
		chunks: Vec<Vec<u8>>,
		callback: TransferCompletion,
	) -> Result<SendOutcome, SubmitError> {
		let fd;
		let total: usize = chunks.iter().map(Vec::len).sum();
		{
			let mut inner = self.shared.lock();
			inner.base.assert_async_capable();
			match inner
				.base
				.require_open()
				.and_then(|f| inner.require_transfer_ready(Direction::Send).map(|_| f))
			{
				Ok(f) => fd = f,
				Err(error) => return Err(SubmitError { error, chunks }),
			}
			inner.send = TransferSlot::Reserved;
		}

		let result = {
			let slices: Vec<IoSlice<'_>> = remaining_slices(&chunks, 0);
			if slices.is_empty() {
				Ok(0)
			} else {
				os::send_vectored(fd, &slices)
			}
		};

		let mut inner = self.shared.lock();
		if !inner.base.check_is_open() {
			return Err(SubmitError {
				error: SocketError::ApiError("socket was closed during send()"),
				chunks,
			});
		}
		inner.send = TransferSlot::Idle;
		if inner.connection == ConnectionState::Dormant {
			return Err(SubmitError {
				error: SocketError::Disconnected,
				chunks,
			});
		}
		match result {
			Ok(n) if n >= total => Ok(SendOutcome::Completed(chunks)),
			Ok(n) => {
				inner.setup_async_send(chunks, n, callback);
				Ok(SendOutcome::Pending)
			}
			Err(SocketError::Busy) => {
				inner.setup_async_send(chunks, 0, callback);
				Ok(SendOutcome::Pending)
			}
			Err(e) => {
				let error = inner.handle_operation_error(e);
				Err(SubmitError { error, chunks })
			}
		}
	}

	/// Arms an asynchronous receive that completes only once the whole
	/// chain has been filled.
	pub fn receive_async(
		&self,
		chunks: Vec<Vec<u8>>,
		callback: TransferCompletion,
	) -> Result<(), SubmitError> {
		self.setup_receive(chunks, callback, false)
	}

	/// Arms an asynchronous receive that completes on every partial
	/// arrival. An event arriving after the chain is already exhausted
	/// completes with zero bytes instead of issuing a fresh OS call.
	pub fn receive_async_some(
		&self,
		chunks: Vec<Vec<u8>>,
		callback: TransferCompletion,
	) -> Result<(), SubmitError> {
		self.setup_receive(chunks, callback, true)
	}

	fn setup_receive(
		&self,
		chunks: Vec<Vec<u8>>,
		callback: TransferCompletion,
		instant: bool,
	) -> Result<(), SubmitError> {
		let mut inner = self.shared.lock();
		if let Err(error) = inner
			.base
			.require_open()
			.and_then(|_| inner.require_transfer_ready(Direction::Receive))
		{
			return Err(SubmitError { error, chunks });
		}
		inner.base.assert_async_capable();
		let total = chunks.iter().map(Vec::len).sum();
		inner.receive = TransferSlot::Pending(PendingTransfer {
			chunks,
			cursor: 0,
			total,
			callback,
			instant,
		});
		inner.base.add_events(EventMask::READ);
		Ok(())
	}
}

impl<D: Domain> Drop for StreamSocket<D> {
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

#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
	Send,
	Receive,
}

impl StreamInner {
	/// Validates connection state and per-direction exclusivity for a
	/// transfer. Dormant is reported as `Disconnected`, never as a usage
	/// error.
	fn require_transfer_ready(&self, direction: Direction) -> Result<(), SocketError> {
		match self.connection {
			ConnectionState::Connected => {}
			ConnectionState::Dormant => return Err(SocketError::Disconnected),
			_ => {
				return Err(SocketError::ApiError(
					"data transfer on a socket that is not connected",
				))
			}
		}
		let slot = match direction {
			Direction::Send => &self.send,
			Direction::Receive => &self.receive,
		};
		if !slot.is_idle() {
			return Err(match direction {
				Direction::Send => {
					SocketError::ApiError("send while another send operation is in flight")
				}
				Direction::Receive => {
					SocketError::ApiError("receive while another receive operation is in flight")
				}
			});
		}
		Ok(())
	}

	fn setup_async_send(&mut self, chunks: Vec<Vec<u8>>, cursor: usize, callback: TransferCompletion) {
		let total = chunks.iter().map(Vec::len).sum();
		self.send = TransferSlot::Pending(PendingTransfer {
			chunks,
			cursor,
			total,
			callback,
			instant: false,
		});
		self.base.add_events(EventMask::WRITE);
	}

	/// Only peer separation while Connected changes socket state: the
	/// connection object itself became useless, so observation stops and
	/// the socket goes Dormant. Every other error passes through.
	fn handle_operation_error(&mut self, error: SocketError) -> SocketError {
		if error.is_disconnect() && self.connection == ConnectionState::Connected {
			log::debug!("peer separation detected, socket dormant");
			self.connection = ConnectionState::Dormant;
			self.base.remove_events(EventMask::READ | EventMask::WRITE);
		}
		error
	}

	/// Write readiness while ConnectingAsync. The pending socket error
	/// distinguishes a spurious wake (still in progress, `None`) from a
	/// terminal outcome; on a terminal outcome write observation stops
	/// and the stored callback is handed out for delivery.
	fn handle_connection_establishment(
		&mut self,
	) -> Option<(ConnectCompletion, Result<(), SocketError>)> {
		let fd = self.base.require_open().ok()?;
		let outcome = match os::socket_error(fd) {
			Ok(0) => Ok(()),
			Ok(raw) => match map_errno(raw) {
				SocketError::Busy => return None,
				err => Err(err),
			},
			Err(e) => Err(e),
		};
		self.base.remove_events(EventMask::WRITE);
		// moved out before the state change, so a callback that re-arms
		// synchronously observes an empty slot
		let callback = self.connect_callback.take()?;
		match &outcome {
			Ok(()) => {
				log::debug!("fd {fd} connected");
				self.connection = ConnectionState::Connected;
			}
			Err(e) => {
				log::debug!("fd {fd} async connect failed: {e}");
				self.connection = ConnectionState::ConnectError;
			}
		}
		Some((callback, outcome))
	}

	/// Write readiness while Connected: flush the remainder of the
	/// pending chain. Completion (or a terminal error) hands the
	/// transfer out for delivery; would-block wakes are ignored.
	fn handle_send(&mut self) -> Option<TransferDone> {
		let fd = self.base.require_open().ok()?;
		let result = {
			let pending = self.send.pending_mut()?;
			let slices = remaining_slices(&pending.chunks, pending.cursor);
			if slices.is_empty() {
				Ok(0)
			} else {
				os::send_vectored(fd, &slices)
			}
		};
		match result {
			Ok(n) => {
				let pending = self.send.pending_mut()?;
				pending.cursor += n;
				if pending.cursor >= pending.total {
					let done = self.send.take_pending()?;
					Some(TransferDone {
						callback: done.callback,
						outcome: Ok(done.total),
						chunks: done.chunks,
					})
				} else {
					None
				}
			}
			Err(SocketError::Busy) => None,
			Err(e) => {
				let error = self.handle_operation_error(e);
				let done = self.send.take_pending()?;
				Some(TransferDone {
					callback: done.callback,
					outcome: Err(error),
					chunks: done.chunks,
				})
			}
		}
	}

	/// Read readiness while Connected. In instant mode every arrival
	/// completes the operation; otherwise only a full chain does. An
	/// exhausted chain completes with zero bytes without a fresh OS
	/// call.
	fn handle_receive(&mut self) -> Option<TransferDone> {
		let fd = self.base.require_open().ok()?;
		let (result, had_capacity) = {
			let pending = self.receive.pending_mut()?;
			let remaining = pending.total - pending.cursor;
			if remaining == 0 {
				(Ok(0), false)
			} else {
				let mut slices = remaining_slices_mut(&mut pending.chunks, pending.cursor);
				(os::receive_vectored(fd, &mut slices), true)
			}
		};
		match result {
			Ok(0) if had_capacity => {
				// orderly shutdown by the peer
				let error = self.handle_operation_error(SocketError::Disconnected);
				let done = self.receive.take_pending()?;
				Some(TransferDone {
					callback: done.callback,
					outcome: Err(error),
					chunks: done.chunks,
				})
			}
			Ok(n) => {
				let pending = self.receive.pending_mut()?;
				pending.cursor += n;
				let filled = pending.cursor >= pending.total;
				if pending.instant || filled {
					let value = if pending.instant { n } else { pending.total };
					let done = self.receive.take_pending()?;
					Some(TransferDone {
						callback: done.callback,
						outcome: Ok(value),
						chunks: done.chunks,
					})
				} else {
					None
				}
			}
			Err(SocketError::Busy) => None,
			Err(e) => {
				let error = self.handle_operation_error(e);
				let done = self.receive.take_pending()?;
				Some(TransferDone {
					callback: done.callback,
					outcome: Err(error),
					chunks: done.chunks,
				})
			}
		}
	}

	/// Resets the derived state ahead of a base-socket close. Pending
	/// callbacks are abandoned, not invoked; the caller drops them after
	/// releasing the lock.
	fn on_close_event(&mut self) -> Abandoned {
		self.connection = ConnectionState::Disconnected;
		let send = self.send.take_pending();
		let receive = self.receive.take_pending();
		self.send = TransferSlot::Idle;
		self.receive = TransferSlot::Idle;
		Abandoned {
			_connect: self.connect_callback.take(),
			_send: send,
			_receive: receive,
		}
	}
}

enum Route {
	Establish(ConnectCompletion, Result<(), SocketError>),
	Data,
}

/// Reactor dispatch entry for stream sockets.
///
/// Stale events racing a concurrent close or error demotion are dropped
/// silently. ConnectingSync and ConnectError never arm observation, so
/// an event in those states is a contract violation.
fn stream_reactor_events(shared: &Arc<StateLock<StreamInner>>, events: EventMask) {
	let route = {
		let mut inner = shared.lock();
		if !inner.base.check_is_open() {
			return;
		}
		match inner.connection {
			ConnectionState::Disconnected | ConnectionState::Dormant => return,
			ConnectionState::ConnectingSync | ConnectionState::ConnectError => {
				fatal_contract_violation(
					"reactor event in a connection state that never arms observation",
				)
			}
			ConnectionState::ConnectingAsync => {
				if !events.contains(EventMask::WRITE) {
					return;
				}
				match inner.handle_connection_establishment() {
					Some((callback, outcome)) => Route::Establish(callback, outcome),
					None => return,
				}
			}
			ConnectionState::Connected => Route::Data,
		}
	};

	match route {
		Route::Establish(callback, outcome) => {
			// lock released: the callback may connect or arm transfers
			callback(outcome);
		}
		Route::Data => {
			if events.contains(EventMask::WRITE) {
				let done = {
					let mut inner = shared.lock();
					if inner.base.check_is_open()
						&& inner.connection == ConnectionState::Connected
					{
						inner.handle_send()
					} else {
						None
					}
				};
				if let Some(done) = done {
					done.deliver();
					// the callback may have closed the socket or armed a
					// new send
					let inner = shared.lock();
					if inner.base.check_is_open() && !inner.send.is_pending() {
						inner.base.remove_events(EventMask::WRITE);
					}
				}
			}
			if events.contains(EventMask::READ) {
				// connection state re-checked: the send completion ran
				// with the lock released and may have changed it
				let done = {
					let mut inner = shared.lock();
					if inner.base.check_is_open()
						&& inner.connection == ConnectionState::Connected
					{
						inner.handle_receive()
					} else {
						None
					}
				};
				if let Some(done) = done {
					done.deliver();
					let inner = shared.lock();
					if inner.base.check_is_open() && !inner.receive.is_pending() {
						inner.base.remove_events(EventMask::READ);
					}
				}
			}
		}
	}
}

/// Immutable iovec views over the unconsumed tail of a chain.
fn remaining_slices(chunks: &[Vec<u8>], cursor: usize) -> Vec<IoSlice<'_>> {
	let mut skip = cursor;
	let mut out = Vec::new();
	for chunk in chunks {
		let len = chunk.len();
		if skip >= len {
			skip -= len;
			continue;
		}
		out.push(IoSlice::new(&chunk[skip..]));
		skip = 0;
	}
	out
}

/// Mutable iovec views over the unfilled tail of a chain.
fn remaining_slices_mut(chunks: &mut [Vec<u8>], cursor: usize) -> Vec<IoSliceMut<'_>> {
	let mut skip = cursor;
	let mut out = Vec::new();
	for chunk in chunks.iter_mut() {
		let len = chunk.len();
		if skip >= len {
			skip -= len;
			continue;
		}
		out.push(IoSliceMut::new(&mut chunk[skip..]));
		skip = 0;
	}
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn remaining_slices_skip_consumed_chunks() {
		let chunks = vec![vec![1u8, 2, 3], vec![4, 5], vec![6]];
		let slices = remaining_slices(&chunks, 4);
		let flat: Vec<u8> = slices.iter().flat_map(|s| s.to_vec()).collect();
		assert_eq!(flat, vec![5, 6]);
	}

	#[test]
	fn remaining_slices_empty_when_fully_consumed() {
		let chunks = vec![vec![1u8, 2], vec![3]];
		assert!(remaining_slices(&chunks, 3).is_empty());
	}

	#[test]
	fn remaining_slices_mid_chunk_offset() {
		let mut chunks = vec![vec![0u8; 4], vec![0u8; 4]];
		let slices = remaining_slices_mut(&mut chunks, 1);
		assert_eq!(slices.len(), 2);
		assert_eq!(slices[0].len(), 3);
		assert_eq!(slices[1].len(), 4);
	}
}
