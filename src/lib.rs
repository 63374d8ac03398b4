//! Reactor-driven stream socket abstraction over the BSD socket API.
//!
//! The crate wraps raw stream sockets in small explicit state machines:
//! [`StreamSocket`] for connections and [`Acceptor`] for listeners. Each
//! operation exists in a synchronous flavor, an asynchronous flavor
//! driven by a caller-supplied [`Reactor`], and for sends an optimistic
//! flavor that tries once inline before arming the asynchronous path.
//!
//! Asynchronous completions always fire with the socket's internal lock
//! released, so a completion callback may immediately arm the next
//! operation on the same socket. Closing a socket abandons pending
//! callbacks without invoking them.
//!
//! ```no_run
//! use socklane::addr::{Ipv4, SocketAddrV4};
//! use socklane::{NetworkStackId, StreamSocket};
//!
//! let socket = StreamSocket::<Ipv4>::new(None);
//! socket.open(NetworkStackId::DEFAULT)?;
//! socket.connect(&SocketAddrV4::loopback(7000))?;
//! let sent = socket.send_sync(b"ping")?;
//! # let _ = sent;
//! # Ok::<(), socklane::SocketError>(())
//! ```

pub mod addr;
pub mod error;
pub mod lock;
pub mod netstack;
mod os;
pub mod reactor;
pub mod socket;

pub use error::SocketError;
pub use lock::{StateLock, StateGuard};
pub use netstack::NetworkStackId;
pub use reactor::{EventCallback, EventMask, Reactor, RegistrationToken};
pub use socket::acceptor::{AcceptCompletion, Acceptor, AcceptorState};
pub use socket::base::SocketState;
pub use socket::options::{
	KeepAlive, Linger, ReceiveBufferSize, ReceiveTimeout, ReuseAddress, SendBufferSize,
	SendTimeout, SockOpt, TimeToLive,
};
pub use socket::stream::{
	ConnectCompletion, ConnectionState, SendOutcome, StreamSocket, SubmitError,
	TransferCompletion,
};
