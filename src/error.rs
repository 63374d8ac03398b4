/// Closed error taxonomy surfaced by every public socket operation.
///
/// `ApiError` always means a locally detectable precondition violation by
/// the caller; it is never retried internally. `Busy` doubles as the
/// "spurious wakeup, ignore" signal inside the reactor handlers.
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
	#[error("operation invalid in current state: {0}")]
	ApiError(&'static str),

	#[error("operation would block, retry later")]
	Busy,

	#[error("peer separated or unreachable")]
	Disconnected,

	#[error("system resources exhausted: {}", errno_to_str(*errno))]
	Resource { errno: i32 },

	#[error("insufficient privileges")]
	InsufficientPrivileges,

	#[error("address invalid or already in use")]
	AddressError,

	#[error("address not available on this host")]
	AddressNotAvailable,

	#[error("system environment failure: {}", errno_to_str(*errno))]
	SystemEnvironment { errno: i32 },

	#[error("unexpected failure: {}", errno_to_str(*errno))]
	Unexpected { errno: i32 },
}

impl SocketError {
	/// True for errors that indicate the peer went away while the
	/// connection itself was established. Only these demote a stream
	/// socket to the dormant state.
	pub fn is_disconnect(&self) -> bool {
		matches!(self, SocketError::Disconnected)
	}
}

/// Returns current errno value.
#[inline]
pub fn errno() -> i32 {
	unsafe { *libc::__errno_location() }
}

/// Maps an errno value onto the closed taxonomy.
///
/// The mapping is identical for every syscall wrapper so callers see one
/// consistent kind regardless of which operation tripped it.
pub(crate) fn map_errno(errno: i32) -> SocketError {
	match errno {
		libc::EAGAIN | libc::EINPROGRESS | libc::EALREADY | libc::EINTR => SocketError::Busy,
		libc::ECONNREFUSED
		| libc::ECONNRESET
		| libc::ECONNABORTED
		| libc::EPIPE
		| libc::ENOTCONN
		| libc::ETIMEDOUT
		| libc::ENETUNREACH
		| libc::EHOSTUNREACH
		| libc::ENETDOWN => SocketError::Disconnected,
		libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM => {
			SocketError::Resource { errno }
		}
		libc::EACCES | libc::EPERM => SocketError::InsufficientPrivileges,
		libc::EADDRINUSE | libc::EINVAL => SocketError::AddressError,
		libc::EADDRNOTAVAIL | libc::EAFNOSUPPORT => SocketError::AddressNotAvailable,
		libc::EBADF | libc::ENOTSOCK | libc::EFAULT => SocketError::SystemEnvironment { errno },
		_ => SocketError::Unexpected { errno },
	}
}

/// Converts errno to human-readable string.
fn errno_to_str(errno: i32) -> String {
	match errno {
		libc::EACCES => "permission denied".into(),
		libc::EADDRINUSE => "address already in use".into(),
		libc::EADDRNOTAVAIL => "address not available".into(),
		libc::EAFNOSUPPORT => "address family not supported".into(),
		libc::EAGAIN => "resource temporarily unavailable".into(),
		libc::EBADF => "bad file descriptor".into(),
		libc::ECONNREFUSED => "connection refused".into(),
		libc::ECONNRESET => "connection reset by peer".into(),
		libc::EINPROGRESS => "operation in progress".into(),
		libc::EINTR => "interrupted by signal".into(),
		libc::EINVAL => "invalid argument".into(),
		libc::EMFILE => "too many open files".into(),
		libc::ENETUNREACH => "network unreachable".into(),
		libc::ENOBUFS => "no buffer space available".into(),
		libc::ENOMEM => "out of memory".into(),
		libc::ENOTCONN => "not connected".into(),
		libc::EPIPE => "broken pipe".into(),
		libc::ETIMEDOUT => "connection timed out".into(),
		_ => format!("errno {}", errno),
	}
}

/// Aborts the process on a programmer-contract violation.
///
/// Contract violations (re-entrant lock acquire, reactor dispatch in a
/// state that never arms observation, asynchronous calls with blocking
/// mode enabled) indicate a logic bug, not an environmental condition,
/// and must not be reported through the recoverable taxonomy.
pub(crate) fn fatal_contract_violation(what: &str) -> ! {
	log::error!("contract violation: {what}");
	eprintln!("socklane: contract violation: {what}");
	std::process::abort()
}
