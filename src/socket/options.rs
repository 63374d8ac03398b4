//! Typed socket options.
//!
//! Each option type knows its level/name pair and how to encode itself
//! into the raw buffer `getsockopt`/`setsockopt` expect. The generic
//! `get_option`/`set_option` pair on the base socket works for any of
//! them; adding an option means adding one impl here.

use std::time::Duration;

/// A typed view over one raw OS socket option.
pub trait SockOpt: Sized {
	/// Plain-old-data representation handed to the syscall.
	type Raw: Copy;

	const LEVEL: libc::c_int;
	const NAME: libc::c_int;

	fn to_raw(&self) -> Self::Raw;
	fn from_raw(raw: Self::Raw) -> Self;
}

fn bool_to_int(v: bool) -> libc::c_int {
	if v { 1 } else { 0 }
}

/// SO_REUSEADDR — allows binding an address still in TIME_WAIT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReuseAddress(pub bool);

impl SockOpt for ReuseAddress {
	type Raw = libc::c_int;
	const LEVEL: libc::c_int = libc::SOL_SOCKET;
	const NAME: libc::c_int = libc::SO_REUSEADDR;

	fn to_raw(&self) -> Self::Raw {
		bool_to_int(self.0)
	}

	fn from_raw(raw: Self::Raw) -> Self {
		Self(raw != 0)
	}
}

/// SO_KEEPALIVE — kernel probes on idle connections to detect dead peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAlive(pub bool);

impl SockOpt for KeepAlive {
	type Raw = libc::c_int;
	const LEVEL: libc::c_int = libc::SOL_SOCKET;
	const NAME: libc::c_int = libc::SO_KEEPALIVE;

	fn to_raw(&self) -> Self::Raw {
		bool_to_int(self.0)
	}

	fn from_raw(raw: Self::Raw) -> Self {
		Self(raw != 0)
	}
}

/// SO_RCVBUF — kernel receive buffer size. The kernel doubles the value
/// it stores, so a read-back returns twice what was set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveBufferSize(pub libc::c_int);

impl SockOpt for ReceiveBufferSize {
	type Raw = libc::c_int;
	const LEVEL: libc::c_int = libc::SOL_SOCKET;
	const NAME: libc::c_int = libc::SO_RCVBUF;

	fn to_raw(&self) -> Self::Raw {
		self.0
	}

	fn from_raw(raw: Self::Raw) -> Self {
		Self(raw)
	}
}

/// SO_SNDBUF — kernel send buffer size. Same doubling note as
/// [`ReceiveBufferSize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendBufferSize(pub libc::c_int);

impl SockOpt for SendBufferSize {
	type Raw = libc::c_int;
	const LEVEL: libc::c_int = libc::SOL_SOCKET;
	const NAME: libc::c_int = libc::SO_SNDBUF;

	fn to_raw(&self) -> Self::Raw {
		self.0
	}

	fn from_raw(raw: Self::Raw) -> Self {
		Self(raw)
	}
}

/// IP_TTL — hop limit for outgoing packets. Stored verbatim by the
/// kernel, so this is the signed-integer option that round-trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeToLive(pub libc::c_int);

impl SockOpt for TimeToLive {
	type Raw = libc::c_int;
	const LEVEL: libc::c_int = libc::IPPROTO_IP;
	const NAME: libc::c_int = libc::IP_TTL;

	fn to_raw(&self) -> Self::Raw {
		self.0
	}

	fn from_raw(raw: Self::Raw) -> Self {
		Self(raw)
	}
}

/// SO_LINGER — close() behavior with unsent data.
///
/// `None` is the default (background flush), `Some(0)` hard-resets,
/// `Some(n)` blocks close up to n seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Linger(pub Option<u32>);

impl SockOpt for Linger {
	type Raw = libc::linger;
	const LEVEL: libc::c_int = libc::SOL_SOCKET;
	const NAME: libc::c_int = libc::SO_LINGER;

	fn to_raw(&self) -> Self::Raw {
		match self.0 {
			None => libc::linger {
				l_onoff: 0,
				l_linger: 0,
			},
			Some(seconds) => libc::linger {
				l_onoff: 1,
				l_linger: seconds as libc::c_int,
			},
		}
	}

	fn from_raw(raw: Self::Raw) -> Self {
		if raw.l_onoff == 0 {
			Self(None)
		} else {
			Self(Some(raw.l_linger as u32))
		}
	}
}

fn duration_to_timeval(d: Duration) -> libc::timeval {
	libc::timeval {
		tv_sec: d.as_secs() as libc::time_t,
		tv_usec: d.subsec_micros() as libc::suseconds_t,
	}
}

fn timeval_to_duration(tv: libc::timeval) -> Duration {
	Duration::new(tv.tv_sec as u64, tv.tv_usec as u32 * 1_000)
}

/// SO_RCVTIMEO — bound on how long a blocking receive waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveTimeout(pub Duration);

impl SockOpt for ReceiveTimeout {
	type Raw = libc::timeval;
	const LEVEL: libc::c_int = libc::SOL_SOCKET;
	const NAME: libc::c_int = libc::SO_RCVTIMEO;

	fn to_raw(&self) -> Self::Raw {
		duration_to_timeval(self.0)
	}

	fn from_raw(raw: Self::Raw) -> Self {
		Self(timeval_to_duration(raw))
	}
}

/// SO_SNDTIMEO — bound on how long a blocking send waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendTimeout(pub Duration);

impl SockOpt for SendTimeout {
	type Raw = libc::timeval;
	const LEVEL: libc::c_int = libc::SOL_SOCKET;
	const NAME: libc::c_int = libc::SO_SNDTIMEO;

	fn to_raw(&self) -> Self::Raw {
		duration_to_timeval(self.0)
	}

	fn from_raw(raw: Self::Raw) -> Self {
		Self(timeval_to_duration(raw))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn linger_encoding() {
		let off = Linger(None).to_raw();
		assert_eq!(off.l_onoff, 0);

		let hard = Linger(Some(0)).to_raw();
		assert_eq!(hard.l_onoff, 1);
		assert_eq!(hard.l_linger, 0);

		assert_eq!(Linger::from_raw(Linger(Some(30)).to_raw()), Linger(Some(30)));
	}

	#[test]
	fn timeval_round_trip() {
		let d = Duration::from_millis(1_500);
		let tv = duration_to_timeval(d);
		assert_eq!(tv.tv_sec, 1);
		assert_eq!(tv.tv_usec, 500_000);
		assert_eq!(timeval_to_duration(tv), d);
	}

	#[test]
	fn bool_encoding() {
		assert_eq!(ReuseAddress(true).to_raw(), 1);
		assert_eq!(ReuseAddress::from_raw(0), ReuseAddress(false));
		assert_eq!(KeepAlive::from_raw(5), KeepAlive(true));
	}
}
