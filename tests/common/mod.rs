//! Shared test harness: a minimal epoll-backed reactor implementing the
//! readiness contract the socket state machines consume, plus small
//! polling helpers.
#![allow(dead_code)]

use std::collections::HashMap;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use socklane::{EventCallback, EventMask, Reactor, RegistrationToken, SocketError};

struct Entry {
	fd: RawFd,
	mask: EventMask,
	/// Taken out of the map for the duration of an invocation, so the
	/// callback may re-enter the reactor (re-arm, unregister) freely.
	callback: Option<EventCallback>,
	in_epoll: bool,
	in_use: bool,
	unregistered: bool,
	close_on_finish: bool,
}

/// Level-triggered epoll reactor with one background dispatch thread.
///
/// The dispatch thread holds only a weak reference; it exits once the
/// last test handle is dropped.
pub struct TestReactor {
	epfd: RawFd,
	entries: Mutex<HashMap<u64, Entry>>,
	next: AtomicU64,
}

impl TestReactor {
	pub fn spawn() -> Arc<Self> {
		let epfd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
		assert_ne!(epfd, -1, "epoll_create1 failed");
		let reactor = Arc::new(Self {
			epfd,
			entries: Mutex::new(HashMap::new()),
			next: AtomicU64::new(1),
		});
		let weak = Arc::downgrade(&reactor);
		thread::spawn(move || {
			while let Some(reactor) = weak.upgrade() {
				reactor.poll_once(50);
			}
		});
		reactor
	}

	fn poll_once(&self, timeout_ms: i32) {
		let mut events = [libc::epoll_event { events: 0, u64: 0 }; 16];
		let n = unsafe {
			libc::epoll_wait(self.epfd, events.as_mut_ptr(), events.len() as i32, timeout_ms)
		};
		if n <= 0 {
			return;
		}
		for ev in &events[..n as usize] {
			let token = ev.u64;
			let ready = readiness(ev.events);
			self.dispatch(token, ready);
		}
	}

	fn dispatch(&self, token: u64, ready: EventMask) {
		let (mut callback, deliver) = {
			let mut entries = self.entries.lock().unwrap();
			let Some(entry) = entries.get_mut(&token) else {
				return;
			};
			if entry.unregistered {
				return;
			}
			let deliver = ready & entry.mask;
			if deliver.is_empty() {
				return;
			}
			let Some(callback) = entry.callback.take() else {
				return;
			};
			entry.in_use = true;
			(callback, deliver)
		};

		callback(deliver);

		let mut entries = self.entries.lock().unwrap();
		if let Some(entry) = entries.get_mut(&token) {
			entry.in_use = false;
			if entry.unregistered {
				let entry = entries.remove(&token).unwrap();
				if entry.close_on_finish {
					unsafe { libc::close(entry.fd) };
				}
			} else {
				entry.callback = Some(callback);
			}
		}
	}

	/// Keeps the epoll interest set in sync with the entry's mask. An
	/// empty mask means the fd leaves the interest set entirely, so
	/// always-reported conditions (HUP, ERR) cannot spin the loop.
	fn sync_interest(&self, token: u64, entry: &mut Entry) {
		let mut ev = libc::epoll_event {
			events: interest(entry.mask),
			u64: token,
		};
		unsafe {
			if entry.mask.is_empty() {
				if entry.in_epoll {
					libc::epoll_ctl(self.epfd, libc::EPOLL_CTL_DEL, entry.fd, &mut ev);
					entry.in_epoll = false;
				}
			} else if entry.in_epoll {
				libc::epoll_ctl(self.epfd, libc::EPOLL_CTL_MOD, entry.fd, &mut ev);
			} else {
				libc::epoll_ctl(self.epfd, libc::EPOLL_CTL_ADD, entry.fd, &mut ev);
				entry.in_epoll = true;
			}
		}
	}
}

impl Reactor for TestReactor {
	fn register(
		&self,
		handle: RawFd,
		initial: EventMask,
		callback: EventCallback,
	) -> Result<RegistrationToken, SocketError> {
		let token = self.next.fetch_add(1, Ordering::Relaxed);
		let mut entry = Entry {
			fd: handle,
			mask: initial,
			callback: Some(callback),
			in_epoll: false,
			in_use: false,
			unregistered: false,
			close_on_finish: false,
		};
		self.sync_interest(token, &mut entry);
		self.entries.lock().unwrap().insert(token, entry);
		Ok(RegistrationToken(token))
	}

	fn unregister(&self, token: RegistrationToken, close_handle: bool) {
		let mut entries = self.entries.lock().unwrap();
		let Some(entry) = entries.get_mut(&token.0) else {
			return;
		};
		entry.mask = EventMask::empty();
		let fd = entry.fd;
		if entry.in_epoll {
			let mut ev = libc::epoll_event { events: 0, u64: 0 };
			unsafe { libc::epoll_ctl(self.epfd, libc::EPOLL_CTL_DEL, fd, &mut ev) };
			entry.in_epoll = false;
		}
		if entry.in_use {
			// a callback is mid-flight on the dispatch thread; it
			// finishes the removal (and the close) when it returns
			entry.unregistered = true;
			entry.close_on_finish = close_handle;
		} else {
			entries.remove(&token.0);
			if close_handle {
				unsafe { libc::close(fd) };
			}
		}
	}

	fn add_monitored_events(&self, token: RegistrationToken, events: EventMask) {
		let mut entries = self.entries.lock().unwrap();
		if let Some(entry) = entries.get_mut(&token.0) {
			if !entry.unregistered {
				entry.mask |= events;
				self.sync_interest(token.0, entry);
			}
		}
	}

	fn remove_monitored_events(&self, token: RegistrationToken, events: EventMask) {
		let mut entries = self.entries.lock().unwrap();
		if let Some(entry) = entries.get_mut(&token.0) {
			if !entry.unregistered {
				entry.mask -= events;
				self.sync_interest(token.0, entry);
			}
		}
	}

	fn is_in_use(&self, token: RegistrationToken) -> bool {
		self.entries
			.lock()
			.unwrap()
			.get(&token.0)
			.is_some_and(|e| e.in_use)
	}
}

impl Drop for TestReactor {
	fn drop(&mut self) {
		unsafe { libc::close(self.epfd) };
	}
}

fn interest(mask: EventMask) -> u32 {
	let mut events = 0u32;
	if mask.contains(EventMask::READ) {
		events |= libc::EPOLLIN as u32;
	}
	if mask.contains(EventMask::WRITE) {
		events |= libc::EPOLLOUT as u32;
	}
	events
}

/// HUP and ERR are reported unconditionally by epoll; fold them into
/// both directions and let the per-entry mask select what is delivered.
fn readiness(events: u32) -> EventMask {
	let fault = events & (libc::EPOLLERR as u32 | libc::EPOLLHUP as u32) != 0;
	let mut mask = EventMask::empty();
	if fault || events & libc::EPOLLIN as u32 != 0 {
		mask |= EventMask::READ;
	}
	if fault || events & libc::EPOLLOUT as u32 != 0 {
		mask |= EventMask::WRITE;
	}
	mask
}

/// Polls `cond` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
	let deadline = Instant::now() + timeout;
	loop {
		if cond() {
			return true;
		}
		if Instant::now() >= deadline {
			return false;
		}
		thread::sleep(Duration::from_millis(5));
	}
}
