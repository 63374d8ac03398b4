use std::cell::{Cell, UnsafeCell};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::error::fatal_contract_violation;

/// Identifies the calling thread with a process-unique token.
///
/// Token 0 is reserved for "no owner".
fn thread_token() -> u64 {
	static NEXT: AtomicU64 = AtomicU64::new(1);
	thread_local! {
		static TOKEN: Cell<u64> = const { Cell::new(0) };
	}
	TOKEN.with(|t| {
		let mut v = t.get();
		if v == 0 {
			v = NEXT.fetch_add(1, Ordering::Relaxed);
			t.set(v);
		}
		v
	})
}

/// Mutual exclusion around per-socket state that additionally tracks the
/// owning thread.
///
/// Re-entrant acquisition and release by a non-owner abort the process:
/// both indicate a logic bug in the lock discipline between user calls
/// and reactor callbacks, and continuing would corrupt the state machine.
pub struct StateLock<T> {
	owner: AtomicU64,
	mutex: Mutex<()>,
	value: UnsafeCell<T>,
}

// The value is only reachable through the guard, which holds the mutex.
unsafe impl<T: Send> Send for StateLock<T> {}
unsafe impl<T: Send> Sync for StateLock<T> {}

impl<T> StateLock<T> {
	pub fn new(value: T) -> Self {
		Self {
			owner: AtomicU64::new(0),
			mutex: Mutex::new(()),
			value: UnsafeCell::new(value),
		}
	}

	/// Acquires the lock, aborting if the calling thread already holds it.
	pub fn lock(&self) -> StateGuard<'_, T> {
		let me = thread_token();
		if self.owner.load(Ordering::Acquire) == me {
			fatal_contract_violation("re-entrant StateLock acquisition");
		}
		let inner = match self.mutex.lock() {
			Ok(g) => g,
			// A poisoned flag only means some thread panicked while
			// holding the lock; the owner bookkeeping below stays valid.
			Err(poisoned) => poisoned.into_inner(),
		};
		self.owner.store(me, Ordering::Release);
		StateGuard {
			lock: self,
			token: me,
			_inner: inner,
		}
	}
}

/// Guard returned by [`StateLock::lock`]. Releases on drop, verifying
/// that the releasing thread is the owner.
pub struct StateGuard<'a, T> {
	lock: &'a StateLock<T>,
	token: u64,
	_inner: MutexGuard<'a, ()>,
}

impl<T> Deref for StateGuard<'_, T> {
	type Target = T;

	fn deref(&self) -> &T {
		unsafe { &*self.lock.value.get() }
	}
}

impl<T> DerefMut for StateGuard<'_, T> {
	fn deref_mut(&mut self) -> &mut T {
		unsafe { &mut *self.lock.value.get() }
	}
}

impl<T> Drop for StateGuard<'_, T> {
	fn drop(&mut self) {
		if self.lock.owner.load(Ordering::Acquire) != self.token {
			fatal_contract_violation("StateLock released by a non-owner thread");
		}
		self.lock.owner.store(0, Ordering::Release);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Arc;
	use std::thread;

	#[test]
	fn serializes_concurrent_mutation() {
		let lock = Arc::new(StateLock::new(0u64));
		let mut handles = Vec::new();
		for _ in 0..4 {
			let lock = Arc::clone(&lock);
			handles.push(thread::spawn(move || {
				for _ in 0..10_000 {
					*lock.lock() += 1;
				}
			}));
		}
		for h in handles {
			h.join().unwrap();
		}
		assert_eq!(*lock.lock(), 40_000);
	}

	#[test]
	fn sequential_reacquire_from_same_thread_is_fine() {
		let lock = StateLock::new(7);
		{
			let g = lock.lock();
			assert_eq!(*g, 7);
		}
		let g = lock.lock();
		assert_eq!(*g, 7);
	}

	#[test]
	fn tokens_are_distinct_across_threads() {
		let a = thread_token();
		let b = thread::spawn(thread_token).join().unwrap();
		assert_ne!(a, 0);
		assert_ne!(b, 0);
		assert_ne!(a, b);
	}
}
