use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_utils::{Backoff, CachePadded};

use crate::kernel;

/// This type provides a lock based on busy waiting to realize mutual
/// exclusion of short critical sections.
///
/// # Description
///
/// This structure behaves a lot like a normal Mutex. There are some
/// differences:
///
/// - Interrupts are masked while the lock is held; the previous state is
///   restored through the host kernel when the guard is dropped.
/// - By using busy waiting, it can be used outside the runtime.
/// - It is a so called ticket lock (<https://en.wikipedia.org/wiki/Ticket_lock>)
///   and completely fair.
///
/// Hold times must stay short and bounded; nothing that blocks or yields
/// may run under the guard.
pub(crate) struct SpinlockIrqSave<T: ?Sized> {
	queue: CachePadded<AtomicUsize>,
	dequeue: CachePadded<AtomicUsize>,
	data: UnsafeCell<T>,
}

/// A guard to which the protected data can be accessed
///
/// When the guard falls out of scope it will release the lock.
pub(crate) struct SpinlockIrqSaveGuard<'a, T: ?Sized> {
	dequeue: &'a CachePadded<AtomicUsize>,
	ticket: usize,
	irq: bool,
	data: &'a mut T,
}

// Same unsafe impls as `SpinlockIrqSave`
unsafe impl<T: ?Sized + Send> Sync for SpinlockIrqSave<T> {}
unsafe impl<T: ?Sized + Send> Send for SpinlockIrqSave<T> {}

impl<T> SpinlockIrqSave<T> {
	pub const fn new(user_data: T) -> SpinlockIrqSave<T> {
		SpinlockIrqSave {
			queue: CachePadded::new(AtomicUsize::new(0)),
			dequeue: CachePadded::new(AtomicUsize::new(1)),
			data: UnsafeCell::new(user_data),
		}
	}
}

impl<T: ?Sized> SpinlockIrqSave<T> {
	pub fn lock(&self) -> SpinlockIrqSaveGuard<'_, T> {
		let irq = kernel::irq_save();
		let backoff = Backoff::new();
		let ticket = self.queue.fetch_add(1, Ordering::Relaxed) + 1;

		while self.dequeue.load(Ordering::Acquire) != ticket {
			backoff.spin();
		}

		SpinlockIrqSaveGuard {
			dequeue: &self.dequeue,
			ticket,
			irq,
			data: unsafe { &mut *self.data.get() },
		}
	}
}

impl<T: ?Sized> Deref for SpinlockIrqSaveGuard<'_, T> {
	type Target = T;

	fn deref(&self) -> &T {
		&*self.data
	}
}

impl<T: ?Sized> DerefMut for SpinlockIrqSaveGuard<'_, T> {
	fn deref_mut(&mut self) -> &mut T {
		&mut *self.data
	}
}

impl<T: ?Sized> Drop for SpinlockIrqSaveGuard<'_, T> {
	/// The dropping of the SpinlockIrqSaveGuard will release the lock it
	/// was created from and restore the interrupt state.
	fn drop(&mut self) {
		self.dequeue.store(self.ticket + 1, Ordering::Release);
		kernel::irq_restore(self.irq);
	}
}
