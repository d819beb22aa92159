//! Resource descriptors and the wait-queue discipline.

use alloc::sync::Arc;

use intrusive_collections::LinkedList;

use crate::synch::spinlock::{SpinlockIrqSave, SpinlockIrqSaveGuard};
use crate::task::{Priority, Task, WaitListAdapter};

/// A shared resource arbitrated by the protocol.
///
/// Descriptors are created once during system initialization and stay alive
/// for the lifetime of the system. The `id` serves debugging and log output
/// only; it is never interpreted.
pub struct Resource {
	id: u32,
	is_global: bool,
	state: SpinlockIrqSave<ResourceState>,
}

/// Owner, wait FIFO, and PCP ceiling, guarded by the resource's short lock.
///
/// The FIFO is intrusive: waiters are linked through the node embedded in
/// their [`Task`] descriptor, so a wait never allocates and a task can sit
/// in at most one queue.
pub(crate) struct ResourceState {
	pub(crate) owner: Option<Arc<Task>>,
	fifo: LinkedList<WaitListAdapter>,
	pub(crate) ceiling: Priority,
}

impl Resource {
	/// Creates a resource descriptor.
	///
	/// Globally shared resources (`is_global`) are arbitrated by the spin
	/// protocol ([`lock`](crate::lock)/[`unlock`](crate::unlock)). Resources
	/// whose contenders all live on one core use the local PCP variant
	/// ([`local_lock`](crate::local_lock)/[`local_unlock`](crate::local_unlock)).
	pub fn new(id: u32, is_global: bool) -> Arc<Resource> {
		debug!(
			"Creating {} resource {}",
			if is_global { "global" } else { "core-local" },
			id
		);

		Arc::new(Resource {
			id,
			is_global,
			state: SpinlockIrqSave::new(ResourceState {
				owner: None,
				fifo: LinkedList::new(WaitListAdapter::new()),
				ceiling: Priority::from(0),
			}),
		})
	}

	#[inline]
	pub fn id(&self) -> u32 {
		self.id
	}

	#[inline]
	pub fn is_global(&self) -> bool {
		self.is_global
	}

	/// Acquires the short lock and returns the guarded state.
	pub(crate) fn state(&self) -> SpinlockIrqSaveGuard<'_, ResourceState> {
		self.state.lock()
	}

	/// The task currently inside the critical section, if any.
	pub fn owner(&self) -> Option<Arc<Task>> {
		self.state.lock().owner.clone()
	}

	/// Whether any task is linked into the wait FIFO.
	pub fn has_waiters(&self) -> bool {
		!self.state.lock().fifo.is_empty()
	}

	/// Number of tasks linked into the wait FIFO.
	pub fn waiter_count(&self) -> usize {
		self.state.lock().fifo.iter().count()
	}

	/// The ceiling recorded by the last local PCP acquisition.
	pub fn ceiling(&self) -> Priority {
		self.state.lock().ceiling
	}
}

impl ResourceState {
	/// Links `task` at the tail of the wait FIFO. No-op if the task is
	/// already linked somewhere.
	pub(crate) fn enqueue_back(&mut self, task: &Arc<Task>) {
		if !task.is_enqueued() {
			self.fifo.push_back(task.clone());
			task.set_enqueued(true);
		}
	}

	/// Links `task` at the head of the wait FIFO. No-op if the task is
	/// already linked somewhere. Claims an empty queue without racing with
	/// a concurrent inserter.
	pub(crate) fn enqueue_front(&mut self, task: &Arc<Task>) {
		if !task.is_enqueued() {
			self.fifo.push_front(task.clone());
			task.set_enqueued(true);
		}
	}

	/// Unlinks `task` from the wait FIFO. No-op if it is not linked.
	pub(crate) fn remove(&mut self, task: &Arc<Task>) {
		if !task.is_enqueued() {
			return;
		}

		let mut cursor = self.fifo.front_mut();
		while let Some(waiter) = cursor.get() {
			if waiter.id() == task.id() {
				cursor.remove();
				task.set_enqueued(false);
				return;
			}

			cursor.move_next();
		}
	}

	/// The task at the head of the wait FIFO, if any.
	pub(crate) fn peek_front(&self) -> Option<Arc<Task>> {
		self.fifo.front().clone_pointer()
	}
}
