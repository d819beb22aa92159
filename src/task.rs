//! Task-side protocol state.

use alloc::sync::Arc;
use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use hermit_sync::SpinMutex;
use intrusive_collections::{LinkedListAtomicLink, intrusive_adapter};

use crate::kernel;
use crate::resource::Resource;

/// Unique identifier for a task (i.e. `pid`).
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Copy)]
pub struct TaskId(i32);

impl TaskId {
	pub const fn into(self) -> i32 {
		self.0
	}

	pub const fn from(x: i32) -> Self {
		TaskId(x)
	}
}

impl fmt::Display for TaskId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Priority of a task
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Copy)]
pub struct Priority(u8);

impl Priority {
	pub const fn into(self) -> u8 {
		self.0
	}

	pub const fn from(x: u8) -> Self {
		Priority(x)
	}
}

impl fmt::Display for Priority {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Per-task protocol descriptor.
///
/// The host creates one of these per task control block, keeps it alive for
/// the task's lifetime, and hands out clones of the `Arc` through
/// [`KernelOps::current_task`](crate::KernelOps::current_task).
///
/// Everything below the identity is protocol state. It is written either by
/// the task itself or by [`on_preempt`](crate::on_preempt) while the task
/// is not running on any CPU. The wait-queue link is embedded here, so
/// enqueueing a waiter never allocates.
pub struct Task {
	id: TaskId,
	/// Mirror of the scheduling priority, kept current by every priority
	/// change the crate issues and read by the preemption hook.
	prio: AtomicU8,
	/// Link into the wait FIFO of at most one resource.
	link: LinkedListAtomicLink,
	/// The resource this task currently competes for.
	waiting_res: SpinMutex<Option<Arc<Resource>>>,
	/// Scheduling priority snapshotted on entry to `lock`.
	base_prio: AtomicU8,
	/// Spin-priority register, written by `set_spin_prio`.
	spin_prio: AtomicU8,
	/// Priority snapshot of the local PCP variant.
	saved_prio: SpinMutex<Option<Priority>>,
	in_cs: AtomicBool,
	enqueued: AtomicBool,
	cancelled: AtomicBool,
}

intrusive_adapter!(pub(crate) WaitListAdapter = Arc<Task>: Task { link: LinkedListAtomicLink });

impl Task {
	/// Creates the descriptor for a task currently scheduled at `prio`.
	pub fn new(id: TaskId, prio: Priority) -> Task {
		Task {
			id,
			prio: AtomicU8::new(prio.into()),
			link: LinkedListAtomicLink::new(),
			waiting_res: SpinMutex::new(None),
			base_prio: AtomicU8::new(0),
			spin_prio: AtomicU8::new(0),
			saved_prio: SpinMutex::new(None),
			in_cs: AtomicBool::new(false),
			enqueued: AtomicBool::new(false),
			cancelled: AtomicBool::new(false),
		}
	}

	#[inline]
	pub fn id(&self) -> TaskId {
		self.id
	}

	/// The task's current scheduling priority.
	#[inline]
	pub fn priority(&self) -> Priority {
		Priority::from(self.prio.load(Ordering::SeqCst))
	}

	pub(crate) fn store_priority(&self, prio: Priority) {
		self.prio.store(prio.into(), Ordering::SeqCst);
	}

	/// The spin priority this task will contend with on its next `lock`.
	#[inline]
	pub fn spin_priority(&self) -> Priority {
		Priority::from(self.spin_prio.load(Ordering::SeqCst))
	}

	pub(crate) fn set_spin_priority(&self, prio: Priority) {
		self.spin_prio.store(prio.into(), Ordering::SeqCst);
	}

	/// The base priority snapshotted at the start of the current episode.
	#[inline]
	pub fn base_priority(&self) -> Priority {
		Priority::from(self.base_prio.load(Ordering::SeqCst))
	}

	pub(crate) fn set_base_priority(&self, prio: Priority) {
		self.base_prio.store(prio.into(), Ordering::SeqCst);
	}

	/// Whether the task is between critical-section entry and release.
	#[inline]
	pub fn in_cs(&self) -> bool {
		self.in_cs.load(Ordering::SeqCst)
	}

	pub(crate) fn set_in_cs(&self, in_cs: bool) {
		self.in_cs.store(in_cs, Ordering::SeqCst);
	}

	/// Whether the task is linked into some resource's wait FIFO.
	#[inline]
	pub fn is_enqueued(&self) -> bool {
		self.enqueued.load(Ordering::SeqCst)
	}

	pub(crate) fn set_enqueued(&self, enqueued: bool) {
		self.enqueued.store(enqueued, Ordering::SeqCst);
	}

	/// Whether the preemption hook has ejected this task from a wait FIFO
	/// since the task last retried.
	#[inline]
	pub fn cancelled(&self) -> bool {
		self.cancelled.load(Ordering::SeqCst)
	}

	pub(crate) fn set_cancelled(&self, cancelled: bool) {
		self.cancelled.store(cancelled, Ordering::SeqCst);
	}

	/// Clears the cancellation mark, returning whether it was set.
	pub(crate) fn take_cancelled(&self) -> bool {
		self.cancelled.swap(false, Ordering::SeqCst)
	}

	/// The resource this task currently waits for, if any.
	pub fn waiting_res(&self) -> Option<Arc<Resource>> {
		self.waiting_res.lock().clone()
	}

	pub(crate) fn set_waiting_res(&self, res: Option<Arc<Resource>>) {
		*self.waiting_res.lock() = res;
	}

	pub(crate) fn set_saved_priority(&self, prio: Option<Priority>) {
		*self.saved_prio.lock() = prio;
	}

	pub(crate) fn take_saved_priority(&self) -> Option<Priority> {
		self.saved_prio.lock().take()
	}
}

/// Records the spin priority the calling task will contend with on its next
/// [`lock`](crate::lock). The value is stored in the task itself, survives
/// suspensions, and is consulted exactly once per `lock` call.
pub fn set_spin_prio(prio: Priority) {
	kernel::current_task().set_spin_priority(prio);
}

/// Reads back the calling task's spin-priority register.
pub fn get_spin_prio() -> Priority {
	kernel::current_task().spin_priority()
}
