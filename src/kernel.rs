//! Interface to the host kernel.
//!
//! The protocol core never touches scheduler internals directly. The host
//! registers a [`KernelOps`] implementation once at boot and the core
//! reaches the scheduler exclusively through it.

use alloc::sync::Arc;

use hermit_sync::OnceCell;

use crate::task::{Priority, Task};
use crate::{Error, Result};

/// The operations the protocol core needs from the host kernel.
///
/// All methods are invoked from task context, except that
/// [`set_priority`](KernelOps::set_priority) may additionally run on the
/// host's context-switch path via [`on_preempt`](crate::on_preempt), where
/// the task in question is not running on any CPU.
pub trait KernelOps: Send + Sync {
	/// Returns the task running on the current CPU.
	fn current_task(&self) -> Arc<Task>;

	/// Makes a priority change visible to the scheduler.
	///
	/// The descriptor's own priority field is already updated when this is
	/// called; the host only has to requeue the task if necessary.
	fn set_priority(&self, task: &Arc<Task>, prio: Priority);

	/// Enters a non-preemptive section on the current CPU. Nests.
	fn scheduler_lock(&self);

	/// Leaves the innermost non-preemptive section on the current CPU.
	fn scheduler_unlock(&self);

	/// Yields the current CPU cooperatively.
	fn yield_now(&self);

	/// Masks interrupts on the current CPU and returns the previous state.
	fn irq_save(&self) -> bool;

	/// Restores the interrupt state returned by
	/// [`irq_save`](KernelOps::irq_save).
	fn irq_restore(&self, was_enabled: bool);
}

static KERNEL: OnceCell<&'static dyn KernelOps> = OnceCell::new();

/// Registers the host kernel interface.
///
/// Must be called exactly once, before any other operation of this crate.
pub fn init(ops: &'static dyn KernelOps) -> Result<()> {
	KERNEL.set(ops).map_err(|_| Error::AlreadyInitialized)
}

#[inline]
pub(crate) fn ops() -> &'static dyn KernelOps {
	*KERNEL.get().expect("no host kernel interface registered")
}

#[inline]
pub(crate) fn current_task() -> Arc<Task> {
	ops().current_task()
}

/// Changes a task's scheduling priority, keeping the descriptor's mirror
/// current before the scheduler can observe the change.
pub(crate) fn set_priority(task: &Arc<Task>, prio: Priority) {
	task.store_priority(prio);
	ops().set_priority(task, prio);
}

#[inline]
pub(crate) fn scheduler_lock() {
	ops().scheduler_lock();
}

#[inline]
pub(crate) fn scheduler_unlock() {
	ops().scheduler_unlock();
}

#[inline]
pub(crate) fn yield_now() {
	ops().yield_now();
}

#[inline]
pub(crate) fn irq_save() -> bool {
	ops().irq_save()
}

#[inline]
pub(crate) fn irq_restore(was_enabled: bool) {
	ops().irq_restore(was_enabled);
}
