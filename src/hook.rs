//! Scheduler preemption hook.

use alloc::sync::Arc;

use crate::kernel;
use crate::task::Task;

/// Called by the host scheduler on every context-switch decision, with the
/// outgoing and the incoming task of the CPU making the switch.
///
/// If the outgoing task is spinning in some resource's wait FIFO and the
/// incoming task has a strictly higher priority, the spinner is unlinked,
/// marked cancelled, and dropped back to its base priority; it rejoins the
/// queue the next time it is scheduled. Critical-section owners are never
/// touched. Runs with preemption already disabled by the host.
pub fn on_preempt(old: Option<&Arc<Task>>, new: Option<&Arc<Task>>) {
	let (Some(old), Some(new)) = (old, new) else {
		return;
	};

	// Only a strictly-higher-priority arrival cancels a spinner.
	if new.priority() <= old.priority() {
		return;
	}

	// Nothing to cancel, or the outgoing task owns a critical section and
	// must not be disturbed.
	if !old.is_enqueued() || old.in_cs() {
		return;
	}

	let Some(res) = old.waiting_res() else {
		return;
	};

	{
		let mut state = res.state();
		if old.is_enqueued() {
			state.remove(old);
			old.set_cancelled(true);
		}
	}

	// Back at the base priority the ejected spinner re-enters the ready
	// queue without preempting anyone itself.
	kernel::set_priority(old, old.base_priority());

	debug!(
		"Preempt: task {} (spin {} -> base {}) cancelled by task {} on resource {}",
		old.id(),
		old.spin_priority(),
		old.base_priority(),
		new.id(),
		res.id()
	);
}
