//! The lock and unlock procedures.

use alloc::sync::Arc;
use core::cmp;

use crate::kernel;
use crate::resource::Resource;
use crate::task::Priority;
use crate::{Error, Result};

/// Acquires a globally shared resource under the spin protocol.
///
/// On return the caller owns the critical section of `res`, runs at its
/// spin priority, and is non-preemptible on its CPU until the matching
/// [`unlock`].
///
/// Fails if `res` is core-local or if the spin priority recorded via
/// [`set_spin_prio`](crate::set_spin_prio) is below the caller's current
/// scheduling priority. Contention never fails: the caller spins at its
/// spin priority, yielding between rounds, until admitted in FIFO order.
pub fn lock(res: &Arc<Resource>) -> Result<()> {
	if !res.is_global() {
		return Err(Error::NotGlobal);
	}

	let task = kernel::current_task();
	let base = task.priority();
	let spin = task.spin_priority();

	// A spin priority below the base priority would invert the
	// contention the assignment was computed for.
	if spin < base {
		return Err(Error::SpinPriorityTooLow);
	}

	task.set_waiting_res(Some(res.clone()));
	task.set_base_priority(base);
	task.set_cancelled(false);
	task.set_in_cs(false);
	debug_assert!(!task.is_enqueued());

	// Raise to the spin priority before the first queue interaction.
	kernel::set_priority(&task, spin);

	loop {
		// A preemption between rounds may have ejected us from the FIFO
		// and dropped us back to the base priority.
		if task.take_cancelled() {
			kernel::set_priority(&task, spin);
		}

		{
			let mut state = res.state();

			let admitted = if state.owner.is_none() {
				match state.peek_front() {
					// Empty queue: claim the head slot and enter.
					None => {
						state.enqueue_front(&task);
						true
					}
					Some(head) => Arc::ptr_eq(&head, &task),
				}
			} else {
				false
			};

			if admitted {
				state.remove(&task);
				state.owner = Some(task.clone());

				// The critical section runs with the scheduler locked, so
				// remote spinners wait for the section itself and not for
				// whatever else this CPU has to run.
				kernel::scheduler_lock();
				task.set_in_cs(true);

				trace!("Task {} acquired resource {}", task.id(), res.id());
				return Ok(());
			}

			state.enqueue_back(&task);
		}

		kernel::yield_now();
	}
}

/// Releases a globally shared resource acquired with [`lock`].
///
/// Remaining waiters are not signalled. They already spin at their spin
/// priorities and race for the free resource on their next scheduling
/// slot, which keeps the release O(1).
pub fn unlock(res: &Arc<Resource>) {
	debug_assert!(res.is_global());

	let task = kernel::current_task();
	debug_assert!(task.in_cs(), "unlock outside of a critical section");

	// Leave the non-preemptive section before giving up the resource.
	task.set_in_cs(false);
	kernel::scheduler_unlock();

	{
		let mut state = res.state();
		debug_assert!(
			state
				.owner
				.as_ref()
				.is_some_and(|owner| Arc::ptr_eq(owner, &task)),
			"unlocking a resource that is not owned"
		);
		state.owner = None;
	}

	kernel::set_priority(&task, task.base_priority());
	task.set_waiting_res(None);

	trace!("Task {} released resource {}", task.id(), res.id());
}

/// Acquires a core-local resource under the priority ceiling protocol.
///
/// The caller's priority is raised to `max(base, ceiling)` and the critical
/// section runs non-preemptively. No wait queue is involved: with all
/// contenders on one core, the ceiling alone serializes access.
pub fn local_lock(res: &Arc<Resource>, ceiling: Priority) -> Result<()> {
	if res.is_global() {
		return Err(Error::NotLocal);
	}

	let task = kernel::current_task();
	let base = task.priority();

	// Snapshot for the unlock; the ceiling is recorded per call.
	task.set_saved_priority(Some(base));
	kernel::set_priority(&task, cmp::max(base, ceiling));

	{
		let mut state = res.state();
		state.ceiling = ceiling;
		state.owner = Some(task.clone());
	}

	kernel::scheduler_lock();
	task.set_in_cs(true);

	trace!(
		"Task {} acquired local resource {} at ceiling {}",
		task.id(),
		res.id(),
		ceiling
	);
	Ok(())
}

/// Releases a core-local resource acquired with [`local_lock`].
pub fn local_unlock(res: &Arc<Resource>) {
	debug_assert!(!res.is_global());

	let task = kernel::current_task();
	debug_assert!(task.in_cs(), "unlock outside of a critical section");

	task.set_in_cs(false);
	kernel::scheduler_unlock();

	{
		let mut state = res.state();
		debug_assert!(
			state
				.owner
				.as_ref()
				.is_some_and(|owner| Arc::ptr_eq(owner, &task)),
			"unlocking a resource that is not owned"
		);
		state.owner = None;
	}

	// Prefer the snapshot taken on entry; without one, fall back to the
	// current priority.
	let restore = task
		.take_saved_priority()
		.unwrap_or_else(|| task.priority());
	kernel::set_priority(&task, restore);
}
