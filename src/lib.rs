//! Finite-resource-aware spin protocol (FRAP).
//!
//! FRAP arbitrates access to a fixed set of coarse-grained resources shared
//! between tasks of a preemptive, priority-based, multi-core kernel. Every
//! contender spins at a statically assigned *spin priority*, a spinner is
//! ejected from the wait queue as soon as a strictly-higher-priority task
//! arrives on its CPU, and a task that enters its critical section runs
//! non-preemptively on its own core until release, which bounds the remote
//! blocking seen by other cores to the critical-section length.
//!
//! The crate contains the protocol core only. The host kernel keeps its own
//! scheduler, task control blocks, and context switching and connects them
//! through [`KernelOps`], registered once via [`init`]. Per task the host
//! creates one [`Task`] descriptor; per shared resource one [`Resource`].
//! Afterwards the protocol is driven with [`lock`]/[`unlock`] for globally
//! shared resources, [`local_lock`]/[`local_unlock`] for resources confined
//! to one core, the per-task spin-priority register
//! [`set_spin_prio`]/[`get_spin_prio`], and the scheduler callback
//! [`on_preempt`].

#![cfg_attr(not(test), no_std)]

extern crate alloc;
#[macro_use]
extern crate log;

use core::result;

mod hook;
mod kernel;
mod protocol;
mod resource;
mod synch;
mod task;

pub use crate::hook::on_preempt;
pub use crate::kernel::{KernelOps, init};
pub use crate::protocol::{local_lock, local_unlock, lock, unlock};
pub use crate::resource::Resource;
pub use crate::task::{Priority, Task, TaskId, get_spin_prio, set_spin_prio};

/// Errors returned by the protocol entry points.
///
/// All variants indicate caller misuse; the protocol has no transient
/// failures, and contention is absorbed inside [`lock`] itself.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
	/// A spin-protocol operation was applied to a core-local resource.
	#[error("resource is core-local")]
	NotGlobal,
	/// A local-PCP operation was applied to a globally shared resource.
	#[error("resource is globally shared")]
	NotLocal,
	/// The recorded spin priority is below the caller's scheduling priority.
	#[error("spin priority below base priority")]
	SpinPriorityTooLow,
	/// The host kernel interface was registered twice.
	#[error("host kernel interface already registered")]
	AlreadyInitialized,
}

pub type Result<T> = result::Result<T, Error>;
