//! Common code for integration tests.
//!
//! A minimal simulated host kernel: every test thread plays the role of one
//! task on its own CPU. The current task is a thread-local binding,
//! priority changes are recorded per task, the scheduler lock is a per-task
//! nesting counter, and the cooperative yield can be gated per task so a
//! test can catch a spinner while it is off the CPU.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Condvar, Mutex, OnceLock};
use std::thread;
use std::time::Duration;

use frap::{KernelOps, Priority, Task, TaskId};

thread_local! {
	static CURRENT: RefCell<Option<Arc<Task>>> = const { RefCell::new(None) };
}

#[derive(Default)]
struct YieldGate {
	/// Tasks whose next yield parks until released.
	held: HashSet<i32>,
	/// Tasks currently parked inside a yield.
	parked: HashSet<i32>,
}

#[derive(Default)]
pub struct SimKernel {
	prio_log: Mutex<HashMap<i32, Vec<u8>>>,
	sched_depth: Mutex<HashMap<i32, i32>>,
	yield_gate: Mutex<YieldGate>,
	yield_cv: Condvar,
}

#[allow(dead_code)]
impl SimKernel {
	/// Priorities set for `task` since the start of the test binary.
	pub fn prio_log(&self, task: &Arc<Task>) -> Vec<u8> {
		self.prio_log
			.lock()
			.unwrap()
			.get(&task.id().into())
			.cloned()
			.unwrap_or_default()
	}

	/// Current non-preempt nesting depth of `task`'s CPU.
	pub fn sched_depth(&self, task: &Arc<Task>) -> i32 {
		self.sched_depth
			.lock()
			.unwrap()
			.get(&task.id().into())
			.copied()
			.unwrap_or(0)
	}

	/// Makes `task` park inside its next `yield_now` until released.
	pub fn hold_on_yield(&self, task: &Arc<Task>) {
		self.yield_gate.lock().unwrap().held.insert(task.id().into());
	}

	/// Whether `task` is currently parked inside a yield (i.e. off the CPU).
	pub fn is_parked(&self, task: &Arc<Task>) -> bool {
		self.yield_gate
			.lock()
			.unwrap()
			.parked
			.contains(&task.id().into())
	}

	/// Lets a held task continue past its yield.
	pub fn release_yield(&self, task: &Arc<Task>) {
		self.yield_gate.lock().unwrap().held.remove(&task.id().into());
		self.yield_cv.notify_all();
	}
}

impl KernelOps for SimKernel {
	fn current_task(&self) -> Arc<Task> {
		CURRENT
			.with(|current| current.borrow().clone())
			.expect("no task bound to this thread")
	}

	fn set_priority(&self, task: &Arc<Task>, prio: Priority) {
		self.prio_log
			.lock()
			.unwrap()
			.entry(task.id().into())
			.or_default()
			.push(prio.into());
	}

	fn scheduler_lock(&self) {
		let id = self.current_task().id().into();
		*self.sched_depth.lock().unwrap().entry(id).or_insert(0) += 1;
	}

	fn scheduler_unlock(&self) {
		let id = self.current_task().id().into();
		let mut depths = self.sched_depth.lock().unwrap();
		let depth = depths.entry(id).or_insert(0);
		assert!(*depth > 0, "scheduler lock underflow for task {id}");
		*depth -= 1;
	}

	fn yield_now(&self) {
		let id = self.current_task().id().into();
		let mut gate = self.yield_gate.lock().unwrap();
		if gate.held.contains(&id) {
			gate.parked.insert(id);
			while gate.held.contains(&id) {
				gate = self.yield_cv.wait(gate).unwrap();
			}
			gate.parked.remove(&id);
		}
		drop(gate);
		thread::yield_now();
	}

	fn irq_save(&self) -> bool {
		true
	}

	fn irq_restore(&self, _was_enabled: bool) {}
}

/// Registers the simulated kernel (first call only) and returns it.
pub fn kernel() -> &'static SimKernel {
	static KERNEL: OnceLock<SimKernel> = OnceLock::new();
	let kernel = KERNEL.get_or_init(SimKernel::default);
	let _ = frap::init(kernel);
	kernel
}

/// Creates a task descriptor. Tests must use ids that are unique within
/// the test binary; the per-task records above are keyed by them.
pub fn new_task(id: i32, prio: u8) -> Arc<Task> {
	Arc::new(Task::new(TaskId::from(id), Priority::from(prio)))
}

/// Binds `task` to the calling thread, which acts as its CPU from now on.
pub fn bind(task: &Arc<Task>) {
	CURRENT.with(|current| *current.borrow_mut() = Some(task.clone()));
}

/// Runs `f` on a new thread bound to `task`.
#[allow(dead_code)]
pub fn spawn_task<F>(task: &Arc<Task>, f: F) -> thread::JoinHandle<()>
where
	F: FnOnce() + Send + 'static,
{
	let task = task.clone();
	thread::spawn(move || {
		bind(&task);
		f();
	})
}

/// Polls `cond` for a few seconds before giving up.
#[allow(dead_code)]
pub fn wait_until(cond: impl Fn() -> bool) {
	for _ in 0..5000 {
		if cond() {
			return;
		}
		thread::sleep(Duration::from_millis(1));
	}
	panic!("condition not reached in time");
}
