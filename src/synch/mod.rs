//! Synchronization primitives

pub(crate) mod spinlock;
