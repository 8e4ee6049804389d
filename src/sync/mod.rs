//! Concurrency primitives shared by the registry and the watchers.
//!
//! # Design Decisions
//! - Read-mostly state sits behind reader/writer locks; lookups never block each other
//! - Guards are scoped: acquire, touch, release, never held across an `.await`
//! - A poisoned lock is recovered rather than propagated; the protected maps stay usable

pub mod lock;

pub use lock::ScopedRwLock;
