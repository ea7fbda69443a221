//! Lease-based leader election.
//!
//! Exactly one instance of the fleet runs maintenance at a time. Leadership
//! is a time-bounded lease in a shared coordination point; losing the lease
//! (or failing to prove it is still held) stops all leader-only work.
mod leader_elector;
mod lease_store;

#[cfg(test)]
mod lease_store_test;

pub use leader_elector::*;
pub use lease_store::*;
