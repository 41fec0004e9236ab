//! Dataflow queries over decoded method bodies.
//!
//! Everything here is read-only and conservative: a query that cannot give
//! a provably unique answer declines, and callers treat a declined answer
//! as "do not touch this code".

pub mod effect;
pub mod flow;

pub use effect::{stack_effect, StackEffect};
pub use flow::{Consumers, InsnFlow};
