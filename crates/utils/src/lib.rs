//! Shared error types for the classweave workspace.

pub mod errors;
