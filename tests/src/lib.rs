//! Cross-crate integration tests: classfile round trips through the
//! reader and writer, and end-to-end transformer runs over real bytes.
#![cfg(test)]

mod core;
mod fixtures;
mod transforms;
