//! Internal tests module
//!
//! Multi-node protocol scenarios run over the in-process network, with full
//! access to crate internals.

mod cluster;
mod test_utils;
