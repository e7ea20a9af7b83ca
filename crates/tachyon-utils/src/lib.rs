//! # tachyon-utils
//!
//! Shared utilities for the tachyon-rs project: synchronization primitive
//! re-exports and binary header readers.

pub mod bytes;
pub mod sync;
