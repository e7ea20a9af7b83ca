//! Basic synchronization primitives.
//!
//! Single import surface for the locking and atomic types used across the
//! emulator, so core modules do not depend on `parking_lot` directly.

pub use parking_lot::{
    Condvar, MappedRwLockReadGuard, MappedRwLockWriteGuard, Mutex, MutexGuard, RwLock,
    RwLockReadGuard, RwLockWriteGuard,
};

pub use std::sync::{
    Arc,
    atomic::{
        AtomicBool, AtomicI8, AtomicI16, AtomicI32, AtomicI64, AtomicIsize, AtomicU8, AtomicU16,
        AtomicU32, AtomicU64, AtomicUsize, Ordering,
    },
};
