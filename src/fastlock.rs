use std::{
    cell::UnsafeCell,
    ops::{Deref, DerefMut},
    sync::atomic::{
        AtomicBool,
        Ordering::{AcqRel, Acquire, Release},
    },
};

use crossbeam_utils::Backoff;

use crate::debug_delay;

/// A raw spin flag, one per guarded word. The caller is responsible
/// for pairing every `acquire` with a `release` on the same flag.
pub(crate) struct SpinFlag(AtomicBool);

impl SpinFlag {
    pub const fn new() -> SpinFlag {
        SpinFlag(AtomicBool::new(false))
    }

    pub fn acquire(&self) {
        debug_delay();
        let backoff = Backoff::new();
        while self.0.swap(true, Acquire) {
            backoff.snooze();
        }
    }

    pub fn release(&self) {
        let was_held = self.0.swap(false, Release);
        debug_assert!(was_held);
    }
}

pub struct FastLockGuard<'a, T> {
    mu: &'a FastLock<T>,
}

impl<'a, T> Drop for FastLockGuard<'a, T> {
    fn drop(&mut self) {
        assert!(self.mu.lock.swap(false, Release));
    }
}

impl<'a, T> Deref for FastLockGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        #[allow(unsafe_code)]
        unsafe {
            &*self.mu.inner.get()
        }
    }
}

impl<'a, T> DerefMut for FastLockGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        #[allow(unsafe_code)]
        unsafe {
            &mut *self.mu.inner.get()
        }
    }
}

/// A spin mutex for short, rarely contended critical sections,
/// like popping a segment id or appending to an op log.
#[repr(C)]
pub struct FastLock<T> {
    inner: UnsafeCell<T>,
    lock: AtomicBool,
}

#[allow(unsafe_code)]
unsafe impl<T: Send> Sync for FastLock<T> {}

#[allow(unsafe_code)]
unsafe impl<T: Send> Send for FastLock<T> {}

impl<T> FastLock<T> {
    pub const fn new(inner: T) -> FastLock<T> {
        FastLock { lock: AtomicBool::new(false), inner: UnsafeCell::new(inner) }
    }

    pub fn try_lock(&self) -> Option<FastLockGuard<'_, T>> {
        debug_delay();
        let lock_result =
            self.lock.compare_exchange_weak(false, true, AcqRel, Acquire);

        let success = lock_result.is_ok();

        if success {
            Some(FastLockGuard { mu: self })
        } else {
            None
        }
    }

    pub fn lock(&self) -> FastLockGuard<'_, T> {
        let backoff = Backoff::new();
        loop {
            if let Some(guard) = self.try_lock() {
                return guard;
            }
            backoff.snooze();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn fast_lock_mutual_exclusion() {
        const THREADS: usize = 8;
        const INCREMENTS: usize = 1000;

        let counter = Arc::new(FastLock::new(0_usize));

        let mut handles = vec![];
        for _ in 0..THREADS {
            let counter = counter.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..INCREMENTS {
                    *counter.lock() += 1;
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(*counter.lock(), THREADS * INCREMENTS);
    }

    #[test]
    fn try_lock_excludes() {
        let mu = FastLock::new(());
        let g1 = mu.try_lock();
        assert!(g1.is_some());
        assert!(mu.try_lock().is_none());
        drop(g1);
        assert!(mu.try_lock().is_some());
    }

    #[test]
    fn spin_flag_pairs() {
        let flag = SpinFlag::new();
        flag.acquire();
        flag.release();
        flag.acquire();
        flag.release();
    }
}
