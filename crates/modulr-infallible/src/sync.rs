// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

use std::sync::{
    Mutex as StdMutex, MutexGuard, RwLock as StdRwLock, RwLockReadGuard, RwLockWriteGuard,
    TryLockError,
};

const POISON_MSG: &str = "guarded state was abandoned mid-update, refusing to continue";

/// Mutual exclusion whose acquisition cannot fail from the caller's point
/// of view: contention blocks, poison aborts the process.
#[derive(Debug, Default)]
pub struct Mutex<T> {
    inner: StdMutex<T>,
}

impl<T> Mutex<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: StdMutex::new(value),
        }
    }

    /// Blocks until the lock is held.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock().expect(POISON_MSG)
    }

    /// Acquires the lock only if it is free right now. `None` means another
    /// holder, never poison.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        match self.inner.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::WouldBlock) => None,
            Err(TryLockError::Poisoned(_)) => panic!("{}", POISON_MSG),
        }
    }

    /// Lock-free access through exclusive ownership.
    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut().expect(POISON_MSG)
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner().expect(POISON_MSG)
    }
}

/// Reader-writer lock with the same poison-aborts discipline.
#[derive(Debug, Default)]
pub struct RwLock<T> {
    inner: StdRwLock<T>,
}

impl<T> RwLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: StdRwLock::new(value),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.read().expect(POISON_MSG)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.inner.write().expect(POISON_MSG)
    }

    /// Non-blocking read; `None` means a writer holds the lock.
    pub fn try_read(&self) -> Option<RwLockReadGuard<'_, T>> {
        match self.inner.try_read() {
            Ok(guard) => Some(guard),
            Err(TryLockError::WouldBlock) => None,
            Err(TryLockError::Poisoned(_)) => panic!("{}", POISON_MSG),
        }
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut().expect(POISON_MSG)
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner().expect(POISON_MSG)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_guard_release_unblocks_try_lock() {
        let counter = Mutex::new(0u32);
        {
            let mut held = counter.lock();
            *held += 1;
            // A second acquisition while the guard is live must not succeed.
            assert!(counter.try_lock().is_none());
        }
        assert_eq!(*counter.try_lock().expect("guard was dropped"), 1);
    }

    #[test]
    fn test_concurrent_increments_all_land() {
        let counter = Arc::new(Mutex::new(0u64));
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let counter = counter.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        *counter.lock() += 1;
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().expect("worker panicked");
        }
        assert_eq!(*counter.lock(), 800);
    }

    #[test]
    fn test_rwlock_writer_excludes_readers() {
        let cell = RwLock::new("initial");
        {
            let mut writing = cell.write();
            assert!(cell.try_read().is_none());
            *writing = "replaced";
        }
        assert_eq!(*cell.read(), "replaced");
    }

    #[test]
    fn test_get_mut_bypasses_locking() {
        let mut cell = RwLock::new(vec![1, 2]);
        cell.get_mut().push(3);
        assert_eq!(cell.into_inner(), vec![1, 2, 3]);
    }
}
