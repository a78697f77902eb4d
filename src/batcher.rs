use crossbeam_utils::CachePadded;
use parking_lot::{Condvar, Mutex};

use crate::tx::Tx;
use crate::MAX_RW_TX;

#[derive(Debug)]
struct Cohort {
    /// Monotonic epoch counter; bumping it is what releases waiters.
    epoch: u64,
    /// Next read/write id to hand out, 0..MAX_RW_TX.
    rw_next: u64,
    /// Next read-only id to hand out, unbounded from MAX_RW_TX.
    ro_next: u64,
    /// Transactions admitted to the current epoch and not yet left.
    remaining: u64,
    /// Threads parked until the next epoch opens.
    blocked: u64,
}

/// Admits transactions in epoch cohorts.
///
/// The first transaction into an idle batcher runs immediately; every
/// later arrival is assigned an id, parked, and released as a group
/// when the current cohort drains.
pub(crate) struct Batcher {
    cohort: CachePadded<Mutex<Cohort>>,
    cv: Condvar,
}

impl Batcher {
    pub fn new() -> Batcher {
        Batcher {
            cohort: CachePadded::new(Mutex::new(Cohort {
                epoch: 0,
                rw_next: 0,
                ro_next: MAX_RW_TX as u64,
                remaining: 0,
                blocked: 0,
            })),
            cv: Condvar::new(),
        }
    }

    /// Wait for admission. Returns `None` when the read/write id space
    /// for this epoch is exhausted; a rejected caller was never
    /// admitted and must not leave.
    pub fn enter(&self, is_ro: bool) -> Option<Tx> {
        let mut cohort = self.cohort.lock();
        let snapshot_epoch = cohort.epoch;

        let id = if is_ro {
            let id = cohort.ro_next;
            cohort.ro_next += 1;
            id
        } else if cohort.rw_next == MAX_RW_TX as u64 {
            return None;
        } else {
            let id = cohort.rw_next;
            cohort.rw_next += 1;
            id
        };

        if cohort.remaining == 0 {
            cohort.remaining = 1;
        } else {
            cohort.blocked += 1;
            // Park until the next epoch is installed. `remaining` is
            // already reinitialized for that epoch by the time waiters
            // wake, so the bumped epoch is the only safe predicate.
            while cohort.epoch == snapshot_epoch {
                self.cv.wait(&mut cohort);
            }
        }

        Some(Tx::new(id))
    }

    /// Leave the current epoch. The last transaction out runs
    /// `epoch_end` while the batch is quiescent, then opens the next
    /// epoch and releases every parked thread into it.
    pub fn leave<F: FnOnce()>(&self, epoch_end: F) {
        let mut cohort = self.cohort.lock();
        cohort.remaining -= 1;
        if cohort.remaining == 0 {
            epoch_end();
            cohort.rw_next = 0;
            cohort.ro_next = MAX_RW_TX as u64;
            cohort.remaining = cohort.blocked;
            cohort.blocked = 0;
            cohort.epoch += 1;
            log::trace!(
                "epoch {} open, releasing a cohort of {}",
                cohort.epoch,
                cohort.remaining
            );
            self.cv.notify_all();
        }
    }

    /// Threads currently parked for the next epoch. A thread counts
    /// only once it is inside the condvar wait, so observing `n` here
    /// means `n` callers are committed to the next cohort.
    pub fn parked(&self) -> u64 {
        self.cohort.lock().blocked
    }

    #[cfg(test)]
    pub fn epoch(&self) -> u64 {
        self.cohort.lock().epoch
    }

    #[cfg(test)]
    pub fn rw_admitted(&self) -> u64 {
        self.cohort.lock().rw_next
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn solo_transactions_roll_epochs() {
        let batcher = Batcher::new();

        let t0 = batcher.enter(false).unwrap();
        assert_eq!(t0.slot(), Some(0));
        batcher.leave(|| {});
        assert_eq!(batcher.epoch(), 1);

        let ro = batcher.enter(true).unwrap();
        assert!(ro.is_read_only());
        batcher.leave(|| {});
        assert_eq!(batcher.epoch(), 2);
    }

    #[test]
    fn epoch_end_runs_once_per_epoch() {
        let batcher = Arc::new(Batcher::new());
        let sweeps = Arc::new(AtomicU64::new(0));

        const THREADS: usize = 16;
        const ROUNDS: usize = 50;

        let mut handles = vec![];
        for _ in 0..THREADS {
            let batcher = batcher.clone();
            let sweeps = sweeps.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..ROUNDS {
                    let tx = batcher.enter(true).unwrap();
                    assert!(tx.is_read_only());
                    batcher.leave(|| {
                        sweeps.fetch_add(1, Ordering::Relaxed);
                    });
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        // One sweep per epoch, one epoch per drain.
        assert_eq!(sweeps.load(Ordering::Relaxed), batcher.epoch());
        assert!(batcher.epoch() as usize <= THREADS * ROUNDS);
    }

    #[test]
    fn rw_capacity_rejection() {
        let batcher = Arc::new(Batcher::new());

        // Keep one transaction running so later arrivals park.
        let holder = batcher.enter(false).unwrap();
        assert_eq!(holder.slot(), Some(0));

        let mut handles = vec![];
        for _ in 0..MAX_RW_TX - 1 {
            let batcher = batcher.clone();
            handles.push(thread::spawn(move || {
                let tx = batcher.enter(false).unwrap();
                batcher.leave(|| {});
                tx
            }));
        }

        // Wait for every id of this epoch to be handed out.
        while batcher.rw_admitted() != MAX_RW_TX as u64 {
            thread::sleep(Duration::from_millis(1));
        }

        assert!(batcher.enter(false).is_none());

        batcher.leave(|| {});
        for handle in handles {
            handle.join().unwrap();
        }

        // The next epoch has a fresh id space.
        assert!(batcher.enter(false).is_some());
        batcher.leave(|| {});
    }
}
