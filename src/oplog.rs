use crate::fastlock::FastLock;
use crate::tx::Tx;
use crate::MAX_RW_TX;

/// One recorded transaction operation. Records drive abort rollback
/// and commit finalization during a transaction's leave step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
    Read { seg_id: usize, offset: usize, len: usize },
    Write { seg_id: usize, offset: usize, len: usize },
    Alloc { seg_id: usize },
    Free { seg_id: usize },
}

/// Per-region table of operation logs, one owned sequence per
/// read/write transaction slot.
///
/// A slot is only ever appended to by the thread driving that
/// transaction and drained by the same thread on leave, so the lock is
/// uncontended by protocol; it exists to make the table shareable.
pub(crate) struct OpLog {
    slots: Box<[FastLock<Vec<Op>>]>,
}

impl OpLog {
    pub fn new() -> OpLog {
        let mut slots = Vec::with_capacity(MAX_RW_TX);
        for _ in 0..MAX_RW_TX {
            slots.push(FastLock::new(vec![]));
        }
        OpLog { slots: slots.into_boxed_slice() }
    }

    /// Append a record for a read/write transaction. Read-only
    /// transactions record nothing.
    pub fn push(&self, tx: Tx, op: Op) {
        if let Some(slot) = tx.slot() {
            self.slots[slot].lock().push(op);
        }
    }

    /// Drain a transaction's records, most recent first.
    pub fn drain(&self, tx: Tx) -> Vec<Op> {
        match tx.slot() {
            Some(slot) => {
                let mut ops = std::mem::take(&mut *self.slots[slot].lock());
                ops.reverse();
                ops
            }
            None => vec![],
        }
    }

    #[cfg(debug_assertions)]
    pub fn assert_drained(&self) {
        for slot in self.slots.iter() {
            debug_assert!(slot.lock().is_empty());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_drain_lifo() {
        let log = OpLog::new();
        let tx = Tx::new(3);

        log.push(tx, Op::Alloc { seg_id: 2 });
        log.push(tx, Op::Write { seg_id: 2, offset: 0, len: 8 });
        log.push(tx, Op::Free { seg_id: 2 });

        let ops = log.drain(tx);
        assert_eq!(
            ops,
            vec![
                Op::Free { seg_id: 2 },
                Op::Write { seg_id: 2, offset: 0, len: 8 },
                Op::Alloc { seg_id: 2 },
            ]
        );

        assert!(log.drain(tx).is_empty());
    }

    #[test]
    fn read_only_records_nothing() {
        let log = OpLog::new();
        let ro = Tx::new(80);

        log.push(ro, Op::Read { seg_id: 1, offset: 0, len: 8 });
        assert!(log.drain(ro).is_empty());
    }
}
