use std::fmt;

use crate::MAX_RW_TX;

/// A transaction id, scoped to one epoch of one region.
///
/// Ids below [`MAX_RW_TX`] belong to read/write transactions and double
/// as bit positions in the per-word access sets; ids at or above
/// [`MAX_RW_TX`] belong to read-only transactions, which never touch an
/// access set.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tx(u64);

impl Tx {
    pub(crate) const fn new(id: u64) -> Tx {
        Tx(id)
    }

    /// Whether this transaction was admitted read-only.
    pub fn is_read_only(self) -> bool {
        self.0 >= MAX_RW_TX as u64
    }

    /// The op-log slot of a read/write transaction.
    pub(crate) fn slot(self) -> Option<usize> {
        if self.is_read_only() {
            None
        } else {
            Some(self.0 as usize)
        }
    }

    /// The access-set bit for a read/write transaction.
    pub(crate) fn pattern(self) -> u64 {
        debug_assert!(!self.is_read_only());
        1 << self.0
    }
}

impl fmt::Debug for Tx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_read_only() {
            write!(f, "Tx::ro({})", self.0)
        } else {
            write!(f, "Tx::rw({})", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_space_split() {
        assert!(!Tx::new(0).is_read_only());
        assert!(!Tx::new(62).is_read_only());
        assert!(Tx::new(63).is_read_only());
        assert!(Tx::new(1000).is_read_only());
    }

    #[test]
    fn rw_slots_and_patterns() {
        assert_eq!(Tx::new(0).slot(), Some(0));
        assert_eq!(Tx::new(62).slot(), Some(62));
        assert_eq!(Tx::new(63).slot(), None);

        assert_eq!(Tx::new(0).pattern(), 1);
        assert_eq!(Tx::new(62).pattern(), 1 << 62);
    }
}
