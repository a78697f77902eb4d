//! `cohort` is an in-process dual-versioned software transactional
//! memory: threads perform grouped reads, writes, allocations and
//! deallocations against shared memory with snapshot isolation and
//! whole-transaction atomicity.
//!
//! Transactions are admitted in epoch cohorts. Within an epoch, every
//! word of the region carries a 64-bit access set that detects
//! read/write conflicts between up to [`MAX_RW_TX`] read/write
//! transactions; read-only transactions run against the epoch's frozen
//! snapshot without any synchronization. The last transaction out of
//! an epoch installs the next snapshot by copying each written
//! segment's working words over the read-only copy, then releases the
//! parked cohort into the new epoch.
//!
//! ```
//! use cohort::TxMemory;
//!
//! let tm = TxMemory::create(64, 8).unwrap();
//!
//! let tx = tm.begin(false).unwrap();
//! assert!(tm.write(tx, &7_u64.to_le_bytes(), tm.start()));
//! let mut buf = [0; 8];
//! assert!(tm.read(tx, tm.start(), &mut buf));
//! assert_eq!(u64::from_le_bytes(buf), 7);
//! assert!(tm.end(tx));
//!
//! // The next epoch observes the installed snapshot.
//! let ro = tm.begin(true).unwrap();
//! let mut buf = [0; 8];
//! assert!(tm.read(ro, tm.start(), &mut buf));
//! assert_eq!(u64::from_le_bytes(buf), 7);
//! assert!(tm.end(ro));
//! ```
//!
//! Aborts are ordinary return values: any operation that reports
//! failure has already rolled the transaction back and left its epoch,
//! and the caller must not call [`TxMemory::end`] on it.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![cfg_attr(test, deny(warnings))]

mod addr;
mod batcher;
mod debug_delay;
mod fastlock;
mod oplog;
mod region;
mod result;
mod segment;
mod tx;

pub use addr::Addr;
pub use region::{AllocOutcome, TxMemory};
pub use result::{Error, Result};
pub use tx::Tx;

pub(crate) use debug_delay::debug_delay;

/// Maximum read/write transactions admitted per epoch. One bit of the
/// per-word access set per transaction, with the top bit reserved for
/// the written flag.
pub const MAX_RW_TX: usize = 63;

/// Length of the segment table. Slot 0 is never used, so a region
/// holds at most `MAX_SEG - 1` live segments, the first one included.
pub const MAX_SEG: usize = 64;

pub(crate) const FIRST_SEG: usize = 1;
