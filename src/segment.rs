#![allow(unsafe_code)]

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ops::Range;
use std::ptr;
use std::sync::atomic::{
    AtomicBool, AtomicU64,
    Ordering::{AcqRel, Acquire, Relaxed, Release},
};

use crate::fastlock::SpinFlag;
use crate::tx::Tx;

/// The written flag fused into the top bit of an access-set word. The
/// low 63 bits form a bitmap over read/write transaction ids, which is
/// why at most 63 of them run per epoch.
pub(crate) const WRITTEN: u64 = 1 << 63;

/// A raw zeroed allocation honoring the region's word alignment.
struct WordBuf {
    ptr: *mut u8,
    layout: Layout,
}

impl WordBuf {
    fn zeroed(len: usize, align: usize) -> Option<WordBuf> {
        let layout = Layout::from_size_align(len, align).ok()?;
        let ptr = unsafe { alloc_zeroed(layout) };
        if ptr.is_null() {
            None
        } else {
            Some(WordBuf { ptr, layout })
        }
    }
}

impl Drop for WordBuf {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr, self.layout) }
    }
}

/// One allocation inside a region: two equal word buffers plus
/// per-word conflict metadata.
///
/// `rw` is only mutated while the corresponding word flags are held;
/// `ro` is only mutated during the single-threaded end-of-epoch window.
pub(crate) struct Segment {
    seg_id: usize,
    len: usize,
    align: usize,
    freed: AtomicBool,
    written: AtomicBool,
    locks: Box<[SpinFlag]>,
    asets: Box<[AtomicU64]>,
    ro: WordBuf,
    rw: WordBuf,
}

// Safety: the raw buffer pointers are owned by the segment, and every
// mutation path is serialized either by the per-word flags or by the
// batcher's quiescent window.
unsafe impl Send for Segment {}
unsafe impl Sync for Segment {}

impl Segment {
    /// Allocate a zeroed segment. `None` means the host allocator
    /// failed.
    pub fn new(seg_id: usize, len: usize, align: usize) -> Option<Box<Segment>> {
        debug_assert!(len > 0 && len % align == 0);
        let num_words = len / align;

        let ro = WordBuf::zeroed(len, align)?;
        let rw = WordBuf::zeroed(len, align)?;

        let locks: Box<[SpinFlag]> =
            (0..num_words).map(|_| SpinFlag::new()).collect();
        let asets: Box<[AtomicU64]> =
            (0..num_words).map(|_| AtomicU64::new(0)).collect();

        Some(Box::new(Segment {
            seg_id,
            len,
            align,
            freed: AtomicBool::new(false),
            written: AtomicBool::new(false),
            locks,
            asets,
            ro,
            rw,
        }))
    }

    pub fn byte_len(&self) -> usize {
        self.len
    }

    fn word_span(&self, offset: usize, len: usize) -> Range<usize> {
        debug_assert!(offset % self.align == 0 && len % self.align == 0);
        debug_assert!(offset + len <= self.len);
        offset / self.align..(offset + len) / self.align
    }

    /// Copy `dst.len()` bytes at `offset` into `dst`.
    ///
    /// Read-only transactions copy from the epoch snapshot without
    /// touching locks or access sets. Read/write transactions read the
    /// working copy and record themselves in each word's access set;
    /// `false` means another transaction already wrote one of the
    /// words, and the caller must abort.
    pub fn read_into(&self, tx: Tx, offset: usize, dst: &mut [u8]) -> bool {
        if tx.is_read_only() {
            unsafe {
                ptr::copy_nonoverlapping(
                    self.ro.ptr.add(offset),
                    dst.as_mut_ptr(),
                    dst.len(),
                );
            }
            return true;
        }

        let span = self.word_span(offset, dst.len());
        let pattern = tx.pattern();

        for word in span.clone() {
            self.locks[word].acquire();

            let set = self.asets[word].load(Relaxed);
            if set >= WRITTEN && set & pattern == 0 {
                // Written by another transaction.
                for held in span.start..=word {
                    self.locks[held].release();
                }
                return false;
            }
        }
        for word in span.clone() {
            self.asets[word].fetch_or(pattern, Relaxed);
        }
        unsafe {
            ptr::copy_nonoverlapping(
                self.rw.ptr.add(offset),
                dst.as_mut_ptr(),
                dst.len(),
            );
        }
        for word in span {
            self.locks[word].release();
        }
        true
    }

    /// Copy `src` into the working copy at `offset`, claiming every
    /// word for `tx`. `false` means some word was already read or
    /// written by another transaction, and the caller must abort.
    pub fn write_from(&self, tx: Tx, offset: usize, src: &[u8]) -> bool {
        let span = self.word_span(offset, src.len());
        let pattern = tx.pattern();

        for word in span.clone() {
            self.locks[word].acquire();

            let set = self.asets[word].load(Relaxed);
            if set & !WRITTEN & !pattern != 0 {
                // Read or written by some other transaction.
                for held in span.start..=word {
                    self.locks[held].release();
                }
                return false;
            }
        }
        for word in span.clone() {
            self.asets[word].fetch_or(WRITTEN | pattern, Relaxed);
        }
        unsafe {
            ptr::copy_nonoverlapping(
                src.as_ptr(),
                self.rw.ptr.add(offset),
                src.len(),
            );
        }
        for word in span {
            self.locks[word].release();
        }
        true
    }

    /// Abort path for a recorded read: drop this transaction's bit
    /// from each word it touched. A word the transaction also wrote is
    /// skipped here: its write record restores bits and bytes in one
    /// step, and by the time this record is replayed the word may
    /// already belong to another transaction.
    pub fn unmark_read(&self, tx: Tx, offset: usize, len: usize) {
        let span = self.word_span(offset, len);
        let pattern = tx.pattern();

        for word in span.clone() {
            self.locks[word].acquire();
        }
        for word in span.clone() {
            let set = self.asets[word].load(Relaxed);
            if set < WRITTEN {
                self.asets[word].store(set & !pattern, Relaxed);
            }
        }
        for word in span {
            self.locks[word].release();
        }
    }

    /// Abort path for a recorded write: restore the snapshot bytes of
    /// every word the transaction still owns and release the word.
    /// Ownership is checked per word so that repeated records over the
    /// same range replay as no-ops instead of clobbering a word some
    /// other transaction claimed after the first replay released it.
    pub fn rollback_write(&self, tx: Tx, offset: usize, len: usize) {
        let span = self.word_span(offset, len);
        let pattern = tx.pattern();

        for word in span.clone() {
            self.locks[word].acquire();
        }
        for word in span.clone() {
            let set = self.asets[word].load(Relaxed);
            if set >= WRITTEN && set & pattern != 0 {
                let byte = word * self.align;
                unsafe {
                    ptr::copy_nonoverlapping(
                        self.ro.ptr.add(byte),
                        self.rw.ptr.add(byte),
                        self.align,
                    );
                }
                // The sole writer holds the only claim on the word.
                self.asets[word].store(0, Relaxed);
            }
        }
        for word in span {
            self.locks[word].release();
        }
    }

    pub fn mark_written(&self) {
        self.written.store(true, Release);
    }

    pub fn mark_freed(&self) {
        self.freed.store(true, Release);
    }

    pub fn is_freed(&self) -> bool {
        self.freed.load(Acquire)
    }

    /// End-of-epoch snapshot installation. Must only run inside the
    /// quiescent window: copies maximal written word intervals from
    /// the working copy into the snapshot copy, then resets every
    /// access set for the next epoch.
    pub fn install(&self) {
        if self.written.swap(false, AcqRel) {
            log::trace!("segment {} installing written words", self.seg_id);
            let num_words = self.asets.len();
            let mut word = 0;
            while word < num_words {
                if self.asets[word].load(Relaxed) & WRITTEN == 0 {
                    word += 1;
                    continue;
                }
                let start = word;
                while word < num_words
                    && self.asets[word].load(Relaxed) & WRITTEN != 0
                {
                    word += 1;
                }
                let byte_start = start * self.align;
                let byte_len = (word - start) * self.align;
                unsafe {
                    ptr::copy_nonoverlapping(
                        self.rw.ptr.add(byte_start),
                        self.ro.ptr.add(byte_start),
                        byte_len,
                    );
                }
            }
        }
        for set in self.asets.iter() {
            set.store(0, Relaxed);
        }
    }
}
