//! Byte ring shared between the background reader and the consumer.
//!
//! The two threads never touch the same bytes at the same time: the consumer
//! reads only between its published tail and the published available end, and
//! the producer writes only outside that region. Every move of those positions
//! happens under the stream mutex, which orders the byte writes before the
//! consumer's reads. Resizing happens only while the consumer holds no view
//! and is blocked on (or about to take) that mutex.
//!
//! The storage pointer and length are cached outside the `Vec` so that reads
//! and writes never form a reference to the shared `Vec` header. Only `grow`
//! touches the header, and it refreshes the cache.
#![allow(unsafe_code)]

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use crate::errors::{Result, TextError};

pub(crate) struct RingBuffer {
    data: UnsafeCell<Vec<u8>>,
    base: AtomicPtr<u8>,
    size: AtomicUsize,
    owned: bool,
}

// SAFETY: access is partitioned by the positions in `SyncState`; see module docs.
unsafe impl Sync for RingBuffer {}

impl RingBuffer {
    pub(crate) fn owned(size: usize) -> Result<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(size).map_err(|_| TextError::out_of_memory("stream buffer", size))?;
        data.resize(size, 0);
        Ok(Self::wrap(data, true))
    }

    pub(crate) fn provided(mut data: Vec<u8>) -> Self {
        data.resize(data.capacity(), 0);
        Self::wrap(data, false)
    }

    fn wrap(mut data: Vec<u8>, owned: bool) -> Self {
        // Moving the `Vec` keeps its heap storage in place.
        let base = AtomicPtr::new(data.as_mut_ptr());
        let size = AtomicUsize::new(data.len());
        Self { data: UnsafeCell::new(data), base, size, owned }
    }

    pub(crate) fn is_owned(&self) -> bool {
        self.owned
    }

    /// Current size in bytes.
    ///
    /// # Safety
    ///
    /// Must not race with [`grow`](Self::grow).
    pub(crate) unsafe fn len(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// Start of the byte storage, as last published by a constructor or `grow`.
    fn base(&self) -> *mut u8 {
        self.base.load(Ordering::Relaxed)
    }

    /// Shared view of `start..end`.
    ///
    /// # Safety
    ///
    /// The range must be published to the consumer and not writable by the
    /// producer for the lifetime of the returned slice.
    pub(crate) unsafe fn slice(&self, start: usize, end: usize) -> &[u8] {
        debug_assert!(start <= end && end <= unsafe { self.len() });
        // SAFETY: the caller owns `start..end` for reading; the pointer stays
        // valid because `grow` cannot run while the consumer holds a view.
        unsafe { std::slice::from_raw_parts(self.base().add(start), end - start) }
    }

    /// Exclusive view of `start..end`.
    ///
    /// # Safety
    ///
    /// Only the producer may call this, for a range the consumer cannot read.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn slice_mut(&self, start: usize, end: usize) -> &mut [u8] {
        debug_assert!(start <= end && end <= unsafe { self.len() });
        // SAFETY: the range is outside the consumer's published region, so no
        // other reference to these bytes exists.
        unsafe { std::slice::from_raw_parts_mut(self.base().add(start), end - start) }
    }

    /// Copy `src` to `dest` within the ring.
    ///
    /// # Safety
    ///
    /// Both ranges must be unreadable by the consumer.
    pub(crate) unsafe fn copy_within(&self, src: std::ops::Range<usize>, dest: usize) {
        debug_assert!(src.start <= src.end && dest + src.len() <= unsafe { self.len() });
        let base = self.base();
        // SAFETY: see the contract above; `copy` handles overlapping ranges.
        unsafe { std::ptr::copy(base.add(src.start), base.add(dest), src.len()) }
    }

    /// Grow an owned ring to `new_len` bytes.
    ///
    /// # Safety
    ///
    /// The consumer must hold no view into the ring.
    pub(crate) unsafe fn grow(&self, new_len: usize) -> Result<()> {
        // SAFETY: the caller guarantees exclusive access.
        let data = unsafe { &mut *self.data.get() };
        if new_len > data.len() {
            let extra = new_len - data.len();
            data.try_reserve_exact(extra)
                .map_err(|_| TextError::out_of_memory("stream buffer", new_len))?;
            data.resize(new_len, 0);
            // The stream mutex orders these stores before the consumer's next view.
            self.base.store(data.as_mut_ptr(), Ordering::Relaxed);
            self.size.store(data.len(), Ordering::Relaxed);
        }
        Ok(())
    }

    /// Recover a caller-provided buffer once both threads are done with the ring.
    pub(crate) fn into_provided(self) -> Option<Vec<u8>> {
        let owned = self.owned;
        let data = self.data.into_inner();
        (!owned).then_some(data)
    }
}
