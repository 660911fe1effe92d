//! Fixed-capacity pool of reusable texture samples.
//!
//! Samples are created lazily up to the pool capacity and recycled after
//! that. A checked-out sample is owned by a [`PooledSample`] guard; dropping
//! the guard resets the sample and returns it (buffer allocation included) to
//! the free list. A sample is only ever touched by the thread holding its
//! guard.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{SampleError, TextureSample};

/// Statistics about the current state of the pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolStats {
    /// Hard maximum number of samples the pool will hold.
    pub capacity: usize,
    /// Samples currently checked out.
    pub outstanding: usize,
    /// Constructed samples waiting for reuse.
    pub free: usize,
    /// Total successful `acquire` calls since creation.
    pub total_checkouts: u64,
}

struct Slots {
    /// Free samples tagged with their slot index
    free: Vec<(usize, TextureSample)>,
    /// Number of samples constructed so far
    created: usize,
}

struct PoolInner {
    capacity: usize,
    slots: Mutex<Slots>,
    checkouts: AtomicU64,
}

impl PoolInner {
    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A bounded pool of [`TextureSample`]s. Cloning shares the same pool.
#[derive(Clone)]
pub struct TextureSamplePool {
    inner: Arc<PoolInner>,
}

impl TextureSamplePool {
    /// Create a pool holding at most `capacity` samples.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be > 0");
        Self {
            inner: Arc::new(PoolInner {
                capacity,
                slots: Mutex::new(Slots {
                    free: Vec::with_capacity(capacity),
                    created: 0,
                }),
                checkouts: AtomicU64::new(0),
            }),
        }
    }

    /// Create a full pool whose sample buffers already hold `bytes_per_sample`.
    pub fn with_preallocated(capacity: usize, bytes_per_sample: usize) -> Self {
        let pool = Self::new(capacity);
        {
            let mut slots = pool.inner.slots();
            // Reverse so that slot 0 is handed out first.
            for slot in (0..capacity).rev() {
                slots
                    .free
                    .push((slot, TextureSample::with_capacity(bytes_per_sample)));
            }
            slots.created = capacity;
        }
        pool
    }

    /// Check out a sample, recycling a free one before constructing a new one.
    pub fn acquire(&self) -> Result<PooledSample, SampleError> {
        let (slot, sample) = {
            let mut slots = self.inner.slots();
            match slots.free.pop() {
                Some(entry) => entry,
                None if slots.created < self.inner.capacity => {
                    let slot = slots.created;
                    slots.created += 1;
                    (slot, TextureSample::new())
                }
                None => {
                    return Err(SampleError::PoolExhausted {
                        capacity: self.inner.capacity,
                    })
                }
            }
        };
        self.inner.checkouts.fetch_add(1, Ordering::Relaxed);

        Ok(PooledSample {
            slot,
            sample,
            pool: Arc::clone(&self.inner),
        })
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn stats(&self) -> PoolStats {
        let slots = self.inner.slots();
        PoolStats {
            capacity: self.inner.capacity,
            outstanding: slots.created - slots.free.len(),
            free: slots.free.len(),
            total_checkouts: self.inner.checkouts.load(Ordering::Relaxed),
        }
    }
}

/// A sample checked out of a [`TextureSamplePool`].
pub struct PooledSample {
    slot: usize,
    sample: TextureSample,
    pool: Arc<PoolInner>,
}

impl PooledSample {
    /// Index of the pool slot this sample occupies.
    pub fn slot(&self) -> usize {
        self.slot
    }
}

impl Deref for PooledSample {
    type Target = TextureSample;

    fn deref(&self) -> &TextureSample {
        &self.sample
    }
}

impl DerefMut for PooledSample {
    fn deref_mut(&mut self) -> &mut TextureSample {
        &mut self.sample
    }
}

impl Drop for PooledSample {
    fn drop(&mut self) {
        // An empty TextureSample holds no allocation, so the swap is free.
        let mut sample = std::mem::take(&mut self.sample);
        sample.reset();
        self.pool.slots().free.push((self.slot, sample));
    }
}

impl std::fmt::Debug for PooledSample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledSample")
            .field("slot", &self.slot)
            .field("sample", &self.sample)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{SampleTiming, VideoFrameData};
    use ajamedia_common::SampleFormat;

    #[test]
    fn test_acquire_until_exhausted() {
        let pool = TextureSamplePool::new(2);
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_ne!(a.slot(), b.slot());
        assert_eq!(
            pool.acquire().unwrap_err(),
            SampleError::PoolExhausted { capacity: 2 }
        );

        drop(a);
        let c = pool.acquire().unwrap();
        assert_eq!(c.slot(), 0);
    }

    #[test]
    fn test_release_resets_and_keeps_buffer() {
        let pool = TextureSamplePool::new(1);
        let data = vec![9u8; 64 * 64 * 4];
        let frame = VideoFrameData::new(&data, 256, 64, 64);

        let capacity = {
            let mut sample = pool.acquire().unwrap();
            sample
                .initialize_progressive(&frame, SampleFormat::CharBgra, &SampleTiming::default(), true)
                .unwrap();
            sample.buffer_capacity()
        };

        let recycled = pool.acquire().unwrap();
        assert_eq!(recycled.slot(), 0);
        assert!(!recycled.is_populated());
        assert!(!recycled.is_output_srgb());
        assert!(recycled.buffer_capacity() >= capacity);
    }

    #[test]
    fn test_preallocated_pool() {
        let pool = TextureSamplePool::with_preallocated(3, 4096);
        let stats = pool.stats();
        assert_eq!(stats.free, 3);
        assert_eq!(stats.outstanding, 0);

        let sample = pool.acquire().unwrap();
        assert_eq!(sample.slot(), 0);
        assert!(sample.buffer_capacity() >= 4096);
    }

    #[test]
    fn test_stats() {
        let pool = TextureSamplePool::new(4);
        let a = pool.acquire().unwrap();
        let _b = pool.acquire().unwrap();
        drop(a);

        assert_eq!(
            pool.stats(),
            PoolStats {
                capacity: 4,
                outstanding: 1,
                free: 1,
                total_checkouts: 2,
            }
        );
    }

    #[test]
    fn test_samples_cross_threads() {
        let pool = TextureSamplePool::new(2);
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let sample = pool.acquire().unwrap();
                std::thread::spawn(move || {
                    let slot = sample.slot();
                    drop(sample);
                    slot
                })
            })
            .collect();
        let mut slots: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        slots.sort();
        assert_eq!(slots, vec![0, 1]);
        assert_eq!(pool.stats().free, 2);
    }
}
