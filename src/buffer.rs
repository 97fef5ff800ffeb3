//! Fixed-capacity multi-channel sample store shared between one generator
//! thread (producer) and one consumer thread.
//!
//! Cursors are monotonically increasing sample counts; slots are addressed
//! modulo the capacity. When the producer laps the consumer it pushes the
//! read cursor forward itself and counts the lost samples as overruns. A
//! reader that raced such an overwrite fails its cursor CAS and retries, so it
//! never hands out a torn block.

use crossbeam_utils::{Backoff, CachePadded};
use log::*;
use std::sync::atomic::{fence, AtomicI64, AtomicU32, AtomicU64, Ordering};

pub const DEFAULT_CAPACITY: usize = 48000;

/// Event word bit carrying the TTL sync-line level.
pub const SYNC_LINE_BIT: u64 = 1;

/// A run of consecutive multi-channel samples plus per-sample metadata.
///
/// Storage is allocated once; `len` tracks how many leading samples are valid.
#[derive(Clone, Debug)]
pub struct SampleBlock {
    channels: usize,
    capacity: usize,
    len: usize,
    samples: Vec<f32>,
    sample_numbers: Vec<i64>,
    timestamps: Vec<f64>,
    event_codes: Vec<u64>,
}

impl SampleBlock {
    pub fn new(channels: usize, capacity: usize) -> SampleBlock {
        SampleBlock {
            channels,
            capacity,
            len: 0,
            samples: vec![0.0; channels * capacity],
            sample_numbers: vec![0; capacity],
            timestamps: vec![0.0; capacity],
            event_codes: vec![0; capacity],
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Marks the first `len` samples valid.
    pub fn set_len(&mut self, len: usize) {
        assert!(len <= self.capacity, "block length {} exceeds capacity {}", len, self.capacity);
        self.len = len;
    }

    /// All channel values of sample `index`.
    pub fn frame(&self, index: usize) -> &[f32] {
        &self.samples[index * self.channels..(index + 1) * self.channels]
    }

    pub fn frame_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.samples[index * self.channels..(index + 1) * self.channels]
    }

    pub fn sample(&self, index: usize, channel: usize) -> f32 {
        self.frame(index)[channel]
    }

    pub fn sample_numbers(&self) -> &[i64] {
        &self.sample_numbers[..self.len]
    }

    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps[..self.len]
    }

    pub fn event_codes(&self) -> &[u64] {
        &self.event_codes[..self.len]
    }

    /// Writes the metadata of sample `index`; the caller fills values through
    /// [`SampleBlock::frame_mut`].
    pub fn set_meta(&mut self, index: usize, sample_number: i64, timestamp: f64, event_code: u64) {
        self.sample_numbers[index] = sample_number;
        self.timestamps[index] = timestamp;
        self.event_codes[index] = event_code;
    }
}

pub struct RingBuffer {
    channels: usize,
    capacity: usize,
    samples: Box<[AtomicU32]>,
    sample_numbers: Box<[AtomicI64]>,
    timestamps: Box<[AtomicU64]>,
    event_codes: Box<[AtomicU64]>,
    write: CachePadded<AtomicU64>,
    read: CachePadded<AtomicU64>,
    overruns: AtomicU64,
}

impl RingBuffer {
    pub fn new(channels: usize, capacity: usize) -> RingBuffer {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        debug!(
            "allocating ring buffer: {} channels x {} samples",
            channels, capacity
        );

        RingBuffer {
            channels,
            capacity,
            samples: (0..channels * capacity).map(|_| AtomicU32::new(0)).collect(),
            sample_numbers: (0..capacity).map(|_| AtomicI64::new(0)).collect(),
            timestamps: (0..capacity).map(|_| AtomicU64::new(0)).collect(),
            event_codes: (0..capacity).map(|_| AtomicU64::new(0)).collect(),
            write: CachePadded::new(AtomicU64::new(0)),
            read: CachePadded::new(AtomicU64::new(0)),
            overruns: AtomicU64::new(0),
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Resets both cursors and the overrun counter. Only valid while neither
    /// the producer nor the consumer is active.
    pub fn clear(&self) {
        self.write.store(0, Ordering::SeqCst);
        self.read.store(0, Ordering::SeqCst);
        self.overruns.store(0, Ordering::SeqCst);
    }

    /// Samples written but not yet consumed.
    pub fn available(&self) -> usize {
        let r = self.read.load(Ordering::Acquire);
        let w = self.write.load(Ordering::Acquire);
        (w.saturating_sub(r) as usize).min(self.capacity)
    }

    /// Samples dropped because the producer lapped the consumer.
    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    /// Samples written since the last [`RingBuffer::clear`].
    pub fn total_written(&self) -> u64 {
        self.write.load(Ordering::Acquire)
    }

    /// Appends `block`, overwriting the oldest unread samples when full.
    ///
    /// Producer side only. Does not allocate.
    pub fn write(&self, block: &SampleBlock) {
        assert_eq!(block.channel_count(), self.channels, "channel count mismatch");

        let n = block.len();
        if n == 0 {
            return;
        }

        let cap = self.capacity as u64;
        let start = self.write.load(Ordering::Relaxed);
        let end = start + n as u64;
        let floor = end.saturating_sub(cap);

        // claim the slots we are about to overwrite
        let mut r = self.read.load(Ordering::Acquire);
        while r < floor {
            match self
                .read
                .compare_exchange_weak(r, floor, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    self.overruns.fetch_add(floor - r, Ordering::Relaxed);
                    trace!("ring buffer overrun: dropped {} samples", floor - r);
                    break;
                }
                Err(current) => r = current,
            }
        }

        // pairs with the fence in `read`: a reader that observes any slot
        // stored below also observes the cursor bump above
        fence(Ordering::Release);

        let skip = n.saturating_sub(self.capacity);
        for index in skip..n {
            let slot = ((start + index as u64) % cap) as usize;
            let base = slot * self.channels;
            for (channel, value) in block.frame(index).iter().enumerate() {
                self.samples[base + channel].store(value.to_bits(), Ordering::Relaxed);
            }
            self.sample_numbers[slot].store(block.sample_numbers[index], Ordering::Relaxed);
            self.timestamps[slot].store(block.timestamps[index].to_bits(), Ordering::Relaxed);
            self.event_codes[slot].store(block.event_codes[index], Ordering::Relaxed);
        }

        self.write.store(end, Ordering::Release);
    }

    /// Moves up to `out.capacity()` of the oldest unread samples into `out`
    /// and returns how many were moved.
    ///
    /// Consumer side only.
    pub fn read(&self, out: &mut SampleBlock) -> usize {
        assert_eq!(out.channel_count(), self.channels, "channel count mismatch");

        let backoff = Backoff::new();
        loop {
            let r = self.read.load(Ordering::Acquire);
            let w = self.write.load(Ordering::Acquire);
            let count = (w.saturating_sub(r) as usize).min(out.capacity());
            if count == 0 {
                out.clear();
                return 0;
            }

            let cap = self.capacity as u64;
            for index in 0..count {
                let slot = ((r + index as u64) % cap) as usize;
                let base = slot * self.channels;
                for (channel, value) in out.frame_mut(index).iter_mut().enumerate() {
                    *value = f32::from_bits(self.samples[base + channel].load(Ordering::Relaxed));
                }
                out.set_meta(
                    index,
                    self.sample_numbers[slot].load(Ordering::Relaxed),
                    f64::from_bits(self.timestamps[slot].load(Ordering::Relaxed)),
                    self.event_codes[slot].load(Ordering::Relaxed),
                );
            }

            fence(Ordering::Acquire);

            if self
                .read
                .compare_exchange(r, r + count as u64, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                out.set_len(count);
                return count;
            }

            // overwritten under us, start again from the new read cursor
            backoff.spin();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn block_from(channels: usize, first: i64, n: usize) -> SampleBlock {
        let mut block = SampleBlock::new(channels, n);
        for i in 0..n {
            let sn = first + i as i64;
            for (ch, v) in block.frame_mut(i).iter_mut().enumerate() {
                *v = (sn * 10 + ch as i64) as f32;
            }
            block.set_meta(i, sn, sn as f64 / 1000.0, (sn & 1) as u64);
        }
        block.set_len(n);
        block
    }

    #[test]
    fn reads_back_in_order() {
        let rb = RingBuffer::new(2, 8);
        rb.write(&block_from(2, 0, 5));
        assert_eq!(rb.available(), 5);

        let mut out = SampleBlock::new(2, 16);
        assert_eq!(rb.read(&mut out), 5);
        assert_eq!(out.sample_numbers(), &[0, 1, 2, 3, 4]);
        assert_eq!(out.sample(3, 1), 31.0);
        assert_eq!(out.event_codes(), &[0, 1, 0, 1, 0]);
        assert_eq!(rb.available(), 0);
        assert_eq!(rb.overruns(), 0);
    }

    #[test]
    fn overflow_keeps_last_capacity_samples() {
        let cap = 6;
        let k = 4;
        let rb = RingBuffer::new(3, cap);
        rb.write(&block_from(3, 0, 5));
        rb.write(&block_from(3, 5, cap + k - 5));

        assert_eq!(rb.available(), cap);
        assert_eq!(rb.overruns(), k as u64);

        let mut out = SampleBlock::new(3, 32);
        assert_eq!(rb.read(&mut out), cap);
        assert_eq!(out.sample_numbers(), &[4, 5, 6, 7, 8, 9]);
        assert_eq!(out.sample(0, 2), 42.0);
    }

    #[test]
    fn oversized_block_keeps_its_tail() {
        let rb = RingBuffer::new(1, 4);
        rb.write(&block_from(1, 100, 10));

        let mut out = SampleBlock::new(1, 10);
        assert_eq!(rb.read(&mut out), 4);
        assert_eq!(out.sample_numbers(), &[106, 107, 108, 109]);
        assert_eq!(rb.overruns(), 6);
    }

    #[test]
    fn partial_reads_advance() {
        let rb = RingBuffer::new(1, 16);
        rb.write(&block_from(1, 0, 10));

        let mut out = SampleBlock::new(1, 4);
        assert_eq!(rb.read(&mut out), 4);
        assert_eq!(out.sample_numbers(), &[0, 1, 2, 3]);
        assert_eq!(rb.read(&mut out), 4);
        assert_eq!(out.sample_numbers(), &[4, 5, 6, 7]);
        assert_eq!(rb.read(&mut out), 2);
        assert_eq!(rb.read(&mut out), 0);
        assert!(out.is_empty());
    }

    #[test]
    fn clear_resets_cursors() {
        let rb = RingBuffer::new(2, 4);
        rb.write(&block_from(2, 0, 7));
        assert!(rb.overruns() > 0);

        rb.clear();
        assert_eq!(rb.available(), 0);
        assert_eq!(rb.overruns(), 0);
        assert_eq!(rb.total_written(), 0);
    }

    #[test]
    fn concurrent_reader_sees_contiguous_runs() {
        let rb = Arc::new(RingBuffer::new(2, 64));
        let total: i64 = 20_000;

        crossbeam::thread::scope(|s| {
            let producer = rb.clone();
            s.spawn(move |_| {
                let mut next = 0;
                while next < total {
                    let n = 7usize.min((total - next) as usize);
                    producer.write(&block_from(2, next, n));
                    next += n as i64;
                }
            });

            let mut out = SampleBlock::new(2, 16);
            let mut last = -1;
            while last < total - 1 {
                if rb.read(&mut out) == 0 {
                    std::thread::yield_now();
                    continue;
                }
                for i in 0..out.len() {
                    let sn = out.sample_numbers()[i];
                    assert!(sn > last, "sample {} after {}", sn, last);
                    assert_eq!(out.sample(i, 1), (sn * 10 + 1) as f32);
                    last = sn;
                }
            }
        })
        .unwrap();

        assert_eq!(rb.total_written(), total as u64);
    }
}
