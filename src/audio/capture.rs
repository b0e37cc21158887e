use crossbeam::queue::ArrayQueue;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::thread::{self, Thread};

use crate::error::{PipelineError, Result};

/// One captured instant of stereo audio.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SampleFrame {
    pub left: i32,
    pub right: i32,
}

impl SampleFrame {
    pub fn new(left: i32, right: i32) -> Self {
        Self { left, right }
    }

    pub fn mono(&self) -> f64 {
        self.left as f64 + self.right as f64
    }
}

/// Which end of the buffer the consumer removes frames from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractOrder {
    /// Most recently captured frame first. Under backpressure the freshest
    /// audio is analysed and stale frames age out through the capacity cap.
    #[default]
    NewestFirst,
    /// Arrival order.
    OldestFirst,
}

/// Bounded capture buffer shared by the audio callback and the analysis loop.
///
/// The producer side is a lock-free bounded queue: `append` is a single
/// `force_push` plus an atomic counter update, so the audio thread never
/// blocks or allocates. Consumers drain that queue into a staging deque that
/// only they lock, which is what makes newest-first removal possible.
pub struct RingCapture {
    incoming: ArrayQueue<SampleFrame>,
    staged: Mutex<VecDeque<SampleFrame>>,
    capacity: usize,
    dropped: AtomicU64,
    closed: AtomicBool,
    consumer: OnceLock<Thread>,
}

impl RingCapture {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(PipelineError::InvalidConfig(
                "capture capacity must be at least one frame".into(),
            ));
        }
        Ok(Self {
            incoming: ArrayQueue::new(capacity),
            staged: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            consumer: OnceLock::new(),
        })
    }

    /// Producer entry point. Wait-free; evicts the oldest queued frame when full.
    pub fn append(&self, frame: SampleFrame) {
        if self.incoming.force_push(frame).is_some() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Wake the registered consumer, if any. Called once per audio period
    /// rather than once per frame.
    pub fn notify(&self) {
        if let Some(consumer) = self.consumer.get() {
            consumer.unpark();
        }
    }

    /// Record the calling thread as the one `notify` wakes. Only the first
    /// registration sticks; other waiters rely on their park timeout.
    pub fn register_consumer(&self) {
        let _ = self.consumer.set(thread::current());
    }

    pub fn pop_newest(&self) -> Result<SampleFrame> {
        self.sync().pop_back().ok_or(PipelineError::Empty)
    }

    pub fn pop_oldest(&self) -> Result<SampleFrame> {
        self.sync().pop_front().ok_or(PipelineError::Empty)
    }

    /// Remove exactly `n` frames in `order`, appending them to `out`.
    /// Nothing is removed when fewer than `n` frames are buffered.
    pub fn take(&self, n: usize, order: ExtractOrder, out: &mut Vec<SampleFrame>) -> Result<()> {
        let mut staged = self.sync();
        if staged.len() < n {
            return Err(PipelineError::Empty);
        }
        out.reserve(n);
        match order {
            ExtractOrder::NewestFirst => {
                let start = staged.len() - n;
                out.extend(staged.drain(start..).rev());
            }
            ExtractOrder::OldestFirst => out.extend(staged.drain(..n)),
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.sync().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames evicted by the capacity cap since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    // Move everything the producer queued so far into staging, then enforce
    // the cap on staging by evicting its oldest frames.
    fn sync(&self) -> MutexGuard<'_, VecDeque<SampleFrame>> {
        let mut staged = self
            .staged
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        while let Some(frame) = self.incoming.pop() {
            staged.push_back(frame);
        }
        if staged.len() > self.capacity {
            let excess = staged.len() - self.capacity;
            staged.drain(..excess);
            self.dropped.fetch_add(excess as u64, Ordering::Relaxed);
        }
        staged
    }
}

/// Sample types a capture device may deliver, mapped onto the i32 range.
pub trait CaptureSample: Copy {
    fn to_i32(self) -> i32;
}

impl CaptureSample for i32 {
    fn to_i32(self) -> i32 {
        self
    }
}

impl CaptureSample for i16 {
    fn to_i32(self) -> i32 {
        (self as i32) << 16
    }
}

impl CaptureSample for u16 {
    fn to_i32(self) -> i32 {
        (self as i32 - 32768) << 16
    }
}

impl CaptureSample for f32 {
    fn to_i32(self) -> i32 {
        // `as` saturates, so out-of-range input clips instead of wrapping
        (self.clamp(-1.0, 1.0) as f64 * i32::MAX as f64) as i32
    }
}

/// Decode a little-endian i32 byte buffer. Trailing partial words are ignored.
pub fn decode_le_i32(bytes: &[u8]) -> impl Iterator<Item = i32> + '_ {
    bytes
        .chunks_exact(4)
        .map(|word| i32::from_le_bytes([word[0], word[1], word[2], word[3]]))
}

/// Producer-side handle registered with the audio backend.
#[derive(Clone)]
pub struct CaptureCallback {
    capture: Arc<RingCapture>,
}

impl CaptureCallback {
    pub fn new(capture: Arc<RingCapture>) -> Self {
        Self { capture }
    }

    /// Accept one processing cycle of per-channel byte buffers.
    pub fn process(&self, left: &[u8], right: &[u8], frame_count: usize) {
        for (l, r) in decode_le_i32(left)
            .zip(decode_le_i32(right))
            .take(frame_count)
        {
            self.capture.append(SampleFrame::new(l, r));
        }
        self.capture.notify();
    }

    /// Accept interleaved device samples. Mono input is mirrored to both
    /// sides; channels past the second are ignored.
    pub fn process_interleaved<T: CaptureSample>(&self, data: &[T], channels: usize) {
        if channels == 0 {
            return;
        }
        for chunk in data.chunks_exact(channels) {
            let left = chunk[0].to_i32();
            let right = if channels > 1 { chunk[1].to_i32() } else { left };
            self.capture.append(SampleFrame::new(left, right));
        }
        self.capture.notify();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(n: i32) -> SampleFrame {
        SampleFrame::new(n, -n)
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            RingCapture::new(0),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_pop_newest_is_lifo() {
        let capture = RingCapture::new(8).unwrap();
        for n in 1..=3 {
            capture.append(frame(n));
        }
        assert_eq!(capture.pop_newest().unwrap(), frame(3));
        assert_eq!(capture.pop_newest().unwrap(), frame(2));
        assert_eq!(capture.len(), 1);
    }

    #[test]
    fn test_pop_oldest_is_fifo() {
        let capture = RingCapture::new(8).unwrap();
        for n in 1..=3 {
            capture.append(frame(n));
        }
        assert_eq!(capture.pop_oldest().unwrap(), frame(1));
        assert_eq!(capture.pop_oldest().unwrap(), frame(2));
    }

    #[test]
    fn test_pop_empty() {
        let capture = RingCapture::new(4).unwrap();
        assert_eq!(capture.pop_newest(), Err(PipelineError::Empty));
        assert_eq!(capture.pop_oldest(), Err(PipelineError::Empty));
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let capture = RingCapture::new(4).unwrap();
        for n in 0..10 {
            capture.append(frame(n));
        }
        assert_eq!(capture.len(), 4);
        assert_eq!(capture.dropped(), 6);
        assert_eq!(capture.pop_oldest().unwrap(), frame(6));
        assert_eq!(capture.pop_newest().unwrap(), frame(9));
    }

    #[test]
    fn test_staged_frames_respect_capacity() {
        let capture = RingCapture::new(4).unwrap();
        for n in 0..4 {
            capture.append(frame(n));
        }
        // Moves the first four into staging
        assert_eq!(capture.len(), 4);
        for n in 4..7 {
            capture.append(frame(n));
        }
        assert_eq!(capture.len(), 4);
        assert_eq!(capture.dropped(), 3);
        assert_eq!(capture.pop_oldest().unwrap(), frame(3));
    }

    #[test]
    fn test_take_short_removes_nothing() {
        let capture = RingCapture::new(8).unwrap();
        capture.append(frame(1));
        let mut out = Vec::new();
        assert_eq!(
            capture.take(2, ExtractOrder::NewestFirst, &mut out),
            Err(PipelineError::Empty)
        );
        assert!(out.is_empty());
        assert_eq!(capture.len(), 1);
    }

    #[test]
    fn test_take_orders() {
        let capture = RingCapture::new(8).unwrap();
        for n in 1..=5 {
            capture.append(frame(n));
        }
        let mut out = Vec::new();
        capture.take(2, ExtractOrder::NewestFirst, &mut out).unwrap();
        assert_eq!(out, vec![frame(5), frame(4)]);

        out.clear();
        capture.take(2, ExtractOrder::OldestFirst, &mut out).unwrap();
        assert_eq!(out, vec![frame(1), frame(2)]);
        assert_eq!(capture.len(), 1);
    }

    #[test]
    fn test_decode_le_i32() {
        let mut bytes = Vec::new();
        for v in [1i32, -2, i32::MAX, i32::MIN] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes.push(0xff); // partial word
        let decoded: Vec<i32> = decode_le_i32(&bytes).collect();
        assert_eq!(decoded, vec![1, -2, i32::MAX, i32::MIN]);
    }

    #[test]
    fn test_process_pairs_channels() {
        let capture = Arc::new(RingCapture::new(16).unwrap());
        let callback = CaptureCallback::new(Arc::clone(&capture));
        let left: Vec<u8> = [10i32, 20, 30].iter().flat_map(|v| v.to_le_bytes()).collect();
        let right: Vec<u8> = [1i32, 2, 3].iter().flat_map(|v| v.to_le_bytes()).collect();

        callback.process(&left, &right, 2);

        assert_eq!(capture.len(), 2);
        assert_eq!(capture.pop_oldest().unwrap(), SampleFrame::new(10, 1));
        assert_eq!(capture.pop_oldest().unwrap(), SampleFrame::new(20, 2));
    }

    #[test]
    fn test_process_interleaved_mono_and_surround() {
        let capture = Arc::new(RingCapture::new(16).unwrap());
        let callback = CaptureCallback::new(Arc::clone(&capture));

        callback.process_interleaved(&[5i32, 6], 1);
        assert_eq!(capture.pop_oldest().unwrap(), SampleFrame::new(5, 5));
        assert_eq!(capture.pop_oldest().unwrap(), SampleFrame::new(6, 6));

        callback.process_interleaved(&[1i32, 2, 3, 4, 5, 6], 3);
        assert_eq!(capture.pop_oldest().unwrap(), SampleFrame::new(1, 2));
        assert_eq!(capture.pop_oldest().unwrap(), SampleFrame::new(4, 5));
    }

    #[test]
    fn test_sample_conversion() {
        assert_eq!(1.0f32.to_i32(), i32::MAX);
        assert_eq!(2.0f32.to_i32(), i32::MAX);
        assert_eq!(0.0f32.to_i32(), 0);
        assert_eq!(i16::MIN.to_i32(), i32::MIN);
        assert_eq!(32768u16.to_i32(), 0);
    }

    #[test]
    fn test_concurrent_producer_keeps_bound() {
        let capture = Arc::new(RingCapture::new(64).unwrap());
        let producer = {
            let capture = Arc::clone(&capture);
            thread::spawn(move || {
                for n in 0..10_000 {
                    capture.append(frame(n));
                }
            })
        };
        let mut seen = 0usize;
        while !producer.is_finished() {
            if capture.pop_newest().is_ok() {
                seen += 1;
            }
        }
        producer.join().unwrap();
        assert!(capture.len() <= capture.capacity());
        assert_eq!(
            seen as u64 + capture.len() as u64 + capture.dropped(),
            10_000
        );
    }
}
