use crossbeam::utils::Backoff;
use std::thread;
use std::time::Duration;

use super::capture::{ExtractOrder, RingCapture, SampleFrame};
use crate::error::{PipelineError, Result};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Pulls fixed-size mono frames out of a [`RingCapture`].
///
/// Must run on the consumer thread, never inside the audio callback: it
/// blocks until enough audio has arrived.
pub struct FrameExtractor {
    frame_count: usize,
    order: ExtractOrder,
    poll_interval: Duration,
    scratch: Vec<SampleFrame>,
}

impl FrameExtractor {
    pub fn new(frame_count: usize, order: ExtractOrder, poll_interval: Duration) -> Result<Self> {
        if frame_count == 0 {
            return Err(PipelineError::InvalidConfig(
                "samples per frame must be greater than zero".into(),
            ));
        }
        Ok(Self {
            frame_count,
            order,
            poll_interval,
            scratch: Vec::with_capacity(frame_count),
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Block until `frame_count` frames are buffered, then remove them and
    /// sum each stereo pair into one mono sample.
    pub fn extract(&mut self, capture: &RingCapture) -> Result<Vec<f64>> {
        self.wait_for_samples(capture)?;
        self.take_mono(capture)
    }

    /// Remove one frame's worth of buffered audio without waiting; `Empty`
    /// if not enough has arrived.
    pub fn take_mono(&mut self, capture: &RingCapture) -> Result<Vec<f64>> {
        self.scratch.clear();
        capture.take(self.frame_count, self.order, &mut self.scratch)?;
        Ok(self.scratch.iter().map(SampleFrame::mono).collect())
    }

    /// Spin briefly, then park with a timeout, until a full frame is
    /// buffered or the buffer is closed.
    pub fn wait_for_samples(&self, capture: &RingCapture) -> Result<()> {
        let backoff = Backoff::new();
        let mut registered = false;
        loop {
            if capture.len() >= self.frame_count {
                return Ok(());
            }
            if capture.is_closed() {
                return Err(PipelineError::Closed);
            }
            if backoff.is_completed() {
                if !registered {
                    capture.register_consumer();
                    registered = true;
                }
                thread::park_timeout(self.poll_interval);
            } else {
                backoff.snooze();
            }
        }
    }
}

/// One-shot extraction with the default policy.
pub fn extract(capture: &RingCapture, frame_count: usize) -> Result<Vec<f64>> {
    FrameExtractor::new(frame_count, ExtractOrder::default(), DEFAULT_POLL_INTERVAL)?
        .extract(capture)
}
