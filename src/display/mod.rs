//! Render sinks that receive one image per emitted cycle.

pub mod ffplay;

use anyhow::Result;

use crate::render::RgbImage;

pub trait FrameSink {
    fn present(&mut self, image: &RgbImage) -> Result<()>;

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<T: FrameSink + ?Sized> FrameSink for Box<T> {
    fn present(&mut self, image: &RgbImage) -> Result<()> {
        (**self).present(image)
    }

    fn finish(&mut self) -> Result<()> {
        (**self).finish()
    }
}

/// Discards frames; for headless runs.
#[derive(Debug, Default)]
pub struct NullSink {
    pub presented: u64,
}

impl FrameSink for NullSink {
    fn present(&mut self, image: &RgbImage) -> Result<()> {
        self.presented += 1;
        log::trace!("Discarding {}x{} frame", image.width, image.height);
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DisplayKind {
    /// Window via `ffplay`.
    #[default]
    Ffplay,
    /// No display; frames are rendered and discarded.
    #[serde(alias = "none")]
    #[value(alias = "none")]
    Headless,
}
