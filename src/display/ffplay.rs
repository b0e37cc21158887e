use anyhow::{Context, Result};
use std::io::Write;
use std::process::{Child, Command, Stdio};

use super::FrameSink;
use crate::render::RgbImage;

/// Shows frames in an `ffplay` window fed raw RGB over stdin.
pub struct FfplaySink {
    child: Child,
    width: u32,
    height: u32,
}

impl FfplaySink {
    pub fn new(width: u32, height: u32, title: &str) -> Result<Self> {
        let args = ffplay_args(width, height, title);

        let child = Command::new("ffplay")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .context("Failed to spawn ffplay. Is ffmpeg installed?")?;

        log::info!("Display started: ffplay {}x{}", width, height);

        Ok(Self::with_child(child, width, height))
    }

    fn with_child(child: Child, width: u32, height: u32) -> Self {
        Self {
            child,
            width,
            height,
        }
    }
}

fn ffplay_args(width: u32, height: u32, title: &str) -> Vec<String> {
    vec![
        "-loglevel".into(), "error".into(),
        "-fflags".into(), "nobuffer".into(),
        "-flags".into(), "low_delay".into(),
        "-f".into(), "rawvideo".into(),
        "-pixel_format".into(), "rgb24".into(),
        "-video_size".into(), format!("{}x{}", width, height),
        "-window_title".into(), title.to_string(),
        "-i".into(), "pipe:0".into(),
    ]
}

impl FrameSink for FfplaySink {
    fn present(&mut self, image: &RgbImage) -> Result<()> {
        if image.width != self.width || image.height != self.height {
            anyhow::bail!(
                "Frame is {}x{}, display expects {}x{}",
                image.width,
                image.height,
                self.width,
                self.height
            );
        }
        let stdin = self.child.stdin.as_mut().context("ffplay stdin not available")?;
        stdin
            .write_all(&image.pixels)
            .context("Failed to write frame to ffplay (window closed?)")?;
        stdin.flush().context("Failed to flush frame to ffplay")?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        // Closing stdin ends the stream. ffplay keeps its window open after
        // that, so a still-running player is killed, then reaped.
        drop(self.child.stdin.take());
        let status = match self.child.try_wait().context("Failed to poll ffplay")? {
            Some(status) => status,
            None => {
                let _ = self.child.kill();
                self.child.wait().context("Failed to reap ffplay")?;
                log::info!("Display closed");
                return Ok(());
            }
        };
        if !status.success() {
            anyhow::bail!("ffplay exited with {}", status);
        }
        log::info!("Display closed");
        Ok(())
    }
}
