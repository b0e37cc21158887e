//! Live audio to latent-space visualiser: captured stereo audio is reduced to
//! a spectral weight vector each cycle, which steers a unit direction through
//! a fixed basis of seeded noise vectors fed to an image generator.

pub mod audio;
pub mod cli;
pub mod config;
pub mod display;
pub mod error;
pub mod latent;
pub mod models;
pub mod pipeline;
pub mod render;

pub use error::{PipelineError, Result};
