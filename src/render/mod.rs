pub mod frame;
pub mod generator;
pub mod gpu;
pub mod synth;

pub use frame::RgbImage;
pub use synth::Synthesizer;
