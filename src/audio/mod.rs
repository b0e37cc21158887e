//! Audio capture and spectral analysis.

pub mod bins;
pub mod capture;
pub mod device;
pub mod extract;
pub mod spectral;
