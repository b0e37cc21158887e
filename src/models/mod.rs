//! Generator models: manifests, discovery and shader parameter injection.

pub mod embedded;
pub mod loader;
pub mod manifest;
