//! Configuration loading and flag merging

mod loader;

pub use loader::{ConfigOverrides, KeyferryConfig, CONFIG_FILE_NAMES};
