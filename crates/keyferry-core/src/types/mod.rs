//! Type definitions shared across keyferry crates

mod config_types;
mod resource_types;
mod retry_types;

pub use config_types::*;
pub use resource_types::*;
pub use retry_types::*;
