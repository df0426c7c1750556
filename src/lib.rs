pub mod clock;
pub mod compass;
pub mod compass_sensor;
pub mod config;
pub mod content;
pub mod error;
pub mod heading_filter;
pub mod hijri;
pub mod location;
pub mod next_prayer;
pub mod orientation;
pub mod position;
pub mod prayer;
pub mod qibla;
pub mod solar;
pub mod weather;

// Re-export commonly used types
pub use error::{Error, Result};
pub use position::Position;

// This module is only compiled during testing.
#[cfg(test)]
pub(crate) mod mocks;
