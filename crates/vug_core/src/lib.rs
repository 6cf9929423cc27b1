//! VUG Core - Backend logic for Video Upscale GUI
//!
//! This crate contains all business logic with zero UI dependencies:
//! backend provisioning (portable runtime, plugins, models, ffmpeg),
//! pipeline config generation, external process orchestration, and
//! workflow validation. It can be used by the GUI application or a
//! headless driver.

pub mod backend;
pub mod config;
pub mod console;
pub mod logging;
pub mod models;
pub mod provision;
pub mod sync;
pub mod upscale;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_returns_value() {
        assert!(!version().is_empty());
    }
}
