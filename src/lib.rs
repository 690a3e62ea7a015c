//! Fossil Sandbox
//!
//! Compositing engine for an augmented-reality sandbox. A depth sensor looks
//! down at a sand surface, a projector paints the surface, and buried fossils
//! appear only where the sand has been dug out deep enough:
//! - Perspective calibration from four control points to a canonical rectangle
//! - Collision-free procedural fossil placement into co-registered scene layers
//! - Temporal smoothing of flickering depth data
//! - Per-frame warp, normalize, threshold and composite

pub mod calibration;
pub mod compositor;
pub mod config;
pub mod display;
pub mod error;
pub mod filter;
pub mod frame;
pub mod scene;
pub mod sensor;
pub mod session;
pub mod telemetry;

pub use error::{Result, SandboxError};
