//! Hybrid raytracing pipeline for Lucent.
//!
//! This crate provides:
//! - Plain-old-data scene records and the per-frame uniform block
//! - The compute trace stage writing a storage texture
//! - The fullscreen present stage sampling it
//! - A sample-history array texture fed by inter-image copies

pub mod history;
pub mod present;
pub mod scene;
pub mod trace;

pub use history::SampleHistory;
pub use present::PresentPipeline;
pub use scene::{Plane, SceneUniforms, Sphere, Triangle};
pub use trace::TracePipeline;
