//! Lucent demo viewer.
//!
//! Ray traces an analytic sphere/plane/triangle scene in a compute shader
//! and presents the result as a fullscreen image.
//!
//! ```bash
//! cargo run -p lucent-viewer
//! ```
//!
//! Shader binaries are loaded from `shaders/` next to the working
//! directory; set `RUST_LOG` to adjust log output.

mod app;

use lucent_app::{run_app, AppConfig};

use crate::app::Raytracer;

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

fn main() -> anyhow::Result<()> {
    run_app::<Raytracer>(AppConfig::new("Lucent Raytracer").with_size(WIDTH, HEIGHT))
}
