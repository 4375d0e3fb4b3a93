//! wgpu backend for the prism dispersion renderer.
//!
//! Each frame records two passes into one encoder: the backdrop is rendered
//! into an off-screen capture with the refractive mesh hidden, then the
//! surface pass draws the backdrop again plus the refractive mesh, which
//! samples the capture through the six-band dispersion program.
//!
//! # Invariants
//! - The capture never contains the refractive mesh.
//! - The dispersion program samples either a completed capture or the
//!   neutral fallback texel, never a stale or unwritten target.
//! - Capture and depth targets are reallocated only between frames.

mod camera;
mod capture;
mod gpu;
mod mesh;
mod scene;
mod shaders;
mod uniforms;

pub use camera::OrbitCamera;
pub use capture::{DEPTH_FORMAT, OffscreenCapture};
pub use gpu::{CLEAR_COLOR, DispersionRenderer, PipelineError, WgpuFrame};
pub use mesh::{MeshData, Vertex, icosphere};
pub use scene::{PrismScene, RefractiveMesh, background_grid, range};
pub use shaders::{DISPERSION_SHADER, SCENE_SHADER};
pub use uniforms::{CameraUniforms, DispersionUniforms, InstanceData};
