//! Chromatic dispersion core: renderer-agnostic half of the prism pipeline.
//!
//! Each frame the background is captured off-screen with the refractive mesh
//! hidden, then the mesh is drawn with a shader that samples the capture
//! through six simulated spectral bands.
//!
//! # Invariants
//! - The refractive mesh is hidden for the capture pass and visible for the
//!   composite pass.
//! - The material changes only through explicit parameter updates.
//! - Resizes are applied between frames, never while a capture is in flight.
//! - Shading output is unclamped; tone mapping belongs to the host.

pub mod band;
pub mod frame;
pub mod material;
pub mod params;
pub mod resolution;
pub mod shading;

pub use band::{BAND_SAMPLES, Band, BandValues, MAX_BAND_SAMPLES};
pub use frame::{
    FrameContext, FrameError, FrameOrchestrator, FrameOutcome, FrameStats, RenderBackend,
    SceneGraph,
};
pub use material::{CaptureHandle, DispersionMaterial};
pub use params::{ConfigError, DispersionParams, ParamError, ParamUpdate};
pub use resolution::{OutputResolution, Viewport};
pub use shading::{Fragment, SolidColor, TexelGrid, TextureSampler, shade_fragment};
