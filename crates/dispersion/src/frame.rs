//! Per-frame sequencing of the capture and composite passes.

use crate::material::{CaptureHandle, DispersionMaterial};
use crate::params::{DispersionParams, ParamError, ParamUpdate};
use crate::resolution::{OutputResolution, Viewport};

/// Transient per-frame failures. The frame is dropped and retried next tick.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("graphics context lost")]
    ContextLost,
    #[error("presentation surface is outdated")]
    SurfaceOutdated,
    #[error("surface error: {0}")]
    Surface(String),
    #[error("refractive mesh visible during capture")]
    CaptureFeedback,
}

/// The part of the scene graph the orchestrator touches.
pub trait SceneGraph {
    fn refractive_visible(&self) -> bool;
    fn set_refractive_visible(&mut self, visible: bool);
}

/// Graphics context for one frame.
///
/// `capture` must bind the off-screen target, render the scene into it and
/// restore the default output before returning. `composite` is the default
/// render pass that draws the scene, refractive mesh included, to the
/// presentation target.
pub trait RenderBackend {
    type Scene: SceneGraph;
    type Camera;

    /// Reallocate the off-screen target. Only called between frames.
    fn resize(&mut self, resolution: OutputResolution);

    fn capture(
        &mut self,
        scene: &Self::Scene,
        camera: &Self::Camera,
    ) -> Result<CaptureHandle, FrameError>;

    fn composite(
        &mut self,
        scene: &Self::Scene,
        camera: &Self::Camera,
        material: &DispersionMaterial,
    ) -> Result<(), FrameError>;
}

/// Everything the host hands over for one frame.
pub struct FrameContext<'a, B: RenderBackend> {
    pub backend: &'a mut B,
    pub scene: &'a mut B::Scene,
    pub camera: &'a B::Camera,
}

/// Result of one frame attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented,
    Skipped(FrameError),
}

/// Presented and skipped frame totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub presented: u64,
    pub skipped: u64,
}

/// Runs the two-pass dispersion pipeline and owns the material it feeds.
#[derive(Debug)]
pub struct FrameOrchestrator {
    material: DispersionMaterial,
    pending_update: Option<ParamUpdate>,
    pending_viewport: Option<Viewport>,
    stats: FrameStats,
}

impl FrameOrchestrator {
    pub fn new(params: DispersionParams, viewport: Viewport) -> Result<Self, ParamError> {
        let material = DispersionMaterial::new(params)?;
        Ok(Self {
            material,
            pending_update: None,
            pending_viewport: Some(viewport),
            stats: FrameStats::default(),
        })
    }

    pub fn material(&self) -> &DispersionMaterial {
        &self.material
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Queue a parameter change for the next frame. Rejected updates never
    /// reach the material.
    pub fn queue_update(&mut self, update: ParamUpdate) -> Result<(), ParamError> {
        let merged = match self.pending_update {
            Some(pending) => pending.merge(update),
            None => update,
        };
        merged.applied_to(self.material.params()).validate()?;
        self.pending_update = Some(merged);
        Ok(())
    }

    pub fn has_pending_update(&self) -> bool {
        self.pending_update.is_some()
    }

    /// Record a presentation size change; applied before the next capture.
    pub fn notify_resize(&mut self, viewport: Viewport) {
        self.pending_viewport = Some(viewport);
    }

    /// Run one frame. A failed frame leaves no partial state behind; the next
    /// call starts over from the first step.
    pub fn run_frame<B: RenderBackend>(&mut self, ctx: FrameContext<'_, B>) -> FrameOutcome {
        let FrameContext {
            backend,
            scene,
            camera,
        } = ctx;

        if let Some(viewport) = self.pending_viewport.take() {
            let resolution = viewport.output_resolution();
            tracing::info!(
                width = resolution.width(),
                height = resolution.height(),
                "resizing capture target"
            );
            backend.resize(resolution);
            self.material.set_output_resolution(resolution);
        }

        scene.set_refractive_visible(false);
        self.material.release_capture();
        let handle = match backend.capture(scene, camera) {
            Ok(handle) => handle,
            Err(e) => {
                scene.set_refractive_visible(true);
                return self.skip(e);
            }
        };
        self.material.bind_capture(handle);
        scene.set_refractive_visible(true);

        if let Some(update) = self.pending_update.take() {
            if let Err(e) = self.material.update_parameters(&update) {
                // Validated when queued; only reachable if params moved underneath.
                tracing::warn!("dropping parameter update: {e}");
            }
        }

        if let Err(e) = backend.composite(scene, camera, &self.material) {
            return self.skip(e);
        }

        self.stats.presented += 1;
        tracing::trace!(frame = self.stats.presented, "frame presented");
        FrameOutcome::Presented
    }

    fn skip(&mut self, error: FrameError) -> FrameOutcome {
        self.stats.skipped += 1;
        tracing::warn!("skipping frame: {error}");
        FrameOutcome::Skipped(error)
    }
}
