use crate::params::{DispersionParams, ParamError, ParamUpdate};
use crate::resolution::OutputResolution;

/// Reference to a completed off-screen capture.
///
/// The generation changes every time the backing texture is reallocated, so
/// consumers can tell a fresh texture from the one they already bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CaptureHandle {
    pub generation: u64,
    pub resolution: OutputResolution,
}

/// Uniform store of one dispersive object.
#[derive(Debug, Clone, PartialEq)]
pub struct DispersionMaterial {
    params: DispersionParams,
    output_resolution: OutputResolution,
    captured: Option<CaptureHandle>,
    revision: u64,
}

impl DispersionMaterial {
    pub fn new(params: DispersionParams) -> Result<Self, ParamError> {
        params.validate()?;
        Ok(Self {
            params,
            output_resolution: OutputResolution::default(),
            captured: None,
            revision: 0,
        })
    }

    pub fn params(&self) -> &DispersionParams {
        &self.params
    }

    /// Apply a partial update. The update is validated as a whole; on error
    /// nothing changes.
    pub fn update_parameters(&mut self, update: &ParamUpdate) -> Result<(), ParamError> {
        if update.is_empty() {
            return Ok(());
        }
        let next = update.applied_to(&self.params);
        next.validate()?;
        if next != self.params {
            self.params = next;
            self.revision += 1;
            tracing::debug!(revision = self.revision, "dispersion parameters updated");
        }
        Ok(())
    }

    pub fn output_resolution(&self) -> OutputResolution {
        self.output_resolution
    }

    pub fn set_output_resolution(&mut self, resolution: OutputResolution) {
        if resolution != self.output_resolution {
            self.output_resolution = resolution;
            self.revision += 1;
        }
    }

    /// The texture captured this frame, if the capture pass has completed.
    pub fn captured(&self) -> Option<CaptureHandle> {
        self.captured
    }

    pub fn bind_capture(&mut self, handle: CaptureHandle) {
        self.captured = Some(handle);
    }

    /// Drop the texture reference before the capture target is written again.
    pub fn release_capture(&mut self) {
        self.captured = None;
    }

    /// Bumped on every parameter or resolution change; lets backends skip
    /// uniform uploads when nothing moved.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

impl Default for DispersionMaterial {
    fn default() -> Self {
        Self {
            params: DispersionParams::default(),
            output_resolution: OutputResolution::default(),
            captured: None,
            revision: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn new_rejects_invalid_params() {
        let params = DispersionParams {
            fresnel_power: 0.0,
            ..DispersionParams::default()
        };
        assert!(DispersionMaterial::new(params).is_err());
    }

    #[test]
    fn invalid_update_leaves_material_untouched() {
        let mut material = DispersionMaterial::default();
        let before = material.clone();
        let update = ParamUpdate {
            saturation: Some(0.3),
            shininess: Some(-1.0),
            ..ParamUpdate::default()
        };
        assert!(material.update_parameters(&update).is_err());
        assert_eq!(material, before);
    }

    #[test]
    fn revision_tracks_real_changes() {
        let mut material = DispersionMaterial::default();
        let light = Vec3::new(0.0, 1.0, 0.0);
        material
            .update_parameters(&ParamUpdate::light_direction(light))
            .unwrap();
        assert_eq!(material.revision(), 1);
        assert_eq!(material.params().light_direction, light);

        // Same value again is not a change.
        material
            .update_parameters(&ParamUpdate::light_direction(light))
            .unwrap();
        assert_eq!(material.revision(), 1);

        material.set_output_resolution(OutputResolution::new(640, 480));
        assert_eq!(material.revision(), 2);
    }

    #[test]
    fn capture_binding_lifecycle() {
        let mut material = DispersionMaterial::default();
        assert!(material.captured().is_none());
        let handle = CaptureHandle {
            generation: 3,
            resolution: OutputResolution::new(4, 4),
        };
        material.bind_capture(handle);
        assert_eq!(material.captured(), Some(handle));
        material.release_capture();
        assert!(material.captured().is_none());
    }
}
