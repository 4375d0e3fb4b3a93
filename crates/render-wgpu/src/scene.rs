use glam::{Mat4, Vec3};
use prism_dispersion::SceneGraph;

/// Values from `start` up to (not including) `end`, `step` apart.
pub fn range(start: f32, end: f32, step: f32) -> Vec<f32> {
    if step <= 0.0 || !step.is_finite() {
        return Vec::new();
    }
    let count = ((end - start) / step).ceil().max(0.0) as usize;
    (0..count).map(|i| start + i as f32 * step).collect()
}

/// Column/row placements for the decorative backdrop, on a plane behind the
/// refractive object.
pub fn background_grid(extent: f32, spacing: f32, depth: f32) -> Vec<Vec3> {
    let columns = range(-extent, extent, spacing);
    let rows = range(-extent, extent, spacing);
    columns
        .iter()
        .flat_map(|&x| rows.iter().map(move |&y| Vec3::new(x, y, depth)))
        .collect()
}

/// The object drawn with the dispersion material.
#[derive(Debug, Clone, PartialEq)]
pub struct RefractiveMesh {
    pub transform: Mat4,
    pub visible: bool,
}

impl Default for RefractiveMesh {
    fn default() -> Self {
        Self {
            transform: Mat4::IDENTITY,
            visible: true,
        }
    }
}

/// Demo scene: a grid of opaque spheres behind one refractive mesh.
#[derive(Debug, Clone)]
pub struct PrismScene {
    pub background: Vec<Vec3>,
    pub background_radius: f32,
    pub refractive: RefractiveMesh,
    /// Optional slow spin of the refractive mesh, radians per second.
    pub spin: f32,
}

impl Default for PrismScene {
    fn default() -> Self {
        Self {
            background: background_grid(7.5, 2.5, -4.0),
            background_radius: 0.5,
            refractive: RefractiveMesh::default(),
            spin: 0.0,
        }
    }
}

impl PrismScene {
    /// Background sphere model matrices.
    pub fn background_transforms(&self) -> Vec<Mat4> {
        self.background
            .iter()
            .map(|p| Mat4::from_scale_rotation_translation(
                Vec3::splat(self.background_radius),
                glam::Quat::IDENTITY,
                *p,
            ))
            .collect()
    }

    pub fn advance(&mut self, dt: f32) {
        if self.spin != 0.0 {
            self.refractive.transform =
                Mat4::from_rotation_y(self.spin * dt) * self.refractive.transform;
        }
    }
}

impl SceneGraph for PrismScene {
    fn refractive_visible(&self) -> bool {
        self.refractive.visible
    }

    fn set_refractive_visible(&mut self, visible: bool) {
        self.refractive.visible = visible;
    }
}
