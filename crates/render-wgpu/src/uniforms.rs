//! GPU-side uniform layouts. Every field is a `vec4` so the Rust and WGSL
//! layouts agree without manual padding.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use prism_dispersion::DispersionMaterial;

/// Shared by the background and dispersion programs.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct CameraUniforms {
    pub view_proj: [[f32; 4]; 4],
    /// Model matrix of the refractive mesh.
    pub model: [[f32; 4]; 4],
    /// World-space camera position; w unused.
    pub position: [f32; 4],
}

impl CameraUniforms {
    pub fn new(view_proj: Mat4, model: Mat4, position: Vec3) -> Self {
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            model: model.to_cols_array_2d(),
            position: position.extend(1.0).to_array(),
        }
    }
}

/// Dispersion material packed for the fragment stage.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct DispersionUniforms {
    /// IOR for red, yellow, green, cyan.
    pub ior_rygc: [f32; 4],
    /// IOR for blue, purple; refract power; chromatic aberration.
    pub ior_bp_power_aberration: [f32; 4],
    /// Light direction xyz; saturation in w.
    pub light_saturation: [f32; 4],
    /// Shininess, diffuseness, fresnel power, band sample count.
    pub shading: [f32; 4],
    /// Output resolution in xy; zw unused.
    pub resolution: [f32; 4],
}

impl DispersionUniforms {
    pub fn from_material(material: &DispersionMaterial) -> Self {
        let p = material.params();
        let res = material.output_resolution().as_vec2();
        Self {
            ior_rygc: [p.ior_red, p.ior_yellow, p.ior_green, p.ior_cyan],
            ior_bp_power_aberration: [
                p.ior_blue,
                p.ior_purple,
                p.refract_power,
                p.chromatic_aberration,
            ],
            light_saturation: p.light_direction.extend(p.saturation).to_array(),
            shading: [
                p.shininess,
                p.diffuseness,
                p.fresnel_power,
                p.band_samples as f32,
            ],
            resolution: [res.x, res.y, 0.0, 0.0],
        }
    }
}

/// Per-instance model matrix for background spheres.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct InstanceData {
    pub model_0: [f32; 4],
    pub model_1: [f32; 4],
    pub model_2: [f32; 4],
    pub model_3: [f32; 4],
}

impl From<Mat4> for InstanceData {
    fn from(model: Mat4) -> Self {
        let cols = model.to_cols_array_2d();
        Self {
            model_0: cols[0],
            model_1: cols[1],
            model_2: cols[2],
            model_3: cols[3],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_dispersion::{DispersionParams, OutputResolution};

    #[test]
    fn layouts_are_vec4_aligned() {
        assert_eq!(std::mem::size_of::<CameraUniforms>(), 144);
        assert_eq!(std::mem::size_of::<DispersionUniforms>(), 80);
        assert_eq!(std::mem::size_of::<InstanceData>(), 64);
    }

    #[test]
    fn packs_material() {
        let mut material = DispersionMaterial::new(DispersionParams::default()).unwrap();
        material.set_output_resolution(OutputResolution::new(1600, 1200));
        let u = DispersionUniforms::from_material(&material);
        assert_eq!(u.ior_rygc, [1.15, 1.16, 1.18, 1.22]);
        assert_eq!(u.ior_bp_power_aberration, [1.22, 1.22, 0.4, 0.6]);
        assert_eq!(u.light_saturation, [-1.0, 1.0, 1.0, 1.08]);
        assert_eq!(u.shading, [40.0, 0.2, 8.0, 16.0]);
        assert_eq!(u.resolution, [1600.0, 1200.0, 0.0, 0.0]);
    }

    #[test]
    fn instance_from_translation() {
        let data = InstanceData::from(Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)));
        assert_eq!(data.model_3, [1.0, 2.0, 3.0, 1.0]);
    }
}
