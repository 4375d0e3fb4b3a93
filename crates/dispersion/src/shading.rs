//! CPU model of the dispersion fragment program.
//!
//! Mirrors the WGSL shader line for line so the math can be tested without a
//! GPU. Screen space follows wgpu: origin top-left, y down. The refracted
//! vector's y is negated when it becomes a uv offset so that "up" in world
//! space moves the sample up on screen.

use crate::band::{Band, BandValues, slide};
use crate::material::DispersionMaterial;
use crate::params::DispersionParams;
use glam::{Vec2, Vec3};

/// Rec. 709 luminance weights used by the saturation blend.
pub const LUMA_WEIGHTS: Vec3 = Vec3::new(0.2125, 0.7154, 0.0721);

/// Texel the shader reads while no capture is bound: the scene clear color.
pub const NEUTRAL_TEXEL: Vec3 = Vec3::ZERO;

/// Source of captured background color.
pub trait TextureSampler {
    /// Color at normalized screen coordinate `uv`.
    fn sample(&self, uv: Vec2) -> Vec3;
}

impl<F> TextureSampler for F
where
    F: Fn(Vec2) -> Vec3,
{
    fn sample(&self, uv: Vec2) -> Vec3 {
        self(uv)
    }
}

/// Uniformly colored background.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolidColor(pub Vec3);

impl TextureSampler for SolidColor {
    fn sample(&self, _uv: Vec2) -> Vec3 {
        self.0
    }
}

/// Small RGB image sampled nearest-neighbour with clamp-to-edge addressing,
/// the same addressing the GPU sampler uses.
#[derive(Debug, Clone, PartialEq)]
pub struct TexelGrid {
    width: usize,
    height: usize,
    texels: Vec<Vec3>,
}

impl TexelGrid {
    /// Returns `None` when `texels` does not hold exactly `width * height` entries.
    pub fn new(width: usize, height: usize, texels: Vec<Vec3>) -> Option<Self> {
        if width == 0 || height == 0 || texels.len() != width * height {
            return None;
        }
        Some(Self {
            width,
            height,
            texels,
        })
    }
}

impl TextureSampler for TexelGrid {
    fn sample(&self, uv: Vec2) -> Vec3 {
        let x = (uv.x * self.width as f32).floor();
        let y = (uv.y * self.height as f32).floor();
        let x = x.clamp(0.0, (self.width - 1) as f32) as usize;
        let y = y.clamp(0.0, (self.height - 1) as f32) as usize;
        self.texels[y * self.width + x]
    }
}

/// Interpolated vertex outputs for one fragment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fragment {
    /// Framebuffer position in device pixels.
    pub position: Vec2,
    /// World-space surface normal.
    pub normal: Vec3,
    /// Normalized direction from the camera to the surface point.
    pub eye: Vec3,
}

/// Snell refraction with the GLSL/WGSL `refract` contract: returns zero on
/// total internal reflection.
pub fn refract(incident: Vec3, normal: Vec3, eta: f32) -> Vec3 {
    let cos_i = normal.dot(incident);
    let k = 1.0 - eta * eta * (1.0 - cos_i * cos_i);
    if k < 0.0 {
        Vec3::ZERO
    } else {
        eta * incident - (eta * cos_i + k.sqrt()) * normal
    }
}

/// Project a refracted direction onto the screen plane as a uv offset.
pub fn screen_offset(refracted: Vec3) -> Vec2 {
    Vec2::new(refracted.x, -refracted.y)
}

/// Blend `rgb` toward its luminance by `amount` (0 gray, 1 unchanged).
pub fn saturate(rgb: Vec3, amount: f32) -> Vec3 {
    let intensity = Vec3::splat(rgb.dot(LUMA_WEIGHTS));
    intensity.lerp(rgb, amount)
}

/// Blinn half-vector specular plus a weighted Lambert diffuse.
pub fn specular(
    normal: Vec3,
    eye: Vec3,
    light_direction: Vec3,
    shininess: f32,
    diffuseness: f32,
) -> f32 {
    let light = (-light_direction).normalize();
    let half = (eye + light).normalize();
    let k_diffuse = normal.dot(light).max(0.0);
    let k_specular = normal.dot(half).max(0.0).powf(shininess);
    k_specular + k_diffuse * diffuseness
}

/// Rim term; grows toward grazing angles.
pub fn fresnel(eye: Vec3, normal: Vec3, power: f32) -> f32 {
    let facing = eye.dot(normal).abs();
    (1.0 - facing).max(0.0).powf(power)
}

/// Band-sampling half of the fragment program, before lighting: refracted
/// samples per band, recombined and averaged, with saturation compounding.
pub fn disperse(
    uv: Vec2,
    normal: Vec3,
    eye: Vec3,
    params: &DispersionParams,
    texture: &dyn TextureSampler,
) -> Vec3 {
    let samples = params.band_samples.max(1);
    let mut refracted = [Vec3::ZERO; 6];
    for band in Band::ALL {
        refracted[band as usize] = refract(eye, normal, 1.0 / params.ior(band));
    }

    let mut color = Vec3::ZERO;
    for i in 0..samples {
        let slide = slide(i, samples);
        let mut bands = BandValues::default();
        for band in Band::ALL {
            let spread = params.refract_power + slide * band.spread_weight();
            let offset = screen_offset(refracted[band as usize]) * spread;
            let texel = texture.sample(uv + offset * params.chromatic_aberration);
            bands.set(band, band.extract(texel.to_array()));
        }
        color += Vec3::from_array(bands.recombine());
        // Reapplied to the running sum every step, not once at the end.
        color = saturate(color, params.saturation);
    }

    color / samples as f32
}

/// Full fragment program. `texture` is `None` until the first capture
/// completes; the neutral texel stands in for it.
pub fn shade_fragment(
    fragment: &Fragment,
    material: &DispersionMaterial,
    texture: Option<&dyn TextureSampler>,
) -> Vec3 {
    let params = material.params();
    let uv = fragment.position / material.output_resolution().as_vec2();
    let neutral = SolidColor(NEUTRAL_TEXEL);
    let texture = texture.unwrap_or(&neutral);

    let mut color = disperse(uv, fragment.normal, fragment.eye, params, texture);
    color += Vec3::splat(specular(
        fragment.normal,
        fragment.eye,
        params.light_direction,
        params.shininess,
        params.diffuseness,
    ));
    color += Vec3::splat(fresnel(fragment.eye, fragment.normal, params.fresnel_power));
    color
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamUpdate;
    use crate::resolution::OutputResolution;

    fn assert_close(a: Vec3, b: Vec3) {
        assert!((a - b).abs().max_element() < 1e-5, "{a} != {b}");
    }

    fn straight_params() -> DispersionParams {
        DispersionParams {
            refract_power: 0.0,
            chromatic_aberration: 0.0,
            saturation: 1.0,
            ..DispersionParams::default()
        }
        .with_uniform_ior(1.0)
    }

    fn gradient(uv: Vec2) -> Vec3 {
        Vec3::new(uv.x, uv.y, 1.0 - uv.x)
    }

    #[test]
    fn refract_is_identity_at_unit_ratio() {
        let eye = Vec3::new(0.3, -0.2, -1.0).normalize();
        let n = Vec3::Z;
        assert_close(refract(eye, n, 1.0), eye);
    }

    #[test]
    fn refract_total_internal_reflection_is_zero() {
        // Leaving a dense medium at a grazing angle.
        let eye = Vec3::new(1.0, 0.0, -0.1).normalize();
        assert_eq!(refract(eye, Vec3::Z, 1.5), Vec3::ZERO);
    }

    #[test]
    fn refract_bends_toward_normal_entering_denser_medium() {
        let eye = Vec3::new(0.5, 0.0, -1.0).normalize();
        let bent = refract(eye, Vec3::Z, 1.0 / 1.2);
        assert!(bent.x.abs() < eye.x.abs());
        assert!((bent.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn screen_offset_flips_y() {
        assert_eq!(screen_offset(Vec3::new(0.2, 0.4, -1.0)), Vec2::new(0.2, -0.4));
    }

    #[test]
    fn saturation_endpoints() {
        let c = Vec3::new(0.9, 0.2, 0.1);
        assert_close(saturate(c, 1.0), c);
        let gray = saturate(c, 0.0);
        assert_eq!(gray.x, gray.y);
        assert_eq!(gray.y, gray.z);
        assert!((gray.x - c.dot(LUMA_WEIGHTS)).abs() < 1e-6);
    }

    #[test]
    fn straight_through_reduces_to_single_reconstruction() {
        let params = straight_params();
        let eye = Vec3::new(0.1, 0.2, -1.0).normalize();
        let uv = Vec2::new(0.25, 0.75);
        let texel = gradient(uv);

        let mut once = BandValues::default();
        for band in Band::ALL {
            once.set(band, band.extract(texel.to_array()));
        }
        let expected = Vec3::from_array(once.recombine());

        let got = disperse(uv, Vec3::Z, eye, &params, &gradient);
        assert_close(got, expected);
    }

    #[test]
    fn straight_through_samples_only_uv() {
        let params = straight_params();
        let uv = Vec2::new(0.4, 0.6);
        let probe = |at: Vec2| {
            assert_eq!(at, uv);
            Vec3::ONE
        };
        disperse(uv, Vec3::Z, -Vec3::Z, &params, &probe);
    }

    #[test]
    fn red_background_reconstructs_red() {
        let params = straight_params();
        let color = disperse(
            Vec2::splat(0.5),
            Vec3::Z,
            -Vec3::Z,
            &params,
            &SolidColor(Vec3::X),
        );
        assert_close(color, Vec3::X);
    }

    #[test]
    fn compounding_saturation_differs_from_single_pass() {
        let params = DispersionParams {
            saturation: 0.5,
            ..straight_params()
        };
        let red = SolidColor(Vec3::X);
        let compounded = disperse(Vec2::splat(0.5), Vec3::Z, -Vec3::Z, &params, &red);
        let single = saturate(Vec3::X, 0.5);
        assert!((compounded - single).abs().max_element() > 1e-3);
    }

    #[test]
    fn shading_is_deterministic() {
        let mut material = DispersionMaterial::default();
        material.set_output_resolution(OutputResolution::new(320, 240));
        let fragment = Fragment {
            position: Vec2::new(100.5, 80.5),
            normal: Vec3::new(0.2, 0.3, 0.9).normalize(),
            eye: Vec3::new(-0.1, 0.05, -1.0).normalize(),
        };
        let a = shade_fragment(&fragment, &material, Some(&gradient));
        let b = shade_fragment(&fragment, &material, Some(&gradient));
        assert_eq!(a.to_array().map(f32::to_bits), b.to_array().map(f32::to_bits));
    }

    #[test]
    fn refraction_moves_samples() {
        let mut material = DispersionMaterial::default();
        material.set_output_resolution(OutputResolution::new(100, 100));
        let fragment = Fragment {
            position: Vec2::new(50.0, 50.0),
            normal: Vec3::new(0.4, 0.0, 0.9).normalize(),
            eye: -Vec3::Z,
        };
        let refracted = shade_fragment(&fragment, &material, Some(&gradient));

        material
            .update_parameters(&ParamUpdate {
                refract_power: Some(0.0),
                chromatic_aberration: Some(0.0),
                ..ParamUpdate::default()
            })
            .unwrap();
        let straight = shade_fragment(&fragment, &material, Some(&gradient));
        assert!((refracted - straight).abs().max_element() > 1e-3);
    }

    #[test]
    fn missing_capture_uses_neutral_texel() {
        let material = DispersionMaterial::default();
        let fragment = Fragment {
            position: Vec2::new(0.5, 0.5),
            normal: Vec3::Z,
            eye: -Vec3::Z,
        };
        let fallback = shade_fragment(&fragment, &material, None);
        let explicit = shade_fragment(&fragment, &material, Some(&SolidColor(NEUTRAL_TEXEL)));
        assert_eq!(fallback, explicit);
        assert!(fallback.is_finite());
    }

    #[test]
    fn fresnel_grows_toward_grazing() {
        let normal = Vec3::Z;
        let mut previous = -1.0;
        for step in 0..=9 {
            // Tilt the eye from head-on toward grazing.
            let angle = step as f32 * 0.17;
            let eye = Vec3::new(angle.sin(), 0.0, -angle.cos());
            let f = fresnel(eye, normal, 3.0);
            assert!(f > previous, "step {step}: {f} <= {previous}");
            previous = f;
        }
        assert_eq!(fresnel(-Vec3::Z, normal, 3.0), 0.0);
    }

    #[test]
    fn specular_peaks_on_half_vector() {
        let eye = -Vec3::Z;
        let light_direction = Vec3::Z;
        // Light travels along +z, so the light vector is -z; the half vector
        // of eye and light is -z.
        let aligned = specular(-Vec3::Z, eye, light_direction, 40.0, 0.0);
        let off = specular(Vec3::new(0.3, 0.0, -1.0).normalize(), eye, light_direction, 40.0, 0.0);
        assert!((aligned - 1.0).abs() < 1e-6);
        assert!(off < aligned);
        assert_eq!(specular(Vec3::Z, eye, light_direction, 40.0, 0.0), 0.0);
    }

    #[test]
    fn diffuse_scales_with_weight() {
        let normal = Vec3::Y;
        let eye = -Vec3::Z;
        let light_direction = -Vec3::Y;
        let base = specular(normal, eye, light_direction, 40.0, 0.0);
        let lit = specular(normal, eye, light_direction, 40.0, 0.5);
        assert!((lit - base - 0.5).abs() < 1e-6);
    }

    #[test]
    fn upward_refraction_samples_the_upper_rows() {
        // Top row red, bottom row blue; framebuffer rows grow downward.
        let grid = TexelGrid::new(1, 2, vec![Vec3::X, Vec3::Z]).unwrap();
        let params = DispersionParams {
            refract_power: 0.4,
            chromatic_aberration: 0.6,
            saturation: 1.0,
            ..DispersionParams::default()
        }
        .with_uniform_ior(1.0);
        let mut material = DispersionMaterial::new(params).unwrap();
        material.set_output_resolution(OutputResolution::new(1, 1));

        let shade = |eye_y: f32| {
            let fragment = Fragment {
                position: Vec2::new(0.5, 0.45),
                normal: Vec3::Z,
                eye: Vec3::new(0.0, eye_y, -1.0).normalize(),
            };
            shade_fragment(&fragment, &material, Some(&grid))
        };

        // Lighting terms are gray, so the red/blue balance comes from sampling.
        let up = shade(0.5);
        let down = shade(-0.5);
        assert!(up.x - up.z > 0.9, "upward ray should see red, got {up}");
        assert!(down.z - down.x > 0.9, "downward ray should see blue, got {down}");
    }

    #[test]
    fn texel_grid_clamps_to_edge() {
        let grid = TexelGrid::new(2, 1, vec![Vec3::X, Vec3::Y]).unwrap();
        assert_eq!(grid.sample(Vec2::new(-1.0, 0.5)), Vec3::X);
        assert_eq!(grid.sample(Vec2::new(0.75, 0.5)), Vec3::Y);
        assert_eq!(grid.sample(Vec2::new(4.0, 9.0)), Vec3::Y);
        assert!(TexelGrid::new(2, 2, vec![Vec3::X]).is_none());
    }
}
