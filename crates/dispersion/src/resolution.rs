use glam::Vec2;

/// Lower and upper bound applied to the device pixel ratio.
pub const MIN_PIXEL_RATIO: f64 = 1.0;
pub const MAX_PIXEL_RATIO: f64 = 2.0;

/// Presentation surface as the host reports it: logical size plus the
/// device pixel ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub logical_width: f64,
    pub logical_height: f64,
    pub pixel_ratio: f64,
}

impl Viewport {
    pub fn new(logical_width: f64, logical_height: f64, pixel_ratio: f64) -> Self {
        Self {
            logical_width,
            logical_height,
            pixel_ratio,
        }
    }

    /// Build from a physical (device pixel) size and the window scale factor.
    pub fn from_physical(width: u32, height: u32, scale_factor: f64) -> Self {
        let scale = if scale_factor.is_finite() && scale_factor > 0.0 {
            scale_factor
        } else {
            1.0
        };
        Self::new(width as f64 / scale, height as f64 / scale, scale)
    }

    /// Pixel ratio after clamping into `[1, 2]`.
    pub fn effective_pixel_ratio(&self) -> f64 {
        if self.pixel_ratio.is_nan() {
            return MIN_PIXEL_RATIO;
        }
        self.pixel_ratio.clamp(MIN_PIXEL_RATIO, MAX_PIXEL_RATIO)
    }

    /// Device-pixel size used by both the capture target and the shader.
    pub fn output_resolution(&self) -> OutputResolution {
        let ratio = self.effective_pixel_ratio();
        OutputResolution::clamped(
            (self.logical_width * ratio).round(),
            (self.logical_height * ratio).round(),
        )
    }
}

/// Render resolution in device pixels. Both dimensions are at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputResolution {
    width: u32,
    height: u32,
}

impl OutputResolution {
    /// Clamp an arbitrary size to a valid one. Non-positive or non-finite
    /// dimensions become 1.
    pub fn clamped(width: f64, height: f64) -> Self {
        let fix = |value: f64, axis: &str| -> u32 {
            if value.is_finite() && value >= 1.0 {
                value.min(u32::MAX as f64) as u32
            } else {
                tracing::warn!("invalid output {axis} {value}, clamping to 1");
                1
            }
        };
        Self {
            width: fix(width, "width"),
            height: fix(height, "height"),
        }
    }

    pub fn new(width: u32, height: u32) -> Self {
        Self::clamped(width as f64, height as f64)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_vec2(&self) -> Vec2 {
        Vec2::new(self.width as f32, self.height as f32)
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

impl Default for OutputResolution {
    fn default() -> Self {
        Self {
            width: 1,
            height: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_on_retina() {
        let res = Viewport::new(800.0, 600.0, 2.0).output_resolution();
        assert_eq!((res.width(), res.height()), (1600, 1200));
    }

    #[test]
    fn clamps_high_pixel_ratio() {
        let res = Viewport::new(800.0, 600.0, 3.0).output_resolution();
        assert_eq!((res.width(), res.height()), (1600, 1200));
    }

    #[test]
    fn low_pixel_ratio_rounds_up_to_one() {
        let res = Viewport::new(800.0, 600.0, 0.5).output_resolution();
        assert_eq!((res.width(), res.height()), (800, 600));
        assert_eq!(Viewport::new(10.0, 10.0, f64::NAN).effective_pixel_ratio(), 1.0);
    }

    #[test]
    fn invalid_dimensions_clamp_to_one() {
        let res = Viewport::new(0.0, -20.0, 1.0).output_resolution();
        assert_eq!((res.width(), res.height()), (1, 1));
        assert_eq!(OutputResolution::new(0, 0), OutputResolution::default());
    }

    #[test]
    fn from_physical_recovers_logical_size() {
        let vp = Viewport::from_physical(2400, 1800, 3.0);
        assert_eq!(vp.logical_width, 800.0);
        let res = vp.output_resolution();
        assert_eq!((res.width(), res.height()), (1600, 1200));

        let vp = Viewport::from_physical(1280, 720, 1.0);
        assert_eq!(vp.output_resolution(), OutputResolution::new(1280, 720));
    }
}
