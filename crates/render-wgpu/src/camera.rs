use glam::{Mat4, Vec3};

/// Orbit camera circling a target point.
/// Camera motion is host input; the dispersion core only reads the pose.
pub struct OrbitCamera {
    pub target: Vec3,
    pub distance: f32,
    pub yaw: f32,
    pub pitch: f32,
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub sensitivity: f32,
    pub min_distance: f32,
    pub max_distance: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        // Sits at (0, 0, 20) looking at the origin.
        Self {
            target: Vec3::ZERO,
            distance: 20.0,
            yaw: 0.0,
            pitch: 0.0,
            fov: 50.0_f32.to_radians(),
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 50.0,
            sensitivity: 0.005,
            min_distance: 5.0,
            max_distance: 40.0,
        }
    }
}

impl OrbitCamera {
    pub fn position(&self) -> Vec3 {
        let offset = Vec3::new(
            self.yaw.sin() * self.pitch.cos(),
            self.pitch.sin(),
            self.yaw.cos() * self.pitch.cos(),
        );
        self.target + offset * self.distance
    }

    pub fn forward(&self) -> Vec3 {
        (self.target - self.position()).normalize()
    }

    pub fn rotate(&mut self, dx: f32, dy: f32) {
        self.yaw -= dx * self.sensitivity;
        self.pitch += dy * self.sensitivity;
        self.pitch = self.pitch.clamp(-89.0_f32.to_radians(), 89.0_f32.to_radians());
    }

    /// Positive `delta` moves toward the target.
    pub fn zoom(&mut self, delta: f32) {
        self.distance = (self.distance * (1.0 - delta * 0.1))
            .clamp(self.min_distance, self.max_distance);
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position(), self.target, Vec3::Y)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov, self.aspect, self.near, self.far)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_camera_faces_origin() {
        let cam = OrbitCamera::default();
        assert!((cam.position() - Vec3::new(0.0, 0.0, 20.0)).length() < 1e-5);
        assert!((cam.forward() - Vec3::NEG_Z).length() < 1e-5);
        let vp = cam.view_projection();
        assert!(!vp.col(0).x.is_nan());
    }

    #[test]
    fn rotation_keeps_distance() {
        let mut cam = OrbitCamera::default();
        cam.rotate(120.0, -40.0);
        assert!((cam.position().length() - cam.distance).abs() < 1e-4);
        cam.rotate(0.0, 1.0e6);
        assert!(cam.pitch <= 89.0_f32.to_radians());
    }

    #[test]
    fn zoom_is_bounded() {
        let mut cam = OrbitCamera::default();
        for _ in 0..100 {
            cam.zoom(1.0);
        }
        assert_eq!(cam.distance, cam.min_distance);
        for _ in 0..100 {
            cam.zoom(-1.0);
        }
        assert_eq!(cam.distance, cam.max_distance);
    }
}
