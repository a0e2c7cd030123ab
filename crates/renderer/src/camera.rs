use glam::{Mat4, Vec3};

use crate::frame::FrameTiming;
use crate::types::CameraSettings;

pub const MIN_DISTANCE: f32 = 1.0;
pub const MAX_DISTANCE: f32 = 10.0;

/// Produces the view matrix for each frame.
pub trait Camera {
    fn update(&mut self, timing: &FrameTiming) -> Mat4;
}

/// Looks at the origin from a fixed distance, optionally spinning around the
/// vertical axis.
#[derive(Debug, Clone, PartialEq)]
pub struct OrbitCamera {
    distance: f32,
    spin_speed: f32,
    angle: f32,
}

impl OrbitCamera {
    pub fn new(distance: f32, spin_speed: f32) -> Self {
        let distance = if distance.is_finite() {
            distance.clamp(MIN_DISTANCE, MAX_DISTANCE)
        } else {
            CameraSettings::default().distance
        };
        Self {
            distance,
            spin_speed: if spin_speed.is_finite() { spin_speed } else { 0.0 },
            angle: 0.0,
        }
    }

    pub fn from_settings(settings: &CameraSettings) -> Self {
        Self::new(settings.distance, settings.spin_speed)
    }

    pub fn distance(&self) -> f32 {
        self.distance
    }

    pub fn eye(&self) -> Vec3 {
        Vec3::new(
            self.distance * self.angle.sin(),
            0.0,
            self.distance * self.angle.cos(),
        )
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye(), Vec3::ZERO, Vec3::Y)
    }
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self::from_settings(&CameraSettings::default())
    }
}

impl Camera for OrbitCamera {
    fn update(&mut self, timing: &FrameTiming) -> Mat4 {
        self.angle = (self.angle + self.spin_speed * timing.delta.as_secs_f32())
            % std::f32::consts::TAU;
        self.view()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn timing(delta_ms: u64) -> FrameTiming {
        FrameTiming {
            elapsed: Duration::ZERO,
            delta: Duration::from_millis(delta_ms),
            frame: 0,
        }
    }

    #[test]
    fn distance_is_clamped() {
        assert_eq!(OrbitCamera::new(0.2, 0.0).distance(), MIN_DISTANCE);
        assert_eq!(OrbitCamera::new(42.0, 0.0).distance(), MAX_DISTANCE);
        assert_eq!(OrbitCamera::new(f32::NAN, 0.0).distance(), 4.0);
    }

    #[test]
    fn still_camera_looks_down_negative_z() {
        let mut camera = OrbitCamera::default();
        let view = camera.update(&timing(500));
        let origin = view.transform_point3(Vec3::ZERO);
        assert!((origin - Vec3::new(0.0, 0.0, -4.0)).length() < 1e-5);
    }

    #[test]
    fn spin_advances_with_delta_time() {
        let mut camera = OrbitCamera::new(2.0, std::f32::consts::FRAC_PI_2);
        camera.update(&timing(1000));
        let eye = camera.eye();
        assert!((eye - Vec3::new(2.0, 0.0, 0.0)).length() < 1e-5);
    }
}
