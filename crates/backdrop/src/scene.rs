//! Camera and the two ways a backdrop camera moves: pointer parallax for
//! decorative themes and an orbit controller for the interactive one.

use std::f32::consts::{PI, TAU};

use glam::{Mat4, Vec2, Vec3};

use crate::backend::CameraState;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    aspect: f32,
}

impl Camera {
    pub fn new(position: Vec3, target: Vec3, fov_degrees: f32, near: f32, far: f32) -> Self {
        Self {
            position,
            target,
            up: Vec3::Y,
            fov_degrees,
            near,
            far,
            aspect: 1.0,
        }
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    /// Non-finite or non-positive ratios are ignored.
    pub fn set_aspect(&mut self, aspect: f32) {
        if aspect.is_finite() && aspect > 0.0 {
            self.aspect = aspect;
        }
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_degrees.to_radians(), self.aspect, self.near, self.far)
    }

    pub fn state(&self) -> CameraState {
        CameraState {
            view: self.view(),
            projection: self.projection(),
            position: self.position,
            aspect: self.aspect,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitSettings {
    pub enabled: bool,
    /// Fraction of the pending rotation applied per update; `None` applies it at once.
    pub damping: Option<f32>,
    pub enable_zoom: bool,
    pub enable_rotate: bool,
    pub min_distance: f32,
    pub max_distance: f32,
    pub min_polar: f32,
    pub max_polar: f32,
}

impl Default for OrbitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            damping: None,
            enable_zoom: true,
            enable_rotate: true,
            min_distance: 0.0,
            max_distance: f32::INFINITY,
            min_polar: 0.0,
            max_polar: PI,
        }
    }
}

const ZOOM_STEP: f32 = 0.95;
const POLAR_EPSILON: f32 = 1.0e-6;

/// Spherical orbit around a target, driven by drag and wheel input. Panning
/// is never offered.
#[derive(Debug, Clone)]
pub struct OrbitController {
    settings: OrbitSettings,
    target: Vec3,
    radius: f32,
    theta: f32,
    phi: f32,
    pending_theta: f32,
    pending_phi: f32,
    pending_scale: f32,
    dragging: bool,
    last_pointer: Option<Vec2>,
}

impl OrbitController {
    /// Adopts the camera's current offset from `target`.
    pub fn new(settings: OrbitSettings, camera: &Camera, target: Vec3) -> Self {
        let offset = camera.position - target;
        let radius = offset.length().max(f32::EPSILON);
        let mut controller = Self {
            settings,
            target,
            radius,
            theta: offset.x.atan2(offset.z),
            phi: (offset.y / radius).clamp(-1.0, 1.0).acos(),
            pending_theta: 0.0,
            pending_phi: 0.0,
            pending_scale: 1.0,
            dragging: false,
            last_pointer: None,
        };
        controller.clamp();
        controller
    }

    pub fn settings(&self) -> &OrbitSettings {
        &self.settings
    }

    pub fn distance(&self) -> f32 {
        self.radius
    }

    pub fn polar_angle(&self) -> f32 {
        self.phi
    }

    pub fn azimuth(&self) -> f32 {
        self.theta
    }

    pub fn pointer_button(&mut self, pressed: bool) {
        self.dragging = pressed && self.settings.enabled && self.settings.enable_rotate;
    }

    /// `viewport_height` is the container height in the same units as `x`/`y`.
    pub fn pointer_move(&mut self, x: f32, y: f32, viewport_height: u32) {
        let position = Vec2::new(x, y);
        if let Some(last) = self.last_pointer.replace(position) {
            if self.dragging {
                let delta = position - last;
                let height = viewport_height.max(1) as f32;
                self.pending_theta -= TAU * delta.x / height;
                self.pending_phi -= TAU * delta.y / height;
            }
        }
    }

    /// Positive deltas move away from the target.
    pub fn wheel(&mut self, delta: f32) {
        if !self.settings.enabled || !self.settings.enable_zoom || delta == 0.0 {
            return;
        }
        if delta > 0.0 {
            self.pending_scale /= ZOOM_STEP;
        } else {
            self.pending_scale *= ZOOM_STEP;
        }
    }

    /// Applies pending input and places the camera. Returns true when the
    /// camera moved.
    pub fn update(&mut self, camera: &mut Camera) -> bool {
        if !self.settings.enabled {
            return false;
        }
        let factor = self.settings.damping.unwrap_or(1.0).clamp(0.0, 1.0);
        self.theta += self.pending_theta * factor;
        self.phi += self.pending_phi * factor;
        self.radius *= self.pending_scale;
        self.clamp();

        match self.settings.damping {
            Some(damping) => {
                self.pending_theta *= 1.0 - damping;
                self.pending_phi *= 1.0 - damping;
            }
            None => {
                self.pending_theta = 0.0;
                self.pending_phi = 0.0;
            }
        }
        self.pending_scale = 1.0;

        let sin_phi = self.phi.sin();
        let offset = Vec3::new(
            self.radius * sin_phi * self.theta.sin(),
            self.radius * self.phi.cos(),
            self.radius * sin_phi * self.theta.cos(),
        );
        let position = self.target + offset;
        let moved = position.distance_squared(camera.position) > 1.0e-10 || camera.target != self.target;
        camera.position = position;
        camera.target = self.target;
        moved
    }

    fn clamp(&mut self) {
        let min_polar = self.settings.min_polar.max(POLAR_EPSILON);
        let max_polar = self.settings.max_polar.min(PI - POLAR_EPSILON).max(min_polar);
        self.phi = self.phi.clamp(min_polar, max_polar);
        let max_distance = self.settings.max_distance.max(self.settings.min_distance);
        self.radius = self.radius.clamp(self.settings.min_distance, max_distance);
    }
}

pub const POINTER_SMOOTHING: f32 = 0.06;
pub const CAMERA_FOLLOW: f32 = 0.04;

/// Eases the camera toward the pointer.
///
/// The smoothed pointer trails the raw target and the camera trails the
/// smoothed pointer. A camera step never moves away from the goal for the
/// current target and never crosses it, even while the smoothed pointer is
/// still catching up from an earlier target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Parallax {
    amplitude: Vec2,
    base_height: f32,
    look_at: Vec3,
    target: Vec2,
    smoothed: Vec2,
}

impl Parallax {
    pub fn new(mobile: bool, base_height: f32, look_at: Vec3) -> Self {
        let amplitude = if mobile {
            Vec2::new(0.5, 0.2)
        } else {
            Vec2::new(1.0, 0.46)
        };
        Self {
            amplitude,
            base_height,
            look_at,
            target: Vec2::ZERO,
            smoothed: Vec2::ZERO,
        }
    }

    /// Pointer in normalised device coordinates.
    pub fn set_target(&mut self, ndc: (f32, f32)) {
        self.target = Vec2::new(ndc.0, ndc.1).clamp(Vec2::splat(-1.0), Vec2::splat(1.0));
    }

    pub fn target(&self) -> Vec2 {
        self.target
    }

    pub fn smoothed(&self) -> Vec2 {
        self.smoothed
    }

    /// Where the camera settles for the current target.
    pub fn goal(&self) -> Vec2 {
        Vec2::new(
            self.target.x * self.amplitude.x,
            self.target.y * self.amplitude.y + self.base_height,
        )
    }

    /// One frame of easing.
    pub fn step(&mut self, camera: &mut Camera) {
        self.smoothed += (self.target - self.smoothed) * POINTER_SMOOTHING;
        let follow_x = self.smoothed.x * self.amplitude.x;
        let follow_y = self.smoothed.y * self.amplitude.y + self.base_height;
        let goal = self.goal();
        camera.position.x = ease_axis(camera.position.x, follow_x, goal.x);
        camera.position.y = ease_axis(camera.position.y, follow_y, goal.y);
        camera.target = self.look_at;
    }
}

/// One lagged step from `current` toward `follow`, held on `current`'s side
/// of `goal` and never backing away from it.
fn ease_axis(current: f32, follow: f32, goal: f32) -> f32 {
    let step = (follow - current) * CAMERA_FOLLOW;
    let gap = goal - current;
    if step * gap <= 0.0 {
        current
    } else if step.abs() >= gap.abs() {
        goal
    } else {
        current + step
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> Camera {
        let mut camera = Camera::new(Vec3::new(0.0, 1.6, 14.0), Vec3::new(0.0, 0.2, 0.0), 50.0, 0.1, 1000.0);
        camera.set_aspect(16.0 / 9.0);
        camera
    }

    #[test]
    fn aspect_rejects_nonsense() {
        let mut camera = camera();
        camera.set_aspect(0.0);
        camera.set_aspect(f32::NAN);
        assert_eq!(camera.aspect(), 16.0 / 9.0);
        camera.set_aspect(2.5);
        assert_eq!(camera.state().aspect, 2.5);
    }

    #[test]
    fn projection_maps_target_to_centre() {
        let camera = camera();
        let clip = camera.projection() * camera.view() * camera.target.extend(1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1.0e-5);
        assert!(ndc.y.abs() < 1.0e-5);
        assert!((0.0..=1.0).contains(&ndc.z));
    }

    #[test]
    fn parallax_approaches_without_overshoot() {
        let mut camera = camera();
        let mut parallax = Parallax::new(false, 1.6, Vec3::new(0.0, 0.2, 0.0));
        parallax.set_target((0.8, -0.5));
        let goal = parallax.goal();

        let mut last_gap = Vec2::new(goal.x - camera.position.x, goal.y - camera.position.y).abs();
        for _ in 0..2000 {
            parallax.step(&mut camera);
            assert!(camera.position.x <= goal.x + 1.0e-6);
            assert!(camera.position.y >= goal.y - 1.0e-6);
            let gap = Vec2::new(goal.x - camera.position.x, goal.y - camera.position.y).abs();
            assert!(gap.x <= last_gap.x + 1.0e-7 && gap.y <= last_gap.y + 1.0e-7);
            last_gap = gap;
        }
        assert!(last_gap.x < 1.0e-3 && last_gap.y < 1.0e-3);
        assert_eq!(camera.target, Vec3::new(0.0, 0.2, 0.0));
    }

    #[test]
    fn retargeting_mid_approach_does_not_overshoot() {
        let mut camera = camera();
        let mut parallax = Parallax::new(false, 1.6, Vec3::new(0.0, 0.2, 0.0));
        parallax.set_target((1.0, 0.0));
        for _ in 0..40 {
            parallax.step(&mut camera);
        }
        assert!(parallax.smoothed().x > camera.position.x);

        // Aim just ahead of the camera while the smoothed pointer is far beyond it.
        parallax.set_target((camera.position.x + 0.01, 0.0));
        let goal = parallax.goal();
        let mut last_gap = (goal.x - camera.position.x).abs();
        for _ in 0..400 {
            parallax.step(&mut camera);
            assert!(camera.position.x <= goal.x + 1.0e-6, "camera passed {} at {}", goal.x, camera.position.x);
            let gap = (goal.x - camera.position.x).abs();
            assert!(gap <= last_gap + 1.0e-7);
            last_gap = gap;
        }
        assert!(last_gap < 1.0e-3);

        // Reversing direction holds the camera until the pointer swings back.
        parallax.set_target((-0.5, 0.0));
        let goal = parallax.goal();
        let mut last_gap = (goal.x - camera.position.x).abs();
        for _ in 0..2000 {
            parallax.step(&mut camera);
            assert!(camera.position.x >= goal.x - 1.0e-6);
            let gap = (goal.x - camera.position.x).abs();
            assert!(gap <= last_gap + 1.0e-7);
            last_gap = gap;
        }
        assert!(last_gap < 1.0e-3);
    }

    #[test]
    fn mobile_parallax_is_gentler() {
        let mut parallax = Parallax::new(true, 1.6, Vec3::ZERO);
        parallax.set_target((1.0, 1.0));
        assert_eq!(parallax.goal(), Vec2::new(0.5, 1.8));
    }

    fn ocean_orbit(camera: &Camera) -> OrbitController {
        OrbitController::new(
            OrbitSettings {
                min_distance: 40.0,
                max_distance: 200.0,
                max_polar: PI * 0.495,
                ..OrbitSettings::default()
            },
            camera,
            Vec3::new(0.0, 10.0, 0.0),
        )
    }

    #[test]
    fn orbit_preserves_initial_pose() {
        let mut camera = Camera::new(Vec3::new(30.0, 30.0, 100.0), Vec3::ZERO, 55.0, 1.0, 2000.0);
        let mut orbit = ocean_orbit(&camera);
        orbit.update(&mut camera);
        assert!(camera.position.distance(Vec3::new(30.0, 30.0, 100.0)) < 1.0e-3);
        assert_eq!(camera.target, Vec3::new(0.0, 10.0, 0.0));
    }

    #[test]
    fn orbit_zoom_is_bounded() {
        let mut camera = Camera::new(Vec3::new(30.0, 30.0, 100.0), Vec3::ZERO, 55.0, 1.0, 2000.0);
        let mut orbit = ocean_orbit(&camera);
        for _ in 0..200 {
            orbit.wheel(1.0);
            orbit.update(&mut camera);
        }
        assert!((orbit.distance() - 200.0).abs() < 1.0e-3);
        for _ in 0..200 {
            orbit.wheel(-1.0);
            orbit.update(&mut camera);
        }
        assert!((orbit.distance() - 40.0).abs() < 1.0e-3);
    }

    #[test]
    fn orbit_drag_respects_polar_limit() {
        let mut camera = Camera::new(Vec3::new(30.0, 30.0, 100.0), Vec3::ZERO, 55.0, 1.0, 2000.0);
        let mut orbit = ocean_orbit(&camera);
        orbit.pointer_move(100.0, 100.0, 600);
        orbit.pointer_button(true);
        orbit.pointer_move(100.0, -2000.0, 600);
        orbit.update(&mut camera);
        assert!(orbit.polar_angle() <= PI * 0.495 + 1.0e-6);
        // Never below the water plane through the target.
        assert!(camera.position.y > 10.0);
    }

    #[test]
    fn moves_without_button_do_not_rotate() {
        let mut camera = Camera::new(Vec3::new(30.0, 30.0, 100.0), Vec3::ZERO, 55.0, 1.0, 2000.0);
        let mut orbit = ocean_orbit(&camera);
        let azimuth = orbit.azimuth();
        orbit.pointer_move(0.0, 0.0, 600);
        orbit.pointer_move(300.0, 0.0, 600);
        orbit.update(&mut camera);
        assert_eq!(orbit.azimuth(), azimuth);
    }

    #[test]
    fn disabled_orbit_ignores_input() {
        let mut camera = Camera::new(Vec3::new(0.0, 5.2, 26.0), Vec3::ZERO, 55.0, 0.1, 600.0);
        let mut orbit = OrbitController::new(
            OrbitSettings {
                enabled: false,
                ..OrbitSettings::default()
            },
            &camera,
            Vec3::ZERO,
        );
        orbit.wheel(1.0);
        orbit.pointer_button(true);
        assert!(!orbit.update(&mut camera));
        assert_eq!(camera.position, Vec3::new(0.0, 5.2, 26.0));
    }
}
