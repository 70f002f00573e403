//! Per-theme parameters for the single engine.

use std::f32::consts::PI;

use glam::Vec3;

pub use backdropconfig::ThemeKind;

use crate::backend::{linear_rgb, AmbientLight, DirectionalLight, Fog, HemisphereLight, LightRig};
use crate::host::EventKind;
use crate::profile::DeviceProfile;
use crate::quality::{reduced_motion_count, QualityTier};
use crate::scene::{Camera, OrbitSettings};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraSetup {
    pub position: Vec3,
    pub target: Vec3,
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
}

impl CameraSetup {
    pub fn camera(&self, aspect: f32) -> Camera {
        let mut camera = Camera::new(self.position, self.target, self.fov_degrees, self.near, self.far);
        camera.set_aspect(aspect);
        camera
    }
}

/// How many particles a theme's field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticleBudget {
    Empty,
    /// The quality tier's count.
    Tier,
    /// Counts per device class, thinned like the tier under reduced motion.
    PerDevice { desktop: usize, mobile: usize },
}

impl ParticleBudget {
    pub fn resolve(&self, quality: &QualityTier, profile: &DeviceProfile) -> usize {
        match *self {
            ParticleBudget::Empty => 0,
            ParticleBudget::Tier => quality.particle_count,
            ParticleBudget::PerDevice { desktop, mobile } => {
                let base = if profile.is_mobile { mobile } else { desktop };
                if profile.reduced_motion {
                    reduced_motion_count(base)
                } else {
                    base
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThemeConfig {
    pub kind: ThemeKind,
    /// Marks this theme's surfaces inside a container.
    pub tag: &'static str,
    pub max_pixel_density: f32,
    /// Mount into the host's root container when none is supplied.
    pub fallback_to_root: bool,
    pub camera: CameraSetup,
    /// Linear RGBA.
    pub clear: [f32; 4],
    pub transparent: bool,
    pub antialias: bool,
    pub lights: LightRig,
    pub fog: Option<Fog>,
    pub orbit: Option<OrbitSettings>,
    /// Pointer parallax on desktop when motion is not reduced.
    pub parallax: bool,
    pub exposure: Option<f32>,
    /// Skip frame bodies while the host is hidden.
    pub visibility_gated: bool,
    pub particles: ParticleBudget,
}

impl ThemeConfig {
    pub fn for_kind(kind: ThemeKind) -> Self {
        match kind {
            ThemeKind::Starfield => Self::starfield(),
            ThemeKind::Ink => Self::ink(),
            ThemeKind::Ocean => Self::ocean(),
        }
    }

    pub fn starfield() -> Self {
        Self {
            kind: ThemeKind::Starfield,
            tag: "backdrop-starfield",
            max_pixel_density: 1.6,
            fallback_to_root: true,
            camera: CameraSetup {
                position: Vec3::new(0.0, 1.6, 14.0),
                target: Vec3::new(0.0, 0.2, 0.0),
                fov_degrees: 50.0,
                near: 0.1,
                far: 1000.0,
            },
            clear: [0.0, 0.0, 0.0, 0.0],
            transparent: true,
            antialias: true,
            lights: LightRig {
                ambient: Some(AmbientLight {
                    color: [1.0; 3],
                    intensity: 0.45,
                }),
                hemisphere: None,
                directional: Some(DirectionalLight {
                    color: [1.0; 3],
                    intensity: 0.12,
                    position: Vec3::new(3.0, 6.0, 4.0),
                }),
            },
            fog: None,
            orbit: Some(OrbitSettings {
                enabled: false,
                damping: Some(0.05),
                enable_zoom: false,
                ..OrbitSettings::default()
            }),
            parallax: true,
            exposure: None,
            visibility_gated: false,
            particles: ParticleBudget::Tier,
        }
    }

    pub fn ink() -> Self {
        let [r, g, b] = linear_rgb(0x12080a);
        Self {
            kind: ThemeKind::Ink,
            tag: "backdrop-ink",
            max_pixel_density: 2.0,
            fallback_to_root: false,
            camera: CameraSetup {
                position: Vec3::new(0.0, 5.2, 26.0),
                target: Vec3::ZERO,
                fov_degrees: 55.0,
                near: 0.1,
                far: 600.0,
            },
            clear: [r, g, b, 1.0],
            transparent: false,
            antialias: true,
            lights: LightRig {
                ambient: None,
                hemisphere: Some(HemisphereLight {
                    sky: linear_rgb(0xfff4e6),
                    ground: linear_rgb(0x060408),
                    intensity: 0.18,
                }),
                directional: Some(DirectionalLight {
                    color: linear_rgb(0xfff0d6),
                    intensity: 0.22,
                    position: Vec3::new(8.0, 24.0, 8.0),
                }),
            },
            fog: Some(Fog {
                color: linear_rgb(0x0b0710),
                density: 0.0045,
            }),
            orbit: Some(OrbitSettings {
                enabled: false,
                damping: Some(0.05),
                min_distance: 10.0,
                max_distance: 80.0,
                max_polar: PI * 0.52,
                ..OrbitSettings::default()
            }),
            parallax: false,
            exposure: None,
            visibility_gated: false,
            particles: ParticleBudget::PerDevice {
                desktop: 18_000,
                mobile: 5_000,
            },
        }
    }

    pub fn ocean() -> Self {
        let [r, g, b] = linear_rgb(0x0b0b10);
        Self {
            kind: ThemeKind::Ocean,
            tag: "backdrop-ocean",
            max_pixel_density: 2.0,
            fallback_to_root: false,
            camera: CameraSetup {
                position: Vec3::new(30.0, 30.0, 100.0),
                target: Vec3::new(0.0, 10.0, 0.0),
                fov_degrees: 55.0,
                near: 1.0,
                far: 2000.0,
            },
            clear: [r, g, b, 1.0],
            transparent: false,
            antialias: false,
            lights: LightRig::default(),
            fog: None,
            orbit: Some(OrbitSettings {
                enabled: true,
                damping: None,
                enable_zoom: true,
                enable_rotate: true,
                min_distance: 40.0,
                max_distance: 200.0,
                max_polar: PI * 0.495,
                ..OrbitSettings::default()
            }),
            parallax: false,
            exposure: Some(0.5),
            visibility_gated: true,
            particles: ParticleBudget::Empty,
        }
    }

    pub fn parallax_enabled(&self, profile: &DeviceProfile) -> bool {
        self.parallax && !profile.reduced_motion && !profile.is_mobile
    }

    pub fn orbit_interactive(&self) -> bool {
        self.orbit.map(|orbit| orbit.enabled).unwrap_or(false)
    }

    /// Host events this theme listens to for the given device.
    pub fn subscriptions(&self, profile: &DeviceProfile) -> Vec<EventKind> {
        let mut kinds = vec![EventKind::Resize];
        if self.parallax_enabled(profile) || self.orbit_interactive() {
            kinds.push(EventKind::PointerMove);
        }
        if self.orbit_interactive() {
            kinds.push(EventKind::PointerButton);
            kinds.push(EventKind::Wheel);
        }
        if self.visibility_gated {
            kinds.push(EventKind::VisibilityChange);
        }
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{capture, EnvironmentSignals};

    #[test]
    fn decorative_themes_keep_controllers_disabled() {
        assert!(!ThemeConfig::starfield().orbit_interactive());
        assert!(!ThemeConfig::ink().orbit_interactive());
        assert!(ThemeConfig::ocean().orbit_interactive());
    }

    #[test]
    fn ink_budget_depends_on_device_class_not_memory() {
        let ink = ThemeConfig::ink().particles;
        let resolve = |signals: EnvironmentSignals| {
            let profile = capture(&signals);
            ink.resolve(&crate::quality::select(&profile), &profile)
        };
        assert_eq!(resolve(EnvironmentSignals::new()), 18_000);
        assert_eq!(resolve(EnvironmentSignals::new().with_device_memory(1.0)), 18_000);
        assert_eq!(resolve(EnvironmentSignals::new().with_mobile(true)), 5_000);
        assert_eq!(resolve(EnvironmentSignals::new().with_reduced_motion(true)), 6300);

        let profile = capture(&EnvironmentSignals::new().with_device_memory(1.0));
        let quality = crate::quality::select(&profile);
        assert_eq!(ThemeConfig::starfield().particles.resolve(&quality, &profile), 1000);
        assert_eq!(ThemeConfig::ocean().particles.resolve(&quality, &profile), 0);
    }

    #[test]
    fn only_the_starfield_falls_back_to_root() {
        let fallbacks: Vec<bool> = ThemeKind::ALL
            .iter()
            .map(|kind| ThemeConfig::for_kind(*kind).fallback_to_root)
            .collect();
        assert_eq!(fallbacks, vec![true, false, false]);
    }

    #[test]
    fn starfield_listens_for_pointer_only_with_parallax() {
        let theme = ThemeConfig::starfield();
        let desktop = capture(&EnvironmentSignals::new());
        assert_eq!(
            theme.subscriptions(&desktop),
            vec![EventKind::Resize, EventKind::PointerMove]
        );
        let reduced = capture(&EnvironmentSignals::new().with_reduced_motion(true));
        assert_eq!(theme.subscriptions(&reduced), vec![EventKind::Resize]);
    }

    #[test]
    fn ocean_listens_for_controller_and_visibility() {
        let kinds = ThemeConfig::ocean().subscriptions(&capture(&EnvironmentSignals::new()));
        assert_eq!(
            kinds,
            vec![
                EventKind::Resize,
                EventKind::PointerMove,
                EventKind::PointerButton,
                EventKind::Wheel,
                EventKind::VisibilityChange,
            ]
        );
    }
}
