use std::time::Duration;

use scheduler::{FrameCadence, DEFAULT_THROTTLE_INTERVAL};

use crate::profile::DeviceProfile;

const DESKTOP_PARTICLES: usize = 2000;
const CONSTRAINED_PARTICLES: usize = 1000;
const REDUCED_MOTION_FLOOR: usize = 120;
const REDUCED_MOTION_FACTOR: f32 = 0.35;
const DESKTOP_POINT_TEXTURE: u32 = 96;
const MOBILE_POINT_TEXTURE: u32 = 36;
const MIN_SPRITE_SIZE: u32 = 8;

/// Budget derived from a [`DeviceProfile`]; fixed for the lifetime of a mount.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityTier {
    pub particle_count: usize,
    pub point_texture_size: u32,
    pub enable_trail: bool,
    pub frame_cadence: FrameCadence,
}

impl QualityTier {
    /// Accent sprites are rasterized at three quarters of the point size.
    pub fn accent_texture_size(&self) -> u32 {
        ((self.point_texture_size as f32) * 0.75).round() as u32
    }

    /// Scales a desktop sprite resolution by the tier's point texture ratio.
    pub fn scale_sprite(&self, base: u32) -> u32 {
        let scaled = (base as u64 * self.point_texture_size as u64) / DESKTOP_POINT_TEXTURE as u64;
        (scaled as u32).max(MIN_SPRITE_SIZE)
    }

}

/// Thins `base` the way a reduced-motion tier does.
pub fn reduced_motion_count(base: usize) -> usize {
    ((base as f32 * REDUCED_MOTION_FACTOR).floor() as usize).max(REDUCED_MOTION_FLOOR)
}

pub fn select(profile: &DeviceProfile) -> QualityTier {
    select_with_interval(profile, DEFAULT_THROTTLE_INTERVAL)
}

/// Same as [`select`], with a custom reduced-motion frame interval. A zero
/// interval falls back to the default.
pub fn select_with_interval(profile: &DeviceProfile, throttle: Duration) -> QualityTier {
    let base = if profile.is_mobile || profile.device_memory_hint <= 2.0 {
        CONSTRAINED_PARTICLES
    } else {
        DESKTOP_PARTICLES
    };
    let particle_count = if profile.reduced_motion {
        reduced_motion_count(base)
    } else {
        base
    };
    let point_texture_size = if profile.is_mobile {
        MOBILE_POINT_TEXTURE
    } else {
        DESKTOP_POINT_TEXTURE
    };
    let frame_cadence = if profile.reduced_motion {
        FrameCadence::throttled(throttle)
            .unwrap_or(FrameCadence::Throttled(DEFAULT_THROTTLE_INTERVAL))
    } else {
        FrameCadence::EveryFrame
    };

    QualityTier {
        particle_count,
        point_texture_size,
        enable_trail: !profile.reduced_motion && !profile.is_mobile,
        frame_cadence,
    }
}
