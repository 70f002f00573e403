//! Environment signals captured once per mount.

/// User-agent fragments that mark a handheld device (matched case-insensitively).
pub const MOBILE_TOKENS: [&str; 5] = ["mobi", "android", "iphone", "ipad", "ipod"];
/// Memory hint, in gigabytes, assumed when the environment does not report one.
pub const DEFAULT_DEVICE_MEMORY: f32 = 4.0;

/// Raw, possibly missing, readings from the host environment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvironmentSignals {
    pub user_agent: Option<String>,
    /// Forces the mobile flag regardless of the user agent.
    pub mobile: Option<bool>,
    pub device_memory: Option<f32>,
    pub reduced_motion: Option<bool>,
    pub viewport: Option<(u32, u32)>,
    pub pixel_ratio: Option<f32>,
}

impl EnvironmentSignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_mobile(mut self, mobile: bool) -> Self {
        self.mobile = Some(mobile);
        self
    }

    pub fn with_device_memory(mut self, gigabytes: f32) -> Self {
        self.device_memory = Some(gigabytes);
        self
    }

    pub fn with_reduced_motion(mut self, reduced: bool) -> Self {
        self.reduced_motion = Some(reduced);
        self
    }

    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport = Some((width, height));
        self
    }

    pub fn with_pixel_ratio(mut self, ratio: f32) -> Self {
        self.pixel_ratio = Some(ratio);
        self
    }
}

/// Immutable snapshot of the device, taken when a backdrop is mounted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceProfile {
    pub is_mobile: bool,
    pub device_memory_hint: f32,
    pub reduced_motion: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub pixel_density: f32,
}

impl DeviceProfile {
    /// Pixel density limited to `max`, as used when sizing the render surface.
    pub fn clamped_pixel_density(&self, max: f32) -> f32 {
        self.pixel_density.min(max)
    }

    pub fn aspect(&self) -> f32 {
        self.viewport_width as f32 / self.viewport_height as f32
    }
}

pub fn is_mobile_user_agent(user_agent: &str) -> bool {
    let lowered = user_agent.to_ascii_lowercase();
    MOBILE_TOKENS.iter().any(|token| lowered.contains(token))
}

/// Reads signals into a profile. Missing or nonsensical readings fall back to
/// defaults; this never fails.
pub fn capture(signals: &EnvironmentSignals) -> DeviceProfile {
    let is_mobile = signals.mobile.unwrap_or_else(|| {
        signals
            .user_agent
            .as_deref()
            .map(is_mobile_user_agent)
            .unwrap_or(false)
    });
    let device_memory_hint = signals
        .device_memory
        .filter(|memory| memory.is_finite() && *memory >= 0.0)
        .unwrap_or(DEFAULT_DEVICE_MEMORY);
    let (width, height) = signals.viewport.unwrap_or((1, 1));
    let pixel_density = signals
        .pixel_ratio
        .filter(|ratio| ratio.is_finite() && *ratio > 0.0)
        .unwrap_or(1.0);

    let profile = DeviceProfile {
        is_mobile,
        device_memory_hint,
        reduced_motion: signals.reduced_motion.unwrap_or(false),
        viewport_width: width.max(1),
        viewport_height: height.max(1),
        pixel_density,
    };
    tracing::debug!(?profile, "captured device profile");
    profile
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_signals_use_defaults() {
        let profile = capture(&EnvironmentSignals::default());
        assert!(!profile.is_mobile);
        assert_eq!(profile.device_memory_hint, DEFAULT_DEVICE_MEMORY);
        assert!(!profile.reduced_motion);
        assert_eq!((profile.viewport_width, profile.viewport_height), (1, 1));
        assert_eq!(profile.pixel_density, 1.0);
    }

    #[test]
    fn detects_mobile_user_agents() {
        for agent in [
            "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X)",
            "Mozilla/5.0 (Linux; ANDROID 14; Pixel 8)",
            "Mozilla/5.0 (iPad; CPU OS 16_6 like Mac OS X)",
            "Opera/9.80 (J2ME/MIDP; Opera Mini/9.80) Mobile",
        ] {
            assert!(is_mobile_user_agent(agent), "{agent}");
        }
        assert!(!is_mobile_user_agent(
            "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0"
        ));
    }

    #[test]
    fn explicit_mobile_flag_wins() {
        let signals = EnvironmentSignals::new()
            .with_user_agent("Mozilla/5.0 (iPhone)")
            .with_mobile(false);
        assert!(!capture(&signals).is_mobile);
    }

    #[test]
    fn zero_viewport_is_clamped() {
        let profile = capture(&EnvironmentSignals::new().with_viewport(0, 0));
        assert_eq!(profile.viewport_width, 1);
        assert_eq!(profile.viewport_height, 1);
        assert_eq!(profile.aspect(), 1.0);
    }

    #[test]
    fn invalid_readings_fall_back() {
        let signals = EnvironmentSignals::new()
            .with_device_memory(f32::NAN)
            .with_pixel_ratio(-2.0);
        let profile = capture(&signals);
        assert_eq!(profile.device_memory_hint, DEFAULT_DEVICE_MEMORY);
        assert_eq!(profile.pixel_density, 1.0);
    }

    #[test]
    fn pixel_density_clamps_to_theme_bound() {
        let profile = capture(&EnvironmentSignals::new().with_pixel_ratio(3.0));
        assert_eq!(profile.clamped_pixel_density(1.6), 1.6);
        assert_eq!(profile.clamped_pixel_density(4.0), 3.0);
    }
}
