use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_NAME: &str = "backdrop.toml";
pub const DEFAULT_SEED: u32 = 123_456_789;
pub const DEFAULT_SUN_ELEVATION: f32 = 2.0;
pub const DEFAULT_SUN_AZIMUTH: f32 = 180.0;
pub const DEFAULT_NORMAL_MAP: &str = "assets/waternormals.jpg";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeKind {
    #[default]
    Starfield,
    Ink,
    Ocean,
}

impl ThemeKind {
    pub const ALL: [ThemeKind; 3] = [ThemeKind::Starfield, ThemeKind::Ink, ThemeKind::Ocean];

    pub fn as_str(&self) -> &'static str {
        match self {
            ThemeKind::Starfield => "starfield",
            ThemeKind::Ink => "ink",
            ThemeKind::Ocean => "ocean",
        }
    }
}

impl fmt::Display for ThemeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThemeKind {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "starfield" | "stars" | "home" => Ok(ThemeKind::Starfield),
            "ink" | "lantern" | "bio" => Ok(ThemeKind::Ink),
            "ocean" | "sky" | "message" => Ok(ThemeKind::Ocean),
            other => Err(ConfigError::Invalid(format!(
                "unknown theme '{other}'; expected starfield, ink, or ocean"
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackdropConfig {
    pub version: u32,
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub signals: SignalOverrides,
    #[serde(default)]
    pub ocean: OceanSettings,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Defaults {
    pub theme: Option<ThemeKind>,
    pub seed: Option<u32>,
    #[serde(
        default,
        deserialize_with = "interval_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub throttle_interval: Option<Duration>,
    #[serde(default)]
    pub texture_cache: bool,
}

/// Values that replace what the environment would otherwise report.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SignalOverrides {
    pub user_agent: Option<String>,
    pub device_memory: Option<f32>,
    pub reduced_motion: Option<bool>,
    pub pixel_ratio: Option<f32>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OceanSettings {
    pub elevation: Option<f32>,
    pub azimuth: Option<f32>,
    pub normal_map: Option<PathBuf>,
}

impl Default for BackdropConfig {
    fn default() -> Self {
        Self {
            version: 1,
            defaults: Defaults::default(),
            signals: SignalOverrides::default(),
            ocean: OceanSettings::default(),
        }
    }
}

/// Intervals are written either as seconds or as a humantime string ("750ms", "1s").
#[derive(Deserialize)]
#[serde(untagged)]
enum IntervalRepr {
    Seconds(f64),
    Text(String),
}

impl IntervalRepr {
    fn into_duration(self) -> Result<Duration, String> {
        match self {
            IntervalRepr::Seconds(secs) if secs.is_finite() && secs >= 0.0 => {
                Ok(Duration::from_secs_f64(secs))
            }
            IntervalRepr::Seconds(secs) => Err(format!("interval {secs} is not a valid duration")),
            IntervalRepr::Text(text) => humantime::parse_duration(text.trim())
                .map_err(|err| format!("invalid interval '{text}': {err}")),
        }
    }
}

fn interval_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<IntervalRepr>::deserialize(deserializer)?
        .map(IntervalRepr::into_duration)
        .transpose()
        .map_err(de::Error::custom)
}

impl BackdropConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: BackdropConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn theme(&self) -> ThemeKind {
        self.defaults.theme.unwrap_or_default()
    }

    pub fn seed(&self) -> u32 {
        self.defaults.seed.unwrap_or(DEFAULT_SEED)
    }

    pub fn throttle_interval(&self) -> Duration {
        self.defaults
            .throttle_interval
            .unwrap_or_else(|| Duration::from_millis(1000))
    }

    pub fn texture_cache(&self) -> bool {
        self.defaults.texture_cache
    }

    pub fn sun_elevation(&self) -> f32 {
        self.ocean.elevation.unwrap_or(DEFAULT_SUN_ELEVATION)
    }

    pub fn sun_azimuth(&self) -> f32 {
        self.ocean.azimuth.unwrap_or(DEFAULT_SUN_AZIMUTH)
    }

    /// Normal map path, resolved against `base` when relative.
    pub fn normal_map(&self, base: Option<&Path>) -> PathBuf {
        let raw = self
            .ocean
            .normal_map
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_NORMAL_MAP));
        match base {
            Some(base) if raw.is_relative() => base.join(raw),
            _ => raw,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        if let Some(interval) = self.defaults.throttle_interval {
            if interval.is_zero() {
                return Err(ConfigError::Invalid(
                    "defaults.throttle_interval must be greater than zero".into(),
                ));
            }
        }

        if let Some(memory) = self.signals.device_memory {
            if !memory.is_finite() || memory < 0.0 {
                return Err(ConfigError::Invalid(
                    "signals.device_memory must be >= 0".into(),
                ));
            }
        }

        if let Some(ratio) = self.signals.pixel_ratio {
            if !ratio.is_finite() || ratio <= 0.0 {
                return Err(ConfigError::Invalid(
                    "signals.pixel_ratio must be > 0".into(),
                ));
            }
        }

        if let Some(elevation) = self.ocean.elevation {
            if !(-90.0..=90.0).contains(&elevation) {
                return Err(ConfigError::Invalid(format!(
                    "ocean.elevation {elevation} must lie within [-90, 90]"
                )));
            }
        }

        if let Some(azimuth) = self.ocean.azimuth {
            if !(0.0..=360.0).contains(&azimuth) {
                return Err(ConfigError::Invalid(format!(
                    "ocean.azimuth {azimuth} must lie within [0, 360]"
                )));
            }
        }

        if let Some(path) = &self.ocean.normal_map {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::Invalid(
                    "ocean.normal_map may not be empty".into(),
                ));
            }
        }

        Ok(())
    }
}
