use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use backdrop::{run_windowed, EnvironmentSignals, MountOptions, ThemeKind, WindowOptions};
use backdropconfig::BackdropConfig;
use tracing_subscriber::EnvFilter;

use crate::cli::RunArgs;
use crate::headless::{self, HeadlessRun};
use crate::paths::AppPaths;

/// A loaded configuration and the directory its relative paths resolve against.
pub struct LoadedConfig {
    pub config: BackdropConfig,
    pub base: Option<PathBuf>,
}

pub fn run(args: RunArgs) -> Result<()> {
    let paths = AppPaths::discover()?;
    let config_path = paths.resolve_config(args.config.as_deref());
    let loaded = load_config(&config_path, args.config.is_some())?;
    let theme = args.theme.unwrap_or_else(|| loaded.config.theme());
    let signals = environment_signals(&loaded.config, &args);
    let mut options = MountOptions::from_config(&loaded.config, loaded.base.as_deref());
    if let Some(seed) = args.seed {
        options.seed = seed;
    }
    tracing::debug!(
        config = %config_path.display(),
        %theme,
        seed = options.seed,
        ?signals,
        "resolved backdropd settings"
    );

    if let Some(frames) = args.headless {
        let report = headless::run(HeadlessRun {
            theme,
            size: args.size,
            signals,
            options,
            frames,
            frame_step: Duration::from_millis(args.frame_ms.max(1)),
        })?;
        headless::print_report(&report, args.json)?;
        return report.check();
    }

    run_window(theme, signals, options, &args)
}

fn run_window(theme: ThemeKind, signals: EnvironmentSignals, mount: MountOptions, args: &RunArgs) -> Result<()> {
    tracing::info!(%theme, width = args.size.0, height = args.size.1, "opening backdrop window");
    let run_for = args
        .run_for
        .filter(|secs| secs.is_finite() && *secs > 0.0)
        .map(Duration::from_secs_f64);
    run_windowed(
        theme,
        WindowOptions {
            title: format!("backdrop · {theme}"),
            size: args.size,
            signals,
            mount,
            power: if args.low_power {
                wgpu::PowerPreference::LowPower
            } else {
                wgpu::PowerPreference::HighPerformance
            },
            run_for,
        },
    )
}

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Reads `path`, falling back to defaults when the file does not exist and
/// was not asked for explicitly.
pub fn load_config(path: &Path, explicit: bool) -> Result<LoadedConfig> {
    if !path.exists() {
        if explicit {
            anyhow::bail!("config file {} does not exist", path.display());
        }
        tracing::debug!(path = %path.display(), "no config file; using defaults");
        return Ok(LoadedConfig {
            config: BackdropConfig::default(),
            base: None,
        });
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config = BackdropConfig::from_toml_str(&contents)
        .with_context(|| format!("failed to load config file at {}", path.display()))?;
    Ok(LoadedConfig {
        config,
        base: path.parent().map(Path::to_path_buf),
    })
}

/// Config overrides first, then command-line flags on top.
pub fn environment_signals(config: &BackdropConfig, args: &RunArgs) -> EnvironmentSignals {
    let overrides = &config.signals;
    let mut signals = EnvironmentSignals::new().with_viewport(args.size.0, args.size.1);
    signals.user_agent = overrides.user_agent.clone();
    signals.device_memory = args.memory.or(overrides.device_memory);
    signals.reduced_motion = overrides.reduced_motion;
    signals.pixel_ratio = args.pixel_ratio.or(overrides.pixel_ratio);
    if args.reduced_motion {
        signals.reduced_motion = Some(true);
    }
    if args.mobile {
        signals.mobile = Some(true);
    }
    signals
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    fn args(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["backdropd"];
        argv.extend_from_slice(extra);
        crate::cli::Cli::try_parse_from(argv).unwrap().run
    }

    #[test]
    fn missing_default_config_falls_back() {
        let dir = TempDir::new().unwrap();
        let loaded = load_config(&dir.path().join("backdrop.toml"), false).unwrap();
        assert_eq!(loaded.config.theme(), ThemeKind::Starfield);
        assert!(loaded.base.is_none());
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(load_config(&dir.path().join("nope.toml"), true).is_err());
    }

    #[test]
    fn invalid_config_reports_the_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("backdrop.toml");
        fs::write(&path, "version = 2\n").unwrap();
        let error = load_config(&path, true).err().unwrap();
        assert!(format!("{error:#}").contains("backdrop.toml"));
    }

    #[test]
    fn flags_override_config_signals() {
        let config = BackdropConfig::from_toml_str(
            "version = 1\n[signals]\ndevice_memory = 8\npixel_ratio = 2.0\nreduced_motion = false\n",
        )
        .unwrap();
        let signals = environment_signals(&config, &args(&["--memory", "2", "--reduced-motion"]));
        assert_eq!(signals.device_memory, Some(2.0));
        assert_eq!(signals.pixel_ratio, Some(2.0));
        assert_eq!(signals.reduced_motion, Some(true));
        assert_eq!(signals.viewport, Some((1280, 720)));
        assert_eq!(signals.mobile, None);
    }
}
