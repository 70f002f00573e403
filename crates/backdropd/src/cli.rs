use std::path::PathBuf;

use backdropconfig::ThemeKind;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "backdropd",
    author,
    version,
    about = "Procedural animated backdrop runner",
    arg_required_else_help = false
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Theme to mount: `starfield`, `ink`, or `ocean`. Overrides the config file.
    #[arg(long, value_name = "THEME", value_parser = parse_theme)]
    pub theme: Option<ThemeKind>,

    /// Configuration file; defaults to `backdrop.toml` in the config directory.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Logical surface size (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size, default_value = "1280x720")]
    pub size: (u32, u32),

    /// Seed for every random draw the scene makes.
    #[arg(long, value_name = "N")]
    pub seed: Option<u32>,

    /// Behave as if the user asked for reduced motion.
    #[arg(long)]
    pub reduced_motion: bool,

    /// Treat the device as mobile.
    #[arg(long)]
    pub mobile: bool,

    /// Reported device memory in gigabytes.
    #[arg(long, value_name = "GB", value_parser = parse_memory)]
    pub memory: Option<f32>,

    /// Device pixel ratio (window mode reads it from the monitor).
    #[arg(long, value_name = "RATIO", value_parser = parse_pixel_ratio)]
    pub pixel_ratio: Option<f32>,

    /// Drive this many frames without a window or GPU, tear down, and print a report.
    #[arg(long, value_name = "FRAMES")]
    pub headless: Option<u32>,

    /// Milliseconds of simulated time per headless frame.
    #[arg(long, value_name = "MILLISECONDS", default_value_t = 16)]
    pub frame_ms: u64,

    /// Print the headless report as JSON.
    #[arg(long)]
    pub json: bool,

    /// Close the window after this many seconds.
    #[arg(long, value_name = "SECONDS")]
    pub run_for: Option<f64>,

    /// Prefer the low-power adapter in window mode.
    #[arg(long)]
    pub low_power: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Inspect configuration resolution.
    Config(ConfigCommand),
}

#[derive(Parser, Debug)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the config directory and file in use.
    Where,
    /// Load and validate the config, then print the effective settings.
    Check,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_theme(value: &str) -> Result<ThemeKind, String> {
    value.parse::<ThemeKind>().map_err(|err| err.to_string())
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let trimmed = value.trim();
    let (w, h) = trimmed
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("invalid size '{trimmed}'; expected WIDTHxHEIGHT"))?;
    let width = w
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid width in size '{trimmed}'"))?;
    let height = h
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid height in size '{trimmed}'"))?;
    if width == 0 || height == 0 {
        return Err("size dimensions must be greater than zero".into());
    }
    Ok((width, height))
}

fn parse_memory(value: &str) -> Result<f32, String> {
    let memory = value
        .trim()
        .parse::<f32>()
        .map_err(|_| format!("invalid device memory '{value}'"))?;
    if !memory.is_finite() || memory < 0.0 {
        return Err("device memory must be >= 0".into());
    }
    Ok(memory)
}

fn parse_pixel_ratio(value: &str) -> Result<f32, String> {
    let ratio = value
        .trim()
        .parse::<f32>()
        .map_err(|_| format!("invalid pixel ratio '{value}'"))?;
    if !ratio.is_finite() || ratio <= 0.0 {
        return Err("pixel ratio must be > 0".into());
    }
    Ok(ratio)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sizes() {
        assert_eq!(parse_size("1920x1080").unwrap(), (1920, 1080));
        assert_eq!(parse_size(" 800 X 600 ").unwrap(), (800, 600));
        assert!(parse_size("800").is_err());
        assert!(parse_size("0x600").is_err());
        assert!(parse_size("wide x tall").is_err());
    }

    #[test]
    fn parses_theme_aliases() {
        assert_eq!(parse_theme("ocean").unwrap(), ThemeKind::Ocean);
        assert_eq!(parse_theme("Stars").unwrap(), ThemeKind::Starfield);
        assert!(parse_theme("desert").is_err());
    }

    #[test]
    fn rejects_bad_signal_values() {
        assert!(parse_memory("-1").is_err());
        assert_eq!(parse_memory("0").unwrap(), 0.0);
        assert!(parse_pixel_ratio("0").is_err());
        assert!(parse_pixel_ratio("NaN").is_err());
    }

    #[test]
    fn headless_flags_parse() {
        let cli = Cli::try_parse_from([
            "backdropd",
            "--theme",
            "ink",
            "--headless",
            "12",
            "--json",
            "--reduced-motion",
            "--size",
            "640x480",
        ])
        .unwrap();
        assert_eq!(cli.run.theme, Some(ThemeKind::Ink));
        assert_eq!(cli.run.headless, Some(12));
        assert!(cli.run.json);
        assert!(cli.run.reduced_motion);
        assert_eq!(cli.run.size, (640, 480));
        assert!(cli.command.is_none());
    }
}
