mod cli;
mod headless;
mod paths;
mod run;

use anyhow::Result;
use cli::{Command, ConfigAction, RunArgs};
use paths::AppPaths;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Some(Command::Config(config_cmd)) => handle_config_command(config_cmd.action, &cli.run),
        None => run::run(cli.run),
    }
}

fn handle_config_command(action: ConfigAction, args: &RunArgs) -> Result<()> {
    let paths = AppPaths::discover()?;
    let path = paths.resolve_config(args.config.as_deref());
    match action {
        ConfigAction::Where => {
            println!("Configuration:");
            println!("  dir:    {}", paths.config_dir().display());
            println!(
                "  file:   {} ({})",
                path.display(),
                if path.exists() { "present" } else { "missing" }
            );
            Ok(())
        }
        ConfigAction::Check => {
            let loaded = run::load_config(&path, args.config.is_some())?;
            let config = &loaded.config;
            println!("Configuration OK: {}", path.display());
            println!("  theme:             {}", config.theme());
            println!("  seed:              {}", config.seed());
            println!(
                "  throttle interval: {} ms",
                config.throttle_interval().as_millis()
            );
            println!("  texture cache:     {}", config.texture_cache());
            println!(
                "  ocean sun:         elevation={} azimuth={}",
                config.sun_elevation(),
                config.sun_azimuth()
            );
            println!(
                "  normal map:        {}",
                config.normal_map(loaded.base.as_deref()).display()
            );
            Ok(())
        }
    }
}
