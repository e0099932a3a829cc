//! `siesta config` and config file loading.

use anyhow::Context;
use siesta::SchedulerConfig;
use std::path::Path;

/// Load a scheduler config from `path`, or the defaults when `None`.
pub fn load(path: Option<&Path>) -> anyhow::Result<SchedulerConfig> {
    let Some(path) = path else {
        return Ok(SchedulerConfig::default());
    };

    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: SchedulerConfig = toml::from_str(&text)
        .with_context(|| format!("invalid config file {}", path.display()))?;
    config
        .pool
        .validate()
        .with_context(|| format!("invalid pool settings in {}", path.display()))?;
    Ok(config)
}

/// Render the default config as TOML.
pub fn render_default() -> anyhow::Result<String> {
    toml::to_string_pretty(&SchedulerConfig::default()).context("failed to render config")
}

pub fn execute(output: Option<&Path>) -> anyhow::Result<()> {
    let text = render_default()?;
    match output {
        Some(path) => {
            std::fs::write(path, &text)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Wrote default config to {}", path.display());
        }
        None => print!("{}", text),
    }
    Ok(())
}
