//! `switchyard config`: configuration management commands.

use anyhow::Context;
use switchyard_config::AppConfig;

use super::load_config;

pub fn show() -> anyhow::Result<()> {
    let config = load_config()?;
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

pub fn path() {
    println!("{}", AppConfig::config_dir().join("config.toml").display());
}

/// Write the default config unless a config file already exists.
pub fn init() -> anyhow::Result<()> {
    let dir = AppConfig::config_dir();
    let path = dir.join("config.toml");
    if path.exists() {
        println!("  Config already exists at {}", path.display());
        return Ok(());
    }
    std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    std::fs::write(&path, AppConfig::default_toml())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("  Wrote default config to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips() {
        let text = AppConfig::default_toml();
        let config = AppConfig::from_toml_str(&text).unwrap();
        assert_eq!(config.agent.max_iterations, 10);
        assert_eq!(config.streaming.flush_threshold, 25);
    }
}
