use super::Config;
use anyhow::{Context, Result};
use directories::UserDirs;
use std::fs;
use std::path::Path;

impl Config {
    pub fn load_or_init() -> Result<Self> {
        let home = UserDirs::new()
            .map(|u| u.home_dir().to_path_buf())
            .context("Could not find home directory")?;
        let stepforge_dir = home.join(".stepforge");
        let config_path = stepforge_dir.join("config.toml");

        if !stepforge_dir.exists() {
            fs::create_dir_all(&stepforge_dir).context("Failed to create .stepforge directory")?;
        }

        if config_path.exists() {
            return Self::load_from(&config_path);
        }

        let config = Self {
            config_path,
            ..Self::default()
        };
        config.validate()?;
        config.save()?;
        tracing::info!(path = %config.config_path.display(), "wrote default config");
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Config = toml::from_str(&contents).context("Failed to parse config file")?;
        config.config_path = path.to_path_buf();
        config.workspace_dir = config.tools.resolved_workspace_dir();
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        fs::write(&self.config_path, toml_str).context("Failed to write config file")?;
        Ok(())
    }
}
