//! Configuration Loader (Figment-based)
//!
//! Loads and merges configuration from multiple sources using Figment:
//! 1. Built-in defaults (Serialized)
//! 2. Global config (<config dir>/fairform/config.toml)
//! 3. Project config (.fairform/config.toml)
//! 4. Environment variables (FAIRFORM_* prefix, `__` separates sections)

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::types::Config;
use crate::types::{FairError, Result};

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with full resolution chain using Figment:
    /// defaults → global → project → env vars
    pub fn load() -> Result<Config> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(global_path) = Self::global_config_path()
            && global_path.exists()
        {
            debug!("Loading global config from: {}", global_path.display());
            figment = figment.merge(Toml::file(&global_path));
        }

        let project_path = Self::project_config_path();
        if project_path.exists() {
            debug!("Loading project config from: {}", project_path.display());
            figment = figment.merge(Toml::file(&project_path));
        }

        // FAIRFORM_LLM__MAX_TOKENS -> llm.max_tokens
        figment = figment.merge(Env::prefixed("FAIRFORM_").split("__").lowercase(true));

        Self::finish(figment)
    }

    /// Load configuration from defaults plus a specific file only
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path));
        Self::finish(figment)
    }

    fn finish(figment: Figment) -> Result<Config> {
        let mut config: Config = figment
            .extract()
            .map_err(|e| FairError::Config(format!("Configuration error: {}", e)))?;

        if config.llm.api_key.is_none() {
            config.llm.api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());
        }

        config.validate()?;
        Ok(config)
    }

    // =========================================================================
    // Path Management
    // =========================================================================

    /// Global config directory (platform config dir / fairform)
    pub fn global_dir() -> Option<PathBuf> {
        ProjectDirs::from("org", "fairform", "fairform").map(|dirs| dirs.config_dir().to_path_buf())
    }

    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_dir().map(|dir| dir.join("config.toml"))
    }

    pub fn project_dir() -> PathBuf {
        PathBuf::from(".fairform")
    }

    pub fn project_config_path() -> PathBuf {
        Self::project_dir().join("config.toml")
    }

    // =========================================================================
    // Config Commands
    // =========================================================================

    pub fn show_path() {
        println!("Configuration paths:");
        println!();

        if let Some(global) = Self::global_config_path() {
            let exists = if global.exists() { "✓" } else { "✗" };
            println!("  Global:  {} {}", exists, global.display());
        } else {
            println!("  Global:  (not available)");
        }

        let project = Self::project_config_path();
        let exists = if project.exists() { "✓" } else { "✗" };
        println!("  Project: {} {}", exists, project.display());
    }

    /// Render the effective configuration (secrets omitted)
    pub fn render(config: &Config, as_json: bool) -> Result<String> {
        if as_json {
            Ok(serde_json::to_string_pretty(config)?)
        } else {
            toml::to_string_pretty(config).map_err(|e| FairError::Config(e.to_string()))
        }
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    pub fn init_global(force: bool) -> Result<PathBuf> {
        let global_dir = Self::global_dir().ok_or_else(|| {
            FairError::Config("Cannot determine global config directory".to_string())
        })?;
        fs::create_dir_all(&global_dir)?;

        let config_path = global_dir.join("config.toml");
        Self::write_template(&config_path, force)?;
        Ok(config_path)
    }

    pub fn init_project(force: bool) -> Result<PathBuf> {
        let project_dir = Self::project_dir();
        fs::create_dir_all(&project_dir)?;

        let config_path = Self::project_config_path();
        Self::write_template(&config_path, force)?;
        Ok(config_path)
    }

    fn write_template(path: &Path, force: bool) -> Result<()> {
        if path.exists() && !force {
            info!("Config exists: {}", path.display());
            return Ok(());
        }
        fs::write(path, Self::default_config_template())?;
        info!("Created config: {}", path.display());
        Ok(())
    }

    fn default_config_template() -> &'static str {
        r#"# FairForm Copilot Configuration
# Environment variables override this file: FAIRFORM_LLM__MODEL, FAIRFORM_SERVER__BIND, ...

version = "1.0"

[server]
bind = "127.0.0.1:8787"

[llm]
provider = "openai"
model = "gpt-4o-mini"
temperature = 0.3
max_tokens = 800
timeout_secs = 60
max_retries = 3
# api_key is read from OPENAI_API_KEY when omitted

[moderation]
provider = "openai"   # openai | keyword | disabled

[storage]
path = ".fairform/fairform.db"

[conversation]
history_window = 12

# [[auth.tokens]]
# user_id = "demo-user"
# token = "change-me"
"#
    }
}
