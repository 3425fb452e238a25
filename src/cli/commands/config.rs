//! Config Command
//!
//! Usage:
//!   fairform config show [-f json]
//!   fairform config path
//!   fairform config init [-g] [--force]

use crate::config::ConfigLoader;
use crate::types::Result;

/// Print the merged effective configuration
pub fn show(format: &str) -> Result<()> {
    let config = ConfigLoader::load()?;
    println!("{}", ConfigLoader::render(&config, format == "json")?);
    Ok(())
}

pub fn path() -> Result<()> {
    ConfigLoader::show_path();
    Ok(())
}

pub fn init(global: bool, force: bool) -> Result<()> {
    let path = if global {
        ConfigLoader::init_global(force)?
    } else {
        ConfigLoader::init_project(force)?
    };
    println!("✓ Configuration ready");
    println!("  Config: {}", path.display());
    Ok(())
}
