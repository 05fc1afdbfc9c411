//! `surveyor init`: Create the default config file.

use std::path::Path;
use surveyor_config::AppConfig;

pub fn run() -> anyhow::Result<()> {
    let config_path = AppConfig::config_path();

    println!("Surveyor: First-Time Setup");
    println!("===========================\n");

    if write_default_config(&config_path)? {
        println!("✅ Created config.toml at: {}", config_path.display());
        println!("\nNext steps:");
        println!("  1. Set an API key: export OPENAI_API_KEY=sk-...");
        println!("  2. Adjust budgets under [pipeline] if needed");
        println!("  3. surveyor run --query \"llm agents\" --corpus papers.json --output review.md");
    } else {
        println!("⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete it and re-run init.");
    }

    Ok(())
}

/// Write the defaults to `path`; `false` when a file is already there.
fn write_default_config(path: &Path) -> anyhow::Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, AppConfig::default_toml())?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_once_and_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        assert!(write_default_config(&path).unwrap());
        assert!(!write_default_config(&path).unwrap());

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.pipeline.repair_attempts, 1);
        assert_eq!(config.pipeline.base_heading_level, 2);
    }
}
