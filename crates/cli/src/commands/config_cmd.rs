//! `surveyor config`: Configuration inspection commands.

use surveyor_config::AppConfig;
use surveyor_providers::build_from_config;

const REDACTED: &str = "[REDACTED]";

pub fn show() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    println!("{}", render_redacted(&config)?);
    Ok(())
}

pub fn validate() -> anyhow::Result<()> {
    println!("🔍 Validating configuration...");

    let config = AppConfig::load()?;
    match config.validate() {
        Ok(()) => println!("   ✅ Config is valid"),
        Err(e) => {
            println!("   ❌ {e}");
            return Err(e.into());
        }
    }

    if !config.has_api_key() {
        println!("   ⚠️  No API key set (SURVEYOR_API_KEY or OPENAI_API_KEY)");
    }

    println!();
    println!("   Provider:   {}", config.default_provider);
    let router = build_from_config(&config);
    println!("   Registered: {}", router.list().join(", "));
    println!("   Model:      {}", config.effective_model());
    println!("   Tokenizer:  {}", config.index.tokenizer_model);
    println!(
        "   Budgets:    overview {} / outline {} / section {} tokens",
        config.pipeline.overview_token_limit,
        config.pipeline.outline_token_limit,
        config.pipeline.section_token_limit
    );
    Ok(())
}

pub fn path() {
    println!("{}", AppConfig::config_path().display());
}

/// TOML of the effective config with every API key masked.
fn render_redacted(config: &AppConfig) -> anyhow::Result<String> {
    let mut config = config.clone();
    if config.api_key.is_some() {
        config.api_key = Some(REDACTED.into());
    }
    for provider in config.providers.values_mut() {
        if provider.api_key.is_some() {
            provider.api_key = Some(REDACTED.into());
        }
    }
    Ok(toml::to_string_pretty(&config)?)
}
