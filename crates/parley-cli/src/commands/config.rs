use anyhow::{Context, Result};
use parley_infrastructure::TomlConfigRepository;
use std::path::PathBuf;

pub fn repository(path: Option<PathBuf>) -> Result<TomlConfigRepository> {
    match path {
        Some(path) => Ok(TomlConfigRepository::with_path(path)),
        None => TomlConfigRepository::new_default().context("Failed to locate config directory"),
    }
}

pub fn show(repository: &TomlConfigRepository) -> Result<()> {
    let config = repository
        .load()
        .with_context(|| format!("Failed to load {}", repository.path().display()))?;
    let rendered = toml::to_string_pretty(&config).context("Failed to render config")?;
    println!("# {}", repository.path().display());
    print!("{}", rendered);
    Ok(())
}

pub fn init(repository: &TomlConfigRepository) -> Result<()> {
    if repository.init_default()? {
        println!("✅ Wrote default configuration to {}", repository.path().display());
    } else {
        println!("ℹ️  {} already exists, left untouched", repository.path().display());
    }
    Ok(())
}
