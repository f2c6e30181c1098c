pub mod persist;
mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    expand_paths(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    for path in default_locations() {
        if path.exists() {
            return load_config(&path);
        }
    }

    let mut config = Config::default();
    expand_paths(&mut config);
    Ok(config)
}

/// Candidate config files, most specific first.
pub fn default_locations() -> Vec<PathBuf> {
    ["./reelvault.toml", "~/.config/reelvault/config.toml"]
        .iter()
        .map(|p| expand(Path::new(p)))
        .collect()
}

/// File that edits such as `library add` are written to.
///
/// An explicit path wins, then the first existing default location, then the
/// per-user config file.
pub fn editable_location(custom_path: Option<&Path>) -> PathBuf {
    if let Some(path) = custom_path {
        return expand(path);
    }
    let candidates = default_locations();
    candidates
        .iter()
        .find(|p| p.exists())
        .or_else(|| candidates.last())
        .cloned()
        .unwrap_or_else(|| PathBuf::from("reelvault.toml"))
}

/// Expand a leading `~` in a path.
pub fn expand(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(raw.as_ref()).into_owned())
}

fn expand_paths(config: &mut Config) {
    config.storage.database = expand(&config.storage.database);
    config.storage.poster_cache = expand(&config.storage.poster_cache);
    for path in &mut config.library.paths {
        *path = expand(path);
    }
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.loader.first_page_size == 0 || config.loader.page_size == 0 {
        anyhow::bail!("Loader page sizes must be greater than 0");
    }

    if config.images.workers == 0 {
        anyhow::bail!("Image worker count must be greater than 0");
    }

    if config.images.thumb_width == 0 || config.images.thumb_height == 0 {
        anyhow::bail!("Thumbnail dimensions must be greater than 0");
    }

    for path in &config.library.paths {
        if !path.exists() {
            tracing::warn!("Library path does not exist: {:?}", path);
        }
    }

    if config.tmdb.api_key.trim().is_empty() {
        tracing::warn!("No TMDB API key configured; metadata matching is disabled");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.tmdb.language, "en-US");
        assert_eq!(config.player.command, "mpv");
        assert_eq!(config.loader.first_page_size, 80);
        assert_eq!(config.loader.page_size, 250);
        assert_eq!(config.images.workers, 4);
        assert_eq!((config.images.thumb_width, config.images.thumb_height), (150, 225));
        assert_eq!(config.matcher.request_delay_ms, 250);
    }

    #[test]
    fn test_load_expands_tilde() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[tmdb]
api_key = "abc"

[library]
paths = ["/srv/movies"]

[storage]
database = "~/lib.db"
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.tmdb.api_key, "abc");
        assert_eq!(config.library.paths, vec![PathBuf::from("/srv/movies")]);
        assert!(!config.storage.database.to_string_lossy().starts_with('~'));
        assert!(config.storage.database.ends_with("lib.db"));
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[loader]\npage_size = 0\n").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("page sizes"));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = Config::default();
        config.images.workers = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = TempDir::new().unwrap();
        assert!(load_config_or_default(Some(&dir.path().join("nope.toml"))).is_err());
    }
}
