//! Configuration persistence using toml_edit to preserve formatting and comments.

use anyhow::{Context, Result};
use std::path::Path;
use toml_edit::{value, Array, DocumentMut, Item, Table};

/// Save the entire config to a TOML file
pub fn save_config(path: &Path, config: &super::Config) -> Result<()> {
    let new_content =
        toml::to_string_pretty(config).with_context(|| "Failed to serialize config")?;
    let new_doc: DocumentMut = new_content
        .parse()
        .with_context(|| "Failed to parse serialized config")?;

    write_document(path, &new_doc)
}

fn read_document(path: &Path) -> Result<DocumentMut> {
    let content = if path.exists() {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?
    } else {
        String::new()
    };

    content
        .parse()
        .with_context(|| format!("Failed to parse config file: {:?}", path))
}

fn write_document(path: &Path, doc: &DocumentMut) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create config directory: {:?}", dir))?;
    }
    std::fs::write(path, doc.to_string())
        .with_context(|| format!("Failed to write config file: {:?}", path))
}

/// The `[library] paths` array, created if missing.
fn library_paths(doc: &mut DocumentMut) -> Result<&mut Array> {
    let library = doc
        .entry("library")
        .or_insert_with(|| Item::Table(Table::new()))
        .as_table_like_mut()
        .context("[library] is not a table")?;

    if library.get("paths").is_none() {
        library.insert("paths", value(Array::new()));
    }

    library
        .get_mut("paths")
        .and_then(|item| item.as_array_mut())
        .context("library.paths is not an array")
}

/// Add a library root to the config file, leaving everything else as written.
///
/// Returns `false` when the path was already listed.
pub fn add_library_path(path: &Path, library_path: &Path) -> Result<bool> {
    let mut doc = read_document(path)?;
    let entry = library_path.to_string_lossy().into_owned();

    let paths = library_paths(&mut doc)?;
    if paths.iter().any(|v| v.as_str() == Some(entry.as_str())) {
        return Ok(false);
    }
    paths.push(entry);

    write_document(path, &doc)?;
    Ok(true)
}

/// Remove a library root from the config file.
///
/// Returns `false` when the path was not listed.
pub fn remove_library_path(path: &Path, library_path: &Path) -> Result<bool> {
    let mut doc = read_document(path)?;
    let entry = library_path.to_string_lossy().into_owned();

    let paths = library_paths(&mut doc)?;
    let before = paths.len();
    paths.retain(|v| v.as_str() != Some(entry.as_str()));
    if paths.len() == before {
        return Ok(false);
    }

    write_document(path, &doc)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_config, Config};
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/config.toml");

        let mut config = Config::default();
        config.tmdb.api_key = "k".into();
        config.storage.database = dir.path().join("lib.db");
        config.storage.poster_cache = dir.path().join("posters");
        save_config(&path, &config).unwrap();

        assert_eq!(load_config(&path).unwrap(), config);
    }

    #[test]
    fn test_library_path_edits_keep_comments() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "# my settings\n[tmdb]\napi_key = \"k\" # keep me\n",
        )
        .unwrap();

        assert!(add_library_path(&path, Path::new("/srv/movies")).unwrap());
        assert!(!add_library_path(&path, Path::new("/srv/movies")).unwrap());
        assert!(add_library_path(&path, Path::new("/srv/tv")).unwrap());

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("# my settings"));
        assert!(text.contains("# keep me"));

        let config = load_config(&path).unwrap();
        assert_eq!(
            config.library.paths,
            vec![PathBuf::from("/srv/movies"), PathBuf::from("/srv/tv")]
        );

        assert!(remove_library_path(&path, Path::new("/srv/movies")).unwrap());
        assert!(!remove_library_path(&path, Path::new("/srv/movies")).unwrap());
        let config = load_config(&path).unwrap();
        assert_eq!(config.library.paths, vec![PathBuf::from("/srv/tv")]);
    }
}
