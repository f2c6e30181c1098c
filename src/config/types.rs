use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub tmdb: TmdbConfig,

    #[serde(default)]
    pub player: PlayerConfig,

    #[serde(default)]
    pub library: LibraryConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub loader: LoaderConfig,

    #[serde(default)]
    pub images: ImagesConfig,

    #[serde(default)]
    pub matcher: MatcherConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TmdbConfig {
    /// TMDB v3 API key. Empty disables matching.
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    "en-US".to_string()
}

impl Default for TmdbConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            language: default_language(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PlayerConfig {
    /// External player command. Stored for the presentation layer.
    #[serde(default = "default_player")]
    pub command: String,
}

fn default_player() -> String {
    "mpv".to_string()
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            command: default_player(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct LibraryConfig {
    /// Library roots, scanned in order.
    #[serde(default)]
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_database")]
    pub database: PathBuf,

    #[serde(default = "default_poster_cache")]
    pub poster_cache: PathBuf,
}

fn default_database() -> PathBuf {
    PathBuf::from("~/.config/reelvault/library.db")
}

fn default_poster_cache() -> PathBuf {
    PathBuf::from("~/.cache/reelvault/posters")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            poster_cache: default_poster_cache(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LoaderConfig {
    /// Rows loaded synchronously when the view opens or the filter changes.
    #[serde(default = "default_first_page_size")]
    pub first_page_size: u32,

    /// Rows per background page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_first_page_size() -> u32 {
    80
}

fn default_page_size() -> u32 {
    250
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            first_page_size: default_first_page_size(),
            page_size: default_page_size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ImagesConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_thumb_width")]
    pub thumb_width: u32,

    #[serde(default = "default_thumb_height")]
    pub thumb_height: u32,
}

fn default_workers() -> usize {
    4
}

fn default_thumb_width() -> u32 {
    150
}

fn default_thumb_height() -> u32 {
    225
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            thumb_width: default_thumb_width(),
            thumb_height: default_thumb_height(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MatcherConfig {
    /// Pause between entries of an auto-match sweep (default: 250)
    #[serde(default = "default_request_delay")]
    pub request_delay_ms: u64,
}

fn default_request_delay() -> u64 {
    250
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            request_delay_ms: default_request_delay(),
        }
    }
}
