//! Trait definition and types for the remote catalog service.
//!
//! This module defines the [`CatalogProvider`] trait the matcher talks to,
//! along with the data types returned by provider queries.

use async_trait::async_trait;
use reelvault_common::MediaKind;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Search results
// ---------------------------------------------------------------------------

/// A single candidate returned from a search query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchCandidate {
    /// Provider identifier (for TV, the show id).
    pub external_id: i64,
    /// Display title.
    pub title: String,
    /// Release or first-air year, if known.
    pub year: Option<i32>,
    /// Short synopsis.
    pub overview: Option<String>,
    /// Provider image path of the poster, if any.
    pub poster_path: Option<String>,
    pub kind: MediaKind,
}

// ---------------------------------------------------------------------------
// Details
// ---------------------------------------------------------------------------

/// A credited person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credit {
    pub name: String,
    pub external_id: Option<i64>,
}

/// An actor credit with billing order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastCredit {
    pub name: String,
    pub external_id: Option<i64>,
    /// Character name.
    pub role: Option<String>,
    pub order: i32,
}

/// Full film record including credits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilmDetails {
    pub external_id: i64,
    pub title: String,
    pub year: Option<i32>,
    pub runtime_minutes: Option<i32>,
    pub plot: Option<String>,
    /// Average community rating, 0 to 10.
    pub rating: Option<f64>,
    /// Cross-reference id such as an IMDb `tt` number.
    pub cross_ref_id: Option<String>,
    pub poster_path: Option<String>,
    pub genres: Vec<String>,
    /// Billed cast, in order.
    pub cast: Vec<CastCredit>,
    pub directors: Vec<Credit>,
}

/// One episode of a fetched season.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeDetails {
    pub episode_number: i32,
    pub title: Option<String>,
    pub runtime_minutes: Option<i32>,
    pub plot: Option<String>,
    pub external_id: Option<i64>,
    pub air_date: Option<String>,
}

/// A season together with the show-level fields it inherits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonDetails {
    pub show_id: i64,
    pub show_name: String,
    pub season_number: i32,
    pub year: Option<i32>,
    pub plot: Option<String>,
    pub air_date: Option<String>,
    pub rating: Option<f64>,
    pub cross_ref_id: Option<String>,
    pub poster_path: Option<String>,
    pub genres: Vec<String>,
    /// May be a subset of the local episodes.
    pub episodes: Vec<EpisodeDetails>,
}

// ---------------------------------------------------------------------------
// Provider trait
// ---------------------------------------------------------------------------

/// Async trait wrapping one remote catalog service.
///
/// Providers are shared behind an `Arc` between the matcher, the sweep task
/// and the CLI.
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Short, lowercase identifier for this provider (e.g. `"tmdb"`).
    fn name(&self) -> &'static str;

    /// Returns `true` when the provider has credentials and can serve requests.
    fn is_available(&self) -> bool;

    /// Search for films matching `title`, optionally constrained by `year`.
    async fn search_movie(
        &self,
        title: &str,
        year: Option<i32>,
    ) -> anyhow::Result<Vec<SearchCandidate>>;

    /// Search for TV shows matching `title`, optionally by first-air year.
    async fn search_tv(
        &self,
        title: &str,
        year: Option<i32>,
    ) -> anyhow::Result<Vec<SearchCandidate>>;

    /// Fetch a film with its credits.
    async fn fetch_movie(&self, external_id: i64) -> anyhow::Result<FilmDetails>;

    /// Fetch one season of a show, including its episodes.
    async fn fetch_season(&self, show_id: i64, season: i32) -> anyhow::Result<SeasonDetails>;

    /// Download an image referenced by a provider image path.
    async fn download_image(&self, path: &str) -> anyhow::Result<Vec<u8>>;
}
