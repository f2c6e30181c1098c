//! Rust models matching the catalog schema.
//!
//! Row types are plain owned data so they can be moved across threads without
//! sharing; nothing here holds a connection.

use chrono::{DateTime, Utc};
use reelvault_common::{
    AttachedFileId, EntryId, EpisodeId, MatchState, MediaKind, SortDirection, SortKey,
};
use serde::{Deserialize, Serialize};

/// One film or one TV season.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogEntry {
    pub id: EntryId,
    /// Unique across entries, episodes and attached files. For a season this
    /// is the season directory.
    pub file_path: String,
    pub title: String,
    pub year: Option<i32>,
    pub runtime_minutes: Option<i32>,
    pub plot: Option<String>,
    pub poster_path: Option<String>,
    /// Id in the remote catalog service. For seasons this is the show id.
    pub external_id: Option<i64>,
    /// Cross-reference id such as an IMDb `tt` number.
    pub cross_ref_id: Option<String>,
    pub rating: Option<f64>,
    pub added_at: DateTime<Utc>,
    pub match_state: MatchState,
    pub kind: MediaKind,
    pub season_number: Option<i32>,
}

/// Values for a new catalog row.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    pub file_path: String,
    pub title: String,
    pub year: Option<i32>,
    pub kind: MediaKind,
    pub season_number: Option<i32>,
}

impl NewEntry {
    /// A standalone film parsed from a filename.
    pub fn film(path: impl Into<String>, title: impl Into<String>, year: Option<i32>) -> Self {
        Self {
            file_path: path.into(),
            title: title.into(),
            year,
            kind: MediaKind::Film,
            season_number: None,
        }
    }

    /// A TV season keyed by its directory.
    pub fn season(dir: impl Into<String>, title: impl Into<String>, season: i32) -> Self {
        Self {
            file_path: dir.into(),
            title: title.into(),
            year: None,
            kind: MediaKind::TvSeason,
            season_number: Some(season),
        }
    }
}

/// Metadata written by a successful remote fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryMetadata {
    pub title: String,
    pub year: Option<i32>,
    pub runtime_minutes: Option<i32>,
    pub plot: Option<String>,
    pub external_id: Option<i64>,
    pub cross_ref_id: Option<String>,
    pub rating: Option<f64>,
}

/// An episode owned by a TV season entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Episode {
    pub id: EpisodeId,
    pub season_id: EntryId,
    pub episode_number: i32,
    pub title: Option<String>,
    pub file_path: String,
    pub runtime_minutes: Option<i32>,
    pub plot: Option<String>,
    pub external_id: Option<i64>,
    pub air_date: Option<String>,
}

/// Remote metadata for one episode, matched to local rows by episode number.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EpisodeMetadata {
    pub episode_number: i32,
    pub title: Option<String>,
    pub runtime_minutes: Option<i32>,
    pub plot: Option<String>,
    pub external_id: Option<i64>,
    pub air_date: Option<String>,
}

/// A secondary video file of a film (multi-part or alternate cut).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttachedFile {
    pub id: AttachedFileId,
    pub entry_id: EntryId,
    pub file_path: String,
    pub label: Option<String>,
    pub sort_order: i32,
}

/// A deduplicated named entity (genre, actor or director).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Person {
    pub id: i64,
    pub name: String,
    pub external_id: Option<i64>,
}

/// An actor credited on an entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CastMember {
    pub actor: Person,
    pub role: Option<String>,
    pub cast_order: i32,
}

/// An entry with everything hanging off it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntryDetails {
    pub entry: CatalogEntry,
    pub genres: Vec<String>,
    pub cast: Vec<CastMember>,
    pub directors: Vec<Person>,
    pub episodes: Vec<Episode>,
    pub attached_files: Vec<AttachedFile>,
}

/// Parameters of a catalog page query.
///
/// Values of this type are copied into background requests; the consumer's
/// own copy is never shared.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryFilter {
    /// Exact genre name.
    pub genre: Option<String>,
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
    /// Substring of the title.
    pub title: Option<String>,
    /// Substring of any credited actor's name.
    pub actor: Option<String>,
    /// Substring of the plot summary.
    pub plot: Option<String>,
    pub sort: SortKey,
    pub direction: SortDirection,
}

/// Pagination options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub offset: u32,
    pub limit: u32,
}

impl Pagination {
    pub fn new(offset: u32, limit: u32) -> Self {
        Self { offset, limit }
    }
}
