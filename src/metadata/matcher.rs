//! Matching catalog entries to remote records.
//!
//! The [`Matcher`] searches the provider, decides whether a search result is
//! good enough to accept without asking, fetches full details and writes them
//! into the catalog together with genres, credits, episode data and poster.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use reelvault_common::{EntryId, Error, MatchState, MediaKind};
use reelvault_db::models::{CatalogEntry, EntryMetadata, EpisodeMetadata};
use reelvault_db::pool::Catalog;
use reelvault_db::queries::{entries, episodes, people};
use tracing::{debug, info, warn};

use super::provider::{CatalogProvider, FilmDetails, SearchCandidate, SeasonDetails};
use super::providers::tmdb::MAX_RESULTS;
use crate::images::PosterStore;
use crate::loader::delivery::{Delivery, DeliverySender};
use crate::scanner::heuristics::{
    clean_search_query, parent_dir_name, parse_filename, season_title, show_from_season_title,
    show_name_from_dir,
};

const UNKNOWN_SHOW: &str = "Unknown Show";

/// Decide whether a search result may be accepted without the user.
///
/// Films: the top result is accepted when its year equals the local year,
/// or when the local year is unknown and it is the only result. Seasons:
/// the top result is accepted whenever there is one.
pub fn accept_candidate<'a>(
    kind: MediaKind,
    local_year: Option<i32>,
    candidates: &'a [SearchCandidate],
) -> Option<&'a SearchCandidate> {
    let top = candidates.first()?;
    match kind {
        MediaKind::TvSeason => Some(top),
        MediaKind::Film => match local_year {
            Some(year) if top.year == Some(year) => Some(top),
            None if candidates.len() == 1 => Some(top),
            _ => None,
        },
    }
}

/// Searches, fetches and applies remote metadata.
pub struct Matcher {
    catalog: Catalog,
    provider: Arc<dyn CatalogProvider>,
    posters: PosterStore,
    sink: Option<DeliverySender>,
}

impl Matcher {
    /// Create a new `Matcher`.
    ///
    /// # Arguments
    ///
    /// * `catalog` - Catalog the results are written to
    /// * `provider` - Remote catalog service
    /// * `posters` - Poster cache for downloaded artwork
    pub fn new(catalog: Catalog, provider: Arc<dyn CatalogProvider>, posters: PosterStore) -> Self {
        Self {
            catalog,
            provider,
            posters,
            sink: None,
        }
    }

    /// Post [`Delivery::GenresChanged`] to `sink` whenever genre links change.
    pub fn with_sink(mut self, sink: DeliverySender) -> Self {
        self.sink = Some(sink);
        self
    }

    fn genres_changed(&self) {
        if let Some(sink) = &self.sink {
            sink.send(Delivery::GenresChanged);
        }
    }

    pub fn provider(&self) -> &dyn CatalogProvider {
        self.provider.as_ref()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Search the remote catalog.
    ///
    /// The query is cleaned first; a year found in it is used when no
    /// `hint_year` is given. Any failure yields an empty list.
    pub async fn search(
        &self,
        query: &str,
        hint_year: Option<i32>,
        kind: MediaKind,
    ) -> Vec<SearchCandidate> {
        if !self.provider.is_available() {
            warn!(provider = self.provider.name(), "Provider has no API key; search skipped");
            return Vec::new();
        }

        let cleaned = clean_search_query(query);
        if cleaned.text.is_empty() {
            debug!(query, "Nothing left to search after cleaning");
            return Vec::new();
        }
        let year = hint_year.or(cleaned.year);

        let result = match kind {
            MediaKind::Film => self.provider.search_movie(&cleaned.text, year).await,
            MediaKind::TvSeason => self.provider.search_tv(&cleaned.text, year).await,
        };

        match result {
            Ok(mut candidates) => {
                candidates.truncate(MAX_RESULTS);
                debug!(query = %cleaned.text, year = ?year, found = candidates.len(), "Search complete");
                candidates
            }
            Err(e) => {
                warn!(query = %cleaned.text, error = %e, "Search failed");
                Vec::new()
            }
        }
    }

    fn load_entry(&self, entry_id: EntryId) -> Result<CatalogEntry> {
        let conn = self.catalog.conn()?;
        let entry = entries::get_entry(&conn, entry_id)?
            .ok_or_else(|| Error::not_found(format!("entry {}", entry_id)))?;
        Ok(entry)
    }

    /// Fetch the remote record `external_id` and apply it to an entry.
    ///
    /// For seasons `external_id` is the show id and the season number comes
    /// from the entry. Nothing is written unless the fetch succeeds. A failed
    /// poster download is logged and leaves the previous poster in place.
    pub async fn fetch_and_apply(
        &self,
        entry_id: EntryId,
        external_id: i64,
        state: MatchState,
    ) -> Result<()> {
        self.apply_remote(entry_id, external_id, state, None).await?;
        Ok(())
    }

    /// Fetch and write a remote record. With `expected` set, nothing is
    /// written unless the entry is still in that state when the fetch returns.
    ///
    /// Returns whether the record was written.
    async fn apply_remote(
        &self,
        entry_id: EntryId,
        external_id: i64,
        state: MatchState,
        expected: Option<MatchState>,
    ) -> Result<bool> {
        let entry = self.load_entry(entry_id)?;

        let (written, poster) = match entry.kind {
            MediaKind::Film => {
                let film = self
                    .provider
                    .fetch_movie(external_id)
                    .await
                    .with_context(|| format!("Failed to fetch film {external_id}"))?;
                let written = self.write_film(entry_id, &film, state, expected)?;
                (written, film.poster_path)
            }
            MediaKind::TvSeason => {
                let season = entry.season_number.unwrap_or(1);
                let details = self
                    .provider
                    .fetch_season(external_id, season)
                    .await
                    .with_context(|| format!("Failed to fetch show {external_id} season {season}"))?;
                let written = self.write_season(entry_id, &details, state, expected)?;
                (written, details.poster_path)
            }
        };

        if !written {
            info!(entry_id = %entry_id, "Entry changed state while matching; result discarded");
            return Ok(false);
        }
        self.genres_changed();
        info!(entry_id = %entry_id, external_id, state = ?state, "Applied remote metadata");

        if let Some(remote_path) = poster {
            if let Err(e) = self.refresh_poster(entry_id, &remote_path).await {
                warn!(entry_id = %entry_id, error = %e, "Poster download failed; keeping previous poster");
            }
        }
        Ok(true)
    }

    async fn refresh_poster(&self, entry_id: EntryId, remote_path: &str) -> Result<()> {
        let bytes = self.provider.download_image(remote_path).await?;
        let stored = self.posters.store(entry_id, &bytes)?;
        let conn = self.catalog.conn()?;
        entries::set_poster(&conn, entry_id, Some(&stored.to_string_lossy()))?;
        Ok(())
    }

    fn write_film(
        &self,
        entry_id: EntryId,
        film: &FilmDetails,
        state: MatchState,
        expected: Option<MatchState>,
    ) -> Result<bool> {
        let conn = self.catalog.conn()?;
        let tx = conn.unchecked_transaction()?;

        let meta = EntryMetadata {
            title: film.title.clone(),
            year: film.year,
            runtime_minutes: film.runtime_minutes,
            plot: film.plot.clone(),
            external_id: Some(film.external_id),
            cross_ref_id: film.cross_ref_id.clone(),
            rating: film.rating,
        };
        let written = match expected {
            Some(expected) => {
                entries::update_metadata_if_state(&tx, entry_id, &meta, state, expected)?
            }
            None => entries::update_metadata(&tx, entry_id, &meta, state).map(|()| true)?,
        };
        if !written {
            return Ok(false);
        }

        people::clear_associations(&tx, entry_id)?;
        for genre in &film.genres {
            let id = people::find_or_create_genre(&tx, genre)?;
            people::link_genre(&tx, entry_id, id)?;
        }
        for member in &film.cast {
            let id = people::find_or_create_actor(&tx, &member.name, member.external_id)?;
            people::link_actor(&tx, entry_id, id, member.role.as_deref(), member.order)?;
        }
        for director in &film.directors {
            let id = people::find_or_create_director(&tx, &director.name, director.external_id)?;
            people::link_director(&tx, entry_id, id)?;
        }

        tx.commit()?;
        debug!(
            entry_id = %entry_id,
            genres = film.genres.len(),
            cast = film.cast.len(),
            directors = film.directors.len(),
            "Stored film metadata"
        );
        Ok(true)
    }

    fn write_season(
        &self,
        entry_id: EntryId,
        season: &SeasonDetails,
        state: MatchState,
        expected: Option<MatchState>,
    ) -> Result<bool> {
        let conn = self.catalog.conn()?;
        let tx = conn.unchecked_transaction()?;

        let show = if season.show_name.is_empty() {
            UNKNOWN_SHOW
        } else {
            season.show_name.as_str()
        };

        let meta = EntryMetadata {
            title: season_title(show, season.season_number),
            year: season.year,
            runtime_minutes: None,
            plot: season.plot.clone(),
            external_id: Some(season.show_id),
            cross_ref_id: season.cross_ref_id.clone(),
            rating: season.rating,
        };
        let written = match expected {
            Some(expected) => {
                entries::update_metadata_if_state(&tx, entry_id, &meta, state, expected)?
            }
            None => entries::update_metadata(&tx, entry_id, &meta, state).map(|()| true)?,
        };
        if !written {
            return Ok(false);
        }

        people::clear_associations(&tx, entry_id)?;
        for genre in &season.genres {
            let id = people::find_or_create_genre(&tx, genre)?;
            people::link_genre(&tx, entry_id, id)?;
        }

        let mut updated = 0;
        for episode in &season.episodes {
            updated += episodes::update_from_remote(
                &tx,
                entry_id,
                &EpisodeMetadata {
                    episode_number: episode.episode_number,
                    title: episode.title.clone(),
                    runtime_minutes: episode.runtime_minutes,
                    plot: episode.plot.clone(),
                    external_id: episode.external_id,
                    air_date: episode.air_date.clone(),
                },
            )?;
        }

        tx.commit()?;
        debug!(
            entry_id = %entry_id,
            remote_episodes = season.episodes.len(),
            updated,
            "Stored season metadata"
        );
        Ok(true)
    }

    /// Apply a record the user picked, changing the entry's kind if needed.
    ///
    /// An entry turned into a season keeps a positive season number or gets 1.
    pub async fn apply_manual(
        &self,
        entry_id: EntryId,
        external_id: i64,
        kind: MediaKind,
    ) -> Result<()> {
        let entry = self.load_entry(entry_id)?;

        if entry.kind != kind {
            let season = match kind {
                MediaKind::TvSeason => Some(entry.season_number.filter(|n| *n > 0).unwrap_or(1)),
                MediaKind::Film => None,
            };
            let conn = self.catalog.conn()?;
            entries::set_kind(&conn, entry_id, kind, season)?;
            info!(entry_id = %entry_id, kind = %kind, "Changed entry kind");
        }

        self.fetch_and_apply(entry_id, external_id, MatchState::ManuallyMatched)
            .await
    }

    /// Search for an entry and apply the result if it passes [`accept_candidate`].
    ///
    /// Only entries that are still unmatched are touched, so a user decision
    /// made after `entry` was listed wins. Returns whether the entry was matched.
    pub async fn auto_match(&self, entry: &CatalogEntry) -> Result<bool> {
        let current = self.load_entry(entry.id)?;
        let entry = &current;
        if entry.match_state != MatchState::Unmatched {
            debug!(entry_id = %entry.id, state = ?entry.match_state, "No longer unmatched; skipped");
            return Ok(false);
        }

        let query = match entry.kind {
            MediaKind::Film => entry.title.as_str(),
            MediaKind::TvSeason => show_from_season_title(&entry.title),
        };
        let year = match entry.kind {
            MediaKind::Film => entry.year,
            MediaKind::TvSeason => None,
        };

        let candidates = self.search(query, year, entry.kind).await;
        let Some(choice) = accept_candidate(entry.kind, entry.year, &candidates) else {
            debug!(entry_id = %entry.id, found = candidates.len(), "No confident match");
            return Ok(false);
        };

        self.apply_remote(
            entry.id,
            choice.external_id,
            MatchState::AutoMatched,
            Some(MatchState::Unmatched),
        )
        .await
    }

    /// Reject the current match and return the entry to its scanned state.
    ///
    /// Fetched fields and links are cleared and the title is derived again
    /// from the path. Running it twice leaves the same state as once.
    pub fn reset_to_unmatched(&self, entry_id: EntryId) -> Result<()> {
        let entry = self.load_entry(entry_id)?;
        let conn = self.catalog.conn()?;

        let (title, year) = placeholder_title(&entry);
        entries::clear_metadata(&conn, entry_id, &title, year)?;

        if entry.kind == MediaKind::TvSeason {
            for episode in episodes::list_for_season(&conn, entry_id)? {
                let name = Path::new(&episode.file_path)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| episode.file_path.clone());
                episodes::reset_metadata(&conn, episode.id, &name)?;
            }
            if entry.season_number.is_some_and(|n| n < 0) {
                entries::set_kind(&conn, entry_id, MediaKind::TvSeason, Some(1))?;
            }
        }

        self.genres_changed();
        info!(entry_id = %entry_id, title = %title, "Reset to unmatched");
        Ok(())
    }

    /// Exclude an entry from automatic matching.
    pub fn ignore(&self, entry_id: EntryId) -> Result<()> {
        let conn = self.catalog.conn()?;
        entries::set_match_state(&conn, entry_id, MatchState::Ignored)?;
        info!(entry_id = %entry_id, "Ignored entry");
        Ok(())
    }
}

/// Title and year an entry had straight after scanning.
fn placeholder_title(entry: &CatalogEntry) -> (String, Option<i32>) {
    match entry.kind {
        MediaKind::Film => {
            let parsed = parse_filename(&entry.file_path);
            (parsed.title, parsed.year)
        }
        MediaKind::TvSeason => {
            let show = parent_dir_name(Path::new(&entry.file_path))
                .map(|name| show_name_from_dir(&name))
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| UNKNOWN_SHOW.to_string());
            let season = entry.season_number.filter(|n| *n >= 0).unwrap_or(1);
            (season_title(&show, season), None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: i64, year: Option<i32>) -> SearchCandidate {
        SearchCandidate {
            external_id: id,
            title: format!("Candidate {id}"),
            year,
            overview: None,
            poster_path: None,
            kind: MediaKind::Film,
        }
    }

    #[test]
    fn test_film_needs_matching_year() {
        let results = vec![candidate(1, Some(1999)), candidate(2, Some(2003))];
        assert_eq!(
            accept_candidate(MediaKind::Film, Some(1999), &results).map(|c| c.external_id),
            Some(1)
        );
        assert!(accept_candidate(MediaKind::Film, Some(2003), &results).is_none());
    }

    #[test]
    fn test_film_without_year_needs_single_result() {
        let one = vec![candidate(1, Some(1999))];
        let two = vec![candidate(1, Some(1999)), candidate(2, None)];
        assert!(accept_candidate(MediaKind::Film, None, &one).is_some());
        assert!(accept_candidate(MediaKind::Film, None, &two).is_none());
    }

    #[test]
    fn test_season_takes_top_result() {
        let results = vec![candidate(7, Some(2008)), candidate(8, Some(2010))];
        assert_eq!(
            accept_candidate(MediaKind::TvSeason, Some(1990), &results).map(|c| c.external_id),
            Some(7)
        );
        assert!(accept_candidate(MediaKind::TvSeason, None, &[]).is_none());
    }

    #[test]
    fn test_placeholder_titles() {
        let catalog = Catalog::in_memory().unwrap();
        let conn = catalog.conn().unwrap();
        let film = entries::insert_entry(
            &conn,
            &reelvault_db::models::NewEntry::film("/m/Heat.1995.1080p.mkv", "Whatever", None),
        )
        .unwrap()
        .unwrap();
        let specials = entries::insert_entry(
            &conn,
            &reelvault_db::models::NewEntry::season("/tv/The.Wire/Specials", "x", 0),
        )
        .unwrap()
        .unwrap();

        let film = entries::get_entry(&conn, film).unwrap().unwrap();
        assert_eq!(placeholder_title(&film), ("Heat".to_string(), Some(1995)));

        let specials = entries::get_entry(&conn, specials).unwrap().unwrap();
        assert_eq!(placeholder_title(&specials), ("The Wire - Specials".to_string(), None));
    }
}
