//! Catalog entry queries.
//!
//! CRUD for films and TV seasons, the filtered page/count queries used by the
//! loader, and the combined path-tracking check used by the scanner.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension};
use reelvault_common::{EntryId, Error, MatchState, MediaKind, Result, SortDirection, SortKey};

use super::{attached_files, db_err, episodes, is_constraint_violation, people};
use crate::models::{CatalogEntry, EntryDetails, EntryFilter, EntryMetadata, NewEntry, Pagination};

const ENTRY_COLUMNS: &str = "e.id, e.file_path, e.title, e.year, e.runtime_minutes, e.plot,
     e.poster_path, e.external_id, e.cross_ref_id, e.rating, e.added_at,
     e.match_state, e.kind, e.season_number";

fn parse_entry_row(row: &rusqlite::Row) -> rusqlite::Result<CatalogEntry> {
    let added_at: String = row.get(10)?;
    let added_at = DateTime::parse_from_rfc3339(&added_at)
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(10, rusqlite::types::Type::Text, Box::new(e))
        })?
        .with_timezone(&Utc);

    Ok(CatalogEntry {
        id: EntryId::from(row.get::<_, i64>(0)?),
        file_path: row.get(1)?,
        title: row.get(2)?,
        year: row.get(3)?,
        runtime_minutes: row.get(4)?,
        plot: row.get(5)?,
        poster_path: row.get(6)?,
        external_id: row.get(7)?,
        cross_ref_id: row.get(8)?,
        rating: row.get(9)?,
        added_at,
        match_state: MatchState::from_code(row.get(11)?),
        kind: MediaKind::from_code(row.get(12)?),
        season_number: row.get(13)?,
    })
}

/// Timestamp format used for `added_at`. Fixed width so text order is time order.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Insert a new catalog entry.
///
/// # Arguments
///
/// * `conn` - Database connection
/// * `entry` - Values for the new row
///
/// # Returns
///
/// * `Ok(Some(EntryId))` - Id of the inserted row
/// * `Ok(None)` - If an entry with this path already exists
/// * `Err(Error)` - If a database error occurs
pub fn insert_entry(conn: &Connection, entry: &NewEntry) -> Result<Option<EntryId>> {
    let result = conn.execute(
        "INSERT INTO entries (file_path, title, year, added_at, match_state, kind, season_number)
         VALUES (:path, :title, :year, :added_at, :state, :kind, :season)",
        rusqlite::named_params! {
            ":path": entry.file_path,
            ":title": entry.title,
            ":year": entry.year,
            ":added_at": timestamp(Utc::now()),
            ":state": MatchState::Unmatched.code(),
            ":kind": entry.kind.code(),
            ":season": entry.season_number,
        },
    );

    match result {
        Ok(_) => Ok(Some(EntryId::from(conn.last_insert_rowid()))),
        Err(e) if is_constraint_violation(&e) => Ok(None),
        Err(e) => Err(db_err(e)),
    }
}

/// Get an entry by ID.
///
/// # Returns
///
/// * `Ok(Some(CatalogEntry))` - The entry if found
/// * `Ok(None)` - If the entry does not exist
/// * `Err(Error)` - If a database error occurs
pub fn get_entry(conn: &Connection, id: EntryId) -> Result<Option<CatalogEntry>> {
    conn.query_row(
        &format!("SELECT {ENTRY_COLUMNS} FROM entries e WHERE e.id = :id"),
        rusqlite::named_params! { ":id": id.get() },
        parse_entry_row,
    )
    .optional()
    .map_err(db_err)
}

/// Get an entry by its primary path (film file or season directory).
pub fn get_entry_by_path(conn: &Connection, path: &str) -> Result<Option<CatalogEntry>> {
    conn.query_row(
        &format!("SELECT {ENTRY_COLUMNS} FROM entries e WHERE e.file_path = :path"),
        rusqlite::named_params! { ":path": path },
        parse_entry_row,
    )
    .optional()
    .map_err(db_err)
}

/// Check whether a path is tracked as an entry, an episode or an attached file.
///
/// One query covers all three path-bearing tables.
pub fn is_path_tracked(conn: &Connection, path: &str) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM entries WHERE file_path = :path)
             OR EXISTS (SELECT 1 FROM episodes WHERE file_path = :path)
             OR EXISTS (SELECT 1 FROM attached_files WHERE file_path = :path)",
        rusqlite::named_params! { ":path": path },
        |row| row.get(0),
    )
    .map_err(db_err)
}

/// Change an entry's kind and season number in place.
///
/// Used to repair an entry the scanner previously misclassified and when a
/// user re-matches a film as a TV season (or back).
pub fn set_kind(
    conn: &Connection,
    id: EntryId,
    kind: MediaKind,
    season_number: Option<i32>,
) -> Result<()> {
    conn.execute(
        "UPDATE entries SET kind = :kind, season_number = :season WHERE id = :id",
        rusqlite::named_params! {
            ":kind": kind.code(),
            ":season": season_number,
            ":id": id.get(),
        },
    )
    .map_err(db_err)?;
    Ok(())
}

/// Overwrite an entry's title and year.
pub fn set_title_year(conn: &Connection, id: EntryId, title: &str, year: Option<i32>) -> Result<()> {
    conn.execute(
        "UPDATE entries SET title = :title, year = :year WHERE id = :id",
        rusqlite::named_params! { ":title": title, ":year": year, ":id": id.get() },
    )
    .map_err(db_err)?;
    Ok(())
}

/// Update the match state of an entry.
pub fn set_match_state(conn: &Connection, id: EntryId, state: MatchState) -> Result<()> {
    let changed = conn
        .execute(
            "UPDATE entries SET match_state = :state WHERE id = :id",
            rusqlite::named_params! { ":state": state.code(), ":id": id.get() },
        )
        .map_err(db_err)?;

    if changed == 0 {
        return Err(Error::not_found(format!("entry {}", id)));
    }
    Ok(())
}

/// Store fetched metadata and the resulting match state.
///
/// The poster path is written separately by [`set_poster`] so a failed image
/// download never blocks the metadata update.
pub fn update_metadata(
    conn: &Connection,
    id: EntryId,
    meta: &EntryMetadata,
    state: MatchState,
) -> Result<()> {
    if !write_metadata(conn, id, meta, state, None)? {
        return Err(Error::not_found(format!("entry {}", id)));
    }
    Ok(())
}

/// Like [`update_metadata`], but only while the entry is still in `expected`.
///
/// # Returns
///
/// * `Ok(true)` - If the metadata was written
/// * `Ok(false)` - If the entry has moved to another state meanwhile
/// * `Err(Error::NotFound)` - If the entry does not exist
pub fn update_metadata_if_state(
    conn: &Connection,
    id: EntryId,
    meta: &EntryMetadata,
    state: MatchState,
    expected: MatchState,
) -> Result<bool> {
    if write_metadata(conn, id, meta, state, Some(expected))? {
        return Ok(true);
    }
    if get_entry(conn, id)?.is_none() {
        return Err(Error::not_found(format!("entry {}", id)));
    }
    Ok(false)
}

fn write_metadata(
    conn: &Connection,
    id: EntryId,
    meta: &EntryMetadata,
    state: MatchState,
    expected: Option<MatchState>,
) -> Result<bool> {
    let changed = conn
        .execute(
            "UPDATE entries SET
                title = :title,
                year = :year,
                runtime_minutes = :runtime,
                plot = :plot,
                external_id = :external_id,
                cross_ref_id = :cross_ref_id,
                rating = :rating,
                match_state = :state
             WHERE id = :id AND (:expected IS NULL OR match_state = :expected)",
            rusqlite::named_params! {
                ":title": meta.title,
                ":year": meta.year,
                ":runtime": meta.runtime_minutes,
                ":plot": meta.plot,
                ":external_id": meta.external_id,
                ":cross_ref_id": meta.cross_ref_id,
                ":rating": meta.rating,
                ":state": state.code(),
                ":expected": expected.map(MatchState::code),
                ":id": id.get(),
            },
        )
        .map_err(db_err)?;
    Ok(changed > 0)
}

/// Set or clear the poster image path.
pub fn set_poster(conn: &Connection, id: EntryId, poster_path: Option<&str>) -> Result<()> {
    conn.execute(
        "UPDATE entries SET poster_path = :poster WHERE id = :id",
        rusqlite::named_params! { ":poster": poster_path, ":id": id.get() },
    )
    .map_err(db_err)?;
    Ok(())
}

/// Reset an entry to the unmatched placeholder state.
///
/// Clears every fetched field and all genre/cast/crew links, then writes the
/// placeholder title and year. Runs in one transaction.
pub fn clear_metadata(conn: &Connection, id: EntryId, title: &str, year: Option<i32>) -> Result<()> {
    let tx = conn.unchecked_transaction().map_err(db_err)?;

    people::clear_associations(&tx, id)?;

    tx.execute(
        "UPDATE entries SET
            title = :title,
            year = :year,
            runtime_minutes = NULL,
            plot = NULL,
            poster_path = NULL,
            external_id = NULL,
            cross_ref_id = NULL,
            rating = NULL,
            match_state = :state
         WHERE id = :id",
        rusqlite::named_params! {
            ":title": title,
            ":year": year,
            ":state": MatchState::Unmatched.code(),
            ":id": id.get(),
        },
    )
    .map_err(db_err)?;

    tx.commit().map_err(db_err)
}

/// Delete an entry. Episodes, attached files and link rows cascade.
///
/// # Returns
///
/// * `Ok(true)` - If the entry was deleted
/// * `Ok(false)` - If no such entry existed
pub fn delete_entry(conn: &Connection, id: EntryId) -> Result<bool> {
    let changed = conn
        .execute(
            "DELETE FROM entries WHERE id = :id",
            rusqlite::named_params! { ":id": id.get() },
        )
        .map_err(db_err)?;
    Ok(changed > 0)
}

/// Delete the film entry at `path`, if there is one. Seasons are left alone.
pub fn delete_film_by_path(conn: &Connection, path: &str) -> Result<bool> {
    let changed = conn
        .execute(
            "DELETE FROM entries WHERE file_path = :path AND kind = :kind",
            rusqlite::named_params! { ":path": path, ":kind": MediaKind::Film.code() },
        )
        .map_err(db_err)?;
    Ok(changed > 0)
}

/// All entries eligible for automatic matching, ordered by path.
pub fn list_unmatched(conn: &Connection) -> Result<Vec<CatalogEntry>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entries e
             WHERE e.match_state = :state ORDER BY e.file_path"
        ))
        .map_err(db_err)?;

    let entries = stmt
        .query_map(
            rusqlite::named_params! { ":state": MatchState::Unmatched.code() },
            parse_entry_row,
        )
        .map_err(db_err)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(db_err)?;

    Ok(entries)
}

/// FROM/WHERE fragment and its bound values for a filter.
struct FilterSql {
    from: String,
    params: Vec<(&'static str, Box<dyn ToSql>)>,
}

impl FilterSql {
    fn build(filter: &EntryFilter) -> Self {
        let mut from = String::from("entries e");
        let mut params: Vec<(&'static str, Box<dyn ToSql>)> = Vec::new();

        if let Some(ref genre) = filter.genre {
            from.push_str(
                " JOIN entry_genres eg ON eg.entry_id = e.id
                  JOIN genres g ON g.id = eg.genre_id AND g.name = :genre",
            );
            params.push((":genre", Box::new(genre.clone())));
        }

        from.push_str(" WHERE 1=1");

        if let Some(year) = filter.year_from {
            from.push_str(" AND e.year >= :year_from");
            params.push((":year_from", Box::new(year)));
        }

        if let Some(year) = filter.year_to {
            from.push_str(" AND e.year <= :year_to");
            params.push((":year_to", Box::new(year)));
        }

        if let Some(title) = non_empty(&filter.title) {
            from.push_str(" AND e.title LIKE :title ESCAPE '\\'");
            params.push((":title", Box::new(contains_pattern(title))));
        }

        if let Some(plot) = non_empty(&filter.plot) {
            from.push_str(" AND e.plot LIKE :plot ESCAPE '\\'");
            params.push((":plot", Box::new(contains_pattern(plot))));
        }

        if let Some(actor) = non_empty(&filter.actor) {
            from.push_str(
                " AND e.id IN (SELECT ea.entry_id FROM entry_actors ea
                               JOIN actors a ON a.id = ea.actor_id
                               WHERE a.name LIKE :actor ESCAPE '\\')",
            );
            params.push((":actor", Box::new(contains_pattern(actor))));
        }

        Self { from, params }
    }

    fn bound(&self) -> Vec<(&str, &dyn ToSql)> {
        self.params.iter().map(|(k, v)| (*k, v.as_ref())).collect()
    }
}

/// LIKE pattern matching `text` anywhere. Wildcards in `text` match literally.
fn contains_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// ORDER BY clause for a sort key. The id tiebreak makes the order total.
fn order_by(sort: SortKey, direction: SortDirection) -> String {
    let dir = direction.sql();
    let column = match sort {
        SortKey::Title => "e.title COLLATE NOCASE",
        SortKey::Year => "e.year",
        SortKey::Rating => "e.rating",
        SortKey::Added => "e.added_at",
    };
    format!(" ORDER BY {column} {dir}, e.id {dir}")
}

/// List one page of entries matching a filter.
///
/// The ordering is total, so concatenating consecutive pages yields the full
/// result set with no gaps or repeats.
///
/// # Arguments
///
/// * `conn` - Database connection (read-only handles are fine)
/// * `filter` - Filter and sort options
/// * `page` - Offset and limit
///
/// # Returns
///
/// * `Ok(Vec<CatalogEntry>)` - Up to `page.limit` entries
/// * `Err(Error)` - If a database error occurs
pub fn list_page(
    conn: &Connection,
    filter: &EntryFilter,
    page: Pagination,
) -> Result<Vec<CatalogEntry>> {
    let sql = FilterSql::build(filter);
    let query = format!(
        "SELECT {ENTRY_COLUMNS} FROM {}{} LIMIT :limit OFFSET :offset",
        sql.from,
        order_by(filter.sort, filter.direction)
    );

    let mut params = sql.bound();
    params.push((":limit", &page.limit));
    params.push((":offset", &page.offset));

    let mut stmt = conn.prepare(&query).map_err(db_err)?;
    let entries = stmt
        .query_map(&*params, parse_entry_row)
        .map_err(db_err)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(db_err)?;

    Ok(entries)
}

/// Count entries matching a filter.
pub fn count(conn: &Connection, filter: &EntryFilter) -> Result<u32> {
    let sql = FilterSql::build(filter);
    let query = format!("SELECT COUNT(*) FROM {}", sql.from);

    conn.query_row(&query, &*sql.bound(), |row| row.get(0))
        .map_err(db_err)
}

/// Count all entries still awaiting a match.
pub fn count_unmatched(conn: &Connection) -> Result<u32> {
    conn.query_row(
        "SELECT COUNT(*) FROM entries WHERE match_state = :state",
        rusqlite::named_params! { ":state": MatchState::Unmatched.code() },
        |row| row.get(0),
    )
    .map_err(db_err)
}

/// Names of genres linked to at least one entry, alphabetically.
pub fn list_genres(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare(
            "SELECT g.name FROM genres g
             WHERE EXISTS (SELECT 1 FROM entry_genres eg WHERE eg.genre_id = g.id)
             ORDER BY g.name COLLATE NOCASE",
        )
        .map_err(db_err)?;

    let names = stmt
        .query_map([], |row| row.get(0))
        .map_err(db_err)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(db_err)?;

    Ok(names)
}

/// Load an entry together with its genres, credits, episodes and attached files.
pub fn get_details(conn: &Connection, id: EntryId) -> Result<Option<EntryDetails>> {
    let Some(entry) = get_entry(conn, id)? else {
        return Ok(None);
    };

    Ok(Some(EntryDetails {
        genres: people::genres_for(conn, id)?,
        cast: people::cast_for(conn, id)?,
        directors: people::directors_for(conn, id)?,
        episodes: episodes::list_for_season(conn, id)?,
        attached_files: attached_files::list_for_entry(conn, id)?,
        entry,
    }))
}
