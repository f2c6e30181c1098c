//! Episode queries.
//!
//! Episodes belong to exactly one TV season entry and are keyed by file path.

use rusqlite::{Connection, OptionalExtension};
use reelvault_common::{EntryId, EpisodeId, Result};

use super::db_err;
use crate::models::{Episode, EpisodeMetadata};

const EPISODE_COLUMNS: &str = "id, season_id, episode_number, title, file_path,
     runtime_minutes, plot, external_id, air_date";

fn parse_episode_row(row: &rusqlite::Row) -> rusqlite::Result<Episode> {
    Ok(Episode {
        id: EpisodeId::from(row.get::<_, i64>(0)?),
        season_id: EntryId::from(row.get::<_, i64>(1)?),
        episode_number: row.get(2)?,
        title: row.get(3)?,
        file_path: row.get(4)?,
        runtime_minutes: row.get(5)?,
        plot: row.get(6)?,
        external_id: row.get(7)?,
        air_date: row.get(8)?,
    })
}

/// Find the episode at `path`, creating it under `season_id` if absent.
///
/// An existing row that was filed under another season is moved to
/// `season_id`, so re-scans after a season repair stay consistent.
///
/// # Returns
///
/// * `Ok((EpisodeId, true))` - A new episode was inserted
/// * `Ok((EpisodeId, false))` - The episode already existed
/// * `Err(Error)` - If a database error occurs
pub fn find_or_create(
    conn: &Connection,
    season_id: EntryId,
    path: &str,
    episode_number: i32,
    title: &str,
) -> Result<(EpisodeId, bool)> {
    if let Some(existing) = get_by_path(conn, path)? {
        if existing.season_id != season_id {
            conn.execute(
                "UPDATE episodes SET season_id = :season WHERE id = :id",
                rusqlite::named_params! { ":season": season_id.get(), ":id": existing.id.get() },
            )
            .map_err(db_err)?;
        }
        return Ok((existing.id, false));
    }

    conn.execute(
        "INSERT INTO episodes (season_id, episode_number, title, file_path)
         VALUES (:season, :number, :title, :path)",
        rusqlite::named_params! {
            ":season": season_id.get(),
            ":number": episode_number,
            ":title": title,
            ":path": path,
        },
    )
    .map_err(db_err)?;

    Ok((EpisodeId::from(conn.last_insert_rowid()), true))
}

/// Get an episode by file path.
pub fn get_by_path(conn: &Connection, path: &str) -> Result<Option<Episode>> {
    conn.query_row(
        &format!("SELECT {EPISODE_COLUMNS} FROM episodes WHERE file_path = :path"),
        rusqlite::named_params! { ":path": path },
        parse_episode_row,
    )
    .optional()
    .map_err(db_err)
}

/// List the episodes of a season in episode order.
pub fn list_for_season(conn: &Connection, season_id: EntryId) -> Result<Vec<Episode>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {EPISODE_COLUMNS} FROM episodes
             WHERE season_id = :season ORDER BY episode_number, id"
        ))
        .map_err(db_err)?;

    let episodes = stmt
        .query_map(
            rusqlite::named_params! { ":season": season_id.get() },
            parse_episode_row,
        )
        .map_err(db_err)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(db_err)?;

    Ok(episodes)
}

/// Apply remote metadata to the local episodes with the same episode number.
///
/// Local episodes without a counterpart are untouched; nothing is deleted.
///
/// # Returns
///
/// * `Ok(usize)` - Number of local rows updated
pub fn update_from_remote(
    conn: &Connection,
    season_id: EntryId,
    meta: &EpisodeMetadata,
) -> Result<usize> {
    conn.execute(
        "UPDATE episodes SET
            title = COALESCE(:title, title),
            runtime_minutes = :runtime,
            plot = :plot,
            external_id = :external_id,
            air_date = :air_date
         WHERE season_id = :season AND episode_number = :number",
        rusqlite::named_params! {
            ":title": meta.title,
            ":runtime": meta.runtime_minutes,
            ":plot": meta.plot,
            ":external_id": meta.external_id,
            ":air_date": meta.air_date,
            ":season": season_id.get(),
            ":number": meta.episode_number,
        },
    )
    .map_err(db_err)
}

/// Drop fetched fields from an episode and restore its placeholder title.
pub fn reset_metadata(conn: &Connection, id: EpisodeId, title: &str) -> Result<()> {
    conn.execute(
        "UPDATE episodes SET
            title = :title,
            runtime_minutes = NULL,
            plot = NULL,
            external_id = NULL,
            air_date = NULL
         WHERE id = :id",
        rusqlite::named_params! { ":title": title, ":id": id.get() },
    )
    .map_err(db_err)?;
    Ok(())
}
