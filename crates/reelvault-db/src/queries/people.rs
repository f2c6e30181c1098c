//! Genre, actor and director queries.
//!
//! Each named entity is deduplicated on its name and created lazily the
//! first time a fetched record mentions it. Link rows are upserts, so
//! re-applying the same metadata never duplicates anything.

use rusqlite::Connection;
use reelvault_common::{EntryId, Result};

use super::db_err;
use crate::models::{CastMember, Person};

/// Insert `name` into a name-keyed table if missing and return its id.
fn find_or_create(
    conn: &Connection,
    table: &str,
    name: &str,
    external_id: Option<i64>,
) -> Result<i64> {
    let with_external = table != "genres";

    if with_external {
        conn.execute(
            &format!(
                "INSERT INTO {table} (name, external_id) VALUES (:name, :external_id)
                 ON CONFLICT(name) DO UPDATE SET external_id = COALESCE(excluded.external_id, external_id)"
            ),
            rusqlite::named_params! { ":name": name, ":external_id": external_id },
        )
    } else {
        conn.execute(
            &format!("INSERT OR IGNORE INTO {table} (name) VALUES (:name)"),
            rusqlite::named_params! { ":name": name },
        )
    }
    .map_err(db_err)?;

    conn.query_row(
        &format!("SELECT id FROM {table} WHERE name = :name"),
        rusqlite::named_params! { ":name": name },
        |row| row.get(0),
    )
    .map_err(db_err)
}

/// Find or create a genre by name.
pub fn find_or_create_genre(conn: &Connection, name: &str) -> Result<i64> {
    find_or_create(conn, "genres", name, None)
}

/// Find or create an actor by name, recording the remote id when known.
pub fn find_or_create_actor(conn: &Connection, name: &str, external_id: Option<i64>) -> Result<i64> {
    find_or_create(conn, "actors", name, external_id)
}

/// Find or create a director by name, recording the remote id when known.
pub fn find_or_create_director(
    conn: &Connection,
    name: &str,
    external_id: Option<i64>,
) -> Result<i64> {
    find_or_create(conn, "directors", name, external_id)
}

/// Link a genre to an entry. Linking twice is a no-op.
pub fn link_genre(conn: &Connection, entry_id: EntryId, genre_id: i64) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO entry_genres (entry_id, genre_id) VALUES (:entry, :genre)",
        rusqlite::named_params! { ":entry": entry_id.get(), ":genre": genre_id },
    )
    .map_err(db_err)?;
    Ok(())
}

/// Credit an actor on an entry.
///
/// Keyed on (entry, actor): a second call updates role and order in place.
pub fn link_actor(
    conn: &Connection,
    entry_id: EntryId,
    actor_id: i64,
    role: Option<&str>,
    cast_order: i32,
) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO entry_actors (entry_id, actor_id, role, cast_order)
         VALUES (:entry, :actor, :role, :order)",
        rusqlite::named_params! {
            ":entry": entry_id.get(),
            ":actor": actor_id,
            ":role": role,
            ":order": cast_order,
        },
    )
    .map_err(db_err)?;
    Ok(())
}

/// Credit a director on an entry. Linking twice is a no-op.
pub fn link_director(conn: &Connection, entry_id: EntryId, director_id: i64) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO entry_directors (entry_id, director_id) VALUES (:entry, :director)",
        rusqlite::named_params! { ":entry": entry_id.get(), ":director": director_id },
    )
    .map_err(db_err)?;
    Ok(())
}

/// Remove every genre, cast and director link of an entry.
///
/// The named entities themselves stay; other entries may still use them.
pub fn clear_associations(conn: &Connection, entry_id: EntryId) -> Result<()> {
    for table in ["entry_genres", "entry_actors", "entry_directors"] {
        conn.execute(
            &format!("DELETE FROM {table} WHERE entry_id = :entry"),
            rusqlite::named_params! { ":entry": entry_id.get() },
        )
        .map_err(db_err)?;
    }
    Ok(())
}

/// Genre names of an entry, alphabetically.
pub fn genres_for(conn: &Connection, entry_id: EntryId) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare(
            "SELECT g.name FROM genres g
             JOIN entry_genres eg ON eg.genre_id = g.id
             WHERE eg.entry_id = :entry ORDER BY g.name",
        )
        .map_err(db_err)?;

    let names = stmt
        .query_map(rusqlite::named_params! { ":entry": entry_id.get() }, |row| {
            row.get(0)
        })
        .map_err(db_err)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(db_err)?;

    Ok(names)
}

/// Cast of an entry in billing order.
pub fn cast_for(conn: &Connection, entry_id: EntryId) -> Result<Vec<CastMember>> {
    let mut stmt = conn
        .prepare(
            "SELECT a.id, a.name, a.external_id, ea.role, ea.cast_order FROM actors a
             JOIN entry_actors ea ON ea.actor_id = a.id
             WHERE ea.entry_id = :entry ORDER BY ea.cast_order, a.id",
        )
        .map_err(db_err)?;

    let cast = stmt
        .query_map(rusqlite::named_params! { ":entry": entry_id.get() }, |row| {
            Ok(CastMember {
                actor: Person {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    external_id: row.get(2)?,
                },
                role: row.get(3)?,
                cast_order: row.get(4)?,
            })
        })
        .map_err(db_err)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(db_err)?;

    Ok(cast)
}

/// Directors of an entry.
pub fn directors_for(conn: &Connection, entry_id: EntryId) -> Result<Vec<Person>> {
    let mut stmt = conn
        .prepare(
            "SELECT d.id, d.name, d.external_id FROM directors d
             JOIN entry_directors ed ON ed.director_id = d.id
             WHERE ed.entry_id = :entry ORDER BY d.name",
        )
        .map_err(db_err)?;

    let directors = stmt
        .query_map(rusqlite::named_params! { ":entry": entry_id.get() }, |row| {
            Ok(Person {
                id: row.get(0)?,
                name: row.get(1)?,
                external_id: row.get(2)?,
            })
        })
        .map_err(db_err)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(db_err)?;

    Ok(directors)
}
