//! Attached file queries.
//!
//! Secondary video files (second disc, alternate cut) hang off a film entry.
//! A path is either a film, an episode or an attached file, never two of them.

use rusqlite::Connection;
use reelvault_common::{AttachedFileId, EntryId, Error, MediaKind, Result};

use super::{db_err, entries, episodes, is_constraint_violation};
use crate::models::AttachedFile;

/// Attach a file to a film entry.
///
/// If `path` is currently tracked as a standalone film of its own, that row
/// is removed first so the path stays exclusive.
///
/// # Returns
///
/// * `Ok(Some(AttachedFileId))` - The new attachment
/// * `Ok(None)` - If the path is already attached somewhere
/// * `Err(Error)` - If the owner is missing, is not a film, or a database error occurs
pub fn attach(
    conn: &Connection,
    entry_id: EntryId,
    path: &str,
    label: Option<&str>,
) -> Result<Option<AttachedFileId>> {
    let owner = entries::get_entry(conn, entry_id)?
        .ok_or_else(|| Error::not_found(format!("entry {}", entry_id)))?;
    if owner.kind != MediaKind::Film {
        return Err(Error::invalid_input("files can only be attached to films"));
    }
    if owner.file_path == path {
        return Err(Error::invalid_input("an entry cannot attach its own file"));
    }
    if episodes::get_by_path(conn, path)?.is_some() {
        return Err(Error::invalid_input("path is tracked as an episode"));
    }

    let tx = conn.unchecked_transaction().map_err(db_err)?;

    entries::delete_film_by_path(&tx, path)?;

    let next_order: i32 = tx
        .query_row(
            "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM attached_files WHERE entry_id = :entry",
            rusqlite::named_params! { ":entry": entry_id.get() },
            |row| row.get(0),
        )
        .map_err(db_err)?;

    let result = tx.execute(
        "INSERT INTO attached_files (entry_id, file_path, label, sort_order)
         VALUES (:entry, :path, :label, :order)",
        rusqlite::named_params! {
            ":entry": entry_id.get(),
            ":path": path,
            ":label": label,
            ":order": next_order,
        },
    );

    let id = match result {
        Ok(_) => AttachedFileId::from(tx.last_insert_rowid()),
        Err(e) if is_constraint_violation(&e) => return Ok(None),
        Err(e) => return Err(db_err(e)),
    };

    tx.commit().map_err(db_err)?;
    Ok(Some(id))
}

/// Remove an attachment. Returns whether a row was deleted.
pub fn detach(conn: &Connection, id: AttachedFileId) -> Result<bool> {
    let changed = conn
        .execute(
            "DELETE FROM attached_files WHERE id = :id",
            rusqlite::named_params! { ":id": id.get() },
        )
        .map_err(db_err)?;
    Ok(changed > 0)
}

/// List an entry's attached files in sort order.
pub fn list_for_entry(conn: &Connection, entry_id: EntryId) -> Result<Vec<AttachedFile>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, entry_id, file_path, label, sort_order FROM attached_files
             WHERE entry_id = :entry ORDER BY sort_order, id",
        )
        .map_err(db_err)?;

    let files = stmt
        .query_map(rusqlite::named_params! { ":entry": entry_id.get() }, |row| {
            Ok(AttachedFile {
                id: AttachedFileId::from(row.get::<_, i64>(0)?),
                entry_id: EntryId::from(row.get::<_, i64>(1)?),
                file_path: row.get(2)?,
                label: row.get(3)?,
                sort_order: row.get(4)?,
            })
        })
        .map_err(db_err)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(db_err)?;

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewEntry;
    use crate::pool::{get_conn, init_memory_pool};

    #[test]
    fn test_attach_replaces_standalone_film() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        let main = entries::insert_entry(&conn, &NewEntry::film("/m/kill.bill.mkv", "Kill Bill", None))
            .unwrap()
            .unwrap();
        entries::insert_entry(&conn, &NewEntry::film("/m/kill.bill.vol2.mkv", "Kill Bill Vol2", None))
            .unwrap();

        let first = attach(&conn, main, "/m/kill.bill.vol2.mkv", Some("Vol. 2")).unwrap();
        assert!(first.is_some());
        assert!(entries::get_entry_by_path(&conn, "/m/kill.bill.vol2.mkv").unwrap().is_none());
        assert!(entries::is_path_tracked(&conn, "/m/kill.bill.vol2.mkv").unwrap());

        let again = attach(&conn, main, "/m/kill.bill.vol2.mkv", None).unwrap();
        assert!(again.is_none());
    }

    #[test]
    fn test_sort_order_and_detach() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();
        let main = entries::insert_entry(&conn, &NewEntry::film("/m/a.mkv", "A", None))
            .unwrap()
            .unwrap();

        let one = attach(&conn, main, "/m/a.cd2.mkv", None).unwrap().unwrap();
        attach(&conn, main, "/m/a.cd3.mkv", None).unwrap();

        let files = list_for_entry(&conn, main).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].sort_order, 0);
        assert_eq!(files[1].sort_order, 1);

        assert!(detach(&conn, one).unwrap());
        assert!(!detach(&conn, one).unwrap());
        assert_eq!(list_for_entry(&conn, main).unwrap().len(), 1);
    }

    #[test]
    fn test_attach_to_season_is_rejected() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();
        let season = entries::insert_entry(&conn, &NewEntry::season("/tv/S/Season 1", "S - Season 1", 1))
            .unwrap()
            .unwrap();

        let err = attach(&conn, season, "/tv/S/extra.mkv", None).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
