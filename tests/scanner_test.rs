//! Integration tests for library scanning and path exclusivity.

mod common;

use common::{path_owners, TestLibrary};
use reelvault::scanner::Scanner;
use reelvault_common::MediaKind;
use reelvault_db::models::NewEntry;
use reelvault_db::queries::{attached_files, entries, episodes};

#[test]
fn season_folder_becomes_one_entry_with_episodes() {
    let lib = TestLibrary::new();
    lib.touch("Show/Season 1/Show.S01E01.mkv");
    lib.touch("Show/Season 1/Show.S01E02.mkv");

    assert_eq!(lib.scan(), 3);

    let all = lib.entries();
    assert_eq!(all.len(), 1);
    let season = &all[0];
    assert_eq!(season.kind, MediaKind::TvSeason);
    assert_eq!(season.title, "Show - Season 1");
    assert_eq!(season.season_number, Some(1));

    let conn = lib.conn();
    let numbers: Vec<i32> = episodes::list_for_season(&conn, season.id)
        .unwrap()
        .iter()
        .map(|e| e.episode_number)
        .collect();
    assert_eq!(numbers, vec![1, 2]);
    drop(conn);

    assert_eq!(lib.scan(), 0);
    assert_eq!(lib.entries().len(), 1);
}

#[test]
fn rescan_adds_nothing_for_any_shape() {
    let lib = TestLibrary::new();
    lib.touch("Heat.1995.mkv");
    lib.touch("Films/The.Matrix.1999.1080p.BluRay.x264.mkv");
    lib.touch("Films/Alien (1979)/Alien.1979.mp4");
    lib.touch("Drama/Season 3/Drama.S03E01.mkv");
    lib.touch("Drama/Specials/Drama.S00E01.mkv");
    lib.touch("Loose/Loose.S02E01.mkv");
    lib.touch("Loose/Loose.S02E02.mkv");
    lib.touch("Loose/Loose.S02E03.mkv");

    let first = lib.scan();
    assert!(first > 0);
    let before = lib.entries();

    assert_eq!(lib.scan(), 0);
    assert_eq!(lib.entries(), before);
}

#[test]
fn film_titles_come_from_filenames() {
    let lib = TestLibrary::new();
    let matrix = lib.touch("The.Matrix.1999.1080p.BluRay.x264.mkv");
    let heat = lib.touch("Heat.mkv");

    lib.scan();

    let entry = lib.entry_by_path(&matrix);
    assert_eq!(entry.kind, MediaKind::Film);
    assert_eq!(entry.title, "The Matrix");
    assert_eq!(entry.year, Some(1999));

    let entry = lib.entry_by_path(&heat);
    assert_eq!(entry.title, "Heat");
    assert_eq!(entry.year, None);
}

#[test]
fn seasonless_folder_uses_majority_season() {
    let lib = TestLibrary::new();
    lib.touch("Loose/Loose.S02E01.mkv");
    lib.touch("Loose/Loose.S02E02.mkv");
    lib.touch("Loose/Loose.S01E09.mkv");

    assert_eq!(lib.scan(), 4);

    let all = lib.entries();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].kind, MediaKind::TvSeason);
    assert_eq!(all[0].season_number, Some(2));
    assert_eq!(all[0].title, "Loose - Season 2");
}

#[test]
fn specials_folder_is_season_zero() {
    let lib = TestLibrary::new();
    let dir = lib.touch("Drama/Specials/Drama.S00E01.mkv");
    let dir = dir.parent().unwrap().to_path_buf();

    lib.scan();

    let entry = lib.entry_by_path(&dir);
    assert_eq!(entry.season_number, Some(0));
    assert_eq!(entry.title, "Drama - Specials");
}

#[test]
fn stale_film_row_becomes_episode() {
    let lib = TestLibrary::new();
    let episode = lib.touch("Show/Season 1/Show.S01E01.mkv");
    let path = episode.to_string_lossy().into_owned();

    {
        let conn = lib.conn();
        entries::insert_entry(&conn, &NewEntry::film(path.as_str(), "Show S01E01", None))
            .unwrap()
            .unwrap();
    }

    lib.scan();

    let conn = lib.conn();
    assert_eq!(path_owners(&conn, &path), 1);
    assert!(episodes::get_by_path(&conn, &path).unwrap().is_some());
    assert!(entries::get_entry_by_path(&conn, &path).unwrap().is_none());
}

#[test]
fn attached_file_is_not_rescanned_as_film() {
    let lib = TestLibrary::new();
    let part1 = lib.touch("Films/Epic.2001.Part1.mkv");
    let part2 = lib.touch("Films/Epic.2001.Part2.mkv");
    assert_eq!(lib.scan(), 2);

    let owner = lib.entry_by_path(&part1);
    let part2_str = part2.to_string_lossy().into_owned();
    {
        let conn = lib.conn();
        let id = attached_files::attach(&conn, owner.id, &part2_str, Some("Part 2")).unwrap();
        assert!(id.is_some());
        assert_eq!(path_owners(&conn, &part2_str), 1);
        assert!(entries::get_entry_by_path(&conn, &part2_str).unwrap().is_none());
    }

    assert_eq!(lib.scan(), 0);

    let conn = lib.conn();
    assert_eq!(path_owners(&conn, &part2_str), 1);
    assert_eq!(attached_files::list_for_entry(&conn, owner.id).unwrap().len(), 1);
}

#[test]
fn film_row_at_season_directory_is_repaired() {
    let lib = TestLibrary::new();
    let episode = lib.touch("Show/Season 2/Show.S02E01.mkv");
    let dir = episode.parent().unwrap().to_string_lossy().into_owned();

    {
        let conn = lib.conn();
        entries::insert_entry(&conn, &NewEntry::film(dir.as_str(), "Show", None))
            .unwrap()
            .unwrap();
    }

    assert_eq!(lib.scan(), 1);

    let conn = lib.conn();
    let entry = entries::get_entry_by_path(&conn, &dir).unwrap().unwrap();
    assert_eq!(entry.kind, MediaKind::TvSeason);
    assert_eq!(entry.season_number, Some(2));
    assert_eq!(episodes::list_for_season(&conn, entry.id).unwrap().len(), 1);
}

#[test]
fn scan_all_skips_missing_roots() {
    let lib = TestLibrary::new();
    lib.touch("Heat.1995.mkv");
    let missing = lib.dir.path().join("nowhere");

    let scanner = Scanner::new(lib.catalog.clone());
    let added = scanner.scan_all(&[missing, lib.root()]).unwrap();
    assert_eq!(added, 1);
}
