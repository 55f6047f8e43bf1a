//! End-to-end loading of library files through every entry point

use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

use itunes_db_core::{
    load_blocking, load_sync, load_with_callback, Database, DanglingPolicy, Error, ErrorKind,
    LoadOptions, Loader, PlaylistId,
};
use tempfile::TempDir;

fn data_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

fn check_test_db(db: &Database) {
    assert_eq!(db.tracks().len(), 2);
    assert_eq!(db.playlists().len(), 2);
    assert_eq!(db.items(&db.playlists()[0]).len(), 0);
    assert_eq!(db.items(&db.playlists()[1]).len(), 2);
}

/// Run the callback loader and wait for its single outcome
fn load_via_callback(path: PathBuf) -> (thread::ThreadId, Result<Database, Error>) {
    let (tx, rx) = mpsc::channel();
    let handle = load_with_callback(path, move |result| {
        tx.send((thread::current().id(), result)).unwrap();
    });
    handle.join().unwrap();

    let outcome = rx.recv().unwrap();
    // sender was consumed with the callback, so there is nothing else to receive
    assert!(rx.try_recv().is_err());
    outcome
}

#[test]
fn test_load_sync_testdb() {
    let db = load_sync(data_path("testdb.xml")).unwrap();
    check_test_db(&db);
}

#[test]
fn test_testdb_contents() {
    let db = load_blocking(data_path("testdb.xml")).unwrap();

    let track = db.track(1001).unwrap();
    assert_eq!(track.name.as_deref(), Some("Rock & Roll"));
    assert_eq!(track.artist.as_deref(), Some("Led Zeppelin"));
    assert_eq!(track.total_time_ms, Some(220734));
    assert_eq!(track.year, Some(1971));
    assert_eq!(track.rating, Some(80));
    assert!(track.location.as_deref().unwrap().ends_with("04%20Rock%20&%20Roll.mp3"));
    assert!(track.extra.contains_key("File Folder Count"));

    let second = &db.tracks()[1];
    assert_eq!(second.track_id, 1002);
    assert_eq!(second.loved, Some(true));
    assert_eq!(second.compilation, Some(false));

    let favourites = db.playlist_by_name("Favourites").unwrap();
    assert_eq!(favourites.id, Some(PlaylistId::Numeric(2002)));
    assert_eq!(favourites.description.as_deref(), Some("Both of them"));
    assert_eq!(favourites.smart_info.as_ref().map(Vec::len), Some(36));
    let names: Vec<_> = db
        .items(favourites)
        .filter_map(|t| t.name.as_deref())
        .collect();
    assert_eq!(names, vec!["Rock & Roll", "Blue in Green"]);

    assert_eq!(db.info.application_version.as_deref(), Some("11.1.5"));
    assert_eq!(
        db.info.music_folder.as_deref(),
        Some("file://localhost/Users/test/Music/iTunes/iTunes%20Media/")
    );
    assert_eq!(db.info.show_content_ratings, Some(true));
}

#[test]
fn test_load_sync_nonexistent_file() {
    let err = load_sync(data_path("doesnt_exist.xml")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert!(matches!(err, Error::Io { .. }));
}

#[test]
fn test_load_sync_invalid_xml() {
    let err = load_sync(data_path("invalid_xml.xml")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedXml);
}

#[test]
fn test_callback_testdb() {
    let caller = thread::current().id();
    let (worker, result) = load_via_callback(data_path("testdb.xml"));
    assert_ne!(worker, caller);
    check_test_db(&result.unwrap());
}

#[test]
fn test_callback_nonexistent_file() {
    let (_, result) = load_via_callback(data_path("doesnt_exist.xml"));
    assert_eq!(result.unwrap_err().kind(), ErrorKind::Io);
}

#[test]
fn test_callback_invalid_xml() {
    let (_, result) = load_via_callback(data_path("invalid_xml.xml"));
    assert_eq!(result.unwrap_err().kind(), ErrorKind::MalformedXml);
}

#[test]
fn test_callback_matches_blocking() {
    let blocking = load_blocking(data_path("testdb.xml")).unwrap();
    let (_, result) = load_via_callback(data_path("testdb.xml"));
    assert_eq!(result.unwrap(), blocking);
}

#[cfg(feature = "async")]
mod async_load {
    use std::time::Duration;

    use itunes_db_core::load_async;

    use super::*;

    #[tokio::test]
    async fn test_async_testdb() {
        let db = load_async(data_path("testdb.xml")).await.unwrap();
        check_test_db(&db);
        assert_eq!(db, load_blocking(data_path("testdb.xml")).unwrap());
    }

    #[tokio::test]
    async fn test_async_errors() {
        let err = load_async(data_path("doesnt_exist.xml")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);

        let err = load_async(data_path("invalid_xml.xml")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedXml);
    }

    #[tokio::test]
    async fn test_async_with_external_timeout() {
        let db = tokio::time::timeout(Duration::from_secs(30), load_async(data_path("testdb.xml")))
            .await
            .expect("load timed out")
            .unwrap();
        check_test_db(&db);
    }
}

#[test]
fn test_repeated_loads_are_equal() {
    let first = load_blocking(data_path("testdb.xml")).unwrap();
    let second = load_blocking(data_path("testdb.xml")).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_concurrent_loads() {
    let expected = load_blocking(data_path("testdb.xml")).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| thread::spawn(|| load_blocking(data_path("testdb.xml"))))
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap().unwrap(), expected);
    }
}

#[test]
fn test_dangling_reference_file() {
    let err = load_blocking(data_path("dangling.xml")).unwrap_err();
    match err {
        Error::DanglingReference { playlist, track_id } => {
            assert_eq!(playlist, "Stale");
            assert_eq!(track_id, 404);
        }
        other => panic!("unexpected error: {}", other),
    }

    let loader = Loader::new(LoadOptions {
        dangling: DanglingPolicy::Skip,
    });
    let db = loader.load_blocking(data_path("dangling.xml")).unwrap();
    assert_eq!(db.playlists()[0].len(), 1);
}

#[test]
fn test_every_call_rereads_the_file() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("library.xml");

    std::fs::copy(data_path("testdb.xml"), &path).unwrap();
    let before = load_blocking(&path).unwrap();
    assert_eq!(before.tracks().len(), 2);

    std::fs::write(
        &path,
        "<plist><dict><key>Tracks</key><dict/><key>Playlists</key><array/></dict></plist>",
    )
    .unwrap();
    let after = load_blocking(&path).unwrap();
    assert!(after.tracks().is_empty());
    assert!(after.playlists().is_empty());
}

#[test]
fn test_database_serializes_to_json() {
    let db = load_blocking(data_path("testdb.xml")).unwrap();
    let json = serde_json::to_value(&db).unwrap();

    assert_eq!(json["tracks"].as_array().map(Vec::len), Some(2));
    assert_eq!(json["tracks"][0]["name"], "Rock & Roll");
    assert_eq!(json["playlists"][1]["id"], 2002);
    assert_eq!(json["playlists"][0]["items"], serde_json::json!([]));
    assert_eq!(json["playlists"][1]["items"], serde_json::json!([1001, 1002]));
}
