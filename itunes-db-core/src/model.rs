//! Library data structures
//!
//! These are the typed records handed to callers once a library is loaded.
//! Playlists refer to tracks by index into the database's track list, so a
//! track is stored exactly once no matter how many playlists contain it.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;

use crate::plist::Dict;

/// A single library entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Track {
    /// `Track ID`, unique within a library
    pub track_id: i64,
    pub name: Option<String>,
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub composer: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub grouping: Option<String>,
    pub comments: Option<String>,
    /// File type description, e.g. "MPEG audio file"
    pub kind: Option<String>,
    /// File size in bytes
    pub size: Option<i64>,
    /// Duration in milliseconds
    pub total_time_ms: Option<i64>,
    pub disc_number: Option<i64>,
    pub disc_count: Option<i64>,
    pub track_number: Option<i64>,
    pub track_count: Option<i64>,
    pub year: Option<i64>,
    pub bpm: Option<i64>,
    /// Bitrate in kbps
    pub bit_rate: Option<i64>,
    /// Sample rate in Hz
    pub sample_rate: Option<i64>,
    pub play_count: Option<i64>,
    pub play_date: Option<DateTime<Utc>>,
    pub skip_count: Option<i64>,
    pub skip_date: Option<DateTime<Utc>>,
    /// 0-100, 20 per star
    pub rating: Option<i64>,
    pub album_rating: Option<i64>,
    pub loved: Option<bool>,
    pub disabled: Option<bool>,
    pub compilation: Option<bool>,
    pub date_added: Option<DateTime<Utc>>,
    pub date_modified: Option<DateTime<Utc>>,
    pub persistent_id: Option<String>,
    /// "File", "URL", "Remote"...
    pub track_type: Option<String>,
    /// File URL or stream URL as written by iTunes
    pub location: Option<String>,
    /// Keys with no dedicated field, in document order
    pub extra: Dict,
}

impl Track {
    /// An otherwise empty track with the given id
    pub fn new(track_id: i64) -> Self {
        Self {
            track_id,
            name: None,
            artist: None,
            album_artist: None,
            composer: None,
            album: None,
            genre: None,
            grouping: None,
            comments: None,
            kind: None,
            size: None,
            total_time_ms: None,
            disc_number: None,
            disc_count: None,
            track_number: None,
            track_count: None,
            year: None,
            bpm: None,
            bit_rate: None,
            sample_rate: None,
            play_count: None,
            play_date: None,
            skip_count: None,
            skip_date: None,
            rating: None,
            album_rating: None,
            loved: None,
            disabled: None,
            compilation: None,
            date_added: None,
            date_modified: None,
            persistent_id: None,
            track_type: None,
            location: None,
            extra: Dict::new(),
        }
    }

    /// Duration in seconds, 0.0 when unknown
    pub fn duration_secs(&self) -> f64 {
        self.total_time_ms.unwrap_or(0) as f64 / 1000.0
    }
}

/// Playlist identifier
///
/// iTunes writes a numeric `Playlist ID` that is only stable within one
/// export, plus a `Playlist Persistent ID` hex string that survives
/// re-exports. The numeric id is preferred when both exist.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum PlaylistId {
    Numeric(i64),
    Persistent(String),
}

impl fmt::Display for PlaylistId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaylistId::Numeric(id) => write!(f, "{}", id),
            PlaylistId::Persistent(id) => f.write_str(id),
        }
    }
}

/// A named, ordered collection of tracks
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Playlist {
    pub name: String,
    pub id: Option<PlaylistId>,
    pub persistent_id: Option<String>,
    /// Persistent ID of the enclosing folder playlist
    pub parent_persistent_id: Option<String>,
    pub description: Option<String>,
    /// The library playlist containing every track
    pub master: bool,
    pub visible: bool,
    pub all_items: bool,
    pub folder: bool,
    /// Built-in playlists (Music, Movies, Podcasts...) carry a kind number
    pub distinguished_kind: Option<i64>,
    #[serde(skip)]
    pub smart_info: Option<Vec<u8>>,
    #[serde(skip)]
    pub smart_criteria: Option<Vec<u8>>,
    pub extra: Dict,
    /// Indices into `Database::tracks`
    #[serde(skip)]
    pub(crate) items: Vec<usize>,
}

impl Playlist {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            persistent_id: None,
            parent_persistent_id: None,
            description: None,
            master: false,
            visible: true,
            all_items: false,
            folder: false,
            distinguished_kind: None,
            smart_info: None,
            smart_criteria: None,
            extra: Dict::new(),
            items: Vec::new(),
        }
    }

    /// Number of resolved items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_smart(&self) -> bool {
        self.smart_criteria.is_some()
    }
}

/// Library-level header values
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LibraryInfo {
    pub major_version: Option<i64>,
    pub minor_version: Option<i64>,
    pub application_version: Option<String>,
    /// Export timestamp
    pub date: Option<DateTime<Utc>>,
    pub features: Option<i64>,
    pub show_content_ratings: Option<bool>,
    /// `Music Folder`, the media directory URL
    pub music_folder: Option<String>,
    pub persistent_id: Option<String>,
}

/// A fully resolved library
///
/// Immutable once built. Tracks and playlists keep document order.
#[derive(Debug, Clone, PartialEq)]
pub struct Database {
    pub info: LibraryInfo,
    tracks: Vec<Track>,
    playlists: Vec<Playlist>,
    by_id: HashMap<i64, usize>,
}

impl Database {
    pub(crate) fn new(
        info: LibraryInfo,
        tracks: Vec<Track>,
        playlists: Vec<Playlist>,
        by_id: HashMap<i64, usize>,
    ) -> Self {
        Self {
            info,
            tracks,
            playlists,
            by_id,
        }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn playlists(&self) -> &[Playlist] {
        &self.playlists
    }

    /// Look up a track by its `Track ID`
    pub fn track(&self, track_id: i64) -> Option<&Track> {
        self.by_id.get(&track_id).map(|&i| &self.tracks[i])
    }

    /// First playlist with the given name
    pub fn playlist_by_name(&self, name: &str) -> Option<&Playlist> {
        self.playlists.iter().find(|p| p.name == name)
    }

    /// Resolved tracks of one of this database's playlists, in playlist order
    ///
    /// A playlist borrowed from any other `Database`, clones included, yields
    /// no tracks.
    pub fn items<'a>(&'a self, playlist: &'a Playlist) -> impl ExactSizeIterator<Item = &'a Track> + 'a {
        let indices: &[usize] = if self.owns(playlist) {
            &playlist.items
        } else {
            &[]
        };
        indices.iter().map(move |&i| &self.tracks[i])
    }

    fn owns(&self, playlist: &Playlist) -> bool {
        self.playlists
            .as_ptr_range()
            .contains(&(playlist as *const Playlist))
    }
}

/// Serialized playlist with its items written as track ids
#[derive(Serialize)]
struct PlaylistEntry<'a> {
    #[serde(flatten)]
    playlist: &'a Playlist,
    items: Vec<i64>,
}

impl Serialize for Database {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let playlists: Vec<_> = self
            .playlists
            .iter()
            .map(|playlist| PlaylistEntry {
                playlist,
                items: self.items(playlist).map(|t| t.track_id).collect(),
            })
            .collect();

        let mut state = serializer.serialize_struct("Database", 3)?;
        state.serialize_field("info", &self.info)?;
        state.serialize_field("tracks", &self.tracks)?;
        state.serialize_field("playlists", &playlists)?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_database() -> Database {
        let mut first = Track::new(100);
        first.name = Some("First".into());
        first.total_time_ms = Some(185_500);
        let second = Track::new(200);

        let mut mix = Playlist::new("Mix");
        mix.items = vec![1, 0, 1];

        let by_id = HashMap::from([(100, 0), (200, 1)]);
        Database::new(
            LibraryInfo::default(),
            vec![first, second],
            vec![Playlist::new("Empty"), mix],
            by_id,
        )
    }

    #[test]
    fn test_track_lookup() {
        let db = make_test_database();
        assert_eq!(db.track(100).and_then(|t| t.name.as_deref()), Some("First"));
        assert!(db.track(300).is_none());
    }

    #[test]
    fn test_items_follow_playlist_order() {
        let db = make_test_database();
        let mix = db.playlist_by_name("Mix").unwrap();
        let ids: Vec<_> = db.items(mix).map(|t| t.track_id).collect();
        assert_eq!(ids, vec![200, 100, 200]);
        assert_eq!(mix.len(), 3);
        assert!(db.playlists()[0].is_empty());
    }

    #[test]
    fn test_foreign_playlist_yields_nothing() {
        let big = make_test_database();
        let small = Database::new(
            LibraryInfo::default(),
            Vec::new(),
            vec![Playlist::new("Empty")],
            HashMap::new(),
        );

        let mix = big.playlist_by_name("Mix").unwrap();
        assert_eq!(small.items(mix).len(), 0);
        assert_eq!(big.items(mix).len(), 3);

        let copy = big.clone();
        assert_eq!(copy.items(mix).len(), 0);
        assert_eq!(copy.items(&copy.playlists()[1]).len(), 3);
    }

    #[test]
    fn test_serializes_items_as_track_ids() {
        let db = make_test_database();
        let json = serde_json::to_value(&db).unwrap();

        assert_eq!(json["playlists"][0]["items"], serde_json::json!([]));
        assert_eq!(json["playlists"][1]["name"], "Mix");
        assert_eq!(json["playlists"][1]["items"], serde_json::json!([200, 100, 200]));
        assert_eq!(json["tracks"][0]["track_id"], 100);
    }

    #[test]
    fn test_duration_secs() {
        let db = make_test_database();
        assert_eq!(db.tracks()[0].duration_secs(), 185.5);
        assert_eq!(db.tracks()[1].duration_secs(), 0.0);
    }

    #[test]
    fn test_playlist_id_display() {
        assert_eq!(PlaylistId::Numeric(42).to_string(), "42");
        assert_eq!(
            PlaylistId::Persistent("5C7E1D2A".into()).to_string(),
            "5C7E1D2A"
        );
    }
}
