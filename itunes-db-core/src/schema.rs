//! iTunes library schema mapping
//!
//! Walks a parsed plist and pulls out the iTunes structure:
//!
//! ```text
//! <dict>
//!   Major Version, Application Version, Music Folder, ...
//!   Tracks     -> <dict> "123" -> <dict> Track ID, Name, Artist, ...
//!   Playlists  -> <array> <dict> Name, Playlist ID, Playlist Items -> <array> <dict> Track ID
//! </dict>
//! ```
//!
//! Keys without a dedicated field are kept in each record's `extra` dict.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::model::{LibraryInfo, Playlist, PlaylistId, Track};
use crate::plist::{Dict, PlistValue};

/// Track keys mapped onto dedicated `Track` fields
const TRACK_KEYS: &[&str] = &[
    "Track ID",
    "Name",
    "Artist",
    "Album Artist",
    "Composer",
    "Album",
    "Genre",
    "Grouping",
    "Comments",
    "Kind",
    "Size",
    "Total Time",
    "Disc Number",
    "Disc Count",
    "Track Number",
    "Track Count",
    "Year",
    "BPM",
    "Bit Rate",
    "Sample Rate",
    "Play Count",
    "Play Date UTC",
    "Skip Count",
    "Skip Date",
    "Rating",
    "Album Rating",
    "Loved",
    "Disabled",
    "Compilation",
    "Date Added",
    "Date Modified",
    "Persistent ID",
    "Track Type",
    "Location",
];

/// Playlist keys mapped onto dedicated `Playlist` fields
const PLAYLIST_KEYS: &[&str] = &[
    "Name",
    "Playlist ID",
    "Playlist Persistent ID",
    "Parent Persistent ID",
    "Description",
    "Master",
    "Visible",
    "All Items",
    "Folder",
    "Distinguished Kind",
    "Smart Info",
    "Smart Criteria",
    "Playlist Items",
];

/// A playlist before its items are resolved against the track list
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistRecord {
    pub playlist: Playlist,
    /// `Track ID` of each `Playlist Items` entry, in order
    pub track_ids: Vec<i64>,
}

/// Output of the schema mapper
#[derive(Debug, Clone, PartialEq)]
pub struct MappedLibrary {
    pub info: LibraryInfo,
    /// Tracks in document order
    pub tracks: Vec<Track>,
    pub playlists: Vec<PlaylistRecord>,
}

/// Typed access to one dict, with errors naming the record it belongs to
struct Fields<'a> {
    dict: &'a Dict,
    context: String,
}

impl<'a> Fields<'a> {
    fn new(dict: &'a Dict, context: impl Into<String>) -> Self {
        Self {
            dict,
            context: context.into(),
        }
    }

    fn mismatch(&self, field: &str, expected: &'static str, actual: &PlistValue) -> Error {
        Error::TypeMismatch {
            field: field.to_owned(),
            context: self.context.clone(),
            expected,
            actual: actual.type_name(),
        }
    }

    fn typed<T>(
        &self,
        key: &str,
        expected: &'static str,
        extract: impl Fn(&'a PlistValue) -> Option<T>,
    ) -> Result<Option<T>> {
        match self.dict.get(key) {
            None => Ok(None),
            Some(value) => extract(value)
                .map(Some)
                .ok_or_else(|| self.mismatch(key, expected, value)),
        }
    }

    fn required<T>(
        &self,
        key: &str,
        expected: &'static str,
        extract: impl Fn(&'a PlistValue) -> Option<T>,
    ) -> Result<T> {
        self.typed(key, expected, extract)?
            .ok_or_else(|| Error::missing(key, self.context.clone()))
    }

    fn string(&self, key: &str) -> Result<Option<String>> {
        self.typed(key, "string", |v| v.as_str().map(str::to_owned))
    }

    fn integer(&self, key: &str) -> Result<Option<i64>> {
        self.typed(key, "integer", PlistValue::as_integer)
    }

    fn boolean(&self, key: &str) -> Result<Option<bool>> {
        self.typed(key, "boolean", PlistValue::as_bool)
    }

    fn date(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        self.typed(key, "date", PlistValue::as_date)
    }

    fn data(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.typed(key, "data", |v| v.as_data().map(<[u8]>::to_vec))
    }

    fn dict(&self, key: &str) -> Result<Option<&'a Dict>> {
        self.typed(key, "dict", PlistValue::as_dict)
    }

    fn array(&self, key: &str) -> Result<Option<&'a [PlistValue]>> {
        self.typed(key, "array", PlistValue::as_array)
    }

    /// Copy of every entry whose key is not in `known`
    fn extra(&self, known: &[&str]) -> Dict {
        let mut extra = Dict::new();
        for (key, value) in self.dict.iter() {
            if !known.contains(&key) {
                // keys are unique in the source dict
                let _ = extra.insert(key.to_owned(), value.clone());
            }
        }
        extra
    }
}

/// Map a parsed library plist into typed records
pub fn map_library(root: &PlistValue) -> Result<MappedLibrary> {
    let dict = root.as_dict().ok_or_else(|| Error::TypeMismatch {
        field: "<root>".into(),
        context: "document".into(),
        expected: "dict",
        actual: root.type_name(),
    })?;
    let fields = Fields::new(dict, "library");

    let info = map_info(&fields)?;

    let tracks_dict = fields
        .dict("Tracks")?
        .ok_or_else(|| Error::missing("Tracks", "library"))?;
    let tracks = tracks_dict
        .iter()
        .map(|(key, value)| map_track(key, value))
        .collect::<Result<Vec<_>>>()?;

    let playlists = match fields.array("Playlists")? {
        Some(items) => items
            .iter()
            .enumerate()
            .map(|(i, value)| map_playlist(i, value))
            .collect::<Result<Vec<_>>>()?,
        None => {
            debug!("Library has no Playlists key");
            Vec::new()
        }
    };

    debug!(
        "Mapped {} tracks and {} playlists",
        tracks.len(),
        playlists.len()
    );

    Ok(MappedLibrary {
        info,
        tracks,
        playlists,
    })
}

fn map_info(fields: &Fields<'_>) -> Result<LibraryInfo> {
    Ok(LibraryInfo {
        major_version: fields.integer("Major Version")?,
        minor_version: fields.integer("Minor Version")?,
        application_version: fields.string("Application Version")?,
        date: fields.date("Date")?,
        features: fields.integer("Features")?,
        show_content_ratings: fields.boolean("Show Content Ratings")?,
        music_folder: fields.string("Music Folder")?,
        persistent_id: fields.string("Library Persistent ID")?,
    })
}

/// Map one `Tracks` entry; `key` is the entry's dict key
pub fn map_track(key: &str, value: &PlistValue) -> Result<Track> {
    let context = format!("track \"{}\"", key);
    let dict = value.as_dict().ok_or_else(|| Error::TypeMismatch {
        field: key.to_owned(),
        context: "Tracks".into(),
        expected: "dict",
        actual: value.type_name(),
    })?;
    let f = Fields::new(dict, context);

    let track_id = f.required("Track ID", "integer", PlistValue::as_integer)?;
    if key.parse::<i64>().ok() != Some(track_id) {
        warn!("Track entry \"{}\" carries Track ID {}", key, track_id);
    }

    Ok(Track {
        track_id,
        name: f.string("Name")?,
        artist: f.string("Artist")?,
        album_artist: f.string("Album Artist")?,
        composer: f.string("Composer")?,
        album: f.string("Album")?,
        genre: f.string("Genre")?,
        grouping: f.string("Grouping")?,
        comments: f.string("Comments")?,
        kind: f.string("Kind")?,
        size: f.integer("Size")?,
        total_time_ms: f.integer("Total Time")?,
        disc_number: f.integer("Disc Number")?,
        disc_count: f.integer("Disc Count")?,
        track_number: f.integer("Track Number")?,
        track_count: f.integer("Track Count")?,
        year: f.integer("Year")?,
        bpm: f.integer("BPM")?,
        bit_rate: f.integer("Bit Rate")?,
        sample_rate: f.integer("Sample Rate")?,
        play_count: f.integer("Play Count")?,
        play_date: f.date("Play Date UTC")?,
        skip_count: f.integer("Skip Count")?,
        skip_date: f.date("Skip Date")?,
        rating: f.integer("Rating")?,
        album_rating: f.integer("Album Rating")?,
        loved: f.boolean("Loved")?,
        disabled: f.boolean("Disabled")?,
        compilation: f.boolean("Compilation")?,
        date_added: f.date("Date Added")?,
        date_modified: f.date("Date Modified")?,
        persistent_id: f.string("Persistent ID")?,
        track_type: f.string("Track Type")?,
        location: f.string("Location")?,
        extra: f.extra(TRACK_KEYS),
    })
}

/// Map one `Playlists` entry; `position` is its index in the array
pub fn map_playlist(position: usize, value: &PlistValue) -> Result<PlaylistRecord> {
    let context = format!("playlist #{}", position);
    let dict = value.as_dict().ok_or_else(|| Error::TypeMismatch {
        field: "Playlists".into(),
        context: context.clone(),
        expected: "dict",
        actual: value.type_name(),
    })?;
    let f = Fields::new(dict, context);

    let name = f.required("Name", "string", |v| v.as_str().map(str::to_owned))?;
    let f = Fields::new(dict, format!("playlist \"{}\"", name));

    let numeric_id = f.integer("Playlist ID")?;
    let persistent_id = f.string("Playlist Persistent ID")?;
    let id = numeric_id
        .map(PlaylistId::Numeric)
        .or_else(|| persistent_id.clone().map(PlaylistId::Persistent));

    let track_ids = match f.array("Playlist Items")? {
        Some(items) => items
            .iter()
            .map(|item| playlist_item_id(&f, item))
            .collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };

    let mut playlist = Playlist::new(name);
    playlist.id = id;
    playlist.persistent_id = persistent_id;
    playlist.parent_persistent_id = f.string("Parent Persistent ID")?;
    playlist.description = f.string("Description")?;
    playlist.master = f.boolean("Master")?.unwrap_or(false);
    playlist.visible = f.boolean("Visible")?.unwrap_or(true);
    playlist.all_items = f.boolean("All Items")?.unwrap_or(false);
    playlist.folder = f.boolean("Folder")?.unwrap_or(false);
    playlist.distinguished_kind = f.integer("Distinguished Kind")?;
    playlist.smart_info = f.data("Smart Info")?;
    playlist.smart_criteria = f.data("Smart Criteria")?;
    playlist.extra = f.extra(PLAYLIST_KEYS);

    Ok(PlaylistRecord {
        playlist,
        track_ids,
    })
}

fn playlist_item_id(playlist: &Fields<'_>, item: &PlistValue) -> Result<i64> {
    let dict = item
        .as_dict()
        .ok_or_else(|| playlist.mismatch("Playlist Items", "dict", item))?;
    Fields::new(dict, format!("item of {}", playlist.context)).required(
        "Track ID",
        "integer",
        PlistValue::as_integer,
    )
}
