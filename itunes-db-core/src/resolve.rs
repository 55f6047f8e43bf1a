//! Playlist reference resolution
//!
//! Turns the `Track ID` lists of mapped playlists into indices into the
//! track list, checking id uniqueness on the way.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::model::Database;
use crate::schema::MappedLibrary;

/// What to do with a playlist item whose track is not in the library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DanglingPolicy {
    /// Fail the load with `DanglingReference`
    #[default]
    Fail,
    /// Drop the item and log a warning
    Skip,
}

/// Build the final database from mapped records
pub fn resolve(mapped: MappedLibrary, policy: DanglingPolicy) -> Result<Database> {
    let MappedLibrary {
        info,
        tracks,
        playlists,
    } = mapped;

    let mut by_id = HashMap::with_capacity(tracks.len());
    let mut persistent_ids = HashSet::new();
    for (index, track) in tracks.iter().enumerate() {
        if by_id.insert(track.track_id, index).is_some() {
            return Err(Error::DuplicateId {
                field: "Track ID",
                value: track.track_id.to_string(),
            });
        }
        if let Some(pid) = &track.persistent_id {
            if !persistent_ids.insert(pid.as_str()) {
                return Err(Error::DuplicateId {
                    field: "Persistent ID",
                    value: pid.clone(),
                });
            }
        }
    }

    let mut resolved = Vec::with_capacity(playlists.len());
    let mut skipped = 0usize;
    for record in playlists {
        let mut playlist = record.playlist;
        let mut items = Vec::with_capacity(record.track_ids.len());

        for track_id in record.track_ids {
            match by_id.get(&track_id) {
                Some(&index) => items.push(index),
                None => match policy {
                    DanglingPolicy::Fail => {
                        return Err(Error::DanglingReference {
                            playlist: playlist.name,
                            track_id,
                        });
                    }
                    DanglingPolicy::Skip => {
                        warn!(
                            "Skipping unknown track {} in playlist \"{}\"",
                            track_id, playlist.name
                        );
                        skipped += 1;
                    }
                },
            }
        }

        playlist.items = items;
        resolved.push(playlist);
    }

    debug!(
        "Resolved {} playlists ({} dangling items skipped)",
        resolved.len(),
        skipped
    );

    Ok(Database::new(info, tracks, resolved, by_id))
}
