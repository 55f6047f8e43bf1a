//! itunes-db-core: iTunes library XML loader
//!
//! This crate reads the "iTunes Library.xml" export:
//! - plist: XML property list → generic value tree
//! - schema: value tree → typed track and playlist records
//! - resolve: playlist track ids → shared track references
//! - loader: blocking, callback and async entry points

pub mod plist;
pub mod schema;
pub mod resolve;
pub mod model;
pub mod loader;
pub mod error;

pub use error::{Error, ErrorKind, Result};
pub use model::{Database, LibraryInfo, Playlist, PlaylistId, Track};
pub use plist::{Dict, Integer, PlistValue};
pub use resolve::DanglingPolicy;
pub use loader::{load_blocking, load_from_bytes, load_sync, load_with_callback, LoadOptions, Loader};
#[cfg(feature = "async")]
pub use loader::load_async;
