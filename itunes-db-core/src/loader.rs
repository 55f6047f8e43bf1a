//! Library loading entry points
//!
//! Every call reads the file, parses, maps and resolves from scratch. Nothing
//! is cached and no state is shared between calls, so loads can run
//! concurrently on any number of threads.

use std::any::Any;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::model::Database;
use crate::plist;
use crate::resolve::{self, DanglingPolicy};
use crate::schema;

/// Loader configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Handling of playlist items that point at missing tracks
    pub dangling: DanglingPolicy,
}

/// Configured loader
#[derive(Debug, Clone, Copy, Default)]
pub struct Loader {
    options: LoadOptions,
}

impl Loader {
    pub fn new(options: LoadOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    /// Load a library file on the calling thread
    pub fn load_blocking<P: AsRef<Path>>(&self, path: P) -> Result<Database> {
        let path = path.as_ref();
        let started = Instant::now();

        let bytes = fs::read(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Read {} bytes from {:?}", bytes.len(), path);

        let db = self.load_from_bytes(&bytes)?;
        info!(
            "Loaded {:?}: {} tracks, {} playlists in {:?}",
            path,
            db.tracks().len(),
            db.playlists().len(),
            started.elapsed()
        );
        Ok(db)
    }

    /// Load a library already held in memory
    pub fn load_from_bytes(&self, bytes: &[u8]) -> Result<Database> {
        let root = plist::parse(bytes)?;
        let mapped = schema::map_library(&root)?;
        resolve::resolve(mapped, self.options.dangling)
    }

    /// Load on a worker thread and hand the outcome to `on_complete`
    ///
    /// `on_complete` runs exactly once, on the worker thread, never on the
    /// caller's. A panic during the load is reported as `Error::Internal`.
    pub fn load_with_callback<P, F>(&self, path: P, on_complete: F) -> JoinHandle<()>
    where
        P: Into<PathBuf>,
        F: FnOnce(Result<Database>) + Send + 'static,
    {
        let loader = *self;
        let path = path.into();
        spawn_with_callback(move || loader.load_blocking(&path), on_complete)
    }

    /// Load on tokio's blocking pool
    #[cfg(feature = "async")]
    pub async fn load_async<P: Into<PathBuf>>(&self, path: P) -> Result<Database> {
        let loader = *self;
        let path = path.into();
        tokio::task::spawn_blocking(move || loader.load_blocking(&path))
            .await
            .map_err(|e| Error::Internal(format!("load task failed: {}", e)))?
    }
}

/// Load a library file with default options
pub fn load_blocking<P: AsRef<Path>>(path: P) -> Result<Database> {
    Loader::default().load_blocking(path)
}

/// Alias of [`load_blocking`]
pub fn load_sync<P: AsRef<Path>>(path: P) -> Result<Database> {
    load_blocking(path)
}

/// Load an in-memory library document with default options
pub fn load_from_bytes(bytes: &[u8]) -> Result<Database> {
    Loader::default().load_from_bytes(bytes)
}

/// Load on a worker thread with default options, see [`Loader::load_with_callback`]
pub fn load_with_callback<P, F>(path: P, on_complete: F) -> JoinHandle<()>
where
    P: Into<PathBuf>,
    F: FnOnce(Result<Database>) + Send + 'static,
{
    Loader::default().load_with_callback(path, on_complete)
}

/// Load on tokio's blocking pool with default options
#[cfg(feature = "async")]
pub async fn load_async<P: Into<PathBuf>>(path: P) -> Result<Database> {
    Loader::default().load_async(path).await
}

/// Run `load` on a new thread, reporting a panic in it as `Error::Internal`
fn spawn_with_callback<L, F>(load: L, on_complete: F) -> JoinHandle<()>
where
    L: FnOnce() -> Result<Database> + Send + 'static,
    F: FnOnce(Result<Database>) + Send + 'static,
{
    thread::spawn(move || {
        let result = panic::catch_unwind(AssertUnwindSafe(load))
            .unwrap_or_else(|payload| Err(Error::Internal(panic_message(payload.as_ref()))));
        on_complete(result);
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "load panicked".to_string()
    }
}
