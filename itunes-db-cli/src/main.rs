//! Command line inspector for iTunes library XML files

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use itunes_db_core::{Database, DanglingPolicy, LoadOptions, Loader, Playlist, Track};

#[derive(Parser)]
#[command(name = "itdb")]
#[command(about = "Inspect iTunes library XML exports")]
#[command(version)]
struct Cli {
    /// Drop playlist items that reference missing tracks instead of failing
    #[arg(long, global = true)]
    skip_dangling: bool,

    /// Load on tokio's blocking pool instead of the main thread
    #[arg(long = "async", global = true)]
    use_async: bool,

    /// Verbose logging, when RUST_LOG is unset
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Library header and counts
    Summary {
        path: PathBuf,
    },

    /// One line per track
    Tracks {
        path: PathBuf,
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Playlists with item counts, or the items of one playlist
    Playlists {
        path: PathBuf,
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Whole database as JSON
    Dump {
        path: PathBuf,
        #[arg(long)]
        pretty: bool,
    },
}

impl Commands {
    fn path(&self) -> &Path {
        match self {
            Commands::Summary { path }
            | Commands::Tracks { path, .. }
            | Commands::Playlists { path, .. }
            | Commands::Dump { path, .. } => path.as_path(),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so dump output stays clean
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(log_filter(env.as_deref(), cli.verbose))
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let options = LoadOptions {
        dangling: if cli.skip_dangling {
            DanglingPolicy::Skip
        } else {
            DanglingPolicy::Fail
        },
    };
    let loader = Loader::new(options);
    let path = cli.command.path().to_path_buf();

    let db = match load(&loader, path, cli.use_async) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Error [{}]: {}", e.kind(), e);
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::Summary { .. } => print_summary(&db),
        Commands::Tracks { limit, .. } => {
            let limit = limit.unwrap_or(usize::MAX);
            for track in db.tracks().iter().take(limit) {
                print_track(track);
            }
        }
        Commands::Playlists { name: None, .. } => {
            for playlist in db.playlists() {
                print_playlist(playlist);
            }
        }
        Commands::Playlists {
            name: Some(name), ..
        } => {
            let Some(playlist) = db.playlist_by_name(&name) else {
                anyhow::bail!("No playlist named {:?}", name);
            };
            print_playlist(playlist);
            for track in db.items(playlist) {
                print_track(track);
            }
        }
        Commands::Dump { pretty, .. } => {
            if pretty {
                println!("{}", serde_json::to_string_pretty(&db)?);
            } else {
                println!("{}", serde_json::to_string(&db)?);
            }
        }
    }

    Ok(())
}

/// RUST_LOG directives when set and valid, otherwise debug or warn by `-v`
fn log_filter(env: Option<&str>, verbose: bool) -> EnvFilter {
    env.and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(if verbose { "debug" } else { "warn" }))
}

fn load(loader: &Loader, path: PathBuf, use_async: bool) -> itunes_db_core::Result<Database> {
    if !use_async {
        return loader.load_blocking(&path);
    }

    debug!("Loading {:?} on the blocking pool", path);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .map_err(|source| itunes_db_core::Error::Io {
            path: path.clone(),
            source,
        })?;
    runtime.block_on(loader.load_async(path))
}

fn print_summary(db: &Database) {
    let info = &db.info;
    if let Some(version) = &info.application_version {
        println!("Application version: {}", version);
    }
    if let (Some(major), Some(minor)) = (info.major_version, info.minor_version) {
        println!("Format version: {}.{}", major, minor);
    }
    if let Some(date) = &info.date {
        println!("Exported: {}", date.to_rfc3339());
    }
    if let Some(folder) = &info.music_folder {
        println!("Music folder: {}", folder);
    }

    let total_ms: i64 = db.tracks().iter().filter_map(|t| t.total_time_ms).sum();
    println!("Tracks: {}", db.tracks().len());
    println!("Playlists: {}", db.playlists().len());
    println!("Total time: {:.1} h", total_ms as f64 / 3_600_000.0);
}

fn print_track(track: &Track) {
    let artist = track.artist.as_deref().unwrap_or("?");
    let name = track.name.as_deref().unwrap_or("?");
    let secs = track.duration_secs() as u64;
    println!(
        "  {:6}. {} - {} [{}:{:02}]",
        track.track_id,
        artist,
        name,
        secs / 60,
        secs % 60
    );
}

fn print_playlist(playlist: &Playlist) {
    let id = playlist
        .id
        .as_ref()
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".into());
    let marker = if playlist.folder {
        " (folder)"
    } else if playlist.is_smart() {
        " (smart)"
    } else {
        ""
    };
    println!("{} [{}]{}: {} items", playlist.name, id, marker, playlist.len());
}
