use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Handle;

use media_sweep::decode::FileDecodeProvider;
use media_sweep::state::library::SqliteMarkStore;
use media_sweep::state::source::{FolderLibrary, LibraryScope};
use media_sweep::{LoadingConfig, SweepSession};

const USAGE: &str = "usage: media-sweep <folder> [steps]";

#[tokio::main]
async fn main() {
    // Setup logging; RUST_LOG overrides the default level
    env_logger::Builder::default()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let mut args = std::env::args().skip(1);
    let Some(folder) = args.next().map(PathBuf::from) else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };
    let steps = match args.next().map(|s| s.parse::<usize>()) {
        None => 0,
        Some(Ok(steps)) => steps,
        Some(Err(_)) => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    };

    if let Err(err) = run(folder, steps).await {
        log::error!("{}", err);
        std::process::exit(1);
    }
}

async fn run(folder: PathBuf, steps: usize) -> media_sweep::Result<()> {
    let config = LoadingConfig::load_or_default()?;
    let store = SqliteMarkStore::open_default()?;

    let session = SweepSession::open(
        config,
        Arc::new(FolderLibrary::new(folder)),
        Arc::new(FileDecodeProvider::new()),
        Box::new(store),
        LibraryScope::All,
        Handle::current(),
    )
    .await?;

    // Walk forward the way a viewer swiping through would
    for _ in 0..steps {
        let next = session.current_index() + 1;
        if next >= session.item_count() {
            break;
        }
        session.on_index_changed(next)?;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }

    let stats = session.stats();
    log::info!(
        "At {} of {} items; {} marked for deletion, {} kept",
        session.current_index(),
        session.item_count(),
        session.pending_deletions_count(),
        session.pending_keeps_count()
    );
    log::info!(
        "Loader: {} queued, {} in flight, {} cached",
        stats.queued,
        stats.active,
        stats.cached
    );

    session.shutdown().await
}
