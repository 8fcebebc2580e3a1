use chrono::{DateTime, Datelike, Local};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::LibraryError;
use crate::pipeline::{AssetId, AssetRef, MediaKind};

/// Camera RAW extensions (common formats)
pub const RAW_EXTENSIONS: &[&str] = &[
    "nef", "dng", "cr2", "cr3", "arw", "raf", "orf", "rw2",
    "pef", "srw", "erf", "kdc", "dcr", "mos", "raw", "rwl",
];

/// Formats the `image` crate decodes directly
pub const PHOTO_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "tif", "tiff", "webp"];

pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "m4v", "avi", "mkv", "webm"];

fn extension_of(path: &Path) -> Option<String> {
    path.extension().map(|ext| ext.to_string_lossy().to_lowercase())
}

pub fn is_raw(path: &Path) -> bool {
    extension_of(path).is_some_and(|ext| RAW_EXTENSIONS.contains(&ext.as_str()))
}

/// Photo, video, or not a media file at all
pub fn media_kind_for(path: &Path) -> Option<MediaKind> {
    let ext = extension_of(path)?;
    if PHOTO_EXTENSIONS.contains(&ext.as_str()) || RAW_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Photo)
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Video)
    } else {
        None
    }
}

/// Which part of the library to sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LibraryScope {
    #[default]
    All,
    /// Assets created in one calendar month (local time)
    Month { year: i32, month: u32 },
}

impl LibraryScope {
    pub fn contains(&self, asset: &AssetRef) -> bool {
        match self {
            LibraryScope::All => true,
            LibraryScope::Month { year, month } => asset
                .created
                .is_some_and(|created| created.year() == *year && created.month() == *month),
        }
    }
}

/// What a deletion request actually achieved
///
/// Deletion is not atomic: some assets may go while others fail.
#[derive(Debug, Default)]
pub struct DeleteOutcome {
    /// Assets no longer in the library, including ones already gone
    pub deleted: Vec<AssetId>,
    pub failed: Vec<(AssetId, LibraryError)>,
}

impl DeleteOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// The external asset store
pub trait AssetSource: Send + Sync + 'static {
    /// Assets in scope, newest first
    fn enumerate_assets(&self, scope: &LibraryScope) -> Result<Vec<AssetRef>, LibraryError>;

    /// Playable location of a video asset
    fn fetch_video_source(&self, asset: &AssetRef) -> Option<PathBuf>;

    /// Permanently remove assets from the library
    fn delete_assets(&self, assets: &[AssetRef]) -> DeleteOutcome;
}

/// A folder tree of photos and videos
#[derive(Debug, Clone)]
pub struct FolderLibrary {
    root: PathBuf,
}

impl FolderLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn asset_for(&self, path: &Path, kind: MediaKind) -> AssetRef {
        // Relative paths stay stable if the library folder moves
        let id = path
            .strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");

        let created = std::fs::metadata(path)
            .ok()
            .and_then(|meta| meta.created().or_else(|_| meta.modified()).ok())
            .map(DateTime::<Local>::from);

        AssetRef {
            id: AssetId::new(id),
            kind,
            duration: None,
            location: path.to_path_buf(),
            created,
        }
    }
}

impl AssetSource for FolderLibrary {
    fn enumerate_assets(&self, scope: &LibraryScope) -> Result<Vec<AssetRef>, LibraryError> {
        if !self.root.is_dir() {
            return Err(LibraryError::MissingRoot(self.root.clone()));
        }

        log::info!("Scanning folder: {}", self.root.display());

        let mut assets = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    log::warn!("Skipping unreadable entry: {}", err);
                    continue;
                }
            };
            let path = entry.path();

            // Only process files (not directories)
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(kind) = media_kind_for(path) else {
                continue;
            };

            let asset = self.asset_for(path, kind);
            if scope.contains(&asset) {
                assets.push(asset);
            }
        }

        // Newest first, path order among equal timestamps
        assets.sort_by(|a, b| b.created.cmp(&a.created).then_with(|| a.id.cmp(&b.id)));

        log::info!("Found {} assets in {}", assets.len(), self.root.display());
        Ok(assets)
    }

    fn fetch_video_source(&self, asset: &AssetRef) -> Option<PathBuf> {
        if asset.is_video() && asset.location.is_file() {
            Some(asset.location.clone())
        } else {
            None
        }
    }

    fn delete_assets(&self, assets: &[AssetRef]) -> DeleteOutcome {
        let mut outcome = DeleteOutcome::default();
        for asset in assets {
            if !asset.location.starts_with(&self.root) {
                outcome
                    .failed
                    .push((asset.id.clone(), LibraryError::NotFound(asset.id.to_string())));
                continue;
            }
            match std::fs::remove_file(&asset.location) {
                Ok(()) => {
                    log::info!("Deleted {}", asset.location.display());
                    outcome.deleted.push(asset.id.clone());
                }
                Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                    log::debug!("{} was already gone", asset.location.display());
                    outcome.deleted.push(asset.id.clone());
                }
                Err(source) => {
                    log::error!("Failed to delete {}: {}", asset.location.display(), source);
                    outcome.failed.push((
                        asset.id.clone(),
                        LibraryError::Io {
                            path: asset.location.clone(),
                            source,
                        },
                    ));
                }
            }
        }
        outcome
    }
}
