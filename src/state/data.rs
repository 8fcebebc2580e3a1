/// Shared data structures for the sweep session
///
/// These structs represent the data model that flows between the loading
/// pipeline, the mark store and the caller's UI layer.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::StoreError;
use crate::pipeline::{AssetId, AssetRef, Resource};

/// The user's decision for an asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MarkStatus {
    /// Not decided yet
    #[default]
    None,
    /// Delete on confirmation
    Delete,
    /// Keep
    Keep,
}

impl MarkStatus {
    /// Code stored in the mark database
    pub fn code(self) -> i64 {
        match self {
            MarkStatus::None => 0,
            MarkStatus::Delete => 1,
            MarkStatus::Keep => 2,
        }
    }

    pub fn from_code(code: i64) -> Result<Self, StoreError> {
        match code {
            0 => Ok(MarkStatus::None),
            1 => Ok(MarkStatus::Delete),
            2 => Ok(MarkStatus::Keep),
            other => Err(StoreError::UnknownStatus(other)),
        }
    }
}

/// One entry of the caller's ordered item sequence
///
/// Identity and thumbnail are fixed at creation. The window manager only
/// ever touches `preview` and `full`.
#[derive(Debug, Clone)]
pub struct MediaItem {
    asset: AssetRef,
    thumbnail: Resource,
    /// Medium-size resource, resident only inside the window
    pub preview: Option<Resource>,
    /// Full-size resource, resident only inside the window
    pub full: Option<Resource>,
    /// Playable location of a video
    pub video_source: Option<PathBuf>,
    pub mark: MarkStatus,
}

impl MediaItem {
    pub fn new(asset: AssetRef, thumbnail: Resource) -> Self {
        Self {
            asset,
            thumbnail,
            preview: None,
            full: None,
            video_source: None,
            mark: MarkStatus::None,
        }
    }

    pub fn id(&self) -> &AssetId {
        &self.asset.id
    }

    pub fn asset(&self) -> &AssetRef {
        &self.asset
    }

    pub fn thumbnail(&self) -> &Resource {
        &self.thumbnail
    }

    pub fn is_video(&self) -> bool {
        self.asset.is_video()
    }

    /// Whether a preview or full resource is resident
    pub fn holds_decoded(&self) -> bool {
        self.preview.is_some() || self.full.is_some()
    }
}

impl PartialEq for MediaItem {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

/// The caller-visible item sequence, mutated on the presentation context
pub type SharedItems = Arc<Mutex<Vec<MediaItem>>>;

/// Persisted marks, consulted when new items are created
pub type MarkBook = Arc<Mutex<HashMap<AssetId, MarkStatus>>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_codes() {
        for status in [MarkStatus::None, MarkStatus::Delete, MarkStatus::Keep] {
            assert_eq!(MarkStatus::from_code(status.code()).unwrap(), status);
        }
        assert!(matches!(MarkStatus::from_code(7), Err(StoreError::UnknownStatus(7))));
    }
}
