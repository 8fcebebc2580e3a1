/// Core data model of the loading pipeline
///
/// These types flow between the window manager, the loading service and the
/// decode provider. Asset handles are owned by the external asset store; the
/// pipeline only reads them.

use chrono::{DateTime, Local};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A decoded, displayable resource
///
/// Ownership moves into the cache on completion; callers receive shared
/// handles and the pixels are freed when the last handle is dropped.
pub type Resource = Arc<RgbaImage>;

/// Called once with the decoded resource, or `None` on failure
pub type LoadCallback = Box<dyn FnOnce(Option<Resource>) + Send + 'static>;

/// Stable identifier of a library asset
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId(String);

impl AssetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Photo or video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Photo,
    Video,
}

/// Opaque handle to a library asset
#[derive(Debug, Clone, PartialEq)]
pub struct AssetRef {
    /// Stable identifier
    pub id: AssetId,
    /// Photo or video
    pub kind: MediaKind,
    /// Playback length (videos only)
    pub duration: Option<Duration>,
    /// Where the provider finds the asset's bytes
    pub location: PathBuf,
    /// Capture/creation time, used for ordering and month scopes
    pub created: Option<DateTime<Local>>,
}

impl AssetRef {
    pub fn photo(id: impl Into<String>, location: impl Into<PathBuf>) -> Self {
        Self {
            id: AssetId::new(id),
            kind: MediaKind::Photo,
            duration: None,
            location: location.into(),
            created: None,
        }
    }

    pub fn video(id: impl Into<String>, location: impl Into<PathBuf>, duration: Option<Duration>) -> Self {
        Self {
            id: AssetId::new(id),
            kind: MediaKind::Video,
            duration,
            location: location.into(),
            created: None,
        }
    }

    pub fn is_video(&self) -> bool {
        self.kind == MediaKind::Video
    }
}

/// Decode quality tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Quality {
    /// Small fixed box for the thumbnail strip
    Thumbnail,
    /// Medium box, quick to produce
    Preview,
    /// Original dimensions
    Full,
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Quality::Thumbnail => "thumbnail",
            Quality::Preview => "preview",
            Quality::Full => "full",
        };
        f.write_str(name)
    }
}

/// Scheduling tier; lower ordinal is served first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Priority {
    /// The item on screen
    Immediate = 0,
    /// About to be shown
    High = 1,
    /// Preload
    Normal = 2,
    /// Opportunistic
    Low = 3,
}

/// Identifies one decode request: (asset id, quality)
///
/// Used for deduplication, cancellation and cache lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskKey {
    pub asset: AssetId,
    pub quality: Quality,
}

impl TaskKey {
    pub fn new(asset: AssetId, quality: Quality) -> Self {
        Self { asset, quality }
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.asset, self.quality)
    }
}

/// Width x height in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecodeSize {
    pub width: u32,
    pub height: u32,
}

impl DecodeSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// How large the decoded resource should be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSize {
    /// Scale down to fit inside the box, keeping aspect ratio
    Fit(DecodeSize),
    /// Keep the asset's own dimensions
    Original,
}

/// Speed/quality trade-off requested from the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Cheapest acceptable result
    Fast,
    /// Fast, but a better result is welcome if it is already available
    Opportunistic,
    /// Best possible result, however long it takes
    HighQuality,
}

/// Parameters handed to the decode provider for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeParams {
    pub quality: Quality,
    pub target: TargetSize,
    pub delivery: DeliveryMode,
}

impl DecodeParams {
    /// Derive decode parameters from the requested quality and priority
    ///
    /// Previews are fetched at high quality only when they are needed on
    /// screen right now.
    pub fn for_request(
        quality: Quality,
        priority: Priority,
        thumbnail_size: DecodeSize,
        preview_size: DecodeSize,
    ) -> Self {
        let (target, delivery) = match quality {
            Quality::Thumbnail => (TargetSize::Fit(thumbnail_size), DeliveryMode::Fast),
            Quality::Preview if priority == Priority::Immediate => {
                (TargetSize::Fit(preview_size), DeliveryMode::HighQuality)
            }
            Quality::Preview => (TargetSize::Fit(preview_size), DeliveryMode::Opportunistic),
            Quality::Full => (TargetSize::Original, DeliveryMode::HighQuality),
        };
        Self {
            quality,
            target,
            delivery,
        }
    }
}

/// One pending decode request
///
/// Immutable once created; it leaves the queue either by dispatch or by
/// cancellation.
pub struct LoadingTask {
    pub key: TaskKey,
    pub asset: AssetRef,
    pub priority: Priority,
    pub enqueued_at: Instant,
    pub callback: LoadCallback,
}

impl LoadingTask {
    pub fn new(asset: AssetRef, quality: Quality, priority: Priority, callback: LoadCallback) -> Self {
        Self {
            key: TaskKey::new(asset.id.clone(), quality),
            asset,
            priority,
            enqueued_at: Instant::now(),
            callback,
        }
    }

    pub fn quality(&self) -> Quality {
        self.key.quality
    }
}

impl fmt::Debug for LoadingTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadingTask")
            .field("key", &self.key)
            .field("priority", &self.priority)
            .field("enqueued_at", &self.enqueued_at)
            .finish_non_exhaustive()
    }
}
