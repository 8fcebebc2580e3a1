use image::{imageops::FilterType, DynamicImage, RgbaImage};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use super::embedded::extract_largest_jpeg;
use crate::error::DecodeError;
use crate::pipeline::{AssetProvider, AssetRef, DecodeFuture, DecodeOutcome, DecodeParams, DeliveryMode, TargetSize};
use crate::state::source::{is_raw, media_kind_for};

/// Poster images that may sit next to a video file
const POSTER_EXTENSIONS: &[&str] = &["thm", "THM", "jpg", "JPG"];

/// Decodes assets straight from the file system
///
/// All file reading and pixel work happens on tokio's blocking pool; the
/// returned future only waits for it or for the cancel token.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileDecodeProvider;

impl FileDecodeProvider {
    pub fn new() -> Self {
        Self
    }
}

impl AssetProvider for FileDecodeProvider {
    fn request_decode(&self, asset: &AssetRef, params: DecodeParams, token: CancellationToken) -> DecodeFuture {
        let asset = asset.clone();

        Box::pin(async move {
            if token.is_cancelled() {
                return DecodeOutcome::Cancelled;
            }

            let id = asset.id.clone();
            let worker = tokio::task::spawn_blocking(move || decode_asset(&asset, params));

            let outcome = tokio::select! {
                joined = worker => match joined {
                    Ok(outcome) => outcome,
                    Err(err) => DecodeOutcome::Failed(DecodeError::Worker(err.to_string())),
                },
                _ = token.cancelled() => DecodeOutcome::Cancelled,
            };

            // A decode that finished after cancellation is still discarded
            if token.is_cancelled() {
                log::trace!("Decode of {} cancelled", id);
                return DecodeOutcome::Cancelled;
            }
            outcome
        })
    }
}

/// Blocking decode of one asset
pub fn decode_asset(asset: &AssetRef, params: DecodeParams) -> DecodeOutcome {
    let source = if asset.is_video() {
        match poster_for(&asset.location) {
            Some(poster) => poster,
            None => {
                log::debug!("No poster image for video {}", asset.id);
                return DecodeOutcome::Empty;
            }
        }
    } else {
        asset.location.clone()
    };

    match decode_file(&source).map(|image| fit(image, params)) {
        Ok(image) => DecodeOutcome::Decoded(image),
        Err(err) => {
            log::warn!("Failed to decode {}: {}", asset.id, err);
            DecodeOutcome::Failed(err)
        }
    }
}

/// Sidecar poster image of a video, if one exists
pub fn poster_for(video: &Path) -> Option<PathBuf> {
    POSTER_EXTENSIONS
        .iter()
        .map(|ext| video.with_extension(ext))
        .find(|candidate| candidate.is_file())
}

fn decode_file(path: &Path) -> Result<DynamicImage, DecodeError> {
    let bytes = if is_raw(path) {
        extract_largest_jpeg(path)?
    } else {
        // Posters use their own extension; everything else must be a known photo type
        let is_poster = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("thm"));
        if !is_poster && media_kind_for(path).is_none() {
            return Err(DecodeError::Unsupported(path.to_path_buf()));
        }
        std::fs::read(path).map_err(|source| DecodeError::Io {
            path: path.to_path_buf(),
            source,
        })?
    };

    Ok(image::load_from_memory(&bytes)?)
}

/// Scale down to the requested box; never upscale
fn fit(image: DynamicImage, params: DecodeParams) -> RgbaImage {
    let TargetSize::Fit(size) = params.target else {
        return image.to_rgba8();
    };
    if size.is_empty() || (image.width() <= size.width && image.height() <= size.height) {
        return image.to_rgba8();
    }

    let resized = match params.delivery {
        DeliveryMode::Fast | DeliveryMode::Opportunistic => image.thumbnail(size.width, size.height),
        DeliveryMode::HighQuality => image.resize(size.width, size.height, FilterType::Lanczos3),
    };
    resized.to_rgba8()
}
