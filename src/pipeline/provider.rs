use image::RgbaImage;
use std::future::Future;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

use super::types::{AssetRef, DecodeParams};
use crate::error::DecodeError;

/// Future yielding the single terminal outcome of a decode request
pub type DecodeFuture = Pin<Box<dyn Future<Output = DecodeOutcome> + Send + 'static>>;

/// Terminal outcome of one decode request
#[derive(Debug)]
pub enum DecodeOutcome {
    Decoded(RgbaImage),
    /// The provider finished but had nothing to show
    Empty,
    /// The request observed its cancel token
    Cancelled,
    Failed(DecodeError),
}

/// Produces displayable resources from library assets
///
/// `request_decode` is called while the scheduler lock is held: it must
/// return promptly and must not call back into the loading service. The
/// heavy work belongs inside the returned future.
pub trait AssetProvider: Send + Sync + 'static {
    fn request_decode(&self, asset: &AssetRef, params: DecodeParams, token: CancellationToken) -> DecodeFuture;

    /// Ask an in-flight request to abort. Idempotent.
    fn cancel(&self, token: &CancellationToken) {
        token.cancel();
    }
}
