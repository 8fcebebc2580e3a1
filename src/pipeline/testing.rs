//! Test doubles for the loading pipeline

use image::{Rgba, RgbaImage};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::present::Presenter;
use super::provider::{AssetProvider, DecodeFuture, DecodeOutcome};
use super::types::{AssetRef, DecodeParams, TaskKey};

/// A decode request the test has not resolved yet
pub struct PendingDecode {
    pub key: TaskKey,
    pub params: DecodeParams,
    pub token: CancellationToken,
    reply: oneshot::Sender<DecodeOutcome>,
}

impl PendingDecode {
    pub fn resolve(self, outcome: DecodeOutcome) {
        let _ = self.reply.send(outcome);
    }
}

/// Provider whose requests complete only when the test says so
#[derive(Default)]
pub struct ManualProvider {
    pending: Mutex<Vec<PendingDecode>>,
    dispatched: Mutex<Vec<TaskKey>>,
}

impl ManualProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every key ever dispatched, in dispatch order
    pub fn dispatched(&self) -> Vec<TaskKey> {
        self.dispatched.lock().clone()
    }

    pub fn take(&self, key: &TaskKey) -> Option<PendingDecode> {
        let mut pending = self.pending.lock();
        let pos = pending.iter().position(|p| &p.key == key)?;
        Some(pending.remove(pos))
    }

    /// Resolve the oldest pending request for `key`
    pub fn resolve(&self, key: &TaskKey, outcome: DecodeOutcome) {
        match self.take(key) {
            Some(pending) => pending.resolve(outcome),
            None => panic!("no pending decode for {}", key),
        }
    }

    /// Resolve every pending request with a small image
    pub fn resolve_all(&self) {
        let pending: Vec<_> = self.pending.lock().drain(..).collect();
        for p in pending {
            p.resolve(DecodeOutcome::Decoded(solid(2, 2)));
        }
    }

    pub fn token(&self, key: &TaskKey) -> Option<CancellationToken> {
        let pending = self.pending.lock();
        pending.iter().rev().find(|p| &p.key == key).map(|p| p.token.clone())
    }

    pub fn params(&self, key: &TaskKey) -> Option<DecodeParams> {
        let pending = self.pending.lock();
        pending.iter().rev().find(|p| &p.key == key).map(|p| p.params)
    }
}

impl AssetProvider for ManualProvider {
    fn request_decode(&self, asset: &AssetRef, params: DecodeParams, token: CancellationToken) -> DecodeFuture {
        let key = TaskKey::new(asset.id.clone(), params.quality);
        let (reply, rx) = oneshot::channel();

        self.dispatched.lock().push(key.clone());
        self.pending.lock().push(PendingDecode {
            key,
            params,
            token,
            reply,
        });

        Box::pin(async move { rx.await.unwrap_or(DecodeOutcome::Cancelled) })
    }
}

/// Single-colour test image
pub fn solid(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_pixel(width, height, Rgba([200, 100, 50, 255]))
}

/// Let spawned completions run, then wait for the callbacks they scheduled
pub async fn settle(presenter: &Presenter) {
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
    presenter.flush().await;
}
