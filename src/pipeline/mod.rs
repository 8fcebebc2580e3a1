/// Asset loading pipeline
///
/// This module handles:
/// - Ordering pending decode requests (queue.rs)
/// - Bounding the number of decodes in flight (limiter.rs)
/// - Caching decoded resources with FIFO eviction (cache.rs)
/// - Dispatch, dedup and cancellation (service.rs)
/// - Delivering results on a single presentation context (present.rs)

pub mod cache;
pub mod limiter;
pub mod present;
pub mod provider;
pub mod queue;
pub mod service;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::ResultCache;
pub use limiter::ConcurrencyLimiter;
pub use present::Presenter;
pub use provider::{AssetProvider, DecodeFuture, DecodeOutcome};
pub use queue::LoadQueue;
pub use service::{Admission, LoadEvent, LoadOutcome, LoaderStats, LoadingService};
pub use types::{
    AssetId, AssetRef, DecodeParams, DecodeSize, DeliveryMode, LoadCallback, LoadingTask, MediaKind, Priority,
    Quality, Resource, TargetSize, TaskKey,
};
