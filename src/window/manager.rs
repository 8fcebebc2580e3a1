/// Window manager
///
/// Decides, as the viewing index moves, which items keep their decoded
/// preview/full resources, which give them up, and which get a full-quality
/// preload. Memory is always reclaimed (release pass) before new work is
/// queued (preload pass).

use parking_lot::Mutex;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::config::LoadingConfig;
use crate::pipeline::{Admission, AssetRef, LoadingService, Priority, Quality, Resource, TaskKey};
use crate::state::data::{MarkBook, MediaItem, SharedItems};
use crate::state::source::AssetSource;

pub struct WindowManager {
    config: LoadingConfig,
    loader: LoadingService,
    source: Arc<dyn AssetSource>,
    items: SharedItems,
    marks: MarkBook,
    /// Every asset in scope; items are built from it batch by batch
    assets: Vec<AssetRef>,
    /// First asset not yet handed to a batch
    next_asset: usize,
    batch_loading: Arc<AtomicBool>,
    /// Shared with preload callbacks, which run after the index may have moved
    window_size: Arc<AtomicUsize>,
    current_index: Arc<AtomicUsize>,
}

impl WindowManager {
    pub fn new(
        config: LoadingConfig,
        loader: LoadingService,
        source: Arc<dyn AssetSource>,
        assets: Vec<AssetRef>,
        marks: MarkBook,
    ) -> Self {
        Self {
            window_size: Arc::new(AtomicUsize::new(config.window_size)),
            config,
            loader,
            source,
            items: Arc::new(Mutex::new(Vec::new())),
            marks,
            assets,
            next_asset: 0,
            batch_loading: Arc::new(AtomicBool::new(false)),
            current_index: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn items(&self) -> &SharedItems {
        &self.items
    }

    pub fn loader(&self) -> &LoadingService {
        &self.loader
    }

    pub fn current_index(&self) -> usize {
        self.current_index.load(Ordering::Acquire)
    }

    pub fn window_size(&self) -> usize {
        self.window_size.load(Ordering::Acquire)
    }

    pub fn set_window_size(&mut self, window_size: usize) {
        let previous = self.window_size.swap(window_size, Ordering::AcqRel);
        log::info!("Window size {} -> {}", previous, window_size);
    }

    pub fn item_count(&self) -> usize {
        self.items.lock().len()
    }

    /// Assets not yet turned into items
    pub fn remaining_assets(&self) -> usize {
        self.assets.len() - self.next_asset
    }

    /// React to the viewing position moving to `new_index`
    pub fn on_index_changed(&mut self, new_index: usize) {
        let previous = self.current_index.swap(new_index, Ordering::AcqRel);
        log::debug!("Index changed: {} -> {}", previous, new_index);

        if new_index.saturating_add(self.config.preload_threshold) >= self.item_count() {
            self.load_next_batch();
        }

        let released = self.release_outside_window();
        if released > 0 {
            log::debug!("Released decoded resources of {} items", released);
        }
        self.preload_around(new_index);
    }

    /// Indices whose decoded resources stay resident
    pub fn keep_range(&self, index: usize, item_count: usize) -> Range<usize> {
        keep_range(index, self.window_size(), item_count)
    }

    /// Drop preview/full resources of every non-video item outside the
    /// window around the current index and cancel their pending loads
    ///
    /// Returns the number of items that gave up a resource.
    pub fn release_outside_window(&mut self) -> usize {
        let mut items = self.items.lock();
        let keep = self.keep_range(self.current_index(), items.len());

        let mut released = 0;
        for (index, item) in items.iter_mut().enumerate() {
            if keep.contains(&index) || item.is_video() {
                continue;
            }

            for quality in [Quality::Full, Quality::Preview] {
                self.loader.cancel_loading(&TaskKey::new(item.id().clone(), quality));
            }

            if item.holds_decoded() {
                log::trace!("Releasing decoded resources at index {}", index);
                item.full = None;
                item.preview = None;
                released += 1;
            }
        }
        released
    }

    /// Request full-quality resources around `index`, nearest first
    pub fn preload_around(&self, index: usize) {
        let targets = {
            let items = self.items.lock();
            let half = self.config.high_quality_window / 2;
            let start = index.saturating_sub(half);
            let end = items.len().min(index.saturating_add(half).saturating_add(1));
            if start >= end {
                return;
            }

            let mut indices: Vec<usize> = (start..end).collect();
            indices.sort_by_key(|&i| i.abs_diff(index));

            indices
                .into_iter()
                .filter(|&i| items[i].full.is_none() && !items[i].is_video())
                .map(|i| (i.abs_diff(index), items[i].asset().clone()))
                .collect::<Vec<_>>()
        };

        log::debug!("Preloading {} items around index {}", targets.len(), index);

        for (distance, asset) in targets {
            let priority = LoadingConfig::priority_for_distance(distance);
            let items = Arc::clone(&self.items);
            let current_index = Arc::clone(&self.current_index);
            let window_size = Arc::clone(&self.window_size);
            let id = asset.id.clone();

            self.loader.load_image(&asset, Quality::Full, priority, move |resource| {
                let Some(resource) = resource else {
                    log::warn!("Full-quality load failed for {}", id);
                    return;
                };
                let mut items = items.lock();
                let Some(position) = items.iter().position(|item| item.id() == &id) else {
                    return;
                };
                // The index may have moved on while this result waited for delivery
                let keep = keep_range(
                    current_index.load(Ordering::Acquire),
                    window_size.load(Ordering::Acquire),
                    items.len(),
                );
                if !keep.contains(&position) {
                    log::trace!("Dropping full resource for {}, now outside the window", id);
                    return;
                }
                items[position].full = Some(resource);
            });
        }
    }

    /// Turn the next `preload_batch_size` assets into items
    ///
    /// Thumbnails are requested for the whole batch; the items are appended
    /// in library order once every thumbnail has resolved. Assets whose
    /// thumbnail fails are skipped. Returns `None` when a batch is already
    /// loading or every asset has been handed out; otherwise the receiver
    /// yields the number of items appended.
    pub fn load_next_batch(&mut self) -> Option<oneshot::Receiver<usize>> {
        if self.next_asset >= self.assets.len() {
            return None;
        }
        if self.batch_loading.swap(true, Ordering::AcqRel) {
            log::trace!("Batch already loading");
            return None;
        }

        let end = self.assets.len().min(self.next_asset + self.config.preload_batch_size.max(1));
        let batch: Vec<AssetRef> = self.assets[self.next_asset..end].to_vec();
        log::info!("Loading items {}..{} of {}", self.next_asset, end, self.assets.len());
        self.next_asset = end;

        let (done_tx, done_rx) = oneshot::channel();
        let assembly = Arc::new(Mutex::new(BatchAssembly {
            slots: vec![None; batch.len()],
            remaining: batch.len(),
            items: Arc::clone(&self.items),
            loading: Arc::clone(&self.batch_loading),
            done: Some(done_tx),
        }));

        for (slot, asset) in batch.into_iter().enumerate() {
            let assembly_cb = Arc::clone(&assembly);
            let source = Arc::clone(&self.source);
            let marks = Arc::clone(&self.marks);
            let thumb_asset = asset.clone();

            let admission = self.loader.load_image(&asset, Quality::Thumbnail, Priority::Normal, move |thumbnail| {
                let item = thumbnail.map(|thumbnail| build_item(thumb_asset, thumbnail, &*source, &marks));
                assembly_cb.lock().settle(slot, item);
            });

            // A dropped duplicate never calls back; settle its slot so the batch completes
            if admission == Admission::Duplicate {
                let assembly = Arc::clone(&assembly);
                self.loader.presenter().run(move || assembly.lock().settle(slot, None));
            }
        }

        Some(done_rx)
    }
}

/// Indices within `window_size / 2` of `index`, clipped to the sequence
fn keep_range(index: usize, window_size: usize, item_count: usize) -> Range<usize> {
    let half = window_size / 2;
    let start = index.saturating_sub(half);
    let end = item_count.min(index.saturating_add(half).saturating_add(1));
    start..end.max(start)
}

fn build_item(asset: AssetRef, thumbnail: Resource, source: &dyn AssetSource, marks: &MarkBook) -> MediaItem {
    let video_source = if asset.is_video() {
        let url = source.fetch_video_source(&asset);
        if url.is_none() {
            log::warn!("No playable source for video {}", asset.id);
        }
        url
    } else {
        None
    };
    let mark = marks.lock().get(&asset.id).copied().unwrap_or_default();

    let mut item = MediaItem::new(asset, thumbnail);
    item.video_source = video_source;
    item.mark = mark;
    item
}

/// Collects one batch of items in library order
struct BatchAssembly {
    slots: Vec<Option<MediaItem>>,
    remaining: usize,
    items: SharedItems,
    loading: Arc<AtomicBool>,
    done: Option<oneshot::Sender<usize>>,
}

impl BatchAssembly {
    fn settle(&mut self, slot: usize, item: Option<MediaItem>) {
        if item.is_none() {
            log::warn!("No thumbnail for batch slot {}, skipping", slot);
        }
        self.slots[slot] = item;
        self.remaining -= 1;
        if self.remaining > 0 {
            return;
        }

        let ready: Vec<MediaItem> = self.slots.drain(..).flatten().collect();
        let appended = ready.len();
        self.items.lock().extend(ready);
        self.loading.store(false, Ordering::Release);
        log::info!("Appended {} items", appended);

        if let Some(done) = self.done.take() {
            let _ = done.send(appended);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::{settle, solid, ManualProvider};
    use crate::pipeline::{DecodeOutcome, Presenter};
    use crate::state::source::{DeleteOutcome, LibraryScope};
    use crate::error::LibraryError;
    use std::path::PathBuf;
    use tokio::runtime::Handle;

    struct NoVideos;

    impl AssetSource for NoVideos {
        fn enumerate_assets(&self, _scope: &LibraryScope) -> Result<Vec<AssetRef>, LibraryError> {
            Ok(Vec::new())
        }
        fn fetch_video_source(&self, asset: &AssetRef) -> Option<PathBuf> {
            Some(asset.location.clone())
        }
        fn delete_assets(&self, _assets: &[AssetRef]) -> DeleteOutcome {
            DeleteOutcome::default()
        }
    }

    fn asset(i: usize, video: bool) -> AssetRef {
        if video {
            AssetRef::video(format!("v{}", i), format!("/lib/v{}.mp4", i), None)
        } else {
            AssetRef::photo(format!("p{}", i), format!("/lib/p{}.jpg", i))
        }
    }

    fn manager(provider: &Arc<ManualProvider>, config: LoadingConfig, assets: Vec<AssetRef>) -> WindowManager {
        let loader = LoadingService::new(&config, provider.clone(), Presenter::spawn_current(), Handle::current());
        WindowManager::new(config, loader, Arc::new(NoVideos), assets, MarkBook::default())
    }

    /// Fill the item sequence directly, every photo holding a full resource
    fn seed_items(window: &WindowManager, count: usize, video_every: usize) {
        let mut items = window.items().lock();
        for i in 0..count {
            let is_video = video_every > 0 && i % video_every == 0;
            let mut item = MediaItem::new(asset(i, is_video), Arc::new(solid(1, 1)));
            item.full = Some(Arc::new(solid(2, 2)));
            item.preview = Some(Arc::new(solid(2, 2)));
            items.push(item);
        }
    }

    fn quiet_config() -> LoadingConfig {
        LoadingConfig {
            preload_threshold: 0,
            high_quality_window: 0,
            ..LoadingConfig::default()
        }
    }

    #[tokio::test]
    async fn test_keep_range_clips() {
        let provider = ManualProvider::new();
        let mut window = manager(&provider, LoadingConfig::default(), Vec::new());
        window.set_window_size(100);

        assert_eq!(window.keep_range(0, 2000), 0..51);
        assert_eq!(window.keep_range(1000, 2000), 950..1051);
        assert_eq!(window.keep_range(1990, 2000), 1940..2000);
        assert_eq!(window.keep_range(5, 0), 0..0);
    }

    #[tokio::test]
    async fn test_release_after_jump() {
        let provider = ManualProvider::new();
        let mut window = manager(&provider, quiet_config(), Vec::new());
        window.set_window_size(100);
        seed_items(&window, 2000, 7);

        window.on_index_changed(1000);

        let items = window.items().lock();
        for (i, item) in items.iter().enumerate() {
            let inside = (950..=1050).contains(&i);
            if item.is_video() {
                assert!(item.full.is_some(), "video {} must be untouched", i);
                assert!(item.preview.is_some());
            } else if inside {
                assert!(item.full.is_some(), "item {} is inside the window", i);
            } else {
                assert!(item.full.is_none() && item.preview.is_none(), "item {} should be released", i);
            }
        }
    }

    #[tokio::test]
    async fn test_release_cancels_pending_loads() {
        let provider = ManualProvider::new();
        let config = LoadingConfig {
            preload_threshold: 0,
            high_quality_window: 10,
            ..LoadingConfig::default()
        };
        let mut window = manager(&provider, config, Vec::new());
        window.set_window_size(10);
        {
            let mut items = window.items().lock();
            for i in 0..100 {
                items.push(MediaItem::new(asset(i, false), Arc::new(solid(1, 1))));
            }
        }

        window.on_index_changed(0);
        let first = TaskKey::new("p0".into(), Quality::Full);
        assert!(window.loader().is_pending(&first));

        window.on_index_changed(50);
        assert!(!window.loader().is_pending(&first));
        assert!(provider.token(&first).map(|t| t.is_cancelled()).unwrap_or(false));
        assert!(window.loader().is_pending(&TaskKey::new("p50".into(), Quality::Full)));
    }

    #[tokio::test]
    async fn test_preload_priorities_and_skips() {
        let provider = ManualProvider::new();
        let config = LoadingConfig {
            preload_threshold: 0,
            high_quality_window: 100,
            max_concurrent_loads: 1,
            ..LoadingConfig::default()
        };
        let mut window = manager(&provider, config, Vec::new());
        {
            let mut items = window.items().lock();
            for i in 0..200 {
                let mut item = MediaItem::new(asset(i, i == 101), Arc::new(solid(1, 1)));
                if i == 99 {
                    item.full = Some(Arc::new(solid(2, 2)));
                }
                items.push(item);
            }
        }

        window.on_index_changed(100);

        // The current item goes out first; the rest wait in priority order
        assert_eq!(provider.dispatched(), vec![TaskKey::new("p100".into(), Quality::Full)]);
        let stats = window.loader().stats();
        // 101 targets (50..=150) minus the cached full at 99 and the video at 101
        assert_eq!(stats.active + stats.queued, 99);
        assert!(!window.loader().is_pending(&TaskKey::new("p99".into(), Quality::Full)));
        assert!(!window.loader().is_pending(&TaskKey::new("v101".into(), Quality::Full)));

        provider.resolve_all();
        settle(window.loader().presenter()).await;
        // Next dispatch is the nearest photo neighbour, ahead of every farther item
        let next = provider.dispatched()[1].asset.to_string();
        assert!(next == "p102" || next == "p98", "unexpected {}", next);

        let items = window.items().lock();
        assert!(items[100].full.is_some());
    }

    #[tokio::test]
    async fn test_pagination_appends_in_order() {
        let provider = ManualProvider::new();
        let config = LoadingConfig {
            preload_threshold: 5,
            preload_batch_size: 4,
            high_quality_window: 0,
            max_concurrent_loads: 4,
            ..LoadingConfig::default()
        };
        let assets: Vec<AssetRef> = (0..10).map(|i| asset(i, i == 2)).collect();
        let mut window = manager(&provider, config, assets);

        let done = window.load_next_batch().unwrap();
        // A second request while the batch loads is ignored
        assert!(window.load_next_batch().is_none());

        // Resolve out of order; one thumbnail fails
        for id in ["p3", "p0", "v2"] {
            provider.resolve(&TaskKey::new(id.into(), Quality::Thumbnail), DecodeOutcome::Decoded(solid(1, 1)));
        }
        provider.resolve(&TaskKey::new("p1".into(), Quality::Thumbnail), DecodeOutcome::Empty);
        settle(window.loader().presenter()).await;

        assert_eq!(done.await.unwrap(), 3);
        {
            let items = window.items().lock();
            let ids: Vec<&str> = items.iter().map(|i| i.id().as_str()).collect();
            assert_eq!(ids, vec!["p0", "v2", "p3"]);
            assert_eq!(items[1].video_source, Some(PathBuf::from("/lib/v2.mp4")));
        }
        assert_eq!(window.remaining_assets(), 6);

        // Near the end of the loaded items, moving triggers the next batch
        window.on_index_changed(1);
        provider.resolve_all();
        settle(window.loader().presenter()).await;
        assert_eq!(window.item_count(), 7);
        assert_eq!(window.remaining_assets(), 2);
    }

    #[tokio::test]
    async fn test_batch_applies_known_marks() {
        let provider = ManualProvider::new();
        let config = LoadingConfig {
            preload_batch_size: 2,
            ..quiet_config()
        };
        let loader = LoadingService::new(&config, provider.clone(), Presenter::spawn_current(), Handle::current());
        let marks = MarkBook::default();
        marks.lock().insert("p1".into(), crate::state::data::MarkStatus::Delete);
        let assets = vec![asset(0, false), asset(1, false)];
        let mut window = WindowManager::new(config, loader, Arc::new(NoVideos), assets, marks);

        let done = window.load_next_batch().unwrap();
        provider.resolve_all();
        settle(window.loader().presenter()).await;
        assert_eq!(done.await.unwrap(), 2);

        let items = window.items().lock();
        assert_eq!(items[0].mark, crate::state::data::MarkStatus::None);
        assert_eq!(items[1].mark, crate::state::data::MarkStatus::Delete);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_late_full_result_outside_window_is_dropped() {
        let provider = ManualProvider::new();
        let config = LoadingConfig {
            preload_threshold: 0,
            high_quality_window: 10,
            ..LoadingConfig::default()
        };
        let mut window = manager(&provider, config, Vec::new());
        window.set_window_size(10);
        {
            let mut items = window.items().lock();
            for i in 0..100 {
                items.push(MediaItem::new(asset(i, false), Arc::new(solid(1, 1))));
            }
        }
        window.on_index_changed(0);

        // Hold the presentation context so the result is decoded but not yet delivered
        let (gate_tx, gate_rx) = std::sync::mpsc::channel::<()>();
        window.loader().presenter().run(move || {
            let _ = gate_rx.recv();
        });

        let mut events = window.loader().events();
        let first = TaskKey::new("p0".into(), Quality::Full);
        provider.resolve(&first, DecodeOutcome::Decoded(solid(2, 2)));
        loop {
            let event = tokio::time::timeout(std::time::Duration::from_secs(5), events.recv())
                .await
                .unwrap()
                .unwrap();
            if event.key == first {
                break;
            }
        }

        window.on_index_changed(50);
        gate_tx.send(()).unwrap();
        window.loader().presenter().flush().await;

        let items = window.items().lock();
        assert!(items[0].full.is_none(), "item 0 must not hold a full resource outside the window");
    }

    #[tokio::test]
    async fn test_extreme_index_does_not_overflow() {
        let provider = ManualProvider::new();
        let mut window = manager(&provider, LoadingConfig::default(), Vec::new());
        seed_items(&window, 10, 0);
        window.set_window_size(usize::MAX);

        assert!(window.keep_range(usize::MAX, 10).is_empty());
        window.on_index_changed(usize::MAX);
        assert_eq!(window.current_index(), usize::MAX);
        // Nothing is within reach of an index past the end
        assert!(window.items().lock().iter().all(|item| !item.holds_decoded()));
    }
}
