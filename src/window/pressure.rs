/// Memory pressure adapter
///
/// Shrinks the resident window when the platform reports memory pressure
/// and immediately releases whatever falls outside it. No preload is
/// triggered from here; that would only thrash under pressure.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::manager::WindowManager;
use crate::config::LoadingConfig;

/// Pressure level reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum PressureLevel {
    #[default]
    None,
    Low,
    High,
    Critical,
}

impl PressureLevel {
    /// Map the platform ordinal; anything above 2 is critical
    pub fn from_ordinal(level: u8) -> Self {
        match level {
            0 => PressureLevel::None,
            1 => PressureLevel::Low,
            2 => PressureLevel::High,
            _ => PressureLevel::Critical,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MemoryPressureAdapter {
    config: LoadingConfig,
    level: PressureLevel,
}

impl MemoryPressureAdapter {
    pub fn new(config: LoadingConfig) -> Self {
        Self {
            config,
            level: PressureLevel::None,
        }
    }

    pub fn level(&self) -> PressureLevel {
        self.level
    }

    /// Resize the window for `level` and run a release pass
    ///
    /// Returns the number of items that gave up decoded resources.
    pub fn apply(&mut self, level: PressureLevel, window: &mut WindowManager) -> usize {
        self.level = level;
        let window_size = self.config.adjusted_window_size(level);
        window.set_window_size(window_size);

        let released = window.release_outside_window();
        log::info!(
            "Memory pressure {:?}: window {} items, released {}",
            level,
            window_size,
            released
        );
        released
    }

    /// Follow a pushed pressure signal until the sender goes away
    pub fn listen(
        mut self,
        mut signal: watch::Receiver<PressureLevel>,
        window: Arc<Mutex<WindowManager>>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while signal.changed().await.is_ok() {
                let level = *signal.borrow_and_update();
                self.apply(level, &mut window.lock());
            }
            log::debug!("Memory pressure signal closed");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LibraryError;
    use crate::pipeline::testing::{solid, ManualProvider};
    use crate::pipeline::{AssetRef, LoadingService, Presenter, Quality, TaskKey};
    use crate::state::data::{MarkBook, MediaItem};
    use crate::state::source::{AssetSource, DeleteOutcome, LibraryScope};
    use std::path::PathBuf;
    use std::time::Duration;
    use tokio::runtime::Handle;

    struct EmptySource;

    impl AssetSource for EmptySource {
        fn enumerate_assets(&self, _scope: &LibraryScope) -> Result<Vec<AssetRef>, LibraryError> {
            Ok(Vec::new())
        }
        fn fetch_video_source(&self, _asset: &AssetRef) -> Option<PathBuf> {
            None
        }
        fn delete_assets(&self, _assets: &[AssetRef]) -> DeleteOutcome {
            DeleteOutcome::default()
        }
    }

    fn config() -> LoadingConfig {
        LoadingConfig {
            window_size: 100,
            preload_threshold: 0,
            high_quality_window: 100,
            ..LoadingConfig::default()
        }
    }

    fn populated_window(provider: &Arc<ManualProvider>, count: usize) -> WindowManager {
        let config = config();
        let loader = LoadingService::new(&config, provider.clone(), Presenter::spawn_current(), Handle::current());
        let window = WindowManager::new(config, loader, Arc::new(EmptySource), Vec::new(), MarkBook::default());
        {
            let mut items = window.items().lock();
            for i in 0..count {
                let mut item = MediaItem::new(
                    AssetRef::photo(format!("p{}", i), format!("/lib/p{}.jpg", i)),
                    Arc::new(solid(1, 1)),
                );
                item.full = Some(Arc::new(solid(2, 2)));
                items.push(item);
            }
        }
        window
    }

    #[test]
    fn test_ordinals() {
        assert_eq!(PressureLevel::from_ordinal(0), PressureLevel::None);
        assert_eq!(PressureLevel::from_ordinal(1), PressureLevel::Low);
        assert_eq!(PressureLevel::from_ordinal(2), PressureLevel::High);
        assert_eq!(PressureLevel::from_ordinal(3), PressureLevel::Critical);
        assert_eq!(PressureLevel::from_ordinal(9), PressureLevel::Critical);
    }

    #[tokio::test]
    async fn test_high_pressure_halves_window_and_releases() {
        let provider = ManualProvider::new();
        let mut window = populated_window(&provider, 300);
        window.on_index_changed(150);
        let dispatched_before = provider.dispatched().len();

        // Everything within 50 of the current index is still resident
        assert!(window.items().lock()[100].full.is_some());

        let mut adapter = MemoryPressureAdapter::new(config());
        let released = adapter.apply(PressureLevel::High, &mut window);

        assert_eq!(window.window_size(), 50);
        assert_eq!(adapter.level(), PressureLevel::High);
        // 100..=200 held resources, 125..=175 keeps them
        assert_eq!(released, 50);
        {
            let items = window.items().lock();
            for (i, item) in items.iter().enumerate() {
                assert_eq!(item.full.is_some(), (125..=175).contains(&i), "index {}", i);
            }
        }
        // No new preload work under pressure
        assert_eq!(provider.dispatched().len(), dispatched_before);
    }

    #[tokio::test]
    async fn test_pressure_relief_restores_window_size() {
        let provider = ManualProvider::new();
        let mut window = populated_window(&provider, 10);
        let mut adapter = MemoryPressureAdapter::new(config());

        adapter.apply(PressureLevel::Critical, &mut window);
        assert_eq!(window.window_size(), 25);
        adapter.apply(PressureLevel::None, &mut window);
        assert_eq!(window.window_size(), 100);
    }

    #[tokio::test]
    async fn test_listen_follows_signal() {
        let provider = ManualProvider::new();
        let window = Arc::new(Mutex::new(populated_window(&provider, 10)));
        let (tx, rx) = watch::channel(PressureLevel::None);

        let handle = MemoryPressureAdapter::new(config()).listen(rx, Arc::clone(&window));
        tx.send(PressureLevel::from_ordinal(1)).unwrap();

        let mut resized = false;
        for _ in 0..50 {
            if window.lock().window_size() == 75 {
                resized = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert!(resized);

        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert!(!window.lock().loader().is_pending(&TaskKey::new("p0".into(), Quality::Full)));
    }
}
