/// A sweep through the library
///
/// Ties the asset source, the loading pipeline, the resident window and
/// the mark store together behind the handful of operations a viewer
/// needs: move, mark, confirm, react to memory pressure, shut down.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::data::{MarkBook, MarkStatus, SharedItems};
use super::library::{MarkRecorder, MarkStore};
use super::source::{AssetSource, LibraryScope};
use crate::config::LoadingConfig;
use crate::error::{Error, Result};
use crate::pipeline::{AssetProvider, AssetRef, LoaderStats, LoadingService, Presenter, Quality, TaskKey};
use crate::window::{MemoryPressureAdapter, PressureLevel, WindowManager};

pub struct SweepSession {
    source: Arc<dyn AssetSource>,
    window: Arc<Mutex<WindowManager>>,
    items: SharedItems,
    loader: LoadingService,
    pressure: MemoryPressureAdapter,
    marks: MarkBook,
    recorder: MarkRecorder,
}

impl SweepSession {
    /// Enumerate `scope`, build the first batch of items and start
    /// preloading around the first one
    ///
    /// Persisted marks are applied to items as they are created.
    pub async fn open(
        config: LoadingConfig,
        source: Arc<dyn AssetSource>,
        provider: Arc<dyn AssetProvider>,
        store: Box<dyn MarkStore>,
        scope: LibraryScope,
        runtime: Handle,
    ) -> Result<Self> {
        config.validate()?;

        let marks: MarkBook = Arc::new(Mutex::new(store.load_all_marks()?));
        let assets = source.enumerate_assets(&scope)?;
        log::info!("Opening session over {} assets ({:?})", assets.len(), scope);

        let loader = LoadingService::new(&config, provider, Presenter::spawn(&runtime), runtime.clone());
        let mut window = WindowManager::new(
            config,
            loader.clone(),
            Arc::clone(&source),
            assets,
            Arc::clone(&marks),
        );

        if let Some(done) = window.load_next_batch() {
            match done.await {
                Ok(count) => log::info!("First batch ready with {} items", count),
                Err(_) => log::warn!("First batch was abandoned"),
            }
        }
        window.preload_around(0);

        Ok(Self {
            source,
            items: Arc::clone(window.items()),
            window: Arc::new(Mutex::new(window)),
            loader,
            pressure: MemoryPressureAdapter::new(config),
            marks,
            recorder: MarkRecorder::spawn(store, &runtime),
        })
    }

    pub fn items(&self) -> &SharedItems {
        &self.items
    }

    pub fn item_count(&self) -> usize {
        self.items.lock().len()
    }

    pub fn current_index(&self) -> usize {
        self.window.lock().current_index()
    }

    pub fn loader(&self) -> &LoadingService {
        &self.loader
    }

    pub fn stats(&self) -> LoaderStats {
        self.loader.stats()
    }

    pub fn window(&self) -> &Arc<Mutex<WindowManager>> {
        &self.window
    }

    /// Move the viewing position
    pub fn on_index_changed(&self, index: usize) -> Result<()> {
        self.check_index(index)?;
        self.window.lock().on_index_changed(index);
        Ok(())
    }

    pub fn mark_for_deletion(&self, index: usize) -> Result<()> {
        self.set_mark(index, MarkStatus::Delete)
    }

    pub fn keep(&self, index: usize) -> Result<()> {
        self.set_mark(index, MarkStatus::Keep)
    }

    /// Undo a decision
    pub fn clear_mark(&self, index: usize) -> Result<()> {
        self.set_mark(index, MarkStatus::None)
    }

    pub fn pending_deletions_count(&self) -> usize {
        self.count_marked(MarkStatus::Delete)
    }

    pub fn pending_keeps_count(&self) -> usize {
        self.count_marked(MarkStatus::Keep)
    }

    /// Delete every item marked for deletion from the library
    ///
    /// Items the library reports as gone leave the sequence, their loads
    /// are cancelled and their marks are forgotten, even when other
    /// deletions fail. Returns how many were deleted, or the first failure
    /// once the successful part has been applied.
    pub fn confirm_delete(&self) -> Result<usize> {
        let doomed: Vec<AssetRef> = self
            .items
            .lock()
            .iter()
            .filter(|item| item.mark == MarkStatus::Delete)
            .map(|item| item.asset().clone())
            .collect();
        if doomed.is_empty() {
            return Ok(0);
        }

        log::info!("Deleting {} assets", doomed.len());
        let outcome = self.source.delete_assets(&doomed);
        let ids = outcome.deleted;
        for id in &ids {
            for quality in [Quality::Thumbnail, Quality::Preview, Quality::Full] {
                let key = TaskKey::new(id.clone(), quality);
                self.loader.cancel_loading(&key);
                self.loader.invalidate(&key);
            }
        }

        let mut window = self.window.lock();
        let remaining = {
            let mut items = self.items.lock();
            items.retain(|item| !ids.contains(item.id()));
            items.len()
        };
        {
            let mut marks = self.marks.lock();
            for id in &ids {
                marks.remove(id);
            }
        }
        let deleted = ids.len();
        self.recorder.forget(ids);

        if deleted > 0 && remaining > 0 {
            let index = window.current_index().min(remaining - 1);
            window.on_index_changed(index);
        }
        drop(window);

        let mut failed = outcome.failed.into_iter();
        if let Some((id, err)) = failed.next() {
            log::warn!(
                "Deleted {} assets, {} failed (first: {})",
                deleted,
                failed.len() + 1,
                id
            );
            return Err(err.into());
        }
        Ok(deleted)
    }

    /// Shrink or restore the resident window
    pub fn on_memory_pressure(&mut self, level: PressureLevel) -> usize {
        self.pressure.apply(level, &mut self.window.lock())
    }

    /// Follow a platform pressure signal in the background
    pub fn follow_memory_pressure(&self, signal: watch::Receiver<PressureLevel>) -> JoinHandle<()> {
        self.pressure.clone().listen(signal, Arc::clone(&self.window))
    }

    /// Stop all loading and close the mark store
    pub async fn shutdown(self) -> Result<()> {
        self.loader.cleanup();
        self.loader.presenter().flush().await;
        self.recorder.shutdown().await?;
        log::info!("Session closed");
        Ok(())
    }

    fn check_index(&self, index: usize) -> Result<()> {
        let len = self.item_count();
        if index >= len {
            return Err(Error::IndexOutOfRange { index, len });
        }
        Ok(())
    }

    fn set_mark(&self, index: usize, status: MarkStatus) -> Result<()> {
        let id = {
            let mut items = self.items.lock();
            let len = items.len();
            let item = items
                .get_mut(index)
                .ok_or(Error::IndexOutOfRange { index, len })?;
            item.mark = status;
            item.id().clone()
        };

        {
            let mut marks = self.marks.lock();
            if status == MarkStatus::None {
                marks.remove(&id);
            } else {
                marks.insert(id.clone(), status);
            }
        }
        log::debug!("Marked {} as {:?}", id, status);
        self.recorder.record(id, status);
        Ok(())
    }

    fn count_marked(&self, status: MarkStatus) -> usize {
        self.items.lock().iter().filter(|item| item.mark == status).count()
    }
}
