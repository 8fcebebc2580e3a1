/// Presentation context
///
/// A single task that runs caller-visible mutations (load callbacks, item
/// updates) one at a time in submission order, separate from the scheduler
/// lock.

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone)]
pub struct Presenter {
    tx: mpsc::UnboundedSender<Job>,
}

impl Presenter {
    /// Start the presentation task on the given runtime
    pub fn spawn(runtime: &Handle) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        runtime.spawn(async move {
            while let Some(job) = rx.recv().await {
                job();
            }
            log::debug!("Presentation context stopped");
        });
        Self { tx }
    }

    /// Start the presentation task on the runtime of the calling task
    ///
    /// Panics when called outside a tokio runtime.
    pub fn spawn_current() -> Self {
        Self::spawn(&Handle::current())
    }

    /// Schedule `job` after everything already submitted
    pub fn run(&self, job: impl FnOnce() + Send + 'static) {
        if self.tx.send(Box::new(job)).is_err() {
            log::debug!("Presentation context closed, dropping job");
        }
    }

    /// Wait until every job submitted before this call has run
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        self.run(move || {
            let _ = done_tx.send(());
        });
        let _ = done_rx.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_jobs_run_in_order() {
        let presenter = Presenter::spawn_current();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..50 {
            let seen = Arc::clone(&seen);
            presenter.run(move || seen.lock().push(i));
        }
        presenter.flush().await;

        assert_eq!(*seen.lock(), (0..50).collect::<Vec<_>>());
    }
}
