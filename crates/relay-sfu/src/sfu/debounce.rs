use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::engine::HandlerFuture;

/// Resettable timer: only the last trigger within `window` runs.
#[derive(Clone)]
pub struct Debouncer {
    window: Duration,
    generation: Arc<AtomicU64>,
    scope: CancellationToken,
}

impl Debouncer {
    pub fn new(window: Duration, scope: CancellationToken) -> Self {
        Self {
            window,
            generation: Arc::new(AtomicU64::new(0)),
            scope,
        }
    }

    /// Restart the countdown; `f` runs once the window passes without another trigger
    pub fn trigger<F>(&self, f: F)
    where
        F: FnOnce() -> HandlerFuture + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let latest = self.generation.clone();
        let scope = self.scope.clone();
        let window = self.window;

        tokio::spawn(async move {
            tokio::select! {
                _ = scope.cancelled() => return,
                _ = tokio::time::sleep(window) => {}
            }

            if latest.load(Ordering::Acquire) == generation {
                f().await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter_trigger(debouncer: &Debouncer, count: &Arc<AtomicUsize>) {
        let count = count.clone();
        debouncer.trigger(move || {
            Box::pin(async move {
                count.fetch_add(1, Ordering::SeqCst);
            })
        });
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_to_one_call() {
        let debouncer = Debouncer::new(Duration::from_millis(100), CancellationToken::new());
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            counter_trigger(&debouncer, &count);
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        counter_trigger(&debouncer, &count);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_scope_suppresses_call() {
        let scope = CancellationToken::new();
        let debouncer = Debouncer::new(Duration::from_millis(100), scope.clone());
        let count = Arc::new(AtomicUsize::new(0));

        counter_trigger(&debouncer, &count);
        scope.cancel();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
