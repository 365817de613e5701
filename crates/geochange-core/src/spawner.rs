use std::{future::Future, sync::Arc};

use tokio::{runtime::Handle, sync::Semaphore, task::JoinHandle};

#[derive(Clone)]
pub struct TaskSpawner {
    handle: Handle,
    permits: Arc<Semaphore>,
}

impl TaskSpawner {
    pub fn new(handle: Handle, max_parallel: usize) -> Self {
        Self {
            handle,
            permits: Arc::new(Semaphore::new(max_parallel.max(1))),
        }
    }

    pub fn current(max_parallel: usize) -> Self {
        Self::new(Handle::current(), max_parallel)
    }

    pub fn spawn<F>(&self, fut: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        self.handle.spawn(async move {
            let _permit = permits.acquire_owned().await.ok();
            fut.await
        })
    }

    pub fn spawn_blocking<F, R>(&self, f: F) -> JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.handle.spawn_blocking(f)
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn concurrency_is_capped() {
        let spawner = TaskSpawner::current(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                spawner.spawn(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(spawner.available(), 2);
    }
}
