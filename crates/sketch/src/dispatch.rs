//! Bounded pools for network and decode work.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Limits how much fetch and decode work runs at once. Fetches run on the
/// async runtime; decodes run on the blocking thread pool.
#[derive(Clone, Debug)]
pub struct Dispatchers {
    network: Arc<Semaphore>,
    decode: Arc<Semaphore>,
}

impl Dispatchers {
    pub fn new(network_parallelism: usize, decode_parallelism: usize) -> Self {
        Self {
            network: Arc::new(Semaphore::new(network_parallelism)),
            decode: Arc::new(Semaphore::new(decode_parallelism)),
        }
    }

    /// Run `future` once a network slot is free.
    pub async fn network<F: Future>(&self, future: F) -> Result<F::Output> {
        let _permit = self.network.acquire().await.or_raise(|| ErrorKind::Internal("network pool closed".to_string()))?;
        Ok(future.await)
    }

    /// Run blocking `f` on the blocking pool once a decode slot is free.
    pub async fn decode<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .decode
            .clone()
            .acquire_owned()
            .await
            .or_raise(|| ErrorKind::Internal("decode pool closed".to_string()))?;
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            f()
        })
        .await
        .or_raise(|| ErrorKind::Internal("decode task failed".to_string()))
    }

    pub fn available_network(&self) -> usize {
        self.network.available_permits()
    }

    pub fn available_decode(&self) -> usize {
        self.decode.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_decode_parallelism() {
        let dispatchers = Dispatchers::new(1, 2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let tasks: Vec<_> = (0..6)
            .map(|_| {
                let (dispatchers, running, peak) = (dispatchers.clone(), running.clone(), peak.clone());
                tokio::spawn(async move {
                    dispatchers
                        .decode(move || {
                            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            std::thread::sleep(Duration::from_millis(20));
                            running.fetch_sub(1, Ordering::SeqCst);
                        })
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(dispatchers.available_decode(), 2);
    }

    #[tokio::test]
    async fn test_decode_panic() {
        let err = Dispatchers::new(1, 1).decode(|| -> u8 { panic!("boom") }).await.unwrap_err();
        assert!(matches!(*err, ErrorKind::Internal(_)));
    }
}
