use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use super::Classifier;
use crate::error::{Error, Result};

type Loader = dyn Fn() -> Result<Arc<dyn Classifier>> + Send + Sync;

#[derive(Default)]
struct Slot {
    classifier: Option<Arc<dyn Classifier>>,
    /// Attempt number and error of the most recent failed load.
    last_failure: Option<(u64, Error)>,
}

/// Process-wide classifier, built on first use.
///
/// One load runs at a time. Callers that queue behind a load get its result,
/// success or failure; callers arriving after a failure start a fresh
/// attempt. Once loaded, the classifier is never rebuilt.
#[derive(Clone)]
pub struct ClassifierHandle {
    loader: Arc<Loader>,
    slot: Arc<Mutex<Slot>>,
    attempts: Arc<AtomicU64>,
    loaded: Arc<AtomicBool>,
}

impl ClassifierHandle {
    pub fn new<F>(loader: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn Classifier>> + Send + Sync + 'static,
    {
        Self {
            loader: Arc::new(loader),
            slot: Arc::new(Mutex::new(Slot::default())),
            attempts: Arc::new(AtomicU64::new(0)),
            loaded: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A handle around an already-built classifier.
    pub fn ready(classifier: Arc<dyn Classifier>) -> Self {
        let handle = Self::new({
            let classifier = classifier.clone();
            move || Ok(classifier.clone())
        });
        handle.loaded.store(true, Ordering::Release);
        if let Ok(mut slot) = handle.slot.try_lock() {
            slot.classifier = Some(classifier);
        }
        handle
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    pub async fn get(&self) -> Result<Arc<dyn Classifier>> {
        let seen = self.attempts.load(Ordering::Acquire);
        let mut slot = self.slot.clone().lock_owned().await;

        if let Some(classifier) = &slot.classifier {
            return Ok(classifier.clone());
        }
        if let Some((attempt, err)) = &slot.last_failure {
            if *attempt > seen {
                // A load failed while we were queued behind it.
                return Err(err.clone());
            }
        }

        // The load runs in its own task holding the lock, so a caller that
        // goes away mid-load cannot let a second load start.
        let loader = self.loader.clone();
        let attempts = self.attempts.clone();
        let loaded = self.loaded.clone();
        let task = tokio::spawn(async move {
            log::info!("Loading classifier...");
            let outcome = match tokio::task::spawn_blocking(move || loader()).await {
                Ok(result) => result,
                Err(e) => Err(Error::ClassifierUnavailable(format!("model loader panicked: {}", e))),
            };
            let attempt = attempts.fetch_add(1, Ordering::AcqRel) + 1;

            match outcome {
                Ok(classifier) => {
                    slot.classifier = Some(classifier.clone());
                    slot.last_failure = None;
                    loaded.store(true, Ordering::Release);
                    log::info!("Classifier loaded (attempt {})", attempt);
                    Ok(classifier)
                }
                Err(e) => {
                    let err = match e {
                        Error::ClassifierUnavailable(_) => e,
                        other => Error::ClassifierUnavailable(other.to_string()),
                    };
                    log::warn!("Classifier load attempt {} failed: {}", attempt, err);
                    slot.last_failure = Some((attempt, err.clone()));
                    Err(err)
                }
            }
        });

        task.await
            .map_err(|e| Error::ClassifierUnavailable(format!("model load task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::StubClassifier;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn counting_loader(
        calls: Arc<AtomicUsize>,
        fail: Arc<AtomicBool>,
    ) -> impl Fn() -> Result<Arc<dyn Classifier>> + Send + Sync + 'static {
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(250));
            if fail.load(Ordering::SeqCst) {
                Err(Error::ClassifierUnavailable("model file missing".into()))
            } else {
                Ok(Arc::new(StubClassifier::default()) as Arc<dyn Classifier>)
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_callers_share_one_load() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handle = ClassifierHandle::new(counting_loader(calls.clone(), Arc::new(AtomicBool::new(false))));
        assert!(!handle.is_loaded());

        let waiters: Vec<_> = (0..8)
            .map(|_| {
                let handle = handle.clone();
                tokio::spawn(async move { handle.get().await })
            })
            .collect();
        for waiter in waiters {
            assert!(waiter.await.unwrap().is_ok());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(handle.is_loaded());
        assert!(handle.get().await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn failure_reaches_every_waiter_then_retries() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fail = Arc::new(AtomicBool::new(true));
        let handle = ClassifierHandle::new(counting_loader(calls.clone(), fail.clone()));

        let waiters: Vec<_> = (0..5)
            .map(|_| {
                let handle = handle.clone();
                tokio::spawn(async move { handle.get().await })
            })
            .collect();
        for waiter in waiters {
            let err = waiter.await.unwrap().err().unwrap();
            assert!(matches!(err, Error::ClassifierUnavailable(_)));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!handle.is_loaded());

        // A later request tries again and can succeed.
        fail.store(false, Ordering::SeqCst);
        assert!(handle.get().await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(handle.is_loaded());
    }

    #[tokio::test]
    async fn ready_handle_never_loads() {
        let handle = ClassifierHandle::ready(Arc::new(StubClassifier::default()));
        assert!(handle.is_loaded());
        assert!(handle.get().await.is_ok());
    }
}
