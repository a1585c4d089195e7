//! Registry state machine tests: load dedup, per-key exclusion, drain.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serving_core::models::ModelRegistry;
use serving_core::{
    CapabilityProvider, InvocationError, InvocationItem, LoadState, ModelCapability, ModelCatalog,
    ModelDescriptor, ModelKey, ModelKind, ServeError,
};

struct StubCapability {
    released: Arc<AtomicBool>,
}

#[async_trait]
impl ModelCapability for StubCapability {
    async fn invoke(&self, items: &[InvocationItem]) -> Result<Vec<String>, InvocationError> {
        Ok(items.iter().map(|item| item.payload.clone()).collect())
    }

    async fn release(&self) -> Result<(), InvocationError> {
        self.released.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct StubProvider {
    load_delay: Duration,
    /// Number of initial load attempts that fail.
    fail_first: usize,
    loads: Arc<AtomicUsize>,
    released: Arc<AtomicBool>,
}

impl StubProvider {
    fn instant(loads: Arc<AtomicUsize>) -> Self {
        Self {
            load_delay: Duration::ZERO,
            fail_first: 0,
            loads,
            released: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl CapabilityProvider for StubProvider {
    async fn load(
        &self,
        _descriptor: &ModelDescriptor,
    ) -> Result<Arc<dyn ModelCapability>, InvocationError> {
        let attempt = self.loads.fetch_add(1, Ordering::SeqCst) + 1;
        if self.load_delay > Duration::ZERO {
            tokio::time::sleep(self.load_delay).await;
        }
        if attempt <= self.fail_first {
            return Err(InvocationError::WeightsUnavailable("weights missing".into()));
        }
        Ok(Arc::new(StubCapability {
            released: Arc::clone(&self.released),
        }))
    }
}

fn summarizer_key() -> ModelKey {
    ModelKey::new("summarizer", "v1")
}

fn registry_with(provider: StubProvider) -> Arc<ModelRegistry> {
    let catalog = ModelCatalog::builder()
        .register(ModelDescriptor::new(
            summarizer_key(),
            ModelKind::Summarizer,
            Arc::new(provider),
        ))
        .unwrap()
        .build();
    Arc::new(ModelRegistry::new(Arc::new(catalog)))
}

#[tokio::test]
async fn concurrent_ensure_ready_loads_once() {
    let loads = Arc::new(AtomicUsize::new(0));
    let registry = registry_with(StubProvider {
        load_delay: Duration::from_millis(150),
        fail_first: 0,
        loads: Arc::clone(&loads),
        released: Arc::new(AtomicBool::new(false)),
    });
    let key = summarizer_key();

    let first = {
        let registry = Arc::clone(&registry);
        let key = key.clone();
        tokio::spawn(async move { registry.ensure_ready(&key).await.map(|_| ()) })
    };
    let second = {
        let registry = Arc::clone(&registry);
        let key = key.clone();
        tokio::spawn(async move { registry.ensure_ready(&key).await.map(|_| ()) })
    };

    assert!(first.await.unwrap().is_ok());
    assert!(second.await.unwrap().is_ok());
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(registry.status(&key).unwrap(), LoadState::Ready);
}

#[tokio::test]
async fn unknown_key_fails_without_loader_call() {
    let loads = Arc::new(AtomicUsize::new(0));
    let registry = registry_with(StubProvider::instant(Arc::clone(&loads)));
    let missing = ModelKey::new("missing", "v9");

    let result = registry.ensure_ready(&missing).await.map(|_| ());
    assert_eq!(result, Err(ServeError::ModelNotFound(missing)));
    assert_eq!(loads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_load_parks_entry_and_allows_retry() {
    let loads = Arc::new(AtomicUsize::new(0));
    let registry = registry_with(StubProvider {
        load_delay: Duration::ZERO,
        fail_first: 1,
        loads: Arc::clone(&loads),
        released: Arc::new(AtomicBool::new(false)),
    });
    let key = summarizer_key();

    let first = registry.ensure_ready(&key).await.map(|_| ());
    assert!(matches!(first, Err(ServeError::ModelLoadFailed { .. })));
    assert_eq!(registry.status(&key).unwrap(), LoadState::Failed);
    assert!(registry
        .error_detail(&key)
        .unwrap()
        .contains("weights missing"));

    // A later attempt may retry; the second load succeeds.
    assert!(registry.ensure_ready(&key).await.is_ok());
    assert_eq!(loads.load(Ordering::SeqCst), 2);
    assert_eq!(registry.status(&key).unwrap(), LoadState::Ready);
}

#[tokio::test]
async fn waiter_behind_failing_load_observes_that_outcome() {
    let loads = Arc::new(AtomicUsize::new(0));
    let registry = registry_with(StubProvider {
        load_delay: Duration::from_millis(100),
        fail_first: 1,
        loads: Arc::clone(&loads),
        released: Arc::new(AtomicBool::new(false)),
    });
    let key = summarizer_key();

    let leader = {
        let registry = Arc::clone(&registry);
        let key = key.clone();
        tokio::spawn(async move { registry.ensure_ready(&key).await.map(|_| ()) })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;

    // Arrives mid-load; must report the leader's failure, not retry.
    let waiter = registry.ensure_ready(&key).await.map(|_| ());
    assert!(matches!(waiter, Err(ServeError::ModelLoadFailed { .. })));
    assert!(matches!(
        leader.await.unwrap(),
        Err(ServeError::ModelLoadFailed { .. })
    ));
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unload_of_unloaded_entry_is_a_noop() {
    let loads = Arc::new(AtomicUsize::new(0));
    let registry = registry_with(StubProvider::instant(loads));
    let key = summarizer_key();

    assert_eq!(registry.unload(&key).await, Ok(LoadState::Unloaded));
    assert_eq!(registry.status(&key).unwrap(), LoadState::Unloaded);
}

#[tokio::test]
async fn unload_during_load_reports_busy() {
    let loads = Arc::new(AtomicUsize::new(0));
    let registry = registry_with(StubProvider {
        load_delay: Duration::from_millis(150),
        fail_first: 0,
        loads,
        released: Arc::new(AtomicBool::new(false)),
    });
    let key = summarizer_key();

    let load = {
        let registry = Arc::clone(&registry);
        let key = key.clone();
        tokio::spawn(async move { registry.ensure_ready(&key).await.map(|_| ()) })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert_eq!(
        registry.unload(&key).await,
        Err(ServeError::Busy { key: key.clone() })
    );
    assert!(load.await.unwrap().is_ok());
}

#[tokio::test]
async fn unload_waits_for_in_flight_batches() {
    let loads = Arc::new(AtomicUsize::new(0));
    let released = Arc::new(AtomicBool::new(false));
    let registry = registry_with(StubProvider {
        load_delay: Duration::ZERO,
        fail_first: 0,
        loads,
        released: Arc::clone(&released),
    });
    let key = summarizer_key();

    let ready = registry.ensure_ready(&key).await.unwrap();

    let unload = {
        let registry = Arc::clone(&registry);
        let key = key.clone();
        tokio::spawn(async move { registry.unload(&key).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The handle is still pinned by the in-flight marker.
    assert!(!unload.is_finished());
    assert_eq!(registry.status(&key).unwrap(), LoadState::Unloading);
    assert!(!released.load(Ordering::SeqCst));

    drop(ready);
    assert_eq!(unload.await.unwrap(), Ok(LoadState::Unloaded));
    assert!(released.load(Ordering::SeqCst));
}

#[tokio::test]
async fn unload_ready_entry_releases_capability() {
    let loads = Arc::new(AtomicUsize::new(0));
    let released = Arc::new(AtomicBool::new(false));
    let registry = registry_with(StubProvider {
        load_delay: Duration::ZERO,
        fail_first: 0,
        loads,
        released: Arc::clone(&released),
    });
    let key = summarizer_key();

    drop(registry.ensure_ready(&key).await.unwrap());
    assert_eq!(registry.unload(&key).await, Ok(LoadState::Unloaded));
    assert!(released.load(Ordering::SeqCst));
    assert_eq!(registry.status(&key).unwrap(), LoadState::Unloaded);
}

#[tokio::test]
async fn unload_clears_failed_entry_without_loader_call() {
    let loads = Arc::new(AtomicUsize::new(0));
    let released = Arc::new(AtomicBool::new(false));
    let registry = registry_with(StubProvider {
        load_delay: Duration::ZERO,
        fail_first: 1,
        loads,
        released: Arc::clone(&released),
    });
    let key = summarizer_key();

    assert!(registry.ensure_ready(&key).await.is_err());
    assert_eq!(registry.status(&key).unwrap(), LoadState::Failed);

    assert_eq!(registry.unload(&key).await, Ok(LoadState::Unloaded));
    assert_eq!(registry.status(&key).unwrap(), LoadState::Unloaded);
    assert!(!released.load(Ordering::SeqCst));
}

#[tokio::test]
async fn list_status_follows_catalog_order() {
    let loads = Arc::new(AtomicUsize::new(0));
    let mut builder = ModelCatalog::builder();
    for name in ["summarizer", "sentiment", "generator"] {
        builder = builder
            .register(ModelDescriptor::new(
                ModelKey::new(name, "v1"),
                ModelKind::Other,
                Arc::new(StubProvider::instant(Arc::clone(&loads))),
            ))
            .unwrap();
    }
    let registry = Arc::new(ModelRegistry::new(Arc::new(builder.build())));

    drop(
        registry
            .ensure_ready(&ModelKey::new("sentiment", "v1"))
            .await
            .unwrap(),
    );

    let statuses = registry.list_status();
    let names: Vec<&str> = statuses.iter().map(|(key, _)| key.name()).collect();
    assert_eq!(names, vec!["summarizer", "sentiment", "generator"]);
    assert_eq!(statuses[0].1, LoadState::Unloaded);
    assert_eq!(statuses[1].1, LoadState::Ready);
    assert_eq!(statuses[2].1, LoadState::Unloaded);
    assert_eq!(registry.ready_count(), 1);
}
