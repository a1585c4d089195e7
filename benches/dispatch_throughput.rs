//! Throughput of batched dispatch with an instant echo capability.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serving_core::scheduler::BatchConfig;
use serving_core::{
    CapabilityProvider, InferenceCall, InvocationError, InvocationItem, ModelCapability,
    ModelCatalog, ModelDescriptor, ModelKey, ModelKind, Runtime, RuntimeConfig,
};

struct EchoCapability;

#[async_trait]
impl ModelCapability for EchoCapability {
    async fn invoke(&self, items: &[InvocationItem]) -> Result<Vec<String>, InvocationError> {
        Ok(items.iter().map(|i| i.payload.clone()).collect())
    }
}

struct EchoProvider;

#[async_trait]
impl CapabilityProvider for EchoProvider {
    async fn load(
        &self,
        _descriptor: &ModelDescriptor,
    ) -> Result<Arc<dyn ModelCapability>, InvocationError> {
        Ok(Arc::new(EchoCapability))
    }
}

fn build_runtime(max_batch_size: usize) -> (Runtime, ModelKey) {
    let key = ModelKey::new("generator", "v1");
    let catalog = ModelCatalog::builder()
        .register(ModelDescriptor::new(
            key.clone(),
            ModelKind::Generator,
            Arc::new(EchoProvider),
        ))
        .unwrap()
        .build();
    let runtime = Runtime::new(
        catalog,
        RuntimeConfig {
            batch: BatchConfig {
                max_batch_size,
                batch_timeout: Duration::from_millis(1),
            },
            ..RuntimeConfig::default()
        },
    );
    (runtime, key)
}

fn bench_dispatch(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("dispatch");
    for batch_size in [1usize, 8, 64] {
        let (runtime, key) = build_runtime(batch_size);
        group.throughput(Throughput::Elements(64));
        group.bench_function(BenchmarkId::new("submit_64", batch_size), |b| {
            b.iter(|| {
                rt.block_on(async {
                    let calls: Vec<InferenceCall> = (0..64)
                        .map(|i| InferenceCall {
                            key: key.clone(),
                            text: format!("req-{i}"),
                            params: BTreeMap::new(),
                        })
                        .collect();
                    let results = runtime.infer_batch(calls).await;
                    assert!(results.iter().all(|r| r.is_ok()));
                });
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_dispatch);
criterion_main!(benches);
