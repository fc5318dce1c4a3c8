use criterion::{black_box, criterion_group, criterion_main, Criterion};
use edge_filter::core::{Pipeline, ProtectionMode, RateLimiter};
use edge_filter::models::{ClientRequest, Config, RateLimitConfig};
use edge_filter::store::MemoryStore;
use std::sync::Arc;

fn rate_limiter_benchmark(c: &mut Criterion) {
    let limiter = RateLimiter::new(
        Arc::new(MemoryStore::new()),
        RateLimitConfig {
            capacity: 1_000,
            window_seconds: 10,
        },
    );

    let mut i: u64 = 0;
    c.bench_function("rate_limiter_check", |b| {
        b.iter(|| {
            i += 1;
            let key = format!("10.0.{}.{}", (i / 256) % 256, i % 256);
            black_box(tokio_test::block_on(limiter.check(&key)).unwrap())
        })
    });
}

fn pipeline_benchmark(c: &mut Criterion) {
    let config = Config::default();
    let pipeline = Pipeline::new(
        &config,
        ProtectionMode::Enforced(Arc::new(MemoryStore::new())),
        None,
    );
    let denied = ClientRequest {
        country: None,
        client_key: "198.51.100.7".to_string(),
        identity: Some("curl/8.0".to_string()),
    };

    c.bench_function("pipeline_identity_deny", |b| {
        b.iter(|| black_box(tokio_test::block_on(pipeline.evaluate(&denied))))
    });
}

criterion_group!(benches, rate_limiter_benchmark, pipeline_benchmark);
criterion_main!(benches);
