//! Server delta fetch benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pairchat_bench::{populated_store, user};
use pairchat_protocol::{DeltaRequest, MessageId};
use pairchat_server::{HandlerContext, RequestHandler, ServerConfig};
use pairchat_store::{InMemoryDirectory, InMemorySummaryStore, MessageStore, SystemClock};
use std::sync::Arc;

fn handler(count: usize, noise: usize) -> RequestHandler {
    let store: Arc<dyn MessageStore> = Arc::new(populated_store(count, noise));
    let context = HandlerContext::new(
        ServerConfig::default(),
        store,
        Arc::new(InMemorySummaryStore::new()),
        Arc::new(InMemoryDirectory::with_users([user("alice"), user("bob"), user("carol")])),
        Arc::new(SystemClock),
    );
    RequestHandler::new(Arc::new(context))
}

/// Benchmark the initial load (newest window) against conversations of growing size.
fn bench_initial_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("delta_initial");

    for count in [100usize, 10_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let handler = handler(count, 1);
            let request = DeltaRequest::new(user("alice"), user("bob"), None);
            b.iter(|| {
                let response = handler
                    .handle_delta(&user("alice"), black_box(request.clone()))
                    .unwrap();
                black_box(response);
            });
        });
    }

    group.finish();
}

/// Benchmark an idle incremental poll at the tail of a large conversation.
fn bench_idle_poll(c: &mut Criterion) {
    let mut group = c.benchmark_group("delta_idle");

    for count in [100usize, 10_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let handler = handler(count, 1);
            let tail = handler
                .context()
                .messages
                .query_latest(&user("alice"), &user("bob"), 1)
                .unwrap()
                .last()
                .map(|m| m.id)
                .unwrap_or(MessageId::new(0));
            let request = DeltaRequest::new(user("alice"), user("bob"), Some(tail));
            b.iter(|| {
                let response = handler
                    .handle_delta(&user("alice"), black_box(request.clone()))
                    .unwrap();
                assert!(response.messages.is_empty());
                black_box(response);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_initial_load, bench_idle_poll);
criterion_main!(benches);
