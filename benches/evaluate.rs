//! Benchmarks for filter chain evaluation.
//!
//! Measures the cost of the coordinator operations a host pays on every protected region
//! and every exception:
//! - Push/pop of a single registration
//! - First evaluation of a chain (predicates invoked)
//! - Memoized queries from outer catch sites
//! - Scoped regions via `protect`

extern crate filterscope;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use filterscope::{FilterConfig, FilterCoordinator, FilterRc, FilterRegistration};
use std::{hint::black_box, rc::Rc};

/// Build `depth` registrations that all decline, pushed outermost first.
fn declining_chain(coordinator: &FilterCoordinator<str>, depth: usize) -> Vec<FilterRc<str>> {
    let filters: Vec<_> = (0..depth)
        .map(|_| FilterRegistration::<str>::when(|msg| msg.is_empty()))
        .collect();
    for filter in &filters {
        coordinator.push(filter);
    }
    filters
}

/// Benchmark entering and leaving one protected region.
fn bench_push_pop(c: &mut Criterion) {
    let coordinator = FilterCoordinator::<str>::new();
    let filter = FilterRegistration::<str>::when(|_| true);

    c.bench_function("push_pop", |b| {
        b.iter(|| {
            coordinator.push(black_box(&filter));
            coordinator.pop(black_box(&filter))
        });
    });
}

/// Benchmark the full walk for an exception no predicate accepts.
fn bench_evaluate_no_handler(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate_no_handler");
    for depth in [1usize, 8, 64] {
        let coordinator = FilterCoordinator::<str>::new();
        let filters = declining_chain(&coordinator, depth);
        let top = &filters[depth - 1];

        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.iter(|| {
                let exception: Rc<str> = Rc::from("unhandled");
                let run = coordinator.should_run_handler(black_box(&exception), top);
                coordinator.reset();
                run
            });
        });
    }
    group.finish();
}

/// Benchmark the memoized query outer catch sites make after the first walk.
fn bench_memoized_query(c: &mut Criterion) {
    let coordinator = FilterCoordinator::<str>::new();
    let filters = declining_chain(&coordinator, 16);
    let exception: Rc<str> = Rc::from("unhandled");
    let _ = coordinator.should_run_handler(&exception, &filters[15]);

    c.bench_function("memoized_query", |b| {
        b.iter(|| coordinator.should_run_handler(black_box(&exception), &filters[0]));
    });
}

/// Benchmark evaluation with the membership check and tracing disabled.
fn bench_evaluate_minimal_config(c: &mut Criterion) {
    let coordinator = FilterCoordinator::<str>::with_config(FilterConfig::minimal());
    let filters = declining_chain(&coordinator, 8);

    c.bench_function("evaluate_minimal_config", |b| {
        b.iter(|| {
            let exception: Rc<str> = Rc::from("unhandled");
            let run = coordinator.should_run_handler(black_box(&exception), &filters[7]);
            coordinator.reset();
            run
        });
    });
}

/// Benchmark a protected region whose body raises and whose filter selects the handler.
fn bench_protect_handled(c: &mut Criterion) {
    let coordinator = FilterCoordinator::<str>::new();
    let filter = FilterRegistration::<str>::when(|msg| msg.starts_with("io"));

    c.bench_function("protect_handled", |b| {
        b.iter(|| {
            coordinator.protect(
                black_box(&filter),
                || Err(Rc::from("io: broken pipe")),
                |exception| Ok(exception.len()),
            )
        });
    });
}

criterion_group!(
    benches,
    bench_push_pop,
    bench_evaluate_no_handler,
    bench_memoized_query,
    bench_evaluate_minimal_config,
    bench_protect_handled,
);
criterion_main!(benches);
