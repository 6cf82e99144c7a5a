//! Boundary Performance Benchmarks
//!
//! The aggregate-validate-decide pipeline runs on every render, so it has to
//! stay cheap:
//! - Aggregation of a handful of sources: well under 1μs per source
//! - Validation of a typical page of records: a few tens of μs
//! - Cache hits in the query client: no I/O, no task spawn
//!
//! Run with: `cargo bench`

#![allow(missing_docs)] // Benchmarks don't need extensive docs
#![allow(clippy::expect_used)] // Benchmarks can use expect for setup

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use marquee_core::catalog::{CatalogRecord, Movie, Paginated};
use marquee_core::{Boundary, FetchResult, QueryKey, ResultAggregator, Schema, SchemaValidator};
use marquee_runtime::{ApiRequest, QueryClient, QueryClientConfig};
use marquee_testing::{ScriptedRepository, ScriptedResponse};
use serde_json::{Value, json};
use std::time::Duration;

fn movie(id: u64) -> Value {
    json!({
        "id": id,
        "title": format!("Movie {id}"),
        "runtime": 90 + id % 60,
        "releaseDate": "2024-05-01",
        "posterUrl": null,
        "genres": [{ "id": 1, "name": "Action" }, { "id": 2, "name": "Drama" }],
    })
}

fn movie_page(count: u64) -> Value {
    json!({
        "items": (1..=count).map(movie).collect::<Vec<_>>(),
        "page": 1,
        "perPage": count,
        "total": count * 4,
    })
}

fn benchmark_aggregation(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregation");

    for sources in [2usize, 5, 10] {
        let results: Vec<FetchResult<Value>> = (0..sources as u64).map(|id| FetchResult::Success(movie(id + 1))).collect();
        let names: Vec<String> = (0..sources).map(|i| format!("source{i}")).collect();

        group.throughput(Throughput::Elements(sources as u64));
        group.bench_with_input(BenchmarkId::new("all_success", sources), &sources, |b, _| {
            b.iter(|| {
                names
                    .iter()
                    .zip(&results)
                    .fold(ResultAggregator::new(), |aggregator, (name, result)| {
                        aggregator.source(name.as_str(), black_box(result))
                    })
                    .aggregate()
            });
        });
    }

    let pending: Vec<FetchResult<Value>> = (0..10)
        .map(|id| if id == 9 { FetchResult::pending() } else { FetchResult::Success(movie(id + 1)) })
        .collect();
    group.bench_function("one_pending_of_10", |b| {
        b.iter(|| {
            pending
                .iter()
                .fold(ResultAggregator::new(), |aggregator, result| aggregator.unnamed(black_box(result)))
                .aggregate()
        });
    });

    group.finish();
}

fn benchmark_validation(c: &mut Criterion) {
    let mut group = c.benchmark_group("validation");
    let schema = Paginated::<Movie>::schema();

    for count in [1u64, 20, 100] {
        let page = movie_page(count);
        group.throughput(Throughput::Elements(count));

        group.bench_with_input(BenchmarkId::new("movie_page_valid", count), &page, |b, page| {
            b.iter(|| SchemaValidator::validate::<Paginated<Movie>>(&schema, black_box(page)));
        });
    }

    let mut invalid = movie_page(20);
    for item in invalid["items"].as_array_mut().expect("items should be an array") {
        item["runtime"] = json!(-5);
        item["title"] = json!("");
    }
    group.bench_function("movie_page_all_invalid_20", |b| {
        b.iter(|| SchemaValidator::violations(&schema, black_box(&invalid)));
    });

    group.finish();
}

fn benchmark_boundary(c: &mut Criterion) {
    let mut group = c.benchmark_group("boundary");
    group.throughput(Throughput::Elements(1));

    let movies = FetchResult::Success(movie_page(20));
    let genres = FetchResult::Success(json!([{ "id": 1, "name": "Action" }]));
    let boundary = Boundary::new(
        Schema::object()
            .field("movies", Paginated::<Movie>::schema())
            .field("genres", Schema::array(marquee_core::catalog::Genre::schema())),
    );

    group.bench_function("aggregate_validate_decide", |b| {
        b.iter(|| {
            let aggregated = ResultAggregator::new()
                .source("movies", black_box(&movies))
                .source("genres", black_box(&genres))
                .aggregate();
            boundary.evaluate::<Value>(&aggregated)
        });
    });

    group.bench_function("query_key_build", |b| {
        b.iter(|| {
            QueryKey::builder(["movies"])
                .param("title", black_box("Alien"))
                .param("year", Value::Null)
                .param("page", 2)
                .build()
        });
    });

    group.finish();
}

fn benchmark_client(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_client");
    group.throughput(Throughput::Elements(1));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime");

    group.bench_function("fresh_cache_hit", |b| {
        let repository = ScriptedRepository::new().on("/genres", ScriptedResponse::ok(json!(["Action"])));
        let client = QueryClient::new(
            repository,
            QueryClientConfig::default().with_stale_time(Duration::from_secs(3600)),
        );
        let key = QueryKey::new(["genres"]);
        let request = ApiRequest::get("/genres");
        runtime.block_on(client.fetch(&key, &request));

        b.to_async(&runtime).iter(|| async {
            black_box(client.fetch(&key, &request).await);
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_aggregation,
    benchmark_validation,
    benchmark_boundary,
    benchmark_client
);
criterion_main!(benches);
