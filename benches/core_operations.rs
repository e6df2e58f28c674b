use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use smaragda::genus::{AttrType, Attribute, StateDef};
use smaragda::types::AttributeValue;
use smaragda::Smaragda;
use std::time::Duration;
use tokio::runtime::Runtime;

async fn open_with_server_genus() -> (tempfile::TempDir, Smaragda, smaragda::Id) {
    let dir = tempfile::tempdir().unwrap();
    let kernel = Smaragda::open(dir.path()).await.unwrap();
    let genus = kernel
        .registry()
        .define_entity_genus(
            "Server",
            None,
            vec![Attribute::new("hostname", AttrType::Text, true)],
            vec![StateDef {
                name: "active".into(),
                initial: true,
            }],
            vec![],
        )
        .unwrap();
    (dir, kernel, genus)
}

/// Benchmark: kernel open (WAL replay on an empty log).
fn bench_database_init(c: &mut Criterion) {
    c.bench_function("database_init", |b| {
        b.to_async(Runtime::new().unwrap()).iter(|| async {
            let dir = tempfile::tempdir().unwrap();
            black_box(Smaragda::open(dir.path()).await.unwrap())
        })
    });
}

/// Benchmark: a single `create_entity` (initial-status tessella + one attribute-set tessella).
fn bench_create_entity_single(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let (_dir, kernel, genus) = rt.block_on(open_with_server_genus());

    c.bench_function("create_entity_single", |b| {
        b.to_async(Runtime::new().unwrap()).iter(|| async {
            black_box(
                kernel
                    .mutator()
                    .create_entity(
                        genus,
                        kernel.main_branch(),
                        vec![("hostname".to_string(), AttributeValue::Text("db-1".into()))],
                        None,
                        None,
                    )
                    .await
                    .unwrap(),
            )
        })
    });
}

/// Benchmark: sequential `create_entity` calls against a growing log.
fn bench_create_entity_sequential(c: &mut Criterion) {
    let mut group = c.benchmark_group("create_entity_sequential");

    for size in [10, 100, 1000] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.to_async(Runtime::new().unwrap()).iter(|| async {
                let (_dir, kernel, genus) = open_with_server_genus().await;
                for i in 0..size {
                    kernel
                        .mutator()
                        .create_entity(
                            genus,
                            kernel.main_branch(),
                            vec![(
                                "hostname".to_string(),
                                AttributeValue::Text(format!("host-{i}")),
                            )],
                            None,
                            None,
                        )
                        .await
                        .unwrap();
                }
            });
        });
    }
    group.finish();
}

/// Benchmark: materializing a single res after one mutation.
fn bench_materialize_single(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let (_dir, kernel, genus) = rt.block_on(open_with_server_genus());
    let (res_id, _) = rt.block_on(kernel.mutator().create_entity(
        genus,
        kernel.main_branch(),
        vec![("hostname".to_string(), AttributeValue::Text("db-1".into()))],
        None,
        None,
    )).unwrap();

    c.bench_function("materialize_single", |b| {
        b.to_async(Runtime::new().unwrap()).iter(|| async {
            black_box(
                kernel
                    .branches()
                    .materialize_chain(kernel.store(), res_id, kernel.main_branch())
                    .unwrap(),
            )
        })
    });
}

/// Benchmark: materializing one res out of a growing log of unrelated res.
fn bench_materialize_from_dataset(c: &mut Criterion) {
    let mut group = c.benchmark_group("materialize_from_dataset");

    for dataset_size in [100, 1000, 10000] {
        let rt = Runtime::new().unwrap();
        let (_dir, kernel, genus, target) = rt.block_on(async {
            let (dir, kernel, genus) = open_with_server_genus().await;
            let mut target = None;
            for i in 0..dataset_size {
                let (res_id, _) = kernel
                    .mutator()
                    .create_entity(
                        genus,
                        kernel.main_branch(),
                        vec![(
                            "hostname".to_string(),
                            AttributeValue::Text(format!("host-{i}")),
                        )],
                        None,
                        None,
                    )
                    .await
                    .unwrap();
                if i == dataset_size / 2 {
                    target = Some(res_id);
                }
            }
            (dir, kernel, genus, target.unwrap())
        });
        let _ = genus;

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::from_parameter(dataset_size),
            &dataset_size,
            |b, _| {
                b.to_async(Runtime::new().unwrap()).iter(|| async {
                    black_box(
                        kernel
                            .branches()
                            .materialize_chain(kernel.store(), target, kernel.main_branch())
                            .unwrap(),
                    )
                })
            },
        );
    }
    group.finish();
}

/// Benchmark: raw history retrieval with a varying tessella count on one res.
fn bench_history(c: &mut Criterion) {
    let mut group = c.benchmark_group("history");

    for tessella_count in [10, 50, 100] {
        let rt = Runtime::new().unwrap();
        let (_dir, kernel, genus, res_id) = rt.block_on(async {
            let (dir, kernel, genus) = open_with_server_genus().await;
            let (res_id, _) = kernel
                .mutator()
                .create_entity(genus, kernel.main_branch(), vec![], None, None)
                .await
                .unwrap();
            for i in 0..tessella_count {
                kernel
                    .mutator()
                    .set_attribute(
                        res_id,
                        kernel.main_branch(),
                        "hostname".to_string(),
                        AttributeValue::Text(format!("host-{i}")),
                        None,
                    )
                    .await
                    .unwrap();
            }
            (dir, kernel, genus, res_id)
        });
        let _ = genus;

        group.throughput(Throughput::Elements(tessella_count as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(tessella_count),
            &tessella_count,
            |b, _| {
                b.to_async(Runtime::new().unwrap())
                    .iter(|| async { black_box(kernel.query().get_history(res_id, false)) })
            },
        );
    }
    group.finish();
}

/// Benchmark: repeated `set_attribute` calls on the same res (WAL append cost).
fn bench_set_attribute_sequential(c: &mut Criterion) {
    let mut group = c.benchmark_group("set_attribute_sequential");

    for update_count in [10, 50, 100] {
        group.throughput(Throughput::Elements(update_count as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(update_count),
            &update_count,
            |b, &count| {
                b.to_async(Runtime::new().unwrap()).iter(|| async {
                    let (_dir, kernel, genus) = open_with_server_genus().await;
                    let (res_id, _) = kernel
                        .mutator()
                        .create_entity(genus, kernel.main_branch(), vec![], None, None)
                        .await
                        .unwrap();
                    for i in 0..count {
                        kernel
                            .mutator()
                            .set_attribute(
                                res_id,
                                kernel.main_branch(),
                                "hostname".to_string(),
                                AttributeValue::Text(format!("host-{i}")),
                                None,
                            )
                            .await
                            .unwrap();
                    }
                });
            },
        );
    }
    group.finish();
}

/// Benchmark: `list_entities` over a varying number of res.
fn bench_list_entities(c: &mut Criterion) {
    let mut group = c.benchmark_group("list_entities");

    for res_count in [10, 100, 1000] {
        let rt = Runtime::new().unwrap();
        let (_dir, kernel, genus) = rt.block_on(async {
            let (dir, kernel, genus) = open_with_server_genus().await;
            for i in 0..res_count {
                kernel
                    .mutator()
                    .create_entity(
                        genus,
                        kernel.main_branch(),
                        vec![(
                            "hostname".to_string(),
                            AttributeValue::Text(format!("host-{i}")),
                        )],
                        None,
                        None,
                    )
                    .await
                    .unwrap();
            }
            (dir, kernel, genus)
        });

        group.bench_function(BenchmarkId::new("compact", res_count), |b| {
            b.to_async(Runtime::new().unwrap()).iter(|| async {
                black_box(
                    kernel
                        .query()
                        .list_entities(Some(genus), kernel.main_branch(), None, true)
                        .unwrap(),
                )
            })
        });
    }
    group.finish();
}

/// Benchmark: `get_health` over a growing dataset of a single genus.
fn bench_get_health(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_health");

    for res_count in [100, 1000, 5000] {
        let rt = Runtime::new().unwrap();
        let (_dir, kernel, genus, sample) = rt.block_on(async {
            let (dir, kernel, genus) = open_with_server_genus().await;
            let mut sample = None;
            for i in 0..res_count {
                let (res_id, _) = kernel
                    .mutator()
                    .create_entity(
                        genus,
                        kernel.main_branch(),
                        vec![(
                            "hostname".to_string(),
                            AttributeValue::Text(format!("host-{i}")),
                        )],
                        None,
                        None,
                    )
                    .await
                    .unwrap();
                if i == 0 {
                    sample = Some(res_id);
                }
            }
            (dir, kernel, genus, sample.unwrap())
        });

        group.throughput(Throughput::Elements(res_count as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(res_count),
            &res_count,
            |b, _| {
                b.to_async(Runtime::new().unwrap()).iter(|| async {
                    let state = kernel
                        .branches()
                        .materialize_chain(kernel.store(), sample, kernel.main_branch())
                        .unwrap();
                    black_box(smaragda::materializer::get_health(kernel.registry(), genus, &state).unwrap())
                })
            },
        );
    }
    group.finish();
}

// Configure Criterion for faster benchmarks while maintaining accuracy
// - Reduced warm-up time: 1s (vs default 3s)
// - Reduced measurement time: 3s (vs default 5s)
// - Sample size: 50 (vs default 100)
// This gives ~4x speedup while still providing reliable measurements
fn configure_criterion() -> Criterion {
    Criterion::default()
        .warm_up_time(Duration::from_secs(1))
        .measurement_time(Duration::from_secs(3))
        .sample_size(50)
}

criterion_group! {
    name = benches;
    config = configure_criterion();
    targets = bench_database_init,
        bench_create_entity_single,
        bench_create_entity_sequential,
        bench_materialize_single,
        bench_materialize_from_dataset,
        bench_history,
        bench_set_attribute_sequential,
        bench_list_entities,
        bench_get_health
}

criterion_main!(benches);
