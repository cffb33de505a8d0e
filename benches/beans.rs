use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use beanforge::{BeanDefinition, BeanFactory, ParamSpec};
use std::sync::Arc;

// ===== Micro Benchmarks =====

fn bench_singleton_hit(c: &mut Criterion) {
    struct Config {
        retries: u32,
    }

    let factory = BeanFactory::new();
    factory
        .register_bean_definition(
            "config",
            BeanDefinition::of::<Config>()
                .constructor0(|| Config { retries: 3 })
                .build(),
        )
        .unwrap();

    // Prime the singleton
    let _ = factory.get_bean("config").unwrap();

    c.bench_function("singleton_hit", |b| {
        b.iter(|| {
            let v = factory.get_bean_as::<Config>("config").unwrap();
            black_box(v.retries);
        })
    });
}

fn bench_singleton_cold(c: &mut Criterion) {
    struct ExpensiveToCreate {
        data: Vec<u64>,
    }

    c.bench_function("singleton_cold_expensive", |b| {
        b.iter_batched(
            || {
                let factory = BeanFactory::new();
                factory
                    .register_bean_definition(
                        "expensive",
                        BeanDefinition::of::<ExpensiveToCreate>()
                            .constructor0(|| ExpensiveToCreate {
                                data: (0..1000).collect(),
                            })
                            .build(),
                    )
                    .unwrap();
                factory
            },
            |factory| {
                let v = factory.get_bean_as::<ExpensiveToCreate>("expensive").unwrap();
                black_box(v.data.len());
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_prototype_replay(c: &mut Criterion) {
    struct Db;
    struct Job {
        _db: Arc<Db>,
    }

    let factory = BeanFactory::new();
    factory
        .register_bean_definition(
            "db",
            BeanDefinition::of::<Db>().constructor0(|| Db).build(),
        )
        .unwrap();
    factory
        .register_bean_definition(
            "job",
            BeanDefinition::of::<Job>()
                .constructor(vec![ParamSpec::of::<Db>()], |args| {
                    Ok(Job {
                        _db: args.arg::<Db>(0)?,
                    })
                })
                .prototype()
                .build(),
        )
        .unwrap();

    // Prime the constructor cache
    let _ = factory.get_bean("job").unwrap();

    c.bench_function("prototype_replay_autowired", |b| {
        b.iter(|| {
            let v = factory.get_bean("job").unwrap();
            black_box(v);
        })
    });
}

fn bench_trait_collection(c: &mut Criterion) {
    trait Handler: Send + Sync {
        fn id(&self) -> usize;
    }

    struct Fixed(usize);
    impl Handler for Fixed {
        fn id(&self) -> usize {
            self.0
        }
    }

    let factory = BeanFactory::new();
    for i in 0..8 {
        factory
            .register_bean_definition(
                format!("handler_{}", i),
                BeanDefinition::of::<Fixed>()
                    .constructor0(move || Fixed(i))
                    .implements::<dyn Handler>(|a| a)
                    .build(),
            )
            .unwrap();
    }
    let provider = factory.bean_provider_trait::<dyn Handler>();
    // Prime the singletons
    let _ = provider.iter().unwrap();

    c.bench_function("trait_collection_8", |b| {
        b.iter(|| {
            let all = provider.iter().unwrap();
            black_box(all.len());
        })
    });
}

// ===== Scaling Benchmarks =====

fn bench_by_type_lookup(c: &mut Criterion) {
    struct Marker;

    let mut group = c.benchmark_group("by_type_lookup");
    for definitions in [4usize, 32, 128] {
        let factory = BeanFactory::new();
        for i in 0..definitions {
            factory
                .register_bean_definition(
                    format!("marker_{}", i),
                    BeanDefinition::of::<Marker>().constructor0(|| Marker).build(),
                )
                .unwrap();
        }
        factory.freeze_configuration();
        // Prime the type cache
        let _ = factory.bean_names_of_type::<Marker>();

        group.bench_with_input(
            BenchmarkId::from_parameter(definitions),
            &factory,
            |b, factory| {
                b.iter(|| {
                    let names = factory.bean_names_of_type::<Marker>();
                    black_box(names.len());
                })
            },
        );
    }
    group.finish();
}

fn bench_deep_dependency_chain(c: &mut Criterion) {
    struct Layer0;
    struct Layer1 {
        _inner: Arc<Layer0>,
    }
    struct Layer2 {
        _inner: Arc<Layer1>,
    }
    struct Layer3 {
        _inner: Arc<Layer2>,
    }

    c.bench_function("cold_chain_depth_4", |b| {
        b.iter_batched(
            || {
                let factory = BeanFactory::new();
                factory
                    .register_bean_definition(
                        "l0",
                        BeanDefinition::of::<Layer0>().constructor0(|| Layer0).build(),
                    )
                    .unwrap();
                factory
                    .register_bean_definition(
                        "l1",
                        BeanDefinition::of::<Layer1>()
                            .constructor(vec![ParamSpec::of::<Layer0>()], |args| {
                                Ok(Layer1 {
                                    _inner: args.arg::<Layer0>(0)?,
                                })
                            })
                            .build(),
                    )
                    .unwrap();
                factory
                    .register_bean_definition(
                        "l2",
                        BeanDefinition::of::<Layer2>()
                            .constructor(vec![ParamSpec::of::<Layer1>()], |args| {
                                Ok(Layer2 {
                                    _inner: args.arg::<Layer1>(0)?,
                                })
                            })
                            .build(),
                    )
                    .unwrap();
                factory
                    .register_bean_definition(
                        "l3",
                        BeanDefinition::of::<Layer3>()
                            .constructor(vec![ParamSpec::of::<Layer2>()], |args| {
                                Ok(Layer3 {
                                    _inner: args.arg::<Layer2>(0)?,
                                })
                            })
                            .build(),
                    )
                    .unwrap();
                factory
            },
            |factory| {
                let v = factory.get_bean("l3").unwrap();
                black_box(v);
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(
    benches,
    bench_singleton_hit,
    bench_singleton_cold,
    bench_prototype_replay,
    bench_trait_collection,
    bench_by_type_lookup,
    bench_deep_dependency_chain
);
criterion_main!(benches);
