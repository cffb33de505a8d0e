use beanforge::{BeanDefinition, BeanFactory, BeansError, ParamSpec, Value};
use std::sync::{Arc, Mutex};

struct Db;
struct Cache;

#[test]
fn the_widest_satisfiable_constructor_wins() {
    struct Service {
        db: Option<Arc<Db>>,
        cache: Option<Arc<Cache>>,
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
            "cache",
            BeanDefinition::of::<Cache>().constructor0(|| Cache).build(),
        )
        .unwrap();
    factory
        .register_bean_definition(
            "service",
            BeanDefinition::of::<Service>()
                .constructor(vec![ParamSpec::of::<Db>()], |args| {
                    Ok(Service {
                        db: Some(args.arg::<Db>(0)?),
                        cache: None,
                    })
                })
                .constructor(
                    vec![ParamSpec::of::<Db>(), ParamSpec::of::<Cache>()],
                    |args| {
                        Ok(Service {
                            db: Some(args.arg::<Db>(0)?),
                            cache: Some(args.arg::<Cache>(1)?),
                        })
                    },
                )
                .build(),
        )
        .unwrap();

    let service = factory.get_bean_as::<Service>("service").unwrap();
    assert!(service.db.is_some());
    assert!(service.cache.is_some());
}

#[test]
fn exact_matches_outrank_converted_arguments() {
    struct Port {
        display: String,
    }

    let factory = BeanFactory::new();
    factory
        .register_bean_definition(
            "port",
            BeanDefinition::of::<Port>()
                .constructor(vec![ParamSpec::of::<u16>()], |args| {
                    Ok(Port {
                        display: format!("u16:{}", args.arg_value::<u16>(0)?),
                    })
                })
                .constructor(vec![ParamSpec::of::<String>()], |args| {
                    Ok(Port {
                        display: format!("str:{}", args.arg_value::<String>(0)?),
                    })
                })
                .arg(Value::string("8080"))
                .build(),
        )
        .unwrap();

    let port = factory.get_bean_as::<Port>("port").unwrap();
    assert_eq!(port.display, "str:8080");
}

#[test]
fn indexed_arguments_pin_specific_slots() {
    struct Endpoint {
        db: Arc<Db>,
        host: String,
        retries: u32,
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
            "endpoint",
            BeanDefinition::of::<Endpoint>()
                .constructor(
                    vec![
                        ParamSpec::of::<Db>(),
                        ParamSpec::of::<String>(),
                        ParamSpec::of::<u32>(),
                    ],
                    |args| {
                        Ok(Endpoint {
                            db: args.arg::<Db>(0)?,
                            host: args.arg_value::<String>(1)?,
                            retries: args.arg_value::<u32>(2)?,
                        })
                    },
                )
                .arg_indexed(1, Value::string("db.internal"))
                .arg_indexed(2, Value::of(4u32))
                .build(),
        )
        .unwrap();

    let endpoint = factory.get_bean_as::<Endpoint>("endpoint").unwrap();
    assert_eq!(endpoint.host, "db.internal");
    assert_eq!(endpoint.retries, 4);
    assert!(Arc::ptr_eq(
        &endpoint.db,
        &factory.get_bean_as::<Db>("db").unwrap()
    ));
}

#[test]
fn named_arguments_bind_by_parameter_name() {
    struct Login {
        user: String,
        role: String,
    }

    let factory = BeanFactory::new();
    factory
        .register_bean_definition(
            "login",
            BeanDefinition::of::<Login>()
                .constructor(
                    vec![
                        ParamSpec::of::<String>().named("user"),
                        ParamSpec::of::<String>().named("role"),
                    ],
                    |args| {
                        Ok(Login {
                            user: args.arg_value::<String>(0)?,
                            role: args.arg_value::<String>(1)?,
                        })
                    },
                )
                .arg_named("role", Value::string("admin"))
                .arg_named("user", Value::string("ada"))
                .build(),
        )
        .unwrap();

    let login = factory.get_bean_as::<Login>("login").unwrap();
    assert_eq!(login.user, "ada");
    assert_eq!(login.role, "admin");
}

#[test]
fn static_factory_methods_build_the_product() {
    struct Channel {
        capacity: usize,
    }

    let factory = BeanFactory::new();
    factory
        .register_bean_definition(
            "channel",
            BeanDefinition::of::<Channel>()
                .static_factory("bounded", vec![ParamSpec::of::<usize>()], |args| {
                    Ok(Channel {
                        capacity: args.arg_value::<usize>(0)?,
                    })
                })
                .arg(Value::of(32usize))
                .build(),
        )
        .unwrap();

    let channel = factory.get_bean_as::<Channel>("channel").unwrap();
    assert_eq!(channel.capacity, 32);
}

#[test]
fn instance_factory_methods_run_on_their_owner() {
    struct ConnectionPool {
        url: String,
    }

    struct Connection {
        url: String,
    }

    let factory = BeanFactory::new();
    factory
        .register_bean_definition(
            "pool",
            BeanDefinition::of::<ConnectionPool>()
                .constructor0(|| ConnectionPool {
                    url: "postgres://db".into(),
                })
                .build(),
        )
        .unwrap();
    factory
        .register_bean_definition(
            "connection",
            BeanDefinition::of::<Connection>()
                .instance_factory::<ConnectionPool, _>(
                    "pool",
                    "open",
                    Vec::new(),
                    |pool, _args| {
                        Ok(Connection {
                            url: pool.url.clone(),
                        })
                    },
                )
                .build(),
        )
        .unwrap();

    let connection = factory.get_bean_as::<Connection>("connection").unwrap();
    assert_eq!(connection.url, "postgres://db");
    assert!(factory.contains_singleton("pool"));
}

#[test]
fn equally_weighted_overloads_are_ambiguous() {
    struct Service;

    let factory = BeanFactory::new();
    factory
        .register_bean_definition(
            "db",
            BeanDefinition::of::<Db>().constructor0(|| Db).build(),
        )
        .unwrap();
    factory
        .register_bean_definition(
            "cache",
            BeanDefinition::of::<Cache>().constructor0(|| Cache).build(),
        )
        .unwrap();
    factory
        .register_bean_definition(
            "service",
            BeanDefinition::of::<Service>()
                .constructor(vec![ParamSpec::of::<Db>()], |_| Ok(Service))
                .constructor(vec![ParamSpec::of::<Cache>()], |_| Ok(Service))
                .build(),
        )
        .unwrap();

    let err = factory.get_bean("service").unwrap_err();
    assert!(matches!(err, BeansError::CreationFailure { .. }));
    assert!(format!("{}", err).contains("ambiguous"));
}

#[test]
fn prototypes_replay_the_resolved_constructor() {
    struct Job {
        variant: &'static str,
        serial: u32,
    }

    let counter = Arc::new(Mutex::new(0u32));
    let factory = BeanFactory::new();
    factory
        .register_bean_definition(
            "db",
            BeanDefinition::of::<Db>().constructor0(|| Db).build(),
        )
        .unwrap();
    let seed = counter.clone();
    factory
        .register_bean_definition(
            "job",
            BeanDefinition::of::<Job>()
                .constructor0(|| Job {
                    variant: "narrow",
                    serial: 0,
                })
                .constructor(vec![ParamSpec::of::<Db>()], move |args| {
                    args.arg::<Db>(0)?;
                    let mut count = seed.lock().unwrap();
                    *count += 1;
                    Ok(Job {
                        variant: "wide",
                        serial: *count,
                    })
                })
                .prototype()
                .build(),
        )
        .unwrap();

    let first = factory.get_bean_as::<Job>("job").unwrap();
    let second = factory.get_bean_as::<Job>("job").unwrap();

    assert_eq!(first.variant, "wide");
    assert_eq!(second.variant, "wide");
    assert_eq!(first.serial, 1);
    assert_eq!(second.serial, 2);
}

#[test]
fn explicit_arguments_bypass_the_replay_cache() {
    struct Greeting {
        text: String,
    }

    let factory = BeanFactory::new();
    factory
        .register_bean_definition(
            "greeting",
            BeanDefinition::of::<Greeting>()
                .constructor(vec![ParamSpec::of::<String>()], |args| {
                    Ok(Greeting {
                        text: args.arg_value::<String>(0)?,
                    })
                })
                .arg(Value::string("hello"))
                .prototype()
                .build(),
        )
        .unwrap();

    let configured = factory.get_bean_as::<Greeting>("greeting").unwrap();
    assert_eq!(configured.text, "hello");

    let overridden = factory
        .get_bean_with_args("greeting", vec![Value::of("goodbye".to_string())])
        .unwrap();
    let overridden = beanforge::bean_as::<Greeting>(&overridden).unwrap();
    assert_eq!(overridden.text, "goodbye");

    let replayed = factory.get_bean_as::<Greeting>("greeting").unwrap();
    assert_eq!(replayed.text, "hello");
}

#[test]
fn missing_dependencies_surface_the_failing_parameter() {
    struct Service {
        _db: Arc<Db>,
    }

    let factory = BeanFactory::new();
    factory
        .register_bean_definition(
            "service",
            BeanDefinition::of::<Service>()
                .constructor(vec![ParamSpec::of::<Db>()], |args| {
                    Ok(Service {
                        _db: args.arg::<Db>(0)?,
                    })
                })
                .build(),
        )
        .unwrap();

    let err = factory.get_bean("service").unwrap_err();
    assert!(format!("{:?}", err).contains("constructor parameter 0"));
}
