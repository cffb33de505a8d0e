use beanforge::{BeanDefinition, BeanFactory, BeansError, ParamSpec, Value};
use std::sync::{Arc, Mutex};

#[test]
fn singleton_lookups_share_one_instance() {
    struct Config {
        port: u16,
    }

    let factory = BeanFactory::new();
    factory
        .register_bean_definition(
            "config",
            BeanDefinition::of::<Config>()
                .constructor0(|| Config { port: 8080 })
                .build(),
        )
        .unwrap();

    let first = factory.get_bean_as::<Config>("config").unwrap();
    let second = factory.get_bean_as::<Config>("config").unwrap();

    assert_eq!(first.port, 8080);
    assert!(Arc::ptr_eq(&first, &second));
    factory.destroy_singletons();
}

#[test]
fn constructor_dependencies_are_wired_by_type() {
    struct Config {
        port: u16,
    }

    struct Server {
        config: Arc<Config>,
        name: String,
    }

    let factory = BeanFactory::new();
    factory
        .register_bean_definition(
            "config",
            BeanDefinition::of::<Config>()
                .constructor0(|| Config { port: 8080 })
                .build(),
        )
        .unwrap();
    factory
        .register_bean_definition(
            "server",
            BeanDefinition::of::<Server>()
                .constructor(
                    vec![ParamSpec::of::<Config>(), ParamSpec::of::<String>()],
                    |args| {
                        Ok(Server {
                            config: args.arg::<Config>(0)?,
                            name: args.arg_value::<String>(1)?,
                        })
                    },
                )
                .arg_indexed(1, Value::string("edge"))
                .build(),
        )
        .unwrap();

    let server = factory.get_bean_as::<Server>("server").unwrap();
    assert_eq!(server.config.port, 8080);
    assert_eq!(server.name, "edge");
    factory.destroy_singletons();
}

#[test]
fn prototypes_are_created_per_request() {
    struct Ticket {
        serial: u64,
    }

    let counter = Arc::new(Mutex::new(0u64));
    let factory = BeanFactory::new();
    let tick = counter.clone();
    factory
        .register_bean_definition(
            "ticket",
            BeanDefinition::of::<Ticket>()
                .constructor0(move || {
                    let mut n = tick.lock().unwrap();
                    *n += 1;
                    Ticket { serial: *n }
                })
                .prototype()
                .build(),
        )
        .unwrap();

    let a = factory.get_bean_as::<Ticket>("ticket").unwrap();
    let b = factory.get_bean_as::<Ticket>("ticket").unwrap();
    let c = factory.get_bean_as::<Ticket>("ticket").unwrap();

    assert_eq!(a.serial, 1);
    assert_eq!(b.serial, 2);
    assert_eq!(c.serial, 3);
    assert!(!Arc::ptr_eq(&a, &b));
    assert!(!Arc::ptr_eq(&b, &c));
}

#[test]
fn unknown_names_are_reported() {
    let factory = BeanFactory::new();
    match factory.get_bean("unregistered") {
        Err(BeansError::NoSuchBean(name)) => assert_eq!(name, "unregistered"),
        other => panic!("expected NoSuchBean, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn reported_types_follow_the_definition() {
    struct Config;

    let factory = BeanFactory::new();
    factory
        .register_bean_definition(
            "config",
            BeanDefinition::of::<Config>().constructor0(|| Config).build(),
        )
        .unwrap();
    factory.register_singleton("opaque", Arc::new(42u32)).unwrap();

    assert_eq!(
        factory.get_type("config").unwrap(),
        Some(beanforge::key_of::<Config>())
    );
    assert_eq!(factory.get_type("opaque").unwrap(), None);
    assert!(matches!(
        factory.get_type("missing"),
        Err(BeansError::NoSuchBean(_))
    ));
}

#[test]
fn wrong_type_requests_are_reported() {
    struct Config;

    let factory = BeanFactory::new();
    factory
        .register_bean_definition(
            "config",
            BeanDefinition::of::<Config>().constructor0(|| Config).build(),
        )
        .unwrap();

    assert!(matches!(
        factory.get_bean_as::<String>("config"),
        Err(BeansError::BeanNotOfRequiredType { .. })
    ));
    factory.destroy_singletons();
}

#[test]
fn redefining_a_name_replaces_the_definition() {
    struct Level(u32);

    let factory = BeanFactory::new();
    factory
        .register_bean_definition(
            "level",
            BeanDefinition::of::<Level>().constructor0(|| Level(1)).build(),
        )
        .unwrap();
    assert_eq!(factory.get_bean_as::<Level>("level").unwrap().0, 1);

    factory
        .register_bean_definition(
            "level",
            BeanDefinition::of::<Level>().constructor0(|| Level(2)).build(),
        )
        .unwrap();
    assert_eq!(factory.get_bean_as::<Level>("level").unwrap().0, 2);
    factory.destroy_singletons();
}

#[test]
fn shared_dependencies_resolve_to_the_same_instance() {
    struct Pool {
        size: usize,
    }

    struct Reader {
        pool: Arc<Pool>,
    }

    struct Writer {
        pool: Arc<Pool>,
        reader: Arc<Reader>,
    }

    let factory = BeanFactory::new();
    factory
        .register_bean_definition(
            "pool",
            BeanDefinition::of::<Pool>()
                .constructor0(|| Pool { size: 4 })
                .build(),
        )
        .unwrap();
    factory
        .register_bean_definition(
            "reader",
            BeanDefinition::of::<Reader>()
                .constructor(vec![ParamSpec::of::<Pool>()], |args| {
                    Ok(Reader {
                        pool: args.arg::<Pool>(0)?,
                    })
                })
                .build(),
        )
        .unwrap();
    factory
        .register_bean_definition(
            "writer",
            BeanDefinition::of::<Writer>()
                .constructor(
                    vec![ParamSpec::of::<Pool>(), ParamSpec::of::<Reader>()],
                    |args| {
                        Ok(Writer {
                            pool: args.arg::<Pool>(0)?,
                            reader: args.arg::<Reader>(1)?,
                        })
                    },
                )
                .build(),
        )
        .unwrap();

    let writer = factory.get_bean_as::<Writer>("writer").unwrap();
    assert_eq!(writer.pool.size, 4);
    assert!(Arc::ptr_eq(&writer.pool, &writer.reader.pool));
    factory.destroy_singletons();
}

#[test]
fn configured_string_values_convert_to_the_declared_type() {
    struct Limits {
        max_conns: u32,
        label: String,
    }

    let factory = BeanFactory::new();
    factory
        .register_bean_definition(
            "limits",
            BeanDefinition::of::<Limits>()
                .constructor(
                    vec![ParamSpec::of::<u32>(), ParamSpec::of::<String>()],
                    |args| {
                        Ok(Limits {
                            max_conns: args.arg_value::<u32>(0)?,
                            label: args.arg_value::<String>(1)?,
                        })
                    },
                )
                .arg_indexed(0, Value::string("64"))
                .arg_indexed(1, Value::string("primary"))
                .build(),
        )
        .unwrap();

    let limits = factory.get_bean_as::<Limits>("limits").unwrap();
    assert_eq!(limits.max_conns, 64);
    assert_eq!(limits.label, "primary");
    factory.destroy_singletons();
}

#[test]
fn embedded_placeholders_resolve_before_conversion() {
    struct Endpoint {
        url: String,
    }

    let factory = BeanFactory::new();
    factory.add_embedded_value_resolver(|value| {
        Some(value.replace("${host}", "db.internal"))
    });
    factory
        .register_bean_definition(
            "endpoint",
            BeanDefinition::of::<Endpoint>()
                .constructor(vec![ParamSpec::of::<String>()], |args| {
                    Ok(Endpoint {
                        url: args.arg_value::<String>(0)?,
                    })
                })
                .arg(Value::string("postgres://${host}:5432"))
                .build(),
        )
        .unwrap();

    let endpoint = factory.get_bean_as::<Endpoint>("endpoint").unwrap();
    assert_eq!(endpoint.url, "postgres://db.internal:5432");
    factory.destroy_singletons();
}

#[test]
fn explicit_arguments_override_configured_ones() {
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

    let explicit = factory
        .get_bean_with_args("greeting", vec![Value::of("goodbye".to_string())])
        .unwrap();
    let explicit = beanforge::bean_as::<Greeting>(&explicit).unwrap();
    assert_eq!(explicit.text, "goodbye");
}
