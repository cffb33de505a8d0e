use beanforge::{
    AfterInitialization, AfterInstantiation, BeanDefinition, BeanFactory, BeanFactoryAware,
    BeanNameAware, BeansError, BeansResult, BeforeInstantiation, ConstructorSelector,
    ConstructorSpec, Initializing, PropertyProcessor, SingletonsInstantiated, Value,
};
use std::sync::{Arc, Mutex, Weak};

type Log = Arc<Mutex<Vec<&'static str>>>;

#[test]
fn properties_apply_before_initialization_callbacks() {
    struct Pool {
        log: Log,
        size: Mutex<u32>,
    }

    impl Initializing for Pool {
        fn after_properties_set(&self) -> BeansResult<()> {
            assert_eq!(*self.size.lock().unwrap(), 8);
            self.log.lock().unwrap().push("init");
            Ok(())
        }
    }

    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let factory = BeanFactory::new();
    let seed = log.clone();
    factory
        .register_bean_definition(
            "pool",
            BeanDefinition::of::<Pool>()
                .constructor0(move || Pool {
                    log: seed.clone(),
                    size: Mutex::new(0),
                })
                .settable_value::<u32, _>("size", |pool, size| {
                    pool.log.lock().unwrap().push("property");
                    *pool.size.lock().unwrap() = size;
                })
                .property("size", Value::of(8u32))
                .initializing()
                .build(),
        )
        .unwrap();

    factory.get_bean("pool").unwrap();
    assert_eq!(log.lock().unwrap().as_slice(), ["property", "init"]);
}

#[test]
fn declared_init_methods_follow_after_properties_set() {
    struct Cache {
        log: Log,
    }

    impl Initializing for Cache {
        fn after_properties_set(&self) -> BeansResult<()> {
            self.log.lock().unwrap().push("init");
            Ok(())
        }
    }

    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let factory = BeanFactory::new();
    let seed = log.clone();
    factory
        .register_bean_definition(
            "cache",
            BeanDefinition::of::<Cache>()
                .constructor0(move || Cache { log: seed.clone() })
                .initializing()
                .init_method("warm", |c: &Cache| {
                    c.log.lock().unwrap().push("warm");
                    Ok(())
                })
                .init_method_name("warm")
                .build(),
        )
        .unwrap();

    factory.get_bean("cache").unwrap();
    assert_eq!(log.lock().unwrap().as_slice(), ["init", "warm"]);
}

#[test]
fn missing_init_methods_are_reported() {
    struct Plain;

    let factory = BeanFactory::new();
    factory
        .register_bean_definition(
            "plain",
            BeanDefinition::of::<Plain>()
                .constructor0(|| Plain)
                .init_method_name("bogus")
                .build(),
        )
        .unwrap();

    let err = factory.get_bean("plain").unwrap_err();
    assert!(matches!(err, BeansError::CreationFailure { .. }));
    assert!(format!("{:?}", err).contains("bogus"));
}

#[test]
fn beans_learn_their_name_and_factory() {
    struct Anchor;

    struct Introspector {
        name: Mutex<Option<String>>,
        factory: Mutex<Option<Weak<BeanFactory>>>,
    }

    impl BeanNameAware for Introspector {
        fn set_bean_name(&self, name: &str) {
            *self.name.lock().unwrap() = Some(name.to_string());
        }
    }

    impl BeanFactoryAware for Introspector {
        fn set_bean_factory(&self, factory: Weak<BeanFactory>) {
            *self.factory.lock().unwrap() = Some(factory);
        }
    }

    let factory = BeanFactory::new();
    factory
        .register_bean_definition(
            "anchor",
            BeanDefinition::of::<Anchor>().constructor0(|| Anchor).build(),
        )
        .unwrap();
    factory
        .register_bean_definition(
            "introspector",
            BeanDefinition::of::<Introspector>()
                .constructor0(|| Introspector {
                    name: Mutex::new(None),
                    factory: Mutex::new(None),
                })
                .bean_name_aware()
                .bean_factory_aware()
                .build(),
        )
        .unwrap();

    let bean = factory.get_bean_as::<Introspector>("introspector").unwrap();
    assert_eq!(bean.name.lock().unwrap().as_deref(), Some("introspector"));

    let held = bean.factory.lock().unwrap().clone().unwrap();
    let upgraded = held.upgrade().unwrap();
    assert!(upgraded.get_bean("anchor").is_ok());
}

#[test]
fn singletons_ready_fires_after_every_eager_bean_exists() {
    struct Primary {
        log: Log,
    }

    impl SingletonsInstantiated for Primary {
        fn after_singletons_instantiated(&self) -> BeansResult<()> {
            self.log.lock().unwrap().push("ready");
            Ok(())
        }
    }

    struct Secondary {
        log: Log,
    }

    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let factory = BeanFactory::new();
    let primary_log = log.clone();
    factory
        .register_bean_definition(
            "primary",
            BeanDefinition::of::<Primary>()
                .constructor0(move || {
                    primary_log.lock().unwrap().push("primary");
                    Primary {
                        log: primary_log.clone(),
                    }
                })
                .singletons_instantiated()
                .build(),
        )
        .unwrap();
    let secondary_log = log.clone();
    factory
        .register_bean_definition(
            "secondary",
            BeanDefinition::of::<Secondary>()
                .constructor0(move || {
                    secondary_log.lock().unwrap().push("secondary");
                    Secondary {
                        log: secondary_log.clone(),
                    }
                })
                .build(),
        )
        .unwrap();

    factory.pre_instantiate_singletons().unwrap();
    assert_eq!(
        log.lock().unwrap().as_slice(),
        ["primary", "secondary", "ready"]
    );
}

#[test]
fn processors_can_replace_the_initialized_bean() {
    struct Greeting {
        text: &'static str,
    }

    struct Uppercaser;

    impl AfterInitialization for Uppercaser {
        fn after_initialization(
            &self,
            bean: beanforge::BeanArc,
            name: &str,
        ) -> BeansResult<beanforge::BeanArc> {
            if name == "greeting" {
                return Ok(Arc::new(Greeting { text: "HELLO" }));
            }
            Ok(bean)
        }
    }

    let factory = BeanFactory::new();
    factory.add_after_initialization(Arc::new(Uppercaser));
    factory
        .register_bean_definition(
            "greeting",
            BeanDefinition::of::<Greeting>()
                .constructor0(|| Greeting { text: "hello" })
                .build(),
        )
        .unwrap();

    let bean = factory.get_bean_as::<Greeting>("greeting").unwrap();
    assert_eq!(bean.text, "HELLO");
}

#[test]
fn before_instantiation_short_circuits_the_pipeline() {
    struct Stub {
        canned: bool,
    }

    struct Canner;

    impl BeforeInstantiation for Canner {
        fn before_instantiation(
            &self,
            _definition: &beanforge::MergedBeanDefinition,
            name: &str,
        ) -> BeansResult<Option<beanforge::BeanArc>> {
            if name == "stub" {
                return Ok(Some(Arc::new(Stub { canned: true })));
            }
            Ok(None)
        }
    }

    let factory = BeanFactory::new();
    factory.add_before_instantiation(Arc::new(Canner));
    factory
        .register_bean_definition(
            "stub",
            BeanDefinition::of::<Stub>()
                .constructor0(|| panic!("constructor must not run"))
                .build(),
        )
        .unwrap();

    let bean = factory.get_bean_as::<Stub>("stub").unwrap();
    assert!(bean.canned);
}

#[test]
fn selectors_override_declared_constructors() {
    struct Engine {
        cylinders: u8,
    }

    struct PreferV8;

    impl ConstructorSelector for PreferV8 {
        fn candidate_constructors(
            &self,
            _definition: &beanforge::MergedBeanDefinition,
            name: &str,
        ) -> BeansResult<Option<Vec<ConstructorSpec>>> {
            if name != "engine" {
                return Ok(None);
            }
            Ok(Some(vec![ConstructorSpec::new(Vec::new(), |_| {
                Ok(Engine { cylinders: 8 })
            })]))
        }
    }

    let factory = BeanFactory::new();
    factory.add_constructor_selector(Arc::new(PreferV8));
    factory
        .register_bean_definition(
            "engine",
            BeanDefinition::of::<Engine>()
                .constructor0(|| Engine { cylinders: 4 })
                .build(),
        )
        .unwrap();
    factory
        .register_bean_definition(
            "spare",
            BeanDefinition::of::<Engine>()
                .constructor0(|| Engine { cylinders: 4 })
                .build(),
        )
        .unwrap();

    let engine = factory.get_bean_as::<Engine>("engine").unwrap();
    assert_eq!(engine.cylinders, 8);
    let spare = factory.get_bean_as::<Engine>("spare").unwrap();
    assert_eq!(spare.cylinders, 4);
}

#[test]
fn vetoing_population_skips_configured_properties() {
    struct Widget {
        label: Mutex<Option<String>>,
    }

    struct Veto;

    impl AfterInstantiation for Veto {
        fn after_instantiation(&self, _bean: &beanforge::BeanArc, _name: &str) -> BeansResult<bool> {
            Ok(false)
        }
    }

    let factory = BeanFactory::new();
    factory.add_after_instantiation(Arc::new(Veto));
    factory
        .register_bean_definition(
            "widget",
            BeanDefinition::of::<Widget>()
                .constructor0(|| Widget {
                    label: Mutex::new(None),
                })
                .settable_value::<String, _>("label", |w, label| {
                    *w.label.lock().unwrap() = Some(label);
                })
                .property("label", Value::string("ignored"))
                .build(),
        )
        .unwrap();

    let bean = factory.get_bean_as::<Widget>("widget").unwrap();
    assert!(bean.label.lock().unwrap().is_none());
}

#[test]
fn property_rewrites_see_the_final_values() {
    struct Dialer {
        number: Mutex<Option<String>>,
    }

    struct Redirect;

    impl PropertyProcessor for Redirect {
        fn process_properties(
            &self,
            mut values: beanforge::PropertyValues,
            _bean: &beanforge::BeanArc,
            name: &str,
        ) -> BeansResult<beanforge::PropertyValues> {
            if name == "dialer" {
                values.add("number", Value::string("911"));
            }
            Ok(values)
        }
    }

    let factory = BeanFactory::new();
    factory.add_property_processor(Arc::new(Redirect));
    factory
        .register_bean_definition(
            "dialer",
            BeanDefinition::of::<Dialer>()
                .constructor0(|| Dialer {
                    number: Mutex::new(None),
                })
                .settable_value::<String, _>("number", |d, number| {
                    *d.number.lock().unwrap() = Some(number);
                })
                .property("number", Value::string("555"))
                .build(),
        )
        .unwrap();

    let bean = factory.get_bean_as::<Dialer>("dialer").unwrap();
    assert_eq!(bean.number.lock().unwrap().as_deref(), Some("911"));
}
