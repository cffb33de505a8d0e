use beanforge::{
    AfterInitialization, BeanArc, BeanDefinition, BeanFactory, BeansError, BeansResult, ParamSpec,
    Value,
};
use std::sync::{Arc, Mutex};

struct Alpha {
    beta: Mutex<Option<Arc<Beta>>>,
}

struct Beta {
    alpha: Mutex<Option<Arc<Alpha>>>,
}

fn alpha_definition() -> BeanDefinition {
    BeanDefinition::of::<Alpha>()
        .constructor0(|| Alpha {
            beta: Mutex::new(None),
        })
        .settable::<Beta, _>("beta", |alpha, beta| {
            *alpha.beta.lock().unwrap() = Some(beta);
        })
        .property("beta", Value::reference("beta"))
        .build()
}

fn beta_definition() -> BeanDefinition {
    BeanDefinition::of::<Beta>()
        .constructor0(|| Beta {
            alpha: Mutex::new(None),
        })
        .settable::<Alpha, _>("alpha", |beta, alpha| {
            *beta.alpha.lock().unwrap() = Some(alpha);
        })
        .property("alpha", Value::reference("alpha"))
        .build()
}

/// Swaps "alpha" for a fresh instance after initialization, changing the
/// identity other cycle members already captured.
struct ReplaceAlpha;

impl AfterInitialization for ReplaceAlpha {
    fn after_initialization(&self, bean: BeanArc, name: &str) -> BeansResult<BeanArc> {
        if name == "alpha" {
            return Ok(Arc::new(Alpha {
                beta: Mutex::new(None),
            }) as BeanArc);
        }
        Ok(bean)
    }
}

#[test]
fn property_cycles_resolve_through_early_references() {
    let factory = BeanFactory::new();
    factory
        .register_bean_definition("alpha", alpha_definition())
        .unwrap();
    factory
        .register_bean_definition("beta", beta_definition())
        .unwrap();

    let alpha = factory.get_bean_as::<Alpha>("alpha").unwrap();
    let beta = factory.get_bean_as::<Beta>("beta").unwrap();

    let beta_of_alpha = alpha.beta.lock().unwrap().clone().unwrap();
    let alpha_of_beta = beta.alpha.lock().unwrap().clone().unwrap();

    assert!(Arc::ptr_eq(&beta_of_alpha, &beta));
    assert!(Arc::ptr_eq(&alpha_of_beta, &alpha));
    factory.destroy_singletons();
}

#[test]
fn a_bean_may_reference_itself() {
    struct Node {
        this: Mutex<Option<Arc<Node>>>,
    }

    let factory = BeanFactory::new();
    factory
        .register_bean_definition(
            "node",
            BeanDefinition::of::<Node>()
                .constructor0(|| Node {
                    this: Mutex::new(None),
                })
                .settable::<Node, _>("this", |node, this| {
                    *node.this.lock().unwrap() = Some(this);
                })
                .property("this", Value::reference("node"))
                .build(),
        )
        .unwrap();

    let node = factory.get_bean_as::<Node>("node").unwrap();
    let this = node.this.lock().unwrap().clone().unwrap();
    assert!(Arc::ptr_eq(&node, &this));
    factory.destroy_singletons();
}

#[test]
fn constructor_cycles_are_unresolvable() {
    struct Left {
        _right: Arc<Right>,
    }

    struct Right {
        _left: Arc<Left>,
    }

    let factory = BeanFactory::new();
    factory
        .register_bean_definition(
            "left",
            BeanDefinition::of::<Left>()
                .constructor(vec![ParamSpec::of::<Right>()], |args| {
                    Ok(Left {
                        _right: args.arg::<Right>(0)?,
                    })
                })
                .build(),
        )
        .unwrap();
    factory
        .register_bean_definition(
            "right",
            BeanDefinition::of::<Right>()
                .constructor(vec![ParamSpec::of::<Left>()], |args| {
                    Ok(Right {
                        _left: args.arg::<Left>(0)?,
                    })
                })
                .build(),
        )
        .unwrap();

    let err = factory.get_bean("left").unwrap_err();
    assert!(matches!(err, BeansError::CreationFailure { .. }));
    assert!(format!("{:?}", err).contains("CurrentlyInCreation"));
}

#[test]
fn property_cycles_fail_when_early_references_are_disabled() {
    let factory = BeanFactory::builder()
        .allow_circular_references(false)
        .build();
    factory
        .register_bean_definition("alpha", alpha_definition())
        .unwrap();
    factory
        .register_bean_definition("beta", beta_definition())
        .unwrap();

    let err = factory.get_bean("alpha").unwrap_err();
    assert!(format!("{:?}", err).contains("CurrentlyInCreation"));
}

#[test]
fn wrapping_a_cycle_participant_poisons_the_raw_reference() {
    let factory = BeanFactory::new();
    factory.add_after_initialization(Arc::new(ReplaceAlpha));
    factory
        .register_bean_definition("alpha", alpha_definition())
        .unwrap();
    factory
        .register_bean_definition("beta", beta_definition())
        .unwrap();

    let err = factory.get_bean("alpha").unwrap_err();
    assert!(format!("{:?}", err).contains("raw version"));
}

#[test]
fn raw_injection_opt_in_tolerates_wrapping() {
    let factory = BeanFactory::builder()
        .allow_raw_injection_despite_wrapping(true)
        .build();
    factory.add_after_initialization(Arc::new(ReplaceAlpha));
    factory
        .register_bean_definition("alpha", alpha_definition())
        .unwrap();
    factory
        .register_bean_definition("beta", beta_definition())
        .unwrap();

    let alpha = factory.get_bean_as::<Alpha>("alpha").unwrap();
    let beta = factory.get_bean_as::<Beta>("beta").unwrap();

    // Beta keeps the pre-wrap instance; the container serves the wrapper.
    let raw = beta.alpha.lock().unwrap().clone().unwrap();
    assert!(!Arc::ptr_eq(&raw, &alpha));
    factory.destroy_singletons();
}

#[test]
fn prototype_cycles_are_detected() {
    struct Ping {
        _pong: Arc<Pong>,
    }

    struct Pong {
        _ping: Arc<Ping>,
    }

    let factory = BeanFactory::new();
    factory
        .register_bean_definition(
            "ping",
            BeanDefinition::of::<Ping>()
                .constructor(vec![ParamSpec::of::<Pong>()], |args| {
                    Ok(Ping {
                        _pong: args.arg::<Pong>(0)?,
                    })
                })
                .prototype()
                .build(),
        )
        .unwrap();
    factory
        .register_bean_definition(
            "pong",
            BeanDefinition::of::<Pong>()
                .constructor(vec![ParamSpec::of::<Ping>()], |args| {
                    Ok(Pong {
                        _ping: args.arg::<Ping>(0)?,
                    })
                })
                .prototype()
                .build(),
        )
        .unwrap();

    let err = factory.get_bean("ping").unwrap_err();
    assert!(format!("{:?}", err).contains("CurrentlyInCreation"));
}

#[test]
fn trait_handles_participate_in_cycles() {
    trait Upstream: Send + Sync {
        fn level(&self) -> u32;
    }

    struct Source {
        sink: Mutex<Option<Arc<Sink>>>,
    }

    impl Upstream for Source {
        fn level(&self) -> u32 {
            3
        }
    }

    struct Sink {
        upstream: Mutex<Option<Arc<dyn Upstream>>>,
    }

    let factory = BeanFactory::new();
    factory
        .register_bean_definition(
            "source",
            BeanDefinition::of::<Source>()
                .constructor0(|| Source {
                    sink: Mutex::new(None),
                })
                .implements::<dyn Upstream>(|a| a)
                .settable::<Sink, _>("sink", |source, sink| {
                    *source.sink.lock().unwrap() = Some(sink);
                })
                .property("sink", Value::reference("sink"))
                .build(),
        )
        .unwrap();
    factory
        .register_bean_definition(
            "sink",
            BeanDefinition::of::<Sink>()
                .constructor0(|| Sink {
                    upstream: Mutex::new(None),
                })
                .settable_trait::<dyn Upstream, _>("upstream", |sink, upstream| {
                    *sink.upstream.lock().unwrap() = Some(upstream);
                })
                .property("upstream", Value::reference("source"))
                .build(),
        )
        .unwrap();

    let source = factory.get_bean_as::<Source>("source").unwrap();
    let sink = factory.get_bean_as::<Sink>("sink").unwrap();
    assert!(Arc::ptr_eq(
        &source.sink.lock().unwrap().clone().unwrap(),
        &sink
    ));
    assert_eq!(sink.upstream.lock().unwrap().as_ref().unwrap().level(), 3);
    factory.destroy_singletons();
}
