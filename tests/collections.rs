use beanforge::{
    BeanDefinition, BeanFactory, BeansError, DependencyComparator, DependencyDescriptor,
    OrderedCandidate, ParamSpec,
};
use std::cmp::Ordering;
use std::sync::Arc;

trait Codec: Send + Sync + std::fmt::Debug {
    fn label(&self) -> &'static str;
}

#[derive(Debug)]
struct Utf8;
impl Codec for Utf8 {
    fn label(&self) -> &'static str {
        "utf8"
    }
}

#[derive(Debug)]
struct Ascii;
impl Codec for Ascii {
    fn label(&self) -> &'static str {
        "ascii"
    }
}

#[derive(Debug)]
struct Hex;
impl Codec for Hex {
    fn label(&self) -> &'static str {
        "hex"
    }
}

fn codec<T: Codec + Send + Sync + 'static>(build: fn() -> T) -> BeanDefinition {
    BeanDefinition::of::<T>()
        .constructor0(build)
        .implements::<dyn Codec>(|a| a)
        .build()
}

#[test]
fn vec_slots_collect_every_exposed_candidate() {
    struct Registry {
        codecs: Vec<Arc<dyn Codec>>,
    }

    let factory = BeanFactory::new();
    factory
        .register_bean_definition("utf8", codec(|| Utf8))
        .unwrap();
    factory
        .register_bean_definition("ascii", codec(|| Ascii))
        .unwrap();
    factory
        .register_bean_definition("hex", codec(|| Hex))
        .unwrap();
    factory
        .register_bean_definition(
            "registry",
            BeanDefinition::of::<Registry>()
                .constructor(vec![ParamSpec::vec_of::<dyn Codec>()], |args| {
                    Ok(Registry {
                        codecs: args.arg_trait_vec::<dyn Codec>(0)?,
                    })
                })
                .build(),
        )
        .unwrap();

    let registry = factory.get_bean_as::<Registry>("registry").unwrap();
    let labels: Vec<_> = registry.codecs.iter().map(|c| c.label()).collect();
    assert_eq!(labels, ["utf8", "ascii", "hex"]);
}

#[test]
fn ordered_collections_sort_by_declared_priority() {
    struct Pipeline {
        codecs: Vec<Arc<dyn Codec>>,
    }

    let factory = BeanFactory::new();
    factory
        .register_bean_definition(
            "slow",
            BeanDefinition::of::<Utf8>()
                .constructor0(|| Utf8)
                .implements::<dyn Codec>(|a| a)
                .priority(20)
                .build(),
        )
        .unwrap();
    factory
        .register_bean_definition(
            "fast",
            BeanDefinition::of::<Ascii>()
                .constructor0(|| Ascii)
                .implements::<dyn Codec>(|a| a)
                .priority(1)
                .build(),
        )
        .unwrap();
    factory
        .register_bean_definition("plain", codec(|| Hex))
        .unwrap();
    factory
        .register_bean_definition(
            "pipeline",
            BeanDefinition::of::<Pipeline>()
                .constructor(vec![ParamSpec::vec_of::<dyn Codec>()], |args| {
                    Ok(Pipeline {
                        codecs: args.arg_trait_vec::<dyn Codec>(0)?,
                    })
                })
                .build(),
        )
        .unwrap();

    let pipeline = factory.get_bean_as::<Pipeline>("pipeline").unwrap();
    let labels: Vec<_> = pipeline.codecs.iter().map(|c| c.label()).collect();
    assert_eq!(labels, ["ascii", "utf8", "hex"]);
}

#[test]
fn configured_comparators_replace_the_priority_sort() {
    struct HighestFirst;

    impl DependencyComparator for HighestFirst {
        fn compare(&self, a: &OrderedCandidate<'_>, b: &OrderedCandidate<'_>) -> Ordering {
            b.priority.cmp(&a.priority)
        }
    }

    struct Pipeline {
        codecs: Vec<Arc<dyn Codec>>,
    }

    let factory = BeanFactory::builder()
        .dependency_comparator(Arc::new(HighestFirst))
        .build();
    factory
        .register_bean_definition(
            "slow",
            BeanDefinition::of::<Utf8>()
                .constructor0(|| Utf8)
                .implements::<dyn Codec>(|a| a)
                .priority(20)
                .build(),
        )
        .unwrap();
    factory
        .register_bean_definition(
            "fast",
            BeanDefinition::of::<Ascii>()
                .constructor0(|| Ascii)
                .implements::<dyn Codec>(|a| a)
                .priority(1)
                .build(),
        )
        .unwrap();
    factory
        .register_bean_definition(
            "pipeline",
            BeanDefinition::of::<Pipeline>()
                .constructor(vec![ParamSpec::vec_of::<dyn Codec>()], |args| {
                    Ok(Pipeline {
                        codecs: args.arg_trait_vec::<dyn Codec>(0)?,
                    })
                })
                .build(),
        )
        .unwrap();

    let pipeline = factory.get_bean_as::<Pipeline>("pipeline").unwrap();
    let labels: Vec<_> = pipeline.codecs.iter().map(|c| c.label()).collect();
    assert_eq!(labels, ["utf8", "ascii"]);
}

#[test]
fn map_slots_pair_names_with_instances() {
    struct Directory {
        codecs: Vec<(String, Arc<dyn Codec>)>,
    }

    let factory = BeanFactory::new();
    factory
        .register_bean_definition("utf8", codec(|| Utf8))
        .unwrap();
    factory
        .register_bean_definition("ascii", codec(|| Ascii))
        .unwrap();
    factory
        .register_bean_definition(
            "directory",
            BeanDefinition::of::<Directory>()
                .constructor(vec![ParamSpec::map_of::<dyn Codec>()], |args| {
                    Ok(Directory {
                        codecs: args.arg_trait_map::<dyn Codec>(0)?,
                    })
                })
                .build(),
        )
        .unwrap();

    let directory = factory.get_bean_as::<Directory>("directory").unwrap();
    let entries: Vec<_> = directory
        .codecs
        .iter()
        .map(|(name, codec)| (name.as_str(), codec.label()))
        .collect();
    assert_eq!(entries, [("utf8", "utf8"), ("ascii", "ascii")]);
}

#[test]
fn sole_constructors_tolerate_empty_collections() {
    struct Registry {
        codecs: Vec<Arc<dyn Codec>>,
    }

    let factory = BeanFactory::new();
    factory
        .register_bean_definition(
            "registry",
            BeanDefinition::of::<Registry>()
                .constructor(vec![ParamSpec::vec_of::<dyn Codec>()], |args| {
                    Ok(Registry {
                        codecs: args.arg_trait_vec::<dyn Codec>(0)?,
                    })
                })
                .build(),
        )
        .unwrap();

    let registry = factory.get_bean_as::<Registry>("registry").unwrap();
    assert!(registry.codecs.is_empty());
}

#[test]
fn programmatic_collection_requests_require_a_candidate() {
    let factory = BeanFactory::new();
    let err = factory
        .resolve_dependency(&DependencyDescriptor::vec_of::<dyn Codec>())
        .unwrap_err();
    assert!(matches!(err, BeansError::NoSuchBeanOfType { .. }));
}

#[test]
fn collections_skip_the_collecting_bean_itself() {
    #[derive(Debug)]
    struct Multiplexer {
        inner: Vec<Arc<dyn Codec>>,
    }

    impl Codec for Multiplexer {
        fn label(&self) -> &'static str {
            "multiplexer"
        }
    }

    let factory = BeanFactory::new();
    factory
        .register_bean_definition("utf8", codec(|| Utf8))
        .unwrap();
    factory
        .register_bean_definition("ascii", codec(|| Ascii))
        .unwrap();
    factory
        .register_bean_definition(
            "multiplexer",
            BeanDefinition::of::<Multiplexer>()
                .constructor(vec![ParamSpec::vec_of::<dyn Codec>()], |args| {
                    Ok(Multiplexer {
                        inner: args.arg_trait_vec::<dyn Codec>(0)?,
                    })
                })
                .implements::<dyn Codec>(|a| a)
                .build(),
        )
        .unwrap();

    let mux = factory.get_bean_as::<Multiplexer>("multiplexer").unwrap();
    let labels: Vec<_> = mux.inner.iter().map(|c| c.label()).collect();
    assert_eq!(labels, ["utf8", "ascii"]);
}

#[test]
fn provider_slots_defer_resolution_until_asked() {
    struct Recorder;

    struct Player {
        recorder: beanforge::BeanProvider<Recorder>,
    }

    let factory = BeanFactory::new();
    factory
        .register_bean_definition(
            "player",
            BeanDefinition::of::<Player>()
                .constructor(vec![ParamSpec::provider_of::<Recorder>()], |args| {
                    Ok(Player {
                        recorder: args.arg_provider::<Recorder>(0)?,
                    })
                })
                .build(),
        )
        .unwrap();

    let player = factory.get_bean_as::<Player>("player").unwrap();
    assert!(player.recorder.get_if_available().unwrap().is_none());

    factory
        .register_bean_definition(
            "recorder",
            BeanDefinition::of::<Recorder>().constructor0(|| Recorder).build(),
        )
        .unwrap();
    assert!(player.recorder.get().is_ok());
}

#[test]
fn providers_enumerate_and_guard_uniqueness() {
    let factory = BeanFactory::new();
    factory
        .register_bean_definition("utf8", codec(|| Utf8))
        .unwrap();
    factory
        .register_bean_definition("ascii", codec(|| Ascii))
        .unwrap();

    let provider = factory.bean_provider_trait::<dyn Codec>();
    let all: Vec<_> = provider
        .iter()
        .unwrap()
        .iter()
        .map(|c| c.label())
        .collect();
    assert_eq!(all, ["utf8", "ascii"]);

    assert!(provider.get_if_unique().unwrap().is_none());
    assert!(matches!(
        provider.get().unwrap_err(),
        BeansError::NoUniqueBean { .. }
    ));
}
