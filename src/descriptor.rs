//! Dependency descriptors: what an injection point needs and how.
//!
//! The resolution engine works entirely off a [`DependencyDescriptor`]:
//! the required type, the slot shape, required-ness, eagerness, and any
//! qualifier. Constructor parameters, declared properties, and programmatic
//! [`resolve_dependency`](crate::BeanFactory::resolve_dependency) calls all
//! funnel into the same descriptor form.

use std::cmp::Ordering;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::definition::{ParamShape, ParamSpec, PropertySpec, Value};
use crate::error::{BeansError, BeansResult};
use crate::factory::BeanFactory;
use crate::key::{bean_as, bean_as_trait, key_of, BeanArc, TypeKey};

/// Where a dependency is being injected, for error messages.
#[derive(Clone, Debug)]
pub enum DependencyTarget {
    ConstructorParam {
        index: usize,
        name: Option<&'static str>,
    },
    FactoryMethodParam {
        method: &'static str,
        index: usize,
        name: Option<&'static str>,
    },
    Property(&'static str),
    /// A direct API call rather than a declared injection point.
    Programmatic,
}

impl fmt::Display for DependencyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyTarget::ConstructorParam { index, name } => match name {
                Some(n) => write!(f, "constructor parameter {} ('{}')", index, n),
                None => write!(f, "constructor parameter {}", index),
            },
            DependencyTarget::FactoryMethodParam {
                method,
                index,
                name,
            } => match name {
                Some(n) => write!(f, "parameter {} ('{}') of factory method '{}'", index, n, method),
                None => write!(f, "parameter {} of factory method '{}'", index, method),
            },
            DependencyTarget::Property(name) => write!(f, "property '{}'", name),
            DependencyTarget::Programmatic => f.write_str("programmatic dependency request"),
        }
    }
}

/// A request the dependency resolution engine can answer.
#[derive(Clone, Debug)]
pub struct DependencyDescriptor {
    /// The required type; the element type for `Vec`/`Map`/`Provider`
    /// shapes.
    pub key: TypeKey,
    /// Slot shape.
    pub shape: ParamShape,
    /// Whether failing to find a candidate is an error.
    pub required: bool,
    /// Whether type checks may instantiate factory beans to learn their
    /// product type.
    pub eager: bool,
    /// Restricts candidates to the bean with this name, alias, or declared
    /// qualifier.
    pub qualifier: Option<String>,
    /// A configured default evaluated instead of a bean lookup when set.
    pub fallback_value: Option<Value>,
    /// The injection point, for diagnostics.
    pub target: DependencyTarget,
    /// `Vec`/`Map` results are sorted by declared priority when set.
    pub ordered: bool,
    /// Second-pass candidate search that also admits definitions whose
    /// type cannot be predicted without instantiation.
    pub(crate) fallback: bool,
    /// Set while resolving the elements of a collection slot, so nested
    /// resolution does not re-trigger collection handling and self
    /// references stay permitted inside collections.
    pub(crate) multi_element: bool,
}

impl DependencyDescriptor {
    fn with_shape(key: TypeKey, shape: ParamShape) -> Self {
        DependencyDescriptor {
            key,
            shape,
            required: shape != ParamShape::Optional,
            eager: true,
            qualifier: None,
            fallback_value: None,
            target: DependencyTarget::Programmatic,
            ordered: shape == ParamShape::Vec,
            fallback: false,
            multi_element: false,
        }
    }

    /// A required single dependency on `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        DependencyDescriptor::with_shape(key_of::<T>(), ParamShape::Single)
    }

    /// A collection dependency on every `T`.
    pub fn vec_of<T: ?Sized + 'static>() -> Self {
        DependencyDescriptor::with_shape(key_of::<T>(), ParamShape::Vec)
    }

    /// A name-keyed collection dependency on every `T`.
    pub fn map_of<T: ?Sized + 'static>() -> Self {
        DependencyDescriptor::with_shape(key_of::<T>(), ParamShape::Map)
    }

    /// Marks the dependency as tolerating absence.
    pub fn not_required(mut self) -> Self {
        self.required = false;
        self
    }

    /// Restricts candidates to the named bean.
    pub fn qualified(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }

    /// Forbids instantiating factory beans during candidate type checks.
    pub fn lazy_type_check(mut self) -> Self {
        self.eager = false;
        self
    }

    /// Supplies a configured default used instead of any bean lookup.
    pub fn with_fallback(mut self, value: Value) -> Self {
        self.fallback_value = Some(value);
        self
    }

    /// Attaches the injection point for diagnostics.
    pub fn at(mut self, target: DependencyTarget) -> Self {
        self.target = target;
        self
    }

    pub(crate) fn from_param(
        spec: &ParamSpec,
        index: usize,
        factory_method: Option<&'static str>,
    ) -> Self {
        let mut descriptor = DependencyDescriptor::with_shape(spec.key, spec.shape);
        descriptor.qualifier = spec.qualifier.clone();
        descriptor.target = match factory_method {
            Some(method) => DependencyTarget::FactoryMethodParam {
                method,
                index,
                name: spec.name,
            },
            None => DependencyTarget::ConstructorParam {
                index,
                name: spec.name,
            },
        };
        descriptor
    }

    /// By-type property autowiring tolerates absence; a missing candidate
    /// leaves the property unset.
    pub(crate) fn for_property(spec: &PropertySpec) -> Self {
        let mut descriptor = DependencyDescriptor::with_shape(spec.key, spec.shape);
        descriptor.required = false;
        descriptor.target = DependencyTarget::Property(spec.name);
        descriptor
    }

    pub(crate) fn for_fallback(&self) -> Self {
        let mut descriptor = self.clone();
        descriptor.fallback = true;
        descriptor
    }

    pub(crate) fn for_element(&self) -> Self {
        let mut descriptor = self.clone();
        descriptor.shape = ParamShape::Single;
        descriptor.multi_element = true;
        descriptor
    }

    /// The declared name at the injection point, used as a final
    /// tie-breaker against candidate bean names.
    pub(crate) fn dependency_name(&self) -> Option<&str> {
        match &self.target {
            DependencyTarget::ConstructorParam { name, .. } => *name,
            DependencyTarget::FactoryMethodParam { name, .. } => *name,
            DependencyTarget::Property(name) => Some(name),
            DependencyTarget::Programmatic => None,
        }
    }
}

/// One element of a collection-shaped resolution result, as presented to a
/// [`DependencyComparator`].
pub struct OrderedCandidate<'a> {
    /// Name of the bean the element came from.
    pub name: &'a str,
    /// The bean's declared ordering value, if any.
    pub priority: Option<i32>,
    /// The materialized element.
    pub instance: &'a BeanArc,
}

/// Orders the elements of collection-shaped resolution results.
///
/// Installed through
/// [`set_dependency_comparator`](BeanFactory::set_dependency_comparator) or
/// the factory builder. Without one, elements sort by declared priority,
/// lower values first, with unprioritized candidates after every
/// prioritized one; registration order is kept among equals either way.
pub trait DependencyComparator: Send + Sync {
    fn compare(&self, a: &OrderedCandidate<'_>, b: &OrderedCandidate<'_>) -> Ordering;
}

/// Everything a [`BeanProvider`] needs to resolve later: the container and
/// the descriptor, without the target type.
#[derive(Clone)]
pub struct ProviderSeed {
    pub(crate) factory: Weak<BeanFactory>,
    pub(crate) descriptor: DependencyDescriptor,
    pub(crate) requesting: Option<String>,
}

impl ProviderSeed {
    pub(crate) fn new(
        factory: Weak<BeanFactory>,
        descriptor: DependencyDescriptor,
        requesting: Option<String>,
    ) -> Self {
        ProviderSeed {
            factory,
            descriptor,
            requesting,
        }
    }
}

/// Lazy dependency handle: resolution runs when a value is requested, not
/// when the handle is injected. Breaks startup cycles and defers optional
/// lookups.
///
/// # Examples
///
/// ```rust
/// use beanforge::{BeanDefinition, BeanFactory};
///
/// struct Config {
///     retries: u32,
/// }
///
/// let factory = BeanFactory::new();
/// factory
///     .register_bean_definition(
///         "config",
///         BeanDefinition::of::<Config>()
///             .constructor0(|| Config { retries: 3 })
///             .build(),
///     )
///     .unwrap();
///
/// let provider = factory.bean_provider::<Config>();
/// assert_eq!(provider.get().unwrap().retries, 3);
/// ```
pub struct BeanProvider<T: ?Sized + Send + Sync + 'static> {
    seed: ProviderSeed,
    extract: fn(&BeanArc) -> Option<Arc<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> Clone for BeanProvider<T> {
    fn clone(&self) -> Self {
        BeanProvider {
            seed: self.seed.clone(),
            extract: self.extract,
        }
    }
}

impl<T: ?Sized + Send + Sync + 'static> fmt::Debug for BeanProvider<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanProvider")
            .field("key", &self.seed.descriptor.key)
            .finish_non_exhaustive()
    }
}

impl<T: ?Sized + Send + Sync + 'static> BeanProvider<T> {
    pub(crate) fn of_trait(seed: ProviderSeed) -> Self {
        BeanProvider {
            seed,
            extract: bean_as_trait::<T>,
        }
    }

    fn factory(&self) -> BeansResult<Arc<BeanFactory>> {
        self.seed.factory.upgrade().ok_or_else(|| {
            BeansError::IllegalState("provider outlived its bean factory".into())
        })
    }

    fn resolve_single(&self, required: bool) -> BeansResult<Option<Arc<T>>> {
        let factory = self.factory()?;
        let mut descriptor = self.seed.descriptor.clone();
        descriptor.shape = ParamShape::Single;
        descriptor.required = required;
        let resolved = factory.resolve_dependency_for(
            &descriptor,
            self.seed.requesting.as_deref(),
            &mut Vec::new(),
        )?;
        match resolved {
            Some(bean) => {
                let value = (self.extract)(&bean).ok_or_else(|| {
                    BeansError::BeanNotOfRequiredType {
                        name: self
                            .seed
                            .requesting
                            .clone()
                            .unwrap_or_else(|| "<provider>".into()),
                        required: self.seed.descriptor.key.name,
                        actual: None,
                    }
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn resolve_all(&self, ordered: bool) -> BeansResult<Vec<Arc<T>>> {
        let factory = self.factory()?;
        let mut descriptor = self.seed.descriptor.clone();
        descriptor.shape = ParamShape::Vec;
        descriptor.required = false;
        descriptor.ordered = ordered;
        let resolved = factory.resolve_dependency_for(
            &descriptor,
            self.seed.requesting.as_deref(),
            &mut Vec::new(),
        )?;
        let Some(bean) = resolved else {
            return Ok(Vec::new());
        };
        let list = bean_as::<Vec<BeanArc>>(&bean).ok_or_else(|| {
            BeansError::IllegalState("collection resolution produced a non-collection".into())
        })?;
        list.iter()
            .map(|b| {
                (self.extract)(b).ok_or_else(|| BeansError::BeanNotOfRequiredType {
                    name: "<provider>".into(),
                    required: self.seed.descriptor.key.name,
                    actual: None,
                })
            })
            .collect()
    }

    /// Resolves the unique required instance.
    pub fn get(&self) -> BeansResult<Arc<T>> {
        self.resolve_single(true)?.ok_or_else(|| {
            BeansError::NoSuchBeanOfType {
                required: self.seed.descriptor.key.name,
                message: "provider target not available".into(),
            }
        })
    }

    /// Resolves the instance if at least one candidate exists, `None`
    /// otherwise. Ambiguity is still an error.
    pub fn get_if_available(&self) -> BeansResult<Option<Arc<T>>> {
        self.resolve_single(false)
    }

    /// Resolves the instance only when exactly one candidate exists;
    /// `None` for zero or several.
    pub fn get_if_unique(&self) -> BeansResult<Option<Arc<T>>> {
        match self.resolve_single(false) {
            Err(BeansError::NoUniqueBean { .. }) => Ok(None),
            other => other,
        }
    }

    /// Every matching instance, in registration order.
    pub fn iter(&self) -> BeansResult<Vec<Arc<T>>> {
        self.resolve_all(false)
    }

    /// Every matching instance, priority-ordered with unordered entries
    /// last.
    pub fn ordered(&self) -> BeansResult<Vec<Arc<T>>> {
        self.resolve_all(true)
    }
}

impl<T: Send + Sync + 'static> BeanProvider<T> {
    pub(crate) fn concrete(seed: ProviderSeed) -> Self {
        BeanProvider {
            seed,
            extract: bean_as::<T>,
        }
    }
}
