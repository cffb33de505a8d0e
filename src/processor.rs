//! Container extension hooks applied around bean creation.
//!
//! Each extension point is its own single-method trait with its own ordered
//! list; the container walks exactly the list for the seam it has reached,
//! in registration order. A hook declines by returning its pass-through
//! value. A processor that participates at several seams implements several
//! traits and registers once per seam.

use std::sync::{Arc, RwLock};

use crate::definition::merged::MergedBeanDefinition;
use crate::definition::{ConstructorSpec, PropertyValues};
use crate::error::BeansResult;
use crate::key::BeanArc;

/// Runs before the container instantiates a bean. Returning a bean
/// short-circuits the pipeline: only [`AfterInitialization`] hooks still
/// apply to it.
pub trait BeforeInstantiation: Send + Sync {
    fn before_instantiation(
        &self,
        definition: &MergedBeanDefinition,
        name: &str,
    ) -> BeansResult<Option<BeanArc>>;
}

/// Supplies the candidate constructors for a bean, overriding the
/// definition's declared set. The first selector returning a set wins.
pub trait ConstructorSelector: Send + Sync {
    fn candidate_constructors(
        &self,
        definition: &MergedBeanDefinition,
        name: &str,
    ) -> BeansResult<Option<Vec<ConstructorSpec>>>;
}

/// Runs right after instantiation, before any values apply. Returning
/// `false` skips property population entirely.
pub trait AfterInstantiation: Send + Sync {
    fn after_instantiation(&self, bean: &BeanArc, name: &str) -> BeansResult<bool>;
}

/// Rewrites the property values about to be applied to a bean.
pub trait PropertyProcessor: Send + Sync {
    fn process_properties(
        &self,
        values: PropertyValues,
        bean: &BeanArc,
        name: &str,
    ) -> BeansResult<PropertyValues>;
}

/// Observes the merged definition the first time it is used to create a
/// bean, before instantiation. Processors claim init and destroy methods
/// here via the definition's externally-managed sets.
pub trait MergedDefinitionProcessor: Send + Sync {
    fn merged_definition(&self, definition: &MergedBeanDefinition, name: &str);
}

/// Runs before initialization callbacks. May return a replacement.
pub trait BeforeInitialization: Send + Sync {
    fn before_initialization(&self, bean: BeanArc, name: &str) -> BeansResult<BeanArc>;
}

/// Runs after initialization callbacks. May return a replacement, typically
/// a wrapping decorator. Also applied to factory-bean products and
/// short-circuited instances.
pub trait AfterInitialization: Send + Sync {
    fn after_initialization(&self, bean: BeanArc, name: &str) -> BeansResult<BeanArc>;
}

/// Shapes the reference exposed to other beans while a bean is still
/// mid-creation inside a reference cycle. A processor that wraps beans in
/// [`AfterInitialization`] must hand out the same wrapper here.
pub trait EarlyReferenceProcessor: Send + Sync {
    fn early_reference(&self, bean: BeanArc, name: &str) -> BeansResult<BeanArc>;
}

/// Takes part in bean destruction, before the bean's own destroy callbacks.
#[allow(unused_variables)]
pub trait DestructionProcessor: Send + Sync {
    /// Whether [`before_destruction`](DestructionProcessor::before_destruction)
    /// wants to see this particular bean.
    fn requires_destruction(&self, bean: &BeanArc) -> bool {
        true
    }

    fn before_destruction(&self, bean: &BeanArc, name: &str) -> BeansResult<()>;
}

/// Copy-on-write list for one extension point. Creation paths snapshot the
/// list once and run against the snapshot, so a processor registered
/// mid-creation never sees half of a bean's lifecycle.
pub(crate) struct ProcessorList<P: ?Sized> {
    list: RwLock<Arc<Vec<Arc<P>>>>,
}

impl<P: ?Sized> Default for ProcessorList<P> {
    fn default() -> Self {
        ProcessorList {
            list: RwLock::new(Arc::new(Vec::new())),
        }
    }
}

impl<P: ?Sized> ProcessorList<P> {
    pub fn add(&self, processor: Arc<P>) {
        let mut guard = self.list.write().unwrap();
        let mut next = (**guard).clone();
        next.push(processor);
        *guard = Arc::new(next);
    }

    pub fn snapshot(&self) -> Arc<Vec<Arc<P>>> {
        self.list.read().unwrap().clone()
    }
}

/// One ordered list per extension point.
#[derive(Default)]
pub(crate) struct ProcessorRegistry {
    pub(crate) before_instantiation: ProcessorList<dyn BeforeInstantiation>,
    pub(crate) constructor_selection: ProcessorList<dyn ConstructorSelector>,
    pub(crate) after_instantiation: ProcessorList<dyn AfterInstantiation>,
    pub(crate) properties: ProcessorList<dyn PropertyProcessor>,
    pub(crate) merged_definition: ProcessorList<dyn MergedDefinitionProcessor>,
    pub(crate) before_initialization: ProcessorList<dyn BeforeInitialization>,
    pub(crate) after_initialization: ProcessorList<dyn AfterInitialization>,
    pub(crate) early_reference: ProcessorList<dyn EarlyReferenceProcessor>,
    pub(crate) destruction: ProcessorList<dyn DestructionProcessor>,
}

/// Applies the before-initialization chain, threading replacements through.
pub(crate) fn apply_before_initialization(
    processors: &[Arc<dyn BeforeInitialization>],
    mut bean: BeanArc,
    name: &str,
) -> BeansResult<BeanArc> {
    for processor in processors {
        bean = processor.before_initialization(bean, name)?;
    }
    Ok(bean)
}

/// Applies the after-initialization chain, threading replacements through.
pub(crate) fn apply_after_initialization(
    processors: &[Arc<dyn AfterInitialization>],
    mut bean: BeanArc,
    name: &str,
) -> BeansResult<BeanArc> {
    for processor in processors {
        bean = processor.after_initialization(bean, name)?;
    }
    Ok(bean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Tag(&'static str);

    struct Counter {
        calls: AtomicUsize,
    }

    impl AfterInitialization for Counter {
        fn after_initialization(&self, bean: BeanArc, _name: &str) -> BeansResult<BeanArc> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(bean)
        }
    }

    #[test]
    fn snapshot_is_isolated_from_later_registration() {
        let list: ProcessorList<dyn AfterInitialization> = ProcessorList::default();
        list.add(Arc::new(Counter {
            calls: AtomicUsize::new(0),
        }));
        let snapshot = list.snapshot();
        list.add(Arc::new(Counter {
            calls: AtomicUsize::new(0),
        }));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(list.snapshot().len(), 2);
    }

    #[test]
    fn chains_thread_replacements() {
        struct Replace;
        impl BeforeInitialization for Replace {
            fn before_initialization(&self, _bean: BeanArc, _name: &str) -> BeansResult<BeanArc> {
                Ok(Arc::new(Tag("replaced")))
            }
        }

        let processors: Vec<Arc<dyn BeforeInitialization>> = vec![Arc::new(Replace)];
        let bean: BeanArc = Arc::new(Tag("original"));
        let out = apply_before_initialization(&processors, bean, "tag").unwrap();
        let tag = crate::key::bean_as::<Tag>(&out).unwrap();
        assert_eq!(tag.0, "replaced");
    }

    #[test]
    fn destruction_interest_defaults_to_every_bean() {
        struct Sweep;
        impl DestructionProcessor for Sweep {
            fn before_destruction(&self, _bean: &BeanArc, _name: &str) -> BeansResult<()> {
                Ok(())
            }
        }

        let bean: BeanArc = Arc::new(Tag("any"));
        assert!(Sweep.requires_destruction(&bean));
    }
}
