//! Lifecycle traits beans opt into.
//!
//! Implementing one of these traits does nothing by itself; the definition
//! must wire it up through the matching builder call
//! ([`initializing`](crate::BeanDefinitionBuilder::initializing),
//! [`disposable`](crate::BeanDefinitionBuilder::disposable), and friends),
//! which captures the trait dispatch for the type-erased pipeline.

use std::sync::Weak;

use crate::error::BeansResult;
use crate::factory::BeanFactory;
use crate::key::{BeanArc, TypeKey};

/// Canonical name of the [`Initializing`] callback, used to avoid invoking
/// a same-named declared init method twice.
pub const AFTER_PROPERTIES_SET: &str = "after_properties_set";

/// Canonical name of the [`Disposable`] callback, used to avoid invoking a
/// same-named declared destroy method twice.
pub const DESTROY: &str = "destroy";

/// Runs after all property values and autowired dependencies have been
/// applied, before any declared init methods.
///
/// # Examples
///
/// ```rust
/// use beanforge::{BeansError, BeansResult, Initializing};
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// #[derive(Default)]
/// struct Pool {
///     warmed: AtomicBool,
/// }
///
/// impl Initializing for Pool {
///     fn after_properties_set(&self) -> BeansResult<()> {
///         self.warmed.store(true, Ordering::SeqCst);
///         Ok(())
///     }
/// }
/// ```
pub trait Initializing: Send + Sync {
    fn after_properties_set(&self) -> BeansResult<()>;
}

/// Runs when the container destroys the bean, before any declared destroy
/// methods.
pub trait Disposable: Send + Sync {
    fn destroy(&self) -> BeansResult<()>;
}

/// Receives the bean's own name before initialization callbacks. The
/// receiver takes `&self`, so implementations store the name through
/// interior mutability.
pub trait BeanNameAware: Send + Sync {
    fn set_bean_name(&self, name: &str);
}

/// Receives a handle to the owning container before initialization
/// callbacks. The reference is weak; upgrade it at use time rather than
/// holding an owning handle that would keep the container alive from
/// inside one of its own beans.
pub trait BeanFactoryAware: Send + Sync {
    fn set_bean_factory(&self, factory: Weak<BeanFactory>);
}

/// Runs once per singleton after the container finishes eager singleton
/// pre-instantiation, when every other singleton is guaranteed to exist.
pub trait SingletonsInstantiated: Send + Sync {
    fn after_singletons_instantiated(&self) -> BeansResult<()>;
}

/// A bean that manufactures another object. Requests for the bean name
/// yield [`object`](FactoryBean::object)'s result; prefixing the name with
/// `&` yields the factory itself.
///
/// # Examples
///
/// ```rust
/// use beanforge::{BeansResult, FactoryBean, key_of, BeanArc, TypeKey};
/// use std::sync::Arc;
///
/// struct Connection {
///     url: String,
/// }
///
/// struct ConnectionFactory {
///     url: String,
/// }
///
/// impl FactoryBean for ConnectionFactory {
///     fn object(&self) -> BeansResult<BeanArc> {
///         Ok(Arc::new(Connection { url: self.url.clone() }))
///     }
///
///     fn product_type(&self) -> Option<TypeKey> {
///         Some(key_of::<Connection>())
///     }
/// }
/// ```
pub trait FactoryBean: Send + Sync {
    /// Builds or returns the product this factory manages.
    fn object(&self) -> BeansResult<BeanArc>;

    /// Whether the product is a shared instance the container may cache.
    /// When `false`, every request invokes [`object`](FactoryBean::object)
    /// again.
    fn is_singleton(&self) -> bool {
        true
    }

    /// The product's type for by-type matching before the product exists.
    fn product_type(&self) -> Option<TypeKey> {
        None
    }
}
