//! Type identification for beans.
//!
//! Beans are stored type-erased; `TypeKey` is the runtime stand-in for a
//! class. Both concrete types and trait objects get a key through
//! [`key_of`], since `TypeId` covers `dyn Trait` for `'static` traits.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Type-erased, thread-safe handle to a bean instance.
///
/// Concrete beans are stored as `Arc<T>` coerced to this type. Trait-typed
/// values (bindings, factory-bean products declared as traits) are stored as
/// `Arc<Arc<dyn Trait>>` so the inner `Arc<dyn Trait>` can round-trip through
/// `dyn Any`; [`bean_as_trait`] recovers them.
pub type BeanArc = Arc<dyn Any + Send + Sync>;

/// Identifies a bean type: a `TypeId` plus the human-readable type name.
///
/// Equality and hashing use only the `TypeId`; the name is carried for
/// diagnostics and error messages.
///
/// # Examples
///
/// ```rust
/// use beanforge::{key_of, TypeKey};
///
/// trait Greeter: Send + Sync {}
/// struct ConsoleGreeter;
///
/// let concrete = key_of::<ConsoleGreeter>();
/// let as_trait = key_of::<dyn Greeter>();
/// assert_ne!(concrete, as_trait);
/// assert_eq!(concrete, TypeKey::of::<ConsoleGreeter>());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TypeKey {
    /// The unique runtime identifier of the type.
    pub id: TypeId,
    /// The type's name as produced by `std::any::type_name`.
    pub name: &'static str,
}

impl TypeKey {
    /// Builds the key for `T`, which may be a concrete type or a trait object.
    #[inline(always)]
    pub fn of<T: ?Sized + 'static>() -> Self {
        TypeKey {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Shorthand for [`TypeKey::of`].
#[inline(always)]
pub fn key_of<T: ?Sized + 'static>() -> TypeKey {
    TypeKey::of::<T>()
}

/// Downcasts a stored bean to a concrete type.
///
/// Returns `None` when the bean is not a `T`.
pub fn bean_as<T: Send + Sync + 'static>(bean: &BeanArc) -> Option<Arc<T>> {
    bean.clone().downcast::<T>().ok()
}

/// Downcasts a trait-shaped bean (`Arc<Arc<dyn T>>` storage) to `Arc<dyn T>`.
///
/// This is the counterpart of the double-`Arc` storage used for trait
/// bindings: the outer `Arc` satisfies `dyn Any`, the inner one is the
/// trait object handed to callers.
pub fn bean_as_trait<T: ?Sized + Send + Sync + 'static>(bean: &BeanArc) -> Option<Arc<T>> {
    bean.clone()
        .downcast::<Arc<T>>()
        .ok()
        .map(|outer| (*outer).clone())
}

/// Wraps an already-built trait object into the storage shape used for
/// trait-typed values.
pub fn trait_bean<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> BeanArc {
    Arc::new(value)
}

/// Placeholder instance standing in for an absent value, so optional
/// dependency slots and explicit null values keep their position in
/// resolved argument lists.
pub(crate) struct NullBean;

/// Whether a stored bean is the null placeholder.
#[inline]
pub(crate) fn is_null_bean(bean: &BeanArc) -> bool {
    instance_type_id(bean) == TypeId::of::<NullBean>()
}

/// The concrete `TypeId` of the value inside a [`BeanArc`].
#[inline]
pub(crate) fn instance_type_id(bean: &BeanArc) -> TypeId {
    bean.as_ref().type_id()
}

/// Whether the stored value is exactly of the keyed type.
#[inline]
pub(crate) fn instance_matches(bean: &BeanArc, key: &TypeKey) -> bool {
    instance_type_id(bean) == key.id
}

/// Simple value types are excluded from autowiring by type and get their own
/// dependency-check category: primitives, strings and characters configured
/// as literal values rather than wired as beans.
pub(crate) fn is_simple_value_type(id: TypeId) -> bool {
    id == TypeId::of::<bool>()
        || id == TypeId::of::<char>()
        || id == TypeId::of::<i8>()
        || id == TypeId::of::<i16>()
        || id == TypeId::of::<i32>()
        || id == TypeId::of::<i64>()
        || id == TypeId::of::<i128>()
        || id == TypeId::of::<isize>()
        || id == TypeId::of::<u8>()
        || id == TypeId::of::<u16>()
        || id == TypeId::of::<u32>()
        || id == TypeId::of::<u64>()
        || id == TypeId::of::<u128>()
        || id == TypeId::of::<usize>()
        || id == TypeId::of::<f32>()
        || id == TypeId::of::<f64>()
        || id == TypeId::of::<String>()
        || id == TypeId::of::<&'static str>()
}
