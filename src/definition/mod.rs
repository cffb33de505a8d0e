//! Bean definitions: the recipes the container creates beans from.
//!
//! A [`BeanDefinition`] carries everything needed to instantiate, configure,
//! initialize, and eventually destroy a bean: constructor and factory-method
//! specs with typed invocation closures, configured argument and property
//! values, scope and autowire settings, trait bindings for by-type exposure,
//! and lifecycle hooks. Definitions are registered under a name, optionally
//! chained to a parent definition whose settings they inherit.
//!
//! Definitions are built through [`BeanDefinitionBuilder`], which captures
//! the concrete Rust type once and stamps out the type-erased closures the
//! creation pipeline invokes later.

pub mod merged;
pub mod values;

use std::any;
use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::descriptor::{BeanProvider, ProviderSeed};
use crate::error::{BeansError, BeansResult};
use crate::factory::BeanFactory;
use crate::key::{bean_as, bean_as_trait, is_simple_value_type, key_of, BeanArc, NullBean, TypeKey};
use crate::lifecycle::{
    BeanFactoryAware, BeanNameAware, Disposable, FactoryBean, Initializing, SingletonsInstantiated,
};

pub use values::{ConstructorArgumentValues, PropertyValue, PropertyValues, Value, ValueHolder};

/// Destroy-method sentinel: infer a destroy method by scanning the declared
/// method pool for `close`, then `shutdown`.
pub const INFER_METHOD: &str = "(inferred)";

/// Bean lifetime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BeanScope {
    /// One shared instance per container, the default.
    Singleton,
    /// A fresh instance per request, never cached or destroyed by the
    /// container.
    Prototype,
    /// Delegated to a registered [`Scope`](crate::factory::Scope)
    /// implementation.
    Custom(String),
}

impl BeanScope {
    pub fn is_singleton(&self) -> bool {
        matches!(self, BeanScope::Singleton)
    }

    pub fn is_prototype(&self) -> bool {
        matches!(self, BeanScope::Prototype)
    }
}

/// How unset properties get filled in before explicit values apply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum AutowireMode {
    /// No automatic wiring; only configured values apply.
    #[default]
    No,
    /// Each declared property whose name matches a registered bean gets a
    /// reference to that bean.
    ByName,
    /// Each declared non-simple property is resolved by type through the
    /// dependency engine.
    ByType,
    /// Constructor resolution picks the greediest satisfiable constructor.
    Constructor,
}

/// Post-populate verification of which properties must have received values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DependencyCheck {
    /// No verification, the default.
    #[default]
    None,
    /// Simple-typed properties must be set.
    Simple,
    /// Reference-typed properties must be set.
    Objects,
    /// Every declared property must be set.
    All,
}

/// Hint for tooling about who owns a definition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BeanRole {
    /// Part of the application, the default.
    #[default]
    Application,
    /// Supporting part of a larger configuration.
    Support,
    /// Internal plumbing, exempt from override logging at info level.
    Infrastructure,
}

/// The shape a dependency slot takes at an injection point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamShape {
    /// Exactly one instance, required.
    Single,
    /// One instance if available, a `None` slot otherwise.
    Optional,
    /// Every matching instance, in priority-then-registration order.
    Vec,
    /// Every matching instance keyed by bean name, in registration order.
    Map,
    /// A lazy handle resolving on demand instead of at creation time.
    Provider,
}

impl ParamShape {
    /// Whether the slot absorbs multiple candidates rather than needing a
    /// unique one.
    pub fn is_multi(&self) -> bool {
        matches!(self, ParamShape::Vec | ParamShape::Map)
    }
}

/// A declared constructor or factory-method parameter.
#[derive(Clone, Debug)]
pub struct ParamSpec {
    /// Declared type. For `Vec`/`Map`/`Provider` shapes this is the element
    /// type.
    pub key: TypeKey,
    /// Declared parameter name, used for named argument matching.
    pub name: Option<&'static str>,
    /// Slot shape.
    pub shape: ParamShape,
    /// Restricts by-type resolution to the bean with this name or alias.
    pub qualifier: Option<String>,
    /// Whether the type counts as a simple configuration value rather than
    /// a wirable bean type.
    pub simple: bool,
}

impl ParamSpec {
    fn with_shape<T: ?Sized + 'static>(shape: ParamShape) -> Self {
        let key = key_of::<T>();
        ParamSpec {
            key,
            name: None,
            shape,
            qualifier: None,
            simple: is_simple_value_type(key.id),
        }
    }

    /// A required single-instance parameter of type `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        ParamSpec::with_shape::<T>(ParamShape::Single)
    }

    /// A parameter that tolerates absence of any candidate.
    pub fn optional<T: ?Sized + 'static>() -> Self {
        ParamSpec::with_shape::<T>(ParamShape::Optional)
    }

    /// A parameter collecting every candidate of element type `T`.
    pub fn vec_of<T: ?Sized + 'static>() -> Self {
        ParamSpec::with_shape::<T>(ParamShape::Vec)
    }

    /// A parameter collecting candidates keyed by bean name.
    pub fn map_of<T: ?Sized + 'static>() -> Self {
        ParamSpec::with_shape::<T>(ParamShape::Map)
    }

    /// A lazily resolving handle parameter.
    pub fn provider_of<T: ?Sized + 'static>() -> Self {
        ParamSpec::with_shape::<T>(ParamShape::Provider)
    }

    /// Declares the parameter name for named argument matching.
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = Some(name);
        self
    }

    /// Restricts resolution to the named bean.
    pub fn qualified(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }
}

/// The arguments resolved for one constructor or factory-method invocation,
/// extracted by position through the typed accessors.
pub struct ResolvedArgs {
    values: Vec<BeanArc>,
}

impl ResolvedArgs {
    pub(crate) fn new(values: Vec<BeanArc>) -> Self {
        ResolvedArgs { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn slot(&self, index: usize) -> BeansResult<&BeanArc> {
        self.values.get(index).ok_or_else(|| {
            BeansError::IllegalState(format!(
                "argument index {} out of bounds, {} arguments resolved",
                index,
                self.values.len()
            ))
        })
    }

    fn mismatch<T: ?Sized>(index: usize) -> BeansError {
        BeansError::TypeMismatch {
            required: any::type_name::<T>(),
            message: format!("resolved argument {} holds a different type", index),
        }
    }

    /// The argument at `index` as a shared handle to concrete type `T`.
    pub fn arg<T: Send + Sync + 'static>(&self, index: usize) -> BeansResult<Arc<T>> {
        let slot = self.slot(index)?;
        bean_as::<T>(slot).ok_or_else(|| Self::mismatch::<T>(index))
    }

    /// The argument at `index` as a trait-object handle.
    pub fn arg_trait<T: ?Sized + Send + Sync + 'static>(
        &self,
        index: usize,
    ) -> BeansResult<Arc<T>> {
        let slot = self.slot(index)?;
        bean_as_trait::<T>(slot).ok_or_else(|| Self::mismatch::<T>(index))
    }

    /// The argument at `index` cloned out of its handle, for plain values
    /// like numbers and strings.
    pub fn arg_value<T: Clone + Send + Sync + 'static>(&self, index: usize) -> BeansResult<T> {
        Ok((*self.arg::<T>(index)?).clone())
    }

    /// The argument at `index` for an [`Optional`](ParamShape::Optional)
    /// slot: `None` if no candidate was available.
    pub fn arg_opt<T: Send + Sync + 'static>(&self, index: usize) -> BeansResult<Option<Arc<T>>> {
        let slot = self.slot(index)?;
        if bean_as::<NullBean>(slot).is_some() {
            return Ok(None);
        }
        self.arg::<T>(index).map(Some)
    }

    /// Trait-object variant of [`arg_opt`](Self::arg_opt).
    pub fn arg_opt_trait<T: ?Sized + Send + Sync + 'static>(
        &self,
        index: usize,
    ) -> BeansResult<Option<Arc<T>>> {
        let slot = self.slot(index)?;
        if bean_as::<NullBean>(slot).is_some() {
            return Ok(None);
        }
        self.arg_trait::<T>(index).map(Some)
    }

    /// The argument at `index` for a [`Vec`](ParamShape::Vec) slot of
    /// concrete element type `T`.
    pub fn arg_vec<T: Send + Sync + 'static>(&self, index: usize) -> BeansResult<Vec<Arc<T>>> {
        let slot = self.slot(index)?;
        let list = bean_as::<Vec<BeanArc>>(slot).ok_or_else(|| Self::mismatch::<Vec<T>>(index))?;
        list.iter()
            .map(|b| bean_as::<T>(b).ok_or_else(|| Self::mismatch::<T>(index)))
            .collect()
    }

    /// The argument at `index` for a [`Vec`](ParamShape::Vec) slot of trait
    /// objects.
    pub fn arg_trait_vec<T: ?Sized + Send + Sync + 'static>(
        &self,
        index: usize,
    ) -> BeansResult<Vec<Arc<T>>> {
        let slot = self.slot(index)?;
        let list =
            bean_as::<Vec<BeanArc>>(slot).ok_or_else(|| Self::mismatch::<Vec<Arc<T>>>(index))?;
        list.iter()
            .map(|b| bean_as_trait::<T>(b).ok_or_else(|| Self::mismatch::<T>(index)))
            .collect()
    }

    /// The argument at `index` for a [`Map`](ParamShape::Map) slot, pairing
    /// bean names with concrete instances in registration order.
    pub fn arg_map<T: Send + Sync + 'static>(
        &self,
        index: usize,
    ) -> BeansResult<Vec<(String, Arc<T>)>> {
        let slot = self.slot(index)?;
        let entries = bean_as::<Vec<(String, BeanArc)>>(slot)
            .ok_or_else(|| Self::mismatch::<Vec<(String, T)>>(index))?;
        entries
            .iter()
            .map(|(name, b)| {
                bean_as::<T>(b)
                    .map(|v| (name.clone(), v))
                    .ok_or_else(|| Self::mismatch::<T>(index))
            })
            .collect()
    }

    /// Trait-object variant of [`arg_map`](Self::arg_map).
    pub fn arg_trait_map<T: ?Sized + Send + Sync + 'static>(
        &self,
        index: usize,
    ) -> BeansResult<Vec<(String, Arc<T>)>> {
        let slot = self.slot(index)?;
        let entries = bean_as::<Vec<(String, BeanArc)>>(slot)
            .ok_or_else(|| Self::mismatch::<Vec<(String, Arc<T>)>>(index))?;
        entries
            .iter()
            .map(|(name, b)| {
                bean_as_trait::<T>(b)
                    .map(|v| (name.clone(), v))
                    .ok_or_else(|| Self::mismatch::<T>(index))
            })
            .collect()
    }

    /// The argument at `index` for a [`Provider`](ParamShape::Provider)
    /// slot over concrete type `T`.
    pub fn arg_provider<T: Send + Sync + 'static>(
        &self,
        index: usize,
    ) -> BeansResult<BeanProvider<T>> {
        let slot = self.slot(index)?;
        let seed = bean_as::<ProviderSeed>(slot)
            .ok_or_else(|| Self::mismatch::<BeanProvider<T>>(index))?;
        Ok(BeanProvider::concrete((*seed).clone()))
    }

    /// The argument at `index` for a [`Provider`](ParamShape::Provider)
    /// slot over a trait object.
    pub fn arg_trait_provider<T: ?Sized + Send + Sync + 'static>(
        &self,
        index: usize,
    ) -> BeansResult<BeanProvider<T>> {
        let slot = self.slot(index)?;
        let seed = bean_as::<ProviderSeed>(slot)
            .ok_or_else(|| Self::mismatch::<BeanProvider<T>>(index))?;
        Ok(BeanProvider::of_trait((*seed).clone()))
    }
}

pub(crate) type InvokeFn = dyn Fn(&ResolvedArgs) -> BeansResult<BeanArc> + Send + Sync;
pub(crate) type FactoryInvokeFn =
    dyn Fn(Option<&BeanArc>, &ResolvedArgs) -> BeansResult<BeanArc> + Send + Sync;
pub(crate) type MethodFn = dyn Fn(&BeanArc) -> BeansResult<()> + Send + Sync;
pub(crate) type SetterFn = dyn Fn(&BeanArc, BeanArc) -> BeansResult<()> + Send + Sync;
pub(crate) type CastFn = dyn Fn(&BeanArc) -> Option<BeanArc> + Send + Sync;
pub(crate) type SupplierFn = dyn Fn(&BeanFactory) -> BeansResult<BeanArc> + Send + Sync;
pub(crate) type FactoryBeanCastFn = dyn Fn(&BeanArc) -> Option<Arc<dyn FactoryBean>> + Send + Sync;

/// A declared constructor: its parameter list and an invocation closure that
/// extracts typed values from the resolved arguments.
#[derive(Clone)]
pub struct ConstructorSpec {
    /// Declared parameters, in order.
    pub params: Vec<ParamSpec>,
    pub(crate) invoke: Arc<InvokeFn>,
}

impl ConstructorSpec {
    pub fn new<T, F>(params: Vec<ParamSpec>, ctor: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&ResolvedArgs) -> BeansResult<T> + Send + Sync + 'static,
    {
        ConstructorSpec {
            params,
            invoke: Arc::new(move |args| Ok(Arc::new(ctor(args)?) as BeanArc)),
        }
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }
}

impl fmt::Debug for ConstructorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstructorSpec")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// A declared factory method, static or on a factory bean instance.
#[derive(Clone)]
pub struct FactoryMethodSpec {
    /// Method name, shared by every overload of the same method.
    pub name: &'static str,
    /// Declared parameters, in order.
    pub params: Vec<ParamSpec>,
    /// Declared product type, used for type prediction before creation.
    pub product: Option<TypeKey>,
    pub(crate) invoke: Arc<FactoryInvokeFn>,
}

impl FactoryMethodSpec {
    /// A static factory method: no factory instance involved.
    pub fn of_static<T, F>(name: &'static str, params: Vec<ParamSpec>, method: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&ResolvedArgs) -> BeansResult<T> + Send + Sync + 'static,
    {
        FactoryMethodSpec {
            name,
            params,
            product: Some(key_of::<T>()),
            invoke: Arc::new(move |_, args| Ok(Arc::new(method(args)?) as BeanArc)),
        }
    }

    /// A factory method invoked on the factory bean named by the owning
    /// definition. The closure receives the downcast factory instance.
    pub fn on_instance<B, T, F>(name: &'static str, params: Vec<ParamSpec>, method: F) -> Self
    where
        B: Send + Sync + 'static,
        T: Send + Sync + 'static,
        F: Fn(&B, &ResolvedArgs) -> BeansResult<T> + Send + Sync + 'static,
    {
        FactoryMethodSpec {
            name,
            params,
            product: Some(key_of::<T>()),
            invoke: Arc::new(move |instance, args| {
                let instance = instance.ok_or_else(|| {
                    BeansError::IllegalState(format!(
                        "factory method '{}' requires a factory bean instance",
                        name
                    ))
                })?;
                let factory = bean_as::<B>(instance).ok_or_else(|| BeansError::TypeMismatch {
                    required: any::type_name::<B>(),
                    message: format!("factory bean for method '{}' has a different type", name),
                })?;
                Ok(Arc::new(method(&factory, args)?) as BeanArc)
            }),
        }
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }
}

impl fmt::Debug for FactoryMethodSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryMethodSpec")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// A declared no-argument method, callable by name for init and destroy
/// handling.
#[derive(Clone)]
pub struct MethodSpec {
    pub name: &'static str,
    pub(crate) invoke: Arc<MethodFn>,
}

impl MethodSpec {
    pub fn of<T, F>(name: &'static str, method: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&T) -> BeansResult<()> + Send + Sync + 'static,
    {
        MethodSpec {
            name,
            invoke: Arc::new(move |bean| {
                let this = bean_as::<T>(bean).ok_or_else(|| BeansError::TypeMismatch {
                    required: any::type_name::<T>(),
                    message: format!("method '{}' declared on a different type", name),
                })?;
                method(&this)
            }),
        }
    }
}

impl fmt::Debug for MethodSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MethodSpec").field(&self.name).finish()
    }
}

/// A declared settable property on the bean type.
#[derive(Clone)]
pub struct PropertySpec {
    /// Property name, matched against configured property values.
    pub name: &'static str,
    /// Declared type; element type for `Vec`/`Map` shapes.
    pub key: TypeKey,
    /// Slot shape for autowiring and value shaping.
    pub shape: ParamShape,
    /// Whether the type counts as a simple configuration value.
    pub simple: bool,
    pub(crate) apply: Arc<SetterFn>,
}

impl PropertySpec {
    fn build<V: ?Sized + 'static>(
        name: &'static str,
        shape: ParamShape,
        apply: Arc<SetterFn>,
    ) -> Self {
        let key = key_of::<V>();
        PropertySpec {
            name,
            key,
            shape,
            simple: is_simple_value_type(key.id),
            apply,
        }
    }

    /// A property holding a shared handle to a concrete bean.
    pub fn of<T, V, F>(name: &'static str, setter: F) -> Self
    where
        T: Send + Sync + 'static,
        V: Send + Sync + 'static,
        F: Fn(&T, Arc<V>) + Send + Sync + 'static,
    {
        let apply: Arc<SetterFn> = Arc::new(move |bean, value| {
            let this = Self::target::<T>(bean, name)?;
            let value = bean_as::<V>(&value).ok_or_else(|| Self::value_mismatch::<V>(name))?;
            setter(&this, value);
            Ok(())
        });
        Self::build::<V>(name, ParamShape::Single, apply)
    }

    /// A property holding a plain value, cloned out of its handle.
    pub fn value<T, V, F>(name: &'static str, setter: F) -> Self
    where
        T: Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
        F: Fn(&T, V) + Send + Sync + 'static,
    {
        let apply: Arc<SetterFn> = Arc::new(move |bean, value| {
            let this = Self::target::<T>(bean, name)?;
            let value = bean_as::<V>(&value).ok_or_else(|| Self::value_mismatch::<V>(name))?;
            setter(&this, (*value).clone());
            Ok(())
        });
        Self::build::<V>(name, ParamShape::Single, apply)
    }

    /// A property holding a trait-object handle.
    pub fn of_trait<T, V, F>(name: &'static str, setter: F) -> Self
    where
        T: Send + Sync + 'static,
        V: ?Sized + Send + Sync + 'static,
        F: Fn(&T, Arc<V>) + Send + Sync + 'static,
    {
        let apply: Arc<SetterFn> = Arc::new(move |bean, value| {
            let this = Self::target::<T>(bean, name)?;
            let value = bean_as_trait::<V>(&value).ok_or_else(|| Self::value_mismatch::<V>(name))?;
            setter(&this, value);
            Ok(())
        });
        Self::build::<V>(name, ParamShape::Single, apply)
    }

    /// A property collecting every trait-object candidate.
    pub fn vec_of_trait<T, V, F>(name: &'static str, setter: F) -> Self
    where
        T: Send + Sync + 'static,
        V: ?Sized + Send + Sync + 'static,
        F: Fn(&T, Vec<Arc<V>>) + Send + Sync + 'static,
    {
        let apply: Arc<SetterFn> = Arc::new(move |bean, value| {
            let this = Self::target::<T>(bean, name)?;
            let list =
                bean_as::<Vec<BeanArc>>(&value).ok_or_else(|| Self::value_mismatch::<V>(name))?;
            let items = list
                .iter()
                .map(|b| bean_as_trait::<V>(b).ok_or_else(|| Self::value_mismatch::<V>(name)))
                .collect::<BeansResult<Vec<_>>>()?;
            setter(&this, items);
            Ok(())
        });
        Self::build::<V>(name, ParamShape::Vec, apply)
    }

    fn target<T: Send + Sync + 'static>(bean: &BeanArc, name: &'static str) -> BeansResult<Arc<T>> {
        bean_as::<T>(bean).ok_or_else(|| BeansError::TypeMismatch {
            required: any::type_name::<T>(),
            message: format!("property '{}' declared on a different type", name),
        })
    }

    fn value_mismatch<V: ?Sized>(name: &'static str) -> BeansError {
        BeansError::TypeMismatch {
            required: any::type_name::<V>(),
            message: format!("value for property '{}' has a different type", name),
        }
    }
}

impl fmt::Debug for PropertySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertySpec")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("shape", &self.shape)
            .finish_non_exhaustive()
    }
}

/// Exposes a definition's concrete product under an additional type key,
/// typically a trait the type implements. The cast closure turns the stored
/// concrete handle into a trait-object handle.
#[derive(Clone)]
pub struct TypeBinding {
    /// The additional key the bean answers by-type lookups for.
    pub key: TypeKey,
    pub(crate) cast: Arc<CastFn>,
}

impl TypeBinding {
    /// Binds concrete type `T` to target type `Tr`, usually written as
    /// `TypeBinding::of::<MyType, dyn MyTrait>(|a| a)` and letting unsize
    /// coercion do the work.
    pub fn of<T, Tr>(coerce: fn(Arc<T>) -> Arc<Tr>) -> Self
    where
        T: Send + Sync + 'static,
        Tr: ?Sized + Send + Sync + 'static,
    {
        TypeBinding {
            key: key_of::<Tr>(),
            cast: Arc::new(move |bean| {
                let concrete = bean_as::<T>(bean)?;
                Some(Arc::new(coerce(concrete)) as BeanArc)
            }),
        }
    }
}

impl fmt::Debug for TypeBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypeBinding").field(&self.key).finish()
    }
}

/// Type-erased lifecycle participation hooks, stamped out by the builder
/// from the concrete type's trait impls.
#[derive(Clone, Default)]
pub(crate) struct LifecycleHooks {
    pub initializing: Option<Arc<MethodFn>>,
    pub disposable: Option<Arc<MethodFn>>,
    pub name_aware: Option<Arc<dyn Fn(&BeanArc, &str) + Send + Sync>>,
    pub factory_aware: Option<Arc<dyn Fn(&BeanArc, &Arc<BeanFactory>) + Send + Sync>>,
    pub singletons_ready: Option<Arc<MethodFn>>,
    pub factory_bean: Option<Arc<FactoryBeanCastFn>>,
}

/// The recipe for one bean.
#[derive(Clone)]
pub struct BeanDefinition {
    pub(crate) type_key: Option<TypeKey>,
    pub(crate) type_name_hint: Option<String>,
    pub(crate) parent: Option<String>,
    pub(crate) scope: Option<BeanScope>,
    pub(crate) lazy_init: Option<bool>,
    pub(crate) abstract_def: bool,
    pub(crate) autowire_candidate: bool,
    pub(crate) primary: bool,
    pub(crate) priority: Option<i32>,
    pub(crate) role: BeanRole,
    pub(crate) description: Option<String>,
    pub(crate) ctors: Vec<ConstructorSpec>,
    pub(crate) factory_methods: Vec<FactoryMethodSpec>,
    pub(crate) factory_bean_name: Option<String>,
    pub(crate) instance_supplier: Option<Arc<SupplierFn>>,
    pub(crate) ctor_args: ConstructorArgumentValues,
    pub(crate) property_values: PropertyValues,
    pub(crate) autowire_mode: AutowireMode,
    pub(crate) dependency_check: DependencyCheck,
    pub(crate) depends_on: Vec<String>,
    pub(crate) properties: Vec<PropertySpec>,
    pub(crate) bindings: Vec<TypeBinding>,
    pub(crate) methods: Vec<MethodSpec>,
    pub(crate) init_method_names: Vec<String>,
    pub(crate) destroy_method_names: Vec<String>,
    pub(crate) qualifiers: Vec<String>,
    pub(crate) hooks: LifecycleHooks,
    pub(crate) eager_product: bool,
}

impl Default for BeanDefinition {
    fn default() -> Self {
        BeanDefinition {
            type_key: None,
            type_name_hint: None,
            parent: None,
            scope: None,
            lazy_init: None,
            abstract_def: false,
            autowire_candidate: true,
            primary: false,
            priority: None,
            role: BeanRole::default(),
            description: None,
            ctors: Vec::new(),
            factory_methods: Vec::new(),
            factory_bean_name: None,
            instance_supplier: None,
            ctor_args: ConstructorArgumentValues::new(),
            property_values: PropertyValues::new(),
            autowire_mode: AutowireMode::default(),
            dependency_check: DependencyCheck::default(),
            depends_on: Vec::new(),
            properties: Vec::new(),
            bindings: Vec::new(),
            methods: Vec::new(),
            init_method_names: Vec::new(),
            destroy_method_names: Vec::new(),
            qualifiers: Vec::new(),
            hooks: LifecycleHooks::default(),
            eager_product: false,
        }
    }
}

impl BeanDefinition {
    /// Starts a typed builder for beans of concrete type `T`.
    pub fn of<T: Send + Sync + 'static>() -> BeanDefinitionBuilder<T> {
        let mut def = BeanDefinition::default();
        def.type_key = Some(key_of::<T>());
        BeanDefinitionBuilder {
            def,
            _marker: PhantomData,
        }
    }

    /// Starts an untyped child builder inheriting from the named parent
    /// definition.
    pub fn child_of(parent: impl Into<String>) -> BeanDefinitionBuilder<()> {
        let mut def = BeanDefinition::default();
        def.parent = Some(parent.into());
        BeanDefinitionBuilder {
            def,
            _marker: PhantomData,
        }
    }

    /// Starts an untyped builder whose type is named for late binding
    /// through the container's type loader.
    pub fn named_type(type_name: impl Into<String>) -> BeanDefinitionBuilder<()> {
        let mut def = BeanDefinition::default();
        def.type_name_hint = Some(type_name.into());
        BeanDefinitionBuilder {
            def,
            _marker: PhantomData,
        }
    }

    /// The declared product type, if statically known.
    pub fn type_key(&self) -> Option<TypeKey> {
        self.type_key
    }

    /// The product type name for diagnostics.
    pub fn type_name(&self) -> &str {
        if let Some(key) = &self.type_key {
            key.name
        } else if let Some(hint) = &self.type_name_hint {
            hint
        } else {
            "<undetermined>"
        }
    }

    /// The parent definition name, if this is a child definition.
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Whether this definition is a pure template that cannot itself be
    /// instantiated.
    pub fn is_abstract(&self) -> bool {
        self.abstract_def
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn role(&self) -> BeanRole {
        self.role
    }

    pub(crate) fn method_named(&self, name: &str) -> Option<&MethodSpec> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Checks the definition for contradictions before registration.
    pub fn validate(&self, name: &str) -> BeansResult<()> {
        let invalid = |message: String| BeansError::DefinitionValidation {
            name: name.to_string(),
            message,
        };
        if self.factory_bean_name.is_some() && self.factory_methods.is_empty() {
            return Err(invalid(
                "a factory bean name requires at least one factory method".into(),
            ));
        }
        if !self.factory_methods.is_empty() && !self.ctors.is_empty() {
            return Err(invalid(
                "cannot combine factory methods with declared constructors".into(),
            ));
        }
        if let Some(first) = self.factory_methods.first() {
            if self.factory_methods.iter().any(|m| m.name != first.name) {
                return Err(invalid(
                    "factory method overloads must share one method name".into(),
                ));
            }
        }
        if self.init_method_names.iter().any(|n| n == INFER_METHOD) {
            return Err(invalid(
                "destroy-method inference sentinel is not valid as an init method".into(),
            ));
        }
        let mut seen = HashSet::new();
        for method in &self.methods {
            if !seen.insert(method.name) {
                return Err(invalid(format!(
                    "method '{}' declared more than once",
                    method.name
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for BeanDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanDefinition")
            .field("type", &self.type_name())
            .field("parent", &self.parent)
            .field("scope", &self.scope)
            .field("abstract", &self.abstract_def)
            .field("autowire_mode", &self.autowire_mode)
            .field("ctors", &self.ctors.len())
            .field("factory_methods", &self.factory_methods.len())
            .finish_non_exhaustive()
    }
}

/// Fluent construction of a [`BeanDefinition`], typed on the concrete bean
/// type so constructor, property, and lifecycle closures can be captured
/// without boilerplate.
pub struct BeanDefinitionBuilder<T = ()> {
    def: BeanDefinition,
    _marker: PhantomData<fn() -> T>,
}

impl<T> BeanDefinitionBuilder<T> {
    /// Finishes the builder.
    pub fn build(self) -> BeanDefinition {
        self.def
    }

    pub fn parent(mut self, name: impl Into<String>) -> Self {
        self.def.parent = Some(name.into());
        self
    }

    pub fn scope(mut self, scope: BeanScope) -> Self {
        self.def.scope = Some(scope);
        self
    }

    pub fn prototype(self) -> Self {
        self.scope(BeanScope::Prototype)
    }

    pub fn lazy(mut self) -> Self {
        self.def.lazy_init = Some(true);
        self
    }

    /// Marks the definition as a template only; instantiation attempts fail.
    pub fn abstract_def(mut self) -> Self {
        self.def.abstract_def = true;
        self
    }

    /// Excludes the bean from by-type autowiring.
    pub fn not_autowire_candidate(mut self) -> Self {
        self.def.autowire_candidate = false;
        self
    }

    /// Marks the bean as the preferred candidate when several match.
    pub fn primary(mut self) -> Self {
        self.def.primary = true;
        self
    }

    /// Assigns an ordering value; lower values win ties and sort first in
    /// collection injection.
    pub fn priority(mut self, value: i32) -> Self {
        self.def.priority = Some(value);
        self
    }

    pub fn role(mut self, role: BeanRole) -> Self {
        self.def.role = role;
        self
    }

    /// Human-readable origin, echoed in creation failures.
    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.def.description = Some(text.into());
        self
    }

    /// Adds a qualifier alias this bean answers qualified injection points
    /// for.
    pub fn qualifier(mut self, name: impl Into<String>) -> Self {
        self.def.qualifiers.push(name.into());
        self
    }

    pub fn autowire(mut self, mode: AutowireMode) -> Self {
        self.def.autowire_mode = mode;
        self
    }

    pub fn dependency_check(mut self, check: DependencyCheck) -> Self {
        self.def.dependency_check = check;
        self
    }

    /// Beans that must be fully created before this one, and torn down
    /// after it.
    pub fn depends_on<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.def.depends_on.extend(names.into_iter().map(Into::into));
        self
    }

    /// Adds a positional constructor argument value.
    pub fn arg_indexed(mut self, index: usize, value: Value) -> Self {
        self.def.ctor_args.add_indexed(index, ValueHolder::new(value));
        self
    }

    /// Adds a constructor argument matched to a parameter by type at
    /// resolution time.
    pub fn arg(mut self, value: Value) -> Self {
        self.def.ctor_args.add_generic(ValueHolder::new(value));
        self
    }

    /// Adds a constructor argument matched to the parameter declared with
    /// the given name.
    pub fn arg_named(mut self, name: impl Into<String>, value: Value) -> Self {
        self.def
            .ctor_args
            .add_generic(ValueHolder::new(value).with_name(name));
        self
    }

    /// Adds a prepared argument holder.
    pub fn arg_holder(mut self, index: Option<usize>, holder: ValueHolder) -> Self {
        match index {
            Some(i) => {
                self.def.ctor_args.add_indexed(i, holder);
            }
            None => {
                self.def.ctor_args.add_generic(holder);
            }
        }
        self
    }

    /// Configures a property value applied after instantiation.
    pub fn property(mut self, name: impl Into<String>, value: Value) -> Self {
        self.def.property_values.add(name, value);
        self
    }

    /// Configures a property value that is dropped silently when the type
    /// declares no such property.
    pub fn property_optional(mut self, name: impl Into<String>, value: Value) -> Self {
        self.def
            .property_values
            .add_value(PropertyValue::new(name, value).optional());
        self
    }

    /// Registers a raw factory method spec.
    pub fn factory_method(mut self, spec: FactoryMethodSpec) -> Self {
        self.def.factory_methods.push(spec);
        self
    }

    /// Names the bean whose instance the factory methods are invoked on.
    pub fn factory_bean(mut self, name: impl Into<String>) -> Self {
        self.def.factory_bean_name = Some(name.into());
        self
    }

    /// Pushes a declared method into the pool for init and destroy handling.
    pub fn method_spec(mut self, spec: MethodSpec) -> Self {
        self.def.methods.push(spec);
        self
    }

    /// Names a pooled method to run during initialization, in declaration
    /// order.
    pub fn init_method_name(mut self, name: impl Into<String>) -> Self {
        self.def.init_method_names.push(name.into());
        self
    }

    /// Names a pooled method to run at destruction.
    pub fn destroy_method_name(mut self, name: impl Into<String>) -> Self {
        self.def.destroy_method_names.push(name.into());
        self
    }

    /// Requests destroy-method inference: at destruction, a pooled method
    /// named `close` or `shutdown` runs if one exists.
    pub fn infer_destroy_method(self) -> Self {
        self.destroy_method_name(INFER_METHOD)
    }

    /// Requests creation of the factory-bean product during eager singleton
    /// pre-instantiation, not just on first use.
    pub fn eager_product(mut self) -> Self {
        self.def.eager_product = true;
        self
    }
}

impl<T: Send + Sync + 'static> BeanDefinitionBuilder<T> {
    /// Declares a constructor with its parameter list and invocation
    /// closure.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use beanforge::{BeanDefinition, ParamSpec};
    /// use std::sync::Arc;
    ///
    /// struct Repo;
    /// struct Service { repo: Arc<Repo> }
    ///
    /// let def = BeanDefinition::of::<Service>()
    ///     .constructor(vec![ParamSpec::of::<Repo>()], |args| {
    ///         Ok(Service { repo: args.arg::<Repo>(0)? })
    ///     })
    ///     .build();
    /// assert_eq!(def.type_name(), std::any::type_name::<Service>());
    /// ```
    pub fn constructor<F>(mut self, params: Vec<ParamSpec>, ctor: F) -> Self
    where
        F: Fn(&ResolvedArgs) -> BeansResult<T> + Send + Sync + 'static,
    {
        self.def.ctors.push(ConstructorSpec::new(params, ctor));
        self
    }

    /// Declares a no-argument constructor.
    pub fn constructor0<F>(self, ctor: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.constructor(Vec::new(), move |_| Ok(ctor()))
    }

    /// Declares a static factory method producing `T`.
    pub fn static_factory<F>(self, name: &'static str, params: Vec<ParamSpec>, method: F) -> Self
    where
        F: Fn(&ResolvedArgs) -> BeansResult<T> + Send + Sync + 'static,
    {
        self.factory_method(FactoryMethodSpec::of_static::<T, F>(name, params, method))
    }

    /// Declares a factory method invoked on the named factory bean of
    /// concrete type `B`.
    pub fn instance_factory<B, F>(
        self,
        factory_bean: impl Into<String>,
        name: &'static str,
        params: Vec<ParamSpec>,
        method: F,
    ) -> Self
    where
        B: Send + Sync + 'static,
        F: Fn(&B, &ResolvedArgs) -> BeansResult<T> + Send + Sync + 'static,
    {
        self.factory_bean(factory_bean)
            .factory_method(FactoryMethodSpec::on_instance::<B, T, F>(name, params, method))
    }

    /// Supplies instances through a closure with full container access,
    /// bypassing constructor resolution.
    pub fn supplier<F>(mut self, supplier: F) -> Self
    where
        F: Fn(&BeanFactory) -> BeansResult<T> + Send + Sync + 'static,
    {
        self.def.instance_supplier = Some(Arc::new(move |factory| {
            Ok(Arc::new(supplier(factory)?) as BeanArc)
        }));
        self
    }

    /// Uses the given instance as the singleton, sharing it on every
    /// request.
    pub fn instance(mut self, value: T) -> Self {
        let shared = Arc::new(value);
        self.def.instance_supplier = Some(Arc::new(move |_| Ok(shared.clone() as BeanArc)));
        self
    }

    /// Exposes the bean under a trait key for by-type lookups, written
    /// `implements::<dyn MyTrait>(|a| a)`.
    pub fn implements<Tr>(mut self, coerce: fn(Arc<T>) -> Arc<Tr>) -> Self
    where
        Tr: ?Sized + Send + Sync + 'static,
    {
        self.def.bindings.push(TypeBinding::of::<T, Tr>(coerce));
        self
    }

    /// Declares a settable property holding a concrete bean handle.
    pub fn settable<V, F>(mut self, name: &'static str, setter: F) -> Self
    where
        V: Send + Sync + 'static,
        F: Fn(&T, Arc<V>) + Send + Sync + 'static,
    {
        self.def.properties.push(PropertySpec::of::<T, V, F>(name, setter));
        self
    }

    /// Declares a settable property holding a plain value.
    pub fn settable_value<V, F>(mut self, name: &'static str, setter: F) -> Self
    where
        V: Clone + Send + Sync + 'static,
        F: Fn(&T, V) + Send + Sync + 'static,
    {
        self.def
            .properties
            .push(PropertySpec::value::<T, V, F>(name, setter));
        self
    }

    /// Declares a settable property holding a trait-object handle.
    pub fn settable_trait<V, F>(mut self, name: &'static str, setter: F) -> Self
    where
        V: ?Sized + Send + Sync + 'static,
        F: Fn(&T, Arc<V>) + Send + Sync + 'static,
    {
        self.def
            .properties
            .push(PropertySpec::of_trait::<T, V, F>(name, setter));
        self
    }

    /// Declares a settable property collecting every trait-object
    /// candidate.
    pub fn settable_trait_vec<V, F>(mut self, name: &'static str, setter: F) -> Self
    where
        V: ?Sized + Send + Sync + 'static,
        F: Fn(&T, Vec<Arc<V>>) + Send + Sync + 'static,
    {
        self.def
            .properties
            .push(PropertySpec::vec_of_trait::<T, V, F>(name, setter));
        self
    }

    /// Declares a pooled method on `T`, callable as an init or destroy
    /// method by name.
    pub fn method<F>(self, name: &'static str, method: F) -> Self
    where
        F: Fn(&T) -> BeansResult<()> + Send + Sync + 'static,
    {
        self.method_spec(MethodSpec::of::<T, F>(name, method))
    }

    /// Declares a method and registers it as an init method in one step.
    pub fn init_method<F>(self, name: &'static str, method: F) -> Self
    where
        F: Fn(&T) -> BeansResult<()> + Send + Sync + 'static,
    {
        self.method(name, method).init_method_name(name)
    }

    /// Declares a method and registers it as a destroy method in one step.
    pub fn destroy_method<F>(self, name: &'static str, method: F) -> Self
    where
        F: Fn(&T) -> BeansResult<()> + Send + Sync + 'static,
    {
        self.method(name, method).destroy_method_name(name)
    }

    /// Wires up the [`Initializing`] impl of `T`.
    pub fn initializing(mut self) -> Self
    where
        T: Initializing,
    {
        self.def.hooks.initializing = Some(Arc::new(|bean| {
            let this = bean_as::<T>(bean).ok_or_else(|| BeansError::IllegalState(
                "initialization hook reached a bean of a different type".into(),
            ))?;
            this.after_properties_set()
        }));
        self
    }

    /// Wires up the [`Disposable`] impl of `T`.
    pub fn disposable(mut self) -> Self
    where
        T: Disposable,
    {
        self.def.hooks.disposable = Some(Arc::new(|bean| {
            let this = bean_as::<T>(bean).ok_or_else(|| BeansError::IllegalState(
                "destroy hook reached a bean of a different type".into(),
            ))?;
            this.destroy()
        }));
        self
    }

    /// Wires up the [`BeanNameAware`] impl of `T`.
    pub fn bean_name_aware(mut self) -> Self
    where
        T: BeanNameAware,
    {
        self.def.hooks.name_aware = Some(Arc::new(|bean, name| {
            if let Some(this) = bean_as::<T>(bean) {
                this.set_bean_name(name);
            }
        }));
        self
    }

    /// Wires up the [`BeanFactoryAware`] impl of `T`.
    pub fn bean_factory_aware(mut self) -> Self
    where
        T: BeanFactoryAware,
    {
        self.def.hooks.factory_aware = Some(Arc::new(|bean, factory| {
            if let Some(this) = bean_as::<T>(bean) {
                this.set_bean_factory(Arc::downgrade(factory));
            }
        }));
        self
    }

    /// Wires up the [`SingletonsInstantiated`] impl of `T`, called once
    /// after eager singleton pre-instantiation completes.
    pub fn singletons_instantiated(mut self) -> Self
    where
        T: SingletonsInstantiated,
    {
        self.def.hooks.singletons_ready = Some(Arc::new(|bean| {
            let this = bean_as::<T>(bean).ok_or_else(|| BeansError::IllegalState(
                "singleton-ready hook reached a bean of a different type".into(),
            ))?;
            this.after_singletons_instantiated()
        }));
        self
    }

    /// Marks `T` as a [`FactoryBean`]: requests for the bean name yield the
    /// factory's product, while `&`-prefixed requests yield the factory
    /// itself.
    pub fn produces(mut self) -> Self
    where
        T: FactoryBean,
    {
        self.def.hooks.factory_bean = Some(Arc::new(|bean| {
            bean_as::<T>(bean).map(|t| t as Arc<dyn FactoryBean>)
        }));
        self
    }
}
