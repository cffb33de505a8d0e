//! The bean factory: definition registry, singleton cache, and the public
//! lookup API.
//!
//! A [`BeanFactory`] holds bean definitions and hands out the instances
//! they describe. Singletons are created once and shared; prototypes are
//! created per request; custom scopes delegate storage to a registered
//! [`Scope`]. Factories form hierarchies: lookups fall back to the parent
//! when the local factory has no definition for a name.
//!
//! Requesting `"&name"` returns the factory bean registered under `name`
//! rather than the product it manufactures.

mod autowire;
mod constructor;
mod create;
mod value_resolver;

use std::any;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use tracing::{debug, trace, warn};

use crate::convert::{SimpleTypeConverter, TypeConverter};
use crate::definition::merged::MergedBeanDefinition;
use crate::definition::{BeanDefinition, BeanScope, Value};
use crate::descriptor::{BeanProvider, DependencyComparator, DependencyDescriptor, ProviderSeed};
use crate::disposal::DisposableAdapter;
use crate::error::{BeansError, BeansResult};
use crate::key::{bean_as, bean_as_trait, is_null_bean, key_of, trait_bean, BeanArc, TypeKey};
use crate::processor::{
    self, AfterInitialization, AfterInstantiation, BeforeInitialization, BeforeInstantiation,
    ConstructorSelector, DestructionProcessor, EarlyReferenceProcessor, MergedDefinitionProcessor,
    ProcessorRegistry, PropertyProcessor,
};
use crate::singleton::SingletonRegistry;

/// Prefix that dereferences a factory bean: `get_bean("&conn")` returns
/// the factory registered under `"conn"`, not its product.
pub const FACTORY_BEAN_PREFIX: char = '&';

/// Storage strategy for beans outside the built-in singleton and
/// prototype lifecycles.
pub trait Scope: Send + Sync {
    /// Returns the scoped instance, creating it through `create` when the
    /// scope holds none.
    fn get(
        &self,
        name: &str,
        create: &mut dyn FnMut() -> BeansResult<BeanArc>,
    ) -> BeansResult<BeanArc>;

    /// Removes the named instance from the scope, returning it if present.
    fn remove(&self, name: &str) -> Option<BeanArc>;

    /// Registers a callback the scope is expected to run when it evicts
    /// the named instance. Scopes without destruction support may ignore
    /// it.
    fn register_destruction_callback(&self, _name: &str, _callback: Box<dyn FnOnce() + Send>) {}
}

/// Resolves late-bound type names to type keys, for definitions declared
/// with [`BeanDefinition::named_type`] before their concrete type is
/// linked in.
pub trait TypeLoader: Send + Sync {
    fn resolve(&self, type_name: &str) -> Option<TypeKey>;
}

type EmbeddedResolver = dyn Fn(&str) -> Option<String> + Send + Sync;

#[derive(Clone, Default)]
struct DefinitionMap {
    entries: HashMap<String, Arc<BeanDefinition>>,
    order: Vec<String>,
}

impl DefinitionMap {
    fn insert(&mut self, name: String, def: Arc<BeanDefinition>) -> bool {
        let existed = self.entries.insert(name.clone(), def).is_some();
        if !existed {
            self.order.push(name);
        }
        existed
    }

    fn remove(&mut self, name: &str) -> bool {
        self.order.retain(|n| n != name);
        self.entries.remove(name).is_some()
    }
}

thread_local! {
    /// Prototype names in creation on this thread, per factory instance.
    static PROTOTYPES_IN_CREATION: RefCell<HashMap<usize, HashSet<String>>> =
        RefCell::new(HashMap::new());
}

/// The container core. Construct through [`BeanFactory::new`] or
/// [`BeanFactory::builder`]; both return an `Arc` because beans and
/// providers hold weak references back to their factory.
///
/// # Examples
///
/// ```rust
/// use beanforge::{BeanDefinition, BeanFactory};
///
/// struct Clock;
/// struct Scheduler {
///     clock: std::sync::Arc<Clock>,
/// }
///
/// let factory = BeanFactory::new();
/// factory
///     .register_bean_definition("clock", BeanDefinition::of::<Clock>().constructor0(|| Clock).build())
///     .unwrap();
/// factory
///     .register_bean_definition(
///         "scheduler",
///         BeanDefinition::of::<Scheduler>()
///             .constructor(vec![beanforge::ParamSpec::of::<Clock>()], |args| {
///                 Ok(Scheduler { clock: args.arg::<Clock>(0)? })
///             })
///             .build(),
///     )
///     .unwrap();
///
/// let scheduler = factory.get_bean_as::<Scheduler>("scheduler").unwrap();
/// let clock = factory.get_bean_as::<Clock>("clock").unwrap();
/// assert!(std::sync::Arc::ptr_eq(&scheduler.clock, &clock));
/// ```
pub struct BeanFactory {
    weak_self: Weak<BeanFactory>,
    parent: Option<Arc<BeanFactory>>,
    definitions: RwLock<Arc<DefinitionMap>>,
    aliases: RwLock<HashMap<String, String>>,
    merged: RwLock<HashMap<String, Arc<MergedBeanDefinition>>>,
    pub(crate) registry: SingletonRegistry,
    pub(crate) processors: ProcessorRegistry,
    converter: RwLock<Arc<dyn TypeConverter>>,
    dependency_comparator: RwLock<Option<Arc<dyn DependencyComparator>>>,
    embedded_resolvers: RwLock<Vec<Arc<EmbeddedResolver>>>,
    resolvables: RwLock<Vec<(TypeKey, BeanArc)>>,
    scopes: RwLock<HashMap<String, Arc<dyn Scope>>>,
    type_loader: RwLock<Option<Arc<dyn TypeLoader>>>,
    /// Names that have been created, or are being created, for actual use
    /// rather than for type probing.
    already_created: RwLock<HashSet<String>>,
    type_cache: RwLock<HashMap<TypeKey, Arc<Vec<String>>>>,
    frozen: AtomicBool,
    allow_circular: bool,
    allow_raw_injection: bool,
    allow_definition_override: bool,
    cache_bean_metadata: bool,
    inner_bean_seq: AtomicU64,
}

/// Configures and builds a [`BeanFactory`].
pub struct BeanFactoryBuilder {
    parent: Option<Arc<BeanFactory>>,
    converter: Option<Arc<dyn TypeConverter>>,
    dependency_comparator: Option<Arc<dyn DependencyComparator>>,
    type_loader: Option<Arc<dyn TypeLoader>>,
    allow_circular: bool,
    allow_raw_injection: bool,
    allow_definition_override: bool,
    cache_bean_metadata: bool,
}

impl Default for BeanFactoryBuilder {
    fn default() -> Self {
        BeanFactoryBuilder {
            parent: None,
            converter: None,
            dependency_comparator: None,
            type_loader: None,
            allow_circular: true,
            allow_raw_injection: false,
            allow_definition_override: true,
            cache_bean_metadata: true,
        }
    }
}

impl BeanFactoryBuilder {
    pub fn new() -> Self {
        BeanFactoryBuilder::default()
    }

    /// Parent factory consulted when a name has no local definition.
    pub fn parent(mut self, parent: Arc<BeanFactory>) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Whether singletons may resolve circular references through early
    /// references. On by default.
    pub fn allow_circular_references(mut self, allow: bool) -> Self {
        self.allow_circular = allow;
        self
    }

    /// Whether a bean that got wrapped during initialization may still
    /// leave its raw early reference injected elsewhere. Off by default;
    /// the mismatch fails creation.
    pub fn allow_raw_injection_despite_wrapping(mut self, allow: bool) -> Self {
        self.allow_raw_injection = allow;
        self
    }

    /// Whether re-registering a bean definition under an existing name
    /// replaces it. On by default.
    pub fn allow_definition_overriding(mut self, allow: bool) -> Self {
        self.allow_definition_override = allow;
        self
    }

    /// Whether merged definitions are cached between lookups. On by
    /// default; off re-merges on every access, so definition edits take
    /// effect immediately.
    pub fn cache_bean_metadata(mut self, cache: bool) -> Self {
        self.cache_bean_metadata = cache;
        self
    }

    pub fn converter(mut self, converter: Arc<dyn TypeConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    /// Comparator applied to ordered collection results instead of the
    /// default priority sort.
    pub fn dependency_comparator(mut self, comparator: Arc<dyn DependencyComparator>) -> Self {
        self.dependency_comparator = Some(comparator);
        self
    }

    pub fn type_loader(mut self, loader: Arc<dyn TypeLoader>) -> Self {
        self.type_loader = Some(loader);
        self
    }

    pub fn build(self) -> Arc<BeanFactory> {
        Arc::new_cyclic(|weak| BeanFactory {
            weak_self: weak.clone(),
            parent: self.parent,
            definitions: RwLock::new(Arc::new(DefinitionMap::default())),
            aliases: RwLock::new(HashMap::new()),
            merged: RwLock::new(HashMap::new()),
            registry: SingletonRegistry::default(),
            processors: ProcessorRegistry::default(),
            converter: RwLock::new(
                self.converter
                    .unwrap_or_else(|| Arc::new(SimpleTypeConverter::new())),
            ),
            dependency_comparator: RwLock::new(self.dependency_comparator),
            embedded_resolvers: RwLock::new(Vec::new()),
            resolvables: RwLock::new(Vec::new()),
            scopes: RwLock::new(HashMap::new()),
            type_loader: RwLock::new(self.type_loader),
            already_created: RwLock::new(HashSet::new()),
            type_cache: RwLock::new(HashMap::new()),
            frozen: AtomicBool::new(false),
            allow_circular: self.allow_circular,
            allow_raw_injection: self.allow_raw_injection,
            allow_definition_override: self.allow_definition_override,
            cache_bean_metadata: self.cache_bean_metadata,
            inner_bean_seq: AtomicU64::new(0),
        })
    }
}

fn strip_factory_prefix(name: &str) -> (&str, bool) {
    let mut rest = name;
    let mut dereference = false;
    while let Some(stripped) = rest.strip_prefix(FACTORY_BEAN_PREFIX) {
        rest = stripped;
        dereference = true;
    }
    (rest, dereference)
}

impl BeanFactory {
    /// A standalone factory with default settings.
    pub fn new() -> Arc<BeanFactory> {
        BeanFactoryBuilder::new().build()
    }

    pub fn builder() -> BeanFactoryBuilder {
        BeanFactoryBuilder::new()
    }

    pub fn parent(&self) -> Option<&Arc<BeanFactory>> {
        self.parent.as_ref()
    }

    pub(crate) fn weak(&self) -> Weak<BeanFactory> {
        self.weak_self.clone()
    }

    // ---- names and aliases ----

    /// Resolves an alias chain to the definition name it points at.
    pub fn canonical_name(&self, name: &str) -> String {
        let aliases = self.aliases.read().unwrap();
        let mut current = name;
        while let Some(target) = aliases.get(current) {
            current = target;
        }
        current.to_string()
    }

    /// Registers `alias` as an alternative name for `name`.
    pub fn register_alias(&self, name: &str, alias: &str) -> BeansResult<()> {
        if alias == name {
            self.aliases.write().unwrap().remove(alias);
            return Ok(());
        }
        let mut aliases = self.aliases.write().unwrap();
        if let Some(existing) = aliases.get(alias) {
            if existing == name {
                return Ok(());
            }
            if !self.allow_definition_override {
                return Err(BeansError::IllegalState(format!(
                    "cannot define alias '{}' for name '{}': it is already registered for name '{}'",
                    alias, name, existing
                )));
            }
        }
        // Walk the chain from `name`; reaching `alias` would close a loop.
        let mut current = name;
        while let Some(target) = aliases.get(current) {
            if target == alias {
                return Err(BeansError::IllegalState(format!(
                    "circular reference between alias '{}' and name '{}'",
                    alias, name
                )));
            }
            current = target;
        }
        aliases.insert(alias.to_string(), name.to_string());
        Ok(())
    }

    /// Every alias registered for a canonical name.
    pub fn aliases_of(&self, name: &str) -> Vec<String> {
        let canonical = self.canonical_name(name);
        let aliases = self.aliases.read().unwrap();
        aliases
            .keys()
            .filter(|alias| {
                let mut current = alias.as_str();
                while let Some(target) = aliases.get(current) {
                    if target == &canonical {
                        return true;
                    }
                    current = target;
                }
                false
            })
            .cloned()
            .collect()
    }

    // ---- definition registry ----

    /// Registers a bean definition under `name`.
    ///
    /// Re-registering an existing name replaces the definition (unless
    /// overriding was disabled on the builder) and discards any singleton
    /// already created from the old one.
    pub fn register_bean_definition(
        &self,
        name: impl Into<String>,
        definition: BeanDefinition,
    ) -> BeansResult<()> {
        let name = name.into();
        definition.validate(&name)?;
        let definition = Arc::new(definition);

        let existing_role = {
            let defs = self.definitions.read().unwrap();
            defs.entries.get(&name).map(|d| d.role())
        };
        if let Some(old_role) = existing_role {
            if !self.allow_definition_override {
                return Err(BeansError::DefinitionStore {
                    name,
                    message: "a bean definition is already registered under this name and \
                              overriding is disallowed"
                        .into(),
                });
            }
            if old_role != definition.role() {
                warn!(bean = %name, "overriding bean definition with one of a different role");
            } else {
                debug!(bean = %name, "overriding bean definition");
            }
        }

        {
            let mut defs = self.definitions.write().unwrap();
            Arc::make_mut(&mut defs).insert(name.clone(), definition);
        }
        if existing_role.is_some() || self.registry.contains_singleton(&name) {
            self.reset_bean_definition(&name, &mut HashSet::new());
        }
        self.clear_type_cache();
        Ok(())
    }

    /// Removes the definition registered under `name`.
    pub fn remove_bean_definition(&self, name: &str) -> BeansResult<()> {
        let removed = {
            let mut defs = self.definitions.write().unwrap();
            Arc::make_mut(&mut defs).remove(name)
        };
        if !removed {
            return Err(BeansError::NoSuchBean(name.to_string()));
        }
        self.reset_bean_definition(name, &mut HashSet::new());
        self.clear_type_cache();
        Ok(())
    }

    fn reset_bean_definition(&self, name: &str, visited: &mut HashSet<String>) {
        if !visited.insert(name.to_string()) {
            return;
        }
        if let Some(merged) = self.merged.read().unwrap().get(name) {
            merged.mark_stale();
        }
        self.merged.write().unwrap().remove(name);
        if self.registry.contains_singleton(name) {
            self.registry.destroy_singleton(name);
        }
        let snapshot = self.definitions_snapshot();
        for other in &snapshot.order {
            if other != name {
                if let Some(def) = snapshot.entries.get(other) {
                    if def.parent() == Some(name) {
                        self.reset_bean_definition(other, visited);
                    }
                }
            }
        }
    }

    pub fn contains_bean_definition(&self, name: &str) -> bool {
        self.definitions.read().unwrap().entries.contains_key(name)
    }

    /// The raw definition registered under `name` in this factory.
    pub fn bean_definition(&self, name: &str) -> BeansResult<Arc<BeanDefinition>> {
        self.definitions
            .read()
            .unwrap()
            .entries
            .get(name)
            .cloned()
            .ok_or_else(|| BeansError::NoSuchBean(name.to_string()))
    }

    /// Definition names in registration order.
    pub fn bean_definition_names(&self) -> Vec<String> {
        self.definitions.read().unwrap().order.clone()
    }

    pub fn definition_count(&self) -> usize {
        self.definitions.read().unwrap().order.len()
    }

    pub(crate) fn definitions_snapshot(&self) -> Arc<DefinitionMap> {
        Arc::clone(&self.definitions.read().unwrap())
    }

    // ---- merged definitions ----

    /// The flattened definition for `name`, with parent definitions merged
    /// in, consulting ancestor factories when the name is not local.
    pub(crate) fn merged_definition(
        &self,
        name: &str,
    ) -> BeansResult<Arc<MergedBeanDefinition>> {
        {
            let merged = self.merged.read().unwrap();
            if let Some(existing) = merged.get(name) {
                if !existing.is_stale() {
                    return Ok(Arc::clone(existing));
                }
            }
        }
        if !self.contains_bean_definition(name) {
            if let Some(parent) = &self.parent {
                return parent.merged_definition(name);
            }
        }
        let def = self.bean_definition(name)?;
        let merged = Arc::new(self.merge_with_parents(name, &def)?);
        if self.cache_bean_metadata {
            self.merged
                .write()
                .unwrap()
                .insert(name.to_string(), Arc::clone(&merged));
        }
        Ok(merged)
    }

    pub(crate) fn merge_with_parents(
        &self,
        name: &str,
        def: &BeanDefinition,
    ) -> BeansResult<MergedBeanDefinition> {
        let Some(parent_name) = def.parent() else {
            return Ok(MergedBeanDefinition::from_root(def));
        };
        let (parent_stripped, _) = strip_factory_prefix(parent_name);
        let parent_canonical = self.canonical_name(parent_stripped);
        let parent_merged = if parent_canonical != name {
            self.merged_definition(&parent_canonical)?
        } else {
            let Some(parent_factory) = &self.parent else {
                return Err(BeansError::DefinitionStore {
                    name: name.to_string(),
                    message: format!(
                        "could not resolve parent bean definition '{}': equal to own name with \
                         no parent factory",
                        parent_name
                    ),
                });
            };
            parent_factory.merged_definition(&parent_canonical)?
        };
        MergedBeanDefinition::from_child(&parent_merged, def, name)
    }

    fn check_merged(&self, name: &str, merged: &MergedBeanDefinition) -> BeansResult<()> {
        if merged.is_abstract() {
            return Err(BeansError::creation(
                name,
                merged.description(),
                "bean definition is abstract",
                None,
            ));
        }
        Ok(())
    }

    fn mark_bean_as_created(&self, name: &str) {
        if self.already_created.read().unwrap().contains(name) {
            return;
        }
        let mut created = self.already_created.write().unwrap();
        if created.insert(name.to_string()) {
            // Re-merge at creation time so the definition reflects any
            // metadata changes made since it was first merged.
            if let Some(merged) = self.merged.read().unwrap().get(name) {
                merged.mark_stale();
            }
            drop(created);
            self.clear_type_cache();
        }
    }

    pub(crate) fn was_created(&self, name: &str) -> bool {
        self.already_created.read().unwrap().contains(name)
    }

    /// Drops a singleton that only ever existed to answer type queries.
    /// Returns false when the bean is in actual use and must stay.
    pub(crate) fn remove_singleton_if_created_for_type_check_only(&self, name: &str) -> bool {
        if self.was_created(name) {
            return false;
        }
        self.registry.remove_singleton(name);
        true
    }

    // ---- lookup ----

    /// Returns the bean registered under `name`, creating it if its scope
    /// requires a fresh or first instance.
    ///
    /// # Errors
    ///
    /// [`BeansError::NoSuchBean`] when no definition or singleton exists
    /// under the name anywhere in the hierarchy, and any creation error
    /// the bean's pipeline produces.
    pub fn get_bean(&self, name: &str) -> BeansResult<BeanArc> {
        self.do_get_bean(name, None)
    }

    /// Like [`get_bean`](Self::get_bean) with explicit constructor
    /// arguments overriding the definition's configured values.
    pub fn get_bean_with_args(&self, name: &str, args: Vec<Value>) -> BeansResult<BeanArc> {
        self.do_get_bean(name, Some(&args))
    }

    /// The bean under `name`, downcast to `T`. Falls back to value
    /// conversion for configuration-style beans before failing.
    pub fn get_bean_as<T: Send + Sync + 'static>(&self, name: &str) -> BeansResult<Arc<T>> {
        let bean = self.get_bean(name)?;
        if let Some(value) = bean_as::<T>(&bean) {
            return Ok(value);
        }
        let converted = self
            .converter()
            .convert(bean, &key_of::<T>())
            .map_err(|_| self.wrong_type_error::<T>(name))?;
        bean_as::<T>(&converted).ok_or_else(|| self.wrong_type_error::<T>(name))
    }

    /// The bean under `name` as a trait object, using the definition's
    /// declared trait bindings.
    pub fn get_bean_trait<T: ?Sized + Send + Sync + 'static>(
        &self,
        name: &str,
    ) -> BeansResult<Arc<T>> {
        let bean = self.get_bean(name)?;
        if let Some(value) = bean_as_trait::<T>(&bean) {
            return Ok(value);
        }
        let (stripped, _) = strip_factory_prefix(name);
        let canonical = self.canonical_name(stripped);
        if self.contains_bean_definition(&canonical) {
            let merged = self.merged_definition(&canonical)?;
            let key = key_of::<T>();
            if let Some(binding) = merged.raw().bindings.iter().find(|b| b.key == key) {
                if let Some(handle) = (binding.cast)(&bean) {
                    if let Some(value) = bean_as_trait::<T>(&handle) {
                        return Ok(value);
                    }
                }
            }
        }
        Err(self.wrong_type_error::<T>(name))
    }

    fn wrong_type_error<T: ?Sized>(&self, name: &str) -> BeansError {
        let (stripped, _) = strip_factory_prefix(name);
        let canonical = self.canonical_name(stripped);
        let actual = self
            .bean_definition(&canonical)
            .ok()
            .and_then(|def| def.type_key())
            .map(|key| key.name);
        BeansError::BeanNotOfRequiredType {
            name: canonical,
            required: any::type_name::<T>(),
            actual,
        }
    }

    fn do_get_bean(&self, requested: &str, args: Option<&[Value]>) -> BeansResult<BeanArc> {
        let (stripped, wants_factory) = strip_factory_prefix(requested);
        let name = self.canonical_name(stripped);

        if args.is_none() {
            if let Some(shared) = self.registry.get_singleton(&name, true)? {
                if self.registry.is_currently_in_creation(&name) {
                    debug!(
                        bean = %name,
                        "returning eagerly cached instance that is not fully initialized yet"
                    );
                }
                return self.object_for_bean_instance(shared, &name, wants_factory);
            }
        }

        // A prototype re-entering its own creation on this thread can only
        // be an unresolvable cycle.
        if self.is_prototype_currently_in_creation(&name) {
            return Err(BeansError::CurrentlyInCreation(name));
        }

        if !self.contains_bean_definition(&name) {
            if let Some(parent) = &self.parent {
                let forwarded = if wants_factory {
                    format!("{}{}", FACTORY_BEAN_PREFIX, name)
                } else {
                    name.clone()
                };
                return parent.do_get_bean(&forwarded, args);
            }
        }

        self.mark_bean_as_created(&name);
        let merged = self.merged_definition(&name)?;
        self.check_merged(&name, &merged)?;

        for dep in merged.depends_on() {
            let dep = self.canonical_name(dep);
            if self.registry.is_dependent(&name, &dep) {
                return Err(BeansError::creation(
                    &name,
                    merged.description(),
                    format!(
                        "circular depends-on relationship between '{}' and '{}'",
                        name, dep
                    ),
                    None,
                ));
            }
            self.registry.register_dependent_bean(&dep, &name);
            self.get_bean(&dep).map_err(|err| {
                if matches!(err, BeansError::NoSuchBean(_)) {
                    BeansError::creation(
                        &name,
                        merged.description(),
                        format!("'{}' depends on missing bean '{}'", name, dep),
                        Some(err),
                    )
                } else {
                    err
                }
            })?;
        }

        let instance = if merged.is_singleton() {
            self.registry.get_or_create(&name, || {
                self.create_bean(&name, &merged, args).map_err(|err| {
                    // Creation may have registered partial state under the
                    // name; take it all back out before failing.
                    self.registry.destroy_singleton(&name);
                    err
                })
            })?
        } else if merged.is_prototype() {
            self.before_prototype_creation(&name);
            let created = self.create_bean(&name, &merged, args);
            self.after_prototype_creation(&name);
            created?
        } else {
            let BeanScope::Custom(scope_name) = merged.scope() else {
                return Err(BeansError::IllegalState(format!(
                    "bean '{}' has no resolvable scope",
                    name
                )));
            };
            let scope = self
                .scopes
                .read()
                .unwrap()
                .get(scope_name)
                .cloned()
                .ok_or_else(|| BeansError::NoSuchScope {
                    scope: scope_name.clone(),
                    name: name.clone(),
                })?;
            let mut creator = || {
                self.before_prototype_creation(&name);
                let created = self.create_bean(&name, &merged, args);
                self.after_prototype_creation(&name);
                created
            };
            scope.get(&name, &mut creator)?
        };
        self.object_for_bean_instance(instance, &name, wants_factory)
    }

    /// Resolves what a raw stored instance means for the caller: the
    /// instance itself for plain beans, the manufactured product for
    /// factory beans, or the factory itself for `&`-prefixed requests.
    pub(crate) fn object_for_bean_instance(
        &self,
        instance: BeanArc,
        name: &str,
        wants_factory: bool,
    ) -> BeansResult<BeanArc> {
        let merged = if self.contains_bean_definition(name) {
            Some(self.merged_definition(name)?)
        } else {
            None
        };
        self.object_for_bean_instance_with(instance, name, wants_factory, merged.as_ref())
    }

    pub(crate) fn object_for_bean_instance_with(
        &self,
        instance: BeanArc,
        name: &str,
        wants_factory: bool,
        merged: Option<&Arc<MergedBeanDefinition>>,
    ) -> BeansResult<BeanArc> {
        let hook = merged.and_then(|m| m.raw().hooks.factory_bean.clone());

        if wants_factory {
            return if hook.is_some() {
                Ok(instance)
            } else {
                Err(BeansError::BeanNotOfRequiredType {
                    name: name.to_string(),
                    required: "a factory bean",
                    actual: merged
                        .and_then(|m| m.raw().type_key())
                        .map(|key| key.name),
                })
            };
        }
        let Some(hook) = hook else {
            return Ok(instance);
        };
        let Some(factory_bean) = hook(&instance) else {
            return Err(BeansError::IllegalState(format!(
                "bean '{}' declares a factory-bean hook that does not match its instance",
                name
            )));
        };
        let merged = merged.expect("factory-bean hook implies a definition");

        let singleton_product =
            factory_bean.is_singleton() && self.registry.contains_singleton(name);
        if singleton_product {
            if let Some(product) = self.registry.get_product(name) {
                return Ok(product);
            }
        }
        trace!(bean = %name, "obtaining product from factory bean");
        let product = factory_bean.object().map_err(|err| {
            BeansError::creation(
                name,
                merged.description(),
                "factory bean threw on product creation",
                Some(err),
            )
        })?;
        if is_null_bean(&product) {
            return Ok(product);
        }
        // Products created while the factory bean itself is mid-creation
        // are handed out as-is and not cached.
        if self.registry.is_currently_in_creation(name) {
            return Ok(product);
        }
        let snapshot = self.processors.after_initialization.snapshot();
        if singleton_product {
            self.registry.before_singleton_creation(name)?;
            let processed = processor::apply_after_initialization(&snapshot, product, name);
            self.registry.after_singleton_creation(name)?;
            let product = processed.map_err(|err| {
                BeansError::creation(
                    name,
                    merged.description(),
                    "post-processing of the factory bean's product failed",
                    Some(err),
                )
            })?;
            self.registry.put_product(name, product.clone());
            Ok(product)
        } else {
            processor::apply_after_initialization(&snapshot, product, name).map_err(|err| {
                BeansError::creation(
                    name,
                    merged.description(),
                    "post-processing of the factory bean's product failed",
                    Some(err),
                )
            })
        }
    }

    // ---- prototype tracking ----

    fn instance_token(&self) -> usize {
        self as *const BeanFactory as *const () as usize
    }

    pub(crate) fn before_prototype_creation(&self, name: &str) {
        let token = self.instance_token();
        PROTOTYPES_IN_CREATION.with(|cell| {
            cell.borrow_mut()
                .entry(token)
                .or_default()
                .insert(name.to_string());
        });
    }

    pub(crate) fn after_prototype_creation(&self, name: &str) {
        let token = self.instance_token();
        PROTOTYPES_IN_CREATION.with(|cell| {
            let mut map = cell.borrow_mut();
            if let Some(set) = map.get_mut(&token) {
                set.remove(name);
                if set.is_empty() {
                    map.remove(&token);
                }
            }
        });
    }

    pub fn is_prototype_currently_in_creation(&self, name: &str) -> bool {
        let token = self.instance_token();
        PROTOTYPES_IN_CREATION.with(|cell| {
            cell.borrow()
                .get(&token)
                .map_or(false, |set| set.contains(name))
        })
    }

    // ---- singletons ----

    /// Binds an externally constructed instance as a singleton.
    pub fn register_singleton<T: Send + Sync + 'static>(
        &self,
        name: &str,
        instance: Arc<T>,
    ) -> BeansResult<()> {
        self.registry.register_singleton(name, instance)
    }

    /// Binds an already type-erased instance as a singleton.
    pub fn register_singleton_value(&self, name: &str, instance: BeanArc) -> BeansResult<()> {
        self.registry.register_singleton(name, instance)
    }

    pub fn contains_singleton(&self, name: &str) -> bool {
        self.registry.contains_singleton(name)
    }

    pub fn singleton_names(&self) -> Vec<String> {
        self.registry.singleton_names()
    }

    pub fn singleton_count(&self) -> usize {
        self.registry.singleton_count()
    }

    /// Whether a bean is registered under the name, locally or in an
    /// ancestor factory.
    pub fn contains_bean(&self, name: &str) -> bool {
        let (stripped, wants_factory) = strip_factory_prefix(name);
        let canonical = self.canonical_name(stripped);
        if self.registry.contains_singleton(&canonical)
            || self.contains_bean_definition(&canonical)
        {
            return !wants_factory || self.is_factory_bean(&canonical);
        }
        self.parent
            .as_ref()
            .map_or(false, |parent| parent.contains_bean(name))
    }

    /// Whether this factory itself holds the bean, ignoring ancestors.
    pub fn contains_local_bean(&self, name: &str) -> bool {
        let (stripped, wants_factory) = strip_factory_prefix(name);
        let canonical = self.canonical_name(stripped);
        if !self.registry.contains_singleton(&canonical)
            && !self.contains_bean_definition(&canonical)
        {
            return false;
        }
        !wants_factory || self.is_factory_bean(&canonical)
    }

    fn is_factory_bean(&self, canonical: &str) -> bool {
        self.merged_definition(canonical)
            .map(|m| m.is_factory_bean())
            .unwrap_or(false)
    }

    /// The best-known type of the object `get_bean(name)` would return.
    /// Factory-bean names report their product type unless the `&` prefix
    /// asks for the factory itself. `None` for definitions whose type is
    /// neither declared nor predictable and for manually registered
    /// singletons, which are stored type-erased.
    pub fn get_type(&self, name: &str) -> BeansResult<Option<TypeKey>> {
        let (stripped, wants_factory) = strip_factory_prefix(name);
        let canonical = self.canonical_name(stripped);
        if self.contains_bean_definition(&canonical) {
            let merged = self.merged_definition(&canonical)?;
            if merged.is_factory_bean() {
                if wants_factory {
                    return Ok(self.predicted_key(&merged));
                }
                return Ok(self.factory_product_key(&canonical, &merged, true));
            }
            if wants_factory {
                return Ok(None);
            }
            return Ok(self.predicted_key(&merged));
        }
        if self.registry.contains_singleton(&canonical) {
            return Ok(None);
        }
        match &self.parent {
            Some(parent) => parent.get_type(name),
            None => Err(BeansError::NoSuchBean(canonical)),
        }
    }

    /// Whether requests for the name share one instance.
    pub fn is_singleton(&self, name: &str) -> BeansResult<bool> {
        let (stripped, wants_factory) = strip_factory_prefix(name);
        let canonical = self.canonical_name(stripped);
        if !self.contains_bean_definition(&canonical) {
            if self.registry.contains_singleton(&canonical) {
                return Ok(true);
            }
            if let Some(parent) = &self.parent {
                return parent.is_singleton(name);
            }
            return Err(BeansError::NoSuchBean(canonical));
        }
        let merged = self.merged_definition(&canonical)?;
        if !merged.is_singleton() {
            return Ok(false);
        }
        if merged.is_factory_bean() && !wants_factory {
            let factory_bean = self.factory_bean_instance(&canonical, &merged)?;
            return Ok(factory_bean.is_singleton());
        }
        Ok(true)
    }

    /// Whether every request for the name yields a fresh instance.
    pub fn is_prototype(&self, name: &str) -> BeansResult<bool> {
        let (stripped, wants_factory) = strip_factory_prefix(name);
        let canonical = self.canonical_name(stripped);
        if !self.contains_bean_definition(&canonical) {
            if self.registry.contains_singleton(&canonical) {
                return Ok(false);
            }
            if let Some(parent) = &self.parent {
                return parent.is_prototype(name);
            }
            return Err(BeansError::NoSuchBean(canonical));
        }
        let merged = self.merged_definition(&canonical)?;
        if merged.is_prototype() {
            return Ok(true);
        }
        if wants_factory {
            return Ok(false);
        }
        if merged.is_factory_bean() {
            let factory_bean = self.factory_bean_instance(&canonical, &merged)?;
            return Ok(!factory_bean.is_singleton());
        }
        Ok(false)
    }

    fn factory_bean_instance(
        &self,
        canonical: &str,
        merged: &MergedBeanDefinition,
    ) -> BeansResult<Arc<dyn crate::lifecycle::FactoryBean>> {
        let instance = self.get_bean(&format!("{}{}", FACTORY_BEAN_PREFIX, canonical))?;
        let hook = merged
            .raw()
            .hooks
            .factory_bean
            .clone()
            .ok_or_else(|| BeansError::IllegalState(format!("'{}' is not a factory bean", canonical)))?;
        hook(&instance).ok_or_else(|| {
            BeansError::IllegalState(format!(
                "bean '{}' declares a factory-bean hook that does not match its instance",
                canonical
            ))
        })
    }

    // ---- processors, conversion, embedded values ----

    /// Registers a processor consulted before each bean is instantiated.
    /// The first one returning a bean short-circuits creation.
    pub fn add_before_instantiation(&self, processor: Arc<dyn BeforeInstantiation>) {
        self.processors.before_instantiation.add(processor);
    }

    /// Registers a selector that may override a definition's declared
    /// constructor candidates.
    pub fn add_constructor_selector(&self, selector: Arc<dyn ConstructorSelector>) {
        self.processors.constructor_selection.add(selector);
    }

    /// Registers a processor consulted right after instantiation; returning
    /// `false` skips property population for that bean.
    pub fn add_after_instantiation(&self, processor: Arc<dyn AfterInstantiation>) {
        self.processors.after_instantiation.add(processor);
    }

    /// Registers a processor that may rewrite property values before they
    /// are applied.
    pub fn add_property_processor(&self, processor: Arc<dyn PropertyProcessor>) {
        self.processors.properties.add(processor);
    }

    /// Registers a processor notified once per merged definition, the
    /// first time a bean is created from it.
    pub fn add_merged_definition_processor(&self, processor: Arc<dyn MergedDefinitionProcessor>) {
        self.processors.merged_definition.add(processor);
    }

    /// Registers a processor applied before init methods run.
    pub fn add_before_initialization(&self, processor: Arc<dyn BeforeInitialization>) {
        self.processors.before_initialization.add(processor);
    }

    /// Registers a processor applied after init methods run. This is the
    /// seam for wrapping beans in replacements.
    pub fn add_after_initialization(&self, processor: Arc<dyn AfterInitialization>) {
        self.processors.after_initialization.add(processor);
    }

    /// Registers a processor applied when a bean is exposed early to break
    /// a circular reference.
    pub fn add_early_reference_processor(&self, processor: Arc<dyn EarlyReferenceProcessor>) {
        self.processors.early_reference.add(processor);
    }

    /// Registers a processor run against each bean before it is destroyed.
    pub fn add_destruction_processor(&self, processor: Arc<dyn DestructionProcessor>) {
        self.processors.destruction.add(processor);
    }

    /// Replaces the value converter used for configured values and typed
    /// lookups.
    pub fn set_converter(&self, converter: Arc<dyn TypeConverter>) {
        *self.converter.write().unwrap() = converter;
    }

    pub fn converter(&self) -> Arc<dyn TypeConverter> {
        Arc::clone(&self.converter.read().unwrap())
    }

    /// Replaces the priority sort applied to ordered collection results.
    pub fn set_dependency_comparator(&self, comparator: Arc<dyn DependencyComparator>) {
        *self.dependency_comparator.write().unwrap() = Some(comparator);
    }

    pub(crate) fn dependency_comparator(&self) -> Option<Arc<dyn DependencyComparator>> {
        self.dependency_comparator.read().unwrap().clone()
    }

    /// Adds a resolver applied to every configured string value, e.g. a
    /// placeholder expander.
    pub fn add_embedded_value_resolver(
        &self,
        resolver: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) {
        self.embedded_resolvers
            .write()
            .unwrap()
            .push(Arc::new(resolver));
    }

    /// Runs a string value through the registered resolvers. `None` means
    /// a resolver swallowed the value entirely.
    pub fn resolve_embedded_value(&self, value: &str) -> Option<String> {
        let resolvers = self.embedded_resolvers.read().unwrap();
        let mut current = value.to_string();
        for resolver in resolvers.iter() {
            match resolver(&current) {
                Some(next) => current = next,
                None => return None,
            }
        }
        Some(current)
    }

    // ---- resolvable dependencies, scopes, type loading ----

    /// Registers a well-known value injected whenever a dependency of
    /// exactly type `T` is requested, without a bean definition.
    pub fn register_resolvable_dependency<T: Send + Sync + 'static>(&self, instance: Arc<T>) {
        self.put_resolvable(key_of::<T>(), instance);
    }

    /// Trait-object variant of
    /// [`register_resolvable_dependency`](Self::register_resolvable_dependency).
    pub fn register_resolvable_trait<T: ?Sized + Send + Sync + 'static>(
        &self,
        instance: Arc<T>,
    ) {
        self.put_resolvable(key_of::<T>(), trait_bean(instance));
    }

    fn put_resolvable(&self, key: TypeKey, value: BeanArc) {
        let mut resolvables = self.resolvables.write().unwrap();
        if let Some(slot) = resolvables.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            resolvables.push((key, value));
        }
    }

    pub(crate) fn resolvable_for(&self, key: &TypeKey) -> Option<BeanArc> {
        self.resolvables
            .read()
            .unwrap()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    pub(crate) fn is_resolvable_value(&self, value: &BeanArc) -> bool {
        self.resolvables
            .read()
            .unwrap()
            .iter()
            .any(|(_, v)| Arc::ptr_eq(v, value))
    }

    /// Registers a custom scope implementation under `scope_name`.
    pub fn register_scope(&self, scope_name: impl Into<String>, scope: Arc<dyn Scope>) {
        let scope_name = scope_name.into();
        debug!(scope = %scope_name, "registering scope");
        self.scopes.write().unwrap().insert(scope_name, scope);
    }

    pub fn registered_scope_names(&self) -> Vec<String> {
        self.scopes.read().unwrap().keys().cloned().collect()
    }

    pub fn set_type_loader(&self, loader: Arc<dyn TypeLoader>) {
        *self.type_loader.write().unwrap() = Some(loader);
    }

    /// The best-known type for a merged definition, consulting the type
    /// loader for late-bound type names.
    pub(crate) fn predicted_key(&self, merged: &MergedBeanDefinition) -> Option<TypeKey> {
        if let Some(key) = merged.predicted_type() {
            return Some(key);
        }
        let raw = merged.raw();
        let hint = raw.type_name_hint.as_deref()?;
        let loader = self.type_loader.read().unwrap();
        loader.as_ref().and_then(|l| l.resolve(hint))
    }

    // ---- providers and programmatic resolution ----

    /// A lazy handle resolving a unique bean of concrete type `T` on
    /// demand.
    pub fn bean_provider<T: Send + Sync + 'static>(&self) -> BeanProvider<T> {
        BeanProvider::concrete(ProviderSeed::new(
            self.weak(),
            DependencyDescriptor::of::<T>(),
            None,
        ))
    }

    /// A lazy handle resolving beans exposed under trait `T`.
    pub fn bean_provider_trait<T: ?Sized + Send + Sync + 'static>(&self) -> BeanProvider<T> {
        BeanProvider::of_trait(ProviderSeed::new(
            self.weak(),
            DependencyDescriptor::of::<T>(),
            None,
        ))
    }

    /// Resolves a dependency descriptor against the container, exactly as
    /// constructor and property autowiring do.
    pub fn resolve_dependency(
        &self,
        descriptor: &DependencyDescriptor,
    ) -> BeansResult<Option<BeanArc>> {
        self.resolve_dependency_for(descriptor, None, &mut Vec::new())
    }

    // ---- inner beans ----

    pub(crate) fn next_inner_bean_name(&self, containing: &str) -> String {
        let seq = self.inner_bean_seq.fetch_add(1, Ordering::Relaxed);
        format!("(inner bean)#{}#{}", containing, seq)
    }

    // ---- container lifecycle ----

    /// Eagerly creates every non-lazy singleton, then runs the
    /// singletons-ready callbacks of beans that registered one.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use beanforge::{BeanDefinition, BeanFactory};
    ///
    /// struct Cache;
    ///
    /// let factory = BeanFactory::new();
    /// factory
    ///     .register_bean_definition("cache", BeanDefinition::of::<Cache>().constructor0(|| Cache).build())
    ///     .unwrap();
    /// factory.pre_instantiate_singletons().unwrap();
    /// assert!(factory.contains_singleton("cache"));
    /// ```
    pub fn pre_instantiate_singletons(&self) -> BeansResult<()> {
        let names = self.bean_definition_names();
        debug!(definitions = names.len(), "pre-instantiating singletons");

        for name in &names {
            let merged = self.merged_definition(name)?;
            if merged.is_abstract() || !merged.is_singleton() || merged.is_lazy() {
                continue;
            }
            if merged.is_factory_bean() {
                self.get_bean(&format!("{}{}", FACTORY_BEAN_PREFIX, name))?;
                if merged.raw().eager_product {
                    self.get_bean(name)?;
                }
            } else {
                self.get_bean(name)?;
            }
        }

        for name in &names {
            if !self.registry.contains_singleton(name) {
                continue;
            }
            let merged = self.merged_definition(name)?;
            if let Some(ready) = &merged.raw().hooks.singletons_ready {
                let Some(instance) = self.registry.get_singleton(name, false)? else {
                    continue;
                };
                trace!(bean = %name, "invoking singletons-ready callback");
                ready(&instance).map_err(|err| {
                    BeansError::creation(
                        name,
                        merged.description(),
                        "singletons-ready callback failed",
                        Some(err),
                    )
                })?;
            }
        }
        Ok(())
    }

    /// Marks the configuration complete, enabling by-type lookup caching.
    pub fn freeze_configuration(&self) {
        self.frozen.store(true, Ordering::SeqCst);
        self.clear_type_cache();
    }

    pub fn is_configuration_frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }

    pub(crate) fn cached_names_for(&self, key: &TypeKey) -> Option<Arc<Vec<String>>> {
        if !self.is_configuration_frozen() {
            return None;
        }
        self.type_cache.read().unwrap().get(key).cloned()
    }

    pub(crate) fn cache_names_for(&self, key: TypeKey, names: Arc<Vec<String>>) {
        if self.is_configuration_frozen() {
            self.type_cache.write().unwrap().insert(key, names);
        }
    }

    fn clear_type_cache(&self) {
        self.type_cache.write().unwrap().clear();
    }

    /// Destroys every singleton, dependents before their dependencies,
    /// and clears the singleton cache.
    pub fn destroy_singletons(&self) {
        self.registry.destroy_singletons();
    }

    /// Runs the named bean's destruction pipeline on an instance the
    /// caller manages, without touching the singleton cache.
    pub fn destroy_bean(&self, name: &str, bean: &BeanArc) -> BeansResult<()> {
        let merged = self.merged_definition(name)?;
        let snapshot = self.processors.destruction.snapshot();
        DisposableAdapter::new(name, bean.clone(), &merged, &snapshot)?.destroy();
        Ok(())
    }

    /// Removes the named bean from its custom scope and destroys it.
    pub fn destroy_scoped_bean(&self, name: &str) -> BeansResult<()> {
        let merged = self.merged_definition(name)?;
        let BeanScope::Custom(scope_name) = merged.scope() else {
            return Err(BeansError::IllegalState(format!(
                "bean '{}' does not live in a custom scope",
                name
            )));
        };
        let scope = self
            .scopes
            .read()
            .unwrap()
            .get(scope_name)
            .cloned()
            .ok_or_else(|| BeansError::NoSuchScope {
                scope: scope_name.clone(),
                name: name.to_string(),
            })?;
        if let Some(bean) = scope.remove(name) {
            self.destroy_bean(name, &bean)?;
        }
        Ok(())
    }

    /// A human-readable snapshot of registered definitions and cached
    /// singletons, one entry per line.
    #[cfg(feature = "diagnostics")]
    pub fn dump_state(&self) -> String {
        use std::fmt::Write as _;

        let mut out = String::new();
        let snapshot = self.definitions_snapshot();
        let _ = writeln!(out, "bean definitions ({}):", snapshot.order.len());
        for name in &snapshot.order {
            if let Some(def) = snapshot.entries.get(name) {
                let _ = writeln!(
                    out,
                    "  {} [type: {}, scope: {:?}{}]",
                    name,
                    def.type_name(),
                    def.scope.as_ref().unwrap_or(&BeanScope::Singleton),
                    if def.is_abstract() { ", abstract" } else { "" },
                );
            }
        }
        let singletons = self.registry.singleton_names();
        let _ = writeln!(out, "cached singletons ({}):", singletons.len());
        for name in singletons {
            let _ = writeln!(out, "  {}", name);
        }
        if let Some(parent) = &self.parent {
            let _ = writeln!(out, "parent:");
            for line in parent.dump_state().lines() {
                let _ = writeln!(out, "  {}", line);
            }
        }
        out
    }
}

impl Drop for BeanFactory {
    fn drop(&mut self) {
        let remaining = self.registry.singleton_count();
        if remaining > 0 && !self.registry.is_destroying() {
            warn!(
                singletons = remaining,
                "bean factory dropped without destroy_singletons; destroy callbacks did not run"
            );
        }
    }
}
