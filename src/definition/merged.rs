//! Merged bean definitions: parent chains flattened into one recipe.
//!
//! The container never creates from a raw [`BeanDefinition`]. It first
//! merges the definition onto its parent chain, resolves defaults like
//! scope, and wraps the result with the per-definition caches the creation
//! pipeline relies on: predicted type, chosen constructor and prepared
//! arguments, the before-instantiation latch, and destroy-method names.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use once_cell::sync::OnceCell;

use crate::definition::{AutowireMode, BeanDefinition, BeanRole, BeanScope, DependencyCheck};
use crate::error::{BeansError, BeansResult};
use crate::key::{BeanArc, TypeKey};

const BEFORE_INSTANTIATION_UNRESOLVED: u8 = 0;
const BEFORE_INSTANTIATION_PASSED: u8 = 1;
const BEFORE_INSTANTIATION_SHORT_CIRCUITED: u8 = 2;

/// Which executable the constructor resolver settled on for a definition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CachedExecutable {
    /// Index into the definition's declared constructors.
    Constructor(usize),
    /// Index into the definition's factory method overloads.
    FactoryMethod(usize),
}

/// One prepared argument slot. Configured values are cached fully resolved;
/// autowired slots are re-resolved on every creation so prototypes see
/// current candidates.
#[derive(Clone)]
pub(crate) enum CachedArg {
    Value(BeanArc),
    Autowire,
}

/// Resolved-constructor cache stored on the merged definition after the
/// first successful resolution.
#[derive(Clone)]
pub(crate) struct CtorCache {
    pub exec: CachedExecutable,
    /// `None` when the creation used caller-supplied arguments, which are
    /// never cached.
    pub args: Option<Vec<CachedArg>>,
}

/// A flattened, cache-carrying definition ready for creation.
pub struct MergedBeanDefinition {
    def: BeanDefinition,
    scope: BeanScope,
    lazy: bool,
    resolved_type: OnceCell<Option<TypeKey>>,
    ctor_cache: Mutex<Option<CtorCache>>,
    before_instantiation: AtomicU8,
    post_processed: OnceCell<()>,
    pub(crate) destroy_names: OnceCell<Arc<Vec<String>>>,
    externally_managed_init: Mutex<HashSet<String>>,
    externally_managed_destroy: Mutex<HashSet<String>>,
    stale: AtomicBool,
}

impl MergedBeanDefinition {
    fn wrap(def: BeanDefinition) -> Self {
        let scope = def.scope.clone().unwrap_or(BeanScope::Singleton);
        let lazy = def.lazy_init.unwrap_or(false);
        MergedBeanDefinition {
            def,
            scope,
            lazy,
            resolved_type: OnceCell::new(),
            ctor_cache: Mutex::new(None),
            before_instantiation: AtomicU8::new(BEFORE_INSTANTIATION_UNRESOLVED),
            post_processed: OnceCell::new(),
            destroy_names: OnceCell::new(),
            externally_managed_init: Mutex::new(HashSet::new()),
            externally_managed_destroy: Mutex::new(HashSet::new()),
            stale: AtomicBool::new(false),
        }
    }

    /// Flattens a definition with no parent.
    pub(crate) fn from_root(def: &BeanDefinition) -> Self {
        MergedBeanDefinition::wrap(def.clone())
    }

    /// Flattens a child definition onto its already-merged parent.
    pub(crate) fn from_child(
        parent: &MergedBeanDefinition,
        child: &BeanDefinition,
        child_name: &str,
    ) -> BeansResult<Self> {
        let mut merged = parent.def.clone();
        merged.parent = None;

        let changes_type = match (child.type_key, merged.type_key) {
            (Some(c), Some(p)) => c != p,
            (Some(_), None) => true,
            _ => false,
        };
        let child_creates = !child.ctors.is_empty()
            || !child.factory_methods.is_empty()
            || child.instance_supplier.is_some();
        let parent_creates = !merged.ctors.is_empty()
            || !merged.factory_methods.is_empty()
            || merged.instance_supplier.is_some();
        if changes_type && !child_creates && parent_creates {
            return Err(BeansError::DefinitionValidation {
                name: child_name.to_string(),
                message: "child declares a different type but inherits the parent's construction"
                    .into(),
            });
        }

        if child.type_key.is_some() {
            merged.type_key = child.type_key;
        }
        if child.type_name_hint.is_some() {
            merged.type_name_hint = child.type_name_hint.clone();
        }
        if child.scope.is_some() {
            merged.scope = child.scope.clone();
        }
        if child.lazy_init.is_some() {
            merged.lazy_init = child.lazy_init;
        }
        merged.abstract_def = child.abstract_def;
        merged.autowire_candidate = child.autowire_candidate;
        merged.primary = child.primary;
        merged.priority = child.priority;
        merged.role = child.role;
        merged.autowire_mode = child.autowire_mode;
        merged.dependency_check = child.dependency_check;
        if child.description.is_some() {
            merged.description = child.description.clone();
        }
        if !child.depends_on.is_empty() {
            merged.depends_on = child.depends_on.clone();
        }
        if child.factory_bean_name.is_some() {
            merged.factory_bean_name = child.factory_bean_name.clone();
        }

        if child_creates {
            merged.ctors = child.ctors.clone();
            merged.factory_methods = child.factory_methods.clone();
            merged.instance_supplier = child.instance_supplier.clone();
        }
        if changes_type {
            // Structural closures are bound to the parent's concrete type
            // and would miss the child's instances.
            merged.properties = child.properties.clone();
            merged.methods = child.methods.clone();
            merged.bindings = child.bindings.clone();
            merged.hooks = child.hooks.clone();
        } else {
            for prop in &child.properties {
                replace_or_push(&mut merged.properties, prop, |a, b| a.name == b.name);
            }
            for method in &child.methods {
                replace_or_push(&mut merged.methods, method, |a, b| a.name == b.name);
            }
            for binding in &child.bindings {
                replace_or_push(&mut merged.bindings, binding, |a, b| a.key == b.key);
            }
            merge_hooks(&mut merged.hooks, &child.hooks);
        }

        merged.ctor_args.merge_from(&child.ctor_args);
        merged.property_values.merge_from(&child.property_values);
        if !child.init_method_names.is_empty() {
            merged.init_method_names = child.init_method_names.clone();
        }
        if !child.destroy_method_names.is_empty() {
            merged.destroy_method_names = child.destroy_method_names.clone();
        }
        for qualifier in &child.qualifiers {
            if !merged.qualifiers.contains(qualifier) {
                merged.qualifiers.push(qualifier.clone());
            }
        }
        merged.eager_product = merged.eager_product || child.eager_product;

        Ok(MergedBeanDefinition::wrap(merged))
    }

    /// The flattened definition.
    pub fn raw(&self) -> &BeanDefinition {
        &self.def
    }

    pub fn scope(&self) -> &BeanScope {
        &self.scope
    }

    /// Inner beans contained in a non-singleton bean take their containing
    /// bean's scope.
    pub(crate) fn set_scope(&mut self, scope: BeanScope) {
        self.scope = scope;
    }

    pub fn is_singleton(&self) -> bool {
        self.scope.is_singleton()
    }

    pub fn is_prototype(&self) -> bool {
        self.scope.is_prototype()
    }

    pub fn is_lazy(&self) -> bool {
        self.lazy
    }

    pub fn is_abstract(&self) -> bool {
        self.def.abstract_def
    }

    pub fn is_autowire_candidate(&self) -> bool {
        self.def.autowire_candidate
    }

    pub fn is_primary(&self) -> bool {
        self.def.primary
    }

    /// Ordering value; lower wins ties and sorts first in collections.
    pub fn priority(&self) -> Option<i32> {
        self.def.priority
    }

    pub fn role(&self) -> BeanRole {
        self.def.role
    }

    pub fn description(&self) -> Option<&str> {
        self.def.description()
    }

    pub fn autowire_mode(&self) -> AutowireMode {
        self.def.autowire_mode
    }

    pub fn dependency_check(&self) -> DependencyCheck {
        self.def.dependency_check
    }

    pub fn depends_on(&self) -> &[String] {
        &self.def.depends_on
    }

    pub fn qualifiers(&self) -> &[String] {
        &self.def.qualifiers
    }

    pub fn type_name(&self) -> &str {
        self.def.type_name()
    }

    /// Whether the bean manufactures another object.
    pub fn is_factory_bean(&self) -> bool {
        self.def.hooks.factory_bean.is_some()
    }

    /// The type this definition will produce, as far as it can be known
    /// without instantiating: the declared type, or the unanimous product
    /// type of the factory method overloads.
    pub fn predicted_type(&self) -> Option<TypeKey> {
        *self.resolved_type.get_or_init(|| {
            if let Some(key) = self.def.type_key {
                return Some(key);
            }
            let mut product = None;
            for method in &self.def.factory_methods {
                match (product, method.product) {
                    (None, Some(p)) => product = Some(p),
                    (Some(a), Some(b)) if a == b => {}
                    _ => return None,
                }
            }
            product
        })
    }

    /// Whether by-type lookups for `key` should consider this definition,
    /// by predicted type or declared trait binding.
    pub(crate) fn answers_key(&self, key: &TypeKey) -> bool {
        if self.def.bindings.iter().any(|b| b.key == *key) {
            return true;
        }
        self.predicted_type().map_or(false, |t| t == *key)
    }

    pub(crate) fn cached_ctor(&self) -> Option<CtorCache> {
        self.ctor_cache.lock().unwrap().clone()
    }

    pub(crate) fn store_ctor(&self, cache: CtorCache) {
        *self.ctor_cache.lock().unwrap() = Some(cache);
    }

    /// Whether the before-instantiation hooks should run for this creation.
    /// Once they all declined, they are never consulted again for this
    /// definition.
    pub(crate) fn try_before_instantiation(&self) -> bool {
        self.before_instantiation.load(Ordering::Relaxed) != BEFORE_INSTANTIATION_PASSED
    }

    pub(crate) fn record_before_instantiation(&self, short_circuited: bool) {
        let state = if short_circuited {
            BEFORE_INSTANTIATION_SHORT_CIRCUITED
        } else {
            BEFORE_INSTANTIATION_PASSED
        };
        self.before_instantiation.store(state, Ordering::Relaxed);
    }

    /// Runs `f` the first time this is called for the definition; merged
    /// definition processors apply once per definition, not per creation.
    pub(crate) fn post_process_once(&self, f: impl FnOnce()) {
        self.post_processed.get_or_init(|| {
            f();
        });
    }

    /// Claims an init method as invoked by external machinery, so the
    /// initialization step skips it.
    pub fn mark_externally_managed_init(&self, method: &str) {
        self.externally_managed_init
            .lock()
            .unwrap()
            .insert(method.to_string());
    }

    pub fn is_externally_managed_init(&self, method: &str) -> bool {
        self.externally_managed_init.lock().unwrap().contains(method)
    }

    /// Claims a destroy method as invoked by external machinery, so the
    /// disposal adapter skips it.
    pub fn mark_externally_managed_destroy(&self, method: &str) {
        self.externally_managed_destroy
            .lock()
            .unwrap()
            .insert(method.to_string());
    }

    pub fn is_externally_managed_destroy(&self, method: &str) -> bool {
        self.externally_managed_destroy
            .lock()
            .unwrap()
            .contains(method)
    }

    /// Marks the cached merge invalid after its definition or an ancestor
    /// was re-registered.
    pub(crate) fn mark_stale(&self) {
        self.stale.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_stale(&self) -> bool {
        self.stale.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for MergedBeanDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergedBeanDefinition")
            .field("type", &self.type_name())
            .field("scope", &self.scope)
            .field("lazy", &self.lazy)
            .finish_non_exhaustive()
    }
}

fn replace_or_push<T: Clone>(target: &mut Vec<T>, item: &T, same: impl Fn(&T, &T) -> bool) {
    if let Some(existing) = target.iter_mut().find(|t| same(t, item)) {
        *existing = item.clone();
    } else {
        target.push(item.clone());
    }
}

fn merge_hooks(
    target: &mut crate::definition::LifecycleHooks,
    child: &crate::definition::LifecycleHooks,
) {
    if child.initializing.is_some() {
        target.initializing = child.initializing.clone();
    }
    if child.disposable.is_some() {
        target.disposable = child.disposable.clone();
    }
    if child.name_aware.is_some() {
        target.name_aware = child.name_aware.clone();
    }
    if child.factory_aware.is_some() {
        target.factory_aware = child.factory_aware.clone();
    }
    if child.singletons_ready.is_some() {
        target.singletons_ready = child.singletons_ready.clone();
    }
    if child.factory_bean.is_some() {
        target.factory_bean = child.factory_bean.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{ParamSpec, Value};
    use crate::key::key_of;

    struct Server {
        port: i64,
    }

    struct Client;

    fn server_def() -> BeanDefinition {
        BeanDefinition::of::<Server>()
            .constructor(vec![ParamSpec::of::<i64>().named("port")], |args| {
                Ok(Server {
                    port: args.arg_value::<i64>(0)?,
                })
            })
            .arg_named("port", Value::of(80i64))
            .property("region", Value::string("eu"))
            .build()
    }

    #[test]
    fn root_merge_resolves_defaults() {
        let merged = MergedBeanDefinition::from_root(&server_def());
        assert!(merged.is_singleton());
        assert!(!merged.is_lazy());
        assert_eq!(merged.predicted_type(), Some(key_of::<Server>()));
    }

    #[test]
    fn child_inherits_construction_and_overrides_values() {
        let parent = MergedBeanDefinition::from_root(&server_def());
        let child = BeanDefinition::child_of("server")
            .property("region", Value::string("us"))
            .lazy()
            .build();
        let merged = MergedBeanDefinition::from_child(&parent, &child, "us-server").unwrap();

        assert!(merged.is_lazy());
        assert_eq!(merged.raw().ctors.len(), 1);
        match &merged.raw().property_values.get("region").unwrap().value {
            Value::Str(s) => assert_eq!(s, "us"),
            other => panic!("unexpected value: {:?}", other),
        }
        // The inherited indexed-by-name arg survives the merge.
        assert_eq!(merged.raw().ctor_args.min_arg_count(), 1);
    }

    #[test]
    fn child_changing_type_must_bring_its_own_construction() {
        let parent = MergedBeanDefinition::from_root(&server_def());
        let bad = {
            let mut def = BeanDefinition::default();
            def.type_key = Some(key_of::<Client>());
            def.parent = Some("server".into());
            def
        };
        assert!(matches!(
            MergedBeanDefinition::from_child(&parent, &bad, "client"),
            Err(BeansError::DefinitionValidation { .. })
        ));

        let good = BeanDefinition::of::<Client>()
            .parent("server")
            .constructor0(|| Client)
            .build();
        let merged = MergedBeanDefinition::from_child(&parent, &good, "client").unwrap();
        assert_eq!(merged.predicted_type(), Some(key_of::<Client>()));
        assert_eq!(merged.raw().ctors.len(), 1);
    }

    #[test]
    fn scope_override_and_inheritance() {
        let parent_def = {
            let mut def = server_def();
            def.scope = Some(BeanScope::Prototype);
            def
        };
        let parent = MergedBeanDefinition::from_root(&parent_def);
        let plain_child = BeanDefinition::child_of("server").build();
        let merged = MergedBeanDefinition::from_child(&parent, &plain_child, "child").unwrap();
        assert!(merged.is_prototype());

        let pinned_child = BeanDefinition::child_of("server")
            .scope(BeanScope::Singleton)
            .build();
        let merged = MergedBeanDefinition::from_child(&parent, &pinned_child, "child").unwrap();
        assert!(merged.is_singleton());
    }

    #[test]
    fn before_instantiation_latch() {
        let merged = MergedBeanDefinition::from_root(&server_def());
        assert!(merged.try_before_instantiation());
        merged.record_before_instantiation(false);
        assert!(!merged.try_before_instantiation());

        let again = MergedBeanDefinition::from_root(&server_def());
        again.record_before_instantiation(true);
        assert!(again.try_before_instantiation());
    }

    #[test]
    fn externally_managed_sets() {
        let merged = MergedBeanDefinition::from_root(&server_def());
        assert!(!merged.is_externally_managed_init("warm_up"));
        merged.mark_externally_managed_init("warm_up");
        assert!(merged.is_externally_managed_init("warm_up"));
    }
}
