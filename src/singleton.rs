//! The singleton registry: shared instances, creation states, and the
//! dependency graph driving destruction order.
//!
//! Every name is in exactly one state at a time: absent, `Creating` (with
//! an optional early-reference factory), `EarlyExposed` (a mid-creation
//! instance handed out to break a reference cycle), or `Final`. All
//! transitions run under one mutex; a condvar serializes concurrent
//! requests for the same name without blocking unrelated creations. The
//! creation factory itself always runs outside the lock; the single
//! exception is promoting an early-reference factory, which runs under the
//! lock so the in-creation check and the promotion are atomic.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, RwLock};
use std::thread::{self, ThreadId};

use tracing::{debug, trace};

use crate::disposal::DisposableAdapter;
use crate::error::{BeansError, BeansResult};
use crate::key::BeanArc;

const SUPPRESSED_LIMIT: usize = 100;

type EarlyFactory = Box<dyn FnOnce() -> BeansResult<BeanArc> + Send>;

enum SingletonState {
    Creating {
        thread: ThreadId,
        early_factory: Option<EarlyFactory>,
    },
    EarlyExposed {
        thread: ThreadId,
        instance: BeanArc,
    },
    Final(BeanArc),
}

#[derive(Default)]
struct StateMap {
    entries: HashMap<String, SingletonState>,
    /// Names in the order they reached `Final`.
    order: Vec<String>,
}

impl StateMap {
    fn finalize(&mut self, name: &str, bean: BeanArc) {
        self.entries.insert(name.to_string(), SingletonState::Final(bean));
        if !self.order.iter().any(|n| n == name) {
            self.order.push(name.to_string());
        }
    }

    fn remove(&mut self, name: &str) -> Option<SingletonState> {
        self.order.retain(|n| n != name);
        self.entries.remove(name)
    }
}

/// Singleton storage plus the bookkeeping around creation and destruction.
pub(crate) struct SingletonRegistry {
    state: Mutex<StateMap>,
    created: Condvar,
    /// Mirror of the names currently in `Creating`/`EarlyExposed`, readable
    /// without the state lock.
    in_creation: RwLock<HashSet<String>>,
    /// Names exempted from in-creation checks, for type-probing creations.
    creation_excluded: RwLock<HashSet<String>>,
    /// name -> beans that depend on it.
    dependents: RwLock<HashMap<String, Vec<String>>>,
    /// name -> beans it depends on.
    dependencies: RwLock<HashMap<String, Vec<String>>>,
    /// containing bean -> inner beans whose lifecycle it owns.
    contained: RwLock<HashMap<String, Vec<String>>>,
    /// Destruction adapters in registration order; destruction walks this
    /// in reverse.
    disposables: Mutex<Vec<(String, DisposableAdapter)>>,
    /// Cached factory-bean products, keyed by factory bean name.
    products: Mutex<HashMap<String, BeanArc>>,
    /// Suppressed errors collected while the outermost creation on some
    /// thread probes alternative candidates.
    suppressed: Mutex<Option<Vec<BeansError>>>,
    destroying: AtomicBool,
}

impl Default for SingletonRegistry {
    fn default() -> Self {
        SingletonRegistry {
            state: Mutex::new(StateMap::default()),
            created: Condvar::new(),
            in_creation: RwLock::new(HashSet::new()),
            creation_excluded: RwLock::new(HashSet::new()),
            dependents: RwLock::new(HashMap::new()),
            dependencies: RwLock::new(HashMap::new()),
            contained: RwLock::new(HashMap::new()),
            disposables: Mutex::new(Vec::new()),
            products: Mutex::new(HashMap::new()),
            suppressed: Mutex::new(None),
            destroying: AtomicBool::new(false),
        }
    }
}

impl SingletonRegistry {
    /// Binds an externally created instance. Fails if the name already
    /// holds a finished singleton.
    pub fn register_singleton(&self, name: &str, bean: BeanArc) -> BeansResult<()> {
        let mut map = self.state.lock().unwrap();
        if let Some(SingletonState::Final(_)) = map.entries.get(name) {
            return Err(BeansError::IllegalState(format!(
                "could not register singleton under bean name '{}': name already bound",
                name
            )));
        }
        map.finalize(name, bean);
        self.created.notify_all();
        Ok(())
    }

    /// Looks up a singleton. For names currently in creation this may
    /// return the early reference, promoting the early-reference factory
    /// if `allow_early` and one is installed.
    pub fn get_singleton(&self, name: &str, allow_early: bool) -> BeansResult<Option<BeanArc>> {
        let mut map = self.state.lock().unwrap();
        match map.entries.get_mut(name) {
            Some(SingletonState::Final(bean)) => Ok(Some(bean.clone())),
            Some(SingletonState::EarlyExposed { instance, .. }) => Ok(Some(instance.clone())),
            Some(SingletonState::Creating {
                thread,
                early_factory,
            }) => {
                if !allow_early {
                    return Ok(None);
                }
                let Some(factory) = early_factory.take() else {
                    return Ok(None);
                };
                let thread = *thread;
                // Runs under the lock: the in-creation check and the
                // promotion must be one atomic step.
                let instance = factory()?;
                map.entries.insert(
                    name.to_string(),
                    SingletonState::EarlyExposed {
                        thread,
                        instance: instance.clone(),
                    },
                );
                Ok(Some(instance))
            }
            None => Ok(None),
        }
    }

    /// Installs the early-reference factory for a name mid-creation.
    /// Replaces any already-exposed early reference, so later promotions
    /// see current post-processing.
    pub fn add_early_factory(&self, name: &str, factory: EarlyFactory) {
        let mut map = self.state.lock().unwrap();
        match map.entries.get_mut(name) {
            Some(SingletonState::Creating { early_factory, .. }) => {
                *early_factory = Some(factory);
            }
            Some(SingletonState::EarlyExposed { thread, .. }) => {
                let thread = *thread;
                map.entries.insert(
                    name.to_string(),
                    SingletonState::Creating {
                        thread,
                        early_factory: Some(factory),
                    },
                );
            }
            Some(SingletonState::Final(_)) => {}
            None => {
                map.entries.insert(
                    name.to_string(),
                    SingletonState::Creating {
                        thread: thread::current().id(),
                        early_factory: Some(factory),
                    },
                );
            }
        }
    }

    /// Returns the existing singleton or creates it with `factory`,
    /// serializing concurrent requests for the same name. The factory runs
    /// without the registry lock held.
    pub fn get_or_create(
        &self,
        name: &str,
        factory: impl FnOnce() -> BeansResult<BeanArc>,
    ) -> BeansResult<BeanArc> {
        let excluded = self.creation_excluded.read().unwrap().contains(name);
        let owns_marker = {
            let mut map = self.state.lock().unwrap();
            loop {
                if self.destroying.load(Ordering::SeqCst) {
                    return Err(BeansError::CreationNotAllowed(name.to_string()));
                }
                match map.entries.get(name) {
                    Some(SingletonState::Final(bean)) => return Ok(bean.clone()),
                    Some(SingletonState::Creating { thread, .. })
                    | Some(SingletonState::EarlyExposed { thread, .. }) => {
                        if *thread == thread::current().id() {
                            if excluded {
                                // Re-entrant type-probing creation; the
                                // inner attempt runs and the outer one
                                // defers to whatever it stores.
                                break false;
                            }
                            return Err(BeansError::CurrentlyInCreation(name.to_string()));
                        }
                        map = self.created.wait(map).unwrap();
                    }
                    None => {
                        if !excluded {
                            self.before_singleton_creation(name)?;
                        }
                        map.entries.insert(
                            name.to_string(),
                            SingletonState::Creating {
                                thread: thread::current().id(),
                                early_factory: None,
                            },
                        );
                        break true;
                    }
                }
            }
        };

        let record_suppressed = {
            let mut suppressed = self.suppressed.lock().unwrap();
            if suppressed.is_none() {
                *suppressed = Some(Vec::new());
                true
            } else {
                false
            }
        };

        // The entry must not outlive a panicking factory, or every waiter
        // on this name wedges.
        let mut guard = CreationGuard {
            registry: self,
            name,
            excluded,
            owns_marker,
            armed: true,
        };
        let result = factory();
        guard.armed = false;
        drop(guard);

        let taken_suppressed = if record_suppressed {
            self.suppressed.lock().unwrap().take().unwrap_or_default()
        } else {
            Vec::new()
        };

        let outcome = match result {
            Ok(bean) => {
                let mut map = self.state.lock().unwrap();
                match map.entries.get(name) {
                    // The factory itself (or a re-entrant probing creation)
                    // already bound the name; defer to that instance.
                    Some(SingletonState::Final(existing)) => Ok(existing.clone()),
                    _ => {
                        map.finalize(name, bean.clone());
                        Ok(bean)
                    }
                }
            }
            Err(mut err) => {
                let mut map = self.state.lock().unwrap();
                if !matches!(map.entries.get(name), Some(SingletonState::Final(_))) {
                    map.remove(name);
                }
                drop(map);
                if !taken_suppressed.is_empty() {
                    err.push_related(taken_suppressed);
                }
                Err(err)
            }
        };

        if owns_marker && !excluded {
            self.after_singleton_creation(name)?;
        }
        self.created.notify_all();
        outcome
    }

    pub(crate) fn before_singleton_creation(&self, name: &str) -> BeansResult<()> {
        if !self.in_creation.write().unwrap().insert(name.to_string()) {
            return Err(BeansError::CurrentlyInCreation(name.to_string()));
        }
        Ok(())
    }

    pub(crate) fn after_singleton_creation(&self, name: &str) -> BeansResult<()> {
        if !self.in_creation.write().unwrap().remove(name) {
            return Err(BeansError::IllegalState(format!(
                "singleton '{}' isn't currently in creation",
                name
            )));
        }
        Ok(())
    }

    /// Collects an error from an abandoned resolution attempt onto the
    /// creation currently in flight, if any.
    pub fn record_suppressed(&self, err: BeansError) {
        let mut suppressed = self.suppressed.lock().unwrap();
        if let Some(list) = suppressed.as_mut() {
            if list.len() < SUPPRESSED_LIMIT {
                list.push(err);
            }
        }
    }

    /// Exempts or re-includes a name in in-creation checks.
    pub fn exclude_from_creation_checks(&self, name: &str, excluded: bool) {
        let mut set = self.creation_excluded.write().unwrap();
        if excluded {
            set.insert(name.to_string());
        } else {
            set.remove(name);
        }
    }

    /// Whether the name is mid-creation, honoring exclusions.
    pub fn is_currently_in_creation(&self, name: &str) -> bool {
        !self.creation_excluded.read().unwrap().contains(name)
            && self.is_actually_in_creation(name)
    }

    pub fn is_actually_in_creation(&self, name: &str) -> bool {
        self.in_creation.read().unwrap().contains(name)
    }

    /// Whether a finished singleton is bound under the name.
    pub fn contains_singleton(&self, name: &str) -> bool {
        matches!(
            self.state.lock().unwrap().entries.get(name),
            Some(SingletonState::Final(_))
        )
    }

    pub fn singleton_names(&self) -> Vec<String> {
        self.state.lock().unwrap().order.clone()
    }

    pub fn singleton_count(&self) -> usize {
        self.state.lock().unwrap().order.len()
    }

    pub fn is_destroying(&self) -> bool {
        self.destroying.load(Ordering::SeqCst)
    }

    pub fn put_product(&self, factory_name: &str, product: BeanArc) {
        self.products
            .lock()
            .unwrap()
            .insert(factory_name.to_string(), product);
    }

    pub fn get_product(&self, factory_name: &str) -> Option<BeanArc> {
        self.products.lock().unwrap().get(factory_name).cloned()
    }

    /// Removes the name from every tier and drops any cached product.
    pub fn remove_singleton(&self, name: &str) {
        self.state.lock().unwrap().remove(name);
        self.products.lock().unwrap().remove(name);
        self.created.notify_all();
    }

    /// Registers the adapter invoked when the named bean is destroyed,
    /// replacing any previous registration in place.
    pub fn register_disposable(&self, name: &str, adapter: DisposableAdapter) {
        let mut disposables = self.disposables.lock().unwrap();
        if let Some(entry) = disposables.iter_mut().find(|(n, _)| n == name) {
            entry.1 = adapter;
        } else {
            disposables.push((name.to_string(), adapter));
        }
    }

    pub fn has_disposable(&self, name: &str) -> bool {
        self.disposables.lock().unwrap().iter().any(|(n, _)| n == name)
    }

    /// Records that `dependent` holds a reference to `name`.
    pub fn register_dependent_bean(&self, name: &str, dependent: &str) {
        {
            let mut dependents = self.dependents.write().unwrap();
            let list = dependents.entry(name.to_string()).or_default();
            if list.iter().any(|d| d == dependent) {
                return;
            }
            list.push(dependent.to_string());
        }
        let mut dependencies = self.dependencies.write().unwrap();
        dependencies
            .entry(dependent.to_string())
            .or_default()
            .push(name.to_string());
        trace!(bean = name, dependent, "registered dependency edge");
    }

    /// Records that `containing` owns inner bean `contained`, tying their
    /// destruction together.
    pub fn register_contained_bean(&self, contained: &str, containing: &str) {
        {
            let mut map = self.contained.write().unwrap();
            let list = map.entry(containing.to_string()).or_default();
            if !list.iter().any(|c| c == contained) {
                list.push(contained.to_string());
            }
        }
        self.register_dependent_bean(contained, containing);
    }

    /// Whether `dependent` depends on `name`, directly or transitively.
    pub fn is_dependent(&self, name: &str, dependent: &str) -> bool {
        let dependents = self.dependents.read().unwrap();
        let mut seen = HashSet::new();
        Self::is_dependent_in(&dependents, name, dependent, &mut seen)
    }

    fn is_dependent_in(
        map: &HashMap<String, Vec<String>>,
        name: &str,
        dependent: &str,
        seen: &mut HashSet<String>,
    ) -> bool {
        if !seen.insert(name.to_string()) {
            return false;
        }
        let Some(direct) = map.get(name) else {
            return false;
        };
        if direct.iter().any(|d| d == dependent) {
            return true;
        }
        direct
            .iter()
            .any(|transitive| Self::is_dependent_in(map, transitive, dependent, seen))
    }

    pub fn has_dependent_bean(&self, name: &str) -> bool {
        self.dependents
            .read()
            .unwrap()
            .get(name)
            .map_or(false, |d| !d.is_empty())
    }

    pub fn dependent_beans_of(&self, name: &str) -> Vec<String> {
        self.dependents
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn dependencies_of(&self, name: &str) -> Vec<String> {
        self.dependencies
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    /// Destroys one singleton: dependents first, then the bean's own
    /// destruction adapter, then contained inner beans, then every edge
    /// mentioning the name.
    pub fn destroy_singleton(&self, name: &str) {
        self.remove_singleton(name);
        let adapter = {
            let mut disposables = self.disposables.lock().unwrap();
            disposables
                .iter()
                .position(|(n, _)| n == name)
                .map(|i| disposables.remove(i).1)
        };
        self.destroy_bean(name, adapter);
    }

    fn destroy_bean(&self, name: &str, adapter: Option<DisposableAdapter>) {
        let dependents = self.dependents.write().unwrap().remove(name);
        if let Some(dependents) = dependents {
            trace!(bean = name, ?dependents, "destroying dependent beans first");
            for dependent in dependents {
                self.destroy_singleton(&dependent);
            }
        }

        if let Some(adapter) = adapter {
            adapter.destroy();
        }

        let contained = self.contained.write().unwrap().remove(name);
        if let Some(contained) = contained {
            for inner in contained {
                self.destroy_singleton(&inner);
            }
        }

        {
            let mut dependents = self.dependents.write().unwrap();
            dependents.retain(|_, list| {
                list.retain(|d| d != name);
                !list.is_empty()
            });
        }
        self.dependencies.write().unwrap().remove(name);
    }

    /// Destroys every registered singleton, disposables in reverse
    /// registration order, then clears all registry state.
    pub fn destroy_singletons(&self) {
        debug!(
            singletons = self.singleton_count(),
            "destroying singletons"
        );
        self.destroying.store(true, Ordering::SeqCst);

        let names: Vec<String> = {
            let disposables = self.disposables.lock().unwrap();
            disposables.iter().rev().map(|(n, _)| n.clone()).collect()
        };
        for name in names {
            self.destroy_singleton(&name);
        }

        self.contained.write().unwrap().clear();
        self.dependents.write().unwrap().clear();
        self.dependencies.write().unwrap().clear();

        let mut map = self.state.lock().unwrap();
        map.entries.clear();
        map.order.clear();
        self.products.lock().unwrap().clear();
        self.destroying.store(false, Ordering::SeqCst);
        drop(map);
        self.created.notify_all();
    }
}

struct CreationGuard<'a> {
    registry: &'a SingletonRegistry,
    name: &'a str,
    excluded: bool,
    owns_marker: bool,
    armed: bool,
}

impl Drop for CreationGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut map = self.registry.state.lock().unwrap();
        if !matches!(map.entries.get(self.name), Some(SingletonState::Final(_))) {
            map.remove(self.name);
        }
        drop(map);
        if self.owns_marker && !self.excluded {
            let _ = self.registry.after_singleton_creation(self.name);
        }
        self.registry.created.notify_all();
    }
}
