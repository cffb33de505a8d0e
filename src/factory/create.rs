//! The bean creation pipeline: instantiate, expose early if needed,
//! populate properties, initialize, and register for destruction.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::definition::merged::MergedBeanDefinition;
use crate::definition::{AutowireMode, BeanScope, DependencyCheck, PropertyValues, Value};
use crate::descriptor::DependencyDescriptor;
use crate::disposal::{self, DisposableAdapter};
use crate::error::{BeansError, BeansResult};
use crate::key::{is_null_bean, BeanArc};
use crate::lifecycle::{FactoryBean, AFTER_PROPERTIES_SET};
use crate::processor;

use super::BeanFactory;

impl BeanFactory {
    /// Creates a bean instance for the merged definition, running the
    /// full pipeline. Callers own scope bookkeeping; this only builds.
    pub(crate) fn create_bean(
        &self,
        name: &str,
        merged: &Arc<MergedBeanDefinition>,
        args: Option<&[Value]>,
    ) -> BeansResult<BeanArc> {
        debug!(bean = %name, "creating instance of bean");

        if merged.try_before_instantiation() {
            let snapshot = self.processors.before_instantiation.snapshot();
            let mut replacement = None;
            for p in snapshot.iter() {
                if let Some(bean) = p.before_instantiation(merged, name)? {
                    replacement = Some(bean);
                    break;
                }
            }
            match replacement {
                Some(bean) => {
                    let finishers = self.processors.after_initialization.snapshot();
                    let bean = processor::apply_after_initialization(&finishers, bean, name)?;
                    merged.record_before_instantiation(true);
                    return Ok(bean);
                }
                None => merged.record_before_instantiation(false),
            }
        }

        self.do_create_bean(name, merged, args).map_err(|err| {
            if err.has_creation_context() {
                err
            } else {
                BeansError::creation(
                    name,
                    merged.description(),
                    "unexpected failure during bean creation",
                    Some(err),
                )
            }
        })
    }

    fn do_create_bean(
        &self,
        name: &str,
        merged: &Arc<MergedBeanDefinition>,
        args: Option<&[Value]>,
    ) -> BeansResult<BeanArc> {
        let instance = self.instantiate_bean(name, merged, args)?;

        merged.post_process_once(|| {
            let snapshot = self.processors.merged_definition.snapshot();
            for p in snapshot.iter() {
                p.merged_definition(merged, name);
            }
        });

        let early_exposure = merged.is_singleton()
            && self.allow_circular
            && self.registry.is_currently_in_creation(name);
        if early_exposure {
            trace!(
                bean = %name,
                "eagerly caching bean to allow for resolving potential circular references"
            );
            let factory = self.weak();
            let early_name = name.to_string();
            let raw = instance.clone();
            self.registry.add_early_factory(
                name,
                Box::new(move || {
                    let Some(factory) = factory.upgrade() else {
                        return Ok(raw);
                    };
                    let snapshot = factory.processors.early_reference.snapshot();
                    let mut bean = raw;
                    for p in snapshot.iter() {
                        bean = p.early_reference(bean, &early_name)?;
                    }
                    Ok(bean)
                }),
            );
        }

        self.populate_bean(name, merged, &instance)?;
        let mut exposed = self.initialize_bean(name, merged, instance.clone())?;

        if early_exposure {
            if let Some(early_ref) = self.registry.get_singleton(name, false)? {
                if Arc::ptr_eq(&exposed, &instance) {
                    // The raw reference already escaped into other beans;
                    // hand out that same handle so all holders agree.
                    exposed = early_ref;
                } else if !self.allow_raw_injection && self.registry.has_dependent_bean(name) {
                    let holders: Vec<String> = self
                        .registry
                        .dependent_beans_of(name)
                        .into_iter()
                        .filter(|dep| !self.remove_singleton_if_created_for_type_check_only(dep))
                        .collect();
                    if !holders.is_empty() {
                        return Err(BeansError::creation(
                            name,
                            merged.description(),
                            format!(
                                "bean '{}' has been injected into other beans [{}] in its raw \
                                 version as part of a circular reference, but has eventually \
                                 been wrapped; the other beans hold a stale reference",
                                name,
                                holders.join(", ")
                            ),
                            None,
                        ));
                    }
                }
            }
        }

        self.register_disposable_if_necessary(name, &exposed, merged)?;
        Ok(exposed)
    }

    fn populate_bean(
        &self,
        name: &str,
        merged: &Arc<MergedBeanDefinition>,
        bean: &BeanArc,
    ) -> BeansResult<()> {
        let gates = self.processors.after_instantiation.snapshot();
        for p in gates.iter() {
            if !p.after_instantiation(bean, name)? {
                return Ok(());
            }
        }

        let mut pvs = merged.raw().property_values.clone();
        match merged.autowire_mode() {
            AutowireMode::ByName => self.autowire_by_name(name, merged, &mut pvs),
            AutowireMode::ByType => self.autowire_by_type(name, merged, &mut pvs)?,
            AutowireMode::No | AutowireMode::Constructor => {}
        }

        let mut pvs = pvs;
        let rewriters = self.processors.properties.snapshot();
        for p in rewriters.iter() {
            pvs = p.process_properties(pvs, bean, name)?;
        }

        self.check_dependencies(name, merged, &pvs)?;
        self.apply_property_values(name, merged, bean, &pvs)
    }

    fn autowire_by_name(
        &self,
        name: &str,
        merged: &Arc<MergedBeanDefinition>,
        pvs: &mut PropertyValues,
    ) {
        for spec in &merged.raw().properties {
            if spec.simple || pvs.contains(spec.name) {
                continue;
            }
            if self.contains_bean(spec.name) {
                pvs.add(spec.name, Value::reference(spec.name));
                debug!(bean = %name, property = spec.name, "adding autowiring by name");
            } else {
                trace!(
                    bean = %name,
                    property = spec.name,
                    "not autowiring property by name: no matching bean found"
                );
            }
        }
    }

    fn autowire_by_type(
        &self,
        name: &str,
        merged: &Arc<MergedBeanDefinition>,
        pvs: &mut PropertyValues,
    ) -> BeansResult<()> {
        for spec in &merged.raw().properties {
            if spec.simple || pvs.contains(spec.name) {
                continue;
            }
            let descriptor = DependencyDescriptor::for_property(spec);
            let mut autowired = Vec::new();
            let resolved = self
                .resolve_dependency_for(&descriptor, Some(name), &mut autowired)
                .map_err(|err| BeansError::UnsatisfiedDependency {
                    name: name.to_string(),
                    injection_point: format!("property '{}'", spec.name),
                    source: Box::new(err),
                })?;
            if let Some(value) = resolved {
                pvs.add(spec.name, Value::Literal(value));
                for dep in &autowired {
                    self.registry.register_dependent_bean(dep, name);
                }
                debug!(bean = %name, property = spec.name, "autowiring by type");
            }
        }
        Ok(())
    }

    fn check_dependencies(
        &self,
        name: &str,
        merged: &Arc<MergedBeanDefinition>,
        pvs: &PropertyValues,
    ) -> BeansResult<()> {
        let check = merged.dependency_check();
        if check == DependencyCheck::None {
            return Ok(());
        }
        for spec in &merged.raw().properties {
            if pvs.contains(spec.name) {
                continue;
            }
            let unsatisfied = match check {
                DependencyCheck::All => true,
                DependencyCheck::Simple => spec.simple,
                DependencyCheck::Objects => !spec.simple,
                DependencyCheck::None => false,
            };
            if unsatisfied {
                return Err(BeansError::UnsatisfiedDependency {
                    name: name.to_string(),
                    injection_point: format!("property '{}'", spec.name),
                    source: Box::new(BeansError::IllegalState(
                        "set this property value or disable dependency checking for this bean"
                            .into(),
                    )),
                });
            }
        }
        Ok(())
    }

    fn apply_property_values(
        &self,
        name: &str,
        merged: &Arc<MergedBeanDefinition>,
        bean: &BeanArc,
        pvs: &PropertyValues,
    ) -> BeansResult<()> {
        if pvs.is_empty() {
            return Ok(());
        }
        let resolver = self.value_resolver(Some(name), Some(merged));
        for pv in pvs.iter() {
            let Some(spec) = merged.raw().properties.iter().find(|s| s.name == pv.name) else {
                if pv.optional {
                    trace!(bean = %name, property = %pv.name, "ignoring optional property value");
                    continue;
                }
                return Err(BeansError::DefinitionStore {
                    name: name.to_string(),
                    message: format!("no settable property named '{}'", pv.name),
                });
            };
            let resolved = resolver
                .resolve_for_slot(&pv.value, Some(&spec.key), spec.shape)
                .map_err(|err| {
                    BeansError::creation(
                        name,
                        merged.description(),
                        format!("error setting property '{}'", pv.name),
                        Some(err),
                    )
                })?;
            if is_null_bean(&resolved.value) {
                continue;
            }
            (spec.apply)(bean, resolved.value).map_err(|err| {
                BeansError::creation(
                    name,
                    merged.description(),
                    format!("error setting property '{}'", pv.name),
                    Some(err),
                )
            })?;
        }
        Ok(())
    }

    fn initialize_bean(
        &self,
        name: &str,
        merged: &Arc<MergedBeanDefinition>,
        bean: BeanArc,
    ) -> BeansResult<BeanArc> {
        let hooks = &merged.raw().hooks;
        if let Some(aware) = &hooks.name_aware {
            aware(&bean, name);
        }
        if let Some(aware) = &hooks.factory_aware {
            if let Some(factory) = self.weak_self.upgrade() {
                aware(&bean, &factory);
            }
        }

        let snapshot = self.processors.before_initialization.snapshot();
        let bean = processor::apply_before_initialization(&snapshot, bean, name)?;
        self.invoke_init_methods(name, merged, &bean)
            .map_err(|err| {
                if err.has_creation_context() {
                    err
                } else {
                    BeansError::creation(
                        name,
                        merged.description(),
                        "invocation of init method failed",
                        Some(err),
                    )
                }
            })?;
        let finishers = self.processors.after_initialization.snapshot();
        processor::apply_after_initialization(&finishers, bean, name)
    }

    fn invoke_init_methods(
        &self,
        name: &str,
        merged: &Arc<MergedBeanDefinition>,
        bean: &BeanArc,
    ) -> BeansResult<()> {
        let def = merged.raw();
        let mut hook_ran = false;
        if let Some(hook) = &def.hooks.initializing {
            if !merged.is_externally_managed_init(AFTER_PROPERTIES_SET) {
                trace!(bean = %name, "invoking after-properties-set");
                hook(bean)?;
                hook_ran = true;
            }
        }
        let mut seen = HashSet::new();
        for method_name in &def.init_method_names {
            if !seen.insert(method_name.as_str()) {
                continue;
            }
            if method_name == AFTER_PROPERTIES_SET && hook_ran {
                continue;
            }
            if merged.is_externally_managed_init(method_name) {
                continue;
            }
            let Some(spec) = def.method_named(method_name) else {
                return Err(BeansError::DefinitionValidation {
                    name: name.to_string(),
                    message: format!("couldn't find an init method named '{}'", method_name),
                });
            };
            trace!(bean = %name, method = %method_name, "invoking init method");
            (spec.invoke)(bean)?;
        }
        Ok(())
    }

    pub(crate) fn register_disposable_if_necessary(
        &self,
        name: &str,
        bean: &BeanArc,
        merged: &Arc<MergedBeanDefinition>,
    ) -> BeansResult<()> {
        if merged.is_prototype() {
            return Ok(());
        }
        let snapshot = self.processors.destruction.snapshot();
        if !disposal::requires_destruction(name, bean, merged, &snapshot)? {
            return Ok(());
        }
        if merged.is_singleton() {
            let adapter = DisposableAdapter::new(name, bean.clone(), merged, &snapshot)?;
            self.registry.register_disposable(name, adapter);
        } else if let BeanScope::Custom(scope_name) = merged.scope() {
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
            let adapter = DisposableAdapter::new(name, bean.clone(), merged, &snapshot)?;
            scope.register_destruction_callback(name, Box::new(move || adapter.destroy()));
        }
        Ok(())
    }

    /// Instantiates a factory bean just to ask its product type, without
    /// populating, initializing, or registering anything. Failures are
    /// suppressed; type probing must not abort an unrelated lookup.
    pub(crate) fn factory_bean_for_type_check(
        &self,
        name: &str,
        merged: &Arc<MergedBeanDefinition>,
    ) -> Option<Arc<dyn FactoryBean>> {
        if self.registry.is_actually_in_creation(name) {
            return None;
        }
        let hook = merged.raw().hooks.factory_bean.clone()?;
        self.registry.exclude_from_creation_checks(name, true);
        let result = self.instantiate_bean(name, merged, None);
        self.registry.exclude_from_creation_checks(name, false);
        match result {
            Ok(instance) => hook(&instance),
            Err(err) => {
                debug!(
                    bean = %name,
                    error = %err,
                    "bean creation during factory bean type check failed"
                );
                self.registry.record_suppressed(err);
                None
            }
        }
    }
}
