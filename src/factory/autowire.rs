//! The dependency-resolution engine: finds candidate beans for a
//! descriptor across the factory hierarchy, breaks ties through primary
//! and priority markers, and shapes the result for the requesting slot.

use std::sync::Arc;

use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::definition::merged::MergedBeanDefinition;
use crate::definition::ParamShape;
use crate::descriptor::{DependencyDescriptor, OrderedCandidate, ProviderSeed};
use crate::error::{BeansError, BeansResult};
use crate::key::{
    bean_as, instance_matches, is_null_bean, key_of, BeanArc, TypeKey,
};
use crate::lifecycle::FactoryBean;

use super::{strip_factory_prefix, BeanFactory, FACTORY_BEAN_PREFIX};

enum Candidate {
    /// Already materialized: resolvable values, existing singletons, and
    /// collection elements.
    Instance(BeanArc),
    /// A definition left uninstantiated until actually chosen.
    Definition,
}

struct CandidateEntry {
    name: String,
    candidate: Candidate,
}

type Candidates = SmallVec<[CandidateEntry; 4]>;

impl BeanFactory {
    /// Resolves a dependency descriptor on behalf of `requesting`,
    /// appending the names of beans the result came from to
    /// `autowired_names`.
    pub(crate) fn resolve_dependency_for(
        &self,
        descriptor: &DependencyDescriptor,
        requesting: Option<&str>,
        autowired_names: &mut Vec<String>,
    ) -> BeansResult<Option<BeanArc>> {
        if let Some(value) = &descriptor.fallback_value {
            let resolver = self.value_resolver(requesting, None);
            let resolved =
                resolver.resolve_for_slot(value, Some(&descriptor.key), descriptor.shape)?;
            return Ok(Some(resolved.value));
        }
        match descriptor.shape {
            ParamShape::Provider => {
                let seed = ProviderSeed::new(
                    self.weak(),
                    descriptor.clone(),
                    requesting.map(str::to_string),
                );
                Ok(Some(Arc::new(seed) as BeanArc))
            }
            ParamShape::Vec | ParamShape::Map => {
                self.resolve_multiple(descriptor, requesting, autowired_names)
            }
            ParamShape::Single | ParamShape::Optional => {
                self.resolve_single_candidate(descriptor, requesting, autowired_names)
            }
        }
    }

    fn resolve_single_candidate(
        &self,
        descriptor: &DependencyDescriptor,
        requesting: Option<&str>,
        autowired_names: &mut Vec<String>,
    ) -> BeansResult<Option<BeanArc>> {
        let candidates = self.find_autowire_candidates(requesting, descriptor)?;
        if candidates.is_empty() {
            if descriptor.required {
                return Err(no_candidates(descriptor));
            }
            return Ok(None);
        }

        let chosen = if candidates.len() > 1 {
            match self.determine_autowire_candidate(&candidates, descriptor)? {
                Some(index) => index,
                None => {
                    if descriptor.required || !descriptor.shape.is_multi() {
                        return Err(no_unique(descriptor, &candidates));
                    }
                    return Ok(None);
                }
            }
        } else {
            0
        };

        let entry = &candidates[chosen];
        autowired_names.push(entry.name.clone());
        let instance = match &entry.candidate {
            Candidate::Instance(value) => value.clone(),
            Candidate::Definition => self.get_bean(&entry.name)?,
        };
        if is_null_bean(&instance) {
            if descriptor.required {
                return Err(no_candidates(descriptor));
            }
            return Ok(None);
        }
        trace!(
            dependency = %descriptor.target,
            bean = %entry.name,
            "resolved dependency"
        );
        let (adapted, _) = self.adapt_bean_to_key(&entry.name, instance, &descriptor.key)?;
        Ok(Some(adapted))
    }

    fn resolve_multiple(
        &self,
        descriptor: &DependencyDescriptor,
        requesting: Option<&str>,
        autowired_names: &mut Vec<String>,
    ) -> BeansResult<Option<BeanArc>> {
        let element_descriptor = descriptor.for_element();
        let candidates = self.find_autowire_candidates(requesting, &element_descriptor)?;
        if candidates.is_empty() {
            if descriptor.required {
                return Err(no_candidates(descriptor));
            }
            return Ok(None);
        }

        let mut resolved: Vec<(String, BeanArc)> = Vec::with_capacity(candidates.len());
        for entry in candidates {
            let instance = match entry.candidate {
                Candidate::Instance(value) => value,
                Candidate::Definition => self.get_bean(&entry.name)?,
            };
            if is_null_bean(&instance) {
                continue;
            }
            let (adapted, _) = self.adapt_bean_to_key(&entry.name, instance, &descriptor.key)?;
            autowired_names.push(entry.name.clone());
            resolved.push((entry.name, adapted));
        }
        if resolved.is_empty() {
            if descriptor.required {
                return Err(no_candidates(descriptor));
            }
            return Ok(None);
        }

        match descriptor.shape {
            ParamShape::Vec => {
                if descriptor.ordered {
                    self.sort_resolved(&mut resolved);
                }
                let values: Vec<BeanArc> =
                    resolved.into_iter().map(|(_, value)| value).collect();
                Ok(Some(Arc::new(values) as BeanArc))
            }
            ParamShape::Map => Ok(Some(Arc::new(resolved) as BeanArc)),
            _ => unreachable!("resolve_multiple only handles collection shapes"),
        }
    }

    /// Stable sort: a configured comparator decides; the default puts
    /// lower declared priorities first, unprioritized candidates last.
    fn sort_resolved(&self, resolved: &mut [(String, BeanArc)]) {
        match self.dependency_comparator() {
            Some(comparator) => resolved.sort_by(|(a_name, a_value), (b_name, b_value)| {
                let a = OrderedCandidate {
                    name: a_name,
                    priority: self.priority_of(a_name),
                    instance: a_value,
                };
                let b = OrderedCandidate {
                    name: b_name,
                    priority: self.priority_of(b_name),
                    instance: b_value,
                };
                comparator.compare(&a, &b)
            }),
            None => {
                resolved.sort_by_key(|(name, _)| self.priority_of(name).unwrap_or(i32::MAX));
            }
        }
    }

    fn find_autowire_candidates(
        &self,
        requesting: Option<&str>,
        descriptor: &DependencyDescriptor,
    ) -> BeansResult<Candidates> {
        let key = &descriptor.key;
        let mut result = Candidates::new();

        if let Some(value) = self.resolvable_for(key) {
            result.push(CandidateEntry {
                name: key.name.to_string(),
                candidate: Candidate::Instance(value),
            });
        }

        let names = self.bean_names_for_type(key, true, descriptor.eager);
        for name in &names {
            if self.is_self_reference(requesting, name) {
                continue;
            }
            if !self.is_autowire_candidate_for(name, descriptor)? {
                continue;
            }
            self.add_candidate_entry(&mut result, name, descriptor)?;
        }

        if result.is_empty() {
            let multi = descriptor.shape.is_multi() || descriptor.multi_element;
            let fallback_descriptor = descriptor.for_fallback();
            // Definitions whose type cannot be predicted without
            // instantiation only participate once the typed pass came up
            // empty.
            if descriptor.qualifier.is_some() || !multi {
                for name in self.unpredictable_definition_names() {
                    if self.is_self_reference(requesting, &name) {
                        continue;
                    }
                    if self.is_autowire_candidate_for(&name, &fallback_descriptor)? {
                        self.add_candidate_entry(&mut result, &name, descriptor)?;
                    }
                }
            }
            if result.is_empty() && !multi {
                for name in &names {
                    if !self.is_self_reference(requesting, name) {
                        continue;
                    }
                    if descriptor.multi_element
                        && requesting
                            .map_or(false, |r| self.canonical_name(r) == self.canonical_name(name))
                    {
                        continue;
                    }
                    if self.is_autowire_candidate_for(name, &fallback_descriptor)? {
                        self.add_candidate_entry(&mut result, name, descriptor)?;
                    }
                }
            }
        }
        Ok(result)
    }

    fn add_candidate_entry(
        &self,
        result: &mut Candidates,
        name: &str,
        descriptor: &DependencyDescriptor,
    ) -> BeansResult<()> {
        if descriptor.multi_element {
            let instance = self.get_bean(name)?;
            if !is_null_bean(&instance) {
                result.push(CandidateEntry {
                    name: name.to_string(),
                    candidate: Candidate::Instance(instance),
                });
            }
        } else if self.hierarchy_contains_singleton(name) {
            let instance = self.get_bean(name)?;
            result.push(CandidateEntry {
                name: name.to_string(),
                candidate: Candidate::Instance(instance),
            });
        } else {
            result.push(CandidateEntry {
                name: name.to_string(),
                candidate: Candidate::Definition,
            });
        }
        Ok(())
    }

    fn hierarchy_contains_singleton(&self, name: &str) -> bool {
        let (stripped, _) = strip_factory_prefix(name);
        let canonical = self.canonical_name(stripped);
        if self.registry.contains_singleton(&canonical) {
            return true;
        }
        self.parent
            .as_ref()
            .map_or(false, |parent| parent.hierarchy_contains_singleton(name))
    }

    /// Whether the named bean may satisfy the descriptor: it must opt in
    /// to autowiring and carry the requested qualifier, if any.
    fn is_autowire_candidate_for(
        &self,
        name: &str,
        descriptor: &DependencyDescriptor,
    ) -> BeansResult<bool> {
        let (stripped, _) = strip_factory_prefix(name);
        let canonical = self.canonical_name(stripped);
        if !self.contains_bean_definition(&canonical) {
            if self.registry.contains_singleton(&canonical) {
                return Ok(match &descriptor.qualifier {
                    None => true,
                    Some(q) => self.qualifier_matches_name(q, &canonical),
                });
            }
            if let Some(parent) = &self.parent {
                return parent.is_autowire_candidate_for(name, descriptor);
            }
            return Ok(true);
        }
        let merged = self.merged_definition(&canonical)?;
        if !merged.is_autowire_candidate() {
            return Ok(false);
        }
        match &descriptor.qualifier {
            None => Ok(true),
            Some(q) => Ok(self.qualifier_matches_name(q, &canonical)
                || merged.qualifiers().iter().any(|declared| declared == q)),
        }
    }

    fn qualifier_matches_name(&self, qualifier: &str, canonical: &str) -> bool {
        qualifier == canonical || self.aliases_of(canonical).iter().any(|a| a == qualifier)
    }

    fn is_self_reference(&self, requesting: Option<&str>, candidate: &str) -> bool {
        let Some(requesting) = requesting else {
            return false;
        };
        let (stripped, _) = strip_factory_prefix(candidate);
        let candidate_canonical = self.canonical_name(stripped);
        let requesting_canonical = self.canonical_name(requesting);
        if candidate_canonical == requesting_canonical {
            return true;
        }
        if self.contains_bean_definition(&candidate_canonical) {
            if let Ok(merged) = self.merged_definition(&candidate_canonical) {
                if let Some(factory_name) = &merged.raw().factory_bean_name {
                    return self.canonical_name(factory_name) == requesting_canonical;
                }
            }
        }
        false
    }

    /// Picks one of several candidates: a unique primary wins, then the
    /// lowest declared priority, then identity with a registered
    /// resolvable value or a name match with the injection point.
    fn determine_autowire_candidate(
        &self,
        candidates: &Candidates,
        descriptor: &DependencyDescriptor,
    ) -> BeansResult<Option<usize>> {
        if let Some(index) = self.determine_primary_candidate(candidates, descriptor)? {
            return Ok(Some(index));
        }
        if let Some(index) = self.determine_highest_priority_candidate(candidates, descriptor)? {
            return Ok(Some(index));
        }
        for (index, entry) in candidates.iter().enumerate() {
            if let Candidate::Instance(value) = &entry.candidate {
                if self.is_resolvable_value(value) {
                    return Ok(Some(index));
                }
            }
            if matches_dependency_name(
                &entry.name,
                descriptor.dependency_name(),
                &self.aliases_of(&entry.name),
            ) {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    fn determine_primary_candidate(
        &self,
        candidates: &Candidates,
        descriptor: &DependencyDescriptor,
    ) -> BeansResult<Option<usize>> {
        let mut primary: Option<usize> = None;
        for (index, entry) in candidates.iter().enumerate() {
            if !self.is_primary_name(&entry.name) {
                continue;
            }
            match primary {
                None => primary = Some(index),
                Some(existing) => {
                    let candidate_local = self.contains_bean_definition(&entry.name);
                    let primary_local =
                        self.contains_bean_definition(&candidates[existing].name);
                    if candidate_local && primary_local {
                        return Err(BeansError::NoUniqueBean {
                            required: descriptor.key.name,
                            candidates: candidate_names(candidates),
                            message: Some(format!(
                                "more than one 'primary' bean found among candidates: '{}' \
                                 and '{}'",
                                candidates[existing].name, entry.name
                            )),
                        });
                    }
                    if candidate_local {
                        primary = Some(index);
                    }
                }
            }
        }
        Ok(primary)
    }

    fn determine_highest_priority_candidate(
        &self,
        candidates: &Candidates,
        descriptor: &DependencyDescriptor,
    ) -> BeansResult<Option<usize>> {
        let mut highest: Option<(usize, i32)> = None;
        for (index, entry) in candidates.iter().enumerate() {
            let Some(priority) = self.priority_of(&entry.name) else {
                continue;
            };
            match highest {
                None => highest = Some((index, priority)),
                Some((existing, existing_priority)) => {
                    if priority == existing_priority {
                        return Err(BeansError::NoUniqueBean {
                            required: descriptor.key.name,
                            candidates: candidate_names(candidates),
                            message: Some(format!(
                                "multiple beans found with the same priority ({}) among \
                                 candidates: '{}' and '{}'",
                                priority, candidates[existing].name, entry.name
                            )),
                        });
                    }
                    if priority < existing_priority {
                        highest = Some((index, priority));
                    }
                }
            }
        }
        Ok(highest.map(|(index, _)| index))
    }

    fn is_primary_name(&self, name: &str) -> bool {
        let (stripped, _) = strip_factory_prefix(name);
        let canonical = self.canonical_name(stripped);
        if self.contains_bean_definition(&canonical) {
            return self
                .merged_definition(&canonical)
                .map(|m| m.is_primary())
                .unwrap_or(false);
        }
        self.parent
            .as_ref()
            .map_or(false, |parent| parent.is_primary_name(name))
    }

    pub(crate) fn priority_of(&self, name: &str) -> Option<i32> {
        let (stripped, _) = strip_factory_prefix(name);
        let canonical = self.canonical_name(stripped);
        if self.contains_bean_definition(&canonical) {
            return self
                .merged_definition(&canonical)
                .ok()
                .and_then(|m| m.priority());
        }
        self.parent.as_ref().and_then(|p| p.priority_of(name))
    }

    fn unpredictable_definition_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let snapshot = self.definitions_snapshot();
        for name in &snapshot.order {
            let Ok(merged) = self.merged_definition(name) else {
                continue;
            };
            if merged.is_abstract() {
                continue;
            }
            let unpredictable = if merged.is_factory_bean() {
                self.factory_product_key(name, &merged, false).is_none()
            } else {
                self.predicted_key(&merged).is_none()
            };
            if unpredictable {
                names.push(name.clone());
            }
        }
        if let Some(parent) = &self.parent {
            for name in parent.unpredictable_definition_names() {
                if !self.contains_bean_definition(&name)
                    && !self.registry.contains_singleton(&name)
                    && !names.contains(&name)
                {
                    names.push(name);
                }
            }
        }
        names
    }

    // ---- by-type name collection ----

    /// Every bean name whose declared, predicted, or manufactured type
    /// answers `key`, across the whole hierarchy. Factory beans match
    /// through their product; the factory itself answers as `"&name"`.
    pub(crate) fn bean_names_for_type(
        &self,
        key: &TypeKey,
        include_non_singletons: bool,
        allow_eager: bool,
    ) -> Vec<String> {
        let standard = include_non_singletons && allow_eager;
        if standard {
            if let Some(cached) = self.cached_names_for(key) {
                return (*cached).clone();
            }
        }
        let names = self.collect_names_for_type(key, include_non_singletons, allow_eager);
        if standard {
            self.cache_names_for(*key, Arc::new(names.clone()));
        }
        names
    }

    fn collect_names_for_type(
        &self,
        key: &TypeKey,
        include_non_singletons: bool,
        allow_eager: bool,
    ) -> Vec<String> {
        let mut result = Vec::new();
        let snapshot = self.definitions_snapshot();
        for name in &snapshot.order {
            let Ok(merged) = self.merged_definition(name) else {
                continue;
            };
            if merged.is_abstract() {
                continue;
            }
            if !include_non_singletons && !merged.is_singleton() {
                continue;
            }
            if merged.is_factory_bean() {
                if self.factory_product_key(name, &merged, allow_eager) == Some(*key) {
                    result.push(name.clone());
                }
                if merged.answers_key(key) {
                    result.push(format!("{}{}", FACTORY_BEAN_PREFIX, name));
                }
            } else if merged.answers_key(key) || self.predicted_key(&merged) == Some(*key) {
                result.push(name.clone());
            }
        }

        for name in self.registry.singleton_names() {
            if snapshot.entries.contains_key(&name) || result.contains(&name) {
                continue;
            }
            let Ok(Some(instance)) = self.registry.get_singleton(&name, false) else {
                continue;
            };
            if instance_matches(&instance, key) {
                result.push(name);
            }
        }

        if let Some(parent) = &self.parent {
            for name in parent.collect_names_for_type(key, include_non_singletons, allow_eager) {
                let (stripped, _) = strip_factory_prefix(&name);
                if self.contains_bean_definition(stripped)
                    || self.registry.contains_singleton(stripped)
                    || result.contains(&name)
                {
                    continue;
                }
                result.push(name);
            }
        }
        result
    }

    /// The product type of a factory-bean definition: asked of the live
    /// factory instance when one exists, otherwise learned by probing
    /// when eager initialization is allowed.
    pub(crate) fn factory_product_key(
        &self,
        name: &str,
        merged: &Arc<MergedBeanDefinition>,
        allow_eager: bool,
    ) -> Option<TypeKey> {
        let hook = merged.raw().hooks.factory_bean.clone()?;
        if let Ok(Some(instance)) = self.registry.get_singleton(name, false) {
            if let Some(factory_bean) = hook(&instance) {
                return factory_bean.product_type();
            }
        }
        if !allow_eager {
            return None;
        }
        self.factory_bean_for_type_check(name, merged)?.product_type()
    }

    // ---- typed lookups ----

    /// The unique bean of concrete type `T`.
    ///
    /// # Errors
    ///
    /// [`BeansError::NoSuchBeanOfType`] when no candidate exists and
    /// [`BeansError::NoUniqueBean`] when several do and no primary,
    /// priority, or name tie-breaker settles it.
    pub fn get_bean_of_type<T: Send + Sync + 'static>(&self) -> BeansResult<Arc<T>> {
        let descriptor = DependencyDescriptor::of::<T>();
        let resolved = self
            .resolve_dependency_for(&descriptor, None, &mut Vec::new())?
            .ok_or_else(|| no_candidates(&descriptor))?;
        bean_as::<T>(&resolved).ok_or_else(|| BeansError::BeanNotOfRequiredType {
            name: "<by type>".into(),
            required: descriptor.key.name,
            actual: None,
        })
    }

    /// The unique bean exposed under trait `T`.
    pub fn get_bean_of_trait<T: ?Sized + Send + Sync + 'static>(&self) -> BeansResult<Arc<T>> {
        let descriptor = DependencyDescriptor::of::<T>();
        let mut autowired = Vec::new();
        let resolved = self
            .resolve_dependency_for(&descriptor, None, &mut autowired)?
            .ok_or_else(|| no_candidates(&descriptor))?;
        if let Some(value) = crate::key::bean_as_trait::<T>(&resolved) {
            return Ok(value);
        }
        // The engine hands back the stored shape; re-fetch through the
        // name-aware trait accessor for its binding casts.
        if let Some(name) = autowired.first() {
            return self.get_bean_trait::<T>(name);
        }
        Err(BeansError::BeanNotOfRequiredType {
            name: "<by type>".into(),
            required: descriptor.key.name,
            actual: None,
        })
    }

    /// Every bean of concrete type `T`, keyed by name in registration
    /// order. Beans currently mid-creation are skipped rather than
    /// failing the sweep.
    pub fn get_beans_of_type<T: Send + Sync + 'static>(
        &self,
    ) -> BeansResult<Vec<(String, Arc<T>)>> {
        let key = key_of::<T>();
        let mut out = Vec::new();
        for name in self.bean_names_for_type(&key, true, true) {
            match self.get_bean(&name) {
                Ok(bean) => {
                    if is_null_bean(&bean) {
                        continue;
                    }
                    if let Some(typed) = bean_as::<T>(&bean) {
                        out.push((name, typed));
                    }
                }
                Err(err) if involves_currently_in_creation(&err) => {
                    debug!(bean = %name, "skipping bean currently in creation during by-type sweep");
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(out)
    }

    /// Every bean exposed under trait `T`, keyed by name in registration
    /// order.
    pub fn get_beans_of_trait<T: ?Sized + Send + Sync + 'static>(
        &self,
    ) -> BeansResult<Vec<(String, Arc<T>)>> {
        let key = key_of::<T>();
        let mut out = Vec::new();
        for name in self.bean_names_for_type(&key, true, true) {
            match self.get_bean_trait::<T>(&name) {
                Ok(value) => out.push((name, value)),
                Err(err) if involves_currently_in_creation(&err) => {
                    debug!(bean = %name, "skipping bean currently in creation during by-type sweep");
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(out)
    }

    /// Names of beans answering type `T`, in registration order.
    pub fn bean_names_of_type<T: ?Sized + 'static>(&self) -> Vec<String> {
        self.bean_names_for_type(&key_of::<T>(), true, true)
    }

    /// Whether the named bean would answer a lookup for type `T`.
    pub fn is_type_match<T: ?Sized + 'static>(&self, name: &str) -> BeansResult<bool> {
        if !self.contains_bean(name) {
            return Err(BeansError::NoSuchBean(name.to_string()));
        }
        let (stripped, wants_factory) = strip_factory_prefix(name);
        let canonical = self.canonical_name(stripped);
        let target = if wants_factory {
            format!("{}{}", FACTORY_BEAN_PREFIX, canonical)
        } else {
            canonical
        };
        Ok(self
            .bean_names_for_type(&key_of::<T>(), true, true)
            .contains(&target))
    }

    /// Names of beans carrying the qualifier, matched by declared
    /// qualifier, bean name, or alias, in registration order across the
    /// hierarchy.
    pub fn bean_names_with_qualifier(&self, qualifier: &str) -> Vec<String> {
        let mut result = Vec::new();
        let snapshot = self.definitions_snapshot();
        for name in &snapshot.order {
            let Ok(merged) = self.merged_definition(name) else {
                continue;
            };
            if merged.is_abstract() {
                continue;
            }
            if self.qualifier_matches_name(qualifier, name)
                || merged.qualifiers().iter().any(|declared| declared == qualifier)
            {
                result.push(name.clone());
            }
        }
        for name in self.registry.singleton_names() {
            if snapshot.entries.contains_key(&name) || result.contains(&name) {
                continue;
            }
            if self.qualifier_matches_name(qualifier, &name) {
                result.push(name);
            }
        }
        if let Some(parent) = &self.parent {
            for name in parent.bean_names_with_qualifier(qualifier) {
                if self.contains_bean_definition(&name)
                    || self.registry.contains_singleton(&name)
                    || result.contains(&name)
                {
                    continue;
                }
                result.push(name);
            }
        }
        result
    }

    // ---- result adaptation ----

    /// Reshapes a bean fetched under `name` to the requested key, going
    /// through the definition's trait bindings or the converter when the
    /// stored shape differs. The flag reports whether no conversion was
    /// needed.
    pub(crate) fn adapt_bean_to_key(
        &self,
        name: &str,
        bean: BeanArc,
        key: &TypeKey,
    ) -> BeansResult<(BeanArc, bool)> {
        let (stripped, wants_factory) = strip_factory_prefix(name);
        let canonical = self.canonical_name(stripped);
        let merged = self.merged_definition(&canonical).ok();
        self.coerce_to_key(&canonical, bean, key, merged.as_ref(), !wants_factory)
    }

    pub(crate) fn coerce_to_key(
        &self,
        name: &str,
        bean: BeanArc,
        key: &TypeKey,
        merged: Option<&Arc<MergedBeanDefinition>>,
        trust_declared_product: bool,
    ) -> BeansResult<(BeanArc, bool)> {
        if instance_matches(&bean, key) || is_null_bean(&bean) {
            return Ok((bean, true));
        }
        // Resolvable values are matched by their registered key and are
        // already stored in the shape that key's consumers downcast.
        if self.is_resolvable_value(&bean) {
            return Ok((bean, true));
        }
        if let Some(merged) = merged {
            if let Some(binding) = merged.raw().bindings.iter().find(|b| b.key == *key) {
                if let Some(handle) = (binding.cast)(&bean) {
                    return Ok((handle, true));
                }
            }
            // The definition promised this key; the stored handle already
            // has the matching shape even though the ids differ.
            if merged.answers_key(key) || self.predicted_key(merged) == Some(*key) {
                return Ok((bean, true));
            }
            if trust_declared_product && merged.is_factory_bean() {
                // A product whose declared type agrees, or is
                // indeterminate, was stored in the shape the factory
                // promised; a declared mismatch falls through.
                match self.factory_product_key(name, merged, false) {
                    None => return Ok((bean, true)),
                    Some(product) if product == *key => return Ok((bean, true)),
                    Some(_) => {}
                }
            }
        }
        match self.converter().convert(bean, key) {
            Ok(converted) => Ok((converted, false)),
            Err(_) => Err(BeansError::BeanNotOfRequiredType {
                name: name.to_string(),
                required: key.name,
                actual: None,
            }),
        }
    }
}

fn candidate_names(candidates: &Candidates) -> Vec<String> {
    candidates.iter().map(|entry| entry.name.clone()).collect()
}

fn matches_dependency_name(
    candidate: &str,
    dependency_name: Option<&str>,
    candidate_aliases: &[String],
) -> bool {
    let Some(dependency_name) = dependency_name else {
        return false;
    };
    candidate == dependency_name || candidate_aliases.iter().any(|a| a == dependency_name)
}

fn involves_currently_in_creation(err: &BeansError) -> bool {
    fn scan(err: &BeansError) -> bool {
        if matches!(err, BeansError::CurrentlyInCreation(_)) {
            return true;
        }
        if let BeansError::CreationFailure {
            source, related, ..
        } = err
        {
            if source.as_deref().map_or(false, scan) {
                return true;
            }
            return related.iter().any(scan);
        }
        if let BeansError::UnsatisfiedDependency { source, .. } = err {
            return scan(source);
        }
        false
    }
    scan(err)
}

fn no_candidates(descriptor: &DependencyDescriptor) -> BeansError {
    BeansError::NoSuchBeanOfType {
        required: descriptor.key.name,
        message: format!(
            "expected at least 1 bean which qualifies as autowire candidate for {}",
            descriptor.target
        ),
    }
}

fn no_unique(descriptor: &DependencyDescriptor, candidates: &Candidates) -> BeansError {
    BeansError::NoUniqueBean {
        required: descriptor.key.name,
        candidates: candidate_names(candidates),
        message: Some(format!(
            "expected single matching bean for {} but found {}",
            descriptor.target,
            candidates.len()
        )),
    }
}
