//! Constructor and factory-method resolution: scores every declared
//! executable against the configured and autowirable arguments and
//! instantiates through the best match.

use std::collections::HashSet;
use std::sync::Arc;

use smallvec::SmallVec;
use tracing::trace;

use crate::definition::merged::{CachedArg, CachedExecutable, CtorCache, MergedBeanDefinition};
use crate::definition::{
    AutowireMode, ConstructorSpec, ParamShape, ParamSpec, ResolvedArgs, Value,
};
use crate::descriptor::DependencyDescriptor;
use crate::error::{BeansError, BeansResult};
use crate::key::{BeanArc, NullBean};

use super::BeanFactory;

/// Weight discount for an argument list where every slot matched its
/// declared type without conversion.
const EXACT_MATCH_DISCOUNT: i32 = 1024;

struct ArgsHolder {
    args: Vec<BeanArc>,
    /// Replayable per-slot cache entries; `None` once any slot cannot be
    /// replayed (explicit arguments, references, nested definitions).
    cached: Option<Vec<CachedArg>>,
    autowired: Vec<String>,
    converted: usize,
    all_exact: bool,
}

impl ArgsHolder {
    fn with_capacity(len: usize) -> Self {
        ArgsHolder {
            args: Vec::with_capacity(len),
            cached: Some(Vec::with_capacity(len)),
            autowired: Vec::new(),
            converted: 0,
            all_exact: true,
        }
    }

    fn note(&mut self, exact: bool) {
        if !exact {
            self.converted += 1;
            self.all_exact = false;
        }
    }

    /// Lower weights win. An all-exact argument list outranks any list
    /// that needed conversions.
    fn weight(&self) -> i32 {
        let mut weight = (self.converted as i32) * 2;
        if self.all_exact {
            weight -= EXACT_MATCH_DISCOUNT;
        }
        weight
    }
}

fn replayable(value: &Value) -> bool {
    matches!(value, Value::Null | Value::Str(_) | Value::Literal(_))
}

/// A constructor or factory method as seen by the scoring pass.
struct Candidate<'a> {
    params: &'a [ParamSpec],
    method: Option<&'static str>,
}

/// What one scoring pass over a candidate list concluded. Caching,
/// dependent-bean links, and error wording stay with the caller.
enum Selection {
    Unique {
        index: usize,
        holder: ArgsHolder,
    },
    /// The winner plus every candidate tied with it, winner first.
    Ambiguous {
        indices: SmallVec<[usize; 4]>,
        weight: i32,
    },
    NoMatch {
        causes: Vec<BeansError>,
    },
}

impl BeanFactory {
    /// Produces the raw instance for a definition: supplier, cached
    /// executable, factory method, or scored constructor, in that order.
    pub(crate) fn instantiate_bean(
        &self,
        name: &str,
        merged: &Arc<MergedBeanDefinition>,
        args: Option<&[Value]>,
    ) -> BeansResult<BeanArc> {
        let def = merged.raw();
        if let Some(supplier) = &def.instance_supplier {
            trace!(bean = %name, "instantiating from supplier");
            let factory = self.weak_self.upgrade().ok_or_else(|| {
                BeansError::IllegalState("bean factory dropped during creation".into())
            })?;
            return supplier(&factory).map_err(|err| {
                BeansError::creation(
                    name,
                    merged.description(),
                    "instance supplier failed",
                    Some(err),
                )
            });
        }
        if args.is_none() {
            if let Some(cache) = merged.cached_ctor() {
                return self.instantiate_from_cache(name, merged, &cache);
            }
        }
        if !def.factory_methods.is_empty() {
            return self.instantiate_using_factory_method(name, merged, args);
        }
        let suggested = self.suggested_constructors(name, merged)?;
        if suggested.is_some()
            || !def.ctors.is_empty()
            || merged.autowire_mode() == AutowireMode::Constructor
            || !def.ctor_args.is_empty()
            || args.map_or(false, |a| !a.is_empty())
        {
            return self.autowire_constructor(name, merged, suggested, args);
        }
        Err(BeansError::creation(
            name,
            merged.description(),
            "no constructor, factory method, or supplier declared",
            None,
        ))
    }

    /// Asks registered selectors for a candidate-constructor override; the
    /// first one answering wins.
    fn suggested_constructors(
        &self,
        name: &str,
        merged: &Arc<MergedBeanDefinition>,
    ) -> BeansResult<Option<Vec<ConstructorSpec>>> {
        let snapshot = self.processors.constructor_selection.snapshot();
        for selector in snapshot.iter() {
            if let Some(ctors) = selector.candidate_constructors(merged, name)? {
                return Ok(Some(ctors));
            }
        }
        Ok(None)
    }

    fn autowire_constructor(
        &self,
        name: &str,
        merged: &Arc<MergedBeanDefinition>,
        suggested: Option<Vec<ConstructorSpec>>,
        explicit: Option<&[Value]>,
    ) -> BeansResult<BeanArc> {
        let def = merged.raw();
        let ctors: &[ConstructorSpec] = suggested.as_deref().unwrap_or(&def.ctors);
        if ctors.is_empty() {
            return Err(BeansError::creation(
                name,
                merged.description(),
                "constructor resolution requested but no constructors declared",
                None,
            ));
        }
        let candidates: SmallVec<[Candidate<'_>; 4]> = ctors
            .iter()
            .map(|ctor| Candidate {
                params: &ctor.params,
                method: None,
            })
            .collect();

        match self.select_executable(name, merged, &candidates, explicit, false) {
            Selection::Unique { index, holder } => {
                for dep in &holder.autowired {
                    self.registry.register_dependent_bean(dep, name);
                }
                // Cached indices address the declared list; a selector
                // override is not replayable.
                if explicit.is_none() && suggested.is_none() {
                    merged.store_ctor(CtorCache {
                        exec: CachedExecutable::Constructor(index),
                        args: holder.cached.clone(),
                    });
                }
                trace!(
                    bean = %name,
                    params = ctors[index].param_count(),
                    "instantiating via constructor"
                );
                let args = ResolvedArgs::new(holder.args);
                (ctors[index].invoke)(&args).map_err(|err| {
                    BeansError::creation(
                        name,
                        merged.description(),
                        "bean instantiation via constructor failed",
                        Some(err),
                    )
                })
            }
            Selection::Ambiguous { indices, weight } => Err(BeansError::creation(
                name,
                merged.description(),
                format!(
                    "ambiguous constructor matches found (hint: pin simple parameters with \
                     indexed or typed argument values): {} constructors resolve with weight {}",
                    indices.len(),
                    weight
                ),
                None,
            )),
            Selection::NoMatch { mut causes } => {
                if let Some(last) = causes.pop() {
                    for cause in causes {
                        self.registry.record_suppressed(cause);
                    }
                    return Err(last);
                }
                Err(BeansError::creation(
                    name,
                    merged.description(),
                    "could not resolve matching constructor; declare argument values or adjust \
                     autowiring",
                    None,
                ))
            }
        }
    }

    fn instantiate_using_factory_method(
        &self,
        name: &str,
        merged: &Arc<MergedBeanDefinition>,
        explicit: Option<&[Value]>,
    ) -> BeansResult<BeanArc> {
        let def = merged.raw();
        let factory_instance = self.factory_method_owner(name, merged)?;
        let candidates: SmallVec<[Candidate<'_>; 4]> = def
            .factory_methods
            .iter()
            .map(|spec| Candidate {
                params: &spec.params,
                method: Some(spec.name),
            })
            .collect();

        match self.select_executable(name, merged, &candidates, explicit, true) {
            Selection::Unique { index, holder } => {
                for dep in &holder.autowired {
                    self.registry.register_dependent_bean(dep, name);
                }
                if explicit.is_none() {
                    merged.store_ctor(CtorCache {
                        exec: CachedExecutable::FactoryMethod(index),
                        args: holder.cached.clone(),
                    });
                }
                trace!(
                    bean = %name,
                    method = def.factory_methods[index].name,
                    "instantiating via factory method"
                );
                let args = ResolvedArgs::new(holder.args);
                (def.factory_methods[index].invoke)(factory_instance.as_ref(), &args).map_err(
                    |err| {
                        BeansError::creation(
                            name,
                            merged.description(),
                            "bean instantiation via factory method failed",
                            Some(err),
                        )
                    },
                )
            }
            Selection::Ambiguous { indices, weight } => Err(BeansError::creation(
                name,
                merged.description(),
                format!(
                    "ambiguous overloads of factory method '{}' resolve with weight {}",
                    def.factory_methods[indices[0]].name, weight
                ),
                None,
            )),
            Selection::NoMatch { mut causes } => {
                if let Some(last) = causes.pop() {
                    for cause in causes {
                        self.registry.record_suppressed(cause);
                    }
                    return Err(last);
                }
                let method = def
                    .factory_methods
                    .first()
                    .map(|m| m.name)
                    .unwrap_or("<none>");
                Err(BeansError::creation(
                    name,
                    merged.description(),
                    format!(
                        "no matching overload of factory method '{}' found; check the declared \
                         parameters against the configured argument values",
                        method
                    ),
                    None,
                ))
            }
        }
    }

    /// Scores every candidate against the configured and autowirable
    /// arguments, longest parameter lists first, and reports the outcome
    /// without caching anything or registering dependent beans.
    ///
    /// With `skip_equal_keyed_ties`, a tie whose parameter keys match the
    /// current winner's is treated as the same overload rather than an
    /// ambiguity.
    fn select_executable(
        &self,
        name: &str,
        merged: &Arc<MergedBeanDefinition>,
        candidates: &[Candidate<'_>],
        explicit: Option<&[Value]>,
        skip_equal_keyed_ties: bool,
    ) -> Selection {
        let mut order: SmallVec<[usize; 4]> = (0..candidates.len()).collect();
        order.sort_by(|&a, &b| candidates[b].params.len().cmp(&candidates[a].params.len()));
        let min_args = match explicit {
            Some(values) => values.len(),
            None => merged.raw().ctor_args.min_arg_count(),
        };
        let single_candidate = candidates.len() == 1;

        let mut chosen: Option<(usize, ArgsHolder)> = None;
        let mut best_weight = i32::MAX;
        let mut tied: SmallVec<[usize; 4]> = SmallVec::new();
        let mut causes: Vec<BeansError> = Vec::new();

        for &idx in &order {
            let candidate = &candidates[idx];
            if let Some((_, holder)) = &chosen {
                if holder.args.len() > candidate.params.len() {
                    break;
                }
            }
            if candidate.params.len() < min_args {
                break;
            }
            match self.resolve_candidate_args(
                name,
                merged,
                candidate.params,
                explicit,
                candidate.method,
                single_candidate,
            ) {
                Ok(holder) => {
                    let weight = holder.weight();
                    if weight < best_weight {
                        best_weight = weight;
                        chosen = Some((idx, holder));
                        tied.clear();
                    } else if let Some((chosen_idx, _)) = &chosen {
                        if weight == best_weight
                            && !(skip_equal_keyed_ties
                                && same_param_keys(
                                    candidates[*chosen_idx].params,
                                    candidate.params,
                                ))
                        {
                            tied.push(idx);
                        }
                    }
                }
                Err(err) => causes.push(err),
            }
        }

        match chosen {
            Some((index, holder)) if tied.is_empty() => Selection::Unique { index, holder },
            Some((index, _)) => {
                let mut indices = SmallVec::with_capacity(tied.len() + 1);
                indices.push(index);
                indices.extend(tied);
                Selection::Ambiguous {
                    indices,
                    weight: best_weight,
                }
            }
            None => Selection::NoMatch { causes },
        }
    }

    /// Resolves the factory bean instance for instance factory methods,
    /// `None` for static ones.
    fn factory_method_owner(
        &self,
        name: &str,
        merged: &Arc<MergedBeanDefinition>,
    ) -> BeansResult<Option<BeanArc>> {
        let Some(factory_name) = &merged.raw().factory_bean_name else {
            return Ok(None);
        };
        let canonical = self.canonical_name(factory_name);
        if canonical == name {
            return Err(BeansError::DefinitionStore {
                name: name.to_string(),
                message: "factory bean reference points back to the same bean definition".into(),
            });
        }
        let instance = self.get_bean(factory_name)?;
        self.registry.register_dependent_bean(&canonical, name);
        Ok(Some(instance))
    }

    fn resolve_candidate_args(
        &self,
        name: &str,
        merged: &Arc<MergedBeanDefinition>,
        params: &[ParamSpec],
        explicit: Option<&[Value]>,
        factory_method: Option<&'static str>,
        single_candidate: bool,
    ) -> BeansResult<ArgsHolder> {
        let def = merged.raw();
        let resolver = self.value_resolver(Some(name), Some(merged));
        let mut holder = ArgsHolder::with_capacity(params.len());
        let mut used_generic: HashSet<usize> = HashSet::new();

        for (index, param) in params.iter().enumerate() {
            if let Some(values) = explicit {
                let value = values.get(index).ok_or_else(|| {
                    unsatisfied_arg(
                        name,
                        factory_method,
                        index,
                        BeansError::IllegalState(format!(
                            "no explicit argument supplied for parameter {}",
                            index
                        )),
                    )
                })?;
                let resolved = resolver
                    .resolve_for_slot(value, Some(&param.key), param.shape)
                    .map_err(|err| unsatisfied_arg(name, factory_method, index, err))?;
                holder.note(resolved.exact);
                holder.args.push(resolved.value);
                holder.cached = None;
                continue;
            }

            let configured = def
                .ctor_args
                .indexed_argument_value(index, Some(param.key))
                .map(|h| (None, h))
                .or_else(|| {
                    def.ctor_args
                        .generic_argument_value(Some(param.key), param.name, &used_generic)
                        .map(|(pos, h)| (Some(pos), h))
                });
            if let Some((generic_pos, value_holder)) = configured {
                if let Some(pos) = generic_pos {
                    used_generic.insert(pos);
                }
                let resolved = resolver
                    .resolve_for_slot(&value_holder.value, Some(&param.key), param.shape)
                    .map_err(|err| unsatisfied_arg(name, factory_method, index, err))?;
                holder.note(resolved.exact);
                if let Some(cached) = holder.cached.as_mut() {
                    if replayable(&value_holder.value) {
                        cached.push(CachedArg::Value(resolved.value.clone()));
                    } else {
                        holder.cached = None;
                    }
                }
                holder.args.push(resolved.value);
                continue;
            }

            let mut autowired = Vec::new();
            let value = self
                .autowire_param(name, param, index, factory_method, single_candidate, &mut autowired)
                .map_err(|err| unsatisfied_arg(name, factory_method, index, err))?;
            holder.autowired.append(&mut autowired);
            if let Some(cached) = holder.cached.as_mut() {
                cached.push(CachedArg::Autowire);
            }
            holder.args.push(value);
        }
        Ok(holder)
    }

    fn autowire_param(
        &self,
        name: &str,
        param: &ParamSpec,
        index: usize,
        factory_method: Option<&'static str>,
        single_candidate: bool,
        autowired: &mut Vec<String>,
    ) -> BeansResult<BeanArc> {
        let descriptor = DependencyDescriptor::from_param(param, index, factory_method);
        match self.resolve_dependency_for(&descriptor, Some(name), autowired) {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Ok(empty_slot(param.shape)),
            Err(err) => {
                // A sole candidate tolerates an empty collection where a
                // competing overload would have to lose the tie instead.
                if single_candidate
                    && param.shape.is_multi()
                    && matches!(err, BeansError::NoSuchBeanOfType { .. })
                {
                    return Ok(empty_slot(param.shape));
                }
                Err(err)
            }
        }
    }

    fn instantiate_from_cache(
        &self,
        name: &str,
        merged: &Arc<MergedBeanDefinition>,
        cache: &CtorCache,
    ) -> BeansResult<BeanArc> {
        let def = merged.raw();
        match cache.exec {
            CachedExecutable::Constructor(idx) => {
                let ctor = def.ctors.get(idx).ok_or_else(|| {
                    BeansError::IllegalState(format!(
                        "cached constructor index {} out of range for bean '{}'",
                        idx, name
                    ))
                })?;
                let args =
                    self.rebuild_args(name, merged, &ctor.params, cache.args.as_deref(), None)?;
                (ctor.invoke)(&args).map_err(|err| {
                    BeansError::creation(
                        name,
                        merged.description(),
                        "bean instantiation via constructor failed",
                        Some(err),
                    )
                })
            }
            CachedExecutable::FactoryMethod(idx) => {
                let spec = def.factory_methods.get(idx).ok_or_else(|| {
                    BeansError::IllegalState(format!(
                        "cached factory method index {} out of range for bean '{}'",
                        idx, name
                    ))
                })?;
                let factory_instance = self.factory_method_owner(name, merged)?;
                let args = self.rebuild_args(
                    name,
                    merged,
                    &spec.params,
                    cache.args.as_deref(),
                    Some(spec.name),
                )?;
                (spec.invoke)(factory_instance.as_ref(), &args).map_err(|err| {
                    BeansError::creation(
                        name,
                        merged.description(),
                        "bean instantiation via factory method failed",
                        Some(err),
                    )
                })
            }
        }
    }

    fn rebuild_args(
        &self,
        name: &str,
        merged: &Arc<MergedBeanDefinition>,
        params: &[ParamSpec],
        cached: Option<&[CachedArg]>,
        factory_method: Option<&'static str>,
    ) -> BeansResult<ResolvedArgs> {
        match cached {
            Some(entries) => {
                let mut values = Vec::with_capacity(params.len());
                let mut autowired = Vec::new();
                for (index, (param, entry)) in params.iter().zip(entries).enumerate() {
                    match entry {
                        CachedArg::Value(value) => values.push(value.clone()),
                        CachedArg::Autowire => {
                            let value = self
                                .autowire_param(
                                    name,
                                    param,
                                    index,
                                    factory_method,
                                    true,
                                    &mut autowired,
                                )
                                .map_err(|err| {
                                    unsatisfied_arg(name, factory_method, index, err)
                                })?;
                            values.push(value);
                        }
                    }
                }
                for dep in &autowired {
                    self.registry.register_dependent_bean(dep, name);
                }
                Ok(ResolvedArgs::new(values))
            }
            None => {
                let holder =
                    self.resolve_candidate_args(name, merged, params, None, factory_method, true)?;
                for dep in &holder.autowired {
                    self.registry.register_dependent_bean(dep, name);
                }
                Ok(ResolvedArgs::new(holder.args))
            }
        }
    }
}

fn empty_slot(shape: ParamShape) -> BeanArc {
    match shape {
        ParamShape::Vec => Arc::new(Vec::<BeanArc>::new()),
        ParamShape::Map => Arc::new(Vec::<(String, BeanArc)>::new()),
        _ => Arc::new(NullBean),
    }
}

fn same_param_keys(a: &[ParamSpec], b: &[ParamSpec]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.key == y.key)
}

fn unsatisfied_arg(
    name: &str,
    factory_method: Option<&'static str>,
    index: usize,
    err: BeansError,
) -> BeansError {
    if matches!(err, BeansError::UnsatisfiedDependency { .. }) {
        return err;
    }
    BeansError::UnsatisfiedDependency {
        name: name.to_string(),
        injection_point: match factory_method {
            Some(method) => format!("parameter {} of factory method '{}'", index, method),
            None => format!("constructor parameter {}", index),
        },
        source: Box::new(err),
    }
}
